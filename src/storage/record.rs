//! # Slot Images
//!
//! A `Record` is the byte image of one slot: the deletion flag followed by
//! R bytes of concatenated fixed-width fields. Field access goes through a
//! `FileSchema`, which knows each field's offset and width; the record
//! itself is schema-agnostic so that one buffer type serves both the
//! on-disk view and the post-split logical view.

use crate::codec::{self, Charset};
use crate::error::{DbError, Result};
use crate::schema::FileSchema;

/// Deletion flag value of a live slot.
pub const LIVE_FLAG: u8 = 0x00;
/// Deletion flag value of a deleted slot.
pub const DELETED_FLAG: u8 = 0x01;

/// The in-memory image of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    flag: u8,
    content: Vec<u8>,
}

impl Record {
    /// A live record with every field zeroed.
    pub fn empty(content_length: usize) -> Record {
        Record {
            flag: LIVE_FLAG,
            content: vec![0u8; content_length],
        }
    }

    /// Parse a record from one full slot (flag byte + content).
    pub fn from_slot(slot: &[u8]) -> Result<Record> {
        if slot.is_empty() {
            return Err(DbError::Format("empty slot buffer".into()));
        }
        Ok(Record {
            flag: slot[0],
            content: slot[1..].to_vec(),
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.flag != LIVE_FLAG
    }

    pub fn mark_deleted(&mut self) {
        self.flag = DELETED_FLAG;
    }

    /// Overwrite fields from `values`, position for position. Fields past
    /// the end of `values` keep their current bytes. Each written field is
    /// zeroed first, then filled with the encoded value truncated to the
    /// field width.
    pub fn set_values(
        &mut self,
        schema: &FileSchema,
        values: &[String],
        charset: Charset,
    ) -> Result<()> {
        let count = values.len().min(schema.field_count());
        for (i, value) in values.iter().take(count).enumerate() {
            let offset = schema.offset_of(i)?;
            let length = schema.field_length(i)?;

            self.content[offset..offset + length].fill(0x00);

            let encoded = codec::encode_string(value, charset);
            let copy_len = encoded.len().min(length);
            self.content[offset..offset + copy_len].copy_from_slice(&encoded[..copy_len]);
        }
        Ok(())
    }

    /// Decoded, trimmed value of one field.
    pub fn value(&self, schema: &FileSchema, field_no: usize, charset: Charset) -> Result<String> {
        let offset = schema.offset_of(field_no)?;
        let length = schema.field_length(field_no)?;
        codec::decode_string(&self.content, offset, length, charset)
    }

    /// Decoded, trimmed values of every field, in schema order.
    pub fn values(&self, schema: &FileSchema, charset: Charset) -> Result<Vec<String>> {
        (0..schema.field_count())
            .map(|i| self.value(schema, i, charset))
            .collect()
    }

    /// The full slot image: flag byte followed by the content bytes.
    pub fn to_slot_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.content.len());
        bytes.push(self.flag);
        bytes.extend_from_slice(&self.content);
        bytes
    }

    pub fn content_length(&self) -> usize {
        self.content.len()
    }

    /// Bytes this record occupies on disk, including the flag.
    pub fn storage_length(&self) -> usize {
        1 + self.content.len()
    }
}

/// A run of consecutive slots fetched by one buffered read.
///
/// Iteration yields every slot in the buffer, deleted ones included; the
/// caller decides what to skip. Iteration does not consume the block.
#[derive(Debug)]
pub struct RecordBlock {
    buf: Vec<u8>,
    slot_length: usize,
}

impl RecordBlock {
    /// Wrap a buffer of whole slots. The buffer length must be an exact
    /// multiple of the slot length.
    pub fn new(buf: Vec<u8>, slot_length: usize) -> Result<RecordBlock> {
        if slot_length == 0 || buf.len() % slot_length != 0 {
            return Err(DbError::Format(format!(
                "block of {} bytes is not a whole number of {}-byte slots",
                buf.len(),
                slot_length
            )));
        }
        Ok(RecordBlock { buf, slot_length })
    }

    pub fn record_count(&self) -> usize {
        self.buf.len() / self.slot_length
    }

    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            block: self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a RecordBlock {
    type Item = Record;
    type IntoIter = BlockIter<'a>;

    fn into_iter(self) -> BlockIter<'a> {
        self.iter()
    }
}

pub struct BlockIter<'a> {
    block: &'a RecordBlock,
    next: usize,
}

impl Iterator for BlockIter<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.next >= self.block.record_count() {
            return None;
        }
        let start = self.next * self.block.slot_length;
        let slot = &self.block.buf[start..start + self.block.slot_length];
        self.next += 1;
        Some(Record::from_slot(slot).expect("block slots are non-empty"))
    }
}
