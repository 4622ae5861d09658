//! # Schema Definitions
//!
//! Two views of the same record bytes live here:
//!
//! - `FileSchema` (this module): the physical view, parsed from the data
//!   file's schema section. It is the authority on how many bytes each
//!   field occupies and where.
//! - [`TableSchema`](table::TableSchema): the logical view the engine and
//!   its callers work with, including which columns form the primary key.
//!
//! The two usually coincide column for column. The one sanctioned
//! divergence is the in-memory field split: a wide physical field may back
//! several contiguous logical columns, in which case the `FileSchema` is
//! rewritten in memory (via [`FileSchema::split_field`]) to match the
//! logical layout. The file itself is never rewritten; old readers keep
//! seeing the wide field.
//!
//! ## Header Layout
//!
//! The fixed header prelude is parsed with a zerocopy struct:
//!
//! ```text
//! Offset  Size  Field
//! 0       4     magic cookie (opaque, preserved but not validated)
//! 4       4     record length R (big-endian u32)
//! 8       2     field count F (big-endian u16)
//! ```
//!
//! followed by F variable-width schema entries parsed through the codec.

pub mod table;

use std::io;

use zerocopy::big_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::codec::{self, Charset};
use crate::error::{DbError, Result};

/// Byte size of the fixed header prelude.
pub const HEADER_LEN: usize = 10;

/// The raw on-disk header prelude. All integers are big-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RawHeader {
    magic: [u8; 4],
    record_length: U32,
    field_count: U16,
}

const _: () = assert!(std::mem::size_of::<RawHeader>() == HEADER_LEN);

impl RawHeader {
    pub fn parse(bytes: &[u8]) -> Result<RawHeader> {
        RawHeader::read_from_bytes(bytes)
            .map_err(|_| DbError::Format(format!("header prelude must be {HEADER_LEN} bytes")))
    }

    pub fn magic(&self) -> [u8; 4] {
        self.magic
    }

    pub fn record_length(&self) -> u32 {
        self.record_length.get()
    }

    pub fn field_count(&self) -> u16 {
        self.field_count.get()
    }
}

/// One physical field: a name and a fixed byte width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    name: String,
    length: usize,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, length: usize) -> FieldDef {
        FieldDef {
            name: name.into(),
            length,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// The ordered list of physical fields making up one record.
///
/// Parsed from the schema section at open. After a `split_field` the
/// in-memory field list no longer matches the file's schema section; that
/// is intentional and never written back.
#[derive(Debug, Clone)]
pub struct FileSchema {
    fields: Vec<FieldDef>,
}

impl FileSchema {
    pub fn new(fields: Vec<FieldDef>) -> FileSchema {
        FileSchema { fields }
    }

    /// Parse `field_count` schema entries from the schema section, reading
    /// exactly as many bytes as the entries occupy.
    pub fn parse<R: io::Read>(
        input: &mut R,
        field_count: usize,
        charset: Charset,
    ) -> Result<FileSchema> {
        let mut fields = Vec::with_capacity(field_count);

        for _ in 0..field_count {
            let mut len_buf = [0u8; 2];
            read_section_bytes(input, &mut len_buf)?;
            let name_len = codec::decode_u16(&len_buf, 0)? as usize;

            let mut name_buf = vec![0u8; name_len];
            read_section_bytes(input, &mut name_buf)?;
            let name = codec::decode_string(&name_buf, 0, name_len, charset)?;

            read_section_bytes(input, &mut len_buf)?;
            let field_len = codec::decode_u16(&len_buf, 0)? as usize;

            fields.push(FieldDef::new(name, field_len));
        }

        Ok(FileSchema { fields })
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, field_no: usize) -> Result<&FieldDef> {
        self.fields
            .get(field_no)
            .ok_or_else(|| DbError::Format(format!("no field at position {field_no}")))
    }

    pub fn field_length(&self, field_no: usize) -> Result<usize> {
        Ok(self.field(field_no)?.length)
    }

    /// Byte offset of a field within the record content, i.e. the sum of
    /// all field lengths before it.
    pub fn offset_of(&self, field_no: usize) -> Result<usize> {
        if field_no >= self.fields.len() {
            return Err(DbError::Format(format!("no field at position {field_no}")));
        }
        Ok(self.fields[..field_no].iter().map(|f| f.length).sum())
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| DbError::Format(format!("no field named '{name}'")))
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Total record content length R: the sum of every field length.
    pub fn total_length(&self) -> usize {
        self.fields.iter().map(|f| f.length).sum()
    }

    /// Replace the field at `field_no` with `new_fields`, inserted in order
    /// at its position. The replacement fields must cover exactly the
    /// original field's bytes; offsets of all later fields are unchanged.
    ///
    /// This is a view change only. Returns false (and leaves the schema
    /// untouched) when the lengths do not add up.
    pub fn split_field(&mut self, field_no: usize, new_fields: Vec<FieldDef>) -> bool {
        let Some(original) = self.fields.get(field_no) else {
            return false;
        };

        let new_total: usize = new_fields.iter().map(|f| f.length).sum();
        if new_total != original.length {
            return false;
        }

        self.fields.splice(field_no..=field_no, new_fields);
        true
    }
}

fn read_section_bytes<R: io::Read>(input: &mut R, buf: &mut [u8]) -> Result<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            DbError::Format("data file truncated inside the schema section".into())
        }
        _ => DbError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> FileSchema {
        FileSchema::new(vec![
            FieldDef::new("name", 64),
            FieldDef::new("location", 64),
            FieldDef::new("size", 4),
        ])
    }

    fn schema_section_bytes(fields: &[(&str, u16)]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (name, len) in fields {
            buf.extend_from_slice(&codec::encode_u16(name.len() as u16));
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(&codec::encode_u16(*len));
        }
        buf
    }

    #[test]
    fn test_raw_header_parse() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        bytes.extend_from_slice(&codec::encode_u32(132));
        bytes.extend_from_slice(&codec::encode_u16(3));

        let header = RawHeader::parse(&bytes).unwrap();
        assert_eq!(header.magic(), [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(header.record_length(), 132);
        assert_eq!(header.field_count(), 3);
    }

    #[test]
    fn test_raw_header_rejects_short_buffer() {
        assert!(RawHeader::parse(&[0u8; 9]).is_err());
    }

    #[test]
    fn test_parse_schema_section() {
        let bytes = schema_section_bytes(&[("name", 64), ("location", 64), ("size", 4)]);
        let schema = FileSchema::parse(&mut bytes.as_slice(), 3, Charset::UsAscii).unwrap();

        assert_eq!(schema.field_count(), 3);
        assert_eq!(schema.total_length(), 132);
        assert_eq!(schema.field_length(1).unwrap(), 64);
        assert_eq!(schema.index_of("size").unwrap(), 2);
        assert!(schema.contains_field("location"));
        assert!(!schema.contains_field("room"));
    }

    #[test]
    fn test_parse_truncated_schema_section_fails() {
        let mut bytes = schema_section_bytes(&[("name", 64)]);
        bytes.truncate(bytes.len() - 1);
        let err = FileSchema::parse(&mut bytes.as_slice(), 1, Charset::UsAscii).unwrap_err();
        assert!(matches!(err, DbError::Format(_)));
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let schema = sample_schema();
        assert_eq!(schema.offset_of(0).unwrap(), 0);
        assert_eq!(schema.offset_of(1).unwrap(), 64);
        assert_eq!(schema.offset_of(2).unwrap(), 128);
        assert!(schema.offset_of(3).is_err());
    }

    #[test]
    fn test_split_field() {
        let mut schema = sample_schema();
        let ok = schema.split_field(
            0,
            vec![FieldDef::new("name", 56), FieldDef::new("room", 8)],
        );

        assert!(ok);
        assert_eq!(schema.field_count(), 4);
        assert_eq!(schema.total_length(), 132);
        assert_eq!(schema.index_of("room").unwrap(), 1);
        assert_eq!(schema.offset_of(1).unwrap(), 56);
        // later fields keep their absolute offsets
        assert_eq!(schema.offset_of(2).unwrap(), 64);
    }

    #[test]
    fn test_split_field_rejects_length_mismatch() {
        let mut schema = sample_schema();
        let ok = schema.split_field(
            0,
            vec![FieldDef::new("name", 56), FieldDef::new("room", 9)],
        );

        assert!(!ok);
        assert_eq!(schema.field_count(), 3);
        assert_eq!(schema.field_length(0).unwrap(), 64);
    }

    #[test]
    fn test_split_field_out_of_range() {
        let mut schema = sample_schema();
        assert!(!schema.split_field(5, vec![FieldDef::new("x", 64)]));
    }
}
