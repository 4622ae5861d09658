//! # Data File
//!
//! `DataFile` owns the single on-disk data file and encapsulates every byte
//! of I/O against it. The file is opened read/write, its header and schema
//! section are parsed and validated once, and from then on the data section
//! is addressed purely by slot arithmetic:
//!
//! ```text
//! slot n starts at   data_start + n * (1 + R)
//! ```
//!
//! where R is the record length declared by the header and the extra byte
//! is the deletion flag.
//!
//! ## Concurrency
//!
//! Every public method locks one internal mutex around the whole
//! seek-then-transfer sequence, so a reader can never observe the file
//! position left behind by a concurrent writer. There is no finer-grained
//! locking at this layer; record-level coordination is the lock manager's
//! job.
//!
//! ## Validation at Open
//!
//! - the header prelude and every schema entry must be fully present;
//! - the header's record length must equal the sum of the schema's field
//!   lengths.
//!
//! Violations are `Format` errors and the file is refused. The magic cookie
//! is preserved but deliberately not validated; legacy files carry several
//! cookies.
//!
//! ## Durability
//!
//! Writes are best-effort: the file is not synced on every commit. This
//! matches the legacy engine being reimplemented.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::codec::Charset;
use crate::error::{DbError, Result};
use crate::schema::{FieldDef, FileSchema, RawHeader, HEADER_LEN};
use crate::storage::record::{Record, RecordBlock, DELETED_FLAG, LIVE_FLAG};

/// Parsed header state. The field count is updated in memory by
/// `split_field` and never written back.
#[derive(Debug, Clone)]
pub struct FileHeader {
    magic: [u8; 4],
    record_length: u32,
    field_count: u16,
}

impl FileHeader {
    pub fn magic(&self) -> [u8; 4] {
        self.magic
    }

    pub fn record_length(&self) -> u32 {
        self.record_length
    }

    pub fn field_count(&self) -> u16 {
        self.field_count
    }
}

/// Random-access handle to the data file.
#[derive(Debug)]
pub struct DataFile {
    file: Mutex<std::fs::File>,
    header: FileHeader,
    schema: FileSchema,
    charset: Charset,
    data_start: u64,
    slot_length: usize,
}

impl DataFile {
    /// Open an existing data file, parse its header and schema section and
    /// validate the structural invariants.
    pub fn open<P: AsRef<Path>>(path: P, charset: Charset) -> Result<DataFile> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        let mut prelude = [0u8; HEADER_LEN];
        file.read_exact(&mut prelude).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                DbError::Format("data file truncated inside the header".into())
            } else {
                DbError::Io(e)
            }
        })?;
        let raw = RawHeader::parse(&prelude)?;

        let schema = FileSchema::parse(&mut file, raw.field_count() as usize, charset)?;

        if raw.record_length() as usize != schema.total_length() {
            return Err(DbError::Format(format!(
                "header declares record length {} but schema fields sum to {}",
                raw.record_length(),
                schema.total_length()
            )));
        }

        let data_start = file.stream_position()?;
        let slot_length = 1 + raw.record_length() as usize;

        Ok(DataFile {
            file: Mutex::new(file),
            header: FileHeader {
                magic: raw.magic(),
                record_length: raw.record_length(),
                field_count: raw.field_count(),
            },
            schema,
            charset,
            data_start,
            slot_length,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn schema(&self) -> &FileSchema {
        &self.schema
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Bytes one slot occupies on disk (deletion flag + record content).
    pub fn slot_length(&self) -> usize {
        self.slot_length
    }

    /// A live, zeroed record sized for this file.
    pub fn empty_record(&self) -> Record {
        Record::empty(self.schema.total_length())
    }

    fn slot_offset(&self, record_no: u32) -> u64 {
        self.data_start + record_no as u64 * self.slot_length as u64
    }

    /// Fetch one record. Returns None when the slot is deleted or lies past
    /// the end of the file.
    pub fn record(&self, record_no: u32) -> Result<Option<Record>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.slot_offset(record_no)))?;

        let mut slot = vec![0u8; self.slot_length];
        match file.read_exact(&mut slot) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(DbError::Io(e)),
        }

        let record = Record::from_slot(&slot)?;
        Ok(if record.is_deleted() { None } else { Some(record) })
    }

    /// Fetch up to `max_records` consecutive slots starting at `from` with
    /// one buffered read. Returns None when `from` is at or past EOF. A
    /// read that ends inside a slot is a format error, not a short result.
    pub fn read_block(&self, from: u32, max_records: usize) -> Result<Option<RecordBlock>> {
        let mut buf = vec![0u8; self.slot_length * max_records];

        let filled = {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.slot_offset(from)))?;
            read_fill(&mut *file, &mut buf)?
        };

        if filled == 0 {
            return Ok(None);
        }
        if filled % self.slot_length != 0 {
            return Err(DbError::Format(format!(
                "data section ends mid-slot: {} trailing bytes",
                filled % self.slot_length
            )));
        }

        buf.truncate(filled);
        Ok(Some(RecordBlock::new(buf, self.slot_length)?))
    }

    /// Append a record into the first deleted slot, or at EOF when every
    /// slot is live. The written slot is always flagged live. Returns the
    /// chosen record number.
    pub fn append(&self, record: &Record) -> Result<u32> {
        let mut file = self.file.lock();

        // walk the file for the first reusable slot
        file.seek(SeekFrom::Start(self.data_start))?;
        let mut record_no: u32 = 0;
        let mut slot = vec![0u8; self.slot_length];
        loop {
            match file.read_exact(&mut slot) {
                Ok(()) if slot[0] == DELETED_FLAG => break,
                Ok(()) => record_no += 1,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(DbError::Io(e)),
            }
        }

        let mut bytes = record.to_slot_bytes();
        bytes[0] = LIVE_FLAG;
        file.seek(SeekFrom::Start(self.slot_offset(record_no)))?;
        file.write_all(&bytes)?;
        Ok(record_no)
    }

    /// Overwrite slot `record_no` with `record`, preserving the record's
    /// own deletion flag.
    pub fn write(&self, record_no: u32, record: &Record) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.slot_offset(record_no)))?;
        file.write_all(&record.to_slot_bytes())?;
        Ok(())
    }

    /// Flip the deletion flag of slot `record_no` to deleted.
    pub fn delete(&self, record_no: u32) -> Result<()> {
        let mut file = self.file.lock();
        let offset = self.slot_offset(record_no);

        file.seek(SeekFrom::Start(offset))?;
        let mut slot = vec![0u8; self.slot_length];
        file.read_exact(&mut slot)?;

        let mut record = Record::from_slot(&slot)?;
        record.mark_deleted();

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&record.to_slot_bytes())?;
        Ok(())
    }

    /// Split one physical field into several contiguous sub-fields. This is
    /// a pure view change: the file is never rewritten, and the in-memory
    /// field count grows to match. Returns false when the replacement
    /// lengths do not cover the original field exactly.
    pub fn split_field(&mut self, field_no: usize, new_fields: Vec<FieldDef>) -> bool {
        let added = new_fields.len();
        if !self.schema.split_field(field_no, new_fields) {
            return false;
        }
        self.header.field_count += added as u16 - 1;
        true
    }
}

fn read_fill<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(count) => filled += count,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DbError::Io(e)),
        }
    }
    Ok(filled)
}
