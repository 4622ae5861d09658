//! # Storage Layer
//!
//! Slot-level access to the data file. [`Record`] is the in-memory image of
//! one slot (deletion flag + fixed-width content); [`RecordBlock`] is one
//! buffered read worth of consecutive slots; [`DataFile`] owns the file
//! handle and serializes every seek-and-transfer pair behind one mutex.

pub mod data_file;
pub mod record;

pub use data_file::DataFile;
pub use record::{Record, RecordBlock, DELETED_FLAG, LIVE_FLAG};
