//! # Engine Operation Tests
//!
//! Single-threaded, end-to-end coverage of the eight engine primitives
//! against real data files:
//!
//! 1. Create/read round trips on the legacy booking layout, including the
//!    in-memory split of the wide name field into name + room
//! 2. Prefix and primary-key search, with and without index hits
//! 3. Transactional staging: invisibility before unlock, last-update-wins,
//!    delete-wins, primary-key-change rejection
//! 4. Format validation: header mismatches, mid-slot truncation, charset
//! 5. Bit-exactness: opening and closing a file must not move a single byte
//!
//! The fixture files use the legacy on-disk layout: seven physical fields
//! where the 64-byte `name` field carries the room number in its tail, and
//! the engine's logical schema splits it into name(56) + room(8).

use std::path::{Path, PathBuf};

use slotdb::{codec, CallerId, Column, Database, DbError, TableSchema};
use tempfile::TempDir;

const MAGIC: [u8; 4] = [0x00, 0x00, 0x02, 0x03];

/// The legacy physical layout: R = 159, slot = 160 bytes.
const FILE_FIELDS: &[(&str, u16)] = &[
    ("name", 64),
    ("location", 64),
    ("size", 4),
    ("smoking", 1),
    ("rate", 8),
    ("date", 10),
    ("owner", 8),
];

/// Logical column widths, in order. name + room overlay the physical name.
const COLUMN_WIDTHS: [usize; 8] = [56, 8, 64, 4, 1, 8, 10, 8];

fn booking_schema() -> TableSchema {
    TableSchema::new(vec![
        Column::primary_key("name", 56),
        Column::primary_key("room", 8),
        Column::primary_key("location", 64),
        Column::new("size", 4),
        Column::new("smoking", 1),
        Column::new("rate", 8),
        Column::new("date", 10),
        Column::new("owner", 8),
    ])
}

fn padded(value: &str, width: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; width];
    let raw = value.as_bytes();
    bytes[..raw.len()].copy_from_slice(raw);
    bytes
}

/// Write a data file holding `rows` (given as logical column values) with
/// the slots listed in `deleted` flagged as deleted.
fn write_data_file(path: &Path, rows: &[[&str; 8]], deleted: &[usize]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC);
    let record_length: u32 = FILE_FIELDS.iter().map(|(_, len)| *len as u32).sum();
    bytes.extend_from_slice(&codec::encode_u32(record_length));
    bytes.extend_from_slice(&codec::encode_u16(FILE_FIELDS.len() as u16));
    for (name, length) in FILE_FIELDS {
        bytes.extend_from_slice(&codec::encode_u16(name.len() as u16));
        bytes.extend_from_slice(name.as_bytes());
        bytes.extend_from_slice(&codec::encode_u16(*length));
    }

    for (slot, row) in rows.iter().enumerate() {
        bytes.push(if deleted.contains(&slot) { 0x01 } else { 0x00 });
        for (value, width) in row.iter().zip(COLUMN_WIDTHS) {
            bytes.extend_from_slice(&padded(value, width));
        }
    }

    std::fs::write(path, &bytes).unwrap();
}

fn fixture(dir: &TempDir, rows: &[[&str; 8]], deleted: &[usize]) -> PathBuf {
    let path = dir.path().join("bookings.db");
    write_data_file(&path, rows, deleted);
    path
}

fn open(path: &Path) -> Database {
    Database::open(path, booking_schema()).unwrap()
}

fn row(values: [&str; 8]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

const PALACE: [&str; 8] = [
    "Palace",
    "101",
    "Smallville",
    "2",
    "Y",
    "$150.00",
    "2005/07/27",
    "",
];

mod create_and_read {
    use super::*;

    #[test]
    fn create_into_empty_file_returns_slot_zero() {
        let dir = TempDir::new().unwrap();
        let db = open(&fixture(&dir, &[], &[]));

        let record = db.create(&row(PALACE)).unwrap();
        assert_eq!(record, 0);
        assert_eq!(db.read(0).unwrap(), row(PALACE));
    }

    #[test]
    fn create_rejects_duplicate_primary_key() {
        let dir = TempDir::new().unwrap();
        let db = open(&fixture(&dir, &[], &[]));
        db.create(&row(PALACE)).unwrap();

        // same name/room/location, different payload
        let clash = row([
            "Palace",
            "101",
            "Smallville",
            "4",
            "N",
            "$90.00",
            "2005/08/01",
            "ACME",
        ]);
        let err = db.create(&clash).unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey(_)));

        // a different room is a different key
        let mut other_room = PALACE;
        other_room[1] = "102";
        assert_eq!(db.create(&row(other_room)).unwrap(), 1);
    }

    #[test]
    fn create_reuses_first_deleted_slot() {
        let dir = TempDir::new().unwrap();
        let rows = [
            ["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""],
            ["Castle", "102", "Smallville", "4", "N", "$90.00", "2005/07/27", ""],
            ["Manor", "103", "Digitopolis", "6", "N", "$170.00", "2005/07/27", ""],
        ];
        let db = open(&fixture(&dir, &rows, &[1]));

        let mut fresh = PALACE;
        fresh[0] = "Lodge";
        let record = db.create(&row(fresh)).unwrap();
        assert_eq!(record, 1);

        // next create extends past the end
        let mut another = PALACE;
        another[0] = "Cabin";
        assert_eq!(db.create(&row(another)).unwrap(), 3);
    }

    #[test]
    fn a_slot_freed_by_delete_can_be_recreated_and_relocked() {
        let dir = TempDir::new().unwrap();
        let rows = [["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""]];
        let db = open(&fixture(&dir, &rows, &[]));

        let owner = CallerId::mint();
        db.lock(owner, 0).unwrap();
        db.delete(owner, 0).unwrap();
        db.unlock(owner, 0).unwrap();
        assert!(matches!(db.read(0), Err(DbError::RecordNotFound(_))));

        let record = db.create(&row(PALACE)).unwrap();
        assert_eq!(record, 0);
        assert!(!db.is_locked(0));

        let next = CallerId::mint();
        db.lock(next, 0).unwrap();
        db.unlock(next, 0).unwrap();
    }

    #[test]
    fn read_fails_for_deleted_and_missing_slots() {
        let dir = TempDir::new().unwrap();
        let rows = [["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""]];
        let db = open(&fixture(&dir, &rows, &[0]));

        assert!(matches!(db.read(0), Err(DbError::RecordNotFound(_))));
        assert!(matches!(db.read(42), Err(DbError::RecordNotFound(_))));
    }

    #[test]
    fn values_longer_than_a_column_are_truncated() {
        let dir = TempDir::new().unwrap();
        let db = open(&fixture(&dir, &[], &[]));

        let mut long_room = PALACE;
        long_room[1] = "123456789"; // room column is 8 bytes wide
        db.create(&row(long_room)).unwrap();
        assert_eq!(db.read(0).unwrap()[1], "12345678");
    }
}

mod find {
    use super::*;

    fn three_hotels(dir: &TempDir) -> Database {
        let rows = [
            ["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""],
            ["Palaver", "102", "Digitopolis", "4", "N", "$90.00", "2005/07/27", ""],
            ["Castle", "103", "Smallville", "6", "N", "$170.00", "2005/07/27", ""],
        ];
        open(&fixture(dir, &rows, &[]))
    }

    fn criteria(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(|s| s.to_string())).collect()
    }

    #[test]
    fn all_null_criteria_match_every_live_record() {
        let dir = TempDir::new().unwrap();
        let db = three_hotels(&dir);

        let matches = db.find(&criteria(&[None; 8])).unwrap();
        assert_eq!(matches, vec![0, 1, 2]);
    }

    #[test]
    fn prefix_criteria_narrow_the_result() {
        let dir = TempDir::new().unwrap();
        let db = three_hotels(&dir);

        let matches = db
            .find(&criteria(&[Some("Pal"), None, None, None, None, None, None, None]))
            .unwrap();
        assert_eq!(matches, vec![0, 1]);

        let matches = db
            .find(&criteria(&[Some("Pal"), Some("101"), None, None, None, None, None, None]))
            .unwrap();
        assert_eq!(matches, vec![0]);
    }

    #[test]
    fn criteria_may_be_shorter_than_the_column_count() {
        let dir = TempDir::new().unwrap();
        let db = three_hotels(&dir);

        let matches = db.find(&criteria(&[Some("Castle")])).unwrap();
        assert_eq!(matches, vec![2]);
    }

    #[test]
    fn full_primary_key_criteria_answer_from_the_index() {
        let dir = TempDir::new().unwrap();
        let db = three_hotels(&dir);

        let matches = db
            .find(&criteria(&[
                Some("Palaver"),
                Some("102"),
                Some("Digitopolis"),
                None,
                None,
                None,
                None,
                None,
            ]))
            .unwrap();
        assert_eq!(matches, vec![1]);
    }

    #[test]
    fn deleted_records_never_match() {
        let dir = TempDir::new().unwrap();
        let rows = [
            ["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""],
            ["Palaver", "102", "Digitopolis", "4", "N", "$90.00", "2005/07/27", ""],
        ];
        let db = open(&fixture(&dir, &rows, &[0]));

        let matches = db.find(&criteria(&[Some("Pal")])).unwrap();
        assert_eq!(matches, vec![1]);
    }

    #[test]
    fn matching_nothing_is_an_error() {
        let dir = TempDir::new().unwrap();
        let db = three_hotels(&dir);

        let err = db.find(&criteria(&[Some("Ritz")])).unwrap_err();
        assert!(matches!(err, DbError::RecordNotFound(_)));

        // same contract on the full-primary-key path
        let err = db
            .find(&criteria(&[
                Some("Ritz"),
                Some("1"),
                Some("Nowhere"),
                None,
                None,
                None,
                None,
                None,
            ]))
            .unwrap_err();
        assert!(matches!(err, DbError::RecordNotFound(_)));
    }
}

mod staging {
    use super::*;

    fn one_palace(dir: &TempDir) -> Database {
        let rows = [["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""]];
        open(&fixture(dir, &rows, &[]))
    }

    fn updated_palace() -> Vec<String> {
        row([
            "Palace",
            "101",
            "Smallville",
            "4",
            "N",
            "$200.00",
            "2005/09/01",
            "BLOGGS",
        ])
    }

    #[test]
    fn staged_update_is_invisible_until_unlock() {
        let dir = TempDir::new().unwrap();
        let db = one_palace(&dir);
        let owner = CallerId::mint();

        db.lock(owner, 0).unwrap();
        db.update(owner, 0, &updated_palace()).unwrap();
        assert_eq!(db.read(0).unwrap(), row(PALACE), "read must see committed state");

        db.unlock(owner, 0).unwrap();
        assert_eq!(db.read(0).unwrap(), updated_palace());
    }

    #[test]
    fn last_staged_update_wins() {
        let dir = TempDir::new().unwrap();
        let db = one_palace(&dir);
        let owner = CallerId::mint();

        let mut first = updated_palace();
        first[7] = "SMITH".to_string();

        db.lock(owner, 0).unwrap();
        db.update(owner, 0, &first).unwrap();
        db.update(owner, 0, &updated_palace()).unwrap();
        db.unlock(owner, 0).unwrap();

        assert_eq!(db.read(0).unwrap(), updated_palace());
    }

    #[test]
    fn staged_delete_wins_over_later_updates() {
        let dir = TempDir::new().unwrap();
        let db = one_palace(&dir);
        let owner = CallerId::mint();

        db.lock(owner, 0).unwrap();
        db.delete(owner, 0).unwrap();
        db.update(owner, 0, &updated_palace()).unwrap();
        db.unlock(owner, 0).unwrap();

        assert!(matches!(db.read(0), Err(DbError::RecordNotFound(_))));
    }

    #[test]
    fn unlock_without_staging_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, &[["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""]], &[]);
        let before = std::fs::read(&path).unwrap();

        let db = open(&path);
        let owner = CallerId::mint();
        db.lock(owner, 0).unwrap();
        db.unlock(owner, 0).unwrap();
        drop(db);

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn committing_a_primary_key_change_fails_and_leaves_the_slot_alone() {
        let dir = TempDir::new().unwrap();
        let db = one_palace(&dir);
        let owner = CallerId::mint();

        let mut renamed = PALACE;
        renamed[0] = "Castle";

        db.lock(owner, 0).unwrap();
        db.update(owner, 0, &row(renamed)).unwrap();
        let err = db.unlock(owner, 0).unwrap_err();

        assert!(matches!(err, DbError::Fatal(_)));
        assert_eq!(db.read(0).unwrap(), row(PALACE));
        // the lock is gone even though the commit failed
        assert!(!db.is_locked(0));
        let next = CallerId::mint();
        db.lock(next, 0).unwrap();
        db.unlock(next, 0).unwrap();
    }

    #[test]
    fn staging_requires_a_held_lock_owned_by_the_caller() {
        let dir = TempDir::new().unwrap();
        let db = one_palace(&dir);
        let owner = CallerId::mint();
        let stranger = CallerId::mint();

        // no lock at all
        assert!(matches!(
            db.update(owner, 0, &updated_palace()),
            Err(DbError::Transaction(_))
        ));
        assert!(matches!(db.delete(owner, 0), Err(DbError::Transaction(_))));
        assert!(matches!(db.unlock(owner, 0), Err(DbError::Transaction(_))));

        // lock held by someone else
        db.lock(owner, 0).unwrap();
        assert!(matches!(
            db.update(stranger, 0, &updated_palace()),
            Err(DbError::Transaction(_))
        ));
        assert!(matches!(db.unlock(stranger, 0), Err(DbError::Transaction(_))));
        assert!(db.is_locked(0), "a foreign unlock must not release the lock");

        db.unlock(owner, 0).unwrap();
        // the released transaction is dead for its former owner too
        assert!(matches!(db.delete(owner, 0), Err(DbError::Transaction(_))));
    }

    #[test]
    fn locking_a_missing_record_fails_fast() {
        let dir = TempDir::new().unwrap();
        let db = one_palace(&dir);
        let owner = CallerId::mint();

        assert!(matches!(db.lock(owner, 9), Err(DbError::RecordNotFound(_))));
        assert!(!db.is_locked(9));
    }

    #[test]
    fn is_locked_tracks_the_lock_lifecycle() {
        let dir = TempDir::new().unwrap();
        let db = one_palace(&dir);
        let owner = CallerId::mint();

        assert!(!db.is_locked(0));
        db.lock(owner, 0).unwrap();
        assert!(db.is_locked(0));
        db.unlock(owner, 0).unwrap();
        assert!(!db.is_locked(0));
    }
}

mod format {
    use super::*;

    #[test]
    fn opening_without_writes_leaves_the_file_byte_identical() {
        let dir = TempDir::new().unwrap();
        let rows = [
            ["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""],
            ["Castle", "102", "Digitopolis", "4", "N", "$90.00", "2005/07/27", ""],
        ];
        let path = fixture(&dir, &rows, &[1]);
        let before = std::fs::read(&path).unwrap();

        {
            let db = open(&path);
            db.read(0).unwrap();
            db.find(&[None, None, None, None, None, None, None, None]).unwrap();
        }

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn header_and_schema_length_disagreement_is_fatal_at_open() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, &[], &[]);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&codec::encode_u32(1000));
        std::fs::write(&path, &bytes).unwrap();

        let err = Database::open(&path, booking_schema()).unwrap_err();
        assert!(matches!(err, DbError::Format(_)));
    }

    #[test]
    fn a_file_ending_mid_slot_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let rows = [["Palace", "101", "Smallville", "2", "Y", "$150.00", "2005/07/27", ""]];
        let path = fixture(&dir, &rows, &[]);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        // the index-building scan runs at open and trips over the torn slot
        let err = Database::open(&path, booking_schema()).unwrap_err();
        assert!(matches!(err, DbError::Format(_)));
    }

    #[test]
    fn unsupported_charset_is_rejected_up_front() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, &[], &[]);

        let err = Database::builder()
            .path(&path)
            .table_schema(booking_schema())
            .charset("UTF-8")
            .open()
            .unwrap_err();
        assert!(matches!(err, DbError::Fatal(_)));
    }

    #[test]
    fn reopening_a_file_that_already_carries_the_split_columns_works() {
        // a newer-generation file that stores name(56) and room(8) as real
        // schema entries must open with no further splitting
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("split.db");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&codec::encode_u32(159));
        bytes.extend_from_slice(&codec::encode_u16(8));
        let fields: &[(&str, u16)] = &[
            ("name", 56),
            ("room", 8),
            ("location", 64),
            ("size", 4),
            ("smoking", 1),
            ("rate", 8),
            ("date", 10),
            ("owner", 8),
        ];
        for (name, length) in fields {
            bytes.extend_from_slice(&codec::encode_u16(name.len() as u16));
            bytes.extend_from_slice(name.as_bytes());
            bytes.extend_from_slice(&codec::encode_u16(*length));
        }
        std::fs::write(&path, &bytes).unwrap();

        let db = Database::open(&path, booking_schema()).unwrap();
        let record = db.create(&row(PALACE)).unwrap();
        assert_eq!(db.read(record).unwrap(), row(PALACE));
    }
}
