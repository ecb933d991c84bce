use logkv::error::DbError;
use logkv::io::file::{FileIo, OpenMode, StdFileIo};
use logkv::io::mem::MemFs;
use logkv::storage::layout::{LogEntryHeader, LogFileHeader};
use logkv::storage::log::LogStore;
use tempfile::tempdir;

#[test]
fn first_append_creates_file_with_header() {
    let fs = MemFs::new();
    let mut log = LogStore::new(fs.handle(), "t.log");

    let offset = log.append_record(7, 1, b"abc").unwrap();
    assert_eq!(offset as usize, LogFileHeader::SIZE);

    let bytes = fs.bytes("t.log").unwrap();
    assert_eq!(&bytes[0..4], &[0x4C, 0x4F, 0x47, 0x53]); // "LOGS"
    assert_eq!(&bytes[4..6], &[0x01, 0x00]);
    // record header: type, length, key, status, internal_status
    assert_eq!(bytes[6], 1);
    assert_eq!(&bytes[7..9], &[3, 0]);
    assert_eq!(&bytes[9..13], &[7, 0, 0, 0]);
    assert_eq!(&bytes[13..15], &[0, 0]);
    assert_eq!(&bytes[15..], b"abc");
}

#[test]
fn append_then_read_round_trips() {
    let fs = MemFs::new();
    let mut log = LogStore::new(fs.handle(), "t.log");

    let first = log.append_record(1, 2, b"hello").unwrap();
    let second = log.append_record(9, 3, b"world!").unwrap();
    assert!(second > first);

    let mut buf = [0u8; 16];
    let (header, len) = log.read_record(first, &mut buf).unwrap();
    assert_eq!(header.key, 1);
    assert_eq!(header.record_type, 2);
    assert_eq!(len, 5);
    assert_eq!(&buf[..len], b"hello");

    let (header, len) = log.read_record(second, &mut buf).unwrap();
    assert_eq!(header.key, 9);
    assert_eq!(&buf[..len], b"world!");
}

#[test]
fn status_patch_touches_exactly_one_byte() {
    let fs = MemFs::new();
    let mut log = LogStore::new(fs.handle(), "t.log");
    let offset = log.append_record(4, 1, b"payload").unwrap();

    let before = fs.bytes("t.log").unwrap();
    log.patch_status(offset, 0xAB).unwrap();
    let after = fs.bytes("t.log").unwrap();

    let patched = (offset + LogEntryHeader::STATUS_AT) as usize;
    for (i, (b, a)) in before.iter().zip(after.iter()).enumerate() {
        if i == patched {
            assert_eq!(*a, 0xAB);
        } else {
            assert_eq!(b, a, "byte {i} changed unexpectedly");
        }
    }
}

#[test]
fn internal_status_patch_is_adjacent_to_status() {
    let fs = MemFs::new();
    let mut log = LogStore::new(fs.handle(), "t.log");
    let offset = log.append_record(4, 1, b"x").unwrap();

    log.patch_internal_status(offset, 0x01).unwrap();
    let bytes = fs.bytes("t.log").unwrap();
    assert_eq!(bytes[(offset + LogEntryHeader::STATUS_AT) as usize], 0);
    assert_eq!(bytes[(offset + LogEntryHeader::INTERNAL_STATUS_AT) as usize], 0x01);

    let mut buf = [0u8; 4];
    let (header, _) = log.read_record(offset, &mut buf).unwrap();
    assert_eq!(header.internal_status, 0x01);
}

#[test]
fn read_into_too_small_buffer_leaves_it_untouched() {
    let fs = MemFs::new();
    let mut log = LogStore::new(fs.handle(), "t.log");
    let offset = log.append_record(2, 1, b"abcdef").unwrap();

    let mut buf = [0u8; 2];
    let err = log.read_record(offset, &mut buf).unwrap_err();
    assert!(matches!(
        err,
        DbError::BufferTooSmall {
            needed: 6,
            capacity: 2
        }
    ));
    assert_eq!(buf, [0, 0]);
}

#[test]
fn existing_valid_log_reopens() {
    let fs = MemFs::new();
    {
        let mut log = LogStore::new(fs.handle(), "t.log");
        log.append_record(1, 1, b"a").unwrap();
    }
    let mut log = LogStore::new(fs.handle(), "t.log");
    log.open_or_create().unwrap();
}

#[test]
fn garbage_log_file_is_rejected() {
    let fs = MemFs::new();
    let mut io = fs.handle();
    io.open("t.log", OpenMode::WriteNew).unwrap();
    io.write(b"junkfile").unwrap();
    io.close();

    let mut log = LogStore::new(fs.handle(), "t.log");
    let err = log.open_or_create().unwrap_err();
    assert!(matches!(err, DbError::BadMagic { .. }));
}

#[test]
fn pre_header_short_file_is_rejected() {
    let fs = MemFs::new();
    let mut io = fs.handle();
    io.open("t.log", OpenMode::WriteNew).unwrap();
    io.write(&[0x01]).unwrap();
    io.close();

    let mut log = LogStore::new(fs.handle(), "t.log");
    assert!(matches!(
        log.open_or_create().unwrap_err(),
        DbError::BadMagic { .. }
    ));
}

#[test]
fn wrong_version_is_rejected() {
    let fs = MemFs::new();
    let mut io = fs.handle();
    io.open("t.log", OpenMode::WriteNew).unwrap();
    let mut header = LogFileHeader::new().encode();
    header[4] = 0x99;
    io.write(&header).unwrap();
    io.close();

    let mut log = LogStore::new(fs.handle(), "t.log");
    assert!(matches!(
        log.open_or_create().unwrap_err(),
        DbError::BadVersion { found: 0x99 }
    ));
}

#[test]
fn oversized_payload_is_rejected_before_writing() {
    let fs = MemFs::new();
    let mut log = LogStore::new(fs.handle(), "t.log");
    let payload = vec![0u8; u16::MAX as usize + 1];
    let err = log.append_record(1, 1, &payload).unwrap_err();
    assert!(matches!(err, DbError::PayloadTooLarge(_)));
    assert!(!fs.contains("t.log"));
}

#[test]
fn works_against_real_files() {
    let dir = tempdir().unwrap();
    let mut log = LogStore::new(StdFileIo::new(dir.path()), "real.log");

    let offset = log.append_record(11, 5, b"on disk").unwrap();
    log.patch_status(offset, 0x42).unwrap();

    let mut log = LogStore::new(StdFileIo::new(dir.path()), "real.log");
    log.open_or_create().unwrap();
    let mut buf = [0u8; 16];
    let (header, len) = log.read_record(offset, &mut buf).unwrap();
    assert_eq!(header.status, 0x42);
    assert_eq!(&buf[..len], b"on disk");
}
