//! On-disk formats shared by the log and index files.
//!
//! Everything is packed little-endian with no padding; fields are unaligned
//! (`length` sits at byte 1 of the log entry header), so each struct is
//! encoded and decoded field by field rather than cast.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Result};

/// Magic number shared by both files ("LOGS" in little-endian).
pub const MAGIC: u32 = 0x5347_4F4C;
/// Log file format version.
pub const LOG_VERSION: u16 = 0x0001;
/// Index file format version.
pub const INDEX_VERSION: u16 = 0x0001;

/// Entries per index page, on disk and in memory.
pub const PAGE_CAPACITY: usize = 256;
/// 8.3 file name plus terminator.
pub const MAX_FILENAME_LENGTH: usize = 13;
/// Deletion flag in `internal_status`.
pub const INTERNAL_STATUS_DELETED: u8 = 0x01;

/// Header at offset 0 of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFileHeader {
    pub magic: u32,
    pub version: u16,
}

impl LogFileHeader {
    pub const SIZE: usize = 6;

    pub fn new() -> Self {
        LogFileHeader {
            magic: MAGIC,
            version: LOG_VERSION,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        (&mut buf[0..4]).write_u32::<LittleEndian>(self.magic).unwrap();
        (&mut buf[4..6]).write_u16::<LittleEndian>(self.version).unwrap();
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut rdr = Cursor::new(buf);
        Ok(LogFileHeader {
            magic: rdr.read_u32::<LittleEndian>()?,
            version: rdr.read_u16::<LittleEndian>()?,
        })
    }
}

impl Default for LogFileHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Header at offset 0 of the index file. `count` is the authoritative
/// number of index entries (live and tombstoned).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFileHeader {
    pub magic: u32,
    pub version: u16,
    pub count: u32,
}

impl IndexFileHeader {
    pub const SIZE: usize = 10;

    pub fn new(count: u32) -> Self {
        IndexFileHeader {
            magic: MAGIC,
            version: INDEX_VERSION,
            count,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        (&mut buf[0..4]).write_u32::<LittleEndian>(self.magic).unwrap();
        (&mut buf[4..6]).write_u16::<LittleEndian>(self.version).unwrap();
        (&mut buf[6..10]).write_u32::<LittleEndian>(self.count).unwrap();
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut rdr = Cursor::new(buf);
        Ok(IndexFileHeader {
            magic: rdr.read_u32::<LittleEndian>()?,
            version: rdr.read_u16::<LittleEndian>()?,
            count: rdr.read_u32::<LittleEndian>()?,
        })
    }
}

/// Fixed header preceding every record payload in the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntryHeader {
    pub record_type: u8,
    /// Payload bytes, excluding this header.
    pub length: u16,
    pub key: u32,
    /// Caller-visible status, untouched by the engine.
    pub status: u8,
    /// Engine bookkeeping, bit 0 = deleted.
    pub internal_status: u8,
}

impl LogEntryHeader {
    pub const SIZE: usize = 9;
    /// Byte offset of `status` from the start of the record.
    pub const STATUS_AT: u32 = 7;
    /// Byte offset of `internal_status` from the start of the record.
    pub const INTERNAL_STATUS_AT: u32 = 8;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.record_type;
        (&mut buf[1..3]).write_u16::<LittleEndian>(self.length).unwrap();
        (&mut buf[3..7]).write_u32::<LittleEndian>(self.key).unwrap();
        buf[7] = self.status;
        buf[8] = self.internal_status;
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let record_type = buf[0];
        let mut rdr = Cursor::new(&buf[1..7]);
        let length = rdr.read_u16::<LittleEndian>()?;
        let key = rdr.read_u32::<LittleEndian>()?;
        Ok(LogEntryHeader {
            record_type,
            length,
            key,
            status: buf[7],
            internal_status: buf[8],
        })
    }
}

/// One slot of the sorted index: key, log offset and the two mirrored
/// status bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: u32,
    /// Absolute byte offset of the record header in the log file.
    pub offset: u32,
    pub status: u8,
    pub internal_status: u8,
}

impl IndexEntry {
    pub const SIZE: usize = 10;

    pub fn is_deleted(&self) -> bool {
        self.internal_status & INTERNAL_STATUS_DELETED != 0
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        (&mut buf[0..4]).write_u32::<LittleEndian>(self.key).unwrap();
        (&mut buf[4..8]).write_u32::<LittleEndian>(self.offset).unwrap();
        buf[8] = self.status;
        buf[9] = self.internal_status;
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut rdr = Cursor::new(&buf[0..8]);
        Ok(IndexEntry {
            key: rdr.read_u32::<LittleEndian>()?,
            offset: rdr.read_u32::<LittleEndian>()?,
            status: buf[8],
            internal_status: buf[9],
        })
    }
}
