//! Append-only record log.
//!
//! Records are only ever appended; the two status bytes in each record
//! header are the only bytes ever rewritten in place. Deleting a record
//! leaves its bytes as dead space in the log.

use std::io::{self, ErrorKind};

use tracing::{debug, trace};

use crate::error::{DbError, Result};
use crate::io::file::{FileIo, OpenMode};
use crate::storage::layout::{LogEntryHeader, LogFileHeader, LOG_VERSION, MAGIC};

#[derive(Debug)]
pub struct LogStore<F: FileIo> {
    io: F,
    name: String,
}

impl<F: FileIo> LogStore<F> {
    pub fn new(io: F, name: &str) -> Self {
        LogStore {
            io,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loads and validates the log header, creating the file when absent.
    ///
    /// Files that exist but do not start with a valid header (including
    /// pre-header files shorter than six bytes) are rejected.
    pub fn open_or_create(&mut self) -> Result<()> {
        match self.io.open(&self.name, OpenMode::Read) {
            Ok(()) => {
                let mut buf = [0u8; LogFileHeader::SIZE];
                let res = self.io.read(&mut buf);
                self.io.close();
                res?;
                // a short read leaves zeros behind, which fail the magic check
                let header = LogFileHeader::decode(&buf)?;
                if header.magic != MAGIC {
                    return Err(DbError::BadMagic {
                        found: header.magic,
                    });
                }
                if header.version != LOG_VERSION {
                    return Err(DbError::BadVersion {
                        found: header.version,
                    });
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file = %self.name, "log file absent, creating");
                self.create()
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(&mut self) -> Result<()> {
        self.io.open(&self.name, OpenMode::WriteNew)?;
        let res = write_all(&mut self.io, &LogFileHeader::new().encode());
        self.io.close();
        res
    }

    /// Appends one record and returns the absolute offset of its header.
    ///
    /// On a short write the log may keep dead trailing bytes; the caller
    /// must not create an index entry for a failed append.
    pub fn append_record(&mut self, key: u32, record_type: u8, payload: &[u8]) -> Result<u32> {
        let length =
            u16::try_from(payload.len()).map_err(|_| DbError::PayloadTooLarge(payload.len()))?;

        match self.io.open(&self.name, OpenMode::ReadWrite) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.io.open(&self.name, OpenMode::ReadWriteCreate)?;
                if let Err(e) = write_all(&mut self.io, &LogFileHeader::new().encode()) {
                    self.io.close();
                    return Err(e);
                }
            }
            Err(e) => return Err(e.into()),
        }

        let header = LogEntryHeader {
            record_type,
            length,
            key,
            status: 0,
            internal_status: 0,
        };
        let res = (|io: &mut F| -> Result<u32> {
            io.seek_to_end()?;
            let offset = io.tell()?;
            write_all(io, &header.encode())?;
            write_all(io, payload)?;
            Ok(offset)
        })(&mut self.io);
        self.io.close();
        if let Ok(offset) = res {
            trace!(key, offset, length, "appended log record");
        }
        res
    }

    /// Rewrites the caller-visible status byte of the record at `offset`.
    pub fn patch_status(&mut self, offset: u32, status: u8) -> Result<()> {
        self.patch_byte(offset + LogEntryHeader::STATUS_AT, status)
    }

    /// Rewrites the internal status byte of the record at `offset`.
    pub fn patch_internal_status(&mut self, offset: u32, internal_status: u8) -> Result<()> {
        self.patch_byte(offset + LogEntryHeader::INTERNAL_STATUS_AT, internal_status)
    }

    fn patch_byte(&mut self, at: u32, value: u8) -> Result<()> {
        self.io.open(&self.name, OpenMode::ReadWrite)?;
        let res = (|io: &mut F| -> Result<()> {
            io.seek(at)?;
            write_all(io, &[value])
        })(&mut self.io);
        self.io.close();
        res
    }

    /// Reads the record at `offset` into `buf`, returning its header and
    /// payload length. `buf` is untouched when the payload does not fit.
    pub fn read_record(&mut self, offset: u32, buf: &mut [u8]) -> Result<(LogEntryHeader, usize)> {
        self.io.open(&self.name, OpenMode::Read)?;
        let res = (|io: &mut F| -> Result<(LogEntryHeader, usize)> {
            io.seek(offset)?;
            let mut head = [0u8; LogEntryHeader::SIZE];
            read_exact(io, &mut head)?;
            let header = LogEntryHeader::decode(&head)?;
            let length = header.length as usize;
            if length > buf.len() {
                return Err(DbError::BufferTooSmall {
                    needed: length,
                    capacity: buf.len(),
                });
            }
            read_exact(io, &mut buf[..length])?;
            Ok((header, length))
        })(&mut self.io);
        self.io.close();
        res
    }
}

fn write_all<F: FileIo>(io: &mut F, bytes: &[u8]) -> Result<()> {
    let n = io.write(bytes)?;
    if n != bytes.len() {
        return Err(DbError::Io(io::Error::new(
            ErrorKind::WriteZero,
            "short write to log file",
        )));
    }
    Ok(())
}

fn read_exact<F: FileIo>(io: &mut F, buf: &mut [u8]) -> Result<()> {
    let n = io.read(buf)?;
    if n != buf.len() {
        return Err(DbError::Io(io::Error::new(
            ErrorKind::UnexpectedEof,
            "truncated log record",
        )));
    }
    Ok(())
}
