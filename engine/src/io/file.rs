//! Random-access file capability consumed by the engine.
//!
//! The engine opens, operates and closes on every disk-touching call, so an
//! implementation only has to hold one open file at a time. Offsets are
//! `u32` because the record format stores them as such.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Open modes, mirroring the stdio modes of FAT filesystem libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, read only ("rb").
    Read,
    /// Create or truncate for writing ("wb").
    WriteNew,
    /// Existing file, read and write ("rb+").
    ReadWrite,
    /// Read and write, created when missing.
    ReadWriteCreate,
}

/// Abstract byte-stream file access over a named file.
///
/// `read` and `write` report the number of bytes transferred; callers treat
/// a short count as a condition, not an error. Opening a missing file in
/// `Read` or `ReadWrite` mode fails with [`io::ErrorKind::NotFound`].
pub trait FileIo {
    fn open(&mut self, name: &str, mode: OpenMode) -> io::Result<()>;
    /// Idempotent.
    fn close(&mut self);
    fn seek(&mut self, offset: u32) -> io::Result<()>;
    fn seek_to_end(&mut self) -> io::Result<()>;
    fn tell(&mut self) -> io::Result<u32>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// [`FileIo`] backed by `std::fs`, rooted at a directory so the engine can
/// keep using bare 8.3-style names.
pub struct StdFileIo {
    root: PathBuf,
    file: Option<File>,
}

impl StdFileIo {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        StdFileIo {
            root: root.into(),
            file: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no file open"))
    }
}

impl FileIo for StdFileIo {
    fn open(&mut self, name: &str, mode: OpenMode) -> io::Result<()> {
        let path = self.root.join(name);
        let file = match mode {
            OpenMode::Read => OpenOptions::new().read(true).open(path)?,
            OpenMode::WriteNew => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(path)?,
            OpenMode::ReadWriteCreate => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?,
        };
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn seek(&mut self, offset: u32) -> io::Result<()> {
        self.file()?.seek(SeekFrom::Start(u64::from(offset)))?;
        Ok(())
    }

    fn seek_to_end(&mut self) -> io::Result<()> {
        self.file()?.seek(SeekFrom::End(0))?;
        Ok(())
    }

    fn tell(&mut self) -> io::Result<u32> {
        let pos = self.file()?.stream_position()?;
        u32::try_from(pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file position overflow"))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let file = self.file()?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write_all(buf)?;
        Ok(buf.len())
    }
}
