//! In-memory [`FileIo`] implementation for host-side tests and simulation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use crate::io::file::{FileIo, OpenMode};

/// A shared map of named byte files. Handles created from the same `MemFs`
/// see the same data, so a database survives engine close and reopen
/// without touching a real filesystem.
#[derive(Clone, Default, Debug)]
pub struct MemFs {
    files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MemFileIo {
        MemFileIo {
            fs: self.clone(),
            open: None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.borrow().contains_key(name)
    }

    /// Snapshot of a file's bytes, for byte-level assertions.
    pub fn bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(name).cloned()
    }
}

#[derive(Debug)]
struct OpenState {
    name: String,
    pos: usize,
    mode: OpenMode,
}

/// One open-file cursor over a [`MemFs`].
#[derive(Debug)]
pub struct MemFileIo {
    fs: MemFs,
    open: Option<OpenState>,
}

impl MemFileIo {
    fn state(&mut self) -> io::Result<&mut OpenState> {
        self.open
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no file open"))
    }
}

impl FileIo for MemFileIo {
    fn open(&mut self, name: &str, mode: OpenMode) -> io::Result<()> {
        let mut files = self.fs.files.borrow_mut();
        match mode {
            OpenMode::Read | OpenMode::ReadWrite => {
                if !files.contains_key(name) {
                    return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
                }
            }
            OpenMode::WriteNew => {
                files.insert(name.to_string(), Vec::new());
            }
            OpenMode::ReadWriteCreate => {
                files.entry(name.to_string()).or_default();
            }
        }
        self.open = Some(OpenState {
            name: name.to_string(),
            pos: 0,
            mode,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn seek(&mut self, offset: u32) -> io::Result<()> {
        self.state()?.pos = offset as usize;
        Ok(())
    }

    fn seek_to_end(&mut self) -> io::Result<()> {
        let name = self.state()?.name.clone();
        let len = self.fs.files.borrow()[&name].len();
        self.state()?.pos = len;
        Ok(())
    }

    fn tell(&mut self) -> io::Result<u32> {
        let pos = self.state()?.pos;
        u32::try_from(pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file position overflow"))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (name, pos, mode) = {
            let state = self.state()?;
            (state.name.clone(), state.pos, state.mode)
        };
        if mode == OpenMode::WriteNew {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file open write-only",
            ));
        }
        let n = {
            let files = self.fs.files.borrow();
            let data = &files[&name];
            if pos >= data.len() {
                0
            } else {
                let n = buf.len().min(data.len() - pos);
                buf[..n].copy_from_slice(&data[pos..pos + n]);
                n
            }
        };
        self.state()?.pos = pos + n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (name, pos, mode) = {
            let state = self.state()?;
            (state.name.clone(), state.pos, state.mode)
        };
        if mode == OpenMode::Read {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file open read-only",
            ));
        }
        let end = pos + buf.len();
        {
            let mut files = self.fs.files.borrow_mut();
            let data = files.get_mut(&name).expect("open file vanished");
            // writes past the end zero-fill the gap, like extending a real file
            if pos > data.len() {
                data.resize(pos, 0);
            }
            if end > data.len() {
                data.resize(end, 0);
            }
            data[pos..end].copy_from_slice(buf);
        }
        self.state()?.pos = end;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_mode_requires_existing_file() {
        let fs = MemFs::new();
        let mut io = fs.handle();
        let err = io.open("a.bin", OpenMode::Read).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(io.open("a.bin", OpenMode::ReadWriteCreate).is_ok());
        assert!(fs.contains("a.bin"));
    }

    #[test]
    fn sparse_write_zero_fills() {
        let fs = MemFs::new();
        let mut io = fs.handle();
        io.open("s.bin", OpenMode::ReadWriteCreate).unwrap();
        io.seek(4).unwrap();
        io.write(&[0xAA]).unwrap();
        io.close();
        assert_eq!(fs.bytes("s.bin").unwrap(), vec![0, 0, 0, 0, 0xAA]);
    }

    #[test]
    fn handles_share_one_namespace() {
        let fs = MemFs::new();
        let mut a = fs.handle();
        a.open("x.bin", OpenMode::WriteNew).unwrap();
        a.write(b"hi").unwrap();
        a.close();

        let mut b = fs.handle();
        b.open("x.bin", OpenMode::Read).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(b.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn mode_violations_are_rejected() {
        let fs = MemFs::new();
        let mut io = fs.handle();
        io.open("m.bin", OpenMode::WriteNew).unwrap();
        assert!(io.read(&mut [0u8; 1]).is_err());
        io.close();
        io.open("m.bin", OpenMode::Read).unwrap();
        assert!(io.write(&[1]).is_err());
    }
}
