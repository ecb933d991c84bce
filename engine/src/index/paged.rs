//! Disk-backed sorted index, paged through a single in-memory page.
//!
//! The index file is a header followed by pages of `PAGE_CAPACITY` entries,
//! globally sorted by key. Position `g` lives on page `g / PAGE_CAPACITY`
//! at slot `g % PAGE_CAPACITY`, so every page except the last is exactly
//! full. At most one page is held in memory; mutations mark it dirty and
//! flushing is deferred until the page fills, another page is needed, or
//! the index is closed.

use std::io::{self, ErrorKind};

use tracing::{debug, trace};

use crate::error::{DbError, Result};
use crate::io::file::{FileIo, OpenMode};
use crate::storage::layout::{
    IndexEntry, IndexFileHeader, INDEX_VERSION, MAGIC, PAGE_CAPACITY,
};

const PAGE_BYTES: usize = PAGE_CAPACITY * IndexEntry::SIZE;

#[derive(Debug)]
pub struct PagedIndex<F: FileIo> {
    io: F,
    name: String,
    page: [IndexEntry; PAGE_CAPACITY],
    current_page: u32,
    page_loaded: bool,
    page_dirty: bool,
    count: u32,
}

impl<F: FileIo> PagedIndex<F> {
    pub fn new(io: F, name: &str) -> Self {
        PagedIndex {
            io,
            name: name.to_string(),
            page: [IndexEntry::default(); PAGE_CAPACITY],
            current_page: 0,
            page_loaded: false,
            page_dirty: false,
            count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total entries, live and tombstoned.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Pages implied by the current count.
    pub fn page_count(&self) -> u32 {
        self.count.div_ceil(PAGE_CAPACITY as u32)
    }

    /// Reads the header (absent file means an empty index), materialises a
    /// fresh index file when needed, and validates key order.
    pub fn open_or_create(&mut self) -> Result<()> {
        self.count = 0;
        self.current_page = 0;
        self.page_loaded = false;
        self.page_dirty = false;
        self.load_header()?;
        if self.count == 0 {
            self.save_header()?;
        }
        self.validate()
    }

    /// Flushes any dirty page. Call before dropping the index; `Db` wires
    /// this into its own close path.
    pub fn close(&mut self) -> Result<()> {
        self.flush_page()
    }

    fn load_header(&mut self) -> Result<()> {
        match self.io.open(&self.name, OpenMode::Read) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file = %self.name, "index file absent, starting empty");
                Ok(())
            }
            Err(e) => Err(e.into()),
            Ok(()) => {
                let mut buf = [0u8; IndexFileHeader::SIZE];
                let res = self.io.read(&mut buf);
                self.io.close();
                let n = res?;
                if n == 0 {
                    // zero-length file: not yet extended, same as absent
                    return Ok(());
                }
                let header = IndexFileHeader::decode(&buf)?;
                if header.magic != MAGIC {
                    return Err(DbError::BadMagic {
                        found: header.magic,
                    });
                }
                if header.version != INDEX_VERSION {
                    return Err(DbError::BadVersion {
                        found: header.version,
                    });
                }
                self.count = header.count;
                Ok(())
            }
        }
    }

    fn save_header(&mut self) -> Result<()> {
        match self.io.open(&self.name, OpenMode::ReadWrite) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.io.open(&self.name, OpenMode::WriteNew)?;
            }
            Err(e) => return Err(e.into()),
        }
        let header = IndexFileHeader::new(self.count);
        let res = (|io: &mut F| -> Result<()> {
            io.seek(0)?;
            write_all(io, &header.encode())
        })(&mut self.io);
        self.io.close();
        res
    }

    /// Entries stored on `page` according to the current count.
    fn entries_in_page(&self, page: u32) -> usize {
        let first = u64::from(page) * PAGE_CAPACITY as u64;
        let count = u64::from(self.count);
        if count <= first {
            0
        } else {
            ((count - first) as usize).min(PAGE_CAPACITY)
        }
    }

    fn page_offset(page: u32) -> Result<u32> {
        let off = IndexFileHeader::SIZE as u64 + u64::from(page) * PAGE_BYTES as u64;
        u32::try_from(off).map_err(|_| {
            DbError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                "index page offset overflow",
            ))
        })
    }

    /// Writes the used portion of the in-memory page, then rewrites the
    /// header so the on-disk count matches. No-op while clean.
    pub fn flush_page(&mut self) -> Result<()> {
        if !self.page_dirty {
            return Ok(());
        }
        let used = self.entries_in_page(self.current_page);
        trace!(page = self.current_page, used, "flushing index page");

        let mut buf = vec![0u8; used * IndexEntry::SIZE];
        for (i, entry) in self.page[..used].iter().enumerate() {
            entry.encode_into(&mut buf[i * IndexEntry::SIZE..(i + 1) * IndexEntry::SIZE]);
        }

        self.io.open(&self.name, OpenMode::ReadWrite)?;
        let offset = Self::page_offset(self.current_page)?;
        let res = (|io: &mut F| -> Result<()> {
            io.seek(offset)?;
            write_all(io, &buf)
        })(&mut self.io);
        self.io.close();
        res?;

        self.save_header()?;
        self.page_dirty = false;
        Ok(())
    }

    /// Loads `page` into memory, flushing the previous page first. Slots
    /// the file does not cover yet are zero-filled.
    pub fn load_page(&mut self, page: u32) -> Result<()> {
        self.flush_page()?;
        trace!(page, "loading index page");

        self.page = [IndexEntry::default(); PAGE_CAPACITY];
        let expected = self.entries_in_page(page);
        if expected > 0 {
            self.io.open(&self.name, OpenMode::Read)?;
            let offset = Self::page_offset(page)?;
            let mut buf = vec![0u8; expected * IndexEntry::SIZE];
            let res = (|io: &mut F| -> Result<usize> {
                io.seek(offset)?;
                io.read(&mut buf).map_err(DbError::from)
            })(&mut self.io);
            self.io.close();
            // a short read means the file has not been extended this far;
            // the zero-initialised remainder of `buf` stands in
            res?;
            for (i, slot) in self.page[..expected].iter_mut().enumerate() {
                *slot = IndexEntry::decode(&buf[i * IndexEntry::SIZE..(i + 1) * IndexEntry::SIZE])?;
            }
        }

        self.current_page = page;
        self.page_loaded = true;
        self.page_dirty = false;
        Ok(())
    }

    fn ensure_page(&mut self, page: u32) -> Result<()> {
        if self.page_loaded && self.current_page == page {
            return Ok(());
        }
        self.load_page(page)
    }

    /// Returns the entry at global position `global` by value.
    pub fn entry(&mut self, global: u32) -> Result<IndexEntry> {
        if global >= self.count {
            return Err(DbError::OutOfBounds {
                position: global,
                count: self.count,
            });
        }
        let page = global / PAGE_CAPACITY as u32;
        let slot = (global % PAGE_CAPACITY as u32) as usize;
        self.ensure_page(page)?;
        Ok(self.page[slot])
    }

    /// Overwrites the entry at `global` in memory and marks the page dirty.
    pub fn set_entry(&mut self, global: u32, entry: IndexEntry) -> Result<()> {
        if global >= self.count {
            return Err(DbError::OutOfBounds {
                position: global,
                count: self.count,
            });
        }
        let page = global / PAGE_CAPACITY as u32;
        let slot = (global % PAGE_CAPACITY as u32) as usize;
        self.ensure_page(page)?;
        self.page[slot] = entry;
        self.page_dirty = true;
        Ok(())
    }

    /// Smallest position whose key is `>= key`; `count` when none is.
    pub fn lower_bound(&mut self, key: u32) -> Result<u32> {
        let mut low = 0u32;
        let mut high = self.count;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.entry(mid)?.key < key {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        Ok(low)
    }

    /// Exact-match search. Tombstoned entries are still found; the caller
    /// decides what a tombstone means.
    pub fn search(&mut self, key: u32) -> Result<Option<u32>> {
        let pos = self.lower_bound(key)?;
        if pos < self.count && self.entry(pos)?.key == key {
            Ok(Some(pos))
        } else {
            Ok(None)
        }
    }

    /// Position of the smallest key `>= key`, if any.
    pub fn locate_key(&mut self, key: u32) -> Result<Option<u32>> {
        let pos = self.lower_bound(key)?;
        Ok((pos < self.count).then_some(pos))
    }

    pub fn next_key(&self, current: u32) -> Option<u32> {
        let next = current.checked_add(1)?;
        (next < self.count).then_some(next)
    }

    pub fn prev_key(&self, current: u32) -> Option<u32> {
        (current > 0 && current < self.count).then(|| current - 1)
    }

    /// Inserts a new entry in sorted position. The key must not already be
    /// present; tombstone revival bypasses insertion entirely and goes
    /// through [`set_entry`].
    pub fn insert(&mut self, key: u32, offset: u32, status: u8, internal_status: u8) -> Result<()> {
        let pos = self.lower_bound(key)?;
        if pos < self.count && self.entry(pos)?.key == key {
            return Err(DbError::DuplicateKey(key));
        }
        // also guard the slot below the insertion point
        if pos > 0 && self.entry(pos - 1)?.key == key {
            return Err(DbError::DuplicateKey(key));
        }

        let entry = IndexEntry {
            key,
            offset,
            status,
            internal_status,
        };
        let target = pos / PAGE_CAPACITY as u32;
        let slot = (pos % PAGE_CAPACITY as u32) as usize;
        self.ensure_page(target)?;
        let occupied = self.entries_in_page(target);

        if occupied < PAGE_CAPACITY {
            self.page.copy_within(slot..occupied, slot + 1);
            self.page[slot] = entry;
            self.count += 1;
            self.page_dirty = true;
            if occupied + 1 == PAGE_CAPACITY {
                self.flush_page()?;
            }
            Ok(())
        } else {
            self.spill_insert(target, slot, entry)
        }
    }

    /// Inserts into a full page by shifting it right and carrying its last
    /// entry into the successor page, cascading while successors are full.
    /// The carry walking off the last full page is what grows the index by
    /// a page. Keeps every page densely packed and globally sorted.
    fn spill_insert(&mut self, target: u32, slot: usize, entry: IndexEntry) -> Result<()> {
        debug!(page = target, slot, key = entry.key, "index page full, spilling forward");

        let mut carry = self.page[PAGE_CAPACITY - 1];
        self.page.copy_within(slot..PAGE_CAPACITY - 1, slot + 1);
        self.page[slot] = entry;
        self.page_dirty = true;

        let mut page = target + 1;
        loop {
            // occupancy before this insertion; count is bumped at the end
            let occupied = self.entries_in_page(page);
            self.ensure_page(page)?;
            if occupied == PAGE_CAPACITY {
                let next_carry = self.page[PAGE_CAPACITY - 1];
                self.page.copy_within(0..PAGE_CAPACITY - 1, 1);
                self.page[0] = carry;
                self.page_dirty = true;
                carry = next_carry;
                page += 1;
            } else {
                self.page.copy_within(0..occupied, 1);
                self.page[0] = carry;
                self.page_dirty = true;
                break;
            }
        }

        self.count += 1;
        self.flush_page()
    }

    /// Count of entries whose internal status has every bit of
    /// `must_be_set` set and every bit of `must_be_clear` clear.
    pub fn record_count(&mut self, must_be_set: u8, must_be_clear: u8) -> Result<u32> {
        let mut matched = 0;
        for i in 0..self.count {
            let entry = self.entry(i)?;
            if mask_matches(entry.internal_status, must_be_set, must_be_clear) {
                matched += 1;
            }
        }
        Ok(matched)
    }

    /// First entry in ascending order satisfying the internal status masks.
    pub fn first_matching(
        &mut self,
        must_be_set: u8,
        must_be_clear: u8,
    ) -> Result<Option<(u32, IndexEntry)>> {
        for i in 0..self.count {
            let entry = self.entry(i)?;
            if mask_matches(entry.internal_status, must_be_set, must_be_clear) {
                return Ok(Some((i, entry)));
            }
        }
        Ok(None)
    }

    /// Positions of up to `max` entries whose caller-visible status equals
    /// `status`.
    pub fn find_by_status(&mut self, status: u8, max: usize) -> Result<Vec<u32>> {
        let mut results = Vec::new();
        for i in 0..self.count {
            if results.len() == max {
                break;
            }
            if self.entry(i)?.status == status {
                results.push(i);
            }
        }
        Ok(results)
    }

    /// Checks strictly ascending key order: within the first page, and
    /// across every page boundary when the index spans several pages.
    pub fn validate(&mut self) -> Result<()> {
        if self.count == 0 {
            return Ok(());
        }
        self.ensure_page(0)?;
        let entries = self.entries_in_page(0);
        for i in 0..entries - 1 {
            if self.page[i].key >= self.page[i + 1].key {
                return Err(DbError::Corruption { position: i as u32 });
            }
        }
        for page in 1..self.page_count() {
            let boundary = page * PAGE_CAPACITY as u32;
            let before = self.entry(boundary - 1)?;
            let after = self.entry(boundary)?;
            if before.key >= after.key {
                return Err(DbError::Corruption { position: boundary });
            }
        }
        Ok(())
    }
}

fn mask_matches(internal_status: u8, must_be_set: u8, must_be_clear: u8) -> bool {
    internal_status & must_be_set == must_be_set && internal_status & must_be_clear == 0
}

fn write_all<F: FileIo>(io: &mut F, bytes: &[u8]) -> Result<()> {
    let n = io.write(bytes)?;
    if n != bytes.len() {
        return Err(DbError::Io(io::Error::new(
            ErrorKind::WriteZero,
            "short write to index file",
        )));
    }
    Ok(())
}
