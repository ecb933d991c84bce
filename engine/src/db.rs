//! Engine facade binding one log store and one paged index.
//!
//! The facade is the only writer that touches both files, always in the
//! same order: log write first, index mutation second, header rewrite
//! last. A crash between the first and last step loses at most the
//! trailing record.

use std::fmt;

use tracing::debug;

use crate::error::{DbError, Result};
use crate::index::paged::PagedIndex;
use crate::io::file::FileIo;
use crate::storage::layout::{
    IndexEntry, INTERNAL_STATUS_DELETED, LOG_VERSION, MAX_FILENAME_LENGTH, PAGE_CAPACITY,
};
use crate::storage::log::LogStore;

#[derive(Debug)]
pub struct Db<L: FileIo, I: FileIo> {
    log: LogStore<L>,
    index: PagedIndex<I>,
}

impl<L: FileIo, I: FileIo> Db<L, I> {
    /// Opens (creating as needed) the log and index files and validates
    /// both headers and the index key order.
    pub fn open(log_io: L, index_io: I, log_name: &str, index_name: &str) -> Result<Self> {
        check_name(log_name)?;
        check_name(index_name)?;
        let mut log = LogStore::new(log_io, log_name);
        let mut index = PagedIndex::new(index_io, index_name);
        log.open_or_create()?;
        index.open_or_create()?;
        debug!(log = log_name, index = index_name, count = index.count(), "database open");
        Ok(Db { log, index })
    }

    /// Appends a record under `key`.
    ///
    /// A live entry with the same key rejects the append. A tombstoned
    /// entry is revived: a fresh record is written and the existing index
    /// slot repointed at it, leaving the index count unchanged.
    pub fn append(&mut self, key: u32, record_type: u8, payload: &[u8]) -> Result<()> {
        if let Some(pos) = self.index.search(key)? {
            let mut entry = self.index.entry(pos)?;
            if !entry.is_deleted() {
                return Err(DbError::DuplicateKey(key));
            }
            debug!(key, pos, "reviving tombstoned entry");
            let offset = self.log.append_record(key, record_type, payload)?;
            entry.offset = offset;
            // mirror the freshly written record header
            entry.status = 0;
            entry.internal_status = 0;
            return self.index.set_entry(pos, entry);
        }

        let offset = self.log.append_record(key, record_type, payload)?;
        self.index.insert(key, offset, 0, 0)
    }

    /// Copies the payload stored under `key` into `buf` and returns its
    /// length. Tombstoned keys read as absent.
    pub fn get(&mut self, key: u32, buf: &mut [u8]) -> Result<usize> {
        let pos = self.index.search(key)?.ok_or(DbError::NotFound(key))?;
        let entry = self.index.entry(pos)?;
        if entry.is_deleted() {
            return Err(DbError::NotFound(key));
        }
        let (_, length) = self.log.read_record(entry.offset, buf)?;
        Ok(length)
    }

    /// Rewrites the caller-visible status byte of the record at global
    /// index position `global`, in the log and in the index entry.
    pub fn update_status(&mut self, global: u32, status: u8) -> Result<()> {
        if global >= self.index.count() {
            return Err(DbError::OutOfBounds {
                position: global,
                count: self.index.count(),
            });
        }
        let mut entry = self.index.entry(global)?;
        self.log.patch_status(entry.offset, status)?;
        entry.status = status;
        self.index.set_entry(global, entry)
    }

    /// Marks the record under `key` deleted in both files. Deleting an
    /// already-deleted key succeeds without touching anything.
    pub fn delete_record(&mut self, key: u32) -> Result<()> {
        let pos = self.index.search(key)?.ok_or(DbError::NotFound(key))?;
        let mut entry = self.index.entry(pos)?;
        if entry.is_deleted() {
            return Ok(());
        }
        let internal_status = entry.internal_status | INTERNAL_STATUS_DELETED;
        self.log.patch_internal_status(entry.offset, internal_status)?;
        entry.internal_status = internal_status;
        debug!(key, pos, "record tombstoned");
        self.index.set_entry(pos, entry)
    }

    /// Total index entries, live and tombstoned.
    pub fn index_count(&self) -> u32 {
        self.index.count()
    }

    pub fn get_index_entry(&mut self, global: u32) -> Result<IndexEntry> {
        self.index.entry(global)
    }

    /// Global position of `key`, tombstoned or not.
    pub fn find_key(&mut self, key: u32) -> Result<Option<u32>> {
        self.index.search(key)
    }

    /// Global position of the smallest key `>= key`.
    pub fn locate_key(&mut self, key: u32) -> Result<Option<u32>> {
        self.index.locate_key(key)
    }

    pub fn next_key(&self, current: u32) -> Option<u32> {
        self.index.next_key(current)
    }

    pub fn prev_key(&self, current: u32) -> Option<u32> {
        self.index.prev_key(current)
    }

    /// Positions of up to `max` entries with caller-visible status
    /// `status`.
    pub fn find_by_status(&mut self, status: u8, max: usize) -> Result<Vec<u32>> {
        self.index.find_by_status(status, max)
    }

    /// First entry whose internal status has all of `must_be_set` set and
    /// all of `must_be_clear` clear.
    pub fn first_matching(
        &mut self,
        must_be_set: u8,
        must_be_clear: u8,
    ) -> Result<Option<(u32, IndexEntry)>> {
        self.index.first_matching(must_be_set, must_be_clear)
    }

    /// First entry not marked deleted.
    pub fn first_active(&mut self) -> Result<Option<(u32, IndexEntry)>> {
        self.first_matching(0, INTERNAL_STATUS_DELETED)
    }

    /// First tombstoned entry.
    pub fn first_deleted(&mut self) -> Result<Option<(u32, IndexEntry)>> {
        self.first_matching(INTERNAL_STATUS_DELETED, 0)
    }

    /// Entries matching the internal status masks.
    pub fn record_count(&mut self, must_be_set: u8, must_be_clear: u8) -> Result<u32> {
        self.index.record_count(must_be_set, must_be_clear)
    }

    /// Entries not marked deleted.
    pub fn live_record_count(&mut self) -> Result<u32> {
        self.record_count(0, INTERNAL_STATUS_DELETED)
    }

    pub fn stats(&mut self) -> Result<Stats> {
        let live = self.live_record_count()?;
        let records = self.index.count();
        Ok(Stats {
            records,
            pages: self.index.page_count(),
            live,
            deleted: records - live,
        })
    }

    pub fn db_version(&self) -> u16 {
        LOG_VERSION
    }

    /// Flushes the dirty page and consumes the engine.
    pub fn close(mut self) -> Result<()> {
        self.index.close()
    }
}

impl<L: FileIo, I: FileIo> Drop for Db<L, I> {
    fn drop(&mut self) {
        // close() already flushed if it ran; a dirty page here means the
        // engine was dropped mid-session
        let _ = self.index.flush_page();
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.len() >= MAX_FILENAME_LENGTH {
        return Err(DbError::NameTooLong(name.to_string()));
    }
    Ok(())
}

/// Snapshot of engine counters for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub records: u32,
    pub pages: u32,
    pub live: u32,
    pub deleted: u32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records: {}", self.records)?;
        writeln!(f, "pages:   {} ({} entries each)", self.pages, PAGE_CAPACITY)?;
        writeln!(f, "live:    {}", self.live)?;
        write!(f, "deleted: {}", self.deleted)
    }
}
