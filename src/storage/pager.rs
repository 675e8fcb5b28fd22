use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::error;

use crate::error::IndexResult;
use crate::storage::page::{PAGE_RECORD_SIZE, Page, PageId};

/// Number of u32 metadata slots at the head of the file.
pub const META_SLOTS: u32 = 4;
/// Header slot holding the pager's allocation counter.
pub const META_NEXT_ID: u32 = 1;
/// Header slot holding the current root page id (0 when the tree is empty).
pub const META_ROOT: u32 = 2;

const HEADER_SIZE: u64 = META_SLOTS as u64 * 4;

/// Pager: durable, randomly addressable storage of fixed-size page records
/// keyed by a small integer id. Ids are handed out by a sequential counter
/// starting at 1; id 0 is never allocated, so it can serve as the "no page"
/// sentinel everywhere. Freed pages are never reclaimed.
///
/// A grow-only write-through cache keeps every record seen so far; reads hit
/// the file only once per id.
pub struct Pager {
    file: File,
    path: PathBuf,
    next_id: PageId,
    cache: Vec<Option<Box<Page>>>,
}

impl Pager {
    /// Open (or create) the index file at `path`. A fresh file gets a zeroed
    /// header; an existing one has its allocation counter restored from
    /// header slot 1.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Pager> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let mut pager = Pager {
            file,
            path,
            next_id: 0,
            cache: Vec::new(),
        };
        if pager.file.metadata()?.len() < HEADER_SIZE {
            pager.file.seek(SeekFrom::Start(0))?;
            pager.file.write_all(&[0u8; HEADER_SIZE as usize])?;
        } else {
            pager.next_id = pager.get_meta(META_NEXT_ID)?;
        }
        Ok(pager)
    }

    /// Materialize the record stored under a previously allocated id.
    pub fn read_page(&mut self, id: PageId) -> IndexResult<Page> {
        debug_assert!(id != 0 && id <= self.next_id, "read of unallocated page {id}");
        if let Some(Some(page)) = self.cache.get(id as usize) {
            return Ok((**page).clone());
        }
        let mut buf = [0u8; PAGE_RECORD_SIZE];
        self.file.seek(SeekFrom::Start(Self::offset(id)))?;
        self.file.read_exact(&mut buf)?;
        let page = Page::from_bytes(&buf)?;
        self.cache_put(id, page.clone());
        Ok(page)
    }

    /// Overwrite the record at `id`. The write reaches the OS before this
    /// returns; a later read of the same id sees it.
    pub fn update_page(&mut self, id: PageId, page: &Page) -> IndexResult<()> {
        debug_assert!(id != 0 && id <= self.next_id, "update of unallocated page {id}");
        self.write_record(id, page)?;
        self.cache_put(id, page.clone());
        Ok(())
    }

    /// Allocate the next id and write `page` as its record.
    pub fn append_page(&mut self, page: &Page) -> IndexResult<PageId> {
        let id = self.next_id + 1;
        self.write_record(id, page)?;
        self.next_id = id;
        self.cache_put(id, page.clone());
        Ok(id)
    }

    /// Read the `slot`th (1-based) metadata integer from the file header.
    pub fn get_meta(&mut self, slot: u32) -> IndexResult<u32> {
        debug_assert!((1..=META_SLOTS).contains(&slot));
        let mut buf = [0u8; 4];
        self.file.seek(SeekFrom::Start((slot as u64 - 1) * 4))?;
        self.file.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Write the `slot`th (1-based) metadata integer.
    pub fn put_meta(&mut self, slot: u32, value: u32) -> IndexResult<()> {
        debug_assert!((1..=META_SLOTS).contains(&slot));
        self.file.seek(SeekFrom::Start((slot as u64 - 1) * 4))?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Flush the allocation counter and any buffered writes, then let the
    /// handle close. Dropping a pager does the same best-effort.
    pub fn close(mut self) -> IndexResult<()> {
        self.flush_header()
    }

    fn flush_header(&mut self) -> IndexResult<()> {
        self.put_meta(META_NEXT_ID, self.next_id)?;
        self.file.flush()?;
        Ok(())
    }

    fn write_record(&mut self, id: PageId, page: &Page) -> IndexResult<()> {
        self.file.seek(SeekFrom::Start(Self::offset(id)))?;
        self.file.write_all(&page.to_bytes())?;
        Ok(())
    }

    fn cache_put(&mut self, id: PageId, page: Page) {
        let idx = id as usize;
        if self.cache.len() <= idx {
            self.cache.resize_with(idx + 1, || None);
        }
        self.cache[idx] = Some(Box::new(page));
    }

    fn offset(id: PageId) -> u64 {
        HEADER_SIZE + id as u64 * PAGE_RECORD_SIZE as u64
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_header() {
            error!("failed to flush header of {}: {e}", self.path.display());
        }
    }
}
