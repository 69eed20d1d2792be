//! File-backed page storage: the page cache's `Loader`/`Finalizer` pair
//! plus the `PageStore` façade DM and the B+tree read/write pages through.

use crate::common::result::RsqlResult;
use crate::page_cache::cache::{Cache, Finalizer, Loader};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct Page {
    pub page_no: u64,
    pub data: Vec<u8>,
    pub dirty: bool,
}

impl Page {
    pub fn new(page_no: u64, data: Vec<u8>) -> Self {
        Page {
            page_no,
            data,
            dirty: false,
        }
    }
}

struct PageLoader {
    file: Arc<Mutex<File>>,
    page_size: usize,
}

impl Loader<Arc<Mutex<Page>>> for PageLoader {
    fn load(&self, page_no: u64) -> RsqlResult<Arc<Mutex<Page>>> {
        let mut buf = vec![0u8; self.page_size];
        let offset = (page_no - 1) * self.page_size as u64;
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        debug!(page_no, "loaded page from disk");
        Ok(Arc::new(Mutex::new(Page::new(page_no, buf))))
    }
}

struct PageFinalizer {
    file: Arc<Mutex<File>>,
    page_size: usize,
}

impl PageFinalizer {
    fn flush(&self, page: &Page) -> RsqlResult<()> {
        let offset = (page.page_no - 1) * self.page_size as u64;
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.sync_all()?;
        Ok(())
    }
}

impl Finalizer<Arc<Mutex<Page>>> for PageFinalizer {
    fn finalize(&self, page_no: u64, value: &Arc<Mutex<Page>>) {
        let mut page = value.lock().unwrap();
        if page.dirty {
            if self.flush(&page).is_ok() {
                page.dirty = false;
            }
        }
        debug!(page_no, "evicted page from cache");
    }
}

/// A file-backed, fixed-page-size store with a bounded cache in front.
pub struct PageStore {
    file: Arc<Mutex<File>>,
    page_size: usize,
    page_count: AtomicU64,
    cache: Cache<Arc<Mutex<Page>>>,
}

impl PageStore {
    fn open_file<P: AsRef<Path>>(path: P, create_new: bool) -> RsqlResult<File> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if create_new {
            options.create_new(true);
        }
        Ok(options.open(path)?)
    }

    pub fn create<P: AsRef<Path>>(path: P, page_size: usize, max_pages: usize) -> RsqlResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = Self::open_file(path, true)?;
        Self::from_file(file, page_size, max_pages)
    }

    pub fn open<P: AsRef<Path>>(path: P, page_size: usize, max_pages: usize) -> RsqlResult<Self> {
        let file = Self::open_file(path, false)?;
        Self::from_file(file, page_size, max_pages)
    }

    fn from_file(file: File, page_size: usize, max_pages: usize) -> RsqlResult<Self> {
        let file_len = file.metadata()?.len();
        let page_count = file_len / page_size as u64;
        let file = Arc::new(Mutex::new(file));
        let loader = PageLoader {
            file: file.clone(),
            page_size,
        };
        let finalizer = PageFinalizer {
            file: file.clone(),
            page_size,
        };
        Ok(PageStore {
            file,
            page_size,
            page_count: AtomicU64::new(page_count),
            cache: Cache::new(max_pages, Box::new(loader), Box::new(finalizer)),
        })
    }

    /// Appends a new page initialized with `data`, flushing it eagerly, and
    /// returns its page number (1-based).
    pub fn new_page(&self, data: Vec<u8>) -> RsqlResult<u64> {
        debug_assert_eq!(data.len(), self.page_size);
        let page_no = self.page_count.fetch_add(1, Ordering::SeqCst) + 1;
        let offset = (page_no - 1) * self.page_size as u64;
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(page_no)
    }

    pub fn get_page(&self, page_no: u64) -> RsqlResult<Arc<Mutex<Page>>> {
        self.cache.get(page_no)
    }

    pub fn release(&self, page_no: u64) {
        self.cache.release(page_no);
    }

    pub fn flush_page(&self, page: &Arc<Mutex<Page>>) -> RsqlResult<()> {
        let mut page = page.lock().unwrap();
        let offset = (page.page_no - 1) * self.page_size as u64;
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.sync_all()?;
        page.dirty = false;
        Ok(())
    }

    pub fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::SeqCst)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Truncates the file to `max_page_no` pages, discarding anything
    /// beyond it. Used by DM's recovery pass before redo/undo.
    pub fn truncate_to(&self, max_page_no: u64) -> RsqlResult<()> {
        let size = max_page_no * self.page_size as u64;
        let file = self.file.lock().unwrap();
        file.set_len(size)?;
        self.page_count.store(max_page_no, Ordering::SeqCst);
        Ok(())
    }

    pub fn close(&self) {
        self.cache.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_page_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = PageStore::create(&path, 64, 0).unwrap();
        let mut data = vec![0u8; 64];
        data[0] = 7;
        let page_no = store.new_page(data.clone()).unwrap();
        assert_eq!(page_no, 1);

        let page = store.get_page(page_no).unwrap();
        assert_eq!(page.lock().unwrap().data, data);
        store.release(page_no);
    }

    #[test]
    fn truncate_shrinks_file_and_page_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = PageStore::create(&path, 64, 0).unwrap();
        store.new_page(vec![0u8; 64]).unwrap();
        store.new_page(vec![1u8; 64]).unwrap();
        store.new_page(vec![2u8; 64]).unwrap();
        assert_eq!(store.page_count(), 3);

        store.truncate_to(1).unwrap();
        assert_eq!(store.page_count(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 64);
    }

    #[test]
    fn dirty_page_flushes_on_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = PageStore::create(&path, 64, 0).unwrap();
        let page_no = store.new_page(vec![0u8; 64]).unwrap();

        let page = store.get_page(page_no).unwrap();
        {
            let mut p = page.lock().unwrap();
            p.data[0] = 9;
            p.dirty = true;
        }
        drop(page);
        store.release(page_no);

        let reopened = PageStore::open(&path, 64, 0).unwrap();
        let page = reopened.get_page(page_no).unwrap();
        assert_eq!(page.lock().unwrap().data[0], 9);
    }
}
