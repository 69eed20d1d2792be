use crate::common::bytes::unpack_uid;
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use crate::config::PAGE_SELECT_RETRIES;
use crate::dm::item::DataItem;
use crate::dm::page_index::PageIndex;
use crate::dm::page_layout::{
    page_one_check_valid, page_one_init_raw, page_one_set_valid_close, page_one_set_valid_open,
    page_x_free_space, page_x_free_space_offset, page_x_init_raw, page_x_insert, page_x_max_free_space,
};
use crate::dm::record::LogRecord;
use crate::dm::recover;
use crate::dm::item as item_mod;
use crate::page_cache::cache::{Cache, Finalizer, Loader};
use crate::page_cache::page::{Page, PageStore};
use crate::tss::TransactionStateStore;
use crate::wal::Wal;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

struct ItemLoader {
    store: Arc<PageStore>,
    wal: Arc<Wal>,
}

impl Loader<Arc<DataItem>> for ItemLoader {
    fn load(&self, uid: u64) -> RsqlResult<Arc<DataItem>> {
        let (page_no, offset) = unpack_uid(uid);
        let page = self.store.get_page(page_no as u64)?;
        Ok(Arc::new(DataItem::new(uid, page, offset, self.wal.clone())))
    }
}

struct ItemFinalizer {
    store: Arc<PageStore>,
}

impl Finalizer<Arc<DataItem>> for ItemFinalizer {
    fn finalize(&self, _uid: u64, item: &Arc<DataItem>) {
        self.store.release(item.page_no() as u64);
    }
}

pub struct DataManager {
    store: Arc<PageStore>,
    wal: Arc<Wal>,
    page_index: PageIndex,
    page_one: Arc<Mutex<Page>>,
    item_cache: Cache<Arc<DataItem>>,
    page_size: usize,
}

fn db_path(prefix: &Path) -> std::path::PathBuf {
    prefix.with_extension("db")
}

fn wal_path(prefix: &Path) -> std::path::PathBuf {
    prefix.with_extension("wal")
}

impl DataManager {
    pub fn create<P: AsRef<Path>>(path_prefix: P, page_size: usize, max_pages: usize) -> RsqlResult<Arc<DataManager>> {
        let prefix = path_prefix.as_ref();
        let store = Arc::new(PageStore::create(db_path(prefix), page_size, max_pages)?);
        let wal = Arc::new(Wal::create(wal_path(prefix))?);

        let page_one_no = store.new_page(page_one_init_raw(page_size))?;
        if page_one_no != 1 {
            return Err(RsqlError::Other("page one was not allocated first".into()));
        }
        let page_one = store.get_page(1)?;

        let item_cache = Cache::new(
            0,
            Box::new(ItemLoader {
                store: store.clone(),
                wal: wal.clone(),
            }),
            Box::new(ItemFinalizer { store: store.clone() }),
        );

        info!(path = %prefix.display(), "created data manager");
        Ok(Arc::new(DataManager {
            store,
            wal,
            page_index: PageIndex::new(page_size),
            page_one,
            item_cache,
            page_size,
        }))
    }

    pub fn open<P: AsRef<Path>>(
        path_prefix: P,
        page_size: usize,
        max_pages: usize,
        tss: &TransactionStateStore,
    ) -> RsqlResult<Arc<DataManager>> {
        let prefix = path_prefix.as_ref();
        let store = Arc::new(PageStore::open(db_path(prefix), page_size, max_pages)?);
        let wal = Arc::new(Wal::open(wal_path(prefix))?);

        let page_one = store.get_page(1)?;
        let clean = page_one_check_valid(&page_one.lock().unwrap().data);
        if !clean {
            info!("unclean shutdown detected, running recovery");
            recover::recover(&store, &wal, tss)?;
        }

        let page_index = PageIndex::new(page_size);
        let page_count = store.page_count();
        for page_no in 2..=page_count {
            let page = store.get_page(page_no)?;
            let free = page_x_free_space(&page.lock().unwrap().data, page_size);
            page_index.add(page_no, free);
            store.release(page_no);
        }

        {
            let mut guard = page_one.lock().unwrap();
            page_one_set_valid_open(&mut guard.data);
            guard.dirty = true;
        }
        store.flush_page(&page_one)?;

        let item_cache = Cache::new(
            0,
            Box::new(ItemLoader {
                store: store.clone(),
                wal: wal.clone(),
            }),
            Box::new(ItemFinalizer { store: store.clone() }),
        );

        info!(path = %prefix.display(), page_count, "opened data manager");
        Ok(Arc::new(DataManager {
            store,
            wal,
            page_index,
            page_one,
            item_cache,
            page_size,
        }))
    }

    pub fn insert(&self, xid: u64, payload: &[u8]) -> RsqlResult<u64> {
        let raw = item_mod::wrap(payload);
        if raw.len() > page_x_max_free_space(self.page_size) {
            return Err(RsqlError::DataTooLarge);
        }

        let mut page_info = None;
        for _ in 0..PAGE_SELECT_RETRIES {
            if let Some(info) = self.page_index.select(raw.len()) {
                page_info = Some(info);
                break;
            }
            let new_page_no = self.store.new_page(page_x_init_raw(self.page_size))?;
            self.page_index.add(new_page_no, page_x_max_free_space(self.page_size));
        }
        let page_info = page_info.ok_or(RsqlError::DatabaseBusy)?;

        let page = self.store.get_page(page_info.page_no)?;
        let result = (|| -> RsqlResult<u64> {
            let offset = {
                let guard = page.lock().unwrap();
                page_x_free_space_offset(&guard.data)
            };
            let log = LogRecord::encode_insert(xid, page_info.page_no as u32, offset, &raw);
            self.wal.append(&log)?;

            let mut guard = page.lock().unwrap();
            let written_offset = page_x_insert(&mut guard.data, &raw);
            guard.dirty = true;
            debug_assert_eq!(written_offset, offset);
            Ok(item_mod::make_uid(page_info.page_no as u32, written_offset))
        })();

        let free_space = page_x_free_space(&page.lock().unwrap().data, self.page_size);
        self.page_index.add(page_info.page_no, free_space);
        self.store.release(page_info.page_no);

        debug!(xid, uid = ?result.as_ref().ok(), "inserted data item");
        result
    }

    pub fn read(&self, uid: u64) -> RsqlResult<Option<Arc<DataItem>>> {
        let item = self.item_cache.get(uid)?;
        if !item.is_valid() {
            self.item_cache.release(uid);
            return Ok(None);
        }
        Ok(Some(item))
    }

    pub fn release(&self, uid: u64) {
        self.item_cache.release(uid);
    }

    /// Overwrites an item's payload in place under the before/after
    /// protocol, logging the update to the WAL.
    pub fn update(&self, xid: u64, item: &DataItem, new_payload: &[u8]) -> RsqlResult<()> {
        item.before();
        match item.set_payload(new_payload) {
            Ok(()) => item.after(xid),
            Err(e) => {
                item.un_before();
                Err(e)
            }
        }
    }

    pub fn close(&self) {
        self.item_cache.close();
        let mut guard = self.page_one.lock().unwrap();
        page_one_set_valid_close(&mut guard.data);
        guard.dirty = true;
        drop(guard);
        let _ = self.store.flush_page(&self.page_one);
        self.store.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tss::TransactionStateStore;
    use tempfile::tempdir;

    #[test]
    fn create_insert_read() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("db");
        let dm = DataManager::create(&prefix, 256, 0).unwrap();

        let uid = dm.insert(1, b"hello world").unwrap();
        let item = dm.read(uid).unwrap().unwrap();
        assert_eq!(item.data(), b"hello world");
        dm.release(uid);
    }

    #[test]
    fn update_in_place_preserves_length() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("db");
        let dm = DataManager::create(&prefix, 256, 0).unwrap();

        let uid = dm.insert(1, &[0u8; 16]).unwrap();
        let item = dm.read(uid).unwrap().unwrap();
        dm.update(1, &item, &[7u8; 16]).unwrap();
        assert_eq!(item.data(), vec![7u8; 16]);
        dm.release(uid);
    }

    #[test]
    fn reopen_recovers_clean_shutdown_without_recovery_pass() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("db");
        let tss_path = dir.path().join("db.xid");
        let tss = TransactionStateStore::create(&tss_path).unwrap();

        let uid;
        {
            let dm = DataManager::create(&prefix, 256, 0).unwrap();
            uid = dm.insert(1, b"persisted").unwrap();
            dm.close();
        }

        let dm = DataManager::open(&prefix, 256, 0, &tss).unwrap();
        let item = dm.read(uid).unwrap().unwrap();
        assert_eq!(item.data(), b"persisted");
    }
}
