//! Ties the storage stack and the catalog into one handle the server and
//! launcher share: one `Engine` per open database (spec.md §4.7's executor
//! collaborator, grounded on `original_source/backend/tbm/TableManager.go`'s
//! `CreateTableManger`/`OpenTableManager` constructors).

use crate::catalog::Catalog;
use crate::common::result::RsqlResult;
use crate::config::PAGE_SIZE_BYTES;
use crate::dm::DataManager;
use crate::tss::TransactionStateStore;
use crate::vm::VersionManager;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct Engine {
    tss: Arc<TransactionStateStore>,
    dm: Arc<DataManager>,
    vm: Arc<VersionManager>,
    catalog: Arc<Catalog>,
}

impl Engine {
    pub fn create<P: AsRef<Path>>(path_prefix: P, max_pages: usize) -> RsqlResult<Arc<Engine>> {
        let prefix = path_prefix.as_ref();
        let tss = Arc::new(TransactionStateStore::create(prefix.with_extension("xid"))?);
        let dm = DataManager::create(prefix, PAGE_SIZE_BYTES, max_pages)?;
        let vm = VersionManager::new(tss.clone(), dm.clone());
        let catalog = Arc::new(Catalog::create(prefix, dm.clone())?);
        info!(path = %prefix.display(), "created engine");
        Ok(Arc::new(Engine { tss, dm, vm, catalog }))
    }

    pub fn open<P: AsRef<Path>>(path_prefix: P, max_pages: usize) -> RsqlResult<Arc<Engine>> {
        let prefix = path_prefix.as_ref();
        let tss = Arc::new(TransactionStateStore::open(prefix.with_extension("xid"))?);
        let dm = DataManager::open(prefix, PAGE_SIZE_BYTES, max_pages, &tss)?;
        let vm = VersionManager::new(tss.clone(), dm.clone());
        let catalog = Arc::new(Catalog::open(prefix, dm.clone())?);
        info!(path = %prefix.display(), "opened engine");
        Ok(Arc::new(Engine { tss, dm, vm, catalog }))
    }

    pub fn dm(&self) -> &Arc<DataManager> {
        &self.dm
    }

    pub fn vm(&self) -> &Arc<VersionManager> {
        &self.vm
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn close(&self) {
        self.vm.close();
        self.dm.close();
        let _ = &self.tss;
        info!("closed engine");
    }
}
