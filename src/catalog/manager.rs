//! In-memory catalog: the name-indexed table map, rebuilt from the
//! on-disk singly linked list at open and mutated under `xid = SUPER_XID`
//! (spec.md §3.1, grounded on `original_source/backend/tbm/TableManager.go`).

use crate::catalog::booter::Booter;
use crate::catalog::table::Table;
use crate::common::bytes::read_u64_be;
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use crate::common::value::FieldType;
use crate::dm::DataManager;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct Catalog {
    dm: Arc<DataManager>,
    booter: Booter,
    tables: Mutex<HashMap<String, Arc<Table>>>,
}

impl Catalog {
    pub fn create<P: AsRef<Path>>(path_prefix: P, dm: Arc<DataManager>) -> RsqlResult<Catalog> {
        let booter = Booter::create(path_prefix, &0u64.to_be_bytes())?;
        info!("created empty catalog");
        Ok(Catalog { dm, booter, tables: Mutex::new(HashMap::new()) })
    }

    pub fn open<P: AsRef<Path>>(path_prefix: P, dm: Arc<DataManager>) -> RsqlResult<Catalog> {
        let booter = Booter::open(path_prefix)?;
        let catalog = Catalog { dm, booter, tables: Mutex::new(HashMap::new()) };
        catalog.load_tables()?;
        Ok(catalog)
    }

    fn first_table_uid(&self) -> RsqlResult<u64> {
        let raw = self.booter.load()?;
        Ok(read_u64_be(&raw))
    }

    fn set_first_table_uid(&self, uid: u64) -> RsqlResult<()> {
        self.booter.update(&uid.to_be_bytes())
    }

    fn load_tables(&self) -> RsqlResult<()> {
        let mut uid = self.first_table_uid()?;
        let mut tables = self.tables.lock().unwrap();
        while uid != 0 {
            let table = Table::load(&self.dm, uid)?;
            uid = table.next_uid();
            tables.insert(table.name().to_string(), Arc::new(table));
        }
        info!(count = tables.len(), "loaded catalog");
        Ok(())
    }

    pub fn get(&self, name: &str) -> RsqlResult<Arc<Table>> {
        self.tables
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RsqlError::TableNotFound(name.to_string()))
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Creates a table and chains it onto the catalog's linked list
    /// (TableManager.go's `Create`).
    pub fn create_table(&self, name: &str, field_specs: &[(String, FieldType, bool)]) -> RsqlResult<Arc<Table>> {
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(name) {
            return Err(RsqlError::DuplicateTable(name.to_string()));
        }
        let next_uid = self.first_table_uid()?;
        let table = Table::create(&self.dm, next_uid, name, field_specs)?;
        self.set_first_table_uid(table.uid())?;

        let table = Arc::new(table);
        tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    /// Unlinks a table from the catalog's linked list (TableManager.go has
    /// no counterpart; the chain splice follows the same boot/predecessor
    /// update `create_table` already does in reverse).
    pub fn drop_table(&self, name: &str) -> RsqlResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let target = tables.get(name).cloned().ok_or_else(|| RsqlError::TableNotFound(name.to_string()))?;

        let mut prev: Option<Arc<Table>> = None;
        let mut cur = self.first_table_uid()?;
        while cur != 0 && cur != target.uid() {
            let table = tables
                .values()
                .find(|t| t.uid() == cur)
                .cloned()
                .ok_or(RsqlError::EntryNotFound)?;
            cur = table.next_uid();
            prev = Some(table);
        }
        if cur != target.uid() {
            return Err(RsqlError::TableNotFound(name.to_string()));
        }

        match prev {
            None => self.set_first_table_uid(target.next_uid())?,
            Some(prev_table) => prev_table.relink_next(&self.dm, target.next_uid())?,
        }

        tables.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_catalog(dir: &std::path::Path) -> (Arc<DataManager>, Catalog) {
        let dm = DataManager::create(dir.join("db"), 8192, 0).unwrap();
        let catalog = Catalog::create(dir.join("db"), dm.clone()).unwrap();
        (dm, catalog)
    }

    fn int64_pk(name: &str) -> Vec<(String, FieldType, bool)> {
        vec![(name.to_string(), FieldType::Int64, true)]
    }

    #[test]
    fn create_table_then_get_finds_it() {
        let dir = tempdir().unwrap();
        let (_dm, catalog) = make_catalog(dir.path());
        catalog.create_table("widgets", &int64_pk("id")).unwrap();
        assert_eq!(catalog.get("widgets").unwrap().name(), "widgets");
    }

    #[test]
    fn create_duplicate_table_errs() {
        let dir = tempdir().unwrap();
        let (_dm, catalog) = make_catalog(dir.path());
        catalog.create_table("widgets", &int64_pk("id")).unwrap();
        assert!(matches!(catalog.create_table("widgets", &int64_pk("id")), Err(RsqlError::DuplicateTable(_))));
    }

    #[test]
    fn get_missing_table_errs() {
        let dir = tempdir().unwrap();
        let (_dm, catalog) = make_catalog(dir.path());
        assert!(matches!(catalog.get("ghosts"), Err(RsqlError::TableNotFound(_))));
    }

    #[test]
    fn drop_table_removes_it_and_splices_the_chain() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 8192, 0).unwrap();
        let catalog = Catalog::create(dir.path().join("db"), dm.clone()).unwrap();
        catalog.create_table("a", &int64_pk("id")).unwrap();
        catalog.create_table("b", &int64_pk("id")).unwrap();
        catalog.create_table("c", &int64_pk("id")).unwrap();

        catalog.drop_table("b").unwrap();
        assert!(matches!(catalog.get("b"), Err(RsqlError::TableNotFound(_))));

        let reopened = Catalog::open(dir.path().join("db"), dm).unwrap();
        let mut names = reopened.list_names();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn drop_missing_table_errs() {
        let dir = tempdir().unwrap();
        let (_dm, catalog) = make_catalog(dir.path());
        assert!(matches!(catalog.drop_table("ghosts"), Err(RsqlError::TableNotFound(_))));
    }

    #[test]
    fn reopening_reloads_every_table_via_the_linked_list() {
        let dir = tempdir().unwrap();
        let dm = DataManager::create(dir.path().join("db"), 8192, 0).unwrap();
        {
            let catalog = Catalog::create(dir.path().join("db"), dm.clone()).unwrap();
            catalog.create_table("a", &int64_pk("id")).unwrap();
            catalog.create_table("b", &int64_pk("id")).unwrap();
        }
        let reopened = Catalog::open(dir.path().join("db"), dm).unwrap();
        let mut names = reopened.list_names();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
