//! Three-pass crash recovery: truncate any page beyond the log's high
//! water mark, redo committed/aborted transactions' writes, then undo
//! whatever was left active at crash time (spec.md §4.3).

use crate::common::result::RsqlResult;
use crate::dm::page_layout::page_x_recover_write;
use crate::dm::record::LogRecord;
use crate::page_cache::page::PageStore;
use crate::tss::TransactionStateStore;
use crate::wal::Wal;
use std::collections::HashMap;
use tracing::info;

fn apply(store: &PageStore, page_no: u32, offset: u16, raw: &[u8], mark_invalid: bool) -> RsqlResult<()> {
    let page = store.get_page(page_no as u64)?;
    let mut bytes = raw.to_vec();
    if mark_invalid {
        crate::dm::item::mark_invalid(&mut bytes);
    }
    {
        let mut guard = page.lock().unwrap();
        page_x_recover_write(&mut guard.data, &bytes, offset);
        guard.dirty = true;
    }
    store.release(page_no as u64);
    Ok(())
}

fn redo_one(store: &PageStore, record: &LogRecord) -> RsqlResult<()> {
    match record {
        LogRecord::Insert {
            page_no, offset, raw, ..
        } => apply(store, *page_no, *offset, raw, false),
        LogRecord::Update {
            page_no,
            offset,
            new_raw,
            ..
        } => apply(store, *page_no, *offset, new_raw, false),
    }
}

fn undo_one(store: &PageStore, record: &LogRecord) -> RsqlResult<()> {
    match record {
        LogRecord::Insert {
            page_no, offset, raw, ..
        } => apply(store, *page_no, *offset, raw, true),
        LogRecord::Update {
            page_no,
            offset,
            old_raw,
            ..
        } => apply(store, *page_no, *offset, old_raw, false),
    }
}

pub fn recover(store: &PageStore, wal: &Wal, tss: &TransactionStateStore) -> RsqlResult<()> {
    info!("recovery: scanning write-ahead log for high water mark");

    wal.rewind();
    let mut max_page_no: u32 = 0;
    while let Some(body) = wal.next()? {
        let record = LogRecord::decode(&body)?;
        max_page_no = max_page_no.max(record.page_no());
    }
    if max_page_no == 0 {
        max_page_no = 1;
    }
    store.truncate_to(max_page_no as u64)?;
    info!(max_page_no, "recovery: truncated to log high water mark");

    wal.rewind();
    let mut redo_count = 0;
    while let Some(body) = wal.next()? {
        let record = LogRecord::decode(&body)?;
        if !tss.is_active(record.xid())? {
            redo_one(store, &record)?;
            redo_count += 1;
        }
    }
    info!(redo_count, "recovery: redo pass complete");

    wal.rewind();
    let mut by_xid: HashMap<u64, Vec<LogRecord>> = HashMap::new();
    while let Some(body) = wal.next()? {
        let record = LogRecord::decode(&body)?;
        if tss.is_active(record.xid())? {
            by_xid.entry(record.xid()).or_default().push(record);
        }
    }
    let mut undo_count = 0;
    for (xid, records) in by_xid {
        for record in records.iter().rev() {
            undo_one(store, record)?;
            undo_count += 1;
        }
        tss.abort(xid)?;
    }
    info!(undo_count, "recovery: undo pass complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dm::item as item_mod;
    use crate::dm::page_layout::page_x_init_raw;
    use tempfile::tempdir;

    #[test]
    fn redo_applies_committed_insert() {
        let dir = tempdir().unwrap();
        let store = PageStore::create(dir.path().join("t.db"), 64, 0).unwrap();
        let wal = Wal::create(dir.path().join("t.wal")).unwrap();
        let tss = TransactionStateStore::create(dir.path().join("t.xid")).unwrap();

        store.new_page(page_x_init_raw(64)).unwrap();
        let page2 = store.new_page(page_x_init_raw(64)).unwrap();

        let xid = tss.begin().unwrap();
        let raw = item_mod::wrap(b"committed");
        let log = LogRecord::encode_insert(xid, page2 as u32, 2, &raw);
        wal.append(&log).unwrap();
        tss.commit(xid).unwrap();

        recover(&store, &wal, &tss).unwrap();

        let page = store.get_page(page2).unwrap();
        let data = &page.lock().unwrap().data;
        let start = 2 + 3;
        assert_eq!(&data[start..start + b"committed".len()], b"committed");
    }

    #[test]
    fn undo_invalidates_active_transaction_insert() {
        let dir = tempdir().unwrap();
        let store = PageStore::create(dir.path().join("t.db"), 64, 0).unwrap();
        let wal = Wal::create(dir.path().join("t.wal")).unwrap();
        let tss = TransactionStateStore::create(dir.path().join("t.xid")).unwrap();

        store.new_page(page_x_init_raw(64)).unwrap();
        let page2 = store.new_page(page_x_init_raw(64)).unwrap();

        let xid = tss.begin().unwrap();
        let raw = item_mod::wrap(b"uncommitted");
        let log = LogRecord::encode_insert(xid, page2 as u32, 2, &raw);
        wal.append(&log).unwrap();
        // Crash before commit: xid stays Active in the TSS.

        recover(&store, &wal, &tss).unwrap();

        let page = store.get_page(page2).unwrap();
        assert!(!item_mod::is_valid_raw(&page.lock().unwrap().data[2..]));
        assert!(tss.is_aborted(xid).unwrap());
    }

    #[test]
    fn recover_with_no_log_records_truncates_to_page_one() {
        let dir = tempdir().unwrap();
        let store = PageStore::create(dir.path().join("t.db"), 64, 0).unwrap();
        let wal = Wal::create(dir.path().join("t.wal")).unwrap();
        let tss = TransactionStateStore::create(dir.path().join("t.xid")).unwrap();

        store.new_page(page_x_init_raw(64)).unwrap();
        store.new_page(page_x_init_raw(64)).unwrap();
        store.new_page(page_x_init_raw(64)).unwrap();

        recover(&store, &wal, &tss).unwrap();
        assert_eq!(store.page_count(), 1);
    }
}
