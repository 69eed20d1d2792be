//! Binds a parsed `Command` to a live transaction against the engine
//! (spec.md §4.7's executor collaborator, grounded on
//! `original_source/backend/tbm/TableManager.go`'s per-statement dispatch
//! and response strings). Statements outside an explicit `BEGIN` run
//! under a freshly begun, immediately committed transaction ("autocommit"),
//! matching the one-transaction-per-statement default the original
//! client/server loop assumes when no `BEGIN` has been sent.

use crate::catalog::Table;
use crate::common::error::RsqlError;
use crate::common::result::RsqlResult;
use crate::common::value::Value;
use crate::execution::engine::Engine;
use crate::execution::result::{format_rows, format_schema};
use crate::execution::session::Session;
use crate::sql::ast::Command;
use crate::sql::parser;
use crate::vm::IsolationLevel;
use tracing::info;

pub fn execute(engine: &Engine, session: &mut Session, sql: &str) -> RsqlResult<String> {
    let command = parser::parse(sql)?;
    info!(sql, "executing statement");
    match command {
        Command::Begin(b) => {
            let xid = engine.vm().begin(b.isolation_level)?;
            session.begin(xid)?;
            Ok("begin".to_string())
        }
        Command::Commit => {
            let xid = session.take_xid()?;
            engine.vm().commit(xid)?;
            Ok("commit".to_string())
        }
        Command::Abort => {
            let xid = session.take_xid()?;
            engine.vm().abort(xid)?;
            Ok("abort".to_string())
        }
        Command::Create(c) => {
            engine.catalog().create_table(&c.table_name, &c.fields)?;
            Ok(format!("create {}", c.table_name))
        }
        Command::Drop(d) => {
            engine.catalog().drop_table(&d.table_name)?;
            Ok(format!("drop {}", d.table_name))
        }
        Command::Show(s) => {
            let table = engine.catalog().get(&s.table_name)?;
            Ok(format_schema(&table))
        }
        Command::Insert(i) => with_xid(engine, session, |xid| {
            let table = engine.catalog().get(&i.table_name)?;
            do_insert(engine, &table, xid, &i.values)?;
            Ok("insert".to_string())
        }),
        Command::Delete(d) => with_xid(engine, session, |xid| {
            let table = engine.catalog().get(&d.table_name)?;
            let count = do_delete(engine, &table, xid, d.where_clause.as_ref())?;
            Ok(format!("delete {count}"))
        }),
        Command::Update(u) => with_xid(engine, session, |xid| {
            let table = engine.catalog().get(&u.table_name)?;
            let count = do_update(engine, &table, xid, &u)?;
            Ok(format!("update {count}"))
        }),
        Command::Select(s) => with_xid(engine, session, |xid| {
            let table = engine.catalog().get(&s.table_name)?;
            let rows = do_select(engine, &table, xid, s.where_clause.as_ref())?;
            Ok(format_rows(&table, &rows))
        }),
    }
}

/// Runs `f` under the session's open transaction if one exists, or under a
/// fresh autocommit transaction otherwise.
fn with_xid<F>(engine: &Engine, session: &mut Session, f: F) -> RsqlResult<String>
where
    F: FnOnce(u64) -> RsqlResult<String>,
{
    if let Some(xid) = session.xid() {
        return f(xid);
    }
    let xid = engine.vm().begin(IsolationLevel::ReadCommitted)?;
    match f(xid) {
        Ok(out) => {
            engine.vm().commit(xid)?;
            Ok(out)
        }
        Err(e) => {
            // The version manager may already have auto-aborted xid on a
            // concurrency error; aborting again here is only a no-op retry
            // on a plain failed statement, so ignore this second error.
            let _ = engine.vm().abort(xid);
            Err(e)
        }
    }
}

fn row_values(table: &Table, texts: &[String]) -> RsqlResult<Vec<Value>> {
    if texts.len() != table.fields().len() {
        return Err(RsqlError::InvalidValues);
    }
    table
        .fields()
        .iter()
        .zip(texts)
        .map(|(field, text)| Value::parse(field.kind(), text))
        .collect()
}

fn do_insert(engine: &Engine, table: &Table, xid: u64, texts: &[String]) -> RsqlResult<u64> {
    let values = row_values(table, texts)?;
    let raw = table.encode_row(&values)?;
    let uid = engine.vm().insert(xid, &raw)?;
    index_row(engine, table, &values, uid)?;
    Ok(uid)
}

fn index_row(engine: &Engine, table: &Table, values: &[Value], uid: u64) -> RsqlResult<()> {
    for (field, value) in table.fields().iter().zip(values) {
        if field.is_indexed() {
            field.open_index(engine.dm().clone())?.insert(value.to_index_key(), uid)?;
        }
    }
    Ok(())
}

fn do_delete(
    engine: &Engine,
    table: &Table,
    xid: u64,
    where_clause: Option<&crate::catalog::WhereClause>,
) -> RsqlResult<usize> {
    let uids = table.resolve_where(engine.dm(), where_clause)?;
    let mut count = 0;
    for uid in uids {
        if engine.vm().delete(xid, uid)? {
            count += 1;
        }
    }
    Ok(count)
}

fn do_update(engine: &Engine, table: &Table, xid: u64, stmt: &crate::sql::ast::UpdateStatement) -> RsqlResult<usize> {
    let field_index = table
        .fields()
        .iter()
        .position(|f| f.name() == stmt.field_name)
        .ok_or_else(|| RsqlError::FieldNotFound(stmt.field_name.clone()))?;
    let new_value = Value::parse(table.fields()[field_index].kind(), &stmt.value)?;

    let uids = table.resolve_where(engine.dm(), stmt.where_clause.as_ref())?;
    let mut count = 0;
    for uid in uids {
        let Some(raw) = engine.vm().read(xid, uid)? else {
            continue;
        };
        let mut values = table.decode_row(&raw)?;
        values[field_index] = new_value.clone();
        // Updating a row re-inserts it under a new UID (MVCC versions are
        // append-only); every indexed field is re-indexed against the new
        // UID, leaving the old index entry stale until its superseded
        // entry stops being visible.
        if engine.vm().delete(xid, uid)? {
            let raw = table.encode_row(&values)?;
            let new_uid = engine.vm().insert(xid, &raw)?;
            index_row(engine, table, &values, new_uid)?;
            count += 1;
        }
    }
    Ok(count)
}

fn do_select(
    engine: &Engine,
    table: &Table,
    xid: u64,
    where_clause: Option<&crate::catalog::WhereClause>,
) -> RsqlResult<Vec<Vec<Value>>> {
    let uids = table.resolve_where(engine.dm(), where_clause)?;
    let mut rows = Vec::new();
    for uid in uids {
        if let Some(raw) = engine.vm().read(xid, uid)? {
            rows.push(table.decode_row(&raw)?);
        }
    }
    Ok(rows)
}
