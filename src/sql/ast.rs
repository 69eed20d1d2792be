//! Parsed statement shapes (spec.md §4.7, grounded on
//! `original_source/backend/parser/statement/Statements.go`). Field
//! specs and WHERE clauses reuse the catalog's own types rather than
//! duplicating them.

use crate::catalog::WhereClause;
use crate::common::value::FieldType;
use crate::vm::IsolationLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginStatement {
    pub isolation_level: IsolationLevel,
}

#[derive(Debug, Clone)]
pub struct CreateStatement {
    pub table_name: String,
    pub fields: Vec<(String, FieldType, bool)>,
}

#[derive(Debug, Clone)]
pub struct DropStatement {
    pub table_name: String,
}

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub table_name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteStatement {
    pub table_name: String,
    pub where_clause: Option<WhereClause>,
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub table_name: String,
    pub field_name: String,
    pub value: String,
    pub where_clause: Option<WhereClause>,
}

#[derive(Debug, Clone)]
pub struct SelectStatement {
    pub table_name: String,
    pub where_clause: Option<WhereClause>,
}

#[derive(Debug, Clone)]
pub struct ShowStatement {
    pub table_name: String,
}

/// The top-level parse result: one full command per connection line.
#[derive(Debug, Clone)]
pub enum Command {
    Begin(BeginStatement),
    Commit,
    Abort,
    Create(CreateStatement),
    Drop(DropStatement),
    Insert(InsertStatement),
    Delete(DeleteStatement),
    Update(UpdateStatement),
    Select(SelectStatement),
    Show(ShowStatement),
}
