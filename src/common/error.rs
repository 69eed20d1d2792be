use thiserror::Error;

#[derive(Error, Debug)]
pub enum RsqlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad transaction file")]
    BadTransactionFile,

    #[error("bad log file: {0}")]
    BadLogFile(String),

    #[error("database file already exists")]
    FileExists,

    #[error("page cache is full")]
    CacheFull,

    #[error("database is busy, try again")]
    DatabaseBusy,

    #[error("data item too large for a page")]
    DataTooLarge,

    #[error("deadlock detected")]
    Deadlock,

    #[error("concurrent update")]
    ConcurrentUpdate,

    #[error("entry not found")]
    EntryNotFound,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("duplicate table: {0}")]
    DuplicateTable(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("field not indexed: {0}")]
    FieldNotIndexed(String),

    #[error("invalid field type")]
    InvalidFieldType,

    #[error("invalid values")]
    InvalidValues,

    #[error("invalid logical operator")]
    InvalidLogOp,

    #[error("nested transaction")]
    NestedTransaction,

    #[error("no transaction in progress")]
    NoTransaction,

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("{0}")]
    Other(String),
}
