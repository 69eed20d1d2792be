//! Transaction State Store: the on-disk record of every transaction's
//! commit/abort/active status (spec.md §4.4).

pub mod store;
pub use store::{TransactionStateStore, SUPER_XID, TxStatus};
