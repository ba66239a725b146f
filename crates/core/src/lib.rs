//! Core sheet sync engine: mirrors bank accounts and transactions from an
//! upstream provider into a user-owned spreadsheet.
//!
//! The destination is a semi-trusted tabular store: the user can edit it
//! directly, it enforces no uniqueness, and it offers no transactions. The
//! engine keeps writes idempotent by identifier instead (re-running a sync
//! appends zero new rows) and adapts the column schema per subscription
//! tier without ever discarding user-added columns.

pub mod errors;
pub mod models;
pub mod schema;
pub mod store;
pub mod sync;

pub use errors::{Result, RetryClass, SyncError};
pub use models::{AccountRecord, SyncSummary, Tier, TransactionRecord};
pub use store::{TabInfo, TabularStore};
pub use sync::{ProgressSender, SheetSyncEngine, SyncProgress};
