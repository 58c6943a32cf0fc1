//! Persistence layer — libSQL-backed storage for purchase orders,
//! invoices, and validation reports.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{InsertOutcome, RecordStore};
