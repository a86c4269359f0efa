//! PostgreSQL persistence layer
//!
//! Implements the invoicing domain's `InvoiceLedger` port on PostgreSQL with
//! SQLx. The compare-and-swap transition maps onto a single conditional
//! `UPDATE`, so every status change remains atomic under concurrent writers
//! without explicit row locking.
//!
//! Schema migrations live in `migrations/` and run through `sqlx::migrate!`.

pub mod error;
pub mod pool;
pub mod repositories;

pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, DatabaseConfig, DatabasePool};
pub use repositories::PgInvoiceLedger;

/// Embedded schema migrations
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
