//! Repository implementations

pub mod invoicing;

pub use invoicing::PgInvoiceLedger;
