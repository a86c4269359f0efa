//! Request/response data transfer objects

pub mod invoices;
pub mod payments;
