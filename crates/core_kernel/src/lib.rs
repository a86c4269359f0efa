//! Core Kernel - Foundational types for the billing system
//!
//! This crate provides the building blocks shared by the domain and
//! infrastructure crates:
//! - Money with integer minor-unit precision
//! - Strongly-typed entity identifiers

pub mod identifiers;
pub mod money;

pub use identifiers::{AttemptId, ClientId, InvoiceId, ProjectId};
pub use money::{Currency, Money, MoneyError};
