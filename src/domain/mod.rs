//! Domain layer for the Redline hardening engine
//!
//! This module contains core models, errors and port traits. It has no
//! knowledge of SQLite, Docker or HTTP.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
