//! Infrastructure adapters for external systems.

pub mod sqlite;
pub mod tools;
pub mod workspace;
