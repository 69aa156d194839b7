//! Infrastructure layer module
//!
//! Process-wide concerns the domain knows nothing about:
//! - Configuration loading (figment: defaults, YAML files, environment)
//! - Logging (tracing-subscriber, tracing-appender)

pub mod config;
pub mod logging;
