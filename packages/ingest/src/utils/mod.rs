// packages/ingest/src/utils/mod.rs
//! Shared configuration and error types

pub mod config;
pub mod errors;

pub use config::ServerConfig;
pub use errors::{IngestError, Result};
