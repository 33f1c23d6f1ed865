//! Marknest Core Library
//!
//! Shared functionality for Marknest components:
//! - Configuration resolution and hierarchy
//! - Tracing/logging initialization
//! - Database URL and timestamp helpers
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
