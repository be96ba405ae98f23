//! # Civic Common Library
//!
//! Shared code for the civic incident board:
//! - Error types
//! - Configuration loading and data folder resolution
//! - Geographic helpers (great-circle distance)
//! - Timestamp and text utilities

pub mod config;
pub mod error;
pub mod geo;
pub mod text;
pub mod time;

pub use error::{Error, Result};
