//! # dayplan Domain
//!
//! Business domain types and models for dayplan.
//!
//! This crate contains:
//! - Calendar and suggestion data types
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other dayplan crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
