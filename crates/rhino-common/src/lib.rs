//! Rhino Common Library
//!
//! Shared types, utilities, and error handling for the Rhino workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Rhino workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Tracing-based logging configuration and initialization
//! - **Types**: Shared domain identifiers, most importantly [`types::Doi`]
//!
//! # Example
//!
//! ```no_run
//! use rhino_common::types::Doi;
//!
//! let doi = Doi::create("info:doi/10.1371/journal.pbio.0000001");
//! assert_eq!(doi.name(), "10.1371/journal.pbio.0000001");
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, RhinoError};
