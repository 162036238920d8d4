//! # metaimport Common Library
//!
//! Shared code for the metaimport workspace including:
//! - Field value model (`FieldValue`, `Metadata`)
//! - Merge strategy selection
//! - Configuration loading and path resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod metadata;

pub use error::{Error, Result};
pub use metadata::{FieldValue, MergeStrategy, Metadata};
