//! Common error types for metaimport

use thiserror::Error;

/// Common result type for metaimport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the metaimport crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input (query syntax, unknown field names)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
