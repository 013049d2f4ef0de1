//! Error taxonomy shared by the transformer-manager services
//!
//! Training runs involve an external process and several stored JSON
//! payloads, so execution failures and parse failures are distinct
//! categories rather than one generic internal error: a trainer that
//! could not run is reported differently from a result that could not
//! be understood.

use thiserror::Error;

/// Result alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An external training process could not be launched, timed out,
    /// or finished without producing a usable result
    #[error("Training execution failed: {0}")]
    ExecutionFailure(String),

    /// A trainer result or stored payload could not be interpreted
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// Anything that should not happen and has no better category
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_and_parse_failures_are_distinct() {
        let exec = Error::ExecutionFailure("exited with code 2".to_string());
        let parse = Error::ParseFailure("bad result JSON".to_string());

        assert!(exec.to_string().contains("Training execution failed"));
        assert!(parse.to_string().contains("Parse failure"));
        assert!(!matches!(exec, Error::Internal(_)));
        assert!(!matches!(parse, Error::Internal(_)));
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
