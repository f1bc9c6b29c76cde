//! Error types
//!
//! Defines domain-specific error types for each module of the depot server.

use std::io;

use thiserror::Error;

/// Path validator errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} contains illegal character {ch:?}: {value}")]
    IllegalCharacter {
        field: &'static str,
        value: String,
        ch: char,
    },

    #[error("{field} contains a hidden segment: {value}")]
    HiddenSegment { field: &'static str, value: String },

    #[error("{0} contains a control character")]
    ControlCharacter(&'static str),
}

/// Storage engine errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists as folder: {0}")]
    FileAlreadyExistsAsFolder(String),

    #[error("Folder already exists as file: {0}")]
    FolderAlreadyExistsAsFile(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Storage failure: {context}: {source}")]
    Failure {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub(crate) fn failure(context: impl Into<String>, source: io::Error) -> Self {
        StorageError::Failure {
            context: context.into(),
            source,
        }
    }
}

impl From<ValidationError> for StorageError {
    fn from(error: ValidationError) -> Self {
        StorageError::InvalidPath(error.to_string())
    }
}

/// Authentication and authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// General depot error that encompasses all error types
#[derive(Debug, Error)]
pub enum DepotError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Upload too large: {size} bytes exceeds limit of {limit} bytes")]
    UploadTooLarge { size: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
