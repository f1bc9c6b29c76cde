//! Error handlers
//!
//! Maps depot errors onto protocol reply codes.

use crate::error::types::{AuthError, DepotError, StorageError};
use log::{error, info};

/// Log a depot error that is about to be reported to a client
pub fn handle_error(err: &DepotError) {
    match err {
        DepotError::Storage(StorageError::Failure { .. }) | DepotError::Io(_) => {
            error!("Depot error: {err}");
        }
        _ => info!("Request rejected: {err}"),
    }
}

/// Convert error to protocol reply code
pub fn error_to_reply_code(err: &DepotError) -> u16 {
    match err {
        DepotError::Validation(_) => 501,
        DepotError::Storage(e) => match e {
            StorageError::InvalidPath(_) => 501,
            StorageError::PathNotFound(_) | StorageError::FileNotFound(_) => 550,
            StorageError::FileAlreadyExistsAsFolder(_)
            | StorageError::FolderAlreadyExistsAsFile(_) => 553,
            StorageError::AccessDenied(_) => 530,
            StorageError::Failure { .. } => 451,
        },
        DepotError::Auth(e) => match e {
            AuthError::AuthenticationFailed(_) | AuthError::AccessDenied(_) => 530,
            AuthError::InvalidRequest(_) => 501,
        },
        DepotError::UploadTooLarge { .. } => 552,
        DepotError::Io(_) => 451,
    }
}
