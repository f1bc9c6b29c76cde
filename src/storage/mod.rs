//! File system storage management
//!
//! Scope-confined list, get, put and delete with atomic writes and backup
//! rotation, plus the path validation and locking they rely on.

pub mod filesystem;
pub mod lock;
pub mod operations;
pub mod permissions;
pub mod results;
pub mod validation;

pub use operations::StorageEngine;
pub use permissions::{Permission, Permissions};
pub use results::{FileEntry, FileStream, FileType, NO_HASH, PutResult};
