//! File system operations
//!
//! Low-level helpers used by the storage engine: containment and symlink
//! checks, content comparison, backup slot allocation and removal.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};

use log::warn;

use crate::error::StorageError;

const COMPARE_BUFFER_SIZE: usize = 8192;

/// Resolves `.` and `..` components without touching the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Resolves `relative` under `root` and requires the result to stay beneath it.
pub fn resolve_contained(root: &Path, relative: &str) -> Result<PathBuf, StorageError> {
    let target = lexical_normalize(&root.join(relative));
    if !target.starts_with(lexical_normalize(root)) {
        warn!(
            "Requested path {} is outside of scope root {}",
            target.display(),
            root.display()
        );
        return Err(StorageError::AccessDenied(relative.to_string()));
    }
    Ok(target)
}

/// Fails if any existing component strictly below `root` up to and including
/// `target` is a symbolic link. Components that do not exist yet are fine.
pub fn ensure_no_symlinks(root: &Path, target: &Path) -> Result<(), StorageError> {
    let Ok(relative) = target.strip_prefix(root) else {
        return Err(StorageError::AccessDenied(target.display().to_string()));
    };

    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                warn!("Symbolic link in requested path: {}", current.display());
                return Err(StorageError::AccessDenied(format!(
                    "symbolic link in path: {}",
                    current.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => break,
            Err(e) => {
                return Err(StorageError::failure(
                    format!("could not inspect {}", current.display()),
                    e,
                ));
            }
        }
    }
    Ok(())
}

/// Create a directory and its ancestors, tolerating concurrent creation
pub fn create_directory(path: &Path) -> io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Check if a regular file exists (without following a final symlink)
pub fn file_exists(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Check if a directory exists (without following a final symlink)
pub fn directory_exists(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Compares two files, sizes first, then content chunk by chunk.
pub fn files_differ(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(true);
    }

    let mut left = File::open(a)?;
    let mut right = File::open(b)?;
    let mut left_buf = [0u8; COMPARE_BUFFER_SIZE];
    let mut right_buf = [0u8; COMPARE_BUFFER_SIZE];

    loop {
        let n = read_full(&mut left, &mut left_buf)?;
        let m = read_full(&mut right, &mut right_buf)?;
        if n != m || left_buf[..n] != right_buf[..m] {
            return Ok(true);
        }
        if n == 0 {
            return Ok(false);
        }
    }
}

/// Fills `buf` as far as the reader allows; returns bytes read (0 at EOF).
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Backup directory for `filename` inside `dir`: `dir/.<filename>`.
pub fn backup_dir(dir: &Path, filename: &str) -> PathBuf {
    dir.join(format!(".{filename}"))
}

/// First free slot `<filename>_<N>` (N >= 1) in `backup_dir`.
pub fn next_backup_path(backup_dir: &Path, filename: &str) -> PathBuf {
    let mut count: u64 = 1;
    loop {
        let candidate = backup_dir.join(format!("{filename}_{count}"));
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        count += 1;
    }
}

/// Removes a file or directory tree. Returns false when nothing was there.
pub fn remove_recursively(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        // Lost a race with another delete.
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
