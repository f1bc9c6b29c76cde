//! Storage result types
//!
//! Defines result structures returned by storage operations.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hash value reported when no digest was requested.
pub const NO_HASH: &str = "-";

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Folder,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileType::File => write!(f, "FILE"),
            FileType::Folder => write!(f, "FOLDER"),
        }
    }
}

/// One direct child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub file_type: FileType,
    /// Always 0 for folders.
    pub size: u64,
    pub modified: SystemTime,
}

impl FileEntry {
    /// Modification time as seconds since the Unix epoch.
    pub fn modified_secs(&self) -> u64 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_secs())
            .unwrap_or(0)
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub bytes_written: u64,
    /// Hex SHA-256 of the stored bytes, or [`NO_HASH`].
    pub hash: String,
}

/// Readable, seekable handle on a stored file.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    size: u64,
    path: PathBuf,
}

impl FileStream {
    pub(crate) fn new(file: File, size: u64, path: PathBuf) -> Self {
        Self { file, size, path }
    }

    /// Size of the file when it was opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gives up the handle, e.g. to hand it to an async runtime.
    pub fn into_file(self) -> File {
        self.file
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}
