//! Protocol replies
//!
//! Reply codes and formatting.

pub const OK: u16 = 200;
pub const READY: u16 = 220;
pub const GOODBYE: u16 = 221;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const LOGIN_SUCCESS: u16 = 230;
pub const DELETED: u16 = 250;
pub const OPENING_TRANSFER: u16 = 150;
pub const TOO_MANY_CLIENTS: u16 = 421;
pub const UNKNOWN_COMMAND: u16 = 500;
pub const INVALID_ARGUMENTS: u16 = 501;
pub const AUTH_FAILED: u16 = 530;
pub const UPLOAD_TOO_LARGE: u16 = 552;

/// Format a reply line
pub fn format_response(code: u16, message: &str) -> String {
    format!("{} {}\r\n", code, message)
}

/// Format a listing line: `name|type|size|mtime`
pub fn format_entry(entry: &crate::storage::FileEntry) -> String {
    format!(
        "{}|{}|{}|{}\r\n",
        entry.name,
        entry.file_type,
        entry.size,
        entry.modified_secs()
    )
}
