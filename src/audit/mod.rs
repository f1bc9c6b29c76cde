//! Audit trail
//!
//! One record per storage operation and per issued token, written to a
//! per-tenant log file. Audit failures never fail the operation that
//! triggered them.

mod file_sink;

pub use file_sink::FileAuditSink;

use std::fmt;

/// Name of the per-tenant audit file inside `<baseDir>/<tenant>/`.
pub const AUDIT_FILE_NAME: &str = ".depot.log";

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    List,
    Get,
    Put,
    Delete,
    Token,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::List => "LIST",
            EventType::Get => "GET",
            EventType::Put => "PUT",
            EventType::Delete => "DELETE",
            EventType::Token => "TOKEN",
        };
        f.write_str(name)
    }
}

/// Fire-and-forget audit record sink.
pub trait AuditSink: Send + Sync {
    fn log(&self, tenant: &str, event: EventType, subject: &str, description: &str);
}

/// Sink that drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn log(&self, _tenant: &str, _event: EventType, _subject: &str, _description: &str) {}
}
