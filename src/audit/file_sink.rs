//! Append-only audit files, one per tenant.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use log::{debug, warn};

use super::{AUDIT_FILE_NAME, AuditSink, EventType};

/// Writes `<timestamp> <EVENT> <subject> <description>` lines to
/// `<baseDir>/<tenant>/.depot.log`.
#[derive(Debug)]
pub struct FileAuditSink {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn log_file(&self, tenant: &str) -> PathBuf {
        self.base_dir.join(tenant).join(AUDIT_FILE_NAME)
    }

    fn append(&self, path: &Path, line: &str) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())
    }

    /// Returns up to `max_lines` most recent records, newest first.
    ///
    /// A tenant without an audit file has no records.
    pub fn tail(&self, tenant: &str, max_lines: usize) -> io::Result<Vec<String>> {
        let path = self.log_file(tenant);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut window = VecDeque::with_capacity(max_lines.min(1024));
        for line in BufReader::new(file).lines() {
            let line = line?;
            if window.len() == max_lines {
                window.pop_front();
            }
            if max_lines > 0 {
                window.push_back(line);
            }
        }

        Ok(window.into_iter().rev().collect())
    }
}

impl AuditSink for FileAuditSink {
    fn log(&self, tenant: &str, event: EventType, subject: &str, description: &str) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!("{timestamp} {event} {subject} {description}\n");
        let path = self.log_file(tenant);

        match self.append(&path, &line) {
            Ok(()) => debug!("Audit {event} {subject} {description}"),
            Err(e) => warn!("Could not write audit record to {}: {e}", path.display()),
        }
    }
}
