//! Path validation
//!
//! Character whitelist checks and syntactic normalization for caller-supplied
//! paths and filenames. Everything here is purely string based; containment
//! against a scope root is checked separately before any I/O.

use crate::error::ValidationError;

/// Characters accepted in addition to alphanumerics.
const EXTRA_CHARS: [char; 6] = ['.', '_', '-', '@', '%', '+'];

/// Normalizes a raw caller path into a relative path.
///
/// Strips all spaces, collapses `/.` and `./` runs until nothing changes,
/// squeezes repeated slashes and drops one leading and one trailing slash.
/// The result never starts or ends with `/`.
pub fn normalize(raw: &str) -> String {
    let mut path: String = raw.chars().filter(|c| *c != ' ').collect();

    loop {
        let after = path.replace("/.", "/").replace("./", "/");
        if after == path {
            break;
        }
        path = after;
    }

    let mut squeezed = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && squeezed.ends_with('/') {
            continue;
        }
        squeezed.push(c);
    }

    let squeezed = squeezed.strip_prefix('/').unwrap_or(&squeezed);
    squeezed.strip_suffix('/').unwrap_or(squeezed).to_string()
}

/// Core whitelist check shared by all validators.
///
/// Every character must be alphanumeric or one of `. _ - @ % +`, plus `/`
/// when `allow_slash` is set. No segment may start with a dot, which keeps
/// backup directories and other hidden entries out of normal traffic. An
/// empty candidate passes; callers needing a concrete name reject it.
fn check_segment_set(
    field: &'static str,
    candidate: &str,
    allow_slash: bool,
) -> Result<(), ValidationError> {
    if let Some(ch) = candidate
        .chars()
        .find(|c| !(c.is_alphanumeric() || EXTRA_CHARS.contains(c) || (allow_slash && *c == '/')))
    {
        return Err(ValidationError::IllegalCharacter {
            field,
            value: candidate.to_string(),
            ch,
        });
    }

    if candidate.split('/').any(|segment| segment.starts_with('.')) {
        return Err(ValidationError::HiddenSegment {
            field,
            value: candidate.to_string(),
        });
    }

    Ok(())
}

fn require_non_empty(field: &'static str, candidate: &str) -> Result<(), ValidationError> {
    if candidate.is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(())
    }
}

/// Validates a path that may contain slashes. The empty path is the realm root.
pub fn validate_path(candidate: &str) -> Result<(), ValidationError> {
    check_segment_set("path", candidate, true)
}

/// Validates a single filename.
pub fn validate_filename(candidate: &str) -> Result<(), ValidationError> {
    require_non_empty("filename", candidate)?;
    check_segment_set("filename", candidate, false)
}

/// Validates a tenant or realm name.
pub fn validate_tenant_or_realm(candidate: &str) -> Result<(), ValidationError> {
    require_non_empty("tenant or realm", candidate)?;
    check_segment_set("tenant or realm", candidate, false)
}

/// Validates a path naming a file: the parent part (if any) must be a valid
/// path and the leaf a valid filename.
pub fn validate_absolute_path(candidate: &str) -> Result<(), ValidationError> {
    match candidate.rsplit_once('/') {
        Some((parent, leaf)) => {
            validate_path(parent)?;
            validate_filename(leaf)
        }
        None => validate_filename(candidate),
    }
}

/// Validates a subject label. Subjects are free-form audit labels and only
/// control characters are refused.
pub fn validate_subject(candidate: &str) -> Result<(), ValidationError> {
    if candidate.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacter("subject"));
    }
    Ok(())
}

pub fn is_valid_path(candidate: &str) -> bool {
    validate_path(candidate).is_ok()
}

pub fn is_valid_filename(candidate: &str) -> bool {
    validate_filename(candidate).is_ok()
}

pub fn is_valid_tenant_or_realm(candidate: &str) -> bool {
    validate_tenant_or_realm(candidate).is_ok()
}

pub fn is_valid_absolute_path(candidate: &str) -> bool {
    validate_absolute_path(candidate).is_ok()
}

pub fn is_valid_subject(candidate: &str) -> bool {
    validate_subject(candidate).is_ok()
}
