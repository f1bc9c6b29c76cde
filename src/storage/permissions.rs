//! Capability permissions
//!
//! The access mode of a capability, parsed once into a small tagged set.

use std::fmt;

/// A single operation class a capability may grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl Permission {
    fn bit(self) -> u8 {
        match self {
            Permission::Read => 0b001,
            Permission::Write => 0b010,
            Permission::Delete => 0b100,
        }
    }

    fn letter(self) -> char {
        match self {
            Permission::Read => 'r',
            Permission::Write => 'w',
            Permission::Delete => 'd',
        }
    }
}

/// Set of granted permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions(u8);

impl Permissions {
    const ALL: [Permission; 3] = [Permission::Read, Permission::Write, Permission::Delete];

    /// Parses a mode claim such as `"rw"`. Letters are matched case-insensitively;
    /// unknown letters are ignored.
    pub fn from_mode(mode: &str) -> Self {
        let mut bits = 0;
        for c in mode.chars().map(|c| c.to_ascii_lowercase()) {
            if let Some(permission) = Self::ALL.iter().find(|p| p.letter() == c) {
                bits |= permission.bit();
            }
        }
        Permissions(bits)
    }

    pub fn with(self, permission: Permission) -> Self {
        Permissions(self.0 | permission.bit())
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn can_read(&self) -> bool {
        self.allows(Permission::Read)
    }

    pub fn can_write(&self) -> bool {
        self.allows(Permission::Write)
    }

    pub fn can_delete(&self) -> bool {
        self.allows(Permission::Delete)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for permission in Self::ALL {
            if self.allows(permission) {
                write!(f, "{}", permission.letter())?;
            }
        }
        Ok(())
    }
}
