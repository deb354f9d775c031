//! # Hierarchical Names
//!
//! Dotted identifiers addressing catalog objects: `schema`,
//! `schema.entity`, `schema.entity.column`. Names are value types -
//! case-sensitive, hashable, used as registry keys.

use std::fmt;

use crate::error::DbError;

/// A dotted hierarchical identifier with a type discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Name {
    /// One segment, e.g. `warehouse`.
    Simple(String),
    /// Fully qualified path, e.g. `warehouse.features.embedding`.
    Fqn(Vec<String>),
    /// Prefix match, e.g. `warehouse.*`.
    Wildcard(Vec<String>),
}

impl Name {
    /// Parses a dotted identifier, inferring the discriminator from the
    /// segment count and a trailing `*`.
    pub fn parse(raw: &str) -> Result<Self, DbError> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(DbError::SimpleNameRequired {
                name: raw.to_string(),
            });
        }
        if segments.last() == Some(&"*") {
            let prefix = segments[..segments.len() - 1]
                .iter()
                .map(|s| s.to_string())
                .collect();
            return Ok(Name::Wildcard(prefix));
        }
        if segments.len() == 1 {
            Ok(Name::Simple(segments[0].to_string()))
        } else {
            Ok(Name::Fqn(segments.iter().map(|s| s.to_string()).collect()))
        }
    }

    /// Constructs a simple name, rejecting dotted input.
    pub fn simple(raw: &str) -> Result<Self, DbError> {
        if raw.is_empty() || raw.contains('.') || raw.contains('*') {
            return Err(DbError::SimpleNameRequired {
                name: raw.to_string(),
            });
        }
        Ok(Name::Simple(raw.to_string()))
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, Name::Simple(_))
    }

    /// Last path segment (the object's own name).
    pub fn leaf(&self) -> &str {
        match self {
            Name::Simple(s) => s,
            Name::Fqn(segs) => segs.last().map(String::as_str).unwrap_or(""),
            Name::Wildcard(segs) => segs.last().map(String::as_str).unwrap_or(""),
        }
    }

    /// True if `other` falls under this name (wildcards match by prefix).
    pub fn matches(&self, other: &Name) -> bool {
        match self {
            Name::Wildcard(prefix) => {
                let segs = other.segments();
                segs.len() >= prefix.len() && segs[..prefix.len()] == prefix[..]
            }
            _ => self == other,
        }
    }

    fn segments(&self) -> Vec<&str> {
        match self {
            Name::Simple(s) => vec![s.as_str()],
            Name::Fqn(segs) | Name::Wildcard(segs) => {
                segs.iter().map(String::as_str).collect()
            }
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Simple(s) => write!(f, "{}", s),
            Name::Fqn(segs) => write!(f, "{}", segs.join(".")),
            Name::Wildcard(segs) => {
                if segs.is_empty() {
                    write!(f, "*")
                } else {
                    write!(f, "{}.*", segs.join("."))
                }
            }
        }
    }
}
