//! Roster file parsing: identities and the members listed under each.
//!
//! ```text
//! 1. Alice Smith
//!    a. Bob
//!    b. Carol
//! 2. Dave Jones
//!    - Erin
//! ```
//!
//! A line starting with a digit that contains `.` opens an identity. Lines
//! starting with a letter, `-` or `.` under it are members.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("roster line {line}: identity {name:?} is listed twice")]
    DuplicateIdentity { line: usize, name: String },
    #[error("roster line {line}: entry has an empty name")]
    EmptyName { line: usize },
}

/// Identity name → ordered member names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberList {
    members: HashMap<String, Vec<String>>,
}

impl MemberList {
    /// Members listed under `identity`; empty for unknown identities.
    pub fn members_of(&self, identity: &str) -> &[String] {
        self.members
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.members.contains_key(identity)
    }

    pub fn insert(&mut self, identity: impl Into<String>, members: Vec<String>) {
        self.members.insert(identity.into(), members);
    }
}

/// Parsed roster: identity names in listing order plus their members.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub identities: Vec<String>,
    pub members: MemberList,
}

impl Roster {
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let text = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let roster = Self::parse(&text)?;
        tracing::info!(
            path = %path.display(),
            identities = roster.identities.len(),
            "roster loaded"
        );
        Ok(roster)
    }

    pub fn parse(text: &str) -> Result<Self, RosterError> {
        let mut roster = Roster::default();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            let Some(first) = line.chars().next() else {
                continue;
            };

            if first.is_ascii_digit() && line.contains('.') {
                let name = after_marker(line);
                if name.is_empty() {
                    return Err(RosterError::EmptyName { line: line_no });
                }
                if roster.members.contains(name) {
                    return Err(RosterError::DuplicateIdentity {
                        line: line_no,
                        name: name.to_string(),
                    });
                }
                roster.identities.push(name.to_string());
                roster.members.insert(name, Vec::new());
                current = Some(name.to_string());
            } else if first.is_alphabetic() || first == '-' || first == '.' {
                let Some(identity) = current.as_ref() else {
                    tracing::debug!(line = line_no, "ignoring member line before any identity");
                    continue;
                };
                let name = after_marker(line);
                if name.is_empty() {
                    return Err(RosterError::EmptyName { line: line_no });
                }
                if let Some(list) = roster.members.members.get_mut(identity) {
                    list.push(name.to_string());
                }
            } else {
                tracing::debug!(line = line_no, "ignoring unrecognised roster line");
            }
        }

        Ok(roster)
    }
}

/// Text after the list marker: after the first `.`, or after a leading `-`.
fn after_marker(line: &str) -> &str {
    match line.split_once('.') {
        Some((_, rest)) => rest.trim(),
        None => line.strip_prefix('-').unwrap_or(line).trim(),
    }
}
