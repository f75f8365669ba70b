//! Resource identifiers.
//!
//! A user is identified by `<database>.<username>`. The identifier is
//! derived, never assigned by the server, so it can be rebuilt from the
//! declared record and parsed without a round trip.
//!
//! Decoding splits on the first `.`. Database names can never contain a
//! `.`, so usernames with dots still round-trip; encoding rejects a
//! database that contains one.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Separator between database and username.
pub const SEPARATOR: char = '.';

/// Opaque identifier of a managed user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    /// Derive the identifier for `name` in `database`.
    pub fn encode(database: &str, name: &str) -> Result<Self> {
        if database.is_empty() {
            return Err(Error::invalid("database", "must not be empty"));
        }
        if name.is_empty() {
            return Err(Error::invalid("username", "must not be empty"));
        }
        if database.contains(SEPARATOR) {
            return Err(Error::invalid(
                "database",
                format!("{database:?} contains the identifier separator '{SEPARATOR}'"),
            ));
        }
        Ok(Self(format!("{database}{SEPARATOR}{name}")))
    }

    /// Split the identifier into `(database, name)`.
    pub fn decode(&self) -> Result<(&str, &str)> {
        match self.0.split_once(SEPARATOR) {
            Some((database, name)) if !database.is_empty() && !name.is_empty() => {
                Ok((database, name))
            }
            _ => Err(Error::MalformedIdentifier(self.0.clone())),
        }
    }

    /// Parse and validate an identifier string, e.g. from an import request.
    pub fn parse(raw: &str) -> Result<Self> {
        let id = Self(raw.to_string());
        id.decode()?;
        Ok(id)
    }

    /// Wrap an identifier loaded from the state file without validating it.
    ///
    /// Validation happens on the next decode, which reports
    /// [`Error::MalformedIdentifier`] for corrupted state.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
