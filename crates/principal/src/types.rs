//! Core types for the managed user resource

use serde::{Deserialize, Serialize};
use std::fmt;

/// A user password.
///
/// The server never returns it, so it only ever travels from the
/// desired-state record into create/update payloads. `Debug` is redacted
/// so records can be logged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the plain-text value. Do not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Database of a declared role grant.
///
/// Keeps "operator omitted the database" apart from "operator wrote an
/// empty string". Both inherit the owning user's database when encoded;
/// read-back restores whichever spelling was declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum GrantDatabase {
    /// Not specified
    #[default]
    Elided,
    /// Specified as an empty string
    Empty,
    /// Specified explicitly
    Named(String),
}

impl GrantDatabase {
    pub fn named(database: impl Into<String>) -> Self {
        let database = database.into();
        if database.is_empty() {
            Self::Empty
        } else {
            Self::Named(database)
        }
    }

    pub fn is_elided(&self) -> bool {
        matches!(self, Self::Elided)
    }

    /// Whether this grant takes the owning user's database
    pub fn inherits(&self) -> bool {
        matches!(self, Self::Elided | Self::Empty)
    }

    /// The database this grant resolves to for a user in `owner`
    pub fn resolve<'a>(&'a self, owner: &'a str) -> &'a str {
        match self {
            Self::Named(database) => database,
            Self::Elided | Self::Empty => owner,
        }
    }
}

impl From<Option<String>> for GrantDatabase {
    fn from(value: Option<String>) -> Self {
        match value {
            None => Self::Elided,
            Some(database) => Self::named(database),
        }
    }
}

impl From<GrantDatabase> for Option<String> {
    fn from(value: GrantDatabase) -> Self {
        match value {
            GrantDatabase::Elided => None,
            GrantDatabase::Empty => Some(String::new()),
            GrantDatabase::Named(database) => Some(database),
        }
    }
}

impl fmt::Display for GrantDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elided => f.write_str("(inherited)"),
            Self::Empty => f.write_str("\"\""),
            Self::Named(database) => f.write_str(database),
        }
    }
}

/// A role granted to a user, as declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    #[serde(default, skip_serializing_if = "GrantDatabase::is_elided")]
    pub database: GrantDatabase,
}

impl RoleGrant {
    /// Grant whose database is inherited from the user
    pub fn inherited(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            database: GrantDatabase::Elided,
        }
    }

    /// Grant on an explicit database
    pub fn on(role: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            database: GrantDatabase::named(database),
        }
    }
}

impl fmt::Display for RoleGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            GrantDatabase::Elided => f.write_str(&self.role),
            database => write!(f, "{}@{}", self.role, database),
        }
    }
}

/// A role grant with an explicit database, as sent to and returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedGrant {
    pub role: String,
    pub db: String,
}

impl ResolvedGrant {
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

/// Desired state of a database user.
///
/// `database` and `name` form the identity and never change after
/// creation; `secret` and `grants` are replaced wholesale by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub database: String,
    pub name: String,
    pub secret: Password,
    pub grants: Vec<RoleGrant>,
}

impl Principal {
    pub fn new(database: impl Into<String>, name: impl Into<String>, secret: Password) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            secret,
            grants: Vec::new(),
        }
    }

    pub fn with_grant(mut self, grant: RoleGrant) -> Self {
        self.grants.push(grant);
        self
    }

    /// `username@database`, the way the server names users in messages
    pub fn display_name(&self) -> String {
        format!("{}@{}", self.name, self.database)
    }
}
