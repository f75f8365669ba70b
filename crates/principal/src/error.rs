//! Error types for user reconciliation.
//!
//! Errors are categorized so the caller can present them and decide on
//! retry policy. Nothing in this crate retries or swallows an error; the
//! single normalization is a drop of a user that is already gone.

use thiserror::Error;

/// Server error code for a user that does not exist.
pub const USER_NOT_FOUND_CODE: i32 = 11;

/// Server error code name for a user that does not exist.
pub const USER_NOT_FOUND_NAME: &str = "UserNotFound";

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The server could not be reached or authenticated against
    Connection,
    /// A round trip ran past its deadline
    Timeout,
    /// The server executed the command and reported a failure
    Command,
    /// The reply did not have the expected shape
    Decode,
    /// A resource identifier could not be decoded
    Identifier,
    /// The desired-state record was rejected before anything was sent
    Input,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Connection => "Cannot reach the database server",
            Self::Timeout => "Operation timed out",
            Self::Command => "Server rejected the command",
            Self::Decode => "Unexpected server reply",
            Self::Identifier => "Malformed resource identifier",
            Self::Input => "Invalid user definition",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Connection => "Check the server URI, credentials and that mongosh is installed",
            Self::Timeout => "Raise --timeout or check server load and network latency",
            Self::Command => "Check the server message; the user may already exist or be missing",
            Self::Decode => "The server or shell version may be unsupported",
            Self::Identifier => "Identifiers look like <database>.<username>; check the state file",
            Self::Input => "Fix the user definition in the configuration file",
        }
    }
}

/// Errors that can occur while reconciling a user.
#[derive(Debug, Error)]
pub enum Error {
    /// The session could not reach or authenticate to the server
    #[error("connection error: {message}")]
    Connection {
        /// Details reported by the session
        message: String,
    },

    /// The round trip did not finish before its deadline
    #[error("deadline exceeded after {elapsed_ms}ms running {command} against {database}")]
    DeadlineExceeded {
        /// Command name (e.g. `createUser`)
        command: &'static str,
        /// Logical database the command was addressed at
        database: String,
        /// Time spent before giving up
        elapsed_ms: u128,
    },

    /// The server replied `ok: 0`
    #[error("{command} failed: {message}")]
    Command {
        /// Command name (e.g. `dropUser`)
        command: &'static str,
        /// Numeric server error code, when reported
        code: Option<i32>,
        /// Symbolic server error code, when reported
        code_name: Option<String>,
        /// Server-provided message
        message: String,
    },

    /// The reply could not be interpreted
    #[error("cannot decode {command} reply: {message}")]
    Decode {
        /// Command name the reply belongs to
        command: &'static str,
        /// What was wrong with the reply
        message: String,
        /// Raw reply, for diagnostics
        raw: String,
    },

    /// The identifier has no separator or an empty half
    #[error("malformed identifier {0:?}: expected <database>.<username>")]
    MalformedIdentifier(String),

    /// A field of the desired-state record is unusable
    #[error("invalid {field}: {message}")]
    InvalidInput {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        message: String,
    },

    /// An update tried to change part of the identity
    #[error("{attribute} cannot change from {from:?} to {to:?} without recreating the user")]
    IdentityChanged {
        /// `database` or `username`
        attribute: &'static str,
        /// Value in the identifier
        from: String,
        /// Value in the record
        to: String,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connection { .. } => ErrorCategory::Connection,
            Error::DeadlineExceeded { .. } => ErrorCategory::Timeout,
            Error::Command { .. } => ErrorCategory::Command,
            Error::Decode { .. } => ErrorCategory::Decode,
            Error::MalformedIdentifier(_) => ErrorCategory::Identifier,
            Error::InvalidInput { .. } | Error::IdentityChanged { .. } => ErrorCategory::Input,
        }
    }

    /// Whether the server reported that the user does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Command {
                code, code_name, ..
            } => {
                *code == Some(USER_NOT_FOUND_CODE)
                    || code_name.as_deref() == Some(USER_NOT_FOUND_NAME)
            }
            _ => false,
        }
    }

    /// Whether the round trip was cut off by its deadline.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Error::DeadlineExceeded { .. })
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            field,
            message: message.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
