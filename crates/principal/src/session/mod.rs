//! Session abstraction.
//!
//! The [`Session`] trait is the only way the reconciler talks to a
//! server, allowing for different implementations:
//! - [`mongosh::MongoshSession`] runs commands through the `mongosh` shell
//! - [`memory::MemorySession`] emulates the user commands in memory
//!
//! One session is shared by every operation in a run, possibly from
//! several threads at once.

pub mod memory;
pub mod mongosh;

use crate::command::CommandRequest;
use crate::error::Result;
use std::time::Instant;

/// Executes administrative commands against a server.
pub trait Session: Send + Sync {
    /// Run `command` against the logical database `database`.
    ///
    /// Returns the raw reply document. A reply with `ok: 0` is still a
    /// reply; only transport failures are errors. Implementations must
    /// give up at `deadline` with [`crate::Error::DeadlineExceeded`].
    fn execute(
        &self,
        database: &str,
        command: &CommandRequest,
        deadline: Instant,
    ) -> Result<serde_json::Value>;
}

impl<S: Session + ?Sized> Session for &S {
    fn execute(
        &self,
        database: &str,
        command: &CommandRequest,
        deadline: Instant,
    ) -> Result<serde_json::Value> {
        (**self).execute(database, command, deadline)
    }
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn execute(
        &self,
        database: &str,
        command: &CommandRequest,
        deadline: Instant,
    ) -> Result<serde_json::Value> {
        (**self).execute(database, command, deadline)
    }
}

impl<S: Session + ?Sized> Session for std::sync::Arc<S> {
    fn execute(
        &self,
        database: &str,
        command: &CommandRequest,
        deadline: Instant,
    ) -> Result<serde_json::Value> {
        (**self).execute(database, command, deadline)
    }
}
