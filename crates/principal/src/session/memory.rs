//! In-memory session.
//!
//! Emulates `createUser`, `usersInfo`, `updateUser` and `dropUser` the way
//! a server answers them, including the `ok: 0` replies for duplicate and
//! missing users. Every command is recorded, and faults can be queued to
//! exercise error paths.

use crate::command::CommandRequest;
use crate::error::{Error, Result, USER_NOT_FOUND_CODE, USER_NOT_FOUND_NAME};
use crate::session::Session;
use crate::types::{Password, ResolvedGrant};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Server error code for creating a user that exists.
const USER_EXISTS_CODE: i32 = 51003;

/// A user as stored by the emulated server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub password: Password,
    pub roles: Vec<ResolvedGrant>,
}

/// A command as received by the emulated server.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub database: String,
    pub request: CommandRequest,
}

/// Fault returned instead of executing the next command.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Execute the command normally
    Pass,
    /// Answer with this raw reply
    Reply(serde_json::Value),
    /// Fail as if the server were unreachable
    Connection(String),
    /// Fail as if the deadline had passed
    Timeout,
}

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<(String, String), StoredUser>,
    history: Vec<RecordedCommand>,
    faults: VecDeque<Fault>,
}

/// Session backed by an in-memory user table.
#[derive(Debug, Default)]
pub struct MemorySession {
    inner: Mutex<Inner>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add a user directly, bypassing the command path.
    pub fn insert_user(
        &self,
        database: &str,
        name: &str,
        password: &str,
        roles: Vec<ResolvedGrant>,
    ) {
        self.lock().users.insert(
            (database.to_string(), name.to_string()),
            StoredUser {
                password: Password::new(password),
                roles,
            },
        );
    }

    /// Remove a user directly, as an out-of-band change would.
    pub fn remove_user(&self, database: &str, name: &str) -> bool {
        self.lock()
            .users
            .remove(&(database.to_string(), name.to_string()))
            .is_some()
    }

    /// Replace a user's roles directly.
    pub fn set_roles(&self, database: &str, name: &str, roles: Vec<ResolvedGrant>) -> bool {
        match self
            .lock()
            .users
            .get_mut(&(database.to_string(), name.to_string()))
        {
            Some(user) => {
                user.roles = roles;
                true
            }
            None => false,
        }
    }

    pub fn user(&self, database: &str, name: &str) -> Option<StoredUser> {
        self.lock()
            .users
            .get(&(database.to_string(), name.to_string()))
            .cloned()
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    /// Commands received so far, oldest first.
    pub fn history(&self) -> Vec<RecordedCommand> {
        self.lock().history.clone()
    }

    /// Names of the commands received so far, oldest first.
    pub fn command_names(&self) -> Vec<&'static str> {
        self.lock().history.iter().map(|c| c.request.name()).collect()
    }

    /// Queue a fault for the next command.
    pub fn push_fault(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    fn apply(inner: &mut Inner, database: &str, request: &CommandRequest) -> serde_json::Value {
        let key = (database.to_string(), request.user().to_string());
        match request {
            CommandRequest::CreateUser(create) => {
                if inner.users.contains_key(&key) {
                    return json!({
                        "ok": 0,
                        "errmsg": format!("User \"{}@{}\" already exists", create.user, database),
                        "code": USER_EXISTS_CODE,
                        "codeName": format!("Location{USER_EXISTS_CODE}"),
                    });
                }
                inner.users.insert(
                    key,
                    StoredUser {
                        password: create.password.clone(),
                        roles: create.roles.clone(),
                    },
                );
                json!({"ok": 1})
            }
            CommandRequest::UsersInfo(fetch) => {
                let users: Vec<serde_json::Value> = inner
                    .users
                    .get(&key)
                    .map(|stored| {
                        json!({
                            "_id": format!("{database}.{}", fetch.user),
                            "user": fetch.user,
                            "db": database,
                            "roles": stored.roles,
                            "mechanisms": ["SCRAM-SHA-1", "SCRAM-SHA-256"],
                        })
                    })
                    .into_iter()
                    .collect();
                json!({"users": users, "ok": 1})
            }
            CommandRequest::UpdateUser(update) => match inner.users.get_mut(&key) {
                Some(stored) => {
                    stored.password = update.password.clone();
                    stored.roles = update.roles.clone();
                    json!({"ok": 1})
                }
                None => not_found(&update.user, database),
            },
            CommandRequest::DropUser(drop) => match inner.users.remove(&key) {
                Some(_) => json!({"ok": 1}),
                None => not_found(&drop.user, database),
            },
        }
    }
}

fn not_found(user: &str, database: &str) -> serde_json::Value {
    json!({
        "ok": 0,
        "errmsg": format!("User {user}@{database} not found"),
        "code": USER_NOT_FOUND_CODE,
        "codeName": USER_NOT_FOUND_NAME,
    })
}

impl Session for MemorySession {
    fn execute(
        &self,
        database: &str,
        command: &CommandRequest,
        deadline: Instant,
    ) -> Result<serde_json::Value> {
        let mut inner = self.lock();
        inner.history.push(RecordedCommand {
            database: database.to_string(),
            request: command.clone(),
        });

        let timeout = || Error::DeadlineExceeded {
            command: command.name(),
            database: database.to_string(),
            elapsed_ms: 0,
        };

        match inner.faults.pop_front() {
            Some(Fault::Reply(reply)) => return Ok(reply),
            Some(Fault::Connection(message)) => return Err(Error::Connection { message }),
            Some(Fault::Timeout) => return Err(timeout()),
            Some(Fault::Pass) | None => {}
        }

        if Instant::now() > deadline {
            return Err(timeout());
        }

        Ok(Self::apply(&mut inner, database, command))
    }
}
