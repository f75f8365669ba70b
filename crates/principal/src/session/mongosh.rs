//! Session that runs commands through the `mongosh` shell.
//!
//! Each command is one `mongosh --eval` invocation. The command document
//! and the credentials reach the script through the child's environment,
//! never its arguments, so they do not show up in process listings. The
//! script prints the reply as relaxed Extended JSON on its last line.

use crate::command::CommandRequest;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::Password;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const ENV_COMMAND: &str = "USERCTL_COMMAND";
const ENV_DATABASE: &str = "USERCTL_DATABASE";
const ENV_AUTH_USER: &str = "USERCTL_AUTH_USER";
const ENV_AUTH_PASSWORD: &str = "USERCTL_AUTH_PASSWORD";
const ENV_AUTH_DATABASE: &str = "USERCTL_AUTH_DATABASE";

/// How often a running child is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Only errors the server answered with become an `ok: 0` reply.
/// Anything else (authentication, network, selection timeouts) is
/// rethrown so mongosh exits non-zero.
const SCRIPT: &str = r"
const env = process.env;
if (env.USERCTL_AUTH_USER) {
  db.getSiblingDB(env.USERCTL_AUTH_DATABASE).auth(env.USERCTL_AUTH_USER, env.USERCTL_AUTH_PASSWORD);
}
let reply;
try {
  reply = db.getSiblingDB(env.USERCTL_DATABASE).runCommand(EJSON.parse(env.USERCTL_COMMAND));
} catch (e) {
  if (e.name !== 'MongoServerError') throw e;
  reply = { ok: 0, errmsg: e.message, code: e.code, codeName: e.codeName };
}
print(EJSON.stringify(reply, { relaxed: true }));
";

/// Default server when no URI is configured.
pub const DEFAULT_URI: &str = "mongodb://localhost:27017";

/// Connection parameters for [`MongoshSession`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server URI
    pub uri: String,
    /// Administrative user; authentication is skipped unless both
    /// username and password are set
    pub username: Option<String>,
    pub password: Option<Password>,
    /// Database holding the administrative user
    pub auth_database: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            username: None,
            password: None,
            auth_database: "admin".to_string(),
        }
    }
}

impl ConnectionConfig {
    fn credentials(&self) -> Option<(&str, &Password)> {
        match (self.username.as_deref(), self.password.as_ref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        }
    }
}

/// Session that shells out to `mongosh`.
#[derive(Debug)]
pub struct MongoshSession {
    /// Path to the mongosh executable
    mongosh_path: String,
    config: ConnectionConfig,
}

impl MongoshSession {
    /// Create a session using `mongosh` from `PATH`.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let mongosh_path = find_mongosh()?;
        Ok(Self::with_binary(mongosh_path, config))
    }

    /// Create a session using a specific mongosh executable.
    pub fn with_binary(mongosh_path: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            mongosh_path: mongosh_path.into(),
            config,
        }
    }

    fn spawn(&self, database: &str, document: &str) -> Result<Child> {
        let mut command = Command::new(&self.mongosh_path);
        command
            .args([self.config.uri.as_str(), "--quiet", "--norc", "--eval", SCRIPT])
            .env(ENV_COMMAND, document)
            .env(ENV_DATABASE, database)
            .env_remove(ENV_AUTH_USER)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some((user, password)) = self.config.credentials() {
            command
                .env(ENV_AUTH_USER, user)
                .env(ENV_AUTH_PASSWORD, password.expose())
                .env(ENV_AUTH_DATABASE, &self.config.auth_database);
        }

        command.spawn().map_err(|e| Error::Connection {
            message: format!("failed to execute {}: {e}", self.mongosh_path),
        })
    }
}

impl Session for MongoshSession {
    fn execute(
        &self,
        database: &str,
        command: &CommandRequest,
        deadline: Instant,
    ) -> Result<serde_json::Value> {
        let document = command.to_document()?.to_string();
        let started = Instant::now();
        log::trace!("mongosh {} against {}", command.name(), database);

        let mut child = self.spawn(database, &document)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    // Already exited or killed, either way there is nothing to reap
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::DeadlineExceeded {
                        command: command.name(),
                        database: database.to_string(),
                        elapsed_ms: started.elapsed().as_millis(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(Error::Connection {
                        message: format!("failed to wait for mongosh: {e}"),
                    });
                }
            }
        };

        let stdout = join(stdout);
        let stderr = join(stderr);

        if !status.success() {
            return Err(Error::Connection {
                message: first_non_empty(&stderr, &stdout)
                    .unwrap_or_else(|| format!("mongosh exited with {status}")),
            });
        }

        parse_reply(command.name(), &stdout)
    }
}

type Reader = thread::JoinHandle<String>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Reader> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(reader: Option<Reader>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn first_non_empty(first: &str, second: &str) -> Option<String> {
    [first, second]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse the reply from the last non-empty line of mongosh output.
fn parse_reply(command: &'static str, stdout: &str) -> Result<serde_json::Value> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| Error::Decode {
            command,
            message: "mongosh printed no reply".to_string(),
            raw: stdout.to_string(),
        })?;

    serde_json::from_str(line).map_err(|e| Error::Decode {
        command,
        message: e.to_string(),
        raw: stdout.to_string(),
    })
}

/// Find the mongosh executable path.
fn find_mongosh() -> Result<String> {
    let output = Command::new("which")
        .arg("mongosh")
        .output()
        .map_err(|e| Error::Connection {
            message: format!("cannot locate mongosh: {e}"),
        })?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(path);
        }
    }

    Err(Error::Connection {
        message: "mongosh not found in PATH".to_string(),
    })
}
