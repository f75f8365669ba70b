//! Command implementations

pub mod import;
pub mod reconcile;
pub mod show;

use anyhow::{Context as AnyhowContext, Result};
use principal::session::mongosh::{ConnectionConfig, MongoshSession};
use principal::{Password, Reconciler, Timeouts};
use std::time::Duration;

use crate::Context;
use crate::cli::ConnectionArgs;

/// Connection parameters as the session expects them
fn connection_config(args: &ConnectionArgs) -> ConnectionConfig {
    ConnectionConfig {
        uri: args.uri.clone(),
        username: args.username.clone(),
        password: args.password.clone().map(Password::new),
        auth_database: args.auth_database.clone(),
    }
}

/// Build a reconciler talking to the configured server
pub fn connect(ctx: &Context) -> Result<Reconciler<MongoshSession>> {
    let args = &ctx.connection;
    let config = connection_config(args);
    let session = match &args.mongosh {
        Some(path) => MongoshSession::with_binary(path.clone(), config),
        None => MongoshSession::new(config)
            .context("Could not find mongosh (install it or pass --mongosh)")?,
    };

    log::debug!("Using server {} (timeout {}s)", args.uri, args.timeout);
    let timeouts = Timeouts::uniform(Duration::from_secs(args.timeout));
    Ok(Reconciler::with_timeouts(session, timeouts))
}
