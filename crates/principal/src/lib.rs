//! # principal
//!
//! Reconcile declared MongoDB users and their role grants against a live
//! server.
//!
//! This crate provides:
//! - Resource identifiers derived from `<database>.<username>`
//! - Encoding of the `createUser`, `usersInfo`, `updateUser` and `dropUser`
//!   commands
//! - Role normalization, so grants declared without a database do not
//!   report drift
//! - A [`Reconciler`] implementing create, read, update, delete and exists
//!
//! ## Example
//!
//! ```no_run
//! use principal::session::mongosh::{ConnectionConfig, MongoshSession};
//! use principal::{Password, Principal, PrincipalState, Reconciler, RoleGrant};
//!
//! let session = MongoshSession::new(ConnectionConfig::default()).expect("mongosh not available");
//! let reconciler = Reconciler::new(session);
//!
//! let user = Principal::new("testing", "app", Password::new("s3cret"))
//!     .with_grant(RoleGrant::inherited("readWrite"))
//!     .with_grant(RoleGrant::on("read", "admin"));
//!
//! let mut state = PrincipalState::unmanaged(user);
//! let created = reconciler.create(&mut state);
//! if let Some(id) = &state.id {
//!     println!("managing {id}");
//! }
//! created.expect("create failed");
//! ```
//!
//! ## Sessions
//!
//! The reconciler never opens connections itself; it is handed a
//! [`Session`]. Use [`session::memory::MemorySession`] to test against an
//! emulated server.

pub mod command;
pub mod error;
pub mod ids;
pub mod reconcile;
pub mod response;
pub mod roles;
pub mod session;
pub mod types;

pub use command::CommandRequest;
pub use error::{Error, ErrorCategory, Result};
pub use ids::ResourceId;
pub use reconcile::{PrincipalState, Reconciler, Timeouts};
pub use response::{Ack, CommandResponse, UserInfo};
pub use session::Session;
pub use types::{GrantDatabase, Password, Principal, ResolvedGrant, RoleGrant};
