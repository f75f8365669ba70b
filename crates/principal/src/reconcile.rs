//! Reconciliation of one user against the server.
//!
//! A managed user moves through `Unmanaged -> Created -> (Updated)* ->
//! Deleted`. Each operation is one round trip, plus the read that create
//! and update finish with so the record reflects what the server stored.
//! Errors from the session or the decoder are returned as they are; the
//! only failure turned into success is dropping a user that is already
//! gone.

use crate::command::{self, CommandRequest};
use crate::error::{Error, Result};
use crate::ids::ResourceId;
use crate::response::{self, CommandResponse};
use crate::roles;
use crate::session::Session;
use crate::types::{Password, Principal};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Default time allowed for one round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-operation round-trip timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    /// The same timeout for every operation
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

/// A user record together with its identifier.
///
/// `id` is `None` while the user is unmanaged, and again after a read
/// finds that the user no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalState {
    pub id: Option<ResourceId>,
    pub principal: Principal,
}

impl PrincipalState {
    /// A record that has not been created yet
    pub fn unmanaged(principal: Principal) -> Self {
        Self {
            id: None,
            principal,
        }
    }

    /// A record known by identifier
    pub fn managed(id: ResourceId, principal: Principal) -> Self {
        Self {
            id: Some(id),
            principal,
        }
    }

    pub fn exists(&self) -> bool {
        self.id.is_some()
    }
}

/// Runs the user lifecycle against a [`Session`].
#[derive(Debug)]
pub struct Reconciler<S> {
    session: S,
    timeouts: Timeouts,
}

impl<S: Session> Reconciler<S> {
    pub fn new(session: S) -> Self {
        Self::with_timeouts(session, Timeouts::default())
    }

    pub fn with_timeouts(session: S, timeouts: Timeouts) -> Self {
        Self { session, timeouts }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn round_trip(
        &self,
        database: &str,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        debug!(
            "{} {} against {} (timeout {}s)",
            request.name(),
            request.user(),
            database,
            timeout.as_secs()
        );
        let deadline = Instant::now().checked_add(timeout).ok_or_else(|| {
            Error::invalid(
                "timeout",
                format!("{}s is too large for a deadline", timeout.as_secs()),
            )
        })?;
        self.session.execute(database, request, deadline)
    }

    /// Send `request` and fail unless the server acknowledged it.
    fn acknowledged(
        &self,
        database: &str,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<CommandResponse> {
        let raw = self.round_trip(database, request, timeout)?;
        let reply = response::decode(request, &raw)?;
        reply.ack().check(request.name())?;
        Ok(reply)
    }

    /// Create the user and read it back.
    ///
    /// `state.id` is set as soon as the server acknowledges the create.
    /// If the read that follows fails, the error is returned with the
    /// identifier in place, so the caller keeps tracking a user that
    /// exists. Any earlier failure leaves `state` unmanaged.
    pub fn create(&self, state: &mut PrincipalState) -> Result<()> {
        if let Some(id) = &state.id {
            return Err(Error::invalid("identifier", format!("{id} is already managed")));
        }
        let principal = &state.principal;
        let id = ResourceId::encode(&principal.database, &principal.name)?;
        let request = command::encode_create(principal)?;
        self.acknowledged(&principal.database, &request, self.timeouts.create)?;

        info!("created user {}", principal.display_name());
        state.id = Some(id);
        self.read(state)
    }

    /// Refresh the record from the server.
    ///
    /// Clears `state.id` when the user does not exist. The password is
    /// kept as is; the server never returns it. Grants are rebuilt from
    /// the reply with the record's current grants as the declared side.
    pub fn read(&self, state: &mut PrincipalState) -> Result<()> {
        let Some(id) = state.id.clone() else {
            return Ok(());
        };
        let (database, name) = id.decode()?;

        let request = command::encode_fetch(name)?;
        let users = self
            .acknowledged(database, &request, self.timeouts.read)?
            .into_users();

        let Some(user) = users.first() else {
            info!("user {name}@{database} no longer exists");
            state.id = None;
            return Ok(());
        };
        if users.len() > 1 {
            warn!(
                "usersInfo returned {} users for {name}@{database}, using the first",
                users.len()
            );
        }

        let grants = roles::diff_for_readback(&state.principal.grants, &user.roles);
        state.principal.database.clone_from(&user.db);
        state.principal.name.clone_from(&user.user);
        state.principal.grants = grants;
        Ok(())
    }

    /// Replace the password and grants, then read back.
    ///
    /// Database and username are the identity; a record that disagrees
    /// with its identifier needs recreating, not updating.
    pub fn update(&self, state: &mut PrincipalState) -> Result<()> {
        let id = state
            .id
            .clone()
            .ok_or_else(|| Error::invalid("identifier", "cannot update an unmanaged user"))?;
        let (database, name) = id.decode()?;
        if state.principal.database != database {
            return Err(Error::IdentityChanged {
                attribute: "database",
                from: database.to_string(),
                to: state.principal.database.clone(),
            });
        }
        if state.principal.name != name {
            return Err(Error::IdentityChanged {
                attribute: "username",
                from: name.to_string(),
                to: state.principal.name.clone(),
            });
        }

        let request = command::encode_update(&state.principal)?;
        self.acknowledged(database, &request, self.timeouts.update)?;

        info!("updated user {}", state.principal.display_name());
        self.read(state)
    }

    /// Drop the user. A user that is already gone counts as dropped.
    pub fn delete(&self, id: &ResourceId) -> Result<()> {
        let (database, name) = id.decode()?;
        let request = command::encode_drop(name)?;
        match self.acknowledged(database, &request, self.timeouts.delete) {
            Ok(_) => {
                info!("dropped user {name}@{database}");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!("user {name}@{database} was already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the user exists, by way of [`Reconciler::read`].
    pub fn exists(&self, state: &PrincipalState) -> Result<bool> {
        let mut current = state.clone();
        self.read(&mut current)?;
        Ok(current.exists())
    }

    /// Read a user that is not yet tracked.
    ///
    /// Returns `None` when it does not exist. Grants come back with
    /// explicit databases and the password is empty.
    pub fn import(&self, id: &ResourceId) -> Result<Option<PrincipalState>> {
        let (database, name) = id.decode()?;
        let principal = Principal::new(database, name, Password::default());
        let mut state = PrincipalState::managed(id.clone(), principal);
        self.read(&mut state)?;
        Ok(state.exists().then_some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandRequest;
    use crate::session::memory::{Fault, MemorySession};
    use crate::types::{ResolvedGrant, RoleGrant};
    use serde_json::json;

    fn reconciler() -> Reconciler<MemorySession> {
        Reconciler::new(MemorySession::new())
    }

    fn created<S: Session>(r: &Reconciler<S>, principal: Principal) -> PrincipalState {
        let mut state = PrincipalState::unmanaged(principal);
        r.create(&mut state).unwrap();
        state
    }

    fn bare_user() -> Principal {
        Principal::new("testing", "user", Password::new("pass"))
    }

    fn user_with_roles() -> Principal {
        bare_user()
            .with_grant(RoleGrant::inherited("readWrite"))
            .with_grant(RoleGrant::on("dbAdmin", "testing"))
            .with_grant(RoleGrant::on("read", "admin"))
    }

    #[test]
    fn test_create_without_roles() {
        let r = reconciler();
        let state = created(&r, bare_user());

        assert_eq!(state.id.as_ref().map(ResourceId::as_str), Some("testing.user"));
        assert!(state.principal.grants.is_empty());
        assert_eq!(state.principal.secret.expose(), "pass");
        assert_eq!(r.session().command_names(), vec!["createUser", "usersInfo"]);
    }

    #[test]
    fn test_create_resolves_roles_and_keeps_elision() {
        let r = reconciler();
        let state = created(&r, user_with_roles());

        let history = r.session().history();
        assert_eq!(history[0].database, "testing");
        let CommandRequest::CreateUser(create) = &history[0].request else {
            panic!("first command should be createUser");
        };
        assert_eq!(
            create.roles,
            vec![
                ResolvedGrant::new("readWrite", "testing"),
                ResolvedGrant::new("dbAdmin", "testing"),
                ResolvedGrant::new("read", "admin"),
            ]
        );

        assert_eq!(state.principal.grants, user_with_roles().grants);
    }

    #[test]
    fn test_create_existing_user_fails_without_id() {
        let r = reconciler();
        r.session().insert_user("testing", "user", "other", vec![]);

        let mut state = PrincipalState::unmanaged(bare_user());
        let err = r.create(&mut state).unwrap_err();
        assert!(matches!(err, Error::Command { command: "createUser", .. }));
        assert!(!state.exists());
        assert_eq!(r.session().command_names(), vec!["createUser"]);
    }

    #[test]
    fn test_create_connection_error_is_surfaced() {
        let r = reconciler();
        r.session()
            .push_fault(Fault::Connection("connection refused".to_string()));

        let mut state = PrincipalState::unmanaged(bare_user());
        let err = r.create(&mut state).unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(!state.exists());
        assert_eq!(r.session().user_count(), 0);
    }

    #[test]
    fn test_create_keeps_id_when_read_back_fails() {
        let r = reconciler();
        r.session().push_fault(Fault::Pass);
        r.session()
            .push_fault(Fault::Connection("connection reset".to_string()));

        let mut state = PrincipalState::unmanaged(user_with_roles());
        let err = r.create(&mut state).unwrap_err();

        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(state.id.as_ref().map(ResourceId::as_str), Some("testing.user"));
        assert!(r.session().user("testing", "user").is_some());
        assert_eq!(r.session().command_names(), vec!["createUser", "usersInfo"]);

        r.read(&mut state).unwrap();
        assert_eq!(state.principal.grants, user_with_roles().grants);
    }

    #[test]
    fn test_create_refuses_managed_state() {
        let r = reconciler();
        let mut state = created(&r, bare_user());
        assert!(matches!(
            r.create(&mut state),
            Err(Error::InvalidInput { .. })
        ));
        assert_eq!(r.session().command_names(), vec!["createUser", "usersInfo"]);
    }

    #[test]
    fn test_create_rejects_dotted_database_before_sending() {
        let r = reconciler();
        let mut state =
            PrincipalState::unmanaged(Principal::new("my.db", "user", Password::new("pass")));
        assert!(r.create(&mut state).is_err());
        assert!(r.session().history().is_empty());
    }

    #[test]
    fn test_read_missing_user_clears_id() {
        let r = reconciler();
        let mut state = created(&r, bare_user());
        r.session().remove_user("testing", "user");

        r.read(&mut state).unwrap();
        assert!(state.id.is_none());
        assert!(!r.exists(&state).unwrap());
    }

    #[test]
    fn test_read_without_id_is_a_no_op() {
        let r = reconciler();
        let mut state = PrincipalState::unmanaged(bare_user());
        r.read(&mut state).unwrap();
        assert!(r.session().history().is_empty());
    }

    #[test]
    fn test_read_malformed_identifier() {
        let r = reconciler();
        let mut state = PrincipalState::managed(ResourceId::from_stored("nodot"), bare_user());
        assert!(matches!(
            r.read(&mut state),
            Err(Error::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn test_read_takes_first_of_several_users() {
        let r = reconciler();
        r.session().push_fault(Fault::Reply(json!({
            "users": [
                {"_id": "testing.user", "user": "user", "db": "testing",
                 "roles": [{"role": "read", "db": "testing"}]},
                {"_id": "testing.user2", "user": "user2", "db": "testing", "roles": []},
            ],
            "ok": 1,
        })));

        let mut state = PrincipalState::managed(
            ResourceId::encode("testing", "user").unwrap(),
            bare_user().with_grant(RoleGrant::inherited("read")),
        );
        r.read(&mut state).unwrap();
        assert!(state.exists());
        assert_eq!(state.principal.name, "user");
        assert_eq!(state.principal.grants, vec![RoleGrant::inherited("read")]);
    }

    #[test]
    fn test_read_reports_out_of_band_role_changes() {
        let r = reconciler();
        let mut state = created(&r, user_with_roles());
        r.session().set_roles(
            "testing",
            "user",
            vec![ResolvedGrant::new("readWrite", "testing")],
        );

        r.read(&mut state).unwrap();
        assert_eq!(state.principal.grants, vec![RoleGrant::inherited("readWrite")]);
    }

    #[test]
    fn test_read_decode_error() {
        let r = reconciler();
        r.session().push_fault(Fault::Reply(json!({"users": "nope", "ok": 1})));
        let mut state =
            PrincipalState::managed(ResourceId::encode("testing", "user").unwrap(), bare_user());

        let err = r.read(&mut state).unwrap_err();
        assert!(matches!(err, Error::Decode { command: "usersInfo", .. }));
        assert!(state.exists());
    }

    #[test]
    fn test_update_password_only() {
        let r = reconciler();
        let mut state = created(&r, bare_user());

        state.principal.secret = Password::new("rotated");
        r.update(&mut state).unwrap();

        assert_eq!(state.principal.database, "testing");
        assert_eq!(state.principal.name, "user");
        assert_eq!(state.id.as_ref().map(ResourceId::as_str), Some("testing.user"));
        assert_eq!(
            r.session().user("testing", "user").unwrap().password.expose(),
            "rotated"
        );
        assert_eq!(
            r.session().command_names(),
            vec!["createUser", "usersInfo", "updateUser", "usersInfo"]
        );
    }

    #[test]
    fn test_update_replaces_roles() {
        let r = reconciler();
        let mut state = created(&r, user_with_roles());

        state.principal.grants = vec![RoleGrant::on("read", "admin")];
        r.update(&mut state).unwrap();

        assert_eq!(state.principal.grants, vec![RoleGrant::on("read", "admin")]);
        assert_eq!(
            r.session().user("testing", "user").unwrap().roles,
            vec![ResolvedGrant::new("read", "admin")]
        );
    }

    #[test]
    fn test_update_refuses_identity_change() {
        let r = reconciler();
        let mut state = created(&r, bare_user());
        state.principal.name = "renamed".to_string();

        let err = r.update(&mut state).unwrap_err();
        assert!(matches!(err, Error::IdentityChanged { attribute: "username", .. }));
        assert_eq!(r.session().command_names(), vec!["createUser", "usersInfo"]);
    }

    #[test]
    fn test_update_unmanaged_user() {
        let r = reconciler();
        let mut state = PrincipalState::unmanaged(bare_user());
        assert!(r.update(&mut state).is_err());
    }

    #[test]
    fn test_update_missing_user_is_command_error() {
        let r = reconciler();
        let mut state =
            PrincipalState::managed(ResourceId::encode("testing", "user").unwrap(), bare_user());
        let err = r.update(&mut state).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete() {
        let r = reconciler();
        let state = created(&r, bare_user());
        let id = state.id.unwrap();

        r.delete(&id).unwrap();
        assert!(r.session().user("testing", "user").is_none());
    }

    #[test]
    fn test_delete_missing_user_is_success() {
        let r = reconciler();
        let id = ResourceId::encode("testing", "ghost").unwrap();
        r.delete(&id).unwrap();
        r.delete(&id).unwrap();
    }

    #[test]
    fn test_delete_other_failures_are_surfaced() {
        let r = reconciler();
        r.session().push_fault(Fault::Reply(json!({
            "ok": 0,
            "errmsg": "not authorized on testing to execute command",
            "code": 13,
            "codeName": "Unauthorized",
        })));
        let id = ResourceId::encode("testing", "user").unwrap();

        let err = r.delete(&id).unwrap_err();
        assert!(matches!(err, Error::Command { code: Some(13), .. }));
    }

    #[test]
    fn test_delete_timeout_is_surfaced() {
        let r = reconciler();
        r.session().push_fault(Fault::Timeout);
        let id = ResourceId::encode("testing", "user").unwrap();
        assert!(r.delete(&id).unwrap_err().is_deadline_exceeded());
        assert_eq!(r.session().command_names(), vec!["dropUser"]);
    }

    /// Records the deadline of every command it forwards.
    struct DeadlineRecorder {
        inner: MemorySession,
        deadlines: std::sync::Mutex<Vec<(&'static str, Instant)>>,
    }

    impl Session for DeadlineRecorder {
        fn execute(
            &self,
            database: &str,
            command: &CommandRequest,
            deadline: Instant,
        ) -> Result<serde_json::Value> {
            self.deadlines
                .lock()
                .unwrap()
                .push((command.name(), deadline));
            self.inner.execute(database, command, deadline)
        }
    }

    #[test]
    fn test_each_operation_uses_its_timeout() {
        let timeouts = Timeouts {
            delete: Duration::from_secs(5),
            ..Timeouts::uniform(Duration::from_secs(3600))
        };
        let recorder = DeadlineRecorder {
            inner: MemorySession::new(),
            deadlines: std::sync::Mutex::new(Vec::new()),
        };
        let r = Reconciler::with_timeouts(recorder, timeouts);
        assert_eq!(r.timeouts(), timeouts);

        let state = created(&r, bare_user());
        r.delete(state.id.as_ref().unwrap()).unwrap();

        let soon = Instant::now() + Duration::from_secs(5);
        let deadlines = r.session().deadlines.lock().unwrap().clone();
        let names: Vec<_> = deadlines.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["createUser", "usersInfo", "dropUser"]);
        assert!(deadlines[0].1 > soon);
        assert!(deadlines[1].1 > soon);
        assert!(deadlines[2].1 <= soon);
    }

    #[test]
    fn test_unrepresentable_timeout_is_invalid_input() {
        let r = Reconciler::with_timeouts(
            MemorySession::new(),
            Timeouts::uniform(Duration::from_secs(u64::MAX)),
        );
        let id = ResourceId::encode("testing", "user").unwrap();

        let err = r.delete(&id).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { field: "timeout", .. }));
        assert!(r.session().history().is_empty());
    }

    #[test]
    fn test_exists_propagates_errors() {
        let r = reconciler();
        let state = created(&r, bare_user());
        assert!(r.exists(&state).unwrap());

        r.session().push_fault(Fault::Connection("reset".to_string()));
        assert!(r.exists(&state).is_err());
    }

    #[test]
    fn test_import() {
        let r = reconciler();
        r.session().insert_user(
            "testing",
            "user",
            "pass",
            vec![ResolvedGrant::new("readWrite", "testing")],
        );

        let id: ResourceId = "testing.user".parse().unwrap();
        let state = r.import(&id).unwrap().unwrap();
        assert_eq!(state.principal.grants, vec![RoleGrant::on("readWrite", "testing")]);
        assert!(state.principal.secret.is_empty());

        let missing: ResourceId = "testing.ghost".parse().unwrap();
        assert!(r.import(&missing).unwrap().is_none());
    }
}
