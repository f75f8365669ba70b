//! Administrative command payloads.
//!
//! Field names match what the server expects verbatim. The command name
//! is always the first key of the serialized document.

use crate::error::{Error, Result};
use crate::roles;
use crate::types::{Password, Principal, ResolvedGrant};
use serde::{Serialize, Serializer};

/// `createUser` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateUser {
    #[serde(rename = "createUser")]
    pub user: String,
    #[serde(rename = "pwd", serialize_with = "expose_password")]
    pub password: Password,
    pub roles: Vec<ResolvedGrant>,
}

/// `usersInfo` command. The database is chosen by addressing, not by a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsersInfo {
    #[serde(rename = "usersInfo")]
    pub user: String,
}

/// `updateUser` command. Replaces the password and the whole role list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateUser {
    #[serde(rename = "updateUser")]
    pub user: String,
    #[serde(rename = "pwd", serialize_with = "expose_password")]
    pub password: Password,
    pub roles: Vec<ResolvedGrant>,
}

/// `dropUser` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropUser {
    #[serde(rename = "dropUser")]
    pub user: String,
}

/// One of the four administrative commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandRequest {
    CreateUser(CreateUser),
    UsersInfo(UsersInfo),
    UpdateUser(UpdateUser),
    DropUser(DropUser),
}

impl CommandRequest {
    /// Wire name of the command, safe to log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateUser(_) => "createUser",
            Self::UsersInfo(_) => "usersInfo",
            Self::UpdateUser(_) => "updateUser",
            Self::DropUser(_) => "dropUser",
        }
    }

    /// Name of the user the command targets.
    pub fn user(&self) -> &str {
        match self {
            Self::CreateUser(c) => &c.user,
            Self::UsersInfo(c) => &c.user,
            Self::UpdateUser(c) => &c.user,
            Self::DropUser(c) => &c.user,
        }
    }

    /// Serialize to the command document. Contains the password for
    /// create/update; never log the result.
    pub fn to_document(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::invalid("command", e.to_string()))
    }
}

fn expose_password<S: Serializer>(
    password: &Password,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(password.expose())
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid(field, "must not be empty"));
    }
    Ok(())
}

/// Build the `createUser` command for a declared user.
pub fn encode_create(principal: &Principal) -> Result<CommandRequest> {
    require("database", &principal.database)?;
    require("username", &principal.name)?;
    Ok(CommandRequest::CreateUser(CreateUser {
        user: principal.name.clone(),
        password: principal.secret.clone(),
        roles: roles::resolve(&principal.grants, &principal.database),
    }))
}

/// Build the `usersInfo` command for a user name.
pub fn encode_fetch(name: &str) -> Result<CommandRequest> {
    require("username", name)?;
    Ok(CommandRequest::UsersInfo(UsersInfo {
        user: name.to_string(),
    }))
}

/// Build the full-replace `updateUser` command for a declared user.
pub fn encode_update(principal: &Principal) -> Result<CommandRequest> {
    require("database", &principal.database)?;
    require("username", &principal.name)?;
    Ok(CommandRequest::UpdateUser(UpdateUser {
        user: principal.name.clone(),
        password: principal.secret.clone(),
        roles: roles::resolve(&principal.grants, &principal.database),
    }))
}

/// Build the `dropUser` command for a user name.
pub fn encode_drop(name: &str) -> Result<CommandRequest> {
    require("username", name)?;
    Ok(CommandRequest::DropUser(DropUser {
        user: name.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoleGrant;
    use serde_json::json;

    fn principal() -> Principal {
        Principal::new("testing", "user", Password::new("pass"))
            .with_grant(RoleGrant::inherited("readWrite"))
            .with_grant(RoleGrant::on("dbAdmin", "testing"))
            .with_grant(RoleGrant::on("read", "admin"))
    }

    #[test]
    fn test_create_document() {
        let command = encode_create(&principal()).unwrap();
        assert_eq!(command.name(), "createUser");
        assert_eq!(
            command.to_document().unwrap(),
            json!({
                "createUser": "user",
                "pwd": "pass",
                "roles": [
                    {"role": "readWrite", "db": "testing"},
                    {"role": "dbAdmin", "db": "testing"},
                    {"role": "read", "db": "admin"},
                ],
            })
        );
    }

    #[test]
    fn test_command_name_is_first_key() {
        let create = serde_json::to_string(&encode_create(&principal()).unwrap()).unwrap();
        assert!(create.starts_with(r#"{"createUser":"user""#));

        let update = serde_json::to_string(&encode_update(&principal()).unwrap()).unwrap();
        assert!(update.starts_with(r#"{"updateUser":"user""#));
    }

    #[test]
    fn test_update_has_create_shape_without_database() {
        let document = encode_update(&principal()).unwrap().to_document().unwrap();
        let object = document.as_object().unwrap();
        let keys: Vec<&str> = object.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["updateUser", "pwd", "roles"]);
    }

    #[test]
    fn test_fetch_and_drop_documents() {
        assert_eq!(
            encode_fetch("user").unwrap().to_document().unwrap(),
            json!({"usersInfo": "user"})
        );
        assert_eq!(
            encode_drop("user").unwrap().to_document().unwrap(),
            json!({"dropUser": "user"})
        );
    }

    #[test]
    fn test_empty_grants_serialize_as_empty_array() {
        let bare = Principal::new("testing", "user", Password::new("pass"));
        let document = encode_create(&bare).unwrap().to_document().unwrap();
        assert_eq!(document["roles"], json!([]));
    }

    #[test]
    fn test_rejects_empty_identity() {
        let mut unnamed = principal();
        unnamed.name.clear();
        assert!(encode_create(&unnamed).is_err());
        assert!(encode_fetch("").is_err());
        assert!(encode_drop("").is_err());

        let mut homeless = principal();
        homeless.database.clear();
        assert!(encode_update(&homeless).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let command = encode_create(&principal()).unwrap();
        let rendered = format!("{command:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("\"pass\""));
    }
}
