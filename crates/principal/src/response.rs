//! Reply decoding.
//!
//! A reply that parses is a success at this layer even when it says
//! `ok: 0`; the flag and the server's detail are handed to the caller.
//! Only a reply of the wrong shape is an error here.

use crate::command::CommandRequest;
use crate::error::{Error, Result};
use crate::types::ResolvedGrant;
use serde::{Deserialize, Deserializer};

/// Acknowledgement common to every reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ack {
    #[serde(deserialize_with = "ok_flag")]
    pub ok: bool,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default, rename = "codeName")]
    pub code_name: Option<String>,
}

impl Ack {
    /// Turn `ok: 0` into [`Error::Command`], keeping the server's detail.
    pub fn check(&self, command: &'static str) -> Result<()> {
        if self.ok {
            return Ok(());
        }
        Err(Error::Command {
            command,
            code: self.code,
            code_name: self.code_name.clone(),
            message: self
                .errmsg
                .clone()
                .unwrap_or_else(|| "server reported ok: 0".to_string()),
        })
    }
}

/// The server's view of one user.
///
/// Grants always carry an explicit database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub user: String,
    pub db: String,
    #[serde(default)]
    pub roles: Vec<ResolvedGrant>,
}

/// Decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    /// Reply to create, update or drop
    Ack(Ack),
    /// Reply to `usersInfo`
    UserInfoList { ack: Ack, users: Vec<UserInfo> },
}

impl CommandResponse {
    pub fn ack(&self) -> &Ack {
        match self {
            Self::Ack(ack) | Self::UserInfoList { ack, .. } => ack,
        }
    }

    /// Users listed by a `usersInfo` reply; empty for any other reply.
    pub fn into_users(self) -> Vec<UserInfo> {
        match self {
            Self::UserInfoList { users, .. } => users,
            Self::Ack(_) => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct UsersInfoReply {
    #[serde(flatten)]
    ack: Ack,
    #[serde(default)]
    users: Vec<UserInfo>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OkFlag {
    Bool(bool),
    Number(f64),
}

fn ok_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(match OkFlag::deserialize(deserializer)? {
        OkFlag::Bool(ok) => ok,
        OkFlag::Number(n) => n != 0.0,
    })
}

fn decode_error(command: &'static str, raw: &serde_json::Value, err: &serde_json::Error) -> Error {
    Error::Decode {
        command,
        message: err.to_string(),
        raw: raw.to_string(),
    }
}

fn decode_ack(command: &'static str, raw: &serde_json::Value) -> Result<Ack> {
    Ack::deserialize(raw).map_err(|e| decode_error(command, raw, &e))
}

fn decode_users_info(raw: &serde_json::Value) -> Result<(Ack, Vec<UserInfo>)> {
    let reply = UsersInfoReply::deserialize(raw).map_err(|e| decode_error("usersInfo", raw, &e))?;
    Ok((reply.ack, reply.users))
}

/// Decode a reply according to the command it answers.
pub fn decode(request: &CommandRequest, raw: &serde_json::Value) -> Result<CommandResponse> {
    match request {
        CommandRequest::UsersInfo(_) => {
            let (ack, users) = decode_users_info(raw)?;
            Ok(CommandResponse::UserInfoList { ack, users })
        }
        _ => decode_ack(request.name(), raw).map(CommandResponse::Ack),
    }
}
