//! Declared users - the `users.toml` configuration file

use anyhow::{Context, Result, bail};
use principal::{GrantDatabase, Password, Principal, ResourceId, RoleGrant};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::state;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("userctl"))
}

/// Default location of the users file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("users.toml"))
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

// ============================================================================
// File Schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsersConfig {
    #[serde(default, rename = "user")]
    pub users: Vec<UserSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSpec {
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default, rename = "role")]
    pub roles: Vec<RoleSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleSpec {
    pub name: String,
    #[serde(default)]
    pub database: GrantDatabase,
}

/// A validated user, ready to reconcile
#[derive(Debug, Clone)]
pub struct DesiredUser {
    pub id: ResourceId,
    pub principal: Principal,
    pub password_digest: String,
}

impl UsersConfig {
    /// Load and parse a users file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid users file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML format")
    }

    /// Validate every user and resolve passwords.
    ///
    /// `lookup_env` resolves `password_env` references.
    pub fn into_desired<F>(self, lookup_env: F) -> Result<Vec<DesiredUser>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut seen = HashSet::new();
        let mut desired = Vec::with_capacity(self.users.len());

        for spec in self.users {
            let label = format!("{}@{}", spec.username, spec.database);
            let user = spec
                .into_desired(&lookup_env)
                .with_context(|| format!("Invalid user {label}"))?;
            if !seen.insert(user.id.clone()) {
                bail!("User {label} is declared more than once");
            }
            desired.push(user);
        }

        Ok(desired)
    }
}

impl UserSpec {
    fn into_desired<F>(self, lookup_env: &F) -> Result<DesiredUser>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.database.is_empty() {
            bail!("database must not be empty");
        }
        if self.database.contains(['.', '/', '\\', ' ', '"', '$']) {
            bail!("database {:?} contains a character MongoDB does not allow", self.database);
        }
        if self.username.is_empty() {
            bail!("username must not be empty");
        }

        let password = match (self.password, self.password_env) {
            (Some(password), None) => password,
            (None, Some(var)) => {
                lookup_env(&var).with_context(|| format!("Environment variable {var} is not set"))?
            }
            (Some(_), Some(_)) => bail!("set either password or password_env, not both"),
            (None, None) => bail!("password is required (password or password_env)"),
        };
        if password.is_empty() {
            bail!("password must not be empty");
        }

        let mut grants = Vec::with_capacity(self.roles.len());
        for role in self.roles {
            if role.name.is_empty() {
                bail!("role name must not be empty");
            }
            grants.push(RoleGrant {
                role: role.name,
                database: role.database,
            });
        }

        let id = ResourceId::encode(&self.database, &self.username)?;
        let password = Password::new(password);
        let password_digest = state::password_digest(&id, &password);

        Ok(DesiredUser {
            id,
            principal: Principal {
                database: self.database,
                name: self.username,
                secret: password,
                grants,
            },
            password_digest,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: &str = r#"
[[user]]
database = "testing"
username = "user"
password = "pass"

[[user.role]]
name = "readWrite"

[[user.role]]
name = "dbAdmin"
database = "testing"

[[user.role]]
name = "read"
database = "admin"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_roles_keep_elision() {
        let desired = UsersConfig::parse(ROLES).unwrap().into_desired(no_env).unwrap();
        assert_eq!(desired.len(), 1);

        let user = &desired[0];
        assert_eq!(user.id.as_str(), "testing.user");
        assert_eq!(user.principal.secret.expose(), "pass");
        assert_eq!(
            user.principal.grants,
            vec![
                RoleGrant::inherited("readWrite"),
                RoleGrant::on("dbAdmin", "testing"),
                RoleGrant::on("read", "admin"),
            ]
        );
    }

    #[test]
    fn test_empty_role_database_is_not_elided() {
        let content = r#"
[[user]]
database = "testing"
username = "user"
password = "pass"
role = [{ name = "read", database = "" }]
"#;
        let desired = UsersConfig::parse(content).unwrap().into_desired(no_env).unwrap();
        assert_eq!(desired[0].principal.grants[0].database, GrantDatabase::Empty);
    }

    #[test]
    fn test_password_from_env() {
        let content = r#"
[[user]]
database = "testing"
username = "user"
password_env = "APP_PASSWORD"
"#;
        let desired = UsersConfig::parse(content)
            .unwrap()
            .into_desired(|var| (var == "APP_PASSWORD").then(|| "from-env".to_string()))
            .unwrap();
        assert_eq!(desired[0].principal.secret.expose(), "from-env");

        let missing = UsersConfig::parse(content).unwrap().into_desired(no_env);
        assert!(missing.is_err());
    }

    #[test]
    fn test_rejects_invalid_users() {
        let cases = [
            r#"[[user]]
database = ""
username = "user"
password = "pass""#,
            r#"[[user]]
database = "my.db"
username = "user"
password = "pass""#,
            r#"[[user]]
database = "testing"
username = "user""#,
            r#"[[user]]
database = "testing"
username = "user"
password = "pass"
password_env = "APP_PASSWORD""#,
            r#"[[user]]
database = "testing"
username = "user"
password = "pass"
role = [{ name = "" }]"#,
        ];

        for content in cases {
            let result = UsersConfig::parse(content).unwrap().into_desired(no_env);
            assert!(result.is_err(), "accepted: {content}");
        }
    }

    #[test]
    fn test_rejects_duplicates() {
        let content = r#"
[[user]]
database = "testing"
username = "user"
password = "pass"

[[user]]
database = "testing"
username = "user"
password = "other"
"#;
        let err = UsersConfig::parse(content)
            .unwrap()
            .into_desired(no_env)
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let content = r#"
[[user]]
database = "testing"
username = "user"
password = "pass"
roles = []
"#;
        assert!(UsersConfig::parse(content).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        fs::write(&path, ROLES).unwrap();

        let config = UsersConfig::load(&path).unwrap();
        assert_eq!(config.users.len(), 1);
        assert!(UsersConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
