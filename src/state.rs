use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use principal::{Password, PrincipalState, ResourceId, RoleGrant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Context string for password digests; changing it invalidates every
/// recorded digest.
const DIGEST_CONTEXT: &str = "userctl 2026-01 password digest";

// ============================================================================
// State Structures
// ============================================================================

/// Users that userctl manages, keyed by identifier
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserctlState {
    #[serde(default)]
    pub users: BTreeMap<String, ManagedUser>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// What was last applied for one user
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ManagedUser {
    pub database: String,
    pub username: String,

    /// Grants in their declared shape
    #[serde(default)]
    pub grants: Vec<RoleGrant>,

    /// Keyed digest of the password; empty for imported users
    #[serde(default)]
    pub password_digest: String,

    pub last_applied: DateTime<Utc>,
}

/// Digest of a password, bound to the user's identifier.
pub fn password_digest(id: &ResourceId, password: &Password) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(DIGEST_CONTEXT);
    hasher.update(id.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(password.expose().as_bytes());
    hasher.finalize().to_hex().to_string()
}

impl ManagedUser {
    /// Record a user as the server reported it after create or update
    pub fn from_applied(record: &PrincipalState, password_digest: String) -> Self {
        Self {
            database: record.principal.database.clone(),
            username: record.principal.name.clone(),
            grants: record.principal.grants.clone(),
            password_digest,
            last_applied: Utc::now(),
        }
    }
}

// ============================================================================
// UserctlState Implementation
// ============================================================================

impl UserctlState {
    /// Get the state directory path (~/.local/state/userctl)
    pub fn state_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".local").join("state").join("userctl"))
    }

    /// Default state file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::state_dir()?.join("state.toml"))
    }

    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded {} users from {}", state.users.len(), path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(path)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ManagedUser> {
        self.users.get(id.as_str())
    }

    pub fn record(&mut self, id: &ResourceId, user: ManagedUser) {
        self.users.insert(id.as_str().to_string(), user);
    }

    pub fn forget(&mut self, id: &ResourceId) -> Option<ManagedUser> {
        self.users.remove(id.as_str())
    }
}

impl Default for UserctlState {
    fn default() -> Self {
        Self {
            users: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
