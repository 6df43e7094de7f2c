//! Credential Store
//!
//! Users live in a YAML file:
//!
//! ```yaml
//! users:
//!   analyst:
//!     password: "pbkdf2:sha256:600000$<salt>$<hex digest>"
//!     role: admin
//! ```
//!
//! Hashes use the werkzeug `pbkdf2:sha256` format, so files written by werkzeug
//! tooling verify here and vice versa. The file is read fresh on every
//! call; there is no in-process cache to invalidate.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const DEFAULT_ITERATIONS: u32 = 600_000;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const DEFAULT_ROLE: &str = "user";
const SALT_LEN: usize = 16;

/// Salt of the decoy hash checked for unknown usernames
const DECOY_SALT: &str = "decoysaltdecoysa";

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingFields,

    /// Unknown user and wrong password share this variant
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User '{0}' already exists")]
    UserExists(String),

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedUser {
    pub user: String,
    pub role: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    users: BTreeMap<String, UserEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserEntry {
    password: String,
    #[serde(default = "default_role")]
    role: String,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    iterations: u32,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Work factor for newly written hashes; existing hashes keep their own
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<AuthenticatedUser, AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let file = self.read()?;
        let Some(entry) = file.users.get(username) else {
            let _ = check_password(&self.decoy_hash(&file), password);
            tracing::debug!("Authentication failed for unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        if !check_password(&entry.password, password) {
            tracing::debug!("Authentication failed for user '{}'", username);
            return Err(AuthError::InvalidCredentials);
        }

        Ok(AuthenticatedUser {
            user: username.to_string(),
            role: entry.role.clone(),
        })
    }

    /// Add a user and write the file back; creates the file if missing
    pub fn add_user(&self, username: &str, password: &str, role: Option<&str>) -> Result<(), AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let mut file = if self.path.exists() {
            self.read()?
        } else {
            CredentialFile::default()
        };
        if file.users.contains_key(username) {
            return Err(AuthError::UserExists(username.to_string()));
        }

        let entry = UserEntry {
            password: hash_password(password, self.iterations),
            role: role
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(DEFAULT_ROLE)
                .to_string(),
        };
        file.users.insert(username.to_string(), entry);

        let yaml = serde_yaml::to_string(&file).map_err(|e| AuthError::Unavailable(e.to_string()))?;
        std::fs::write(&self.path, yaml).map_err(|e| {
            tracing::error!("Failed to write credential file {:?}: {}", self.path, e);
            AuthError::Unavailable(e.to_string())
        })?;

        tracing::info!("Added user '{}' to {:?}", username, self.path);
        Ok(())
    }

    /// Hash that never matches, costing as much as the dearest stored hash
    ///
    /// Unknown usernames are checked against it so they fail no faster than a
    /// wrong password for a real user. An empty file falls back to the work
    /// factor used for new hashes.
    fn decoy_hash(&self, file: &CredentialFile) -> String {
        let iterations = file
            .users
            .values()
            .filter_map(|entry| parse_hash(&entry.password))
            .map(|parsed| parsed.iterations)
            .max()
            .unwrap_or(self.iterations);
        format!("pbkdf2:sha256:{}${}${}", iterations, DECOY_SALT, "0".repeat(64))
    }

    fn read(&self) -> Result<CredentialFile, AuthError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            tracing::error!("Failed to read credential file {:?}: {}", self.path, e);
            AuthError::Unavailable(e.to_string())
        })?;
        if contents.trim().is_empty() {
            return Ok(CredentialFile::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| {
            tracing::error!("Malformed credential file {:?}: {}", self.path, e);
            AuthError::Unavailable(e.to_string())
        })
    }
}

/// `pbkdf2:sha256:<iterations>$<salt>$<hex digest>` for `password`
pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();
    let digest = pbkdf2_sha256(password.as_bytes(), salt.as_bytes(), iterations);
    format!("pbkdf2:sha256:{}${}${}", iterations, salt, hex::encode(digest))
}

struct ParsedHash<'a> {
    iterations: u32,
    salt: &'a str,
    digest: Vec<u8>,
}

/// Split a werkzeug `pbkdf2:sha256[:<iterations>]$<salt>$<hex>` hash
fn parse_hash(stored: &str) -> Option<ParsedHash<'_>> {
    let mut parts = stored.splitn(3, '$');
    let (method, salt, digest) = (parts.next()?, parts.next()?, parts.next()?);

    let mut method_parts = method.split(':');
    if method_parts.next() != Some("pbkdf2") || method_parts.next() != Some("sha256") {
        tracing::warn!("Unsupported password hash method '{}'", method);
        return None;
    }
    let iterations = match method_parts.next() {
        Some(n) => n.parse::<u32>().ok().filter(|n| *n > 0)?,
        None => DEFAULT_ITERATIONS,
    };

    Some(ParsedHash {
        iterations,
        salt,
        digest: hex::decode(digest).ok()?,
    })
}

/// Check `password` against a stored werkzeug-style hash
///
/// Anything unparseable or using another digest never matches.
pub fn check_password(stored: &str, password: &str) -> bool {
    let Some(parsed) = parse_hash(stored) else {
        return false;
    };
    let actual = pbkdf2_sha256(password.as_bytes(), parsed.salt.as_bytes(), parsed.iterations);
    actual.as_slice().ct_eq(parsed.digest.as_slice()).into()
}

/// PBKDF2-HMAC-SHA256 with a single-block (32 byte) output
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut output = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
    output
}
