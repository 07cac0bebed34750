use crate::errors::AuthError;
use anyhow::Context;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Argon2 PHC string.
    pub password: String,
}

/// Operator accounts, persisted as a JSON list. Registration is only open
/// while the file does not exist.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    users: Vec<User>,
}

impl UserStore {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let users = if path.exists() {
            let content = fs::read_to_string(&path).context("read user store")?;
            serde_json::from_str(&content).context("parse user store")?
        } else {
            Vec::new()
        };
        Ok(Self { path, users })
    }

    pub fn registration_open(&self) -> bool {
        !self.path.exists()
    }

    pub fn register(&mut self, username: &str, password: &str) -> Result<(), RegisterError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(RegisterError::Auth(AuthError::EmptyCredentials));
        }
        if !self.registration_open() {
            return Err(RegisterError::Auth(AuthError::RegistrationClosed));
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| RegisterError::Storage(anyhow::anyhow!("hash password: {}", e)))?
            .to_string();
        let mut users = self.users.clone();
        users.push(User { username: username.trim().to_string(), password: hash });
        write_users(&self.path, &users).map_err(RegisterError::Storage)?;
        self.users = users;
        Ok(())
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let username = username.trim();
        let Some(user) = self.users.iter().find(|u| u.username == username) else {
            return false;
        };
        let Ok(hash) = PasswordHash::new(&user.password) else {
            return false;
        };
        Argon2::default().verify_password(password.as_bytes(), &hash).is_ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Auth(AuthError),
    #[error("failed to save user store")]
    Storage(#[source] anyhow::Error),
}

fn write_users(path: &Path, users: &[User]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir).context("create user store dir")?;
    }
    let content = serde_json::to_string_pretty(users).context("serialize users")?;
    fs::write(path, content).context("write user store")?;
    Ok(())
}
