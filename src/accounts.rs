//! Local accounts kept in a small key-value store.
//!
//! Passwords are stored and compared as plain text. This is a convenience login for
//! a single device, not an authentication system.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::User;

pub const USERS_KEY: &str = "margdarshak_users";
pub const SESSION_KEY: &str = "margdarshak_session";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password. Please check your credentials.")]
    InvalidCredentials,
    #[error("This email is already registered. Try logging in.")]
    DuplicateEmail,
    #[error("Please fill in your {0}.")]
    EmptyField(&'static str),
    #[error("account storage failed: {0}")]
    Storage(#[from] io::Error),
    #[error("stored account data is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Untyped text storage, last writer wins.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> io::Result<()>;
    fn remove(&mut self, key: &str) -> io::Result<()>;
}

/// All keys in one JSON object on disk, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(io::Error::other)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        log::debug!("Opened account store {} ({} keys)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    fn flush(&self) -> io::Result<()> {
        let text = serde_json::to_string_pretty(&self.entries).map_err(io::Error::other)?;
        std::fs::write(&self.path, text)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> io::Result<()> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    #[serde(flatten)]
    user: User,
    password: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn timestamp_id() -> String {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    ms.to_string()
}

pub struct Accounts<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> Accounts<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn users(&self) -> Result<Vec<StoredUser>, AuthError> {
        match self.store.get(USERS_KEY) {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_users(&mut self, users: &[StoredUser]) -> Result<(), AuthError> {
        self.store.set(USERS_KEY, serde_json::to_string(users)?)?;
        Ok(())
    }

    fn save_session(&mut self, user: &User) -> Result<(), AuthError> {
        self.store.set(SESSION_KEY, serde_json::to_string(user)?)?;
        Ok(())
    }

    /// Create an account and sign it in.
    pub fn sign_up(&mut self, name: &str, email: &str, password: &str) -> Result<User, AuthError> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(AuthError::EmptyField("name"));
        }
        if email.is_empty() {
            return Err(AuthError::EmptyField("email"));
        }
        if password.is_empty() {
            return Err(AuthError::EmptyField("password"));
        }

        let mut users = self.users()?;
        if users.iter().any(|u| u.user.email == email) {
            return Err(AuthError::DuplicateEmail);
        }

        let mut id = timestamp_id();
        // two sign-ups inside one millisecond
        while users.iter().any(|u| u.user.id == id) {
            id = (id.parse::<u128>().unwrap_or_default() + 1).to_string();
        }

        let user = User { id, name: name.to_string(), email, profile_created: false };
        users.push(StoredUser { user: user.clone(), password: password.to_string() });
        self.save_users(&users)?;
        self.save_session(&user)?;
        log::info!("Registered account {} ({})", user.id, user.email);
        Ok(user)
    }

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        let user = self
            .users()?
            .into_iter()
            .find(|u| u.user.email == email && u.password == password)
            .map(|u| u.user)
            .ok_or(AuthError::InvalidCredentials)?;
        self.save_session(&user)?;
        log::info!("Signed in {}", user.email);
        Ok(user)
    }

    pub fn current_session(&self) -> Result<Option<User>, AuthError> {
        match self.store.get(SESSION_KEY) {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.store.remove(SESSION_KEY)?;
        Ok(())
    }

    /// Flag the signed-in user as having a profile, in both the account list and
    /// the session. Returns the updated user, or `None` when nobody is signed in.
    pub fn mark_profile_created(&mut self) -> Result<Option<User>, AuthError> {
        let Some(mut current) = self.current_session()? else {
            return Ok(None);
        };
        current.profile_created = true;

        let mut users = self.users()?;
        if let Some(stored) = users.iter_mut().find(|u| u.user.id == current.id) {
            stored.user.profile_created = true;
            self.save_users(&users)?;
        }
        self.save_session(&current)?;
        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn accounts(dir: &TempDir) -> Accounts<FileStore> {
        Accounts::new(FileStore::open(dir.path().join("store.json")).unwrap())
    }

    #[test]
    fn sign_up_signs_in_and_normalizes_email() {
        let dir = TempDir::new().unwrap();
        let mut acc = accounts(&dir);

        let user = acc.sign_up(" Asha ", "  Asha@Example.COM ", "pw").unwrap();
        assert_eq!(user.name, "Asha");
        assert_eq!(user.email, "asha@example.com");
        assert!(!user.profile_created);
        assert!(user.id.parse::<u128>().is_ok());
        assert_eq!(acc.current_session().unwrap(), Some(user));
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut acc = accounts(&dir);
        acc.sign_up("Asha", "asha@example.com", "pw").unwrap();

        let err = acc.sign_up("Other", "ASHA@example.com", "x").unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
        assert_eq!(err.to_string(), "This email is already registered. Try logging in.");
    }

    #[test]
    fn empty_fields_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut acc = accounts(&dir);
        assert!(matches!(acc.sign_up("  ", "a@b.c", "pw"), Err(AuthError::EmptyField("name"))));
        assert!(matches!(acc.sign_up("A", " ", "pw"), Err(AuthError::EmptyField("email"))));
        assert!(matches!(acc.sign_up("A", "a@b.c", ""), Err(AuthError::EmptyField("password"))));
    }

    #[test]
    fn sign_in_checks_password_exactly() {
        let dir = TempDir::new().unwrap();
        let mut acc = accounts(&dir);
        let user = acc.sign_up("Asha", "asha@example.com", "Secret").unwrap();
        acc.logout().unwrap();
        assert_eq!(acc.current_session().unwrap(), None);

        let err = acc.sign_in("asha@example.com", "secret").unwrap_err();
        assert_eq!(err.to_string(), "Invalid email or password. Please check your credentials.");
        assert!(matches!(acc.sign_in("nobody@example.com", "Secret"), Err(AuthError::InvalidCredentials)));

        assert_eq!(acc.sign_in(" ASHA@example.com", "Secret").unwrap(), user);
        assert_eq!(acc.current_session().unwrap(), Some(user));
    }

    #[test]
    fn accounts_survive_reopening_the_store() {
        let dir = TempDir::new().unwrap();
        {
            let mut acc = accounts(&dir);
            acc.sign_up("Asha", "asha@example.com", "pw").unwrap();
            acc.sign_up("Ravi", "ravi@example.com", "pw2").unwrap();
        }
        let mut acc = accounts(&dir);
        assert_eq!(acc.current_session().unwrap().unwrap().name, "Ravi");
        assert_eq!(acc.sign_in("asha@example.com", "pw").unwrap().name, "Asha");
    }

    #[test]
    fn profile_flag_updates_record_and_session() {
        let dir = TempDir::new().unwrap();
        let mut acc = accounts(&dir);
        assert_eq!(acc.mark_profile_created().unwrap(), None);

        acc.sign_up("Asha", "asha@example.com", "pw").unwrap();
        let updated = acc.mark_profile_created().unwrap().unwrap();
        assert!(updated.profile_created);
        assert!(acc.current_session().unwrap().unwrap().profile_created);

        acc.logout().unwrap();
        assert!(acc.sign_in("asha@example.com", "pw").unwrap().profile_created);
    }

    #[test]
    fn ids_stay_unique_within_a_millisecond() {
        let dir = TempDir::new().unwrap();
        let mut acc = accounts(&dir);
        let a = acc.sign_up("A", "a@example.com", "pw").unwrap();
        let b = acc.sign_up("B", "b@example.com", "pw").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn corrupt_store_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileStore::open(&path).is_err());
    }
}
