//! Local persistent storage for paired node sessions.
//!
//! This crate keeps the credentials of the last successfully paired node in a
//! sled database so a later start can re-establish the session without asking
//! for the pairing phrase again. Passwords are never stored; only a digest
//! bound to the pairing fingerprint is kept for verifying a later login.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Key of the single session record.
const SESSION_KEY: &[u8] = b"session";

/// Errors that can occur during session storage operations.
#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Credentials of a paired session, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Pairing phrase used to establish the session.
    pub pairing_phrase: String,
    /// Digest of the password protecting this session, if any.
    pub password_digest: Option<String>,
    /// Short, non-secret identifier of the pairing phrase (safe to log).
    pub fingerprint: String,
    /// Unix timestamp of the pairing.
    pub paired_at: u64,
}

impl StoredSession {
    /// Create a record for a freshly paired session.
    pub fn new(pairing_phrase: &str, password: Option<&str>, paired_at: u64) -> Self {
        let fingerprint = fingerprint(pairing_phrase);
        let password_digest = password
            .filter(|p| !p.is_empty())
            .map(|p| password_digest(&fingerprint, p));
        Self {
            pairing_phrase: pairing_phrase.trim().to_string(),
            password_digest,
            fingerprint,
            paired_at,
        }
    }

    /// Whether a password must be supplied to unlock this session.
    pub fn is_password_protected(&self) -> bool {
        self.password_digest.is_some()
    }

    /// Check a password against the stored digest.
    ///
    /// An unprotected session accepts any password.
    pub fn verify_password(&self, password: &str) -> bool {
        match &self.password_digest {
            Some(digest) => *digest == password_digest(&self.fingerprint, password),
            None => true,
        }
    }
}

/// Short hex fingerprint of a pairing phrase.
pub fn fingerprint(pairing_phrase: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pairing_phrase.trim().as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    hex::encode(&digest[..8])
}

fn password_digest(fingerprint: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persistent store holding at most one paired session.
#[derive(Clone)]
pub struct SessionStore {
    db: sled::Db,
}

impl SessionStore {
    /// Open or create a session store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Create an in-memory session store (for testing and demos).
    pub fn in_memory() -> Result<Self, SessionStoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Load the stored session, if any.
    pub fn load(&self) -> Result<Option<StoredSession>, SessionStoreError> {
        match self.db.get(SESSION_KEY)? {
            Some(data) => {
                let session: StoredSession = bincode::deserialize(&data)
                    .map_err(|e| SessionStoreError::Serialization(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Whether a session is stored.
    pub fn has_session(&self) -> Result<bool, SessionStoreError> {
        Ok(self.db.contains_key(SESSION_KEY)?)
    }

    /// Persist a session, replacing any previous one.
    pub fn save(&self, session: &StoredSession) -> Result<(), SessionStoreError> {
        let data = bincode::serialize(session)
            .map_err(|e| SessionStoreError::Serialization(e.to_string()))?;
        self.db.insert(SESSION_KEY, data)?;
        self.db.flush()?;
        debug!("Stored session {}", session.fingerprint);
        Ok(())
    }

    /// Remove all stored session data.
    pub fn clear(&self) -> Result<(), SessionStoreError> {
        self.db.clear()?;
        self.db.flush()?;
        debug!("Cleared stored session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear() {
        let store = SessionStore::in_memory().unwrap();
        assert_eq!(store.load().unwrap(), None);

        let session = StoredSession::new("buffalo very rotate mind", None, 42);
        store.save(&session).unwrap();
        assert!(store.has_session().unwrap());
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert!(!store.has_session().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_on_disk_store_shared_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");

        let store = SessionStore::open(&path).unwrap();
        let other = store.clone();
        store
            .save(&StoredSession::new("phrase one", Some("pw"), 7))
            .unwrap();
        assert!(path.exists());

        let loaded = other.load().unwrap().unwrap();
        assert_eq!(loaded.pairing_phrase, "phrase one");
        assert!(loaded.is_password_protected());
    }

    #[test]
    fn test_password_verification() {
        let session = StoredSession::new("  phrase  ", Some("secret"), 0);
        assert_eq!(session.pairing_phrase, "phrase");
        assert!(session.verify_password("secret"));
        assert!(!session.verify_password("wrong"));

        let open = StoredSession::new("phrase", Some(""), 0);
        assert!(!open.is_password_protected());
        assert!(open.verify_password("anything"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_trimmed() {
        assert_eq!(fingerprint("abc"), fingerprint("  abc\n"));
        assert_eq!(fingerprint("abc").len(), 16);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }
}
