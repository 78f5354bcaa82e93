use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BirdTagError, Result};

/// Profile attributes returned by the identity provider's attribute query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub address: String,
}

impl Profile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub id_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    profile: Option<Profile>,
    #[serde(default)]
    pending_email: Option<String>,
}

/// File-backed session state: bearer tokens, the cached profile, and the
/// transient pending-verification marker used during sign-up.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    // A missing or malformed file reads as an empty session, never an error.
    fn read(&self) -> StoredSession {
        let Ok(file_str) = std::fs::read_to_string(&self.path) else {
            return StoredSession::default();
        };
        serde_json::from_str(&file_str).unwrap_or_default()
    }

    fn write(&self, session: &StoredSession) -> Result<()> {
        let serialized = serde_json::to_string_pretty(session)
            .map_err(BirdTagError::StateSerializationError)?;
        std::fs::write(&self.path, serialized).map_err(BirdTagError::StateIOError)
    }

    /// The identity token attached to authenticated API calls.
    pub fn token(&self) -> Option<String> {
        self.read().id_token.filter(|t| !t.is_empty())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.filter(|t| !t.is_empty())
    }

    pub fn user(&self) -> Option<Profile> {
        self.read().profile
    }

    pub fn set_session(&self, tokens: SessionTokens, profile: Profile) -> Result<()> {
        let mut session = self.read();
        session.id_token = Some(tokens.id_token);
        session.access_token = Some(tokens.access_token);
        session.profile = Some(profile);
        self.write(&session)
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BirdTagError::StateIOError(e)),
        }
    }

    pub fn pending_email(&self) -> Option<String> {
        self.read().pending_email
    }

    pub fn set_pending_email(&self, email: &str) -> Result<()> {
        let mut session = self.read();
        session.pending_email = Some(email.to_string());
        self.write(&session)
    }

    pub fn clear_pending_email(&self) -> Result<()> {
        let mut session = self.read();
        session.pending_email = None;
        self.write(&session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        (dir, store)
    }

    fn sample_profile() -> Profile {
        Profile {
            email: "jane@example.com".to_string(),
            given_name: "Jane".to_string(),
            family_name: "Finch".to_string(),
            address: "1 Wattle St".to_string(),
        }
    }

    #[test]
    fn missing_file_reads_as_absent_session() {
        let (_dir, store) = temp_store();
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
    }

    #[test]
    fn malformed_file_reads_as_absent_session() {
        let (_dir, store) = temp_store();
        std::fs::write(&store.path, "{not json").unwrap();
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
    }

    #[test]
    fn set_get_clear_round_trip() {
        let (_dir, store) = temp_store();
        let tokens = SessionTokens {
            access_token: "access".to_string(),
            id_token: "identity".to_string(),
        };
        store.set_session(tokens, sample_profile()).unwrap();
        assert_eq!(store.token().as_deref(), Some("identity"));
        assert_eq!(store.access_token().as_deref(), Some("access"));
        assert_eq!(store.user().unwrap().email, "jane@example.com");

        store.clear().unwrap();
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
        // clearing an already-empty store is fine
        store.clear().unwrap();
    }

    #[test]
    fn pending_email_marker_round_trip() {
        let (_dir, store) = temp_store();
        store.set_pending_email("jane@example.com").unwrap();
        assert_eq!(store.pending_email().as_deref(), Some("jane@example.com"));
        store.clear_pending_email().unwrap();
        assert_eq!(store.pending_email(), None);
    }
}
