use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::require_token;
use crate::config::EndpointConfig;
use crate::error::{BirdTagError, Result};
use crate::session::SessionStore;

/// Species the user wants upload notifications for.
pub type NotificationPreferences = BTreeMap<String, bool>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProfile {
    pub given_name: String,
    pub family_name: String,
    pub email: String,
}

/// Notification preferences and profile fields. The source of truth is the
/// local state directory; the backend copy is best-effort only.
pub struct SettingsClient {
    client: Client,
    endpoints: Arc<EndpointConfig>,
    store: Arc<SessionStore>,
    preferences_path: PathBuf,
    profile_path: PathBuf,
}

impl SettingsClient {
    pub fn new(
        endpoints: Arc<EndpointConfig>,
        store: Arc<SessionStore>,
        preferences_path: PathBuf,
        profile_path: PathBuf,
    ) -> Self {
        Self { client: Client::new(), endpoints, store, preferences_path, profile_path }
    }

    /// Missing or malformed preference files read as the empty map.
    pub fn load_preferences(&self) -> NotificationPreferences {
        let Ok(file_str) = std::fs::read_to_string(&self.preferences_path) else {
            return NotificationPreferences::new();
        };
        serde_json::from_str(&file_str).unwrap_or_default()
    }

    /// Persist locally, then forward to the backend on a best-effort basis.
    /// Forwarding failures are logged and never block the local save.
    pub async fn save_preferences(&self, preferences: &NotificationPreferences) -> Result<()> {
        let serialized = serde_json::to_string_pretty(preferences)
            .map_err(BirdTagError::StateSerializationError)?;
        std::fs::write(&self.preferences_path, serialized).map_err(BirdTagError::StateIOError)?;
        info!("saved notification preferences for {} species", preferences.len());

        if let Err(e) = self.forward_preferences(preferences).await {
            warn!("could not forward preferences to the server (saved locally): {e}");
        }
        Ok(())
    }

    pub async fn reset_preferences(&self) -> Result<()> {
        match std::fs::remove_file(&self.preferences_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BirdTagError::StateIOError(e)),
        }
        info!("notification preferences reset");

        if let Err(e) = self.forward_reset().await {
            warn!("could not reset preferences on the server (reset locally): {e}");
        }
        Ok(())
    }

    async fn forward_preferences(&self, preferences: &NotificationPreferences) -> Result<()> {
        let token = require_token(&self.store)?;
        let res = self
            .client
            .post(&self.endpoints.settings_url)
            .bearer_auth(&token)
            .json(&json!({ "preferences": preferences }))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        Ok(())
    }

    async fn forward_reset(&self) -> Result<()> {
        let token = require_token(&self.store)?;
        let res = self
            .client
            .delete(&self.endpoints.settings_url)
            .bearer_auth(&token)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        Ok(())
    }

    pub fn load_profile(&self) -> LocalProfile {
        let Ok(file_str) = std::fs::read_to_string(&self.profile_path) else {
            return LocalProfile::default();
        };
        serde_json::from_str(&file_str).unwrap_or_default()
    }

    pub fn update_profile(&self, profile: &LocalProfile) -> Result<()> {
        for (field, value) in [
            ("given name", &profile.given_name),
            ("family name", &profile.family_name),
            ("email", &profile.email),
        ] {
            if value.trim().is_empty() {
                return Err(BirdTagError::Validation(format!(
                    "Please fill in all required fields: {field} is missing"
                )));
            }
        }
        let serialized = serde_json::to_string_pretty(profile)
            .map_err(BirdTagError::StateSerializationError)?;
        std::fs::write(&self.profile_path, serialized).map_err(BirdTagError::StateIOError)?;
        info!("profile updated");
        Ok(())
    }

    /// Validates the form fields, then reports that the provider flow is not
    /// wired up. No password ever leaves the machine here.
    pub fn change_password(&self, current: &str, new: &str, confirm: &str) -> Result<String> {
        if current.is_empty() || new.is_empty() || confirm.is_empty() {
            return Err(BirdTagError::Validation("Please fill in all password fields".to_string()));
        }
        if new != confirm {
            return Err(BirdTagError::Validation("New passwords do not match".to_string()));
        }
        if new.len() < 8 {
            return Err(BirdTagError::Validation(
                "Password must be at least 8 characters long".to_string(),
            ));
        }
        Ok("Password change is not available yet; it will arrive with a later provider integration".to_string())
    }
}
