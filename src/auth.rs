use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::EndpointConfig;
use crate::error::{BirdTagError, Result};
use crate::session::{Profile, SessionStore, SessionTokens};

/// Claims we read out of the identity token. The signature is not verified
/// client-side; the expiry check is advisory UX and the real authorization
/// boundary is the server.
#[derive(Debug, Deserialize)]
struct JwtClaims {
    exp: i64,
}

fn decode_claims(token: &str) -> Option<JwtClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Whether a bearer token carries an unexpired `exp` claim.
pub fn token_is_live(token: &str) -> bool {
    match decode_claims(token) {
        Some(claims) => claims.exp > Utc::now().timestamp(),
        None => false,
    }
}

/// The identity token for an authenticated call, or `AuthRequired` before
/// any network I/O happens.
pub fn require_token(store: &SessionStore) -> Result<String> {
    match store.token() {
        Some(token) if token_is_live(&token) => Ok(token),
        _ => Err(BirdTagError::AuthRequired),
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    challenge: Option<String>,
}

/// Client for the hosted identity provider gateway: registration, e-mail
/// confirmation, sign-in/out, and the advisory expiry check.
pub struct AuthClient {
    client: Client,
    endpoints: Arc<EndpointConfig>,
    store: Arc<SessionStore>,
}

impl AuthClient {
    pub fn new(endpoints: Arc<EndpointConfig>, store: Arc<SessionStore>) -> Self {
        Self { client: Client::new(), endpoints, store }
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.token().map(|t| token_is_live(&t)).unwrap_or(false)
    }

    pub async fn register(
        &self,
        email: &str,
        address: &str,
        given_name: &str,
        family_name: &str,
        password: &str,
    ) -> Result<()> {
        for (field, value) in [
            ("email", email),
            ("address", address),
            ("given name", given_name),
            ("family name", family_name),
            ("password", password),
        ] {
            if value.trim().is_empty() {
                return Err(BirdTagError::Validation(format!("Please fill in all fields: {field} is missing")));
            }
        }

        let url = format!("{}/signup", self.endpoints.auth_url);
        let body = json!({
            "email": email,
            "password": password,
            "attributes": {
                "email": email,
                "given_name": given_name,
                "family_name": family_name,
                "address": address,
            },
        });
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        self.store.set_pending_email(email)?;
        info!("sign-up accepted for {email}, verification code sent");
        Ok(())
    }

    pub async fn confirm(&self, email: &str, code: &str) -> Result<()> {
        if code.trim().is_empty() {
            return Err(BirdTagError::Validation("Please enter the verification code".to_string()));
        }
        let url = format!("{}/confirm", self.endpoints.auth_url);
        let res = self.client.post(&url).json(&json!({ "email": email, "code": code })).send().await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        self.store.clear_pending_email()?;
        info!("e-mail verified for {email}");
        Ok(())
    }

    pub async fn resend_code(&self, email: &str) -> Result<()> {
        let url = format!("{}/resend", self.endpoints.auth_url);
        let res = self.client.post(&url).json(&json!({ "email": email })).send().await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        info!("verification code re-sent to {email}");
        Ok(())
    }

    /// Sign in, fetch the profile attributes with the fresh identity token,
    /// and persist the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Profile> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(BirdTagError::Validation("Please enter email and password".to_string()));
        }
        let url = format!("{}/login", self.endpoints.auth_url);
        let res = self.client.post(&url).json(&json!({ "email": email, "password": password })).send().await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        let login: LoginResponse = res.json().await?;
        if let Some(challenge) = login.challenge {
            return Err(BirdTagError::UnsupportedChallenge(challenge));
        }
        let (Some(access_token), Some(id_token)) = (login.access_token, login.id_token) else {
            return Err(BirdTagError::Validation("sign-in response did not include tokens".to_string()));
        };

        let profile = self.fetch_profile(&id_token).await?;
        self.store.set_session(SessionTokens { access_token, id_token }, profile.clone())?;
        info!("signed in as {}", profile.email);
        Ok(profile)
    }

    async fn fetch_profile(&self, id_token: &str) -> Result<Profile> {
        let url = format!("{}/me", self.endpoints.auth_url);
        let res = self.client.get(&url).bearer_auth(id_token).send().await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        Ok(res.json().await?)
    }

    /// Best-effort provider sign-out, then the local session is cleared
    /// regardless of what the provider said.
    pub async fn logout(&self) -> Result<()> {
        if let Some(access_token) = self.store.access_token() {
            let url = format!("{}/logout", self.endpoints.auth_url);
            let result = self.client.post(&url).bearer_auth(&access_token).send().await;
            match result {
                Ok(res) if !res.status().is_success() => {
                    warn!("provider sign-out returned {}", res.status());
                }
                Err(e) => warn!("provider sign-out failed: {e}"),
                _ => {}
            }
        }
        self.store.clear()?;
        info!("signed out");
        Ok(())
    }
}
