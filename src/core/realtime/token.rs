//! Ephemeral credential acquisition.
//!
//! The long-lived API key never reaches the negotiation endpoint. A token
//! service exchanges it for a short-lived session credential which is then
//! used exactly once as the bearer token of the offer/answer exchange.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::base::{RealtimeError, RealtimeResult};
use super::config::{RealtimeModel, RealtimeVoice};

/// Default request timeout for the token service.
pub const DEFAULT_TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Credential
// =============================================================================

/// Short-lived bearer credential for one negotiation.
#[derive(Clone)]
pub struct EphemeralCredential {
    value: Zeroizing<String>,
    /// Unix seconds after which the credential is rejected
    expires_at: Option<u64>,
    /// Remote session the credential was minted for
    session_id: Option<String>,
}

impl EphemeralCredential {
    pub fn new(value: impl Into<String>, expires_at: Option<u64>) -> Self {
        Self {
            value: Zeroizing::new(value.into()),
            expires_at,
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// The bearer token. Never log this.
    pub fn secret(&self) -> &str {
        self.value.as_str()
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether the credential is expired at `now` (unix seconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    /// Reject empty or expired credentials.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.value.trim().is_empty() {
            return Err(RealtimeError::CredentialMissingOrInvalid(
                "Credential value is empty".to_string(),
            ));
        }
        if self.is_expired() {
            return Err(RealtimeError::CredentialMissingOrInvalid(format!(
                "Credential expired at {}",
                self.expires_at.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralCredential")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("session_id", &self.session_id)
            .finish()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// =============================================================================
// Token Service
// =============================================================================

/// Source of ephemeral credentials.
#[async_trait]
pub trait TokenService: Send + Sync {
    async fn acquire(
        &self,
        model: RealtimeModel,
        voice: RealtimeVoice,
    ) -> RealtimeResult<EphemeralCredential>;
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
    model: &'a str,
    voice: &'a str,
}

/// Session grant returned by the token service.
#[derive(Debug, Deserialize)]
struct SessionGrant {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    client_secret: Option<ClientSecret>,
}

#[derive(Deserialize)]
struct ClientSecret {
    #[serde(default)]
    value: String,
    #[serde(default)]
    expires_at: Option<u64>,
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ServiceError {
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// HTTP token service client.
///
/// `POST {url}` with `{api_key, model, voice}`; the response carries
/// `client_secret.value` and `client_secret.expires_at`.
pub struct HttpTokenService {
    url: String,
    api_key: Option<Zeroizing<String>>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpTokenService {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.filter(|k| !k.is_empty()).map(Zeroizing::new),
            timeout: DEFAULT_TOKEN_REQUEST_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenService for HttpTokenService {
    async fn acquire(
        &self,
        model: RealtimeModel,
        voice: RealtimeVoice,
    ) -> RealtimeResult<EphemeralCredential> {
        debug!(url = %self.url, model = %model, voice = %voice, "Requesting ephemeral credential");

        let body = SessionRequest {
            api_key: self.api_key.as_ref().map(|k| k.as_str()),
            model: model.as_str(),
            voice: voice.as_str(),
        };

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RealtimeError::CredentialMissingOrInvalid(format!("Token service unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ServiceError>(&text)
                .ok()
                .and_then(|e| e.error)
                .map(|e| match e {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or(text);
            return Err(RealtimeError::CredentialMissingOrInvalid(format!(
                "Token service returned HTTP {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let grant: SessionGrant = response.json().await.map_err(|e| {
            RealtimeError::CredentialMissingOrInvalid(format!("Invalid session data: {e}"))
        })?;

        let secret = grant.client_secret.ok_or_else(|| {
            RealtimeError::CredentialMissingOrInvalid("Session data has no client_secret".to_string())
        })?;

        let mut credential = EphemeralCredential::new(secret.value, secret.expires_at);
        if let Some(id) = grant.id {
            credential = credential.with_session_id(id);
        }
        credential.validate()?;

        info!(
            "Obtained ephemeral credential (session={:?}, expires_at={:?})",
            credential.session_id(),
            credential.expires_at()
        );
        Ok(credential)
    }
}

/// Token service returning a fixed credential.
///
/// For hosts that mint credentials themselves.
pub struct StaticTokenService {
    credential: EphemeralCredential,
}

impl StaticTokenService {
    pub fn new(credential: EphemeralCredential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl TokenService for StaticTokenService {
    async fn acquire(
        &self,
        _model: RealtimeModel,
        _voice: RealtimeVoice,
    ) -> RealtimeResult<EphemeralCredential> {
        self.credential.validate()?;
        Ok(self.credential.clone())
    }
}
