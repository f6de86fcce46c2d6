//! OAuth2 access tokens for FCM HTTP v1, minted from a service account key.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;

pub const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_TTL_SECS: i64 = 3600;
/// A cached token is replaced this long before it expires.
const REFRESH_MARGIN_SECS: i64 = 60;

/// The fields of a Google service account key file that signing needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, DispatchError> {
        serde_json::from_str(raw)
            .map_err(|e| DispatchError::Auth(format!("invalid service account key: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self, DispatchError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Auth(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }
}

#[derive(Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    refresh_at: DateTime<Utc>,
}

/// Exchanges signed assertions for bearer tokens and reuses each token until
/// shortly before it expires.
pub struct AccessTokenSource {
    http: Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenSource {
    /// Fails when the key's PEM does not parse.
    pub fn new(http: Client, key: ServiceAccountKey) -> Result<Self, DispatchError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            DispatchError::Auth(format!("invalid service account private key: {}", e))
        })?;

        Ok(Self {
            http,
            key,
            signing_key,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// RS256 JWT asserting the service account at `now`.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String, DispatchError> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: MESSAGING_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_TTL_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| DispatchError::Auth(format!("signing assertion failed: {}", e)))
    }

    /// A bearer token valid for at least another minute.
    pub async fn token(&self) -> Result<String, DispatchError> {
        let now = Utc::now();
        if let Some(token) = self.cached_at(now) {
            return Ok(token);
        }

        let assertion = self.assertion(now)?;
        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Auth(format!(
                "token endpoint answered {}: {}",
                status.as_u16(),
                body
            )));
        }

        let granted: TokenResponse = resp.json().await?;
        let lifetime = (granted.expires_in - REFRESH_MARGIN_SECS).max(0);
        debug!(expires_in = granted.expires_in, "Fetched FCM access token");

        self.store(CachedToken {
            token: granted.access_token.clone(),
            refresh_at: now + TimeDelta::seconds(lifetime),
        });
        Ok(granted.access_token)
    }

    fn cached_at(&self, now: DateTime<Utc>) -> Option<String> {
        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        cached
            .as_ref()
            .filter(|c| now < c.refresh_at)
            .map(|c| c.token.clone())
    }

    fn store(&self, token: CachedToken) {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = Some(token);
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, token: &str, refresh_at: DateTime<Utc>) {
        self.store(CachedToken {
            token: token.to_string(),
            refresh_at,
        });
    }
}
