//! Google Cloud Storage artifact store.
//!
//! Authenticates with a service account key using the OAuth 2.0 JWT bearer
//! grant and uploads objects with the JSON API's simple media upload.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use narrator_core::error::{NarratorError, Result};

use crate::ArtifactStore;

const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the cached token expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service account JSON key that the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.into()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct GcsStore {
    bucket: String,
    upload_base: String,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GcsStore {
    /// `timeout` bounds every token exchange and upload. `None` waits indefinitely.
    pub fn new(
        bucket: impl Into<String>,
        key: ServiceAccountKey,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            NarratorError::Config(format!("invalid service account private key: {e}"))
        })?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NarratorError::Config(format!("cannot build GCS client: {e}")))?;

        Ok(Self {
            bucket: bucket.into(),
            upload_base: GCS_UPLOAD_BASE.into(),
            key,
            signing_key,
            client,
            token: Mutex::new(None),
        })
    }

    /// Point uploads at another JSON API endpoint, e.g. an emulator.
    pub fn with_upload_base(mut self, base: &str) -> Self {
        self.upload_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Load the service account key from a JSON key file.
    pub async fn from_service_account_file(
        bucket: &str,
        path: impl AsRef<Path>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            NarratorError::Config(format!(
                "cannot read service account key {}: {e}",
                path.display()
            ))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)?;
        info!(client_email = %key.client_email, "Loaded GCS service account");
        Self::new(bucket, key, timeout)
    }

    /// Return a valid access token, exchanging a fresh assertion when needed.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.sign_assertion()?;
        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NarratorError::Storage(format!("token exchange failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(NarratorError::Storage(format!(
                "token exchange error {status}: {body}"
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| NarratorError::Storage(format!("bad token response: {e}")))?;

        debug!(expires_in = token.expires_in, "Obtained GCS access token");
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    fn sign_assertion(&self) -> Result<String> {
        let claims = assertion_claims(&self.key, Utc::now().timestamp());
        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| NarratorError::Storage(format!("cannot sign token assertion: {e}")))
    }
}

fn assertion_claims(key: &ServiceAccountKey, now: i64) -> AssertionClaims<'_> {
    AssertionClaims {
        iss: &key.client_email,
        scope: STORAGE_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    }
}

/// Simple media upload URL for `name` in `bucket`.
pub fn upload_url(base: &str, bucket: &str, name: &str) -> String {
    format!(
        "{base}/b/{}/o?uploadType=media&name={}",
        urlencoding::encode(bucket),
        urlencoding::encode(name)
    )
}

#[async_trait]
impl ArtifactStore for GcsStore {
    fn id(&self) -> &str {
        "gcs"
    }

    async fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(upload_url(&self.upload_base, &self.bucket, name))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| NarratorError::Storage(format!("upload {name} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(NarratorError::Storage(format!(
                "upload {name} rejected ({status}): {body}"
            )));
        }

        info!(bucket = %self.bucket, name, content_type, "Artifact uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ServiceAccountKey {
        serde_json::from_str(
            r#"{
                "type": "service_account",
                "client_email": "narrator@project.iam.gserviceaccount.com",
                "private_key": "not a pem key"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_service_account_defaults_token_uri() {
        assert_eq!(key().token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_assertion_claims() {
        let key = key();
        let claims = assertion_claims(&key, 1_700_000_000);
        assert_eq!(claims.iss, "narrator@project.iam.gserviceaccount.com");
        assert_eq!(claims.aud, "https://oauth2.googleapis.com/token");
        assert_eq!(claims.scope, STORAGE_SCOPE);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_upload_url_encodes_name() {
        let url = upload_url(GCS_UPLOAD_BASE, "davidattenborough", "1234.mp3");
        assert_eq!(
            url,
            "https://storage.googleapis.com/upload/storage/v1/b/davidattenborough/o?uploadType=media&name=1234.mp3"
        );

        let url = upload_url(GCS_UPLOAD_BASE, "b", "a b/c.png");
        assert!(url.ends_with("name=a%20b%2Fc.png"));
    }

    #[test]
    fn test_invalid_private_key_is_config_error() {
        let err = GcsStore::new("bucket", key(), None).err().unwrap();
        assert_eq!(err.kind(), "config");
    }
}
