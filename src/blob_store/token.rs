/// Bearer token sources for Google APIs (Drive, Secret Manager)
use crate::blob_store::{BlobError, BlobResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Refresh this long before the provider-declared expiry
const EXPIRY_SKEW_SECS: i64 = 60;

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid access token
    async fn access_token(&self) -> BlobResult<String>;
}

/// Fixed, externally managed access token
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> BlobResult<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// OAuth refresh-token grant with an in-memory cache
pub struct RefreshingToken {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl RefreshingToken {
    pub fn new(
        http: reqwest::Client,
        token_url: String,
        client_id: String,
        client_secret: String,
        refresh_token: String,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            refresh_token,
            cached: Mutex::new(None),
        }
    }

    async fn refresh(&self) -> BlobResult<CachedToken> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| BlobError::Auth(format!("token endpoint unreachable: {}", e)))?;

        read_token(response, "OAuth token refresh").await
    }
}

/// Turn a token endpoint response into a cache entry
async fn read_token(response: reqwest::Response, what: &str) -> BlobResult<CachedToken> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "{} rejected", what);
        return Err(BlobError::Auth(format!(
            "{} failed with {}: {}",
            what, status, body
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| BlobError::Auth(format!("malformed token response: {}", e)))?;

    let lifetime = token.expires_in.unwrap_or(3600);
    debug!(expires_in = lifetime, "{} succeeded", what);

    Ok(CachedToken {
        value: token.access_token,
        expires_at: Utc::now() + Duration::seconds(lifetime - EXPIRY_SKEW_SECS),
    })
}

async fn cached_or_fetch<F, Fut>(cache: &Mutex<Option<CachedToken>>, fetch: F) -> BlobResult<String>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = BlobResult<CachedToken>>,
{
    let mut cached = cache.lock().await;

    if let Some(token) = cached.as_ref() {
        if token.expires_at > Utc::now() {
            return Ok(token.value.clone());
        }
    }

    let fresh = fetch().await?;
    let value = fresh.value.clone();
    *cached = Some(fresh);
    Ok(value)
}

#[async_trait]
impl TokenSource for RefreshingToken {
    async fn access_token(&self) -> BlobResult<String> {
        cached_or_fetch(&self.cached, || self.refresh()).await
    }
}

/// Default service-account token from the instance metadata server
/// (Cloud Run, GCE)
pub struct MetadataServerToken {
    http: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServerToken {
    pub const DEFAULT_URL: &'static str =
        "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self {
            http,
            url,
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> BlobResult<CachedToken> {
        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| BlobError::Auth(format!("metadata server unreachable: {}", e)))?;

        read_token(response, "Metadata token request").await
    }
}

#[async_trait]
impl TokenSource for MetadataServerToken {
    async fn access_token(&self) -> BlobResult<String> {
        cached_or_fetch(&self.cached, || self.fetch()).await
    }
}
