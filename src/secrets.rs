/// Google Secret Manager as a configuration source
///
/// Secrets named after their environment variable override that variable.
/// Anything the secret store does not have falls back to the environment.
use crate::blob_store::TokenSource;
use crate::error::{AssetError, AssetResult};
use base64::{engine::general_purpose, Engine as _};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://secretmanager.googleapis.com/v1";

/// Configuration keys looked up in the secret store before the environment
pub const SECRET_KEYS: &[&str] = &[
    "GOOGLE_DRIVE_FOLDER_ID",
    "GOOGLE_MAPS_API_KEY",
    "GOOGLE_OAUTH_CLIENT_ID",
    "GOOGLE_OAUTH_CLIENT_SECRET",
    "GOOGLE_OAUTH_REFRESH_TOKEN",
    "CLOUD_SQL_CONNECTION_NAME",
    "CLOUD_SQL_DATABASE",
    "CLOUD_SQL_USER",
    "CLOUD_SQL_PASSWORD",
    "GRPC_PORT",
    "CORS_ALLOWED_ORIGINS",
];

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    data: String,
}

/// Reads the latest version of named secrets over the REST API
pub struct SecretManagerClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    project_id: String,
    base_url: String,
}

impl SecretManagerClient {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        project_id: String,
        base_url: String,
    ) -> Self {
        Self {
            http,
            tokens,
            project_id,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Latest version of `name`, or `None` when the secret does not exist
    pub async fn access(&self, name: &str) -> AssetResult<Option<String>> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| AssetError::Config(format!("secret store credentials: {}", e)))?;

        let url = format!(
            "{}/projects/{}/secrets/{}/versions/latest:access",
            self.base_url, self.project_id, name
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AssetError::Config(format!("secret store unreachable: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AssetError::Config(format!(
                "secret {} could not be read: {}",
                name,
                response.status()
            )));
        }

        let body: AccessResponse = response
            .json()
            .await
            .map_err(|e| AssetError::Config(format!("malformed secret response: {}", e)))?;
        let bytes = general_purpose::STANDARD
            .decode(body.payload.data.as_bytes())
            .map_err(|e| AssetError::Config(format!("secret {} is not base64: {}", name, e)))?;
        let value = String::from_utf8(bytes)
            .map_err(|_| AssetError::Config(format!("secret {} is not UTF-8", name)))?;

        Ok(Some(value.trim().to_string()))
    }

    /// Fetch every key concurrently; unreadable secrets are skipped
    pub async fn fetch_all(&self, keys: &[&str]) -> HashMap<String, String> {
        let lookups = keys.iter().map(|key| async move { (*key, self.access(key).await) });

        let mut found = HashMap::new();
        for (key, result) in join_all(lookups).await {
            match result {
                Ok(Some(value)) => {
                    found.insert(key.to_string(), value);
                }
                Ok(None) => debug!(secret = key, "Secret not found, using environment"),
                Err(e) => warn!(secret = key, error = %e, "Secret lookup failed, using environment"),
            }
        }

        info!(
            project = %self.project_id,
            loaded = found.len(),
            "Loaded configuration from Secret Manager"
        );
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::StaticToken;
    use axum::{
        extract::Request,
        http::{header, StatusCode},
        Json, Router,
    };
    use serde_json::json;

    /// Serves `GOOGLE_MAPS_API_KEY` for project `demo`; everything else is 404
    async fn spawn_fake_secret_manager() -> String {
        async fn access(request: Request) -> Result<Json<serde_json::Value>, StatusCode> {
            let auth = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if auth != "Bearer secret-token" {
                return Err(StatusCode::UNAUTHORIZED);
            }

            match request.uri().path() {
                "/v1/projects/demo/secrets/GOOGLE_MAPS_API_KEY/versions/latest:access" => {
                    Ok(Json(json!({
                        "name": "projects/demo/secrets/GOOGLE_MAPS_API_KEY/versions/3",
                        "payload": { "data": general_purpose::STANDARD.encode("maps-key-from-secret\n") }
                    })))
                }
                _ => Err(StatusCode::NOT_FOUND),
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(access)).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn client(base_url: String, token: &str) -> SecretManagerClient {
        SecretManagerClient::new(
            reqwest::Client::new(),
            Arc::new(StaticToken::new(token.to_string())),
            "demo".to_string(),
            base_url,
        )
    }

    #[tokio::test]
    async fn test_access_decodes_payload() {
        let secrets = client(spawn_fake_secret_manager().await, "secret-token");

        let value = secrets.access("GOOGLE_MAPS_API_KEY").await.unwrap();
        assert_eq!(value.as_deref(), Some("maps-key-from-secret"));

        assert_eq!(secrets.access("CLOUD_SQL_USER").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_config_error() {
        let secrets = client(spawn_fake_secret_manager().await, "wrong");

        assert!(matches!(
            secrets.access("GOOGLE_MAPS_API_KEY").await,
            Err(AssetError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_only_found_secrets() {
        let secrets = client(spawn_fake_secret_manager().await, "secret-token");

        let found = secrets.fetch_all(SECRET_KEYS).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found["GOOGLE_MAPS_API_KEY"], "maps-key-from-secret");
    }
}
