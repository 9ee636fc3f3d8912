/// HTTP/JSON gateway
///
/// One handler set over the `ImageApi` strategy. Every handler runs under
/// its own deadline; expiry drops the in-flight call and answers 500.

pub mod images;
pub mod location;
pub mod transport;

pub use transport::{DirectApi, ImageApi, RpcApi};

use crate::config::CorsConfig;
use crate::error::{AssetError, AssetResult};
use crate::metrics;
use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// Room for multipart framing and text fields on top of the image itself
const FORM_OVERHEAD: usize = 64 * 1024;

/// Shared gateway state
#[derive(Clone)]
pub struct GatewayState {
    pub api: Arc<dyn ImageApi>,
    pub service_name: String,
}

/// `{success, message}` confirmation body
#[derive(Debug, Serialize)]
pub struct Confirmation {
    pub success: bool,
    pub message: String,
}

/// Run `call` under `budget`, mapping expiry to `Timeout`
pub async fn with_budget<T, F>(operation: &str, budget: Duration, call: F) -> AssetResult<T>
where
    F: Future<Output = AssetResult<T>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, budget_ms = budget.as_millis() as u64, "Request deadline exceeded");
            Err(AssetError::Timeout(format!(
                "{} did not complete within {:?}",
                operation, budget
            )))
        }
    }
}

/// CORS policy: configured origins only, or any origin in development
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origin = if config.allow_any {
        // Credentials forbid a literal `*`, so the request origin is echoed
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::HEAD,
        ])
        .allow_headers([
            header::ACCEPT,
            header::ACCEPT_LANGUAGE,
            header::CONTENT_LANGUAGE,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            header::ORIGIN,
        ])
        .expose_headers([header::CONTENT_LENGTH, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(config.max_age))
}

/// Build the gateway router
pub fn build_router(state: GatewayState, cors: &CorsConfig, upload_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .merge(images::routes())
        .merge(location::routes())
        .route_layer(middleware::from_fn(track_metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(upload_limit + FORM_OVERHEAD))
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Health check handler
async fn health_check(
    axum::extract::State(state): axum::extract::State<GatewayState>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        "service": state.service_name,
    }))
}

/// Prometheus scrape endpoint
async fn metrics_handler() -> Response {
    match metrics::export_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => AssetError::Internal(e).into_response(),
    }
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_budget_expiry_is_timeout() {
        let result: AssetResult<()> = with_budget("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AssetError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_budget_passes_through_result() {
        let result = with_budget("fast", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
