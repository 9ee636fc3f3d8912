/// HTTP gateway tests against an in-process router
///
/// Uses an in-memory metadata store, a temporary disk blob store and a
/// canned geocoder so no external service is needed.
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use imagery::{
    blob_store::DiskBlobClient,
    config::CorsConfig,
    coordinator::{AssetCoordinator, OrphanPolicy},
    db::{LocationRecord, SqliteMetadataStore},
    error::AssetResult,
    gateway::{build_router, DirectApi, GatewayState},
    geocoding::{Geocoder, LocationService},
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "imagery-test-boundary";
const ALLOWED_ORIGIN: &str = "http://localhost:3000";

struct CannedGeocoder;

#[async_trait]
impl Geocoder for CannedGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> AssetResult<LocationRecord> {
        Ok(LocationRecord {
            latitude,
            longitude,
            name: "Paris".to_string(),
            country: "France".to_string(),
            city: "Paris".to_string(),
            ..Default::default()
        })
    }

    async fn forward(&self, name: &str) -> AssetResult<LocationRecord> {
        Ok(LocationRecord {
            latitude: 48.8566,
            longitude: 2.3522,
            name: name.to_string(),
            country: "France".to_string(),
            city: "Paris".to_string(),
            ..Default::default()
        })
    }
}

struct Harness {
    router: Router,
    _blobs: TempDir,
}

async fn harness() -> Harness {
    let blobs = tempfile::tempdir().unwrap();
    let store = SqliteMetadataStore::connect(":memory:").await.unwrap();
    let coordinator = Arc::new(AssetCoordinator::new(
        Arc::new(DiskBlobClient::new(blobs.path().to_path_buf())),
        Arc::new(store),
        OrphanPolicy::Retain,
    ));
    let locations = LocationService::new(Arc::new(CannedGeocoder));

    let state = GatewayState {
        api: Arc::new(DirectApi::new(coordinator, locations)),
        service_name: "image-asset-service".to_string(),
    };
    let cors = CorsConfig {
        allowed_origins: vec![ALLOWED_ORIGIN.to_string()],
        allow_any: false,
        max_age: 3600,
    };

    Harness {
        router: build_router(state, &cors, 1024 * 1024),
        _blobs: blobs,
    }
}

fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Body {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

fn upload_request(fields: &[(&str, &str)], image: Option<&[u8]>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/images/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart_body(fields, image))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let h = harness().await;
    let (status, body) = send(&h.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "image-asset-service");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_current_image_on_empty_store_is_not_found() {
    let h = harness().await;
    let (status, body) = send(&h.router, get("/api/v1/images/current")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_upload_then_read_back() {
    let h = harness().await;

    let (status, body) = send(
        &h.router,
        upload_request(
            &[
                ("title", "Sunset"),
                ("description", "Over the bay"),
                ("latitude", "37.8"),
                ("longitude", "-122.4"),
                ("location_name", "San Francisco"),
            ],
            Some(b"\xFF\xD8\xFFjpeg-bytes"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let id = body["metadata"]["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("img_"));
    assert_eq!(body["metadata"]["location"]["name"], "San Francisco");

    let (status, body) = send(&h.router, get(&format!("/api/v1/images/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["title"], "Sunset");

    let (status, body) = send(&h.router, get("/api/v1/images/current")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["id"], id.as_str());

    let (status, body) = send(&h.router, get("/api/v1/images/count")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = send(&h.router, get("/api/v1/images")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["images"].as_array().unwrap().len(), 1);

    let response = h
        .router
        .clone()
        .oneshot(get(&format!("/api/v1/images/{}/data", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"\xFF\xD8\xFFjpeg-bytes");
}

#[tokio::test]
async fn test_upload_without_location_fields_has_no_location() {
    let h = harness().await;
    let (status, body) = send(
        &h.router,
        upload_request(&[("title", "Plain")], Some(b"bytes")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["metadata"].get("location").is_none());
}

#[tokio::test]
async fn test_upload_without_image_is_bad_request() {
    let h = harness().await;
    let (status, body) = send(&h.router, upload_request(&[("title", "Nothing")], None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidInput");
}

#[tokio::test]
async fn test_upload_with_bad_latitude_is_bad_request() {
    let h = harness().await;

    let (status, _) = send(
        &h.router,
        upload_request(&[("latitude", "north")], Some(b"bytes")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &h.router,
        upload_request(&[("latitude", "95.0"), ("longitude", "0")], Some(b"bytes")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&h.router, get("/api/v1/images/count")).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_upload_with_same_id_is_idempotent() {
    let h = harness().await;

    for title in ["First", "Second"] {
        let (status, _) = send(
            &h.router,
            upload_request(&[("id", "img_fixed"), ("title", title)], Some(b"bytes")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = send(&h.router, get("/api/v1/images/count")).await;
    assert_eq!(body["count"], 1);

    let (_, body) = send(&h.router, get("/api/v1/images/img_fixed")).await;
    assert_eq!(body["metadata"]["title"], "Second");
}

#[tokio::test]
async fn test_delete_removes_image() {
    let h = harness().await;
    let (_, body) = send(
        &h.router,
        upload_request(&[("title", "Temporary")], Some(b"bytes")),
    )
    .await;
    let id = body["metadata"]["id"].as_str().unwrap().to_string();

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/v1/images/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.router, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send(&h.router, get(&format!("/api/v1/images/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_unknown_image_is_not_found() {
    let h = harness().await;
    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/api/v1/images/img_missing")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.router, delete).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let h = harness().await;
    let (status, body) = send(&h.router, get("/api/v2/nothing")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Endpoint not found");
}

#[tokio::test]
async fn test_location_from_coords() {
    let h = harness().await;
    let (status, body) = send(&h.router, get("/api/v1/location/coords?lat=48.85&lng=2.35")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["location"]["city"], "Paris");
}

#[tokio::test]
async fn test_location_from_coords_rejects_bad_input() {
    let h = harness().await;

    let (status, _) = send(&h.router, get("/api/v1/location/coords?lat=48.85")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.router, get("/api/v1/location/coords?lat=abc&lng=2")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.router, get("/api/v1/location/coords?lat=91&lng=2")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_location_from_name() {
    let h = harness().await;

    let (status, body) = send(&h.router, get("/api/v1/location/name?name=Paris")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["location"]["name"], "Paris");

    let (status, _) = send(&h.router, get("/api/v1/location/name?name=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let h = harness().await;
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, ALLOWED_ORIGIN)
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        ALLOWED_ORIGIN
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );

    let exposed = response
        .headers()
        .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(exposed.contains("content-length"));
    assert!(exposed.contains("content-type"));
}

#[tokio::test]
async fn test_cors_ignores_unknown_origin() {
    let h = harness().await;
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_cors_preflight() {
    let h = harness().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/images/upload")
        .header(header::ORIGIN, ALLOWED_ORIGIN)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .is_some());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = harness().await;
    let _ = send(&h.router, get("/health")).await;

    let response = h.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
}
