/// Image endpoints
use crate::coordinator::UploadRequest;
use crate::db::{ImageRecord, LocationRecord};
use crate::error::{AssetError, AssetResult};
use crate::gateway::{with_budget, Confirmation, GatewayState};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::time::Duration;

const CURRENT_BUDGET: Duration = Duration::from_secs(10);
const UPLOAD_BUDGET: Duration = Duration::from_secs(30);
const COUNT_BUDGET: Duration = Duration::from_secs(5);
const LIST_BUDGET: Duration = Duration::from_secs(10);
const GET_BUDGET: Duration = Duration::from_secs(5);
const DATA_BUDGET: Duration = Duration::from_secs(30);
const DELETE_BUDGET: Duration = Duration::from_secs(10);

/// Build image routes
pub fn routes() -> Router<GatewayState> {
    Router::new()
        .route("/api/v1/images", get(list_images))
        .route("/api/v1/images/current", get(current_image))
        .route("/api/v1/images/count", get(image_count))
        .route("/api/v1/images/upload", post(upload_image))
        .route("/api/v1/images/:id", get(get_image).delete(delete_image))
        .route("/api/v1/images/:id/data", get(image_data))
}

#[derive(Debug, Serialize)]
pub struct ImageEnvelope {
    pub success: bool,
    pub message: String,
    pub metadata: ImageRecord,
}

#[derive(Debug, Serialize)]
pub struct ImageListEnvelope {
    pub success: bool,
    pub message: String,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

fn envelope(metadata: ImageRecord, message: &str) -> Json<ImageEnvelope> {
    Json(ImageEnvelope {
        success: true,
        message: message.to_string(),
        metadata,
    })
}

fn require_id(id: &str) -> AssetResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AssetError::InvalidInput("Image ID is required".to_string()));
    }
    Ok(id)
}

/// GET /api/v1/images/current
async fn current_image(State(state): State<GatewayState>) -> AssetResult<Json<ImageEnvelope>> {
    let record = with_budget(
        "get current image",
        CURRENT_BUDGET,
        state.api.current_image(CURRENT_BUDGET),
    )
    .await?;
    Ok(envelope(record, "Current image retrieved successfully"))
}

/// GET /api/v1/images/count
async fn image_count(State(state): State<GatewayState>) -> AssetResult<Json<CountResponse>> {
    let count = with_budget("count images", COUNT_BUDGET, state.api.count(COUNT_BUDGET)).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /api/v1/images
async fn list_images(State(state): State<GatewayState>) -> AssetResult<Json<ImageListEnvelope>> {
    let images = with_budget("list images", LIST_BUDGET, state.api.list(LIST_BUDGET)).await?;
    Ok(Json(ImageListEnvelope {
        success: true,
        message: format!("Retrieved {} images", images.len()),
        images,
    }))
}

/// GET /api/v1/images/:id
async fn get_image(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> AssetResult<Json<ImageEnvelope>> {
    let id = require_id(&id)?;
    let record = with_budget("get image", GET_BUDGET, state.api.get(id, GET_BUDGET)).await?;
    Ok(envelope(record, "Image retrieved successfully"))
}

/// GET /api/v1/images/:id/data
async fn image_data(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> AssetResult<Response> {
    let id = require_id(&id)?;
    let data = with_budget("get image data", DATA_BUDGET, state.api.image_data(id, DATA_BUDGET)).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], data).into_response())
}

/// DELETE /api/v1/images/:id
async fn delete_image(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> AssetResult<Json<Confirmation>> {
    let id = require_id(&id)?;
    with_budget("delete image", DELETE_BUDGET, state.api.delete(id, DELETE_BUDGET)).await?;
    Ok(Json(Confirmation {
        success: true,
        message: format!("Image {} deleted successfully", id),
    }))
}

fn parse_coordinate(field: &str, value: &str) -> AssetResult<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| AssetError::InvalidInput(format!("Invalid {} value", field)))
}

/// Decode the multipart form into an upload request
async fn read_upload_form(mut multipart: Multipart) -> AssetResult<UploadRequest> {
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        AssetError::InvalidInput(format!("Failed to parse form data: {}", e))
    };

    let mut request = UploadRequest::default();
    let mut image: Option<Vec<u8>> = None;
    let mut location = LocationRecord::default();
    let mut has_location = false;

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" {
            image = Some(field.bytes().await.map_err(bad_form)?.to_vec());
            continue;
        }

        let value = field.text().await.map_err(bad_form)?;
        if value.trim().is_empty() {
            continue;
        }

        match name.as_str() {
            "id" => request.id = Some(value.trim().to_string()),
            "title" => request.title = value,
            "description" => request.description = value,
            "latitude" => {
                location.latitude = parse_coordinate("latitude", &value)?;
                has_location = true;
            }
            "longitude" => {
                location.longitude = parse_coordinate("longitude", &value)?;
                has_location = true;
            }
            "location_name" => {
                location.name = value;
                has_location = true;
            }
            "country" => {
                location.country = value;
                has_location = true;
            }
            "city" => {
                location.city = value;
                has_location = true;
            }
            "address" => {
                location.address = value;
                has_location = true;
            }
            _ => {}
        }
    }

    request.data =
        image.ok_or_else(|| AssetError::InvalidInput("Image file is required".to_string()))?;
    if has_location {
        request.location = Some(location);
    }
    Ok(request)
}

/// POST /api/v1/images/upload
async fn upload_image(
    State(state): State<GatewayState>,
    multipart: Multipart,
) -> AssetResult<(StatusCode, Json<ImageEnvelope>)> {
    let request = read_upload_form(multipart).await?;
    let record = with_budget("upload image", UPLOAD_BUDGET, state.api.upload(request, UPLOAD_BUDGET)).await?;
    Ok((StatusCode::CREATED, envelope(record, "Image uploaded successfully")))
}
