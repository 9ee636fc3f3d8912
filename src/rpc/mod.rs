/// gRPC surface
///
/// `ImageService` and `LocationService` over tonic, plus server reflection
/// built from the compiled descriptor set. Errors leave as `tonic::Status`
/// with an `x-error-kind` entry so RPC clients can rebuild the exact kind.

pub mod convert;

use crate::coordinator::{AssetCoordinator, UploadRequest};
use crate::error::{AssetError, AssetResult};
use crate::geocoding::LocationService;
use crate::proto::{
    self,
    image_service_server::{ImageService, ImageServiceServer},
    location_service_server::LocationServiceServer,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{transport::Server, Request, Response, Status};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Headroom over the upload limit for the rest of the message
const MESSAGE_OVERHEAD: usize = 64 * 1024;

pub struct ImageRpcService {
    coordinator: Arc<AssetCoordinator>,
}

impl ImageRpcService {
    pub fn new(coordinator: Arc<AssetCoordinator>) -> Self {
        Self { coordinator }
    }
}

fn image_response(record: crate::db::ImageRecord, message: &str) -> proto::ImageResponse {
    proto::ImageResponse {
        success: true,
        message: message.to_string(),
        metadata: Some(record.into()),
    }
}

#[tonic::async_trait]
impl ImageService for ImageRpcService {
    async fn get_current_image(
        &self,
        _request: Request<proto::GetCurrentImageRequest>,
    ) -> Result<Response<proto::ImageResponse>, Status> {
        let record = self.coordinator.get_current_image().await?;
        Ok(Response::new(image_response(record, "Current image retrieved successfully")))
    }

    async fn upload_image(
        &self,
        request: Request<proto::UploadImageRequest>,
    ) -> Result<Response<proto::ImageResponse>, Status> {
        let req = request.into_inner();
        let upload = UploadRequest {
            id: Some(req.id).filter(|id| !id.is_empty()),
            title: req.title,
            description: req.description,
            location: req.location.map(Into::into),
            data: req.image_data,
        };

        let record = self.coordinator.upload(upload).await?;
        Ok(Response::new(image_response(record, "Image uploaded successfully")))
    }

    async fn get_image_count(
        &self,
        _request: Request<proto::GetImageCountRequest>,
    ) -> Result<Response<proto::GetImageCountResponse>, Status> {
        let count = self.coordinator.count().await?;
        Ok(Response::new(proto::GetImageCountResponse { count }))
    }

    async fn list_images(
        &self,
        _request: Request<proto::ListImagesRequest>,
    ) -> Result<Response<proto::ListImagesResponse>, Status> {
        let images = self.coordinator.list_images().await?;
        Ok(Response::new(proto::ListImagesResponse {
            success: true,
            message: format!("Retrieved {} images", images.len()),
            images: images.into_iter().map(Into::into).collect(),
        }))
    }

    async fn get_image_by_id(
        &self,
        request: Request<proto::GetImageByIdRequest>,
    ) -> Result<Response<proto::ImageResponse>, Status> {
        let id = request.into_inner().id;
        if id.trim().is_empty() {
            return Err(AssetError::InvalidInput("Image ID is required".to_string()).into());
        }

        let record = self.coordinator.get_image(&id).await?;
        Ok(Response::new(image_response(record, "Image retrieved successfully")))
    }

    async fn delete_image(
        &self,
        request: Request<proto::DeleteImageRequest>,
    ) -> Result<Response<proto::DeleteImageResponse>, Status> {
        let id = request.into_inner().id;
        if id.trim().is_empty() {
            return Err(AssetError::InvalidInput("Image ID is required".to_string()).into());
        }

        self.coordinator.delete(&id).await?;
        Ok(Response::new(proto::DeleteImageResponse {
            success: true,
            message: format!("Image {} deleted successfully", id),
        }))
    }

    async fn get_image_data(
        &self,
        request: Request<proto::GetImageDataRequest>,
    ) -> Result<Response<proto::GetImageDataResponse>, Status> {
        let id = request.into_inner().id;
        let (record, data) = self.coordinator.image_data(&id).await?;
        Ok(Response::new(proto::GetImageDataResponse {
            image_data: data,
            blob_handle: record.blob_handle,
        }))
    }
}

pub struct LocationRpcService {
    locations: LocationService,
}

impl LocationRpcService {
    pub fn new(locations: LocationService) -> Self {
        Self { locations }
    }
}

fn location_response(location: crate::db::LocationRecord) -> proto::LocationResponse {
    proto::LocationResponse {
        success: true,
        message: "Location retrieved successfully".to_string(),
        location: Some(location.into()),
    }
}

#[tonic::async_trait]
impl proto::location_service_server::LocationService for LocationRpcService {
    async fn get_location_from_coords(
        &self,
        request: Request<proto::GetLocationFromCoordsRequest>,
    ) -> Result<Response<proto::LocationResponse>, Status> {
        let req = request.into_inner();
        let location = self
            .locations
            .location_from_coords(req.latitude, req.longitude)
            .await?;
        Ok(Response::new(location_response(location)))
    }

    async fn get_location_from_name(
        &self,
        request: Request<proto::GetLocationFromNameRequest>,
    ) -> Result<Response<proto::LocationResponse>, Status> {
        let name = request.into_inner().name;
        let location = self.locations.location_from_name(&name).await?;
        Ok(Response::new(location_response(location)))
    }
}

/// Serve both RPC services plus reflection on `listener` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    coordinator: Arc<AssetCoordinator>,
    locations: LocationService,
    upload_limit: usize,
    shutdown: impl Future<Output = ()> + Send,
) -> AssetResult<()> {
    let limit = message_limit(upload_limit);

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .map_err(|e| AssetError::Internal(format!("Failed to build reflection service: {}", e)))?;

    let images = ImageServiceServer::new(ImageRpcService::new(coordinator))
        .max_decoding_message_size(limit)
        .max_encoding_message_size(limit);
    let location = LocationServiceServer::new(LocationRpcService::new(locations));

    if let Ok(addr) = listener.local_addr() {
        info!("gRPC server listening on {}", addr);
    }

    Server::builder()
        .layer(TraceLayer::new_for_grpc())
        .add_service(images)
        .add_service(location)
        .add_service(reflection)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| AssetError::Internal(format!("gRPC server error: {}", e)))
}

/// Largest gRPC message either side accepts for a given upload limit
pub fn message_limit(upload_limit: usize) -> usize {
    upload_limit + MESSAGE_OVERHEAD
}
