/// Transport strategies for the HTTP gateway
///
/// The gateway handlers only see `ImageApi`. `DirectApi` calls the
/// coordinator in-process; `RpcApi` goes through tonic clients and carries
/// each handler's budget as the gRPC deadline.

use crate::coordinator::{AssetCoordinator, UploadRequest};
use crate::db::{ImageRecord, LocationRecord};
use crate::error::{AssetError, AssetResult};
use crate::geocoding::LocationService;
use crate::proto::{
    self, image_service_client::ImageServiceClient,
    location_service_client::LocationServiceClient,
};
use crate::rpc;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn current_image(&self, budget: Duration) -> AssetResult<ImageRecord>;
    async fn upload(&self, request: UploadRequest, budget: Duration) -> AssetResult<ImageRecord>;
    async fn count(&self, budget: Duration) -> AssetResult<i64>;
    async fn list(&self, budget: Duration) -> AssetResult<Vec<ImageRecord>>;
    async fn get(&self, id: &str, budget: Duration) -> AssetResult<ImageRecord>;
    async fn delete(&self, id: &str, budget: Duration) -> AssetResult<()>;
    async fn image_data(&self, id: &str, budget: Duration) -> AssetResult<Vec<u8>>;
    async fn location_from_coords(
        &self,
        latitude: f64,
        longitude: f64,
        budget: Duration,
    ) -> AssetResult<LocationRecord>;
    async fn location_from_name(&self, name: &str, budget: Duration) -> AssetResult<LocationRecord>;
}

/// In-process strategy
pub struct DirectApi {
    coordinator: Arc<AssetCoordinator>,
    locations: LocationService,
}

impl DirectApi {
    pub fn new(coordinator: Arc<AssetCoordinator>, locations: LocationService) -> Self {
        Self {
            coordinator,
            locations,
        }
    }
}

#[async_trait]
impl ImageApi for DirectApi {
    async fn current_image(&self, _budget: Duration) -> AssetResult<ImageRecord> {
        self.coordinator.get_current_image().await
    }

    async fn upload(&self, request: UploadRequest, _budget: Duration) -> AssetResult<ImageRecord> {
        self.coordinator.upload(request).await
    }

    async fn count(&self, _budget: Duration) -> AssetResult<i64> {
        self.coordinator.count().await
    }

    async fn list(&self, _budget: Duration) -> AssetResult<Vec<ImageRecord>> {
        self.coordinator.list_images().await
    }

    async fn get(&self, id: &str, _budget: Duration) -> AssetResult<ImageRecord> {
        self.coordinator.get_image(id).await
    }

    async fn delete(&self, id: &str, _budget: Duration) -> AssetResult<()> {
        self.coordinator.delete(id).await
    }

    async fn image_data(&self, id: &str, _budget: Duration) -> AssetResult<Vec<u8>> {
        self.coordinator.image_data(id).await.map(|(_, data)| data)
    }

    async fn location_from_coords(
        &self,
        latitude: f64,
        longitude: f64,
        _budget: Duration,
    ) -> AssetResult<LocationRecord> {
        self.locations.location_from_coords(latitude, longitude).await
    }

    async fn location_from_name(&self, name: &str, _budget: Duration) -> AssetResult<LocationRecord> {
        self.locations.location_from_name(name).await
    }
}

/// Remote strategy over a shared gRPC channel
#[derive(Clone)]
pub struct RpcApi {
    images: ImageServiceClient<Channel>,
    locations: LocationServiceClient<Channel>,
}

fn with_deadline<T>(message: T, budget: Duration) -> Request<T> {
    let mut request = Request::new(message);
    request.set_timeout(budget);
    request
}

fn record_from(metadata: Option<proto::ImageMetadata>) -> AssetResult<ImageRecord> {
    metadata
        .ok_or_else(|| AssetError::Internal("RPC response carried no image metadata".to_string()))?
        .try_into()
}

fn location_from(location: Option<proto::Location>) -> AssetResult<LocationRecord> {
    location
        .map(Into::into)
        .ok_or_else(|| AssetError::Internal("RPC response carried no location".to_string()))
}

impl RpcApi {
    /// Lazily connected client; the first call dials `target`
    pub fn connect_lazy(target: &str, upload_limit: usize) -> AssetResult<Self> {
        let channel = Endpoint::from_shared(target.to_string())
            .map_err(|e| AssetError::Config(format!("Invalid RPC target {}: {}", target, e)))?
            .connect_timeout(Duration::from_secs(5))
            .connect_lazy();
        Ok(Self::from_channel(channel, upload_limit))
    }

    pub fn from_channel(channel: Channel, upload_limit: usize) -> Self {
        let limit = rpc::message_limit(upload_limit);
        Self {
            images: ImageServiceClient::new(channel.clone())
                .max_decoding_message_size(limit)
                .max_encoding_message_size(limit),
            locations: LocationServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl ImageApi for RpcApi {
    async fn current_image(&self, budget: Duration) -> AssetResult<ImageRecord> {
        let response = self
            .images
            .clone()
            .get_current_image(with_deadline(proto::GetCurrentImageRequest {}, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        record_from(response.into_inner().metadata)
    }

    async fn upload(&self, request: UploadRequest, budget: Duration) -> AssetResult<ImageRecord> {
        let message = proto::UploadImageRequest {
            image_data: request.data,
            title: request.title,
            description: request.description,
            location: request.location.map(Into::into),
            id: request.id.unwrap_or_default(),
        };
        let response = self
            .images
            .clone()
            .upload_image(with_deadline(message, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        record_from(response.into_inner().metadata)
    }

    async fn count(&self, budget: Duration) -> AssetResult<i64> {
        let response = self
            .images
            .clone()
            .get_image_count(with_deadline(proto::GetImageCountRequest {}, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        Ok(response.into_inner().count)
    }

    async fn list(&self, budget: Duration) -> AssetResult<Vec<ImageRecord>> {
        let response = self
            .images
            .clone()
            .list_images(with_deadline(proto::ListImagesRequest {}, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        response
            .into_inner()
            .images
            .into_iter()
            .map(ImageRecord::try_from)
            .collect()
    }

    async fn get(&self, id: &str, budget: Duration) -> AssetResult<ImageRecord> {
        let message = proto::GetImageByIdRequest { id: id.to_string() };
        let response = self
            .images
            .clone()
            .get_image_by_id(with_deadline(message, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        record_from(response.into_inner().metadata)
    }

    async fn delete(&self, id: &str, budget: Duration) -> AssetResult<()> {
        let message = proto::DeleteImageRequest { id: id.to_string() };
        self.images
            .clone()
            .delete_image(with_deadline(message, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        Ok(())
    }

    async fn image_data(&self, id: &str, budget: Duration) -> AssetResult<Vec<u8>> {
        let message = proto::GetImageDataRequest { id: id.to_string() };
        let response = self
            .images
            .clone()
            .get_image_data(with_deadline(message, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        Ok(response.into_inner().image_data)
    }

    async fn location_from_coords(
        &self,
        latitude: f64,
        longitude: f64,
        budget: Duration,
    ) -> AssetResult<LocationRecord> {
        let message = proto::GetLocationFromCoordsRequest {
            latitude,
            longitude,
        };
        let response = self
            .locations
            .clone()
            .get_location_from_coords(with_deadline(message, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        location_from(response.into_inner().location)
    }

    async fn location_from_name(&self, name: &str, budget: Duration) -> AssetResult<LocationRecord> {
        let message = proto::GetLocationFromNameRequest {
            name: name.to_string(),
        };
        let response = self
            .locations
            .clone()
            .get_location_from_name(with_deadline(message, budget))
            .await
            .map_err(|s| AssetError::from_status(&s))?;
        location_from(response.into_inner().location)
    }
}
