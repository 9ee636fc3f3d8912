/// Image asset coordination service
///
/// Uploads images to a blob store, keeps their metadata in a relational
/// store, and exposes both over gRPC and an HTTP/JSON gateway.

pub mod blob_store;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod gateway;
pub mod geocoding;
pub mod metrics;
pub mod rpc;
pub mod secrets;
pub mod server;

/// Generated gRPC types for `imagery.v1`
pub mod proto {
    tonic::include_proto!("imagery.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("imagery_descriptor");
}
