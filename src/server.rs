/// Server startup for each serve mode
use crate::{
    config::{ServeMode, ServerConfig},
    context::AppContext,
    error::{AssetError, AssetResult},
    gateway::{self, DirectApi, GatewayState, ImageApi, RpcApi},
    rpc,
};
use axum::Router;
use futures::future::try_join;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Bind a TCP listener
async fn bind(host: &str, port: u16) -> AssetResult<TcpListener> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| AssetError::Internal(format!("Failed to bind to {}: {}", addr, e)))
}

/// Build the HTTP router over a transport strategy
pub fn http_router(config: &ServerConfig, api: Arc<dyn ImageApi>) -> Router {
    let state = GatewayState {
        api,
        service_name: config.service.name.clone(),
    };
    gateway::build_router(state, &config.cors, config.service.upload_limit)
}

/// Serve the HTTP gateway until `shutdown` resolves
pub async fn serve_http(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> AssetResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP gateway listening on {}", addr);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AssetError::Internal(format!("Server error: {}", e)))
}

/// Shutdown signal fanned out to every server in the process
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        let _ = tx.send(true);
    });
    rx
}

fn wait_for(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Run the process in the configured serve mode
pub async fn run(config: ServerConfig) -> AssetResult<()> {
    let shutdown = shutdown_signal();
    let service = config.service.clone();

    info!(mode = ?service.mode, "Starting {}", service.name);

    match service.mode {
        ServeMode::Gateway => {
            config.validate()?;
            let api = Arc::new(RpcApi::connect_lazy(&service.rpc_target, service.upload_limit)?);
            info!("Forwarding HTTP requests to {}", service.rpc_target);

            let listener = bind(&service.hostname, service.http_port).await?;
            serve_http(listener, http_router(&config, api), wait_for(shutdown)).await
        }
        ServeMode::Rpc => {
            let ctx = AppContext::new(config).await?;
            let listener = bind(&service.hostname, service.grpc_port).await?;
            rpc::serve(
                listener,
                ctx.coordinator.clone(),
                ctx.locations.clone(),
                service.upload_limit,
                wait_for(shutdown),
            )
            .await
        }
        ServeMode::Direct | ServeMode::Proxy => {
            let ctx = AppContext::new(config).await?;
            let grpc_listener = bind(&service.hostname, service.grpc_port).await?;
            let http_listener = bind(&service.hostname, service.http_port).await?;

            let api: Arc<dyn ImageApi> = if service.mode == ServeMode::Direct {
                Arc::new(DirectApi::new(ctx.coordinator.clone(), ctx.locations.clone()))
            } else {
                info!("HTTP gateway proxies through gRPC at {}", service.rpc_target);
                Arc::new(RpcApi::connect_lazy(&service.rpc_target, service.upload_limit)?)
            };

            let grpc = rpc::serve(
                grpc_listener,
                ctx.coordinator.clone(),
                ctx.locations.clone(),
                service.upload_limit,
                wait_for(shutdown.clone()),
            );
            let http = serve_http(
                http_listener,
                http_router(&ctx.config, api),
                wait_for(shutdown),
            );

            try_join(grpc, http).await.map(|_| ())
        }
    }
}
