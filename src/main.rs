use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;

use courier_dispatch::api;
use courier_dispatch::api::grpc::pb::dispatch_service_server::DispatchServiceServer;
use courier_dispatch::api::grpc::GrpcDispatchService;
use courier_dispatch::config::{Config, LogFormat};
use courier_dispatch::error::AppError;
use courier_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    init_tracing(&config);

    let shared_state = Arc::new(AppState::in_memory(&config));
    let shutdown = CancellationToken::new();

    let background = shared_state
        .start_background(&config, shutdown.clone())
        .await
        .map_err(|err| AppError::Internal(format!("failed to start background tasks: {err}")))?;

    let app = api::rest::router(shared_state.clone());

    let grpc_addr = format!("0.0.0.0:{}", config.grpc_port)
        .parse()
        .map_err(|err| AppError::Internal(format!("invalid grpc address: {err}")))?;
    let grpc_service = GrpcDispatchService::new(shared_state.clone());
    let grpc_shutdown = shutdown.clone();

    tokio::spawn(async move {
        tracing::info!(grpc_port = %grpc_addr, "grpc server started");
        if let Err(err) = TonicServer::builder()
            .add_service(DispatchServiceServer::new(grpc_service))
            .serve_with_shutdown(grpc_addr, grpc_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %err, "grpc server failed");
        }
    });

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        instance_id = %config.instance_id,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    shutdown.cancel();
    for task in background {
        if let Err(err) = task.await {
            tracing::warn!(error = %err, "background task ended abnormally");
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);

    match config.log_format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
