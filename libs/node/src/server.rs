use std::future::Future;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use sheetwire_core::{Envelope, Reply, Status};
use sheetwire_databank::Databank;
use sheetwire_fabric::{Client, ClientConfig, Error as FabricError};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::error::Result;

/// Shared state behind the endpoint
#[derive(Clone)]
pub struct AppState {
    client: Client,
}

impl AppState {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// A hosted engine: one worker-resident databank behind one POST route
pub struct Node {
    config: NodeConfig,
    state: AppState,
}

impl Node {
    /// Start the databank worker described by `config`
    ///
    /// Fails when called outside a Tokio runtime.
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let databank = match &config.data_dir {
            Some(dir) => Databank::open_dir(dir)?,
            None => Databank::in_memory(),
        };
        let client = Client::worker(
            databank,
            ClientConfig::default().with_timeout(config.call_timeout()),
        )?;

        Ok(Self {
            config,
            state: AppState::new(client),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.config.path)
    }

    /// Serve on `listener` until `shutdown` completes, then stop the worker
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            addr = %listener.local_addr()?,
            path = %self.config.path,
            "Node listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.state.client.close().await?;
        info!("Node stopped");
        Ok(())
    }
}

/// Build the endpoint router with envelopes accepted at `path`
pub fn router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, post(handle_call))
        .with_state(state)
}

async fn handle_call(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> std::result::Result<Json<Reply>, (StatusCode, String)> {
    let (id, data) = envelope.into_parts();
    let method = data.method.clone();

    match state.client.invoke(data).await {
        Ok(result) => {
            info!(call_id = %id, method = %method, "Call succeeded");
            Ok(Json(Reply::success(result)))
        }
        Err(FabricError::Remote(failure)) => {
            info!(call_id = %id, method = %method, error = %failure, "Call failed in engine");
            Ok(Json(Reply {
                status: Status::Error,
                result: failure.detail,
            }))
        }
        Err(err) => {
            warn!(call_id = %id, method = %method, error = %err, "Call could not be completed");
            let status = match &err {
                FabricError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                FabricError::ConnectionClosed => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, err.to_string()))
        }
    }
}
