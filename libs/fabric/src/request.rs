use serde_json::Value;
use sheetwire_core::{CallContext, Engine};

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::Result;

/// Perform a one-off call against an HTTP endpoint
///
/// Builds a throwaway client with default settings, makes the call and drops it.
pub async fn call_http(
    endpoint: &str,
    method: &str,
    params: Vec<Value>,
    context: &CallContext,
) -> Result<Value> {
    let client = Client::http(endpoint, ClientConfig::default())?;
    client.call(method, params, context).await
}

/// Perform a one-off call against `engine` on a short-lived worker
pub async fn call_worker<E: Engine>(
    engine: E,
    method: &str,
    params: Vec<Value>,
    context: &CallContext,
) -> Result<Value> {
    let client = Client::worker(engine, ClientConfig::default())?;
    let outcome = client.call(method, params, context).await;
    client.close().await?;
    outcome
}
