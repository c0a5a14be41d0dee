use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use sheetwire_core::{CallContext, CallData, Engine, Envelope};
use tracing::{debug, debug_span, trace, Instrument};

use crate::config::ClientConfig;
use crate::error::{Error, RejectKind, Result};
use crate::transport::{HttpTransport, Transport, WorkerTransport};

/// Lifecycle of a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    Sent,
    Resolved,
    Rejected(RejectKind),
}

/// Call-and-await interface over whichever transport is configured
///
/// Cloning is cheap; clones share the transport and its pending calls.
/// Concurrent calls are independent and may finish in any order.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl Client {
    /// Create a client from an existing transport
    pub fn from_transport(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
        }
    }

    /// Run `engine` on a worker thread and talk to it
    pub fn worker(engine: impl Engine, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = WorkerTransport::spawn(engine)?;
        Ok(Self::from_transport(transport, config))
    }

    /// Talk to a remote endpoint over HTTP
    pub fn http(endpoint: impl Into<String>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::builder()
            .endpoint(endpoint)
            .poll_interval(config.poll_interval())
            .request_timeout(config.request_timeout())
            .build()?;
        Ok(Self::from_transport(transport, config))
    }

    /// Pick the transport from `config`: HTTP when an endpoint is set, otherwise
    /// a worker built by `engine`
    pub fn connect<E, F>(config: ClientConfig, engine: F) -> Result<Self>
    where
        E: Engine,
        F: FnOnce() -> E,
    {
        match config.endpoint.clone() {
            Some(endpoint) => Self::http(endpoint, config),
            None => Self::worker(engine(), config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Call `method` with the configured deadline
    pub async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        context: &CallContext,
    ) -> Result<Value> {
        self.call_with_timeout(method, params, context, self.config.timeout())
            .await
    }

    /// Call `method` with an explicit deadline
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Vec<Value>,
        context: &CallContext,
        timeout: Duration,
    ) -> Result<Value> {
        self.dispatch(Envelope::from_context(method, params, context), timeout)
            .await
    }

    /// Call `method` and decode its result into `T`
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
        context: &CallContext,
    ) -> Result<T> {
        let value = self.call(method, params, context).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Decode(format!("Unexpected result for {}: {}", method, e)))
    }

    /// Forward an already-built call payload under a fresh id
    pub async fn invoke(&self, data: CallData) -> Result<Value> {
        self.dispatch(Envelope::new(data), self.config.timeout())
            .await
    }

    async fn dispatch(&self, envelope: Envelope, timeout: Duration) -> Result<Value> {
        let span = debug_span!(
            "call",
            call_id = %envelope.id(),
            method = envelope.method(),
            db_name = envelope.db_name(),
            transport = self.transport.name()
        );

        async move {
            trace!(state = ?CallState::Created);

            let send = async {
                self.transport.send(&envelope).await?;
                trace!(state = ?CallState::Sent);
                Ok::<(), Error>(())
            };
            let wait = self.transport.on_callback(envelope.id(), timeout);

            // A failed send drops the wait, a timed out wait drops the send
            let outcome = tokio::try_join!(send, wait).map(|(_, value)| value);

            match &outcome {
                Ok(_) => debug!(state = ?CallState::Resolved, "Call resolved"),
                Err(err) => debug!(
                    state = ?CallState::Rejected(err.kind()),
                    error = %err,
                    "Call rejected"
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Close the underlying transport
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
