use std::time::Duration;

use serde_json::Value;
use sheetwire_core::{CallId, Envelope, Reply};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::store::{PendingStore, RawResponse};
use crate::transport::{Transport, DEFAULT_POLL_INTERVAL};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport to a remote endpoint over HTTP POST
///
/// `send` stores the raw response keyed by call id; `on_callback` polls the
/// store until the record shows up or the deadline passes.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    poll_interval: Duration,
    store: PendingStore,
}

impl HttpTransport {
    /// Create a transport for `endpoint` with default settings
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::builder().endpoint(endpoint).build()
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The pending-record store of this instance
    pub fn store(&self) -> &PendingStore {
        &self.store
    }

    /// Poll for the result of `id` every `interval` until `timeout` elapses
    pub async fn on_callback_with(
        &self,
        id: &CallId,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Value> {
        if interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        // Dropped on every return below, which cancels the ticker
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    self.store.abandon(id);
                    warn!(
                        call_id = %id,
                        timeout_ms = timeout.as_millis() as u64,
                        "No response within timeout"
                    );
                    return Err(Error::Timeout(timeout));
                }

                _ = ticker.tick() => {
                    if let Some(response) = self.store.take(id) {
                        trace!(call_id = %id, status = response.status, "Picked up response");
                        return decode_reply(&response);
                    }
                }
            }
        }
    }

    async fn post(&self, envelope: &Envelope) -> Result<RawResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!(
                "Network response was not ok: HTTP {}",
                status
            )));
        }

        let body = response.bytes().await?;
        Ok(RawResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

fn decode_reply(response: &RawResponse) -> Result<Value> {
    let reply: Reply = JsonCodec
        .decode(&response.body)
        .map_err(|e| Error::Decode(format!("Failed to parse response: {}", e)))?;
    reply.into_result().map_err(Error::from)
}

/// Clears the in-flight mark if `send` is dropped or fails before a response lands
struct Flight<'a> {
    store: &'a PendingStore,
    id: &'a CallId,
    landed: bool,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.landed {
            self.store.forget(self.id);
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let id = envelope.id();
        self.store.begin(id);
        let mut flight = Flight {
            store: &self.store,
            id,
            landed: false,
        };

        let response = self.post(envelope).await?;
        flight.landed = true;

        if !self.store.insert(id.clone(), response) {
            debug!(call_id = %id, "Response arrived after its caller gave up");
        }
        Ok(())
    }

    async fn on_callback(&self, id: &CallId, timeout: Duration) -> Result<Value> {
        self.on_callback_with(id, timeout, self.poll_interval).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builder for configuring HTTP transport
#[derive(Default)]
pub struct HttpTransportBuilder {
    endpoint: Option<String>,
    poll_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

impl HttpTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the URL envelopes are POSTed to
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set how often `on_callback` checks the store
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the timeout of the underlying HTTP request
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Use a preconfigured HTTP client; `request_timeout` is ignored then
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the transport with the configured settings
    pub fn build(self) -> Result<HttpTransport> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::Config("Endpoint not set".to_string()))?;

        let poll_interval = self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }

        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
                .build()?,
        };

        Ok(HttpTransport {
            client,
            endpoint,
            poll_interval,
            store: PendingStore::new(),
        })
    }
}
