use std::thread::JoinHandle;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use sheetwire_core::{CallId, Engine, Envelope, Reply, WorkerMessage};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, trace, warn};

use crate::codec::{Codec, JsonCodec};
use crate::correlator::Correlator;
use crate::error::{Error, Result};
use crate::transport::Transport;

const DEFAULT_THREAD_NAME: &str = "sheetwire-worker";

/// Transport into an engine running on its own thread
///
/// Envelopes and replies cross the thread boundary as encoded bytes only;
/// the engine shares no memory with the caller.
pub struct WorkerTransport<C = JsonCodec> {
    inbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    correlator: std::sync::Arc<Correlator>,
    codec: C,
}

impl WorkerTransport<JsonCodec> {
    /// Start `engine` on a worker thread with the JSON codec
    ///
    /// Returns a config error when called outside a Tokio runtime.
    pub fn spawn<E: Engine>(engine: E) -> Result<Self> {
        Self::builder().spawn(engine)
    }

    /// Create a builder for configuring the worker
    pub fn builder() -> WorkerTransportBuilder<JsonCodec> {
        WorkerTransportBuilder::new()
    }
}

impl<C: Codec> WorkerTransport<C> {
    /// Number of calls sent but not yet delivered to a waiter
    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }

    pub fn is_closed(&self) -> bool {
        self.correlator.is_closed()
    }
}

#[async_trait::async_trait]
impl<C: Codec> Transport for WorkerTransport<C> {
    fn name(&self) -> &'static str {
        "worker"
    }

    /// Opens a reply slot for the envelope's id. The slot stays until an
    /// `on_callback` for that id finishes or the transport closes.
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let bytes = self.codec.encode(envelope)?;
        let inbound = self
            .inbound
            .lock()
            .await
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        self.correlator.open(envelope.id())?;
        if inbound.send(bytes).is_err() {
            self.correlator.release(envelope.id());
            return Err(Error::ConnectionClosed);
        }

        trace!(call_id = %envelope.id(), method = envelope.method(), "Posted envelope to worker");
        Ok(())
    }

    async fn on_callback(&self, id: &CallId, timeout: Duration) -> Result<Value> {
        let pending = self.correlator.subscribe(id)?;
        pending.wait(timeout).await
    }

    async fn close(&self) -> Result<()> {
        // Dropping the sender ends the worker loop
        self.inbound.lock().await.take();

        let handle = self.thread.lock().await.take();
        if let Some(handle) = handle {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| Error::Custom(format!("Failed to join worker: {}", e)))?
                .map_err(|_| Error::Custom("Worker thread panicked".to_string()))?;
        }
        Ok(())
    }
}

/// Builder for configuring a worker transport
pub struct WorkerTransportBuilder<C> {
    codec: C,
    thread_name: String,
}

impl WorkerTransportBuilder<JsonCodec> {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            codec: JsonCodec,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl Default for WorkerTransportBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> WorkerTransportBuilder<C> {
    /// Set the codec used on the thread boundary
    pub fn codec<C2: Codec>(self, codec: C2) -> WorkerTransportBuilder<C2> {
        WorkerTransportBuilder {
            codec,
            thread_name: self.thread_name,
        }
    }

    /// Set the worker thread's name
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Start the worker thread and the reply listener
    ///
    /// Fails with a config error when called outside a Tokio runtime.
    pub fn spawn<E: Engine>(self, engine: E) -> Result<WorkerTransport<C>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Config(format!("worker transport needs a Tokio runtime: {}", e)))?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let worker_codec = self.codec.clone();
        let thread = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run_worker(engine, worker_codec, inbound_rx, outbound_tx))?;

        let correlator = std::sync::Arc::new(Correlator::new());
        runtime.spawn(listen(outbound_rx, self.codec.clone(), correlator.clone()));

        debug!(thread = %self.thread_name, "Worker started");

        Ok(WorkerTransport {
            inbound: Mutex::new(Some(inbound_tx)),
            thread: Mutex::new(Some(thread)),
            correlator,
            codec: self.codec,
        })
    }
}

#[derive(Deserialize)]
struct IdOnly {
    id: CallId,
}

/// Worker side: decode, execute, reply, until the caller hangs up
fn run_worker<E: Engine, C: Codec>(
    mut engine: E,
    codec: C,
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
) {
    while let Some(bytes) = inbound.blocking_recv() {
        let message = match codec.decode::<Envelope>(&bytes) {
            Ok(envelope) => {
                let (id, data) = envelope.into_parts();
                trace!(call_id = %id, method = %data.method, "Worker executing call");
                WorkerMessage {
                    id,
                    reply: Reply::from_result(engine.call(&data)),
                }
            }
            Err(err) => match codec.decode::<IdOnly>(&bytes) {
                Ok(IdOnly { id }) => WorkerMessage {
                    id,
                    reply: Reply::error(format!("Malformed envelope: {}", err)),
                },
                Err(_) => {
                    warn!(error = %err, "Worker dropped an envelope without an id");
                    continue;
                }
            },
        };

        let encoded = match codec.encode(&message) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(call_id = %message.id, error = %err, "Worker failed to encode reply");
                continue;
            }
        };

        if outbound.send(encoded).is_err() {
            break;
        }
    }
    debug!("Worker loop finished");
}

/// Caller side: route replies to their waiters
async fn listen<C: Codec>(
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    codec: C,
    correlator: std::sync::Arc<Correlator>,
) {
    while let Some(bytes) = outbound.recv().await {
        match codec.decode::<WorkerMessage>(&bytes) {
            Ok(message) => {
                correlator.resolve(&message.id, message.reply);
            }
            Err(err) => warn!(error = %err, "Dropping undecodable worker message"),
        }
    }
    correlator.close_all();
}
