use std::time::Duration;

use serde_json::Value;
use sheetwire_core::{CallId, Envelope};

use crate::error::Result;

pub mod http;
pub mod worker;

pub use self::http::{HttpTransport, HttpTransportBuilder};
pub use self::worker::{WorkerTransport, WorkerTransportBuilder};

/// Default poll interval of the HTTP transport
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transport trait for moving envelopes and their results across a boundary
///
/// Each transport instance owns its own table of pending calls. Results are
/// matched by call id, never by send order.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Hand the envelope to the other side without waiting for its result
    async fn send(&self, envelope: &Envelope) -> Result<()>;

    /// Wait at most `timeout` for the result of call `id`
    ///
    /// Produces exactly one outcome and frees everything held for `id`
    /// before returning.
    async fn on_callback(&self, id: &CallId, timeout: Duration) -> Result<Value>;

    /// Close the transport
    async fn close(&self) -> Result<()>;
}
