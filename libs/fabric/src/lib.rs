//! Sheetwire Fabric - Call channel between the application and its engine
//!
//! Moves [`Envelope`](sheetwire_core::Envelope)s to an engine running either on
//! a local worker thread or behind an HTTP endpoint, and correlates each
//! result back to its caller by call id.
//!
//! # Example
//!
//! ```no_run
//! use sheetwire_core::{CallContext, CallData, EngineError};
//! use sheetwire_fabric::{Client, ClientConfig};
//! use serde_json::{json, Value};
//!
//! fn engine(data: &CallData) -> Result<Value, EngineError> {
//!     Ok(json!(data.params.len()))
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // In-process worker
//! let local = Client::worker(engine, ClientConfig::default())?;
//! let ctx = CallContext::new("space1");
//! let count: usize = local.call_as("count", vec![json!(1), json!(2)], &ctx).await?;
//!
//! // Or a hosted node
//! let remote = Client::http("http://127.0.0.1:7878/api/sqlite", ClientConfig::default())?;
//! let tables = remote.call("listTables", vec![], &CallContext::new("space1")).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod correlator;
pub mod error;
pub mod request;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use client::{CallState, Client};
pub use config::ClientConfig;
pub use error::{Error, RejectKind, Result};
pub use transport::{HttpTransport, Transport, WorkerTransport};
