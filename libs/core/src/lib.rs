//! Sheetwire Core - Shared protocol types
//!
//! Defines the call envelope sent across a worker or network boundary,
//! the reply wire format coming back, and the [`Engine`] trait implemented
//! by whatever executes calls on the far side.
//!
//! # Example
//!
//! ```
//! use sheetwire_core::{CallId, Envelope};
//! use serde_json::json;
//!
//! let envelope = Envelope::call("sql", vec![json!("select 1")], "space1")
//!     .with_table_id("5c5bf853")
//!     .with_id(CallId::generate());
//!
//! let text = serde_json::to_string(&envelope).unwrap();
//! let back: Envelope = serde_json::from_str(&text).unwrap();
//! assert_eq!(back, envelope);
//! ```

pub mod engine;
pub mod envelope;
pub mod error;
pub mod reply;

// Re-exports for convenience
pub use engine::{Engine, EngineError};
pub use envelope::{CallContext, CallData, CallId, Envelope, MsgType};
pub use error::{Error, Result};
pub use reply::{RemoteFailure, Reply, Status, WorkerMessage};
