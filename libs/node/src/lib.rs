//! Sheetwire Node - Hosted endpoint for remote clients
//!
//! Accepts call envelopes over HTTP POST and answers with
//! `{ "status": "success" | "error", "result": ... }`, executing each call
//! on a worker-resident [`Databank`](sheetwire_databank::Databank).

pub mod config;
pub mod error;
pub mod logging;
pub mod server;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use server::{router, AppState, Node};
