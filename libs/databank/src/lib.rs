//! Sheetwire Databank - SQLite engine that runs inside a worker
//!
//! [`Databank`] implements [`sheetwire_core::Engine`], so it can be handed
//! straight to a worker transport. Each `dbName` maps to its own SQLite
//! database.

pub mod bank;
pub mod error;
pub mod naming;
pub mod value;

pub use bank::Databank;
pub use error::{Error, Result};
