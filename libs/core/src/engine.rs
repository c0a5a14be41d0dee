use std::fmt;

use serde_json::Value;

use crate::envelope::CallData;

/// Executes calls inside a worker
///
/// The worker owns its engine exclusively, so implementations get `&mut self`
/// and need no internal locking.
pub trait Engine: Send + 'static {
    /// Run `data.method` with `data.params` against `data.db_name`
    fn call(&mut self, data: &CallData) -> Result<Value, EngineError>;
}

impl<F> Engine for F
where
    F: FnMut(&CallData) -> Result<Value, EngineError> + Send + 'static,
{
    fn call(&mut self, data: &CallData) -> Result<Value, EngineError> {
        self(data)
    }
}

/// Failure of a single engine call, reported to the caller as a remote error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(format!("Unknown method: {}", method))
    }

    pub fn bad_params(method: &str, reason: impl fmt::Display) -> Self {
        Self::new(format!("Invalid params for {}: {}", method, reason))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EngineError {}
