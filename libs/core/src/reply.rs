use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::EngineError;
use crate::envelope::CallId;

/// Outcome flag of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Response wire format: `{ "status": "success" | "error", "result": any }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: Status,
    #[serde(default)]
    pub result: Value,
}

impl Reply {
    pub fn success(result: Value) -> Self {
        Self {
            status: Status::Success,
            result,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            result: Value::String(message.into()),
        }
    }

    pub fn from_result(result: Result<Value, EngineError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(err) => Self::error(err.message),
        }
    }

    /// Turn the reply into the method's value, or the remote failure it reported
    pub fn into_result(self) -> Result<Value, RemoteFailure> {
        match self.status {
            Status::Success => Ok(self.result),
            Status::Error => Err(RemoteFailure::from_detail(self.result)),
        }
    }
}

/// Logical failure reported by the remote side
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    pub message: String,
    pub detail: Value,
}

impl RemoteFailure {
    /// A string payload is the message as-is; anything else is rendered as compact JSON.
    pub fn from_detail(detail: Value) -> Self {
        let message = match &detail {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Self { message, detail }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteFailure {}

/// Reply posted back by a worker, tagged with the id of the call it answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMessage {
    pub id: CallId,
    #[serde(flatten)]
    pub reply: Reply,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_reply_yields_result() {
        let reply: Reply = serde_json::from_str(r#"{"status":"success","result":42}"#).unwrap();
        assert_eq!(reply.into_result().unwrap(), json!(42));
    }

    #[test]
    fn error_reply_uses_string_result_as_message() {
        let raw = r#"{"status":"error","result":"bad query"}"#;
        let reply: Reply = serde_json::from_str(raw).unwrap();
        let failure = reply.into_result().unwrap_err();
        assert_eq!(failure.message, "bad query");
        assert_eq!(failure.to_string(), "bad query");
    }

    #[test]
    fn structured_error_is_rendered_as_json() {
        let reply = Reply {
            status: Status::Error,
            result: json!({"code": 1}),
        };
        let failure = reply.into_result().unwrap_err();
        assert_eq!(failure.message, r#"{"code":1}"#);
        assert_eq!(failure.detail, json!({"code": 1}));
    }

    #[test]
    fn missing_result_defaults_to_null() {
        let reply: Reply = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(reply.result, Value::Null);
    }

    #[test]
    fn worker_message_is_flat_on_the_wire() {
        let msg = WorkerMessage {
            id: CallId::from("c1"),
            reply: Reply::error("nope"),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"id": "c1", "status": "error", "result": "nope"})
        );
    }
}
