use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Kinds of message a channel can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    /// Invoke a named method on the engine
    CallFunction,
}

/// Identifier correlating a call with its reply
///
/// Rendered as a UUID v4 with the dashes stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CallId(String);

impl CallId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing id, rejecting empty strings
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(Error::InvalidCallId("call id must not be empty".to_string()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CallId {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(raw)
    }
}

impl From<CallId> for String {
    fn from(id: CallId) -> Self {
        id.0
    }
}

impl From<&str> for CallId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Method invocation carried inside an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
    pub method: String,
    pub params: Vec<Value>,
    pub db_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl CallData {
    /// Positional parameter, or `None` when the caller passed fewer
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }
}

/// One remote invocation as it travels over a transport
///
/// The id is assigned by the caller before transmission. Nothing here
/// interprets `method` or `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    msg_type: MsgType,
    data: CallData,
    id: CallId,
}

impl Envelope {
    /// Start a `CallFunction` envelope with a freshly generated id
    pub fn call(method: impl Into<String>, params: Vec<Value>, db_name: impl Into<String>) -> Self {
        Self::new(CallData {
            method: method.into(),
            params,
            db_name: db_name.into(),
            table_id: None,
            user_id: None,
        })
    }

    /// Wrap an existing call payload with a freshly generated id
    pub fn new(data: CallData) -> Self {
        Self {
            msg_type: MsgType::CallFunction,
            data,
            id: CallId::generate(),
        }
    }

    /// Build an envelope for `method` routed by `context`
    pub fn from_context(
        method: impl Into<String>,
        params: Vec<Value>,
        context: &CallContext,
    ) -> Self {
        let mut envelope = Self::call(method, params, context.db_name.clone());
        envelope.data.table_id = context.table_id.clone();
        envelope.data.user_id = context.user_id.clone();
        envelope
    }

    pub fn with_table_id(mut self, table_id: impl Into<String>) -> Self {
        self.data.table_id = Some(table_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.data.user_id = Some(user_id.into());
        self
    }

    pub fn with_id(mut self, id: CallId) -> Self {
        self.id = id;
        self
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn data(&self) -> &CallData {
        &self.data
    }

    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.data.method
    }

    pub fn db_name(&self) -> &str {
        &self.data.db_name
    }

    /// Split into the routing id and the call payload
    pub fn into_parts(self) -> (CallId, CallData) {
        (self.id, self.data)
    }
}

/// Routing and authorization context for a call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub db_name: String,
    pub table_id: Option<String>,
    pub user_id: Option<String>,
}

impl CallContext {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            ..Self::default()
        }
    }

    pub fn table(mut self, table_id: impl Into<String>) -> Self {
        self.table_id = Some(table_id.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_short_and_distinct() {
        let a = CallId::generate();
        let b = CallId::generate();
        assert_eq!(a.as_str().len(), 32);
        assert!(!a.as_str().contains('-'));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_call_id_is_rejected() {
        assert!(CallId::parse("  ").is_err());
        assert_eq!(CallId::parse("x").unwrap().as_str(), "x");
    }

    #[test]
    fn envelope_matches_wire_layout() {
        let envelope = Envelope::call("sql", vec![json!("select 1"), json!(2)], "space1")
            .with_user_id("u1")
            .with_id(CallId::from("abc"));

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "CallFunction",
                "data": {
                    "method": "sql",
                    "params": ["select 1", 2],
                    "dbName": "space1",
                    "userId": "u1"
                },
                "id": "abc"
            })
        );
    }

    #[test]
    fn envelope_preserves_every_field_across_encoding() {
        let envelope = Envelope::call("insertRow", vec![json!({"a": [1, null]})], "db")
            .with_table_id("t1")
            .with_user_id("u1");

        let text = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();

        assert_eq!(back.method(), "insertRow");
        assert_eq!(back.data().params, vec![json!({"a": [1, null]})]);
        assert_eq!(back.db_name(), "db");
        assert_eq!(back.data().table_id.as_deref(), Some("t1"));
        assert_eq!(back.data().user_id.as_deref(), Some("u1"));
        assert_eq!(back.id(), envelope.id());
    }

    #[test]
    fn empty_id_fails_to_decode() {
        let raw = json!({
            "type": "CallFunction",
            "data": {"method": "m", "params": [], "dbName": "d"},
            "id": ""
        });
        let err = serde_json::from_value::<Envelope>(raw).unwrap_err();
        assert!(err.to_string().contains("Invalid call id"));
    }

    #[test]
    fn unknown_message_type_fails_to_decode() {
        let raw = r#"{"type":"Broadcast","data":{"method":"m","params":[],"dbName":"d"},"id":"1"}"#;
        assert!(serde_json::from_str::<Envelope>(raw).is_err());
    }

    #[test]
    fn context_fills_optional_routing_fields() {
        let ctx = CallContext::new("space1").table("t9").user("u2");
        let envelope = Envelope::from_context("queryTable", vec![], &ctx);
        assert_eq!(envelope.data().table_id.as_deref(), Some("t9"));
        assert_eq!(envelope.data().user_id.as_deref(), Some("u2"));
        assert_eq!(envelope.msg_type(), MsgType::CallFunction);
    }
}
