use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use sheetwire_core::{CallContext, CallData, Engine, EngineError, Envelope, Reply};
use sheetwire_fabric::{
    error::Error,
    request::{call_http, call_worker},
    transport::{HttpTransport, Transport},
    Client, ClientConfig, RejectKind,
};

/// Reply the way a hosted node would, with a few knobs driven by the method name
async fn handle(Json(envelope): Json<Envelope>) -> Result<Json<Reply>, StatusCode> {
    let data = envelope.data();
    match data.method.as_str() {
        "echo" => Ok(Json(Reply::success(json!(data.params)))),
        "fail" => Ok(Json(Reply::error("bad query"))),
        "delay" => {
            let ms = data.param(0).and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(Json(Reply::success(json!(ms))))
        }
        "boom" => Err(StatusCode::INTERNAL_SERVER_ERROR),
        _ => Ok(Json(Reply::error(format!("Unknown method: {}", data.method)))),
    }
}

async fn garbage() -> &'static str {
    "definitely not json"
}

/// Helper to start a local endpoint on a free port
async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/api/sqlite", post(handle))
        .route("/garbage", post(garbage));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn endpoint(addr: SocketAddr) -> String {
    format!("http://{}/api/sqlite", addr)
}

#[tokio::test]
async fn http_call_round_trip() {
    let addr = serve().await;
    let client = Client::http(endpoint(addr), ClientConfig::default()).unwrap();

    let value = client
        .call("echo", vec![json!("a"), json!(1)], &CallContext::new("space1"))
        .await
        .unwrap();

    assert_eq!(value, json!(["a", 1]));
    assert_eq!(client.transport_name(), "http");
}

#[tokio::test]
async fn http_remote_error_carries_message() {
    let addr = serve().await;
    let err = call_http(&endpoint(addr), "fail", vec![], &CallContext::new("db"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), RejectKind::Remote);
    assert_eq!(err.to_string(), "bad query");
}

#[tokio::test]
async fn non_2xx_is_a_network_error() {
    let addr = serve().await;
    let err = call_http(&endpoint(addr), "boom", vec![], &CallContext::new("db"))
        .await
        .unwrap_err();

    match err {
        Error::Network(msg) => assert!(msg.contains("500")),
        e => panic!("Expected Network error, got {:?}", e),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = call_http(&endpoint(addr), "echo", vec![], &CallContext::new("db"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), RejectKind::Network);
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let addr = serve().await;
    let url = format!("http://{}/garbage", addr);
    let err = call_http(&url, "echo", vec![], &CallContext::new("db"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[tokio::test]
async fn hanging_request_times_out_and_leaves_no_record() {
    let addr = serve().await;
    let transport = HttpTransport::new(endpoint(addr)).unwrap();
    let envelope = Envelope::call("delay", vec![json!(2000)], "db");

    let outcome = tokio::try_join!(
        transport.send(&envelope),
        transport.on_callback(envelope.id(), Duration::from_millis(200))
    );

    assert!(outcome.unwrap_err().is_timeout());
    assert!(transport.store().is_empty());
}

#[tokio::test]
async fn late_response_is_discarded() {
    let addr = serve().await;
    let transport = Arc::new(HttpTransport::new(endpoint(addr)).unwrap());
    let envelope = Envelope::call("delay", vec![json!(300)], "db");

    let sender = {
        let transport = transport.clone();
        let envelope = envelope.clone();
        tokio::spawn(async move { transport.send(&envelope).await })
    };

    let err = transport
        .on_callback(envelope.id(), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    // The request itself still completes, but nobody keeps its response
    sender.await.unwrap().unwrap();
    assert!(transport.store().is_empty());
}

#[tokio::test]
async fn responses_are_matched_by_id_not_order() {
    let addr = serve().await;
    let client = Client::http(endpoint(addr), ClientConfig::default()).unwrap();
    let ctx = CallContext::new("db");

    let slow = {
        let client = client.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { client.call("delay", vec![json!(800)], &ctx).await })
    };

    let fast = client.call("delay", vec![json!(10)], &ctx).await.unwrap();
    assert_eq!(fast, json!(10));
    assert!(!slow.is_finished());

    assert_eq!(slow.await.unwrap().unwrap(), json!(800));
}

struct Counter {
    calls: u64,
}

impl Engine for Counter {
    fn call(&mut self, data: &CallData) -> Result<Value, EngineError> {
        self.calls += 1;
        match data.method.as_str() {
            "count" => Ok(json!(self.calls)),
            other => Err(EngineError::unknown_method(other)),
        }
    }
}

#[tokio::test]
async fn worker_keeps_engine_state_between_calls() {
    let client = Client::worker(Counter { calls: 0 }, ClientConfig::default()).unwrap();
    let ctx = CallContext::new("db");

    for expected in 1..=3 {
        let n: u64 = client.call_as("count", vec![], &ctx).await.unwrap();
        assert_eq!(n, expected);
    }
    client.close().await.unwrap();

    let err = client.call("count", vec![], &ctx).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn one_off_worker_call() {
    let value = call_worker(
        Counter { calls: 0 },
        "count",
        vec![],
        &CallContext::new("db"),
    )
    .await
    .unwrap();
    assert_eq!(value, json!(1));
}

#[tokio::test]
async fn connect_picks_transport_from_config() {
    let addr = serve().await;

    let remote = Client::connect(
        ClientConfig::default().with_endpoint(endpoint(addr)),
        || Counter { calls: 0 },
    )
    .unwrap();
    assert_eq!(remote.transport_name(), "http");

    let local = Client::connect(ClientConfig::default(), || Counter { calls: 0 }).unwrap();
    assert_eq!(local.transport_name(), "worker");
}
