use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::timeout;

use super::*;

#[derive(Default)]
struct Sidecar {
    events: Vec<Value>,
    opened: Vec<(String, String)>,
    sent: Vec<(String, String)>,
    saves: usize,
    deleted: Vec<String>,
}

type Shared = Arc<Mutex<Sidecar>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenBody {
    identity: String,
    credential_dir: String,
}

#[derive(Deserialize)]
struct CursorQuery {
    cursor: usize,
}

#[derive(Deserialize)]
struct MessageBody {
    to: String,
    text: String,
}

async fn open(State(s): State<Shared>, Json(body): Json<OpenBody>) -> Json<Value> {
    s.lock().unwrap().opened.push((body.identity, body.credential_dir));
    Json(json!({"sessionId": "s1"}))
}

async fn events(
    State(s): State<Shared>,
    UrlPath(sid): UrlPath<String>,
    Query(q): Query<CursorQuery>,
) -> std::result::Result<Json<Value>, StatusCode> {
    if sid != "s1" {
        return Err(StatusCode::NOT_FOUND);
    }
    let all = s.lock().unwrap().events.clone();
    let batch: Vec<Value> = all.iter().skip(q.cursor).cloned().collect();
    Ok(Json(json!({"cursor": all.len(), "events": batch})))
}

async fn pairing(UrlPath(_sid): UrlPath<String>) -> Json<Value> {
    Json(json!({"code": "WXYZ-9876"}))
}

async fn message(
    State(s): State<Shared>,
    UrlPath(_sid): UrlPath<String>,
    Json(body): Json<MessageBody>,
) -> StatusCode {
    if body.text == "reject" {
        return StatusCode::BAD_GATEWAY;
    }
    s.lock().unwrap().sent.push((body.to, body.text));
    StatusCode::NO_CONTENT
}

async fn groups(UrlPath(_sid): UrlPath<String>) -> Json<Value> {
    Json(json!({"groups": [{"subject": "Team", "id": "777@g.us"}]}))
}

async fn save(State(s): State<Shared>, UrlPath(_sid): UrlPath<String>) -> StatusCode {
    s.lock().unwrap().saves += 1;
    StatusCode::NO_CONTENT
}

async fn remove(State(s): State<Shared>, UrlPath(sid): UrlPath<String>) -> StatusCode {
    s.lock().unwrap().deleted.push(sid);
    StatusCode::NO_CONTENT
}

async fn spawn_sidecar(events: Vec<Value>) -> (BridgeTransport, Shared) {
    let state: Shared = Arc::new(Mutex::new(Sidecar {
        events,
        ..Default::default()
    }));
    let app = Router::new()
        .route("/sessions", post(open))
        .route("/sessions/:sid", delete(remove))
        .route("/sessions/:sid/events", get(self::events))
        .route("/sessions/:sid/pairing-code", post(pairing))
        .route("/sessions/:sid/messages", post(message))
        .route("/sessions/:sid/groups", get(groups))
        .route("/sessions/:sid/credentials/save", post(save))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let transport = BridgeTransport::new(BridgeConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(20),
    })
    .unwrap();
    (transport, state)
}

fn identity() -> Identity {
    Identity::parse("15551234567", 10).unwrap()
}

#[tokio::test]
async fn open_session_forwards_events_until_close() {
    let (transport, state) = spawn_sidecar(vec![
        json!({"type": "connecting"}),
        json!({"type": "creds"}),
        json!({"type": "open"}),
        json!({"type": "close", "statusCode": 401}),
    ])
    .await;

    let mut opened = transport
        .open_session(&identity(), Path::new("/data/sessions/15551234567"))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(Some(ev)) = timeout(Duration::from_secs(2), opened.events.recv()).await {
        seen.push(ev);
    }
    assert_eq!(
        seen,
        vec![
            ConnectionEvent::Connecting,
            ConnectionEvent::CredentialsUpdated,
            ConnectionEvent::Open,
            ConnectionEvent::closed("closed with status 401", true),
        ]
    );

    let s = state.lock().unwrap();
    assert_eq!(
        s.opened,
        vec![(
            "15551234567".to_string(),
            "/data/sessions/15551234567".to_string()
        )]
    );
}

#[tokio::test]
async fn connection_calls_map_to_session_routes() {
    let (transport, state) = spawn_sidecar(vec![json!({"type": "open"})]).await;
    let opened = transport
        .open_session(&identity(), Path::new("/tmp/creds"))
        .await
        .unwrap();
    let conn = opened.connection;

    assert_eq!(conn.request_pairing_code(&identity()).await.unwrap(), "WXYZ-9876");
    conn.send_text("999@s.whatsapp.net", "hi").await.unwrap();
    conn.save_credentials().await.unwrap();

    let groups = conn.fetch_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Team");
    assert_eq!(groups[0].id, "777@g.us");

    conn.close().await.unwrap();

    let s = state.lock().unwrap();
    assert_eq!(s.sent, vec![("999@s.whatsapp.net".to_string(), "hi".to_string())]);
    assert_eq!(s.saves, 1);
    assert_eq!(s.deleted, vec!["s1".to_string()]);
}

#[tokio::test]
async fn rejected_send_is_a_transport_error() {
    let (transport, _state) = spawn_sidecar(Vec::new()).await;
    let opened = transport
        .open_session(&identity(), Path::new("/tmp/creds"))
        .await
        .unwrap();

    let err = opened
        .connection
        .send_text("1@s.whatsapp.net", "reject")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(ref m) if m.contains("502")), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unreachable_sidecar_fails_open() {
    let transport = BridgeTransport::new(BridgeConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(20),
    })
    .unwrap();
    let err = transport
        .open_session(&identity(), Path::new("/tmp/creds"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Transport(_)));
}
