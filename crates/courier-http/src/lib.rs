//! HTTP surface for courier: pairing, bulk sends, groups and task control.

pub mod error;
pub mod form;

use std::{future::Future, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use courier_core::{
    courier::ServiceStatus,
    domain::TaskId,
    tasks::{StartTask, TaskRecord},
    Courier,
};

use crate::{
    error::ApiError,
    form::{required, SendMessageForm},
};

#[derive(Clone)]
pub struct AppState {
    pub courier: Arc<Courier>,
}

pub fn router(courier: Arc<Courier>) -> Router {
    let limit = courier.config().upload_limit_bytes;
    Router::new()
        .route("/status", get(status))
        .route("/code", get(pairing_code))
        .route("/send-message", post(send_message))
        .route("/get-groups", get(groups))
        .route("/task/:id", get(task_status))
        .route("/task/:id/stop", post(stop_task))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(AppState { courier })
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    courier: Arc<Courier>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener address")?;
    info!(%addr, "http listening");
    axum::serve(listener, router(courier))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")
}

async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.courier.status())
}

#[derive(Debug, Deserialize)]
struct NumberQuery {
    number: Option<String>,
}

#[derive(Debug, Serialize)]
struct PairingCodeResponse {
    code: String,
    number: String,
}

async fn pairing_code(
    State(state): State<AppState>,
    Query(q): Query<NumberQuery>,
) -> Result<Json<PairingCodeResponse>, ApiError> {
    let raw = required(q.number.as_deref(), "number")?;
    let identity = state.courier.parse_identity(&raw)?;
    let code = state.courier.request_pairing(&identity).await?;
    Ok(Json(PairingCodeResponse {
        code,
        number: identity.to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageResponse {
    success: bool,
    task_id: TaskId,
    messages_count: usize,
    recipients_count: usize,
    input_method: &'static str,
}

async fn send_message(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let form = SendMessageForm::from_request(req).await?;

    let sender = state
        .courier
        .parse_identity(&required(form.number.as_deref(), "number")?)?;
    let recipients = form.recipients()?;
    let messages = form.messages()?;
    let messages_count = messages.len();

    let task_id = state.courier.start_task(StartTask {
        sender,
        recipients,
        messages,
        delay_secs: form.delay_secs(),
    })?;
    let recipients_count = state.courier.task_status(&task_id)?.total_recipients;

    Ok(Json(SendMessageResponse {
        success: true,
        task_id,
        messages_count,
        recipients_count,
        input_method: if form.is_direct() { "direct" } else { "file" },
    }))
}

#[derive(Debug, Serialize)]
struct GroupEntry {
    name: String,
    uid: String,
}

#[derive(Debug, Serialize)]
struct GroupsResponse {
    groups: Vec<GroupEntry>,
}

async fn groups(
    State(state): State<AppState>,
    Query(q): Query<NumberQuery>,
) -> Result<Json<GroupsResponse>, ApiError> {
    let identity = state
        .courier
        .parse_identity(&required(q.number.as_deref(), "number")?)?;
    let groups = state
        .courier
        .fetch_groups(&identity)
        .await?
        .into_iter()
        .map(|g| GroupEntry {
            uid: g.short_id().to_string(),
            name: g.name,
        })
        .collect();
    Ok(Json(GroupsResponse { groups }))
}

async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    Ok(Json(state.courier.task_status(&TaskId(id))?))
}

async fn stop_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    Ok(Json(state.courier.request_stop(&TaskId(id))?))
}
