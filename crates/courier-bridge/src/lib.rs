//! Protocol-sidecar adapter.
//!
//! Implements the `courier-core` transport port over a small HTTP/JSON API exposed
//! by a sidecar process that speaks the chat protocol and owns credential storage.

pub mod wire;

use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use courier_core::{
    config::Config,
    domain::{GroupInfo, Identity},
    errors::Error,
    transport::{Connection, ConnectionEvent, OpenedSession, Transport},
    Result,
};

use crate::wire::{
    EventsResponse, GroupsResponse, OpenSessionRequest, OpenSessionResponse, PairingCodeRequest,
    PairingCodeResponse, SendTextRequest,
};

const EVENT_BUFFER: usize = 32;

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&Config> for BridgeConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            base_url: cfg.bridge_url.trim_end_matches('/').to_string(),
            timeout: cfg.bridge_timeout,
            poll_interval: cfg.bridge_poll_interval,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BridgeTransport {
    cfg: BridgeConfig,
    http: reqwest::Client,
}

impl BridgeTransport {
    pub fn new(cfg: BridgeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent("courier/0.1")
            .build()
            .map_err(|e| Error::External(format!("bridge client build failed: {e}")))?;
        Ok(Self { cfg, http })
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn open_session(
        &self,
        identity: &Identity,
        credential_dir: &Path,
    ) -> Result<OpenedSession> {
        let resp = self
            .http
            .post(format!("{}/sessions", self.cfg.base_url))
            .json(&OpenSessionRequest {
                identity: identity.as_str(),
                credential_dir: &credential_dir.to_string_lossy(),
            })
            .send()
            .await
            .map_err(request_error)?;
        let opened: OpenSessionResponse = checked(resp, "open session")
            .await?
            .json()
            .await
            .map_err(request_error)?;

        let session_url = format!("{}/sessions/{}", self.cfg.base_url, opened.session_id);
        debug!(%identity, session = %opened.session_id, "bridge session opened");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(poll_events(
            self.http.clone(),
            session_url.clone(),
            self.cfg.poll_interval,
            tx,
            cancel.clone(),
        ));

        Ok(OpenedSession {
            connection: Arc::new(BridgeConnection {
                http: self.http.clone(),
                session_url,
                cancel,
            }),
            events: rx,
        })
    }
}

struct BridgeConnection {
    http: reqwest::Client,
    session_url: String,
    cancel: CancellationToken,
}

#[async_trait]
impl Connection for BridgeConnection {
    async fn request_pairing_code(&self, identity: &Identity) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/pairing-code", self.session_url))
            .json(&PairingCodeRequest {
                identity: identity.as_str(),
            })
            .send()
            .await
            .map_err(request_error)?;
        let body: PairingCodeResponse = checked(resp, "pairing code")
            .await?
            .json()
            .await
            .map_err(request_error)?;
        if body.code.trim().is_empty() {
            return Err(Error::Transport("bridge returned an empty pairing code".to_string()));
        }
        Ok(body.code)
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/messages", self.session_url))
            .json(&SendTextRequest { to, text: body })
            .send()
            .await
            .map_err(request_error)?;
        checked(resp, "send message").await?;
        Ok(())
    }

    async fn fetch_groups(&self) -> Result<Vec<GroupInfo>> {
        let resp = self
            .http
            .get(format!("{}/groups", self.session_url))
            .send()
            .await
            .map_err(request_error)?;
        let body: GroupsResponse = checked(resp, "fetch groups")
            .await?
            .json()
            .await
            .map_err(request_error)?;
        Ok(body.into_groups())
    }

    async fn save_credentials(&self) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/credentials/save", self.session_url))
            .send()
            .await
            .map_err(request_error)?;
        checked(resp, "save credentials").await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        let resp = self
            .http
            .delete(&self.session_url)
            .send()
            .await
            .map_err(request_error)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        checked(resp, "close session").await?;
        Ok(())
    }
}

/// Pull lifecycle events from the sidecar and forward them in order.
///
/// Stops after a close event, when the session is closed locally, or when the
/// supervisor drops the receiver.
async fn poll_events(
    http: reqwest::Client,
    session_url: String,
    idle: Duration,
    tx: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
) {
    let mut cursor = 0u64;
    loop {
        let resp = tokio::select! {
            _ = cancel.cancelled() => return,
            r = http
                .get(format!("{session_url}/events"))
                .query(&[("cursor", cursor)])
                .send() => r,
        };

        let batch = match resp {
            Ok(r) if r.status() == reqwest::StatusCode::NOT_FOUND => {
                let _ = tx
                    .send(ConnectionEvent::closed("bridge session disappeared", false))
                    .await;
                return;
            }
            Ok(r) => match checked(r, "poll events").await {
                Ok(r) => r.json::<EventsResponse>().await.map_err(request_error),
                Err(e) => Err(e),
            },
            Err(e) => Err(request_error(e)),
        };

        let batch = match batch {
            Ok(b) => b,
            Err(e) => {
                warn!(session = %session_url, error = %e, "event poll failed");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(idle) => continue,
                }
            }
        };

        let idle_batch = batch.events.is_empty();
        cursor = batch.cursor.max(cursor);
        for ev in batch.events.into_iter().filter_map(|e| e.into_event()) {
            let closed = matches!(ev, ConnectionEvent::Closed { .. });
            if tx.send(ev).await.is_err() {
                return;
            }
            if closed {
                return;
            }
        }

        if idle_batch {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(idle) => {}
            }
        }
    }
}

fn request_error(e: reqwest::Error) -> Error {
    Error::Transport(format!("bridge request error: {e}"))
}

async fn checked(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Transport(format!(
        "bridge {what} failed: {status} {}",
        body.chars().take(200).collect::<String>()
    )))
}

#[cfg(test)]
mod tests;
