//! Test doubles shared by the engine's unit tests.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    config::Config,
    domain::{GroupInfo, Identity},
    errors::Error,
    transport::{Connection, ConnectionEvent, OpenedSession, Transport},
    Result,
};

pub(crate) fn identity(raw: &str) -> Identity {
    Identity::parse(raw, 1).unwrap()
}

pub(crate) fn test_config() -> Config {
    Config {
        sessions_dir: PathBuf::from("/tmp/courier-test-sessions"),
        ..Config::default()
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeBehavior {
    pub fail_open: bool,
    pub fail_pairing: bool,
    pub failing_bodies: Vec<String>,
    pub groups: Vec<GroupInfo>,
    pub save_delay: Option<Duration>,
    pub pairing_delay: Option<Duration>,
}

#[derive(Default)]
pub(crate) struct FakeLog {
    sends: Mutex<Vec<(String, String)>>,
    saves: AtomicUsize,
    closes: AtomicUsize,
    pairing_requests: AtomicUsize,
}

impl FakeLog {
    pub fn sent_bodies(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn pairing_requests(&self) -> usize {
        self.pairing_requests.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeConnection {
    log: Arc<FakeLog>,
    behavior: FakeBehavior,
}

impl FakeConnection {
    /// A connection that is not wired to any transport (registry tests).
    pub fn detached() -> Arc<dyn Connection> {
        Arc::new(Self {
            log: Arc::new(FakeLog::default()),
            behavior: FakeBehavior::default(),
        })
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn request_pairing_code(&self, _identity: &Identity) -> Result<String> {
        self.log.pairing_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.behavior.pairing_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail_pairing {
            return Err(Error::Transport("pairing rejected".to_string()));
        }
        Ok("ABCD-1234".to_string())
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        if self.behavior.failing_bodies.iter().any(|b| b == body) {
            return Err(Error::Transport(format!("send of `{body}` failed")));
        }
        self.log
            .sends
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }

    async fn fetch_groups(&self) -> Result<Vec<GroupInfo>> {
        Ok(self.behavior.groups.clone())
    }

    async fn save_credentials(&self) -> Result<()> {
        if let Some(d) = self.behavior.save_delay {
            tokio::time::sleep(d).await;
        }
        self.log.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory transport. Keeps every session's event sender so tests can drive
/// lifecycle events with [`FakeTransport::emit`].
#[derive(Default)]
pub(crate) struct FakeTransport {
    pub log: Arc<FakeLog>,
    behavior: Mutex<FakeBehavior>,
    opens: Mutex<Vec<(Identity, PathBuf)>>,
    senders: Mutex<HashMap<Identity, mpsc::Sender<ConnectionEvent>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_behavior(behavior: FakeBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            ..Self::default()
        })
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.behavior.lock().unwrap().fail_open = fail;
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn opened_dirs(&self) -> Vec<PathBuf> {
        self.opens
            .lock()
            .unwrap()
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub async fn emit(&self, identity: &Identity, event: ConnectionEvent) {
        let tx = self
            .senders
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .expect("no session opened for identity");
        tx.send(event).await.expect("supervisor dropped events");
    }

    /// Drop the event sender, ending the session's event stream.
    pub fn hang_up(&self, identity: &Identity) {
        self.senders.lock().unwrap().remove(identity);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_session(
        &self,
        identity: &Identity,
        credential_dir: &Path,
    ) -> Result<OpenedSession> {
        self.opens
            .lock()
            .unwrap()
            .push((identity.clone(), credential_dir.to_path_buf()));

        let behavior = self.behavior.lock().unwrap().clone();
        if behavior.fail_open {
            return Err(Error::Transport("handshake failed".to_string()));
        }

        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().unwrap().insert(identity.clone(), tx);

        Ok(OpenedSession {
            connection: Arc::new(FakeConnection {
                log: Arc::clone(&self.log),
                behavior,
            }),
            events: rx,
        })
    }
}
