//! Connection Supervisor: owns each identity's transport session lifecycle.
//!
//! ```text
//! Idle -> Connecting -> Open -> Closed(Recoverable) -> Connecting ...
//!                           \-> Closed(Terminal)
//! ```
//!
//! Events for one identity are handled strictly in order by a single spawned
//! loop. A credential update is flushed before the next event is taken.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    domain::Identity,
    errors::Error,
    identity::IdentityRegistry,
    stats::ProcessStats,
    transport::{Connection, ConnectionEvent, Transport},
    utils::lock,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseKind {
    Recoverable,
    Terminal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "kind")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed(CloseKind),
}

impl ConnectionState {
    /// A session exists (or is being re-established) for the identity.
    pub fn is_live(self) -> bool {
        !matches!(
            self,
            ConnectionState::Idle | ConnectionState::Closed(CloseKind::Terminal)
        )
    }
}

struct SessionSlot {
    /// Distinguishes a re-paired session from a stale loop of an abandoned one.
    generation: u64,
    state: ConnectionState,
    connection: Option<Arc<dyn Connection>>,
    cancel: CancellationToken,
}

/// A session opened by [`ConnectionSupervisor::connect`] that is not yet paired.
pub struct PendingSession {
    pub connection: Arc<dyn Connection>,
    generation: u64,
}

#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    cfg: Arc<Config>,
    transport: Arc<dyn Transport>,
    identities: Arc<IdentityRegistry>,
    stats: Arc<ProcessStats>,
    sessions: Mutex<HashMap<Identity, SessionSlot>>,
    next_generation: AtomicU64,
}

impl ConnectionSupervisor {
    pub fn new(
        cfg: Arc<Config>,
        transport: Arc<dyn Transport>,
        identities: Arc<IdentityRegistry>,
        stats: Arc<ProcessStats>,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                cfg,
                transport,
                identities,
                stats,
                sessions: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn state(&self, identity: &Identity) -> ConnectionState {
        lock(&self.inner.sessions)
            .get(identity)
            .map(|s| s.state)
            .unwrap_or(ConnectionState::Idle)
    }

    /// Open a transport session for `identity` and start supervising it.
    ///
    /// Session-creation errors are returned to the caller and not retried.
    pub async fn connect(&self, identity: &Identity) -> Result<PendingSession> {
        let cancel = CancellationToken::new();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut sessions = lock(&self.inner.sessions);
            sessions.retain(|_, s| s.state != ConnectionState::Closed(CloseKind::Terminal));
            if sessions.get(identity).is_some_and(|s| s.state.is_live()) {
                return Err(Error::SessionExists(identity.clone()));
            }
            sessions.insert(
                identity.clone(),
                SessionSlot {
                    generation,
                    state: ConnectionState::Connecting,
                    connection: None,
                    cancel: cancel.clone(),
                },
            );
        }

        let credential_dir = self.inner.cfg.credential_dir(identity);
        info!(%identity, dir = %credential_dir.display(), "opening transport session");

        let opened = match self
            .inner
            .transport
            .open_session(identity, &credential_dir)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                error!(%identity, error = %e, "transport session creation failed");
                let mut sessions = lock(&self.inner.sessions);
                if sessions
                    .get(identity)
                    .is_some_and(|s| s.generation == generation)
                {
                    sessions.remove(identity);
                }
                return Err(e);
            }
        };

        let connection = Arc::clone(&opened.connection);
        let adopted = {
            let mut sessions = lock(&self.inner.sessions);
            match sessions.get_mut(identity) {
                Some(slot) if slot.generation == generation => {
                    slot.connection = Some(Arc::clone(&connection));
                    true
                }
                _ => false,
            }
        };
        if !adopted {
            let _ = connection.close().await;
            return Err(Error::Transport(format!(
                "session for {identity} was abandoned while connecting"
            )));
        }

        let supervisor = self.clone();
        let session = Session {
            identity: identity.clone(),
            generation,
            cancel,
        };
        tokio::spawn(async move {
            supervisor.supervise(session, opened.events).await;
        });

        Ok(PendingSession {
            connection,
            generation,
        })
    }

    /// Register `identity` for a session from [`Self::connect`].
    ///
    /// Fails if that session has since been logged out, abandoned or replaced.
    /// The check and the registration happen under the sessions lock, so a
    /// terminal close either sees the record and removes it or wins first.
    pub fn confirm(&self, identity: &Identity, pending: &PendingSession) -> Result<()> {
        let sessions = lock(&self.inner.sessions);
        let connection = match sessions.get(identity) {
            Some(slot) if slot.generation == pending.generation && slot.state.is_live() => slot
                .connection
                .clone()
                .unwrap_or_else(|| Arc::clone(&pending.connection)),
            _ => {
                return Err(Error::Transport(format!(
                    "session for {identity} closed before pairing completed"
                )))
            }
        };
        match self.inner.identities.register(identity.clone(), connection) {
            // The handshake may already have completed and confirmed the identity.
            Ok(()) | Err(Error::AlreadyActive(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stop supervising a session that never completed pairing, and close it.
    pub async fn abandon(&self, identity: &Identity) {
        let slot = lock(&self.inner.sessions).remove(identity);
        let Some(slot) = slot else {
            return;
        };
        slot.cancel.cancel();
        if let Some(conn) = slot.connection {
            if let Err(e) = conn.close().await {
                debug!(%identity, error = %e, "close after abandon failed");
            }
        }
        info!(%identity, "session abandoned");
    }

    /// Stop every supervision loop, close every connection and drop all identities.
    pub async fn shutdown(&self) -> usize {
        let slots: Vec<(Identity, SessionSlot)> =
            lock(&self.inner.sessions).drain().collect();

        let mut closed = 0usize;
        for (identity, slot) in slots {
            slot.cancel.cancel();
            self.inner.identities.remove(&identity);
            let Some(conn) = slot.connection else {
                continue;
            };
            match conn.close().await {
                Ok(()) => {
                    closed += 1;
                    info!(%identity, "session closed");
                }
                Err(e) => warn!(%identity, error = %e, "error closing session"),
            }
        }
        closed
    }

    async fn supervise(&self, session: Session, mut events: mpsc::Receiver<ConnectionEvent>) {
        let identity = &session.identity;
        let mut attempts = 0u32;
        loop {
            let event = tokio::select! {
                _ = session.cancel.cancelled() => return,
                ev = events.recv() => ev,
            };

            match event {
                Some(ConnectionEvent::CredentialsUpdated) => {
                    self.flush_credentials(&session).await;
                }
                Some(ConnectionEvent::Connecting) => {
                    info!(%identity, "connecting");
                    self.set_state(&session, ConnectionState::Connecting);
                }
                Some(ConnectionEvent::Open) => {
                    attempts = 0;
                    self.on_open(&session);
                }
                Some(ConnectionEvent::Closed {
                    reason,
                    terminal: true,
                }) => {
                    self.on_terminal(&session, &reason);
                    return;
                }
                Some(ConnectionEvent::Closed {
                    reason,
                    terminal: false,
                }) => {
                    warn!(%identity, %reason, "connection lost, scheduling reconnect");
                    match self.reconnect(&session, &mut attempts).await {
                        Some(next) => events = next,
                        None => return,
                    }
                }
                None => {
                    warn!(%identity, "event stream ended, scheduling reconnect");
                    match self.reconnect(&session, &mut attempts).await {
                        Some(next) => events = next,
                        None => return,
                    }
                }
            }
        }
    }

    async fn flush_credentials(&self, session: &Session) {
        let identity = &session.identity;
        let Some(conn) = self.current_connection(session) else {
            return;
        };
        match conn.save_credentials().await {
            Ok(()) => debug!(%identity, "credentials saved"),
            Err(e) => error!(%identity, error = %e, "failed to save credentials"),
        }
    }

    fn on_open(&self, session: &Session) {
        let identity = &session.identity;
        self.set_state(session, ConnectionState::Open);
        self.inner.stats.record_session_opened();

        if let Some(conn) = self.current_connection(session) {
            let confirmed = if self.inner.identities.contains(identity) {
                self.inner.identities.rebind(identity, conn)
            } else {
                self.inner.identities.register(identity.clone(), conn)
            };
            if let Err(e) = confirmed {
                debug!(%identity, error = %e, "identity already confirmed");
            }
        }
        info!(%identity, "connection established, ready for messaging");
    }

    fn on_terminal(&self, session: &Session, reason: &str) {
        let identity = &session.identity;
        error!(%identity, %reason, "session invalidated; a new pairing code is required");
        {
            let mut sessions = lock(&self.inner.sessions);
            match sessions.get_mut(identity) {
                Some(slot) if slot.generation == session.generation => {
                    slot.state = ConnectionState::Closed(CloseKind::Terminal);
                    slot.connection = None;
                }
                _ => return,
            }
        }
        self.inner.identities.remove(identity);
    }

    /// Re-open the session after the policy delay. `None` means stop supervising.
    async fn reconnect(
        &self,
        session: &Session,
        attempts: &mut u32,
    ) -> Option<mpsc::Receiver<ConnectionEvent>> {
        let identity = &session.identity;
        let policy = self.inner.cfg.reconnect;
        loop {
            if policy.exhausted(*attempts) {
                self.on_terminal(
                    session,
                    &format!("gave up after {attempts} reconnect attempts"),
                );
                return None;
            }

            self.set_state(session, ConnectionState::Closed(CloseKind::Recoverable));
            let delay = policy.delay_for(*attempts);
            *attempts += 1;

            tokio::select! {
                _ = session.cancel.cancelled() => return None,
                _ = sleep(delay) => {}
            }

            self.set_state(session, ConnectionState::Connecting);
            info!(%identity, attempt = *attempts, "reconnecting");
            let credential_dir = self.inner.cfg.credential_dir(identity);
            let opened = match self
                .inner
                .transport
                .open_session(identity, &credential_dir)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(%identity, attempt = *attempts, error = %e, "reconnect failed");
                    continue;
                }
            };

            let adopted = {
                let mut sessions = lock(&self.inner.sessions);
                match sessions.get_mut(identity) {
                    Some(slot)
                        if slot.generation == session.generation
                            && !session.cancel.is_cancelled() =>
                    {
                        slot.connection = Some(Arc::clone(&opened.connection));
                        true
                    }
                    _ => false,
                }
            };
            if !adopted {
                let _ = opened.connection.close().await;
                return None;
            }
            if self.inner.identities.contains(identity) {
                let _ = self
                    .inner
                    .identities
                    .rebind(identity, Arc::clone(&opened.connection));
            }
            return Some(opened.events);
        }
    }

    fn current_connection(&self, session: &Session) -> Option<Arc<dyn Connection>> {
        lock(&self.inner.sessions)
            .get(&session.identity)
            .filter(|s| s.generation == session.generation)
            .and_then(|s| s.connection.clone())
    }

    fn set_state(&self, session: &Session, state: ConnectionState) {
        if let Some(slot) = lock(&self.inner.sessions).get_mut(&session.identity) {
            if slot.generation == session.generation {
                slot.state = state;
            }
        }
    }
}

/// What a supervision loop knows about the session it drives.
struct Session {
    identity: Identity,
    generation: u64,
    cancel: CancellationToken,
}
