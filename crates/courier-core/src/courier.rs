use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::{
    config::Config,
    domain::{GroupInfo, Identity, TaskId},
    errors::Error,
    identity::{IdentityRegistry, IdentitySummary},
    pairing::PairingCoordinator,
    stats::{ProcessStats, StatsSnapshot},
    supervisor::{ConnectionState, ConnectionSupervisor},
    tasks::{StartTask, TaskEngine, TaskRecord, TaskRegistry},
    transport::Transport,
    Result,
};

/// Owns all shared state and wires the components together.
///
/// One instance per process; callers hold it behind an `Arc`.
pub struct Courier {
    cfg: Arc<Config>,
    identities: Arc<IdentityRegistry>,
    tasks: Arc<TaskRegistry>,
    stats: Arc<ProcessStats>,
    supervisor: ConnectionSupervisor,
    pairing: PairingCoordinator,
    engine: TaskEngine,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub active_clients: usize,
    pub active_tasks: usize,
    pub tracked_tasks: usize,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

impl Courier {
    pub fn new(cfg: Arc<Config>, transport: Arc<dyn Transport>) -> Self {
        let identities = Arc::new(IdentityRegistry::new());
        let tasks = Arc::new(TaskRegistry::new());
        let stats = Arc::new(ProcessStats::new());
        let supervisor = ConnectionSupervisor::new(
            cfg.clone(),
            transport,
            identities.clone(),
            stats.clone(),
        );
        let pairing =
            PairingCoordinator::new(identities.clone(), supervisor.clone(), stats.clone());
        let engine = TaskEngine::new(
            cfg.clone(),
            identities.clone(),
            tasks.clone(),
            stats.clone(),
        );

        Self {
            cfg,
            identities,
            tasks,
            stats,
            supervisor,
            pairing,
            engine,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Normalize a user-supplied phone number into an [`Identity`].
    pub fn parse_identity(&self, raw: &str) -> Result<Identity> {
        Identity::parse(raw, self.cfg.min_identity_digits)
    }

    pub async fn request_pairing(&self, identity: &Identity) -> Result<String> {
        self.pairing.request_pairing(identity).await
    }

    pub fn start_task(&self, req: StartTask) -> Result<TaskId> {
        self.engine.start_task(req)
    }

    pub fn request_stop(&self, id: &TaskId) -> Result<TaskRecord> {
        self.engine.request_stop(id)
    }

    pub fn task_status(&self, id: &TaskId) -> Result<TaskRecord> {
        self.engine.status(id)
    }

    pub async fn fetch_groups(&self, identity: &Identity) -> Result<Vec<GroupInfo>> {
        let connection = self
            .identities
            .connection(identity)
            .ok_or_else(|| Error::NoActiveSession(identity.clone()))?;
        let groups = connection.fetch_groups().await?;
        info!(%identity, count = groups.len(), "groups retrieved");
        Ok(groups)
    }

    pub fn connection_state(&self, identity: &Identity) -> ConnectionState {
        self.supervisor.state(identity)
    }

    pub fn identity(&self, identity: &Identity) -> Result<IdentitySummary> {
        self.identities.get(identity)
    }

    pub fn identities(&self) -> Vec<IdentitySummary> {
        self.identities.list()
    }

    pub fn active_tasks(&self) -> Vec<TaskRecord> {
        self.tasks.list_active()
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            active_clients: self.identities.len(),
            active_tasks: self.tasks.list_active().len(),
            tracked_tasks: self.tasks.len(),
            stats: self.stats.snapshot(),
        }
    }

    /// Close every session. Running tasks lose their sender and end on their next send.
    pub async fn shutdown(&self) -> usize {
        info!("shutting down all sessions");
        let closed = self.supervisor.shutdown().await;
        info!(closed, "shutdown complete");
        closed
    }
}
