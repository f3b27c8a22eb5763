//! Pairing Coordinator: issues device-linking codes, one request per identity at a time.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    domain::Identity,
    errors::Error,
    identity::IdentityRegistry,
    stats::ProcessStats,
    supervisor::ConnectionSupervisor,
    utils::KeyedLocks,
    Result,
};

pub struct PairingCoordinator {
    identities: Arc<IdentityRegistry>,
    supervisor: ConnectionSupervisor,
    stats: Arc<ProcessStats>,
    locks: KeyedLocks<Identity>,
}

impl PairingCoordinator {
    pub fn new(
        identities: Arc<IdentityRegistry>,
        supervisor: ConnectionSupervisor,
        stats: Arc<ProcessStats>,
    ) -> Self {
        Self {
            identities,
            supervisor,
            stats,
            locks: KeyedLocks::default(),
        }
    }

    /// Open a session for `identity` and return the pairing code the transport issues.
    ///
    /// Concurrent requests for the same identity queue behind each other; the second
    /// one then sees the first's session and fails with `SessionExists`. Requests
    /// for other identities are not blocked.
    pub async fn request_pairing(&self, identity: &Identity) -> Result<String> {
        let _guard = self.locks.lock(identity).await;

        if self.identities.contains(identity) || self.supervisor.state(identity).is_live() {
            warn!(%identity, "active session found, not issuing a new pairing code");
            return Err(Error::SessionExists(identity.clone()));
        }

        self.stats.record_session_created();
        info!(%identity, "generating pairing code");

        let pending = match self.supervisor.connect(identity).await {
            Ok(p) => p,
            Err(e) => {
                self.stats.record_session_failed();
                return Err(e);
            }
        };

        let code = match pending.connection.request_pairing_code(identity).await {
            Ok(code) => code,
            Err(e) => {
                warn!(%identity, error = %e, "pairing code request failed");
                self.stats.record_session_failed();
                self.supervisor.abandon(identity).await;
                return Err(e);
            }
        };

        if let Err(e) = self.supervisor.confirm(identity, &pending) {
            warn!(%identity, error = %e, "session ended while the pairing code was issued");
            self.stats.record_session_failed();
            self.supervisor.abandon(identity).await;
            return Err(e);
        }

        info!(%identity, "pairing code issued; enter it under Linked Devices");
        Ok(code)
    }
}
