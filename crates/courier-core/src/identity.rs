//! Identity Registry: live sender identities and their connection handles.
//!
//! All operations are synchronous; nothing here awaits while holding the lock.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    domain::Identity, errors::Error, transport::Connection, utils::lock, Result,
};

struct IdentityRecord {
    connection: Arc<dyn Connection>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages_sent: u64,
}

/// Read-only view of an Identity Record (the connection handle stays in the registry).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages_sent: u64,
}

#[derive(Default)]
pub struct IdentityRegistry {
    records: Mutex<HashMap<Identity, IdentityRecord>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, identity: Identity, connection: Arc<dyn Connection>) -> Result<()> {
        let mut records = lock(&self.records);
        if records.contains_key(&identity) {
            return Err(Error::AlreadyActive(identity));
        }
        let now = Utc::now();
        records.insert(
            identity,
            IdentityRecord {
                connection,
                created_at: now,
                last_activity: now,
                messages_sent: 0,
            },
        );
        Ok(())
    }

    pub fn get(&self, identity: &Identity) -> Result<IdentitySummary> {
        let records = lock(&self.records);
        let rec = records
            .get(identity)
            .ok_or_else(|| Error::NotFound(format!("identity {identity}")))?;
        Ok(IdentitySummary {
            identity: identity.clone(),
            created_at: rec.created_at,
            last_activity: rec.last_activity,
            messages_sent: rec.messages_sent,
        })
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        lock(&self.records).contains_key(identity)
    }

    /// Connection handle for a single operation. Callers drop it when done.
    pub fn connection(&self, identity: &Identity) -> Option<Arc<dyn Connection>> {
        lock(&self.records)
            .get(identity)
            .map(|rec| Arc::clone(&rec.connection))
    }

    /// Record one delivered message.
    pub fn touch(&self, identity: &Identity) -> Result<()> {
        let mut records = lock(&self.records);
        let rec = records
            .get_mut(identity)
            .ok_or_else(|| Error::NotFound(format!("identity {identity}")))?;
        rec.last_activity = Utc::now();
        rec.messages_sent += 1;
        Ok(())
    }

    /// Swap in the handle of a re-established session, keeping the counters.
    pub fn rebind(&self, identity: &Identity, connection: Arc<dyn Connection>) -> Result<()> {
        let mut records = lock(&self.records);
        let rec = records
            .get_mut(identity)
            .ok_or_else(|| Error::NotFound(format!("identity {identity}")))?;
        rec.connection = connection;
        rec.last_activity = Utc::now();
        Ok(())
    }

    pub fn remove(&self, identity: &Identity) -> Option<Arc<dyn Connection>> {
        lock(&self.records)
            .remove(identity)
            .map(|rec| rec.connection)
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<IdentitySummary> {
        let records = lock(&self.records);
        let mut out: Vec<_> = records
            .iter()
            .map(|(id, rec)| IdentitySummary {
                identity: id.clone(),
                created_at: rec.created_at,
                last_activity: rec.last_activity,
                messages_sent: rec.messages_sent,
            })
            .collect();
        out.sort_by(|a, b| a.identity.cmp(&b.identity));
        out
    }
}
