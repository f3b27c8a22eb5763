//! Task Registry: task id -> record, plus the cooperative stop signal.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio_util::sync::CancellationToken;

use crate::{
    domain::TaskId, errors::Error, tasks::types::TaskRecord, utils::lock, Result,
};

struct TaskEntry {
    record: Mutex<TaskRecord>,
    stop: CancellationToken,
}

/// Exclusive handle used by a task's execution loop to publish progress.
#[derive(Clone)]
pub struct TaskHandle {
    entry: Arc<TaskEntry>,
}

impl TaskHandle {
    /// Apply one change; readers never observe a half-applied update.
    pub fn update(&self, f: impl FnOnce(&mut TaskRecord)) {
        f(&mut lock(&self.entry.record));
    }

    pub fn snapshot(&self) -> TaskRecord {
        lock(&self.entry.record).clone()
    }

    pub fn stop_requested(&self) -> bool {
        self.entry.stop.is_cancelled()
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        self.entry.stop.cancelled().await
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, Arc<TaskEntry>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, record: TaskRecord) -> TaskHandle {
        let id = record.id.clone();
        let entry = Arc::new(TaskEntry {
            record: Mutex::new(record),
            stop: CancellationToken::new(),
        });
        lock(&self.tasks).insert(id, Arc::clone(&entry));
        TaskHandle { entry }
    }

    pub fn get(&self, id: &TaskId) -> Result<TaskRecord> {
        let entry = self.entry(id)?;
        let snapshot = lock(&entry.record).clone();
        Ok(snapshot)
    }

    /// Flip the stop flag. Counters are untouched; repeated calls are no-ops.
    pub fn request_stop(&self, id: &TaskId) -> Result<TaskRecord> {
        let entry = self.entry(id)?;
        let snapshot = {
            let mut rec = lock(&entry.record);
            rec.stop_requested = true;
            rec.clone()
        };
        entry.stop.cancel();
        Ok(snapshot)
    }

    /// Unused by the engine: records are kept until restart for status queries.
    pub fn remove(&self, id: &TaskId) -> Option<TaskRecord> {
        lock(&self.tasks)
            .remove(id)
            .map(|entry| lock(&entry.record).clone())
    }

    pub fn list_active(&self) -> Vec<TaskRecord> {
        let entries: Vec<Arc<TaskEntry>> = lock(&self.tasks).values().cloned().collect();
        let mut out: Vec<TaskRecord> = entries
            .iter()
            .map(|e| lock(&e.record).clone())
            .filter(|r| r.running)
            .collect();
        out.sort_by_key(|r| r.started_at);
        out
    }

    pub fn len(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &TaskId) -> Result<Arc<TaskEntry>> {
        lock(&self.tasks)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }
}
