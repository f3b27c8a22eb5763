//! Bulk-Send Task Engine.
//!
//! Each accepted task runs as its own spawned loop and sends its messages strictly
//! in order, one at a time. A stop request is honoured before the next send and
//! never interrupts one in flight. Per-message failures are recorded and skipped.
//!
//! Two tasks for the same sender interleave their sends unless
//! `Config::exclusive_sender` is set, in which case they run one after another.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::{
    config::Config,
    domain::{contact_address, format_target, Identity, TargetKind, TaskId},
    errors::Error,
    identity::IdentityRegistry,
    messages::is_blank,
    stats::ProcessStats,
    tasks::{
        registry::{TaskHandle, TaskRegistry},
        types::{MessageFailure, Recipients, StartTask, TaskRecord},
    },
    utils::{format_duration, percent, KeyedLocks},
    Result,
};

const PROGRESS_EVERY: usize = 10;

#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    cfg: Arc<Config>,
    identities: Arc<IdentityRegistry>,
    tasks: Arc<TaskRegistry>,
    stats: Arc<ProcessStats>,
    sender_locks: KeyedLocks<Identity>,
}

impl TaskEngine {
    pub fn new(
        cfg: Arc<Config>,
        identities: Arc<IdentityRegistry>,
        tasks: Arc<TaskRegistry>,
        stats: Arc<ProcessStats>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                cfg,
                identities,
                tasks,
                stats,
                sender_locks: KeyedLocks::default(),
            }),
        }
    }

    /// Validate and register a task, then run it in the background.
    ///
    /// Returns as soon as the task is registered; progress is read via [`Self::status`].
    pub fn start_task(&self, req: StartTask) -> Result<TaskId> {
        if !self.inner.identities.contains(&req.sender) {
            return Err(Error::NoActiveSession(req.sender));
        }
        let per_recipient = req.messages.iter().filter(|m| !is_blank(m)).count();
        if per_recipient == 0 {
            return Err(Error::EmptyMessageSet);
        }
        let (target, target_kind, recipients) = self.resolve(req.recipients)?;
        let total_messages = per_recipient * recipients.len();

        let delay = self.inner.cfg.clamp_delay(req.delay_secs);
        let id = TaskId::generate();
        let record = TaskRecord {
            id: id.clone(),
            sender: req.sender,
            target,
            target_kind,
            total_recipients: recipients.len(),
            recipients,
            messages: req.messages,
            total_messages,
            sent_messages: 0,
            failures: Vec::new(),
            delay_secs: delay.as_secs(),
            running: true,
            stop_requested: false,
            started_at: Utc::now(),
            ended_at: None,
            error: None,
        };
        info!(
            task_id = %id,
            sender = %record.sender,
            target = %record.target,
            kind = %record.target_kind,
            recipients = record.total_recipients,
            total = total_messages,
            delay_secs = record.delay_secs,
            "bulk send started"
        );

        let handle = self.inner.tasks.put(record);
        self.inner.stats.record_task_created();

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(handle, delay).await;
        });

        Ok(id)
    }

    /// Ask a task to stop before its next send. Idempotent.
    pub fn request_stop(&self, id: &TaskId) -> Result<TaskRecord> {
        let snapshot = self.inner.tasks.request_stop(id)?;
        info!(task_id = %id, "stop requested");
        Ok(snapshot)
    }

    pub fn status(&self, id: &TaskId) -> Result<TaskRecord> {
        self.inner.tasks.get(id)
    }

    /// Display target, kind and transport addresses for a request's recipients.
    fn resolve(&self, recipients: Recipients) -> Result<(String, TargetKind, Vec<String>)> {
        match recipients {
            Recipients::Target { target, kind } => {
                let target = target.trim().to_string();
                if target.is_empty() {
                    return Err(Error::InvalidRequest("target is required".to_string()));
                }
                let to = format_target(&target, kind);
                Ok((target, kind, vec![to]))
            }
            Recipients::Contacts(contacts) => {
                let code = self.inner.cfg.default_country_code.as_deref();
                let mut seen = HashSet::new();
                let addresses: Vec<String> = contacts
                    .iter()
                    .filter_map(|c| contact_address(c, code))
                    .filter(|a| seen.insert(a.clone()))
                    .collect();
                if addresses.is_empty() {
                    return Err(Error::InvalidRequest(
                        "contact list has no usable numbers".to_string(),
                    ));
                }
                let label = format!("{} contacts", addresses.len());
                Ok((label, TargetKind::Individual, addresses))
            }
        }
    }

    async fn run(&self, handle: TaskHandle, delay: Duration) {
        let started = Instant::now();
        let task = handle.snapshot();
        let id = &task.id;
        let sender = &task.sender;

        // A queued task that is stopped never takes the sender lock.
        let _exclusive = if self.inner.cfg.exclusive_sender {
            tokio::select! {
                guard = self.inner.sender_locks.lock(sender) => Some(guard),
                _ = handle.stopped() => None,
            }
        } else {
            None
        };

        let mut remaining = task.total_messages;
        let mut sent = 0usize;

        'recipients: for to in &task.recipients {
            for (index, message) in task.messages.iter().enumerate() {
                if handle.stop_requested() {
                    break 'recipients;
                }
                if is_blank(message) {
                    continue;
                }
                remaining -= 1;

                let Some(connection) = self.inner.identities.connection(sender) else {
                    let err = Error::NoActiveSession(sender.clone());
                    warn!(task_id = %id, error = %err, "sender session lost, aborting task");
                    handle.update(|r| r.error = Some(err.to_string()));
                    break 'recipients;
                };
                let result = connection.send_text(to, message.trim()).await;
                drop(connection);

                match result {
                    Ok(()) => {
                        sent += 1;
                        let _ = self.inner.identities.touch(sender);
                        self.inner.stats.record_sent();
                        handle.update(|r| r.sent_messages += 1);

                        let progress = percent(sent, task.total_messages);
                        info!(task_id = %id, %to, sent, total = task.total_messages, progress, "message sent");
                        if sent % PROGRESS_EVERY == 0 && remaining > 0 {
                            info!(task_id = %id, "progress {progress}% ({sent}/{})", task.total_messages);
                        }
                    }
                    Err(e) => {
                        warn!(task_id = %id, %to, index, error = %e, "failed to send message");
                        let failure = MessageFailure {
                            index,
                            recipient: to.clone(),
                            error: e.to_string(),
                        };
                        handle.update(|r| r.failures.push(failure));
                    }
                }

                if remaining > 0 {
                    tokio::select! {
                        _ = handle.stopped() => {}
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        handle.update(|r| {
            r.running = false;
            r.ended_at = Some(Utc::now());
        });

        let done = handle.snapshot();
        let elapsed = format_duration(started.elapsed());
        if done.stop_requested {
            warn!(
                task_id = %id,
                sent = done.sent_messages,
                total = done.total_messages,
                duration = %elapsed,
                "task stopped"
            );
        } else if let Some(err) = &done.error {
            warn!(
                task_id = %id,
                sent = done.sent_messages,
                total = done.total_messages,
                error = %err,
                "task aborted"
            );
        } else {
            info!(
                task_id = %id,
                sent = done.sent_messages,
                total = done.total_messages,
                failed = done.failed_messages(),
                success_rate = percent(done.sent_messages, done.total_messages),
                duration = %elapsed,
                "bulk send completed"
            );
        }
    }
}
