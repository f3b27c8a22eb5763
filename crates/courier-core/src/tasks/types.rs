use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Identity, TargetKind, TaskId};

/// Who receives a task's messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    /// Every message goes to one individual or group.
    Target { target: String, kind: TargetKind },
    /// A flat contact list. Each contact receives the messages in turn.
    Contacts(Vec<String>),
}

impl Recipients {
    pub fn individual(target: impl Into<String>) -> Self {
        Recipients::Target {
            target: target.into(),
            kind: TargetKind::Individual,
        }
    }
}

/// A bulk-send request as accepted by [`TaskEngine::start_task`](super::TaskEngine::start_task).
#[derive(Clone, Debug)]
pub struct StartTask {
    pub sender: Identity,
    pub recipients: Recipients,
    /// In send order. Blank entries are allowed and skipped.
    pub messages: Vec<String>,
    pub delay_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageFailure {
    /// Position in the task's message list.
    pub index: usize,
    pub recipient: String,
    pub error: String,
}

/// State of one bulk-send task.
///
/// Invariants: `sent_messages <= total_messages`; `running == false` iff `ended_at` is set.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub sender: Identity,
    /// The single target, or a `N contacts` label for contact lists.
    pub target: String,
    pub target_kind: TargetKind,
    /// Transport addresses, in send order.
    #[serde(skip_serializing)]
    pub recipients: Vec<String>,
    pub total_recipients: usize,
    #[serde(skip_serializing)]
    pub messages: Vec<String>,
    /// Non-blank messages times recipients.
    pub total_messages: usize,
    pub sent_messages: usize,
    pub failures: Vec<MessageFailure>,
    pub delay_secs: u64,
    pub running: bool,
    pub stop_requested: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn failed_messages(&self) -> usize {
        self.failures.len()
    }

    pub fn duration_secs(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0)
    }
}
