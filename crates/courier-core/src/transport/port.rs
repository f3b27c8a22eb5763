use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{GroupInfo, Identity},
    transport::types::OpenedSession,
    Result,
};

/// Transport port: opens protocol sessions for sender identities.
///
/// `credential_dir` is owned by the adapter; courier only picks its location.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open_session(&self, identity: &Identity, credential_dir: &Path)
        -> Result<OpenedSession>;
}

/// One live protocol session.
///
/// Implementations are expected to serialize sends on a single connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Ask the protocol for a human-readable device-linking code.
    async fn request_pairing_code(&self, identity: &Identity) -> Result<String>;

    /// Deliver one text message to a fully-qualified address.
    async fn send_text(&self, to: &str, body: &str) -> Result<()>;

    async fn fetch_groups(&self) -> Result<Vec<GroupInfo>>;

    /// Persist the current credential material to the session's credential dir.
    async fn save_credentials(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
