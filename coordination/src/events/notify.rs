//! Status-change notifiers.
//!
//! The engine awaits every notifier after a status change has been
//! committed. Failures are reported back to the engine, which logs and
//! drops them; a notifier can never undo a transition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::types::StatusChange;

/// Default timeout for webhook delivery.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for notification delivery
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected notification with status {status}")]
    Rejected { status: u16 },

    #[error("notification failed: {0}")]
    Failed(String),
}

/// Shared reference to a notifier
pub type SharedNotifier = Arc<dyn StatusNotifier>;

/// Receiver of proposal status changes.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError>;
}

/// Records each delivered status change at debug level.
///
/// The engine already logs the transition itself at info.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl StatusNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
        debug!(
            proposal_id = %change.proposal_id,
            project_id = %change.project_id,
            from = %change.from,
            to = %change.to,
            "Status change notified"
        );
        Ok(())
    }
}

/// POSTs the status change as JSON to a fixed URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_timeout(url, WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            url: url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StatusNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(change).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
