//! Per-run state shared by every export component

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ExportConfig;
use crate::slack::{HttpTransport, SlackClient, SlackError, Transport, UserDirectory};

/// Cooperative cancellation, checked between pages and conversations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Client, user cache, cancellation and settings for one export run.
pub struct ExportSession {
    pub client: Arc<SlackClient>,
    pub users: UserDirectory,
    pub config: ExportConfig,
    pub cancel: CancelFlag,
}

impl ExportSession {
    /// Build a session talking to the real Slack API.
    pub fn connect(config: ExportConfig) -> Result<Self, SlackError> {
        config.validate()?;
        let transport = HttpTransport::new(config.token.clone(), config.request_timeout)?
            .with_base_url(config.api_base_url.clone());
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ExportConfig, transport: Arc<dyn Transport>) -> Self {
        let client = Arc::new(
            SlackClient::new(transport)
                .with_retry_policy(config.retry.clone())
                .with_min_call_interval(config.min_call_interval)
                .with_team_id(config.team_id.clone()),
        );

        Self {
            users: UserDirectory::new(client.clone()),
            client,
            config,
            cancel: CancelFlag::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());

        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_connect_rejects_invalid_config() {
        let result = ExportSession::connect(ExportConfig::new(""));
        assert!(matches!(result, Err(SlackError::Config(_))));
    }
}
