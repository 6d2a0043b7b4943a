//! Export configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::slack::{RetryPolicy, SlackError, SLACK_API_BASE};

pub const DEFAULT_OUTPUT_DIR: &str = "exports";
const DEFAULT_CONCURRENCY: usize = 2;
const API_CALL_DELAY_MS: u64 = 500;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const HISTORY_PAGE_SIZE: u32 = 200;

/// What to do with files attached to messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentMode {
    /// Keep name/type/url metadata in the JSON only.
    #[default]
    MetadataOnly,
    /// Also download each file under `files/`.
    DownloadBinaries,
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub token: String,
    pub output_dir: PathBuf,
    /// Conversations fetched in parallel. 1 runs strictly sequentially.
    pub concurrency: usize,
    pub skip_archived: bool,
    pub probe_hidden_dms: bool,
    pub attachments: AttachmentMode,
    /// Forwarded on listing calls for Enterprise Grid workspaces.
    pub team_id: Option<String>,
    pub min_call_interval: Duration,
    pub request_timeout: Duration,
    pub history_page_size: u32,
    pub retry: RetryPolicy,
    pub api_base_url: String,
}

impl ExportConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            concurrency: DEFAULT_CONCURRENCY,
            skip_archived: false,
            probe_hidden_dms: true,
            attachments: AttachmentMode::default(),
            team_id: None,
            min_call_interval: Duration::from_millis(API_CALL_DELAY_MS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            history_page_size: HISTORY_PAGE_SIZE,
            retry: RetryPolicy::default(),
            api_base_url: SLACK_API_BASE.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), SlackError> {
        if self.token.trim().is_empty() {
            return Err(SlackError::Config("Slack token is missing".into()));
        }
        if self.concurrency == 0 {
            return Err(SlackError::Config("concurrency must be at least 1".into()));
        }
        if self.history_page_size == 0 || self.history_page_size > 1000 {
            return Err(SlackError::Config(
                "history page size must be between 1 and 1000".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExportConfig::new("xoxp-1");

        assert_eq!(config.output_dir, PathBuf::from("exports"));
        assert_eq!(config.concurrency, 2);
        assert!(!config.skip_archived);
        assert!(config.probe_hidden_dms);
        assert_eq!(config.attachments, AttachmentMode::MetadataOnly);
        assert_eq!(config.min_call_interval, Duration::from_millis(500));
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_token() {
        let err = ExportConfig::new("   ").validate().unwrap_err();
        assert!(matches!(err, SlackError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = ExportConfig::new("xoxp-1");
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
