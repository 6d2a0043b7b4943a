//! Rate-limited Slack API client

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::retry::{classify, FailureKind, RateGate, RetryPolicy};
use super::transport::{RawFailure, Transport};
use super::types::{
    next_cursor, HistoryPage, Page, SlackAuthInfo, SlackChannel, SlackError, SlackMessage,
    SlackUser,
};

const LIST_PAGE_SIZE: u32 = 200;
const DOWNLOAD_ATTEMPTS: u32 = 3;

pub struct SlackClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    gate: RateGate,
    team_id: Option<String>,
}

impl SlackClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            gate: RateGate::new(Duration::ZERO),
            team_id: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Minimum spacing between the start of two API calls.
    pub fn with_min_call_interval(mut self, interval: Duration) -> Self {
        self.gate = RateGate::new(interval);
        self
    }

    /// Set the team ID (required for Enterprise Grid workspaces)
    pub fn with_team_id(mut self, team_id: Option<String>) -> Self {
        self.team_id = team_id;
        self
    }

    /// Number of requests issued so far, retries included.
    pub fn call_count(&self) -> u64 {
        self.gate.calls()
    }

    /// Call a Web API method, retrying rate limits and transient failures.
    pub async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, SlackError> {
        let mut attempts = 0u32;
        let mut rate_limited = 0u32;

        loop {
            self.gate.acquire().await;
            attempts += 1;

            let failure = match self.transport.get(method, params).await {
                Ok(json) => return Ok(json),
                Err(failure) => failure,
            };

            match classify(&failure) {
                FailureKind::Auth => {
                    tracing::error!("{} rejected the credential: {}", method, failure);
                    return Err(SlackError::Auth(failure.to_string()));
                }
                FailureKind::Permanent => {
                    return Err(api_error(method, &failure));
                }
                FailureKind::RateLimited(retry_after) => {
                    rate_limited += 1;
                    // Rate-limit waits do not spend the transient budget
                    attempts -= 1;
                    let wait = self.policy.rate_limit_wait(retry_after);
                    tracing::warn!(
                        "Rate limited on {} (#{}), waiting {:?}",
                        method,
                        rate_limited,
                        wait
                    );
                    self.gate.hold_for(wait).await;
                }
                FailureKind::Transient => {
                    if attempts >= self.policy.max_attempts {
                        tracing::warn!(
                            "{} failed after {} attempts: {}",
                            method,
                            attempts,
                            failure
                        );
                        return Err(SlackError::Transient {
                            endpoint: method.to_string(),
                            attempts,
                            message: failure.to_string(),
                        });
                    }
                    let delay = self.policy.delay_for(attempts);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        method,
                        attempts,
                        self.policy.max_attempts,
                        failure,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Test the token and get auth info (team, user)
    pub async fn test_auth(&self) -> Result<SlackAuthInfo, SlackError> {
        let json = self.call("auth.test", &[]).await?;

        Ok(SlackAuthInfo {
            team_id: json["team_id"].as_str().unwrap_or_default().to_string(),
            team_name: json["team"].as_str().unwrap_or_default().to_string(),
            user_id: json["user_id"].as_str().unwrap_or_default().to_string(),
            user_name: json["user"].as_str().unwrap_or_default().to_string(),
        })
    }

    /// Fetch one page of conversations of a single Slack type (`im`, `mpim`, ...).
    pub async fn list_conversations_page(
        &self,
        types: &str,
        cursor: Option<&str>,
        exclude_archived: bool,
    ) -> Result<Page<SlackChannel>, SlackError> {
        let mut params = vec![
            ("types", types.to_string()),
            ("limit", LIST_PAGE_SIZE.to_string()),
            ("exclude_archived", exclude_archived.to_string()),
        ];

        // For Enterprise Grid, team_id is required
        if let Some(ref tid) = self.team_id {
            params.push(("team_id", tid.clone()));
        }

        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let json = self.call("conversations.list", &params).await?;

        let items = json["channels"]
            .as_array()
            .map(|channels| channels.iter().map(SlackChannel::from_json).collect())
            .unwrap_or_default();

        Ok(Page {
            items,
            next_cursor: next_cursor(&json),
        })
    }

    /// Fetch one page of a conversation's message history
    pub async fn conversation_history_page(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<HistoryPage, SlackError> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("limit", limit.to_string()),
        ];

        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let json = self.call("conversations.history", &params).await?;

        let messages = json["messages"]
            .as_array()
            .map(|msgs| msgs.iter().map(SlackMessage::from_json).collect())
            .unwrap_or_default();

        Ok(HistoryPage {
            messages,
            has_more: json["has_more"].as_bool().unwrap_or(false),
            next_cursor: next_cursor(&json),
        })
    }

    /// Open (or resolve) the DM channel with a user and return its id
    pub async fn open_dm(&self, user_id: &str) -> Result<String, SlackError> {
        let json = self
            .call("conversations.open", &[("users", user_id.to_string())])
            .await?;

        json["channel"]["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .map(String::from)
            .ok_or_else(|| SlackError::Api {
                endpoint: "conversations.open".into(),
                code: "missing_channel_id".into(),
            })
    }

    /// Fetch user info by ID
    pub async fn user_info(&self, user_id: &str) -> Result<SlackUser, SlackError> {
        let json = self
            .call("users.info", &[("user", user_id.to_string())])
            .await?;

        Ok(SlackUser::from_json(&json["user"]))
    }

    /// Fetch all users, bots and deleted accounts included
    pub async fn list_users(&self) -> Result<Vec<SlackUser>, SlackError> {
        let mut all_users = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![("limit", LIST_PAGE_SIZE.to_string())];

            // Include team_id for Enterprise Grid
            if let Some(ref tid) = self.team_id {
                params.push(("team_id", tid.clone()));
            }

            if let Some(ref c) = cursor {
                params.push(("cursor", c.clone()));
            }

            let json = self.call("users.list", &params).await?;

            if let Some(users) = json["members"].as_array() {
                all_users.extend(users.iter().map(SlackUser::from_json));
            }

            cursor = next_cursor(&json);

            if cursor.is_none() {
                break;
            }
        }

        Ok(all_users)
    }

    /// Download a private file. `Ok(None)` means the file is gone (404).
    pub async fn download_file(&self, url: &str) -> Result<Option<Vec<u8>>, SlackError> {
        let mut attempts = 0u32;

        loop {
            self.gate.acquire().await;
            attempts += 1;

            let failure = match self.transport.download(url).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(RawFailure::Http { status: 404, .. }) => return Ok(None),
                Err(failure) => failure,
            };

            match classify(&failure) {
                FailureKind::Auth => return Err(SlackError::Auth(failure.to_string())),
                FailureKind::Permanent => return Err(api_error("files.download", &failure)),
                FailureKind::RateLimited(retry_after) => {
                    attempts -= 1;
                    self.gate
                        .hold_for(self.policy.rate_limit_wait(retry_after))
                        .await;
                }
                FailureKind::Transient if attempts < DOWNLOAD_ATTEMPTS => {
                    let delay = self.policy.delay_for(attempts);
                    tracing::debug!("Download failed ({}), retrying in {:?}", failure, delay);
                    sleep(delay).await;
                }
                FailureKind::Transient => {
                    return Err(SlackError::Transient {
                        endpoint: "files.download".into(),
                        attempts,
                        message: failure.to_string(),
                    });
                }
            }
        }
    }
}

fn api_error(method: &str, failure: &RawFailure) -> SlackError {
    let code = match failure {
        RawFailure::Api { code, .. } => code.clone(),
        RawFailure::Http { status, .. } => format!("http_{}", status),
        RawFailure::Network { message } => message.clone(),
    };
    SlackError::Api {
        endpoint: method.to_string(),
        code,
    }
}
