//! Slack data types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlackError {
    /// Invalid, missing or revoked credential. Aborts the whole run.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Network-level failure that outlived the retry budget.
    #[error("Network error on {endpoint} after {attempts} attempts: {message}")]
    Transient {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    #[error("API error on {endpoint}: {code}")]
    Api { endpoint: String, code: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SlackError {
    /// Errors that must stop the entire run rather than a single conversation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SlackError::Auth(_) | SlackError::Config(_))
    }

    /// The Slack error code, for permanent API failures.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            SlackError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Auth test response info
#[derive(Debug, Clone)]
pub struct SlackAuthInfo {
    pub team_id: String,
    pub team_name: String,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlackChannel {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub is_im: bool,
    pub is_mpim: bool,
    pub is_archived: bool,
    /// For DMs (is_im=true), this is the user ID of the other person
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl SlackChannel {
    pub(crate) fn from_json(ch: &Value) -> Self {
        let is_private = ch["is_private"].as_bool().unwrap_or(false);
        let is_group = ch["is_group"].as_bool().unwrap_or(false);

        Self {
            id: ch["id"].as_str().unwrap_or_default().to_string(),
            name: ch["name"].as_str().unwrap_or_default().to_string(),
            // Private channels can have is_private=true OR is_group=true (legacy)
            is_private: is_private || is_group,
            is_im: ch["is_im"].as_bool().unwrap_or(false),
            is_mpim: ch["is_mpim"].as_bool().unwrap_or(false),
            is_archived: ch["is_archived"].as_bool().unwrap_or(false),
            user: ch["user"].as_str().map(String::from),
        }
    }
}

/// Slack user info
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlackUser {
    pub id: String,
    pub name: String,
    pub real_name: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
}

impl SlackUser {
    pub(crate) fn from_json(user: &Value) -> Self {
        Self {
            id: user["id"].as_str().unwrap_or_default().to_string(),
            name: user["name"].as_str().unwrap_or_default().to_string(),
            real_name: user["real_name"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(String::from),
            display_name: user["profile"]["display_name"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(String::from),
            deleted: user["deleted"].as_bool().unwrap_or(false),
            is_bot: user["is_bot"].as_bool().unwrap_or(false),
        }
    }

    /// Human-readable label: display name, then real name, then handle, then id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.real_name.as_deref())
            .filter(|s| !s.is_empty())
            .or(Some(self.name.as_str()).filter(|s| !s.is_empty()))
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlackFile {
    pub id: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub filetype: Option<String>,
    pub size: Option<u64>,
    pub mimetype: Option<String>,
    pub url_private: Option<String>,
}

impl SlackFile {
    fn from_json(f: &Value) -> Self {
        let text = |key: &str| f[key].as_str().map(String::from);
        Self {
            id: text("id"),
            name: text("name"),
            title: text("title"),
            filetype: text("filetype"),
            size: f["size"].as_u64(),
            mimetype: text("mimetype"),
            url_private: text("url_private"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlackReaction {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlackMessage {
    pub ts: String,
    pub user: Option<String>,
    /// Sender label for bot and integration posts without a user id
    pub username: Option<String>,
    pub bot_id: Option<String>,
    pub text: String,
    pub msg_type: Option<String>,
    pub subtype: Option<String>,
    pub thread_ts: Option<String>,
    pub reply_count: Option<u32>,
    pub files: Option<Vec<SlackFile>>,
    pub reactions: Option<Vec<SlackReaction>>,
}

impl SlackMessage {
    pub(crate) fn from_json(m: &Value) -> Self {
        Self {
            ts: m["ts"].as_str().unwrap_or_default().to_string(),
            user: m["user"].as_str().map(String::from),
            username: m["username"].as_str().map(String::from),
            bot_id: m["bot_id"].as_str().map(String::from),
            text: m["text"].as_str().unwrap_or_default().to_string(),
            msg_type: m["type"].as_str().map(String::from),
            subtype: m["subtype"].as_str().map(String::from),
            thread_ts: m["thread_ts"].as_str().map(String::from),
            reply_count: m["reply_count"].as_u64().map(|n| n as u32),
            files: m["files"]
                .as_array()
                .map(|files| files.iter().map(SlackFile::from_json).collect()),
            reactions: m["reactions"].as_array().map(|reactions| {
                reactions
                    .iter()
                    .map(|r| SlackReaction {
                        name: r["name"].as_str().unwrap_or_default().to_string(),
                        count: r["count"].as_u64().unwrap_or(0) as u32,
                    })
                    .collect()
            }),
        }
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub messages: Vec<SlackMessage>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

pub(crate) fn next_cursor(json: &Value) -> Option<String> {
    json["response_metadata"]["next_cursor"]
        .as_str()
        .filter(|c| !c.is_empty())
        .map(String::from)
}

/// Split a Slack `ts` ("1744616613.903849") into whole seconds and nanoseconds
/// without going through floating point.
pub fn ts_parts(ts: &str) -> Option<(i64, u32)> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));
    let secs: i64 = secs.parse().ok()?;
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let frac = &frac[..frac.len().min(9)];
    let nanos = if frac.is_empty() {
        0
    } else {
        frac.parse::<u32>().ok()? * 10u32.pow(9 - frac.len() as u32)
    };
    Some((secs, nanos))
}

/// Decode a Slack `ts` into a UTC instant.
pub fn ts_to_datetime(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, nanos) = ts_parts(ts)?;
    DateTime::from_timestamp(secs, nanos)
}
