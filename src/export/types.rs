//! Export data model

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::slack::{ts_to_datetime, SlackFile, SlackMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    PublicChannel,
    PrivateChannel,
    GroupDm,
    DirectMessage,
}

impl ConversationKind {
    pub const ALL: [ConversationKind; 4] = [
        ConversationKind::PublicChannel,
        ConversationKind::PrivateChannel,
        ConversationKind::GroupDm,
        ConversationKind::DirectMessage,
    ];

    /// Value of the `types` parameter on `conversations.list`
    pub fn api_type(self) -> &'static str {
        match self {
            ConversationKind::PublicChannel => "public_channel",
            ConversationKind::PrivateChannel => "private_channel",
            ConversationKind::GroupDm => "mpim",
            ConversationKind::DirectMessage => "im",
        }
    }

    /// Output subdirectory
    pub fn export_dir(self) -> &'static str {
        match self {
            ConversationKind::PublicChannel | ConversationKind::PrivateChannel => "channels",
            ConversationKind::GroupDm => "groups",
            ConversationKind::DirectMessage => "ims",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConversationKind::PublicChannel => "public_channel",
            ConversationKind::PrivateChannel => "private_channel",
            ConversationKind::GroupDm => "group_dm",
            ConversationKind::DirectMessage => "direct_message",
        }
    }
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub is_archived: bool,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_user_name: Option<String>,
}

impl Conversation {
    pub fn direct_message(id: String, user_id: String, user_name: String) -> Self {
        Self {
            id,
            name: user_name.clone(),
            kind: ConversationKind::DirectMessage,
            is_archived: false,
            is_private: true,
            counterpart_user_id: Some(user_id),
            counterpart_user_name: Some(user_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<bool>,
}

impl From<&SlackFile> for ExportFile {
    fn from(file: &SlackFile) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            title: file.title.clone(),
            filetype: file.filetype.clone(),
            size: file.size,
            mimetype: file.mimetype.clone(),
            url: file.url_private.clone(),
            local_path: None,
            downloaded: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportMessage {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Local>>,
    /// Author display name
    pub user: String,
    pub user_id: Option<String>,
    pub text: String,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_thread_parent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ExportFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<Reaction>>,
}

impl ExportMessage {
    /// Normalize a raw message. `files` replaces the raw attachment list so
    /// callers can fill in download results.
    pub fn from_slack(msg: &SlackMessage, author: String, files: Option<Vec<ExportFile>>) -> Self {
        let thread = msg.thread_ts.as_ref();

        Self {
            timestamp: msg.ts.clone(),
            datetime: ts_to_datetime(&msg.ts).map(|dt| dt.with_timezone(&Local)),
            user: author,
            user_id: msg.user.clone(),
            text: msg.text.clone(),
            message_type: msg.msg_type.clone(),
            subtype: msg.subtype.clone(),
            thread_ts: msg.thread_ts.clone(),
            reply_count: thread.map(|_| msg.reply_count.unwrap_or(0)),
            is_thread_parent: thread.map(|ts| *ts == msg.ts),
            files,
            reactions: msg.reactions.as_ref().map(|reactions| {
                reactions
                    .iter()
                    .map(|r| Reaction {
                        emoji: r.name.clone(),
                        count: r.count,
                    })
                    .collect()
            }),
        }
    }
}

/// One conversation's export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub conversation_info: Conversation,
    pub messages: Vec<ExportMessage>,
    pub export_timestamp: DateTime<Utc>,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_downloaded_count: Option<usize>,
    /// Set when pagination stopped before the end of history.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl ExportDocument {
    pub fn new(conversation: Conversation, messages: Vec<ExportMessage>) -> Self {
        Self {
            conversation_info: conversation,
            message_count: messages.len(),
            messages,
            export_timestamp: Utc::now(),
            files_downloaded_count: None,
            partial: false,
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn with_files_downloaded(mut self, count: Option<usize>) -> Self {
        self.files_downloaded_count = count;
        self
    }
}

/// How one conversation's export ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationOutcome {
    Complete {
        message_count: usize,
        path: PathBuf,
    },
    /// Some pages were written, the rest could not be fetched.
    Partial {
        message_count: usize,
        path: PathBuf,
        reason: String,
    },
    Failed {
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

impl ConversationOutcome {
    pub fn message_count(&self) -> usize {
        match self {
            ConversationOutcome::Complete { message_count, .. }
            | ConversationOutcome::Partial { message_count, .. } => *message_count,
            _ => 0,
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConversationOutcome::Complete { path, .. }
            | ConversationOutcome::Partial { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ConversationOutcome::Partial { reason, .. }
            | ConversationOutcome::Failed { reason }
            | ConversationOutcome::Skipped { reason } => Some(reason),
            ConversationOutcome::Complete { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationResult {
    pub conversation: Conversation,
    pub outcome: ConversationOutcome,
    pub files_downloaded: usize,
}
