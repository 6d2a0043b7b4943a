//! Run summary aggregated from per-conversation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dm_probe::ProbeStats;
use super::files::DownloadStats;
use super::types::{ConversationKind, ConversationOutcome, ConversationResult};
use crate::slack::SlackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Complete,
    Partial,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindBreakdown {
    pub conversations: usize,
    pub messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub name: String,
    pub kind: ConversationKind,
    pub status: OutcomeStatus,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A listing that could not be completed (one conversation kind, or users).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingFailure {
    pub scope: String,
    pub reason: String,
}

impl ListingFailure {
    pub fn new(scope: impl Into<String>, error: &SlackError) -> Self {
        Self {
            scope: scope.into(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    pub export_timestamp: DateTime<Utc>,
    /// Conversations with a file written this run
    pub total_conversations: usize,
    pub total_messages: usize,
    pub api_calls: u64,
    pub breakdown: BTreeMap<ConversationKind, KindBreakdown>,
    pub conversations: Vec<ConversationRecord>,
    pub listing_failures: Vec<ListingFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_probe: Option<ProbeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_downloads: Option<DownloadStats>,
}

impl ExportSummary {
    pub fn new(export_timestamp: DateTime<Utc>) -> Self {
        Self {
            export_timestamp,
            total_conversations: 0,
            total_messages: 0,
            api_calls: 0,
            breakdown: BTreeMap::new(),
            conversations: Vec::new(),
            listing_failures: Vec::new(),
            dm_probe: None,
            file_downloads: None,
        }
    }

    /// Fold a set of results into a fresh summary.
    pub fn from_results<'a, I>(export_timestamp: DateTime<Utc>, results: I) -> Self
    where
        I: IntoIterator<Item = &'a ConversationResult>,
    {
        results
            .into_iter()
            .fold(Self::new(export_timestamp), |mut summary, result| {
                summary.record(result);
                summary
            })
    }

    pub fn record(&mut self, result: &ConversationResult) {
        let outcome = &result.outcome;
        let status = match outcome {
            ConversationOutcome::Complete { .. } => OutcomeStatus::Complete,
            ConversationOutcome::Partial { .. } => OutcomeStatus::Partial,
            ConversationOutcome::Failed { .. } => OutcomeStatus::Failed,
            ConversationOutcome::Skipped { .. } => OutcomeStatus::Skipped,
        };

        if outcome.path().is_some() {
            let kind = self.breakdown.entry(result.conversation.kind).or_default();
            kind.conversations += 1;
            kind.messages += outcome.message_count();
            self.total_conversations += 1;
            self.total_messages += outcome.message_count();
        }

        self.conversations.push(ConversationRecord {
            id: result.conversation.id.clone(),
            name: result.conversation.name.clone(),
            kind: result.conversation.kind,
            status,
            message_count: outcome.message_count(),
            path: outcome.path().map(|p| p.display().to_string()),
            reason: outcome.reason().map(String::from),
        });
    }

    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.conversations
            .iter()
            .filter(|record| record.status == status)
            .count()
    }

    /// Conversations the user may want to re-attempt by hand.
    pub fn needs_attention(&self) -> impl Iterator<Item = &ConversationRecord> {
        self.conversations
            .iter()
            .filter(|r| matches!(r.status, OutcomeStatus::Partial | OutcomeStatus::Failed))
    }
}
