//! JSON persistence for conversation documents and the run summary

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::summary::ExportSummary;
use super::types::{Conversation, ConversationKind, ExportDocument};
use crate::slack::SlackError;

pub const SUMMARY_FILE: &str = "export_summary.json";

/// Reduce a conversation name to characters safe in a file name.
pub fn safe_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim_end().to_string()
}

fn base_stem(conversation: &Conversation) -> String {
    let name = safe_name(&conversation.name);
    if name.is_empty() {
        format!("{}_{}", conversation.kind.export_dir(), conversation.id)
    } else {
        name
    }
}

fn file_name(stem: &str, kind: ConversationKind) -> String {
    match kind {
        ConversationKind::DirectMessage => format!("{}_dm.json", stem),
        _ => format!("{}.json", stem),
    }
}

/// Maps conversations to files under the export root and writes them.
pub struct ExportWriter {
    root: PathBuf,
    paths: HashMap<String, PathBuf>,
}

impl ExportWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            paths: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the per-kind output directories.
    pub fn prepare(&self) -> Result<(), SlackError> {
        for kind in ConversationKind::ALL {
            std::fs::create_dir_all(self.root.join(kind.export_dir()))?;
        }
        Ok(())
    }

    /// Fix the output path of every conversation up front.
    ///
    /// Names that collide inside one directory (compared case-insensitively)
    /// all get their conversation id appended, so the result does not depend
    /// on which conversation finishes first.
    pub fn plan(&mut self, conversations: &[Conversation]) {
        let mut taken: HashMap<(&'static str, String), usize> = HashMap::new();
        for conversation in conversations {
            let key = (conversation.kind.export_dir(), base_stem(conversation).to_lowercase());
            *taken.entry(key).or_default() += 1;
        }

        for conversation in conversations {
            let dir = conversation.kind.export_dir();
            let base = base_stem(conversation);
            let stem = if taken[&(dir, base.to_lowercase())] > 1 {
                format!("{}_{}", base, conversation.id)
            } else {
                base
            };

            self.paths.insert(
                conversation.id.clone(),
                self.root.join(dir).join(file_name(&stem, conversation.kind)),
            );
        }
    }

    pub fn path_for(&self, conversation: &Conversation) -> PathBuf {
        self.paths.get(&conversation.id).cloned().unwrap_or_else(|| {
            self.root
                .join(conversation.kind.export_dir())
                .join(file_name(&base_stem(conversation), conversation.kind))
        })
    }

    /// Write one document, replacing whatever a previous run left there.
    pub fn write(&self, document: &ExportDocument) -> Result<PathBuf, SlackError> {
        let path = self.path_for(&document.conversation_info);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(document)?;
        std::fs::write(&path, json)?;

        tracing::debug!(
            "Wrote {} messages to {}",
            document.message_count,
            path.display()
        );
        Ok(path)
    }

    pub fn write_summary(&self, summary: &ExportSummary) -> Result<PathBuf, SlackError> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(SUMMARY_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        Ok(path)
    }
}
