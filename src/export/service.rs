//! Export orchestration: enumerate, probe, fetch, write, summarize

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::dm_probe::DmProber;
use super::enumerator::ConversationEnumerator;
use super::files::AttachmentStore;
use super::history::{HistoryError, HistoryPaginator};
use super::session::ExportSession;
use super::summary::{ExportSummary, ListingFailure};
use super::types::{
    Conversation, ConversationOutcome, ConversationResult, ExportDocument, ExportFile,
    ExportMessage,
};
use super::writer::ExportWriter;
use crate::config::AttachmentMode;
use crate::slack::{SlackError, SlackFile, SlackMessage};

/// Per-run shared state handed to every conversation worker.
#[derive(Clone)]
struct Worker {
    session: Arc<ExportSession>,
    writer: Arc<ExportWriter>,
    attachments: Option<Arc<AttachmentStore>>,
}

pub struct ExportService {
    session: Arc<ExportSession>,
}

impl ExportService {
    pub fn new(session: ExportSession) -> Self {
        Self {
            session: Arc::new(session),
        }
    }

    pub fn session(&self) -> &ExportSession {
        &self.session
    }

    /// Run a full export and write `export_summary.json`.
    ///
    /// Per-conversation failures end up in the summary. An auth failure
    /// anywhere stops all workers and is returned without writing a summary.
    pub async fn run(&self) -> Result<ExportSummary, SlackError> {
        let session = &self.session;
        let mut writer = ExportWriter::new(session.config.output_dir.clone());
        writer.prepare()?;

        let mut summary = ExportSummary::new(Utc::now());

        tracing::info!("Fetching workspace users");
        let known_users = match session.users.load_all().await {
            Ok(users) => users,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!("Could not list users: {}", e);
                summary.listing_failures.push(ListingFailure::new("users", &e));
                Vec::new()
            }
        };

        let enumeration = ConversationEnumerator::new(session).list_all().await?;
        let mut conversations = enumeration.conversations;
        summary.listing_failures.extend(enumeration.failures);

        if session.config.probe_hidden_dms {
            let report = DmProber::new(session)
                .probe_hidden_dms(&known_users, &conversations)
                .await?;
            conversations.extend(report.discovered);
            summary.dm_probe = Some(report.stats);
        }

        tracing::info!("Exporting {} conversations", conversations.len());
        writer.plan(&conversations);

        let worker = Worker {
            session: session.clone(),
            writer: Arc::new(writer),
            attachments: match session.config.attachments {
                AttachmentMode::MetadataOnly => None,
                AttachmentMode::DownloadBinaries => Some(Arc::new(AttachmentStore::new(
                    session.client.clone(),
                    session.config.output_dir.clone(),
                ))),
            },
        };

        let semaphore = Arc::new(Semaphore::new(session.config.concurrency));
        let mut handles = Vec::new();

        for conversation in conversations {
            let sem = semaphore.clone();
            let worker = worker.clone();
            let name = conversation.name.clone();

            handles.push((
                conversation.clone(),
                tokio::spawn(async move {
                    let Ok(_permit) = sem.acquire().await else {
                        return Ok(skipped(conversation, "cancelled"));
                    };
                    if worker.session.is_cancelled() {
                        return Ok(skipped(conversation, "cancelled"));
                    }
                    let result = worker.export_conversation(conversation).await;
                    if let Err(e) = &result {
                        tracing::error!("Aborting export at {}: {}", name, e);
                        worker.session.cancel.cancel();
                    }
                    result
                }),
            ));
        }

        let total = handles.len();
        let mut fatal = None;
        for (done, (conversation, handle)) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                    ConversationResult {
                        conversation,
                        outcome: ConversationOutcome::Failed {
                            reason: format!("worker failed: {}", e),
                        },
                        files_downloaded: 0,
                    }
                }
            };

            tracing::info!(
                "[{}/{}] {} ({}): {}",
                done + 1,
                total,
                result.conversation.name,
                result.conversation.kind,
                describe(&result.outcome)
            );
            summary.record(&result);
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        summary.api_calls = session.client.call_count();
        summary.file_downloads = worker.attachments.as_ref().map(|store| store.stats());

        let path = worker.writer.write_summary(&summary)?;
        tracing::info!(
            "Export finished: {} conversations, {} messages, {} API calls. Summary at {}",
            summary.total_conversations,
            summary.total_messages,
            summary.api_calls,
            path.display()
        );

        Ok(summary)
    }
}

impl Worker {
    /// Fetch, normalize and write one conversation.
    ///
    /// Only fatal errors are returned; everything else becomes the outcome.
    async fn export_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<ConversationResult, SlackError> {
        tracing::debug!("Exporting {} ({})", conversation.name, conversation.id);

        let (raw, stopped) = match HistoryPaginator::new(&self.session)
            .fetch_all(&conversation)
            .await
        {
            Ok(messages) => (messages, None),
            Err(HistoryError::Partial { messages, cause }) => (messages, Some(cause)),
            Err(HistoryError::Failed(e)) if e.is_fatal() => return Err(e),
            Err(HistoryError::Failed(e)) => {
                return Ok(failed(conversation, e.to_string()));
            }
        };

        if raw.is_empty() {
            return Ok(match stopped {
                None => skipped(conversation, "no messages"),
                Some(SlackError::Cancelled) => skipped(conversation, "cancelled"),
                Some(cause) => failed(conversation, cause.to_string()),
            });
        }

        let mut messages = Vec::with_capacity(raw.len());
        let mut files_downloaded = 0;
        for msg in &raw {
            let author = self.author(msg).await?;
            let files = match &msg.files {
                Some(files) => {
                    let (files, stored) = self.attach(files, &conversation.name).await?;
                    files_downloaded += stored;
                    Some(files)
                }
                None => None,
            };
            messages.push(ExportMessage::from_slack(msg, author, files));
        }

        let document = ExportDocument::new(conversation.clone(), messages)
            .with_partial(stopped.is_some())
            .with_files_downloaded(self.attachments.as_ref().map(|_| files_downloaded));

        let path = match self.writer.write(&document) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("Could not write {}: {}", conversation.name, e);
                return Ok(failed(conversation, e.to_string()));
            }
        };

        let message_count = document.message_count;
        let outcome = match stopped {
            None => ConversationOutcome::Complete {
                message_count,
                path,
            },
            Some(cause) => {
                tracing::warn!(
                    "Saved {} messages of {} before stopping: {}",
                    message_count,
                    conversation.name,
                    cause
                );
                ConversationOutcome::Partial {
                    message_count,
                    path,
                    reason: cause.to_string(),
                }
            }
        };

        Ok(ConversationResult {
            conversation,
            outcome,
            files_downloaded,
        })
    }

    async fn author(&self, msg: &SlackMessage) -> Result<String, SlackError> {
        if let Some(user_id) = &msg.user {
            return self.session.users.display_name(user_id).await;
        }
        Ok(msg
            .username
            .clone()
            .or_else(|| msg.bot_id.clone())
            .unwrap_or_else(|| "unknown".to_string()))
    }

    async fn attach(
        &self,
        files: &[SlackFile],
        conversation_name: &str,
    ) -> Result<(Vec<ExportFile>, usize), SlackError> {
        let mut exported = Vec::with_capacity(files.len());
        let mut stored = 0;

        for file in files {
            let mut entry = ExportFile::from(file);
            if let Some(store) = &self.attachments {
                entry.local_path = store.store(file, conversation_name).await?;
                entry.downloaded = Some(entry.local_path.is_some());
                if entry.local_path.is_some() {
                    stored += 1;
                }
            }
            exported.push(entry);
        }

        Ok((exported, stored))
    }
}

fn skipped(conversation: Conversation, reason: &str) -> ConversationResult {
    ConversationResult {
        conversation,
        outcome: ConversationOutcome::Skipped {
            reason: reason.to_string(),
        },
        files_downloaded: 0,
    }
}

fn failed(conversation: Conversation, reason: String) -> ConversationResult {
    ConversationResult {
        conversation,
        outcome: ConversationOutcome::Failed { reason },
        files_downloaded: 0,
    }
}

fn describe(outcome: &ConversationOutcome) -> String {
    match outcome {
        ConversationOutcome::Complete { message_count, .. } => {
            format!("{} messages", message_count)
        }
        ConversationOutcome::Partial {
            message_count,
            reason,
            ..
        } => format!("{} messages (partial: {})", message_count, reason),
        ConversationOutcome::Failed { reason } => format!("failed: {}", reason),
        ConversationOutcome::Skipped { reason } => format!("skipped: {}", reason),
    }
}
