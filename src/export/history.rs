//! Cursor-driven history pagination

use super::session::ExportSession;
use super::types::Conversation;
use crate::slack::{SlackError, SlackMessage};

/// Why a conversation's history could not be fetched to the end.
#[derive(Debug)]
pub enum HistoryError {
    /// Pagination stopped early; the pages already fetched are kept.
    Partial {
        messages: Vec<SlackMessage>,
        cause: SlackError,
    },
    /// Nothing usable: auth or a permanent API error.
    Failed(SlackError),
}

impl HistoryError {
    pub fn cause(&self) -> &SlackError {
        match self {
            HistoryError::Partial { cause, .. } => cause,
            HistoryError::Failed(cause) => cause,
        }
    }
}

pub struct HistoryPaginator<'a> {
    session: &'a ExportSession,
}

impl<'a> HistoryPaginator<'a> {
    pub fn new(session: &'a ExportSession) -> Self {
        Self { session }
    }

    /// Fetch every page of a conversation's history.
    ///
    /// Messages are kept in the order the pages were returned; batches are
    /// concatenated and never re-sorted.
    pub async fn fetch_all(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<SlackMessage>, HistoryError> {
        let mut messages: Vec<SlackMessage> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_num = 0u32;

        loop {
            if self.session.is_cancelled() {
                return Err(HistoryError::Partial {
                    messages,
                    cause: SlackError::Cancelled,
                });
            }

            page_num += 1;
            let page = match self
                .session
                .client
                .conversation_history_page(
                    &conversation.id,
                    cursor.as_deref(),
                    self.session.config.history_page_size,
                )
                .await
            {
                Ok(page) => page,
                Err(cause @ SlackError::Transient { .. }) => {
                    tracing::warn!(
                        "History for {} stopped at page {} with {} messages: {}",
                        conversation.name,
                        page_num,
                        messages.len(),
                        cause
                    );
                    return Err(HistoryError::Partial { messages, cause });
                }
                Err(e) => return Err(HistoryError::Failed(e)),
            };

            tracing::debug!(
                "Page {} of {}: {} messages",
                page_num,
                conversation.name,
                page.messages.len()
            );
            messages.extend(page.messages);

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(messages)
    }
}
