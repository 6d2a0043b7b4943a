//! Conversation enumeration across all four conversation kinds

use std::collections::HashSet;

use super::session::ExportSession;
use super::summary::ListingFailure;
use super::types::{Conversation, ConversationKind};
use crate::slack::{SlackChannel, SlackError};

#[derive(Debug, Default)]
pub struct Enumeration {
    pub conversations: Vec<Conversation>,
    /// Kinds whose listing could not be completed
    pub failures: Vec<ListingFailure>,
}

pub struct ConversationEnumerator<'a> {
    session: &'a ExportSession,
}

impl<'a> ConversationEnumerator<'a> {
    pub fn new(session: &'a ExportSession) -> Self {
        Self { session }
    }

    /// List every accessible conversation, one kind at a time.
    ///
    /// A kind whose listing breaks off is recorded as a failure, and the
    /// conversations listed before the break are still returned. Only an
    /// auth failure aborts.
    pub async fn list_all(&self) -> Result<Enumeration, SlackError> {
        let mut enumeration = Enumeration::default();
        let mut seen = HashSet::new();

        for kind in ConversationKind::ALL {
            tracing::info!("Finding all {} conversations", kind);

            let (channels, failure) = self.list_kind(kind).await;
            match failure {
                Some(e) if e.is_fatal() => return Err(e),
                Some(e) => {
                    tracing::warn!(
                        "Error fetching {} conversations, keeping {} already listed: {}",
                        kind,
                        channels.len(),
                        e
                    );
                    enumeration.failures.push(ListingFailure::new(kind.as_str(), &e));
                }
                None => {}
            }

            let mut found = 0;
            for channel in channels {
                if self.session.config.skip_archived && channel.is_archived {
                    continue;
                }
                if !seen.insert(channel.id.clone()) {
                    continue;
                }
                enumeration
                    .conversations
                    .push(self.to_conversation(kind, channel).await?);
                found += 1;
            }

            tracing::info!("Found {} {} conversations", found, kind);
        }

        Ok(enumeration)
    }

    /// Page through one kind. Pages fetched before a failure are kept and
    /// returned alongside it.
    async fn list_kind(&self, kind: ConversationKind) -> (Vec<SlackChannel>, Option<SlackError>) {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = match self
                .session
                .client
                .list_conversations_page(
                    kind.api_type(),
                    cursor.as_deref(),
                    self.session.config.skip_archived,
                )
                .await
            {
                Ok(page) => page,
                Err(e) => return (channels, Some(e)),
            };

            channels.extend(page.items);

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        (channels, None)
    }

    async fn to_conversation(
        &self,
        kind: ConversationKind,
        channel: SlackChannel,
    ) -> Result<Conversation, SlackError> {
        let mut conversation = Conversation {
            name: if channel.name.is_empty() {
                format!("{}_{}", kind.api_type(), channel.id)
            } else {
                channel.name
            },
            id: channel.id,
            kind,
            is_archived: channel.is_archived,
            is_private: channel.is_private || kind == ConversationKind::GroupDm,
            counterpart_user_id: None,
            counterpart_user_name: None,
        };

        if kind == ConversationKind::DirectMessage {
            conversation.is_private = true;
            if let Some(user_id) = channel.user {
                let user_name = self.session.users.display_name(&user_id).await?;
                conversation.name = user_name.clone();
                conversation.counterpart_user_id = Some(user_id);
                conversation.counterpart_user_name = Some(user_name);
            }
        }

        Ok(conversation)
    }
}
