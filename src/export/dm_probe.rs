//! Discovery of direct messages hidden from the sidebar
//!
//! `conversations.list` can leave out DM channels the user closed even though
//! their history still exists. For every known user without a visible DM we
//! ask Slack to open (or resolve) the channel and keep it when it has at least
//! one message.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::session::ExportSession;
use super::types::{Conversation, ConversationKind};
use crate::slack::{SlackError, SlackUser};

/// Error codes meaning "there is no DM with this user", not a failure.
const NO_DM_CODES: &[&str] = &[
    "cannot_dm_bot",
    "user_not_found",
    "user_not_visible",
    "user_disabled",
    "channel_not_found",
];

const SLACKBOT_ID: &str = "USLACKBOT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeFailure {
    pub user_id: String,
    pub reason: String,
}

/// Probe diagnostics. Expected absences are counted, real errors listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeStats {
    pub candidates: usize,
    pub discovered: usize,
    pub no_channel: usize,
    pub empty_history: usize,
    pub already_visible: usize,
    pub failures: Vec<ProbeFailure>,
}

#[derive(Debug, Default)]
pub struct ProbeReport {
    pub discovered: Vec<Conversation>,
    pub stats: ProbeStats,
}

enum ProbeResult {
    Found(Conversation),
    NoChannel,
    Empty,
    AlreadyVisible,
}

pub struct DmProber<'a> {
    session: &'a ExportSession,
}

impl<'a> DmProber<'a> {
    pub fn new(session: &'a ExportSession) -> Self {
        Self { session }
    }

    /// Find DMs with known users that the visible listing did not return.
    ///
    /// Deleted users and bots are never probed. Only an auth failure is an
    /// error; everything else ends up in the stats.
    pub async fn probe_hidden_dms(
        &self,
        known_users: &[SlackUser],
        visible: &[Conversation],
    ) -> Result<ProbeReport, SlackError> {
        let visible_dms: Vec<&Conversation> = visible
            .iter()
            .filter(|c| c.kind == ConversationKind::DirectMessage)
            .collect();
        let covered_users: HashSet<&str> = visible_dms
            .iter()
            .filter_map(|c| c.counterpart_user_id.as_deref())
            .collect();
        let visible_ids: HashSet<&str> = visible.iter().map(|c| c.id.as_str()).collect();

        let candidates: Vec<&SlackUser> = known_users
            .iter()
            .filter(|u| !u.deleted && !u.is_bot && u.id != SLACKBOT_ID)
            .filter(|u| !covered_users.contains(u.id.as_str()))
            .collect();

        let mut report = ProbeReport::default();
        report.stats.candidates = candidates.len();
        tracing::info!("Checking {} users for hidden DMs", candidates.len());

        for (i, user) in candidates.iter().enumerate() {
            if self.session.is_cancelled() {
                break;
            }
            if (i + 1) % 50 == 0 {
                tracing::info!("Checked {}/{} users", i + 1, candidates.len());
            }

            match self.probe_user(user, &visible_ids).await {
                Ok(ProbeResult::Found(conversation)) => {
                    tracing::info!("Found hidden DM with {}", conversation.name);
                    report.stats.discovered += 1;
                    report.discovered.push(conversation);
                }
                Ok(ProbeResult::NoChannel) => report.stats.no_channel += 1,
                Ok(ProbeResult::Empty) => report.stats.empty_history += 1,
                Ok(ProbeResult::AlreadyVisible) => report.stats.already_visible += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::debug!("DM probe for {} failed: {}", user.id, e);
                    report.stats.failures.push(ProbeFailure {
                        user_id: user.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "DM probe done: {} discovered, {} without a channel, {} empty, {} failed",
            report.stats.discovered,
            report.stats.no_channel,
            report.stats.empty_history,
            report.stats.failures.len()
        );

        Ok(report)
    }

    async fn probe_user(
        &self,
        user: &SlackUser,
        visible_ids: &HashSet<&str>,
    ) -> Result<ProbeResult, SlackError> {
        let client = &self.session.client;

        let channel_id = match client.open_dm(&user.id).await {
            Ok(id) => id,
            Err(e) if is_no_dm(&e) => return Ok(ProbeResult::NoChannel),
            Err(e) => return Err(e),
        };

        if visible_ids.contains(channel_id.as_str()) {
            return Ok(ProbeResult::AlreadyVisible);
        }

        let page = match client.conversation_history_page(&channel_id, None, 1).await {
            Ok(page) => page,
            Err(e) if is_no_dm(&e) => return Ok(ProbeResult::NoChannel),
            Err(e) => return Err(e),
        };

        if page.messages.is_empty() {
            return Ok(ProbeResult::Empty);
        }

        Ok(ProbeResult::Found(Conversation::direct_message(
            channel_id,
            user.id.clone(),
            user.label().to_string(),
        )))
    }
}

fn is_no_dm(error: &SlackError) -> bool {
    error
        .api_code()
        .map(|code| NO_DM_CODES.contains(&code))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::session::test_support::fake_session;
    use crate::slack::testing::{api_failure, ok, FakeTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn user(id: &str, name: &str) -> SlackUser {
        SlackUser {
            id: id.into(),
            name: name.into(),
            real_name: None,
            display_name: None,
            deleted: false,
            is_bot: false,
        }
    }

    fn opened(channel: &str) -> Result<serde_json::Value, crate::slack::RawFailure> {
        ok(json!({ "channel": { "id": channel } }))
    }

    fn history(count: usize) -> Result<serde_json::Value, crate::slack::RawFailure> {
        let messages: Vec<_> = (0..count)
            .map(|i| json!({ "ts": format!("{}.0", i + 1), "text": "hi" }))
            .collect();
        ok(json!({ "messages": messages }))
    }

    #[tokio::test]
    async fn test_discovers_dm_with_history() {
        let transport = Arc::new(FakeTransport::new());
        transport.push("conversations.open#U1", opened("D9"));
        transport.push("conversations.history#D9", history(1));

        let session = fake_session(&transport);
        let report = DmProber::new(&session)
            .probe_hidden_dms(&[user("U1", "ann")], &[])
            .await
            .unwrap();

        assert_eq!(report.discovered.len(), 1);
        let dm = &report.discovered[0];
        assert_eq!(dm.id, "D9");
        assert_eq!(dm.name, "ann");
        assert_eq!(dm.kind, ConversationKind::DirectMessage);
        assert_eq!(dm.counterpart_user_id.as_deref(), Some("U1"));
        assert_eq!(report.stats.discovered, 1);

        let params = transport.params("conversations.history#D9");
        assert!(params[0].contains(&("limit".to_string(), "1".to_string())));
    }

    #[tokio::test]
    async fn test_unresolvable_dm_is_not_an_error() {
        let transport = Arc::new(FakeTransport::new());
        transport.push("conversations.open#U1", Err(api_failure("user_not_found")));

        let session = fake_session(&transport);
        let report = DmProber::new(&session)
            .probe_hidden_dms(&[user("U1", "ann")], &[])
            .await
            .unwrap();

        assert!(report.discovered.is_empty());
        assert_eq!(report.stats.no_channel, 1);
        assert!(report.stats.failures.is_empty());
    }

    #[tokio::test]
    async fn test_empty_history_yields_nothing() {
        let transport = Arc::new(FakeTransport::new());
        transport.push("conversations.open#U1", opened("D9"));
        transport.push("conversations.history#D9", history(0));

        let session = fake_session(&transport);
        let report = DmProber::new(&session)
            .probe_hidden_dms(&[user("U1", "ann")], &[])
            .await
            .unwrap();

        assert!(report.discovered.is_empty());
        assert_eq!(report.stats.empty_history, 1);
        assert!(report.stats.failures.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_users_and_bots_are_never_probed() {
        let transport = Arc::new(FakeTransport::new());
        let mut gone = user("U1", "gone");
        gone.deleted = true;
        let mut bot = user("B1", "deploybot");
        bot.is_bot = true;

        let session = fake_session(&transport);
        let report = DmProber::new(&session)
            .probe_hidden_dms(&[gone, bot, user(SLACKBOT_ID, "slackbot")], &[])
            .await
            .unwrap();

        assert_eq!(report.stats.candidates, 0);
        assert_eq!(transport.call_count("conversations.open"), 0);
    }

    #[tokio::test]
    async fn test_users_with_visible_dms_are_skipped() {
        let transport = Arc::new(FakeTransport::new());
        transport.push("conversations.open#U2", opened("D1"));

        let visible = vec![
            Conversation::direct_message("D7".into(), "U1".into(), "ann".into()),
            // listed DM whose counterpart did not resolve
            Conversation::direct_message("D1".into(), "UX".into(), "UX".into()),
        ];

        let session = fake_session(&transport);
        let report = DmProber::new(&session)
            .probe_hidden_dms(&[user("U1", "ann"), user("U2", "bob")], &visible)
            .await
            .unwrap();

        assert_eq!(report.stats.candidates, 1);
        assert_eq!(report.stats.already_visible, 1);
        assert_eq!(transport.call_count("conversations.open#U1"), 0);
        assert_eq!(transport.call_count("conversations.history"), 0);
    }

    #[tokio::test]
    async fn test_unexpected_failure_is_recorded_as_diagnostic() {
        let transport = Arc::new(FakeTransport::new());
        transport.push("conversations.open#U1", Err(api_failure("missing_scope")));
        transport.push("conversations.open#U2", opened("D2"));
        transport.push("conversations.history#D2", history(2));

        let session = fake_session(&transport);
        let report = DmProber::new(&session)
            .probe_hidden_dms(&[user("U1", "ann"), user("U2", "bob")], &[])
            .await
            .unwrap();

        assert_eq!(report.discovered.len(), 1);
        assert_eq!(
            report.stats.failures,
            vec![ProbeFailure {
                user_id: "U1".into(),
                reason: "API error on conversations.open: missing_scope".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_auth_failure_stops_probe() {
        let transport = Arc::new(FakeTransport::new());
        transport.push("conversations.open#U1", Err(api_failure("invalid_auth")));

        let session = fake_session(&transport);
        let result = DmProber::new(&session)
            .probe_hidden_dms(&[user("U1", "ann"), user("U2", "bob")], &[])
            .await;

        assert!(matches!(result, Err(SlackError::Auth(_))));
        assert_eq!(transport.call_count("conversations.open#U2"), 0);
    }
}
