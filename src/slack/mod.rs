//! Slack Web API integration
//!
//! Wire types, the HTTP transport, and the retrying, rate-limited client
//! every export component talks through.

mod client;
mod retry;
mod transport;
mod types;
mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use client::SlackClient;
pub use retry::{classify, FailureKind, RateGate, RetryPolicy};
pub use transport::{HttpTransport, RawFailure, Transport, SLACK_API_BASE};
pub use types::{
    ts_parts, ts_to_datetime, HistoryPage, Page, SlackAuthInfo, SlackChannel, SlackError,
    SlackFile, SlackMessage, SlackReaction, SlackUser,
};
pub use users::UserDirectory;
