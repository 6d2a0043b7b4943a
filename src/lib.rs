//! Slack conversation exporter
//!
//! Pages through every conversation a user token can read, writes one JSON
//! document per conversation, and renders those documents as Markdown
//! transcripts.

pub mod commands;
pub mod config;
pub mod export;
pub mod slack;
pub mod transcript;

pub use config::{AttachmentMode, ExportConfig};
pub use export::{ExportService, ExportSession, ExportSummary};
pub use slack::{SlackClient, SlackError};
