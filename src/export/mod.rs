//! Conversation export pipeline
//!
//! The [`ExportService`] drives one run: it lists every conversation the
//! token can see, probes for hidden DMs, fetches each history on a small
//! worker pool and writes one JSON document per conversation plus
//! `export_summary.json`.

mod dm_probe;
mod enumerator;
mod files;
mod history;
mod service;
mod session;
mod summary;
mod types;
mod writer;

pub use dm_probe::{DmProber, ProbeFailure, ProbeReport, ProbeStats};
pub use enumerator::{ConversationEnumerator, Enumeration};
pub use files::{category_for, AttachmentStore, DownloadStats, FILES_DIR};
pub use history::{HistoryError, HistoryPaginator};
pub use service::ExportService;
pub use session::{CancelFlag, ExportSession};
pub use summary::{ConversationRecord, ExportSummary, KindBreakdown, ListingFailure, OutcomeStatus};
pub use types::{
    Conversation, ConversationKind, ConversationOutcome, ConversationResult, ExportDocument,
    ExportFile, ExportMessage, Reaction,
};
pub use writer::{safe_name, ExportWriter, SUMMARY_FILE};
