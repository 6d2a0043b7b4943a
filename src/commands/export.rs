//! `slack-archiver export`

use clap::Args;
use colored::Colorize;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use super::CommandError;
use crate::config::{AttachmentMode, ExportConfig, DEFAULT_OUTPUT_DIR};
use crate::export::{ExportService, ExportSession, ExportSummary, OutcomeStatus};
use crate::slack::SlackError;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// User token (xoxp-...). Prompted for when unset.
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Directory the export is written to.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Conversations fetched in parallel (1 = sequential).
    #[arg(short, long, default_value = "2")]
    pub concurrency: usize,

    /// Leave archived conversations out.
    #[arg(long)]
    pub skip_archived: bool,

    /// Do not look for DMs hidden from the sidebar.
    #[arg(long)]
    pub no_probe_dms: bool,

    /// Download attachments under `files/` instead of keeping metadata only.
    #[arg(long)]
    pub download_files: bool,

    /// Workspace id, required on Enterprise Grid.
    #[arg(long, env = "SLACK_TEAM_ID")]
    pub team_id: Option<String>,

    /// Minimum spacing between API calls, in milliseconds.
    #[arg(long, default_value = "500")]
    pub min_call_interval_ms: u64,

    /// Attempts per call on network errors and 5xx responses.
    #[arg(long, default_value = "5")]
    pub max_retries: u32,

    /// Per-request timeout in seconds.
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Skip the confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

impl ExportArgs {
    pub fn to_config(&self, token: String) -> ExportConfig {
        let mut config = ExportConfig::new(token);
        config.output_dir = self.output_dir.clone();
        config.concurrency = self.concurrency;
        config.skip_archived = self.skip_archived;
        config.probe_hidden_dms = !self.no_probe_dms;
        config.attachments = if self.download_files {
            AttachmentMode::DownloadBinaries
        } else {
            AttachmentMode::MetadataOnly
        };
        config.team_id = self.team_id.clone().filter(|t| !t.is_empty());
        config.min_call_interval = Duration::from_millis(self.min_call_interval_ms);
        config.retry = config.retry.with_max_attempts(self.max_retries);
        config.request_timeout = Duration::from_secs(self.timeout_secs);
        config
    }
}

pub async fn run(args: ExportArgs) -> Result<(), CommandError> {
    let token = match args.token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => token.to_string(),
        _ => prompt_token()?,
    };

    let session = ExportSession::connect(args.to_config(token))?;
    let auth = session.client.test_auth().await?;
    println!(
        "Connected to {} as {}",
        auth.team_name.bold(),
        auth.user_name.bold()
    );

    println!("This will export all accessible conversations:");
    println!("  - public and private channels");
    println!("  - group and direct messages");
    if session.config.probe_hidden_dms {
        println!("  - direct messages hidden from the sidebar");
    }
    if session.config.attachments == AttachmentMode::DownloadBinaries {
        println!("  - attached files");
    }
    println!(
        "Output directory: {}",
        session.config.output_dir.display()
    );

    if !args.yes && !confirm("Continue with export? (y/N): ")? {
        println!("Export cancelled.");
        return Ok(());
    }

    let service = ExportService::new(session);
    let cancel = service.session().cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing current pages before stopping");
            cancel.cancel();
        }
    });

    let summary = service.run().await?;
    print_summary(&summary, &service.session().config.output_dir);
    Ok(())
}

fn prompt_token() -> Result<String, CommandError> {
    if !std::io::stdin().is_terminal() {
        return Err(SlackError::Config("SLACK_TOKEN is not set".into()).into());
    }

    print!("Slack user token (xoxp-..., input hidden): ");
    std::io::stdout().flush()?;
    let token = read_secret()?;
    println!();

    match token {
        Some(token) => Ok(token.trim().to_string()),
        None => Err(SlackError::Config("token entry cancelled".into()).into()),
    }
}

/// Raw mode for the lifetime of the guard, so typed keys are not echoed.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

#[derive(Debug, PartialEq)]
enum SecretKey {
    Pending,
    Done,
    Aborted,
}

fn apply_key(buffer: &mut String, key: KeyEvent) -> SecretKey {
    if key.kind != KeyEventKind::Press {
        return SecretKey::Pending;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => SecretKey::Aborted,
        (KeyCode::Enter, _) => SecretKey::Done,
        (KeyCode::Backspace, _) => {
            buffer.pop();
            SecretKey::Pending
        }
        (KeyCode::Char(c), modifiers) if !modifiers.contains(KeyModifiers::CONTROL) => {
            buffer.push(c);
            SecretKey::Pending
        }
        _ => SecretKey::Pending,
    }
}

/// Read one line without echo. `None` when the user aborts with Esc or Ctrl-C.
fn read_secret() -> std::io::Result<Option<String>> {
    let _raw = RawModeGuard::enable()?;
    let mut buffer = String::new();

    loop {
        if let Event::Key(key) = event::read()? {
            match apply_key(&mut buffer, key) {
                SecretKey::Pending => {}
                SecretKey::Done => return Ok(Some(buffer)),
                SecretKey::Aborted => return Ok(None),
            }
        }
    }
}

fn confirm(question: &str) -> Result<bool, CommandError> {
    print!("{}", question);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_summary(summary: &ExportSummary, output_dir: &std::path::Path) {
    println!();
    println!("{}", "Export complete".green().bold());
    println!(
        "  {} conversations, {} messages, {} API calls",
        summary.total_conversations, summary.total_messages, summary.api_calls
    );
    for (kind, counts) in &summary.breakdown {
        println!(
            "  {:<16} {:>5} conversations {:>8} messages",
            kind.as_str(),
            counts.conversations,
            counts.messages
        );
    }

    if let Some(probe) = &summary.dm_probe {
        println!(
            "  Hidden DMs: {} found among {} users",
            probe.discovered, probe.candidates
        );
    }
    if let Some(files) = &summary.file_downloads {
        println!(
            "  Files: {} downloaded, {} failed, {} skipped",
            files.successful, files.failed, files.skipped
        );
    }

    let skipped = summary.count(OutcomeStatus::Skipped);
    if skipped > 0 {
        println!("  {} conversations skipped (empty or cancelled)", skipped);
    }

    let attention: Vec<_> = summary.needs_attention().collect();
    if !attention.is_empty() {
        println!();
        println!("{}", "Needs attention:".yellow().bold());
        for record in attention {
            println!(
                "  {} {} ({}): {}",
                match record.status {
                    OutcomeStatus::Partial => "partial".yellow(),
                    _ => "failed".red(),
                },
                record.name,
                record.id,
                record.reason.as_deref().unwrap_or_default()
            );
        }
    }
    for failure in &summary.listing_failures {
        println!("  {} listing {}: {}", "incomplete".yellow(), failure.scope, failure.reason);
    }

    println!();
    println!("Saved to {}", output_dir.display());
}

#[cfg(test)]
mod tests {
    use super::super::{Cli, Commands};
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> ExportArgs {
        let mut argv = vec!["slack-archiver", "export", "--token", "xoxp-1"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Export(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let args = parse(&[]);
        let config = args.to_config("xoxp-1".into());
        let defaults = ExportConfig::new("xoxp-1");

        assert_eq!(config.output_dir, defaults.output_dir);
        assert_eq!(config.concurrency, defaults.concurrency);
        assert_eq!(config.min_call_interval, defaults.min_call_interval);
        assert_eq!(config.request_timeout, defaults.request_timeout);
        assert_eq!(config.retry, defaults.retry);
        assert!(config.probe_hidden_dms);
        assert_eq!(config.attachments, AttachmentMode::MetadataOnly);
        assert!(!args.yes);
    }

    #[test]
    fn test_flags_map_onto_config() {
        let args = parse(&[
            "--output-dir",
            "out",
            "--concurrency",
            "1",
            "--skip-archived",
            "--no-probe-dms",
            "--download-files",
            "--team-id",
            "T1",
            "--min-call-interval-ms",
            "1200",
            "--max-retries",
            "3",
            "--timeout-secs",
            "10",
            "--yes",
        ]);
        let config = args.to_config("xoxp-1".into());

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.concurrency, 1);
        assert!(config.skip_archived);
        assert!(!config.probe_hidden_dms);
        assert_eq!(config.attachments, AttachmentMode::DownloadBinaries);
        assert_eq!(config.team_id.as_deref(), Some("T1"));
        assert_eq!(config.min_call_interval, Duration::from_millis(1200));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(args.yes);
    }

    fn typed(buffer: &mut String, keys: &[KeyEvent]) -> Vec<SecretKey> {
        keys.iter().map(|key| apply_key(buffer, *key)).collect()
    }

    #[test]
    fn test_secret_input_collects_chars_until_enter() {
        let mut buffer = String::new();
        let outcomes = typed(
            &mut buffer,
            &[
                KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE),
                KeyEvent::new(KeyCode::Char('O'), KeyModifiers::SHIFT),
                KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE),
                KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE),
                KeyEvent::new(KeyCode::Char('-'), KeyModifiers::NONE),
                KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE),
            ],
        );

        assert_eq!(buffer, "xO-");
        assert_eq!(outcomes.last(), Some(&SecretKey::Done));
    }

    #[test]
    fn test_secret_input_aborts_on_ctrl_c_and_esc() {
        let mut buffer = String::from("xoxp");
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(apply_key(&mut buffer, ctrl_c), SecretKey::Aborted);
        assert_eq!(buffer, "xoxp");

        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(apply_key(&mut buffer, esc), SecretKey::Aborted);
    }

    #[test]
    fn test_secret_input_ignores_key_release() {
        let mut buffer = String::new();
        let mut release = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;

        assert_eq!(apply_key(&mut buffer, release), SecretKey::Pending);
        assert!(buffer.is_empty());
    }
}
