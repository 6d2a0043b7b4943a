//! Command-line interface

mod export;
mod transcripts;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::slack::SlackError;
use crate::transcript::TranscriptError;

pub use export::ExportArgs;
pub use transcripts::TranscriptArgs;

/// Export Slack conversation history to JSON, then render Markdown transcripts.
#[derive(Parser, Debug)]
#[command(name = "slack-archiver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export every accessible conversation to JSON.
    Export(ExportArgs),

    /// Render exported JSON documents as Markdown transcripts.
    Transcripts(TranscriptArgs),
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Slack(#[from] SlackError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn run(cli: Cli) -> Result<(), CommandError> {
    match cli.command {
        Commands::Export(args) => export::run(args).await,
        Commands::Transcripts(args) => transcripts::run(args),
    }
}
