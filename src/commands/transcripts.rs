//! `slack-archiver transcripts`

use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::CommandError;
use crate::config::DEFAULT_OUTPUT_DIR;
use crate::transcript::{convert_all, DEFAULT_MARKDOWN_DIR};

#[derive(Args, Debug)]
pub struct TranscriptArgs {
    /// Export root containing channels/, ims/ and groups/.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub input_dir: PathBuf,

    /// Where the Markdown tree is written.
    #[arg(short, long, default_value = DEFAULT_MARKDOWN_DIR)]
    pub output_dir: PathBuf,

    /// Only convert the first N conversations.
    #[arg(short, long)]
    pub limit: Option<usize>,
}

pub fn run(args: TranscriptArgs) -> Result<(), CommandError> {
    let output_dir = args.output_dir.clone();

    let report = convert_all(
        &args.input_dir,
        &args.output_dir,
        args.limit,
        |i, total, source, result| {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match result {
                Ok(converted) => println!(
                    "[{}/{}] {} {} -> {} ({} msgs)",
                    i,
                    total,
                    "✓".green(),
                    name,
                    converted
                        .output
                        .strip_prefix(&output_dir)
                        .unwrap_or(&converted.output)
                        .display(),
                    converted.messages
                ),
                Err(e) => println!("[{}/{}] {} Failed {}: {}", i, total, "✗".red(), name, e),
            }
        },
    )?;

    println!(
        "Done. {}/{} conversations converted.",
        report.converted.len(),
        report.total
    );
    Ok(())
}
