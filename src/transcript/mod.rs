//! Markdown transcripts generated from export JSON files

mod render;

use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use render::{
    render_document, sanitize_text, TranscriptConversation, TranscriptDocument, TranscriptFile,
    TranscriptMessage,
};

pub const DEFAULT_MARKDOWN_DIR: &str = "markdown";

/// Export subdirectories scanned for documents.
const SOURCE_DIRS: &[&str] = &["channels", "ims", "groups"];

#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid export document {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One converted document.
#[derive(Debug, Clone)]
pub struct Converted {
    pub source: PathBuf,
    pub output: PathBuf,
    pub messages: usize,
}

#[derive(Debug, Default)]
pub struct ConversionReport {
    pub total: usize,
    pub converted: Vec<Converted>,
    pub failed: Vec<(PathBuf, String)>,
}

/// All export documents under `input`, sorted by path.
pub fn discover_exports(input: &Path) -> Result<Vec<PathBuf>, TranscriptError> {
    let mut found = Vec::new();

    for sub in SOURCE_DIRS {
        let dir = input.join(sub);
        if !dir.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(&dir).map_err(|source| TranscriptError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Render one document to `<output>/<subdir>/<stem>.md`.
pub fn convert_file(
    source: &Path,
    input: &Path,
    output: &Path,
) -> Result<Converted, TranscriptError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TranscriptError::Io { path, source }
    };

    let raw = std::fs::read_to_string(source).map_err(io_err(source))?;
    let document: TranscriptDocument =
        serde_json::from_str(&raw).map_err(|e| TranscriptError::Json {
            path: source.to_path_buf(),
            source: e,
        })?;

    let relative = source.strip_prefix(input).unwrap_or(source);
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let out_dir = match relative.parent() {
        Some(parent) => output.join(parent),
        None => output.to_path_buf(),
    };
    std::fs::create_dir_all(&out_dir).map_err(io_err(&out_dir))?;
    let out_file = out_dir.join(format!("{}.md", stem));

    let markdown = render_document(
        &document,
        &stem,
        &source.display().to_string(),
        Utc::now(),
        &Local,
    );
    std::fs::write(&out_file, markdown).map_err(io_err(&out_file))?;

    Ok(Converted {
        source: source.to_path_buf(),
        output: out_file,
        messages: document.messages.len(),
    })
}

/// Convert every export document under `input`. One bad file is recorded
/// and the rest still convert. `progress` sees each result as it happens.
pub fn convert_all<F>(
    input: &Path,
    output: &Path,
    limit: Option<usize>,
    mut progress: F,
) -> Result<ConversionReport, TranscriptError>
where
    F: FnMut(usize, usize, &Path, &Result<Converted, TranscriptError>),
{
    let mut sources = discover_exports(input)?;
    if let Some(limit) = limit {
        sources.truncate(limit);
    }

    std::fs::create_dir_all(output).map_err(|source| TranscriptError::Io {
        path: output.to_path_buf(),
        source,
    })?;

    let mut report = ConversionReport {
        total: sources.len(),
        ..Default::default()
    };
    tracing::info!("Found {} conversations to convert", report.total);

    for (i, source) in sources.iter().enumerate() {
        let result = convert_file(source, input, output);
        progress(i + 1, report.total, source, &result);

        match result {
            Ok(converted) => report.converted.push(converted),
            Err(e) => {
                tracing::warn!("Failed to convert {}: {}", source.display(), e);
                report.failed.push((source.clone(), e.to_string()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(path: &Path, value: serde_json::Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    fn document(name: &str) -> serde_json::Value {
        json!({
            "conversation_info": { "name": name, "type": "public_channel" },
            "messages": [{ "timestamp": "1744616613.903849", "user": "Ann", "text": "hello" }],
            "message_count": 1
        })
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("ims/zed_dm.json"), document("zed"));
        write(&root.join("channels/b.json"), document("b"));
        write(&root.join("channels/a.json"), document("a"));
        write(&root.join("groups/g.json"), document("g"));
        write(&root.join("export_summary.json"), json!({}));
        std::fs::write(root.join("channels/notes.txt"), "x").unwrap();

        let found: Vec<PathBuf> = discover_exports(root)
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            found,
            vec![
                PathBuf::from("channels/a.json"),
                PathBuf::from("channels/b.json"),
                PathBuf::from("groups/g.json"),
                PathBuf::from("ims/zed_dm.json"),
            ]
        );
    }

    #[test]
    fn test_convert_all_mirrors_layout_and_survives_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("exports");
        let output = dir.path().join("markdown");
        write(&input.join("channels/general.json"), document("general"));
        std::fs::write(input.join("channels/broken.json"), "{ not json").unwrap();
        write(&input.join("ims/Ann_dm.json"), document("Ann"));

        let mut seen = Vec::new();
        let report = convert_all(&input, &output, None, |i, total, _, result| {
            seen.push((i, total, result.is_ok()));
        })
        .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.converted.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("channels/broken.json"));
        assert_eq!(seen, vec![(1, 3, false), (2, 3, true), (3, 3, true)]);

        let md = std::fs::read_to_string(output.join("channels/general.md")).unwrap();
        assert!(md.starts_with("# Slack Conversation: general\n"));
        assert!(md.contains("Ann: hello"));
        assert!(output.join("ims/Ann_dm.md").exists());
    }

    #[test]
    fn test_limit_caps_conversions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("exports");
        let output = dir.path().join("markdown");
        write(&input.join("channels/a.json"), document("a"));
        write(&input.join("channels/b.json"), document("b"));

        let report = convert_all(&input, &output, Some(1), |_, _, _, _| {}).unwrap();

        assert_eq!(report.total, 1);
        assert!(output.join("channels/a.md").exists());
        assert!(!output.join("channels/b.md").exists());
    }

    #[test]
    fn test_missing_input_has_nothing_to_convert() {
        let dir = tempfile::tempdir().unwrap();
        let report =
            convert_all(&dir.path().join("nope"), &dir.path().join("md"), None, |_, _, _, _| {})
                .unwrap();
        assert_eq!(report.total, 0);
    }
}
