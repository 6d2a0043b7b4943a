//! Attachment downloads for `AttachmentMode::DownloadBinaries`

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use super::writer::safe_name;
use crate::slack::{SlackClient, SlackError, SlackFile};

pub const FILES_DIR: &str = "files";

const DOC_TYPES: &[&str] = &[
    "pdf", "doc", "docx", "txt", "rtf", "odt", "xls", "xlsx", "ppt", "pptx",
];
const IMAGE_TYPES: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"];
const VIDEO_TYPES: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
const AUDIO_TYPES: &[&str] = &["mp3", "wav", "flac", "aac", "m4a"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadStats {
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    /// No URL, or already stored earlier in the run
    pub skipped: usize,
}

/// Storage folder under `files/` for a Slack filetype / mimetype pair.
pub fn category_for(filetype: Option<&str>, mimetype: Option<&str>) -> &'static str {
    let filetype = filetype.unwrap_or_default().to_lowercase();
    let mimetype = mimetype.unwrap_or_default().to_lowercase();
    let is = |types: &[&str], mime: &str| {
        types.contains(&filetype.as_str()) || mimetype.contains(mime)
    };

    if is(DOC_TYPES, "document") {
        "uploaded_docs"
    } else if is(IMAGE_TYPES, "image") {
        "images"
    } else if is(VIDEO_TYPES, "video") {
        "videos"
    } else if is(AUDIO_TYPES, "audio") {
        "audio"
    } else {
        "other"
    }
}

fn safe_file_name(file: &SlackFile, key: &str) -> String {
    let name: String = file
        .name
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .collect();
    let name = name.trim_end();
    if name.is_empty() {
        format!("file_{}", key)
    } else {
        name.to_string()
    }
}

/// Downloads each attachment once per run and files it by category.
pub struct AttachmentStore {
    client: Arc<SlackClient>,
    root: PathBuf,
    stored: tokio::sync::Mutex<HashMap<String, Arc<OnceCell<Option<String>>>>>,
    claimed: Mutex<HashSet<PathBuf>>,
    stats: Mutex<DownloadStats>,
}

impl AttachmentStore {
    pub fn new(client: Arc<SlackClient>, root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            root: root.into(),
            stored: tokio::sync::Mutex::new(HashMap::new()),
            claimed: Mutex::new(HashSet::new()),
            stats: Mutex::new(DownloadStats::default()),
        }
    }

    pub fn stats(&self) -> DownloadStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn bump(&self, f: impl FnOnce(&mut DownloadStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    /// Store one attachment and return its path relative to the export root.
    ///
    /// Download failures are counted and logged, never returned: a missing
    /// file must not fail the conversation it belongs to. Only a fatal error
    /// (a rejected credential) comes back as `Err`, and is not memoized.
    pub async fn store(
        &self,
        file: &SlackFile,
        conversation_name: &str,
    ) -> Result<Option<String>, SlackError> {
        self.bump(|s| s.attempted += 1);

        let Some(url) = file.url_private.as_deref() else {
            self.bump(|s| s.skipped += 1);
            return Ok(None);
        };
        let key = file.id.clone().unwrap_or_else(|| url.to_string());

        let cell = {
            let mut stored = self.stored.lock().await;
            stored.entry(key.clone()).or_default().clone()
        };

        let fetched_here = AtomicBool::new(false);
        let path = cell
            .get_or_try_init(|| async {
                fetched_here.store(true, Ordering::Relaxed);
                self.fetch(file, url, &key, conversation_name).await
            })
            .await?
            .clone();

        if !fetched_here.load(Ordering::Relaxed) {
            self.bump(|s| s.skipped += 1);
        }
        Ok(path)
    }

    async fn fetch(
        &self,
        file: &SlackFile,
        url: &str,
        key: &str,
        conversation_name: &str,
    ) -> Result<Option<String>, SlackError> {
        let label = file.name.as_deref().unwrap_or(key);

        let bytes = match self.client.download_file(url).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::warn!("Attachment {} is gone (404)", label);
                self.bump(|s| s.failed += 1);
                return Ok(None);
            }
            Err(e) if e.is_fatal() => {
                tracing::error!("Download of {} rejected the credential: {}", label, e);
                self.bump(|s| s.failed += 1);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("Error downloading {}: {}", label, e);
                self.bump(|s| s.failed += 1);
                return Ok(None);
            }
        };

        let conversation_dir = match safe_name(conversation_name) {
            name if name.is_empty() => "unknown".to_string(),
            name => name,
        };
        let dir = Path::new(FILES_DIR)
            .join(category_for(file.filetype.as_deref(), file.mimetype.as_deref()))
            .join(conversation_dir);
        let relative = self.claim(&dir, &safe_file_name(file, key));
        let target = self.root.join(&relative);

        let written = std::fs::create_dir_all(self.root.join(&dir))
            .and_then(|_| std::fs::write(&target, &bytes));
        if let Err(e) = written {
            tracing::warn!("Could not save {} to {}: {}", label, target.display(), e);
            self.bump(|s| s.failed += 1);
            return Ok(None);
        }

        self.bump(|s| s.successful += 1);
        tracing::debug!("Downloaded {} -> {}", label, relative.display());
        Ok(Some(relative.to_string_lossy().replace('\\', "/")))
    }

    /// Reserve a unique relative path, adding `_1`, `_2`, ... before the
    /// extension when the name is taken.
    fn claim(&self, dir: &Path, file_name: &str) -> PathBuf {
        let original = dir.join(file_name);
        let Ok(mut claimed) = self.claimed.lock() else {
            return original;
        };

        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
            _ => (file_name, String::new()),
        };

        let mut candidate = original;
        let mut counter = 1;
        while claimed.contains(&candidate) {
            candidate = dir.join(format!("{}_{}{}", stem, counter, ext));
            counter += 1;
        }
        claimed.insert(candidate.clone());
        candidate
    }
}
