//! Markdown rendering of one exported conversation

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::slack::ts_parts;

/// An export document as read back from disk. Accepts files from older
/// exporter versions (`ts` instead of `timestamp`, `export_date`, missing
/// counts), so every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptDocument {
    #[serde(default)]
    pub conversation_info: TranscriptConversation,
    #[serde(default)]
    pub messages: Vec<TranscriptMessage>,
    pub message_count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptConversation {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptMessage {
    pub timestamp: Option<Value>,
    pub ts: Option<Value>,
    pub user: Option<String>,
    pub user_name: Option<String>,
    pub user_id: Option<String>,
    pub text: Option<String>,
    pub files: Option<Vec<TranscriptFile>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscriptFile {
    pub name: Option<String>,
    pub title: Option<String>,
}

impl TranscriptMessage {
    fn raw_ts(&self) -> Option<String> {
        let value = self.timestamp.as_ref().or(self.ts.as_ref())?;
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn author(&self) -> &str {
        [&self.user, &self.user_name, &self.user_id]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or("unknown")
    }
}

/// Neutralize the bits of message text Markdown would otherwise interpret.
pub fn sanitize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n").replace('`', "\\`");

    text.split('\n')
        .map(|line| {
            if line.starts_with('#') {
                return format!("\\{}", line);
            }
            escape_list_marker(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn escape_list_marker(line: &str) -> String {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];

    let marker_len = match body.chars().next() {
        Some('-' | '*' | '+') => 1,
        Some(c) if c.is_ascii_digit() => {
            let digits = body.bytes().take_while(u8::is_ascii_digit).count();
            if body[digits..].starts_with('.') {
                digits + 1
            } else {
                return line.to_string();
            }
        }
        _ => return line.to_string(),
    };

    if !body[marker_len..].starts_with(char::is_whitespace) {
        return line.to_string();
    }
    let (marker, rest) = body.split_at(marker_len);
    let escaped = match marker.strip_suffix('.') {
        Some(digits) => format!("{}\\.", digits),
        None => format!("\\{}", marker),
    };
    format!("{}{}{}", indent, escaped, rest)
}

struct Line {
    key: (i64, u32),
    text: String,
}

/// Render a document. `tz` decides which calendar day a message lands on.
pub fn render_document<Tz>(
    document: &TranscriptDocument,
    fallback_name: &str,
    source: &str,
    generated_at: DateTime<Utc>,
    tz: &Tz,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let name = document
        .conversation_info
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback_name);
    let kind = document.conversation_info.kind.as_deref().unwrap_or("unknown");
    let message_count = document
        .message_count
        .unwrap_or(document.messages.len());

    let mut days: BTreeMap<NaiveDate, Vec<Line>> = BTreeMap::new();
    for msg in &document.messages {
        let Some((secs, nanos)) = msg.raw_ts().as_deref().and_then(ts_parts) else {
            continue;
        };
        let Some(utc) = DateTime::from_timestamp(secs, nanos) else {
            continue;
        };
        let local = utc.with_timezone(tz);

        let mut text = sanitize_text(msg.text.as_deref().unwrap_or_default());
        let files = msg.files.as_deref().unwrap_or_default();
        if text.is_empty() && files.is_empty() {
            continue;
        }
        for file in files {
            let label = file
                .name
                .as_deref()
                .or(file.title.as_deref())
                .unwrap_or("file");
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("[file: {}]", label));
        }

        days.entry(local.date_naive()).or_default().push(Line {
            key: (secs, nanos),
            text: format!("[{}] {}: {}", local.format("%H:%M:%S"), msg.author(), text),
        });
    }

    let mut parts = vec![format!(
        "# Slack Conversation: {}\n\n*Export Source:* `{}`  *Conversation Type:* {}  *Message Count:* {}  *Generated:* {} UTC\n\n---\n",
        name,
        source,
        kind,
        message_count,
        generated_at.format("%Y-%m-%dT%H:%M:%S")
    )];

    for (date, mut lines) in days {
        parts.push(format!("## {}", date.format("%Y-%m-%d (%A)")));
        lines.sort_by_key(|line| line.key);
        parts.extend(lines.into_iter().map(|line| line.text));
        parts.push(String::new());
    }

    let mut out = parts.join("\n").trim_end().to_string();
    out.push('\n');
    out
}
