//! Per-tool session log adapters.
//!
//! Every supported tool is one variant of [`SourceAdapter`]. Each variant
//! reads its own on-disk layout and produces normalized [`Session`] records
//! plus ordered [`TranscriptEvent`]s. Adapters never write to the logs they
//! read.

pub mod claude;
pub mod codex;
pub mod opencode;

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::project::project_name_from_path;
use crate::session::{
    EventKind, Session, SessionError, SessionFilter, SessionSource, TranscriptEvent,
    is_within_active_window, truncate_prompt,
};

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use opencode::OpenCodeAdapter;

/// Directory searched by content search, restricted to one file glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    pub dir: PathBuf,
    pub glob: &'static str,
}

impl SearchRoot {
    pub(crate) fn new(dir: PathBuf, glob: &'static str) -> Self {
        Self { dir, glob }
    }

    /// Returns true if `path`'s file name satisfies this root's glob.
    ///
    /// Only `*.ext` globs are produced by the adapters.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = self.glob.strip_prefix("*.") else {
            return true;
        };
        path.extension().is_some_and(|e| e == ext)
    }
}

/// One of the supported assistant tools, bound to its storage root.
#[derive(Debug, Clone)]
pub enum SourceAdapter {
    Claude(ClaudeAdapter),
    Codex(CodexAdapter),
    OpenCode(OpenCodeAdapter),
}

impl SourceAdapter {
    /// Adapters for every source at their platform default locations.
    pub fn defaults() -> Vec<Self> {
        SessionSource::ALL
            .into_iter()
            .filter_map(Self::default_for)
            .collect()
    }

    /// Adapter for `source` at its default location, if one can be determined.
    pub fn default_for(source: SessionSource) -> Option<Self> {
        match source {
            SessionSource::Claude => {
                ClaudeAdapter::default_root().map(|root| Self::Claude(ClaudeAdapter::new(root)))
            }
            SessionSource::Codex => {
                CodexAdapter::default_root().map(|root| Self::Codex(CodexAdapter::new(root)))
            }
            SessionSource::OpenCode => OpenCodeAdapter::default_root()
                .map(|root| Self::OpenCode(OpenCodeAdapter::new(root))),
        }
    }

    /// Adapter for `source` reading from `root`.
    pub fn with_root(source: SessionSource, root: PathBuf) -> Self {
        match source {
            SessionSource::Claude => Self::Claude(ClaudeAdapter::new(root)),
            SessionSource::Codex => Self::Codex(CodexAdapter::new(root)),
            SessionSource::OpenCode => Self::OpenCode(OpenCodeAdapter::new(root)),
        }
    }

    pub const fn source(&self) -> SessionSource {
        match self {
            Self::Claude(_) => SessionSource::Claude,
            Self::Codex(_) => SessionSource::Codex,
            Self::OpenCode(_) => SessionSource::OpenCode,
        }
    }

    pub fn root(&self) -> &Path {
        match self {
            Self::Claude(a) => a.root(),
            Self::Codex(a) => a.root(),
            Self::OpenCode(a) => a.root(),
        }
    }

    /// Enumerate and parse every session under the storage root.
    ///
    /// Fails only when the root itself cannot be read; unreadable or empty
    /// session files are skipped.
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, SessionError> {
        let sessions = match self {
            Self::Claude(a) => a.list_sessions()?,
            Self::Codex(a) => a.list_sessions()?,
            Self::OpenCode(a) => a.list_sessions()?,
        };
        Ok(sessions.into_iter().filter(|s| filter.matches(s)).collect())
    }

    pub fn parse_one_session(&self, path: &Path) -> Option<Session> {
        match self {
            Self::Claude(a) => a.parse_one_session(path),
            Self::Codex(a) => a.parse_one_session(path),
            Self::OpenCode(a) => a.parse_one_session(path),
        }
    }

    pub fn list_transcript(&self, session: &Session) -> Vec<TranscriptEvent> {
        match self {
            Self::Claude(a) => a.list_transcript(session),
            Self::Codex(a) => a.list_transcript(session),
            Self::OpenCode(a) => a.list_transcript(session),
        }
    }

    /// Directories an external file watcher should observe.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        match self {
            Self::Claude(a) => a.watch_roots(),
            Self::Codex(a) => a.watch_roots(),
            Self::OpenCode(a) => a.watch_roots(),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.root().is_dir()
    }

    /// Directories and file globs that hold searchable transcript text.
    pub fn search_roots(&self) -> Vec<SearchRoot> {
        match self {
            Self::Claude(a) => a.search_roots(),
            Self::Codex(a) => a.search_roots(),
            Self::OpenCode(a) => a.search_roots(),
        }
    }

    /// Map a log file under this adapter's root back to its session id.
    pub fn session_id_for_file(&self, path: &Path) -> Option<String> {
        match self {
            Self::Claude(a) => a.session_id_for_file(path),
            Self::Codex(a) => a.session_id_for_file(path),
            Self::OpenCode(a) => a.session_id_for_file(path),
        }
    }

    /// Returns true if `path` lives under one of this adapter's search roots.
    pub fn owns_file(&self, path: &Path) -> bool {
        self.search_roots()
            .iter()
            .any(|root| path.starts_with(&root.dir))
    }
}

/// Parse an RFC 3339 timestamp.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn unix_ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Modification time of a file, if readable.
pub fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(|t: SystemTime| DateTime::<Utc>::from(t))
}

/// Lines of a log file, with invalid UTF-8 replaced instead of ending the read.
///
/// A corrupt line then fails JSON parsing and is skipped like any other
/// malformed record. Iteration stops at the first I/O error.
pub fn lossy_lines<R: BufRead>(mut reader: R) -> impl Iterator<Item = String> {
    let mut buf = Vec::new();
    std::iter::from_fn(move || {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                Some(String::from_utf8_lossy(&buf).into_owned())
            }
            Err(e) => {
                tracing::trace!(error = %e, "stopping at read error");
                None
            }
        }
    })
}

/// Flatten a JSON content value into plain text.
///
/// Accepts a string, or an array of strings / objects carrying `text`
/// (or a nested `content`).
pub(crate) fn collect_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                Value::Object(obj) => obj
                    .get("text")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .or_else(|| obj.get("content").map(collect_text))
                    .unwrap_or_default(),
                _ => String::new(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Accumulates what an adapter recovers from one session's records.
#[derive(Debug, Default)]
pub(crate) struct SessionDraft {
    pub session_id: Option<String>,
    pub working_directory: Option<String>,
    pub branch: Option<String>,
    pub first_prompt: Option<String>,
    pub summary_goal: Option<String>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub message_count: u32,
    pub is_sub_agent: bool,
    pub parent_session_id: Option<String>,
    pub model_provider: Option<String>,
    pub model_id: Option<String>,
    pub events: Vec<TranscriptEvent>,
}

impl SessionDraft {
    pub fn observe_timestamp(&mut self, ts: Option<DateTime<Utc>>) {
        let Some(ts) = ts else { return };
        self.first_timestamp = Some(self.first_timestamp.map_or(ts, |first| first.min(ts)));
        self.last_timestamp = Some(self.last_timestamp.map_or(ts, |last| last.max(ts)));
    }

    /// Record user text, capturing the first one as the prompt preview.
    pub fn push_user_text(&mut self, ts: Option<DateTime<Utc>>, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if self.first_prompt.is_none() {
            self.first_prompt = Some(truncate_prompt(text));
        }
        self.events
            .push(TranscriptEvent::message(EventKind::User, ts, text));
    }

    pub fn push_assistant_text(&mut self, ts: Option<DateTime<Utc>>, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.events
            .push(TranscriptEvent::message(EventKind::Assistant, ts, text));
    }

    pub fn push_tool(
        &mut self,
        ts: Option<DateTime<Utc>>,
        name: Option<String>,
        content: Option<&str>,
    ) {
        self.events.push(TranscriptEvent::tool(ts, name, content));
    }

    /// Build the session, or `None` if nothing parseable was found.
    ///
    /// `fallback_id` is used when no record names the session. Missing
    /// timestamps fall back to the file's modification time.
    pub fn finish(
        self,
        source: SessionSource,
        file_path: &Path,
        fallback_id: &str,
    ) -> Option<(Session, Vec<TranscriptEvent>)> {
        if self.events.is_empty() {
            return None;
        }

        let session_id = self
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| fallback_id.to_string());
        if session_id.is_empty() {
            return None;
        }

        let mtime = file_mtime(file_path);
        let started_at = self.first_timestamp.or(mtime)?;
        let last_activity_at = self
            .last_timestamp
            .or(mtime)
            .map_or(started_at, |last| last.max(started_at));

        let working_directory = self.working_directory.filter(|d| !d.is_empty());
        let (project_id, project_name) = match working_directory.as_deref() {
            Some(dir) => (dir.to_string(), project_name_from_path(dir)),
            None => {
                let synthetic = format!("{source}:{session_id}");
                (synthetic.clone(), synthetic)
            }
        };

        let content_chars = self.events.iter().map(TranscriptEvent::content_chars).sum();

        let session = Session {
            session_id,
            source,
            file_path: file_path.to_path_buf(),
            project_id,
            project_name,
            working_directory,
            branch: self.branch.filter(|b| !b.is_empty()),
            first_prompt: self.first_prompt,
            summary_goal: self.summary_goal.filter(|s| !s.is_empty()),
            started_at,
            last_activity_at,
            message_count: self.message_count,
            is_active: is_within_active_window(last_activity_at, Utc::now()),
            is_sub_agent: self.is_sub_agent,
            parent_session_id: self.parent_session_id,
            model_provider: self.model_provider,
            model_id: self.model_id,
            content_chars,
        };
        Some((session, self.events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_text_handles_strings_and_blocks() {
        assert_eq!(collect_text(&json!("plain")), "plain");
        assert_eq!(
            collect_text(&json!([
                {"type": "text", "text": "one"},
                {"type": "image"},
                {"type": "tool_result", "content": [{"type": "text", "text": "two"}]},
                "three"
            ])),
            "one\ntwo\nthree"
        );
        assert_eq!(collect_text(&json!(42)), "");
    }

    #[test]
    fn test_draft_without_events_is_absent() {
        let mut draft = SessionDraft::default();
        draft.observe_timestamp(parse_timestamp("2026-01-29T10:00:00Z"));
        assert!(
            draft
                .finish(SessionSource::Claude, Path::new("/nonexistent.jsonl"), "abc")
                .is_none()
        );
    }

    #[test]
    fn test_draft_without_working_directory_gets_synthetic_project() {
        let mut draft = SessionDraft::default();
        draft.observe_timestamp(parse_timestamp("2026-01-29T10:00:00Z"));
        draft.push_user_text(None, "hello");

        let (session, events) = draft
            .finish(SessionSource::Codex, Path::new("/nonexistent.jsonl"), "abc")
            .unwrap();
        assert_eq!(session.project_id, "codex:abc");
        assert_eq!(session.first_prompt.as_deref(), Some("hello"));
        assert_eq!(events.len(), 1);
        assert_eq!(session.content_chars, 5);
    }

    #[test]
    fn test_lossy_lines_continue_past_invalid_utf8() {
        let bytes: &[u8] = b"first\r\nbad \xff\xfe line\nlast";
        let lines: Vec<String> = lossy_lines(bytes).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "first");
        assert!(lines[1].starts_with("bad "));
        assert_eq!(lines[2], "last");
    }

    #[test]
    fn test_search_root_accepts_by_extension() {
        let root = SearchRoot::new(PathBuf::from("/logs"), "*.jsonl");
        assert!(root.accepts(Path::new("/logs/a/b.jsonl")));
        assert!(!root.accepts(Path::new("/logs/a/b.json")));
    }
}
