//! Codex CLI session parsing.
//!
//! ```text
//! <root>/                                   (~/.codex/sessions)
//! └── YYYY/MM/DD/
//!     └── rollout-<timestamp>-<uuid>.jsonl
//! ```
//!
//! Newer rollouts wrap every record as `{timestamp, type, payload}`; older
//! ones write the payload fields at the top level. Both are accepted.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use super::{SearchRoot, SessionDraft, collect_text, lossy_lines, parse_timestamp};
use crate::session::{Session, SessionError, SessionSource, TranscriptEvent};

const BUFFER_SIZE: usize = 64 * 1024;

/// `rollout-2026-01-05T19-04-21-019b8dd4-539f-7393-acb6-7a856d6892ca.jsonl`
static ROLLOUT_FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^rollout-\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}-([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})\.jsonl$",
    )
    .unwrap()
});

/// Extract the session id from a rollout filename, falling back to the stem.
pub fn session_id_from_filename(path: &Path) -> Option<String> {
    let filename = path.file_name()?.to_str()?;
    if let Some(caps) = ROLLOUT_FILENAME_RE.captures(filename) {
        return Some(caps[1].to_string());
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Session id of a rollout: the first `session_meta` id, else the filename.
pub fn rollout_session_id(path: &Path) -> Option<String> {
    let recorded = File::open(path).ok().and_then(|file| {
        lossy_lines(BufReader::with_capacity(BUFFER_SIZE, file))
            .filter_map(|line| parse_line(&line))
            .find_map(|record| match record {
                Record::Meta(meta, _) => non_empty(meta.id),
                _ => None,
            })
    });
    recorded.or_else(|| session_id_from_filename(path))
}

fn non_empty(id: Option<String>) -> Option<String> {
    id.filter(|id| !id.is_empty())
}

/// Outer record envelope.
#[derive(Debug, Deserialize)]
struct Line {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<String>,
    payload: Option<Item>,
}

/// Payload of a record (or the record itself for legacy rollouts).
#[derive(Debug, Default, Deserialize)]
struct Item {
    #[serde(rename = "type")]
    item_type: Option<String>,
    id: Option<String>,
    cwd: Option<String>,
    timestamp: Option<String>,
    model_provider: Option<String>,
    model: Option<String>,
    git: Option<GitInfo>,
    role: Option<String>,
    content: Option<Value>,
    name: Option<String>,
    arguments: Option<Value>,
    input: Option<Value>,
    output: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GitInfo {
    branch: Option<String>,
    commit_hash: Option<String>,
}

/// Codex CLI adapter rooted at a `sessions` directory.
#[derive(Debug, Clone)]
pub struct CodexAdapter {
    root: PathBuf,
}

impl CodexAdapter {
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `$CODEX_HOME/sessions`, else `~/.codex/sessions`.
    pub fn default_root() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os("CODEX_HOME").filter(|d| !d.is_empty()) {
            return Some(PathBuf::from(dir).join("sessions"));
        }
        dirs::home_dir().map(|home| home.join(".codex").join("sessions"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watch_roots(&self) -> Vec<PathBuf> {
        vec![self.root.clone()]
    }

    pub fn search_roots(&self) -> Vec<SearchRoot> {
        vec![SearchRoot::new(self.root.clone(), "*.jsonl")]
    }

    pub fn session_id_for_file(&self, path: &Path) -> Option<String> {
        rollout_session_id(path)
    }

    /// Recursively discover and parse every rollout under the root.
    pub fn list_sessions(&self) -> Result<Vec<Session>, SessionError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        std::fs::read_dir(&self.root).map_err(|source| SessionError::Root {
            path: self.root.clone(),
            source,
        })?;

        let files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable Codex directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| path.extension().is_some_and(|e| e == "jsonl"))
            .collect();

        let sessions = files
            .par_iter()
            .filter_map(|path| {
                let parsed = parse_rollout(path);
                if parsed.is_none() {
                    tracing::debug!(path = ?path, "skipping Codex session without content");
                }
                parsed.map(|(session, _)| session)
            })
            .collect();

        Ok(sessions)
    }

    pub fn parse_one_session(&self, path: &Path) -> Option<Session> {
        parse_rollout(path).map(|(session, _)| session)
    }

    pub fn list_transcript(&self, session: &Session) -> Vec<TranscriptEvent> {
        parse_rollout(&session.file_path)
            .map(|(_, events)| events)
            .unwrap_or_default()
    }
}

/// One rollout line, classified.
enum Record {
    Meta(Item, Option<DateTime<Utc>>),
    Context(Item),
    Response(Item, Option<DateTime<Utc>>),
}

fn parse_line(line: &str) -> Option<Record> {
    if line.trim().is_empty() {
        return None;
    }
    let envelope: Line = match serde_json::from_str(line) {
        Ok(l) => l,
        Err(e) => {
            tracing::trace!(error = %e, "skipping malformed JSON line");
            return None;
        }
    };
    let ts = envelope.timestamp.as_deref().and_then(parse_timestamp);

    match (envelope.line_type.as_deref(), envelope.payload) {
        (Some("session_meta"), Some(meta)) => Some(Record::Meta(meta, ts)),
        (Some("turn_context"), Some(context)) => Some(Record::Context(context)),
        (Some("response_item"), Some(item)) => Some(Record::Response(item, ts)),
        (_, Some(_)) => None,
        (line_type, None) => {
            // Legacy rollouts inline the payload.
            let item = serde_json::from_str::<Item>(line).ok()?;
            match line_type {
                Some("session_meta") => Some(Record::Meta(item, ts)),
                None if item.id.is_some() => Some(Record::Meta(item, ts)),
                Some(_) => Some(Record::Response(item, ts)),
                None => None,
            }
        }
    }
}

/// Parse a rollout JSONL file into a session and its transcript.
fn parse_rollout(path: &Path) -> Option<(Session, Vec<TranscriptEvent>)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "failed to open Codex session");
            return None;
        }
    };
    let reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let filename_id = session_id_from_filename(path)?;

    let mut draft = SessionDraft::default();

    for record in lossy_lines(reader).filter_map(|line| parse_line(&line)) {
        match record {
            Record::Meta(meta, ts) => apply_meta(&mut draft, meta, ts),
            Record::Context(context) => {
                if let Some(model) = context.model {
                    draft.model_id = Some(model);
                }
            }
            Record::Response(item, ts) => apply_item(&mut draft, item, ts),
        }
    }

    draft.finish(SessionSource::Codex, path, &filename_id)
}

fn apply_meta(draft: &mut SessionDraft, meta: Item, line_ts: Option<DateTime<Utc>>) {
    if draft.session_id.is_none() {
        draft.session_id = non_empty(meta.id);
    }
    if draft.working_directory.is_none() {
        draft.working_directory = meta.cwd;
    }
    if let Some(git) = meta.git {
        if git.branch.is_some() {
            draft.branch = git.branch;
        }
        if let Some(hash) = git.commit_hash {
            tracing::trace!(commit = %hash, "rollout started at commit");
        }
    }
    if meta.model_provider.is_some() {
        draft.model_provider = meta.model_provider;
    }
    let ts = meta.timestamp.as_deref().and_then(parse_timestamp).or(line_ts);
    draft.observe_timestamp(ts);
}

/// Injected context (`<environment_context>`, `<user_instructions>`, ...)
/// arrives as user messages but was not typed by the user.
fn is_injected_context(text: &str) -> bool {
    text.trim_start().starts_with('<')
}

fn apply_item(draft: &mut SessionDraft, item: Item, line_ts: Option<DateTime<Utc>>) {
    let ts = item.timestamp.as_deref().and_then(parse_timestamp).or(line_ts);

    match item.item_type.as_deref() {
        Some("message") => {
            let text = item.content.as_ref().map(collect_text).unwrap_or_default();
            match item.role.as_deref() {
                Some("user") => {
                    if is_injected_context(&text) {
                        return;
                    }
                    draft.message_count = draft.message_count.saturating_add(1);
                    draft.observe_timestamp(ts);
                    draft.push_user_text(ts, &text);
                }
                Some("assistant") => {
                    draft.message_count = draft.message_count.saturating_add(1);
                    draft.observe_timestamp(ts);
                    draft.push_assistant_text(ts, &text);
                }
                _ => {}
            }
        }
        Some("function_call" | "tool_use" | "custom_tool_call" | "local_shell_call") => {
            draft.observe_timestamp(ts);
            let args = item
                .arguments
                .or(item.input)
                .map(|v| v.as_str().map_or_else(|| v.to_string(), String::from));
            draft.push_tool(ts, item.name, args.as_deref());
        }
        Some("function_call_output" | "custom_tool_call_output") => {
            draft.observe_timestamp(ts);
            let output = item.output.map(|v| match v {
                Value::Object(ref obj) => obj
                    .get("output")
                    .map_or_else(|| v.to_string(), collect_text),
                other => collect_text(&other),
            });
            draft.push_tool(ts, None, output.as_deref());
        }
        _ => {}
    }
}
