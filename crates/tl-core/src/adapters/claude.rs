//! Claude Code session parsing.
//!
//! ```text
//! <root>/                               (~/.claude/projects)
//! └── -home-user-project/               (encoded working directory)
//!     ├── <session-id>.jsonl
//!     └── <session-id>/subagents/agent-<hash>.jsonl
//! ```

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value;

use super::{SearchRoot, SessionDraft, collect_text, lossy_lines, parse_timestamp};
use crate::session::{Session, SessionError, SessionSource, TranscriptEvent};

/// Buffer size for `BufReader` (64KB for optimal performance on large files)
const BUFFER_SIZE: usize = 64 * 1024;

const SUBAGENTS_DIR: &str = "subagents";

/// Decode a project directory name back into a working directory.
///
/// Claude Code replaces every path separator with `-`, so a directory that
/// itself contains `-` decodes into extra path segments. The encoding is not
/// reversible; this mirrors it rather than guessing.
pub fn decode_project_dir(name: &str) -> String {
    name.replace('-', "/")
}

/// Minimal struct for typed deserialization (faster than `serde_json::Value`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(rename = "type")]
    record_type: Option<String>,
    session_id: Option<String>,
    cwd: Option<String>,
    git_branch: Option<String>,
    timestamp: Option<String>,
    summary: Option<String>,
    message: Option<RecordMessage>,
}

#[derive(Debug, Deserialize)]
struct RecordMessage {
    model: Option<String>,
    content: Option<MessageContentValue>,
}

/// Message content can be a string or an array of content blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContentValue {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A content block in a message (text, `tool_use`, `tool_result`, ...).
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
    text: Option<String>,
    name: Option<String>,
    input: Option<Value>,
    content: Option<Value>,
}

/// Check if a line might contain relevant data (pre-filter before JSON parse)
fn might_be_relevant(line: &str) -> bool {
    // Also check without colon to handle JSON with whitespace like "type" : "value"
    line.contains("\"type\"") || line.contains("\"cwd\"") || line.contains("\"sessionId\"")
}

/// Parse one line into a record, skipping lines that cannot carry session data.
fn parse_record(line: &str) -> Option<Record> {
    if line.len() < 10 || !might_be_relevant(line) {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::trace!(error = %e, "skipping malformed JSON line");
            None
        }
    }
}

/// Where a session file sits in the layout.
#[derive(Debug)]
struct SessionFile {
    path: PathBuf,
    parent_session_id: Option<String>,
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}

/// Parent session id for a file under `<parent>/subagents/`.
fn subagent_parent(path: &Path) -> Option<String> {
    let subagents = path.parent()?;
    if subagents.file_name()? != SUBAGENTS_DIR {
        return None;
    }
    subagents
        .parent()?
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
}

/// Working directory encoded in the project folder that owns `path`.
fn encoded_working_directory(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let folder = relative.components().next()?.as_os_str().to_str()?;
    if relative.components().count() < 2 {
        return None;
    }
    Some(decode_project_dir(folder))
}

/// Claude Code adapter rooted at a `projects` directory.
#[derive(Debug, Clone)]
pub struct ClaudeAdapter {
    root: PathBuf,
}

impl ClaudeAdapter {
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `$CLAUDE_CONFIG_DIR/projects`, else `~/.claude/projects`.
    pub fn default_root() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os("CLAUDE_CONFIG_DIR").filter(|d| !d.is_empty()) {
            return Some(PathBuf::from(dir).join("projects"));
        }
        dirs::home_dir().map(|home| home.join(".claude").join("projects"))
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

    /// Scan the projects directory and parse every session.
    pub fn list_sessions(&self) -> Result<Vec<Session>, SessionError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let session_files = self.discover()?;

        let sessions = session_files
            .par_iter()
            .filter_map(|sf| {
                let parsed = self.parse_file(&sf.path, sf.parent_session_id.as_deref());
                if parsed.is_none() {
                    tracing::debug!(path = ?sf.path, "skipping Claude session without content");
                }
                parsed.map(|(session, _)| session)
            })
            .collect();

        Ok(sessions)
    }

    fn discover(&self) -> Result<Vec<SessionFile>, SessionError> {
        let entries = fs::read_dir(&self.root).map_err(|source| SessionError::Root {
            path: self.root.clone(),
            source,
        })?;

        let mut session_files = Vec::new();
        for project_entry in entries.flatten() {
            let project_path = project_entry.path();
            if !project_path.is_dir() {
                continue;
            }

            let Ok(session_entries) = fs::read_dir(&project_path) else {
                tracing::warn!(path = ?project_path, "failed to read Claude project directory");
                continue;
            };

            for session_entry in session_entries.flatten() {
                let session_path = session_entry.path();

                if session_path.is_file() && session_path.extension().is_some_and(|e| e == "jsonl") {
                    session_files.push(SessionFile {
                        path: session_path,
                        parent_session_id: None,
                    });
                } else if session_path.is_dir() {
                    let subagents_dir = session_path.join(SUBAGENTS_DIR);
                    let Ok(subagent_entries) = fs::read_dir(&subagents_dir) else {
                        continue;
                    };
                    let parent_session_id = session_path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(String::from);

                    for subagent_entry in subagent_entries.flatten() {
                        let subagent_path = subagent_entry.path();
                        if subagent_path.is_file()
                            && subagent_path.extension().is_some_and(|e| e == "jsonl")
                        {
                            session_files.push(SessionFile {
                                path: subagent_path,
                                parent_session_id: parent_session_id.clone(),
                            });
                        }
                    }
                }
            }
        }

        Ok(session_files)
    }

    pub fn parse_one_session(&self, path: &Path) -> Option<Session> {
        let parent = subagent_parent(path);
        self.parse_file(path, parent.as_deref())
            .map(|(session, _)| session)
    }

    pub fn list_transcript(&self, session: &Session) -> Vec<TranscriptEvent> {
        self.parse_file(&session.file_path, session.parent_session_id.as_deref())
            .map(|(_, events)| events)
            .unwrap_or_default()
    }

    /// Session id for a log file: the first `sessionId` record, else the stem.
    ///
    /// Sub-agent logs repeat their parent's `sessionId`, so they are always
    /// identified by file stem.
    pub fn session_id_for_file(&self, path: &Path) -> Option<String> {
        let stem = file_stem(path);
        if subagent_parent(path).is_some() || stem.starts_with("agent-") {
            return Some(stem).filter(|s| !s.is_empty());
        }

        let recorded = File::open(path).ok().and_then(|file| {
            lossy_lines(BufReader::with_capacity(BUFFER_SIZE, file))
                .filter_map(|line| parse_record(&line))
                .find_map(|record| record.session_id.filter(|id| !id.is_empty()))
        });
        recorded.or(Some(stem)).filter(|s| !s.is_empty())
    }

    /// Parse a session JSONL file into a session and its transcript.
    fn parse_file(
        &self,
        path: &Path,
        parent_session_id: Option<&str>,
    ) -> Option<(Session, Vec<TranscriptEvent>)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "failed to open Claude session");
                return None;
            }
        };
        let reader = BufReader::with_capacity(BUFFER_SIZE, file);

        let stem = file_stem(path);
        let is_sub_agent = parent_session_id.is_some() || stem.starts_with("agent-");

        let mut draft = SessionDraft {
            is_sub_agent,
            parent_session_id: parent_session_id.map(String::from),
            ..SessionDraft::default()
        };

        for line in lossy_lines(reader) {
            if let Some(record) = parse_record(&line) {
                apply_record(&mut draft, record, is_sub_agent);
            }
        }

        if draft.working_directory.is_none() {
            draft.working_directory = encoded_working_directory(&self.root, path);
        }

        draft.finish(SessionSource::Claude, path, &stem)
    }
}

fn apply_record(draft: &mut SessionDraft, record: Record, is_sub_agent: bool) {
    // Sub-agent logs carry the parent's id; the file stem identifies them.
    if !is_sub_agent && draft.session_id.is_none() {
        draft.session_id = record.session_id.filter(|id| !id.is_empty());
    }
    if draft.working_directory.is_none() {
        draft.working_directory = record.cwd.filter(|cwd| !cwd.is_empty());
    }
    if let Some(branch) = record.git_branch.filter(|b| !b.is_empty()) {
        draft.branch = Some(branch);
    }

    let ts = record.timestamp.as_deref().and_then(parse_timestamp);

    match record.record_type.as_deref() {
        Some("summary") => {
            if record.summary.is_some() {
                draft.summary_goal = record.summary;
            }
        }
        Some("user") => {
            draft.message_count = draft.message_count.saturating_add(1);
            draft.observe_timestamp(ts);
            match record.message.and_then(|m| m.content) {
                Some(MessageContentValue::Text(text)) => draft.push_user_text(ts, &text),
                Some(MessageContentValue::Blocks(blocks)) => {
                    for block in blocks {
                        match block.block_type.as_deref() {
                            Some("text") => {
                                draft.push_user_text(ts, block.text.as_deref().unwrap_or(""));
                            }
                            Some("tool_result") => {
                                let output = block.content.as_ref().map(collect_text);
                                draft.push_tool(ts, None, output.as_deref());
                            }
                            _ => {}
                        }
                    }
                }
                None => {}
            }
        }
        Some("assistant") => {
            draft.message_count = draft.message_count.saturating_add(1);
            draft.observe_timestamp(ts);
            let Some(message) = record.message else {
                return;
            };
            if let Some(model) = message.model.filter(|m| !m.starts_with('<')) {
                draft.model_provider = Some("anthropic".to_string());
                draft.model_id = Some(model);
            }
            match message.content {
                Some(MessageContentValue::Text(text)) => draft.push_assistant_text(ts, &text),
                Some(MessageContentValue::Blocks(blocks)) => {
                    for block in blocks {
                        match block.block_type.as_deref() {
                            Some("text") => {
                                draft.push_assistant_text(ts, block.text.as_deref().unwrap_or(""));
                            }
                            Some("tool_use") => {
                                let input = block.input.as_ref().map(Value::to_string);
                                draft.push_tool(ts, block.name, input.as_deref());
                            }
                            _ => {}
                        }
                    }
                }
                None => {}
            }
        }
        _ => {}
    }
}
