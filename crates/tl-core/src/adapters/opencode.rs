//! `OpenCode` session parsing.
//!
//! A session is split across parallel trees under the storage directory:
//!
//! ```text
//! <storage>/
//! ├── project/<projectHash>.json               {id, worktree}
//! ├── session/<projectHash>/<sessionId>.json   {id, title, parentID, time}
//! ├── message/<sessionId>/<messageId>.json     {role, content, model, time}
//! └── part/<messageId>/<partId>.json           {type, text, tool}
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value;

use super::{SearchRoot, SessionDraft, collect_text, unix_ms_to_datetime};
use crate::session::{Session, SessionError, SessionSource, TranscriptEvent};

/// Number of most recent messages scanned for model identity.
const MODEL_SCAN_DEPTH: usize = 5;

/// `OpenCode` project metadata.
#[derive(Debug, Deserialize)]
struct OpenCodeProject {
    id: String,
    worktree: Option<String>,
}

/// `OpenCode` session metadata.
#[derive(Debug, Deserialize)]
struct OpenCodeSession {
    id: String,
    title: Option<String>,
    directory: Option<String>,
    #[serde(rename = "parentID")]
    parent_id: Option<String>,
    time: Option<OpenCodeTime>,
}

#[derive(Debug, Deserialize)]
struct OpenCodeTime {
    created: Option<i64>,
    updated: Option<i64>,
}

/// `OpenCode` message role.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct OpenCodeModel {
    #[serde(rename = "providerID")]
    provider_id: Option<String>,
    #[serde(rename = "modelID")]
    model_id: Option<String>,
}

/// `OpenCode` message metadata.
#[derive(Debug, Deserialize)]
struct OpenCodeMessage {
    #[serde(default)]
    id: String,
    role: MessageRole,
    content: Option<Value>,
    model: Option<OpenCodeModel>,
    #[serde(rename = "providerID")]
    provider_id: Option<String>,
    #[serde(rename = "modelID")]
    model_id: Option<String>,
    time: Option<OpenCodeTime>,
}

impl OpenCodeMessage {
    fn created(&self) -> Option<i64> {
        self.time.as_ref().and_then(|t| t.created)
    }

    fn model(&self) -> Option<(Option<String>, String)> {
        let nested = self.model.as_ref();
        let model_id = nested
            .and_then(|m| m.model_id.clone())
            .or_else(|| self.model_id.clone())?;
        let provider = nested
            .and_then(|m| m.provider_id.clone())
            .or_else(|| self.provider_id.clone());
        Some((provider, model_id))
    }
}

/// `OpenCode` message part type.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum PartType {
    Text,
    Tool,
    #[serde(other)]
    Other,
}

/// `OpenCode` message part.
#[derive(Debug, Deserialize)]
struct OpenCodePart {
    /// Part ID -- used for deterministic ordering since `read_json_files`
    /// returns entries in filesystem-dependent order.
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    part_type: PartType,
    text: Option<String>,
    tool: Option<String>,
}

/// Read and deserialize all JSON files from a directory.
fn read_json_files<T: serde::de::DeserializeOwned>(dir: &Path) -> Vec<T> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .filter_map(|e| read_json_file(&e.path()))
        .collect()
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let data = match fs::read_to_string(path) {
        Ok(d) => d,
        Err(err) => {
            tracing::warn!(path = ?path, error = %err, "failed to read JSON file");
            return None;
        }
    };
    match serde_json::from_str(&data) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(path = ?path, error = %err, "failed to parse JSON file");
            None
        }
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
}

/// Cross-tree joins for one listing pass.
///
/// Built once, consulted per session file, then dropped.
#[derive(Debug, Default)]
pub(crate) struct OpenCodeLookup {
    /// Project hash → worktree.
    worktrees: HashMap<String, String>,
    /// Session id → message directory.
    message_dirs: HashMap<String, PathBuf>,
}

impl OpenCodeLookup {
    /// Index every project and message directory under `storage`.
    fn build(storage: &Path) -> Self {
        let worktrees = read_json_files::<OpenCodeProject>(&storage.join("project"))
            .into_iter()
            .filter_map(|p| p.worktree.map(|w| (p.id, w)))
            .collect();

        let message_dirs = fs::read_dir(storage.join("message"))
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .filter_map(|p| dir_name(&p).map(|name| (name, p)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            worktrees,
            message_dirs,
        }
    }

    /// Lookup covering only the given session file.
    fn for_session_file(storage: &Path, session_file: &Path) -> Self {
        let mut lookup = Self::default();

        if let Some(hash) = session_file.parent().and_then(dir_name) {
            let project_file = storage.join("project").join(format!("{hash}.json"));
            if let Some(project) = read_json_file::<OpenCodeProject>(&project_file) {
                if let Some(worktree) = project.worktree {
                    lookup.worktrees.insert(project.id, worktree);
                }
            }
        }

        if let Some(session_id) = session_file.file_stem().and_then(|s| s.to_str()) {
            let dir = storage.join("message").join(session_id);
            if dir.is_dir() {
                lookup.message_dirs.insert(session_id.to_string(), dir);
            }
        }

        lookup
    }

    fn worktree(&self, project_hash: &str) -> Option<&str> {
        self.worktrees
            .get(project_hash)
            .map(String::as_str)
            // The global project (no repository) reports "/" as its worktree.
            .filter(|w| *w != "/")
    }

    fn message_dir(&self, session_id: &str) -> Option<&Path> {
        self.message_dirs.get(session_id).map(PathBuf::as_path)
    }
}

/// `OpenCode` adapter rooted at a `storage` directory.
#[derive(Debug, Clone)]
pub struct OpenCodeAdapter {
    storage: PathBuf,
}

impl OpenCodeAdapter {
    pub const fn new(storage: PathBuf) -> Self {
        Self { storage }
    }

    /// `$XDG_DATA_HOME/opencode/storage` (platform data directory).
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("opencode").join("storage"))
    }

    pub fn root(&self) -> &Path {
        &self.storage
    }

    pub fn watch_roots(&self) -> Vec<PathBuf> {
        vec![self.storage.join("session"), self.storage.join("message")]
    }

    pub fn search_roots(&self) -> Vec<SearchRoot> {
        vec![
            SearchRoot::new(self.storage.join("message"), "*.json"),
            SearchRoot::new(self.storage.join("part"), "*.json"),
        ]
    }

    /// Scan the storage directory for sessions.
    pub fn list_sessions(&self) -> Result<Vec<Session>, SessionError> {
        let session_dir = self.storage.join("session");
        if !session_dir.exists() {
            return Ok(Vec::new());
        }

        let project_entries = fs::read_dir(&session_dir).map_err(|source| SessionError::Root {
            path: session_dir.clone(),
            source,
        })?;

        let mut session_files = Vec::new();
        for project_entry in project_entries.flatten() {
            let project_path = project_entry.path();
            if !project_path.is_dir() {
                continue;
            }
            let Ok(session_entries) = fs::read_dir(&project_path) else {
                tracing::warn!(path = ?project_path, "failed to read OpenCode project sessions");
                continue;
            };
            for session_entry in session_entries.flatten() {
                let session_path = session_entry.path();
                if session_path.extension().is_some_and(|e| e == "json") {
                    session_files.push(session_path);
                }
            }
        }

        let lookup = OpenCodeLookup::build(&self.storage);

        let sessions = session_files
            .par_iter()
            .filter_map(|path| {
                let parsed = self.parse_session(&lookup, path);
                if parsed.is_none() {
                    tracing::debug!(path = ?path, "skipping OpenCode session without content");
                }
                parsed.map(|(session, _)| session)
            })
            .collect();

        Ok(sessions)
    }

    pub fn parse_one_session(&self, path: &Path) -> Option<Session> {
        let lookup = OpenCodeLookup::for_session_file(&self.storage, path);
        self.parse_session(&lookup, path)
            .map(|(session, _)| session)
    }

    pub fn list_transcript(&self, session: &Session) -> Vec<TranscriptEvent> {
        let lookup = OpenCodeLookup::for_session_file(&self.storage, &session.file_path);
        self.parse_session(&lookup, &session.file_path)
            .map(|(_, events)| events)
            .unwrap_or_default()
    }

    /// Session id for a session, message or part file.
    pub fn session_id_for_file(&self, path: &Path) -> Option<String> {
        let parent = path.parent()?;
        let tree = parent.parent().and_then(dir_name);
        match tree.as_deref() {
            Some("message") => dir_name(parent),
            Some("session") => path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(String::from),
            Some("part") => {
                #[derive(Deserialize)]
                struct PartOwner {
                    #[serde(rename = "sessionID")]
                    session_id: Option<String>,
                }
                read_json_file::<PartOwner>(path).and_then(|p| p.session_id)
            }
            _ => None,
        }
    }

    /// Parse a session file, joining its project and messages.
    fn parse_session(
        &self,
        lookup: &OpenCodeLookup,
        session_file: &Path,
    ) -> Option<(Session, Vec<TranscriptEvent>)> {
        let session: OpenCodeSession = read_json_file(session_file)?;
        if session.id.is_empty() {
            tracing::warn!(path = ?session_file, "skipping OpenCode session with empty id");
            return None;
        }

        let project_hash = session_file.parent().and_then(dir_name);
        let working_directory = project_hash
            .as_deref()
            .and_then(|hash| lookup.worktree(hash))
            .map(String::from)
            .or_else(|| session.directory.clone().filter(|d| !d.is_empty()));

        let mut messages: Vec<OpenCodeMessage> = lookup
            .message_dir(&session.id)
            .map(read_json_files)
            .unwrap_or_default();
        messages.sort_by(|a, b| a.created().cmp(&b.created()).then_with(|| a.id.cmp(&b.id)));

        let mut draft = SessionDraft {
            session_id: Some(session.id.clone()),
            working_directory,
            summary_goal: session.title.clone(),
            is_sub_agent: session.parent_id.is_some(),
            parent_session_id: session.parent_id.clone(),
            ..SessionDraft::default()
        };

        if let Some(time) = &session.time {
            draft.observe_timestamp(time.created.and_then(unix_ms_to_datetime));
            draft.observe_timestamp(time.updated.and_then(unix_ms_to_datetime));
        }

        for msg in &messages {
            let ts = msg.created().and_then(unix_ms_to_datetime);
            if msg.role == MessageRole::Other {
                continue;
            }
            draft.message_count = draft.message_count.saturating_add(1);
            draft.observe_timestamp(ts);

            let mut parts: Vec<OpenCodePart> =
                read_json_files(&self.storage.join("part").join(&msg.id));
            // Sort by ID for deterministic ordering (fs::read_dir order is platform-dependent)
            parts.sort_by(|a, b| a.id.cmp(&b.id));

            let text = msg
                .content
                .as_ref()
                .map(collect_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| {
                    parts
                        .iter()
                        .filter(|p| p.part_type == PartType::Text)
                        .filter_map(|p| p.text.as_deref())
                        .collect::<Vec<_>>()
                        .join("\n")
                });

            match msg.role {
                MessageRole::User => draft.push_user_text(ts, &text),
                MessageRole::Assistant => draft.push_assistant_text(ts, &text),
                MessageRole::Other => {}
            }

            for part in parts.iter().filter(|p| p.part_type == PartType::Tool) {
                draft.push_tool(ts, part.tool.clone(), None);
            }
        }

        // Model identity lives on messages, not on the session file.
        if let Some((provider, model_id)) = messages
            .iter()
            .rev()
            .take(MODEL_SCAN_DEPTH)
            .find_map(OpenCodeMessage::model)
        {
            draft.model_provider = provider;
            draft.model_id = Some(model_id);
        }

        draft.finish(SessionSource::OpenCode, session_file, &session.id)
    }
}
