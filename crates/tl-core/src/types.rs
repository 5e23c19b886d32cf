//! Aggregate and result types produced on top of sessions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregation of sessions sharing a resolved repository root or working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    /// `owner/repo` when a remote is known, otherwise a directory name.
    pub project_name: String,
    pub repo_id: Option<String>,
    pub repo_url: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub session_count: usize,
    pub active_session_count: usize,
    pub is_active: bool,
}

/// One matching line from a content search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub file: PathBuf,
    /// 1-based line number; 0 in files-only mode.
    pub line: u64,
    /// Matched line, truncated. Empty in files-only mode.
    pub content: String,
}

/// Metadata for a single commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub hash: String,
    pub repository_root: PathBuf,
    pub repository_name: String,
    pub message: String,
    pub author: String,
    pub date: DateTime<Utc>,
    /// Repo-relative paths touched by the commit.
    pub changed_files: Vec<String>,
}

/// A session ranked as a likely author of a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMatch {
    pub session_id: String,
    pub project_name: String,
    pub score: f64,
    pub matched_files: Vec<String>,
    pub file_path: PathBuf,
}

/// Result of a commit attribution request.
///
/// Request-level failures are reported through `error` rather than as a fault.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionOutcome {
    pub commit: Option<CommitInfo>,
    pub sessions: Vec<SessionMatch>,
    pub error: Option<String>,
}

impl AttributionOutcome {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            commit: None,
            sessions: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}
