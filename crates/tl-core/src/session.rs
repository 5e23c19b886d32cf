//! Normalized session model shared by every source adapter.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Window within which a session counts as active (seconds).
pub const ACTIVE_WINDOW_SECS: i64 = 5 * 60;

/// Maximum length of the first-prompt preview (characters).
pub(crate) const MAX_PROMPT_CHARS: usize = 500;

/// Maximum length of a single transcript event's content (characters).
pub(crate) const MAX_EVENT_CHARS: usize = 2000;

/// Source tool that produced a session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSource {
    Claude,
    Codex,
    #[serde(rename = "opencode")]
    OpenCode,
}

impl SessionSource {
    pub const ALL: [Self; 3] = [Self::Claude, Self::Codex, Self::OpenCode];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::OpenCode => "opencode",
        }
    }
}

impl std::fmt::Display for SessionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "opencode" => Ok(Self::OpenCode),
            _ => Err(format!("invalid session source: {s}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read storage root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One continuous interaction with one assistant tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub source: SessionSource,
    /// Log file that owns this session.
    pub file_path: PathBuf,
    pub project_id: String,
    pub project_name: String,
    pub working_directory: Option<String>,
    pub branch: Option<String>,
    /// First user prompt, truncated to a preview.
    pub first_prompt: Option<String>,
    pub summary_goal: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: u32,
    pub is_active: bool,
    pub is_sub_agent: bool,
    pub parent_session_id: Option<String>,
    pub model_provider: Option<String>,
    pub model_id: Option<String>,
    /// Total characters of transcript content.
    pub content_chars: usize,
}

impl Session {
    /// Recompute `is_active` against the given instant.
    pub fn refresh_activity(&mut self, now: DateTime<Utc>) {
        self.is_active = is_within_active_window(self.last_activity_at, now);
    }
}

/// Returns true if `at` lies within [`ACTIVE_WINDOW_SECS`] of `now`.
pub fn is_within_active_window(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    is_within_window(at, now, Duration::seconds(ACTIVE_WINDOW_SECS))
}

/// Returns true if `at` lies within `window` of `now`, in either direction.
pub fn is_within_window(at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    (now - at).abs() <= window
}

/// Kind of transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    User,
    Assistant,
    Tool,
}

/// One turn inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl TranscriptEvent {
    pub(crate) fn message(
        kind: EventKind,
        timestamp: Option<DateTime<Utc>>,
        content: &str,
    ) -> Self {
        Self {
            kind,
            timestamp,
            content: Some(truncate_chars(content, MAX_EVENT_CHARS)),
            tool_name: None,
        }
    }

    pub(crate) fn tool(
        timestamp: Option<DateTime<Utc>>,
        tool_name: Option<String>,
        content: Option<&str>,
    ) -> Self {
        Self {
            kind: EventKind::Tool,
            timestamp,
            content: content
                .filter(|c| !c.is_empty())
                .map(|c| truncate_chars(c, MAX_EVENT_CHARS)),
            tool_name,
        }
    }

    /// Character count of this event's content.
    pub fn content_chars(&self) -> usize {
        self.content.as_deref().map_or(0, |c| c.chars().count())
    }
}

/// Filters accepted by `list_sessions`.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub since: Option<DateTime<Utc>>,
    pub project_name_contains: Option<String>,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        if self.since.is_some_and(|since| session.last_activity_at < since) {
            return false;
        }
        match self.project_name_contains.as_deref() {
            Some(needle) if !needle.is_empty() => session
                .project_name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

/// Truncate a string to at most `max` characters, adding "..." if truncated.
pub fn truncate_chars(content: &str, max: usize) -> String {
    match content.char_indices().nth(max) {
        None => content.to_string(),
        Some((end, _)) => format!("{}...", &content[..end]),
    }
}

/// Truncate a prompt to the preview budget.
pub(crate) fn truncate_prompt(content: &str) -> String {
    truncate_chars(content.trim(), MAX_PROMPT_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(last_activity_at: DateTime<Utc>, project_name: &str) -> Session {
        Session {
            session_id: "s1".to_string(),
            source: SessionSource::Claude,
            file_path: PathBuf::from("/tmp/s1.jsonl"),
            project_id: "/tmp".to_string(),
            project_name: project_name.to_string(),
            working_directory: None,
            branch: None,
            first_prompt: None,
            summary_goal: None,
            started_at: last_activity_at,
            last_activity_at,
            message_count: 0,
            is_active: false,
            is_sub_agent: false,
            parent_session_id: None,
            model_provider: None,
            model_id: None,
            content_chars: 0,
        }
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        let text = "é".repeat(10);
        let truncated = truncate_chars(&text, 4);
        assert_eq!(truncated, "éééé...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_source_round_trips_through_str() {
        for source in SessionSource::ALL {
            assert_eq!(source.as_str().parse::<SessionSource>().unwrap(), source);
        }
        assert!("cursor".parse::<SessionSource>().is_err());
    }

    #[test]
    fn test_active_window_boundary() {
        let now = Utc::now();
        assert!(is_within_active_window(now - Duration::minutes(4), now));
        assert!(!is_within_active_window(now - Duration::minutes(6), now));
    }

    #[test]
    fn test_filter_since_and_project_name() {
        let now = Utc::now();
        let session = session_at(now - Duration::hours(2), "Owner/Time-Tracker");

        let filter = SessionFilter {
            since: Some(now - Duration::hours(1)),
            project_name_contains: None,
        };
        assert!(!filter.matches(&session));

        let filter = SessionFilter {
            since: Some(now - Duration::hours(3)),
            project_name_contains: Some("time-tr".to_string()),
        };
        assert!(filter.matches(&session));

        let filter = SessionFilter {
            since: None,
            project_name_contains: Some("dotfiles".to_string()),
        };
        assert!(!filter.matches(&session));
    }

    #[test]
    fn test_event_serializes_kind_as_type() {
        let event = TranscriptEvent::tool(None, Some("Read".to_string()), None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool");
        assert_eq!(json["toolName"], "Read");
        assert!(json.get("content").is_none());
    }
}
