//! Sessions command: the merged session index as a listing.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tl_core::{GitRootResolver, Session, SessionFilter};

use super::build_index;
use super::util::{fit, format_timestamp, one_line, parse_datetime};
use crate::Config;

#[derive(Debug, Args)]
pub struct SessionsArgs {
    /// Only sessions active since this time (ISO 8601 or e.g. "2 days ago").
    #[arg(long)]
    pub since: Option<String>,

    /// Only sessions whose project name contains this text.
    #[arg(long)]
    pub project: Option<String>,

    /// Maximum number of sessions to show.
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SessionsArgs {
    fn filter(&self) -> Result<SessionFilter> {
        Ok(SessionFilter {
            since: self.since.as_deref().map(parse_datetime).transpose()?,
            project_name_contains: self.project.clone(),
        })
    }
}

/// Format sessions for human-readable output.
pub fn format_sessions(sessions: &[&Session]) -> String {
    let mut output = String::new();

    if sessions.is_empty() {
        writeln!(output, "No sessions found.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<16}  {:<8}  {:<20}  {:>5}  {:<6}  Prompt",
        "Last active", "Source", "Project", "Msgs", "Active"
    )
    .unwrap();
    for session in sessions {
        let active = if session.is_active { "yes" } else { "" };
        let prompt = session
            .summary_goal
            .as_deref()
            .or(session.first_prompt.as_deref())
            .map(one_line)
            .unwrap_or_default();
        writeln!(
            output,
            "{:<16}  {:<8}  {}  {:>5}  {active:<6}  {}",
            format_timestamp(session.last_activity_at),
            session.source.as_str(),
            fit(&session.project_name, 20),
            session.message_count,
            fit(&prompt, 40).trim_end()
        )
        .unwrap();
    }
    output
}

pub fn run<W: Write>(writer: &mut W, args: &SessionsArgs, config: &Config) -> Result<()> {
    let filter = args.filter()?;
    let index = build_index(config, Arc::new(GitRootResolver::default()));
    let sessions: Vec<&Session> = index.filter(&filter).take(args.limit).collect();

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&sessions)?)?;
    } else {
        write!(writer, "{}", format_sessions(&sessions))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use insta::assert_snapshot;
    use std::path::PathBuf;
    use tl_core::SessionSource;

    fn session(id: &str, project: &str, prompt: &str, at: &str, active: bool) -> Session {
        let at = DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc);
        Session {
            session_id: id.to_string(),
            source: SessionSource::Codex,
            file_path: PathBuf::from(format!("/logs/{id}.jsonl")),
            project_id: format!("/src/{project}"),
            project_name: project.to_string(),
            working_directory: Some(format!("/src/{project}")),
            branch: None,
            first_prompt: Some(prompt.to_string()),
            summary_goal: None,
            started_at: at,
            last_activity_at: at,
            message_count: 12,
            is_active: active,
            is_sub_agent: false,
            parent_session_id: None,
            model_provider: None,
            model_id: None,
            content_chars: 500,
        }
    }

    #[test]
    fn sessions_listing_flags_active_sessions() {
        let live = session("a", "tracelink", "wire up\nthe search", "2026-01-29T11:58:00Z", true);
        let old = session(
            "b",
            "a-project-with-a-long-name",
            "explain the indexer",
            "2026-01-28T09:00:00Z",
            false,
        );

        let output = format_sessions(&[&live, &old]);
        assert_snapshot!(output, @r"
        Last active       Source    Project                Msgs  Active  Prompt
        2026-01-29 11:58  codex     tracelink                12  yes     wire up the search
        2026-01-28 09:00  codex     a-project-with-a-...     12          explain the indexer
        ");
    }

    #[test]
    fn empty_listing_has_message() {
        assert_snapshot!(format_sessions(&[]), @"No sessions found.");
    }
}
