//! Attribute command: rank sessions against a commit.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use tl_core::{AttributionOutcome, GitRootResolver};
use tl_search::{CommitAttributor, ContentSearcher, GitClient};

use super::{build_index, runtime};
use crate::Config;

#[derive(Debug, Args)]
pub struct AttributeArgs {
    /// Commit hash (7-40 hex characters).
    pub hash: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Format an attribution outcome for human-readable output.
pub fn format_outcome(outcome: &AttributionOutcome) -> String {
    let mut output = String::new();

    if let Some(commit) = &outcome.commit {
        let short: String = commit.hash.chars().take(12).collect();
        writeln!(output, "{short} {}", commit.message).unwrap();
        writeln!(
            output,
            "{} | {} | {}",
            commit.repository_name,
            commit.author,
            commit.date.format("%Y-%m-%d %H:%M")
        )
        .unwrap();
        writeln!(output, "{} changed files", commit.changed_files.len()).unwrap();
        writeln!(output).unwrap();
    }

    if let Some(error) = &outcome.error {
        writeln!(output, "Error: {error}").unwrap();
        return output;
    }

    if outcome.sessions.is_empty() {
        writeln!(output, "No sessions mention the changed files.").unwrap();
        return output;
    }

    for session in &outcome.sessions {
        writeln!(
            output,
            "{:>4.0}%  {}  {}  ({} files)",
            session.score * 100.0,
            session.session_id,
            session.project_name,
            session.matched_files.len()
        )
        .unwrap();
    }
    output
}

pub fn run<W: Write>(writer: &mut W, args: &AttributeArgs, config: &Config) -> Result<()> {
    let adapters = config.adapters();
    let resolver = Arc::new(GitRootResolver::default());
    let index = build_index(config, Arc::clone(&resolver));
    let searcher = ContentSearcher::new(adapters, config.search.clone());
    let attributor = CommitAttributor::new(
        GitClient::new(config.git.clone()),
        Arc::new(searcher),
        resolver,
    );

    let outcome = runtime()?.block_on(attributor.attribute(&args.hash, &index));

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&outcome)?)?;
        return Ok(());
    }

    if let (None, Some(error)) = (&outcome.commit, &outcome.error) {
        bail!("{error}");
    }
    write!(writer, "{}", format_outcome(&outcome))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use insta::assert_snapshot;
    use std::path::PathBuf;
    use tl_core::{CommitInfo, SessionMatch};

    fn commit() -> CommitInfo {
        CommitInfo {
            hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
            repository_root: PathBuf::from("/src/app"),
            repository_name: "owner/app".to_string(),
            message: "Rework search fallback".to_string(),
            author: "Ada".to_string(),
            date: DateTime::parse_from_rfc3339("2026-01-29T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            changed_files: vec!["src/search.rs".to_string(), "src/lib.rs".to_string()],
        }
    }

    #[test]
    fn outcome_lists_ranked_sessions() {
        let outcome = AttributionOutcome {
            commit: Some(commit()),
            sessions: vec![
                SessionMatch {
                    session_id: "s1".to_string(),
                    project_name: "owner/app".to_string(),
                    score: 1.0,
                    matched_files: vec!["src/search.rs".to_string(), "src/lib.rs".to_string()],
                    file_path: PathBuf::from("/logs/s1.jsonl"),
                },
                SessionMatch {
                    session_id: "s2".to_string(),
                    project_name: "owner/app".to_string(),
                    score: 0.5,
                    matched_files: vec!["src/lib.rs".to_string()],
                    file_path: PathBuf::from("/logs/s2.jsonl"),
                },
            ],
            error: None,
        };

        assert_snapshot!(format_outcome(&outcome), @r"
        0123456789ab Rework search fallback
        owner/app | Ada | 2026-01-29 10:00
        2 changed files

         100%  s1  owner/app  (2 files)
          50%  s2  owner/app  (1 files)
        ");
    }

    #[test]
    fn outcome_without_matches_says_so() {
        let outcome = AttributionOutcome {
            commit: Some(commit()),
            ..AttributionOutcome::default()
        };

        assert_snapshot!(format_outcome(&outcome), @r"
        0123456789ab Rework search fallback
        owner/app | Ada | 2026-01-29 10:00
        2 changed files

        No sessions mention the changed files.
        ");
    }
}
