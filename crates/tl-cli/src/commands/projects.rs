//! Projects command: sessions aggregated by repository.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tl_core::{GitRootResolver, Project};

use super::build_index;
use super::util::{fit, format_timestamp};
use crate::Config;

/// Format projects for human-readable output.
pub fn format_projects(projects: &[Project]) -> String {
    let mut output = String::new();

    if projects.is_empty() {
        writeln!(output, "No projects found.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<24}  {:>8}  {:>6}  {:<16}  Repository",
        "Project", "Sessions", "Active", "Last active"
    )
    .unwrap();
    for project in projects {
        let line = format!(
            "{}  {:>8}  {:>6}  {:<16}  {}",
            fit(&project.project_name, 24),
            project.session_count,
            project.active_session_count,
            format_timestamp(project.last_activity_at),
            project.repo_url.as_deref().unwrap_or_default()
        );
        writeln!(output, "{}", line.trim_end()).unwrap();
    }
    output
}

pub fn run<W: Write>(writer: &mut W, json: bool, config: &Config) -> Result<()> {
    let index = build_index(config, Arc::new(GitRootResolver::default()));

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&index.projects)?)?;
    } else {
        write!(writer, "{}", format_projects(&index.projects))?;
    }
    Ok(())
}
