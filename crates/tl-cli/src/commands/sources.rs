//! Sources command: where each tool's logs live and whether they exist.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tl_core::{SessionSource, SourceAdapter};

use crate::Config;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source: SessionSource,
    pub root: PathBuf,
    pub installed: bool,
    pub watch_roots: Vec<PathBuf>,
}

impl From<&SourceAdapter> for SourceStatus {
    fn from(adapter: &SourceAdapter) -> Self {
        Self {
            source: adapter.source(),
            root: adapter.root().to_path_buf(),
            installed: adapter.is_installed(),
            watch_roots: adapter.watch_roots(),
        }
    }
}

pub fn format_sources(statuses: &[SourceStatus]) -> String {
    let mut output = String::new();
    writeln!(output, "SOURCES").unwrap();
    for status in statuses {
        let state = if status.installed { "installed" } else { "missing" };
        writeln!(
            output,
            "{:<9} {:<10} {}",
            status.source.as_str(),
            state,
            status.root.display()
        )
        .unwrap();
    }
    output
}

pub fn run<W: Write>(writer: &mut W, json: bool, config: &Config) -> Result<()> {
    let statuses: Vec<SourceStatus> = config.adapters().iter().map(SourceStatus::from).collect();

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&statuses)?)?;
    } else {
        write!(writer, "{}", format_sources(&statuses))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourcesConfig;
    use insta::assert_snapshot;

    #[test]
    fn sources_command_reports_installed_roots() {
        let temp = tempfile::tempdir().unwrap();
        let claude = temp.path().join("claude");
        std::fs::create_dir_all(&claude).unwrap();

        let config = Config {
            sources: SourcesConfig {
                claude: Some(claude),
                codex: Some(temp.path().join("codex")),
                opencode: Some(temp.path().join("opencode")),
            },
            ..Config::default()
        };

        let mut output = Vec::new();
        run(&mut output, false, &config).unwrap();
        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&temp.path().display().to_string(), "[TEMP]");

        assert_snapshot!(output, @r"
        SOURCES
        claude    installed  [TEMP]/claude
        codex     missing    [TEMP]/codex
        opencode  missing    [TEMP]/opencode
        ");
    }
}
