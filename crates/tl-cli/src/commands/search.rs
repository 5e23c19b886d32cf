//! Search command: full-text search over every transcript.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use tl_core::SearchMatch;
use tl_search::{ContentSearcher, SearchOptions};

use super::runtime;
use crate::Config;

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Pattern to search for (case-insensitive regex; invalid regexes match literally).
    pub pattern: String,

    /// Maximum number of matches to return.
    #[arg(long, default_value_t = 100)]
    pub max_results: usize,

    /// Only list matching files.
    #[arg(long)]
    pub files_only: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Format matches as `file:line: content`, or bare paths in files-only mode.
pub fn format_matches(matches: &[SearchMatch], files_only: bool) -> String {
    let mut output = String::new();
    for m in matches {
        if files_only {
            writeln!(output, "{}", m.file.display()).unwrap();
        } else {
            writeln!(output, "{}:{}: {}", m.file.display(), m.line, m.content).unwrap();
        }
    }
    output
}

pub fn run<W: Write>(writer: &mut W, args: &SearchArgs, config: &Config) -> Result<()> {
    let searcher = ContentSearcher::new(config.adapters(), config.search.clone());
    let options = SearchOptions {
        max_results: args.max_results,
        files_only: args.files_only,
    };
    let matches = runtime()?
        .block_on(searcher.search(&args.pattern, &options))
        .with_context(|| format!("failed to search for {:?}", args.pattern))?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&matches)?)?;
    } else {
        write!(writer, "{}", format_matches(&matches, args.files_only))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourcesConfig;
    use insta::assert_snapshot;
    use std::fs;
    use std::path::PathBuf;
    use tl_search::SearchConfig;

    #[test]
    fn format_matches_prints_locations() {
        let matches = vec![
            SearchMatch {
                file: PathBuf::from("/logs/a.jsonl"),
                line: 3,
                content: "some foo here".to_string(),
            },
            SearchMatch {
                file: PathBuf::from("/logs/b.jsonl"),
                line: 10,
                content: "FOO again".to_string(),
            },
        ];

        assert_snapshot!(format_matches(&matches, false), @r"
        /logs/a.jsonl:3: some foo here
        /logs/b.jsonl:10: FOO again
        ");
        assert_snapshot!(format_matches(&matches, true), @r"
        /logs/a.jsonl
        /logs/b.jsonl
        ");
    }

    #[test]
    fn search_command_uses_fallback_without_rg() {
        let temp = tempfile::tempdir().unwrap();
        let project = temp.path().join("claude/-src-app");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("s1.jsonl"), "first\nneedle in a haystack\n").unwrap();

        let config = Config {
            sources: SourcesConfig {
                claude: Some(temp.path().join("claude")),
                codex: Some(temp.path().join("codex")),
                opencode: Some(temp.path().join("opencode")),
            },
            search: SearchConfig {
                program: "tl-test-no-such-search-tool".to_string(),
                ..SearchConfig::default()
            },
            ..Config::default()
        };
        let args = SearchArgs {
            pattern: "NEEDLE".to_string(),
            max_results: 10,
            files_only: false,
            json: false,
        };

        let mut output = Vec::new();
        run(&mut output, &args, &config).unwrap();
        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&temp.path().display().to_string(), "[TEMP]");

        assert_snapshot!(output, @"[TEMP]/claude/-src-app/s1.jsonl:2: needle in a haystack");
    }
}
