//! Transcript content search.
//!
//! Searches go through ripgrep when it is installed and fall back to an
//! in-process scan otherwise. Both paths return [`SearchMatch`]es of the same
//! shape, so callers never need to know which one ran.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tl_core::cache::{Clock, SystemClock, TtlCache};
use tl_core::adapters::lossy_lines;
use tl_core::{SearchMatch, SearchRoot, SourceAdapter, truncate_chars};
use tokio::process::Command;
use walkdir::WalkDir;

/// Character budget for [`SearchMatch::content`].
pub const MAX_MATCH_CHARS: usize = 500;

/// Content search tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fast-path search binary.
    pub program: String,
    pub timeout_secs: u64,
    /// Files larger than this are not scanned (ripgrep size syntax, e.g. `10M`).
    pub max_filesize: String,
    pub per_file_max_count: u32,
    /// How long a capability probe result is trusted.
    pub probe_ttl_secs: i64,
    /// Result cap for the combined pattern used by commit attribution.
    pub attribution_max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            program: "rg".to_string(),
            timeout_secs: 10,
            max_filesize: "10M".to_string(),
            per_file_max_count: 50,
            probe_ttl_secs: 60,
            attribution_max_results: 5000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("fallback scan failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Per-call search options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub max_results: usize,
    /// Report each matching file once, without line content.
    pub files_only: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 100,
            files_only: false,
        }
    }
}

/// Cached answer to "is the fast search tool installed?".
#[derive(Debug)]
pub struct CapabilityProbe {
    program: String,
    timeout: StdDuration,
    cache: TtlCache<String, bool>,
}

impl CapabilityProbe {
    pub fn new(program: &str, timeout_secs: u64, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            program: program.to_string(),
            timeout: StdDuration::from_secs(timeout_secs),
            cache: TtlCache::new(ttl, clock),
        }
    }

    pub async fn is_available(&self) -> bool {
        if let Some(available) = self.cache.get(&self.program) {
            return available;
        }

        let probe = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        let available = match tokio::time::timeout(self.timeout, probe).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(err)) => {
                tracing::debug!(program = %self.program, error = %err, "search tool unavailable");
                false
            }
            Err(_) => {
                tracing::warn!(program = %self.program, "search tool probe timed out");
                false
            }
        };

        self.cache.insert(self.program.clone(), available);
        available
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

/// Searches the transcript files of a set of adapters.
#[derive(Debug)]
pub struct ContentSearcher {
    adapters: Vec<SourceAdapter>,
    config: SearchConfig,
    probe: CapabilityProbe,
}

impl ContentSearcher {
    pub fn new(adapters: Vec<SourceAdapter>, config: SearchConfig) -> Self {
        Self::with_clock(adapters, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        adapters: Vec<SourceAdapter>,
        config: SearchConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let probe = CapabilityProbe::new(
            &config.program,
            config.timeout_secs,
            Duration::seconds(config.probe_ttl_secs),
            clock,
        );
        Self {
            adapters,
            config,
            probe,
        }
    }

    pub const fn probe(&self) -> &CapabilityProbe {
        &self.probe
    }

    /// Search roots that currently exist on disk.
    pub fn roots(&self) -> Vec<SearchRoot> {
        self.adapters
            .iter()
            .flat_map(SourceAdapter::search_roots)
            .filter(|root| root.dir.is_dir())
            .collect()
    }

    /// Case-insensitive search for `pattern` across every transcript file.
    pub async fn search(
        &self,
        pattern: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchMatch>, SearchError> {
        self.search_limited(pattern, options, MAX_MATCH_CHARS).await
    }

    async fn search_limited(
        &self,
        pattern: &str,
        options: &SearchOptions,
        content_limit: usize,
    ) -> Result<Vec<SearchMatch>, SearchError> {
        let roots = self.roots();
        if roots.is_empty() || options.max_results == 0 {
            return Ok(Vec::new());
        }

        if self.probe.is_available().await {
            self.search_with_tool(&roots, pattern, options, content_limit)
                .await
        } else {
            tracing::debug!(pattern, "searching without external tool");
            let pattern = pattern.to_string();
            let options = *options;
            let max_filesize = parse_filesize(&self.config.max_filesize);
            let per_file = self.config.per_file_max_count;
            tokio::task::spawn_blocking(move || {
                scan_roots(
                    &roots,
                    &pattern,
                    &ScanLimits {
                        options,
                        per_file_max_count: per_file,
                        max_filesize,
                        content_limit,
                    },
                )
            })
            .await?
        }
    }

    async fn search_with_tool(
        &self,
        roots: &[SearchRoot],
        pattern: &str,
        options: &SearchOptions,
        content_limit: usize,
    ) -> Result<Vec<SearchMatch>, SearchError> {
        let program = &self.config.program;
        let mut cmd = Command::new(program);
        if options.files_only {
            cmd.arg("-l");
        } else {
            cmd.arg("--json");
        }
        cmd.arg("-i")
            .arg("--no-messages")
            .arg("--max-count")
            .arg(self.config.per_file_max_count.to_string())
            .arg("--max-filesize")
            .arg(&self.config.max_filesize);
        if Regex::new(pattern).is_err() {
            cmd.arg("--fixed-strings");
        }
        let globs: BTreeSet<&str> = roots.iter().map(|r| r.glob).collect();
        for glob in globs {
            cmd.arg("--glob").arg(glob);
        }
        cmd.arg("-e").arg(pattern);
        for root in roots {
            cmd.arg(&root.dir);
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let secs = self.config.timeout_secs;
        let output = tokio::time::timeout(StdDuration::from_secs(secs), cmd.output())
            .await
            .map_err(|_| SearchError::Timeout {
                program: program.clone(),
                secs,
            })?
            .map_err(|source| SearchError::Spawn {
                program: program.clone(),
                source,
            })?;

        // ripgrep exits 1 when nothing matched.
        match output.status.code() {
            Some(0) => {}
            Some(1) => return Ok(Vec::new()),
            _ => {
                return Err(SearchError::Tool {
                    program: program.clone(),
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }

        // Globs are passed to ripgrep as a union; keep each file only if its
        // own root accepts it.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let matches = if options.files_only {
            stdout
                .lines()
                .filter(|line| !line.is_empty())
                .map(|line| SearchMatch {
                    file: PathBuf::from(line),
                    line: 0,
                    content: String::new(),
                })
                .filter(|m| root_accepts(roots, &m.file))
                .take(options.max_results)
                .collect()
        } else {
            stdout
                .lines()
                .filter_map(|line| parse_json_match(line, content_limit))
                .filter(|m| root_accepts(roots, &m.file))
                .take(options.max_results)
                .collect()
        };
        Ok(matches)
    }

    /// Session id owning a transcript file, if any adapter claims it.
    pub fn session_id_for_file(&self, path: &Path) -> Option<String> {
        self.adapters
            .iter()
            .find(|adapter| adapter.owns_file(path))
            .and_then(|adapter| adapter.session_id_for_file(path))
    }

    /// Sessions whose transcripts mention each path's file name.
    ///
    /// Runs a single search over all basenames. A match counts for every
    /// requested path whose basename occurs in the matched line, so files that
    /// share a name in different directories are all attributed.
    pub async fn sessions_touching_paths(
        &self,
        paths: &[String],
    ) -> Result<HashMap<String, BTreeSet<String>>, SearchError> {
        let touching = self.session_files_touching_paths(paths).await?;
        Ok(touching
            .into_iter()
            .map(|(path, sessions)| (path, sessions.into_keys().collect()))
            .collect())
    }

    /// Like [`Self::sessions_touching_paths`], keeping one log file per session.
    pub async fn session_files_touching_paths(
        &self,
        paths: &[String],
    ) -> Result<HashMap<String, BTreeMap<String, PathBuf>>, SearchError> {
        let needles: Vec<(&str, String)> = paths
            .iter()
            .filter_map(|path| {
                let name = Path::new(path).file_name()?.to_str()?;
                Some((path.as_str(), name.to_lowercase()))
            })
            .collect();
        if needles.is_empty() {
            return Ok(HashMap::new());
        }

        let alternatives: BTreeSet<String> = needles
            .iter()
            .map(|(_, name)| regex::escape(name))
            .collect();
        let pattern = alternatives.into_iter().collect::<Vec<_>>().join("|");

        let options = SearchOptions {
            max_results: self.config.attribution_max_results,
            files_only: false,
        };
        let matches = self.search_limited(&pattern, &options, usize::MAX).await?;

        let mut owners: HashMap<&Path, Option<String>> = HashMap::new();
        let mut touching: HashMap<String, BTreeMap<String, PathBuf>> = HashMap::new();
        for m in &matches {
            let owner = owners
                .entry(m.file.as_path())
                .or_insert_with(|| self.session_id_for_file(&m.file));
            let Some(session_id) = owner.clone() else {
                tracing::debug!(file = ?m.file, "match outside any session");
                continue;
            };
            let content = m.content.to_lowercase();
            for (path, name) in &needles {
                if content.contains(name.as_str()) {
                    touching
                        .entry((*path).to_string())
                        .or_default()
                        .entry(session_id.clone())
                        .or_insert_with(|| m.file.clone());
                }
            }
        }

        tracing::debug!(
            paths = paths.len(),
            matches = matches.len(),
            touched = touching.len(),
            "associated matches with paths"
        );
        Ok(touching)
    }
}

#[derive(Debug, Deserialize)]
struct RgLine {
    #[serde(rename = "type")]
    kind: String,
    data: Option<RgMatch>,
}

#[derive(Debug, Deserialize)]
struct RgMatch {
    path: RgText,
    lines: RgText,
    line_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RgText {
    text: Option<String>,
}

/// Returns true if `file` lies under a root whose glob accepts it.
fn root_accepts(roots: &[SearchRoot], file: &Path) -> bool {
    roots
        .iter()
        .any(|root| file.starts_with(&root.dir) && root.accepts(file))
}

/// Parse one `rg --json` output line, keeping only `match` records.
fn parse_json_match(line: &str, content_limit: usize) -> Option<SearchMatch> {
    let record: RgLine = serde_json::from_str(line).ok()?;
    if record.kind != "match" {
        return None;
    }
    let data = record.data?;
    let content = data.lines.text?;
    Some(SearchMatch {
        file: PathBuf::from(data.path.text?),
        line: data.line_number.unwrap_or(0),
        content: truncate_chars(content.trim_end_matches(['\r', '\n']), content_limit),
    })
}

/// Compile `pattern` case-insensitively, treating it literally if it is not a
/// valid regex.
fn build_pattern(pattern: &str) -> Result<Regex, SearchError> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Ok(regex),
        Err(err) => {
            tracing::debug!(pattern, error = %err, "using literal pattern");
            Ok(RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(true)
                .build()?)
        }
    }
}

/// Parse a size like `10M` into bytes.
fn parse_filesize(size: &str) -> Option<u64> {
    let size = size.trim();
    let (digits, multiplier) = match size.chars().last()?.to_ascii_uppercase() {
        'K' => (&size[..size.len() - 1], 1 << 10),
        'M' => (&size[..size.len() - 1], 1 << 20),
        'G' => (&size[..size.len() - 1], 1 << 30),
        _ => (size, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

struct ScanLimits {
    options: SearchOptions,
    per_file_max_count: u32,
    max_filesize: Option<u64>,
    content_limit: usize,
}

/// In-process equivalent of the ripgrep invocation.
fn scan_roots(
    roots: &[SearchRoot],
    pattern: &str,
    limits: &ScanLimits,
) -> Result<Vec<SearchMatch>, SearchError> {
    let regex = build_pattern(pattern)?;
    let max_results = limits.options.max_results;
    let mut matches = Vec::new();

    for root in roots {
        let files = WalkDir::new(&root.dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && root.accepts(entry.path()));

        for entry in files {
            let too_large = limits.max_filesize.is_some_and(|max| {
                entry.metadata().map(|m| m.len() > max).unwrap_or(false)
            });
            if too_large {
                continue;
            }

            let file = match File::open(entry.path()) {
                Ok(file) => file,
                Err(err) => {
                    tracing::debug!(path = ?entry.path(), error = %err, "skipping unreadable file");
                    continue;
                }
            };

            let mut in_file = 0u32;
            for (idx, line) in lossy_lines(BufReader::new(file)).enumerate() {
                if !regex.is_match(&line) {
                    continue;
                }

                matches.push(SearchMatch {
                    file: entry.path().to_path_buf(),
                    line: if limits.options.files_only {
                        0
                    } else {
                        idx as u64 + 1
                    },
                    content: if limits.options.files_only {
                        String::new()
                    } else {
                        truncate_chars(&line, limits.content_limit)
                    },
                });
                if matches.len() >= max_results {
                    return Ok(matches);
                }

                in_file += 1;
                if limits.options.files_only || in_file >= limits.per_file_max_count {
                    break;
                }
            }
        }
    }

    Ok(matches)
}
