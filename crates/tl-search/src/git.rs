//! Read-only git subprocess client.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

static COMMIT_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-f0-9]{7,40}$").unwrap());

/// Field separator in `git show --format` output.
const FIELD_SEP: char = '\u{1f}';

/// Returns true if `hash` looks like an abbreviated or full commit hash.
pub fn validate_commit_hash(hash: &str) -> bool {
    COMMIT_HASH_RE.is_match(hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub program: String,
    /// Timeout for object-existence probes.
    pub probe_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            probe_timeout_secs: 5,
            command_timeout_secs: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("git {args} timed out after {secs}s")]
    Timeout { args: String, secs: u64 },

    #[error("git {args} exited with {status}: {stderr}")]
    Failed {
        args: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected git output: {0}")]
    Parse(String),
}

/// Commit metadata as reported by `git show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHeader {
    pub hash: String,
    pub subject: String,
    pub author: String,
    pub date: DateTime<Utc>,
}

impl CommitHeader {
    fn parse(output: &str) -> Result<Self, GitError> {
        let line = output.trim_end_matches(['\r', '\n']);
        let mut fields = line.splitn(4, FIELD_SEP);
        let (Some(hash), Some(subject), Some(author), Some(date)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(GitError::Parse(line.to_string()));
        };
        let date = DateTime::parse_from_rfc3339(date.trim())
            .map_err(|_| GitError::Parse(format!("bad commit date {date:?}")))?
            .with_timezone(&Utc);

        Ok(Self {
            hash: hash.to_string(),
            subject: subject.to_string(),
            author: author.to_string(),
            date,
        })
    }
}

fn parse_name_list(output: &str) -> Vec<String> {
    output
        .split('\0')
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Runs git against a repository root with a hard timeout per call.
#[derive(Debug, Clone, Default)]
pub struct GitClient {
    config: GitConfig,
}

impl GitClient {
    pub const fn new(config: GitConfig) -> Self {
        Self { config }
    }

    /// Returns true if `hash` names a commit in the repository at `root`.
    pub async fn object_exists(&self, root: &Path, hash: &str) -> Result<bool, GitError> {
        let object = format!("{hash}^{{commit}}");
        let output = self
            .run(root, &["cat-file", "-e", object.as_str()], self.config.probe_timeout_secs)
            .await?;
        Ok(output.status.success())
    }

    pub async fn show_commit(&self, root: &Path, hash: &str) -> Result<CommitHeader, GitError> {
        let args = ["show", "-s", "--format=%H%x1f%s%x1f%an%x1f%aI", hash];
        let stdout = self.run_checked(root, &args).await?;
        CommitHeader::parse(&stdout)
    }

    /// Repo-relative paths touched by `hash`, in git's order.
    ///
    /// Paths are NUL-separated (`-z`) so git never C-quotes them.
    pub async fn changed_files(&self, root: &Path, hash: &str) -> Result<Vec<String>, GitError> {
        let args = [
            "diff-tree",
            "--no-commit-id",
            "--name-only",
            "-r",
            "-z",
            "--root",
            hash,
        ];
        let stdout = self.run_checked(root, &args).await?;
        Ok(parse_name_list(&stdout))
    }

    async fn run_checked(&self, root: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = self
            .run(root, args, self.config.command_timeout_secs)
            .await?;
        if !output.status.success() {
            return Err(GitError::Failed {
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run(
        &self,
        root: &Path,
        args: &[&str],
        timeout_secs: u64,
    ) -> Result<std::process::Output, GitError> {
        tracing::trace!(root = ?root, args = ?args, "running git");
        let output = Command::new(&self.config.program)
            .arg("-C")
            .arg(root)
            .args(["-c", "core.quotePath=false"])
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        tokio::time::timeout(Duration::from_secs(timeout_secs), output)
            .await
            .map_err(|_| GitError::Timeout {
                args: args.join(" "),
                secs: timeout_secs,
            })?
            .map_err(|source| GitError::Spawn {
                program: self.config.program.clone(),
                source,
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    pub(crate) fn git_available() -> bool {
        StdCommand::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    pub(crate) fn git(repo: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .arg("-C")
            .arg(repo)
            .args(["-c", "user.name=Ada", "-c", "user.email=ada@example.com"])
            .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// Create a repository at `root` with one commit adding `files`; returns
    /// the commit hash.
    pub(crate) fn init_repo(root: &Path, files: &[&str]) -> String {
        fs::create_dir_all(root).unwrap();
        git(root, &["init", "-q"]);
        git(root, &["remote", "add", "origin", "git@github.com:owner/app.git"]);
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, format!("// {file}\n")).unwrap();
        }
        git(root, &["add", "-A"]);
        git(root, &["commit", "-q", "-m", "Add files"]);
        git(root, &["rev-parse", "HEAD"])
    }

    #[test]
    fn test_parse_name_list_keeps_raw_paths() {
        assert_eq!(
            parse_name_list("plain.rs\0dir/r\u{e9}sum\u{e9}.rs\0with space.md\0"),
            vec!["plain.rs", "dir/r\u{e9}sum\u{e9}.rs", "with space.md"]
        );
        assert!(parse_name_list("").is_empty());
    }

    #[tokio::test]
    async fn test_reads_commit_from_real_repository() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let hash = init_repo(&repo, &["plain.rs", "src/r\u{e9}sum\u{e9}.rs"]);
        let client = GitClient::default();

        assert!(client.object_exists(&repo, &hash[..10]).await.unwrap());
        assert!(
            !client
                .object_exists(&repo, "0123456789abcdef0123456789abcdef01234567")
                .await
                .unwrap()
        );

        let header = client.show_commit(&repo, &hash[..10]).await.unwrap();
        assert_eq!(header.hash, hash);
        assert_eq!(header.subject, "Add files");
        assert_eq!(header.author, "Ada");

        assert_eq!(
            client.changed_files(&repo, &hash).await.unwrap(),
            vec!["plain.rs", "src/r\u{e9}sum\u{e9}.rs"]
        );
    }

    #[test]
    fn test_validate_commit_hash() {
        assert!(validate_commit_hash("abc1234"));
        assert!(validate_commit_hash("ABCDEF0123456789abcdef0123456789abcdef01"));
        assert!(!validate_commit_hash("abc123"));
        assert!(!validate_commit_hash("abcdef0123456789abcdef0123456789abcdef012"));
        assert!(!validate_commit_hash("main"));
        assert!(!validate_commit_hash("abc1234; rm -rf /"));
        assert!(!validate_commit_hash(""));
    }

    #[test]
    fn test_parse_commit_header() {
        let output = "0123456789abcdef0123456789abcdef01234567\u{1f}Fix parser\u{1f}Ada\u{1f}2026-01-29T10:00:00+01:00\n";
        let header = CommitHeader::parse(output).unwrap();
        assert_eq!(header.hash, "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(header.subject, "Fix parser");
        assert_eq!(header.author, "Ada");
        assert_eq!(header.date.to_rfc3339(), "2026-01-29T09:00:00+00:00");

        assert!(matches!(
            CommitHeader::parse("only\u{1f}three\u{1f}fields"),
            Err(GitError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let client = GitClient::new(GitConfig {
            program: "tl-test-no-such-git".to_string(),
            ..GitConfig::default()
        });
        let err = client
            .object_exists(Path::new("/tmp"), "abc1234")
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::Spawn { .. }));
    }
}
