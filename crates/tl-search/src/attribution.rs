//! Commit-to-session attribution.
//!
//! Given a commit hash, find the repository that contains it, list the files
//! it changed, and rank the sessions whose transcripts mention those files.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tl_core::adapters::file_mtime;
use tl_core::project::project_name_from_path;
use tl_core::session::is_within_window;
use tl_core::{AttributionOutcome, CommitInfo, CorpusIndex, GitRootResolver, RepoIdentity, SessionMatch};
use tokio::task::JoinSet;

use crate::git::{GitClient, validate_commit_hash};
use crate::search::{ContentSearcher, SearchError};

const STRONG_BOOST: f64 = 1.5;
const WEAK_BOOST: f64 = 1.2;

#[derive(Debug, thiserror::Error)]
pub enum AttributionError {
    #[error("Invalid commit hash format")]
    InvalidHash,

    #[error("Commit not found in any known repository")]
    CommitNotFound,

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),
}

/// Multiplier rewarding sessions last written close to the commit.
pub fn time_boost(session_modified: DateTime<Utc>, commit_date: DateTime<Utc>) -> f64 {
    if is_within_window(session_modified, commit_date, Duration::hours(24)) {
        STRONG_BOOST
    } else if is_within_window(session_modified, commit_date, Duration::days(7)) {
        WEAK_BOOST
    } else {
        1.0
    }
}

/// `min(1, matched / total × boost)`; zero when the commit changed nothing.
#[allow(clippy::cast_precision_loss)]
pub fn score(matched: usize, total: usize, boost: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (matched as f64 / total as f64 * boost).min(1.0)
}

/// Ranks sessions against commits.
#[derive(Debug)]
pub struct CommitAttributor {
    git: GitClient,
    searcher: Arc<ContentSearcher>,
    resolver: Arc<GitRootResolver>,
}

impl CommitAttributor {
    pub const fn new(
        git: GitClient,
        searcher: Arc<ContentSearcher>,
        resolver: Arc<GitRootResolver>,
    ) -> Self {
        Self {
            git,
            searcher,
            resolver,
        }
    }

    /// Attribute `hash` to indexed sessions. Failures are reported in the
    /// outcome rather than returned.
    pub async fn attribute(&self, hash: &str, index: &CorpusIndex) -> AttributionOutcome {
        let commit = match self.find_commit(hash.trim(), index).await {
            Ok(commit) => commit,
            Err(err) => {
                tracing::info!(hash, error = %err, "commit attribution failed");
                return AttributionOutcome::failed(err);
            }
        };

        match self.attribute_sessions(&commit, index).await {
            Ok(sessions) => AttributionOutcome {
                commit: Some(commit),
                sessions,
                error: None,
            },
            Err(err) => {
                tracing::warn!(hash = %commit.hash, error = %err, "session search failed");
                AttributionOutcome {
                    commit: Some(commit),
                    sessions: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn find_commit(
        &self,
        hash: &str,
        index: &CorpusIndex,
    ) -> Result<CommitInfo, AttributionError> {
        if !validate_commit_hash(hash) {
            return Err(AttributionError::InvalidHash);
        }
        let dirs = index.known_working_directories();
        let root = self
            .resolve_repository(hash, &dirs)
            .await
            .ok_or(AttributionError::CommitNotFound)?;
        self.load_commit_info(hash, &root).await
    }

    /// Repository roots reachable from `dirs`, deduplicated in first-seen order.
    pub fn candidate_roots(&self, dirs: &[PathBuf]) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        dirs.iter()
            .filter_map(|dir| self.resolver.resolve(dir))
            .filter(|root| seen.insert(root.clone()))
            .collect()
    }

    /// Probe every candidate root for `hash` concurrently; the first root that
    /// has it wins and the remaining probes are abandoned.
    pub async fn resolve_repository(&self, hash: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
        let roots = self.candidate_roots(dirs);
        tracing::debug!(hash, candidates = roots.len(), "probing repositories");

        let mut probes = JoinSet::new();
        for root in roots {
            let git = self.git.clone();
            let hash = hash.to_string();
            probes.spawn(async move {
                match git.object_exists(&root, &hash).await {
                    Ok(found) => found.then_some(root),
                    Err(err) => {
                        tracing::debug!(root = ?root, error = %err, "repository probe failed");
                        None
                    }
                }
            });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Some(root)) => return Some(root),
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "repository probe task failed"),
            }
        }
        None
    }

    /// Metadata and changed files for `hash` in the repository at `root`.
    pub async fn load_commit_info(
        &self,
        hash: &str,
        root: &Path,
    ) -> Result<CommitInfo, AttributionError> {
        let header = self.git.show_commit(root, hash).await.map_err(|err| {
            tracing::debug!(hash, root = ?root, error = %err, "git show failed");
            AttributionError::CommitNotFound
        })?;
        let changed_files = self
            .git
            .changed_files(root, &header.hash)
            .await
            .map_err(|err| {
                tracing::debug!(hash, root = ?root, error = %err, "git diff-tree failed");
                AttributionError::CommitNotFound
            })?;

        let repository_name = RepoIdentity::from_repo_root(root).map_or_else(
            || project_name_from_path(&root.to_string_lossy()),
            |identity| identity.slug,
        );

        Ok(CommitInfo {
            hash: header.hash,
            repository_root: root.to_path_buf(),
            repository_name,
            message: header.subject,
            author: header.author,
            date: header.date,
            changed_files,
        })
    }

    /// Score every session that mentions at least one of the commit's files.
    pub async fn attribute_sessions(
        &self,
        commit: &CommitInfo,
        index: &CorpusIndex,
    ) -> Result<Vec<SessionMatch>, AttributionError> {
        let absolute: Vec<String> = commit
            .changed_files
            .iter()
            .map(|file| commit.repository_root.join(file).to_string_lossy().into_owned())
            .collect();
        let touching = self.searcher.session_files_touching_paths(&absolute).await?;

        // session id -> (log file, matched changed files in commit order)
        let mut candidates: BTreeMap<String, (PathBuf, Vec<String>)> = BTreeMap::new();
        for (file, path) in commit.changed_files.iter().zip(&absolute) {
            let Some(sessions) = touching.get(path) else {
                continue;
            };
            for (session_id, log_file) in sessions {
                candidates
                    .entry(session_id.clone())
                    .or_insert_with(|| (log_file.clone(), Vec::new()))
                    .1
                    .push(file.clone());
            }
        }

        let total = commit.changed_files.len();
        let mut matches: Vec<SessionMatch> = candidates
            .into_iter()
            .map(|(session_id, (log_file, matched_files))| {
                let indexed = index.session(&session_id);
                let file_path = indexed.map_or(log_file, |s| s.file_path.clone());
                let modified = file_mtime(&file_path)
                    .or_else(|| indexed.map(|s| s.last_activity_at))
                    .unwrap_or(commit.date);
                let project_name = indexed.map_or_else(
                    || commit.repository_name.clone(),
                    |s| s.project_name.clone(),
                );

                SessionMatch {
                    score: score(matched_files.len(), total, time_boost(modified, commit.date)),
                    session_id,
                    project_name,
                    matched_files,
                    file_path,
                }
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        tracing::debug!(hash = %commit.hash, candidates = matches.len(), "scored sessions");
        Ok(matches)
    }
}
