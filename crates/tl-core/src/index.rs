//! Full-corpus indexing: every adapter's sessions folded into projects.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::SourceAdapter;
use crate::project::{GitRootResolver, RepoIdentity, project_name_from_path};
use crate::session::{
    ACTIVE_WINDOW_SECS, Session, SessionFilter, TranscriptEvent, is_within_window,
};
use crate::types::Project;

/// Indexer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Sessions with less transcript text than this are dropped unless active.
    pub min_content_chars: usize,
    pub active_window_secs: i64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            min_content_chars: 100,
            active_window_secs: ACTIVE_WINDOW_SECS,
        }
    }
}

/// Result of one indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusIndex {
    pub sessions: Vec<Session>,
    pub projects: Vec<Project>,
}

impl CorpusIndex {
    /// Distinct working directories across indexed sessions, sorted.
    pub fn known_working_directories(&self) -> Vec<PathBuf> {
        self.sessions
            .iter()
            .filter_map(|s| s.working_directory.as_deref())
            .map(PathBuf::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    /// Sessions matching `filter`, in index order.
    pub fn filter<'a>(&'a self, filter: &'a SessionFilter) -> impl Iterator<Item = &'a Session> {
        self.sessions.iter().filter(move |s| filter.matches(s))
    }

    /// Transcript for an indexed session, read through its owning adapter.
    pub fn transcript(
        &self,
        adapters: &[SourceAdapter],
        session_id: &str,
    ) -> Option<Vec<TranscriptEvent>> {
        let session = self.session(session_id)?;
        let adapter = adapters
            .iter()
            .find(|a| a.source() == session.source && session.file_path.starts_with(a.root()))?;
        Some(adapter.list_transcript(session))
    }
}

/// Builds a [`CorpusIndex`] from a set of adapters.
#[derive(Debug)]
pub struct CorpusIndexer {
    adapters: Vec<SourceAdapter>,
    resolver: Arc<GitRootResolver>,
    config: IndexerConfig,
}

/// Project identity resolved for one session.
struct ProjectKey {
    project_id: String,
    project_name: String,
    repo: Option<RepoIdentity>,
}

impl CorpusIndexer {
    pub const fn new(
        adapters: Vec<SourceAdapter>,
        resolver: Arc<GitRootResolver>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            adapters,
            resolver,
            config,
        }
    }

    pub fn adapters(&self) -> &[SourceAdapter] {
        &self.adapters
    }

    pub fn build_index(&self) -> CorpusIndex {
        self.build_index_at(Utc::now())
    }

    /// Index every adapter, evaluating activity against `now`.
    pub fn build_index_at(&self, now: DateTime<Utc>) -> CorpusIndex {
        let window = Duration::seconds(self.config.active_window_secs);
        let mut identities: HashMap<PathBuf, Option<RepoIdentity>> = HashMap::new();
        let mut sessions = Vec::new();
        let mut dropped = 0usize;

        for adapter in &self.adapters {
            let listed = match adapter.list_sessions(&SessionFilter::default()) {
                Ok(listed) => listed,
                Err(err) => {
                    tracing::warn!(
                        source = %adapter.source(),
                        root = ?adapter.root(),
                        error = %err,
                        "failed to enumerate sessions"
                    );
                    continue;
                }
            };
            tracing::debug!(source = %adapter.source(), count = listed.len(), "listed sessions");

            for mut session in listed {
                session.is_active = is_within_window(session.last_activity_at, now, window);
                if session.content_chars < self.config.min_content_chars && !session.is_active {
                    dropped += 1;
                    continue;
                }

                let key = self.project_key(&session, &mut identities);
                session.project_id = key.project_id;
                session.project_name = key.project_name;
                sessions.push(session);
            }
        }

        sessions.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        let projects = fold_projects(&sessions, &identities, &self.resolver);

        tracing::info!(
            sessions = sessions.len(),
            projects = projects.len(),
            dropped,
            "built corpus index"
        );

        CorpusIndex { sessions, projects }
    }

    fn project_key(
        &self,
        session: &Session,
        identities: &mut HashMap<PathBuf, Option<RepoIdentity>>,
    ) -> ProjectKey {
        let Some(dir) = session.working_directory.as_deref() else {
            let synthetic = format!("{}:{}", session.source, session.session_id);
            return ProjectKey {
                project_id: synthetic.clone(),
                project_name: synthetic,
                repo: None,
            };
        };

        let Some(root) = self.resolver.resolve(Path::new(dir)) else {
            return ProjectKey {
                project_id: dir.to_string(),
                project_name: project_name_from_path(dir),
                repo: None,
            };
        };

        let repo = identities
            .entry(root.clone())
            .or_insert_with(|| RepoIdentity::from_repo_root(&root))
            .clone();
        let root_str = root.to_string_lossy().into_owned();
        let project_name = repo
            .as_ref()
            .map_or_else(|| project_name_from_path(&root_str), |r| r.slug.clone());

        ProjectKey {
            project_id: root_str,
            project_name,
            repo,
        }
    }
}

/// Aggregate sorted sessions into projects, most recently active first.
fn fold_projects(
    sessions: &[Session],
    identities: &HashMap<PathBuf, Option<RepoIdentity>>,
    resolver: &GitRootResolver,
) -> Vec<Project> {
    let mut by_id: HashMap<&str, Project> = HashMap::new();

    for session in sessions {
        let project = by_id
            .entry(session.project_id.as_str())
            .or_insert_with(|| {
                let repo = session
                    .working_directory
                    .as_deref()
                    .and_then(|dir| resolver.resolve(Path::new(dir)))
                    .and_then(|root| identities.get(&root).cloned().flatten());
                Project {
                    project_id: session.project_id.clone(),
                    project_name: session.project_name.clone(),
                    repo_id: repo.as_ref().map(|r| r.slug.clone()),
                    repo_url: repo.map(|r| r.url),
                    last_activity_at: session.last_activity_at,
                    session_count: 0,
                    active_session_count: 0,
                    is_active: false,
                }
            });

        project.session_count += 1;
        project.last_activity_at = project.last_activity_at.max(session.last_activity_at);
        if session.is_active {
            project.active_session_count += 1;
            project.is_active = true;
        }
    }

    let mut projects: Vec<Project> = by_id.into_values().collect();
    projects.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then_with(|| a.project_id.cmp(&b.project_id))
    });
    projects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionSource;
    use std::fs;
    use tempfile::TempDir;

    const LONG_REPLY: &str = "This reply is deliberately long enough to push the session over the content volume threshold used by the indexer.";

    fn write_claude_session(root: &Path, folder: &str, id: &str, cwd: &str, ts: &str, reply: &str) {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        let lines = [
            format!(
                r#"{{"type":"user","sessionId":"{id}","cwd":"{cwd}","message":{{"content":"start"}},"timestamp":"{ts}"}}"#
            ),
            format!(
                r#"{{"type":"assistant","sessionId":"{id}","message":{{"content":"{reply}"}},"timestamp":"{ts}"}}"#
            ),
        ];
        fs::write(dir.join(format!("{id}.jsonl")), lines.join("\n")).unwrap();
    }

    fn indexer(adapters: Vec<SourceAdapter>) -> CorpusIndexer {
        CorpusIndexer::new(
            adapters,
            Arc::new(GitRootResolver::default()),
            IndexerConfig::default(),
        )
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_sessions_group_by_git_root() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        git2::Repository::init(&repo)
            .unwrap()
            .remote("origin", "git@github.com:owner/app.git")
            .unwrap();
        fs::create_dir_all(repo.join("crates/a")).unwrap();

        let claude_root = temp.path().join("claude");
        let repo_str = repo.to_string_lossy();
        let nested = repo.join("crates/a");
        write_claude_session(&claude_root, "p1", "s1", &repo_str, "2026-01-29T10:00:00Z", LONG_REPLY);
        write_claude_session(
            &claude_root,
            "p2",
            "s2",
            &nested.to_string_lossy(),
            "2026-01-29T11:00:00Z",
            LONG_REPLY,
        );

        let index = indexer(vec![SourceAdapter::with_root(SessionSource::Claude, claude_root)])
            .build_index_at(at("2026-02-01T00:00:00Z"));

        assert_eq!(index.sessions.len(), 2);
        assert_eq!(index.sessions[0].session_id, "s2");
        assert_eq!(index.projects.len(), 1);

        let project = &index.projects[0];
        assert_eq!(project.project_id, repo_str);
        assert_eq!(project.project_name, "owner/app");
        assert_eq!(project.repo_url.as_deref(), Some("https://github.com/owner/app"));
        assert_eq!(project.session_count, 2);
        assert_eq!(project.last_activity_at, at("2026-01-29T11:00:00Z"));
        assert!(!project.is_active);
        assert!(index.sessions.iter().all(|s| s.project_name == "owner/app"));
    }

    #[test]
    fn test_low_volume_sessions_kept_only_when_active() {
        let temp = TempDir::new().unwrap();
        let claude_root = temp.path().join("claude");
        write_claude_session(&claude_root, "p", "tiny-old", "/nowhere/a", "2026-01-29T10:00:00Z", "ok");
        write_claude_session(&claude_root, "p", "tiny-live", "/nowhere/b", "2026-01-29T11:59:00Z", "ok");
        write_claude_session(&claude_root, "p", "big-old", "/nowhere/c", "2026-01-29T09:00:00Z", LONG_REPLY);

        let index = indexer(vec![SourceAdapter::with_root(SessionSource::Claude, claude_root)])
            .build_index_at(at("2026-01-29T12:00:00Z"));

        let ids: Vec<_> = index.sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["tiny-live", "big-old"]);
        for session in &index.sessions {
            assert!(session.content_chars >= 100 || session.is_active);
        }
        let live = index.session("tiny-live").unwrap();
        assert!(live.is_active);
        assert_eq!(live.project_id, "/nowhere/b");
        assert_eq!(index.projects[0].active_session_count, 1);
    }

    #[test]
    fn test_rebuild_is_identical() {
        let temp = TempDir::new().unwrap();
        let claude_root = temp.path().join("claude");
        for (i, ts) in ["2026-01-29T10:00:00Z", "2026-01-29T10:00:00Z", "2026-01-28T10:00:00Z"]
            .iter()
            .enumerate()
        {
            write_claude_session(&claude_root, "p", &format!("s{i}"), &format!("/nowhere/{i}"), ts, LONG_REPLY);
        }

        let indexer = indexer(vec![SourceAdapter::with_root(SessionSource::Claude, claude_root)]);
        let now = at("2026-02-01T00:00:00Z");
        let first = indexer.build_index_at(now);
        let second = indexer.build_index_at(now);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_unreadable_adapter_does_not_block_others() {
        let temp = TempDir::new().unwrap();
        let claude_root = temp.path().join("claude");
        write_claude_session(&claude_root, "p", "s1", "/nowhere/a", "2026-01-29T10:00:00Z", LONG_REPLY);

        // A plain file where the Codex root directory should be.
        let broken_root = temp.path().join("codex");
        fs::write(&broken_root, "not a directory").unwrap();

        let index = indexer(vec![
            SourceAdapter::with_root(SessionSource::Codex, broken_root),
            SourceAdapter::with_root(SessionSource::Claude, claude_root),
            SourceAdapter::with_root(SessionSource::OpenCode, temp.path().join("missing")),
        ])
        .build_index_at(at("2026-02-01T00:00:00Z"));

        assert_eq!(index.sessions.len(), 1);
        assert_eq!(index.sessions[0].source, SessionSource::Claude);
    }

    #[test]
    fn test_known_working_directories_and_transcript() {
        let temp = TempDir::new().unwrap();
        let claude_root = temp.path().join("claude");
        write_claude_session(&claude_root, "p", "s1", "/nowhere/b", "2026-01-29T10:00:00Z", LONG_REPLY);
        write_claude_session(&claude_root, "p", "s2", "/nowhere/a", "2026-01-29T11:00:00Z", LONG_REPLY);
        write_claude_session(&claude_root, "q", "s3", "/nowhere/a", "2026-01-29T12:00:00Z", LONG_REPLY);

        let indexer = indexer(vec![SourceAdapter::with_root(SessionSource::Claude, claude_root)]);
        let index = indexer.build_index_at(at("2026-02-01T00:00:00Z"));

        assert_eq!(
            index.known_working_directories(),
            vec![PathBuf::from("/nowhere/a"), PathBuf::from("/nowhere/b")]
        );

        let events = index.transcript(indexer.adapters(), "s1").unwrap();
        assert_eq!(events.len(), 2);
        assert!(index.transcript(indexer.adapters(), "missing").is_none());

        let filter = SessionFilter {
            project_name_contains: Some("B".to_string()),
            ..SessionFilter::default()
        };
        let ids: Vec<_> = index.filter(&filter).map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s1"]);
    }
}
