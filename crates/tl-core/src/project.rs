//! Git root discovery and project identity extraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use git2::Repository;

use crate::cache::{Clock, SystemClock, TtlCache};

/// Common jj/git workspace directory names.
const WORKSPACE_NAMES: &[&str] = &["default", "main", "dev", "feature", "master"];

/// How long a resolved git root stays cached.
pub const DEFAULT_ROOT_CACHE_TTL_SECS: i64 = 5 * 60;

/// Project identity derived from a repository's `origin` remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentity {
    /// `owner/repo`.
    pub slug: String,
    /// Browsable URL, e.g. `https://github.com/owner/repo`.
    pub url: String,
}

impl RepoIdentity {
    /// Read the `origin` remote from the repository rooted at `root`.
    ///
    /// Linked worktrees resolve to their main repository's remotes.
    pub fn from_repo_root(root: &Path) -> Option<Self> {
        let repo = match Repository::open(root) {
            Ok(repo) => repo,
            Err(e) => {
                if e.code() != git2::ErrorCode::NotFound {
                    tracing::debug!(root = ?root, error = %e, "failed to open repository");
                }
                return None;
            }
        };
        let remote = repo.find_remote("origin").ok()?;
        parse_remote_slug(remote.url()?)
    }
}

/// Extract `owner/repo` and a browsable URL from a git remote URL.
///
/// Handles `https://host/owner/repo(.git)`, `ssh://git@host:22/owner/repo`
/// and scp-style `git@host:owner/repo.git`.
pub fn parse_remote_slug(url: &str) -> Option<RepoIdentity> {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);

    let (host, path) = if let Some((_, rest)) = url.split_once("://") {
        let (authority, path) = rest.split_once('/')?;
        let host = authority.rsplit('@').next()?;
        let host = host.split(':').next()?;
        (host, path)
    } else {
        let (authority, path) = url.split_once(':')?;
        let host = authority.rsplit('@').next()?;
        (host, path)
    };

    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let repo = segments.next()?;
    let owner = segments.next()?;
    if host.is_empty() {
        return None;
    }

    Some(RepoIdentity {
        slug: format!("{owner}/{repo}"),
        url: format!("https://{host}/{owner}/{repo}"),
    })
}

/// Walk upward from `dir` to the nearest ancestor containing `.git`.
pub fn find_git_root(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .find(|ancestor| ancestor.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Extract a display name from a directory path.
///
/// Workspace-style leaf names (`default`, `main`, ...) defer to their parent.
pub fn project_name_from_path(path: &str) -> String {
    let path_obj = Path::new(path);
    let basename = path_obj
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    if WORKSPACE_NAMES.contains(&basename) {
        path_obj
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or(basename)
            .to_string()
    } else {
        basename.to_string()
    }
}

/// Cached git-root lookups.
///
/// Lookups walk the filesystem, so results are memoized for a bounded time.
/// Call [`GitRootResolver::invalidate`] after repositories move.
#[derive(Debug)]
pub struct GitRootResolver {
    cache: TtlCache<PathBuf, Option<PathBuf>>,
}

impl Default for GitRootResolver {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_ROOT_CACHE_TTL_SECS),
            Arc::new(SystemClock),
        )
    }
}

impl GitRootResolver {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: TtlCache::new(ttl, clock),
        }
    }

    pub fn resolve(&self, dir: &Path) -> Option<PathBuf> {
        self.cache
            .get_or_insert_with(dir.to_path_buf(), || find_git_root(dir))
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn commit_all(repo: &Repository) {
        let sig = git2::Signature::now("Ada", "ada@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();
    }

    #[test]
    fn test_parse_git_remote_url() {
        assert_eq!(
            parse_remote_slug("https://github.com/user/time-tracker.git"),
            Some(RepoIdentity {
                slug: "user/time-tracker".to_string(),
                url: "https://github.com/user/time-tracker".to_string(),
            })
        );
        assert_eq!(
            parse_remote_slug("git@github.com:user/dotfiles.git").map(|r| r.slug),
            Some("user/dotfiles".to_string())
        );
        assert_eq!(
            parse_remote_slug("ssh://git@gitlab.example.com:2222/group/app").map(|r| r.url),
            Some("https://gitlab.example.com/group/app".to_string())
        );
        assert_eq!(parse_remote_slug("not a url"), None);
    }

    #[test]
    fn test_project_name_from_workspace_path() {
        assert_eq!(
            project_name_from_path("/home/sami/time-tracker/default"),
            "time-tracker"
        );
        assert_eq!(project_name_from_path("/home/sami/pivot/main"), "pivot");
        assert_eq!(project_name_from_path("/home/sami/.dotfiles"), ".dotfiles");
    }

    #[test]
    fn test_find_git_root_walks_upward() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let nested = repo.join("src/deep");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert_eq!(find_git_root(&nested), Some(repo.clone()));
        assert_eq!(find_git_root(&repo), Some(repo));
    }

    #[test]
    fn test_find_git_root_accepts_worktree_file() {
        let temp = TempDir::new().unwrap();
        let worktree = temp.path().join("wt");
        fs::create_dir_all(&worktree).unwrap();
        fs::write(worktree.join(".git"), "gitdir: /elsewhere/.git/worktrees/wt\n").unwrap();

        assert_eq!(find_git_root(&worktree), Some(worktree));
    }

    #[test]
    fn test_repo_identity_reads_origin() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        repo.remote("upstream", "https://github.com/other/fork.git")
            .unwrap();
        repo.remote("origin", "git@github.com:owner/app.git").unwrap();

        let identity = RepoIdentity::from_repo_root(temp.path()).unwrap();
        assert_eq!(identity.slug, "owner/app");
        assert_eq!(identity.url, "https://github.com/owner/app");
    }

    #[test]
    fn test_repo_identity_honours_includes_and_section_case() {
        let temp = TempDir::new().unwrap();
        Repository::init(temp.path()).unwrap();
        let git_dir = temp.path().join(".git");
        fs::write(
            git_dir.join("remotes.inc"),
            "[Remote \"origin\"]\n\turl = https://github.com/owner/included.git\n",
        )
        .unwrap();
        let mut config = fs::read_to_string(git_dir.join("config")).unwrap();
        config.push_str("[include]\n\tpath = remotes.inc\n");
        fs::write(git_dir.join("config"), config).unwrap();

        let identity = RepoIdentity::from_repo_root(temp.path()).unwrap();
        assert_eq!(identity.slug, "owner/included");
    }

    #[test]
    fn test_repo_identity_follows_worktree() {
        let temp = TempDir::new().unwrap();
        let main = temp.path().join("main");
        let repo = Repository::init(&main).unwrap();
        repo.remote("origin", "https://github.com/owner/app").unwrap();
        commit_all(&repo);

        let worktree = temp.path().join("feature");
        repo.worktree("feature", &worktree, None).unwrap();

        let identity = RepoIdentity::from_repo_root(&worktree).unwrap();
        assert_eq!(identity.slug, "owner/app");
        assert_eq!(find_git_root(&worktree.join("src")), Some(worktree));
    }

    #[test]
    fn test_repo_identity_absent_without_repository_or_origin() {
        let temp = TempDir::new().unwrap();
        assert_eq!(RepoIdentity::from_repo_root(temp.path()), None);

        Repository::init(temp.path()).unwrap();
        assert_eq!(RepoIdentity::from_repo_root(temp.path()), None);
    }

    #[test]
    fn test_resolver_caches_until_invalidated() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("project");
        fs::create_dir_all(&dir).unwrap();

        let resolver = GitRootResolver::default();
        assert_eq!(resolver.resolve(&dir), None);

        fs::create_dir_all(dir.join(".git")).unwrap();
        // Stale until invalidated.
        assert_eq!(resolver.resolve(&dir), None);

        resolver.invalidate();
        assert_eq!(resolver.resolve(&dir), Some(dir));
    }
}
