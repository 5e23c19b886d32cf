//! Transcript search and commit attribution for tracelink.
//!
//! Everything here shells out (ripgrep, git) through `tokio::process` with a
//! hard timeout per call.

pub mod attribution;
pub mod git;
pub mod search;

pub use attribution::{AttributionError, CommitAttributor};
pub use git::{GitClient, GitConfig, GitError, validate_commit_hash};
pub use search::{CapabilityProbe, ContentSearcher, SearchConfig, SearchError, SearchOptions};
