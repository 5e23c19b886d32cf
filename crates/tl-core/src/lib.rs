//! Core domain logic for tracelink.
//!
//! This crate contains the fundamental types and logic for:
//! - Source adapters: reading Claude Code, Codex CLI and `OpenCode` session logs
//! - Project identification: git roots and `owner/repo` identity from remotes
//! - Indexing: folding every adapter's sessions into projects

pub mod adapters;
pub mod cache;
pub mod index;
pub mod project;
pub mod session;
pub mod types;

pub use adapters::{SearchRoot, SourceAdapter};
pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use index::{CorpusIndex, CorpusIndexer, IndexerConfig};
pub use project::{GitRootResolver, RepoIdentity};
pub use session::{
    EventKind, Session, SessionError, SessionFilter, SessionSource, TranscriptEvent,
    truncate_chars,
};
pub use types::{AttributionOutcome, CommitInfo, Project, SearchMatch, SessionMatch};
