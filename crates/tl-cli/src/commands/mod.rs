//! CLI subcommand implementations.

pub mod attribute;
pub mod projects;
pub mod search;
pub mod sessions;
pub mod sources;
pub mod transcript;
pub mod util;

use std::sync::Arc;

use anyhow::{Context, Result};
use tl_core::{CorpusIndex, CorpusIndexer, GitRootResolver};
use tokio::runtime::Runtime;

use crate::Config;

/// Index every configured source.
pub fn build_index(config: &Config, resolver: Arc<GitRootResolver>) -> CorpusIndex {
    CorpusIndexer::new(config.adapters(), resolver, config.indexer.clone()).build_index()
}

/// Single-threaded runtime for commands that shell out.
pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize tokio runtime")
}
