//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::attribute::AttributeArgs;
use crate::commands::search::SearchArgs;
use crate::commands::sessions::SessionsArgs;
use crate::commands::transcript::TranscriptArgs;

/// Coding-assistant session index.
///
/// Reads Claude Code, Codex CLI and `OpenCode` session logs, searches their
/// transcripts, and traces git commits back to the sessions that wrote them.
#[derive(Debug, Parser)]
#[command(name = "tl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show each session source and whether it is installed.
    Sources {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List indexed sessions, most recent first.
    Sessions(SessionsArgs),

    /// List projects aggregated from sessions.
    Projects {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a session's transcript.
    Transcript(TranscriptArgs),

    /// Search all session transcripts.
    Search(SearchArgs),

    /// Find the sessions most likely to have produced a commit.
    Attribute(AttributeArgs),
}
