//! Transcript command: one session's turns in order.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use tl_core::{EventKind, GitRootResolver, TranscriptEvent};

use super::build_index;
use super::util::one_line;
use crate::Config;

#[derive(Debug, Args)]
pub struct TranscriptArgs {
    /// Session ID to show.
    pub session_id: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Format transcript events for human-readable output.
pub fn format_transcript(events: &[TranscriptEvent]) -> String {
    let mut output = String::new();
    for event in events {
        let time = event
            .timestamp
            .map_or_else(|| "--:--:--".to_string(), |ts| ts.format("%H:%M:%S").to_string());
        let content = event.content.as_deref().map(one_line).unwrap_or_default();
        let line = match event.kind {
            EventKind::User => format!("{time}  user       {content}"),
            EventKind::Assistant => format!("{time}  assistant  {content}"),
            EventKind::Tool => {
                let name = event.tool_name.as_deref().unwrap_or("tool");
                format!("{time}  tool       [{name}] {content}")
            }
        };
        writeln!(output, "{}", line.trim_end()).unwrap();
    }
    output
}

pub fn run<W: Write>(writer: &mut W, args: &TranscriptArgs, config: &Config) -> Result<()> {
    let adapters = config.adapters();
    let index = build_index(config, Arc::new(GitRootResolver::default()));
    let Some(events) = index.transcript(&adapters, &args.session_id) else {
        bail!("session not found: {}", args.session_id);
    };

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&events)?)?;
    } else {
        write!(writer, "{}", format_transcript(&events))?;
    }
    Ok(())
}
