//! CLI output handling - event receiver loop and listings.
//!
//! Events arrive from the orchestrator through the runtime channel and are
//! rendered as terminal lines or, in JSON mode, one JSON object per line.

use std::io::{self, Write};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::history::{HistoryEntry, HistoryOutcome};
use crate::pending::PendingEntry;
use crate::runtime::RuntimeEvent;

/// Render events until the channel closes.
pub async fn run_event_loop(
    mut event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    json_mode: bool,
) -> Result<()> {
    while let Some(event) = event_rx.recv().await {
        if json_mode {
            println!("{}", serde_json::to_string(&event)?);
        } else if let Some(line) = format_event(&event) {
            println!("{}", line);
        }
        io::stdout().flush()?;
    }

    Ok(())
}

/// Terminal rendering of an event; `None` for events not worth a line.
fn format_event(event: &RuntimeEvent) -> Option<String> {
    match event {
        RuntimeEvent::PendingCountChanged { count } => Some(format!("[pending] {}", count)),
        RuntimeEvent::ConsentRequested {
            id,
            filename,
            filepath,
            ..
        } => Some(format!(
            "[consent] {} ({}) id={}  /accept {} or /skip {}",
            filename, filepath, id, id, id
        )),
        RuntimeEvent::RetryScheduled {
            id,
            attempt,
            delay_ms,
        } => Some(format!(
            "[retry] {} attempt {} in {}ms",
            id, attempt, delay_ms
        )),
        RuntimeEvent::HistoryAppended { entry } => Some(format_history(entry)),
        RuntimeEvent::ConnectivityChanged { connected } => Some(
            if *connected {
                "[service] connected"
            } else {
                "[service] unreachable"
            }
            .to_string(),
        ),
    }
}

/// One history record as a terminal line.
pub fn format_history(entry: &HistoryEntry) -> String {
    let mut line = format!(
        "[{}] {} {}",
        entry.outcome,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.filename
    );
    if entry.outcome == HistoryOutcome::Duplicate {
        if let Some(original) = &entry.original_filename {
            line.push_str(&format!(" (duplicate of {})", original));
        }
    }
    if let Some(message) = &entry.message {
        line.push_str(&format!(" - {}", message));
    }
    line
}

/// One pending entry as a terminal line.
pub fn format_pending(entry: &PendingEntry) -> String {
    let mut line = format!(
        "{} {} [{}] {}",
        entry.id, entry.filename, entry.state, entry.filepath
    );
    if entry.attempt > 0 {
        line.push_str(&format!(" (retries: {})", entry.attempt));
    }
    line
}

/// Print the history, most recent first.
pub fn print_history(entries: &[HistoryEntry], json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string(entries)?);
    } else if entries.is_empty() {
        println!("No history yet");
    } else {
        for entry in entries {
            println!("{}", format_history(entry));
        }
    }
    Ok(())
}

/// Print pending entries without their credentials.
pub fn print_pending(entries: &[PendingEntry], json_mode: bool) -> Result<()> {
    if json_mode {
        let redacted: Vec<PendingEntry> = entries
            .iter()
            .cloned()
            .map(|mut entry| {
                entry.credential = None;
                entry
            })
            .collect();
        println!("{}", serde_json::to_string(&redacted)?);
    } else if entries.is_empty() {
        println!("Nothing pending");
    } else {
        for entry in entries {
            println!("{}", format_pending(entry));
        }
    }
    Ok(())
}
