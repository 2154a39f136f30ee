use std::io::{self, Write};

use shared::models::{CollectionSnapshot, Item, SyncStatus};

pub fn render_item(out: &mut impl Write, item: &Item) -> io::Result<()> {
    let mut flags = String::new();
    if item.payload.edited {
        flags.push_str(" (edited)");
    }
    if item.payload.read {
        flags.push_str(" [read]");
    }
    writeln!(
        out,
        "[{}] {}: {}{}  #{}",
        item.sequence_key,
        item.sender_label(),
        item.payload.content,
        flags,
        item.id
    )
}

/// Writes the whole view followed by a status line.
pub fn render_snapshot(out: &mut impl Write, snapshot: &CollectionSnapshot) -> io::Result<()> {
    for item in snapshot.items.iter() {
        render_item(out, item)?;
    }

    let status = match snapshot.status {
        SyncStatus::Uninitialized => "waiting",
        SyncStatus::Loading => "loading",
        SyncStatus::Ready => "ready",
        SyncStatus::Error => "error",
    };
    write!(
        out,
        "-- {status} | {} | {} messages",
        snapshot.state,
        snapshot.len()
    )?;
    if snapshot.truncated {
        write!(out, " (older messages not loaded)")?;
    }
    if let Some(error) = &snapshot.error {
        write!(out, " | {error}")?;
    }
    writeln!(out, " --")
}
