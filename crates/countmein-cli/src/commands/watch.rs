//! Live view of a room

use std::collections::HashSet;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use countmein_core::{Config, Room};

use super::{open_session, parse_code};
use crate::output::{Output, OutputFormat};

/// Follow a room until Ctrl-C, printing every change
pub async fn watch(config: &Config, code: String, output: &Output) -> Result<()> {
    let code = parse_code(&code)?;
    let session = open_session(config);

    session
        .subscribe_to_room(code.as_str())
        .await
        .with_context(|| format!("Could not open room {}", code))?;
    let is_host = session.is_host(code.as_str());

    // Redraw in place only when a person is looking at the terminal
    let redraw = output.format == OutputFormat::Human && atty::is(atty::Stream::Stdout);

    let mut rooms = session.watch_room();
    let mut notifications = session.watch_notifications();
    let mut shown = HashSet::new();
    let mut health = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let initial = rooms.borrow_and_update().clone();
    render(initial.as_ref(), is_host, redraw, output)?;

    loop {
        tokio::select! {
            changed = rooms.changed() => {
                if changed.is_err() {
                    break;
                }
                let room = rooms.borrow_and_update().clone();
                render(room.as_ref(), is_host, redraw, output)?;
                if room.is_none() {
                    break;
                }
            }
            changed = notifications.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = notifications.borrow_and_update().clone();
                for notification in current.iter().filter(|n| shown.insert(n.id.clone())) {
                    output.print_notification(notification);
                }
            }
            _ = health.tick() => {}
            _ = &mut ctrl_c => {
                debug!("Interrupted");
                break;
            }
        }

        // A dropped connection leaves the room as it was
        if let Some(error) = session.error() {
            output.message(&format!("{} ({})", error.message, error.kind));
            break;
        }
    }

    session.unsubscribe_from_room();
    Ok(())
}

fn render(room: Option<&Room>, is_host: bool, redraw: bool, output: &Output) -> Result<()> {
    if redraw {
        // Clear screen, cursor home
        print!("\x1b[2J\x1b[H");
        io::stdout().flush()?;
    }

    match room {
        Some(room) => output.print_room(room, is_host),
        None => output.message("The room has closed."),
    }
    Ok(())
}
