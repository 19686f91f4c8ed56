//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use countmein_core::ids;
use countmein_core::{Notification, NotificationKind, RequestStatus, Room, SongRequest};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
    /// Base URL used for join links
    pub join_base_url: String,
}

impl Output {
    pub fn new(format: OutputFormat, join_base_url: impl Into<String>) -> Self {
        Self {
            format,
            join_base_url: join_base_url.into(),
        }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    fn join_link(&self, room_id: &str) -> String {
        ids::join_link(&self.join_base_url, room_id)
    }

    /// Print a room with its queue
    pub fn print_room(&self, room: &Room, is_host: bool) {
        let expired = room.is_expired();
        match self.format {
            OutputFormat::Human => {
                println!("Room:     {}", room.id);
                println!("Join:     {}", self.join_link(&room.id));
                println!("Created:  {}", room.created_at.format("%Y-%m-%d %H:%M"));
                println!("Expires:  {}", expiry_line(room, expired));
                if is_host {
                    println!("You are the host of this room.");
                }
                println!();
                self.print_queue(&room.queue);
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({
                    "room": room,
                    "joinLink": self.join_link(&room.id),
                    "isHost": is_host,
                    "expired": expired,
                }));
            }
            OutputFormat::Quiet => {
                println!("{}", room.id);
            }
        }
    }

    /// Print the queue grouped the way a host reads it
    pub fn print_queue(&self, queue: &[SongRequest]) {
        match self.format {
            OutputFormat::Human => {
                if queue.is_empty() {
                    println!("The queue is empty.");
                    return;
                }

                for status in [
                    RequestStatus::Ongoing,
                    RequestStatus::Next,
                    RequestStatus::Pending,
                    RequestStatus::Completed,
                ] {
                    let group: Vec<_> = queue.iter().filter(|r| r.status == status).collect();
                    if group.is_empty() {
                        continue;
                    }
                    println!("── {} ({}) ──", status_heading(status), group.len());
                    for request in group {
                        println!("  {}", request_line(request));
                    }
                }
                println!("\n{} request(s)", queue.len());
            }
            OutputFormat::Json => print_json(queue),
            OutputFormat::Quiet => {
                for request in queue {
                    println!("{}", request.id);
                }
            }
        }
    }

    /// Print a single request
    pub fn print_request(&self, request: &SongRequest) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", request.id);
                println!("Guest:    {}", request.guest_name);
                println!("Song:     {}", request.song_name);
                if let Some(ref link) = request.youtube_link {
                    println!("Link:     {}", link);
                }
                println!("Status:   {}", request.status);
                println!(
                    "Sent:     {}",
                    request.submitted_at.format("%Y-%m-%d %H:%M")
                );
            }
            OutputFormat::Json => print_json(request),
            OutputFormat::Quiet => println!("{}", request.id),
        }
    }

    /// Print a notification as it arrives
    pub fn print_notification(&self, notification: &Notification) {
        match self.format {
            OutputFormat::Human => {
                let marker = match notification.kind {
                    NotificationKind::Info => "•",
                    NotificationKind::Success => "✓",
                    NotificationKind::Warning => "!",
                    NotificationKind::Error => "✗",
                };
                println!(
                    "{} [{}] {}",
                    marker,
                    notification.timestamp.format("%H:%M:%S"),
                    notification.message
                );
            }
            OutputFormat::Json => print_json(notification),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

fn status_heading(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Ongoing => "On stage",
        RequestStatus::Next => "Up next",
        RequestStatus::Pending => "Waiting",
        RequestStatus::Completed => "Done",
    }
}

fn expiry_line(room: &Room, expired: bool) -> String {
    let at = room.expires_at.format("%Y-%m-%d %H:%M");
    if expired {
        format!("{} (expired)", at)
    } else {
        at.to_string()
    }
}

/// One-line summary of a request
fn request_line(request: &SongRequest) -> String {
    let link = if request.youtube_link.is_some() {
        " ♪"
    } else {
        ""
    };
    format!(
        "{} | {} | {}{}",
        request.id,
        truncate(&request.guest_name, 20),
        truncate(&request.song_name, 40),
        link
    )
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
