//! Song request command handlers

use anyhow::{bail, Context, Result};

use countmein_core::{Config, RequestStatus};

use super::{join_as_host, open_session, parse_code};
use crate::output::Output;

/// Submit a song as a guest
pub async fn add(
    config: &Config,
    code: String,
    guest: String,
    song: String,
    link: Option<String>,
    output: &Output,
) -> Result<()> {
    let code = parse_code(&code)?;
    let guest = guest.trim();
    let song = song.trim();
    if guest.is_empty() {
        bail!("Guest name cannot be empty");
    }
    if song.is_empty() {
        bail!("Song name cannot be empty");
    }

    let session = open_session(config);
    let request = session
        .add_song_request(code.as_str(), guest, song, link.as_deref())
        .await
        .with_context(|| format!("Failed to submit request to room {}", code))?;

    output.success(&format!("Requested \"{}\" in room {}", request.song_name, code));
    output.print_request(&request);
    Ok(())
}

/// Move a request through the queue
pub async fn status(
    config: &Config,
    code: String,
    request_id: String,
    status: String,
    output: &Output,
) -> Result<()> {
    let code = parse_code(&code)?;
    let status: RequestStatus = status.parse().map_err(anyhow::Error::msg)?;

    let session = open_session(config);
    join_as_host(&session, &code).await?;

    if session
        .queue()
        .iter()
        .all(|request| request.id != request_id)
    {
        bail!("No request {} in room {}", request_id, code);
    }

    session
        .update_request_status(code.as_str(), &request_id, status)
        .await
        .context("Failed to update status")?;
    session.unsubscribe_from_room();

    output.success(&format!("{} is now {}", request_id, status));
    Ok(())
}

/// Take a request off the queue
pub async fn remove(
    config: &Config,
    code: String,
    request_id: String,
    output: &Output,
) -> Result<()> {
    let code = parse_code(&code)?;
    let session = open_session(config);
    join_as_host(&session, &code).await?;

    if session
        .queue()
        .iter()
        .all(|request| request.id != request_id)
    {
        bail!("No request {} in room {}", request_id, code);
    }

    session
        .remove_request(code.as_str(), &request_id)
        .await
        .context("Failed to remove request")?;
    session.unsubscribe_from_room();

    output.success(&format!("Removed {} from room {}", request_id, code));
    Ok(())
}
