//! Room command handlers

use anyhow::{Context, Result};

use countmein_core::Config;

use super::{join_as_host, open_session, parse_code};
use crate::output::{Output, OutputFormat};

/// Create a room hosted by this device
pub async fn create(config: &Config, output: &Output) -> Result<()> {
    let session = open_session(config);
    let room = session.create_room().await.context("Failed to create room")?;

    output.success(&format!("Created room {}", room.id));
    output.print_room(&room, true);
    Ok(())
}

/// Show a room and its queue
pub async fn show(config: &Config, code: String, output: &Output) -> Result<()> {
    let code = parse_code(&code)?;
    let session = open_session(config);

    session
        .subscribe_to_room(code.as_str())
        .await
        .with_context(|| format!("Could not open room {}", code))?;
    let room = session
        .current_room()
        .ok_or_else(|| anyhow::anyhow!("Room {} disappeared", code))?;

    output.print_room(&room, session.is_host(code.as_str()));
    session.unsubscribe_from_room();
    Ok(())
}

/// Report whether a room exists
pub async fn exists(config: &Config, code: String, output: &Output) -> Result<()> {
    let code = parse_code(&code)?;
    let session = open_session(config);
    let exists = session.room_exists(code.as_str()).await;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"room": code.as_str(), "exists": exists})
            );
        }
        OutputFormat::Quiet => println!("{}", exists),
        OutputFormat::Human => {
            if exists {
                println!("Room {} is open.", code);
            } else {
                println!("Room {} does not exist.", code);
            }
        }
    }
    Ok(())
}

/// Keep a room alive longer
pub async fn extend(
    config: &Config,
    code: String,
    hours: Option<u32>,
    output: &Output,
) -> Result<()> {
    let code = parse_code(&code)?;
    let hours = hours.unwrap_or(config.room_ttl_hours);
    let session = open_session(config);
    join_as_host(&session, &code).await?;

    let expires_at = session
        .extend_room_ttl(code.as_str(), hours)
        .await
        .context("Failed to extend room")?;
    session.unsubscribe_from_room();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"room": code.as_str(), "expiresAt": expires_at})
            );
        }
        OutputFormat::Quiet => println!("{}", expires_at.to_rfc3339()),
        OutputFormat::Human => output.success(&format!(
            "Room {} now expires {}",
            code,
            expires_at.format("%Y-%m-%d %H:%M")
        )),
    }
    Ok(())
}

/// Print the link guests open to join
pub fn link(config: &Config, code: String, output: &Output) -> Result<()> {
    let code = parse_code(&code)?;
    let link = code.join_link(&config.join_base_url);

    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({"room": code.as_str(), "link": link}));
        }
        _ => println!("{}", link),
    }
    Ok(())
}
