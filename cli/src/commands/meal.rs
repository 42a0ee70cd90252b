use anyhow::Result;
use std::process;

use nibble_core::models::parse_remote_id;

use super::helpers::json_error;
use super::open_session;
use crate::config::Config;

pub(crate) async fn cmd_delete(config: &Config, entry_id: &str, json: bool) -> Result<()> {
    let session = open_session(config, json).await?;
    let known = session.log().entry(entry_id);

    match session.delete(entry_id).await {
        Ok(Some(entry)) => {
            if json {
                println!("{}", serde_json::json!({ "deleted": entry_id, "name": entry.name }));
            } else {
                println!("Deleted entry {entry_id} ({})", entry.name);
            }
            Ok(())
        }
        // Not in today's log, but the service accepted the id
        Ok(None) if parse_remote_id(entry_id).is_some() => {
            if json {
                println!("{}", serde_json::json!({ "deleted": entry_id }));
            } else {
                println!("Deleted entry {entry_id}");
            }
            Ok(())
        }
        Ok(None) => not_found(entry_id, json),
        Err(e) if known.is_some() => {
            let message =
                format!("Removed from today's log, but the server copy could not be deleted: {e}");
            if json {
                println!("{}", json_error(&message));
            } else {
                eprintln!("{message}");
            }
            process::exit(2);
        }
        Err(e) if e.status() == Some(404) => not_found(entry_id, json),
        Err(e) => {
            if json {
                println!("{}", json_error(&e.to_string()));
            } else {
                eprintln!("Could not delete entry {entry_id}: {e}");
            }
            process::exit(2);
        }
    }
}

fn not_found(entry_id: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", json_error(&format!("Entry {entry_id} not found")));
    } else {
        eprintln!("Entry {entry_id} not found");
    }
    process::exit(2);
}
