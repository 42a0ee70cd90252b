use anyhow::Result;
use std::process;

use super::client;
use super::helpers::json_error;
use crate::config::Config;

pub(crate) async fn cmd_health(config: &Config, json: bool) -> Result<()> {
    let client = client(config)?;

    match client.health().await {
        Ok(health) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "url": client.base_url().as_str(),
                        "status": health.status,
                        "model": health.model,
                    })
                );
            } else {
                println!("Service: {}", client.base_url());
                println!("Status:  {}", health.status);
                if let Some(model) = &health.model {
                    println!("Model:   {model}");
                }
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!("{}", json_error(&e.to_string()));
            } else {
                eprintln!("Service at {} is unavailable: {e}", client.base_url());
            }
            process::exit(2);
        }
    }
}
