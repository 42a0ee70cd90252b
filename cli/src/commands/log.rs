use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process;

use nibble_core::models::{ManualEntry, PhotoUpload, mime_for_extension};
use nibble_core::pipeline::PipelineState;
use nibble_core::session::{RunOutcome, Session};

use super::helpers::{describe, json_error};
use super::open_session;
use crate::config::Config;

pub(crate) async fn cmd_add(config: &Config, text: &str, json: bool) -> Result<()> {
    let session = open_session(config, json).await?;
    let outcome = session.add_text(text).await?;
    report(&session, outcome, json)
}

pub(crate) async fn cmd_photo(config: &Config, path: &Path, json: bool) -> Result<()> {
    let photo = read_photo(path)?;
    let session = open_session(config, json).await?;
    let mut run = session.begin_photo(photo)?;

    if !json {
        let mut states = run.watch();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = states.borrow_and_update().clone();
                match state {
                    PipelineState::Analyzing => eprintln!("Analyzing..."),
                    s if !s.is_busy() => break,
                    _ => {}
                }
            }
        });
        eprintln!("Uploading {}...", path.display());
    }

    let outcome = session.commit(&mut run).await;
    report(&session, outcome, json)
}

pub(crate) async fn cmd_manual(config: &Config, manual: ManualEntry, json: bool) -> Result<()> {
    let session = open_session(config, json).await?;
    let entry = session.add_manual(manual)?;
    report(&session, RunOutcome::Logged(entry), json)
}

fn report(session: &Session, outcome: RunOutcome, json: bool) -> Result<()> {
    match outcome {
        RunOutcome::Logged(entry) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                let log = session.log();
                let total = log.total_calories();
                let goal = log.calorie_goal();
                println!("Logged: {}", describe(&entry));
                println!("Today: {total} / {goal} kcal");
                if entry.is_local() {
                    eprintln!("Note: this entry is not stored on the server");
                }
            }
            Ok(())
        }
        RunOutcome::Failed(reason) => {
            if json {
                println!("{}", json_error(&reason));
            } else {
                eprintln!("Analysis failed: {reason}");
            }
            process::exit(2);
        }
        RunOutcome::Discarded => bail!("Analysis was abandoned"),
    }
}

/// Load an image for upload, deriving its MIME type from the extension.
pub(crate) fn read_photo(path: &Path) -> Result<PhotoUpload> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let Some(mime_type) = mime_for_extension(ext) else {
        bail!(
            "Unsupported image type '{}'. Use a .jpg, .png, .webp or .gif file",
            path.display()
        );
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read photo: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map_or_else(|| "photo".to_string(), |n| n.to_string_lossy().into_owned());

    let photo = PhotoUpload {
        file_name,
        mime_type: mime_type.to_string(),
        bytes,
    };
    photo.validate()?;
    Ok(photo)
}
