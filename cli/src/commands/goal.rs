use anyhow::Result;
use std::process;

use nibble_core::error::GoalUpdateError;
use nibble_core::models::{GoalPatch, UserProfile};

use super::helpers::json_error;
use super::open_session;
use crate::config::Config;

pub(crate) async fn cmd_goal(config: &Config, patch: GoalPatch, json: bool) -> Result<()> {
    let session = open_session(config, json).await?;

    if patch.is_empty() {
        print_profile(&session.log().profile(), json)?;
        return Ok(());
    }

    match session.update_goals(patch).await {
        Ok(profile) => {
            if !json {
                println!("Goals updated");
            }
            print_profile(&profile, json)
        }
        // Out-of-range input is a usage error, not a service failure
        Err(GoalUpdateError::Validation(e)) => Err(e.into()),
        Err(GoalUpdateError::Remote(e)) => {
            if json {
                println!("{}", json_error(&e.to_string()));
            } else {
                eprintln!("Could not update goals: {e}");
            }
            process::exit(2);
        }
    }
}

fn print_profile(profile: &UserProfile, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(profile)?);
        return Ok(());
    }

    println!("  Daily goal: {} kcal", profile.calorie_goal);
    if let Some(weight) = profile.weight {
        println!("  Weight:     {weight:.1} kg");
    }
    if let Some(height) = profile.height {
        println!("  Height:     {height:.0} cm");
    }
    if let Some(age) = profile.age {
        println!("  Age:        {age}");
    }
    if let Some(gender) = &profile.gender {
        println!("  Gender:     {gender}");
    }
    Ok(())
}
