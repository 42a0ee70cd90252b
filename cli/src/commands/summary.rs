use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::process;

use nibble_core::models::{FoodEntry, Totals};
use nibble_core::reconciler::SyncMode;
use nibble_core::service::NutritionApi;

use super::helpers::{parse_date, print_entry_table, print_totals};
use super::{client, open_session};
use crate::config::Config;

#[derive(Serialize)]
struct SummaryView {
    date: NaiveDate,
    mode: SyncMode,
    calorie_goal: u32,
    total_calories: u32,
    remaining: i64,
    total_protein: f64,
    total_carbs: f64,
    total_fat: f64,
    entries: Vec<FoodEntry>,
}

impl SummaryView {
    fn new(date: NaiveDate, mode: SyncMode, calorie_goal: u32, entries: Vec<FoodEntry>) -> Self {
        let totals = Totals::of(&entries);
        Self {
            date,
            mode,
            calorie_goal,
            total_calories: totals.calories,
            remaining: totals.remaining(calorie_goal),
            total_protein: totals.protein,
            total_carbs: totals.carbs,
            total_fat: totals.fat,
            entries,
        }
    }
}

pub(crate) async fn cmd_summary(config: &Config, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;

    let (name, view) = if date == Local::now().date_naive() {
        let session = open_session(config, json).await?;
        let log = session.log();
        let view = SummaryView::new(date, log.mode(), log.calorie_goal(), log.entries());
        (session.user().display_name(), view)
    } else {
        // Past days come straight from the service; there is no offline copy
        let user = config
            .user
            .as_ref()
            .context("No user configured. Pass --user-id or set NIBBLE_USER_ID")?;
        let stats = client(config)?
            .fetch_stats(user.id, Some(date))
            .await
            .with_context(|| format!("Could not load the log for {date}"))?;
        let view = SummaryView::new(date, SyncMode::Online, stats.calorie_goal, stats.entries);
        (user.display_name(), view)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let offline = if view.mode == SyncMode::Offline {
        " (offline, sample data)"
    } else {
        ""
    };
    println!("=== {name}, {}{offline} ===\n", view.date);

    if view.entries.is_empty() {
        eprintln!("No entries for {}", view.date);
        process::exit(2);
    }

    print_entry_table(&view.entries);
    println!();
    print_totals(&Totals::of(&view.entries), view.calorie_goal);

    Ok(())
}
