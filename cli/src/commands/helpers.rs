use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nibble_core::models::{FoodEntry, Totals};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD, today or yesterday")
            }),
        },
    }
}

pub(crate) fn print_entry_table(entries: &[FoodEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "")]
        emoji: String,
        #[tabled(rename = "Food")]
        name: String,
        #[tabled(rename = "kcal")]
        calories: u32,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            id: truncate(&e.id, 14),
            time: e.time(),
            emoji: e.emoji.clone().unwrap_or_default(),
            name: truncate(&e.name, 35),
            calories: e.calories,
            protein: grams(e.protein),
            carbs: grams(e.carbs),
            fat: grams(e.fat),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_totals(totals: &Totals, goal: u32) {
    let cal = totals.calories;
    let p = no_neg_zero(totals.protein);
    let c = no_neg_zero(totals.carbs);
    let f = no_neg_zero(totals.fat);
    println!("  TOTAL: {cal} kcal | P:{p:.0}g C:{c:.0}g F:{f:.0}g");
    println!("  GOAL: {goal} kcal");
    let remaining = totals.remaining(goal);
    if remaining >= 0 {
        println!("  REMAINING: {remaining} kcal");
    } else {
        let over = -remaining;
        println!("  OVER BY: {over} kcal");
    }
}

/// One-line description of a logged entry.
pub(crate) fn describe(entry: &FoodEntry) -> String {
    let emoji = entry
        .emoji
        .as_deref()
        .map(|e| format!("{e} "))
        .unwrap_or_default();
    let name = &entry.name;
    let cal = entry.calories;
    let p = grams(entry.protein);
    let c = grams(entry.carbs);
    let f = grams(entry.fat);
    format!("{emoji}{name} — {cal} kcal | P:{p} C:{c} F:{f}")
}

pub(crate) fn grams(v: Option<f64>) -> String {
    v.map_or("-".into(), |g| format!("{:.0}g", no_neg_zero(g)))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
