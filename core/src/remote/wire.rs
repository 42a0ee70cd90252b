use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{
    AnalysisResult, DailyStats, EntrySource, FoodEntry, UserProfile, parse_calories,
    resolve_calorie_goal,
};

#[derive(Debug, Serialize)]
pub struct AddTextRequest<'a> {
    pub user_id: i64,
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    pub user_id: i64,
    pub calorie_goal: Option<i64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    pub user_id: i64,
    pub date: String,
    #[serde(default)]
    pub calorie_goal: Option<i64>,
    #[serde(default, deserialize_with = "lenient_calories")]
    pub total_calories: u32,
    #[serde(default)]
    pub total_protein: f64,
    #[serde(default)]
    pub total_carbs: f64,
    #[serde(default)]
    pub total_fat: f64,
    #[serde(default)]
    pub entries: Vec<EntryData>,
}

#[derive(Debug, Deserialize)]
pub struct EntryData {
    pub id: i64,
    pub food_name: String,
    #[serde(deserialize_with = "lenient_calories")]
    pub calories: u32,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub emoji: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub logged_at: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisResponse {
    pub food: String,
    #[serde(deserialize_with = "lenient_calories")]
    pub calories: u32,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub emoji: Option<String>,
    pub log_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model: Option<String>,
}

/// `{"detail": ...}` error body. FastAPI sends either a string or a list of
/// validation problems under `detail`.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        match self.detail? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            serde_json::Value::Array(items) => items
                .into_iter()
                .find_map(|item| item.get("msg")?.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

/// Calories as reported by the service or the oracle behind it. Integers pass
/// through unchanged, fractions are rounded, anything else becomes 0.
fn lenient_calories<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(calories_from_value(&value))
}

#[allow(clippy::cast_sign_loss)]
fn calories_from_value(value: &serde_json::Value) -> u32 {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                u32::try_from(v).unwrap_or(u32::MAX)
            } else {
                match n.as_f64() {
                    Some(v) if v.is_finite() && v >= 0.0 => {
                        v.round().min(f64::from(u32::MAX)) as u32
                    }
                    _ => 0,
                }
            }
        }
        serde_json::Value::String(s) => parse_calories(s),
        _ => 0,
    }
}

fn non_negative(v: Option<f64>) -> Option<f64> {
    v.filter(|g| g.is_finite() && *g >= 0.0)
}

/// Parse the service's `logged_at`. `SQLite` writes `YYYY-MM-DD HH:MM:SS`,
/// other producers use ISO-8601 with a `T` and sometimes an offset.
#[must_use]
pub fn parse_logged_at(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

#[must_use]
pub fn entry_to_food(e: EntryData, day: NaiveDate) -> FoodEntry {
    let logged_at = parse_logged_at(&e.logged_at).unwrap_or_else(|| {
        tracing::warn!(id = e.id, logged_at = %e.logged_at, "unparseable timestamp, using start of day");
        day.and_time(NaiveTime::MIN)
    });

    FoodEntry {
        id: e.id.to_string(),
        name: e.food_name,
        calories: e.calories,
        protein: non_negative(e.protein),
        carbs: non_negative(e.carbs),
        fat: non_negative(e.fat),
        emoji: e.emoji.filter(|s| !s.is_empty()),
        source: e
            .source
            .as_deref()
            .map_or(EntrySource::Manual, EntrySource::from_wire),
        logged_at,
    }
}

#[must_use]
pub fn stats_to_daily(s: StatsResponse, fallback_date: NaiveDate) -> DailyStats {
    let date = NaiveDate::parse_from_str(&s.date, "%Y-%m-%d").unwrap_or(fallback_date);
    DailyStats {
        user_id: s.user_id,
        date,
        total_calories: s.total_calories,
        calorie_goal: resolve_calorie_goal(s.calorie_goal),
        total_protein: s.total_protein,
        total_carbs: s.total_carbs,
        total_fat: s.total_fat,
        entries: s
            .entries
            .into_iter()
            .map(|e| entry_to_food(e, date))
            .collect(),
    }
}

#[must_use]
pub fn profile_to_user(p: ProfileResponse) -> UserProfile {
    UserProfile {
        user_id: p.user_id,
        calorie_goal: resolve_calorie_goal(p.calorie_goal),
        weight: p.weight,
        height: p.height,
        age: p.age.and_then(|a| u32::try_from(a).ok()),
        gender: p.gender,
        first_name: p.first_name,
        username: p.username,
        created_at: p.created_at,
    }
}

#[must_use]
pub fn analysis_to_result(a: AnalysisResponse) -> AnalysisResult {
    AnalysisResult {
        name: a.food,
        calories: a.calories,
        protein: non_negative(a.protein),
        carbs: non_negative(a.carbs),
        fat: non_negative(a.fat),
        emoji: a.emoji.filter(|s| !s.is_empty()),
        remote_id: a.log_id.filter(|id| *id > 0),
    }
}
