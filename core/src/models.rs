use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

pub const DEFAULT_CALORIE_GOAL: u32 = 2500;
pub const MAX_TEXT_LEN: usize = 500;
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;
pub const PHOTO_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];
pub const MEAL_EMOJIS: &[&str] = &[
    "🍗", "🥗", "🍕", "🍜", "🥩", "🥣", "🍎", "🍌", "🧁", "🥤", "🍳", "🫐",
];

const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Manual,
    TextAi,
    PhotoAi,
    Placeholder,
}

impl EntrySource {
    /// Map the service's `source` column. Unknown values are treated as manual.
    #[must_use]
    pub fn from_wire(source: &str) -> Self {
        match source {
            "text_ai" => Self::TextAi,
            "photo_ai" => Self::PhotoAi,
            _ => Self::Manual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodEntry {
    pub id: String,
    pub name: String,
    pub calories: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub source: EntrySource,
    pub logged_at: NaiveDateTime,
}

impl FoodEntry {
    /// Display time of day, `HH:MM`.
    #[must_use]
    pub fn time(&self) -> String {
        self.logged_at.format("%H:%M").to_string()
    }

    /// True for entries that only exist on this device.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    /// The service's log id, when this entry was issued by the service.
    #[must_use]
    pub fn remote_id(&self) -> Option<i64> {
        parse_remote_id(&self.id)
    }
}

#[must_use]
pub fn parse_remote_id(id: &str) -> Option<i64> {
    id.parse::<i64>().ok().filter(|n| *n > 0)
}

#[must_use]
pub fn local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4())
}

#[must_use]
pub fn random_meal_emoji() -> String {
    MEAL_EMOJIS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("🍽️")
        .to_string()
}

/// Structured nutrition facts produced by one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub name: String,
    pub calories: u32,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub emoji: Option<String>,
    /// Id of the log entry the service created, `None` for purely local results.
    pub remote_id: Option<i64>,
}

impl AnalysisResult {
    #[must_use]
    pub fn into_entry(self, source: EntrySource, logged_at: NaiveDateTime) -> FoodEntry {
        let id = self.remote_id.map_or_else(local_id, |id| id.to_string());
        FoodEntry {
            id,
            name: self.name,
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            emoji: self.emoji,
            source,
            logged_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub calorie_goal: u32,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub created_at: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            calorie_goal: DEFAULT_CALORIE_GOAL,
            weight: None,
            height: None,
            age: None,
            gender: None,
            first_name: None,
            username: None,
            created_at: None,
        }
    }
}

/// Resolve a goal reported by the service to a usable positive value.
#[must_use]
pub fn resolve_calorie_goal(goal: Option<i64>) -> u32 {
    goal.and_then(|g| u32::try_from(g).ok())
        .filter(|g| *g > 0)
        .unwrap_or(DEFAULT_CALORIE_GOAL)
}

/// Request body for registering or re-syncing the acting user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calorie_goal: Option<u32>,
}

impl Registration {
    pub fn new(user_id: i64) -> Result<Self, ValidationError> {
        validate_user_id(user_id)?;
        Ok(Self {
            user_id,
            first_name: None,
            username: None,
            calorie_goal: None,
        })
    }
}

pub fn validate_user_id(user_id: i64) -> Result<(), ValidationError> {
    if user_id <= 0 {
        return Err(ValidationError::InvalidUserId(user_id));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub user_id: i64,
    pub date: NaiveDate,
    pub total_calories: u32,
    pub calorie_goal: u32,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub entries: Vec<FoodEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub calories: u32,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Totals {
    /// Sum a log. Absent macros count as zero.
    #[must_use]
    pub fn of(entries: &[FoodEntry]) -> Self {
        entries.iter().fold(Self::default(), |acc, e| Self {
            calories: acc.calories.saturating_add(e.calories),
            protein: acc.protein + e.protein.unwrap_or(0.0),
            carbs: acc.carbs + e.carbs.unwrap_or(0.0),
            fat: acc.fat + e.fat.unwrap_or(0.0),
        })
    }

    /// Calories left against `goal`; negative once the goal is exceeded.
    #[must_use]
    pub fn remaining(&self, goal: u32) -> i64 {
        i64::from(goal) - i64::from(self.calories)
    }
}

/// Partial update of the user's goal and biometrics. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GoalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calorie_goal: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl GoalPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calorie_goal.is_none()
            && self.weight.is_none()
            && self.height.is_none()
            && self.age.is_none()
            && self.gender.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyPatch);
        }
        if let Some(goal) = self.calorie_goal {
            check_range("calorie_goal", f64::from(goal), 500, 10_000)?;
        }
        if let Some(weight) = self.weight {
            check_range("weight", weight, 20, 500)?;
        }
        if let Some(height) = self.height {
            check_range("height", height, 50, 300)?;
        }
        if let Some(age) = self.age {
            check_range("age", f64::from(age), 1, 120)?;
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: u32, max: u32) -> Result<(), ValidationError> {
    if !value.is_finite() || value < f64::from(min) || value > f64::from(max) {
        return Err(ValidationError::OutOfRange { field, min, max });
    }
    Ok(())
}

/// The service's reply to a goal patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalUpdate {
    pub calorie_goal: i64,
    pub weight: Option<f64>,
}

/// A meal typed in by hand, never sent through the analysis service.
#[derive(Debug, Clone, Default)]
pub struct ManualEntry {
    pub name: String,
    pub calories: String,
    pub protein: Option<String>,
    pub carbs: Option<String>,
    pub fat: Option<String>,
}

impl ManualEntry {
    pub fn into_entry(self, logged_at: NaiveDateTime) -> Result<FoodEntry, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.calories.trim().is_empty() {
            return Err(ValidationError::MissingCalories);
        }
        Ok(FoodEntry {
            id: local_id(),
            name: name.to_string(),
            calories: parse_calories(&self.calories),
            protein: self.protein.as_deref().and_then(parse_grams),
            carbs: self.carbs.as_deref().and_then(parse_grams),
            fat: self.fat.as_deref().and_then(parse_grams),
            emoji: Some(random_meal_emoji()),
            source: EntrySource::Manual,
            logged_at,
        })
    }
}

/// Best-effort calorie parse: anything that is not a non-negative number becomes 0.
/// Fractions are truncated.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn parse_calories(s: &str) -> u32 {
    let s = s.trim();
    if let Ok(n) = s.parse::<u32>() {
        return n;
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v.min(f64::from(u32::MAX)) as u32,
        _ => 0,
    }
}

/// Parse a macro amount in grams. Blank or invalid input means "unknown".
#[must_use]
pub fn parse_grams(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bytes.is_empty() {
            return Err(ValidationError::MissingPhoto);
        }
        if !PHOTO_MIME_TYPES.contains(&self.mime_type.as_str()) {
            return Err(ValidationError::UnsupportedImageType(self.mime_type.clone()));
        }
        if self.bytes.len() > MAX_PHOTO_BYTES {
            return Err(ValidationError::PhotoTooLarge {
                max: MAX_PHOTO_BYTES,
            });
        }
        Ok(())
    }
}

/// Guess an image MIME type from a file extension.
#[must_use]
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Trim and length-check a free-text food description.
pub fn validate_text(text: &str) -> Result<String, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TextTooLong { max: MAX_TEXT_LEN });
    }
    Ok(text.to_string())
}

/// The fixed log shown when the service cannot be reached, most recent first.
#[must_use]
pub fn placeholder_log(date: NaiveDate) -> Vec<FoodEntry> {
    const ROWS: &[(&str, &str, u32, f64, f64, f64, u32, u32, &str)] = &[
        ("placeholder-4", "Green apple smoothie", 160, 3.0, 35.0, 1.0, 17, 30, "🥤"),
        ("placeholder-3", "Greek yogurt", 130, 18.0, 8.0, 3.0, 16, 0, "🥛"),
        ("placeholder-2", "Chicken breast with rice", 480, 45.0, 42.0, 8.0, 13, 15, "🍗"),
        ("placeholder-1", "Oatmeal with banana", 380, 12.0, 65.0, 6.0, 8, 30, "🥣"),
    ];

    ROWS.iter()
        .map(
            |&(id, name, calories, protein, carbs, fat, hour, minute, emoji)| FoodEntry {
                id: id.to_string(),
                name: name.to_string(),
                calories,
                protein: Some(protein),
                carbs: Some(carbs),
                fat: Some(fat),
                emoji: Some(emoji.to_string()),
                source: EntrySource::Placeholder,
                logged_at: date.and_time(
                    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN),
                ),
            },
        )
        .collect()
}

#[must_use]
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}
