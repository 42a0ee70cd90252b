use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Notify, oneshot};

use crate::error::RemoteError;
use crate::models::{
    AnalysisResult, DailyStats, EntrySource, FoodEntry, GoalPatch, GoalUpdate, PhotoUpload,
    Registration, Totals, UserProfile,
};
use crate::service::NutritionApi;

/// Scripted in-memory nutrition service.
pub struct FakeApi {
    state: Mutex<FakeState>,
}

pub struct FakeState {
    pub online: bool,
    pub calorie_goal: u32,
    /// Server log, most recent first.
    pub entries: Vec<FoodEntry>,
    /// Queued analysis outcomes; when empty every analysis succeeds with 250 kcal.
    pub analyses: VecDeque<Result<AnalysisResult, RemoteError>>,
    /// Latency of text and photo analysis, after the photo upload signal.
    pub delay: Duration,
    pub fail_stats: bool,
    /// When set, stats are read immediately but only returned once notified.
    pub stats_gate: Option<Arc<Notify>>,
    pub delete_error: Option<RemoteError>,
    pub goal_error: Option<RemoteError>,
    pub next_id: i64,
    pub calls: Vec<String>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                online: true,
                calorie_goal: 2200,
                entries: Vec::new(),
                analyses: VecDeque::new(),
                delay: Duration::ZERO,
                fail_stats: false,
                stats_gate: None,
                delete_error: None,
                goal_error: None,
                next_id: 100,
                calls: Vec::new(),
            }),
        }
    }

    pub fn offline() -> Self {
        let api = Self::new();
        api.with(|s| s.online = false);
        api
    }

    pub fn with(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.lock());
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn server_ids(&self) -> Vec<String> {
        self.lock().entries.iter().map(|e| e.id.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and fail it when the service is unreachable.
    fn record(&self, call: String) -> Result<Duration, RemoteError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.online {
            Ok(state.delay)
        } else {
            Err(RemoteError::Transport("connection refused".to_string()))
        }
    }

    fn analysis(&self, name: &str, source: EntrySource) -> Result<AnalysisResult, RemoteError> {
        let mut state = self.lock();
        let result = state.analyses.pop_front().unwrap_or_else(|| {
            Ok(AnalysisResult {
                name: name.to_string(),
                calories: 250,
                protein: Some(10.0),
                carbs: Some(30.0),
                fat: Some(8.0),
                emoji: Some("🍲".to_string()),
                remote_id: None,
            })
        });
        let mut result = result?;
        if result.remote_id.is_none() {
            state.next_id += 1;
            result.remote_id = Some(state.next_id);
        }
        let entry = result
            .clone()
            .into_entry(source, crate::models::now_local());
        state.entries.insert(0, entry);
        Ok(result)
    }
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

pub fn entry(id: &str, name: &str, calories: u32) -> FoodEntry {
    FoodEntry {
        id: id.to_string(),
        name: name.to_string(),
        calories,
        protein: None,
        carbs: None,
        fat: None,
        emoji: None,
        source: EntrySource::Manual,
        logged_at: NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap(),
    }
}

pub fn result(name: &str, calories: u32) -> AnalysisResult {
    AnalysisResult {
        name: name.to_string(),
        calories,
        protein: None,
        carbs: None,
        fat: None,
        emoji: None,
        remote_id: None,
    }
}

pub fn jpeg() -> PhotoUpload {
    PhotoUpload {
        file_name: "lunch.jpg".to_string(),
        mime_type: "image/jpeg".to_string(),
        bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
    }
}

#[async_trait]
impl NutritionApi for FakeApi {
    async fn register_user(&self, registration: &Registration) -> Result<UserProfile, RemoteError> {
        self.record(format!("register:{}", registration.user_id))?;
        let mut profile = UserProfile::new(registration.user_id);
        profile.calorie_goal = self.lock().calorie_goal;
        profile.first_name.clone_from(&registration.first_name);
        profile.username.clone_from(&registration.username);
        Ok(profile)
    }

    async fn fetch_stats(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<DailyStats, RemoteError> {
        self.record(format!("stats:{user_id}"))?;
        let (stats, gate) = {
            let state = self.lock();
            if state.fail_stats {
                return Err(RemoteError::Api {
                    status: 500,
                    message: "Internal Server Error".to_string(),
                });
            }
            let totals = Totals::of(&state.entries);
            let stats = DailyStats {
                user_id,
                date: date.unwrap_or_else(|| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
                total_calories: totals.calories,
                calorie_goal: state.calorie_goal,
                total_protein: totals.protein,
                total_carbs: totals.carbs,
                total_fat: totals.fat,
                entries: state.entries.clone(),
            };
            (stats, state.stats_gate.clone())
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(stats)
    }

    async fn update_user_goals(
        &self,
        user_id: i64,
        patch: &GoalPatch,
    ) -> Result<GoalUpdate, RemoteError> {
        self.record(format!("goals:{user_id}"))?;
        let mut state = self.lock();
        if let Some(err) = state.goal_error.clone() {
            return Err(err);
        }
        if let Some(goal) = patch.calorie_goal {
            state.calorie_goal = goal;
        }
        Ok(GoalUpdate {
            calorie_goal: i64::from(state.calorie_goal),
            weight: patch.weight,
        })
    }

    async fn submit_text_food(
        &self,
        user_id: i64,
        text: &str,
    ) -> Result<AnalysisResult, RemoteError> {
        let delay = self.record(format!("text:{user_id}:{text}"))?;
        tokio::time::sleep(delay).await;
        self.analysis(text, EntrySource::TextAi)
    }

    async fn submit_photo_food(
        &self,
        user_id: i64,
        photo: PhotoUpload,
        uploaded: oneshot::Sender<()>,
    ) -> Result<AnalysisResult, RemoteError> {
        let delay = self.record(format!("photo:{user_id}:{}", photo.file_name))?;
        let _ = uploaded.send(());
        tokio::time::sleep(delay).await;
        self.analysis("Photo meal", EntrySource::PhotoAi)
    }

    async fn delete_food(&self, entry_id: i64, user_id: i64) -> Result<(), RemoteError> {
        self.record(format!("delete:{entry_id}:{user_id}"))?;
        let mut state = self.lock();
        if let Some(err) = state.delete_error.clone() {
            return Err(err);
        }
        let id = entry_id.to_string();
        let before = state.entries.len();
        state.entries.retain(|e| e.id != id);
        if state.entries.len() == before {
            return Err(RemoteError::Api {
                status: 404,
                message: "Log entry not found.".to_string(),
            });
        }
        Ok(())
    }
}
