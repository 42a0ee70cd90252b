//! The session's daily log: an optimistic local copy kept loosely aligned
//! with the nutrition service.
//!
//! Local mutations apply immediately and are never rolled back. The service
//! is synced on start and on [`LogReconciler::refresh`]; when it cannot be
//! reached the log runs in offline mode on a placeholder set. Aggregates are
//! always computed from the current entries.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Local;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{GoalUpdateError, RemoteError};
use crate::host::HostUser;
use crate::models::{
    DailyStats, FoodEntry, GoalPatch, Registration, Totals, UserProfile,
    parse_remote_id, placeholder_log, resolve_calorie_goal,
};
use crate::service::NutritionApi;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Not yet initialized.
    Unsynced,
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    EntryAdded(FoodEntry),
    EntryRemoved(FoodEntry),
    Synced { entries: usize, calorie_goal: u32 },
    WentOffline(String),
    GoalChanged(u32),
    /// A best-effort remote call failed; the local change stands.
    Notice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Touch {
    Added,
    Removed,
}

struct LogState {
    entries: Vec<FoodEntry>,
    profile: UserProfile,
    mode: SyncMode,
    /// Bumped on every local mutation.
    generation: u64,
    /// Fetches started but not yet applied.
    syncs_in_flight: usize,
    /// Latest mutation per entry id made while a fetch was in flight.
    touched: HashMap<String, (u64, Touch)>,
    goal_changed_at: Option<u64>,
}

impl LogState {
    fn touch(&mut self, id: &str, touch: Touch) {
        self.generation += 1;
        if self.syncs_in_flight > 0 {
            self.touched.insert(id.to_string(), (self.generation, touch));
        }
    }

    fn touch_goal(&mut self) {
        self.generation += 1;
        if self.syncs_in_flight > 0 {
            self.goal_changed_at = Some(self.generation);
        }
    }

    fn touched_since(&self, id: &str, started: u64) -> Option<Touch> {
        self.touched
            .get(id)
            .filter(|(generation, _)| *generation > started)
            .map(|(_, touch)| *touch)
    }

    fn goal_changed_since(&self, started: u64) -> bool {
        self.goal_changed_at.is_some_and(|generation| generation > started)
    }

    /// Entries a fetch started at `started` must not drop: local-only ones and
    /// anything added after the fetch went out.
    fn kept_through_sync(&self, started: u64) -> Vec<FoodEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_local() || self.touched_since(&e.id, started) == Some(Touch::Added))
            .cloned()
            .collect()
    }

    fn finish_sync(&mut self) {
        self.syncs_in_flight = self.syncs_in_flight.saturating_sub(1);
        if self.syncs_in_flight == 0 {
            self.touched.clear();
            self.goal_changed_at = None;
        }
    }
}

/// A fetch in flight. Dropping it, including when the fetching future is
/// itself dropped, ends the fetch's claim on the mutation journal.
struct InFlight<'a> {
    log: &'a LogReconciler,
    started: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.log.write().finish_sync();
    }
}

pub struct LogReconciler {
    api: Arc<dyn NutritionApi>,
    user_id: i64,
    state: RwLock<LogState>,
    events: broadcast::Sender<LogEvent>,
}

impl LogReconciler {
    /// Starts on the placeholder log with the default goal until initialized.
    pub fn new(api: Arc<dyn NutritionApi>, user_id: i64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            user_id,
            state: RwLock::new(LogState {
                entries: placeholder_log(Local::now().date_naive()),
                profile: UserProfile::new(user_id),
                mode: SyncMode::Unsynced,
                generation: 0,
                syncs_in_flight: 0,
                touched: HashMap::new(),
                goal_changed_at: None,
            }),
            events,
        }
    }

    /// Register the user and load today's log. Any failure switches to
    /// offline mode; nothing is retried.
    pub async fn initialize(&self, user: &HostUser) -> SyncMode {
        let registration = Registration {
            user_id: self.user_id,
            first_name: Some(user.first_name.clone()),
            username: user.username.clone(),
            calorie_goal: None,
        };

        let sync = self.begin_sync();
        let started = sync.started;
        match self.sync(&registration).await {
            Ok((profile, stats)) => {
                self.apply_sync(Some(profile), stats, started);
                SyncMode::Online
            }
            Err(err) => {
                warn!(user_id = self.user_id, error = %err, "nutrition service unavailable, working offline");
                let mut profile = UserProfile::new(self.user_id);
                profile.first_name = Some(user.first_name.clone());
                profile.username.clone_from(&user.username);
                {
                    let mut state = self.write();
                    let mut entries = state.kept_through_sync(started);
                    entries.extend(placeholder_log(Local::now().date_naive()));
                    state.entries = entries;
                    if !state.goal_changed_since(started) {
                        state.profile = profile;
                    }
                    state.mode = SyncMode::Offline;
                }
                self.publish(LogEvent::WentOffline(err.to_string()));
                SyncMode::Offline
            }
        }
    }

    async fn sync(
        &self,
        registration: &Registration,
    ) -> Result<(UserProfile, DailyStats), RemoteError> {
        let profile = self.api.register_user(registration).await?;
        let stats = self.api.fetch_stats(self.user_id, None).await?;
        Ok((profile, stats))
    }

    /// Re-fetch today's log. Server entries replace everything except
    /// local-only entries, which stay at the head. Changes made while the
    /// fetch is in flight survive it.
    pub async fn refresh(&self) -> Result<(), RemoteError> {
        let sync = self.begin_sync();
        match self.api.fetch_stats(self.user_id, None).await {
            Ok(stats) => {
                self.apply_sync(None, stats, sync.started);
                Ok(())
            }
            Err(err) => {
                warn!(user_id = self.user_id, error = %err, "refresh failed");
                self.publish(LogEvent::Notice(format!("Could not refresh: {err}")));
                Err(err)
            }
        }
    }

    /// Count a fetch as in flight until the returned guard drops.
    fn begin_sync(&self) -> InFlight<'_> {
        let mut state = self.write();
        state.syncs_in_flight += 1;
        InFlight {
            log: self,
            started: state.generation,
        }
    }

    fn apply_sync(&self, profile: Option<UserProfile>, stats: DailyStats, started: u64) {
        let (count, goal, was_offline) = {
            let mut state = self.write();
            let was_offline = state.mode == SyncMode::Offline;
            // A goal accepted after the fetch went out is newer than the snapshot
            if !state.goal_changed_since(started) {
                if let Some(profile) = profile {
                    state.profile = profile;
                }
                state.profile.calorie_goal = stats.calorie_goal;
            }

            let mut entries = state.kept_through_sync(started);
            let fetched: Vec<FoodEntry> = stats
                .entries
                .into_iter()
                .filter(|e| {
                    state.touched_since(&e.id, started) != Some(Touch::Removed)
                        && !entries.iter().any(|kept| kept.id == e.id)
                })
                .collect();
            entries.extend(fetched);
            state.entries = entries;
            state.mode = SyncMode::Online;
            (state.entries.len(), state.profile.calorie_goal, was_offline)
        };

        if was_offline {
            info!(user_id = self.user_id, "nutrition service reachable again");
        }
        info!(user_id = self.user_id, entries = count, calorie_goal = goal, "log synced");
        self.publish(LogEvent::Synced {
            entries: count,
            calorie_goal: goal,
        });
    }

    /// Insert at the head of the log. An entry with the same id is replaced.
    pub fn add_entry(&self, entry: FoodEntry) {
        {
            let mut state = self.write();
            state.touch(&entry.id, Touch::Added);
            state.entries.retain(|e| e.id != entry.id);
            state.entries.insert(0, entry.clone());
        }
        debug!(id = %entry.id, calories = entry.calories, "entry added");
        self.publish(LogEvent::EntryAdded(entry));
    }

    pub fn remove_entry(&self, id: &str) -> Option<FoodEntry> {
        let removed = {
            let mut state = self.write();
            state.touch(id, Touch::Removed);
            let index = state.entries.iter().position(|e| e.id == id)?;
            state.entries.remove(index)
        };
        debug!(id, "entry removed");
        self.publish(LogEvent::EntryRemoved(removed.clone()));
        Some(removed)
    }

    /// Remove locally, then delete on the service when the id came from it.
    /// The local removal stands even when the remote call fails.
    pub async fn delete_entry(&self, id: &str) -> Result<Option<FoodEntry>, RemoteError> {
        let removed = self.remove_entry(id);
        let Some(remote_id) = parse_remote_id(id) else {
            return Ok(removed);
        };

        if let Err(err) = self.api.delete_food(remote_id, self.user_id).await {
            warn!(id, error = %err, "remote delete failed");
            self.publish(LogEvent::Notice(format!(
                "Removed locally, but the server copy could not be deleted: {err}"
            )));
            return Err(err);
        }
        Ok(removed)
    }

    /// Send a goal/biometrics patch. The profile only changes once the
    /// service accepts it.
    pub async fn update_goals(&self, patch: GoalPatch) -> Result<UserProfile, GoalUpdateError> {
        patch.validate()?;
        let update = match self.api.update_user_goals(self.user_id, &patch).await {
            Ok(update) => update,
            Err(err) => {
                warn!(error = %err, "goal update rejected");
                self.publish(LogEvent::Notice(format!("Could not update goals: {err}")));
                return Err(err.into());
            }
        };

        let profile = {
            let mut state = self.write();
            state.touch_goal();
            let profile = &mut state.profile;
            profile.calorie_goal = resolve_calorie_goal(Some(update.calorie_goal));
            profile.weight = update.weight.or(patch.weight);
            if patch.height.is_some() {
                profile.height = patch.height;
            }
            if patch.age.is_some() {
                profile.age = patch.age;
            }
            if patch.gender.is_some() {
                profile.gender = patch.gender;
            }
            profile.clone()
        };
        info!(calorie_goal = profile.calorie_goal, "goals updated");
        self.publish(LogEvent::GoalChanged(profile.calorie_goal));
        Ok(profile)
    }

    /// Snapshot of the log, most recent first.
    #[must_use]
    pub fn entries(&self) -> Vec<FoodEntry> {
        self.read().entries.clone()
    }

    #[must_use]
    pub fn entry(&self, id: &str) -> Option<FoodEntry> {
        self.read().entries.iter().find(|e| e.id == id).cloned()
    }

    #[must_use]
    pub fn totals(&self) -> Totals {
        Totals::of(&self.read().entries)
    }

    #[must_use]
    pub fn total_calories(&self) -> u32 {
        self.totals().calories
    }

    #[must_use]
    pub fn total_protein(&self) -> f64 {
        self.totals().protein
    }

    #[must_use]
    pub fn total_carbs(&self) -> f64 {
        self.totals().carbs
    }

    #[must_use]
    pub fn total_fat(&self) -> f64 {
        self.totals().fat
    }

    #[must_use]
    pub fn calorie_goal(&self) -> u32 {
        self.read().profile.calorie_goal
    }

    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.totals().remaining(self.calorie_goal())
    }

    #[must_use]
    pub fn profile(&self) -> UserProfile {
        self.read().profile.clone()
    }

    #[must_use]
    pub fn mode(&self) -> SyncMode {
        self.read().mode
    }

    #[must_use]
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: LogEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, LogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
