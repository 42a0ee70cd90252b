//! In-process HTTP stand-in for the nutrition service, bound to an ephemeral port.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use chrono::Local;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Default)]
struct StubState {
    users: HashMap<i64, StubUser>,
    entries: Vec<StubEntry>,
    next_id: i64,
    failures: HashMap<&'static str, (u16, Option<String>)>,
    last_patch: Option<Value>,
    last_upload: Option<(String, usize)>,
}

struct StubUser {
    calorie_goal: i64,
    weight: Option<f64>,
    first_name: Option<String>,
    username: Option<String>,
}

struct StubEntry {
    id: i64,
    user_id: i64,
    food_name: String,
    calories: u32,
    source: &'static str,
    logged_at: String,
}

impl StubState {
    fn take_failure(&mut self, endpoint: &'static str) -> Result<(), StubError> {
        match self.failures.remove(endpoint) {
            Some((status, detail)) => Err(StubError::Scripted(status, detail)),
            None => Ok(()),
        }
    }

    fn user_exists(&self, user_id: i64) -> Result<(), StubError> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StubError::NotFound(
                "User not found. Call /api/init-user first.".to_string(),
            ))
        }
    }

    fn log(&mut self, user_id: i64, food_name: String, calories: u32, source: &'static str) -> i64 {
        self.next_id += 1;
        self.entries.push(StubEntry {
            id: self.next_id,
            user_id,
            food_name,
            calories,
            source,
            logged_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });
        self.next_id
    }
}

type Shared = Arc<Mutex<StubState>>;

fn lock(state: &Shared) -> MutexGuard<'_, StubState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

enum StubError {
    NotFound(String),
    Scripted(u16, Option<String>),
}

impl IntoResponse for StubError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(detail) => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": detail }))).into_response()
            }
            Self::Scripted(status, detail) => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                match detail {
                    Some(detail) => (status, Json(json!({ "detail": detail }))).into_response(),
                    None => (status, "upstream unavailable").into_response(),
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct InitUser {
    user_id: i64,
    first_name: Option<String>,
    username: Option<String>,
    calorie_goal: Option<i64>,
}

#[derive(Deserialize)]
struct StatsQuery {
    user_id: i64,
    date: Option<String>,
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: i64,
}

#[derive(Deserialize)]
struct AddText {
    user_id: i64,
    text: String,
}

async fn init_user(
    State(state): State<Shared>,
    Json(body): Json<InitUser>,
) -> Result<Json<Value>, StubError> {
    let mut s = lock(&state);
    s.take_failure("init-user")?;
    let user = s.users.entry(body.user_id).or_insert_with(|| StubUser {
        calorie_goal: body.calorie_goal.unwrap_or(2500),
        weight: None,
        first_name: None,
        username: None,
    });
    if body.first_name.is_some() {
        user.first_name = body.first_name;
    }
    if body.username.is_some() {
        user.username = body.username;
    }
    Ok(Json(json!({
        "user_id": body.user_id,
        "calorie_goal": user.calorie_goal,
        "weight": user.weight,
        "first_name": user.first_name,
        "username": user.username,
        "created_at": "2024-01-01 08:00:00",
    })))
}

async fn stats(
    State(state): State<Shared>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, StubError> {
    let mut s = lock(&state);
    s.take_failure("stats")?;
    s.user_exists(query.user_id)?;
    let entries: Vec<Value> = s
        .entries
        .iter()
        .rev()
        .filter(|e| e.user_id == query.user_id)
        .map(|e| {
            json!({
                "id": e.id,
                "food_name": e.food_name,
                "calories": e.calories,
                "protein": null,
                "carbs": null,
                "fat": null,
                "emoji": null,
                "source": e.source,
                "logged_at": e.logged_at,
            })
        })
        .collect();
    let total: u32 = s
        .entries
        .iter()
        .filter(|e| e.user_id == query.user_id)
        .map(|e| e.calories)
        .sum();
    let goal = s.users.get(&query.user_id).map(|u| u.calorie_goal);
    Ok(Json(json!({
        "user_id": query.user_id,
        "date": query.date.unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string()),
        "total_calories": total,
        "calorie_goal": goal,
        "total_protein": 0.0,
        "total_carbs": 0.0,
        "total_fat": 0.0,
        "entries": entries,
    })))
}

async fn update_user(
    State(state): State<Shared>,
    Path(user_id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StubError> {
    let mut s = lock(&state);
    s.take_failure("user")?;
    s.user_exists(user_id)?;
    s.last_patch = Some(body.clone());
    let user = s
        .users
        .get_mut(&user_id)
        .ok_or_else(|| StubError::NotFound("User not found.".to_string()))?;
    if let Some(goal) = body.get("calorie_goal").and_then(Value::as_i64) {
        user.calorie_goal = goal;
    }
    if let Some(weight) = body.get("weight").and_then(Value::as_f64) {
        user.weight = Some(weight);
    }
    Ok(Json(json!({
        "calorie_goal": user.calorie_goal,
        "weight": user.weight,
    })))
}

async fn add_text(
    State(state): State<Shared>,
    Json(body): Json<AddText>,
) -> Result<Json<Value>, StubError> {
    let mut s = lock(&state);
    s.take_failure("add-text")?;
    s.user_exists(body.user_id)?;
    let log_id = s.log(body.user_id, body.text.clone(), 250, "text_ai");
    Ok(Json(json!({
        "food": body.text,
        "calories": 250,
        "protein": 9.5,
        "carbs": 30,
        "fat": 8,
        "emoji": "🍲",
        "log_id": log_id,
    })))
}

async fn analyze_photo(
    State(state): State<Shared>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StubError> {
    let mut user_id = None;
    let mut upload = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => {
                user_id = field.text().await.ok().and_then(|t| t.parse::<i64>().ok());
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                if let Ok(bytes) = field.bytes().await {
                    upload = Some((file_name, bytes.len()));
                }
            }
            _ => {}
        }
    }

    let mut s = lock(&state);
    s.take_failure("analyze-photo")?;
    let user_id = user_id.unwrap_or_default();
    s.user_exists(user_id)?;
    s.last_upload = upload;
    let log_id = s.log(user_id, "Chicken burger".to_string(), 520, "photo_ai");
    Ok(Json(json!({
        "food": "Chicken burger",
        "calories": 520,
        "protein": 32,
        "carbs": 48,
        "fat": 18,
        "emoji": "🍔",
        "log_id": log_id,
    })))
}

async fn delete_food(
    State(state): State<Shared>,
    Path(log_id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, StubError> {
    let mut s = lock(&state);
    s.take_failure("food")?;
    let before = s.entries.len();
    s.entries
        .retain(|e| !(e.id == log_id && e.user_id == query.user_id));
    if s.entries.len() == before {
        return Err(StubError::NotFound("Log entry not found.".to_string()));
    }
    Ok(Json(json!({ "deleted": true, "log_id": log_id })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "model": "stub-vision" }))
}

fn build_router(state: Shared) -> Router {
    Router::new()
        .route("/api/init-user", post(init_user))
        .route("/api/stats", get(stats))
        .route("/api/user/{user_id}", patch(update_user))
        .route("/api/add-text", post(add_text))
        .route("/api/analyze-photo", post(analyze_photo))
        .route("/api/food/{log_id}", delete(delete_food))
        .route("/health", get(health))
        .with_state(state)
}

/// Handle to a running stub; inspection and scripting helpers for tests.
#[derive(Clone)]
pub struct StubService {
    pub base_url: String,
    state: Shared,
}

pub async fn spawn_stub() -> StubService {
    let state = Shared::default();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(Arc::clone(&state));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    StubService {
        base_url: format!("http://{addr}"),
        state,
    }
}

impl StubService {
    pub fn seed_user(&self, user_id: i64, calorie_goal: i64) {
        lock(&self.state).users.insert(
            user_id,
            StubUser {
                calorie_goal,
                weight: None,
                first_name: None,
                username: None,
            },
        );
    }

    pub fn seed_entry(&self, user_id: i64, id: i64, food_name: &str, calories: u32, logged_at: &str) {
        let mut s = lock(&self.state);
        s.next_id = s.next_id.max(id);
        s.entries.push(StubEntry {
            id,
            user_id,
            food_name: food_name.to_string(),
            calories,
            source: "manual",
            logged_at: logged_at.to_string(),
        });
    }

    /// Make the next call to `endpoint` fail with `status`. Without a detail
    /// the body is plain text.
    pub fn fail_next(&self, endpoint: &'static str, status: u16, detail: Option<&str>) {
        lock(&self.state)
            .failures
            .insert(endpoint, (status, detail.map(str::to_string)));
    }

    pub fn user_count(&self) -> usize {
        lock(&self.state).users.len()
    }

    pub fn entry_count(&self, user_id: i64) -> usize {
        lock(&self.state)
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .count()
    }

    pub fn last_patch(&self) -> Option<Value> {
        lock(&self.state).last_patch.clone()
    }

    pub fn last_upload_len(&self) -> Option<usize> {
        lock(&self.state).last_upload.as_ref().map(|(_, len)| *len)
    }

    pub fn last_upload_name(&self) -> Option<String> {
        lock(&self.state)
            .last_upload
            .as_ref()
            .map(|(name, _)| name.clone())
    }
}
