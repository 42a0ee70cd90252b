//! HTTP client for the nutrition service.
//!
//! JSON over HTTP for everything except photo analysis, which is a multipart
//! upload. Non-2xx responses, undecodable bodies and network failures all come
//! back as [`RemoteError`].

pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::RemoteError;
use crate::models::{
    AnalysisResult, DailyStats, GoalPatch, GoalUpdate, PhotoUpload, Registration, UserProfile,
};
use crate::service::NutritionApi;

pub use wire::HealthStatus;
use wire::{
    AddTextRequest, AnalysisResponse, ErrorBody, ProfileResponse, StatsResponse,
    analysis_to_result, profile_to_user, stats_to_daily,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Whole-request timeout, including the time the service spends on inference.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteClient {
    pub fn new(config: &ClientConfig) -> Result<Self, RemoteError> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "nibble/{} (food diary)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })
    }

    fn json_request(&self, method: Method, path: &str) -> Result<RequestBuilder, RemoteError> {
        Ok(self
            .client
            .request(method, self.endpoint(path)?)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    pub async fn health(&self) -> Result<HealthStatus, RemoteError> {
        let resp = self.json_request(Method::GET, "health")?.send().await?;
        read_json(resp).await
    }
}

#[async_trait]
impl NutritionApi for RemoteClient {
    async fn register_user(&self, registration: &Registration) -> Result<UserProfile, RemoteError> {
        debug!(user_id = registration.user_id, "registering user");
        let resp = self
            .json_request(Method::POST, "api/init-user")?
            .json(registration)
            .send()
            .await?;
        let profile: ProfileResponse = read_json(resp).await?;
        Ok(profile_to_user(profile))
    }

    async fn fetch_stats(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<DailyStats, RemoteError> {
        let mut query = vec![("user_id", user_id.to_string())];
        if let Some(date) = date {
            query.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        debug!(user_id, ?date, "fetching stats");
        let resp = self
            .json_request(Method::GET, "api/stats")?
            .query(&query)
            .send()
            .await?;
        let stats: StatsResponse = read_json(resp).await?;
        Ok(stats_to_daily(
            stats,
            date.unwrap_or_else(|| Local::now().date_naive()),
        ))
    }

    async fn update_user_goals(
        &self,
        user_id: i64,
        patch: &GoalPatch,
    ) -> Result<GoalUpdate, RemoteError> {
        debug!(user_id, "patching goals");
        let resp = self
            .json_request(Method::PATCH, &format!("api/user/{user_id}"))?
            .json(patch)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn submit_text_food(
        &self,
        user_id: i64,
        text: &str,
    ) -> Result<AnalysisResult, RemoteError> {
        debug!(user_id, len = text.len(), "submitting text");
        let resp = self
            .json_request(Method::POST, "api/add-text")?
            .json(&AddTextRequest { user_id, text })
            .send()
            .await?;
        let analysis: AnalysisResponse = read_json(resp).await?;
        Ok(analysis_to_result(analysis))
    }

    async fn submit_photo_food(
        &self,
        user_id: i64,
        photo: PhotoUpload,
        uploaded: oneshot::Sender<()>,
    ) -> Result<AnalysisResult, RemoteError> {
        debug!(user_id, bytes = photo.bytes.len(), mime = %photo.mime_type, "uploading photo");
        let length = photo.bytes.len() as u64;
        let part = Part::stream_with_length(upload_body(photo.bytes, uploaded), length)
            .file_name(photo.file_name)
            .mime_str(&photo.mime_type)?;
        let form = Form::new()
            .text("user_id", user_id.to_string())
            .part("file", part);

        let resp = self
            .client
            .post(self.endpoint("api/analyze-photo")?)
            .multipart(form)
            .send()
            .await?;
        let analysis: AnalysisResponse = read_json(resp).await?;
        Ok(analysis_to_result(analysis))
    }

    async fn delete_food(&self, entry_id: i64, user_id: i64) -> Result<(), RemoteError> {
        debug!(entry_id, user_id, "deleting entry");
        let resp = self
            .json_request(Method::DELETE, &format!("api/food/{entry_id}"))?
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        expect_success(resp).await
    }
}

/// Stream the photo in chunks and signal `uploaded` when the last chunk has
/// been handed to the transport.
fn upload_body(bytes: Vec<u8>, uploaded: oneshot::Sender<()>) -> reqwest::Body {
    let bytes = Bytes::from(bytes);
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(UPLOAD_CHUNK)
        .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK).min(bytes.len())))
        .collect();
    let last = chunks.len().saturating_sub(1);
    let mut uploaded = Some(uploaded);

    let stream = stream::iter(chunks.into_iter().enumerate()).map(move |(i, chunk)| {
        if i == last {
            if let Some(tx) = uploaded.take() {
                let _ = tx.send(());
            }
        }
        Ok::<_, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

fn parse_base_url(raw: &str) -> Result<Url, RemoteError> {
    let invalid = |reason: String| RemoteError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("expected an http:// or https:// URL".to_string()));
    }
    // Url::join drops the last path segment unless the base ends in '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    let status = resp.status();
    let body = resp.bytes().await?;
    if !status.is_success() {
        return Err(api_error(status, &body));
    }
    serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(e.to_string()))
}

async fn expect_success(resp: Response) -> Result<(), RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.bytes().await.unwrap_or_default();
    Err(api_error(status, &body))
}

/// Build the error for a non-2xx response: the body's `detail` when present,
/// otherwise the status reason phrase.
#[must_use]
pub fn api_error(status: StatusCode, body: &[u8]) -> RemoteError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
        });
    RemoteError::Api {
        status: status.as_u16(),
        message,
    }
}
