use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::oneshot;

use crate::error::RemoteError;
use crate::models::{
    AnalysisResult, DailyStats, GoalPatch, GoalUpdate, PhotoUpload, Registration, UserProfile,
};

/// The nutrition service as seen by the client.
///
/// The CLI talks to it with [`crate::remote::RemoteClient`] (reqwest); tests
/// substitute in-memory fakes. Every operation fails with the single
/// [`RemoteError`] shape, so callers need one failure branch.
#[async_trait]
pub trait NutritionApi: Send + Sync {
    /// Create the user once, or update the existing record in place.
    async fn register_user(&self, registration: &Registration) -> Result<UserProfile, RemoteError>;

    /// Stats and entries for `date` (today when `None`), in service order.
    async fn fetch_stats(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<DailyStats, RemoteError>;

    async fn update_user_goals(
        &self,
        user_id: i64,
        patch: &GoalPatch,
    ) -> Result<GoalUpdate, RemoteError>;

    /// The text is opaque to the client; the service infers the food and logs it.
    async fn submit_text_food(&self, user_id: i64, text: &str)
    -> Result<AnalysisResult, RemoteError>;

    /// Upload a photo for analysis. `uploaded` fires once the payload has been
    /// handed to the transport and the service is working on it.
    async fn submit_photo_food(
        &self,
        user_id: i64,
        photo: PhotoUpload,
        uploaded: oneshot::Sender<()>,
    ) -> Result<AnalysisResult, RemoteError>;

    async fn delete_food(&self, entry_id: i64, user_id: i64) -> Result<(), RemoteError>;
}
