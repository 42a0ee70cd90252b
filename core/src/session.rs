use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{GoalUpdateError, RemoteError, SessionError, ValidationError};
use crate::host::{HostContext, HostUser};
use crate::models::{
    EntrySource, FoodEntry, GoalPatch, ManualEntry, PhotoUpload, UserProfile, now_local,
    validate_user_id,
};
use crate::pipeline::{InputSlot, Pipeline, PipelineConfig, PipelineRun, PipelineState, Submission};
use crate::reconciler::LogReconciler;
use crate::service::NutritionApi;

/// What happened to a finished run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The result was committed to the log.
    Logged(FoodEntry),
    /// The run ended in `Error`; the log is untouched.
    Failed(String),
    /// The run was superseded or abandoned; its result was dropped.
    Discarded,
}

/// One acting user's diary session: the log, the analysis pipeline and the
/// host context, wired together.
pub struct Session {
    host: HostContext,
    user: HostUser,
    log: LogReconciler,
    pipeline: Pipeline,
}

impl Session {
    /// Requires a host-supplied user. Syncs with the service, falling back to
    /// offline mode if it cannot be reached.
    pub async fn start(
        api: Arc<dyn NutritionApi>,
        host: HostContext,
        config: PipelineConfig,
    ) -> Result<Self, SessionError> {
        let user = host.user.clone().ok_or(SessionError::NoHostUser)?;
        validate_user_id(user.id)?;

        let log = LogReconciler::new(Arc::clone(&api), user.id);
        let mode = log.initialize(&user).await;
        info!(user_id = user.id, user = %user.display_name(), ?mode, "session started");

        Ok(Self {
            host,
            user,
            log,
            pipeline: Pipeline::new(api, config),
        })
    }

    pub fn begin_text(&self, text: &str) -> Result<PipelineRun, ValidationError> {
        self.begin(Submission::Text(text.to_string()))
    }

    pub fn begin_photo(&self, photo: PhotoUpload) -> Result<PipelineRun, ValidationError> {
        self.begin(Submission::Photo(photo))
    }

    fn begin(&self, submission: Submission) -> Result<PipelineRun, ValidationError> {
        let run = self.pipeline.start(self.user.id, submission)?;
        self.host.tap();
        Ok(run)
    }

    /// Wait for `run` to finish and apply its result, unless another run has
    /// taken its slot in the meantime.
    pub async fn commit(&self, run: &mut PipelineRun) -> RunOutcome {
        let state = run.finish().await;
        if !self.pipeline.release(run) {
            debug!(run = run.id(), "dropping result of a superseded run");
            return RunOutcome::Discarded;
        }

        match state {
            PipelineState::Done(result) => {
                let source = match run.slot() {
                    InputSlot::Text => EntrySource::TextAi,
                    InputSlot::Photo => EntrySource::PhotoAi,
                };
                let entry = result.into_entry(source, now_local());
                self.log.add_entry(entry.clone());
                self.host.success();
                RunOutcome::Logged(entry)
            }
            PipelineState::Error(reason) => {
                self.host.error();
                RunOutcome::Failed(reason)
            }
            PipelineState::Idle | PipelineState::Submitting | PipelineState::Analyzing => {
                RunOutcome::Discarded
            }
        }
    }

    pub async fn add_text(&self, text: &str) -> Result<RunOutcome, ValidationError> {
        let mut run = self.begin_text(text)?;
        Ok(self.commit(&mut run).await)
    }

    pub async fn add_photo(&self, photo: PhotoUpload) -> Result<RunOutcome, ValidationError> {
        let mut run = self.begin_photo(photo)?;
        Ok(self.commit(&mut run).await)
    }

    /// Log a hand-typed meal. Never touches the network.
    pub fn add_manual(&self, manual: ManualEntry) -> Result<FoodEntry, ValidationError> {
        let entry = match manual.into_entry(now_local()) {
            Ok(entry) => entry,
            Err(err) => {
                self.host.error();
                return Err(err);
            }
        };
        self.log.add_entry(entry.clone());
        self.host.success();
        Ok(entry)
    }

    pub async fn delete(&self, id: &str) -> Result<Option<FoodEntry>, RemoteError> {
        self.host.tap();
        self.log.delete_entry(id).await
    }

    pub async fn update_goals(&self, patch: GoalPatch) -> Result<UserProfile, GoalUpdateError> {
        let result = self.log.update_goals(patch).await;
        if result.is_ok() {
            self.host.success();
        } else {
            self.host.error();
        }
        result
    }

    pub async fn refresh(&self) -> Result<(), RemoteError> {
        self.log.refresh().await
    }

    pub fn abandon(&self, slot: InputSlot) {
        self.pipeline.abandon(slot);
    }

    #[must_use]
    pub fn log(&self) -> &LogReconciler {
        &self.log
    }

    #[must_use]
    pub fn host(&self) -> &HostContext {
        &self.host
    }

    #[must_use]
    pub fn user(&self) -> &HostUser {
        &self.user
    }
}
