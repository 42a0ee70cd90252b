//! Analysis runs: turn one text or photo submission into an [`AnalysisResult`].
//!
//! Each run is its own state machine (`Idle → Submitting → [Analyzing] → Done | Error`)
//! driven by a spawned task and observed through a `watch` channel. Runs are
//! grouped by [`InputSlot`]; only the most recently started run in a slot is
//! current, and starting a new one cancels the previous.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PipelineError, RemoteError, ValidationError};
use crate::models::{AnalysisResult, PhotoUpload, validate_text};
use crate::service::NutritionApi;

pub type RunId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSlot {
    Text,
    Photo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Text(String),
    Photo(PhotoUpload),
}

impl Submission {
    #[must_use]
    pub fn slot(&self) -> InputSlot {
        match self {
            Self::Text(_) => InputSlot::Text,
            Self::Photo(_) => InputSlot::Photo,
        }
    }

    /// Reject input that must never reach the network. Text is trimmed.
    pub fn validate(self) -> Result<Self, ValidationError> {
        match self {
            Self::Text(text) => Ok(Self::Text(validate_text(&text)?)),
            Self::Photo(photo) => {
                photo.validate()?;
                Ok(Self::Photo(photo))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    /// Payload is being sent.
    Submitting,
    /// Photo uploaded, waiting for the service to return facts.
    Analyzing,
    Done(AnalysisResult),
    Error(String),
}

impl PipelineState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Submitting | Self::Analyzing)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on one run, submission to result.
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct Pipeline {
    api: Arc<dyn NutritionApi>,
    config: PipelineConfig,
    next_run: AtomicU64,
    current: Mutex<HashMap<InputSlot, (RunId, CancellationToken)>>,
}

impl Pipeline {
    pub fn new(api: Arc<dyn NutritionApi>, config: PipelineConfig) -> Self {
        Self {
            api,
            config,
            next_run: AtomicU64::new(0),
            current: Mutex::new(HashMap::new()),
        }
    }

    /// Create an idle run and make it current for `slot`, cancelling whatever
    /// run held the slot before.
    pub fn begin(&self, slot: InputSlot) -> PipelineRun {
        let id = self.next_run.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        if let Some((previous, token)) = self.slots().insert(slot, (id, cancel.clone())) {
            debug!(run = previous, ?slot, "superseded by run {id}");
            token.cancel();
        }
        PipelineRun::new(id, slot, Arc::clone(&self.api), self.config.timeout, cancel)
    }

    /// Validate, begin and submit in one step. Invalid input leaves the slot's
    /// current run untouched.
    pub fn start(&self, user_id: i64, submission: Submission) -> Result<PipelineRun, ValidationError> {
        let submission = submission.validate()?;
        let mut run = self.begin(submission.slot());
        run.submit(user_id, submission)?;
        Ok(run)
    }

    #[must_use]
    pub fn is_current(&self, run: &PipelineRun) -> bool {
        self.slots()
            .get(&run.slot)
            .is_some_and(|(id, _)| *id == run.id)
    }

    /// Give up the slot if `run` still holds it. Returns whether it did, so a
    /// result is applied at most once and never from a superseded run.
    pub fn release(&self, run: &PipelineRun) -> bool {
        let mut slots = self.slots();
        if slots.get(&run.slot).is_some_and(|(id, _)| *id == run.id) {
            slots.remove(&run.slot);
            true
        } else {
            false
        }
    }

    /// Cancel the current run in `slot`, if any.
    pub fn abandon(&self, slot: InputSlot) {
        if let Some((id, token)) = self.slots().remove(&slot) {
            debug!(run = id, ?slot, "abandoned");
            token.cancel();
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<InputSlot, (RunId, CancellationToken)>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one run. Dropping it cancels the run.
pub struct PipelineRun {
    id: RunId,
    slot: InputSlot,
    api: Arc<dyn NutritionApi>,
    timeout: Duration,
    cancel: CancellationToken,
    /// Present until the run is submitted; the driving task owns it after that.
    state_tx: Option<watch::Sender<PipelineState>>,
    state: watch::Receiver<PipelineState>,
}

impl PipelineRun {
    fn new(
        id: RunId,
        slot: InputSlot,
        api: Arc<dyn NutritionApi>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state) = watch::channel(PipelineState::Idle);
        Self {
            id,
            slot,
            api,
            timeout,
            cancel,
            state_tx: Some(state_tx),
            state,
        }
    }

    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }

    #[must_use]
    pub fn slot(&self) -> InputSlot {
        self.slot
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Bind the payload and start the run. Rejected input leaves the run `Idle`.
    pub fn submit(&mut self, user_id: i64, submission: Submission) -> Result<(), ValidationError> {
        if submission.slot() != self.slot {
            return Err(ValidationError::SlotMismatch);
        }
        if self.state_tx.is_none() {
            return Err(ValidationError::RunNotIdle);
        }
        let submission = submission.validate()?;
        let Some(tx) = self.state_tx.take() else {
            return Err(ValidationError::RunNotIdle);
        };

        debug!(run = self.id, slot = ?self.slot, "submitting");
        tx.send_replace(PipelineState::Submitting);
        tokio::spawn(drive(
            Arc::clone(&self.api),
            user_id,
            submission,
            self.timeout,
            self.cancel.clone(),
            tx,
            self.id,
        ));
        Ok(())
    }

    /// Wait for a terminal state. A run that was never submitted stays `Idle`.
    pub async fn finish(&mut self) -> PipelineState {
        if self.state_tx.is_some() {
            return PipelineState::Idle;
        }
        let finished = self
            .state
            .wait_for(PipelineState::is_terminal)
            .await
            .map(|state| state.clone());
        finished.unwrap_or_else(|_| PipelineState::Error("Analysis stopped unexpectedly".to_string()))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PipelineRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive(
    api: Arc<dyn NutritionApi>,
    user_id: i64,
    submission: Submission,
    timeout: Duration,
    cancel: CancellationToken,
    tx: watch::Sender<PipelineState>,
    run: RunId,
) {
    let outcome = tokio::select! {
        () = cancel.cancelled() => Err(PipelineError::Cancelled),
        res = tokio::time::timeout(timeout, analyze(api.as_ref(), user_id, submission, &tx)) => {
            match res {
                Ok(result) => result.map_err(PipelineError::from),
                Err(_) => Err(PipelineError::TimedOut(timeout)),
            }
        }
    };

    let state = match outcome {
        Ok(result) => {
            debug!(run, calories = result.calories, "analysis done");
            PipelineState::Done(result)
        }
        Err(err) => {
            debug!(run, error = %err, "analysis failed");
            PipelineState::Error(err.to_string())
        }
    };
    tx.send_replace(state);
}

async fn analyze(
    api: &dyn NutritionApi,
    user_id: i64,
    submission: Submission,
    tx: &watch::Sender<PipelineState>,
) -> Result<AnalysisResult, RemoteError> {
    match submission {
        Submission::Text(text) => api.submit_text_food(user_id, &text).await,
        Submission::Photo(photo) => {
            let (uploaded_tx, mut uploaded_rx) = oneshot::channel();
            let mut call = pin!(api.submit_photo_food(user_id, photo, uploaded_tx));
            let mut uploaded = false;
            loop {
                tokio::select! {
                    biased;
                    sent = &mut uploaded_rx, if !uploaded => {
                        uploaded = true;
                        if sent.is_ok() {
                            tx.send_replace(PipelineState::Analyzing);
                        }
                    }
                    result = &mut call => return result,
                }
            }
        }
    }
}
