//! The host environment the client runs inside: who the acting user is and
//! how to give haptic feedback. Passed explicitly to whatever needs it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

impl HostUser {
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref().filter(|s| !s.is_empty()) {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactStyle {
    Light,
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
}

/// Fire-and-forget feedback. Implementations must not block or fail.
pub trait Haptics: Send + Sync {
    fn impact(&self, style: ImpactStyle);
    fn notify(&self, kind: NotificationKind);
}

pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn impact(&self, _style: ImpactStyle) {}
    fn notify(&self, _kind: NotificationKind) {}
}

#[derive(Clone)]
pub struct HostContext {
    pub user: Option<HostUser>,
    pub haptics: Arc<dyn Haptics>,
}

impl HostContext {
    #[must_use]
    pub fn new(user: Option<HostUser>) -> Self {
        Self {
            user,
            haptics: Arc::new(NoHaptics),
        }
    }

    #[must_use]
    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    pub fn tap(&self) {
        self.haptics.impact(ImpactStyle::Light);
    }

    pub fn success(&self) {
        self.haptics.notify(NotificationKind::Success);
    }

    pub fn error(&self) {
        self.haptics.notify(NotificationKind::Error);
    }
}
