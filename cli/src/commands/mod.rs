mod goal;
mod helpers;
mod log;
mod meal;
mod status;
mod summary;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use crate::config::Config;
use crate::host::TerminalHaptics;
use nibble_core::error::SessionError;
use nibble_core::host::HostContext;
use nibble_core::pipeline::PipelineConfig;
use nibble_core::remote::RemoteClient;
use nibble_core::session::Session;

pub(crate) use goal::cmd_goal;
pub(crate) use log::{cmd_add, cmd_manual, cmd_photo};
pub(crate) use meal::cmd_delete;
pub(crate) use status::cmd_health;
pub(crate) use summary::cmd_summary;

pub(super) fn client(config: &Config) -> Result<RemoteClient> {
    RemoteClient::new(&config.client_config())
        .context("Could not configure the nutrition service client")
}

/// Start a session for the configured user. An unreachable service is not an
/// error here: the session comes up in offline mode.
pub(super) async fn open_session(config: &Config, json: bool) -> Result<Session> {
    let host = HostContext::new(config.user.clone())
        .with_haptics(Arc::new(TerminalHaptics::new(!json)));
    let api = Arc::new(client(config)?);
    let pipeline = PipelineConfig {
        timeout: config.timeout.max(PipelineConfig::default().timeout),
    };

    Session::start(api, host, pipeline)
        .await
        .map_err(|err| match err {
            SessionError::NoHostUser => anyhow!(
                "No user configured. Pass --user-id, set NIBBLE_USER_ID, or add user_id to {}",
                config.path_hint()
            ),
            other => anyhow::Error::new(other),
        })
}
