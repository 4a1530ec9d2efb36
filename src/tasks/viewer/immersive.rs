use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::ImmersiveBackend;
use crate::config::ImmersiveConfig;
use crate::events::{ImmersiveMode, SessionHandle, SessionTicket, ViewerCommand};

/// Stands in for an XR runtime: answers requests after `grant-delay` and may
/// end granted sessions on its own after `device-session-limit`.
pub struct SimulatedXrBackend {
    runtime: Handle,
    commands: UnboundedSender<ViewerCommand>,
    grant_delay: Duration,
    deny_requests: bool,
    session_limit: Option<Duration>,
    next_handle: u64,
    live: HashMap<SessionHandle, CancellationToken>,
}

impl SimulatedXrBackend {
    pub fn new(
        runtime: Handle,
        cfg: &ImmersiveConfig,
        commands: UnboundedSender<ViewerCommand>,
    ) -> Self {
        Self {
            runtime,
            commands,
            grant_delay: cfg.grant_delay,
            deny_requests: cfg.deny_requests,
            session_limit: cfg.device_session_limit,
            next_handle: 0,
            live: HashMap::new(),
        }
    }

    pub fn live_sessions(&self) -> usize {
        self.live.len()
    }
}

impl ImmersiveBackend for SimulatedXrBackend {
    fn request_session(&mut self, mode: ImmersiveMode, ticket: SessionTicket) {
        let commands = self.commands.clone();
        let delay = self.grant_delay;

        if self.deny_requests {
            self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = commands.send(ViewerCommand::SessionDenied {
                    ticket,
                    reason: format!("{mode} session permission denied"),
                });
            });
            return;
        }

        self.next_handle += 1;
        let handle = SessionHandle(self.next_handle);
        let token = CancellationToken::new();
        self.live.insert(handle, token.clone());
        let limit = self.session_limit;

        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if commands
                .send(ViewerCommand::SessionGranted { ticket, handle })
                .is_err()
            {
                return;
            }
            let Some(limit) = limit else {
                return;
            };
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    info!(?handle, "simulated device ending session");
                    let _ = commands.send(ViewerCommand::SessionEndedByDevice(handle));
                }
            }
        });
    }

    fn release_session(&mut self, handle: SessionHandle) {
        match self.live.remove(&handle) {
            Some(token) => {
                token.cancel();
                debug!(?handle, "session handle released");
            }
            None => debug!(?handle, "release of unknown session handle ignored"),
        }
    }
}
