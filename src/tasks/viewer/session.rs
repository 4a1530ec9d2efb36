use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};
use tracing::{debug, info, warn};

use super::state::{Exited, ViewerState};
use crate::capability::SessionCapability;
use crate::config::ViewerConfig;
use crate::error::Error;
use crate::events::{
    ImmersiveMode, ModelEpoch, SessionHandle, SessionTicket, ViewerCommand, ViewerEvent,
};
use crate::processing::mesh::Mesh;

/// Native side of immersive sessions. Completions come back through the command queue.
pub trait ImmersiveBackend {
    fn request_session(&mut self, mode: ImmersiveMode, ticket: SessionTicket);
    fn release_session(&mut self, handle: SessionHandle);
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    pub view_proj: Mat4,
    pub model: Mat4,
    pub clear_color: [f64; 4],
    pub fullscreen: bool,
    /// Bumped whenever the installed model changes or is dropped.
    pub model_generation: u64,
    pub double_sided: bool,
}

#[derive(Debug, Clone)]
pub struct InstalledModel {
    pub mesh: Arc<Mesh>,
    pub generation: u64,
}

/// Owns the viewer state, the installed model and the immersive backend.
/// Input, pipeline output and device callbacks all arrive through `commands`.
pub struct ViewerSession<B> {
    state: ViewerState,
    backend: B,
    commands: UnboundedReceiver<ViewerCommand>,
    model: Option<InstalledModel>,
    generation: u64,
    epoch: ModelEpoch,
}

impl<B: ImmersiveBackend> ViewerSession<B> {
    pub fn new(
        cfg: ViewerConfig,
        capability: SessionCapability,
        backend: B,
        commands: UnboundedReceiver<ViewerCommand>,
    ) -> Self {
        Self {
            state: ViewerState::new(cfg, capability),
            backend,
            commands,
            model: None,
            generation: 0,
            epoch: ModelEpoch::default(),
        }
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn model(&self) -> Option<&InstalledModel> {
        self.model.as_ref()
    }

    pub fn model_generation(&self) -> u64 {
        self.generation
    }

    pub fn model_epoch(&self) -> ModelEpoch {
        self.epoch
    }

    /// Drains every queued command. Called once per frame.
    pub fn pump(&mut self) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => events.extend(self.apply(cmd)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    pub fn apply(&mut self, cmd: ViewerCommand) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        match cmd {
            ViewerCommand::Rotate(dir) => self.state.rotate(dir),
            ViewerCommand::Zoom(dir) => self.state.zoom(dir),
            ViewerCommand::SetAutoRotate(enabled) => self.state.set_auto_rotate(enabled),
            ViewerCommand::ToggleAutoRotate => {
                let enabled = !self.state.auto_rotate();
                self.state.set_auto_rotate(enabled);
            }
            ViewerCommand::TogglePassthrough => match self.state.toggle_passthrough() {
                Ok(background) => info!(?background, "background mode changed"),
                Err(err) => events.push(self.rejected(err)),
            },
            ViewerCommand::Enter(mode) => match self.state.request_enter(mode) {
                Ok(ticket) => {
                    info!(%mode, %ticket, "requesting immersive session");
                    self.backend.request_session(mode, ticket);
                }
                Err(Error::UnsupportedCapability(mode)) => {
                    warn!(%mode, "immersive mode not supported on this device");
                    events.push(ViewerEvent::CapabilityUnsupported { mode });
                }
                Err(err) => events.push(self.rejected(err)),
            },
            ViewerCommand::Exit => {
                if let Some(exited) = self.state.exit() {
                    events.push(self.finish_exit(exited));
                }
            }
            ViewerCommand::SessionGranted { ticket, handle } => {
                match self.state.session_granted(ticket, handle) {
                    Ok(mode) => {
                        info!(%mode, %ticket, "immersive session started");
                        events.push(ViewerEvent::SessionStarted { mode });
                    }
                    Err(err) => {
                        debug!(error = %err, ?handle, "releasing late session grant");
                        self.backend.release_session(handle);
                    }
                }
            }
            ViewerCommand::SessionDenied { ticket, reason } => {
                match self.state.session_denied(ticket) {
                    Ok(mode) => {
                        warn!(%mode, %ticket, %reason, "immersive session request failed");
                        events.push(ViewerEvent::SessionRequestFailed { mode, reason });
                    }
                    Err(err) => debug!(error = %err, "ignoring late session denial"),
                }
            }
            ViewerCommand::SessionEndedByDevice(handle) => {
                match self.state.session_ended_by_device(handle) {
                    Some(exited) => {
                        info!(?handle, "device ended the immersive session");
                        events.push(self.finish_exit(exited));
                    }
                    None => debug!(?handle, "ignoring end of an inactive session"),
                }
            }
            ViewerCommand::InstallModel { mesh, epoch } => {
                if epoch < self.epoch {
                    debug!(?epoch, current = ?self.epoch, "dropping mesh built before reset");
                } else {
                    events.push(self.install(mesh));
                }
            }
            ViewerCommand::Reset => {
                if let Some(exited) = self.state.reset() {
                    events.push(self.finish_exit(exited));
                }
                if self.model.take().is_some() {
                    self.generation += 1;
                }
                self.epoch = self.epoch.next();
                events.push(ViewerEvent::ModelCleared { epoch: self.epoch });
                info!(epoch = self.epoch.0, "viewer reset");
            }
        }
        events
    }

    fn install(&mut self, mesh: Arc<Mesh>) -> ViewerEvent {
        self.generation += 1;
        let vertex_count = mesh.vertex_count();
        let triangle_count = mesh.triangle_count();
        self.model = Some(InstalledModel {
            mesh,
            generation: self.generation,
        });
        info!(
            vertex_count,
            triangle_count,
            generation = self.generation,
            "model ready"
        );
        ViewerEvent::ModelReady {
            vertex_count,
            triangle_count,
        }
    }

    fn finish_exit(&mut self, exited: Exited) -> ViewerEvent {
        if let Some(handle) = exited.release {
            self.backend.release_session(handle);
        }
        info!(mode = %exited.mode, "immersive session ended");
        ViewerEvent::SessionEnded
    }

    fn rejected(&self, err: Error) -> ViewerEvent {
        info!(error = %err, mode = %self.state.mode(), "request rejected");
        ViewerEvent::Rejected(err)
    }

    /// Advances animation and describes the frame for a surface with the given aspect ratio.
    pub fn tick(&mut self, now: Instant, aspect: f32) -> FrameDescriptor {
        self.state.tick(now);
        let cfg = self.state.config();
        let camera = self.state.camera();

        let eye = Vec3::new(
            camera.distance * camera.orbit_yaw.sin(),
            0.0,
            camera.distance * camera.orbit_yaw.cos(),
        );
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        let proj = Mat4::perspective_rh(camera.fov_degrees.to_radians(), aspect, cfg.near, cfg.far);
        let model = Mat4::from_translation(Vec3::new(0.0, self.state.model_offset(), 0.0))
            * Mat4::from_scale(Vec3::splat(self.state.model_scale()));

        FrameDescriptor {
            view_proj: proj * view,
            model,
            clear_color: self.state.clear().rgba(),
            fullscreen: self.state.fullscreen(),
            model_generation: self.generation,
            double_sided: cfg.double_sided,
        }
    }

    /// Ends any live session so the native handle does not outlive the viewer.
    pub fn teardown(&mut self) {
        if let Some(exited) = self.state.exit() {
            self.finish_exit(exited);
        }
    }
}
