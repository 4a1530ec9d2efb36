use std::f32::consts::TAU;
use std::time::{Duration, Instant};

use crate::capability::SessionCapability;
use crate::config::{ModelMotion, ViewerConfig};
use crate::error::{Error, Result};
use crate::events::{Direction, ImmersiveMode, SessionHandle, SessionTicket, ViewerMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMode {
    Opaque,
    Transparent,
}

impl BackgroundMode {
    fn from_passthrough(passthrough: bool) -> Self {
        if passthrough {
            Self::Transparent
        } else {
            Self::Opaque
        }
    }
}

/// How the render target is cleared each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearBehavior {
    Color([f64; 4]),
    Transparent,
}

impl ClearBehavior {
    pub fn rgba(self) -> [f64; 4] {
        match self {
            Self::Color(c) => c,
            Self::Transparent => [0.0, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Orbit angle around the model, in `[0, 2π)`.
    pub orbit_yaw: f32,
    /// Eye distance from the model origin, within `[near, far]`.
    pub distance: f32,
    pub fov_degrees: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Pending {
        ticket: SessionTicket,
        mode: ImmersiveMode,
    },
    Active {
        handle: SessionHandle,
        mode: ImmersiveMode,
    },
}

/// Result of leaving an immersive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exited {
    pub mode: ImmersiveMode,
    /// Native handle that still needs releasing, if the session was granted.
    pub release: Option<SessionHandle>,
}

/// Viewer state with no I/O: every transition is a plain method call.
#[derive(Debug, Clone)]
pub struct ViewerState {
    cfg: ViewerConfig,
    capability: SessionCapability,
    mode: ViewerMode,
    background: BackgroundMode,
    clear: ClearBehavior,
    camera: Camera,
    auto_rotate: bool,
    session: SessionPhase,
    next_ticket: u64,
    last_tick: Option<Instant>,
    elapsed: Duration,
}

impl ViewerState {
    pub fn new(cfg: ViewerConfig, capability: SessionCapability) -> Self {
        let background = BackgroundMode::from_passthrough(cfg.start_in_passthrough);
        let mut state = Self {
            camera: Self::initial_camera(&cfg),
            auto_rotate: cfg.auto_rotate,
            cfg,
            capability,
            mode: ViewerMode::Preview,
            background,
            clear: ClearBehavior::Transparent,
            session: SessionPhase::Idle,
            next_ticket: 0,
            last_tick: None,
            elapsed: Duration::ZERO,
        };
        state.clear = state.preview_clear();
        state
    }

    fn initial_camera(cfg: &ViewerConfig) -> Camera {
        Camera {
            orbit_yaw: 0.0,
            distance: cfg.initial_distance.clamp(cfg.near, cfg.far),
            fov_degrees: cfg.fov_degrees,
        }
    }

    fn preview_clear(&self) -> ClearBehavior {
        match self.background {
            BackgroundMode::Opaque => {
                let [r, g, b] = self.cfg.background_color.map(|c| f64::from(c) / 255.0);
                ClearBehavior::Color([r, g, b, 1.0])
            }
            BackgroundMode::Transparent => ClearBehavior::Transparent,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.cfg
    }

    pub fn capability(&self) -> SessionCapability {
        self.capability
    }

    pub fn mode(&self) -> ViewerMode {
        self.mode
    }

    pub fn background(&self) -> BackgroundMode {
        self.background
    }

    pub fn clear(&self) -> ClearBehavior {
        self.clear
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn auto_rotate(&self) -> bool {
        self.auto_rotate
    }

    pub fn session(&self) -> SessionPhase {
        self.session
    }

    pub fn fullscreen(&self) -> bool {
        self.mode != ViewerMode::Preview
    }

    /// Moves into `mode` and hands out the ticket the device must echo back.
    pub fn request_enter(&mut self, mode: ImmersiveMode) -> Result<SessionTicket> {
        if self.mode != ViewerMode::Preview {
            return Err(Error::InvalidTransition {
                from: self.mode,
                requested: mode.viewer_mode(),
            });
        }
        if !self.capability.supports(mode) {
            return Err(Error::UnsupportedCapability(mode));
        }

        self.next_ticket += 1;
        let ticket = SessionTicket(self.next_ticket);
        self.mode = mode.viewer_mode();
        // The background chosen in preview decides how the session clears.
        self.clear = self.preview_clear();
        self.session = SessionPhase::Pending { ticket, mode };
        Ok(ticket)
    }

    pub fn session_granted(
        &mut self,
        ticket: SessionTicket,
        handle: SessionHandle,
    ) -> Result<ImmersiveMode> {
        match self.session {
            SessionPhase::Pending { ticket: pending, mode } if pending == ticket => {
                self.session = SessionPhase::Active { handle, mode };
                Ok(mode)
            }
            _ => Err(Error::StaleSessionCompletion(ticket)),
        }
    }

    /// Falls back to preview when the pending request is refused.
    pub fn session_denied(&mut self, ticket: SessionTicket) -> Result<ImmersiveMode> {
        match self.session {
            SessionPhase::Pending { ticket: pending, mode } if pending == ticket => {
                self.leave_immersive();
                Ok(mode)
            }
            _ => Err(Error::StaleSessionCompletion(ticket)),
        }
    }

    /// `None` when already in preview.
    pub fn exit(&mut self) -> Option<Exited> {
        let mode = self.mode.immersive()?;
        let release = match self.session {
            SessionPhase::Active { handle, .. } => Some(handle),
            SessionPhase::Idle | SessionPhase::Pending { .. } => None,
        };
        self.leave_immersive();
        Some(Exited { mode, release })
    }

    /// The device tore the session down; treated like a local exit when the handle is ours.
    pub fn session_ended_by_device(&mut self, handle: SessionHandle) -> Option<Exited> {
        match self.session {
            SessionPhase::Active { handle: active, .. } if active == handle => self.exit(),
            _ => None,
        }
    }

    fn leave_immersive(&mut self) {
        self.mode = ViewerMode::Preview;
        self.session = SessionPhase::Idle;
        self.clear = self.preview_clear();
    }

    pub fn toggle_passthrough(&mut self) -> Result<BackgroundMode> {
        if self.mode != ViewerMode::Preview {
            return Err(Error::PassthroughLocked(self.mode));
        }
        self.background = match self.background {
            BackgroundMode::Opaque => BackgroundMode::Transparent,
            BackgroundMode::Transparent => BackgroundMode::Opaque,
        };
        self.clear = self.preview_clear();
        Ok(self.background)
    }

    pub fn rotate(&mut self, direction: Direction) {
        let step = self.cfg.rotate_step_degrees.to_radians() * direction.sign();
        self.camera.orbit_yaw = (self.camera.orbit_yaw + step).rem_euclid(TAU);
    }

    /// Negative moves the camera closer.
    pub fn zoom(&mut self, direction: Direction) {
        let distance = self.camera.distance + self.cfg.zoom_step * direction.sign();
        self.camera.distance = distance.clamp(self.cfg.near, self.cfg.far);
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        self.auto_rotate = enabled;
    }

    /// Advances wall-clock driven animation. The first tick only establishes the time base.
    pub fn tick(&mut self, now: Instant) {
        let dt = self
            .last_tick
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or_default();
        self.last_tick = Some(now);
        self.elapsed += dt;

        if self.auto_rotate {
            let yaw = self.camera.orbit_yaw + self.cfg.auto_rotate_speed * dt.as_secs_f32();
            self.camera.orbit_yaw = yaw.rem_euclid(TAU);
        }
    }

    /// Vertical offset applied to the model by the configured motion preset.
    pub fn model_offset(&self) -> f32 {
        let t = self.elapsed.as_secs_f32();
        match self.cfg.motion {
            ModelMotion::Still => 0.0,
            ModelMotion::Gentle => (t * 0.5).sin() * 0.05,
            ModelMotion::Bounce => (t * 2.0).sin().abs() * 0.2,
            ModelMotion::Float => (t * 0.8).sin() * 0.1,
        }
    }

    pub fn model_scale(&self) -> f32 {
        self.cfg.model_scale
    }

    /// Restores camera and background to their configured values and leaves any session.
    pub fn reset(&mut self) -> Option<Exited> {
        let exited = self.exit();
        self.camera = Self::initial_camera(&self.cfg);
        self.auto_rotate = self.cfg.auto_rotate;
        self.background = BackgroundMode::from_passthrough(self.cfg.start_in_passthrough);
        self.clear = self.preview_clear();
        self.elapsed = Duration::ZERO;
        exited
    }
}
