pub mod immersive;
pub mod renderer;
pub mod session;
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::{self, SurfaceError};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowAttributes},
};

use crate::{
    capability::SessionCapability,
    config::Configuration,
    events::{Direction, ImmersiveMode, PipelineRequest, ViewerCommand, ViewerEvent},
};
use immersive::SimulatedXrBackend;
use renderer::MeshRenderer;
use session::ViewerSession;

const DEPTH_SCALE_STEP: f32 = 0.1;
const GRID_STEP_FACTOR: f32 = 2.0;

#[derive(Debug)]
enum HostEvent {
    Cancelled,
}

/// What a key press asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Viewer(ViewerCommand),
    Pipeline(PipelineRequestKind),
}

/// Pipeline adjustments reachable from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineRequestKind {
    NudgeDepthScale(f32),
    ScaleGrid(f32),
}

impl PipelineRequestKind {
    fn into_request(self) -> PipelineRequest {
        match self {
            Self::NudgeDepthScale(delta) => PipelineRequest::NudgeDepthScale(delta),
            Self::ScaleGrid(factor) => PipelineRequest::ScaleGrid(factor),
        }
    }
}

pub fn key_action(key: &Key) -> Option<KeyAction> {
    let viewer = |cmd| Some(KeyAction::Viewer(cmd));
    let pipeline = |req| Some(KeyAction::Pipeline(req));
    match key {
        Key::Named(NamedKey::ArrowLeft) => viewer(ViewerCommand::Rotate(Direction::Negative)),
        Key::Named(NamedKey::ArrowRight) => viewer(ViewerCommand::Rotate(Direction::Positive)),
        Key::Named(NamedKey::Escape) => viewer(ViewerCommand::Exit),
        Key::Named(NamedKey::Space) => viewer(ViewerCommand::ToggleAutoRotate),
        Key::Character(s) => match s.to_ascii_lowercase().as_str() {
            "+" | "=" => viewer(ViewerCommand::Zoom(Direction::Negative)),
            "-" | "_" => viewer(ViewerCommand::Zoom(Direction::Positive)),
            "p" => viewer(ViewerCommand::TogglePassthrough),
            "v" => viewer(ViewerCommand::Enter(ImmersiveMode::Vr)),
            "a" => viewer(ViewerCommand::Enter(ImmersiveMode::PassthroughAr)),
            "r" => viewer(ViewerCommand::Reset),
            "[" => pipeline(PipelineRequestKind::NudgeDepthScale(-DEPTH_SCALE_STEP)),
            "]" => pipeline(PipelineRequestKind::NudgeDepthScale(DEPTH_SCALE_STEP)),
            "g" => pipeline(PipelineRequestKind::ScaleGrid(1.0 / GRID_STEP_FACTOR)),
            "h" => pipeline(PipelineRequestKind::ScaleGrid(GRID_STEP_FACTOR)),
            _ => None,
        },
        _ => None,
    }
}

struct ViewerApp {
    cancel: CancellationToken,
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    surface_config: Option<wgpu::SurfaceConfiguration>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    renderer: Option<MeshRenderer>,
    session: ViewerSession<SimulatedXrBackend>,
    commands: mpsc::UnboundedSender<ViewerCommand>,
    to_pipeline: mpsc::UnboundedSender<PipelineRequest>,
    fullscreen: bool,
}

impl ViewerApp {
    fn new(
        cancel: CancellationToken,
        session: ViewerSession<SimulatedXrBackend>,
        commands: mpsc::UnboundedSender<ViewerCommand>,
        to_pipeline: mpsc::UnboundedSender<PipelineRequest>,
    ) -> Self {
        Self {
            cancel,
            window: None,
            surface: None,
            surface_config: None,
            device: None,
            queue: None,
            renderer: None,
            session,
            commands,
            to_pipeline,
            fullscreen: false,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let attrs = WindowAttributes::default()
            .with_title("photo-vr")
            .with_transparent(true);
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create viewer window");
                None
            }
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no texture formats")?;
        // Passthrough needs a compositor that honours the cleared alpha.
        let alpha_mode = [
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
        ]
        .into_iter()
        .find(|mode| caps.alpha_modes.contains(mode))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            alpha = ?config.alpha_mode,
            "viewer surface configured",
        );

        self.renderer = Some(MeshRenderer::new(&device, format, config.width, config.height));
        self.surface = Some(surface);
        self.surface_config = Some(config);
        self.device = Some(device);
        self.queue = Some(queue);
        Ok(())
    }

    fn handle_resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        let (Some(surface), Some(device), Some(config)) = (
            self.surface.as_ref(),
            self.device.as_ref(),
            self.surface_config.as_mut(),
        ) else {
            return;
        };

        config.width = new_size.width.max(1);
        config.height = new_size.height.max(1);
        surface.configure(device, config);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.resize(device, config.width, config.height);
        }
        debug!(
            width = config.width,
            height = config.height,
            "viewer surface resized",
        );
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match key_action(&event.logical_key) {
            Some(KeyAction::Viewer(cmd)) => {
                debug!(?cmd, "key command");
                let _ = self.commands.send(cmd);
            }
            Some(KeyAction::Pipeline(kind)) => {
                if self.to_pipeline.send(kind.into_request()).is_err() {
                    warn!("pipeline stopped; dropping adjustment");
                }
            }
            None => {}
        }
    }

    fn handle_viewer_events(&mut self, events: Vec<ViewerEvent>) {
        for event in events {
            match event {
                ViewerEvent::CapabilityUnsupported { mode } => {
                    warn!(%mode, "immersive mode unavailable");
                }
                ViewerEvent::Rejected(err) => debug!(error = %err, "viewer request rejected"),
                ViewerEvent::ModelCleared { epoch } => {
                    if self.to_pipeline.send(PipelineRequest::Reset(epoch)).is_err() {
                        warn!("pipeline stopped; reset not forwarded");
                    }
                }
                other => debug!(event = ?other, "viewer event"),
            }
        }
    }

    fn apply_fullscreen(&mut self, wanted: bool) {
        if wanted == self.fullscreen {
            return;
        }
        if let Some(window) = self.window.as_ref() {
            window.set_fullscreen(wanted.then_some(Fullscreen::Borderless(None)));
        }
        self.fullscreen = wanted;
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let events = self.session.pump();
        self.handle_viewer_events(events);

        let (Some(surface), Some(device), Some(queue), Some(config), Some(window)) = (
            self.surface.as_ref(),
            self.device.as_ref(),
            self.queue.as_ref(),
            self.surface_config.as_ref(),
            self.window.clone(),
        ) else {
            return;
        };

        let aspect = config.width as f32 / config.height.max(1) as f32;
        let frame_desc = self.session.tick(Instant::now(), aspect);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.sync_model(device, queue, self.session.model());
        }

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                self.handle_resize(window.inner_size());
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("viewer surface out of memory; exiting event loop");
                event_loop.exit();
                return;
            }
            Err(SurfaceError::Timeout) => {
                warn!("viewer surface acquisition timed out");
                return;
            }
            Err(SurfaceError::Other) => {
                warn!("viewer surface reported an unknown error; retrying");
                self.handle_resize(window.inner_size());
                return;
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("viewer-encoder"),
        });
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.render(queue, &mut encoder, &view, &frame_desc);
        }
        queue.submit(std::iter::once(encoder.finish()));
        window.pre_present_notify();
        frame.present();

        self.apply_fullscreen(frame_desc.fullscreen);
    }
}

impl ApplicationHandler<HostEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.device.is_none() {
            if let Err(err) = self.init_gpu(window.clone()) {
                error!(error = ?err, "failed to initialize GPU state");
                event_loop.exit();
                return;
            }
        }

        window.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::RedrawRequested => {
                self.draw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // Animation runs every frame.
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: HostEvent) {
        match event {
            HostEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.session.teardown();
    }
}

/// Opens the viewer window and renders until it closes or `cancel` fires.
/// Must run on the main thread inside a tokio runtime.
pub fn run_windowed(
    cfg: Configuration,
    capability: SessionCapability,
    commands: (
        mpsc::UnboundedSender<ViewerCommand>,
        mpsc::UnboundedReceiver<ViewerCommand>,
    ),
    to_pipeline: mpsc::UnboundedSender<PipelineRequest>,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<HostEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(HostEvent::Cancelled);
        })
    };

    let (tx, rx) = commands;
    let backend = SimulatedXrBackend::new(
        tokio::runtime::Handle::current(),
        &cfg.immersive,
        tx.clone(),
    );
    let session = ViewerSession::new(cfg.viewer, capability, backend, rx);

    let mut app = ViewerApp::new(cancel, session, tx, to_pipeline);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("viewer event loop failed")
}
