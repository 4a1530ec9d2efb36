use std::sync::Arc;
use std::time::{Duration, Instant};

use photo_vr::capability::SessionCapability;
use photo_vr::config::{ImmersiveConfig, ViewerConfig};
use photo_vr::error::Error;
use photo_vr::events::{
    Direction, ImmersiveMode, ModelEpoch, SessionHandle, SessionTicket, ViewerCommand, ViewerEvent,
    ViewerMode,
};
use photo_vr::processing::depth::DepthField;
use photo_vr::processing::image_buffer::ImageBuffer;
use photo_vr::processing::mesh::{GridResolution, Mesh, MeshOptions, synthesize};
use photo_vr::tasks::viewer::immersive::SimulatedXrBackend;
use photo_vr::tasks::viewer::session::{ImmersiveBackend, ViewerSession};
use photo_vr::tasks::viewer::state::{BackgroundMode, ClearBehavior};
use tokio::sync::mpsc;

#[derive(Default)]
struct RecordingBackend {
    requests: Vec<(ImmersiveMode, SessionTicket)>,
    released: Vec<SessionHandle>,
}

impl ImmersiveBackend for RecordingBackend {
    fn request_session(&mut self, mode: ImmersiveMode, ticket: SessionTicket) {
        self.requests.push((mode, ticket));
    }

    fn release_session(&mut self, handle: SessionHandle) {
        self.released.push(handle);
    }
}

fn viewer(
    vr: bool,
    ar: bool,
) -> (
    ViewerSession<RecordingBackend>,
    mpsc::UnboundedSender<ViewerCommand>,
) {
    let cfg = ViewerConfig {
        auto_rotate: false,
        ..Default::default()
    };
    viewer_with(cfg, vr, ar)
}

fn viewer_with(
    cfg: ViewerConfig,
    vr: bool,
    ar: bool,
) -> (
    ViewerSession<RecordingBackend>,
    mpsc::UnboundedSender<ViewerCommand>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let caps = SessionCapability {
        vr_supported: vr,
        ar_supported: ar,
    };
    (
        ViewerSession::new(cfg, caps, RecordingBackend::default(), rx),
        tx,
    )
}

fn model() -> Arc<Mesh> {
    let image = Arc::new(ImageBuffer::from_pixel(4, 4, [120, 80, 40, 255]).unwrap());
    let depth = DepthField::from_values(4, 4, vec![0.25; 16]).unwrap();
    let grid = GridResolution::new(3, 3).unwrap();
    Arc::new(synthesize(image, &depth, grid, &MeshOptions::default()).unwrap())
}

fn install(epoch: ModelEpoch) -> ViewerCommand {
    ViewerCommand::InstallModel {
        mesh: model(),
        epoch,
    }
}

fn enter_and_grant(s: &mut ViewerSession<RecordingBackend>, mode: ImmersiveMode, handle: u64) {
    assert!(s.apply(ViewerCommand::Enter(mode)).is_empty());
    let (_, ticket) = *s.backend().requests.last().unwrap();
    let events = s.apply(ViewerCommand::SessionGranted {
        ticket,
        handle: SessionHandle(handle),
    });
    assert_eq!(events, vec![ViewerEvent::SessionStarted { mode }]);
}

#[test]
fn vr_without_capability_stays_in_preview() {
    let (mut s, _tx) = viewer(false, true);
    let events = s.apply(ViewerCommand::Enter(ImmersiveMode::Vr));
    assert_eq!(
        events,
        vec![ViewerEvent::CapabilityUnsupported {
            mode: ImmersiveMode::Vr
        }]
    );
    assert_eq!(s.state().mode(), ViewerMode::Preview);
}

#[test]
fn vr_with_capability_transitions() {
    let (mut s, _tx) = viewer(true, false);
    s.apply(ViewerCommand::Enter(ImmersiveMode::Vr));
    assert_eq!(s.state().mode(), ViewerMode::ImmersiveVr);
    assert_eq!(s.backend().requests.len(), 1);
}

#[test]
fn ar_is_rejected_while_in_vr_even_when_supported() {
    let (mut s, _tx) = viewer(true, true);
    enter_and_grant(&mut s, ImmersiveMode::Vr, 1);
    let events = s.apply(ViewerCommand::Enter(ImmersiveMode::PassthroughAr));
    assert_eq!(
        events,
        vec![ViewerEvent::Rejected(Error::InvalidTransition {
            from: ViewerMode::ImmersiveVr,
            requested: ViewerMode::ImmersivePassthroughAr,
        })]
    );
    assert_eq!(s.state().mode(), ViewerMode::ImmersiveVr);
    assert_eq!(s.backend().requests.len(), 1);
}

#[test]
fn exit_returns_to_preview_idempotently() {
    for mode in [ImmersiveMode::Vr, ImmersiveMode::PassthroughAr] {
        let (mut s, _tx) = viewer(true, true);
        enter_and_grant(&mut s, mode, 3);
        assert_eq!(s.apply(ViewerCommand::Exit), vec![ViewerEvent::SessionEnded]);
        assert_eq!(s.state().mode(), ViewerMode::Preview);
        assert!(s.apply(ViewerCommand::Exit).is_empty());
        assert_eq!(s.state().mode(), ViewerMode::Preview);
        assert_eq!(s.backend().released, vec![SessionHandle(3)]);
    }
}

#[test]
fn zoom_in_clamps_exactly_at_near() {
    let cfg = ViewerConfig {
        auto_rotate: false,
        near: 0.1,
        initial_distance: 5.0,
        zoom_step: 0.5,
        ..Default::default()
    };
    let (mut s, tx) = viewer_with(cfg, false, false);
    for _ in 0..100 {
        tx.send(ViewerCommand::Zoom(Direction::Negative)).unwrap();
    }
    s.pump();
    assert_eq!(s.state().camera().distance, 0.1);
}

#[test]
fn late_grant_after_exit_is_released() {
    let (mut s, _tx) = viewer(true, false);
    s.apply(ViewerCommand::Enter(ImmersiveMode::Vr));
    let (_, ticket) = s.backend().requests[0];
    s.apply(ViewerCommand::Exit);

    let events = s.apply(ViewerCommand::SessionGranted {
        ticket,
        handle: SessionHandle(42),
    });
    assert!(events.is_empty());
    assert_eq!(s.state().mode(), ViewerMode::Preview);
    assert_eq!(s.backend().released, vec![SessionHandle(42)]);
}

#[test]
fn device_end_releases_and_returns_to_preview() {
    let (mut s, tx) = viewer(true, false);
    enter_and_grant(&mut s, ImmersiveMode::Vr, 8);
    tx.send(ViewerCommand::SessionEndedByDevice(SessionHandle(8)))
        .unwrap();
    assert_eq!(s.pump(), vec![ViewerEvent::SessionEnded]);
    assert_eq!(s.state().mode(), ViewerMode::Preview);
    assert_eq!(s.backend().released, vec![SessionHandle(8)]);
}

#[test]
fn denied_request_reports_failure() {
    let (mut s, _tx) = viewer(true, false);
    s.apply(ViewerCommand::Enter(ImmersiveMode::Vr));
    let (_, ticket) = s.backend().requests[0];
    let events = s.apply(ViewerCommand::SessionDenied {
        ticket,
        reason: "user declined".into(),
    });
    assert_eq!(
        events,
        vec![ViewerEvent::SessionRequestFailed {
            mode: ImmersiveMode::Vr,
            reason: "user declined".into(),
        }]
    );
    assert_eq!(s.state().mode(), ViewerMode::Preview);
}

#[test]
fn passthrough_locked_outside_preview() {
    let (mut s, _tx) = viewer(false, true);
    assert!(s.apply(ViewerCommand::TogglePassthrough).is_empty());
    assert_eq!(s.state().background(), BackgroundMode::Transparent);
    enter_and_grant(&mut s, ImmersiveMode::PassthroughAr, 1);

    let frame = s.tick(Instant::now(), 1.0);
    assert_eq!(frame.clear_color, ClearBehavior::Transparent.rgba());
    assert!(frame.fullscreen);

    let events = s.apply(ViewerCommand::TogglePassthrough);
    assert_eq!(
        events,
        vec![ViewerEvent::Rejected(Error::PassthroughLocked(
            ViewerMode::ImmersivePassthroughAr
        ))]
    );
}

#[test]
fn installing_models_bumps_generation() {
    let (mut s, tx) = viewer(false, false);
    let start = s.model_generation();
    tx.send(install(ModelEpoch::default())).unwrap();
    tx.send(install(ModelEpoch::default())).unwrap();
    let events = s.pump();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        ViewerEvent::ModelReady {
            vertex_count: 16,
            triangle_count: 18
        }
    ));
    assert_eq!(s.model_generation(), start + 2);
    assert_eq!(s.tick(Instant::now(), 1.0).model_generation, start + 2);
}

#[test]
fn reset_clears_model_and_session() {
    let (mut s, _tx) = viewer(true, false);
    s.apply(install(ModelEpoch::default()));
    s.apply(ViewerCommand::Zoom(Direction::Positive));
    enter_and_grant(&mut s, ImmersiveMode::Vr, 5);
    let before = s.model_generation();

    let events = s.apply(ViewerCommand::Reset);
    assert_eq!(
        events,
        vec![
            ViewerEvent::SessionEnded,
            ViewerEvent::ModelCleared {
                epoch: ModelEpoch(1)
            }
        ]
    );
    assert!(s.model().is_none());
    assert!(s.model_generation() > before);
    assert_eq!(s.state().mode(), ViewerMode::Preview);
    assert_eq!(
        s.state().camera().distance,
        ViewerConfig::default().initial_distance
    );
    assert_eq!(s.backend().released, vec![SessionHandle(5)]);
}

#[test]
fn rebuild_finishing_after_reset_stays_cleared() {
    let (mut s, tx) = viewer(false, false);
    s.apply(install(ModelEpoch::default()));

    // A depth rebuild started before the reset completes after it.
    tx.send(ViewerCommand::Reset).unwrap();
    tx.send(install(ModelEpoch::default())).unwrap();
    let events = s.pump();

    assert_eq!(
        events,
        vec![ViewerEvent::ModelCleared {
            epoch: ModelEpoch(1)
        }]
    );
    assert!(s.model().is_none());
    assert_eq!(s.tick(Instant::now(), 1.0).model_generation, s.model_generation());

    tx.send(install(s.model_epoch())).unwrap();
    let events = s.pump();
    assert!(matches!(events.as_slice(), [ViewerEvent::ModelReady { .. }]));
    assert!(s.model().is_some());
}

#[test]
fn auto_rotation_depends_on_elapsed_time() {
    let cfg = ViewerConfig {
        auto_rotate: true,
        auto_rotate_speed: 0.5,
        ..Default::default()
    };
    let (mut s, _tx) = viewer_with(cfg, false, false);
    let t0 = Instant::now();
    s.tick(t0, 1.0);
    s.tick(t0 + Duration::from_secs(2), 1.0);
    assert!((s.state().camera().orbit_yaw - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn simulated_device_drives_a_full_session() {
    let (tx, rx) = mpsc::unbounded_channel();
    let immersive = ImmersiveConfig {
        grant_delay: Duration::from_millis(5),
        device_session_limit: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let backend = SimulatedXrBackend::new(tokio::runtime::Handle::current(), &immersive, tx.clone());
    let caps = SessionCapability {
        vr_supported: true,
        ar_supported: false,
    };
    let mut s = ViewerSession::new(ViewerConfig::default(), caps, backend, rx);

    tx.send(ViewerCommand::Enter(ImmersiveMode::Vr)).unwrap();
    let mut seen = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !seen.contains(&ViewerEvent::SessionEnded) && Instant::now() < deadline {
        seen.extend(s.pump());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert_eq!(
        seen,
        vec![
            ViewerEvent::SessionStarted {
                mode: ImmersiveMode::Vr
            },
            ViewerEvent::SessionEnded,
        ]
    );
    assert_eq!(s.state().mode(), ViewerMode::Preview);
    assert_eq!(s.backend().live_sessions(), 0);
}
