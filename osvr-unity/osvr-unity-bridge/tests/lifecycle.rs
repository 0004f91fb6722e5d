//! Device lifecycle, session and per-frame present driven through RendererState with mock native
//! devices and a scripted render-manager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use osvr_rendering_plugin::{HostGraphics, RendererState, ResetState};
use osvr_unity_renderer::mock::{
    sample_render_info, ManagerScript, MockExplicitDevice, MockImmediateContext, ScriptedFactory, SharedLedger,
    MOCK_CONTEXT, MOCK_DEVICE,
};
use osvr_unity_renderer::{BridgeConfig, NativeGraphics};
use parking_lot::Mutex;
use stereo_api::{
    BackendKind, BridgeError, ClientContext, DeviceBinding, DeviceEvent, Eye, HostTexture, NativeHandle, RenderBuffer,
    RenderInfo, SceneDraw,
};

struct TestHost {
    kind: BackendKind,
    explicit: SharedLedger,
    immediate: SharedLedger,
    requests: Arc<AtomicUsize>,
}

impl HostGraphics for TestHost {
    fn renderer(&self) -> BackendKind {
        self.kind
    }

    fn native_graphics(&mut self, kind: BackendKind) -> Result<NativeGraphics, String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match kind {
            BackendKind::Direct3D11 => Ok(NativeGraphics::Explicit(Box::new(MockExplicitDevice::with_ledger(
                self.explicit.clone(),
            )))),
            BackendKind::OpenGl => Ok(NativeGraphics::Immediate(Box::new(MockImmediateContext::with_ledger(
                self.immediate.clone(),
            )))),
            BackendKind::None => Err("Device type not supported.".to_string()),
        }
    }
}

#[derive(Clone, Default)]
struct SharedScene {
    eyes: Arc<Mutex<Vec<Eye>>>,
}

impl SceneDraw for SharedScene {
    fn draw_eye(&mut self, eye: Eye, _info: &RenderInfo) {
        self.eyes.lock().push(eye);
    }
}

struct Fixture {
    state: RendererState,
    factory: ScriptedFactory,
    explicit: SharedLedger,
    immediate: SharedLedger,
    requests: Arc<AtomicUsize>,
    scene: SharedScene,
}

fn fixture_with(kind: BackendKind, factory: ScriptedFactory) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let explicit = SharedLedger::default();
    let immediate = SharedLedger::default();
    let requests = Arc::new(AtomicUsize::new(0));
    let host = TestHost { kind, explicit: explicit.clone(), immediate: immediate.clone(), requests: requests.clone() };
    let scene = SharedScene::default();
    let state = RendererState::new(Box::new(host), Box::new(factory.clone()), BridgeConfig::default())
        .with_scene(Box::new(scene.clone()));
    Fixture { state, factory, explicit, immediate, requests, scene }
}

fn fixture(kind: BackendKind) -> Fixture {
    fixture_with(kind, ScriptedFactory::new())
}

fn client() -> ClientContext {
    ClientContext::new(NativeHandle::from_raw(0xC0FFEE))
}

fn texture(eye: Eye) -> Option<HostTexture> {
    HostTexture::from_raw(0x5000 + eye.index())
}

/// Initialize, create the render-manager and register both host textures.
fn ready(f: &mut Fixture) {
    f.state.on_device_event(DeviceEvent::Initialize);
    f.state.create_render_manager(client()).unwrap();
    for eye in Eye::ALL {
        f.state.set_color_buffer(texture(eye), eye.index() as i32).unwrap();
    }
}

#[test]
fn initialize_then_create_reports_left_viewport() {
    let mut f = fixture(BackendKind::Direct3D11);
    f.state.on_device_event(DeviceEvent::Initialize);
    assert_eq!(f.state.kind(), BackendKind::Direct3D11);
    assert_eq!(f.state.binding(), Some(DeviceBinding::Direct3D11 { device: MOCK_DEVICE, context: MOCK_CONTEXT }));

    f.state.create_render_manager(client()).unwrap();
    assert_eq!(f.state.viewport(0).unwrap(), sample_render_info()[0].viewport);

    let log = f.factory.log();
    let log = log.lock();
    assert_eq!(log.clients, vec![client()]);
    assert_eq!(log.bindings[0].kind(), BackendKind::Direct3D11);
}

#[test]
fn render_tick_copies_both_eyes_and_presents_flipped() {
    let mut f = fixture(BackendKind::Direct3D11);
    ready(&mut f);
    assert_eq!(f.state.render_frame(), Ok(true));

    let ledger = f.explicit.lock();
    assert_eq!(ledger.copies.len(), 2);
    assert_eq!(ledger.copies[0].1, texture(Eye::Left).unwrap());
    assert_eq!(ledger.copies[1].1, texture(Eye::Right).unwrap());

    let log = f.factory.log();
    let log = log.lock();
    assert_eq!(log.presents.len(), 1);
    assert!(log.presents[0].flip_y);
    assert_eq!(log.presents[0].buffers.len(), 2);
    assert!(matches!(log.presents[0].buffers[0], RenderBuffer::Direct3D11 { .. }));
    assert_eq!(log.registrations.last().map(Vec::len), Some(2));
    assert_eq!(*f.scene.eyes.lock(), vec![Eye::Left, Eye::Right]);
}

#[test]
fn shutdown_event_releases_session_and_next_tick_is_inert() {
    let mut f = fixture(BackendKind::Direct3D11);
    ready(&mut f);
    f.state.on_render_event(1);
    assert!(!f.state.has_session());
    assert_eq!(f.factory.log().lock().live(), 0);
    assert_eq!(f.explicit.lock().outstanding(), 0);
    assert_eq!(f.state.host_textures().registered_eyes().count(), 0);

    f.state.on_render_event(0);
    assert!(f.factory.log().lock().presents.is_empty());
    assert!(f.explicit.lock().copies.is_empty());
    assert_eq!(f.state.render_frame(), Err(BridgeError::NoSession));
}

#[test]
fn device_shutdown_twice_is_harmless() {
    let mut f = fixture(BackendKind::Direct3D11);
    ready(&mut f);
    f.state.on_device_event(DeviceEvent::Shutdown);
    assert_eq!(f.state.kind(), BackendKind::None);
    assert!(!f.state.has_backend());
    assert_eq!(f.state.binding(), None);
    f.state.on_device_event(DeviceEvent::Shutdown);
    assert_eq!(f.state.kind(), BackendKind::None);

    let ledger = f.explicit.lock();
    assert_eq!(ledger.double_releases, 0);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn unrecognized_renderer_invokes_no_handler() {
    let mut f = fixture(BackendKind::None);
    f.state.on_device_event(DeviceEvent::Initialize);
    f.state.on_device_event(DeviceEvent::BeforeReset);
    f.state.on_device_event(DeviceEvent::AfterReset);
    assert_eq!(f.state.kind(), BackendKind::None);
    assert_eq!(f.requests.load(Ordering::SeqCst), 0);
    assert_eq!(f.state.create_render_manager(client()), Err(BridgeError::NoBackend));
    assert_eq!(f.state.set_color_buffer(texture(Eye::Left), 0), Err(BridgeError::NoBackend));
    f.state.on_render_event(0);
    assert_eq!(f.factory.log().lock().created, 0);
}

#[test]
fn reset_events_keep_backend_kind() {
    let mut f = fixture(BackendKind::Direct3D11);
    f.state.on_device_event(DeviceEvent::Initialize);
    f.state.on_device_event(DeviceEvent::BeforeReset);
    assert_eq!(f.state.kind(), BackendKind::Direct3D11);
    f.state.on_device_event(DeviceEvent::AfterReset);
    assert_eq!(f.state.kind(), BackendKind::Direct3D11);
    // Nothing to rebuild without a client context.
    assert_eq!(f.state.reset_state(), ResetState::Idle);
}

#[test]
fn repeated_registration_then_teardown_releases_every_allocation() {
    let mut f = fixture(BackendKind::Direct3D11);
    f.state.on_device_event(DeviceEvent::Initialize);
    f.state.create_render_manager(client()).unwrap();

    for round in 0..6 {
        // Grow the viewport every other round so some calls reallocate and some reuse.
        if round % 2 == 0 {
            let script = f.factory.script();
            let mut script = script.lock();
            for info in &mut script.infos {
                info.viewport.width += 16.0;
            }
        }
        for eye in Eye::ALL {
            f.state.set_color_buffer(texture(eye), eye.index() as i32).unwrap();
        }
    }
    f.state.teardown();

    let ledger = f.explicit.lock();
    assert_eq!(ledger.textures_created, 6);
    assert_eq!(ledger.textures_released, ledger.textures_created);
    assert_eq!(ledger.views_released, ledger.views_created);
    assert_eq!(ledger.double_releases, 0);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn device_reset_rebuilds_session_and_buffers_on_next_tick() {
    let mut f = fixture(BackendKind::Direct3D11);
    ready(&mut f);

    assert_eq!(f.factory.log().lock().registrations.len(), 1);

    f.state.on_device_event(DeviceEvent::BeforeReset);
    assert!(!f.state.has_session());
    assert!(!f.state.has_eye_buffer(Eye::Left));
    assert_eq!(f.state.reset_state(), ResetState::AwaitingAfterReset);
    assert_eq!(f.explicit.lock().outstanding(), 0);
    // Frames between the two reset events find nothing to present.
    assert_eq!(f.state.render_frame(), Err(BridgeError::NoSession));

    f.state.on_device_event(DeviceEvent::AfterReset);
    assert_eq!(f.state.reset_state(), ResetState::RebuildPending);

    assert_eq!(f.state.render_frame(), Ok(true));
    assert_eq!(f.state.reset_state(), ResetState::Idle);
    assert!(f.state.has_session());
    assert!(Eye::ALL.iter().all(|&eye| f.state.has_eye_buffer(eye)));

    let log = f.factory.log();
    let log = log.lock();
    assert_eq!(log.created, 2);
    assert_eq!(log.live(), 1);
    assert_eq!(log.clients, vec![client(), client()]);
    assert_eq!(log.presents.len(), 1);
    // The rebuilt buffers are registered with the new manager before they are presented.
    assert_eq!(log.registrations.len(), 2);
    assert_ne!(log.registrations[0], log.registrations[1]);
    assert_eq!(log.registrations.last(), log.presents.last().map(|p| &p.buffers));
}

#[test]
fn declined_registration_is_not_fatal() {
    let factory = ScriptedFactory::with_script(ManagerScript { register_accepts: false, ..Default::default() });
    let mut f = fixture_with(BackendKind::Direct3D11, factory);
    f.state.on_device_event(DeviceEvent::Initialize);
    f.state.create_render_manager(client()).unwrap();
    for eye in Eye::ALL {
        assert_eq!(f.state.set_color_buffer(texture(eye), eye.index() as i32), Ok(()));
    }
    assert!(Eye::ALL.iter().all(|&eye| f.state.has_eye_buffer(eye)));

    assert_eq!(f.state.render_frame(), Ok(true));
    assert_eq!(f.state.render_frame(), Ok(true));
    let log = f.factory.log();
    let log = log.lock();
    assert_eq!(log.registrations.len(), 1);
    assert_eq!(log.presents.len(), 2);
}

/// Hands over OpenGL objects whatever device was asked for.
struct MismatchedHost;

impl HostGraphics for MismatchedHost {
    fn renderer(&self) -> BackendKind {
        BackendKind::Direct3D11
    }

    fn native_graphics(&mut self, _kind: BackendKind) -> Result<NativeGraphics, String> {
        Ok(NativeGraphics::Immediate(Box::new(MockImmediateContext::new())))
    }
}

#[test]
fn mismatched_native_graphics_leaves_device_unbound() {
    let _ = env_logger::builder().is_test(true).try_init();
    let factory = ScriptedFactory::new();
    let mut state = RendererState::new(Box::new(MismatchedHost), Box::new(factory.clone()), BridgeConfig::default());
    state.on_device_event(DeviceEvent::Initialize);
    assert_eq!(state.binding(), None);
    assert!(matches!(state.create_render_manager(client()), Err(BridgeError::NoDevice(_))));
    assert_eq!(factory.log().lock().created, 0);
}

#[test]
fn getters_match_latest_refresh_per_eye() {
    let factory = ScriptedFactory::with_script(ManagerScript { animate_pose: true, ..Default::default() });
    let mut f = fixture_with(BackendKind::Direct3D11, factory);
    ready(&mut f);

    for eye in [0, 1, 1, 0] {
        let pose = f.state.pose(eye).unwrap();
        assert_eq!(pose, f.state.render_info()[eye as usize].pose);
        let projection = f.state.projection(eye).unwrap();
        assert_eq!(projection, f.state.render_info()[eye as usize].projection);
        let viewport = f.state.viewport(eye).unwrap();
        assert_eq!(viewport, f.state.render_info()[eye as usize].viewport);
    }
    // Left and right never mix.
    let left = f.state.pose(0).unwrap();
    let right = f.state.render_info()[1].pose;
    assert!(left.translation[0] < right.translation[0]);
}

#[test]
fn getters_refresh_before_reading() {
    let factory = ScriptedFactory::with_script(ManagerScript { animate_pose: true, ..Default::default() });
    let mut f = fixture_with(BackendKind::Direct3D11, factory);
    ready(&mut f);
    let first = f.state.pose(0).unwrap();
    let second = f.state.pose(0).unwrap();
    assert!(second.translation[0] > first.translation[0]);
}

#[test]
fn eye_index_outside_zero_and_one_fails() {
    let mut f = fixture(BackendKind::Direct3D11);
    ready(&mut f);
    assert_eq!(f.state.set_color_buffer(texture(Eye::Left), 2), Err(BridgeError::EyeOutOfRange(2)));
    assert_eq!(f.state.viewport(-1), Err(BridgeError::EyeOutOfRange(-1)));
}

#[test]
fn immediate_backend_pumps_client_and_presents_unflipped() {
    let mut f = fixture(BackendKind::OpenGl);
    ready(&mut f);
    assert_eq!(f.state.binding(), Some(DeviceBinding::OpenGl));
    assert_eq!(f.state.render_frame(), Ok(true));

    let log = f.factory.log();
    let log = log.lock();
    // One update per buffer construction plus one per tick.
    assert_eq!(log.client_updates, 3);
    assert!(!log.presents[0].flip_y);
    assert!(matches!(log.presents[0].buffers[1], RenderBuffer::OpenGl { .. }));

    let ledger = f.immediate.lock();
    assert_eq!(ledger.framebuffer_binds.len(), 2);
    assert_eq!(ledger.framebuffer_binds[0], ledger.framebuffer_binds[1]);
    assert_eq!(ledger.blits.len(), 2);
}

#[test]
fn immediate_teardown_releases_depth_buffers() {
    let mut f = fixture(BackendKind::OpenGl);
    ready(&mut f);
    f.state.on_render_event(1);
    let ledger = f.immediate.lock();
    assert_eq!(ledger.renderbuffers_created, 2);
    assert_eq!(ledger.renderbuffers_released, 2);
    assert_eq!(ledger.framebuffers_deleted, ledger.framebuffers_created);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn declined_present_does_not_stop_later_ticks() {
    let factory = ScriptedFactory::with_script(ManagerScript { present_accepts: false, ..Default::default() });
    let mut f = fixture_with(BackendKind::Direct3D11, factory);
    ready(&mut f);
    assert_eq!(f.state.render_frame(), Ok(false));
    f.factory.script().lock().present_accepts = true;
    assert_eq!(f.state.render_frame(), Ok(true));
    assert_eq!(f.factory.log().lock().presents.len(), 2);
}

#[test]
fn tick_before_both_textures_is_skipped() {
    let mut f = fixture(BackendKind::Direct3D11);
    f.state.on_device_event(DeviceEvent::Initialize);
    f.state.create_render_manager(client()).unwrap();
    f.state.set_color_buffer(texture(Eye::Left), 0).unwrap();

    let err = f.state.render_frame().unwrap_err();
    assert_eq!(err, BridgeError::MissingEyeBuffer(Eye::Right));
    assert!(err.is_not_ready());
    f.state.on_render_event(0);
    assert!(f.factory.log().lock().presents.is_empty());
    assert!(f.factory.log().lock().registrations.is_empty());
}

#[test]
fn failed_creation_leaves_plugin_inert() {
    let mut f = fixture_with(BackendKind::Direct3D11, ScriptedFactory::new().failing());
    f.state.on_device_event(DeviceEvent::Initialize);
    assert!(matches!(f.state.create_render_manager(client()), Err(BridgeError::CreationFailed(_))));
    assert_eq!(f.state.set_color_buffer(texture(Eye::Left), 0), Err(BridgeError::NoSession));
    assert_eq!(f.state.render_frame(), Err(BridgeError::NoSession));
    assert_eq!(f.state.viewport(0), Err(BridgeError::NoSession));
}

#[test]
fn display_open_failure_is_reported() {
    let factory = ScriptedFactory::with_script(ManagerScript {
        open_status: stereo_api::OpenStatus::Failure,
        ..Default::default()
    });
    let mut f = fixture_with(BackendKind::Direct3D11, factory);
    f.state.on_device_event(DeviceEvent::Initialize);
    assert_eq!(f.state.create_render_manager(client()), Err(BridgeError::DisplayOpenFailed));
    assert!(!f.state.has_session());
}
