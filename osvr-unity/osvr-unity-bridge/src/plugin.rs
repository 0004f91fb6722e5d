//! Renderer state: device-event dispatch, render-manager session, eye buffers and the per-frame
//! present, for whichever backend the host is running on.

use osvr_unity_renderer::{create_backend, BridgeConfig};
use stereo_api::{
    BackendKind, BridgeError, BridgeResult, ClientContext, DeviceBinding, DeviceEvent, Eye, HostTexture,
    HostTextures, NoSceneDraw, Pose, ProjectionMatrix, RenderEvent, RenderInfo, RenderManagerFactory, SceneDraw,
    StereoBackend, Viewport,
};

use crate::host::HostGraphics;
use crate::session::RenderManagerSession;

/// Device reset progress. Buffers and the session are dropped at BeforeReset and rebuilt on the
/// first render tick or registration after AfterReset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetState {
    Idle,
    AwaitingAfterReset,
    RebuildPending,
}

pub struct RendererState {
    config: BridgeConfig,
    host: Box<dyn HostGraphics>,
    factory: Box<dyn RenderManagerFactory>,
    scene: Box<dyn SceneDraw>,
    kind: BackendKind,
    backend: Option<Box<dyn StereoBackend>>,
    binding: Option<DeviceBinding>,
    session: Option<RenderManagerSession>,
    client: Option<ClientContext>,
    host_textures: HostTextures,
    reset: ResetState,
}

impl RendererState {
    pub fn new(host: Box<dyn HostGraphics>, factory: Box<dyn RenderManagerFactory>, config: BridgeConfig) -> Self {
        Self {
            config,
            host,
            factory,
            scene: Box::new(NoSceneDraw),
            kind: BackendKind::None,
            backend: None,
            binding: None,
            session: None,
            client: None,
            host_textures: HostTextures::default(),
            reset: ResetState::Idle,
        }
    }

    /// Draw application content into each eye buffer before it is presented.
    pub fn with_scene(mut self, scene: Box<dyn SceneDraw>) -> Self {
        self.scene = scene;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn binding(&self) -> Option<DeviceBinding> {
        self.binding
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_eye_buffer(&self, eye: Eye) -> bool {
        self.backend.as_ref().is_some_and(|b| b.has_eye_buffer(eye))
    }

    pub fn host_textures(&self) -> &HostTextures {
        &self.host_textures
    }

    pub fn reset_state(&self) -> ResetState {
        self.reset
    }

    /// Latest RenderInfo without refreshing.
    pub fn render_info(&self) -> &[RenderInfo] {
        self.session.as_ref().map(|s| s.render_info()).unwrap_or(&[])
    }

    pub fn on_device_event(&mut self, event: DeviceEvent) {
        log::info!("OnGraphicsDeviceEvent({event:?}).");
        if event == DeviceEvent::Initialize {
            self.kind = self.host.renderer();
        }
        // Shutdown is handled by the backend that was active.
        let kind = self.kind;
        if event == DeviceEvent::Shutdown {
            self.kind = BackendKind::None;
        }
        if kind == BackendKind::None {
            return;
        }
        match event {
            DeviceEvent::Initialize => self.bind_device(kind),
            DeviceEvent::Shutdown => self.release_device(),
            DeviceEvent::BeforeReset => self.before_reset(),
            DeviceEvent::AfterReset => self.after_reset(),
        }
    }

    fn bind_device(&mut self, kind: BackendKind) {
        if self.backend.is_some() {
            self.release_device();
        }
        let graphics = match self.host.native_graphics(kind) {
            Ok(graphics) => graphics,
            Err(e) => {
                log::error!("Could not get the {kind:?} device from the host: {e}");
                return;
            }
        };
        if graphics.kind() != kind {
            log::error!("Host handed over {:?} objects for a {kind:?} device", graphics.kind());
            return;
        }
        let mut backend = create_backend(graphics, self.config.clone());
        log::debug!("Binding {:?} backend", backend.kind());
        match backend.bind_device() {
            Ok(binding) => {
                self.binding = Some(binding);
                self.backend = Some(backend);
            }
            Err(e) => log::error!("{e}"),
        }
    }

    fn release_device(&mut self) {
        self.teardown();
        self.backend = None;
        self.binding = None;
        log::info!("Shut it down.");
    }

    fn before_reset(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.teardown();
        }
        self.session = None;
        if self.client.is_some() {
            self.reset = ResetState::AwaitingAfterReset;
        }
    }

    fn after_reset(&mut self) {
        if self.reset == ResetState::AwaitingAfterReset {
            self.reset = ResetState::RebuildPending;
        }
    }

    fn rebuild_if_pending(&mut self) {
        if self.reset != ResetState::RebuildPending {
            return;
        }
        self.reset = ResetState::Idle;
        let Some(client) = self.client else {
            return;
        };
        log::info!("Rebuilding RenderManager after device reset.");
        if let Err(e) = self.create_render_manager(client) {
            log::error!("{e}");
            return;
        }
        let eyes: Vec<Eye> = self.host_textures.registered_eyes().collect();
        for eye in eyes {
            if let Err(e) = self.construct_buffer(eye) {
                log::error!("{e}");
            }
        }
        self.register_if_complete();
    }

    /// Create the render-manager on the captured device. The client context is remembered even
    /// when creation fails so a device reset can retry.
    pub fn create_render_manager(&mut self, client: ClientContext) -> BridgeResult<()> {
        self.client = Some(client);
        if self.kind == BackendKind::None {
            return Err(BridgeError::NoBackend);
        }
        let binding = self
            .binding
            .ok_or_else(|| BridgeError::NoDevice("no device was captured at Initialize".to_string()))?;
        if self.session.take().is_some() {
            log::info!("Replacing existing RenderManager.");
        }
        let session = RenderManagerSession::create(self.factory.as_ref(), client, &binding)?;
        self.session = Some(session);
        self.reset = ResetState::Idle;
        self.register_if_complete();
        Ok(())
    }

    fn refreshed_info(&mut self, eye: i32) -> BridgeResult<RenderInfo> {
        let eye = Eye::from_index(eye).ok_or(BridgeError::EyeOutOfRange(eye))?;
        let session = self.session.as_mut().ok_or(BridgeError::NoSession)?;
        session.refresh_render_info();
        session.info_of(eye).copied()
    }

    pub fn viewport(&mut self, eye: i32) -> BridgeResult<Viewport> {
        self.refreshed_info(eye).map(|info| info.viewport)
    }

    pub fn projection(&mut self, eye: i32) -> BridgeResult<ProjectionMatrix> {
        self.refreshed_info(eye).map(|info| info.projection)
    }

    pub fn pose(&mut self, eye: i32) -> BridgeResult<Pose> {
        self.refreshed_info(eye).map(|info| info.pose)
    }

    /// Remember the host texture for `eye` and build that eye's buffer.
    pub fn set_color_buffer(&mut self, texture: Option<HostTexture>, eye: i32) -> BridgeResult<()> {
        log::info!("SetColorBufferFromUnity");
        if self.kind == BackendKind::None {
            return Err(BridgeError::NoBackend);
        }
        let eye = Eye::from_index(eye).ok_or(BridgeError::EyeOutOfRange(eye))?;
        self.host_textures.set(eye, texture);
        self.rebuild_if_pending();
        self.construct_buffer(eye)?;
        self.register_if_complete();
        Ok(())
    }

    fn construct_buffer(&mut self, eye: Eye) -> BridgeResult<()> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BridgeError::NoDevice("no backend was bound at Initialize".to_string()))?;
        let session = self.session.as_mut().ok_or(BridgeError::NoSession)?;
        if backend.needs_client_update() {
            session.update_client();
        }
        session.refresh_render_info();
        let info = *session.info_of(eye)?;
        backend.ensure_eye_buffer(eye, &info)
    }

    fn register_if_complete(&mut self) {
        let (Some(backend), Some(session)) = (self.backend.as_ref(), self.session.as_mut()) else {
            return;
        };
        let count = session.render_info().len();
        if count == 0 {
            return;
        }
        if let Some(buffers) = backend.render_buffers(count) {
            if !session.register_buffers(&buffers) {
                log::warn!("RegisterRenderBuffers() returned false");
            }
        }
    }

    pub fn on_render_event(&mut self, event_id: i32) {
        if self.kind == BackendKind::None {
            return;
        }
        match RenderEvent::from_id(event_id) {
            Some(RenderEvent::Render) => match self.render_frame() {
                Ok(_) => {}
                Err(e) if e.is_not_ready() => log::debug!("Skipping frame: {e}"),
                Err(e) => log::error!("{e}"),
            },
            Some(RenderEvent::Shutdown) => self.teardown(),
            None => {}
        }
    }

    /// Refresh RenderInfo, copy each host texture into its eye buffer and present.
    /// Returns whether the render-manager accepted the frame.
    pub fn render_frame(&mut self) -> BridgeResult<bool> {
        if self.kind == BackendKind::None {
            return Err(BridgeError::NoBackend);
        }
        self.rebuild_if_pending();
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BridgeError::NoDevice("no backend was bound at Initialize".to_string()))?;
        let session = self.session.as_mut().ok_or(BridgeError::NoSession)?;
        if backend.needs_client_update() {
            session.update_client();
        }
        let infos = session.refresh_render_info().to_vec();
        let buffers = backend.present_frame(&infos, &self.host_textures, self.scene.as_mut())?;
        Ok(session.present(&buffers, backend.flip_y()))
    }

    /// Release eye buffers and the session. Keeps the device binding; safe to call repeatedly.
    pub fn teardown(&mut self) {
        log::info!("Shutdown.");
        self.host_textures.clear();
        if let Some(backend) = self.backend.as_mut() {
            backend.teardown();
        }
        self.session = None;
        self.client = None;
        self.reset = ResetState::Idle;
    }
}

impl Drop for RendererState {
    fn drop(&mut self) {
        self.teardown();
    }
}
