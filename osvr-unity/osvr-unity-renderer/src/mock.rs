//! Mock native devices and a scripted render-manager. Every native object is tracked in a shared
//! ledger so tests can check that each created buffer is released exactly once.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use stereo_api::{
    BridgeError, BridgeResult, ClientContext, DeviceBinding, Eye, HostTexture, NativeHandle, OpenStatus, Pose,
    ProjectionMatrix, Quaternion, RenderBuffer, RenderInfo, RenderManager, RenderManagerFactory, SceneDraw, Viewport,
};

use crate::config::{ColorFormat, TextureFilter, TextureWrap};
use crate::explicit::{ColorTargetDescriptor, ExplicitDevice};
use crate::immediate::ImmediateContext;

/// Device handle reported by MockExplicitDevice.
pub const MOCK_DEVICE: NativeHandle = NativeHandle::from_raw(0xD311);
/// Context handle reported by MockExplicitDevice.
pub const MOCK_CONTEXT: NativeHandle = NativeHandle::from_raw(0xC011);

#[derive(Debug, Default)]
pub struct NativeLedger {
    pub textures_created: usize,
    pub textures_released: usize,
    pub views_created: usize,
    pub views_released: usize,
    pub renderbuffers_created: usize,
    pub renderbuffers_released: usize,
    pub framebuffers_created: usize,
    pub framebuffers_deleted: usize,
    pub double_releases: usize,
    pub last_color_target: Option<ColorTargetDescriptor>,
    pub copies: Vec<(NativeHandle, HostTexture)>,
    pub render_target_binds: usize,
    /// Framebuffer bound for each eye draw.
    pub framebuffer_binds: Vec<u32>,
    pub viewports: Vec<Viewport>,
    /// (projection, model-view) uploaded for each eye draw.
    pub matrices: Vec<([f64; 16], [f64; 16])>,
    pub clears: Vec<[f32; 4]>,
    /// (read framebuffer, source) per blit.
    pub blits: Vec<(u32, HostTexture)>,
    live: HashSet<usize>,
}

impl NativeLedger {
    /// Native objects created and not yet released.
    pub fn outstanding(&self) -> usize {
        self.live.len()
    }

    fn create(&mut self, id: usize) {
        self.live.insert(id);
    }

    fn release(&mut self, id: usize) {
        if !self.live.remove(&id) {
            self.double_releases += 1;
        }
    }
}

pub type SharedLedger = Arc<Mutex<NativeLedger>>;

#[derive(Debug)]
pub struct MockExplicitDevice {
    ledger: SharedLedger,
    next: usize,
    fail_textures: bool,
    fail_views: bool,
}

impl Default for MockExplicitDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExplicitDevice {
    pub fn new() -> Self {
        Self::with_ledger(SharedLedger::default())
    }

    /// Record into an existing ledger, e.g. one the test keeps across device re-creation.
    pub fn with_ledger(ledger: SharedLedger) -> Self {
        Self { ledger, next: 0x1_0000, fail_textures: false, fail_views: false }
    }

    pub fn failing_textures(mut self) -> Self {
        self.fail_textures = true;
        self
    }

    pub fn failing_views(mut self) -> Self {
        self.fail_views = true;
        self
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    fn next_id(&mut self) -> usize {
        self.next += 0x10;
        self.next
    }
}

impl ExplicitDevice for MockExplicitDevice {
    fn device_handle(&self) -> NativeHandle {
        MOCK_DEVICE
    }

    fn context_handle(&self) -> NativeHandle {
        MOCK_CONTEXT
    }

    fn create_color_target(&mut self, desc: &ColorTargetDescriptor) -> Result<NativeHandle, String> {
        if self.fail_textures {
            return Err("E_OUTOFMEMORY".to_string());
        }
        let id = self.next_id();
        let mut ledger = self.ledger.lock();
        ledger.textures_created += 1;
        ledger.last_color_target = Some(desc.clone());
        ledger.create(id);
        Ok(NativeHandle::from_raw(id))
    }

    fn create_render_target_view(&mut self, texture: NativeHandle, _format: ColorFormat) -> Result<NativeHandle, String> {
        if self.fail_views {
            return Err(format!("E_INVALIDARG for texture {:#x}", texture.raw()));
        }
        let id = self.next_id();
        let mut ledger = self.ledger.lock();
        ledger.views_created += 1;
        ledger.create(id);
        Ok(NativeHandle::from_raw(id))
    }

    fn set_render_target(&mut self, _view: NativeHandle) {
        self.ledger.lock().render_target_binds += 1;
    }

    fn copy_resource(&mut self, dst: NativeHandle, src: HostTexture) -> Result<(), String> {
        self.ledger.lock().copies.push((dst, src));
        Ok(())
    }

    fn release_texture(&mut self, texture: NativeHandle) {
        let mut ledger = self.ledger.lock();
        ledger.textures_released += 1;
        ledger.release(texture.raw());
    }

    fn release_view(&mut self, view: NativeHandle) {
        let mut ledger = self.ledger.lock();
        ledger.views_released += 1;
        ledger.release(view.raw());
    }
}

#[derive(Debug)]
pub struct MockImmediateContext {
    ledger: SharedLedger,
    next: u32,
    incomplete: bool,
    fail_depth: bool,
    fail_framebuffers: bool,
}

impl Default for MockImmediateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImmediateContext {
    pub fn new() -> Self {
        Self::with_ledger(SharedLedger::default())
    }

    pub fn with_ledger(ledger: SharedLedger) -> Self {
        Self { ledger, next: 0, incomplete: false, fail_depth: false, fail_framebuffers: false }
    }

    /// Every eye target reports an incomplete framebuffer.
    pub fn incomplete(mut self) -> Self {
        self.incomplete = true;
        self
    }

    pub fn failing_depth(mut self) -> Self {
        self.fail_depth = true;
        self
    }

    pub fn failing_framebuffers(mut self) -> Self {
        self.fail_framebuffers = true;
        self
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    fn next_name(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
}

impl ImmediateContext for MockImmediateContext {
    fn gen_framebuffer(&mut self) -> Result<u32, String> {
        if self.fail_framebuffers {
            return Err("glGenFramebuffers returned 0".to_string());
        }
        let name = self.next_name();
        let mut ledger = self.ledger.lock();
        ledger.framebuffers_created += 1;
        ledger.create(name as usize);
        Ok(name)
    }

    fn delete_framebuffer(&mut self, framebuffer: u32) {
        let mut ledger = self.ledger.lock();
        ledger.framebuffers_deleted += 1;
        ledger.release(framebuffer as usize);
    }

    fn create_color_texture(&mut self, _width: u32, _height: u32, _filter: TextureFilter, _wrap: TextureWrap) -> Result<u32, String> {
        let name = self.next_name();
        let mut ledger = self.ledger.lock();
        ledger.textures_created += 1;
        ledger.create(name as usize);
        Ok(name)
    }

    fn delete_texture(&mut self, texture: u32) {
        let mut ledger = self.ledger.lock();
        ledger.textures_released += 1;
        ledger.release(texture as usize);
    }

    fn create_depth_buffer(&mut self, _width: u32, _height: u32) -> Result<u32, String> {
        if self.fail_depth {
            return Err("GL error 0x0505".to_string());
        }
        let name = self.next_name();
        let mut ledger = self.ledger.lock();
        ledger.renderbuffers_created += 1;
        ledger.create(name as usize);
        Ok(name)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: u32) {
        let mut ledger = self.ledger.lock();
        ledger.renderbuffers_released += 1;
        ledger.release(renderbuffer as usize);
    }

    fn bind_eye_target(&mut self, framebuffer: u32, _color: u32, _depth: u32) -> bool {
        self.ledger.lock().framebuffer_binds.push(framebuffer);
        !self.incomplete
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.ledger.lock().viewports.push(*viewport);
    }

    fn load_matrices(&mut self, projection: &[f64; 16], model_view: &[f64; 16]) {
        self.ledger.lock().matrices.push((*projection, *model_view));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.ledger.lock().clears.push(color);
    }

    fn blit_from_texture(&mut self, read_framebuffer: u32, source: HostTexture, _width: u32, _height: u32) -> Result<(), String> {
        self.ledger.lock().blits.push((read_framebuffer, source));
        Ok(())
    }
}

/// Scene draw that records which eyes were drawn.
#[derive(Debug, Default)]
pub struct RecordingSceneDraw {
    pub eyes: Vec<Eye>,
}

impl SceneDraw for RecordingSceneDraw {
    fn draw_eye(&mut self, eye: Eye, _info: &RenderInfo) {
        self.eyes.push(eye);
    }
}

/// Two eyes side by side on a 2160x1200 panel, 64 mm apart.
pub fn sample_render_info() -> Vec<RenderInfo> {
    Eye::ALL
        .into_iter()
        .map(|eye| {
            let side = if eye == Eye::Left { -1.0 } else { 1.0 };
            RenderInfo {
                viewport: Viewport { left: 0.0, lower: 0.0, width: 1080.0, height: 1200.0 },
                projection: ProjectionMatrix {
                    left: -1.0 - 0.1 * side,
                    right: 1.0 - 0.1 * side,
                    top: 1.1,
                    bottom: -1.1,
                    near_clip: 0.1,
                    far_clip: 100.0,
                },
                pose: Pose { translation: [0.032 * side, 1.7, 0.0], rotation: Quaternion::default() },
            }
        })
        .collect()
}

/// Render-manager behavior, editable between frames.
#[derive(Debug, Clone)]
pub struct ManagerScript {
    pub infos: Vec<RenderInfo>,
    pub doing_okay: bool,
    pub open_status: OpenStatus,
    pub present_accepts: bool,
    pub register_accepts: bool,
    /// Shift every pose along X by 1 mm per refresh.
    pub animate_pose: bool,
}

impl Default for ManagerScript {
    fn default() -> Self {
        Self {
            infos: sample_render_info(),
            doing_okay: true,
            open_status: OpenStatus::Complete,
            present_accepts: true,
            register_accepts: true,
            animate_pose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresentRecord {
    pub buffers: Vec<RenderBuffer>,
    pub infos: Vec<RenderInfo>,
    pub flip_y: bool,
}

/// What the scripted managers were asked to do.
#[derive(Debug, Default)]
pub struct ManagerLog {
    pub created: usize,
    pub dropped: usize,
    pub clients: Vec<ClientContext>,
    pub bindings: Vec<DeviceBinding>,
    pub refreshes: usize,
    pub client_updates: usize,
    pub registrations: Vec<Vec<RenderBuffer>>,
    pub presents: Vec<PresentRecord>,
}

impl ManagerLog {
    /// Managers created and not yet dropped.
    pub fn live(&self) -> usize {
        self.created - self.dropped
    }
}

pub struct ScriptedRenderManager {
    script: Arc<Mutex<ManagerScript>>,
    log: Arc<Mutex<ManagerLog>>,
    refreshes: u32,
}

impl RenderManager for ScriptedRenderManager {
    fn doing_okay(&self) -> bool {
        self.script.lock().doing_okay
    }

    fn open_display(&mut self) -> OpenStatus {
        self.script.lock().open_status
    }

    fn render_info(&mut self) -> Vec<RenderInfo> {
        self.refreshes += 1;
        self.log.lock().refreshes += 1;
        let script = self.script.lock();
        let mut infos = script.infos.clone();
        if script.animate_pose {
            let shift = f64::from(self.refreshes) * 0.001;
            for info in &mut infos {
                info.pose.translation[0] += shift;
            }
        }
        infos
    }

    fn update_client(&mut self) {
        self.log.lock().client_updates += 1;
    }

    fn register_buffers(&mut self, buffers: &[RenderBuffer]) -> bool {
        self.log.lock().registrations.push(buffers.to_vec());
        self.script.lock().register_accepts
    }

    fn present(&mut self, buffers: &[RenderBuffer], infos: &[RenderInfo], flip_y: bool) -> bool {
        self.log.lock().presents.push(PresentRecord { buffers: buffers.to_vec(), infos: infos.to_vec(), flip_y });
        self.script.lock().present_accepts
    }
}

impl Drop for ScriptedRenderManager {
    fn drop(&mut self) {
        self.log.lock().dropped += 1;
    }
}

/// Factory handing out ScriptedRenderManagers that share one script and one log.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<ManagerScript>>,
    log: Arc<Mutex<ManagerLog>>,
    fail_creation: bool,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: ManagerScript) -> Self {
        Self { script: Arc::new(Mutex::new(script)), ..Self::default() }
    }

    /// Creation itself fails, e.g. the render-manager library is missing.
    pub fn failing(mut self) -> Self {
        self.fail_creation = true;
        self
    }

    pub fn script(&self) -> Arc<Mutex<ManagerScript>> {
        self.script.clone()
    }

    pub fn log(&self) -> Arc<Mutex<ManagerLog>> {
        self.log.clone()
    }
}

impl RenderManagerFactory for ScriptedFactory {
    fn create(&self, client: ClientContext, binding: &DeviceBinding) -> BridgeResult<Box<dyn RenderManager>> {
        if self.fail_creation {
            return Err(BridgeError::CreationFailed("scripted failure".to_string()));
        }
        let mut log = self.log.lock();
        log.created += 1;
        log.clients.push(client);
        log.bindings.push(*binding);
        Ok(Box::new(ScriptedRenderManager { script: self.script.clone(), log: self.log.clone(), refreshes: 0 }))
    }
}
