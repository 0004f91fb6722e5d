//! Trait for stereo backends (explicit Direct3D 11 or immediate OpenGL). The host-facing state
//! machine uses this to build eye buffers and present frames uniformly.

use crate::error::BridgeResult;
use crate::handle::{HostTextures, NativeHandle};
use crate::manager::RenderBuffer;
use crate::render_info::{Eye, RenderInfo};

/// Graphics backend the host is running on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BackendKind {
    #[default]
    None,
    /// Explicit-API backend.
    Direct3D11,
    /// Legacy immediate-mode backend.
    OpenGl,
}

impl BackendKind {
    /// Map a `UnityGfxRenderer` value. Renderers without a compiled-in backend map to None.
    pub fn from_unity_renderer(renderer: i32) -> Self {
        match renderer {
            2 => BackendKind::Direct3D11,
            // kUnityGfxRendererOpenGL (legacy) and kUnityGfxRendererOpenGLCore
            0 | 17 => BackendKind::OpenGl,
            _ => BackendKind::None,
        }
    }

    /// Graphics library name handed to the render-manager.
    pub fn graphics_library_name(self) -> Option<&'static str> {
        match self {
            BackendKind::Direct3D11 => Some("Direct3D11"),
            BackendKind::OpenGl => Some("OpenGL"),
            BackendKind::None => None,
        }
    }
}

/// Device lifecycle event raised by the host (`UnityGfxDeviceEventType`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceEvent {
    Initialize,
    Shutdown,
    BeforeReset,
    AfterReset,
}

impl DeviceEvent {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(DeviceEvent::Initialize),
            1 => Some(DeviceEvent::Shutdown),
            2 => Some(DeviceEvent::BeforeReset),
            3 => Some(DeviceEvent::AfterReset),
            _ => None,
        }
    }
}

/// Event id passed through the host's plugin-event mechanism.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    Render,
    Shutdown,
}

impl RenderEvent {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(RenderEvent::Render),
            1 => Some(RenderEvent::Shutdown),
            _ => None,
        }
    }
}

/// Host device handles captured at Initialize, in the form the render-manager expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceBinding {
    Direct3D11 { device: NativeHandle, context: NativeHandle },
    /// The host's GL context is current on the calling thread; no handle is captured.
    OpenGl,
}

impl DeviceBinding {
    pub fn kind(&self) -> BackendKind {
        match self {
            DeviceBinding::Direct3D11 { .. } => BackendKind::Direct3D11,
            DeviceBinding::OpenGl => BackendKind::OpenGl,
        }
    }
}

/// Draws application content into the currently bound eye target.
/// Called once per eye after the host texture was copied and before the frame is presented.
pub trait SceneDraw: Send {
    fn draw_eye(&mut self, eye: Eye, info: &RenderInfo);
}

/// Scene draw that draws nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSceneDraw;

impl SceneDraw for NoSceneDraw {
    fn draw_eye(&mut self, _eye: Eye, _info: &RenderInfo) {}
}

/// Stereo backend the host can use regardless of whether the implementation is D3D11 or OpenGL.
pub trait StereoBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Capture the host device/context for the render-manager.
    fn bind_device(&mut self) -> BridgeResult<DeviceBinding>;

    /// Whether the tracking client must be updated before RenderInfo is read for buffer construction.
    fn needs_client_update(&self) -> bool {
        false
    }

    /// Allocate (or keep, when the size still matches) the native targets for `eye`.
    /// A previous buffer of a different size is released first.
    fn ensure_eye_buffer(&mut self, eye: Eye, info: &RenderInfo) -> BridgeResult<()>;

    fn has_eye_buffer(&self, eye: Eye) -> bool;

    /// Buffers for eyes `0..count` in index order, or None while any of them is missing.
    fn render_buffers(&self, count: usize) -> Option<Vec<RenderBuffer>>;

    /// Copy each host texture into its eye buffer and run the scene draw.
    /// Returns the buffer sequence to present, in eye order.
    fn present_frame(
        &mut self,
        infos: &[RenderInfo],
        sources: &HostTextures,
        scene: &mut dyn SceneDraw,
    ) -> BridgeResult<Vec<RenderBuffer>>;

    /// Whether presentation must flip Y (host textures are upside-down relative to the target).
    fn flip_y(&self) -> bool;

    /// Release every native buffer. Safe to call repeatedly.
    fn teardown(&mut self);
}
