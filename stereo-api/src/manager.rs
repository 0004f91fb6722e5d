//! The external render-manager seen as an opaque collaborator.

use crate::backend::DeviceBinding;
use crate::error::BridgeResult;
use crate::handle::NativeHandle;
use crate::render_info::RenderInfo;

/// Tracking-client context supplied by the host (`OSVR_ClientContext`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientContext(NativeHandle);

impl ClientContext {
    pub fn new(handle: NativeHandle) -> Self {
        Self(handle)
    }

    pub fn handle(self) -> NativeHandle {
        self.0
    }
}

/// Result of opening the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenStatus {
    Failure,
    Partial,
    Complete,
}

/// One eye's buffer in the form the render-manager presents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderBuffer {
    Direct3D11 { color: NativeHandle, view: NativeHandle },
    OpenGl { color: u32, depth: u32 },
}

/// Render-manager instance. Owns tracking, distortion and compositing; the bridge only feeds it buffers.
pub trait RenderManager: Send {
    /// False when construction did not succeed.
    fn doing_okay(&self) -> bool;

    fn open_display(&mut self) -> OpenStatus;

    /// Ordered per-eye RenderInfo for the current tracker state.
    fn render_info(&mut self) -> Vec<RenderInfo>;

    /// Pump the tracking client so the next `render_info` is current.
    fn update_client(&mut self) {}

    /// Announce the buffer sequence that subsequent presents will use.
    fn register_buffers(&mut self, _buffers: &[RenderBuffer]) -> bool {
        true
    }

    /// Present one buffer per eye. False when the manager declines (e.g. it was asked to quit).
    fn present(&mut self, buffers: &[RenderBuffer], infos: &[RenderInfo], flip_y: bool) -> bool;
}

/// Builds a render-manager bound to the host's device.
pub trait RenderManagerFactory: Send {
    fn create(&self, client: ClientContext, binding: &DeviceBinding) -> BridgeResult<Box<dyn RenderManager>>;
}
