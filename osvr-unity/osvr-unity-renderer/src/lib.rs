//! OSVR Unity renderer: per-eye render buffers for an explicit (Direct3D 11 / wgpu) and an
//! immediate (OpenGL) graphics API, plus the matrix helpers used when drawing into them.

pub mod config;
pub mod explicit;
pub mod immediate;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod present;
pub mod resources;

pub use config::{BridgeConfig, ColorFormat, TextureFilter, TextureWrap};
#[cfg(windows)]
pub use explicit::D3d11Device;
pub use explicit::{ColorTargetDescriptor, ExplicitBackend, ExplicitDevice, TargetUsage, WgpuExplicitDevice, WgpuHostTextures};
pub use immediate::{GlContext, ImmediateBackend, ImmediateContext};
pub use present::{pose_to_model_view, projection_to_gl};
pub use resources::EyeSlots;

use stereo_api::{BackendKind, StereoBackend};

/// Native objects a backend is built on, supplied by the host once its device exists.
pub enum NativeGraphics {
    Explicit(Box<dyn ExplicitDevice>),
    Immediate(Box<dyn ImmediateContext>),
}

impl NativeGraphics {
    pub fn kind(&self) -> BackendKind {
        match self {
            NativeGraphics::Explicit(_) => BackendKind::Direct3D11,
            NativeGraphics::Immediate(_) => BackendKind::OpenGl,
        }
    }
}

/// Build the backend matching `graphics`.
pub fn create_backend(graphics: NativeGraphics, config: BridgeConfig) -> Box<dyn StereoBackend> {
    match graphics {
        NativeGraphics::Explicit(device) => Box::new(ExplicitBackend::new(device, config)),
        NativeGraphics::Immediate(gl) => Box::new(ImmediateBackend::new(gl, config)),
    }
}
