//! Shared stereo bridge API for the OSVR Unity rendering plugin.
//! Defines the per-eye RenderInfo types, the StereoBackend trait implemented by the explicit
//! (Direct3D 11) and immediate (OpenGL) backends, and the RenderManager seam so the host-facing
//! state machine can drive either backend with the same code path.

mod backend;
mod error;
mod handle;
mod manager;
mod render_info;

pub use backend::{BackendKind, DeviceBinding, DeviceEvent, NoSceneDraw, RenderEvent, SceneDraw, StereoBackend};
pub use error::{BridgeError, BridgeResult};
pub use handle::{HostTexture, HostTextures, NativeHandle};
pub use manager::{ClientContext, OpenStatus, RenderBuffer, RenderManager, RenderManagerFactory};
pub use render_info::{Eye, Pose, ProjectionMatrix, Quaternion, RenderInfo, Viewport, EYE_COUNT};
