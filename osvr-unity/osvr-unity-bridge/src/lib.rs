//! OSVR Unity bridge: Unity native rendering plugin that hands the host's eye textures to OSVR
//! RenderManager through the explicit (Direct3D 11) or immediate (OpenGL) backend.

mod ffi;
mod host;
mod log_sink;
mod osvr;
mod plugin;
mod session;
pub mod unity;

pub use ffi::{ReturnCode, OSVR_RETURN_FAILURE, OSVR_RETURN_SUCCESS};
pub use host::{HostGraphics, UnityHost};
pub use log_sink::{HostConsoleLogger, LOG_PREFIX};
pub use osvr::OsvrFactory;
pub use plugin::{RendererState, ResetState};
pub use session::RenderManagerSession;
