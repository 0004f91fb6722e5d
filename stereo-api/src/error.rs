use crate::render_info::Eye;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Failures reported to the host as a status code plus a log line.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("no graphics backend is active")]
    NoBackend,

    #[error("host did not supply a graphics device: {0}")]
    NoDevice(String),

    #[error("no render-manager session")]
    NoSession,

    #[error("could not create RenderManager: {0}")]
    CreationFailed(String),

    #[error("could not open display")]
    DisplayOpenFailed,

    #[error("render info has not been fetched yet")]
    NoRenderInfo,

    #[error("eye {0} is outside the render info reported by the render-manager")]
    EyeOutOfRange(i32),

    #[error("can't create texture for eye: {0}")]
    TextureCreationFailed(String),

    #[error("could not create render target view for eye: {0}")]
    ViewCreationFailed(String),

    #[error("could not create depth buffer for eye: {0}")]
    DepthCreationFailed(String),

    #[error("could not create framebuffer: {0}")]
    FramebufferCreationFailed(String),

    #[error("no eye buffer for {0:?}")]
    MissingEyeBuffer(Eye),

    #[error("no host texture for {0:?}")]
    MissingHostTexture(Eye),

    #[error("native graphics call failed: {0}")]
    Native(String),
}

impl BridgeError {
    /// Frame-skip conditions: expected while the host is still registering eye textures, and
    /// between a shutdown or device reset and the next render-manager.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NoSession | Self::MissingEyeBuffer(_) | Self::MissingHostTexture(_))
    }
}
