//! Immediate-API backend (OpenGL shaped). One framebuffer object is shared by both eyes and
//! re-targeted per eye; each eye owns a color texture and a depth renderbuffer.

mod gl;

pub use gl::GlContext;

use std::fmt::Debug;

use stereo_api::{
    BackendKind, BridgeError, BridgeResult, DeviceBinding, Eye, HostTexture, HostTextures, RenderBuffer,
    RenderInfo, SceneDraw, StereoBackend, Viewport,
};

use crate::config::{BridgeConfig, TextureFilter, TextureWrap};
use crate::present::{pose_to_model_view, projection_to_gl};
use crate::resources::EyeSlots;

/// GL context current on the host render thread. Object names are plain GL names.
pub trait ImmediateContext: Send + Debug {
    fn gen_framebuffer(&mut self) -> Result<u32, String>;
    fn delete_framebuffer(&mut self, framebuffer: u32);
    /// RGB8 texture with the given sampling, contents undefined.
    fn create_color_texture(&mut self, width: u32, height: u32, filter: TextureFilter, wrap: TextureWrap) -> Result<u32, String>;
    fn delete_texture(&mut self, texture: u32);
    fn create_depth_buffer(&mut self, width: u32, height: u32) -> Result<u32, String>;
    fn delete_renderbuffer(&mut self, renderbuffer: u32);
    /// Bind `framebuffer` for drawing with `color` and `depth` attached. Returns framebuffer completeness.
    fn bind_eye_target(&mut self, framebuffer: u32, color: u32, depth: u32) -> bool;
    fn set_viewport(&mut self, viewport: &Viewport);
    fn load_matrices(&mut self, projection: &[f64; 16], model_view: &[f64; 16]);
    fn clear(&mut self, color: [f32; 4]);
    /// Copy the host texture into the bound draw target through `read_framebuffer`.
    fn blit_from_texture(&mut self, read_framebuffer: u32, source: HostTexture, width: u32, height: u32) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy)]
struct SharedFramebuffers {
    draw: u32,
    read: u32,
}

#[derive(Debug, Clone, Copy)]
struct ImmediateEyeBuffer {
    color: u32,
    depth: u32,
    size: (u32, u32),
}

pub struct ImmediateBackend {
    gl: Box<dyn ImmediateContext>,
    config: BridgeConfig,
    framebuffers: Option<SharedFramebuffers>,
    buffers: EyeSlots<ImmediateEyeBuffer>,
}

impl ImmediateBackend {
    pub fn new(gl: Box<dyn ImmediateContext>, config: BridgeConfig) -> Self {
        Self { gl, config, framebuffers: None, buffers: EyeSlots::default() }
    }

    /// Shared draw framebuffer, once any eye buffer was built.
    pub fn framebuffer(&self) -> Option<u32> {
        self.framebuffers.map(|fb| fb.draw)
    }

    /// Created by whichever eye is built first.
    fn ensure_framebuffers(&mut self) -> BridgeResult<SharedFramebuffers> {
        if let Some(fb) = self.framebuffers {
            return Ok(fb);
        }
        let draw = self.gl.gen_framebuffer().map_err(BridgeError::FramebufferCreationFailed)?;
        let read = match self.gl.gen_framebuffer() {
            Ok(read) => read,
            Err(e) => {
                self.gl.delete_framebuffer(draw);
                return Err(BridgeError::FramebufferCreationFailed(e));
            }
        };
        let fb = SharedFramebuffers { draw, read };
        self.framebuffers = Some(fb);
        Ok(fb)
    }

    fn release(&mut self, buffer: ImmediateEyeBuffer) {
        self.gl.delete_renderbuffer(buffer.depth);
        self.gl.delete_texture(buffer.color);
    }
}

impl StereoBackend for ImmediateBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenGl
    }

    fn bind_device(&mut self) -> BridgeResult<DeviceBinding> {
        Ok(DeviceBinding::OpenGl)
    }

    fn needs_client_update(&self) -> bool {
        true
    }

    fn ensure_eye_buffer(&mut self, eye: Eye, info: &RenderInfo) -> BridgeResult<()> {
        log::debug!("ConstructBuffersOpenGL for {eye:?}");
        self.ensure_framebuffers()?;
        let (width, height) = info.viewport.size_px();
        if width == 0 || height == 0 {
            return Err(BridgeError::TextureCreationFailed(format!("viewport is {width}x{height}")));
        }
        if self.buffers.get(eye).is_some_and(|b| b.size == (width, height)) {
            return Ok(());
        }
        if let Some(stale) = self.buffers.take(eye) {
            self.release(stale);
        }
        let color = self
            .gl
            .create_color_texture(width, height, self.config.texture_filter, self.config.texture_wrap)
            .map_err(BridgeError::TextureCreationFailed)?;
        let depth = match self.gl.create_depth_buffer(width, height) {
            Ok(depth) => depth,
            Err(e) => {
                self.gl.delete_texture(color);
                return Err(BridgeError::DepthCreationFailed(e));
            }
        };
        self.buffers.replace(eye, ImmediateEyeBuffer { color, depth, size: (width, height) });
        Ok(())
    }

    fn has_eye_buffer(&self, eye: Eye) -> bool {
        self.buffers.contains(eye)
    }

    fn render_buffers(&self, count: usize) -> Option<Vec<RenderBuffer>> {
        self.buffers.ordered(count).map(|buffers| {
            buffers
                .into_iter()
                .map(|b| RenderBuffer::OpenGl { color: b.color, depth: b.depth })
                .collect()
        })
    }

    fn present_frame(
        &mut self,
        infos: &[RenderInfo],
        sources: &HostTextures,
        scene: &mut dyn SceneDraw,
    ) -> BridgeResult<Vec<RenderBuffer>> {
        if let Some(eye) = self.buffers.first_missing(infos.len()) {
            return Err(BridgeError::MissingEyeBuffer(eye));
        }
        if let Some(eye) = Eye::ALL.into_iter().take(infos.len()).find(|&eye| sources.get(eye).is_none()) {
            return Err(BridgeError::MissingHostTexture(eye));
        }
        let fb = self.ensure_framebuffers()?;
        let mut presented = Vec::with_capacity(infos.len());
        for (eye, info) in Eye::ALL.into_iter().zip(infos) {
            let (Some(buffer), Some(source)) = (self.buffers.get(eye).copied(), sources.get(eye)) else {
                continue;
            };
            presented.push(RenderBuffer::OpenGl { color: buffer.color, depth: buffer.depth });
            if !self.gl.bind_eye_target(fb.draw, buffer.color, buffer.depth) {
                log::warn!("Framebuffer incomplete for {eye:?}; skipping draw");
                continue;
            }
            // Cover the whole eye texture as allocated.
            let (width, height) = buffer.size;
            self.gl.set_viewport(&Viewport { left: 0.0, lower: 0.0, width: f64::from(width), height: f64::from(height) });
            self.gl.load_matrices(&projection_to_gl(&info.projection), &pose_to_model_view(&info.pose));
            self.gl.clear(self.config.clear_color);
            self.gl
                .blit_from_texture(fb.read, source, width, height)
                .map_err(BridgeError::Native)?;
            scene.draw_eye(eye, info);
        }
        Ok(presented)
    }

    fn flip_y(&self) -> bool {
        false
    }

    fn teardown(&mut self) {
        let drained: Vec<_> = self.buffers.drain().collect();
        for (eye, buffer) in drained {
            log::debug!("Releasing OpenGL eye buffer for {eye:?}");
            self.release(buffer);
        }
        if let Some(fb) = self.framebuffers.take() {
            self.gl.delete_framebuffer(fb.read);
            self.gl.delete_framebuffer(fb.draw);
        }
    }
}

impl Drop for ImmediateBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}
