//! OpenGL through `glow`, loaded at runtime. The host owns the context; every call assumes it is
//! current on the calling thread.

use std::ffi::{c_char, c_void, CStr, CString};
use std::num::NonZeroU32;
use std::sync::Arc;

use glow::HasContext;
use stereo_api::{HostTexture, Viewport};

use super::ImmediateContext;
use crate::config::{TextureFilter, TextureWrap};

// Fixed-function matrix modes.
const MODELVIEW: u32 = 0x1700;
const PROJECTION: u32 = 0x1701;

/// Pending error flags drained before a checked call, at most this many.
const MAX_PENDING_ERRORS: usize = 32;

/// Entry points the immediate backend cannot work without. Checked before `glow` is built,
/// since building it already issues GL calls.
const REQUIRED: &[&CStr] = &[
    c"glGenFramebuffers",
    c"glBindFramebuffer",
    c"glFramebufferTexture2D",
    c"glFramebufferRenderbuffer",
    c"glCheckFramebufferStatus",
    c"glDrawBuffers",
    c"glBlitFramebuffer",
    c"glGenRenderbuffers",
    c"glRenderbufferStorage",
    c"glGenTextures",
    c"glTexImage2D",
    c"glGetError",
];

type MatrixModeFn = unsafe extern "system" fn(u32);
type LoadMatrixdFn = unsafe extern "system" fn(*const f64);

/// Fixed-function matrix stack; absent from core profiles.
#[derive(Clone, Copy)]
struct FixedFunction {
    matrix_mode: MatrixModeFn,
    load_matrixd: LoadMatrixdFn,
}

impl FixedFunction {
    fn load(loader: &mut impl FnMut(&CStr) -> *const c_void) -> Option<Self> {
        let matrix_mode = loader(c"glMatrixMode");
        let load_matrixd = loader(c"glLoadMatrixd");
        if matrix_mode.is_null() || load_matrixd.is_null() {
            return None;
        }
        // SAFETY: non-null addresses returned by the GL loader for these exact names.
        unsafe {
            Some(Self {
                matrix_mode: std::mem::transmute::<*const c_void, MatrixModeFn>(matrix_mode),
                load_matrixd: std::mem::transmute::<*const c_void, LoadMatrixdFn>(load_matrixd),
            })
        }
    }
}

pub struct GlContext {
    gl: glow::Context,
    fixed: Option<FixedFunction>,
    _library: Option<Arc<libloading::Library>>,
}

// SAFETY: the backend only touches the context from the host render thread that owns it.
unsafe impl Send for GlContext {}

impl std::fmt::Debug for GlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlContext").field("fixed_function", &self.fixed.is_some()).finish()
    }
}

fn missing_entry_point(loader: &mut impl FnMut(&CStr) -> *const c_void) -> Option<&'static CStr> {
    REQUIRED.iter().copied().find(|&name| loader(name).is_null())
}

#[cfg(target_os = "windows")]
const SYSTEM_GL: &str = "opengl32.dll";
#[cfg(target_os = "windows")]
const PROC_ADDRESS: &[u8] = b"wglGetProcAddress\0";
#[cfg(target_os = "macos")]
const SYSTEM_GL: &str = "/System/Library/Frameworks/OpenGL.framework/OpenGL";
#[cfg(target_os = "macos")]
const PROC_ADDRESS: &[u8] = b"\0";
#[cfg(all(unix, not(target_os = "macos")))]
const SYSTEM_GL: &str = "libGL.so.1";
#[cfg(all(unix, not(target_os = "macos")))]
const PROC_ADDRESS: &[u8] = b"glXGetProcAddressARB\0";

/// Read error flags until `NO_ERROR` or the cap. Returns how many flags were discarded.
fn drain_pending(mut get_error: impl FnMut() -> u32) -> usize {
    (0..MAX_PENDING_ERRORS).take_while(|_| get_error() != glow::NO_ERROR).count()
}

fn texture(name: u32) -> Option<glow::Texture> {
    NonZeroU32::new(name).map(glow::NativeTexture)
}

fn framebuffer(name: u32) -> Option<glow::Framebuffer> {
    NonZeroU32::new(name).map(glow::NativeFramebuffer)
}

fn renderbuffer(name: u32) -> Option<glow::Renderbuffer> {
    NonZeroU32::new(name).map(glow::NativeRenderbuffer)
}

impl GlContext {
    /// Resolve every entry point through `loader`. Fails on the first missing required one.
    pub fn load_with(mut loader: impl FnMut(&CStr) -> *const c_void) -> Result<Self, String> {
        if let Some(name) = missing_entry_point(&mut loader) {
            return Err(format!("missing GL entry point {}", name.to_string_lossy()));
        }
        let fixed = FixedFunction::load(&mut loader);
        // SAFETY: the host's context is current and the required entry points resolved.
        let gl = unsafe {
            glow::Context::from_loader_function(|name| match CString::new(name) {
                Ok(name) => loader(&name),
                Err(_) => std::ptr::null(),
            })
        };
        Ok(Self { gl, fixed, _library: None })
    }

    /// Load from the platform GL library. Extension entry points go through the platform
    /// proc-address function, core 1.1 ones through the library's exports.
    pub fn load_system() -> Result<Self, String> {
        type GetProcAddress = unsafe extern "system" fn(*const c_char) -> *const c_void;

        let library = unsafe { libloading::Library::new(SYSTEM_GL) }.map_err(|e| format!("{SYSTEM_GL}: {e}"))?;
        let library = Arc::new(library);
        let mut context = {
            let get_proc = unsafe { library.get::<GetProcAddress>(PROC_ADDRESS) }.ok();
            Self::load_with(|name| {
                if let Some(get_proc) = &get_proc {
                    let ptr = unsafe { get_proc(name.as_ptr()) };
                    // wglGetProcAddress signals failure with small sentinel values as well as null.
                    if !matches!(ptr as isize, -1..=3) {
                        return ptr;
                    }
                }
                unsafe { library.get::<*const c_void>(name.to_bytes_with_nul()) }
                    .map(|symbol| *symbol)
                    .unwrap_or(std::ptr::null())
            })?
        };
        context._library = Some(library);
        Ok(context)
    }

    /// Clear error flags left pending by the host so the next check sees only our own.
    fn drain_errors(&self) {
        let drained = drain_pending(|| unsafe { self.gl.get_error() });
        if drained == MAX_PENDING_ERRORS {
            log::warn!("GL error queue did not drain after {MAX_PENDING_ERRORS} reads");
        } else if drained > 0 {
            log::debug!("Discarded {drained} pending GL error(s)");
        }
    }

    fn check_error(&self, what: &str) -> Result<(), String> {
        match unsafe { self.gl.get_error() } {
            glow::NO_ERROR => Ok(()),
            code => Err(format!("{what}: GL error 0x{code:04X}")),
        }
    }
}

impl ImmediateContext for GlContext {
    fn gen_framebuffer(&mut self) -> Result<u32, String> {
        let framebuffer = unsafe { self.gl.create_framebuffer() }?;
        Ok(framebuffer.0.get())
    }

    fn delete_framebuffer(&mut self, name: u32) {
        if let Some(fb) = framebuffer(name) {
            unsafe { self.gl.delete_framebuffer(fb) };
        }
    }

    fn create_color_texture(&mut self, width: u32, height: u32, filter: TextureFilter, wrap: TextureWrap) -> Result<u32, String> {
        let filter = match filter {
            TextureFilter::Nearest => glow::NEAREST,
            TextureFilter::Linear => glow::LINEAR,
        } as i32;
        let wrap = match wrap {
            TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
            TextureWrap::Repeat => glow::REPEAT,
        } as i32;
        self.drain_errors();
        let texture = unsafe { self.gl.create_texture() }?;
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGB8 as i32,
                width as i32,
                height as i32,
                0,
                glow::RGB,
                glow::UNSIGNED_BYTE,
                None,
            );
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap);
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
        if let Err(e) = self.check_error("glTexImage2D") {
            unsafe { self.gl.delete_texture(texture) };
            return Err(e);
        }
        Ok(texture.0.get())
    }

    fn delete_texture(&mut self, name: u32) {
        if let Some(tex) = texture(name) {
            unsafe { self.gl.delete_texture(tex) };
        }
    }

    fn create_depth_buffer(&mut self, width: u32, height: u32) -> Result<u32, String> {
        self.drain_errors();
        let depth = unsafe { self.gl.create_renderbuffer() }?;
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(depth));
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, glow::DEPTH_COMPONENT24, width as i32, height as i32);
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
        if let Err(e) = self.check_error("glRenderbufferStorage") {
            unsafe { self.gl.delete_renderbuffer(depth) };
            return Err(e);
        }
        Ok(depth.0.get())
    }

    fn delete_renderbuffer(&mut self, name: u32) {
        if let Some(rb) = renderbuffer(name) {
            unsafe { self.gl.delete_renderbuffer(rb) };
        }
    }

    fn bind_eye_target(&mut self, fb: u32, color: u32, depth: u32) -> bool {
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer(fb));
            self.gl
                .framebuffer_texture_2d(glow::FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, texture(color), 0);
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                renderbuffer(depth),
            );
            self.gl.draw_buffers(&[glow::COLOR_ATTACHMENT0]);
            self.gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE
        }
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        unsafe {
            self.gl.viewport(
                viewport.left as i32,
                viewport.lower as i32,
                viewport.width as i32,
                viewport.height as i32,
            )
        };
    }

    fn load_matrices(&mut self, projection: &[f64; 16], model_view: &[f64; 16]) {
        let Some(fixed) = self.fixed else {
            return;
        };
        unsafe {
            (fixed.matrix_mode)(PROJECTION);
            (fixed.load_matrixd)(projection.as_ptr());
            (fixed.matrix_mode)(MODELVIEW);
            (fixed.load_matrixd)(model_view.as_ptr());
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        unsafe {
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    fn blit_from_texture(&mut self, read_framebuffer: u32, source: HostTexture, width: u32, height: u32) -> Result<(), String> {
        let (w, h) = (width as i32, height as i32);
        self.drain_errors();
        let complete = unsafe {
            self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, framebuffer(read_framebuffer));
            self.gl.framebuffer_texture_2d(
                glow::READ_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                texture(source.gl_name()),
                0,
            );
            self.gl.check_framebuffer_status(glow::READ_FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE
        };
        if complete {
            unsafe { self.gl.blit_framebuffer(0, 0, w, h, 0, 0, w, h, glow::COLOR_BUFFER_BIT, glow::NEAREST) };
        }
        unsafe {
            self.gl
                .framebuffer_texture_2d(glow::READ_FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, None, 0);
            self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
        }
        if !complete {
            return Err(format!("host texture {} is not readable", source.gl_name()));
        }
        self.check_error("glBlitFramebuffer")
    }
}
