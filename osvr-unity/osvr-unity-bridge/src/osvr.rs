//! OSVR RenderManager C API (RenderManagerC.h, RenderManagerD3D11C.h, RenderManagerOpenGLC.h),
//! resolved at runtime from the osvrRenderManager and osvrClientKit libraries.

use std::ffi::{c_char, c_void, CString};
use std::sync::Arc;

use libloading::Library;
use stereo_api::{
    BridgeError, BridgeResult, ClientContext, DeviceBinding, OpenStatus, Pose, ProjectionMatrix, RenderBuffer,
    RenderInfo, RenderManager, RenderManagerFactory, Viewport,
};

type ReturnCode = u8;
const OSVR_RETURN_SUCCESS: ReturnCode = 0;

const OSVR_OPEN_STATUS_FAILURE: i32 = 0;
const OSVR_OPEN_STATUS_PARTIAL: i32 = 1;

type Handle = *mut c_void;

#[repr(C)]
#[derive(Clone, Copy)]
struct GraphicsLibraryD3D11 {
    device: Handle,
    context: Handle,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct GraphicsLibraryOpenGL {
    toolkit: *const c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RenderBufferD3D11 {
    color_buffer: Handle,
    color_buffer_view: Handle,
    depth_stencil_buffer: Handle,
    depth_stencil_view: Handle,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RenderBufferOpenGL {
    color_buffer_name: u32,
    depth_stencil_buffer_name: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RenderInfoD3D11 {
    library: GraphicsLibraryD3D11,
    viewport: Viewport,
    pose: Pose,
    projection: ProjectionMatrix,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RenderInfoOpenGL {
    library: GraphicsLibraryOpenGL,
    viewport: Viewport,
    pose: Pose,
    projection: ProjectionMatrix,
}

#[repr(C)]
struct OpenResultsD3D11 {
    status: i32,
    library: GraphicsLibraryD3D11,
    buffers: RenderBufferD3D11,
}

#[repr(C)]
struct OpenResultsOpenGL {
    status: i32,
    library: GraphicsLibraryOpenGL,
    buffers: RenderBufferOpenGL,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RenderParams {
    world_from_room_append: *const Pose,
    room_from_head_replace: *const Pose,
    near_clip_distance_meters: f64,
    far_clip_distance_meters: f64,
}

/// Whole-buffer cropping viewport for presents.
const FULL_VIEWPORT: Viewport = Viewport { left: 0.0, lower: 0.0, width: 1.0, height: 1.0 };

struct Api {
    create_d3d11: unsafe extern "C" fn(Handle, *const c_char, GraphicsLibraryD3D11, *mut Handle, *mut Handle) -> ReturnCode,
    create_opengl: unsafe extern "C" fn(Handle, *const c_char, GraphicsLibraryOpenGL, *mut Handle, *mut Handle) -> ReturnCode,
    get_doing_okay: unsafe extern "C" fn(Handle) -> ReturnCode,
    open_display_d3d11: unsafe extern "C" fn(Handle, *mut OpenResultsD3D11) -> ReturnCode,
    open_display_opengl: unsafe extern "C" fn(Handle, *mut OpenResultsOpenGL) -> ReturnCode,
    destroy: unsafe extern "C" fn(Handle) -> ReturnCode,
    default_render_params: unsafe extern "C" fn(*mut RenderParams) -> ReturnCode,
    get_render_info_collection: unsafe extern "C" fn(Handle, RenderParams, *mut Handle) -> ReturnCode,
    num_render_info: unsafe extern "C" fn(Handle, *mut usize) -> ReturnCode,
    render_info_d3d11: unsafe extern "C" fn(Handle, usize, *mut RenderInfoD3D11) -> ReturnCode,
    render_info_opengl: unsafe extern "C" fn(Handle, usize, *mut RenderInfoOpenGL) -> ReturnCode,
    release_render_info_collection: unsafe extern "C" fn(Handle) -> ReturnCode,
    start_register: unsafe extern "C" fn(*mut Handle) -> ReturnCode,
    register_d3d11: unsafe extern "C" fn(Handle, RenderBufferD3D11) -> ReturnCode,
    register_opengl: unsafe extern "C" fn(Handle, RenderBufferOpenGL) -> ReturnCode,
    finish_register: unsafe extern "C" fn(Handle, Handle, u8) -> ReturnCode,
    start_present: unsafe extern "C" fn(*mut Handle) -> ReturnCode,
    present_d3d11: unsafe extern "C" fn(Handle, RenderBufferD3D11, RenderInfoD3D11, Viewport) -> ReturnCode,
    present_opengl: unsafe extern "C" fn(Handle, RenderBufferOpenGL, RenderInfoOpenGL, Viewport) -> ReturnCode,
    finish_present: unsafe extern "C" fn(Handle, Handle, RenderParams, u8) -> ReturnCode,
    client_update: unsafe extern "C" fn(Handle) -> ReturnCode,
    _render_manager: Library,
    _client_kit: Library,
}

fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T, String> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    unsafe { library.get::<T>(&bytes) }
        .map(|s| *s)
        .map_err(|e| format!("{name}: {e}"))
}

impl Api {
    fn load() -> Result<Self, String> {
        let rm_name = libloading::library_filename("osvrRenderManager");
        let ck_name = libloading::library_filename("osvrClientKit");
        let rm = unsafe { Library::new(&rm_name) }.map_err(|e| format!("{}: {e}", rm_name.to_string_lossy()))?;
        let ck = unsafe { Library::new(&ck_name) }.map_err(|e| format!("{}: {e}", ck_name.to_string_lossy()))?;
        Ok(Self {
            create_d3d11: symbol(&rm, "osvrCreateRenderManagerD3D11")?,
            create_opengl: symbol(&rm, "osvrCreateRenderManagerOpenGL")?,
            get_doing_okay: symbol(&rm, "osvrRenderManagerGetDoingOkay")?,
            open_display_d3d11: symbol(&rm, "osvrRenderManagerOpenDisplayD3D11")?,
            open_display_opengl: symbol(&rm, "osvrRenderManagerOpenDisplayOpenGL")?,
            destroy: symbol(&rm, "osvrDestroyRenderManager")?,
            default_render_params: symbol(&rm, "osvrRenderManagerGetDefaultRenderParams")?,
            get_render_info_collection: symbol(&rm, "osvrRenderManagerGetRenderInfoCollection")?,
            num_render_info: symbol(&rm, "osvrRenderManagerGetNumRenderInfoInCollection")?,
            render_info_d3d11: symbol(&rm, "osvrRenderManagerGetRenderInfoFromCollectionD3D11")?,
            render_info_opengl: symbol(&rm, "osvrRenderManagerGetRenderInfoFromCollectionOpenGL")?,
            release_render_info_collection: symbol(&rm, "osvrRenderManagerReleaseRenderInfoCollection")?,
            start_register: symbol(&rm, "osvrRenderManagerStartRegisterRenderBuffers")?,
            register_d3d11: symbol(&rm, "osvrRenderManagerRegisterRenderBufferD3D11")?,
            register_opengl: symbol(&rm, "osvrRenderManagerRegisterRenderBufferOpenGL")?,
            finish_register: symbol(&rm, "osvrRenderManagerFinishRegisterRenderBuffers")?,
            start_present: symbol(&rm, "osvrRenderManagerStartPresentRenderBuffers")?,
            present_d3d11: symbol(&rm, "osvrRenderManagerPresentRenderBufferD3D11")?,
            present_opengl: symbol(&rm, "osvrRenderManagerPresentRenderBufferOpenGL")?,
            finish_present: symbol(&rm, "osvrRenderManagerFinishPresentRenderBuffers")?,
            client_update: symbol(&ck, "osvrClientUpdate")?,
            _render_manager: rm,
            _client_kit: ck,
        })
    }
}

/// Factory over the system RenderManager. Loading is deferred to the first creation so the
/// plugin still loads on machines without OSVR installed.
#[derive(Default)]
pub struct OsvrFactory {
    api: parking_lot::Mutex<Option<Arc<Api>>>,
}

impl OsvrFactory {
    fn api(&self) -> BridgeResult<Arc<Api>> {
        let mut api = self.api.lock();
        if let Some(api) = api.as_ref() {
            return Ok(api.clone());
        }
        let loaded = Arc::new(Api::load().map_err(BridgeError::CreationFailed)?);
        *api = Some(loaded.clone());
        Ok(loaded)
    }
}

impl RenderManagerFactory for OsvrFactory {
    fn create(&self, client: ClientContext, binding: &DeviceBinding) -> BridgeResult<Box<dyn RenderManager>> {
        let api = self.api()?;
        let name = CString::new(binding.kind().graphics_library_name().unwrap_or_default()).unwrap_or_default();
        let ctx = client.handle().as_ptr();
        let mut rm: Handle = std::ptr::null_mut();
        let mut rm_api: Handle = std::ptr::null_mut();
        let (code, library) = match *binding {
            DeviceBinding::Direct3D11 { device, context } => {
                let library = GraphicsLibraryD3D11 { device: device.as_ptr(), context: context.as_ptr() };
                let code = unsafe { (api.create_d3d11)(ctx, name.as_ptr(), library, &mut rm, &mut rm_api) };
                (code, Some(library))
            }
            DeviceBinding::OpenGl => {
                let library = GraphicsLibraryOpenGL { toolkit: std::ptr::null() };
                let code = unsafe { (api.create_opengl)(ctx, name.as_ptr(), library, &mut rm, &mut rm_api) };
                (code, None)
            }
        };
        if code != OSVR_RETURN_SUCCESS || rm.is_null() {
            return Err(BridgeError::CreationFailed(format!("osvrCreateRenderManager returned {code}")));
        }
        Ok(Box::new(OsvrRenderManager { api, client: ctx, rm, rm_api, d3d11: library }))
    }
}

struct OsvrRenderManager {
    api: Arc<Api>,
    client: Handle,
    rm: Handle,
    rm_api: Handle,
    /// Present on the explicit backend only.
    d3d11: Option<GraphicsLibraryD3D11>,
}

// The manager is only used under the bridge's state lock.
unsafe impl Send for OsvrRenderManager {}

impl OsvrRenderManager {
    fn params(&self) -> RenderParams {
        let mut params = RenderParams {
            world_from_room_append: std::ptr::null(),
            room_from_head_replace: std::ptr::null(),
            near_clip_distance_meters: 0.1,
            far_clip_distance_meters: 100.0,
        };
        unsafe { (self.api.default_render_params)(&mut params) };
        params
    }

    fn info_at(&self, collection: Handle, index: usize) -> Option<RenderInfo> {
        let (code, info) = match self.d3d11 {
            Some(library) => {
                let mut out = RenderInfoD3D11 {
                    library,
                    viewport: Viewport::default(),
                    pose: Pose::default(),
                    projection: ProjectionMatrix::default(),
                };
                let code = unsafe { (self.api.render_info_d3d11)(collection, index, &mut out) };
                (code, RenderInfo { viewport: out.viewport, projection: out.projection, pose: out.pose })
            }
            None => {
                let mut out = RenderInfoOpenGL {
                    library: GraphicsLibraryOpenGL { toolkit: std::ptr::null() },
                    viewport: Viewport::default(),
                    pose: Pose::default(),
                    projection: ProjectionMatrix::default(),
                };
                let code = unsafe { (self.api.render_info_opengl)(collection, index, &mut out) };
                (code, RenderInfo { viewport: out.viewport, projection: out.projection, pose: out.pose })
            }
        };
        (code == OSVR_RETURN_SUCCESS).then_some(info)
    }
}

impl RenderManager for OsvrRenderManager {
    fn doing_okay(&self) -> bool {
        unsafe { (self.api.get_doing_okay)(self.rm) == OSVR_RETURN_SUCCESS }
    }

    fn open_display(&mut self) -> OpenStatus {
        let status = match self.d3d11 {
            Some(library) => {
                let mut results = OpenResultsD3D11 {
                    status: OSVR_OPEN_STATUS_FAILURE,
                    library,
                    buffers: RenderBufferD3D11 {
                        color_buffer: std::ptr::null_mut(),
                        color_buffer_view: std::ptr::null_mut(),
                        depth_stencil_buffer: std::ptr::null_mut(),
                        depth_stencil_view: std::ptr::null_mut(),
                    },
                };
                unsafe { (self.api.open_display_d3d11)(self.rm_api, &mut results) };
                results.status
            }
            None => {
                let mut results = OpenResultsOpenGL {
                    status: OSVR_OPEN_STATUS_FAILURE,
                    library: GraphicsLibraryOpenGL { toolkit: std::ptr::null() },
                    buffers: RenderBufferOpenGL { color_buffer_name: 0, depth_stencil_buffer_name: 0 },
                };
                unsafe { (self.api.open_display_opengl)(self.rm_api, &mut results) };
                results.status
            }
        };
        match status {
            OSVR_OPEN_STATUS_FAILURE => OpenStatus::Failure,
            OSVR_OPEN_STATUS_PARTIAL => OpenStatus::Partial,
            _ => OpenStatus::Complete,
        }
    }

    fn render_info(&mut self) -> Vec<RenderInfo> {
        let mut collection: Handle = std::ptr::null_mut();
        if unsafe { (self.api.get_render_info_collection)(self.rm, self.params(), &mut collection) } != OSVR_RETURN_SUCCESS {
            log::warn!("osvrRenderManagerGetRenderInfoCollection failed");
            return Vec::new();
        }
        let mut count = 0usize;
        unsafe { (self.api.num_render_info)(collection, &mut count) };
        let infos = (0..count).filter_map(|i| self.info_at(collection, i)).collect();
        unsafe { (self.api.release_render_info_collection)(collection) };
        infos
    }

    fn update_client(&mut self) {
        unsafe { (self.api.client_update)(self.client) };
    }

    fn register_buffers(&mut self, buffers: &[RenderBuffer]) -> bool {
        let mut state: Handle = std::ptr::null_mut();
        if unsafe { (self.api.start_register)(&mut state) } != OSVR_RETURN_SUCCESS {
            return false;
        }
        for buffer in buffers {
            let code = match *buffer {
                RenderBuffer::Direct3D11 { color, view } => unsafe {
                    (self.api.register_d3d11)(state, d3d11_buffer(color.as_ptr(), view.as_ptr()))
                },
                RenderBuffer::OpenGl { color, depth } => unsafe {
                    (self.api.register_opengl)(
                        state,
                        RenderBufferOpenGL { color_buffer_name: color, depth_stencil_buffer_name: depth },
                    )
                },
            };
            if code != OSVR_RETURN_SUCCESS {
                log::warn!("osvrRenderManagerRegisterRenderBuffer failed");
            }
        }
        // The app overwrites the buffers every frame.
        unsafe { (self.api.finish_register)(self.rm, state, 0) == OSVR_RETURN_SUCCESS }
    }

    fn present(&mut self, buffers: &[RenderBuffer], infos: &[RenderInfo], flip_y: bool) -> bool {
        let mut state: Handle = std::ptr::null_mut();
        if unsafe { (self.api.start_present)(&mut state) } != OSVR_RETURN_SUCCESS {
            return false;
        }
        for (buffer, info) in buffers.iter().zip(infos) {
            match (*buffer, self.d3d11) {
                (RenderBuffer::Direct3D11 { color, view }, Some(library)) => {
                    let native = RenderInfoD3D11 {
                        library,
                        viewport: info.viewport,
                        pose: info.pose,
                        projection: info.projection,
                    };
                    unsafe {
                        (self.api.present_d3d11)(state, d3d11_buffer(color.as_ptr(), view.as_ptr()), native, FULL_VIEWPORT)
                    };
                }
                (RenderBuffer::OpenGl { color, depth }, None) => {
                    let native = RenderInfoOpenGL {
                        library: GraphicsLibraryOpenGL { toolkit: std::ptr::null() },
                        viewport: info.viewport,
                        pose: info.pose,
                        projection: info.projection,
                    };
                    let buffer = RenderBufferOpenGL { color_buffer_name: color, depth_stencil_buffer_name: depth };
                    unsafe { (self.api.present_opengl)(state, buffer, native, FULL_VIEWPORT) };
                }
                _ => log::warn!("Render buffer does not match the RenderManager's graphics library"),
            }
        }
        unsafe { (self.api.finish_present)(self.rm, state, self.params(), u8::from(flip_y)) == OSVR_RETURN_SUCCESS }
    }
}

fn d3d11_buffer(color: Handle, view: Handle) -> RenderBufferD3D11 {
    RenderBufferD3D11 {
        color_buffer: color,
        color_buffer_view: view,
        depth_stencil_buffer: std::ptr::null_mut(),
        depth_stencil_view: std::ptr::null_mut(),
    }
}

impl Drop for OsvrRenderManager {
    fn drop(&mut self) {
        unsafe { (self.api.destroy)(self.rm) };
    }
}
