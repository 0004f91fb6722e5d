//! Unity native plugin entry points. Exactly one RendererState lives between UnityPluginLoad and
//! UnityPluginUnload; every entry point locks it for the duration of the call.

#![allow(non_snake_case)]

use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};

use osvr_unity_renderer::BridgeConfig;
use parking_lot::Mutex;
use stereo_api::{BridgeResult, ClientContext, DeviceEvent, HostTexture, NativeHandle, Pose, ProjectionMatrix, Viewport};

use crate::host::UnityHost;
use crate::log_sink::{self, DebugLogFn};
use crate::osvr::OsvrFactory;
use crate::plugin::RendererState;
use crate::unity::{IUnityGraphics, IUnityInterfaces, RenderingEvent};

/// OSVR_ReturnCode
pub type ReturnCode = u8;
pub const OSVR_RETURN_SUCCESS: ReturnCode = 0;
pub const OSVR_RETURN_FAILURE: ReturnCode = 1;

static STATE: Mutex<Option<RendererState>> = parking_lot::const_mutex(None);
static GRAPHICS: AtomicPtr<IUnityGraphics> = AtomicPtr::new(std::ptr::null_mut());

fn with_state<R>(f: impl FnOnce(&mut RendererState) -> R) -> Option<R> {
    STATE.lock().as_mut().map(f)
}

fn status(result: Option<BridgeResult<()>>) -> ReturnCode {
    match result {
        Some(Ok(())) => OSVR_RETURN_SUCCESS,
        Some(Err(e)) => {
            log::error!("{e}");
            OSVR_RETURN_FAILURE
        }
        None => OSVR_RETURN_FAILURE,
    }
}

/// Failed reads hand back a zeroed value.
fn read_or_default<T: Default>(what: &str, result: Option<BridgeResult<T>>) -> T {
    match result {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            log::error!("{what}: {e}");
            T::default()
        }
        None => T::default(),
    }
}

extern "system" fn on_graphics_device_event(event_type: i32) {
    if let Some(event) = DeviceEvent::from_raw(event_type) {
        with_state(|state| state.on_device_event(event));
    }
}

extern "system" fn on_render_event(event_id: i32) {
    with_state(|state| state.on_render_event(event_id));
}

/// # Safety
/// `interfaces` must be the registry Unity passes to native plugins.
#[no_mangle]
pub unsafe extern "system" fn UnityPluginLoad(interfaces: *mut IUnityInterfaces) {
    let config = BridgeConfig::from_env();
    log_sink::install(config.log_level);
    let Some(host) = UnityHost::new(interfaces) else {
        log::error!("IUnityGraphics is not available");
        return;
    };
    let graphics = host.graphics();
    *STATE.lock() = Some(RendererState::new(Box::new(host), Box::new(OsvrFactory::default()), config));
    GRAPHICS.store(graphics, Ordering::Release);
    // The state lock is released here: Unity may call back synchronously.
    ((*graphics).register_device_event_callback)(Some(on_graphics_device_event));
    on_graphics_device_event(0);
}

#[no_mangle]
pub extern "system" fn UnityPluginUnload() {
    let graphics = GRAPHICS.swap(std::ptr::null_mut(), Ordering::AcqRel);
    if let Some(graphics) = unsafe { graphics.as_ref() } {
        unsafe { (graphics.unregister_device_event_callback)(Some(on_graphics_device_event)) };
    }
    on_graphics_device_event(1);
    let state = STATE.lock().take();
    drop(state);
}

#[no_mangle]
pub extern "system" fn CreateRenderManagerFromUnity(context: *mut c_void) -> ReturnCode {
    let client = ClientContext::new(NativeHandle::from_ptr(context));
    status(with_state(|state| state.create_render_manager(client)))
}

#[no_mangle]
pub extern "system" fn GetViewport(eye: i32) -> Viewport {
    read_or_default("GetViewport", with_state(|state| state.viewport(eye)))
}

#[no_mangle]
pub extern "system" fn GetProjectionMatrix(eye: i32) -> ProjectionMatrix {
    read_or_default("GetProjectionMatrix", with_state(|state| state.projection(eye)))
}

#[no_mangle]
pub extern "system" fn GetEyePose(eye: i32) -> Pose {
    read_or_default("GetEyePose", with_state(|state| state.pose(eye)))
}

/// `texture_ptr` is the host's native texture: an ID3D11Resource* or a GL texture name.
#[no_mangle]
pub extern "system" fn SetColorBufferFromUnity(texture_ptr: *mut c_void, eye: i32) -> i32 {
    let texture = HostTexture::from_ptr(texture_ptr);
    i32::from(status(with_state(|state| state.set_color_buffer(texture, eye))))
}

#[no_mangle]
pub extern "system" fn GetRenderEventFunc() -> RenderingEvent {
    on_render_event
}

#[no_mangle]
pub extern "system" fn LinkDebug(sink: Option<DebugLogFn>) {
    log_sink::link(sink);
}

#[cfg(test)]
mod tests {
    use super::*;

    // No RendererState is installed in unit tests; entry points must fail soft.
    #[test]
    fn entry_points_without_state_are_inert() {
        assert_eq!(CreateRenderManagerFromUnity(std::ptr::null_mut()), OSVR_RETURN_FAILURE);
        assert_eq!(SetColorBufferFromUnity(0x10 as *mut c_void, 0), i32::from(OSVR_RETURN_FAILURE));
        assert_eq!(GetViewport(0), Viewport::default());
        assert_eq!(GetEyePose(1), Pose::default());
        GetRenderEventFunc()(0);
        UnityPluginUnload();
    }

    #[test]
    fn null_interfaces_leave_plugin_unloaded() {
        unsafe { UnityPluginLoad(std::ptr::null_mut()) };
        assert!(STATE.lock().is_none());
    }
}
