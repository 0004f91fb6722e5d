//! Unity native plugin interface tables (IUnityInterface.h / IUnityGraphics.h / IUnityGraphicsD3D11.h).

use std::ffi::c_void;

pub type DeviceEventCallback = extern "system" fn(event_type: i32);
pub type RenderingEvent = extern "system" fn(event_id: i32);

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnityInterfaceGuid {
    pub high: u64,
    pub low: u64,
}

pub const UNITY_GRAPHICS_GUID: UnityInterfaceGuid =
    UnityInterfaceGuid { high: 0x7CBA0A9CA4DDB544, low: 0x8C5AD4926EB17B11 };
pub const UNITY_GRAPHICS_D3D11_GUID: UnityInterfaceGuid =
    UnityInterfaceGuid { high: 0xAAB37EF87A87D748, low: 0xBF76967F07EFB177 };

#[repr(C)]
pub struct IUnityInterfaces {
    pub get_interface: unsafe extern "system" fn(guid: UnityInterfaceGuid) -> *mut c_void,
    pub register_interface: unsafe extern "system" fn(guid: UnityInterfaceGuid, ptr: *mut c_void),
    pub get_interface_split: unsafe extern "system" fn(high: u64, low: u64) -> *mut c_void,
    pub register_interface_split: unsafe extern "system" fn(high: u64, low: u64, ptr: *mut c_void),
}

impl IUnityInterfaces {
    /// # Safety
    /// `T` must be the interface table registered under `guid`.
    pub unsafe fn get<T>(&self, guid: UnityInterfaceGuid) -> *mut T {
        (self.get_interface_split)(guid.high, guid.low).cast()
    }
}

#[repr(C)]
pub struct IUnityGraphics {
    pub get_renderer: unsafe extern "system" fn() -> i32,
    pub register_device_event_callback: unsafe extern "system" fn(callback: Option<DeviceEventCallback>),
    pub unregister_device_event_callback: unsafe extern "system" fn(callback: Option<DeviceEventCallback>),
    pub reserve_event_id_range: unsafe extern "system" fn(count: i32) -> i32,
}

/// Leading entry of IUnityGraphicsD3D11; the rest of the table is never read.
#[repr(C)]
pub struct IUnityGraphicsD3D11 {
    pub get_device: unsafe extern "system" fn() -> *mut c_void,
}
