//! Host graphics seam: which renderer the host runs and the native objects behind it.

use osvr_unity_renderer::NativeGraphics;
use stereo_api::BackendKind;

use crate::unity::{IUnityGraphics, IUnityInterfaces, UNITY_GRAPHICS_GUID};

/// The host engine as seen at device Initialize.
pub trait HostGraphics: Send {
    /// Renderer the host is currently running on.
    fn renderer(&self) -> BackendKind;

    /// Wrap the host's device (explicit) or current context (immediate) for `kind`.
    fn native_graphics(&mut self, kind: BackendKind) -> Result<NativeGraphics, String>;
}

/// Unity's interface registry, handed over in UnityPluginLoad.
pub struct UnityHost {
    #[cfg_attr(not(windows), allow(dead_code))]
    interfaces: *mut IUnityInterfaces,
    graphics: *mut IUnityGraphics,
}

// Unity keeps the interface tables alive and callable from any thread until UnityPluginUnload.
unsafe impl Send for UnityHost {}

impl UnityHost {
    /// # Safety
    /// `interfaces` must be the pointer Unity passed to UnityPluginLoad.
    pub unsafe fn new(interfaces: *mut IUnityInterfaces) -> Option<Self> {
        let registry = interfaces.as_ref()?;
        let graphics = registry.get::<IUnityGraphics>(UNITY_GRAPHICS_GUID);
        (!graphics.is_null()).then_some(Self { interfaces, graphics })
    }

    pub fn graphics(&self) -> *mut IUnityGraphics {
        self.graphics
    }

    #[cfg(windows)]
    fn d3d11_device(&self) -> Result<osvr_unity_renderer::D3d11Device, String> {
        use crate::unity::{IUnityGraphicsD3D11, UNITY_GRAPHICS_D3D11_GUID};

        let d3d11 = unsafe { (*self.interfaces).get::<IUnityGraphicsD3D11>(UNITY_GRAPHICS_D3D11_GUID) };
        let d3d11 = unsafe { d3d11.as_ref() }.ok_or("IUnityGraphicsD3D11 is not available")?;
        let device = unsafe { (d3d11.get_device)() };
        unsafe { osvr_unity_renderer::D3d11Device::from_raw_device(device) }
    }
}

impl HostGraphics for UnityHost {
    fn renderer(&self) -> BackendKind {
        let renderer = unsafe { ((*self.graphics).get_renderer)() };
        let kind = BackendKind::from_unity_renderer(renderer);
        if kind == BackendKind::None {
            log::info!("Unity renderer {renderer} is not supported.");
        }
        kind
    }

    fn native_graphics(&mut self, kind: BackendKind) -> Result<NativeGraphics, String> {
        match kind {
            #[cfg(windows)]
            BackendKind::Direct3D11 => Ok(NativeGraphics::Explicit(Box::new(self.d3d11_device()?))),
            #[cfg(not(windows))]
            BackendKind::Direct3D11 => Err("Direct3D 11 is only available on Windows".to_string()),
            BackendKind::OpenGl => Ok(NativeGraphics::Immediate(Box::new(osvr_unity_renderer::GlContext::load_system()?))),
            BackendKind::None => Err("Device type not supported.".to_string()),
        }
    }
}
