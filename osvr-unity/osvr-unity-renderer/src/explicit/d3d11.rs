//! Direct3D 11 implementation of ExplicitDevice over the host's ID3D11Device.

use std::collections::HashMap;
use std::ffi::c_void;

use stereo_api::{HostTexture, NativeHandle};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use super::{ColorTargetDescriptor, ExplicitDevice, TargetUsage};
use crate::config::ColorFormat;

fn to_dxgi(format: ColorFormat) -> DXGI_FORMAT {
    match format {
        ColorFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
    }
}

fn bind_flags(usage: TargetUsage) -> u32 {
    let mut flags = 0u32;
    if usage.contains(TargetUsage::RENDER_TARGET) {
        flags |= D3D11_BIND_RENDER_TARGET.0 as u32;
    }
    if usage.contains(TargetUsage::SHADER_RESOURCE) {
        flags |= D3D11_BIND_SHADER_RESOURCE.0 as u32;
    }
    flags
}

/// Host device plus its immediate context. Eye textures and views created here are held
/// (and kept alive) until released.
#[derive(Debug)]
pub struct D3d11Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    textures: HashMap<NativeHandle, ID3D11Texture2D>,
    views: HashMap<NativeHandle, ID3D11RenderTargetView>,
}

// COM pointers are only touched from the host render thread; the bridge serializes access.
unsafe impl Send for D3d11Device {}

impl D3d11Device {
    pub fn new(device: ID3D11Device) -> Result<Self, String> {
        let context = unsafe { device.GetImmediateContext() }.map_err(|e| format!("GetImmediateContext: {e}"))?;
        Ok(Self { device, context, textures: HashMap::new(), views: HashMap::new() })
    }

    /// Wrap the host's `ID3D11Device*` without taking over the host's reference.
    ///
    /// # Safety
    /// `raw` must be a live `ID3D11Device` pointer.
    pub unsafe fn from_raw_device(raw: *mut c_void) -> Result<Self, String> {
        let device = ID3D11Device::from_raw_borrowed(&raw).ok_or("host returned a null ID3D11Device")?;
        Self::new(device.clone())
    }
}

impl ExplicitDevice for D3d11Device {
    fn device_handle(&self) -> NativeHandle {
        NativeHandle::from_ptr(self.device.as_raw())
    }

    fn context_handle(&self) -> NativeHandle {
        NativeHandle::from_ptr(self.context.as_raw())
    }

    fn create_color_target(&mut self, desc: &ColorTargetDescriptor) -> Result<NativeHandle, String> {
        let texture_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.width,
            Height: desc.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: to_dxgi(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: bind_flags(desc.usage),
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };
        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { self.device.CreateTexture2D(&texture_desc, None, Some(&mut texture)) }
            .map_err(|e| format!("CreateTexture2D: {e}"))?;
        let texture = texture.ok_or("CreateTexture2D returned no texture")?;
        let handle = NativeHandle::from_ptr(texture.as_raw());
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn create_render_target_view(&mut self, texture: NativeHandle, format: ColorFormat) -> Result<NativeHandle, String> {
        let tex = self.textures.get(&texture).ok_or("create_render_target_view: unknown texture")?;
        let rtv_desc = D3D11_RENDER_TARGET_VIEW_DESC {
            Format: to_dxgi(format),
            ViewDimension: D3D11_RTV_DIMENSION_TEXTURE2D,
            Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 { Texture2D: D3D11_TEX2D_RTV { MipSlice: 0 } },
        };
        let mut rtv: Option<ID3D11RenderTargetView> = None;
        unsafe { self.device.CreateRenderTargetView(tex, Some(&rtv_desc), Some(&mut rtv)) }
            .map_err(|e| format!("CreateRenderTargetView: {e}"))?;
        let rtv = rtv.ok_or("CreateRenderTargetView returned no view")?;
        let handle = NativeHandle::from_ptr(rtv.as_raw());
        self.views.insert(handle, rtv);
        Ok(handle)
    }

    fn set_render_target(&mut self, view: NativeHandle) {
        if let Some(rtv) = self.views.get(&view) {
            unsafe { self.context.OMSetRenderTargets(Some(&[Some(rtv.clone())]), None) };
        }
    }

    fn copy_resource(&mut self, dst: NativeHandle, src: HostTexture) -> Result<(), String> {
        let dst = self.textures.get(&dst).ok_or("copy_resource: unknown destination")?;
        let raw = src.handle().as_ptr();
        let src = unsafe { ID3D11Resource::from_raw_borrowed(&raw) }.ok_or("copy_resource: null host texture")?;
        unsafe { self.context.CopyResource(dst, src) };
        Ok(())
    }

    fn release_texture(&mut self, texture: NativeHandle) {
        self.textures.remove(&texture);
    }

    fn release_view(&mut self, view: NativeHandle) {
        self.views.remove(&view);
    }
}
