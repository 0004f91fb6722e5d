//! wgpu implementation of ExplicitDevice. Used when the host renders with wgpu instead of handing
//! over a raw D3D11 device (e.g. the debug plugin loop). Host textures are looked up through a
//! shared registry because wgpu has no raw texture pointers to pass across the boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use stereo_api::{HostTexture, NativeHandle};

use super::{ColorTargetDescriptor, ExplicitDevice, TargetUsage};
use crate::config::ColorFormat;

static NEXT_DEVICE_ID: AtomicUsize = AtomicUsize::new(1);

fn to_wgpu_format(format: ColorFormat) -> wgpu::TextureFormat {
    match format {
        ColorFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn to_wgpu_usage(usage: TargetUsage) -> wgpu::TextureUsages {
    // Eye targets are always copy destinations for the per-frame host copy.
    let mut out = wgpu::TextureUsages::COPY_DST;
    if usage.contains(TargetUsage::RENDER_TARGET) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TargetUsage::SHADER_RESOURCE) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    out
}

/// Host-side registry mapping HostTexture ids to wgpu textures. Clone it before handing the
/// device to the bridge; the host keeps registering and owning its textures through it.
#[derive(Clone, Default)]
pub struct WgpuHostTextures {
    textures: Arc<Mutex<HashMap<usize, wgpu::Texture>>>,
    next_id: Arc<AtomicUsize>,
}

impl WgpuHostTextures {
    pub fn register(&self, texture: wgpu::Texture) -> HostTexture {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.textures.lock().insert(id, texture);
        HostTexture::from_raw(id).unwrap_or_else(|| unreachable!("registry ids start at 1"))
    }

    pub fn remove(&self, texture: HostTexture) -> Option<wgpu::Texture> {
        self.textures.lock().remove(&texture.handle().raw())
    }
}

/// Explicit device backed by a wgpu device/queue pair.
pub struct WgpuExplicitDevice {
    id: usize,
    device: wgpu::Device,
    queue: wgpu::Queue,
    host_textures: WgpuHostTextures,
    textures: HashMap<NativeHandle, wgpu::Texture>,
    views: HashMap<NativeHandle, wgpu::TextureView>,
    next_handle: usize,
    current_target: Option<NativeHandle>,
}

impl std::fmt::Debug for WgpuExplicitDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuExplicitDevice")
            .field("id", &self.id)
            .field("textures", &self.textures.len())
            .field("views", &self.views.len())
            .finish()
    }
}

impl WgpuExplicitDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, host_textures: WgpuHostTextures) -> Self {
        Self {
            id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
            device,
            queue,
            host_textures,
            textures: HashMap::new(),
            views: HashMap::new(),
            next_handle: 0,
            current_target: None,
        }
    }

    /// Eye target created by this device, e.g. for the host to read back a presented frame.
    pub fn texture(&self, handle: NativeHandle) -> Option<&wgpu::Texture> {
        self.textures.get(&handle)
    }

    pub fn current_target(&self) -> Option<NativeHandle> {
        self.current_target
    }

    fn next_handle(&mut self) -> NativeHandle {
        self.next_handle += 1;
        NativeHandle::from_raw(self.next_handle)
    }

    fn validation_scope<T>(&self, f: impl FnOnce() -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(e.to_string()),
            None => Ok(value),
        }
    }
}

impl ExplicitDevice for WgpuExplicitDevice {
    /// wgpu exposes no raw device pointer; the handle only identifies this wrapper.
    fn device_handle(&self) -> NativeHandle {
        NativeHandle::from_raw(self.id)
    }

    fn context_handle(&self) -> NativeHandle {
        NativeHandle::from_raw(self.id)
    }

    fn create_color_target(&mut self, desc: &ColorTargetDescriptor) -> Result<NativeHandle, String> {
        let texture = self.validation_scope(|| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: desc.label,
                size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: to_wgpu_format(desc.format),
                usage: to_wgpu_usage(desc.usage),
                view_formats: &[],
            })
        })?;
        let handle = self.next_handle();
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn create_render_target_view(&mut self, texture: NativeHandle, format: ColorFormat) -> Result<NativeHandle, String> {
        let tex = self.textures.get(&texture).ok_or("create_render_target_view: unknown texture")?;
        let view = self.validation_scope(|| {
            tex.create_view(&wgpu::TextureViewDescriptor {
                label: Some("osvr_eye_rtv"),
                format: Some(to_wgpu_format(format)),
                dimension: Some(wgpu::TextureViewDimension::D2),
                ..Default::default()
            })
        })?;
        let handle = self.next_handle();
        self.views.insert(handle, view);
        Ok(handle)
    }

    fn set_render_target(&mut self, view: NativeHandle) {
        // wgpu binds targets per render pass; remember the target for the scene draw.
        self.current_target = self.views.contains_key(&view).then_some(view);
    }

    fn copy_resource(&mut self, dst: NativeHandle, src: HostTexture) -> Result<(), String> {
        let dst_tex = self.textures.get(&dst).ok_or("copy_resource: unknown destination")?;
        let sources = self.host_textures.textures.lock();
        let src_tex = sources
            .get(&src.handle().raw())
            .ok_or("copy_resource: host texture is not registered")?;
        if src_tex.size() != dst_tex.size() {
            return Err(format!("copy_resource: size mismatch {:?} vs {:?}", src_tex.size(), dst_tex.size()));
        }
        if !src_tex.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            return Err("copy_resource: host texture lacks COPY_SRC".to_string());
        }
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("osvr_eye_copy"),
        });
        encoder.copy_texture_to_texture(src_tex.as_image_copy(), dst_tex.as_image_copy(), dst_tex.size());
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn release_texture(&mut self, texture: NativeHandle) {
        if let Some(tex) = self.textures.remove(&texture) {
            tex.destroy();
        }
    }

    fn release_view(&mut self, view: NativeHandle) {
        if self.current_target == Some(view) {
            self.current_target = None;
        }
        self.views.remove(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    fn request_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::default();
            let adapter = instance.request_adapter(&wgpu::RequestAdapterOptions::default()).await?;
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None).await.ok()
        })
    }

    #[test]
    fn eye_targets_are_rgba8_unorm() {
        assert_eq!(to_wgpu_format(BridgeConfig::default().color_format), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(to_wgpu_format(BridgeConfig::from_vars(|_| None).color_format), wgpu::TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn copies_host_texture_when_an_adapter_exists() {
        let Some((device, queue)) = request_device() else {
            eprintln!("no wgpu adapter; skipping");
            return;
        };
        let host = WgpuHostTextures::default();
        let source = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("host_eye"),
            size: wgpu::Extent3d { width: 64, height: 32, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let source = host.register(source);
        let mut explicit = WgpuExplicitDevice::new(device, queue, host.clone());
        let color = explicit
            .create_color_target(&ColorTargetDescriptor {
                label: None,
                width: 64,
                height: 32,
                format: ColorFormat::Rgba8Unorm,
                usage: TargetUsage::RENDER_TARGET | TargetUsage::SHADER_RESOURCE,
            })
            .unwrap();
        let view = explicit.create_render_target_view(color, ColorFormat::Rgba8Unorm).unwrap();
        explicit.set_render_target(view);
        assert_eq!(explicit.current_target(), Some(view));
        explicit.copy_resource(color, source).unwrap();
        explicit.release_view(view);
        explicit.release_texture(color);
        assert!(explicit.texture(color).is_none());
        assert!(host.remove(source).is_some());
    }
}
