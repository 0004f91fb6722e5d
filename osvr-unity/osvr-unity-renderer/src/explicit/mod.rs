//! Explicit-API backend (Direct3D 11 shaped): eye targets are 2-D RGBA8 textures with a
//! render-target view; each frame the host texture is resource-copied into them.

#[cfg(windows)]
mod d3d11;
mod wgpu_device;

#[cfg(windows)]
pub use d3d11::D3d11Device;
pub use wgpu_device::{WgpuExplicitDevice, WgpuHostTextures};

use std::fmt::Debug;

use stereo_api::{
    BackendKind, BridgeError, BridgeResult, DeviceBinding, Eye, HostTextures, NativeHandle, RenderBuffer,
    RenderInfo, SceneDraw, StereoBackend,
};

use crate::config::{BridgeConfig, ColorFormat};
use crate::resources::EyeSlots;

bitflags::bitflags! {
    /// How an eye target may be bound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TargetUsage: u32 {
        const RENDER_TARGET = 1 << 0;
        const SHADER_RESOURCE = 1 << 1;
    }
}

#[derive(Debug, Clone)]
pub struct ColorTargetDescriptor {
    pub label: Option<&'static str>,
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    pub usage: TargetUsage,
}

/// Host-owned explicit-API device. Handles returned by `create_*` are owned by the caller and
/// must be given back through the matching `release_*`.
pub trait ExplicitDevice: Send + Debug {
    /// Device handle handed to the render-manager.
    fn device_handle(&self) -> NativeHandle;
    /// Immediate execution context handle handed to the render-manager.
    fn context_handle(&self) -> NativeHandle;
    fn create_color_target(&mut self, desc: &ColorTargetDescriptor) -> Result<NativeHandle, String>;
    fn create_render_target_view(&mut self, texture: NativeHandle, format: ColorFormat) -> Result<NativeHandle, String>;
    /// Bind `view` as the single output target.
    fn set_render_target(&mut self, view: NativeHandle);
    /// Whole-resource copy; sizes and formats must already match.
    fn copy_resource(&mut self, dst: NativeHandle, src: stereo_api::HostTexture) -> Result<(), String>;
    fn release_texture(&mut self, texture: NativeHandle);
    fn release_view(&mut self, view: NativeHandle);
}

#[derive(Debug, Clone, Copy)]
struct ExplicitEyeBuffer {
    color: NativeHandle,
    view: NativeHandle,
    size: (u32, u32),
}

/// Explicit backend: owns the eye targets created on the host's device.
pub struct ExplicitBackend {
    device: Box<dyn ExplicitDevice>,
    config: BridgeConfig,
    buffers: EyeSlots<ExplicitEyeBuffer>,
}

impl ExplicitBackend {
    pub fn new(device: Box<dyn ExplicitDevice>, config: BridgeConfig) -> Self {
        Self { device, config, buffers: EyeSlots::default() }
    }

    fn release(&mut self, buffer: ExplicitEyeBuffer) {
        self.device.release_view(buffer.view);
        self.device.release_texture(buffer.color);
    }
}

impl StereoBackend for ExplicitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct3D11
    }

    fn bind_device(&mut self) -> BridgeResult<DeviceBinding> {
        let device = self.device.device_handle();
        if device.is_null() {
            return Err(BridgeError::NoDevice("host returned a null device".to_string()));
        }
        log::info!("Passed host device/context to RenderManager library.");
        Ok(DeviceBinding::Direct3D11 { device, context: self.device.context_handle() })
    }

    fn ensure_eye_buffer(&mut self, eye: Eye, info: &RenderInfo) -> BridgeResult<()> {
        log::debug!("ConstructBuffersD3D11 for {eye:?}");
        let (width, height) = info.viewport.size_px();
        if width == 0 || height == 0 {
            return Err(BridgeError::TextureCreationFailed(format!("viewport is {width}x{height}")));
        }
        if let Some(existing) = self.buffers.get(eye) {
            if existing.size == (width, height) {
                return Ok(());
            }
        }
        if let Some(stale) = self.buffers.take(eye) {
            self.release(stale);
        }
        let desc = ColorTargetDescriptor {
            label: Some(match eye {
                Eye::Left => "osvr_eye_left",
                Eye::Right => "osvr_eye_right",
            }),
            width,
            height,
            format: self.config.color_format,
            usage: TargetUsage::RENDER_TARGET | TargetUsage::SHADER_RESOURCE,
        };
        let color = self
            .device
            .create_color_target(&desc)
            .map_err(BridgeError::TextureCreationFailed)?;
        let view = match self.device.create_render_target_view(color, self.config.color_format) {
            Ok(view) => view,
            Err(e) => {
                self.device.release_texture(color);
                return Err(BridgeError::ViewCreationFailed(e));
            }
        };
        self.buffers.replace(eye, ExplicitEyeBuffer { color, view, size: (width, height) });
        Ok(())
    }

    fn has_eye_buffer(&self, eye: Eye) -> bool {
        self.buffers.contains(eye)
    }

    fn render_buffers(&self, count: usize) -> Option<Vec<RenderBuffer>> {
        self.buffers.ordered(count).map(|buffers| {
            buffers
                .into_iter()
                .map(|b| RenderBuffer::Direct3D11 { color: b.color, view: b.view })
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
        let mut presented = Vec::with_capacity(infos.len());
        for (eye, info) in Eye::ALL.into_iter().zip(infos) {
            let (Some(buffer), Some(source)) = (self.buffers.get(eye).copied(), sources.get(eye)) else {
                continue;
            };
            self.device.set_render_target(buffer.view);
            self.device.copy_resource(buffer.color, source).map_err(BridgeError::Native)?;
            scene.draw_eye(eye, info);
            presented.push(RenderBuffer::Direct3D11 { color: buffer.color, view: buffer.view });
        }
        Ok(presented)
    }

    fn flip_y(&self) -> bool {
        self.config.flip_y_explicit
    }

    fn teardown(&mut self) {
        let drained: Vec<_> = self.buffers.drain().collect();
        for (eye, buffer) in drained {
            log::debug!("Releasing D3D11 eye buffer for {eye:?}");
            self.release(buffer);
        }
    }
}

impl Drop for ExplicitBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{sample_render_info, MockExplicitDevice, RecordingSceneDraw};
    use stereo_api::HostTexture;

    fn backend() -> (ExplicitBackend, crate::mock::SharedLedger) {
        let device = MockExplicitDevice::new();
        let ledger = device.ledger();
        (ExplicitBackend::new(Box::new(device), BridgeConfig::default()), ledger)
    }

    #[test]
    fn eye_buffer_matches_viewport_and_format() {
        let (mut backend, ledger) = backend();
        let infos = sample_render_info();
        backend.ensure_eye_buffer(Eye::Left, &infos[0]).unwrap();
        let ledger = ledger.lock();
        assert_eq!(ledger.textures_created, 1);
        assert_eq!(ledger.views_created, 1);
        let desc = ledger.last_color_target.clone().unwrap();
        assert_eq!((desc.width, desc.height), infos[0].viewport.size_px());
        assert_eq!(desc.format, ColorFormat::Rgba8Unorm);
        assert!(desc.usage.contains(TargetUsage::RENDER_TARGET | TargetUsage::SHADER_RESOURCE));
    }

    #[test]
    fn failed_view_releases_texture_and_registers_nothing() {
        let device = MockExplicitDevice::new().failing_views();
        let ledger = device.ledger();
        let mut backend = ExplicitBackend::new(Box::new(device), BridgeConfig::default());
        let err = backend.ensure_eye_buffer(Eye::Left, &sample_render_info()[0]).unwrap_err();
        assert!(matches!(err, BridgeError::ViewCreationFailed(_)));
        assert!(!backend.has_eye_buffer(Eye::Left));
        let ledger = ledger.lock();
        assert_eq!(ledger.textures_created, ledger.textures_released);
    }

    #[test]
    fn failed_texture_reports_texture_error() {
        let device = MockExplicitDevice::new().failing_textures();
        let mut backend = ExplicitBackend::new(Box::new(device), BridgeConfig::default());
        let err = backend.ensure_eye_buffer(Eye::Right, &sample_render_info()[1]).unwrap_err();
        assert!(matches!(err, BridgeError::TextureCreationFailed(_)));
    }

    #[test]
    fn resized_viewport_reallocates_once() {
        let (mut backend, ledger) = backend();
        let mut info = sample_render_info()[0];
        backend.ensure_eye_buffer(Eye::Left, &info).unwrap();
        backend.ensure_eye_buffer(Eye::Left, &info).unwrap();
        info.viewport.width += 64.0;
        backend.ensure_eye_buffer(Eye::Left, &info).unwrap();
        let ledger = ledger.lock();
        assert_eq!(ledger.textures_created, 2);
        assert_eq!(ledger.textures_released, 1);
        assert_eq!(ledger.views_released, 1);
    }

    #[test]
    fn present_copies_each_eye_in_order() {
        let (mut backend, ledger) = backend();
        let infos = sample_render_info();
        let mut sources = HostTextures::default();
        for eye in Eye::ALL {
            backend.ensure_eye_buffer(eye, &infos[eye.index()]).unwrap();
            sources.set(eye, HostTexture::from_raw(0x1000 + eye.index()));
        }
        let mut scene = RecordingSceneDraw::default();
        let buffers = backend.present_frame(&infos, &sources, &mut scene).unwrap();
        assert_eq!(buffers.len(), 2);
        assert_eq!(scene.eyes, vec![Eye::Left, Eye::Right]);
        let ledger = ledger.lock();
        assert_eq!(ledger.copies.len(), 2);
        assert_eq!(ledger.copies[0].1, HostTexture::from_raw(0x1000).unwrap());
        assert_eq!(ledger.render_target_binds, 2);
    }

    #[test]
    fn present_without_right_buffer_is_not_ready() {
        let (mut backend, ledger) = backend();
        let infos = sample_render_info();
        backend.ensure_eye_buffer(Eye::Left, &infos[0]).unwrap();
        let mut sources = HostTextures::default();
        sources.set(Eye::Left, HostTexture::from_raw(1));
        let err = backend.present_frame(&infos, &sources, &mut RecordingSceneDraw::default()).unwrap_err();
        assert_eq!(err, BridgeError::MissingEyeBuffer(Eye::Right));
        assert!(ledger.lock().copies.is_empty());
    }

    #[test]
    fn teardown_twice_releases_once() {
        let (mut backend, ledger) = backend();
        let infos = sample_render_info();
        for eye in Eye::ALL {
            backend.ensure_eye_buffer(eye, &infos[eye.index()]).unwrap();
        }
        backend.teardown();
        backend.teardown();
        let ledger = ledger.lock();
        assert_eq!(ledger.textures_released, 2);
        assert_eq!(ledger.views_released, 2);
        assert_eq!(ledger.double_releases, 0);
    }
}
