//! Host loop: drive RendererState the way Unity does (device events, render-manager creation,
//! per-eye texture registration, render events) on a headless wgpu device with a scripted
//! render-manager standing in for OSVR.

use osvr_rendering_plugin::{HostGraphics, RendererState};
use osvr_unity_renderer::mock::{sample_render_info, ScriptedFactory};
use osvr_unity_renderer::{BridgeConfig, ColorFormat, NativeGraphics, WgpuExplicitDevice, WgpuHostTextures};
use stereo_api::{BackendKind, ClientContext, DeviceEvent, Eye, HostTexture, NativeHandle};

const FRAMES: usize = 3;

/// Hands its wgpu device to the bridge at Initialize.
struct HeadlessHost {
    device: Option<(wgpu::Device, wgpu::Queue)>,
    textures: WgpuHostTextures,
}

impl HostGraphics for HeadlessHost {
    fn renderer(&self) -> BackendKind {
        BackendKind::Direct3D11
    }

    fn native_graphics(&mut self, kind: BackendKind) -> Result<NativeGraphics, String> {
        if kind != BackendKind::Direct3D11 {
            return Err(format!("{kind:?} is not available headless"));
        }
        let (device, queue) = self.device.take().ok_or("device was already handed over")?;
        Ok(NativeGraphics::Explicit(Box::new(WgpuExplicitDevice::new(device, queue, self.textures.clone()))))
    }
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (device, queue) = pollster::block_on(request_device())?;
    let config = BridgeConfig::from_env();
    let textures = WgpuHostTextures::default();
    let eye_textures: Vec<HostTexture> = sample_render_info()
        .iter()
        .zip(Eye::ALL)
        .map(|(info, eye)| {
            let (width, height) = info.viewport.size_px();
            let texture = solid_eye_texture(&device, &queue, config.color_format, width, height, eye);
            textures.register(texture)
        })
        .collect();

    let factory = ScriptedFactory::new();
    let host = HeadlessHost { device: Some((device, queue)), textures };
    let mut state = RendererState::new(Box::new(host), Box::new(factory.clone()), config);

    state.on_device_event(DeviceEvent::Initialize);
    state
        .create_render_manager(ClientContext::new(NativeHandle::from_raw(1)))
        .map_err(|e| e.to_string())?;
    for (eye, texture) in Eye::ALL.into_iter().zip(&eye_textures) {
        state.set_color_buffer(Some(*texture), eye.index() as i32).map_err(|e| e.to_string())?;
    }
    for eye in Eye::ALL {
        let viewport = state.viewport(eye.index() as i32).map_err(|e| e.to_string())?;
        log::info!("{eye:?} viewport {viewport:?}");
    }

    for frame in 0..FRAMES {
        let accepted = state.render_frame().map_err(|e| e.to_string())?;
        log::info!("frame {frame}: presented, accepted = {accepted}");
    }
    // Render event 1 is the host-side shutdown.
    state.on_render_event(1);
    state.on_device_event(DeviceEvent::Shutdown);

    let log = factory.log();
    let log = log.lock();
    println!(
        "plugin_loop: {} presents, {} registrations, {} live render-managers",
        log.presents.len(),
        log.registrations.len(),
        log.live()
    );
    Ok(())
}

/// Host eye texture filled with one color per eye.
fn solid_eye_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    format: ColorFormat,
    width: u32,
    height: u32,
    eye: Eye,
) -> wgpu::Texture {
    let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("host_eye"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: match format {
            ColorFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        },
        usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let pixel: [u8; 4] = match eye {
        Eye::Left => [255, 0, 0, 255],
        Eye::Right => [0, 0, 255, 255],
    };
    let pixels = vec![pixel; (width * height) as usize];
    queue.write_texture(
        texture.as_image_copy(),
        bytemuck::cast_slice(&pixels),
        wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(4 * width), rows_per_image: Some(height) },
        size,
    );
    texture
}

async fn request_device() -> Result<(wgpu::Device, wgpu::Queue), String> {
    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await
        .ok_or("No adapter")?;
    adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .map_err(|e| e.to_string())
}
