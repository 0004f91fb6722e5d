//! Tagged wrappers for raw handles crossing the host boundary.

use std::ffi::c_void;

use crate::render_info::{Eye, EYE_COUNT};

/// Opaque native object handle: a COM pointer, a GL object name, or a wrapper-assigned id.
/// Ownership is decided by whoever created it; the handle itself never releases anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    pub fn raw(self) -> usize {
        self.0
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Texture the host rendered one eye into. Weak reference: host-owned, never freed by the bridge.
/// On Direct3D 11 this is an `ID3D11Resource*`; on OpenGL the texture name is carried in the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostTexture(NativeHandle);

impl HostTexture {
    /// Returns None for a null pointer so an unset host texture is never copied from.
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        let handle = NativeHandle::from_ptr(ptr);
        (!handle.is_null()).then_some(Self(handle))
    }

    pub fn from_raw(raw: usize) -> Option<Self> {
        (raw != 0).then_some(Self(NativeHandle::from_raw(raw)))
    }

    pub fn handle(self) -> NativeHandle {
        self.0
    }

    /// OpenGL texture name carried in the pointer value.
    pub fn gl_name(self) -> u32 {
        self.0.raw() as u32
    }
}

/// Latest host texture per eye.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostTextures {
    slots: [Option<HostTexture>; EYE_COUNT],
}

impl HostTextures {
    pub fn set(&mut self, eye: Eye, texture: Option<HostTexture>) {
        self.slots[eye.index()] = texture;
    }

    pub fn get(&self, eye: Eye) -> Option<HostTexture> {
        self.slots[eye.index()]
    }

    pub fn clear(&mut self) {
        self.slots = [None; EYE_COUNT];
    }

    /// Eyes that currently have a host texture, in index order.
    pub fn registered_eyes(&self) -> impl Iterator<Item = Eye> + '_ {
        Eye::ALL.into_iter().filter(|eye| self.slots[eye.index()].is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_host_texture_is_rejected() {
        assert!(HostTexture::from_ptr(std::ptr::null_mut()).is_none());
        assert_eq!(HostTexture::from_raw(7).map(HostTexture::gl_name), Some(7));
    }

    #[test]
    fn host_textures_track_per_eye() {
        let mut textures = HostTextures::default();
        textures.set(Eye::Right, HostTexture::from_raw(0x20));
        assert_eq!(textures.get(Eye::Left), None);
        assert_eq!(textures.registered_eyes().collect::<Vec<_>>(), vec![Eye::Right]);
        textures.clear();
        assert_eq!(textures.registered_eyes().count(), 0);
    }
}
