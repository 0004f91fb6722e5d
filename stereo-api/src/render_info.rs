//! Per-eye data reported by the render-manager each frame.
//! Layouts of Viewport, ProjectionMatrix and Pose match the OSVR C structs so they can be
//! returned across the host boundary unchanged.

/// Number of eyes the bridge renders.
pub const EYE_COUNT: usize = 2;

/// Eye index: 0 = left, 1 = right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const ALL: [Eye; EYE_COUNT] = [Eye::Left, Eye::Right];

    /// Map a host-supplied index. Anything other than 0 or 1 is rejected.
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Eye::Left),
            1 => Some(Eye::Right),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Viewport rectangle in pixels (OSVR_ViewportDescription).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub left: f64,
    pub lower: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Integer size used for render target allocation. Negative or NaN extents clamp to 0.
    pub fn size_px(&self) -> (u32, u32) {
        let clamp = |v: f64| if v.is_finite() && v > 0.0 { v as u32 } else { 0 };
        (clamp(self.width), clamp(self.height))
    }
}

/// Frustum bounds at the near plane plus clip distances (OSVR_ProjectionMatrix).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProjectionMatrix {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub near_clip: f64,
    pub far_clip: f64,
}

/// Unit quaternion, w first (OSVR_Quaternion).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 }
    }
}

/// Eye pose in world space (OSVR_Pose3).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    pub translation: [f64; 3],
    pub rotation: Quaternion,
}

/// Snapshot for one eye: viewport, projection and pose.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderInfo {
    pub viewport: Viewport,
    pub projection: ProjectionMatrix,
    pub pose: Pose,
}
