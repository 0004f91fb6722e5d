//! Present helpers: convert RenderInfo projection and pose into OpenGL fixed-function matrices.
//! Both matrices are column-major, index [col*4+row], ready for glMultMatrixd.

use stereo_api::{Pose, ProjectionMatrix};

pub const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

/// Frustum matrix as produced by glFrustum(left, right, bottom, top, near, far).
/// Degenerate bounds (zero width, height or depth) yield identity.
pub fn projection_to_gl(p: &ProjectionMatrix) -> [f64; 16] {
    let (l, r, t, b, n, f) = (p.left, p.right, p.top, p.bottom, p.near_clip, p.far_clip);
    if (r - l).abs() < 1e-12 || (t - b).abs() < 1e-12 || (f - n).abs() < 1e-12 {
        return IDENTITY;
    }
    let mut m = [0.0f64; 16];
    m[0] = 2.0 * n / (r - l);
    m[5] = 2.0 * n / (t - b);
    m[8] = (r + l) / (r - l);
    m[9] = (t + b) / (t - b);
    m[10] = -(f + n) / (f - n);
    m[11] = -1.0;
    m[14] = -(2.0 * f * n) / (f - n);
    m
}

/// Rotation matrix (row-major 3x3) of a unit quaternion.
fn rotation_rows(pose: &Pose) -> [[f64; 3]; 3] {
    let q = pose.rotation;
    let len = (q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z).sqrt();
    let (w, x, y, z) = if len > 1e-12 {
        (q.w / len, q.x / len, q.y / len, q.z / len)
    } else {
        (1.0, 0.0, 0.0, 0.0)
    };
    [
        [1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - w * z), 2.0 * (x * z + w * y)],
        [2.0 * (x * y + w * z), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - w * x)],
        [2.0 * (x * z - w * y), 2.0 * (y * z + w * x), 1.0 - 2.0 * (x * x + y * y)],
    ]
}

/// Model-view matrix for an eye: the inverse of the eye's world pose.
pub fn pose_to_model_view(pose: &Pose) -> [f64; 16] {
    let r = rotation_rows(pose);
    let t = pose.translation;
    let mut m = [0.0f64; 16];
    // Inverse rotation is the transpose; column c of the GL matrix holds row c of R^T = column c of R.
    for row in 0..3 {
        for col in 0..3 {
            m[col * 4 + row] = r[col][row];
        }
    }
    for row in 0..3 {
        m[12 + row] = -(r[0][row] * t[0] + r[1][row] * t[1] + r[2][row] * t[2]);
    }
    m[15] = 1.0;
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_api::Quaternion;

    fn approx(a: &[f64; 16], b: &[f64; 16]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn symmetric_frustum_matches_gl_frustum() {
        let p = ProjectionMatrix { left: -1.0, right: 1.0, top: 1.0, bottom: -1.0, near_clip: 1.0, far_clip: 3.0 };
        let m = projection_to_gl(&p);
        assert_eq!(m[0], 1.0);
        assert_eq!(m[5], 1.0);
        assert_eq!(m[8], 0.0);
        assert_eq!(m[10], -2.0);
        assert_eq!(m[11], -1.0);
        assert_eq!(m[14], -3.0);
    }

    #[test]
    fn degenerate_frustum_is_identity() {
        assert_eq!(projection_to_gl(&ProjectionMatrix::default()), IDENTITY);
    }

    #[test]
    fn identity_pose_translation_is_negated() {
        let pose = Pose { translation: [0.032, 1.7, 0.0], rotation: Quaternion::default() };
        let m = pose_to_model_view(&pose);
        let mut expected = IDENTITY;
        expected[12] = -0.032;
        expected[13] = -1.7;
        assert!(approx(&m, &expected));
    }

    #[test]
    fn yaw_pose_inverts_rotation() {
        // 90 degrees about +Y: eye looks down -X; a point at -X in world ends up at -Z in view.
        let half = std::f64::consts::FRAC_PI_4;
        let pose = Pose { translation: [0.0; 3], rotation: Quaternion { w: half.cos(), x: 0.0, y: half.sin(), z: 0.0 } };
        let m = pose_to_model_view(&pose);
        let p = [-1.0, 0.0, 0.0];
        let view = [
            m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12],
            m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13],
            m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14],
        ];
        assert!(view[0].abs() < 1e-9);
        assert!(view[1].abs() < 1e-9);
        assert!((view[2] + 1.0).abs() < 1e-9);
    }
}
