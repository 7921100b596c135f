//! View frustum planes for frustum picking

use crate::bounds::BoundingBox;
use crate::matrix::Mat4;
use crate::vector::Vec3;

/// Plane `normal · p + d = 0`, positive side inside
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Build from raw coefficients, normalising the normal
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let len = (a * a + b * b + c * c).sqrt();
        if len > 0.0 {
            Self {
                normal: Vec3::new(a / len, b / len, c / len),
                d: d / len,
            }
        } else {
            Self {
                normal: Vec3::ZERO,
                d,
            }
        }
    }

    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// Six clip planes: left, right, bottom, top, near, far
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes from a view-projection matrix (OpenGL clip space)
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let row = |r: usize| [vp.cols[0][r], vp.cols[1][r], vp.cols[2][r], vp.cols[3][r]];
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let add = |a: [f32; 4], b: [f32; 4]| Plane::from_coefficients(a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]);
        let sub = |a: [f32; 4], b: [f32; 4]| Plane::from_coefficients(a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]);
        Self {
            planes: [
                add(r3, r0),
                sub(r3, r0),
                add(r3, r1),
                sub(r3, r1),
                add(r3, r2),
                sub(r3, r2),
            ],
        }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(p) >= 0.0)
    }

    /// Sphere inside or straddling the frustum
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Box inside or straddling the frustum (positive-vertex test)
    pub fn intersects_box(&self, bbox: &BoundingBox) -> bool {
        if bbox.is_empty() {
            return false;
        }
        self.planes.iter().all(|plane| {
            let n = plane.normal;
            let positive = Vec3::new(
                if n.x >= 0.0 { bbox.max.x } else { bbox.min.x },
                if n.y >= 0.0 { bbox.max.y } else { bbox.min.y },
                if n.z >= 0.0 { bbox.max.z } else { bbox.min.z },
            );
            plane.signed_distance(positive) >= 0.0
        })
    }
}

/// Right-handed perspective projection with an OpenGL depth range
pub fn perspective_rh(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let f = 1.0 / (fov_y * 0.5).tan();
    let nf = 1.0 / (near - far);
    Mat4 {
        cols: [
            [f / aspect, 0.0, 0.0, 0.0],
            [0.0, f, 0.0, 0.0],
            [0.0, 0.0, (far + near) * nf, -1.0],
            [0.0, 0.0, 2.0 * far * near * nf, 0.0],
        ],
    }
}
