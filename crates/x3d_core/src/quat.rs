//! Quaternion rotations and axis-angle conversion

use crate::matrix::Mat4;
use crate::vector::Vec3;

/// Quaternion for representing 3D rotations
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-angle orientation as reported to viewpoint listeners
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisAngle {
    pub axis: Vec3,
    pub angle: f32,
}

impl Default for AxisAngle {
    fn default() -> Self {
        Self {
            axis: Vec3::UP,
            angle: 0.0,
        }
    }
}

impl Quat {
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Create from axis-angle representation
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize();
        if axis.is_zero() {
            return Self::IDENTITY;
        }
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Extract the rotation part of a matrix (scale must be uniform or removed)
    pub fn from_mat4(m: &Mat4) -> Self {
        let c = &m.cols;
        let (m00, m11, m22) = (c[0][0], c[1][1], c[2][2]);
        let trace = m00 + m11 + m22;

        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new(
                (c[1][2] - c[2][1]) / s,
                (c[2][0] - c[0][2]) / s,
                (c[0][1] - c[1][0]) / s,
                0.25 * s,
            )
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self::new(
                0.25 * s,
                (c[1][0] + c[0][1]) / s,
                (c[2][0] + c[0][2]) / s,
                (c[1][2] - c[2][1]) / s,
            )
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self::new(
                (c[1][0] + c[0][1]) / s,
                0.25 * s,
                (c[2][1] + c[1][2]) / s,
                (c[2][0] - c[0][2]) / s,
            )
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self::new(
                (c[2][0] + c[0][2]) / s,
                (c[2][1] + c[1][2]) / s,
                0.25 * s,
                (c[0][1] - c[1][0]) / s,
            )
        };
        q.normalize()
    }

    /// Normalize the quaternion
    pub fn normalize(&self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len < 1e-6 {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Hamilton product
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
        }
    }

    pub fn rotate_vec3(&self, v: Vec3) -> Vec3 {
        let r = self.mul(&Self::new(v.x, v.y, v.z, 0.0)).mul(&self.conjugate());
        Vec3::new(r.x, r.y, r.z)
    }

    /// Convert to axis-angle; the identity maps to +Y with a zero angle
    pub fn to_axis_angle(&self) -> AxisAngle {
        let q = self.normalize();
        let s = (1.0 - q.w * q.w).max(0.0).sqrt();
        if s < 1e-6 {
            return AxisAngle::default();
        }
        AxisAngle {
            axis: Vec3::new(q.x / s, q.y / s, q.z / s),
            angle: 2.0 * q.w.clamp(-1.0, 1.0).acos(),
        }
    }
}
