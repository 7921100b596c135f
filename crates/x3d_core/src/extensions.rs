//! Transform helpers used by picking and navigation
//!
//! Kept as an extension trait so the plain [`Mat4`] record stays small and
//! the viewing/inversion maths lives in one place.

use crate::matrix::Mat4;
use crate::vector::Vec3;

/// Extension trait for Mat4
pub trait Mat4Ext {
    /// Create a translation matrix
    fn from_translation(v: Vec3) -> Mat4;
    /// Create a scale matrix
    fn from_scale(v: Vec3) -> Mat4;
    /// Rotation from X, Y, Z Euler angles applied in that order
    fn from_euler(angles: Vec3) -> Mat4;
    /// Get row as array
    fn row(&self, idx: usize) -> [f32; 4];
    /// Inverse, or `None` for a singular matrix
    fn try_inverse(&self) -> Option<Mat4>;
    /// Inverse, falling back to identity for a singular matrix
    fn inverse(&self) -> Mat4;
    /// Transpose the matrix
    fn transpose(&self) -> Mat4;
    /// Transform a point (applies translation)
    fn transform_point(&self, p: Vec3) -> Vec3;
    /// Transform a direction (ignores translation)
    fn transform_vector(&self, v: Vec3) -> Vec3;
    /// Per-axis scale factors (lengths of the basis columns)
    fn extract_scale(&self) -> Vec3;
    /// Local +X axis in parent space
    fn right_vector(&self) -> Vec3;
    /// Local +Y axis in parent space
    fn up_vector(&self) -> Vec3;
    /// World-to-eye view matrix looking from `eye` at `target`
    fn look_at_rh(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
    /// Eye-to-world camera matrix, the inverse of [`Mat4Ext::look_at_rh`]
    fn camera_look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn from_translation(v: Vec3) -> Mat4 {
        Mat4::translation(v.x, v.y, v.z)
    }

    fn from_scale(v: Vec3) -> Mat4 {
        Mat4::scale(v.x, v.y, v.z)
    }

    fn from_euler(angles: Vec3) -> Mat4 {
        Mat4::rotation_x(angles.x)
            .mul(&Mat4::rotation_y(angles.y))
            .mul(&Mat4::rotation_z(angles.z))
    }

    fn row(&self, idx: usize) -> [f32; 4] {
        [
            self.cols[0][idx],
            self.cols[1][idx],
            self.cols[2][idx],
            self.cols[3][idx],
        ]
    }

    fn try_inverse(&self) -> Option<Mat4> {
        // Work on rows of the conventional (row-major) matrix.
        let m = |r: usize, c: usize| self.cols[c][r];

        let s0 = m(0, 0) * m(1, 1) - m(1, 0) * m(0, 1);
        let s1 = m(0, 0) * m(1, 2) - m(1, 0) * m(0, 2);
        let s2 = m(0, 0) * m(1, 3) - m(1, 0) * m(0, 3);
        let s3 = m(0, 1) * m(1, 2) - m(1, 1) * m(0, 2);
        let s4 = m(0, 1) * m(1, 3) - m(1, 1) * m(0, 3);
        let s5 = m(0, 2) * m(1, 3) - m(1, 2) * m(0, 3);

        let c5 = m(2, 2) * m(3, 3) - m(3, 2) * m(2, 3);
        let c4 = m(2, 1) * m(3, 3) - m(3, 1) * m(2, 3);
        let c3 = m(2, 1) * m(3, 2) - m(3, 1) * m(2, 2);
        let c2 = m(2, 0) * m(3, 3) - m(3, 0) * m(2, 3);
        let c1 = m(2, 0) * m(3, 2) - m(3, 0) * m(2, 2);
        let c0 = m(2, 0) * m(3, 1) - m(3, 0) * m(2, 1);

        let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;

        let r = [
            [
                (m(1, 1) * c5 - m(1, 2) * c4 + m(1, 3) * c3) * inv,
                (-m(0, 1) * c5 + m(0, 2) * c4 - m(0, 3) * c3) * inv,
                (m(3, 1) * s5 - m(3, 2) * s4 + m(3, 3) * s3) * inv,
                (-m(2, 1) * s5 + m(2, 2) * s4 - m(2, 3) * s3) * inv,
            ],
            [
                (-m(1, 0) * c5 + m(1, 2) * c2 - m(1, 3) * c1) * inv,
                (m(0, 0) * c5 - m(0, 2) * c2 + m(0, 3) * c1) * inv,
                (-m(3, 0) * s5 + m(3, 2) * s2 - m(3, 3) * s1) * inv,
                (m(2, 0) * s5 - m(2, 2) * s2 + m(2, 3) * s1) * inv,
            ],
            [
                (m(1, 0) * c4 - m(1, 1) * c2 + m(1, 3) * c0) * inv,
                (-m(0, 0) * c4 + m(0, 1) * c2 - m(0, 3) * c0) * inv,
                (m(3, 0) * s4 - m(3, 1) * s2 + m(3, 3) * s0) * inv,
                (-m(2, 0) * s4 + m(2, 1) * s2 - m(2, 3) * s0) * inv,
            ],
            [
                (-m(1, 0) * c3 + m(1, 1) * c1 - m(1, 2) * c0) * inv,
                (m(0, 0) * c3 - m(0, 1) * c1 + m(0, 2) * c0) * inv,
                (-m(3, 0) * s3 + m(3, 1) * s1 - m(3, 2) * s0) * inv,
                (m(2, 0) * s3 - m(2, 1) * s1 + m(2, 2) * s0) * inv,
            ],
        ];

        // r is row-major; store back column-major.
        let mut out = Mat4::IDENTITY;
        for (row, values) in r.iter().enumerate() {
            for (col, v) in values.iter().enumerate() {
                out.cols[col][row] = *v;
            }
        }
        Some(out)
    }

    fn inverse(&self) -> Mat4 {
        match self.try_inverse() {
            Some(m) => m,
            None => {
                tracing::trace!("inverting singular matrix, using identity");
                Mat4::IDENTITY
            }
        }
    }

    fn transpose(&self) -> Mat4 {
        let mut out = Mat4::IDENTITY;
        for c in 0..4 {
            for r in 0..4 {
                out.cols[c][r] = self.cols[r][c];
            }
        }
        out
    }

    fn transform_point(&self, p: Vec3) -> Vec3 {
        let c = &self.cols;
        Vec3::new(
            c[0][0] * p.x + c[1][0] * p.y + c[2][0] * p.z + c[3][0],
            c[0][1] * p.x + c[1][1] * p.y + c[2][1] * p.z + c[3][1],
            c[0][2] * p.x + c[1][2] * p.y + c[2][2] * p.z + c[3][2],
        )
    }

    fn transform_vector(&self, v: Vec3) -> Vec3 {
        let c = &self.cols;
        Vec3::new(
            c[0][0] * v.x + c[1][0] * v.y + c[2][0] * v.z,
            c[0][1] * v.x + c[1][1] * v.y + c[2][1] * v.z,
            c[0][2] * v.x + c[1][2] * v.y + c[2][2] * v.z,
        )
    }

    fn extract_scale(&self) -> Vec3 {
        let len = |c: &[f32; 4]| (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt();
        Vec3::new(len(&self.cols[0]), len(&self.cols[1]), len(&self.cols[2]))
    }

    fn right_vector(&self) -> Vec3 {
        Vec3::new(self.cols[0][0], self.cols[0][1], self.cols[0][2]).normalize()
    }

    fn up_vector(&self) -> Vec3 {
        Vec3::new(self.cols[1][0], self.cols[1][1], self.cols[1][2]).normalize()
    }

    fn look_at_rh(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let f = (target - eye).normalize();
        let s = f.cross(up).normalize();
        let s = if s.is_zero() { Vec3::X } else { s };
        let u = s.cross(f);

        Mat4 {
            cols: [
                [s.x, u.x, -f.x, 0.0],
                [s.y, u.y, -f.y, 0.0],
                [s.z, u.z, -f.z, 0.0],
                [-s.dot(eye), -u.dot(eye), f.dot(eye), 1.0],
            ],
        }
    }

    fn camera_look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let f = (target - eye).normalize();
        let s = f.cross(up).normalize();
        let s = if s.is_zero() { Vec3::X } else { s };
        let u = s.cross(f);

        // Rigid transform: the inverse of the view matrix is its transpose
        // rotation with the eye as translation.
        Mat4 {
            cols: [
                [s.x, s.y, s.z, 0.0],
                [u.x, u.y, u.z, 0.0],
                [-f.x, -f.y, -f.z, 0.0],
                [eye.x, eye.y, eye.z, 1.0],
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &Mat4, b: &Mat4) -> bool {
        (0..4).all(|c| (0..4).all(|r| (a.cols[c][r] - b.cols[c][r]).abs() < 1e-4))
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Mat4::translation(1.0, -2.0, 3.0)
            .mul(&Mat4::rotation_y(0.4))
            .mul(&Mat4::scale(2.0, 3.0, 0.5));
        let inv = m.inverse();
        assert!(approx(&m.mul(&inv), &Mat4::IDENTITY));
        assert!(approx(&inv.mul(&m), &Mat4::IDENTITY));
    }

    #[test]
    fn test_singular_inverse() {
        let m = Mat4::scale(0.0, 1.0, 1.0);
        assert!(m.try_inverse().is_none());
        assert_eq!(m.inverse(), Mat4::IDENTITY);
    }

    #[test]
    fn test_camera_look_at_is_view_inverse() {
        let eye = Vec3::new(3.0, 2.0, 5.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::UP);
        let cam = Mat4::camera_look_at(eye, Vec3::ZERO, Vec3::UP);
        assert!(approx(&view.mul(&cam), &Mat4::IDENTITY));
        assert_eq!(cam.get_translation(), eye);
    }

    #[test]
    fn test_extract_scale() {
        let m = Mat4::rotation_z(1.0).mul(&Mat4::scale(2.0, 3.0, 4.0));
        let s = m.extract_scale();
        assert!((s.x - 2.0).abs() < 1e-5);
        assert!((s.y - 3.0).abs() < 1e-5);
        assert!((s.z - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_transform_point_and_vector() {
        let m = Mat4::translation(1.0, 0.0, 0.0);
        assert_eq!(m.transform_point(Vec3::ZERO), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(m.transform_vector(Vec3::UP), Vec3::UP);
    }
}
