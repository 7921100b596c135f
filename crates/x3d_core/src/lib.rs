//! # X3D Core
//!
//! Math shared by the X3D scene-node and input crates.
//!
//! This crate provides:
//! - **Vectors and matrices** (`Vec2`, `Vec3`, column-major `Mat4`)
//! - **Rotations** as quaternions and axis-angle pairs
//! - **Bounding volumes** with slab tests
//! - **Intersection primitives** for exact picking
//! - **Frustum planes** extracted from a view-projection matrix

// Vector types
pub mod vector;

// 4x4 matrices
pub mod matrix;

// Inversion and viewing helpers
pub mod extensions;

// Quaternions
pub mod quat;

// Bounding volumes
pub mod bounds;

// Rays, segments and triangle tests
pub mod intersect;

// Clip planes
pub mod frustum;

pub use bounds::BoundingBox;
pub use extensions::Mat4Ext;
pub use frustum::{perspective_rh, Frustum, Plane};
pub use intersect::{Ray, Segment, TriangleHit};
pub use matrix::Mat4;
pub use quat::{AxisAngle, Quat};
pub use vector::{Vec2, Vec3};
