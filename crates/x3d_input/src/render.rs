//! Render collaborator interface.
//!
//! The input runtime never owns renderable geometry. It asks a
//! [`RenderScene`] for bounds-level picks below a group, for the user data
//! attached to each object (which VRML node it renders, which pointing
//! sensors sit in it) and for shape triangles when a pick needs an exact
//! test.

use crate::pick::PickRequest;
use slotmap::new_key_type;
use smallvec::SmallVec;
use x3d_core::{BoundingBox, Mat4, Vec2, Vec3};
use x3d_nodes::NodeHandle;

new_key_type! {
    /// Handle to an object in the render scene
    pub struct ObjectId;
}

/// User data attached to a render object
#[derive(Clone, Debug)]
pub struct ObjectData {
    /// VRML node this object renders, if any
    pub node: Option<NodeHandle>,
    /// Pointing sensors that are children of this group
    pub sensors: SmallVec<[NodeHandle; 2]>,
    pub is_transform: bool,
    /// Pick sensors and pointer picks skip this subtree when false
    pub pickable: bool,
    pub collidable: bool,
    /// Walk mode follows the ground formed by these objects
    pub terrain: bool,
    /// Object-type bits matched against a pick request's mask
    pub object_mask: u32,
}

impl Default for ObjectData {
    fn default() -> Self {
        Self {
            node: None,
            sensors: SmallVec::new(),
            is_transform: false,
            pickable: true,
            collidable: true,
            terrain: true,
            object_mask: crate::pick::ALL_MASK,
        }
    }
}

impl ObjectData {
    pub fn for_node(node: NodeHandle) -> Self {
        Self {
            node: Some(node),
            ..Self::default()
        }
    }

    pub fn with_sensor(mut self, sensor: NodeHandle) -> Self {
        self.sensors.push(sensor);
        self
    }

    pub fn with_transform(mut self, is_transform: bool) -> Self {
        self.is_transform = is_transform;
        self
    }

    pub fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }

    pub fn with_terrain(mut self, terrain: bool) -> Self {
        self.terrain = terrain;
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.object_mask = mask;
        self
    }
}

/// Objects from a pick root down to a terminal shape
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScenePath {
    pub objects: SmallVec<[ObjectId; 8]>,
    /// Accumulated local-to-world transform after each step
    pub transforms: SmallVec<[Mat4; 8]>,
}

impl ScenePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: ObjectId, local_to_world: Mat4) {
        self.objects.push(object);
        self.transforms.push(local_to_world);
    }

    pub fn pop(&mut self) {
        self.objects.pop();
        self.transforms.pop();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn terminal(&self) -> Option<ObjectId> {
        self.objects.last().copied()
    }

    /// Transform of the terminal object
    pub fn local_to_world(&self) -> Mat4 {
        self.transforms.last().copied().unwrap_or(Mat4::IDENTITY)
    }

    pub fn transform_at(&self, step: usize) -> Mat4 {
        self.transforms.get(step).copied().unwrap_or(Mat4::IDENTITY)
    }

    /// Steps from the terminal towards the root
    pub fn leaf_to_root(&self) -> impl Iterator<Item = (usize, ObjectId)> + '_ {
        self.objects.iter().copied().enumerate().rev()
    }
}

/// Indexed triangles of a shape in its local space
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    /// Per-vertex normals, empty for face normals
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates, may be empty
    pub tex_coords: Vec<Vec2>,
    pub indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new(positions: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            normals: Vec::new(),
            tex_coords: Vec::new(),
            indices,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_tex_coords(mut self, tex_coords: Vec<Vec2>) -> Self {
        self.tex_coords = tex_coords;
        self
    }

    /// Axis-aligned box centred on the origin
    pub fn cuboid(size: Vec3) -> Self {
        let h = size * 0.5;
        let positions = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let indices = vec![
            [4, 5, 6],
            [4, 6, 7],
            [1, 0, 3],
            [1, 3, 2],
            [5, 1, 2],
            [5, 2, 6],
            [0, 4, 7],
            [0, 7, 3],
            [7, 6, 2],
            [7, 2, 3],
            [0, 1, 5],
            [0, 5, 4],
        ];
        Self::new(positions, indices)
    }

    /// Square in the XZ plane facing +Y, with 0..1 texture coordinates
    pub fn ground(width: f32) -> Self {
        let h = width * 0.5;
        let positions = vec![
            Vec3::new(-h, 0.0, h),
            Vec3::new(h, 0.0, h),
            Vec3::new(h, 0.0, -h),
            Vec3::new(-h, 0.0, -h),
        ];
        let tex_coords = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        Self::new(positions, vec![[0, 1, 2], [0, 2, 3]])
            .with_normals(vec![Vec3::UP; 4])
            .with_tex_coords(tex_coords)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Corners of triangle `index`; `None` if it references a missing vertex
    pub fn triangle(&self, index: usize) -> Option<[Vec3; 3]> {
        let [a, b, c] = *self.indices.get(index)?;
        Some([
            *self.positions.get(a as usize)?,
            *self.positions.get(b as usize)?,
            *self.positions.get(c as usize)?,
        ])
    }

    /// Triangle `index` transformed by `m`
    pub fn world_triangle(&self, index: usize, m: &Mat4) -> Option<[Vec3; 3]> {
        use x3d_core::Mat4Ext;
        let [a, b, c] = self.triangle(index)?;
        Some([m.transform_point(a), m.transform_point(b), m.transform_point(c)])
    }

    pub fn vertex_normals(&self, index: usize) -> Option<[Vec3; 3]> {
        let [a, b, c] = *self.indices.get(index)?;
        Some([
            *self.normals.get(a as usize)?,
            *self.normals.get(b as usize)?,
            *self.normals.get(c as usize)?,
        ])
    }

    pub fn vertex_tex_coords(&self, index: usize) -> Option<[Vec2; 3]> {
        let [a, b, c] = *self.indices.get(index)?;
        Some([
            *self.tex_coords.get(a as usize)?,
            *self.tex_coords.get(b as usize)?,
            *self.tex_coords.get(c as usize)?,
        ])
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.positions.iter().copied())
    }
}

/// Perspective parameters of the current view
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewFrustum {
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for ViewFrustum {
    fn default() -> Self {
        Self {
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect: 1.0,
            near: 0.125,
            far: 3000.0,
        }
    }
}

impl ViewFrustum {
    pub fn projection(&self) -> Mat4 {
        x3d_core::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Camera-space direction through a point in normalized device
    /// coordinates (`-1..1` on both axes, +Y up)
    pub fn direction_through(&self, ndc_x: f32, ndc_y: f32) -> Vec3 {
        let half = (self.fov_y * 0.5).tan();
        Vec3::new(ndc_x * half * self.aspect, ndc_y * half, -1.0).normalize()
    }
}

/// What the input runtime needs from the renderer's scene graph.
pub trait RenderScene {
    /// Top of the rendered world
    fn root(&self) -> ObjectId;

    /// Bounds-level pick of the shapes below `root` (inclusive). Hits are
    /// added to `request` with paths starting at `root`; returns the count.
    fn pick(&self, root: ObjectId, request: &mut PickRequest) -> usize;

    fn object_data(&self, object: ObjectId) -> Option<&ObjectData>;

    /// Object that renders `node`
    fn object_for_node(&self, node: NodeHandle) -> Option<ObjectId>;

    /// Accumulated transform from the object's space to world space
    fn local_to_world(&self, object: ObjectId) -> Mat4;

    /// World-space bounds of everything below `object`
    fn world_bounds(&self, object: ObjectId) -> BoundingBox;

    /// Triangles of a shape object, in its local space
    fn mesh(&self, object: ObjectId) -> Option<&TriangleMesh>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_cuboid_bounds() {
        let mesh = TriangleMesh::cuboid(Vec3::new(2.0, 4.0, 6.0));
        let b = mesh.bounds();
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn test_triangle_out_of_range() {
        let mesh = TriangleMesh::new(vec![Vec3::ZERO], vec![[0, 1, 2]]);
        assert!(mesh.triangle(0).is_none());
        assert!(mesh.triangle(5).is_none());
    }

    #[test]
    fn test_path_leaf_to_root() {
        let mut ids: SlotMap<ObjectId, ()> = SlotMap::with_key();
        let (a, b) = (ids.insert(()), ids.insert(()));
        let mut path = ScenePath::new();
        path.push(a, Mat4::IDENTITY);
        path.push(b, Mat4::translation(1.0, 0.0, 0.0));
        let order: Vec<_> = path.leaf_to_root().map(|(_, o)| o).collect();
        assert_eq!(order, vec![b, a]);
        assert_eq!(path.terminal(), Some(b));
        assert_eq!(path.local_to_world().get_translation().x, 1.0);
    }

    #[test]
    fn test_centre_ray_looks_down_negative_z() {
        let dir = ViewFrustum::default().direction_through(0.0, 0.0);
        assert!((dir.z + 1.0).abs() < 1e-6);
    }
}
