//! Picking.
//!
//! A pick is made in two stages. The render collaborator answers a
//! [`PickRequest`] at bounds level; in geometry mode the [`PickEngine`] then
//! confirms each candidate against the shape's triangles.

mod engine;
mod mask;
mod sensors;

pub use engine::{polyline_pairs, vertex_count_pairs, PickEngine, PickGeometry, SurfaceHit};
pub use mask::{ObjectTypeMasks, ALL_MASK, EXTENDED_MASK, NONE_MASK};
pub use sensors::{PickSensorListener, PickSensorManager};

use crate::render::{ObjectId, ScenePath};
use x3d_core::{BoundingBox, Frustum, Ray, Segment, Vec3};
use x3d_nodes::NodeHandle;

/// How hits are selected and ordered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PickSort {
    /// First hit found, unordered
    Any,
    /// Nearest hit only
    #[default]
    Closest,
    /// Every hit, unordered
    All,
    /// Every hit, nearest first
    AllSorted,
}

impl PickSort {
    /// Parse a pick sensor `sortOrder` value
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ANY" => Some(PickSort::Any),
            "CLOSEST" => Some(PickSort::Closest),
            "ALL" => Some(PickSort::All),
            "ALL_SORTED" => Some(PickSort::AllSorted),
            _ => None,
        }
    }

    /// Single-result orders stop once one hit is chosen
    pub fn is_single(&self) -> bool {
        matches!(self, PickSort::Any | PickSort::Closest)
    }
}

/// Bounds-only or triangle-exact picking
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntersectMode {
    #[default]
    Bounds,
    Geometry,
}

impl IntersectMode {
    /// Parse a pick sensor `intersectionType` value
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "BOUNDS" => Some(IntersectMode::Bounds),
            "GEOMETRY" => Some(IntersectMode::Geometry),
            _ => None,
        }
    }
}

/// World-space picking volume
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PickShape {
    Point(Vec3),
    Ray(Ray),
    Segment(Segment),
    Sphere { center: Vec3, radius: f32 },
    Box(BoundingBox),
    /// Apex at `axis.start`, opening towards `axis.end`
    Cone { axis: Segment, angle: f32 },
    Cylinder { axis: Segment, radius: f32 },
    Frustum(Frustum),
}

impl PickShape {
    /// Point distances are measured from
    pub fn origin(&self) -> Vec3 {
        match self {
            PickShape::Point(p) => *p,
            PickShape::Ray(ray) => ray.origin,
            PickShape::Segment(seg) => seg.start,
            PickShape::Sphere { center, .. } => *center,
            PickShape::Box(b) => b.center(),
            PickShape::Cone { axis, .. } | PickShape::Cylinder { axis, .. } => axis.start,
            PickShape::Frustum(_) => Vec3::ZERO,
        }
    }

    /// Bounds-level overlap test
    pub fn intersects_bounds(&self, bounds: &BoundingBox) -> bool {
        if bounds.is_empty() {
            return false;
        }
        match self {
            PickShape::Point(p) => bounds.contains_point(*p),
            PickShape::Ray(ray) => bounds.intersects_ray(ray.origin, ray.direction),
            PickShape::Segment(seg) => bounds.intersects_segment(seg.start, seg.end),
            PickShape::Sphere { center, radius } => {
                bounds.distance_squared_to(*center) <= radius * radius
            }
            PickShape::Box(b) => bounds.intersects(b),
            PickShape::Cone { axis, angle } => x3d_core::intersect::cone_box(axis, *angle, bounds),
            PickShape::Cylinder { axis, radius } => {
                x3d_core::intersect::cylinder_box(axis, *radius, bounds)
            }
            PickShape::Frustum(f) => f.intersects_box(bounds),
        }
    }

    /// Distance used to order bounds-level hits
    pub fn bounds_distance(&self, bounds: &BoundingBox) -> f32 {
        match self {
            PickShape::Ray(ray) => bounds
                .ray_range(ray.origin, ray.direction)
                .map_or(f32::MAX, |(near, _)| near.max(0.0)),
            other => bounds.distance_squared_to(other.origin()).sqrt(),
        }
    }
}

/// A bounds-level hit reported by the render collaborator
#[derive(Clone, Debug, PartialEq)]
pub struct PathHit {
    pub path: ScenePath,
    pub distance: f32,
}

/// Reusable bounds-level pick request
#[derive(Clone, Debug)]
pub struct PickRequest {
    pub shape: PickShape,
    pub sort: PickSort,
    /// Only objects whose type mask overlaps this are picked
    pub mask: u32,
    hits: Vec<PathHit>,
}

impl PickRequest {
    pub fn new(shape: PickShape) -> Self {
        Self {
            shape,
            sort: PickSort::default(),
            mask: ALL_MASK,
            hits: Vec::new(),
        }
    }

    pub fn with_sort(mut self, sort: PickSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    /// Reuse the request for a new query, keeping its buffers
    pub fn reset(&mut self, shape: PickShape, sort: PickSort, mask: u32) {
        self.shape = shape;
        self.sort = sort;
        self.mask = mask;
        self.hits.clear();
    }

    pub fn accepts_mask(&self, object_mask: u32) -> bool {
        self.mask & object_mask != 0
    }

    pub fn push(&mut self, path: ScenePath, distance: f32) {
        self.hits.push(PathHit { path, distance });
    }

    /// Apply the sort order to the collected hits; returns the count kept
    pub fn finish(&mut self) -> usize {
        match self.sort {
            PickSort::Any => self.hits.truncate(1),
            PickSort::Closest => {
                if let Some(best) = nearest_index(self.hits.iter().map(|h| h.distance)) {
                    self.hits.swap(0, best);
                    self.hits.truncate(1);
                }
            }
            PickSort::All => {}
            PickSort::AllSorted => self
                .hits
                .sort_by(|a, b| a.distance.total_cmp(&b.distance)),
        }
        self.hits.len()
    }

    pub fn hits(&self) -> &[PathHit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

fn nearest_index(distances: impl Iterator<Item = f32>) -> Option<usize> {
    distances
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// One picked object after mapping back to its VRML node
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickHit {
    pub node: NodeHandle,
    pub object: ObjectId,
    pub distance: f32,
    /// Exact intersection, geometry mode only
    pub point: Option<Vec3>,
    pub normal: Option<Vec3>,
    pub tex_coord: Option<Vec3>,
}

/// Pick output, valid until the next pick on the same engine.
///
/// Capacity grows in steps of `increment` and is never released.
#[derive(Clone, Debug)]
pub struct PickResults {
    hits: Vec<PickHit>,
    increment: usize,
}

impl Default for PickResults {
    fn default() -> Self {
        Self::with_increment(50)
    }
}

impl PickResults {
    pub fn with_increment(increment: usize) -> Self {
        let increment = increment.max(1);
        Self {
            hits: Vec::with_capacity(increment),
            increment,
        }
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }

    pub fn push(&mut self, hit: PickHit) {
        if self.hits.len() == self.hits.capacity() {
            self.hits.reserve_exact(self.increment);
        }
        self.hits.push(hit);
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.hits.capacity()
    }

    pub fn hits(&self) -> &[PickHit] {
        &self.hits
    }

    pub fn first(&self) -> Option<&PickHit> {
        self.hits.first()
    }

    /// Picked nodes without repeats, in result order
    pub fn unique_nodes(&self) -> Vec<NodeHandle> {
        let mut nodes: Vec<NodeHandle> = Vec::with_capacity(self.hits.len());
        for hit in &self.hits {
            if !nodes.contains(&hit.node) {
                nodes.push(hit.node);
            }
        }
        nodes
    }

    /// Keep only the nearest hit
    pub(crate) fn keep_nearest(&mut self) {
        if let Some(best) = nearest_index(self.hits.iter().map(|h| h.distance)) {
            self.hits.swap(0, best);
            self.hits.truncate(1);
        }
    }

    pub(crate) fn sort_by_distance(&mut self) {
        self.hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn path(ids: &mut SlotMap<ObjectId, ()>) -> ScenePath {
        let mut p = ScenePath::new();
        p.push(ids.insert(()), x3d_core::Mat4::IDENTITY);
        p
    }

    #[test]
    fn test_sort_names() {
        assert_eq!(PickSort::from_name("ALL_SORTED"), Some(PickSort::AllSorted));
        assert_eq!(PickSort::from_name("closest"), None);
        assert_eq!(IntersectMode::from_name("GEOMETRY"), Some(IntersectMode::Geometry));
    }

    #[test]
    fn test_request_closest_keeps_nearest() {
        let mut ids = SlotMap::with_key();
        let mut req = PickRequest::new(PickShape::Point(Vec3::ZERO));
        for d in [3.0, 1.0, 2.0] {
            req.push(path(&mut ids), d);
        }
        assert_eq!(req.finish(), 1);
        assert_eq!(req.hits()[0].distance, 1.0);
    }

    #[test]
    fn test_request_all_sorted_and_any() {
        let mut ids = SlotMap::with_key();
        let mut req = PickRequest::new(PickShape::Point(Vec3::ZERO)).with_sort(PickSort::AllSorted);
        for d in [3.0, 1.0, 2.0] {
            req.push(path(&mut ids), d);
        }
        assert_eq!(req.finish(), 3);
        let order: Vec<f32> = req.hits().iter().map(|h| h.distance).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);

        req.reset(PickShape::Point(Vec3::ZERO), PickSort::Any, ALL_MASK);
        assert!(req.is_empty());
        req.push(path(&mut ids), 5.0);
        req.push(path(&mut ids), 4.0);
        assert_eq!(req.finish(), 1);
        assert_eq!(req.hits()[0].distance, 5.0);
    }

    #[test]
    fn test_results_grow_by_increment() {
        let mut ids: SlotMap<ObjectId, ()> = SlotMap::with_key();
        let mut nodes: SlotMap<NodeHandle, ()> = SlotMap::with_key();
        let hit = PickHit {
            node: nodes.insert(()),
            object: ids.insert(()),
            distance: 0.0,
            point: None,
            normal: None,
            tex_coord: None,
        };
        let mut results = PickResults::with_increment(4);
        for _ in 0..5 {
            results.push(hit);
        }
        assert!(results.capacity() >= 8);
        let grown = results.capacity();
        results.clear();
        assert_eq!(results.capacity(), grown);
        assert_eq!(results.unique_nodes().len(), 0);
    }

    #[test]
    fn test_shape_bounds() {
        let unit = BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::ONE);
        let sphere = PickShape::Sphere {
            center: Vec3::new(2.5, 0.0, 0.0),
            radius: 1.0,
        };
        assert!(!sphere.intersects_bounds(&unit));
        let ray = PickShape::Ray(Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::FORWARD));
        assert!(ray.intersects_bounds(&unit));
        assert!((ray.bounds_distance(&unit) - 4.0).abs() < 1e-5);
    }
}
