//! Pick engine: picking geometry from nodes, bounds picks through the
//! render collaborator, exact confirmation against triangles.

use super::{IntersectMode, PickHit, PickRequest, PickResults, PickShape, PickSort, ALL_MASK};
use crate::render::{ObjectId, RenderScene, ScenePath, TriangleMesh};
use x3d_core::intersect::{
    ray_triangle, segment_triangle, sphere_triangle, triangle_box, triangle_cone, triangle_cylinder,
    triangle_frustum,
};
use x3d_core::{BoundingBox, Mat4, Mat4Ext, Ray, Segment, TriangleHit, Vec2, Vec3};
use x3d_nodes::{NodeHandle, NodeKind, SceneGraph};

/// Picking geometry in world space
#[derive(Clone, Debug, PartialEq)]
pub enum PickGeometry {
    /// One pick per point
    Points(Vec<Vec3>),
    /// One pick per line segment
    Segments(Vec<Segment>),
    /// A single volume
    Volume(PickShape),
}

impl PickGeometry {
    /// Build picking geometry from a geometry node placed by `to_world`.
    ///
    /// Returns `None` for node kinds that cannot pick.
    pub fn from_node(graph: &SceneGraph, geometry: NodeHandle, to_world: &Mat4) -> Option<Self> {
        let kind = graph.node_kind(geometry)?;
        let scale = to_world.extract_scale();
        let origin = to_world.transform_point(Vec3::ZERO);
        let built = match kind {
            NodeKind::PointSet => {
                let points = coordinate_points(graph, geometry);
                PickGeometry::Points(points.iter().map(|p| to_world.transform_point(*p)).collect())
            }
            NodeKind::LineSet => {
                let counts = graph.get_ints(geometry, "vertexCount").unwrap_or(&[]);
                let pairs = vertex_count_pairs(counts);
                PickGeometry::Segments(segments(&coordinate_points(graph, geometry), &pairs, to_world))
            }
            NodeKind::IndexedLineSet => {
                let index = graph.get_ints(geometry, "coordIndex").unwrap_or(&[]);
                let pairs = polyline_pairs(index);
                PickGeometry::Segments(segments(&coordinate_points(graph, geometry), &pairs, to_world))
            }
            NodeKind::Sphere => {
                let radius = graph.get_float(geometry, "radius").unwrap_or(1.0);
                PickGeometry::Volume(PickShape::Sphere {
                    center: origin,
                    radius: radius * scale.max_element(),
                })
            }
            NodeKind::Box => {
                let size = graph.get_vec3(geometry, "size").unwrap_or(Vec3::new(2.0, 2.0, 2.0));
                PickGeometry::Volume(PickShape::Box(
                    BoundingBox::from_center_size(Vec3::ZERO, size).transformed(to_world),
                ))
            }
            NodeKind::Cone => {
                let height = graph.get_float(geometry, "height").unwrap_or(2.0);
                let radius = graph.get_float(geometry, "bottomRadius").unwrap_or(1.0);
                let axis = vertical_axis(height, to_world);
                let scaled_radius = radius * scale.x.max(scale.z);
                let scaled_height = (height * scale.y).max(f32::EPSILON);
                PickGeometry::Volume(PickShape::Cone {
                    axis,
                    angle: (scaled_radius / scaled_height).atan(),
                })
            }
            NodeKind::Cylinder => {
                let height = graph.get_float(geometry, "height").unwrap_or(2.0);
                let radius = graph.get_float(geometry, "radius").unwrap_or(1.0);
                PickGeometry::Volume(PickShape::Cylinder {
                    axis: vertical_axis(height, to_world),
                    radius: radius * scale.x.max(scale.z),
                })
            }
            NodeKind::IndexedFaceSet => {
                let points = coordinate_points(graph, geometry);
                let bounds = BoundingBox::from_points(points.iter().map(|p| to_world.transform_point(*p)));
                if bounds.is_empty() {
                    return None;
                }
                PickGeometry::Volume(PickShape::Box(bounds))
            }
            other => {
                tracing::debug!(kind = other.name(), "geometry cannot be used for picking");
                return None;
            }
        };
        Some(built)
    }

    /// Number of individual picks this geometry makes
    pub fn pick_count(&self) -> usize {
        match self {
            PickGeometry::Points(p) => p.len(),
            PickGeometry::Segments(s) => s.len(),
            PickGeometry::Volume(_) => 1,
        }
    }

    fn shape(&self, index: usize) -> Option<PickShape> {
        match self {
            PickGeometry::Points(p) => p.get(index).map(|p| PickShape::Point(*p)),
            PickGeometry::Segments(s) => s.get(index).map(|s| PickShape::Segment(*s)),
            PickGeometry::Volume(shape) => (index == 0).then_some(*shape),
        }
    }
}

/// Apex at +height/2, base at -height/2, as cones are modelled
fn vertical_axis(height: f32, to_world: &Mat4) -> Segment {
    let half = height * 0.5;
    Segment::new(
        to_world.transform_point(Vec3::new(0.0, half, 0.0)),
        to_world.transform_point(Vec3::new(0.0, -half, 0.0)),
    )
}

fn coordinate_points(graph: &SceneGraph, geometry: NodeHandle) -> Vec<Vec3> {
    graph
        .get_node(geometry, "coord")
        .and_then(|coord| graph.get_floats(coord, "point"))
        .map(|data| data.chunks_exact(3).map(Vec3::from_slice).collect())
        .unwrap_or_default()
}

fn segments(points: &[Vec3], pairs: &[(usize, usize)], to_world: &Mat4) -> Vec<Segment> {
    pairs
        .iter()
        .filter_map(|&(a, b)| {
            let (a, b) = (points.get(a)?, points.get(b)?);
            Some(Segment::new(to_world.transform_point(*a), to_world.transform_point(*b)))
        })
        .collect()
}

/// Consecutive coordinate pairs of an indexed polyline list; `-1` ends a
/// polyline.
pub fn polyline_pairs(index: &[i32]) -> Vec<(usize, usize)> {
    index
        .windows(2)
        .filter(|w| w[0] >= 0 && w[1] >= 0)
        .map(|w| (w[0] as usize, w[1] as usize))
        .collect()
}

/// Consecutive coordinate pairs of polylines laid out back to back, each
/// `count` vertices long
pub fn vertex_count_pairs(counts: &[i32]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut start = 0usize;
    for &count in counts {
        let n = usize::try_from(count).unwrap_or(0);
        pairs.extend((1..n).map(|i| (start + i - 1, start + i)));
        start += n;
    }
    pairs
}

// =============================================================================
// Exact confirmation
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct Exact {
    distance: f32,
    point: Option<Vec3>,
    normal: Option<Vec3>,
    tex_coord: Option<Vec3>,
}

impl Exact {
    fn bounds(distance: f32) -> Self {
        Self {
            distance,
            point: None,
            normal: None,
            tex_coord: None,
        }
    }

    fn volume(point: Vec3, tri: [Vec3; 3], origin: Vec3) -> Self {
        let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize();
        Self {
            distance: point.distance(origin),
            point: Some(point),
            normal: Some(normal),
            tex_coord: None,
        }
    }

    fn surface(mesh: &TriangleMesh, index: usize, to_world: &Mat4, hit: &TriangleHit, distance: f32) -> Self {
        let w = 1.0 - hit.u - hit.v;
        let normal = match mesh.vertex_normals(index) {
            Some([a, b, c]) => {
                let local = a * w + b * hit.u + c * hit.v;
                to_world.inverse().transpose().transform_vector(local).normalize()
            }
            None => hit.normal,
        };
        let tex_coord = mesh
            .vertex_tex_coords(index)
            .map(|[a, b, c]| hit.interpolate2(a, b, c))
            .map(|uv| Vec3::new(uv.x, uv.y, 0.0));
        Self {
            distance,
            point: Some(hit.point),
            normal: Some(normal),
            tex_coord,
        }
    }
}

/// Parity test: a ray from inside a closed mesh crosses it an odd number
/// of times. The direction is skewed off the axes to avoid grazing edges.
fn point_inside(mesh: &TriangleMesh, to_world: &Mat4, p: Vec3) -> bool {
    let ray = Ray::new(p, Vec3::new(1.0, 0.000_123, 0.000_321));
    let crossings = (0..mesh.triangle_count())
        .filter_map(|i| mesh.world_triangle(i, to_world))
        .filter(|tri| ray_triangle(&ray, *tri).is_some_and(|h| h.t > 0.0))
        .count();
    crossings % 2 == 1
}

/// Nearest exact intersection of `shape` with the terminal shape of `path`
fn confirm<S: RenderScene + ?Sized>(scene: &S, shape: &PickShape, path: &ScenePath) -> Option<Exact> {
    let mesh = scene.mesh(path.terminal()?)?;
    let m = path.local_to_world();
    let origin = shape.origin();

    if let PickShape::Point(p) = shape {
        return point_inside(mesh, &m, *p).then(|| Exact {
            distance: 0.0,
            point: Some(*p),
            normal: None,
            tex_coord: None,
        });
    }

    let mut best: Option<Exact> = None;
    for i in 0..mesh.triangle_count() {
        let Some(tri) = mesh.world_triangle(i, &m) else {
            continue;
        };
        let found = match shape {
            PickShape::Ray(ray) => ray_triangle(ray, tri).map(|h| Exact::surface(mesh, i, &m, &h, h.t)),
            PickShape::Segment(seg) => {
                segment_triangle(seg, tri).map(|h| Exact::surface(mesh, i, &m, &h, h.t * seg.length()))
            }
            PickShape::Sphere { center, radius } => {
                sphere_triangle(*center, *radius, tri).map(|p| Exact::volume(p, tri, origin))
            }
            PickShape::Box(b) => triangle_box(tri, b).map(|p| Exact::volume(p, tri, origin)),
            PickShape::Cone { axis, angle } => {
                triangle_cone(tri, axis, *angle).map(|p| Exact::volume(p, tri, origin))
            }
            PickShape::Cylinder { axis, radius } => {
                triangle_cylinder(tri, axis, *radius).map(|p| Exact::volume(p, tri, origin))
            }
            PickShape::Frustum(f) => triangle_frustum(tri, f).map(|p| Exact::volume(p, tri, origin)),
            PickShape::Point(_) => None,
        };
        if let Some(exact) = found {
            if best.map_or(true, |b| exact.distance < b.distance) {
                best = Some(exact);
            }
        }
    }
    best
}

/// Deepest object on the path that renders a VRML node
fn mapped_node<S: RenderScene + ?Sized>(scene: &S, path: &ScenePath) -> Option<(ObjectId, NodeHandle)> {
    path.leaf_to_root().find_map(|(_, object)| {
        scene
            .object_data(object)
            .and_then(|data| data.node)
            .map(|node| (object, node))
    })
}

// =============================================================================
// PickEngine
// =============================================================================

/// Closest surface under a pointer, with the path that leads to it
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceHit {
    pub path: ScenePath,
    pub distance: f32,
    /// World-space intersection
    pub point: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}


/// Runs picks and owns the pooled request and result buffers.
#[derive(Debug)]
pub struct PickEngine {
    request: PickRequest,
    results: PickResults,
}

impl Default for PickEngine {
    fn default() -> Self {
        Self::new(50)
    }
}

impl PickEngine {
    /// Engine whose result buffer grows by `increment` hits at a time
    pub fn new(increment: usize) -> Self {
        Self {
            request: PickRequest::new(PickShape::Point(Vec3::ZERO)),
            results: PickResults::with_increment(increment),
        }
    }

    /// Results of the last pick
    pub fn results(&self) -> &PickResults {
        &self.results
    }

    /// Pick `geometry` against each target subtree.
    ///
    /// Any stops searching at the first recorded hit. Closest keeps the
    /// nearest hit over all targets; All and AllSorted keep every hit.
    pub fn pick<S: RenderScene + ?Sized>(
        &mut self,
        scene: &S,
        targets: &[ObjectId],
        geometry: &PickGeometry,
        mode: IntersectMode,
        sort: PickSort,
        mask: u32,
    ) -> &PickResults {
        self.results.clear();
        // Exact tests can reorder candidates, so geometry mode asks for all.
        let scene_sort = match mode {
            IntersectMode::Bounds => sort,
            IntersectMode::Geometry => PickSort::AllSorted,
        };
        'targets: for target in targets {
            for index in 0..geometry.pick_count() {
                let Some(shape) = geometry.shape(index) else {
                    continue;
                };
                self.request.reset(shape, scene_sort, mask);
                if scene.pick(*target, &mut self.request) == 0 {
                    continue;
                }
                for hit in self.request.hits() {
                    let exact = match mode {
                        IntersectMode::Bounds => Some(Exact::bounds(hit.distance)),
                        IntersectMode::Geometry => confirm(scene, &shape, &hit.path),
                    };
                    let Some(exact) = exact else {
                        continue;
                    };
                    let Some((object, node)) = mapped_node(scene, &hit.path) else {
                        continue;
                    };
                    self.results.push(PickHit {
                        node,
                        object,
                        distance: exact.distance,
                        point: exact.point,
                        normal: exact.normal,
                        tex_coord: exact.tex_coord,
                    });
                    if sort == PickSort::Any {
                        break 'targets;
                    }
                }
            }
        }
        match sort {
            PickSort::Any | PickSort::Closest => self.results.keep_nearest(),
            PickSort::AllSorted => self.results.sort_by_distance(),
            PickSort::All => {}
        }
        tracing::trace!(hits = self.results.len(), ?mode, ?sort, "pick complete");
        &self.results
    }

    /// Single shape below one root, the pointer pick
    pub fn pick_shape<S: RenderScene + ?Sized>(
        &mut self,
        scene: &S,
        root: ObjectId,
        shape: PickShape,
        mode: IntersectMode,
        sort: PickSort,
    ) -> &PickResults {
        let geometry = PickGeometry::Volume(shape);
        self.pick(scene, &[root], &geometry, mode, sort, ALL_MASK)
    }

    /// Nearest exact surface hit of `shape` below `root`, keeping the full
    /// scene path. Unlike [`Self::pick`] the hit shape needs no VRML node.
    pub fn nearest_surface<S: RenderScene + ?Sized>(
        &mut self,
        scene: &S,
        root: ObjectId,
        shape: PickShape,
    ) -> Option<SurfaceHit> {
        self.request.reset(shape, PickSort::AllSorted, ALL_MASK);
        if scene.pick(root, &mut self.request) == 0 {
            return None;
        }
        let mut best: Option<SurfaceHit> = None;
        for hit in self.request.hits() {
            let Some(exact) = confirm(scene, &shape, &hit.path) else {
                continue;
            };
            if best.as_ref().is_some_and(|b| b.distance <= exact.distance) {
                continue;
            }
            best = Some(SurfaceHit {
                path: hit.path.clone(),
                distance: exact.distance,
                point: exact.point.unwrap_or_else(|| shape.origin()),
                normal: exact.normal.unwrap_or(Vec3::ZERO),
                tex_coord: exact.tex_coord.map_or(Vec2::ZERO, |t| Vec2::new(t.x, t.y)),
            });
        }
        best
    }

    /// Last bounds-level request, for inspecting the paths behind the
    /// current results
    pub fn last_request(&self) -> &PickRequest {
        &self.request
    }
}
