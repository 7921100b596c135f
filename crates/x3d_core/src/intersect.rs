//! Ray, segment and primitive intersection tests
//!
//! These are the exact tests used once a bounds-level pick has produced a
//! candidate. Triangles are treated as two-sided.

use crate::bounds::BoundingBox;
use crate::frustum::Frustum;
use crate::vector::{Vec2, Vec3};

const EPSILON: f32 = 1e-7;

/// Ray for raycasting
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Create a ray from two points
    pub fn from_points(from: Vec3, to: Vec3) -> Self {
        let dir = to - from;
        let direction = if dir.length() > 0.0001 {
            dir.normalize()
        } else {
            Vec3::FORWARD
        };
        Self {
            origin: from,
            direction,
        }
    }

    /// Get point along ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Finite line segment
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: Vec3,
    pub end: Vec3,
}

impl Segment {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    /// Unnormalised direction, `end - start`
    pub fn delta(&self) -> Vec3 {
        self.end - self.start
    }

    pub fn length(&self) -> f32 {
        self.delta().length()
    }

    /// Point at parameter `t` in `[0, 1]`
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.start + self.delta() * t
    }

    /// Closest point on the segment to `p`, with its parameter
    pub fn closest_point(&self, p: Vec3) -> (f32, Vec3) {
        let d = self.delta();
        let len_sq = d.length_squared();
        if len_sq < EPSILON {
            return (0.0, self.start);
        }
        let t = ((p - self.start).dot(d) / len_sq).clamp(0.0, 1.0);
        (t, self.point_at(t))
    }

    pub fn distance_squared_to(&self, p: Vec3) -> f32 {
        self.closest_point(p).1.distance_squared(p)
    }
}

/// Exact hit on a triangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit {
    /// Parameter along the query direction
    pub t: f32,
    /// Barycentric weight of the second vertex
    pub u: f32,
    /// Barycentric weight of the third vertex
    pub v: f32,
    /// World or local position of the hit, in the triangle's space
    pub point: Vec3,
    /// Unit face normal using the vertex winding
    pub normal: Vec3,
}

impl TriangleHit {
    /// Interpolate a per-vertex attribute with the hit's barycentrics
    pub fn interpolate2(&self, a: Vec2, b: Vec2, c: Vec2) -> Vec2 {
        let w = 1.0 - self.u - self.v;
        Vec2::new(
            a.x * w + b.x * self.u + c.x * self.v,
            a.y * w + b.y * self.u + c.y * self.v,
        )
    }
}

/// Möller–Trumbore line/triangle test. `t` is in units of `dir`; no range
/// restriction is applied here.
fn line_triangle(origin: Vec3, dir: Vec3, tri: [Vec3; 3]) -> Option<TriangleHit> {
    let [a, b, c] = tri;
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    Some(TriangleHit {
        t,
        u,
        v,
        point: origin + dir * t,
        normal: e1.cross(e2).normalize(),
    })
}

/// Ray against a triangle, hits behind the origin are rejected
pub fn ray_triangle(ray: &Ray, tri: [Vec3; 3]) -> Option<TriangleHit> {
    line_triangle(ray.origin, ray.direction, tri).filter(|hit| hit.t >= 0.0)
}

/// Segment against a triangle, `t` of the hit is in `[0, 1]`
pub fn segment_triangle(seg: &Segment, tri: [Vec3; 3]) -> Option<TriangleHit> {
    line_triangle(seg.start, seg.delta(), tri).filter(|hit| (0.0..=1.0).contains(&hit.t))
}

/// Closest point on a triangle to `p`
pub fn closest_point_on_triangle(p: Vec3, tri: [Vec3; 3]) -> Vec3 {
    let [a, b, c] = tri;
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Sphere against triangle; the hit point is the closest point on the triangle
pub fn sphere_triangle(center: Vec3, radius: f32, tri: [Vec3; 3]) -> Option<Vec3> {
    let closest = closest_point_on_triangle(center, tri);
    (closest.distance_squared(center) <= radius * radius).then_some(closest)
}

/// Does the segment pass within `radius` of `center`
pub fn segment_sphere(seg: &Segment, center: Vec3, radius: f32) -> bool {
    seg.distance_squared_to(center) <= radius * radius
}

/// Is `p` inside the capped cylinder around `axis`
pub fn point_in_cylinder(p: Vec3, axis: &Segment, radius: f32) -> bool {
    let d = axis.delta();
    let len_sq = d.length_squared();
    if len_sq < EPSILON {
        return false;
    }
    let t = (p - axis.start).dot(d) / len_sq;
    if !(0.0..=1.0).contains(&t) {
        return false;
    }
    axis.point_at(t).distance_squared(p) <= radius * radius
}

/// Is `p` inside the cone with its apex at `axis.start`, opening towards
/// `axis.end` with half-angle `angle`
pub fn point_in_cone(p: Vec3, axis: &Segment, angle: f32) -> bool {
    let d = axis.delta();
    let len = d.length();
    if len < EPSILON {
        return false;
    }
    let dir = d * (1.0 / len);
    let along = (p - axis.start).dot(dir);
    if along < 0.0 || along > len {
        return false;
    }
    let radial = (p - axis.start - dir * along).length();
    radial <= along * angle.tan()
}

/// Approximate capped cylinder against box: the axis against the box grown
/// by the radius
pub fn cylinder_box(axis: &Segment, radius: f32, bbox: &BoundingBox) -> bool {
    bbox.inflated(radius)
        .intersects_segment(axis.start, axis.end)
}

/// Approximate cone against box, using the cone's base radius as the
/// inflation
pub fn cone_box(axis: &Segment, angle: f32, bbox: &BoundingBox) -> bool {
    let base_radius = axis.length() * angle.tan().abs();
    bbox.inflated(base_radius)
        .intersects_segment(axis.start, axis.end)
}

/// Cut a convex polygon down to the part where `side(p) >= 0`
fn clip_polygon(poly: &[Vec3], side: impl Fn(Vec3) -> f32) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(poly.len() + 1);
    for (i, &a) in poly.iter().enumerate() {
        let b = poly[(i + 1) % poly.len()];
        let (da, db) = (side(a), side(b));
        if da >= 0.0 {
            out.push(a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            out.push(a + (b - a) * (da / (da - db)));
        }
    }
    out
}

fn centroid(poly: &[Vec3]) -> Option<Vec3> {
    if poly.is_empty() {
        return None;
    }
    let sum = poly.iter().fold(Vec3::ZERO, |acc, &p| acc + p);
    Some(sum * (1.0 / poly.len() as f32))
}

/// Separating-axis overlap of a triangle and a box
pub fn triangle_box_overlap(tri: [Vec3; 3], bbox: &BoundingBox) -> bool {
    if bbox.is_empty() {
        return false;
    }
    let c = bbox.center();
    let h = bbox.size() * 0.5;
    let v = [tri[0] - c, tri[1] - c, tri[2] - c];
    let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];
    let separated = |axis: Vec3| {
        if axis.length_squared() < EPSILON {
            return false;
        }
        let (p0, p1, p2) = (axis.dot(v[0]), axis.dot(v[1]), axis.dot(v[2]));
        let r = h.x * axis.x.abs() + h.y * axis.y.abs() + h.z * axis.z.abs();
        p0.min(p1).min(p2) > r || p0.max(p1).max(p2) < -r
    };
    let box_axes = [Vec3::X, Vec3::UP, Vec3::new(0.0, 0.0, 1.0)];
    for a in box_axes {
        if separated(a) || edges.iter().any(|e| separated(a.cross(*e))) {
            return false;
        }
    }
    !separated(edges[0].cross(edges[1]))
}

/// Triangle against a box; the contact is the centre of the part of the
/// triangle inside the box
pub fn triangle_box(tri: [Vec3; 3], bbox: &BoundingBox) -> Option<Vec3> {
    if !triangle_box_overlap(tri, bbox) {
        return None;
    }
    let (lo, hi) = (bbox.min, bbox.max);
    let mut poly = tri.to_vec();
    for axis in 0..3 {
        poly = clip_polygon(&poly, |p| p[axis] - lo[axis]);
        poly = clip_polygon(&poly, |p| hi[axis] - p[axis]);
    }
    centroid(&poly).or_else(|| Some(closest_point_on_triangle(bbox.center(), tri)))
}

/// Triangle against a frustum; the contact is the centre of the part of
/// the triangle inside all six planes
pub fn triangle_frustum(tri: [Vec3; 3], frustum: &Frustum) -> Option<Vec3> {
    let mut poly = tri.to_vec();
    for plane in &frustum.planes {
        poly = clip_polygon(&poly, |p| plane.signed_distance(p));
        if poly.is_empty() {
            return None;
        }
    }
    centroid(&poly)
}

/// Triangle against a solid of revolution around `axis`. The triangle is
/// cut to the slab between the end caps, each remaining edge is handed to
/// `edge_hit`, and finally the axis is tested against the face.
fn revolved_triangle(
    axis: &Segment,
    tri: [Vec3; 3],
    edge_hit: impl Fn(Vec3, Vec3) -> Option<Vec3>,
) -> Option<Vec3> {
    let d = axis.delta();
    let len = d.length();
    if len < EPSILON {
        return None;
    }
    let u = d * (1.0 / len);
    let poly = clip_polygon(&tri, |p| (p - axis.start).dot(u));
    let poly = clip_polygon(&poly, |p| len - (p - axis.start).dot(u));
    if poly.is_empty() {
        return None;
    }
    for (i, &a) in poly.iter().enumerate() {
        if let Some(p) = edge_hit(a, poly[(i + 1) % poly.len()]) {
            return Some(p);
        }
    }
    segment_triangle(axis, tri).map(|hit| hit.point)
}

/// Component of `v` perpendicular to the unit direction `u`
fn radial(v: Vec3, u: Vec3) -> Vec3 {
    v - u * v.dot(u)
}

/// Triangle against the capped cylinder around `axis`
pub fn triangle_cylinder(tri: [Vec3; 3], axis: &Segment, radius: f32) -> Option<Vec3> {
    if let Some(v) = tri.iter().copied().find(|v| point_in_cylinder(*v, axis, radius)) {
        return Some(v);
    }
    let u = axis.delta() * (1.0 / axis.length().max(EPSILON));
    let r_sq = radius * radius;
    revolved_triangle(axis, tri, |a, b| {
        // Closest approach of the edge to the axis line
        let w0 = radial(a - axis.start, u);
        let wd = radial(b - a, u);
        let wd_sq = wd.length_squared();
        let t = if wd_sq < EPSILON {
            0.0
        } else {
            (-w0.dot(wd) / wd_sq).clamp(0.0, 1.0)
        };
        ((w0 + wd * t).length_squared() <= r_sq).then(|| a + (b - a) * t)
    })
}

/// Triangle against the cone with its apex at `axis.start`, opening towards
/// `axis.end` with half-angle `angle`
pub fn triangle_cone(tri: [Vec3; 3], axis: &Segment, angle: f32) -> Option<Vec3> {
    if let Some(v) = tri.iter().copied().find(|v| point_in_cone(*v, axis, angle)) {
        return Some(v);
    }
    let u = axis.delta() * (1.0 / axis.length().max(EPSILON));
    let tan_sq = angle.tan().powi(2);
    revolved_triangle(axis, tri, |a, b| {
        // inside(t) = tan² along(t)² - |radial(t)|², a quadratic along the edge
        let (v0, dv) = (a - axis.start, b - a);
        let (a0, ad) = (v0.dot(u), dv.dot(u));
        let (w0, wd) = (radial(v0, u), radial(dv, u));
        let qa = tan_sq * ad * ad - wd.length_squared();
        let qb = 2.0 * (tan_sq * a0 * ad - w0.dot(wd));
        let qc = tan_sq * a0 * a0 - w0.length_squared();
        let inside = |t: f32| qa * t * t + qb * t + qc >= 0.0 && a0 + ad * t >= 0.0;
        let mut candidates = vec![0.0, 1.0];
        if qa.abs() > EPSILON {
            let vertex = -qb / (2.0 * qa);
            if (0.0..=1.0).contains(&vertex) {
                candidates.push(vertex);
            }
        }
        candidates.into_iter().find(|t| inside(*t)).map(|t| a + dv * t)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> [Vec3; 3] {
        [
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_ray_triangle_hit() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::FORWARD);
        let hit = ray_triangle(&ray, tri()).expect("hit");
        assert!((hit.t - 5.0).abs() < 1e-5);
        assert!(hit.point.z.abs() < 1e-5);
        assert!((hit.normal.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_triangle_behind() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::FORWARD);
        assert!(ray_triangle(&ray, tri()).is_none());
    }

    #[test]
    fn test_segment_triangle_range() {
        let short = Segment::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(segment_triangle(&short, tri()).is_none());
        let long = Segment::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = segment_triangle(&long, tri()).expect("hit");
        assert!((hit.t - 5.0 / 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_closest_point_on_triangle() {
        let p = closest_point_on_triangle(Vec3::new(0.0, 0.0, 3.0), tri());
        assert!(p.distance(Vec3::ZERO) < 1e-5);
        let corner = closest_point_on_triangle(Vec3::new(-5.0, -5.0, 0.0), tri());
        assert_eq!(corner, Vec3::new(-1.0, -1.0, 0.0));
    }

    #[test]
    fn test_cone_containment() {
        let axis = Segment::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -10.0));
        let angle = std::f32::consts::FRAC_PI_4;
        assert!(point_in_cone(Vec3::new(1.0, 0.0, -5.0), &axis, angle));
        assert!(!point_in_cone(Vec3::new(6.0, 0.0, -5.0), &axis, angle));
        assert!(!point_in_cone(Vec3::new(0.0, 0.0, 1.0), &axis, angle));
    }

    #[test]
    fn test_cylinder_box() {
        let axis = Segment::new(Vec3::new(-5.0, 2.5, 0.0), Vec3::new(5.0, 2.5, 0.0));
        let bbox = BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::ONE);
        assert!(!cylinder_box(&axis, 1.0, &bbox));
        assert!(cylinder_box(&axis, 2.0, &bbox));
    }

    #[test]
    fn test_barycentric_interpolation() {
        let ray = Ray::new(Vec3::new(1.0, -1.0, 1.0), Vec3::FORWARD);
        let hit = ray_triangle(&ray, tri()).expect("hit at vertex b");
        let uv = hit.interpolate2(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.5, 1.0));
        assert!((uv.x - 1.0).abs() < 1e-4);
        assert!(uv.y.abs() < 1e-4);
    }
    /// Large triangle in the plane x = `x`, covering y <= 0.5 around z = 0
    fn wall(x: f32) -> [Vec3; 3] {
        [
            Vec3::new(x, -10.0, -10.0),
            Vec3::new(x, 0.5, -10.0),
            Vec3::new(x, 0.5, 10.0),
        ]
    }

    #[test]
    fn test_wall_through_box() {
        let bbox = BoundingBox::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::ONE);
        let tri = wall(0.9);
        assert!(tri.iter().all(|v| !bbox.contains_point(*v)));
        let p = triangle_box(tri, &bbox).expect("wall crosses the box");
        assert!(bbox.contains_point(p));
        assert!((p.x - 0.9).abs() < 1e-5);
        assert!(triangle_box(wall(1.5), &bbox).is_none());
    }

    #[test]
    fn test_triangle_box_corner_clearance() {
        // Overlaps the box on all three box axes, clear of it across its own
        // plane x + y = 2.5
        let bbox = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let tri = [
            Vec3::new(2.0, 0.5, -1.0),
            Vec3::new(0.5, 2.0, -1.0),
            Vec3::new(1.25, 1.25, 3.0),
        ];
        assert!(!triangle_box_overlap(tri, &bbox));
        let grown = BoundingBox::new(Vec3::ZERO, Vec3::new(1.5, 1.5, 1.0));
        assert!(triangle_box_overlap(tri, &grown));
    }

    #[test]
    fn test_wall_through_frustum() {
        let proj = crate::frustum::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 10.0);
        let frustum = Frustum::from_view_projection(&proj);
        let big = [
            Vec3::new(-100.0, -100.0, -5.0),
            Vec3::new(100.0, -100.0, -5.0),
            Vec3::new(0.0, 100.0, -5.0),
        ];
        assert!(big.iter().all(|v| !frustum.contains_point(*v)));
        let p = triangle_frustum(big, &frustum).expect("wall crosses the frustum");
        assert!(frustum.contains_point(p));
        assert!((p.z + 5.0).abs() < 1e-4);

        let beyond = big.map(|v| Vec3::new(v.x, v.y, -20.0));
        assert!(triangle_frustum(beyond, &frustum).is_none());
    }

    #[test]
    fn test_wall_through_cylinder() {
        let axis = Segment::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -5.0));
        let tri = wall(0.5);
        assert!(tri.iter().all(|v| !point_in_cylinder(*v, &axis, 1.0)));
        assert!(segment_triangle(&axis, tri).is_none());
        let p = triangle_cylinder(tri, &axis, 1.0).expect("wall crosses the cylinder");
        assert!((p.x - 0.5).abs() < 1e-5);
        assert!(p.y.abs() <= 1.0);
        assert!(p.z.abs() <= 5.0 + 1e-4);
        assert!(triangle_cylinder(wall(1.5), &axis, 1.0).is_none());
    }

    #[test]
    fn test_wall_through_cone() {
        let axis = Segment::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -10.0));
        let angle = std::f32::consts::FRAC_PI_4;
        // Covers z in [0, 15]; the cone radius there is at most 10
        let side = |x: f32| {
            [
                Vec3::new(x, -30.0, 0.0),
                Vec3::new(x, 30.0, 0.0),
                Vec3::new(x, 0.0, 15.0),
            ]
        };
        let tri = side(3.0);
        assert!(tri.iter().all(|v| !point_in_cone(*v, &axis, angle)));
        assert!(segment_triangle(&axis, tri).is_none());
        let p = triangle_cone(tri, &axis, angle).expect("wall crosses the cone");
        assert!(point_in_cone(p, &axis, angle + 1e-3));
        assert!(triangle_cone(side(12.0), &axis, angle).is_none());
    }
}

