//! In-memory render scene.
//!
//! A plain transform hierarchy with optional triangle meshes on the
//! leaves. Used by the CLI demo, tests and benches, and as the reference
//! behaviour for [`RenderScene`] implementations.

use crate::pick::PickRequest;
use crate::render::{ObjectData, ObjectId, RenderScene, ScenePath, TriangleMesh};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use x3d_core::{BoundingBox, Mat4};
use x3d_nodes::NodeHandle;

#[derive(Debug)]
struct MemoryObject {
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    local: Mat4,
    data: ObjectData,
    mesh: Option<TriangleMesh>,
}

/// Transform hierarchy with meshes, answering bounds-level picks
#[derive(Debug)]
pub struct MemoryScene {
    objects: SlotMap<ObjectId, MemoryObject>,
    root: ObjectId,
    by_node: FxHashMap<NodeHandle, ObjectId>,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScene {
    pub fn new() -> Self {
        let mut objects = SlotMap::with_key();
        let root = objects.insert(MemoryObject {
            parent: None,
            children: Vec::new(),
            local: Mat4::IDENTITY,
            data: ObjectData::default(),
            mesh: None,
        });
        Self {
            objects,
            root,
            by_node: FxHashMap::default(),
        }
    }

    fn insert(
        &mut self,
        parent: ObjectId,
        local: Mat4,
        data: ObjectData,
        mesh: Option<TriangleMesh>,
    ) -> Option<ObjectId> {
        if !self.objects.contains_key(parent) {
            tracing::warn!(?parent, "add to unknown parent object");
            return None;
        }
        let node = data.node;
        let id = self.objects.insert(MemoryObject {
            parent: Some(parent),
            children: Vec::new(),
            local,
            data,
            mesh,
        });
        if let Some(p) = self.objects.get_mut(parent) {
            p.children.push(id);
        }
        if let Some(node) = node {
            self.by_node.insert(node, id);
        }
        Some(id)
    }

    /// Add a grouping object; `None` if `parent` is gone
    pub fn add_group(&mut self, parent: ObjectId, local: Mat4, data: ObjectData) -> Option<ObjectId> {
        self.insert(parent, local, data, None)
    }

    /// Add a shape object holding `mesh`
    pub fn add_shape(
        &mut self,
        parent: ObjectId,
        local: Mat4,
        mesh: TriangleMesh,
        data: ObjectData,
    ) -> Option<ObjectId> {
        self.insert(parent, local, data, Some(mesh))
    }

    /// Remove an object and everything below it
    pub fn remove(&mut self, object: ObjectId) {
        if object == self.root {
            return;
        }
        if let Some(parent) = self.objects.get(object).and_then(|o| o.parent) {
            if let Some(p) = self.objects.get_mut(parent) {
                p.children.retain(|c| *c != object);
            }
        }
        let mut stack = vec![object];
        while let Some(id) = stack.pop() {
            if let Some(removed) = self.objects.remove(id) {
                if let Some(node) = removed.data.node {
                    self.by_node.remove(&node);
                }
                stack.extend(removed.children);
            }
        }
    }

    pub fn set_local_transform(&mut self, object: ObjectId, local: Mat4) {
        if let Some(o) = self.objects.get_mut(object) {
            o.local = local;
        }
    }

    pub fn data_mut(&mut self, object: ObjectId) -> Option<&mut ObjectData> {
        self.objects.get_mut(object).map(|o| &mut o.data)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.len() <= 1
    }

    fn pick_below(&self, id: ObjectId, parent_to_world: Mat4, path: &mut ScenePath, request: &mut PickRequest) {
        let Some(object) = self.objects.get(id) else {
            return;
        };
        if !object.data.pickable || !request.accepts_mask(object.data.object_mask) {
            return;
        }
        let to_world = parent_to_world.mul(&object.local);
        path.push(id, to_world);
        if let Some(mesh) = &object.mesh {
            let bounds = mesh.bounds().transformed(&to_world);
            if request.shape.intersects_bounds(&bounds) {
                let distance = request.shape.bounds_distance(&bounds);
                request.push(path.clone(), distance);
            }
        }
        for child in &object.children {
            self.pick_below(*child, to_world, path, request);
        }
        path.pop();
    }
}

impl RenderScene for MemoryScene {
    fn root(&self) -> ObjectId {
        self.root
    }

    fn pick(&self, root: ObjectId, request: &mut PickRequest) -> usize {
        let parent_to_world = self
            .objects
            .get(root)
            .and_then(|o| o.parent)
            .map_or(Mat4::IDENTITY, |p| self.local_to_world(p));
        let mut path = ScenePath::new();
        self.pick_below(root, parent_to_world, &mut path, request);
        request.finish()
    }

    fn object_data(&self, object: ObjectId) -> Option<&ObjectData> {
        self.objects.get(object).map(|o| &o.data)
    }

    fn object_for_node(&self, node: NodeHandle) -> Option<ObjectId> {
        self.by_node.get(&node).copied()
    }

    fn local_to_world(&self, object: ObjectId) -> Mat4 {
        let mut m = Mat4::IDENTITY;
        let mut current = Some(object);
        while let Some(id) = current {
            let Some(o) = self.objects.get(id) else {
                break;
            };
            m = o.local.mul(&m);
            current = o.parent;
        }
        m
    }

    fn world_bounds(&self, object: ObjectId) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        let mut stack = vec![object];
        while let Some(id) = stack.pop() {
            let Some(o) = self.objects.get(id) else {
                continue;
            };
            if let Some(mesh) = &o.mesh {
                bounds.merge(&mesh.bounds().transformed(&self.local_to_world(id)));
            }
            stack.extend(o.children.iter().copied());
        }
        bounds
    }

    fn mesh(&self, object: ObjectId) -> Option<&TriangleMesh> {
        self.objects.get(object).and_then(|o| o.mesh.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pick::{PickShape, PickSort, ALL_MASK};
    use x3d_core::{Ray, Vec3};

    fn row_of_boxes() -> (MemoryScene, Vec<ObjectId>) {
        let mut scene = MemoryScene::new();
        let root = scene.root();
        let ids = [-4.0, -8.0, -2.0]
            .iter()
            .map(|z| {
                scene
                    .add_shape(
                        root,
                        Mat4::translation(0.0, 0.0, *z),
                        TriangleMesh::cuboid(Vec3::ONE),
                        ObjectData::default(),
                    )
                    .unwrap()
            })
            .collect();
        (scene, ids)
    }

    #[test]
    fn test_ray_pick_sorted() {
        let (scene, ids) = row_of_boxes();
        let ray = PickShape::Ray(Ray::new(Vec3::ZERO, Vec3::FORWARD));
        let mut req = PickRequest::new(ray).with_sort(PickSort::AllSorted);
        assert_eq!(scene.pick(scene.root(), &mut req), 3);
        let order: Vec<_> = req.hits().iter().map(|h| h.path.terminal().unwrap()).collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
        assert_eq!(req.hits()[0].path.objects[0], scene.root());
    }

    #[test]
    fn test_mask_and_pickable_filter() {
        let (mut scene, ids) = row_of_boxes();
        scene.data_mut(ids[2]).unwrap().object_mask = 0b10;
        scene.data_mut(ids[0]).unwrap().pickable = false;
        let ray = PickShape::Ray(Ray::new(Vec3::ZERO, Vec3::FORWARD));
        let mut req = PickRequest::new(ray).with_sort(PickSort::Closest).with_mask(0b01);
        assert_eq!(scene.pick(scene.root(), &mut req), 1);
        assert_eq!(req.hits()[0].path.terminal(), Some(ids[1]));

        req.reset(ray, PickSort::Closest, ALL_MASK);
        scene.pick(scene.root(), &mut req);
        assert_eq!(req.hits()[0].path.terminal(), Some(ids[2]));
    }

    #[test]
    fn test_nested_transforms_and_remove() {
        let mut scene = MemoryScene::new();
        let root = scene.root();
        let group = scene
            .add_group(root, Mat4::translation(10.0, 0.0, 0.0), ObjectData::default())
            .unwrap();
        let shape = scene
            .add_shape(group, Mat4::scale(2.0, 2.0, 2.0), TriangleMesh::cuboid(Vec3::ONE), ObjectData::default())
            .unwrap();
        let bounds = scene.world_bounds(root);
        assert!((bounds.min.x - 9.0).abs() < 1e-5);
        assert!((bounds.max.x - 11.0).abs() < 1e-5);

        let mut req = PickRequest::new(PickShape::Point(Vec3::new(10.5, 0.0, 0.0)));
        assert_eq!(scene.pick(group, &mut req), 1);
        assert_eq!(req.hits()[0].path.objects.as_slice(), &[group, shape]);

        scene.remove(group);
        assert_eq!(scene.len(), 1);
        assert!(scene.world_bounds(root).is_empty());
    }
}
