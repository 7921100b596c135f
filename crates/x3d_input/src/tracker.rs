//! Pointing-device sensor activation.
//!
//! Each pointing sensor is in one of three states: not over, over, or
//! dragging. The tracker is fed the pointer's scene hit every frame and
//! turns state changes into sensor field outputs and listener callbacks.
//! Anchors take part like sensors; their link fires on release only while
//! the pointer is still over the anchor that was pressed.

use crate::render::{ObjectId, RenderScene, ScenePath};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use x3d_core::{Mat4, Mat4Ext, Ray, Vec2, Vec3};
use x3d_nodes::{FieldValue, ListenerError, ListenerId, ListenerList, NodeCategory, NodeHandle, NodeKind, SceneGraph};

type ListenerResult = Result<(), ListenerError>;

/// Where the pointer meets the scene
#[derive(Clone, Debug, PartialEq)]
pub struct PointerHit {
    pub path: ScenePath,
    /// World-space intersection
    pub point: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

/// Observes pointing-device sensor status
pub trait SensorStatusListener {
    fn device_over(&mut self, sensor: NodeHandle, kind: NodeKind, description: &str) -> ListenerResult;
    fn device_not_over(&mut self, sensor: NodeHandle) -> ListenerResult;
    fn device_activated(&mut self, sensor: NodeHandle, active: bool) -> ListenerResult;
    fn link_activated(&mut self, anchor: NodeHandle, urls: &[String], parameters: &[String]) -> ListenerResult;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorState {
    NotOver,
    Over,
    Dragging,
}

#[derive(Clone, Copy, Debug)]
struct PlaneDrag {
    sensor: NodeHandle,
    /// Local hit point at drag start
    start: Vec3,
    offset: Vec3,
    translation: Vec3,
}

#[derive(Clone, Debug)]
struct Press {
    sensors: SmallVec<[NodeHandle; 2]>,
    /// Inverse of the sensor group's local-to-world, captured at press
    world_to_local: Mat4,
    planes: SmallVec<[PlaneDrag; 1]>,
    anchor: Option<NodeHandle>,
}

/// Tracks which pointing sensors the pointer is over and which it drags
pub struct SensorActivationTracker {
    /// Sensors over last frame
    active: FxHashSet<NodeHandle>,
    /// Sensors over this frame, swapped with `active` at frame end
    next: FxHashSet<NodeHandle>,
    over_object: Option<ObjectId>,
    /// Local-to-world of the group holding the over sensors
    over_to_world: Mat4,
    press: Option<Press>,
    listeners: ListenerList<dyn SensorStatusListener>,
}

impl std::fmt::Debug for SensorActivationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorActivationTracker")
            .field("over", &self.active.len())
            .field("dragging", &self.press.is_some())
            .finish()
    }
}

impl Default for SensorActivationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorActivationTracker {
    pub fn new() -> Self {
        Self {
            active: FxHashSet::default(),
            next: FxHashSet::default(),
            over_object: None,
            over_to_world: Mat4::IDENTITY,
            press: None,
            listeners: ListenerList::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn SensorStatusListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn state(&self, sensor: NodeHandle) -> SensorState {
        if self.press.as_ref().is_some_and(|p| p.sensors.contains(&sensor)) {
            SensorState::Dragging
        } else if self.active.contains(&sensor) {
            SensorState::Over
        } else {
            SensorState::NotOver
        }
    }

    /// Any sensor under the pointer
    pub fn is_over_sensor(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn is_dragging(&self) -> bool {
        self.press.is_some()
    }

    /// Object carrying the sensor under the pointer
    pub fn over_object(&self) -> Option<ObjectId> {
        self.over_object
    }

    /// Recompute what the pointer is over. Returns true if it is over a
    /// sensor.
    pub fn update_over<S: RenderScene + ?Sized>(
        &mut self,
        graph: &mut SceneGraph,
        scene: &S,
        hit: Option<&PointerHit>,
    ) -> bool {
        self.next.clear();
        self.over_object = None;
        if let Some(hit) = hit {
            if let Some((step, object, sensor)) = first_sensor(graph, scene, &hit.path) {
                self.next.insert(sensor);
                self.over_object = Some(object);
                self.over_to_world = hit.path.transform_at(step);
            }
        }

        let exited: SmallVec<[NodeHandle; 2]> = self.active.difference(&self.next).copied().collect();
        for sensor in exited {
            emit_if_present(graph, sensor, "isOver", FieldValue::Bool(false));
            tracing::debug!(?sensor, "pointer left sensor");
            self.listeners
                .notify("device_not_over", |l| l.device_not_over(sensor));
        }

        let entered: SmallVec<[NodeHandle; 2]> = self.next.difference(&self.active).copied().collect();
        for sensor in entered {
            emit_if_present(graph, sensor, "isOver", FieldValue::Bool(true));
            let kind = graph.node_kind(sensor).unwrap_or(NodeKind::TouchSensor);
            let description = graph.get_str(sensor, "description").unwrap_or("").to_string();
            tracing::debug!(?sensor, kind = kind.name(), "pointer over sensor");
            self.listeners
                .notify("device_over", |l| l.device_over(sensor, kind, &description));
        }

        if let Some(hit) = hit {
            let world_to_local = self.over_to_world.inverse();
            let touch: SmallVec<[NodeHandle; 2]> = self
                .next
                .iter()
                .copied()
                .filter(|s| graph.node_kind(*s) == Some(NodeKind::TouchSensor))
                .collect();
            for sensor in touch {
                write_touch_hit(graph, sensor, &world_to_local, hit);
            }
        }

        std::mem::swap(&mut self.active, &mut self.next);
        self.next.clear();
        !self.active.is_empty()
    }

    /// Pointer button pressed. Returns true if a sensor took the press.
    pub fn press(&mut self, graph: &mut SceneGraph, hit: Option<&PointerHit>) -> bool {
        if self.active.is_empty() {
            return false;
        }
        let world_to_local = self.over_to_world.inverse();
        let mut press = Press {
            sensors: self.active.iter().copied().collect(),
            world_to_local,
            planes: SmallVec::new(),
            anchor: None,
        };
        for sensor in press.sensors.clone() {
            match graph.node_kind(sensor) {
                Some(NodeKind::Anchor) => press.anchor = Some(sensor),
                Some(NodeKind::PlaneSensor) => {
                    let start = hit.map_or(Vec3::ZERO, |h| world_to_local.transform_point(h.point));
                    let offset = graph.get_vec3(sensor, "offset").unwrap_or(Vec3::ZERO);
                    emit_if_present(graph, sensor, "isActive", FieldValue::Bool(true));
                    emit_if_present(graph, sensor, "trackPoint_changed", FieldValue::vec3(start));
                    press.planes.push(PlaneDrag {
                        sensor,
                        start,
                        offset,
                        translation: offset,
                    });
                }
                Some(_) => emit_if_present(graph, sensor, "isActive", FieldValue::Bool(true)),
                None => continue,
            }
            tracing::debug!(?sensor, "sensor activated");
            self.listeners
                .notify("device_activated", |l| l.device_activated(sensor, true));
        }
        self.press = Some(press);
        true
    }

    /// Pointer moved with the button held. Returns true while a drag is in
    /// progress.
    pub fn drag(&mut self, graph: &mut SceneGraph, pointer: &Ray) -> bool {
        let Some(press) = self.press.as_mut() else {
            return false;
        };
        let origin = press.world_to_local.transform_point(pointer.origin);
        let direction = press.world_to_local.transform_vector(pointer.direction);
        for plane in press.planes.iter_mut() {
            // Drag plane is z = start.z in the sensor's local space
            if direction.z.abs() < 1e-6 {
                continue;
            }
            let t = (plane.start.z - origin.z) / direction.z;
            if t < 0.0 {
                continue;
            }
            let track = origin + direction * t;
            let mut translation = plane.offset + (track - plane.start);
            translation.z = plane.offset.z;
            clamp_to_range(graph, plane.sensor, &mut translation);
            plane.translation = translation;
            emit_if_present(graph, plane.sensor, "trackPoint_changed", FieldValue::vec3(track));
            emit_if_present(graph, plane.sensor, "translation_changed", FieldValue::vec3(translation));
        }
        true
    }

    /// Pointer button released. Call after [`Self::update_over`] for the
    /// release position. Returns true if a press was in progress.
    pub fn release(&mut self, graph: &mut SceneGraph, time: f64, hit: Option<&PointerHit>) -> bool {
        let Some(press) = self.press.take() else {
            return false;
        };
        for sensor in &press.sensors {
            let sensor = *sensor;
            let still_over = self.active.contains(&sensor);
            match graph.node_kind(sensor) {
                Some(NodeKind::TouchSensor) => {
                    emit_if_present(graph, sensor, "isActive", FieldValue::Bool(false));
                    if still_over {
                        emit_if_present(graph, sensor, "touchTime", FieldValue::Double(time));
                    }
                }
                Some(NodeKind::PlaneSensor) => {
                    if let Some(hit) = hit {
                        let local = press.world_to_local.transform_point(hit.point);
                        emit_if_present(graph, sensor, "trackPoint_changed", FieldValue::vec3(local));
                    }
                    emit_if_present(graph, sensor, "isActive", FieldValue::Bool(false));
                    let auto_offset = graph.get_bool(sensor, "autoOffset").unwrap_or(true);
                    if let (true, Some(plane)) = (auto_offset, press.planes.iter().find(|p| p.sensor == sensor)) {
                        emit_if_present(graph, sensor, "offset", FieldValue::vec3(plane.translation));
                    }
                }
                Some(_) => emit_if_present(graph, sensor, "isActive", FieldValue::Bool(false)),
                None => continue,
            }
            tracing::debug!(?sensor, still_over, "sensor released");
            self.listeners
                .notify("device_activated", |l| l.device_activated(sensor, false));
        }
        if let Some(anchor) = press.anchor.filter(|a| self.active.contains(a)) {
            let urls = graph.get_strings(anchor, "url").map(<[String]>::to_vec).unwrap_or_default();
            let params = graph
                .get_strings(anchor, "parameter")
                .map(<[String]>::to_vec)
                .unwrap_or_default();
            tracing::debug!(?anchor, ?urls, "link activated");
            self.listeners
                .notify("link_activated", |l| l.link_activated(anchor, &urls, &params));
        }
        true
    }

    /// Forget all state without emitting anything
    pub fn clear(&mut self) {
        self.active.clear();
        self.next.clear();
        self.over_object = None;
        self.press = None;
    }
}

/// First enabled pointing sensor walking the path leaf to root, with the
/// step that holds it
fn first_sensor<S: RenderScene + ?Sized>(
    graph: &SceneGraph,
    scene: &S,
    path: &ScenePath,
) -> Option<(usize, ObjectId, NodeHandle)> {
    for (step, object) in path.leaf_to_root() {
        let Some(data) = scene.object_data(object) else {
            continue;
        };
        let anchor = data
            .node
            .filter(|n| graph.node_kind(*n) == Some(NodeKind::Anchor));
        let found = data
            .sensors
            .iter()
            .copied()
            .chain(anchor)
            .find(|s| is_enabled_pointing_sensor(graph, *s));
        if let Some(sensor) = found {
            return Some((step, object, sensor));
        }
    }
    None
}

fn is_enabled_pointing_sensor(graph: &SceneGraph, sensor: NodeHandle) -> bool {
    graph
        .node_kind(sensor)
        .is_some_and(|k| k.has_category(NodeCategory::PointingSensor))
        && graph.get_bool(sensor, "enabled").unwrap_or(true)
}

fn write_touch_hit(graph: &mut SceneGraph, sensor: NodeHandle, world_to_local: &Mat4, hit: &PointerHit) {
    let point = world_to_local.transform_point(hit.point);
    let normal = world_to_local
        .inverse()
        .transpose()
        .transform_vector(hit.normal)
        .normalize();
    emit_if_present(graph, sensor, "hitPoint_changed", FieldValue::vec3(point));
    emit_if_present(graph, sensor, "hitNormal_changed", FieldValue::vec3(normal));
    emit_if_present(graph, sensor, "hitTexCoord_changed", FieldValue::vec2(hit.tex_coord));
}

/// Clamp x/y to `minPosition..maxPosition` on axes where min <= max
fn clamp_to_range(graph: &SceneGraph, sensor: NodeHandle, translation: &mut Vec3) {
    let (Some(min), Some(max)) = (
        graph.get_floats(sensor, "minPosition"),
        graph.get_floats(sensor, "maxPosition"),
    ) else {
        return;
    };
    if min.len() < 2 || max.len() < 2 {
        return;
    }
    if min[0] <= max[0] {
        translation.x = translation.x.clamp(min[0], max[0]);
    }
    if min[1] <= max[1] {
        translation.y = translation.y.clamp(min[1], max[1]);
    }
}

/// Write a sensor output if the sensor has that field
pub(crate) fn emit_if_present(graph: &mut SceneGraph, sensor: NodeHandle, name: &str, value: FieldValue) {
    if graph.get_field_index(sensor, name).is_none() {
        return;
    }
    if let Err(err) = graph.set_value_by_name(sensor, name, value) {
        tracing::warn!(?sensor, field = name, %err, "sensor output rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use crate::render::{ObjectData, TriangleMesh};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log(Rc<RefCell<Vec<String>>>);

    impl SensorStatusListener for Log {
        fn device_over(&mut self, _: NodeHandle, kind: NodeKind, _: &str) -> ListenerResult {
            self.0.borrow_mut().push(format!("over {}", kind.name()));
            Ok(())
        }

        fn device_not_over(&mut self, _: NodeHandle) -> ListenerResult {
            self.0.borrow_mut().push("not over".into());
            Ok(())
        }

        fn device_activated(&mut self, _: NodeHandle, active: bool) -> ListenerResult {
            self.0.borrow_mut().push(format!("active {active}"));
            Ok(())
        }

        fn link_activated(&mut self, _: NodeHandle, urls: &[String], _: &[String]) -> ListenerResult {
            self.0.borrow_mut().push(format!("link {}", urls.join(",")));
            Ok(())
        }
    }

    struct Fixture {
        graph: SceneGraph,
        scene: MemoryScene,
        /// Outer group object (with `outer` sensor) holding an inner group
        /// (with `inner` sensor) holding the shape
        path: ScenePath,
        outer: NodeHandle,
        inner: NodeHandle,
    }

    fn fixture(inner_kind: NodeKind) -> Fixture {
        let mut graph = SceneGraph::new();
        let outer = graph.create_node(NodeKind::TouchSensor);
        let inner = graph.create_node(inner_kind);
        let mut scene = MemoryScene::new();
        let root = scene.root();
        let outer_group = scene
            .add_group(root, Mat4::IDENTITY, ObjectData::default().with_sensor(outer))
            .unwrap();
        let inner_group = scene
            .add_group(
                outer_group,
                Mat4::translation(0.0, 0.0, -5.0),
                ObjectData::default().with_sensor(inner).with_transform(true),
            )
            .unwrap();
        let shape = scene
            .add_shape(inner_group, Mat4::IDENTITY, TriangleMesh::cuboid(Vec3::ONE), ObjectData::default())
            .unwrap();
        let mut path = ScenePath::new();
        path.push(root, Mat4::IDENTITY);
        path.push(outer_group, Mat4::IDENTITY);
        path.push(inner_group, Mat4::translation(0.0, 0.0, -5.0));
        path.push(shape, Mat4::translation(0.0, 0.0, -5.0));
        Fixture {
            graph,
            scene,
            path,
            outer,
            inner,
        }
    }

    fn hit_at(path: &ScenePath, point: Vec3) -> PointerHit {
        PointerHit {
            path: path.clone(),
            point,
            normal: Vec3::new(0.0, 0.0, 1.0),
            tex_coord: Vec2::new(0.5, 0.5),
        }
    }

    #[test]
    fn test_enter_exit_pairing() {
        let mut f = fixture(NodeKind::TouchSensor);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tracker = SensorActivationTracker::new();
        tracker.add_listener(Box::new(Log(log.clone())));
        let hit = hit_at(&f.path, Vec3::new(0.0, 0.0, -4.5));

        assert!(tracker.update_over(&mut f.graph, &f.scene, Some(&hit)));
        assert!(tracker.update_over(&mut f.graph, &f.scene, Some(&hit)));
        assert_eq!(f.graph.get_bool(f.inner, "isOver"), Some(true));
        let local = f.graph.get_vec3(f.inner, "hitPoint_changed").unwrap();
        assert!((local.z - 0.5).abs() < 1e-5);

        assert!(!tracker.update_over(&mut f.graph, &f.scene, None));
        assert!(!tracker.update_over(&mut f.graph, &f.scene, None));
        assert_eq!(f.graph.get_bool(f.inner, "isOver"), Some(false));
        assert_eq!(*log.borrow(), vec!["over TouchSensor", "not over"]);
    }

    #[test]
    fn test_only_lowest_sensor_fires() {
        let mut f = fixture(NodeKind::TouchSensor);
        let mut tracker = SensorActivationTracker::new();
        let hit = hit_at(&f.path, Vec3::ZERO);
        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        assert_eq!(tracker.state(f.inner), SensorState::Over);
        assert_eq!(tracker.state(f.outer), SensorState::NotOver);

        f.graph.set_value_by_name(f.inner, "enabled", false).unwrap();
        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        assert_eq!(tracker.state(f.inner), SensorState::NotOver);
        assert_eq!(tracker.state(f.outer), SensorState::Over);
        assert_eq!(f.graph.get_bool(f.inner, "isOver"), Some(false));
    }

    #[test]
    fn test_touch_time_on_release_over() {
        let mut f = fixture(NodeKind::TouchSensor);
        let mut tracker = SensorActivationTracker::new();
        let hit = hit_at(&f.path, Vec3::ZERO);
        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        assert!(tracker.press(&mut f.graph, Some(&hit)));
        assert_eq!(tracker.state(f.inner), SensorState::Dragging);
        assert_eq!(f.graph.get_bool(f.inner, "isActive"), Some(true));

        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        assert!(tracker.release(&mut f.graph, 12.5, Some(&hit)));
        assert_eq!(f.graph.get_bool(f.inner, "isActive"), Some(false));
        assert_eq!(f.graph.get_double(f.inner, "touchTime"), Some(12.5));
        assert!(!tracker.release(&mut f.graph, 13.0, None));
    }

    #[test]
    fn test_no_touch_time_when_released_elsewhere() {
        let mut f = fixture(NodeKind::TouchSensor);
        let mut tracker = SensorActivationTracker::new();
        let hit = hit_at(&f.path, Vec3::ZERO);
        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        tracker.press(&mut f.graph, Some(&hit));
        tracker.update_over(&mut f.graph, &f.scene, None);
        tracker.release(&mut f.graph, 3.0, None);
        assert_eq!(f.graph.get_double(f.inner, "touchTime"), Some(0.0));
    }

    #[test]
    fn test_press_without_sensor_falls_through() {
        let mut f = fixture(NodeKind::TouchSensor);
        let mut tracker = SensorActivationTracker::new();
        tracker.update_over(&mut f.graph, &f.scene, None);
        assert!(!tracker.press(&mut f.graph, None));
        assert!(!tracker.is_dragging());
    }

    #[test]
    fn test_plane_sensor_drag() {
        let mut f = fixture(NodeKind::PlaneSensor);
        f.graph
            .set_value_by_name(f.inner, "maxPosition", FieldValue::vec2(Vec2::new(1.0, 10.0)))
            .unwrap();
        let mut tracker = SensorActivationTracker::new();
        // Hit on the inner group's local z = 0 plane
        let hit = hit_at(&f.path, Vec3::new(0.0, 0.0, -5.0));
        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        assert!(tracker.press(&mut f.graph, Some(&hit)));

        let pointer = Ray::new(Vec3::new(3.0, 2.0, 5.0), Vec3::FORWARD);
        assert!(tracker.drag(&mut f.graph, &pointer));
        let translation = f.graph.get_vec3(f.inner, "translation_changed").unwrap();
        assert!((translation.x - 1.0).abs() < 1e-5, "x clamped to max");
        assert!((translation.y - 2.0).abs() < 1e-5);
        let track = f.graph.get_vec3(f.inner, "trackPoint_changed").unwrap();
        assert!((track.x - 3.0).abs() < 1e-5);

        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        tracker.release(&mut f.graph, 1.0, Some(&hit));
        let offset = f.graph.get_vec3(f.inner, "offset").unwrap();
        assert!((offset.x - 1.0).abs() < 1e-5);
        assert_eq!(f.graph.get_bool(f.inner, "isActive"), Some(false));
    }

    #[test]
    fn test_anchor_link_only_when_still_over() {
        let mut f = fixture(NodeKind::TouchSensor);
        let anchor = f.graph.create_node(NodeKind::Anchor);
        f.graph
            .set_value_by_name(anchor, "url", FieldValue::strings(["next.wrl"]))
            .unwrap();
        let object = f.path.objects[1];
        let data = f.scene.data_mut(object).unwrap();
        data.sensors.clear();
        data.node = Some(anchor);
        f.graph.set_value_by_name(f.inner, "enabled", false).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tracker = SensorActivationTracker::new();
        tracker.add_listener(Box::new(Log(log.clone())));
        let hit = hit_at(&f.path, Vec3::ZERO);

        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        tracker.press(&mut f.graph, Some(&hit));
        tracker.update_over(&mut f.graph, &f.scene, None);
        tracker.release(&mut f.graph, 1.0, None);
        assert!(!log.borrow().iter().any(|e| e.starts_with("link")));

        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        tracker.press(&mut f.graph, Some(&hit));
        tracker.update_over(&mut f.graph, &f.scene, Some(&hit));
        tracker.release(&mut f.graph, 2.0, Some(&hit));
        assert_eq!(log.borrow().last().map(String::as_str), Some("link next.wrl"));
    }
}
