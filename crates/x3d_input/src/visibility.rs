//! VisibilitySensor processing.
//!
//! Each frame the sensor regions are tested against the view frustum.
//! Sensors seen this frame but not last fire enter events, the reverse
//! fires exit events, and sensors visible in both get a view position
//! update.

use crate::error::{InputError, Result};
use crate::navigation::ViewState;
use crate::render::{RenderScene, ViewFrustum};
use crate::tracker::emit_if_present;
use indexmap::IndexSet;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use x3d_core::{BoundingBox, Frustum, Mat4, Mat4Ext, Quat, Vec3};
use x3d_nodes::{FieldValue, ListenerError, ListenerId, ListenerList, NodeHandle, NodeKind, SceneGraph};

type ListenerResult = std::result::Result<(), ListenerError>;

/// Observes VisibilitySensor state
pub trait VisibilityListener {
    fn visibility_changed(&mut self, sensor: NodeHandle, visible: bool, view: &ViewState) -> ListenerResult;

    /// Viewer moved while the sensor stayed visible
    fn view_position_changed(&mut self, sensor: NodeHandle, view: &ViewState) -> ListenerResult {
        let _ = (sensor, view);
        Ok(())
    }
}

/// Tracks which VisibilitySensor regions intersect the view frustum
pub struct VisibilityManager {
    sensors: IndexSet<NodeHandle>,
    active: FxHashSet<NodeHandle>,
    next: FxHashSet<NodeHandle>,
    inv_world_scale: f32,
    listeners: ListenerList<dyn VisibilityListener>,
}

impl std::fmt::Debug for VisibilityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityManager")
            .field("sensors", &self.sensors.len())
            .field("visible", &self.active.len())
            .finish()
    }
}

impl Default for VisibilityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityManager {
    pub fn new() -> Self {
        Self {
            sensors: IndexSet::new(),
            active: FxHashSet::default(),
            next: FxHashSet::default(),
            inv_world_scale: 1.0,
            listeners: ListenerList::new(),
        }
    }

    pub fn add_sensor(&mut self, graph: &SceneGraph, sensor: NodeHandle) -> Result<()> {
        match graph.node_kind(sensor) {
            Some(NodeKind::VisibilitySensor) => {
                self.sensors.insert(sensor);
                Ok(())
            }
            other => Err(InputError::UnsupportedNode {
                expected: "VisibilitySensor",
                found: other.map_or("unknown node", |k| k.name()),
            }),
        }
    }

    pub fn remove_sensor(&mut self, sensor: NodeHandle) -> bool {
        self.active.remove(&sensor);
        self.sensors.shift_remove(&sensor)
    }

    pub fn clear(&mut self) {
        self.sensors.clear();
        self.active.clear();
        self.next.clear();
    }

    pub fn add_listener(&mut self, listener: Box<dyn VisibilityListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn is_visible(&self, sensor: NodeHandle) -> bool {
        self.active.contains(&sensor)
    }

    pub fn set_world_scale(&mut self, scale: f32) -> Result<()> {
        if !(scale > 0.0) {
            return Err(InputError::setting("world_scale", format!("{scale} is not positive")));
        }
        self.inv_world_scale = 1.0 / scale;
        Ok(())
    }

    /// Test every sensor against the frustum of the eye at `eye_to_world`.
    /// Returns the number of visible sensors.
    pub fn process_frame<S: RenderScene + ?Sized>(
        &mut self,
        time: f64,
        graph: &mut SceneGraph,
        scene: &S,
        eye_to_world: &Mat4,
        frustum: &ViewFrustum,
    ) -> usize {
        self.sensors.retain(|s| graph.contains(*s));
        let planes = Frustum::from_view_projection(&frustum.projection().mul(&eye_to_world.inverse()));
        let view = ViewState {
            position: eye_to_world.get_translation() * self.inv_world_scale,
            orientation: Quat::from_mat4(eye_to_world).to_axis_angle(),
        };

        self.next.clear();
        for sensor in self.sensors.iter().copied() {
            if let Some(region) = sensor_region(graph, scene, sensor) {
                if planes.intersects_box(&region) {
                    self.next.insert(sensor);
                }
            }
        }

        let exited: SmallVec<[NodeHandle; 4]> = self.active.difference(&self.next).copied().collect();
        for sensor in exited {
            emit_if_present(graph, sensor, "isActive", FieldValue::Bool(false));
            emit_if_present(graph, sensor, "exitTime", FieldValue::Double(time));
            tracing::debug!(?sensor, "visibility sensor hidden");
            self.listeners
                .notify("visibility_changed", |l| l.visibility_changed(sensor, false, &view));
        }

        let mut entered: SmallVec<[NodeHandle; 4]> = SmallVec::new();
        let mut stayed: SmallVec<[NodeHandle; 4]> = SmallVec::new();
        for sensor in self.sensors.iter().copied().filter(|s| self.next.contains(s)) {
            if self.active.contains(&sensor) {
                stayed.push(sensor);
            } else {
                entered.push(sensor);
            }
        }
        for sensor in entered {
            emit_if_present(graph, sensor, "enterTime", FieldValue::Double(time));
            emit_if_present(graph, sensor, "isActive", FieldValue::Bool(true));
            tracing::debug!(?sensor, "visibility sensor visible");
            self.listeners
                .notify("visibility_changed", |l| l.visibility_changed(sensor, true, &view));
        }
        for sensor in stayed {
            self.listeners
                .notify("view_position_changed", |l| l.view_position_changed(sensor, &view));
        }

        std::mem::swap(&mut self.active, &mut self.next);
        self.next.clear();
        self.active.len()
    }
}

/// World-space box of an enabled sensor with a non-zero size that the
/// renderer has placed
pub(crate) fn sensor_region<S: RenderScene + ?Sized>(
    graph: &SceneGraph,
    scene: &S,
    sensor: NodeHandle,
) -> Option<BoundingBox> {
    let (center, size, to_world) = sensor_placement(graph, scene, sensor)?;
    Some(BoundingBox::from_center_size(center, size).transformed(&to_world))
}

/// Centre, size and local-to-world of an enabled, placed region sensor
pub(crate) fn sensor_placement<S: RenderScene + ?Sized>(
    graph: &SceneGraph,
    scene: &S,
    sensor: NodeHandle,
) -> Option<(Vec3, Vec3, Mat4)> {
    if !graph.get_bool(sensor, "enabled").unwrap_or(false) {
        return None;
    }
    let size = graph.get_vec3(sensor, "size")?;
    if size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
        return None;
    }
    let center = graph.get_vec3(sensor, "center").unwrap_or(Vec3::ZERO);
    let Some(object) = scene.object_for_node(sensor) else {
        tracing::trace!(?sensor, "region sensor not placed in the scene");
        return None;
    };
    Some((center, size, scene.local_to_world(object)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use crate::render::ObjectData;
    use std::cell::RefCell;
    use std::f32::consts::PI;
    use std::rc::Rc;

    struct Log(Rc<RefCell<Vec<String>>>);

    impl VisibilityListener for Log {
        fn visibility_changed(&mut self, _: NodeHandle, visible: bool, _: &ViewState) -> ListenerResult {
            self.0.borrow_mut().push(if visible { "visible" } else { "hidden" }.into());
            Ok(())
        }

        fn view_position_changed(&mut self, _: NodeHandle, _: &ViewState) -> ListenerResult {
            self.0.borrow_mut().push("moved".into());
            Ok(())
        }
    }

    fn placed_sensor(graph: &mut SceneGraph, scene: &mut MemoryScene, at: Vec3, size: Vec3) -> NodeHandle {
        let sensor = graph.create_node(NodeKind::VisibilitySensor);
        graph.set_value_by_name(sensor, "size", FieldValue::vec3(size)).unwrap();
        let root = scene.root();
        scene
            .add_group(root, Mat4::translation(at.x, at.y, at.z), ObjectData::for_node(sensor))
            .unwrap();
        sensor
    }

    #[test]
    fn test_enter_stay_exit() {
        let mut graph = SceneGraph::new();
        let mut scene = MemoryScene::new();
        let sensor = placed_sensor(&mut graph, &mut scene, Vec3::new(0.0, 0.0, -10.0), Vec3::new(2.0, 2.0, 2.0));
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = VisibilityManager::new();
        manager.add_listener(Box::new(Log(log.clone())));
        manager.add_sensor(&graph, sensor).unwrap();
        let frustum = ViewFrustum::default();

        assert_eq!(manager.process_frame(1.0, &mut graph, &scene, &Mat4::IDENTITY, &frustum), 1);
        assert_eq!(manager.process_frame(2.0, &mut graph, &scene, &Mat4::IDENTITY, &frustum), 1);
        assert_eq!(graph.get_bool(sensor, "isActive"), Some(true));
        assert_eq!(graph.get_double(sensor, "enterTime"), Some(1.0));

        let behind = Mat4::rotation_y(PI);
        assert_eq!(manager.process_frame(3.0, &mut graph, &scene, &behind, &frustum), 0);
        assert_eq!(graph.get_bool(sensor, "isActive"), Some(false));
        assert_eq!(graph.get_double(sensor, "exitTime"), Some(3.0));
        assert_eq!(*log.borrow(), vec!["visible", "moved", "hidden"]);
    }

    #[test]
    fn test_zero_size_and_disabled_are_ignored() {
        let mut graph = SceneGraph::new();
        let mut scene = MemoryScene::new();
        let empty = placed_sensor(&mut graph, &mut scene, Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);
        let off = placed_sensor(&mut graph, &mut scene, Vec3::new(0.0, 0.0, -5.0), Vec3::ONE);
        graph.set_value_by_name(off, "enabled", false).unwrap();
        let mut manager = VisibilityManager::new();
        manager.add_sensor(&graph, empty).unwrap();
        manager.add_sensor(&graph, off).unwrap();
        let frustum = ViewFrustum::default();
        assert_eq!(manager.process_frame(0.0, &mut graph, &scene, &Mat4::IDENTITY, &frustum), 0);
        assert!(!manager.is_visible(off));
    }

    #[test]
    fn test_rejects_other_kinds() {
        let mut graph = SceneGraph::new();
        let touch = graph.create_node(NodeKind::TouchSensor);
        let mut manager = VisibilityManager::new();
        assert!(matches!(
            manager.add_sensor(&graph, touch),
            Err(InputError::UnsupportedNode { .. })
        ));
        assert!(manager.set_world_scale(-1.0).is_err());
    }
}
