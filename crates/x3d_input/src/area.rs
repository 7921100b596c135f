//! ProximitySensor processing.
//!
//! Proximity regions are boxes in the sensor's local space. The viewer is
//! brought into each sensor's space every frame; entering and leaving
//! toggle `isActive` with enter/exit times, and while inside the local
//! position and orientation are reported whenever they change.

use crate::error::{InputError, Result};
use crate::render::RenderScene;
use crate::tracker::emit_if_present;
use crate::visibility::sensor_placement;
use indexmap::IndexMap;
use x3d_core::{AxisAngle, BoundingBox, Mat4, Mat4Ext, Quat, Vec3};
use x3d_nodes::{FieldValue, ListenerError, ListenerId, ListenerList, NodeHandle, NodeKind, SceneGraph};

type ListenerResult = std::result::Result<(), ListenerError>;

/// Observes the viewer crossing proximity regions
pub trait AreaListener {
    fn area_entered(&mut self, sensor: NodeHandle, position: Vec3, orientation: AxisAngle) -> ListenerResult;
    fn area_exited(&mut self, sensor: NodeHandle) -> ListenerResult;
}

#[derive(Clone, Copy, Debug, Default)]
struct AreaEntry {
    inside: bool,
    position: Option<Vec3>,
    orientation: Option<AxisAngle>,
}

/// Tracks the viewer against every registered ProximitySensor
pub struct AreaManager {
    sensors: IndexMap<NodeHandle, AreaEntry>,
    inv_world_scale: f32,
    listeners: ListenerList<dyn AreaListener>,
}

impl std::fmt::Debug for AreaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AreaManager")
            .field("sensors", &self.sensors.len())
            .field("inside", &self.inside_count())
            .finish()
    }
}

impl Default for AreaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AreaManager {
    pub fn new() -> Self {
        Self {
            sensors: IndexMap::new(),
            inv_world_scale: 1.0,
            listeners: ListenerList::new(),
        }
    }

    pub fn add_sensor(&mut self, graph: &SceneGraph, sensor: NodeHandle) -> Result<()> {
        match graph.node_kind(sensor) {
            Some(NodeKind::ProximitySensor) => {
                self.sensors.entry(sensor).or_default();
                Ok(())
            }
            other => Err(InputError::UnsupportedNode {
                expected: "ProximitySensor",
                found: other.map_or("unknown node", |k| k.name()),
            }),
        }
    }

    pub fn remove_sensor(&mut self, sensor: NodeHandle) -> bool {
        self.sensors.shift_remove(&sensor).is_some()
    }

    pub fn clear(&mut self) {
        self.sensors.clear();
    }

    pub fn add_listener(&mut self, listener: Box<dyn AreaListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn is_inside(&self, sensor: NodeHandle) -> bool {
        self.sensors.get(&sensor).is_some_and(|e| e.inside)
    }

    pub fn inside_count(&self) -> usize {
        self.sensors.values().filter(|e| e.inside).count()
    }

    pub fn set_world_scale(&mut self, scale: f32) -> Result<()> {
        if !(scale > 0.0) {
            return Err(InputError::setting("world_scale", format!("{scale} is not positive")));
        }
        self.inv_world_scale = 1.0 / scale;
        Ok(())
    }

    /// Update every region for the eye at `eye_to_world`. `center_of_rotation`
    /// is in world space. Returns how many regions hold the viewer.
    pub fn process_frame<S: RenderScene + ?Sized>(
        &mut self,
        time: f64,
        graph: &mut SceneGraph,
        scene: &S,
        eye_to_world: &Mat4,
        center_of_rotation: Vec3,
    ) -> usize {
        self.sensors.retain(|s, _| graph.contains(*s));
        let sensors: Vec<NodeHandle> = self.sensors.keys().copied().collect();
        for sensor in sensors {
            let placed = sensor_placement(graph, scene, sensor);
            let Some(entry) = self.sensors.get_mut(&sensor) else {
                continue;
            };
            let local = placed.and_then(|(center, size, to_world)| {
                let to_local = to_world.try_inverse()?;
                let eye = to_local.mul(eye_to_world);
                let position = eye.get_translation();
                BoundingBox::from_center_size(center, size)
                    .contains_point(position)
                    .then_some((to_local, eye, position))
            });

            let Some((to_local, eye, position)) = local else {
                if entry.inside {
                    *entry = AreaEntry::default();
                    emit_if_present(graph, sensor, "isActive", FieldValue::Bool(false));
                    emit_if_present(graph, sensor, "exitTime", FieldValue::Double(time));
                    tracing::debug!(?sensor, "viewer left proximity region");
                    self.listeners.notify("area_exited", |l| l.area_exited(sensor));
                }
                continue;
            };

            let position = position * self.inv_world_scale;
            let orientation = Quat::from_mat4(&eye).to_axis_angle();
            let entered = !entry.inside;
            if entered {
                entry.inside = true;
                emit_if_present(graph, sensor, "enterTime", FieldValue::Double(time));
                emit_if_present(graph, sensor, "isActive", FieldValue::Bool(true));
                let rotation_center = to_local.transform_point(center_of_rotation) * self.inv_world_scale;
                emit_if_present(graph, sensor, "centerOfRotation_changed", FieldValue::vec3(rotation_center));
                tracing::debug!(?sensor, ?position, "viewer entered proximity region");
                self.listeners
                    .notify("area_entered", |l| l.area_entered(sensor, position, orientation));
            }
            if entry.position != Some(position) {
                entry.position = Some(position);
                emit_if_present(graph, sensor, "position_changed", FieldValue::vec3(position));
            }
            if entry.orientation != Some(orientation) {
                entry.orientation = Some(orientation);
                let a = orientation;
                emit_if_present(
                    graph,
                    sensor,
                    "orientation_changed",
                    FieldValue::packed(&[a.axis.x, a.axis.y, a.axis.z, a.angle]),
                );
            }
        }
        self.inside_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use crate::render::ObjectData;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Log(Rc<RefCell<Vec<String>>>);

    impl AreaListener for Log {
        fn area_entered(&mut self, _: NodeHandle, position: Vec3, _: AxisAngle) -> ListenerResult {
            self.0.borrow_mut().push(format!("enter {:.1}", position.x));
            Ok(())
        }

        fn area_exited(&mut self, _: NodeHandle) -> ListenerResult {
            self.0.borrow_mut().push("exit".into());
            Ok(())
        }
    }

    struct Fixture {
        graph: SceneGraph,
        scene: MemoryScene,
        sensor: NodeHandle,
        manager: AreaManager,
        log: Rc<RefCell<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let mut graph = SceneGraph::new();
        let sensor = graph.create_node(NodeKind::ProximitySensor);
        graph
            .set_value_by_name(sensor, "size", FieldValue::vec3(Vec3::new(4.0, 4.0, 4.0)))
            .unwrap();
        let mut scene = MemoryScene::new();
        let root = scene.root();
        scene
            .add_group(root, Mat4::translation(10.0, 0.0, 0.0), ObjectData::for_node(sensor))
            .unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = AreaManager::new();
        manager.add_listener(Box::new(Log(log.clone())));
        manager.add_sensor(&graph, sensor).unwrap();
        Fixture {
            graph,
            scene,
            sensor,
            manager,
            log,
        }
    }

    impl Fixture {
        fn frame(&mut self, time: f64, eye: Vec3) -> usize {
            self.manager.process_frame(
                time,
                &mut self.graph,
                &self.scene,
                &Mat4::translation(eye.x, eye.y, eye.z),
                Vec3::new(10.0, 0.0, 0.0),
            )
        }
    }

    #[test]
    fn test_enter_move_exit() {
        let mut f = fixture();
        assert_eq!(f.frame(0.5, Vec3::ZERO), 0);
        assert_eq!(f.frame(1.0, Vec3::new(10.5, 0.0, 1.0)), 1);
        assert_eq!(f.graph.get_bool(f.sensor, "isActive"), Some(true));
        assert_eq!(f.graph.get_double(f.sensor, "enterTime"), Some(1.0));
        let position = f.graph.get_vec3(f.sensor, "position_changed").unwrap();
        assert!((position.x - 0.5).abs() < 1e-5);
        assert!((position.z - 1.0).abs() < 1e-5);
        let center = f.graph.get_vec3(f.sensor, "centerOfRotation_changed").unwrap();
        assert!(center.length() < 1e-5);

        assert_eq!(f.frame(1.5, Vec3::new(11.0, 0.0, 1.0)), 1);
        let position = f.graph.get_vec3(f.sensor, "position_changed").unwrap();
        assert!((position.x - 1.0).abs() < 1e-5);

        assert_eq!(f.frame(2.0, Vec3::new(20.0, 0.0, 0.0)), 0);
        assert_eq!(f.graph.get_bool(f.sensor, "isActive"), Some(false));
        assert_eq!(f.graph.get_double(f.sensor, "exitTime"), Some(2.0));
        assert_eq!(*f.log.borrow(), vec!["enter 0.5", "exit"]);
    }

    #[test]
    fn test_world_scale_shrinks_reported_position() {
        let mut f = fixture();
        f.manager.set_world_scale(2.0).unwrap();
        f.frame(0.0, Vec3::new(11.0, 0.0, 0.0));
        let position = f.graph.get_vec3(f.sensor, "position_changed").unwrap();
        assert!((position.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_disabling_inside_fires_exit() {
        let mut f = fixture();
        f.frame(0.0, Vec3::new(10.0, 0.0, 0.0));
        assert!(f.manager.is_inside(f.sensor));
        f.graph.set_value_by_name(f.sensor, "enabled", false).unwrap();
        assert_eq!(f.frame(1.0, Vec3::new(10.0, 0.0, 0.0)), 0);
        assert_eq!(*f.log.borrow(), vec!["enter 0.0", "exit"]);
    }
}
