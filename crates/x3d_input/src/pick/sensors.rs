//! Pick sensor processing.
//!
//! Once per frame every registered pick sensor picks its `pickingGeometry`
//! against its `pickTarget` nodes. Results are written back to the sensor's
//! output fields, and listeners hear when a sensor starts, keeps and stops
//! picking something.

use super::{IntersectMode, ObjectTypeMasks, PickEngine, PickGeometry, PickResults, PickSort};
use crate::error::{InputError, Result};
use crate::render::{ObjectId, RenderScene};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use x3d_core::{Mat4, Vec3};
use x3d_nodes::{
    FieldValue, ListenerError, ListenerId, ListenerList, NodeCategory, NodeHandle, NodeRef,
    SceneGraph,
};

type ListenerResult = std::result::Result<(), ListenerError>;

/// Observes pick sensor activity
pub trait PickSensorListener {
    /// The sensor picked something after picking nothing
    fn pick_started(&mut self, sensor: NodeHandle, results: &PickResults) -> ListenerResult;

    /// The sensor is still picking; results may differ
    fn pick_changed(&mut self, sensor: NodeHandle, results: &PickResults) -> ListenerResult;

    fn pick_ended(&mut self, sensor: NodeHandle) -> ListenerResult;
}

#[derive(Debug)]
struct SensorEntry {
    object_types: Vec<String>,
    mask: u32,
}

/// Drives every registered pick sensor of one scene
#[derive(Debug)]
pub struct PickSensorManager {
    sensors: IndexMap<NodeHandle, SensorEntry>,
    active: FxHashSet<NodeHandle>,
    engine: PickEngine,
    masks: ObjectTypeMasks,
    listeners: ListenerList<dyn PickSensorListener>,
}

impl Default for PickSensorManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl PickSensorManager {
    pub fn new(result_increment: usize) -> Self {
        Self {
            sensors: IndexMap::new(),
            active: FxHashSet::default(),
            engine: PickEngine::new(result_increment),
            masks: ObjectTypeMasks::new(),
            listeners: ListenerList::new(),
        }
    }

    /// Start processing a pick sensor node
    pub fn add_sensor(&mut self, graph: &SceneGraph, sensor: NodeHandle) -> Result<()> {
        let kind = graph
            .node_kind(sensor)
            .ok_or(x3d_nodes::FieldError::UnknownNode)?;
        if !kind.has_category(NodeCategory::PickSensor) {
            return Err(InputError::UnsupportedNode {
                expected: "pick sensor",
                found: kind.name(),
            });
        }
        if self.sensors.contains_key(&sensor) {
            return Ok(());
        }
        let object_types = graph
            .get_strings(sensor, "objectType")
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let mask = self.masks.register(&object_types);
        tracing::debug!(kind = kind.name(), mask, "pick sensor added");
        self.sensors.insert(sensor, SensorEntry { object_types, mask });
        Ok(())
    }

    /// Stop processing a sensor; returns false if it was not registered
    pub fn remove_sensor(&mut self, sensor: NodeHandle) -> bool {
        let Some(entry) = self.sensors.shift_remove(&sensor) else {
            return false;
        };
        self.masks.unregister(&entry.object_types);
        self.active.remove(&sensor);
        true
    }

    /// Drop all sensors and activity
    pub fn clear(&mut self) {
        let sensors: Vec<NodeHandle> = self.sensors.keys().copied().collect();
        for sensor in sensors {
            self.remove_sensor(sensor);
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_active(&self, sensor: NodeHandle) -> bool {
        self.active.contains(&sensor)
    }

    pub fn masks(&self) -> &ObjectTypeMasks {
        &self.masks
    }

    /// Register a PickableGroup's object types, returning the mask to store
    /// on its render object
    pub fn pickable_group_mask(&mut self, graph: &SceneGraph, group: NodeHandle) -> u32 {
        match graph.get_strings(group, "objectType") {
            Some(types) => {
                let types = types.to_vec();
                self.masks.register(&types)
            }
            None => super::ALL_MASK,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn PickSensorListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    /// Run every sensor once; returns how many are active afterwards
    pub fn process_frame<S: RenderScene + ?Sized>(&mut self, graph: &mut SceneGraph, scene: &S) -> usize {
        let sensors: SmallVec<[NodeHandle; 8]> = self.sensors.keys().copied().collect();
        for sensor in sensors {
            if !graph.contains(sensor) {
                tracing::debug!(?sensor, "pick sensor removed from scene");
                self.remove_sensor(sensor);
                continue;
            }
            self.process_sensor(graph, scene, sensor);
        }
        self.active.len()
    }

    fn process_sensor<S: RenderScene + ?Sized>(&mut self, graph: &mut SceneGraph, scene: &S, sensor: NodeHandle) {
        let Some(mask) = self.sensors.get(&sensor).map(|e| e.mask) else {
            return;
        };
        let enabled = graph.get_bool(sensor, "enabled").unwrap_or(false);
        let targets: SmallVec<[ObjectId; 4]> = graph
            .get_nodes(sensor, "pickTarget")
            .into_iter()
            .filter_map(|n| scene.object_for_node(n))
            .collect();
        let geometry_node = graph.get_node(sensor, "pickingGeometry");

        let (true, false, Some(geometry_node)) = (enabled, targets.is_empty(), geometry_node) else {
            self.deactivate(graph, sensor);
            return;
        };

        let to_world = scene
            .object_for_node(sensor)
            .map_or(Mat4::IDENTITY, |o| scene.local_to_world(o));
        let Some(geometry) = PickGeometry::from_node(graph, geometry_node, &to_world) else {
            self.deactivate(graph, sensor);
            return;
        };
        let mode = graph
            .get_str(sensor, "intersectionType")
            .and_then(IntersectMode::from_name)
            .unwrap_or_default();
        let sort = graph
            .get_str(sensor, "sortOrder")
            .and_then(PickSort::from_name)
            .unwrap_or_default();

        let results = self.engine.pick(scene, &targets, &geometry, mode, sort, mask);
        if results.is_empty() {
            self.deactivate(graph, sensor);
            return;
        }

        write_outputs(graph, sensor, results);
        if self.active.insert(sensor) {
            emit(graph, sensor, "isActive", FieldValue::Bool(true));
            tracing::debug!(?sensor, hits = results.len(), "pick sensor active");
            self.listeners
                .notify("pick_started", |l| l.pick_started(sensor, results));
        } else {
            self.listeners
                .notify("pick_changed", |l| l.pick_changed(sensor, results));
        }
    }

    fn deactivate(&mut self, graph: &mut SceneGraph, sensor: NodeHandle) {
        if !self.active.remove(&sensor) {
            return;
        }
        emit(graph, sensor, "pickedGeometry", FieldValue::Nodes(Vec::new()));
        emit(graph, sensor, "isActive", FieldValue::Bool(false));
        tracing::debug!(?sensor, "pick sensor inactive");
        self.listeners.notify("pick_ended", |l| l.pick_ended(sensor));
    }
}

fn write_outputs(graph: &mut SceneGraph, sensor: NodeHandle, results: &PickResults) {
    let nodes = results.unique_nodes().into_iter().map(NodeRef::Concrete).collect();
    emit(graph, sensor, "pickedGeometry", FieldValue::Nodes(nodes));

    let outputs: [(&str, fn(&super::PickHit) -> Option<Vec3>); 3] = [
        ("pickedPoint", |h| h.point),
        ("pickedNormal", |h| h.normal),
        ("pickedTextureCoordinate", |h| h.tex_coord),
    ];
    for (name, select) in outputs {
        if graph.get_field_index(sensor, name).is_none() {
            continue;
        }
        let data: Vec<f32> = results
            .hits()
            .iter()
            .filter_map(select)
            .flat_map(|v| v.to_array())
            .collect();
        emit(graph, sensor, name, FieldValue::floats(data, 3));
    }
}

/// Write a sensor output; failures are logged, never raised
fn emit(graph: &mut SceneGraph, sensor: NodeHandle, name: &str, value: FieldValue) {
    if let Err(err) = graph.set_value_by_name(sensor, name, value) {
        tracing::warn!(?sensor, field = name, %err, "pick sensor output rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use crate::render::{ObjectData, TriangleMesh};
    use std::cell::RefCell;
    use std::rc::Rc;
    use x3d_nodes::NodeKind;

    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl PickSensorListener for Recorder {
        fn pick_started(&mut self, _: NodeHandle, results: &PickResults) -> ListenerResult {
            self.0.borrow_mut().push(format!("start {}", results.len()));
            Ok(())
        }

        fn pick_changed(&mut self, _: NodeHandle, _: &PickResults) -> ListenerResult {
            self.0.borrow_mut().push("change".into());
            Ok(())
        }

        fn pick_ended(&mut self, _: NodeHandle) -> ListenerResult {
            self.0.borrow_mut().push("end".into());
            Ok(())
        }
    }

    struct Fixture {
        graph: SceneGraph,
        scene: MemoryScene,
        sensor: NodeHandle,
        shape: NodeHandle,
        shape_object: ObjectId,
        target_object: ObjectId,
    }

    fn fixture(kind: NodeKind) -> Fixture {
        let mut graph = SceneGraph::new();
        let coord = graph.create_node(NodeKind::Coordinate);
        graph
            .set_value_by_name(coord, "point", FieldValue::floats(vec![0.1, -0.2, 0.0, 0.1, -0.2, -10.0], 3))
            .unwrap();
        let lines = graph.create_node(NodeKind::IndexedLineSet);
        graph.set_value_by_name(lines, "coord", FieldValue::node(coord)).unwrap();
        graph.set_value_by_name(lines, "coordIndex", vec![0, 1]).unwrap();

        let group = graph.create_node(NodeKind::Group);
        let shape = graph.create_node(NodeKind::Shape);
        let sensor = graph.create_node(kind);
        graph.set_value_by_name(sensor, "pickingGeometry", FieldValue::node(lines)).unwrap();
        graph
            .set_value_by_name(sensor, "pickTarget", FieldValue::Nodes(vec![NodeRef::Concrete(group)]))
            .unwrap();
        graph.set_value_by_name(sensor, "intersectionType", "GEOMETRY").unwrap();

        let mut scene = MemoryScene::new();
        let root = scene.root();
        let target_object = scene.add_group(root, Mat4::IDENTITY, ObjectData::for_node(group)).unwrap();
        let shape_object = scene
            .add_shape(
                target_object,
                Mat4::translation(0.0, 0.0, -4.0),
                TriangleMesh::cuboid(Vec3::ONE),
                ObjectData::for_node(shape),
            )
            .unwrap();
        Fixture {
            graph,
            scene,
            sensor,
            shape,
            shape_object,
            target_object,
        }
    }

    #[test]
    fn test_rejects_non_pick_sensor() {
        let mut graph = SceneGraph::new();
        let touch = graph.create_node(NodeKind::TouchSensor);
        let mut manager = PickSensorManager::default();
        assert!(matches!(
            manager.add_sensor(&graph, touch),
            Err(InputError::UnsupportedNode { .. })
        ));
    }

    #[test]
    fn test_start_change_end() {
        let mut f = fixture(NodeKind::LinePickSensor);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = PickSensorManager::default();
        manager.add_sensor(&f.graph, f.sensor).unwrap();
        manager.add_listener(Box::new(Recorder(log.clone())));

        assert_eq!(manager.process_frame(&mut f.graph, &f.scene), 1);
        assert_eq!(f.graph.get_bool(f.sensor, "isActive"), Some(true));
        assert_eq!(f.graph.get_nodes(f.sensor, "pickedGeometry"), vec![f.shape]);
        let points = f.graph.get_floats(f.sensor, "pickedPoint").unwrap();
        assert_eq!(points.len(), 3);
        assert!((points[2] + 3.5).abs() < 1e-4);

        manager.process_frame(&mut f.graph, &f.scene);
        f.scene.set_local_transform(f.shape_object, Mat4::translation(5.0, 0.0, -4.0));
        assert_eq!(manager.process_frame(&mut f.graph, &f.scene), 0);
        assert_eq!(f.graph.get_bool(f.sensor, "isActive"), Some(false));
        assert!(f.graph.get_nodes(f.sensor, "pickedGeometry").is_empty());
        assert_eq!(*log.borrow(), vec!["start 1", "change", "end"]);
    }

    #[test]
    fn test_disabled_sensor_stays_inactive() {
        let mut f = fixture(NodeKind::LinePickSensor);
        f.graph.set_value_by_name(f.sensor, "enabled", false).unwrap();
        let mut manager = PickSensorManager::default();
        manager.add_sensor(&f.graph, f.sensor).unwrap();
        assert_eq!(manager.process_frame(&mut f.graph, &f.scene), 0);
        assert!(!manager.is_active(f.sensor));
    }

    #[test]
    fn test_object_type_filters_targets() {
        let mut f = fixture(NodeKind::PrimitivePickSensor);
        f.graph
            .set_value_by_name(f.sensor, "objectType", FieldValue::strings(["terrain"]))
            .unwrap();
        let mut manager = PickSensorManager::default();
        let vehicle = {
            let group = f.graph.create_node(NodeKind::PickableGroup);
            f.graph
                .set_value_by_name(group, "objectType", FieldValue::strings(["vehicle"]))
                .unwrap();
            manager.pickable_group_mask(&f.graph, group)
        };
        f.scene.data_mut(f.target_object).unwrap().object_mask = vehicle;
        manager.add_sensor(&f.graph, f.sensor).unwrap();
        assert_eq!(manager.process_frame(&mut f.graph, &f.scene), 0);

        let terrain = manager.masks().mask_for(&["terrain"]);
        f.scene.data_mut(f.target_object).unwrap().object_mask = terrain;
        assert_eq!(manager.process_frame(&mut f.graph, &f.scene), 1);
        assert!(f.graph.get_field_index(f.sensor, "pickedPoint").is_none());
    }

    #[test]
    fn test_removed_sensor_dropped() {
        let mut f = fixture(NodeKind::LinePickSensor);
        let mut manager = PickSensorManager::default();
        manager.add_sensor(&f.graph, f.sensor).unwrap();
        f.graph.remove_node(f.sensor).unwrap();
        manager.process_frame(&mut f.graph, &f.scene);
        assert_eq!(manager.sensor_count(), 0);
        assert!(!manager.is_active(f.sensor));
    }
}
