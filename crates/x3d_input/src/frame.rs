//! Per-layer frame processing.
//!
//! [`LayerSensorManager`] owns every sensor subsystem of one layer and runs
//! them in a fixed order each frame:
//!
//! 1. pick sensors
//! 2. queued pointer events and the visibility/proximity diffs
//! 3. navigation
//! 4. clip planes

use crate::area::AreaManager;
use crate::config::{ClipConfig, InputConfig};
use crate::error::{InputError, Result};
use crate::handler::{InputHandler, TrackerState};
use crate::pick::PickSensorManager;
use crate::render::{RenderScene, ViewFrustum};
use crate::visibility::VisibilityManager;
use x3d_core::Vec3;
use x3d_nodes::{ListenerError, ListenerId, ListenerList, NodeCategory, NodeHandle, NodeKind, SceneGraph};

/// Near plane used before any avatar size is known
pub const DEFAULT_NEAR_CLIP: f32 = 0.125;

/// Far plane to near plane ratio used when the near plane passes the far one
const DEPTH_RATIO: f32 = 3000.0;

/// Near plane changes smaller than this are not reported
const NEAR_TOLERANCE: f32 = 0.001;

/// Far plane changes up to this are not reported
const FAR_TOLERANCE: f32 = 0.1;

/// Receives clip distance updates for the layer's view
pub trait ClipPlaneListener {
    fn clip_planes_changed(&mut self, near: f32, far: f32) -> std::result::Result<(), ListenerError>;
}

/// A pointer event waiting for the next frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackerEvent {
    Pressed(TrackerState),
    Moved(TrackerState),
    Dragged(TrackerState),
    Released(TrackerState),
    Wheel(TrackerState),
}

/// What one frame did
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub active_pick_sensors: usize,
    /// Pointer events that a sensor or navigation consumed
    pub handled_events: usize,
    pub visible_sensors: usize,
    pub proximity_regions: usize,
    pub view_moved: bool,
    /// New clip distances, if they changed enough to report
    pub clip: Option<(f32, f32)>,
}

/// Runs the sensors and navigation of one layer
pub struct LayerSensorManager {
    clipping: ClipConfig,
    input: InputHandler,
    picks: PickSensorManager,
    visibility: VisibilityManager,
    area: AreaManager,
    events: Vec<TrackerEvent>,
    clip: Option<(f32, f32)>,
    clip_listeners: ListenerList<dyn ClipPlaneListener>,
}

impl std::fmt::Debug for LayerSensorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerSensorManager")
            .field("input", &self.input)
            .field("visibility", &self.visibility)
            .field("area", &self.area)
            .field("pending_events", &self.events.len())
            .field("clip", &self.clip)
            .finish()
    }
}

impl LayerSensorManager {
    pub fn new(config: &InputConfig) -> Result<Self> {
        config.validate()?;
        let mut manager = Self {
            clipping: config.clipping.clone(),
            input: InputHandler::new(&config.navigation, config.picking.result_increment),
            picks: PickSensorManager::new(config.picking.result_increment),
            visibility: VisibilityManager::new(),
            area: AreaManager::new(),
            events: Vec::new(),
            clip: None,
            clip_listeners: ListenerList::new(),
        };
        manager.set_world_scale(config.navigation.world_scale)?;
        Ok(manager)
    }

    pub fn input(&self) -> &InputHandler {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputHandler {
        &mut self.input
    }

    pub fn pick_sensors_mut(&mut self) -> &mut PickSensorManager {
        &mut self.picks
    }

    pub fn visibility_mut(&mut self) -> &mut VisibilityManager {
        &mut self.visibility
    }

    pub fn area_mut(&mut self) -> &mut AreaManager {
        &mut self.area
    }

    pub fn add_clip_listener(&mut self, listener: Box<dyn ClipPlaneListener>) -> ListenerId {
        self.clip_listeners.add(listener)
    }

    pub fn remove_clip_listener(&mut self, id: ListenerId) -> bool {
        self.clip_listeners.remove(id).is_some()
    }

    /// Current clip distances, once the first frame has run
    pub fn clip_planes(&self) -> Option<(f32, f32)> {
        self.clip
    }

    /// Register a pick, visibility or proximity sensor with its manager
    pub fn add_sensor(&mut self, graph: &SceneGraph, sensor: NodeHandle) -> Result<()> {
        match graph.node_kind(sensor) {
            Some(NodeKind::VisibilitySensor) => self.visibility.add_sensor(graph, sensor),
            Some(NodeKind::ProximitySensor) => self.area.add_sensor(graph, sensor),
            Some(kind) if kind.has_category(NodeCategory::PickSensor) => self.picks.add_sensor(graph, sensor),
            other => Err(InputError::UnsupportedNode {
                expected: "pick, visibility or proximity sensor",
                found: other.map_or("unknown node", |k| k.name()),
            }),
        }
    }

    pub fn remove_sensor(&mut self, sensor: NodeHandle) -> bool {
        self.picks.remove_sensor(sensor) | self.visibility.remove_sensor(sensor) | self.area.remove_sensor(sensor)
    }

    pub fn set_world_scale(&mut self, scale: f32) -> Result<()> {
        self.input.navigation_mut().set_world_scale(scale)?;
        self.visibility.set_world_scale(scale)?;
        self.area.set_world_scale(scale)
    }

    /// Bind a NavigationInfo; its visibility limit drives the far plane
    pub fn bind_navigation_info(&mut self, graph: &SceneGraph, info: NodeHandle) -> Result<()> {
        self.input.navigation_mut().apply_navigation_info(graph, info)
    }

    /// Queue a pointer event for the next frame
    pub fn queue_event(&mut self, event: TrackerEvent) {
        self.events.push(event);
    }

    /// Run one frame at scene `time`, `dt` seconds after the last
    pub fn process_frame<S: RenderScene + ?Sized>(
        &mut self,
        time: f64,
        dt: f32,
        graph: &mut SceneGraph,
        scene: &S,
    ) -> FrameReport {
        let mut report = FrameReport {
            active_pick_sensors: self.picks.process_frame(graph, scene),
            ..Default::default()
        };

        report.handled_events = self.process_user_input(graph, scene);
        let eye = self.input.navigation().world_view();
        let frustum = *self.input.frustum();
        report.visible_sensors = self.visibility.process_frame(time, graph, scene, &eye, &frustum);
        let center = self.input.navigation().world_center_of_rotation();
        report.proximity_regions = self.area.process_frame(time, graph, scene, &eye, center);

        report.view_moved = self.input.process_navigation(dt, scene);

        report.clip = self.update_clip_planes(scene);
        tracing::trace!(?report, "frame processed");
        report
    }

    /// Dispatch queued pointer events in arrival order
    fn process_user_input<S: RenderScene + ?Sized>(&mut self, graph: &mut SceneGraph, scene: &S) -> usize {
        let events = std::mem::take(&mut self.events);
        let mut handled = 0;
        for event in &events {
            let taken = match event {
                TrackerEvent::Pressed(state) => self.input.tracker_pressed(graph, scene, state),
                TrackerEvent::Moved(state) => self.input.tracker_moved(graph, scene, state),
                TrackerEvent::Dragged(state) => self.input.tracker_dragged(graph, scene, state),
                TrackerEvent::Released(state) => self.input.tracker_released(graph, scene, state),
                TrackerEvent::Wheel(state) => self.input.tracker_wheel(state),
            };
            handled += usize::from(taken);
        }
        // Reuse the allocation
        self.events = events;
        self.events.clear();
        handled
    }

    /// Recompute near and far and notify if they moved enough
    fn update_clip_planes<S: RenderScene + ?Sized>(&mut self, scene: &S) -> Option<(f32, f32)> {
        let navigation = self.input.navigation();
        let extent = scene_extent(scene, navigation.position());
        let (near, far) = clip_distances(&self.clipping, navigation.avatar_size(), navigation.visibility_limit(), extent);

        if let Some((old_near, old_far)) = self.clip {
            if (near - old_near).abs() < NEAR_TOLERANCE && (far - old_far).abs() <= FAR_TOLERANCE {
                return None;
            }
        }
        self.clip = Some((near, far));
        let frustum = ViewFrustum {
            near,
            far,
            ..*self.input.frustum()
        };
        self.input.set_frustum(frustum);
        tracing::debug!(near, far, "clip planes changed");
        self.clip_listeners
            .notify("clip_planes_changed", |l| l.clip_planes_changed(near, far));
        Some((near, far))
    }
}

/// Distance from `viewer` to the farthest corner of the scene bounds
fn scene_extent<S: RenderScene + ?Sized>(scene: &S, viewer: Vec3) -> f32 {
    let bounds = scene.world_bounds(scene.root());
    if bounds.is_empty() {
        return 0.0;
    }
    bounds
        .corners()
        .iter()
        .map(|c| c.distance(viewer))
        .fold(0.0, f32::max)
}

/// Near and far clip distances.
///
/// Near is half the avatar size, never below the configured minimum. Far
/// is the visibility limit, or with no limit 1.1 times the scene extent
/// but at least the configured maximum visibility.
pub fn clip_distances(config: &ClipConfig, avatar_size: f32, visibility_limit: f32, extent: f32) -> (f32, f32) {
    let near = (avatar_size * 0.5).max(config.min_near);
    let far = if visibility_limit > 0.0 {
        visibility_limit
    } else {
        (extent * 1.1).max(config.max_visibility)
    };
    if near > far {
        (near, near * DEPTH_RATIO)
    } else {
        (near, far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use crate::render::{ObjectData, TriangleMesh};
    use std::cell::RefCell;
    use std::rc::Rc;
    use x3d_core::Mat4;
    use x3d_nodes::FieldValue;

    /// Debug logs from the code under test, captured per test
    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    struct Clips(Rc<RefCell<Vec<(f32, f32)>>>);

    impl ClipPlaneListener for Clips {
        fn clip_planes_changed(&mut self, near: f32, far: f32) -> std::result::Result<(), ListenerError> {
            self.0.borrow_mut().push((near, far));
            Ok(())
        }
    }

    #[test]
    fn test_clip_distances() {
        let config = ClipConfig::default();
        assert_eq!(clip_distances(&config, 0.25, 0.0, 10.0), (DEFAULT_NEAR_CLIP, 3000.0));
        assert_eq!(clip_distances(&config, 0.25, 0.0, 5000.0).1, 5500.0);
        assert_eq!(clip_distances(&config, 0.25, 200.0, 5000.0).1, 200.0);
        assert_eq!(clip_distances(&config, 0.0, 0.0, 0.0).0, 0.001);
        let (near, far) = clip_distances(&config, 4.0, 1.0, 0.0);
        assert_eq!(near, 2.0);
        assert_eq!(far, 6000.0);
    }

    #[test]
    fn test_clip_listener_only_on_real_change() {
        let mut graph = SceneGraph::new();
        let scene = MemoryScene::new();
        let mut manager = LayerSensorManager::new(&InputConfig::default()).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        manager.add_clip_listener(Box::new(Clips(log.clone())));

        let first = manager.process_frame(0.0, 0.016, &mut graph, &scene);
        assert_eq!(first.clip, Some((DEFAULT_NEAR_CLIP, 3000.0)));
        assert_eq!(manager.process_frame(0.016, 0.016, &mut graph, &scene).clip, None);

        manager.input_mut().navigation_mut().set_avatar_info(1.8, 0.2502, 0.4);
        assert_eq!(manager.process_frame(0.032, 0.016, &mut graph, &scene).clip, None);

        let info = graph.create_node(NodeKind::NavigationInfo);
        graph.set_value_by_name(info, "visibilityLimit", 100.0f32).unwrap();
        manager.bind_navigation_info(&graph, info).unwrap();
        let report = manager.process_frame(0.048, 0.016, &mut graph, &scene);
        assert_eq!(report.clip.map(|c| c.1), Some(100.0));
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(manager.input().frustum().far, 100.0);
    }

    #[test]
    fn test_frame_runs_every_phase() {
        init_logging();
        let mut graph = SceneGraph::new();
        let mut scene = MemoryScene::new();
        let root = scene.root();

        let touch = graph.create_node(NodeKind::TouchSensor);
        let group = scene
            .add_group(root, Mat4::IDENTITY, ObjectData::default().with_sensor(touch))
            .unwrap();
        scene
            .add_shape(
                group,
                Mat4::translation(0.0, 0.0, -5.0),
                TriangleMesh::cuboid(Vec3::ONE),
                ObjectData::default(),
            )
            .unwrap();

        let visibility = graph.create_node(NodeKind::VisibilitySensor);
        graph
            .set_value_by_name(visibility, "size", FieldValue::vec3(Vec3::ONE))
            .unwrap();
        scene
            .add_group(root, Mat4::translation(0.0, 0.0, -8.0), ObjectData::for_node(visibility))
            .unwrap();

        let proximity = graph.create_node(NodeKind::ProximitySensor);
        graph
            .set_value_by_name(proximity, "size", FieldValue::vec3(Vec3::new(4.0, 4.0, 4.0)))
            .unwrap();
        scene
            .add_group(root, Mat4::IDENTITY, ObjectData::for_node(proximity))
            .unwrap();

        let mut manager = LayerSensorManager::new(&InputConfig::default()).unwrap();
        manager.add_sensor(&graph, visibility).unwrap();
        manager.add_sensor(&graph, proximity).unwrap();
        assert!(manager.add_sensor(&graph, touch).is_err());
        manager
            .input_mut()
            .navigation_mut()
            .set_view(Mat4::IDENTITY, Mat4::IDENTITY);

        let click = TrackerState::at(0.0, 0.0).with_time(1.0);
        manager.queue_event(TrackerEvent::Moved(click));
        manager.queue_event(TrackerEvent::Pressed(click));
        manager.queue_event(TrackerEvent::Released(click));
        let report = manager.process_frame(1.0, 0.016, &mut graph, &scene);

        assert_eq!(report.handled_events, 3);
        assert_eq!(report.visible_sensors, 1);
        assert_eq!(report.proximity_regions, 1);
        assert!(!report.view_moved);
        assert_eq!(graph.get_double(touch, "touchTime"), Some(1.0));
        assert_eq!(graph.get_bool(proximity, "isActive"), Some(true));
        assert_eq!(graph.get_bool(visibility, "isActive"), Some(true));

        assert_eq!(manager.process_frame(1.1, 0.016, &mut graph, &scene).handled_events, 0);
    }
    #[test]
    fn test_proximity_center_of_rotation_under_parent_transform() {
        init_logging();
        let mut graph = SceneGraph::new();
        let mut scene = MemoryScene::new();
        let root = scene.root();
        let proximity = graph.create_node(NodeKind::ProximitySensor);
        graph
            .set_value_by_name(proximity, "size", FieldValue::vec3(Vec3::new(4.0, 4.0, 4.0)))
            .unwrap();
        scene
            .add_group(root, Mat4::translation(5.0, 0.0, 0.0), ObjectData::for_node(proximity))
            .unwrap();

        let mut manager = LayerSensorManager::new(&InputConfig::default()).unwrap();
        manager.add_sensor(&graph, proximity).unwrap();
        // Viewpoint parent moved to the sensor; the centre stays at the
        // parent-space origin
        manager
            .input_mut()
            .navigation_mut()
            .set_view(Mat4::IDENTITY, Mat4::translation(5.0, 0.0, 0.0));
        let report = manager.process_frame(0.0, 0.016, &mut graph, &scene);

        assert_eq!(report.proximity_regions, 1);
        let center = graph.get_vec3(proximity, "centerOfRotation_changed").unwrap();
        assert!(center.distance(Vec3::ZERO) < 1e-5, "{center:?}");
    }
}

