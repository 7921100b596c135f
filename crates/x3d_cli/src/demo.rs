//! Scripted navigation session
//!
//! Builds a small world in a [`MemoryScene`] and drives it through the
//! layer manager the way a windowing backend would: hover and click a
//! TouchSensor, drag a PlaneSensor routed to a Transform, follow an
//! Anchor, walk into a ProximitySensor, then zoom and orbit in examine
//! mode.

use crate::config::NavConfig;
use anyhow::{Context, Result};
use std::cell::Cell;
use std::rc::Rc;
use tracing::info;
use x3d_core::{AxisAngle, Mat4, Mat4Ext, Vec2, Vec3};
use x3d_input::{
    AreaListener, ClipPlaneListener, FrameReport, InputHandler, LayerSensorManager, MemoryScene,
    NavigationMode, NavigationStateListener, ObjectData, RenderScene, SensorStatusListener, TrackerEvent,
    TrackerState, TriangleMesh, ViewState, VisibilityListener,
};
use x3d_nodes::{FieldValue, ListenerError, NodeHandle, NodeKind, SceneGraph};

type ListenerResult = std::result::Result<(), ListenerError>;

/// Frames spent orbiting in examine mode
const ORBIT_FRAMES: usize = 30;

/// Outcome of one scripted session
#[derive(Debug, Clone, PartialEq)]
pub struct DemoSummary {
    pub frames: usize,
    pub handled_events: usize,
    pub position: Vec3,
    pub mode: NavigationMode,
    /// Translation routed from the PlaneSensor
    pub slider: Vec3,
    pub touch_time: Option<f64>,
    pub links: usize,
    pub clip: Option<(f32, f32)>,
}

// =============================================================================
// Listeners
// =============================================================================

/// Logs every runtime notification and counts followed links
#[derive(Clone, Default)]
struct Reporter {
    links: Rc<Cell<usize>>,
}

impl SensorStatusListener for Reporter {
    fn device_over(&mut self, sensor: NodeHandle, kind: NodeKind, description: &str) -> ListenerResult {
        info!(?sensor, kind = kind.name(), description, "pointer over sensor");
        Ok(())
    }

    fn device_not_over(&mut self, sensor: NodeHandle) -> ListenerResult {
        info!(?sensor, "pointer left sensor");
        Ok(())
    }

    fn device_activated(&mut self, sensor: NodeHandle, active: bool) -> ListenerResult {
        info!(?sensor, active, "sensor activation");
        Ok(())
    }

    fn link_activated(&mut self, anchor: NodeHandle, urls: &[String], parameters: &[String]) -> ListenerResult {
        info!(?anchor, ?urls, ?parameters, "link activated");
        self.links.set(self.links.get() + 1);
        Ok(())
    }
}

impl VisibilityListener for Reporter {
    fn visibility_changed(&mut self, sensor: NodeHandle, visible: bool, view: &ViewState) -> ListenerResult {
        info!(?sensor, visible, position = ?view.position, "visibility changed");
        Ok(())
    }
}

impl AreaListener for Reporter {
    fn area_entered(&mut self, sensor: NodeHandle, position: Vec3, _: AxisAngle) -> ListenerResult {
        info!(?sensor, ?position, "entered proximity region");
        Ok(())
    }

    fn area_exited(&mut self, sensor: NodeHandle) -> ListenerResult {
        info!(?sensor, "left proximity region");
        Ok(())
    }
}

impl NavigationStateListener for Reporter {
    fn navigation_state_changed(&mut self, mode: NavigationMode) -> ListenerResult {
        info!(%mode, "navigation mode");
        Ok(())
    }
}

impl ClipPlaneListener for Reporter {
    fn clip_planes_changed(&mut self, near: f32, far: f32) -> ListenerResult {
        info!(near, far, "clip planes");
        Ok(())
    }
}

// =============================================================================
// World
// =============================================================================

struct World {
    graph: SceneGraph,
    scene: MemoryScene,
    manager: LayerSensorManager,
    touch: NodeHandle,
    slider: NodeHandle,
    time: f64,
    frames: usize,
    handled: usize,
    last: FrameReport,
}

/// Create a node, apply `fields` and finish its setup
fn node(graph: &mut SceneGraph, kind: NodeKind, fields: Vec<(&str, FieldValue)>) -> Result<NodeHandle> {
    let handle = graph.create_node(kind);
    for (name, value) in fields {
        graph
            .set_value_by_name(handle, name, value)
            .with_context(|| format!("Failed to set {}.{}", kind.name(), name))?;
    }
    graph.setup_finished(handle)?;
    Ok(handle)
}

/// Empty group at `at` carrying `data` with a unit cube under it
fn sensor_cube(scene: &mut MemoryScene, at: Vec3, data: ObjectData) -> Result<()> {
    let root = scene.root();
    let group = scene
        .add_group(root, Mat4::translation(at.x, at.y, at.z), data)
        .context("Scene root vanished")?;
    scene
        .add_shape(group, Mat4::IDENTITY, TriangleMesh::cuboid(Vec3::ONE), ObjectData::default())
        .context("Sensor group vanished")?;
    Ok(())
}

fn region(scene: &mut MemoryScene, at: Vec3, sensor: NodeHandle) -> Result<()> {
    let root = scene.root();
    scene
        .add_group(root, Mat4::translation(at.x, at.y, at.z), ObjectData::for_node(sensor))
        .context("Scene root vanished")?;
    Ok(())
}

impl World {
    fn build(config: &NavConfig, reporter: &Reporter) -> Result<Self> {
        let mut graph = SceneGraph::new().with_max_route_depth(config.routing.max_depth);
        let mut scene = MemoryScene::new();
        let root = scene.root();

        let viewpoint = node(
            &mut graph,
            NodeKind::Viewpoint,
            vec![("position", FieldValue::vec3(Vec3::new(0.0, 1.8, 10.0)))],
        )?;
        let info = node(
            &mut graph,
            NodeKind::NavigationInfo,
            vec![
                ("speed", FieldValue::from(4.0f32)),
                ("type", FieldValue::strings(["WALK", "EXAMINE", "ANY"])),
            ],
        )?;

        scene
            .add_shape(root, Mat4::IDENTITY, TriangleMesh::ground(40.0), ObjectData::default())
            .context("Scene root vanished")?;

        let touch = node(
            &mut graph,
            NodeKind::TouchSensor,
            vec![("description", FieldValue::from("Lamp switch"))],
        )?;
        sensor_cube(&mut scene, Vec3::new(0.0, 1.8, 0.0), ObjectData::default().with_sensor(touch))?;

        let plane = node(&mut graph, NodeKind::PlaneSensor, Vec::new())?;
        sensor_cube(&mut scene, Vec3::new(2.0, 1.8, 0.0), ObjectData::default().with_sensor(plane))?;
        let slider = node(&mut graph, NodeKind::Transform, Vec::new())?;
        let from = graph
            .get_field_index(plane, "translation_changed")
            .context("PlaneSensor has no translation_changed")?;
        let to = graph
            .get_field_index(slider, "translation")
            .context("Transform has no translation")?;
        graph.add_route(plane, from, slider, to)?;

        let anchor = node(
            &mut graph,
            NodeKind::Anchor,
            vec![
                ("url", FieldValue::strings(["next.wrl"])),
                ("description", FieldValue::from("Next world")),
            ],
        )?;
        sensor_cube(&mut scene, Vec3::new(-2.0, 1.8, 0.0), ObjectData::for_node(anchor))?;

        let visibility = node(
            &mut graph,
            NodeKind::VisibilitySensor,
            vec![("size", FieldValue::vec3(Vec3::new(2.0, 2.0, 2.0)))],
        )?;
        region(&mut scene, Vec3::new(0.0, 1.0, -20.0), visibility)?;
        let proximity = node(
            &mut graph,
            NodeKind::ProximitySensor,
            vec![("size", FieldValue::vec3(Vec3::new(6.0, 4.0, 6.0)))],
        )?;
        region(&mut scene, Vec3::new(0.0, 1.0, 4.0), proximity)?;

        let mut manager = LayerSensorManager::new(&config.input())?;
        manager.add_sensor(&graph, visibility)?;
        manager.add_sensor(&graph, proximity)?;
        manager.bind_navigation_info(&graph, info)?;
        manager.add_clip_listener(Box::new(reporter.clone()));
        manager.visibility_mut().add_listener(Box::new(reporter.clone()));
        manager.area_mut().add_listener(Box::new(reporter.clone()));

        let input = manager.input_mut();
        input.tracker_mut().add_listener(Box::new(reporter.clone()));
        let navigation = input.navigation_mut();
        navigation.add_state_listener(Box::new(reporter.clone()));
        navigation.bind_viewpoint(&graph, viewpoint, Mat4::IDENTITY)?;
        navigation.set_world_roots(Some(root), Some(root));
        navigation.set_mode(config.demo_mode());

        Ok(Self {
            graph,
            scene,
            manager,
            touch,
            slider,
            time: 0.0,
            frames: 0,
            handled: 0,
            last: FrameReport::default(),
        })
    }

    /// Queue `events` and run one frame of `dt` seconds
    fn frame(&mut self, dt: f32, events: &[TrackerEvent]) {
        self.time += f64::from(dt);
        for event in events {
            self.manager.queue_event(*event);
        }
        self.last = self
            .manager
            .process_frame(self.time, dt, &mut self.graph, &self.scene);
        self.frames += 1;
        self.handled += self.last.handled_events;
    }

    fn state(&self, position: Vec2) -> TrackerState {
        TrackerState::at(position.x, position.y).with_time(self.time)
    }

    /// Pointer position over a world point, if it is in front of the eye
    fn screen_point(&self, world: Vec3) -> Option<Vec2> {
        screen_point(self.manager.input(), world)
    }

    fn click(&mut self, dt: f32, at: Vec2) {
        let state = self.state(at);
        self.frame(
            dt,
            &[
                TrackerEvent::Moved(state),
                TrackerEvent::Pressed(state),
                TrackerEvent::Released(state),
            ],
        );
    }
}

/// Normalized window position (y down) of `world` in the handler's view
pub fn screen_point(input: &InputHandler, world: Vec3) -> Option<Vec2> {
    let eye = input.navigation().world_view().try_inverse()?.transform_point(world);
    if eye.z >= 0.0 {
        return None;
    }
    let frustum = input.frustum();
    let half = (frustum.fov_y * 0.5).tan();
    let depth = -eye.z;
    Some(Vec2::new(eye.x / (depth * half * frustum.aspect), -eye.y / (depth * half)))
}

// =============================================================================
// Session
// =============================================================================

pub fn run(config: &NavConfig) -> Result<DemoSummary> {
    let reporter = Reporter::default();
    let mut world = World::build(config, &reporter)?;
    let dt = config.demo.frame_time;

    world.frame(dt, &[]);

    info!("clicking the touch sensor");
    let touch = world
        .screen_point(Vec3::new(0.0, 1.8, 0.5))
        .context("Touch sensor is behind the viewer")?;
    world.click(dt, touch);

    info!("dragging the plane sensor");
    let grip = world
        .screen_point(Vec3::new(2.0, 1.8, 0.5))
        .context("Plane sensor is behind the viewer")?;
    let press = world.state(grip);
    world.frame(dt, &[TrackerEvent::Moved(press), TrackerEvent::Pressed(press)]);
    for step in 1..=2 {
        let moved = world.state(Vec2::new(grip.x + 0.1 * step as f32, grip.y));
        world.frame(dt, &[TrackerEvent::Dragged(moved)]);
    }
    let release = world.state(Vec2::new(grip.x + 0.2, grip.y));
    world.frame(dt, &[TrackerEvent::Released(release)]);

    info!("following the anchor");
    let link = world
        .screen_point(Vec3::new(-2.0, 1.8, 0.5))
        .context("Anchor is behind the viewer")?;
    world.click(dt, link);

    info!(mode = %world.manager.input().navigation().mode(), "navigating");
    let start = world.state(Vec2::new(0.9, 0.9));
    world.frame(dt, &[TrackerEvent::Pressed(start)]);
    let ahead = world.state(Vec2::new(0.9, 0.1));
    world.frame(dt, &[TrackerEvent::Dragged(ahead)]);
    for _ in 1..config.demo.frames {
        world.frame(dt, &[]);
    }
    let stop = world.state(Vec2::new(0.9, 0.1));
    world.frame(dt, &[TrackerEvent::Released(stop)]);

    let navigation = world.manager.input_mut().navigation_mut();
    if navigation.is_allowed(NavigationMode::Examine) {
        info!("zooming and orbiting");
        navigation.set_mode(NavigationMode::Examine);
        let wheel = world.state(Vec2::ZERO).with_wheel(5.0);
        world.frame(dt, &[TrackerEvent::Wheel(wheel)]);
        world.frame(dt, &[]);

        let from = world.state(Vec2::new(0.9, 0.9));
        world.frame(dt, &[TrackerEvent::Pressed(from)]);
        let to = world.state(Vec2::new(0.7, 0.9));
        world.frame(dt, &[TrackerEvent::Dragged(to)]);
        for _ in 1..ORBIT_FRAMES {
            world.frame(dt, &[]);
        }
        world.frame(dt, &[TrackerEvent::Released(to)]);
    }

    let navigation = world.manager.input().navigation();
    let summary = DemoSummary {
        frames: world.frames,
        handled_events: world.handled,
        position: navigation.position(),
        mode: navigation.mode(),
        slider: world.graph.get_vec3(world.slider, "translation").unwrap_or(Vec3::ZERO),
        touch_time: world.graph.get_double(world.touch, "touchTime"),
        links: reporter.links.get(),
        clip: world.manager.clip_planes(),
    };
    info!(
        frames = summary.frames,
        events = summary.handled_events,
        position = ?summary.position,
        "session finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_reaches_every_sensor() {
        let summary = run(&NavConfig::default()).unwrap();
        assert!(summary.touch_time.is_some());
        assert!(summary.slider.x > 0.0);
        assert_eq!(summary.links, 1);
        assert_eq!(summary.mode, NavigationMode::Examine);
        assert!(summary.clip.is_some());
    }

    #[test]
    fn test_screen_point_centre_and_behind() {
        let mut input = InputHandler::default();
        input.navigation_mut().set_view(Mat4::IDENTITY, Mat4::IDENTITY);
        let centre = screen_point(&input, Vec3::new(0.0, 0.0, -5.0)).unwrap();
        assert!(centre.x.abs() < 1e-6 && centre.y.abs() < 1e-6);
        let up = screen_point(&input, Vec3::new(0.0, 1.0, -5.0)).unwrap();
        assert!(up.y < 0.0);
        assert!(screen_point(&input, Vec3::new(0.0, 0.0, 5.0)).is_none());
    }
}
