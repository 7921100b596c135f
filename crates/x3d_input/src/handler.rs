//! Pointer input dispatch.
//!
//! [`InputHandler`] receives tracker events (press, move, drag, release,
//! wheel) and decides per event whether it belongs to a pointing sensor or
//! to navigation. Sensors win: navigation only starts when a press lands
//! on nothing a sensor claims.

use crate::config::NavigationConfig;
use crate::navigation::{NavigationMode, NavigationProcessor};
use crate::pick::{PickEngine, PickShape};
use crate::render::{RenderScene, ViewFrustum};
use crate::tracker::{PointerHit, SensorActivationTracker};
use x3d_core::{Mat4Ext, Ray, Vec2, Vec3};
use x3d_nodes::SceneGraph;

/// Fraction of the way to the picked point the camera moves on look-at
const LOOK_AT_APPROACH: f32 = 0.5;

/// Fraction of the way to the picked point for a track-examine recentre
const TRACK_RECENTRE_APPROACH: f32 = 0.2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PointerButton {
    #[default]
    Primary,
    Secondary,
    Middle,
}

impl PointerButton {
    fn index(self) -> usize {
        match self {
            PointerButton::Primary => 0,
            PointerButton::Secondary => 1,
            PointerButton::Middle => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
}

/// One tracker sample
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackerState {
    /// Pointer in normalized window coordinates, x right and y down, each
    /// in `-1..1`
    pub position: Vec2,
    pub button: PointerButton,
    pub modifiers: Modifiers,
    pub wheel_clicks: f32,
    /// Scene time in seconds
    pub time: f64,
}

impl TrackerState {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            ..Default::default()
        }
    }

    pub fn with_button(mut self, button: PointerButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_wheel(mut self, clicks: f32) -> Self {
        self.wheel_clicks = clicks;
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }
}

/// What a pointer button navigates with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonMode {
    /// Entry of the bound NavigationInfo type list; 0 is the selected mode
    Bound(usize),
    /// A fixed mode, honoured only if the bound NavigationInfo allows it
    Fixed(NavigationMode),
    Nothing,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum HandlerState {
    Idle,
    /// A pointing sensor took the press
    Sensor,
    Navigating {
        /// Mode the button asked for, before modifier sub-modes
        mode: NavigationMode,
        start: Vec2,
        /// Selected mode to put back on release
        restore: Option<NavigationMode>,
        dragged: bool,
        /// Shift held on a track-examine press: release recentres
        track_shift: bool,
    },
}

/// Routes tracker events to the sensor tracker or the navigation processor
#[derive(Debug)]
pub struct InputHandler {
    engine: PickEngine,
    tracker: SensorActivationTracker,
    navigation: NavigationProcessor,
    frustum: ViewFrustum,
    button_modes: [ButtonMode; 3],
    state: HandlerState,
    alt: bool,
    wheel_moved: bool,
    picking_enabled: bool,
    navigation_enabled: bool,
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new(&NavigationConfig::default(), 50)
    }
}

impl InputHandler {
    pub fn new(config: &NavigationConfig, result_increment: usize) -> Self {
        Self {
            engine: PickEngine::new(result_increment),
            tracker: SensorActivationTracker::new(),
            navigation: NavigationProcessor::new(config),
            frustum: ViewFrustum::default(),
            button_modes: [ButtonMode::Bound(0), ButtonMode::Bound(1), ButtonMode::Bound(2)],
            state: HandlerState::Idle,
            alt: false,
            wheel_moved: false,
            picking_enabled: true,
            navigation_enabled: true,
        }
    }

    pub fn navigation(&self) -> &NavigationProcessor {
        &self.navigation
    }

    pub fn navigation_mut(&mut self) -> &mut NavigationProcessor {
        &mut self.navigation
    }

    pub fn tracker(&self) -> &SensorActivationTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut SensorActivationTracker {
        &mut self.tracker
    }

    pub fn frustum(&self) -> &ViewFrustum {
        &self.frustum
    }

    pub fn set_frustum(&mut self, frustum: ViewFrustum) {
        self.frustum = frustum;
    }

    pub fn set_button_mode(&mut self, button: PointerButton, mode: ButtonMode) {
        self.button_modes[button.index()] = mode;
    }

    /// Pointing sensors are skipped while picking is off
    pub fn set_picking_enabled(&mut self, enabled: bool) {
        self.picking_enabled = enabled;
    }

    pub fn set_navigation_enabled(&mut self, enabled: bool) {
        self.navigation_enabled = enabled;
    }

    pub fn is_navigating(&self) -> bool {
        matches!(self.state, HandlerState::Navigating { .. })
    }

    /// World-space ray through a pointer position
    pub fn pointer_ray(&self, position: Vec2) -> Ray {
        let eye = self.navigation.world_view();
        let local = self.frustum.direction_through(position.x, -position.y);
        Ray::new(eye.get_translation(), eye.transform_vector(local).normalize())
    }

    fn pointer_hit<S: RenderScene + ?Sized>(&mut self, scene: &S, position: Vec2) -> Option<PointerHit> {
        let ray = self.pointer_ray(position);
        self.engine
            .nearest_surface(scene, scene.root(), PickShape::Ray(ray))
            .map(|hit| PointerHit {
                path: hit.path,
                point: hit.point,
                normal: hit.normal,
                tex_coord: hit.tex_coord,
            })
    }

    // =========================================================================
    // Tracker events
    // =========================================================================

    /// Pointer moved with no button held. Returns true if it is over a
    /// sensor.
    pub fn tracker_moved<S: RenderScene + ?Sized>(
        &mut self,
        graph: &mut SceneGraph,
        scene: &S,
        state: &TrackerState,
    ) -> bool {
        self.check_sub_mode(state.modifiers.alt);
        if !self.picking_enabled {
            return false;
        }
        let hit = self.pointer_hit(scene, state.position);
        self.tracker.update_over(graph, scene, hit.as_ref())
    }

    /// Button pressed. Returns true if a sensor or navigation took it.
    pub fn tracker_pressed<S: RenderScene + ?Sized>(
        &mut self,
        graph: &mut SceneGraph,
        scene: &S,
        state: &TrackerState,
    ) -> bool {
        self.check_sub_mode(state.modifiers.alt);
        let mode = self.button_mode(state.button);
        let track_shift = state.modifiers.shift
            && matches!(mode, NavigationMode::TrackExamine | NavigationMode::TrackPan);

        if self.picking_enabled && !track_shift {
            let hit = self.pointer_hit(scene, state.position);
            self.tracker.update_over(graph, scene, hit.as_ref());
            if self.tracker.press(graph, hit.as_ref()) {
                self.state = HandlerState::Sensor;
                return true;
            }
        }
        if !self.navigation_enabled {
            return false;
        }

        if mode == NavigationMode::None {
            self.state = HandlerState::Idle;
            return false;
        }
        let previous = self.navigation.mode();
        let effective = if mode == NavigationMode::TrackExamine && self.alt {
            NavigationMode::TrackPan
        } else {
            mode
        };
        self.navigation.set_mode(effective);
        let restore = (effective != previous).then_some(previous);
        if effective == NavigationMode::LookAt {
            self.recentre(scene, state.position, LOOK_AT_APPROACH, false);
        } else {
            self.navigation.start_move(scene);
        }
        self.state = HandlerState::Navigating {
            mode,
            start: state.position,
            restore,
            dragged: false,
            track_shift: track_shift && mode == NavigationMode::TrackExamine,
        };
        true
    }

    /// Pointer moved with a button held
    pub fn tracker_dragged<S: RenderScene + ?Sized>(
        &mut self,
        graph: &mut SceneGraph,
        scene: &S,
        state: &TrackerState,
    ) -> bool {
        self.check_sub_mode(state.modifiers.alt);
        if self.state == HandlerState::Sensor {
            let ray = self.pointer_ray(state.position);
            let hit = self.pointer_hit(scene, state.position);
            self.tracker.update_over(graph, scene, hit.as_ref());
            return self.tracker.drag(graph, &ray);
        }
        let HandlerState::Navigating {
            mode, start, dragged, ..
        } = &mut self.state
        else {
            return false;
        };
        *dragged = true;
        let x_dif = start.x - state.position.x;
        let y_dif = state.position.y - start.y;
        let direction = drag_direction(*mode, state.modifiers, x_dif, y_dif);
        if matches!(*mode, NavigationMode::TrackExamine | NavigationMode::TrackPan) {
            *start = state.position;
        }
        let (direction, scale) = split_magnitude(direction);
        self.navigation.move_by(direction, scale);
        true
    }

    /// Button released. Returns true if it ended a sensor press or a
    /// navigation drag.
    pub fn tracker_released<S: RenderScene + ?Sized>(
        &mut self,
        graph: &mut SceneGraph,
        scene: &S,
        state: &TrackerState,
    ) -> bool {
        self.check_sub_mode(state.modifiers.alt);
        match std::mem::replace(&mut self.state, HandlerState::Idle) {
            HandlerState::Idle => false,
            HandlerState::Sensor => {
                let hit = self.pointer_hit(scene, state.position);
                self.tracker.update_over(graph, scene, hit.as_ref());
                self.tracker.release(graph, state.time, hit.as_ref())
            }
            HandlerState::Navigating {
                restore,
                dragged,
                track_shift,
                ..
            } => {
                self.navigation.stop_move();
                if let Some(mode) = restore {
                    self.navigation.set_mode(mode);
                }
                if track_shift && !dragged {
                    self.recentre(scene, state.position, TRACK_RECENTRE_APPROACH, true);
                }
                true
            }
        }
    }

    /// Wheel zooms in examine mode; the zoom lands on the next frame
    pub fn tracker_wheel(&mut self, state: &TrackerState) -> bool {
        if !self.navigation_enabled || self.navigation.mode() != NavigationMode::Examine {
            return false;
        }
        self.navigation.move_by(Vec3::new(0.0, 0.0, state.wheel_clicks), 1.0);
        self.wheel_moved = true;
        true
    }

    /// Device orientation, applied as a one-shot look direction
    pub fn tracker_orientation<S: RenderScene + ?Sized>(&mut self, direction: Vec3, scene: &S) -> bool {
        self.navigation.orient(direction, scene)
    }

    /// Advance navigation by one frame. Returns true if the view moved.
    pub fn process_navigation<S: RenderScene + ?Sized>(&mut self, dt: f32, scene: &S) -> bool {
        if !self.navigation_enabled {
            return false;
        }
        let navigating = self.is_navigating();
        if !navigating && !self.wheel_moved {
            return false;
        }
        self.wheel_moved = false;
        self.navigation.process_frame(dt, scene)
    }

    /// Drop any press in progress without emitting events
    pub fn clear(&mut self) {
        self.state = HandlerState::Idle;
        self.wheel_moved = false;
        self.tracker.clear();
        self.navigation.clear();
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn button_mode(&self, button: PointerButton) -> NavigationMode {
        match self.button_modes[button.index()] {
            ButtonMode::Bound(0) => self.navigation.mode(),
            ButtonMode::Bound(index) => self
                .navigation
                .allowed_modes()
                .get(index)
                .copied()
                .unwrap_or_else(|| self.navigation.mode()),
            ButtonMode::Fixed(mode) if self.navigation.is_allowed(mode) => mode,
            ButtonMode::Fixed(_) | ButtonMode::Nothing => NavigationMode::None,
        }
    }

    /// Alt flips a track-examine drag into track-pan and back
    fn check_sub_mode(&mut self, alt: bool) {
        if alt != self.alt {
            if let HandlerState::Navigating {
                mode: NavigationMode::TrackExamine,
                ..
            } = self.state
            {
                let sub = if alt {
                    NavigationMode::TrackPan
                } else {
                    NavigationMode::TrackExamine
                };
                self.navigation.set_mode(sub);
            }
        }
        self.alt = alt;
    }

    /// Re-centre the orbit on what lies under the pointer and move the
    /// camera `approach` of the way towards it. On the surface the picked
    /// point is the centre, otherwise the centre of the picked shape.
    fn recentre<S: RenderScene + ?Sized>(&mut self, scene: &S, position: Vec2, approach: f32, on_surface: bool) -> bool {
        let Some(hit) = self.pointer_hit(scene, position) else {
            return false;
        };
        let center = if on_surface {
            hit.point
        } else {
            match hit.path.terminal() {
                Some(object) => scene.world_bounds(object).center(),
                None => return false,
            }
        };
        let user = self.navigation.position();
        let look_from = user + (hit.point - user) * approach;
        self.navigation.set_center_of_rotation(center, Some(look_from), on_surface);
        true
    }
}

/// Navigation input for a drag of `x_dif` (start minus current) and
/// `y_dif` (current minus start)
pub fn drag_direction(mode: NavigationMode, modifiers: Modifiers, x_dif: f32, y_dif: f32) -> Vec3 {
    match mode {
        NavigationMode::Walk | NavigationMode::Fly | NavigationMode::Inspect => Vec3::new(x_dif, 0.0, y_dif),
        NavigationMode::Pan => Vec3::new(-x_dif, -y_dif, 0.0),
        NavigationMode::Tilt => Vec3::new(x_dif, -y_dif, 0.0),
        NavigationMode::Examine => Vec3::new(x_dif, y_dif, 0.0),
        NavigationMode::TrackExamine if modifiers.alt => Vec3::new(x_dif, y_dif, 0.0),
        NavigationMode::TrackExamine if modifiers.ctrl => Vec3::new(0.0, 0.0, y_dif),
        NavigationMode::TrackExamine => Vec3::new(-x_dif, -y_dif, 0.0),
        NavigationMode::TrackPan => Vec3::new(x_dif, y_dif, 0.0),
        NavigationMode::None | NavigationMode::LookAt => Vec3::ZERO,
    }
}

/// Unit direction and magnitude; a zero input becomes +Y with scale 0
pub fn split_magnitude(v: Vec3) -> (Vec3, f32) {
    let scale = v.length();
    if scale == 0.0 {
        (Vec3::UP, 0.0)
    } else {
        (v * (1.0 / scale), scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use crate::render::{ObjectData, TriangleMesh};
    use crate::tracker::SensorState;
    use x3d_core::Mat4;
    use x3d_nodes::{NodeHandle, NodeKind};

    /// Unit cube at z = -5 in front of a camera at the origin, optionally
    /// under a TouchSensor group
    fn scene(graph: &mut SceneGraph, with_sensor: bool) -> (MemoryScene, Option<NodeHandle>) {
        let mut scene = MemoryScene::new();
        let root = scene.root();
        let sensor = with_sensor.then(|| graph.create_node(NodeKind::TouchSensor));
        let group_data = match sensor {
            Some(s) => ObjectData::default().with_sensor(s),
            None => ObjectData::default(),
        };
        let group = scene.add_group(root, Mat4::IDENTITY, group_data).unwrap();
        scene
            .add_shape(
                group,
                Mat4::translation(0.0, 0.0, -5.0),
                TriangleMesh::cuboid(Vec3::ONE),
                ObjectData::default(),
            )
            .unwrap();
        (scene, sensor)
    }

    fn handler() -> InputHandler {
        let mut handler = InputHandler::default();
        handler.navigation_mut().set_view(Mat4::IDENTITY, Mat4::IDENTITY);
        handler
    }

    #[test]
    fn test_drag_direction_per_mode() {
        let none = Modifiers::default();
        assert_eq!(drag_direction(NavigationMode::Walk, none, 0.2, 0.4), Vec3::new(0.2, 0.0, 0.4));
        assert_eq!(drag_direction(NavigationMode::Pan, none, 0.2, 0.4), Vec3::new(-0.2, -0.4, 0.0));
        assert_eq!(drag_direction(NavigationMode::Tilt, none, 0.2, 0.4), Vec3::new(0.2, -0.4, 0.0));
        assert_eq!(drag_direction(NavigationMode::Examine, none, 0.2, 0.4), Vec3::new(0.2, 0.4, 0.0));
        let ctrl = Modifiers {
            ctrl: true,
            ..Default::default()
        };
        assert_eq!(
            drag_direction(NavigationMode::TrackExamine, ctrl, 0.2, 0.4),
            Vec3::new(0.0, 0.0, 0.4)
        );
    }

    #[test]
    fn test_split_magnitude() {
        let (dir, scale) = split_magnitude(Vec3::new(3.0, 0.0, 4.0));
        assert!((scale - 5.0).abs() < 1e-6);
        assert!((dir.x - 0.6).abs() < 1e-6);
        assert_eq!(split_magnitude(Vec3::ZERO), (Vec3::UP, 0.0));
    }

    #[test]
    fn test_sensor_takes_press() {
        let mut graph = SceneGraph::new();
        let (scene, sensor) = scene(&mut graph, true);
        let sensor = sensor.unwrap();
        let mut handler = handler();
        let press = TrackerState::at(0.0, 0.0).with_time(3.0);

        assert!(handler.tracker_moved(&mut graph, &scene, &press));
        assert!(handler.tracker_pressed(&mut graph, &scene, &press));
        assert_eq!(handler.tracker().state(sensor), SensorState::Dragging);
        assert!(!handler.is_navigating());
        assert!(!handler.navigation().is_moving());

        assert!(handler.tracker_released(&mut graph, &scene, &press));
        assert_eq!(graph.get_double(sensor, "touchTime"), Some(3.0));
    }

    #[test]
    fn test_press_on_empty_space_walks() {
        let mut graph = SceneGraph::new();
        let (scene, _) = scene(&mut graph, false);
        let mut handler = handler();
        handler.navigation_mut().set_mode(NavigationMode::Walk);

        assert!(handler.tracker_pressed(&mut graph, &scene, &TrackerState::at(0.9, 0.9)));
        assert!(handler.navigation().is_moving());
        assert!(handler.tracker_dragged(&mut graph, &scene, &TrackerState::at(0.9, 0.5)));
        assert!(handler.process_navigation(0.1, &scene));
        let position = handler.navigation().position();
        assert!((position.z + 0.2).abs() < 1e-4);
        assert!(position.x.abs() < 1e-4);

        assert!(handler.tracker_released(&mut graph, &scene, &TrackerState::at(0.9, 0.5)));
        assert!(!handler.navigation().is_moving());
        assert!(!handler.process_navigation(0.1, &scene));
    }

    #[test]
    fn test_look_at_recentres_and_reverts() {
        let mut graph = SceneGraph::new();
        let (scene, _) = scene(&mut graph, false);
        let mut handler = handler();
        handler.set_button_mode(PointerButton::Secondary, ButtonMode::Fixed(NavigationMode::LookAt));
        let press = TrackerState::at(0.0, 0.0).with_button(PointerButton::Secondary);

        assert!(handler.tracker_pressed(&mut graph, &scene, &press));
        assert_eq!(handler.navigation().mode(), NavigationMode::LookAt);
        let center = handler.navigation().center_of_rotation();
        assert!((center.z + 5.0).abs() < 1e-4);
        assert!((handler.navigation().rotation_radius() - 2.75).abs() < 1e-4);
        assert!((handler.navigation().position().z + 2.25).abs() < 1e-4);

        assert!(handler.tracker_released(&mut graph, &scene, &press));
        assert_eq!(handler.navigation().mode(), NavigationMode::Examine);
    }

    #[test]
    fn test_wheel_zooms_only_in_examine() {
        let scene = MemoryScene::new();
        let mut handler = InputHandler::default();
        handler
            .navigation_mut()
            .set_view(Mat4::translation(0.0, 0.0, 10.0), Mat4::IDENTITY);
        handler.navigation_mut().set_center_of_rotation(Vec3::ZERO, None, false);

        assert!(handler.tracker_wheel(&TrackerState::default().with_wheel(-5.0)));
        assert!(handler.process_navigation(0.016, &scene));
        assert!((handler.navigation().rotation_radius() - 5.0).abs() < 1e-4);
        assert!(!handler.process_navigation(0.016, &scene));

        handler.navigation_mut().set_mode(NavigationMode::Walk);
        assert!(!handler.tracker_wheel(&TrackerState::default().with_wheel(-5.0)));
    }

    #[test]
    fn test_disallowed_button_mode_does_nothing() {
        let mut graph = SceneGraph::new();
        let (scene, _) = scene(&mut graph, false);
        let mut config = NavigationConfig::default();
        config.modes = vec!["WALK".to_string()];
        let mut handler = InputHandler::new(&config, 10);
        handler.set_button_mode(PointerButton::Middle, ButtonMode::Fixed(NavigationMode::Fly));
        let press = TrackerState::at(0.9, 0.9).with_button(PointerButton::Middle);
        assert!(!handler.tracker_pressed(&mut graph, &scene, &press));
        assert_eq!(handler.navigation().mode(), NavigationMode::Walk);
    }
}
