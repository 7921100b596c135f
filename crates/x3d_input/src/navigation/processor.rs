//! Per-frame camera motion for every navigation mode.

use super::{AvatarRepresentation, CollisionListener, NavigationMode, NavigationStateListener};
use crate::config::NavigationConfig;
use crate::error::{InputError, Result};
use crate::pick::{PickRequest, PickShape, PickSort, ALL_MASK};
use crate::render::{ObjectData, ObjectId, RenderScene};
use smallvec::SmallVec;
use std::f32::consts::{PI, TAU};
use x3d_core::intersect::{ray_triangle, segment_triangle};
use x3d_core::{AxisAngle, Mat4, Mat4Ext, Quat, Ray, Segment, Vec3};
use x3d_nodes::{ListenerId, ListenerList, NodeHandle, NodeKind, SceneGraph};

/// Default-motion scale per millisecond of frame time
const MOTION_DELAY_PER_MS: f32 = 0.005;

/// Track modes move this much faster than the plain ones
const TRACK_SPEED_FACTOR: f32 = 16.0;

const FLOAT_EPSILON: f32 = 1e-6;

/// Camera placement reported to viewpoint and proximity consumers
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    pub position: Vec3,
    pub orientation: AxisAngle,
}

/// Moves the bound viewpoint in response to navigation input.
///
/// The view transform is the viewpoint's eye-to-parent matrix;
/// `view_parent` maps the viewpoint's parent space to world space. The
/// centre of rotation lives in the parent space.
pub struct NavigationProcessor {
    mode: NavigationMode,
    allowed: SmallVec<[NavigationMode; 4]>,
    any_allowed: bool,

    view: Mat4,
    view_parent: Mat4,
    has_view: bool,

    center: Vec3,
    rotation_radius: f32,
    last_angle: f32,

    input_rotation_x: f32,
    input_rotation_y: f32,
    drag: Vec3,
    moving: bool,
    allow_collisions: bool,
    allow_terrain: bool,

    look_direction: Vec3,
    look_undo: Option<Mat4>,
    last_terrain_height: Option<f32>,

    speed: f32,
    orbit_time: f32,
    world_scale: f32,
    visibility_limit: f32,
    min_examine_radius: f32,
    avatar: AvatarRepresentation,
    avatar_height: f32,
    avatar_size: f32,
    avatar_step: f32,
    base_avatar: (f32, f32, f32),

    terrain_root: Option<ObjectId>,
    collision_root: Option<ObjectId>,
    request: PickRequest,

    state_listeners: ListenerList<dyn NavigationStateListener>,
    collision_listeners: ListenerList<dyn CollisionListener>,
}

impl std::fmt::Debug for NavigationProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationProcessor")
            .field("mode", &self.mode)
            .field("position", &self.position())
            .field("center", &self.center)
            .field("rotation_radius", &self.rotation_radius)
            .field("moving", &self.moving)
            .finish()
    }
}

impl Default for NavigationProcessor {
    fn default() -> Self {
        Self::new(&NavigationConfig::default())
    }
}

impl NavigationProcessor {
    pub fn new(config: &NavigationConfig) -> Self {
        let scale = config.world_scale;
        let mut processor = Self {
            mode: NavigationMode::None,
            allowed: SmallVec::new(),
            any_allowed: true,
            view: Mat4::translation(0.0, 0.0, 10.0),
            view_parent: Mat4::IDENTITY,
            has_view: false,
            center: Vec3::ZERO,
            rotation_radius: 10.0,
            last_angle: 0.0,
            input_rotation_x: 0.0,
            input_rotation_y: 0.0,
            drag: Vec3::ZERO,
            moving: false,
            allow_collisions: false,
            allow_terrain: false,
            look_direction: Vec3::ZERO,
            look_undo: None,
            last_terrain_height: None,
            speed: config.speed,
            orbit_time: config.orbit_time,
            world_scale: scale,
            visibility_limit: 0.0,
            min_examine_radius: config.min_examine_radius,
            avatar: config.avatar,
            avatar_height: config.avatar_height * scale,
            avatar_size: config.avatar_size * scale,
            avatar_step: config.avatar_step * scale,
            base_avatar: (config.avatar_height, config.avatar_size, config.avatar_step),
            terrain_root: None,
            collision_root: None,
            request: PickRequest::new(PickShape::Point(Vec3::ZERO)),
            state_listeners: ListenerList::new(),
            collision_listeners: ListenerList::new(),
        };
        processor.set_allowed_modes(config.modes.iter().map(String::as_str));
        if let Some(first) = processor.allowed.first().copied() {
            processor.mode = first;
        }
        processor
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn add_state_listener(&mut self, listener: Box<dyn NavigationStateListener>) -> ListenerId {
        self.state_listeners.add(listener)
    }

    pub fn remove_state_listener(&mut self, id: ListenerId) -> bool {
        self.state_listeners.remove(id).is_some()
    }

    pub fn add_collision_listener(&mut self, listener: Box<dyn CollisionListener>) -> ListenerId {
        self.collision_listeners.add(listener)
    }

    pub fn remove_collision_listener(&mut self, id: ListenerId) -> bool {
        self.collision_listeners.remove(id).is_some()
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Bind the view to an explicit transform pair. Orbit modes measure
    /// the rotation radius from the new eye position.
    pub fn set_view(&mut self, view: Mat4, parent_to_world: Mat4) {
        self.view = view;
        self.view_parent = parent_to_world;
        self.has_view = true;
        self.look_undo = None;
        if self.mode.orbits() {
            let offset = view.get_translation() - self.center;
            self.rotation_radius = if self.mode == NavigationMode::Inspect {
                Vec3::new(offset.x, 0.0, offset.z).length()
            } else {
                offset.length()
            };
        }
    }

    /// Bind a Viewpoint node: position, orientation and centre of rotation
    pub fn bind_viewpoint(&mut self, graph: &SceneGraph, viewpoint: NodeHandle, parent_to_world: Mat4) -> Result<()> {
        let kind = graph.node_kind(viewpoint).unwrap_or(NodeKind::MetadataString);
        if kind != NodeKind::Viewpoint {
            return Err(InputError::UnsupportedNode {
                expected: "Viewpoint",
                found: kind.name(),
            });
        }
        let position = graph.get_vec3(viewpoint, "position").unwrap_or(Vec3::new(0.0, 0.0, 10.0));
        let rotation = graph
            .get_floats(viewpoint, "orientation")
            .filter(|r| r.len() >= 4)
            .map_or(Mat4::IDENTITY, |r| {
                let axis = Vec3::new(r[0], r[1], r[2]);
                if axis.is_zero() {
                    Mat4::IDENTITY
                } else {
                    Mat4::rotation_axis(axis.normalize(), r[3])
                }
            });
        let mut view = rotation;
        view.set_translation(position);
        self.set_view(view, parent_to_world);
        self.center = graph.get_vec3(viewpoint, "centerOfRotation").unwrap_or(Vec3::ZERO);
        self.rotation_radius = position.distance(self.center);
        tracing::debug!(?viewpoint, ?position, "viewpoint bound");
        Ok(())
    }

    /// Groups searched for terrain and collidable geometry
    pub fn set_world_roots(&mut self, terrain: Option<ObjectId>, collidables: Option<ObjectId>) {
        self.terrain_root = terrain;
        self.collision_root = collidables;
    }

    /// Avatar dimensions in world units before world scaling
    pub fn set_avatar_info(&mut self, height: f32, size: f32, step: f32) {
        self.base_avatar = (height, size, step);
        self.apply_avatar_scale();
    }

    pub fn set_avatar_representation(&mut self, avatar: AvatarRepresentation) {
        self.avatar = avatar;
    }

    pub fn set_world_scale(&mut self, scale: f32) -> Result<()> {
        if !(scale > 0.0) {
            return Err(InputError::setting("world_scale", format!("{scale} is not positive")));
        }
        self.world_scale = scale;
        self.apply_avatar_scale();
        Ok(())
    }

    fn apply_avatar_scale(&mut self) {
        let (height, size, step) = self.base_avatar;
        self.avatar_height = height * self.world_scale;
        self.avatar_size = size * self.world_scale;
        self.avatar_step = step * self.world_scale;
    }

    pub fn set_navigation_speed(&mut self, speed: f32) -> Result<()> {
        if !(speed >= 0.0) {
            return Err(InputError::setting("speed", format!("negative speed {speed}")));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn set_orbit_time(&mut self, seconds: f32) -> Result<()> {
        if !(seconds > 0.0) {
            return Err(InputError::setting("orbit_time", format!("{seconds} is not positive")));
        }
        self.orbit_time = seconds;
        Ok(())
    }

    /// Take speed, avatar size, visibility limit and navigation types from
    /// a NavigationInfo node
    pub fn apply_navigation_info(&mut self, graph: &SceneGraph, info: NodeHandle) -> Result<()> {
        let kind = graph.node_kind(info).unwrap_or(NodeKind::MetadataString);
        if kind != NodeKind::NavigationInfo {
            return Err(InputError::UnsupportedNode {
                expected: "NavigationInfo",
                found: kind.name(),
            });
        }
        if let Some(speed) = graph.get_float(info, "speed") {
            self.set_navigation_speed(speed)?;
        }
        if let Some(avatar) = graph.get_floats(info, "avatarSize") {
            let (mut height, mut size, mut step) = self.base_avatar;
            if let Some(v) = avatar.first() {
                size = *v;
            }
            if let Some(v) = avatar.get(1) {
                height = *v;
            }
            if let Some(v) = avatar.get(2) {
                step = *v;
            }
            self.set_avatar_info(height, size, step);
        }
        self.visibility_limit = graph.get_float(info, "visibilityLimit").unwrap_or(0.0);
        let types = graph.get_strings(info, "type").map(<[String]>::to_vec).unwrap_or_default();
        self.set_allowed_modes(types.iter().map(String::as_str));
        match self.allowed.first().copied() {
            Some(first) => self.set_mode(first),
            None if !self.any_allowed => self.set_mode(NavigationMode::None),
            None => {}
        }
        tracing::debug!(?info, speed = self.speed, mode = %self.mode, "navigation info applied");
        Ok(())
    }

    fn set_allowed_modes<'a>(&mut self, names: impl Iterator<Item = &'a str>) {
        self.allowed.clear();
        self.any_allowed = false;
        for name in names {
            if name == "ANY" {
                self.any_allowed = true;
            } else if let Some(mode) = NavigationMode::from_name(name) {
                if !self.allowed.contains(&mode) {
                    self.allowed.push(mode);
                }
            } else {
                tracing::warn!(name, "unknown navigation type ignored");
            }
        }
    }

    /// Modes listed by the bound NavigationInfo, in order
    pub fn allowed_modes(&self) -> &[NavigationMode] {
        &self.allowed
    }

    /// Whether the user may switch to `mode`
    pub fn is_allowed(&self, mode: NavigationMode) -> bool {
        self.any_allowed || self.allowed.contains(&mode)
    }

    pub fn set_mode(&mut self, mode: NavigationMode) {
        if mode == self.mode {
            return;
        }
        tracing::debug!(from = %self.mode, to = %mode, "navigation mode changed");
        self.mode = mode;
        self.state_listeners
            .notify("navigation_state_changed", |l| l.navigation_state_changed(mode));
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Eye-to-parent transform
    pub fn view_transform(&self) -> Mat4 {
        self.view
    }

    /// Eye-to-world transform
    pub fn world_view(&self) -> Mat4 {
        self.view_parent.mul(&self.view)
    }

    /// World-space eye position; (0, 0, 10) until a view is bound
    pub fn position(&self) -> Vec3 {
        if !self.has_view {
            return Vec3::new(0.0, 0.0, 10.0);
        }
        self.world_view().get_translation()
    }

    pub fn orientation(&self) -> AxisAngle {
        if !self.has_view {
            return AxisAngle::default();
        }
        Quat::from_mat4(&self.world_view()).to_axis_angle()
    }

    pub fn view_state(&self) -> ViewState {
        ViewState {
            position: self.position(),
            orientation: self.orientation(),
        }
    }

    /// Centre of rotation in the viewpoint's parent space
    pub fn center_of_rotation(&self) -> Vec3 {
        self.center
    }

    pub fn world_center_of_rotation(&self) -> Vec3 {
        self.view_parent.transform_point(self.center)
    }

    pub fn rotation_radius(&self) -> f32 {
        self.rotation_radius
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Collision radius after world scaling
    pub fn avatar_size(&self) -> f32 {
        self.avatar_size
    }

    pub fn avatar_height(&self) -> f32 {
        self.avatar_height
    }

    /// NavigationInfo visibility limit; zero means unlimited
    pub fn visibility_limit(&self) -> f32 {
        self.visibility_limit
    }

    // =========================================================================
    // Movement
    // =========================================================================

    /// Re-centre the orbit. `look_from` defaults to the current eye
    /// position; with `preserve_up` the current up vector is kept instead
    /// of world +Y. Both points are in world space.
    pub fn set_center_of_rotation(&mut self, center: Vec3, look_from: Option<Vec3>, preserve_up: bool) {
        let to_parent = self.view_parent.inverse();
        self.center = to_parent.transform_point(center);
        if !self.mode.orbits() {
            return;
        }
        let eye = look_from.map_or(self.view.get_translation(), |p| to_parent.transform_point(p));
        let offset = eye - self.center;
        self.last_angle = offset.z.atan2(offset.x);
        self.rotation_radius = if self.mode == NavigationMode::Inspect {
            Vec3::new(offset.x, 0.0, offset.z).length()
        } else {
            offset.length()
        };
        let up = if preserve_up { self.view.up_vector() } else { Vec3::UP };
        self.view = Mat4::camera_look_at(eye, self.center, up);
        self.has_view = true;
        tracing::debug!(center = ?self.center, radius = self.rotation_radius, "centre of rotation set");
    }

    /// Begin a movement; collision and terrain toggles are decided here
    pub fn start_move<S: RenderScene + ?Sized>(&mut self, scene: &S) {
        if self.moving || matches!(self.mode, NavigationMode::None | NavigationMode::LookAt) {
            return;
        }
        self.moving = true;
        self.input_rotation_x = 0.0;
        self.input_rotation_y = 0.0;
        self.drag = Vec3::ZERO;
        let (collisions, terrain) = match self.mode {
            NavigationMode::Walk => (self.collision_root.is_some(), self.terrain_root.is_some()),
            NavigationMode::Fly => (self.collision_root.is_some(), false),
            _ => (false, false),
        };
        self.allow_collisions = collisions;
        self.allow_terrain = terrain;
        if terrain {
            self.last_terrain_height = None;
            let origin = self.world_view().get_translation();
            if let Some(ground) = self.ground_below(scene, origin) {
                self.last_terrain_height = Some(ground.y);
            }
        }
        if self.mode == NavigationMode::Inspect {
            let eye = self.view.get_translation();
            let offset = eye - self.center;
            self.rotation_radius = Vec3::new(offset.x, 0.0, offset.z).length();
            self.last_angle = offset.z.atan2(offset.x);
            self.view = Mat4::camera_look_at(eye, self.center, Vec3::UP);
        }
        tracing::trace!(mode = %self.mode, collisions, terrain, "move started");
    }

    /// Feed one input sample. `direction` is normalized, `scale` its
    /// original magnitude.
    pub fn move_by(&mut self, direction: Vec3, scale: f32) {
        let scale = if self.speed == 0.0 { 0.0 } else { scale };
        let scaled_speed = self.speed * scale * self.world_scale;
        match self.mode {
            NavigationMode::Fly => {
                self.drag = Vec3::new(0.0, 0.0, direction.z * scaled_speed);
                self.input_rotation_y = direction.x * scale;
                self.input_rotation_x = direction.y * scaled_speed;
            }
            NavigationMode::Pan => {
                self.drag = direction * scaled_speed;
            }
            NavigationMode::Tilt => {
                self.input_rotation_x = direction.y * scale;
                self.input_rotation_y = direction.x * scale;
            }
            NavigationMode::Walk => {
                self.drag = Vec3::new(0.0, 0.0, direction.z * scaled_speed);
                self.input_rotation_y = direction.x * scale;
            }
            NavigationMode::Examine => {
                // Zoom is in wheel clicks, not speed units
                self.drag = Vec3::new(0.0, 0.0, direction.z);
                self.input_rotation_y = direction.x * scale;
                self.input_rotation_x = direction.y * scale;
            }
            NavigationMode::Inspect => {
                self.drag = Vec3::new(0.0, 0.0, direction.z * scaled_speed);
                self.input_rotation_y = direction.x * scale;
                self.input_rotation_x = direction.y * scale;
            }
            NavigationMode::TrackExamine => {
                self.drag = Vec3::new(0.0, 0.0, direction.z * scaled_speed * TRACK_SPEED_FACTOR);
                self.input_rotation_y = direction.x * scale;
                self.input_rotation_x = direction.y * scale;
            }
            NavigationMode::TrackPan => {
                self.drag = Vec3::new(
                    direction.x * scaled_speed * TRACK_SPEED_FACTOR,
                    direction.y * scaled_speed * TRACK_SPEED_FACTOR,
                    0.0,
                );
            }
            NavigationMode::None | NavigationMode::LookAt => {}
        }
    }

    pub fn stop_move(&mut self) {
        self.moving = false;
        self.allow_collisions = false;
        self.allow_terrain = false;
        self.input_rotation_x = 0.0;
        self.input_rotation_y = 0.0;
        self.drag = Vec3::ZERO;
    }

    /// Look along Euler `direction` for one frame; the next frame undoes it
    pub fn orient<S: RenderScene + ?Sized>(&mut self, direction: Vec3, scene: &S) -> bool {
        self.look_direction = direction;
        self.input_rotation_x = 0.0;
        self.input_rotation_y = 0.0;
        self.drag = Vec3::ZERO;
        self.default_motion(0.0, scene)
    }

    /// Apply one frame of motion. Returns true if the view moved.
    pub fn process_frame<S: RenderScene + ?Sized>(&mut self, dt: f32, scene: &S) -> bool {
        let dt = dt.max(0.001);
        let changed = match self.mode {
            NavigationMode::Examine => {
                let rotated = self.examine_motion(dt);
                self.radial_motion(true) || rotated
            }
            NavigationMode::Inspect => self.inspect_motion(dt),
            NavigationMode::TrackExamine => {
                let rotated = self.track_examine_motion();
                self.radial_motion(false) || rotated
            }
            NavigationMode::TrackPan => self.track_pan_motion(),
            NavigationMode::LookAt => false,
            _ => self.default_motion(dt, scene),
        };
        if changed {
            tracing::trace!(position = ?self.view.get_translation(), "view moved");
        }
        changed
    }

    /// Reset per-move state and forget terrain history
    pub fn clear(&mut self) {
        self.stop_move();
        self.look_direction = Vec3::ZERO;
        self.look_undo = None;
        self.last_terrain_height = None;
        self.request.reset(PickShape::Point(Vec3::ZERO), PickSort::Closest, ALL_MASK);
    }

    // =========================================================================
    // Orbit modes
    // =========================================================================

    fn orbit(&mut self, theta_x: f32, theta_y: f32) {
        let eye = self.view.get_translation();
        let up = self.view.up_vector();
        let right = self.view.right_vector();
        let rotation = Mat4::rotation_axis(up, -theta_y).mul(&Mat4::rotation_axis(right, theta_x));
        let eye = self.center + rotation.transform_vector(eye - self.center);
        self.view = Mat4::camera_look_at(eye, self.center, up);
    }

    fn examine_motion(&mut self, dt: f32) -> bool {
        if self.input_rotation_x == 0.0 && self.input_rotation_y == 0.0 {
            return false;
        }
        let per_second = TAU / self.orbit_time;
        self.orbit(
            self.input_rotation_x * per_second * dt,
            self.input_rotation_y * per_second * dt,
        );
        true
    }

    fn track_examine_motion(&mut self) -> bool {
        if self.input_rotation_x == 0.0 && self.input_rotation_y == 0.0 {
            return false;
        }
        self.orbit(self.input_rotation_x * PI, self.input_rotation_y * PI);
        self.input_rotation_x = 0.0;
        self.input_rotation_y = 0.0;
        true
    }

    /// Zoom towards the centre, multiplicative in wheel clicks or additive
    fn radial_motion(&mut self, multiplicative: bool) -> bool {
        if self.drag.z == 0.0 {
            return false;
        }
        let offset = self.view.get_translation() - self.center;
        let distance = offset.length();
        let direction = if distance > FLOAT_EPSILON {
            offset.normalize()
        } else {
            self.view.transform_vector(Vec3::new(0.0, 0.0, 1.0)).normalize()
        };
        let radius = if multiplicative {
            distance * (1.0 + self.drag.z / 10.0)
        } else {
            distance + self.drag.z
        };
        self.rotation_radius = radius.max(self.min_examine_radius);
        self.view.set_translation(self.center + direction * self.rotation_radius);
        self.drag.z = 0.0;
        true
    }

    /// Horizontal orbit at a fixed height. The running angle wraps once
    /// past 2π and is otherwise unbounded.
    fn inspect_motion(&mut self, dt: f32) -> bool {
        let eye = self.view.get_translation();
        let mut changed = false;
        if self.drag.z != 0.0 {
            let offset = eye - self.center;
            self.rotation_radius = Vec3::new(offset.x, 0.0, offset.z).length() + self.drag.z;
            changed = true;
        }
        if self.input_rotation_y != 0.0 {
            let mut total = self.last_angle + self.input_rotation_y * TAU * dt / self.orbit_time;
            if total > TAU {
                total -= TAU;
            }
            self.last_angle = total;
            changed = true;
        }
        if changed {
            let eye = Vec3::new(
                self.center.x + self.rotation_radius * self.last_angle.cos(),
                eye.y,
                self.center.z + self.rotation_radius * self.last_angle.sin(),
            );
            self.view = Mat4::camera_look_at(eye, self.center, Vec3::UP);
        }
        changed
    }

    fn track_pan_motion(&mut self) -> bool {
        if self.drag.x == 0.0 && self.drag.y == 0.0 {
            return false;
        }
        let up = self.view.up_vector();
        let shift = up * self.drag.y + self.view.right_vector() * self.drag.x;
        let eye = self.view.get_translation() + shift;
        self.center += shift;
        self.view = Mat4::camera_look_at(eye, self.center, up);
        self.drag = Vec3::ZERO;
        true
    }

    // =========================================================================
    // Walk, fly, pan and tilt
    // =========================================================================

    fn default_motion<S: RenderScene + ?Sized>(&mut self, dt: f32, scene: &S) -> bool {
        let delay = MOTION_DELAY_PER_MS * dt * 1000.0;
        let mut view = self.view;
        let mut changed = false;

        if let Some(undo) = self.look_undo.take() {
            view = view.mul(&undo);
            changed = true;
        }
        if self.input_rotation_x != 0.0 {
            view = view.mul(&Mat4::rotation_x(self.input_rotation_x * delay));
            changed = true;
        }
        if self.input_rotation_y != 0.0 {
            view = view.mul(&Mat4::rotation_y(self.input_rotation_y * delay));
            changed = true;
        }

        let step = view.transform_vector(self.drag * delay);
        let mut world_step = self.view_parent.transform_vector(step);
        let origin = self.view_parent.mul(&view).get_translation();
        if self.allow_collisions && !world_step.is_zero() {
            world_step = self.slide(scene, origin, world_step);
        }
        if self.allow_terrain && !self.follow_terrain(scene, origin, &mut world_step) {
            world_step = Vec3::ZERO;
        }
        if !world_step.is_zero() {
            let local = self.view_parent.inverse().transform_vector(world_step);
            view.set_translation(view.get_translation() + local);
            changed = true;
        }

        if !self.look_direction.is_zero() {
            let look = Mat4::from_euler(self.look_direction);
            view = view.mul(&look);
            self.look_undo = Some(look.inverse());
            self.look_direction = Vec3::ZERO;
            changed = true;
        }
        self.view = view;
        changed
    }

    /// Drop only the world axes of `step` that run into geometry
    fn slide<S: RenderScene + ?Sized>(&mut self, scene: &S, origin: Vec3, step: Vec3) -> Vec3 {
        let Some(hit) = self.blocked(scene, origin, step) else {
            return step;
        };
        let mut kept = Vec3::ZERO;
        for axis in [
            Vec3::new(step.x, 0.0, 0.0),
            Vec3::new(0.0, step.y, 0.0),
            Vec3::new(0.0, 0.0, step.z),
        ] {
            if !axis.is_zero() && self.blocked(scene, origin, axis).is_none() {
                kept += axis;
            }
        }
        tracing::debug!(object = ?hit, ?step, ?kept, "avatar collision");
        self.collision_listeners
            .notify("avatar_collision", |l| l.avatar_collision(Some(hit)));
        kept
    }

    /// First collidable object hit when travelling `travel` from `origin`
    fn blocked<S: RenderScene + ?Sized>(&mut self, scene: &S, origin: Vec3, travel: Vec3) -> Option<ObjectId> {
        let root = self.collision_root?;
        let ahead = travel.normalize() * self.avatar_size + travel;
        let mut segments: SmallVec<[Segment; 2]> = SmallVec::new();
        match self.avatar {
            AvatarRepresentation::Point => segments.push(Segment::new(origin, origin + ahead)),
            AvatarRepresentation::Cylinder => {
                let knee = origin - Vec3::UP * (self.avatar_height - self.avatar_step);
                segments.push(Segment::new(origin, origin + ahead));
                segments.push(Segment::new(knee, knee + ahead));
            }
            AvatarRepresentation::Shoulders => {
                let across = self.world_view().right_vector() * self.avatar_size;
                let left = origin - across;
                let right = origin + across;
                segments.push(Segment::new(left, left + ahead));
                segments.push(Segment::new(right, right + ahead));
            }
        }
        segments.iter().find_map(|segment| {
            sweep(
                &mut self.request,
                scene,
                root,
                PickShape::Segment(*segment),
                |d| d.collidable,
                |tri| segment_triangle(segment, tri).map(|h| h.point),
            )
            .map(|(object, _)| object)
        })
    }

    fn ground_below<S: RenderScene + ?Sized>(&mut self, scene: &S, origin: Vec3) -> Option<Vec3> {
        let root = self.terrain_root?;
        let ray = Ray::new(origin, Vec3::DOWN);
        sweep(
            &mut self.request,
            scene,
            root,
            PickShape::Ray(ray),
            |d| d.terrain,
            |tri| ray_triangle(&ray, tri).map(|h| h.point),
        )
        .map(|(_, point)| point)
    }

    /// Keep the avatar at its height above the ground. Returns false when
    /// the ground ahead rises more than one step.
    fn follow_terrain<S: RenderScene + ?Sized>(&mut self, scene: &S, origin: Vec3, step: &mut Vec3) -> bool {
        let candidate = origin + *step;
        let Some(ground) = self.ground_below(scene, candidate) else {
            return true;
        };
        let Some(last) = self.last_terrain_height else {
            self.last_terrain_height = Some(ground.y);
            return true;
        };
        let terrain_step = (ground.y - last) * self.world_scale;
        let above = candidate.y - ground.y;
        if (above - self.avatar_height).abs() >= FLOAT_EPSILON {
            if terrain_step.abs() < FLOAT_EPSILON {
                step.y += self.avatar_height - above;
            } else if terrain_step < self.avatar_step {
                step.y += terrain_step;
            } else {
                tracing::trace!(terrain_step, "step too high");
                return false;
            }
        }
        self.last_terrain_height = Some(ground.y);
        true
    }
}

/// Nearest exact hit below `root` on objects whose whole path passes
/// `eligible`
fn sweep<S: RenderScene + ?Sized>(
    request: &mut PickRequest,
    scene: &S,
    root: ObjectId,
    shape: PickShape,
    eligible: fn(&ObjectData) -> bool,
    mut exact: impl FnMut([Vec3; 3]) -> Option<Vec3>,
) -> Option<(ObjectId, Vec3)> {
    request.reset(shape, PickSort::AllSorted, ALL_MASK);
    if scene.pick(root, request) == 0 {
        return None;
    }
    let origin = shape.origin();
    let mut best: Option<(ObjectId, Vec3, f32)> = None;
    for hit in request.hits() {
        let allowed = hit
            .path
            .objects
            .iter()
            .all(|o| scene.object_data(*o).map_or(true, eligible));
        if !allowed {
            continue;
        }
        let Some(object) = hit.path.terminal() else {
            continue;
        };
        let Some(mesh) = scene.mesh(object) else {
            continue;
        };
        let to_world = hit.path.local_to_world();
        for i in 0..mesh.triangle_count() {
            let Some(point) = mesh.world_triangle(i, &to_world).and_then(&mut exact) else {
                continue;
            };
            let d = point.distance_squared(origin);
            if best.map_or(true, |(_, _, nearest)| d < nearest) {
                best = Some((object, point, d));
            }
        }
    }
    best.map(|(object, point, _)| (object, point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;
    use crate::render::TriangleMesh;
    use std::cell::RefCell;
    use std::f32::consts::FRAC_PI_4;
    use std::rc::Rc;
    use x3d_nodes::{FieldValue, ListenerError};

    struct Collisions(Rc<RefCell<usize>>);

    impl CollisionListener for Collisions {
        fn avatar_collision(&mut self, _: Option<ObjectId>) -> std::result::Result<(), ListenerError> {
            *self.0.borrow_mut() += 1;
            Ok(())
        }
    }

    struct Modes(Rc<RefCell<Vec<NavigationMode>>>);

    impl NavigationStateListener for Modes {
        fn navigation_state_changed(&mut self, mode: NavigationMode) -> std::result::Result<(), ListenerError> {
            self.0.borrow_mut().push(mode);
            Ok(())
        }
    }

    fn examine_at(eye: Vec3) -> NavigationProcessor {
        let mut nav = NavigationProcessor::default();
        nav.set_mode(NavigationMode::Examine);
        nav.set_view(Mat4::camera_look_at(eye, Vec3::ZERO, Vec3::UP), Mat4::IDENTITY);
        nav.set_center_of_rotation(Vec3::ZERO, None, false);
        nav
    }

    #[test]
    fn test_defaults_from_config() {
        let nav = NavigationProcessor::default();
        assert_eq!(nav.mode(), NavigationMode::Examine);
        assert!(nav.is_allowed(NavigationMode::Walk));
        assert!((nav.avatar_size() - 0.25).abs() < 1e-6);
        assert_eq!(nav.position(), Vec3::new(0.0, 0.0, 10.0));
    }

    #[test]
    fn test_examine_zoom_monotonic_with_floor() {
        let scene = MemoryScene::new();
        let mut nav = examine_at(Vec3::new(0.0, 0.0, 10.0));
        assert!((nav.rotation_radius() - 10.0).abs() < 1e-4);

        nav.start_move(&scene);
        let mut last = nav.rotation_radius();
        for _ in 0..40 {
            nav.move_by(Vec3::new(0.0, 0.0, -3.0), 1.0);
            nav.process_frame(0.016, &scene);
            let radius = nav.rotation_radius();
            assert!(radius <= last + 1e-6);
            assert!(radius >= 0.01 - 1e-6);
            let distance = nav.position().distance(nav.center_of_rotation());
            assert!((distance - radius).abs() < 1e-3, "{distance} vs {radius}");
            last = radius;
        }
        assert!((last - 0.01).abs() < 1e-4);

        nav.move_by(Vec3::new(0.0, 0.0, 5.0), 1.0);
        nav.process_frame(0.016, &scene);
        assert!((nav.rotation_radius() - 0.015).abs() < 1e-4);
    }

    #[test]
    fn test_set_view_measures_orbit_radius() {
        let mut nav = NavigationProcessor::default();
        nav.set_mode(NavigationMode::Examine);
        nav.set_view(Mat4::translation(0.0, 3.0, 4.0), Mat4::IDENTITY);
        assert!((nav.rotation_radius() - 5.0).abs() < 1e-5);

        let mut walker = NavigationProcessor::default();
        walker.set_mode(NavigationMode::Walk);
        walker.set_view(Mat4::translation(0.0, 3.0, 4.0), Mat4::IDENTITY);
        assert!((walker.rotation_radius() - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_world_center_of_rotation() {
        let mut nav = examine_at(Vec3::new(0.0, 0.0, 10.0));
        nav.set_view(nav.view_transform(), Mat4::translation(5.0, 0.0, 0.0));
        assert_eq!(nav.center_of_rotation(), Vec3::ZERO);
        assert!(nav.world_center_of_rotation().distance(Vec3::new(5.0, 0.0, 0.0)) < 1e-5);
    }

    #[test]
    fn test_examine_orbit_keeps_radius() {
        let scene = MemoryScene::new();
        let mut nav = examine_at(Vec3::new(0.0, 2.0, 8.0));
        let radius = nav.rotation_radius();
        nav.start_move(&scene);
        nav.move_by(Vec3::new(1.0, 0.0, 0.0), 1.0);
        assert!(nav.process_frame(0.5, &scene));
        let eye = nav.position();
        assert!((eye.length() - radius).abs() < 1e-3);
        assert!(eye.x.abs() > 0.1, "orbit moved sideways");
        // Still looking at the centre
        let forward = nav.world_view().transform_vector(Vec3::FORWARD);
        assert!(forward.dot((Vec3::ZERO - eye).normalize()) > 0.999);
    }

    #[test]
    fn test_walk_collision_slides_along_wall() {
        let mut scene = MemoryScene::new();
        let root = scene.root();
        scene
            .add_shape(
                root,
                Mat4::translation(0.0, 0.0, -1.0),
                TriangleMesh::cuboid(Vec3::new(20.0, 4.0, 0.2)),
                ObjectData::default(),
            )
            .unwrap();

        let hits = Rc::new(RefCell::new(0));
        let mut nav = NavigationProcessor::default();
        nav.add_collision_listener(Box::new(Collisions(hits.clone())));
        nav.set_mode(NavigationMode::Walk);
        nav.set_world_roots(None, Some(root));
        let mut view = Mat4::rotation_y(FRAC_PI_4);
        view.set_translation(Vec3::new(0.0, 0.0, -0.7));
        nav.set_view(view, Mat4::IDENTITY);

        nav.start_move(&scene);
        nav.move_by(Vec3::new(0.0, 0.0, -1.0), 1.0);
        nav.process_frame(0.1, &scene);

        let eye = nav.position();
        assert!((eye.z + 0.7).abs() < 1e-4, "blocked axis zeroed");
        assert!((eye.x + 0.5 * FRAC_PI_4.sin()).abs() < 1e-3, "free axis kept");
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_walk_without_obstacle_moves_forward() {
        let scene = MemoryScene::new();
        let mut nav = NavigationProcessor::default();
        nav.set_mode(NavigationMode::Walk);
        nav.set_world_roots(None, Some(scene.root()));
        nav.set_view(Mat4::IDENTITY, Mat4::IDENTITY);
        nav.start_move(&scene);
        nav.move_by(Vec3::new(0.0, 0.0, -1.0), 2.0);
        assert!(nav.process_frame(0.1, &scene));
        assert!((nav.position().z + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_terrain_snaps_height_and_blocks_steps() {
        let mut scene = MemoryScene::new();
        let root = scene.root();
        scene
            .add_shape(root, Mat4::IDENTITY, TriangleMesh::ground(20.0), ObjectData::default())
            .unwrap();
        scene
            .add_shape(
                root,
                Mat4::translation(0.0, 0.5, -3.0),
                TriangleMesh::cuboid(Vec3::new(2.0, 1.0, 2.0)),
                ObjectData::default(),
            )
            .unwrap();

        let mut nav = NavigationProcessor::default();
        nav.set_mode(NavigationMode::Walk);
        nav.set_world_roots(Some(root), None);
        nav.set_view(Mat4::translation(0.3, 2.0, 0.0), Mat4::IDENTITY);
        nav.start_move(&scene);

        // Flat ground: height corrected to the avatar height
        nav.move_by(Vec3::new(0.0, 0.0, -1.0), 1.0);
        nav.process_frame(0.1, &scene);
        let eye = nav.position();
        assert!((eye.y - 1.8).abs() < 1e-4);
        assert!((eye.z + 0.5).abs() < 1e-4);

        // Next step lands on the block, one unit up: rejected
        nav.move_by(Vec3::new(0.0, 0.0, -1.0), 1.0);
        nav.process_frame(0.4, &scene);
        let blocked = nav.position();
        assert!((blocked.z + 0.5).abs() < 1e-4);
        assert!((blocked.y - 1.8).abs() < 1e-4);
    }

    #[test]
    fn test_speed_and_orbit_validation() {
        let mut nav = NavigationProcessor::default();
        assert!(nav.set_navigation_speed(-1.0).is_err());
        assert!(nav.set_orbit_time(0.0).is_err());
        assert!(nav.set_world_scale(0.0).is_err());
        nav.set_navigation_speed(3.0).unwrap();
        assert_eq!(nav.speed(), 3.0);

        nav.set_world_scale(2.0).unwrap();
        assert!((nav.avatar_size() - 0.5).abs() < 1e-6);
        assert!((nav.avatar_height() - 3.6).abs() < 1e-5);
    }

    #[test]
    fn test_zero_speed_does_not_move() {
        let scene = MemoryScene::new();
        let mut nav = NavigationProcessor::default();
        nav.set_mode(NavigationMode::Fly);
        nav.set_view(Mat4::IDENTITY, Mat4::IDENTITY);
        nav.set_navigation_speed(0.0).unwrap();
        nav.start_move(&scene);
        nav.move_by(Vec3::new(0.0, 0.0, -1.0), 5.0);
        assert!(!nav.process_frame(0.1, &scene));
        assert_eq!(nav.position(), Vec3::ZERO);
    }

    #[test]
    fn test_track_pan_moves_centre_with_camera() {
        let scene = MemoryScene::new();
        let mut nav = examine_at(Vec3::new(0.0, 0.0, 5.0));
        nav.set_mode(NavigationMode::TrackPan);
        nav.start_move(&scene);
        nav.move_by(Vec3::new(1.0, 0.0, 0.0), 0.01);
        assert!(nav.process_frame(0.016, &scene));
        let shift = 0.01 * TRACK_SPEED_FACTOR;
        assert!((nav.center_of_rotation().x - shift).abs() < 1e-4);
        assert!((nav.position().x - shift).abs() < 1e-4);
        assert!(!nav.process_frame(0.016, &scene), "drag consumed");
    }

    #[test]
    fn test_inspect_keeps_height() {
        let scene = MemoryScene::new();
        let mut nav = examine_at(Vec3::new(4.0, 3.0, 0.0));
        nav.set_mode(NavigationMode::Inspect);
        nav.start_move(&scene);
        nav.move_by(Vec3::new(1.0, 0.0, 0.0), 1.0);
        assert!(nav.process_frame(1.25, &scene));
        let eye = nav.position();
        assert!((eye.y - 3.0).abs() < 1e-4);
        // A quarter orbit in a quarter of the orbit time
        assert!(eye.x.abs() < 1e-3);
        assert!((eye.z - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_orient_is_one_shot() {
        let scene = MemoryScene::new();
        let mut nav = NavigationProcessor::default();
        nav.set_mode(NavigationMode::Walk);
        nav.set_view(Mat4::IDENTITY, Mat4::IDENTITY);
        assert!(nav.orient(Vec3::new(0.0, FRAC_PI_4, 0.0), &scene));
        assert!(nav.orientation().angle > 0.7);
        nav.process_frame(0.016, &scene);
        assert!(nav.orientation().angle.abs() < 1e-2);
    }

    #[test]
    fn test_navigation_info_binding() {
        let mut graph = SceneGraph::new();
        let info = graph.create_node(NodeKind::NavigationInfo);
        graph
            .set_value_by_name(info, "type", FieldValue::strings(["WALK", "FLY"]))
            .unwrap();
        graph
            .set_value_by_name(info, "avatarSize", FieldValue::floats(vec![0.5, 2.0, 0.3], 1))
            .unwrap();
        graph.set_value_by_name(info, "speed", 4.0f32).unwrap();
        graph.set_value_by_name(info, "visibilityLimit", 250.0f32).unwrap();

        let modes = Rc::new(RefCell::new(Vec::new()));
        let mut nav = NavigationProcessor::default();
        nav.add_state_listener(Box::new(Modes(modes.clone())));
        nav.apply_navigation_info(&graph, info).unwrap();

        assert_eq!(nav.mode(), NavigationMode::Walk);
        assert!(nav.is_allowed(NavigationMode::Fly));
        assert!(!nav.is_allowed(NavigationMode::Examine));
        assert_eq!(nav.speed(), 4.0);
        assert!((nav.avatar_size() - 0.5).abs() < 1e-6);
        assert!((nav.avatar_height() - 2.0).abs() < 1e-6);
        assert_eq!(nav.visibility_limit(), 250.0);
        assert_eq!(*modes.borrow(), vec![NavigationMode::Walk]);

        let viewpoint = graph.create_node(NodeKind::Viewpoint);
        assert!(nav.apply_navigation_info(&graph, viewpoint).is_err());
        nav.bind_viewpoint(&graph, viewpoint, Mat4::IDENTITY).unwrap();
        assert_eq!(nav.position(), Vec3::new(0.0, 0.0, 10.0));
    }
}
