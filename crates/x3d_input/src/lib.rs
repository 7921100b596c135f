//! # X3D Input
//!
//! Picking, sensors and navigation for an X3D layer.
//!
//! The renderer exposes its scene through [`RenderScene`]; everything else
//! here works on that trait and a [`x3d_nodes::SceneGraph`]:
//!
//! - [`PickEngine`] and [`PickSensorManager`] for pick sensors
//! - [`SensorActivationTracker`] for TouchSensor, PlaneSensor and Anchor
//! - [`NavigationProcessor`] for camera motion
//! - [`VisibilityManager`] and [`AreaManager`] for region sensors
//! - [`InputHandler`] to route pointer events between sensors and navigation
//! - [`LayerSensorManager`] to run all of them once per frame
//!
//! [`MemoryScene`] is a complete in-memory [`RenderScene`].

pub mod area;
pub mod config;
pub mod error;
pub mod frame;
pub mod handler;
pub mod memory;
pub mod navigation;
pub mod pick;
pub mod render;
pub mod tracker;
pub mod visibility;

pub use area::{AreaListener, AreaManager};
pub use config::{ClipConfig, InputConfig, NavigationConfig, PickingConfig, RouteConfig};
pub use error::{InputError, Result};
pub use frame::{clip_distances, ClipPlaneListener, FrameReport, LayerSensorManager, TrackerEvent};
pub use handler::{ButtonMode, InputHandler, Modifiers, PointerButton, TrackerState};
pub use memory::MemoryScene;
pub use navigation::{
    AvatarRepresentation, CollisionListener, NavigationMode, NavigationProcessor, NavigationStateListener,
    ViewState,
};
pub use pick::{
    IntersectMode, ObjectTypeMasks, PickEngine, PickGeometry, PickHit, PickRequest, PickResults,
    PickSensorListener, PickSensorManager, PickShape, PickSort, SurfaceHit, ALL_MASK,
};
pub use render::{ObjectData, ObjectId, RenderScene, ScenePath, TriangleMesh, ViewFrustum};
pub use tracker::{PointerHit, SensorActivationTracker, SensorState, SensorStatusListener};
pub use visibility::{VisibilityListener, VisibilityManager};
