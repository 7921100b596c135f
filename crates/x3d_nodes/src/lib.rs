//! # X3D Nodes
//!
//! VRML/X3D scene nodes behind one generic field protocol.
//!
//! Every node is a [`SceneNode`] record whose field table comes from its
//! [`NodeKind`]. Fields are read and written by index (or by name through
//! the kind's [`FieldStore`]) on a [`SceneGraph`], which validates each
//! write, tracks changed flags, notifies listeners and cascades routes.
//!
//! ```ignore
//! use x3d_nodes::{FieldValue, NodeKind, SceneGraph};
//!
//! let mut graph = SceneGraph::new();
//! let material = graph.create_node(NodeKind::Material);
//! let diffuse = graph.get_field_index(material, "diffuseColor").unwrap();
//! graph.set_value(material, diffuse, FieldValue::color(1.0, 0.0, 0.0))?;
//! graph.setup_finished(material)?;
//! ```

pub mod error;
pub mod field;
pub mod graph;
pub mod kinds;
pub mod listener;
pub mod node;
pub mod proto;
pub mod route;
pub mod texture;
pub mod value;

pub use error::{FieldError, ListenerError, Result};
pub use field::{AccessType, FieldDecl, FieldStore, FieldType, Init};
pub use graph::{AppearanceState, SceneGraph, DEFAULT_ROUTE_DEPTH};
pub use listener::{FieldListener, ListenerId, ListenerList};
pub use node::{KindSpec, NodeCategory, NodeHandle, NodeKind, ProtoHandle, SceneNode};
pub use proto::{NodeRef, ProtoInstance};
pub use route::{FieldEndpoint, Route, RouteTable};
pub use texture::{
    BoundaryMode, MagFilter, MinFilter, TextureAccounting, TextureImage, TextureStage,
    TextureStages,
};
pub use value::FieldValue;
