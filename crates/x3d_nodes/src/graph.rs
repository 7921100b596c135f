//! The scene graph.
//!
//! [`SceneGraph`] owns every node and proto instance and is the only way to
//! write a field. A write is validated completely before anything is stored.
//! Once a node has finished setup, a write also raises its changed flag,
//! notifies the node's listeners and pushes the value down every route
//! leaving that field.
//!
//! Appearance nodes carry derived state ([`AppearanceState`]) that is
//! filled in from the Shape holding them and from their Material, and the
//! graph keeps the texture memory each appearance holds in a
//! [`TextureAccounting`] context.

use crate::error::{FieldError, ListenerError, Result};
use crate::field::AccessType;
use crate::kinds::shape::MATERIAL_COLOR_FIELDS;
use crate::listener::{FieldListener, ListenerId, ListenerList};
use crate::node::{NodeCategory, NodeHandle, NodeKind, ProtoHandle, SceneNode};
use crate::proto::{self, NodeRef, ProtoInstance};
use crate::route::{FieldEndpoint, Route, RouteTable};
use crate::texture::{BoundaryMode, TextureAccounting, TextureImage, TextureStages};
use crate::value::FieldValue;
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, trace, warn};
use x3d_core::Vec3;

/// Route cascade depth after which further deliveries are dropped
pub const DEFAULT_ROUTE_DEPTH: usize = 64;

/// Rendering state an Appearance derives from its Shape and Material
#[derive(Debug, Clone)]
pub struct AppearanceState {
    pub solid: bool,
    pub ccw: bool,
    pub lighting_enabled: bool,
    /// Geometry carries its own per-vertex colour
    pub local_color: bool,
    /// Local colour has an alpha channel
    pub local_color_alpha: bool,
    pub stages: TextureStages,
    material_changes: Rc<Cell<u32>>,
    material_link: Option<(NodeHandle, ListenerId)>,
}

impl Default for AppearanceState {
    fn default() -> Self {
        Self {
            solid: true,
            ccw: true,
            lighting_enabled: true,
            local_color: false,
            local_color_alpha: false,
            stages: TextureStages::new(),
            material_changes: Rc::new(Cell::new(0)),
            material_link: None,
        }
    }
}

impl AppearanceState {
    /// Colour changes seen on the held Material since setup
    pub fn material_color_changes(&self) -> u32 {
        self.material_changes.get()
    }

    /// Material currently listened to
    pub fn material(&self) -> Option<NodeHandle> {
        self.material_link.map(|(m, _)| m)
    }
}

/// Counts colour changes of one Material for its Appearance
struct MaterialColorListener {
    changes: Rc<Cell<u32>>,
}

impl FieldListener for MaterialColorListener {
    fn field_changed(
        &mut self,
        _node: NodeHandle,
        field: usize,
        _value: &FieldValue,
    ) -> std::result::Result<(), ListenerError> {
        let is_color = NodeKind::Material
            .field_store()
            .decl(field)
            .is_some_and(|d| MATERIAL_COLOR_FIELDS.contains(&d.name));
        if is_color {
            self.changes.set(self.changes.get() + 1);
        }
        Ok(())
    }
}

/// What a geometry node tells its Appearance
struct GeometryFlags {
    solid: bool,
    ccw: bool,
    lighting: bool,
    local_color: bool,
    local_color_alpha: bool,
}

/// Node storage, field access, routing and derived state
#[derive(Debug)]
pub struct SceneGraph {
    nodes: SlotMap<NodeHandle, SceneNode>,
    protos: SlotMap<ProtoHandle, ProtoInstance>,
    routes: RouteTable,
    listeners: SecondaryMap<NodeHandle, ListenerList<dyn FieldListener>>,
    appearances: SecondaryMap<NodeHandle, AppearanceState>,
    textures: TextureAccounting,
    /// Backing store for `get_field_value`
    scratch: FieldValue,
    max_route_depth: usize,
    use_mipmaps: bool,
    event_time: f64,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            protos: SlotMap::with_key(),
            routes: RouteTable::new(),
            listeners: SecondaryMap::new(),
            appearances: SecondaryMap::new(),
            textures: TextureAccounting::new(),
            scratch: FieldValue::default(),
            max_route_depth: DEFAULT_ROUTE_DEPTH,
            use_mipmaps: true,
            event_time: 0.0,
        }
    }

    /// Limit how deep a route cascade may recurse
    pub fn with_max_route_depth(mut self, depth: usize) -> Self {
        self.max_route_depth = depth;
        self
    }

    /// Whether loaded textures are accounted with their mipmap chain
    pub fn with_mipmaps(mut self, use_mipmaps: bool) -> Self {
        self.use_mipmaps = use_mipmaps;
        self
    }

    pub fn max_route_depth(&self) -> usize {
        self.max_route_depth
    }

    // ------------------------------------------------------------------
    // Nodes and protos
    // ------------------------------------------------------------------

    /// Create a node in construction with every field at its default
    pub fn create_node(&mut self, kind: NodeKind) -> NodeHandle {
        let handle = self.nodes.insert(SceneNode::new(kind));
        if kind == NodeKind::Appearance {
            self.appearances.insert(handle, AppearanceState::default());
        }
        trace!(kind = kind.name(), "node created");
        handle
    }

    /// Create a proto instance; extern protos pass `None` and are completed later
    pub fn create_proto(
        &mut self,
        name: impl Into<String>,
        implementation: Option<NodeRef>,
    ) -> ProtoHandle {
        self.protos.insert(ProtoInstance::new(name, implementation))
    }

    /// Supply the implementation of an extern proto once it has loaded
    pub fn complete_proto(&mut self, proto: ProtoHandle, implementation: NodeRef) -> Result<()> {
        let instance = self.protos.get_mut(proto).ok_or(FieldError::UnknownProto)?;
        instance.set_implementation(implementation);
        debug!(name = %instance.name, "proto completed");
        Ok(())
    }

    pub fn proto(&self, proto: ProtoHandle) -> Option<&ProtoInstance> {
        self.protos.get(proto)
    }

    /// Concrete live node behind a reference, if any
    pub fn resolve(&self, reference: NodeRef) -> Option<NodeHandle> {
        proto::resolve(&self.protos, reference).filter(|h| self.nodes.contains_key(*h))
    }

    pub fn node(&self, node: NodeHandle) -> Option<&SceneNode> {
        self.nodes.get(node)
    }

    pub fn node_kind(&self, node: NodeHandle) -> Option<NodeKind> {
        self.nodes.get(node).map(SceneNode::kind)
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &SceneNode)> {
        self.nodes.iter()
    }

    /// Remove a node along with its routes, listeners and held resources.
    ///
    /// Listeners this node registered on other nodes are detached too.
    pub fn remove_node(&mut self, node: NodeHandle) -> Result<()> {
        let kind = self.node_kind(node).ok_or(FieldError::UnknownNode)?;
        self.detach_material_listener(node);
        self.appearances.remove(node);
        let released_kib = self.textures.release(node);
        self.listeners.remove(node);
        let routes = self.routes.remove_node(node);
        self.nodes.remove(node);
        debug!(kind = kind.name(), routes, released_kib, "node removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Field access
    // ------------------------------------------------------------------

    /// Index of a field or one of its `set_`/`_changed` aliases
    pub fn get_field_index(&self, node: NodeHandle, name: &str) -> Option<usize> {
        self.nodes.get(node)?.get_field_index(name)
    }

    /// Copy of a field value, valid until the next call on this graph
    pub fn get_field_value(&mut self, node: NodeHandle, index: usize) -> Result<&FieldValue> {
        let value = self
            .nodes
            .get(node)
            .ok_or(FieldError::UnknownNode)?
            .value(index)?;
        self.scratch.refill_from(value);
        Ok(&self.scratch)
    }

    /// Borrow a field value in place
    pub fn field_value(&self, node: NodeHandle, index: usize) -> Result<&FieldValue> {
        self.nodes
            .get(node)
            .ok_or(FieldError::UnknownNode)?
            .value(index)
    }

    pub fn value_by_name(&self, node: NodeHandle, name: &str) -> Option<&FieldValue> {
        self.nodes.get(node)?.value_by_name(name)
    }

    pub fn get_bool(&self, node: NodeHandle, name: &str) -> Option<bool> {
        self.value_by_name(node, name)?.as_bool()
    }

    pub fn get_int(&self, node: NodeHandle, name: &str) -> Option<i32> {
        self.value_by_name(node, name)?.as_int()
    }

    pub fn get_float(&self, node: NodeHandle, name: &str) -> Option<f32> {
        self.value_by_name(node, name)?.as_float()
    }

    pub fn get_double(&self, node: NodeHandle, name: &str) -> Option<f64> {
        self.value_by_name(node, name)?.as_double()
    }

    pub fn get_vec3(&self, node: NodeHandle, name: &str) -> Option<Vec3> {
        self.value_by_name(node, name)?.as_vec3()
    }

    pub fn get_floats(&self, node: NodeHandle, name: &str) -> Option<&[f32]> {
        self.value_by_name(node, name)?.as_floats()
    }

    pub fn get_ints(&self, node: NodeHandle, name: &str) -> Option<&[i32]> {
        self.value_by_name(node, name)?.as_ints()
    }

    pub fn get_str(&self, node: NodeHandle, name: &str) -> Option<&str> {
        self.value_by_name(node, name)?.as_str()
    }

    pub fn get_strings(&self, node: NodeHandle, name: &str) -> Option<&[String]> {
        self.value_by_name(node, name)?.as_strings()
    }

    /// Resolved node held in an SFNode field
    pub fn get_node(&self, node: NodeHandle, name: &str) -> Option<NodeHandle> {
        let reference = self.value_by_name(node, name)?.as_node()?;
        self.resolve(reference)
    }

    /// Resolved nodes held in an MFNode field; unresolved entries are skipped
    pub fn get_nodes(&self, node: NodeHandle, name: &str) -> Vec<NodeHandle> {
        self.value_by_name(node, name)
            .map(|v| v.node_refs().iter().filter_map(|r| self.resolve(*r)).collect())
            .unwrap_or_default()
    }

    /// Write a field by index
    pub fn set_value(&mut self, node: NodeHandle, index: usize, value: FieldValue) -> Result<()> {
        self.write_field(node, index, value, 0)
    }

    /// Write a field by name or alias
    pub fn set_value_by_name(
        &mut self,
        node: NodeHandle,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        let target = self.nodes.get(node).ok_or(FieldError::UnknownNode)?;
        let index = target
            .get_field_index(name)
            .ok_or_else(|| FieldError::UnknownFieldName {
                node: target.kind().name(),
                name: name.to_string(),
            })?;
        self.write_field(node, index, value.into(), 0)
    }

    pub fn has_changed(&self, node: NodeHandle, index: usize) -> bool {
        self.nodes.get(node).is_some_and(|n| n.has_changed(index))
    }

    pub fn clear_changed(&mut self, node: NodeHandle) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.clear_changed();
        }
    }

    pub fn is_setup_finished(&self, node: NodeHandle) -> bool {
        self.nodes.get(node).is_some_and(SceneNode::is_setup_finished)
    }

    /// End construction of `node` and everything it holds.
    ///
    /// Calling it again is a no-op.
    pub fn setup_finished(&mut self, node: NodeHandle) -> Result<()> {
        let record = self.nodes.get_mut(node).ok_or(FieldError::UnknownNode)?;
        if record.is_setup_finished() {
            return Ok(());
        }
        record.finish_setup();
        let kind = record.kind();
        let held: SmallVec<[NodeRef; 8]> = record.node_refs().collect();

        for reference in held {
            if let Some(child) = self.resolve(reference) {
                self.setup_finished(child)?;
            }
        }

        match kind {
            NodeKind::Shape => self.propagate_shape_state(node),
            NodeKind::Appearance => {
                self.attach_material_listener(node);
                self.update_texture_stages(node);
            }
            _ => {}
        }
        trace!(kind = kind.name(), "setup finished");
        Ok(())
    }

    fn write_field(
        &mut self,
        node: NodeHandle,
        index: usize,
        value: FieldValue,
        depth: usize,
    ) -> Result<()> {
        let record = self.nodes.get(node).ok_or(FieldError::UnknownNode)?;
        let kind = record.kind();
        let decl = record.decl(index)?;
        let finished = record.is_setup_finished();

        if finished && decl.access == AccessType::InitializeOnly {
            return Err(FieldError::FieldNotWritable {
                node: kind.name(),
                field: decl.name,
            });
        }
        if !decl.field_type.accepts(&value) {
            return Err(FieldError::InvalidFieldType {
                node: kind.name(),
                field: decl.name,
                expected: decl.field_type.name(),
                found: value.kind_name(),
            });
        }
        if let Some(category) = decl.node_category {
            self.check_node_refs(kind, decl.name, category, &value)?;
        }
        (kind.spec().validate)(decl.name, &value).map_err(|reason| {
            FieldError::InvalidFieldValue {
                node: kind.name(),
                field: decl.name,
                reason,
            }
        })?;

        if let Some(record) = self.nodes.get_mut(node) {
            record.store(index, value);
        }
        if !finished {
            return Ok(());
        }

        match (kind, decl.name) {
            (NodeKind::Appearance, "material") => self.attach_material_listener(node),
            (NodeKind::Appearance, "texture") => self.update_texture_stages(node),
            (NodeKind::Shape, "appearance" | "geometry") => self.propagate_shape_state(node),
            _ => {}
        }
        self.notify_and_route(node, index, depth);
        Ok(())
    }

    /// Every reference must name a live node providing `category`. A proto
    /// that does not resolve yet is accepted and checked on use.
    fn check_node_refs(
        &self,
        kind: NodeKind,
        field: &'static str,
        category: NodeCategory,
        value: &FieldValue,
    ) -> Result<()> {
        for reference in value.node_refs() {
            match *reference {
                NodeRef::Concrete(h) => {
                    let held = self.node_kind(h).ok_or(FieldError::UnknownNode)?;
                    if !held.has_category(category) {
                        return Err(FieldError::InvalidFieldValue {
                            node: kind.name(),
                            field,
                            reason: format!("{} is not a {} node", held.name(), category.name()),
                        });
                    }
                }
                NodeRef::Proto(p) => {
                    if !self.protos.contains_key(p) {
                        return Err(FieldError::UnknownProto);
                    }
                    match self.resolve(*reference).and_then(|h| self.node_kind(h)) {
                        Some(held) if !held.has_category(category) => {
                            return Err(FieldError::ProtoTypeMismatch {
                                node: kind.name(),
                                field,
                                expected: category.name(),
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn notify_and_route(&mut self, node: NodeHandle, index: usize, depth: usize) {
        if let Some(record) = self.nodes.get_mut(node) {
            record.mark_changed(index);
        }
        if let (Some(record), Some(list)) = (self.nodes.get(node), self.listeners.get_mut(node)) {
            if let Ok(value) = record.value(index) {
                list.notify("field_changed", |l| l.field_changed(node, index, value));
            }
        }

        let from = FieldEndpoint::new(node, index);
        let targets: SmallVec<[FieldEndpoint; 4]> =
            self.routes.targets(from).iter().copied().collect();
        for to in targets {
            self.deliver(from, to, depth + 1);
        }
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Connect an output field to an input field of the same type
    pub fn add_route(
        &mut self,
        from: NodeHandle,
        from_field: usize,
        to: NodeHandle,
        to_field: usize,
    ) -> Result<bool> {
        let source = self.nodes.get(from).ok_or(FieldError::UnknownNode)?;
        let source_decl = source.decl(from_field)?;
        let target = self.nodes.get(to).ok_or(FieldError::UnknownNode)?;
        let target_decl = target.decl(to_field)?;

        if !source_decl.access.emits_events() {
            return Err(FieldError::InvalidFieldValue {
                node: source.kind().name(),
                field: source_decl.name,
                reason: format!("{} field emits no events", source_decl.access.vrml_name()),
            });
        }
        if !target_decl.access.accepts_events() {
            return Err(FieldError::FieldNotWritable {
                node: target.kind().name(),
                field: target_decl.name,
            });
        }
        if source_decl.field_type != target_decl.field_type {
            return Err(FieldError::InvalidFieldType {
                node: target.kind().name(),
                field: target_decl.name,
                expected: target_decl.field_type.name(),
                found: source_decl.field_type.name(),
            });
        }

        let added = self.routes.add(Route::new(from, from_field, to, to_field));
        if added {
            debug!(
                from_node = source.kind().name(),
                from_field = source_decl.name,
                to_node = target.kind().name(),
                to_field = target_decl.name,
                "route added"
            );
        }
        Ok(added)
    }

    pub fn remove_route(&mut self, route: &Route) -> bool {
        self.routes.remove(route)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Copy `src.src_field` into `dst.dst_field`.
    ///
    /// Failures at the destination are logged and dropped.
    pub fn send_route(
        &mut self,
        time: f64,
        src: NodeHandle,
        src_field: usize,
        dst: NodeHandle,
        dst_field: usize,
    ) {
        self.event_time = time;
        self.deliver(
            FieldEndpoint::new(src, src_field),
            FieldEndpoint::new(dst, dst_field),
            0,
        );
    }

    /// Timestamp of the last `send_route`
    pub fn event_time(&self) -> f64 {
        self.event_time
    }

    fn deliver(&mut self, from: FieldEndpoint, to: FieldEndpoint, depth: usize) {
        if depth > self.max_route_depth {
            warn!(depth, "route cascade too deep, event dropped");
            return;
        }
        let value = match self.field_value(from.node, from.field) {
            Ok(v) => v.clone(),
            Err(err) => {
                warn!(%err, "route source unreadable");
                return;
            }
        };
        if let Err(err) = self.write_field(to.node, to.field, value, depth) {
            warn!(%err, "route delivery failed");
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn add_listener(
        &mut self,
        node: NodeHandle,
        listener: Box<dyn FieldListener>,
    ) -> Result<ListenerId> {
        if !self.nodes.contains_key(node) {
            return Err(FieldError::UnknownNode);
        }
        let list = self
            .listeners
            .entry(node)
            .ok_or(FieldError::UnknownNode)?
            .or_default();
        Ok(list.add(listener))
    }

    pub fn remove_listener(&mut self, node: NodeHandle, id: ListenerId) -> bool {
        self.listeners
            .get_mut(node)
            .is_some_and(|list| list.remove(id).is_some())
    }

    pub fn listener_count(&self, node: NodeHandle) -> usize {
        self.listeners.get(node).map_or(0, |l| l.len())
    }

    // ------------------------------------------------------------------
    // Appearance state and textures
    // ------------------------------------------------------------------

    pub fn appearance_state(&self, appearance: NodeHandle) -> Option<&AppearanceState> {
        self.appearances.get(appearance)
    }

    pub fn texture_accounting(&self) -> &TextureAccounting {
        &self.textures
    }

    /// Install a loaded image on one stage of an appearance; returns its KiB
    pub fn set_texture_image(
        &mut self,
        appearance: NodeHandle,
        stage: usize,
        image: TextureImage,
    ) -> Result<f32> {
        let use_mipmaps = self.use_mipmaps;
        let state = self
            .appearances
            .get_mut(appearance)
            .ok_or(FieldError::UnknownNode)?;
        state.stages.ensure(stage + 1, true);
        let kib = state
            .stages
            .get_mut(stage)
            .map_or(0.0, |s| s.set_image(image, use_mipmaps));
        self.textures.record(appearance, kib);
        debug!(stage, kib, total_kib = self.textures.total_kib(), "texture loaded");
        Ok(kib)
    }

    fn geometry_flags(&self, geometry: NodeHandle) -> Option<GeometryFlags> {
        let record = self.nodes.get(geometry)?;
        let flag = |name: &str| {
            record
                .value_by_name(name)
                .and_then(FieldValue::as_bool)
                .unwrap_or(true)
        };
        let color = self.get_node(geometry, "color");
        let has_normals = self.get_node(geometry, "normal").is_some();
        Some(GeometryFlags {
            solid: flag("solid"),
            ccw: flag("ccw"),
            lighting: !record.kind().is_unlit_geometry() || has_normals,
            local_color: color.is_some(),
            local_color_alpha: color.and_then(|c| self.node_kind(c)) == Some(NodeKind::ColorRGBA),
        })
    }

    fn propagate_shape_state(&mut self, shape: NodeHandle) {
        let Some(appearance) = self.get_node(shape, "appearance") else {
            return;
        };
        let flags = self
            .get_node(shape, "geometry")
            .and_then(|g| self.geometry_flags(g));
        let Some(state) = self.appearances.get_mut(appearance) else {
            return;
        };
        if let Some(flags) = flags {
            state.solid = flags.solid;
            state.ccw = flags.ccw;
            state.lighting_enabled = flags.lighting;
            state.local_color = flags.local_color;
            state.local_color_alpha = flags.local_color_alpha;
        }
    }

    fn attach_material_listener(&mut self, appearance: NodeHandle) {
        self.detach_material_listener(appearance);
        let Some(material) = self.get_node(appearance, "material") else {
            return;
        };
        let Some(state) = self.appearances.get_mut(appearance) else {
            return;
        };
        let Some(entry) = self.listeners.entry(material) else {
            return;
        };
        let id = entry.or_default().add(Box::new(MaterialColorListener {
            changes: Rc::clone(&state.material_changes),
        }));
        state.material_link = Some((material, id));
    }

    fn detach_material_listener(&mut self, appearance: NodeHandle) {
        let link = self
            .appearances
            .get_mut(appearance)
            .and_then(|s| s.material_link.take());
        if let Some((material, id)) = link {
            if let Some(list) = self.listeners.get_mut(material) {
                list.remove(id);
            }
        }
    }

    fn update_texture_stages(&mut self, appearance: NodeHandle) {
        let Some(texture) = self.get_node(appearance, "texture") else {
            return;
        };
        let repeat_s = self.get_bool(texture, "repeatS").unwrap_or(true);
        let repeat_t = self.get_bool(texture, "repeatT").unwrap_or(true);
        let Some(state) = self.appearances.get_mut(appearance) else {
            return;
        };
        state.stages.ensure(1, true);
        if let Some(stage) = state.stages.get_mut(0) {
            stage.boundary_s = BoundaryMode::from_repeat(repeat_s);
            stage.boundary_t = BoundaryMode::from_repeat(repeat_t);
        }
    }
}
