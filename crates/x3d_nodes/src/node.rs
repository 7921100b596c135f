//! Scene node records.
//!
//! Every node is the same [`SceneNode`] record. What differs per type lives
//! in a static [`KindSpec`]: the field table, the capability categories the
//! node provides and a small validation function.

use crate::error::{FieldError, Result};
use crate::field::{FieldDecl, FieldStore};
use crate::kinds;
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use smallvec::SmallVec;
use std::sync::OnceLock;

new_key_type! {
    /// Handle of a concrete node in a [`crate::SceneGraph`]
    pub struct NodeHandle;
    /// Handle of a proto instance in a [`crate::SceneGraph`]
    pub struct ProtoHandle;
}

/// Capability a node provides to the field holding it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    Appearance,
    Material,
    Geometry,
    Coordinate,
    Normal,
    Color,
    TextureCoordinate,
    LineProperties,
    FillProperties,
    PointProperties,
    Texture,
    TextureTransform,
    Metadata,
    /// Anything allowed in a grouping node's children
    Child,
    Grouping,
    PointingSensor,
    DragSensor,
    PickSensor,
    EnvironmentSensor,
    Bindable,
}

impl NodeCategory {
    pub fn name(&self) -> &'static str {
        match self {
            NodeCategory::Appearance => "Appearance",
            NodeCategory::Material => "Material",
            NodeCategory::Geometry => "Geometry",
            NodeCategory::Coordinate => "Coordinate",
            NodeCategory::Normal => "Normal",
            NodeCategory::Color => "Color",
            NodeCategory::TextureCoordinate => "TextureCoordinate",
            NodeCategory::LineProperties => "LineProperties",
            NodeCategory::FillProperties => "FillProperties",
            NodeCategory::PointProperties => "PointProperties",
            NodeCategory::Texture => "Texture",
            NodeCategory::TextureTransform => "TextureTransform",
            NodeCategory::Metadata => "Metadata",
            NodeCategory::Child => "Child",
            NodeCategory::Grouping => "Grouping",
            NodeCategory::PointingSensor => "PointingSensor",
            NodeCategory::DragSensor => "DragSensor",
            NodeCategory::PickSensor => "PickSensor",
            NodeCategory::EnvironmentSensor => "EnvironmentSensor",
            NodeCategory::Bindable => "Bindable",
        }
    }
}

/// Validation hook: field name and candidate value, `Err(reason)` rejects
pub type Validator = fn(&'static str, &FieldValue) -> std::result::Result<(), String>;

/// Static description of one node type
#[derive(Debug)]
pub struct KindSpec {
    pub name: &'static str,
    pub fields: &'static [FieldDecl],
    pub categories: &'static [NodeCategory],
    pub validate: Validator,
}

/// Accept every value
pub fn no_validation(_: &'static str, _: &FieldValue) -> std::result::Result<(), String> {
    Ok(())
}

macro_rules! node_kinds {
    ($($kind:ident => $spec:path),* $(,)?) => {
        /// Supported node types
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum NodeKind {
            $($kind),*
        }

        impl NodeKind {
            pub const ALL: &'static [NodeKind] = &[$(NodeKind::$kind),*];

            /// Static description of this kind
            pub fn spec(&self) -> &'static KindSpec {
                match self {
                    $(NodeKind::$kind => &$spec),*
                }
            }
        }
    };
}

node_kinds! {
    Appearance => kinds::shape::APPEARANCE,
    Material => kinds::shape::MATERIAL,
    Shape => kinds::shape::SHAPE,
    LineProperties => kinds::shape::LINE_PROPERTIES,
    FillProperties => kinds::shape::FILL_PROPERTIES,
    PointProperties => kinds::shape::POINT_PROPERTIES,
    ImageTexture => kinds::shape::IMAGE_TEXTURE,
    TextureTransform => kinds::shape::TEXTURE_TRANSFORM,
    Box => kinds::geometry::BOX,
    Sphere => kinds::geometry::SPHERE,
    Cone => kinds::geometry::CONE,
    Cylinder => kinds::geometry::CYLINDER,
    Coordinate => kinds::geometry::COORDINATE,
    Normal => kinds::geometry::NORMAL,
    Color => kinds::geometry::COLOR,
    ColorRGBA => kinds::geometry::COLOR_RGBA,
    TextureCoordinate => kinds::geometry::TEXTURE_COORDINATE,
    PointSet => kinds::geometry::POINT_SET,
    LineSet => kinds::geometry::LINE_SET,
    IndexedLineSet => kinds::geometry::INDEXED_LINE_SET,
    IndexedFaceSet => kinds::geometry::INDEXED_FACE_SET,
    Group => kinds::grouping::GROUP,
    Transform => kinds::grouping::TRANSFORM,
    Anchor => kinds::grouping::ANCHOR,
    PickableGroup => kinds::grouping::PICKABLE_GROUP,
    TouchSensor => kinds::sensors::TOUCH_SENSOR,
    PlaneSensor => kinds::sensors::PLANE_SENSOR,
    LinePickSensor => kinds::sensors::LINE_PICK_SENSOR,
    PointPickSensor => kinds::sensors::POINT_PICK_SENSOR,
    PrimitivePickSensor => kinds::sensors::PRIMITIVE_PICK_SENSOR,
    VolumePickSensor => kinds::sensors::VOLUME_PICK_SENSOR,
    VisibilitySensor => kinds::sensors::VISIBILITY_SENSOR,
    ProximitySensor => kinds::sensors::PROXIMITY_SENSOR,
    NavigationInfo => kinds::navigation::NAVIGATION_INFO,
    Viewpoint => kinds::navigation::VIEWPOINT,
    MetadataString => kinds::metadata::METADATA_STRING,
}

impl NodeKind {
    /// X3D node type name
    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn has_category(&self, category: NodeCategory) -> bool {
        (category == NodeCategory::Child && self.is_child())
            || self.spec().categories.contains(&category)
    }

    fn is_child(&self) -> bool {
        !self.spec().categories.iter().any(|c| {
            matches!(
                c,
                NodeCategory::Appearance
                    | NodeCategory::Material
                    | NodeCategory::Geometry
                    | NodeCategory::Coordinate
                    | NodeCategory::Normal
                    | NodeCategory::Color
                    | NodeCategory::TextureCoordinate
                    | NodeCategory::LineProperties
                    | NodeCategory::FillProperties
                    | NodeCategory::PointProperties
                    | NodeCategory::Texture
                    | NodeCategory::TextureTransform
                    | NodeCategory::Metadata
            )
        })
    }

    /// Name/index table, built once per kind
    pub fn field_store(&self) -> &'static FieldStore {
        static STORES: OnceLock<Vec<FieldStore>> = OnceLock::new();
        let stores = STORES.get_or_init(|| {
            NodeKind::ALL
                .iter()
                .map(|k| FieldStore::new(k.spec().name, k.spec().fields))
                .collect()
        });
        &stores[*self as usize]
    }

    /// Look a kind up by its X3D name
    pub fn from_name(name: &str) -> Option<NodeKind> {
        NodeKind::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Geometry that renders without lighting unless it carries normals
    pub fn is_unlit_geometry(&self) -> bool {
        matches!(
            self,
            NodeKind::PointSet | NodeKind::LineSet | NodeKind::IndexedLineSet
        )
    }
}

/// Per-instance field storage
#[derive(Debug, Clone)]
pub struct SceneNode {
    kind: NodeKind,
    values: Vec<FieldValue>,
    changed: SmallVec<[bool; 16]>,
    in_setup: bool,
}

impl SceneNode {
    /// New node in construction, every field at its default
    pub fn new(kind: NodeKind) -> Self {
        let fields = kind.spec().fields;
        Self {
            kind,
            values: fields.iter().map(FieldDecl::default_value).collect(),
            changed: SmallVec::from_elem(false, fields.len()),
            in_setup: true,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn field_store(&self) -> &'static FieldStore {
        self.kind.field_store()
    }

    pub fn is_setup_finished(&self) -> bool {
        !self.in_setup
    }

    pub(crate) fn finish_setup(&mut self) {
        self.in_setup = false;
    }

    pub fn get_field_index(&self, name: &str) -> Option<usize> {
        self.field_store().index_of(name)
    }

    pub fn decl(&self, index: usize) -> Result<&'static FieldDecl> {
        self.field_store()
            .decl(index)
            .ok_or(FieldError::InvalidFieldIndex {
                node: self.kind.name(),
                index,
            })
    }

    pub fn value(&self, index: usize) -> Result<&FieldValue> {
        self.values.get(index).ok_or(FieldError::InvalidFieldIndex {
            node: self.kind.name(),
            index,
        })
    }

    /// Value by field name, `None` when the kind has no such field
    pub fn value_by_name(&self, name: &str) -> Option<&FieldValue> {
        self.get_field_index(name).and_then(|i| self.values.get(i))
    }

    pub(crate) fn store(&mut self, index: usize, value: FieldValue) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    pub fn has_changed(&self, index: usize) -> bool {
        self.changed.get(index).copied().unwrap_or(false)
    }

    pub(crate) fn mark_changed(&mut self, index: usize) {
        if let Some(flag) = self.changed.get_mut(index) {
            *flag = true;
        }
    }

    pub fn clear_changed(&mut self) {
        self.changed.iter_mut().for_each(|f| *f = false);
    }

    /// Every node reference held in any node field
    pub fn node_refs(&self) -> impl Iterator<Item = crate::proto::NodeRef> + '_ {
        self.values.iter().flat_map(|v| v.node_refs().iter().copied())
    }
}
