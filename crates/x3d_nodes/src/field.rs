//! Field declarations and the per-kind name/index table.

use crate::node::NodeCategory;
use crate::value::FieldValue;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// VRML field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    SFNode,
    MFNode,
    SFBool,
    MFBool,
    SFInt32,
    MFInt32,
    SFFloat,
    MFFloat,
    SFTime,
    SFDouble,
    SFString,
    MFString,
    SFVec2f,
    MFVec2f,
    SFVec3f,
    MFVec3f,
    SFColor,
    MFColor,
    SFColorRGBA,
    MFColorRGBA,
    SFRotation,
}

impl FieldType {
    /// Type name as written in VRML/X3D
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::SFNode => "SFNode",
            FieldType::MFNode => "MFNode",
            FieldType::SFBool => "SFBool",
            FieldType::MFBool => "MFBool",
            FieldType::SFInt32 => "SFInt32",
            FieldType::MFInt32 => "MFInt32",
            FieldType::SFFloat => "SFFloat",
            FieldType::MFFloat => "MFFloat",
            FieldType::SFTime => "SFTime",
            FieldType::SFDouble => "SFDouble",
            FieldType::SFString => "SFString",
            FieldType::MFString => "MFString",
            FieldType::SFVec2f => "SFVec2f",
            FieldType::MFVec2f => "MFVec2f",
            FieldType::SFVec3f => "SFVec3f",
            FieldType::MFVec3f => "MFVec3f",
            FieldType::SFColor => "SFColor",
            FieldType::MFColor => "MFColor",
            FieldType::SFColorRGBA => "SFColorRGBA",
            FieldType::MFColorRGBA => "MFColorRGBA",
            FieldType::SFRotation => "SFRotation",
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, FieldType::SFNode | FieldType::MFNode)
    }

    /// Float components per element for packed float types
    pub fn stride(&self) -> u8 {
        match self {
            FieldType::SFVec2f | FieldType::MFVec2f => 2,
            FieldType::SFVec3f | FieldType::MFVec3f | FieldType::SFColor | FieldType::MFColor => 3,
            FieldType::SFColorRGBA | FieldType::MFColorRGBA | FieldType::SFRotation => 4,
            _ => 1,
        }
    }

    /// Does `value` have the shape this type requires
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldType::SFNode, FieldValue::Node(_))
            | (FieldType::MFNode, FieldValue::Nodes(_))
            | (FieldType::SFBool, FieldValue::Bool(_))
            | (FieldType::MFBool, FieldValue::Bools(_))
            | (FieldType::SFInt32, FieldValue::Int(_))
            | (FieldType::MFInt32, FieldValue::Ints(_))
            | (FieldType::SFFloat, FieldValue::Float(_))
            | (FieldType::SFTime | FieldType::SFDouble, FieldValue::Double(_))
            | (FieldType::SFString, FieldValue::String(_))
            | (FieldType::MFString, FieldValue::Strings(_)) => true,
            (
                FieldType::SFVec2f
                | FieldType::SFVec3f
                | FieldType::SFColor
                | FieldType::SFColorRGBA
                | FieldType::SFRotation,
                FieldValue::Floats { data, .. },
            ) => data.len() == usize::from(self.stride()),
            (
                FieldType::MFFloat
                | FieldType::MFVec2f
                | FieldType::MFVec3f
                | FieldType::MFColor
                | FieldType::MFColorRGBA,
                FieldValue::Floats { data, stride },
            ) => *stride == self.stride() && data.len() % usize::from(*stride) == 0,
            _ => false,
        }
    }

    /// Default value when a declaration gives none
    pub fn empty_value(&self) -> FieldValue {
        match self {
            FieldType::SFNode => FieldValue::Node(None),
            FieldType::MFNode => FieldValue::Nodes(Vec::new()),
            FieldType::SFBool => FieldValue::Bool(false),
            FieldType::MFBool => FieldValue::Bools(Vec::new()),
            FieldType::SFInt32 => FieldValue::Int(0),
            FieldType::MFInt32 => FieldValue::Ints(Vec::new()),
            FieldType::SFFloat => FieldValue::Float(0.0),
            FieldType::SFTime | FieldType::SFDouble => FieldValue::Double(0.0),
            FieldType::SFString => FieldValue::String(String::new()),
            FieldType::MFString => FieldValue::Strings(Vec::new()),
            FieldType::SFRotation => FieldValue::packed(&[0.0, 0.0, 1.0, 0.0]),
            FieldType::SFVec2f | FieldType::SFVec3f | FieldType::SFColor | FieldType::SFColorRGBA => {
                FieldValue::packed(&vec![0.0; usize::from(self.stride())])
            }
            FieldType::MFFloat
            | FieldType::MFVec2f
            | FieldType::MFVec3f
            | FieldType::MFColor
            | FieldType::MFColorRGBA => FieldValue::floats(Vec::new(), self.stride()),
        }
    }
}

/// Field access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessType {
    /// `field`
    InitializeOnly,
    /// `exposedField`
    InputOutput,
    /// `eventIn`
    InputOnly,
    /// `eventOut`
    OutputOnly,
}

impl AccessType {
    /// VRML97 keyword
    pub fn vrml_name(&self) -> &'static str {
        match self {
            AccessType::InitializeOnly => "field",
            AccessType::InputOutput => "exposedField",
            AccessType::InputOnly => "eventIn",
            AccessType::OutputOnly => "eventOut",
        }
    }

    /// Can a route deliver into a field with this access
    pub fn accepts_events(&self) -> bool {
        matches!(self, AccessType::InputOutput | AccessType::InputOnly)
    }

    /// Can a route read from a field with this access
    pub fn emits_events(&self) -> bool {
        matches!(self, AccessType::InputOutput | AccessType::OutputOnly)
    }
}

/// Constant initial value carried by a declaration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// The type's empty value
    Empty,
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Str(&'static str),
    Strs(&'static [&'static str]),
    Floats(&'static [f32]),
}

/// One row of a node kind's field table
#[derive(Debug, Clone, Copy)]
pub struct FieldDecl {
    pub name: &'static str,
    pub field_type: FieldType,
    pub access: AccessType,
    /// Capability a node held in this field must provide
    pub node_category: Option<NodeCategory>,
    pub init: Init,
}

impl FieldDecl {
    pub const fn new(name: &'static str, field_type: FieldType, access: AccessType) -> Self {
        Self {
            name,
            field_type,
            access,
            node_category: None,
            init: Init::Empty,
        }
    }

    /// Restrict an SFNode/MFNode field to one capability
    pub const fn holds(self, category: NodeCategory) -> Self {
        Self {
            node_category: Some(category),
            ..self
        }
    }

    pub const fn init(self, init: Init) -> Self {
        Self { init, ..self }
    }

    /// Build the initial value for a new node
    pub fn default_value(&self) -> FieldValue {
        match self.init {
            Init::Empty => self.field_type.empty_value(),
            Init::Bool(v) => FieldValue::Bool(v),
            Init::Int(v) => FieldValue::Int(v),
            Init::Float(v) => FieldValue::Float(v),
            Init::Double(v) => FieldValue::Double(v),
            Init::Vec2(v) => FieldValue::packed(&v),
            Init::Vec3(v) => FieldValue::packed(&v),
            Init::Vec4(v) => FieldValue::packed(&v),
            Init::Str(s) => FieldValue::String(s.to_string()),
            Init::Strs(items) => FieldValue::strings(items.iter().copied()),
            Init::Floats(data) => FieldValue::floats(data.to_vec(), self.field_type.stride()),
        }
    }
}

/// Name ↔ index lookup for one node kind
#[derive(Debug)]
pub struct FieldStore {
    node_name: &'static str,
    decls: &'static [FieldDecl],
    by_name: FxHashMap<String, usize>,
}

impl FieldStore {
    /// Build the table; exposed fields also answer to `set_<name>` and
    /// `<name>_changed`.
    pub fn new(node_name: &'static str, decls: &'static [FieldDecl]) -> Self {
        let mut by_name = FxHashMap::default();
        for (index, decl) in decls.iter().enumerate() {
            by_name.insert(decl.name.to_string(), index);
            if decl.access == AccessType::InputOutput {
                by_name.insert(format!("set_{}", decl.name), index);
                by_name.insert(format!("{}_changed", decl.name), index);
            }
        }
        Self {
            node_name,
            decls,
            by_name,
        }
    }

    pub fn node_name(&self) -> &'static str {
        self.node_name
    }

    /// Index of `name`, or `None` when the node has no such field
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn decl(&self, index: usize) -> Option<&'static FieldDecl> {
        self.decls.get(index)
    }

    pub fn decls(&self) -> &'static [FieldDecl] {
        self.decls
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}
