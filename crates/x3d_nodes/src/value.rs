//! Field values.
//!
//! [`FieldValue`] is the tagged union every field read and write goes
//! through. Vector-like fields (`SFVec3f`, `SFColor`, `MFVec3f`, ...) share the
//! flat [`FieldValue::Floats`] representation with a per-element stride so a
//! single buffer can be reused for any of them.

use crate::proto::NodeRef;
use serde::{Deserialize, Serialize};
use x3d_core::{Vec2, Vec3};

/// Value of one field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// SFNode; `None` is the VRML `NULL`
    Node(Option<NodeRef>),
    /// MFNode
    Nodes(Vec<NodeRef>),
    /// SFBool
    Bool(bool),
    /// MFBool
    Bools(Vec<bool>),
    /// SFInt32
    Int(i32),
    /// MFInt32
    Ints(Vec<i32>),
    /// SFFloat
    Float(f32),
    /// Packed floats, `stride` components per element
    Floats { data: Vec<f32>, stride: u8 },
    /// SFTime / SFDouble
    Double(f64),
    /// SFString
    String(String),
    /// MFString
    Strings(Vec<String>),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Node(None)
    }
}

impl FieldValue {
    /// Single packed element (SFVec2f, SFVec3f, SFColor, SFRotation)
    pub fn packed(values: &[f32]) -> Self {
        FieldValue::Floats {
            data: values.to_vec(),
            stride: values.len().max(1) as u8,
        }
    }

    pub fn vec3(v: Vec3) -> Self {
        Self::packed(&v.to_array())
    }

    pub fn vec2(v: Vec2) -> Self {
        Self::packed(&[v.x, v.y])
    }

    pub fn color(r: f32, g: f32, b: f32) -> Self {
        Self::packed(&[r, g, b])
    }

    /// Multi-valued float field with `stride` components per element
    pub fn floats(data: Vec<f32>, stride: u8) -> Self {
        FieldValue::Floats {
            data,
            stride: stride.max(1),
        }
    }

    pub fn node(node: impl Into<NodeRef>) -> Self {
        FieldValue::Node(Some(node.into()))
    }

    pub fn string(s: impl Into<String>) -> Self {
        FieldValue::String(s.into())
    }

    pub fn strings<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        FieldValue::Strings(items.into_iter().map(Into::into).collect())
    }

    /// Discriminant name used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Node(_) => "node",
            FieldValue::Nodes(_) => "node-array",
            FieldValue::Bool(_) => "bool",
            FieldValue::Bools(_) => "bool-array",
            FieldValue::Int(_) => "int",
            FieldValue::Ints(_) => "int-array",
            FieldValue::Float(_) => "float",
            FieldValue::Floats { .. } => "float-array",
            FieldValue::Double(_) => "double",
            FieldValue::String(_) => "string",
            FieldValue::Strings(_) => "string-array",
        }
    }

    /// Number of logical elements held
    pub fn num_elements(&self) -> usize {
        match self {
            FieldValue::Node(n) => usize::from(n.is_some()),
            FieldValue::Nodes(v) => v.len(),
            FieldValue::Bools(v) => v.len(),
            FieldValue::Ints(v) => v.len(),
            FieldValue::Floats { data, stride } => data.len() / usize::from(*stride).max(1),
            FieldValue::Strings(v) => v.len(),
            FieldValue::Bool(_)
            | FieldValue::Int(_)
            | FieldValue::Float(_)
            | FieldValue::Double(_)
            | FieldValue::String(_) => 1,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            FieldValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            FieldValue::Floats { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i32]> {
        match self {
            FieldValue::Ints(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            FieldValue::Floats { data, .. } if data.len() >= 3 => Some(Vec3::from_slice(data)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            FieldValue::Strings(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeRef> {
        match self {
            FieldValue::Node(n) => *n,
            _ => None,
        }
    }

    /// Every node reference held, SF or MF
    pub fn node_refs(&self) -> &[NodeRef] {
        match self {
            FieldValue::Node(Some(n)) => std::slice::from_ref(n),
            FieldValue::Nodes(v) => v,
            _ => &[],
        }
    }

    /// Overwrite with `other`, reusing this value's buffers when the
    /// variants match.
    pub fn refill_from(&mut self, other: &FieldValue) {
        match (self, other) {
            (FieldValue::Floats { data, stride }, FieldValue::Floats { data: src, stride: s }) => {
                data.clear();
                data.extend_from_slice(src);
                *stride = *s;
            }
            (FieldValue::Ints(dst), FieldValue::Ints(src)) => {
                dst.clear();
                dst.extend_from_slice(src);
            }
            (FieldValue::Bools(dst), FieldValue::Bools(src)) => {
                dst.clear();
                dst.extend_from_slice(src);
            }
            (FieldValue::Nodes(dst), FieldValue::Nodes(src)) => {
                dst.clear();
                dst.extend_from_slice(src);
            }
            (FieldValue::Strings(dst), FieldValue::Strings(src)) => dst.clone_from(src),
            (FieldValue::String(dst), FieldValue::String(src)) => dst.clone_from(src),
            (dst, src) => *dst = src.clone(),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<Vec<i32>> for FieldValue {
    fn from(v: Vec<i32>) -> Self {
        FieldValue::Ints(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_counts() {
        assert_eq!(FieldValue::floats(vec![0.0; 9], 3).num_elements(), 3);
        assert_eq!(FieldValue::Node(None).num_elements(), 0);
        assert_eq!(FieldValue::Float(1.0).num_elements(), 1);
        assert_eq!(FieldValue::Ints(vec![0, 1, -1, 2, 3]).num_elements(), 5);
    }

    #[test]
    fn test_refill_reuses_buffer() {
        let mut scratch = FieldValue::floats(Vec::with_capacity(64), 3);
        let ptr = scratch.as_floats().map(|d| d.as_ptr());
        scratch.refill_from(&FieldValue::color(0.1, 0.2, 0.3));
        assert_eq!(scratch.as_floats(), Some(&[0.1, 0.2, 0.3][..]));
        assert_eq!(scratch.as_floats().map(|d| d.as_ptr()), ptr);

        scratch.refill_from(&FieldValue::Bool(true));
        assert_eq!(scratch, FieldValue::Bool(true));
    }

    #[test]
    fn test_serde_roundtrip() {
        let value = FieldValue::strings(["EXAMINE", "ANY"]);
        let json = serde_json::to_string(&value).unwrap();
        let back: FieldValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
