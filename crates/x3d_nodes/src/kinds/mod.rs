//! Field tables and validation for the supported node types.
//!
//! Each kind is plain data: a `FieldDecl` slice, the categories the node
//! provides and a validator keyed by field name.

pub mod geometry;
pub mod grouping;
pub mod metadata;
pub mod navigation;
pub mod sensors;
pub mod shape;

use crate::field::{AccessType, FieldDecl, FieldType};
use crate::node::NodeCategory;
use crate::value::FieldValue;

/// Shared first row of every table
pub(crate) const METADATA: FieldDecl =
    FieldDecl::new("metadata", FieldType::SFNode, AccessType::InputOutput)
        .holds(NodeCategory::Metadata);

pub(crate) type Check = std::result::Result<(), String>;

/// Every colour component in [0, 1]
pub(crate) fn check_color(field: &str, value: &FieldValue) -> Check {
    match value.as_floats() {
        Some(data) if data.iter().all(|c| (0.0..=1.0).contains(c)) => Ok(()),
        Some(data) => Err(format!("{field} component out of [0, 1]: {data:?}")),
        None => Ok(()),
    }
}

pub(crate) fn check_unit(field: &str, value: &FieldValue) -> Check {
    match value.as_float() {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(format!("{field} out of [0, 1]: {v}")),
        _ => Ok(()),
    }
}

pub(crate) fn check_non_negative(field: &str, value: &FieldValue) -> Check {
    match value {
        FieldValue::Float(v) if *v < 0.0 => Err(format!("{field} is < 0: {v}")),
        FieldValue::Int(v) if *v < 0 => Err(format!("{field} is < 0: {v}")),
        FieldValue::Floats { data, .. } if data.iter().any(|v| *v < 0.0) => {
            Err(format!("{field} has a negative component"))
        }
        _ => Ok(()),
    }
}

pub(crate) fn check_positive(field: &str, value: &FieldValue) -> Check {
    match value {
        FieldValue::Float(v) if *v <= 0.0 => Err(format!("{field} must be > 0: {v}")),
        FieldValue::Floats { data, .. } if data.iter().any(|v| *v <= 0.0) => {
            Err(format!("{field} must be > 0 in every component"))
        }
        _ => Ok(()),
    }
}

/// SFString restricted to a fixed set of words
pub(crate) fn check_one_of(field: &str, value: &FieldValue, allowed: &[&str]) -> Check {
    match value.as_str() {
        Some(s) if !allowed.contains(&s) => {
            Err(format!("{field} must be one of {allowed:?}, got {s:?}"))
        }
        _ => Ok(()),
    }
}
