//! Metadata nodes

use super::METADATA;
use crate::field::{AccessType::*, FieldDecl, FieldType::*};
use crate::node::{no_validation, KindSpec, NodeCategory};

pub static METADATA_STRING: KindSpec = KindSpec {
    name: "MetadataString",
    fields: &[
        METADATA,
        FieldDecl::new("name", SFString, InputOutput),
        FieldDecl::new("reference", SFString, InputOutput),
        FieldDecl::new("value", MFString, InputOutput),
    ],
    categories: &[NodeCategory::Metadata],
    validate: no_validation,
};
