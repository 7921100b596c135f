//! Grouping nodes

use super::METADATA;
use crate::field::{AccessType::*, FieldDecl, FieldType::*, Init};
use crate::node::{no_validation, KindSpec, NodeCategory};

const CHILDREN: FieldDecl =
    FieldDecl::new("children", MFNode, InputOutput).holds(NodeCategory::Child);
const ADD_CHILDREN: FieldDecl =
    FieldDecl::new("addChildren", MFNode, InputOnly).holds(NodeCategory::Child);
const REMOVE_CHILDREN: FieldDecl =
    FieldDecl::new("removeChildren", MFNode, InputOnly).holds(NodeCategory::Child);
const BBOX_CENTER: FieldDecl = FieldDecl::new("bboxCenter", SFVec3f, InitializeOnly);
const BBOX_SIZE: FieldDecl =
    FieldDecl::new("bboxSize", SFVec3f, InitializeOnly).init(Init::Vec3([-1.0, -1.0, -1.0]));

pub static GROUP: KindSpec = KindSpec {
    name: "Group",
    fields: &[METADATA, CHILDREN, ADD_CHILDREN, REMOVE_CHILDREN, BBOX_CENTER, BBOX_SIZE],
    categories: &[NodeCategory::Grouping],
    validate: no_validation,
};

pub static TRANSFORM: KindSpec = KindSpec {
    name: "Transform",
    fields: &[
        METADATA,
        CHILDREN,
        ADD_CHILDREN,
        REMOVE_CHILDREN,
        BBOX_CENTER,
        BBOX_SIZE,
        FieldDecl::new("center", SFVec3f, InputOutput),
        FieldDecl::new("rotation", SFRotation, InputOutput).init(Init::Vec4([0.0, 0.0, 1.0, 0.0])),
        FieldDecl::new("scale", SFVec3f, InputOutput).init(Init::Vec3([1.0, 1.0, 1.0])),
        FieldDecl::new("scaleOrientation", SFRotation, InputOutput)
            .init(Init::Vec4([0.0, 0.0, 1.0, 0.0])),
        FieldDecl::new("translation", SFVec3f, InputOutput),
    ],
    categories: &[NodeCategory::Grouping],
    validate: no_validation,
};

pub static ANCHOR: KindSpec = KindSpec {
    name: "Anchor",
    fields: &[
        METADATA,
        CHILDREN,
        ADD_CHILDREN,
        REMOVE_CHILDREN,
        BBOX_CENTER,
        BBOX_SIZE,
        FieldDecl::new("description", SFString, InputOutput),
        FieldDecl::new("parameter", MFString, InputOutput),
        FieldDecl::new("url", MFString, InputOutput),
    ],
    categories: &[NodeCategory::Grouping, NodeCategory::PointingSensor],
    validate: no_validation,
};

pub static PICKABLE_GROUP: KindSpec = KindSpec {
    name: "PickableGroup",
    fields: &[
        METADATA,
        CHILDREN,
        ADD_CHILDREN,
        REMOVE_CHILDREN,
        BBOX_CENTER,
        BBOX_SIZE,
        FieldDecl::new("objectType", MFString, InputOutput).init(Init::Strs(&["ALL"])),
        FieldDecl::new("pickable", SFBool, InputOutput).init(Init::Bool(true)),
    ],
    categories: &[NodeCategory::Grouping],
    validate: no_validation,
};
