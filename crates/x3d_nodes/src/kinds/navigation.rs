//! Bindable navigation nodes

use super::{check_non_negative, Check, METADATA};
use crate::field::{AccessType::*, FieldDecl, FieldType::*, Init};
use crate::node::{KindSpec, NodeCategory};
use crate::value::FieldValue;

const SET_BIND: FieldDecl = FieldDecl::new("set_bind", SFBool, InputOnly);
const BIND_TIME: FieldDecl = FieldDecl::new("bindTime", SFTime, OutputOnly);
const IS_BOUND: FieldDecl = FieldDecl::new("isBound", SFBool, OutputOnly);

pub static NAVIGATION_INFO: KindSpec = KindSpec {
    name: "NavigationInfo",
    fields: &[
        METADATA,
        SET_BIND,
        FieldDecl::new("avatarSize", MFFloat, InputOutput)
            .init(Init::Floats(&[0.25, 1.6, 0.75])),
        FieldDecl::new("headlight", SFBool, InputOutput).init(Init::Bool(true)),
        FieldDecl::new("speed", SFFloat, InputOutput).init(Init::Float(1.0)),
        FieldDecl::new("type", MFString, InputOutput).init(Init::Strs(&["EXAMINE", "ANY"])),
        FieldDecl::new("visibilityLimit", SFFloat, InputOutput),
        FieldDecl::new("transitionType", MFString, InputOutput).init(Init::Strs(&["LINEAR"])),
        BIND_TIME,
        IS_BOUND,
    ],
    categories: &[NodeCategory::Bindable],
    validate: validate_navigation_info,
};

fn validate_navigation_info(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "avatarSize" | "speed" | "visibilityLimit" => check_non_negative(field, value),
        _ => Ok(()),
    }
}

pub static VIEWPOINT: KindSpec = KindSpec {
    name: "Viewpoint",
    fields: &[
        METADATA,
        SET_BIND,
        FieldDecl::new("centerOfRotation", SFVec3f, InputOutput),
        FieldDecl::new("description", SFString, InputOutput),
        FieldDecl::new("fieldOfView", SFFloat, InputOutput).init(Init::Float(0.785_398)),
        FieldDecl::new("jump", SFBool, InputOutput).init(Init::Bool(true)),
        FieldDecl::new("orientation", SFRotation, InputOutput)
            .init(Init::Vec4([0.0, 0.0, 1.0, 0.0])),
        FieldDecl::new("position", SFVec3f, InputOutput).init(Init::Vec3([0.0, 0.0, 10.0])),
        BIND_TIME,
        IS_BOUND,
    ],
    categories: &[NodeCategory::Bindable],
    validate: validate_viewpoint,
};

fn validate_viewpoint(field: &'static str, value: &FieldValue) -> Check {
    match (field, value.as_float()) {
        ("fieldOfView", Some(fov)) if fov <= 0.0 || fov >= std::f32::consts::PI => {
            Err(format!("fieldOfView must be in (0, pi): {fov}"))
        }
        _ => Ok(()),
    }
}
