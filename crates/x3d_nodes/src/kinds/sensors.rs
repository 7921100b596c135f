//! Pointing, picking and environment sensors

use super::{check_non_negative, check_one_of, Check, METADATA};
use crate::field::{AccessType::*, FieldDecl, FieldType::*, Init};
use crate::node::{no_validation, KindSpec, NodeCategory};
use crate::value::FieldValue;

/// Accepted `intersectionType` values
pub const INTERSECTION_TYPES: &[&str] = &["BOUNDS", "GEOMETRY"];
/// Accepted `sortOrder` values
pub const SORT_ORDERS: &[&str] = &["ANY", "CLOSEST", "ALL", "ALL_SORTED"];

const ENABLED: FieldDecl = FieldDecl::new("enabled", SFBool, InputOutput).init(Init::Bool(true));
const DESCRIPTION: FieldDecl = FieldDecl::new("description", SFString, InputOutput);
const IS_ACTIVE: FieldDecl = FieldDecl::new("isActive", SFBool, OutputOnly);
const IS_OVER: FieldDecl = FieldDecl::new("isOver", SFBool, OutputOnly);

pub static TOUCH_SENSOR: KindSpec = KindSpec {
    name: "TouchSensor",
    fields: &[
        METADATA,
        DESCRIPTION,
        ENABLED,
        FieldDecl::new("hitNormal_changed", SFVec3f, OutputOnly),
        FieldDecl::new("hitPoint_changed", SFVec3f, OutputOnly),
        FieldDecl::new("hitTexCoord_changed", SFVec2f, OutputOnly),
        IS_ACTIVE,
        IS_OVER,
        FieldDecl::new("touchTime", SFTime, OutputOnly),
    ],
    categories: &[NodeCategory::PointingSensor],
    validate: no_validation,
};

pub static PLANE_SENSOR: KindSpec = KindSpec {
    name: "PlaneSensor",
    fields: &[
        METADATA,
        FieldDecl::new("autoOffset", SFBool, InputOutput).init(Init::Bool(true)),
        DESCRIPTION,
        ENABLED,
        FieldDecl::new("maxPosition", SFVec2f, InputOutput).init(Init::Vec2([-1.0, -1.0])),
        FieldDecl::new("minPosition", SFVec2f, InputOutput),
        FieldDecl::new("offset", SFVec3f, InputOutput),
        IS_ACTIVE,
        IS_OVER,
        FieldDecl::new("trackPoint_changed", SFVec3f, OutputOnly),
        FieldDecl::new("translation_changed", SFVec3f, OutputOnly),
    ],
    categories: &[NodeCategory::PointingSensor, NodeCategory::DragSensor],
    validate: no_validation,
};

fn validate_pick_sensor(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "intersectionType" => check_one_of(field, value, INTERSECTION_TYPES),
        "sortOrder" => check_one_of(field, value, SORT_ORDERS),
        _ => Ok(()),
    }
}

macro_rules! pick_sensor {
    ($static:ident, $name:literal, [$($extra:expr),* $(,)?]) => {
        pub static $static: KindSpec = KindSpec {
            name: $name,
            fields: &[
                METADATA,
                ENABLED,
                FieldDecl::new("objectType", MFString, InputOutput).init(Init::Strs(&["ALL"])),
                FieldDecl::new("pickingGeometry", SFNode, InputOutput)
                    .holds(NodeCategory::Geometry),
                FieldDecl::new("pickTarget", MFNode, InputOutput),
                FieldDecl::new("intersectionType", SFString, InitializeOnly)
                    .init(Init::Str("BOUNDS")),
                FieldDecl::new("sortOrder", SFString, InitializeOnly).init(Init::Str("CLOSEST")),
                IS_ACTIVE,
                FieldDecl::new("pickedGeometry", MFNode, OutputOnly),
                $($extra),*
            ],
            categories: &[NodeCategory::PickSensor],
            validate: validate_pick_sensor,
        };
    };
}

pick_sensor!(
    LINE_PICK_SENSOR,
    "LinePickSensor",
    [
        FieldDecl::new("pickedNormal", MFVec3f, OutputOnly),
        FieldDecl::new("pickedPoint", MFVec3f, OutputOnly),
        FieldDecl::new("pickedTextureCoordinate", MFVec3f, OutputOnly),
    ]
);

pick_sensor!(
    POINT_PICK_SENSOR,
    "PointPickSensor",
    [FieldDecl::new("pickedPoint", MFVec3f, OutputOnly)]
);

pick_sensor!(PRIMITIVE_PICK_SENSOR, "PrimitivePickSensor", []);

pick_sensor!(VOLUME_PICK_SENSOR, "VolumePickSensor", []);

fn validate_region(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "size" => check_non_negative(field, value),
        _ => Ok(()),
    }
}

pub static VISIBILITY_SENSOR: KindSpec = KindSpec {
    name: "VisibilitySensor",
    fields: &[
        METADATA,
        FieldDecl::new("center", SFVec3f, InputOutput),
        ENABLED,
        FieldDecl::new("size", SFVec3f, InputOutput),
        FieldDecl::new("enterTime", SFTime, OutputOnly),
        FieldDecl::new("exitTime", SFTime, OutputOnly),
        IS_ACTIVE,
    ],
    categories: &[NodeCategory::EnvironmentSensor],
    validate: validate_region,
};

pub static PROXIMITY_SENSOR: KindSpec = KindSpec {
    name: "ProximitySensor",
    fields: &[
        METADATA,
        FieldDecl::new("center", SFVec3f, InputOutput),
        ENABLED,
        FieldDecl::new("size", SFVec3f, InputOutput),
        FieldDecl::new("centerOfRotation_changed", SFVec3f, OutputOnly),
        FieldDecl::new("enterTime", SFTime, OutputOnly),
        FieldDecl::new("exitTime", SFTime, OutputOnly),
        IS_ACTIVE,
        FieldDecl::new("orientation_changed", SFRotation, OutputOnly),
        FieldDecl::new("position_changed", SFVec3f, OutputOnly),
    ],
    categories: &[NodeCategory::EnvironmentSensor],
    validate: validate_region,
};
