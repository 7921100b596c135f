//! Shape, Appearance and the appearance property nodes

use super::{check_color, check_non_negative, check_one_of, check_positive, check_unit, Check, METADATA};
use crate::field::{AccessType::*, FieldDecl, FieldType::*, Init};
use crate::node::{no_validation, KindSpec, NodeCategory};
use crate::value::FieldValue;

pub static APPEARANCE: KindSpec = KindSpec {
    name: "Appearance",
    fields: &[
        METADATA,
        FieldDecl::new("material", SFNode, InputOutput).holds(NodeCategory::Material),
        FieldDecl::new("texture", SFNode, InputOutput).holds(NodeCategory::Texture),
        FieldDecl::new("textureTransform", SFNode, InputOutput)
            .holds(NodeCategory::TextureTransform),
        FieldDecl::new("lineProperties", SFNode, InputOutput).holds(NodeCategory::LineProperties),
        FieldDecl::new("pointProperties", SFNode, InputOutput)
            .holds(NodeCategory::PointProperties),
        FieldDecl::new("fillProperties", SFNode, InputOutput).holds(NodeCategory::FillProperties),
    ],
    categories: &[NodeCategory::Appearance],
    validate: no_validation,
};

/// Material fields whose change is reported to the holding Appearance
pub const MATERIAL_COLOR_FIELDS: &[&str] = &[
    "diffuseColor",
    "emissiveColor",
    "specularColor",
    "transparency",
];

pub static MATERIAL: KindSpec = KindSpec {
    name: "Material",
    fields: &[
        METADATA,
        FieldDecl::new("ambientIntensity", SFFloat, InputOutput).init(Init::Float(0.2)),
        FieldDecl::new("diffuseColor", SFColor, InputOutput).init(Init::Vec3([0.8, 0.8, 0.8])),
        FieldDecl::new("emissiveColor", SFColor, InputOutput),
        FieldDecl::new("shininess", SFFloat, InputOutput).init(Init::Float(0.2)),
        FieldDecl::new("specularColor", SFColor, InputOutput),
        FieldDecl::new("transparency", SFFloat, InputOutput),
    ],
    categories: &[NodeCategory::Material],
    validate: validate_material,
};

fn validate_material(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "ambientIntensity" | "shininess" | "transparency" => check_unit(field, value),
        "diffuseColor" | "emissiveColor" | "specularColor" => check_color(field, value),
        _ => Ok(()),
    }
}

pub static SHAPE: KindSpec = KindSpec {
    name: "Shape",
    fields: &[
        METADATA,
        FieldDecl::new("appearance", SFNode, InputOutput).holds(NodeCategory::Appearance),
        FieldDecl::new("geometry", SFNode, InputOutput).holds(NodeCategory::Geometry),
        FieldDecl::new("bboxCenter", SFVec3f, InitializeOnly),
        FieldDecl::new("bboxSize", SFVec3f, InitializeOnly).init(Init::Vec3([-1.0, -1.0, -1.0])),
    ],
    categories: &[],
    validate: no_validation,
};

pub static LINE_PROPERTIES: KindSpec = KindSpec {
    name: "LineProperties",
    fields: &[
        METADATA,
        FieldDecl::new("applied", SFBool, InputOutput).init(Init::Bool(true)),
        FieldDecl::new("linetype", SFInt32, InputOutput).init(Init::Int(1)),
        FieldDecl::new("linewidthScaleFactor", SFFloat, InputOutput),
    ],
    categories: &[NodeCategory::LineProperties],
    validate: validate_line_properties,
};

fn validate_line_properties(field: &'static str, value: &FieldValue) -> Check {
    match (field, value) {
        ("linetype", FieldValue::Int(t)) if !(1..=16).contains(t) => {
            Err(format!("linetype must be in 1..=16: {t}"))
        }
        ("linewidthScaleFactor", _) => check_non_negative(field, value),
        _ => Ok(()),
    }
}

pub static FILL_PROPERTIES: KindSpec = KindSpec {
    name: "FillProperties",
    fields: &[
        METADATA,
        FieldDecl::new("hatchStyle", SFInt32, InputOutput),
        FieldDecl::new("hatchColor", SFColor, InputOutput).init(Init::Vec3([1.0, 1.0, 1.0])),
        FieldDecl::new("fillStyle", SFString, InputOutput).init(Init::Str("NONE")),
    ],
    categories: &[NodeCategory::FillProperties],
    validate: validate_fill_properties,
};

fn validate_fill_properties(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "hatchStyle" => check_non_negative(field, value),
        "hatchColor" => check_color(field, value),
        "fillStyle" => check_one_of(field, value, &["NONE", "HATCHED"]),
        _ => Ok(()),
    }
}

pub static POINT_PROPERTIES: KindSpec = KindSpec {
    name: "PointProperties",
    fields: &[
        METADATA,
        FieldDecl::new("pointsizeScaleFactor", SFFloat, InputOutput).init(Init::Float(1.0)),
        FieldDecl::new("pointsizeMinValue", SFFloat, InputOutput).init(Init::Float(1.0)),
        FieldDecl::new("pointsizeMaxValue", SFFloat, InputOutput).init(Init::Float(1.0)),
        FieldDecl::new("pointsizeAttenuation", SFVec3f, InputOutput)
            .init(Init::Vec3([1.0, 0.0, 0.0])),
        FieldDecl::new("colorMode", SFString, InputOutput).init(Init::Str("TEXTURE_COLOR")),
    ],
    categories: &[NodeCategory::PointProperties],
    validate: validate_point_properties,
};

fn validate_point_properties(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "pointsizeScaleFactor" => check_positive(field, value),
        "pointsizeMinValue" | "pointsizeMaxValue" => check_non_negative(field, value),
        "colorMode" => check_one_of(
            field,
            value,
            &["TEXTURE_COLOR", "POINT_COLOR", "TEXTURE_AND_POINT_COLOR"],
        ),
        _ => Ok(()),
    }
}

pub static IMAGE_TEXTURE: KindSpec = KindSpec {
    name: "ImageTexture",
    fields: &[
        METADATA,
        FieldDecl::new("url", MFString, InputOutput),
        FieldDecl::new("repeatS", SFBool, InitializeOnly).init(Init::Bool(true)),
        FieldDecl::new("repeatT", SFBool, InitializeOnly).init(Init::Bool(true)),
    ],
    categories: &[NodeCategory::Texture],
    validate: no_validation,
};

pub static TEXTURE_TRANSFORM: KindSpec = KindSpec {
    name: "TextureTransform",
    fields: &[
        METADATA,
        FieldDecl::new("center", SFVec2f, InputOutput),
        FieldDecl::new("rotation", SFFloat, InputOutput),
        FieldDecl::new("scale", SFVec2f, InputOutput).init(Init::Vec2([1.0, 1.0])),
        FieldDecl::new("translation", SFVec2f, InputOutput),
    ],
    categories: &[NodeCategory::TextureTransform],
    validate: no_validation,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_validation() {
        assert!(validate_material("transparency", &FieldValue::Float(0.5)).is_ok());
        assert!(validate_material("transparency", &FieldValue::Float(2.0)).is_err());
        assert!(validate_material("diffuseColor", &FieldValue::color(1.2, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_linetype_range() {
        assert!(validate_line_properties("linetype", &FieldValue::Int(16)).is_ok());
        assert!(validate_line_properties("linetype", &FieldValue::Int(0)).is_err());
        assert!(validate_line_properties("linetype", &FieldValue::Int(17)).is_err());
        assert!(validate_line_properties("linewidthScaleFactor", &FieldValue::Float(-1.0)).is_err());
    }
}
