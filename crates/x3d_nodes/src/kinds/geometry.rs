//! Geometry nodes and their property nodes

use super::{check_color, check_non_negative, check_positive, Check, METADATA};
use crate::field::{AccessType::*, FieldDecl, FieldType::*, Init};
use crate::node::{no_validation, KindSpec, NodeCategory};
use crate::value::FieldValue;

const SOLID: FieldDecl = FieldDecl::new("solid", SFBool, InitializeOnly).init(Init::Bool(true));
const COLOR_FIELD: FieldDecl =
    FieldDecl::new("color", SFNode, InputOutput).holds(NodeCategory::Color);
const COORD_FIELD: FieldDecl =
    FieldDecl::new("coord", SFNode, InputOutput).holds(NodeCategory::Coordinate);

fn validate_primitive(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "size" | "radius" | "height" | "bottomRadius" => check_positive(field, value),
        _ => Ok(()),
    }
}

pub static BOX: KindSpec = KindSpec {
    name: "Box",
    fields: &[
        METADATA,
        FieldDecl::new("size", SFVec3f, InitializeOnly).init(Init::Vec3([2.0, 2.0, 2.0])),
        SOLID,
    ],
    categories: &[NodeCategory::Geometry],
    validate: validate_primitive,
};

pub static SPHERE: KindSpec = KindSpec {
    name: "Sphere",
    fields: &[
        METADATA,
        FieldDecl::new("radius", SFFloat, InitializeOnly).init(Init::Float(1.0)),
        SOLID,
    ],
    categories: &[NodeCategory::Geometry],
    validate: validate_primitive,
};

pub static CONE: KindSpec = KindSpec {
    name: "Cone",
    fields: &[
        METADATA,
        FieldDecl::new("bottomRadius", SFFloat, InitializeOnly).init(Init::Float(1.0)),
        FieldDecl::new("height", SFFloat, InitializeOnly).init(Init::Float(2.0)),
        FieldDecl::new("side", SFBool, InitializeOnly).init(Init::Bool(true)),
        FieldDecl::new("bottom", SFBool, InitializeOnly).init(Init::Bool(true)),
        SOLID,
    ],
    categories: &[NodeCategory::Geometry],
    validate: validate_primitive,
};

pub static CYLINDER: KindSpec = KindSpec {
    name: "Cylinder",
    fields: &[
        METADATA,
        FieldDecl::new("radius", SFFloat, InitializeOnly).init(Init::Float(1.0)),
        FieldDecl::new("height", SFFloat, InitializeOnly).init(Init::Float(2.0)),
        FieldDecl::new("bottom", SFBool, InitializeOnly).init(Init::Bool(true)),
        FieldDecl::new("side", SFBool, InitializeOnly).init(Init::Bool(true)),
        FieldDecl::new("top", SFBool, InitializeOnly).init(Init::Bool(true)),
        SOLID,
    ],
    categories: &[NodeCategory::Geometry],
    validate: validate_primitive,
};

pub static COORDINATE: KindSpec = KindSpec {
    name: "Coordinate",
    fields: &[METADATA, FieldDecl::new("point", MFVec3f, InputOutput)],
    categories: &[NodeCategory::Coordinate],
    validate: no_validation,
};

pub static NORMAL: KindSpec = KindSpec {
    name: "Normal",
    fields: &[METADATA, FieldDecl::new("vector", MFVec3f, InputOutput)],
    categories: &[NodeCategory::Normal],
    validate: no_validation,
};

fn validate_color_node(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "color" => check_color(field, value),
        _ => Ok(()),
    }
}

pub static COLOR: KindSpec = KindSpec {
    name: "Color",
    fields: &[METADATA, FieldDecl::new("color", MFColor, InputOutput)],
    categories: &[NodeCategory::Color],
    validate: validate_color_node,
};

pub static COLOR_RGBA: KindSpec = KindSpec {
    name: "ColorRGBA",
    fields: &[METADATA, FieldDecl::new("color", MFColorRGBA, InputOutput)],
    categories: &[NodeCategory::Color],
    validate: validate_color_node,
};

pub static TEXTURE_COORDINATE: KindSpec = KindSpec {
    name: "TextureCoordinate",
    fields: &[METADATA, FieldDecl::new("point", MFVec2f, InputOutput)],
    categories: &[NodeCategory::TextureCoordinate],
    validate: no_validation,
};

pub static POINT_SET: KindSpec = KindSpec {
    name: "PointSet",
    fields: &[METADATA, COLOR_FIELD, COORD_FIELD],
    categories: &[NodeCategory::Geometry],
    validate: no_validation,
};

pub static LINE_SET: KindSpec = KindSpec {
    name: "LineSet",
    fields: &[
        METADATA,
        COLOR_FIELD,
        COORD_FIELD,
        FieldDecl::new("vertexCount", MFInt32, InputOutput),
    ],
    categories: &[NodeCategory::Geometry],
    validate: validate_line_set,
};

fn validate_line_set(field: &'static str, value: &FieldValue) -> Check {
    match (field, value.as_ints()) {
        ("vertexCount", Some(counts)) => match counts.iter().find(|c| **c < 2) {
            Some(c) => Err(format!("vertexCount entries must be >= 2: {c}")),
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

pub static INDEXED_LINE_SET: KindSpec = KindSpec {
    name: "IndexedLineSet",
    fields: &[
        METADATA,
        COLOR_FIELD,
        COORD_FIELD,
        FieldDecl::new("colorIndex", MFInt32, InitializeOnly),
        FieldDecl::new("colorPerVertex", SFBool, InitializeOnly).init(Init::Bool(true)),
        FieldDecl::new("coordIndex", MFInt32, InitializeOnly),
        FieldDecl::new("set_colorIndex", MFInt32, InputOnly),
        FieldDecl::new("set_coordIndex", MFInt32, InputOnly),
    ],
    categories: &[NodeCategory::Geometry],
    validate: no_validation,
};

pub static INDEXED_FACE_SET: KindSpec = KindSpec {
    name: "IndexedFaceSet",
    fields: &[
        METADATA,
        COLOR_FIELD,
        COORD_FIELD,
        FieldDecl::new("normal", SFNode, InputOutput).holds(NodeCategory::Normal),
        FieldDecl::new("texCoord", SFNode, InputOutput).holds(NodeCategory::TextureCoordinate),
        FieldDecl::new("ccw", SFBool, InitializeOnly).init(Init::Bool(true)),
        FieldDecl::new("colorIndex", MFInt32, InitializeOnly),
        FieldDecl::new("colorPerVertex", SFBool, InitializeOnly).init(Init::Bool(true)),
        FieldDecl::new("convex", SFBool, InitializeOnly).init(Init::Bool(true)),
        FieldDecl::new("coordIndex", MFInt32, InitializeOnly),
        FieldDecl::new("creaseAngle", SFFloat, InitializeOnly),
        FieldDecl::new("normalIndex", MFInt32, InitializeOnly),
        FieldDecl::new("normalPerVertex", SFBool, InitializeOnly).init(Init::Bool(true)),
        SOLID,
        FieldDecl::new("texCoordIndex", MFInt32, InitializeOnly),
    ],
    categories: &[NodeCategory::Geometry],
    validate: validate_face_set,
};

fn validate_face_set(field: &'static str, value: &FieldValue) -> Check {
    match field {
        "creaseAngle" => check_non_negative(field, value),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_dimensions() {
        assert!(validate_primitive("radius", &FieldValue::Float(0.5)).is_ok());
        assert!(validate_primitive("radius", &FieldValue::Float(0.0)).is_err());
        assert!(validate_primitive("size", &FieldValue::packed(&[1.0, -1.0, 1.0])).is_err());
    }

    #[test]
    fn test_vertex_count() {
        assert!(validate_line_set("vertexCount", &FieldValue::Ints(vec![2, 3])).is_ok());
        assert!(validate_line_set("vertexCount", &FieldValue::Ints(vec![2, 1])).is_err());
    }
}
