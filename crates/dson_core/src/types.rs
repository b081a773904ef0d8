//! The standard DSON schema catalog.
//!
//! One schema per object category of the format: the document root, the
//! asset libraries (nodes, geometries, materials, modifiers, UV sets,
//! images), their scene-instance counterparts, and the channel family.
//!
//! Library asset schemas set `register_id` so their objects land in the
//! document id index; embedded shapes (channels, regions, joints, rigidity
//! groups) carry ids of their own but stay out of the index -- they are
//! containment, not addressable assets.

use crate::registry::PropKind::{InstDefRef, Nested, NestedArray, Ref, RefArray, Value, ValueArray};
use crate::registry::Registry;

/// Root schema name used for every document.
pub const ROOT_SCHEMA: &str = "DAZ";

/// Build the registry with the full standard catalog.
pub fn standard() -> Registry {
    let mut reg = Registry::new();

    // Base table shared by every category.
    reg.define("Object")
        .field("extra", NestedArray("Extra"))
        .register();

    reg.define("Extra").extends("Object").open().register();

    reg.define("DAZ")
        .extends("Object")
        .field("file_version", Value)
        .field("asset_info", Value)
        .field("geometry_library", NestedArray("Geometry"))
        .field("node_library", NestedArray("Node"))
        .field("uv_set_library", NestedArray("UVSet"))
        .field("modifier_library", NestedArray("Modifier"))
        .field("image_library", NestedArray("Image"))
        .field("material_library", NestedArray("Material"))
        .field("scene", Nested("Scene"))
        .register();

    // -- channels ------------------------------------------------------------

    reg.define("Channel")
        .extends("Object")
        .auto_type()
        .field("id", Value)
        .field("type", Value)
        .field("name", Value)
        .field("label", Value)
        .field("visible", Value)
        .field("locked", Value)
        .field("auto_follow", Value)
        .register();

    reg.define("ChannelBase")
        .extends("Channel")
        .field("value", Value)
        .field("current_value", Value)
        // undocumented properties
        .field("default_image_gamma", Value)
        .field("image_file", Value)
        .field("image", Value)
        .register();

    reg.define("ChannelBaseMinMax")
        .extends("ChannelBase")
        .field("min", Value)
        .field("max", Value)
        .field("clamped", Value)
        .field("step_size", Value)
        .field("mappable", Value)
        .register();

    reg.define("ChannelAlias")
        .extends("Channel")
        .types(&["alias"])
        .field("target_channel", Ref)
        .register();

    reg.define("ChannelAnimation")
        .extends("Object")
        .field("url", Ref)
        .field("keys", Value)
        .register();

    reg.define("ChannelBool")
        .extends("ChannelBaseMinMax")
        .types(&["bool"])
        .register();

    reg.define("ChannelColor")
        .extends("ChannelBaseMinMax")
        .types(&["color", "float_color"])
        .register();

    reg.define("ChannelEnum")
        .extends("Channel")
        .types(&["enum"])
        .field("value", Value)
        .field("enum_values", Value)
        .register();

    reg.define("ChannelFloat")
        .extends("ChannelBaseMinMax")
        .types(&["float"])
        .field("display_as_percent", Value)
        .register();

    reg.define("ChannelImage")
        .extends("ChannelBase")
        .types(&["image"])
        .register();

    reg.define("ChannelInt")
        .extends("ChannelBaseMinMax")
        .types(&["int"])
        .register();

    reg.define("ChannelString")
        .extends("ChannelBase")
        .types(&["string"])
        .register();

    // -- geometry ------------------------------------------------------------

    reg.define("Region")
        .extends("Object")
        .field("id", Value)
        .field("label", Value)
        .field("display_hint", Value)
        .field("map", ValueArray)
        .field("children", NestedArray("Region"))
        .register();

    reg.define("Graft")
        .extends("Object")
        .field("vertex_count", Value)
        .field("poly_count", Value)
        .field("vertex_pairs", ValueArray)
        .field("hidden_polys", ValueArray)
        .register();

    reg.define("RigidityGroup")
        .extends("Object")
        .field("id", Value)
        .field("rotation_mode", Value)
        .field("scale_modes", Value)
        .field("reference", Value)
        .field("transform_nodes", RefArray)
        .field("reference_vertices", ValueArray)
        .field("mask_vertices", ValueArray)
        .register();

    reg.define("Rigidity")
        .extends("Object")
        .field("weights", ValueArray)
        .field("groups", NestedArray("RigidityGroup"))
        .register();

    reg.define("Geometry")
        .extends("Object")
        .register_id()
        .field("id", Value)
        .field("name", Value)
        .field("label", Value)
        .field("type", Value)
        .field("source", Value)
        .field("edge_interpolation_mode", Value)
        .field("default_uv_set", Ref)
        .field("vertices", ValueArray)
        .field("polygon_groups", ValueArray)
        .field("polygon_material_groups", ValueArray)
        .field("polylist", ValueArray)
        .field("root_region", Nested("Region"))
        .field("graft", Nested("Graft"))
        .field("rigidity", Nested("Rigidity"))
        .register();

    reg.define("GeometryInstance")
        .extends("Geometry")
        .register_id()
        .field("url", InstDefRef)
        // undocumented
        .field("current_subdivision_level", Value)
        .register();

    reg.define("UVSet")
        .extends("Object")
        .register_id()
        .field("id", Value)
        .field("label", Value)
        .field("name", Value)
        .field("vertex_count", Value)
        .field("polygon_vertex_indices", Value)
        .field("uvs", ValueArray)
        .register();

    reg.define("UVSetInstance")
        .extends("UVSet")
        .register_id()
        .field("url", InstDefRef)
        .field("parent", Ref)
        .register();

    // -- images and materials ------------------------------------------------

    reg.define("ImageMap")
        .extends("Object")
        .field("url", Value)
        .field("label", Value)
        .field("color", Value)
        .field("transparency", Value)
        .field("invert", Value)
        .field("rotation", Value)
        .field("xmirror", Value)
        .field("ymirror", Value)
        .field("xscale", Value)
        .field("yscale", Value)
        .field("xoffset", Value)
        .field("yoffset", Value)
        .field("operation", Value)
        .register();

    reg.define("Image")
        .extends("Object")
        .register_id()
        .field("id", Value)
        .field("name", Value)
        .field("source", Value)
        .field("map_gamma", Value)
        .field("map_size", Value)
        .field("map", NestedArray("ImageMap"))
        .register();

    reg.define("MaterialChannel")
        .extends("Object")
        .field("channel", Nested("Channel"))
        .field("group", Value)
        .field("color", Value)
        .field("strength", Value)
        .field("image", Value)
        // undocumented
        .field("presentation", Value)
        .register();

    reg.define("Material")
        .extends("Object")
        .register_id()
        .field("id", Value)
        .field("name", Value)
        .field("label", Value)
        .field("source", Value)
        .field("uv_set", Ref)
        .field("type", Value)
        .field("diffuse", Nested("MaterialChannel"))
        .field("diffuse_strength", Nested("MaterialChannel"))
        .field("specular", Nested("MaterialChannel"))
        .field("specular_strength", Nested("MaterialChannel"))
        .field("glossiness", Value)
        .field("ambient", Nested("MaterialChannel"))
        .field("ambient_strength", Nested("MaterialChannel"))
        .field("reflection", Nested("MaterialChannel"))
        .field("reflection_strength", Nested("MaterialChannel"))
        .field("refraction", Nested("MaterialChannel"))
        .field("refraction_strength", Nested("MaterialChannel"))
        .field("ior", Value)
        .field("bump", Nested("MaterialChannel"))
        .field("bump_min", Nested("MaterialChannel"))
        .field("bump_max", Nested("MaterialChannel"))
        .field("displacement", Nested("MaterialChannel"))
        .field("displacement_min", Nested("MaterialChannel"))
        .field("displacement_max", Nested("MaterialChannel"))
        .field("transparency", Nested("MaterialChannel"))
        .field("normal", Nested("MaterialChannel"))
        .field("u_offset", Nested("MaterialChannel"))
        .field("u_scale", Nested("MaterialChannel"))
        .field("v_offset", Nested("MaterialChannel"))
        .field("v_scale", Nested("MaterialChannel"))
        .register();

    reg.define("MaterialInstance")
        .extends("Material")
        .register_id()
        .field("parent", Ref)
        .field("geometry", Ref)
        .field("groups", Value)
        .field("url", InstDefRef)
        .register();

    // -- modifiers -----------------------------------------------------------

    reg.define("Presentation")
        .extends("Object")
        .field("type", Value)
        .field("label", Value)
        .field("description", Value)
        .field("icon_large", Value)
        .field("icon_small", Value)
        .field("colors", Value)
        // undocumented
        .field("auto_fit_base", Value)
        .field("preferred_base", Value)
        .register();

    reg.define("Operation")
        .extends("Object")
        .field("op", Value)
        .field("val", Value)
        // channel operand URLs may dangle; kept verbatim, not resolved
        .field("url", Value)
        .register();

    reg.define("Formula")
        .extends("Object")
        .field("output", Value)
        .field("stage", Value)
        .field("operations", NestedArray("Operation"))
        .register();

    reg.define("WeightedJoint")
        .extends("Object")
        .field("id", Value)
        .field("node", Ref)
        .field("node_weights", ValueArray)
        .field("scale_weights", ValueArray)
        .field("local_weights", Value)
        .field("bulge_weights", Value)
        .register();

    reg.define("SkinBinding")
        .extends("Object")
        .field("node", Ref)
        .field("geometry", Ref)
        .field("vertex_count", Value)
        .field("joints", NestedArray("WeightedJoint"))
        .field("selection_sets", Value)
        // undocumented
        .field("selection_map", Value)
        .register();

    reg.define("Morph")
        .extends("Object")
        .field("vertex_count", Value)
        .field("deltas", ValueArray)
        // undocumented
        .field("hd_url", Value)
        .register();

    reg.define("Modifier")
        .extends("Object")
        .register_id()
        .field("id", Value)
        .field("name", Value)
        .field("label", Value)
        .field("source", Value)
        .field("parent", Ref)
        .field("region", Value)
        .field("group", Value)
        .field("presentation", Nested("Presentation"))
        .field("channel", Nested("Channel"))
        .field("formulas", NestedArray("Formula"))
        .field("morph", Nested("Morph"))
        .field("skin", Nested("SkinBinding"))
        .register();

    reg.define("ModifierInstance")
        .extends("Modifier")
        .register_id()
        .field("url", InstDefRef)
        .register();

    // -- nodes ---------------------------------------------------------------

    reg.define("Node")
        .extends("Object")
        .auto_type()
        .types(&["node"])
        .register_id()
        .links_parent()
        .field("id", Value)
        .field("name", Value)
        .field("type", Value)
        .field("label", Value)
        .field("source", Value)
        .field("parent", Ref)
        .field("rotation_order", Value)
        .field("inherits_scale", Value)
        .field("center_point", NestedArray("Channel"))
        .field("end_point", NestedArray("Channel"))
        .field("orientation", NestedArray("Channel"))
        .field("rotation", NestedArray("Channel"))
        .field("translation", NestedArray("Channel"))
        .field("scale", NestedArray("Channel"))
        .field("general_scale", Nested("Channel"))
        .field("presentation", Nested("Presentation"))
        .field("formulas", NestedArray("Formula"))
        // undocumented
        .field("id_aliases", Value)
        .field("name_aliases", Value)
        .register();

    reg.define("Bone")
        .extends("Node")
        .types(&["bone"])
        .register_id()
        .links_parent()
        .register();

    reg.define("Figure")
        .extends("Node")
        .types(&["figure"])
        .register_id()
        .links_parent()
        .register();

    reg.define("CameraPerspective")
        .extends("Object")
        .field("znear", Value)
        .field("zfar", Value)
        .field("yfov", Value)
        .field("focal_length", Value)
        .field("depth_of_field", Value)
        .field("focal_distance", Value)
        .field("fstop", Value)
        .register();

    reg.define("CameraOrthographic")
        .extends("Object")
        .field("znear", Value)
        .field("zfar", Value)
        .field("ymag", Value)
        .register();

    reg.define("Camera")
        .extends("Node")
        .types(&["camera"])
        .register_id()
        .links_parent()
        .field("camera_perspective", Nested("CameraPerspective"))
        .field("camera_orthographic", Nested("CameraOrthographic"))
        .register();

    reg.define("LightDirectional")
        .extends("Object")
        .field("intensity", Value)
        .field("shadow_type", Value)
        .field("shadow_softness", Value)
        .field("shadow_bias", Value)
        .register();

    reg.define("LightPoint")
        .extends("LightDirectional")
        .field("constant_attenuation", Value)
        .field("linear_attenuation", Value)
        .field("quadratic_attenuation", Value)
        .register();

    reg.define("LightSpot")
        .extends("LightPoint")
        .field("falloff_angle", Value)
        .field("falloff_exponent", Value)
        .register();

    reg.define("Light")
        .extends("Node")
        .types(&["light"])
        .register_id()
        .links_parent()
        .field("color", Value)
        .field("on", Value)
        .field("point", Nested("LightPoint"))
        .field("directional", Nested("LightDirectional"))
        .field("spot", Nested("LightSpot"))
        .register();

    reg.define("Preview")
        .extends("Object")
        .field("oriented_box", Value)
        .field("center_point", Value)
        .field("end_point", Value)
        .field("rotation_order", Value)
        // undocumented
        .field("type", Value)
        .register();

    reg.define("NodeInstance")
        .extends("Node")
        .register_id()
        .links_parent()
        .field("url", InstDefRef)
        .field("parent_in_place", Ref)
        .field("conform_target", Ref)
        .field("geometries", NestedArray("GeometryInstance"))
        .field("preview", Nested("Preview"))
        .register();

    // -- scene ---------------------------------------------------------------

    reg.define("Scene")
        .extends("Object")
        .field("presentation", Nested("Presentation"))
        .field("nodes", NestedArray("NodeInstance"))
        .field("uvs", NestedArray("UVSetInstance"))
        .field("modifiers", NestedArray("ModifierInstance"))
        .field("materials", NestedArray("MaterialInstance"))
        .field("animations", NestedArray("ChannelAnimation"))
        .field("current_camera", Ref)
        .register();

    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PropKind;
    use serde_json::json;

    #[test]
    fn test_catalog_builds() {
        let reg = standard();
        assert!(reg.schema(ROOT_SCHEMA).is_some());
        assert!(reg.schema("NodeInstance").is_some());
        assert!(reg.schema("ChannelFloat").is_some());
    }

    #[test]
    fn test_node_dispatch_by_type_string() {
        let reg = standard();
        let raw = json!({"id": "hip", "type": "bone"});
        let schema = reg.resolve_concrete("Node", raw.as_object().unwrap());
        assert_eq!(schema.name, "Bone");
        assert!(schema.register_id);
    }

    #[test]
    fn test_instance_schemas_shadow_base_keys() {
        let reg = standard();
        // Node.url is unknown; NodeInstance.url is the prototype reference.
        let node = reg.schema("Node").unwrap();
        let inst = reg.schema("NodeInstance").unwrap();
        assert_eq!(node.prop_kind("url"), None);
        assert_eq!(inst.prop_kind("url"), Some(PropKind::InstDefRef));
        // The base Node table still answers for inherited keys.
        assert_eq!(
            inst.prop_kind("translation"),
            Some(PropKind::NestedArray("Channel"))
        );
    }

    #[test]
    fn test_channels_are_not_addressable_assets() {
        let reg = standard();
        assert!(!reg.schema("Channel").unwrap().register_id);
        assert!(!reg.schema("WeightedJoint").unwrap().register_id);
        assert!(reg.schema("Geometry").unwrap().register_id);
    }
}
