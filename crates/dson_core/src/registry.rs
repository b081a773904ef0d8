//! Type registry and schema tables.
//!
//! Every DSON object category is described by a [`Schema`]: an ordered list
//! of field tables mapping JSON keys to a [`PropKind`]. Schemas layer by
//! composition -- a schema built with [`SchemaBuilder::extends`] prepends its
//! own table onto the base schema's tables, so a redeclared key shadows the
//! base definition without any runtime inheritance.
//!
//! Polymorphic slots (nodes, channels) dispatch on the JSON `type` string
//! through [`Registry::resolve_concrete`].

use std::collections::HashMap;

use serde_json::{Map, Value};

/// How a schema-governed JSON key is interpreted during the build pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropKind {
    /// Copied through verbatim.
    Value,

    /// A raw array, or an object wrapping one under `values`; shape-checked
    /// but not built into objects (vertex lists, weight maps, ...).
    ValueArray,

    /// A typed child object, built recursively.
    Nested(&'static str),

    /// An array of typed child objects.
    NestedArray(&'static str),

    /// A reference URL, left unbound until the resolve pass.
    Ref,

    /// An array of reference URLs.
    RefArray,

    /// A reference whose bound target becomes the owner's prototype
    /// (`inst_def`) instead of an ordinary field.
    InstDefRef,
}

/// Schema for one object category.
#[derive(Clone, Debug)]
pub struct Schema {
    /// Registry name, e.g. `"NodeInstance"`.
    pub name: &'static str,

    /// DSON `type` strings that dispatch to this schema.
    pub type_names: &'static [&'static str],

    /// When true, the JSON `type` field selects the concrete schema for
    /// slots declared with this base.
    pub auto_type: bool,

    /// Accept arbitrary keys without warning (extensible metadata).
    pub open: bool,

    /// Register objects of this schema in the owning document's id index.
    /// Structurally-contained shapes (channels, joints, regions) carry ids
    /// but are containment, not addressable assets, and leave this false.
    pub register_id: bool,

    /// Objects of this schema hook themselves into the hierarchy children
    /// of their bound `parent` reference (node family).
    pub links_parent: bool,

    base_chain: Vec<&'static str>,
    tables: Vec<HashMap<&'static str, PropKind>>,
}

impl Schema {
    /// Look up a key across the layered field tables, most specific first.
    pub fn prop_kind(&self, key: &str) -> Option<PropKind> {
        self.tables.iter().find_map(|t| t.get(key)).copied()
    }

    /// True if this schema is `base` or layers on top of it.
    pub fn is_a(&self, base: &str) -> bool {
        self.name == base || self.base_chain.iter().any(|b| *b == base)
    }
}

/// Maps schema names and DSON type strings to schemas.
#[derive(Debug, Default)]
pub struct Registry {
    schemas: HashMap<&'static str, Schema>,
    type_names: HashMap<&'static str, &'static str>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start defining a schema. Panics on duplicate names or type strings:
    /// the catalog is assembled once at startup and a collision there is a
    /// programming error, not a data error.
    pub fn define(&mut self, name: &'static str) -> SchemaBuilder<'_> {
        assert!(
            !self.schemas.contains_key(name),
            "schema {name} is already registered"
        );
        SchemaBuilder {
            registry: self,
            schema: Schema {
                name,
                type_names: &[],
                auto_type: false,
                open: false,
                register_id: false,
                links_parent: false,
                base_chain: Vec::new(),
                tables: Vec::new(),
            },
            fields: HashMap::new(),
        }
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Schema for a slot declared as `declared`, dispatching on the raw
    /// JSON `type` field when the declared schema is polymorphic. Unknown
    /// or incompatible type strings warn and fall back to the declared
    /// schema.
    pub fn resolve_concrete(&self, declared: &str, raw: &Map<String, Value>) -> &Schema {
        let base = self
            .schemas
            .get(declared)
            .unwrap_or_else(|| panic!("schema {declared} is not registered"));
        if !base.auto_type {
            return base;
        }
        if let Some(type_name) = raw.get("type").and_then(Value::as_str) {
            if let Some(sub) = self
                .type_names
                .get(type_name)
                .and_then(|name| self.schemas.get(name))
            {
                if sub.is_a(base.name) {
                    return sub;
                }
            }
            log::warn!("unknown type \"{}\" for {}", type_name, base.name);
        }
        base
    }
}

/// Builder returned by [`Registry::define`].
pub struct SchemaBuilder<'r> {
    registry: &'r mut Registry,
    schema: Schema,
    fields: HashMap<&'static str, PropKind>,
}

impl SchemaBuilder<'_> {
    /// Layer on an already-registered base schema: its field tables are
    /// searched after this schema's own table, and its name joins the base
    /// chain used for dispatch compatibility checks.
    pub fn extends(mut self, base: &'static str) -> Self {
        let base = self
            .registry
            .schemas
            .get(base)
            .unwrap_or_else(|| panic!("base schema {base} is not registered"));
        self.schema.base_chain.push(base.name);
        self.schema.base_chain.extend(&base.base_chain);
        self.schema.tables.extend(base.tables.iter().cloned());
        self
    }

    pub fn types(mut self, names: &'static [&'static str]) -> Self {
        self.schema.type_names = names;
        self
    }

    pub fn auto_type(mut self) -> Self {
        self.schema.auto_type = true;
        self
    }

    pub fn open(mut self) -> Self {
        self.schema.open = true;
        self
    }

    pub fn register_id(mut self) -> Self {
        self.schema.register_id = true;
        self
    }

    pub fn links_parent(mut self) -> Self {
        self.schema.links_parent = true;
        self
    }

    pub fn field(mut self, key: &'static str, kind: PropKind) -> Self {
        self.fields.insert(key, kind);
        self
    }

    pub fn register(mut self) {
        if !self.fields.is_empty() {
            self.schema.tables.insert(0, self.fields);
        }
        for type_name in self.schema.type_names {
            let prev = self.registry.type_names.insert(type_name, self.schema.name);
            assert!(
                prev.is_none(),
                "type \"{type_name}\" is already registered to {}",
                prev.unwrap_or_default()
            );
        }
        self.registry.schemas.insert(self.schema.name, self.schema);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_layered_lookup_prefers_most_specific() {
        let mut reg = Registry::new();
        reg.define("Base")
            .field("value", PropKind::Value)
            .field("shared", PropKind::Value)
            .register();
        reg.define("Derived")
            .extends("Base")
            .field("shared", PropKind::Ref)
            .register();

        let derived = reg.schema("Derived").unwrap();
        assert_eq!(derived.prop_kind("shared"), Some(PropKind::Ref));
        assert_eq!(derived.prop_kind("value"), Some(PropKind::Value));
        assert_eq!(derived.prop_kind("missing"), None);
        assert!(derived.is_a("Base"));
    }

    #[test]
    fn test_auto_type_dispatch() {
        let mut reg = Registry::new();
        reg.define("Channel")
            .auto_type()
            .field("id", PropKind::Value)
            .register();
        reg.define("ChannelFloat")
            .extends("Channel")
            .types(&["float"])
            .register();
        reg.define("Stranger").types(&["stranger"]).register();

        let float = reg.resolve_concrete("Channel", &raw(json!({"type": "float"})));
        assert_eq!(float.name, "ChannelFloat");

        // Unknown type string falls back to the declared schema.
        let fallback = reg.resolve_concrete("Channel", &raw(json!({"type": "wobble"})));
        assert_eq!(fallback.name, "Channel");

        // A registered type that is not a subtype of the slot also falls back.
        let fallback = reg.resolve_concrete("Channel", &raw(json!({"type": "stranger"})));
        assert_eq!(fallback.name, "Channel");

        // No type field at all -> declared schema, no warning.
        let plain = reg.resolve_concrete("Channel", &raw(json!({"id": "x"})));
        assert_eq!(plain.name, "Channel");
    }
}
