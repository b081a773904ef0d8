//! Object graph construction.
//!
//! A single depth-first walk turns raw document JSON into the typed,
//! indexed arena tree. Reference fields stay unbound here -- dereferencing
//! anything before the whole document is built would reintroduce the
//! forward-reference ordering bugs this two-phase design exists to avoid.

use serde_json::Value;
use thiserror::Error;

use crate::object::{Document, Field, ObjId, Object, RefSlot, Step, dotted};
use crate::registry::{PropKind, Registry, Schema};
use crate::types::ROOT_SCHEMA;

/// Errors that can occur while building an object tree.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{path}: property \"{key}\" is {actual}, but {expected} was expected")]
    TypeMismatch {
        path: String,
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("document root is {actual}, but a JSON object was expected")]
    InvalidRoot { actual: &'static str },
}

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// JSON shape name for diagnostics.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build the full object tree for `raw` into `doc` and seal the id index.
pub fn build_root(registry: &Registry, doc: &mut Document, raw: &Value) -> BuildResult<ObjId> {
    let map = raw.as_object().ok_or(BuildError::InvalidRoot {
        actual: json_kind(raw),
    })?;
    let schema = registry.resolve_concrete(ROOT_SCHEMA, map);
    let mut builder = Builder {
        registry,
        doc: &mut *doc,
    };
    let root = builder.build_object(schema, raw, None, Vec::new())?;
    doc.root = root;
    doc.seal();
    Ok(root)
}

struct Builder<'a> {
    registry: &'a Registry,
    doc: &'a mut Document,
}

impl Builder<'_> {
    fn build_object(
        &mut self,
        schema: &Schema,
        raw: &Value,
        parent: Option<ObjId>,
        steps: Vec<Step>,
    ) -> BuildResult<ObjId> {
        let map = match raw.as_object() {
            Some(map) => map,
            None => {
                return Err(BuildError::TypeMismatch {
                    path: dotted(&steps),
                    key: schema.name.to_string(),
                    expected: "an object",
                    actual: json_kind(raw),
                });
            }
        };

        let attr = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        let obj_id = self.doc.objects.len();
        self.doc.objects.push(Object {
            type_name: schema.name,
            id: attr("id"),
            name: attr("name"),
            decl_type: attr("type"),
            raw: raw.clone(),
            fields: Default::default(),
            parent,
            contained: Vec::new(),
            children: Vec::new(),
            inst_def: None,
            depth: steps.len(),
            steps,
        });

        if schema.register_id {
            if let Some(id) = attr("id") {
                self.doc.add_candidate(&id, obj_id);
            }
        }

        for (key, value) in map {
            let field = self.build_field(schema, obj_id, key, value)?;
            self.doc.objects[obj_id].fields.insert(key.clone(), field);
        }

        Ok(obj_id)
    }

    fn build_field(
        &mut self,
        schema: &Schema,
        owner: ObjId,
        key: &str,
        value: &Value,
    ) -> BuildResult<Field> {
        let kind = match schema.prop_kind(key) {
            Some(kind) => kind,
            None => {
                if !schema.open {
                    log::warn!("unknown property \"{}\" for {}", key, schema.name);
                }
                // Retained verbatim, never dropped.
                return Ok(Field::Value(value.clone()));
            }
        };

        let mut base_steps = self.doc.objects[owner].steps.clone();
        base_steps.push(Step::Key(key.to_string()));
        let indexed = |steps: &[Step], i: usize| {
            let mut steps = steps.to_vec();
            steps.push(Step::Index(i));
            steps
        };
        let mismatch = |expected: &'static str, actual: &Value| BuildError::TypeMismatch {
            path: dotted(&base_steps),
            key: key.to_string(),
            expected,
            actual: json_kind(actual),
        };

        match kind {
            PropKind::Value => Ok(Field::Value(value.clone())),

            PropKind::ValueArray => {
                // Either a bare array or an object wrapping one in `values`.
                let payload = match value.as_object().and_then(|m| m.get("values")) {
                    Some(inner) => inner,
                    None => value,
                };
                if !payload.is_array() {
                    return Err(mismatch("an array", payload));
                }
                Ok(Field::Value(value.clone()))
            }

            PropKind::Nested(type_name) => {
                let map = value.as_object().ok_or_else(|| mismatch("an object", value))?;
                let child_schema = self.registry.resolve_concrete(type_name, map);
                let child =
                    self.build_object(child_schema, value, Some(owner), base_steps.clone())?;
                self.doc.objects[owner].contained.push(child);
                Ok(Field::Object(child))
            }

            PropKind::NestedArray(type_name) => {
                let items = value.as_array().ok_or_else(|| mismatch("an array", value))?;
                let mut children = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let map = item.as_object().ok_or_else(|| BuildError::TypeMismatch {
                        path: dotted(&indexed(&base_steps, i)),
                        key: key.to_string(),
                        expected: "an object",
                        actual: json_kind(item),
                    })?;
                    let child_schema = self.registry.resolve_concrete(type_name, map);
                    let child =
                        self.build_object(child_schema, item, Some(owner), indexed(&base_steps, i))?;
                    self.doc.objects[owner].contained.push(child);
                    children.push(child);
                }
                Ok(Field::Array(children))
            }

            PropKind::Ref | PropKind::InstDefRef => {
                let url = value.as_str().ok_or_else(|| mismatch("a URL string", value))?;
                Ok(Field::Ref(RefSlot::new(url)))
            }

            PropKind::RefArray => {
                let items = value.as_array().ok_or_else(|| mismatch("an array", value))?;
                let mut slots = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let url = item.as_str().ok_or_else(|| BuildError::TypeMismatch {
                        path: dotted(&indexed(&base_steps, i)),
                        key: key.to_string(),
                        expected: "a URL string",
                        actual: json_kind(item),
                    })?;
                    slots.push(RefSlot::new(url));
                }
                Ok(Field::RefArray(slots))
            }
        }
    }
}
