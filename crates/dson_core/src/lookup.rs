//! Lookup and path-query engine.
//!
//! `find` probes a single object for a target: id equality, name equality,
//! type equality, then literal-key lookup, in that order. It only descends
//! into structural children on request -- unbounded descent is how spurious
//! cross-branch matches happen.
//!
//! `path_find` walks a step sequence. At every step the candidate set is
//! the current objects plus their prototypes (`inst_def`), so a property
//! missing on a scene instance is still found on the library asset it
//! instantiates. This is the whole instance-definition fallback mechanism:
//! not inheritance, a per-step probe.

use serde_json::Value;
use thiserror::Error;

use crate::cache::Session;
use crate::object::{Field, ObjHandle, Resolved};

/// Errors raised by the `get` variants; the `find` variants return
/// `Option` instead.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("{doc}: can't find asset \"{id}\"")]
    AssetNotFound { id: String, doc: String },

    #[error("can't find \"{target}\" in {summary}")]
    NotFound { target: String, summary: String },

    #[error("{path}: can't find property in {summary}")]
    PathNotFound { path: String, summary: String },
}

/// A successful lookup result.
#[derive(Clone, Debug, PartialEq)]
pub enum Found {
    Object(ObjHandle),
    Objects(Vec<ObjHandle>),
    Data(Value),
}

impl Found {
    pub fn as_object(&self) -> Option<ObjHandle> {
        match self {
            Found::Object(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Found::Data(v) => Some(v),
            _ => None,
        }
    }
}

impl Session {
    /// Declared type of an object, falling back to its prototype chain.
    pub fn effective_type(&self, handle: ObjHandle) -> Option<&str> {
        let obj = self.object(handle);
        if let Some(t) = &obj.decl_type {
            return Some(t);
        }
        obj.inst_def.and_then(|proto| self.effective_type(proto))
    }

    /// Probe one object for `target`: id, name, type, then literal key.
    /// Descends into structural children only when `recursive`.
    pub fn find(&self, root: ObjHandle, target: &str, recursive: bool) -> Option<Found> {
        self.find_in(&Found::Object(root), target, recursive)
    }

    /// Like [`Session::find`], but a miss is an error carrying the dotted
    /// tree path and a summary of the probed object.
    pub fn get(&self, root: ObjHandle, target: &str, recursive: bool) -> Result<Found, LookupError> {
        self.find(root, target, recursive)
            .ok_or_else(|| LookupError::NotFound {
                target: target.to_string(),
                summary: self.describe(root),
            })
    }

    /// Walk `steps` from `root`, probing prototypes at every step when
    /// `use_inst_def` is set. Returns the first survivor of the final
    /// candidate set; an empty set at any step short-circuits to `None`.
    pub fn path_find(&self, root: ObjHandle, steps: &[&str], use_inst_def: bool) -> Option<Found> {
        let mut cands = vec![Found::Object(root)];
        if use_inst_def {
            if let Some(proto) = self.object(root).inst_def {
                cands.push(Found::Object(proto));
            }
        }
        for step in steps {
            let mut next = Vec::new();
            for cand in &cands {
                if let Some(hit) = self.find_in(cand, step, false) {
                    if use_inst_def {
                        if let Found::Object(h) = &hit {
                            if let Some(proto) = self.object(*h).inst_def {
                                next.push(hit.clone());
                                next.push(Found::Object(proto));
                                continue;
                            }
                        }
                    }
                    next.push(hit);
                }
            }
            if next.is_empty() {
                return None;
            }
            cands = next;
        }
        cands.into_iter().next()
    }

    /// Like [`Session::path_find`], but an empty final set is an error.
    pub fn path_get(
        &self,
        root: ObjHandle,
        steps: &[&str],
        use_inst_def: bool,
    ) -> Result<Found, LookupError> {
        self.path_find(root, steps, use_inst_def)
            .ok_or_else(|| LookupError::PathNotFound {
                path: steps.join("/"),
                summary: self.describe(root),
            })
    }

    fn describe(&self, handle: ObjHandle) -> String {
        let obj = self.object(handle);
        format!("{} ({})", obj.tree_path(), obj.summary())
    }

    fn find_in(&self, root: &Found, target: &str, recursive: bool) -> Option<Found> {
        match root {
            Found::Object(handle) => self.find_on_object(*handle, target, recursive),
            Found::Objects(handles) => handles
                .iter()
                .find_map(|&h| self.find_on_object(h, target, recursive)),
            Found::Data(value) => find_in_json(value, target, recursive),
        }
    }

    fn find_on_object(&self, handle: ObjHandle, target: &str, recursive: bool) -> Option<Found> {
        let obj = self.object(handle);
        if obj.id.as_deref() == Some(target) || obj.name.as_deref() == Some(target) {
            return Some(Found::Object(handle));
        }
        if self.effective_type(handle) == Some(target) {
            return Some(Found::Object(handle));
        }
        if let Some(field) = obj.fields.get(target) {
            if let Some(found) = self.field_to_found(handle.doc, field) {
                return Some(found);
            }
            // An unbound reference is not a usable value; fall through to
            // recursive descent (if requested) rather than claiming a hit.
        }
        if recursive {
            for &child in &obj.contained {
                let child = ObjHandle {
                    doc: handle.doc,
                    obj: child,
                };
                if let Some(found) = self.find_on_object(child, target, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Convert a field into a lookup result; bound references advance to
    /// their target, unbound ones are a miss.
    fn field_to_found(&self, doc: usize, field: &Field) -> Option<Found> {
        match field {
            Field::Value(v) => Some(Found::Data(v.clone())),
            Field::Object(obj) => Some(Found::Object(ObjHandle { doc, obj: *obj })),
            Field::Array(objs) => Some(Found::Objects(
                objs.iter().map(|&obj| ObjHandle { doc, obj }).collect(),
            )),
            Field::Ref(slot) => self.resolved_to_found(slot.target.as_ref()?),
            Field::RefArray(slots) => {
                // A reference array step advances through every bound slot.
                let handles: Vec<ObjHandle> = slots
                    .iter()
                    .filter_map(|s| s.target.as_ref())
                    .filter_map(|r| match r {
                        Resolved::Object(h) => Some(*h),
                        _ => None,
                    })
                    .collect();
                if handles.is_empty() {
                    None
                } else {
                    Some(Found::Objects(handles))
                }
            }
        }
    }

    fn resolved_to_found(&self, resolved: &Resolved) -> Option<Found> {
        match resolved {
            Resolved::Document(doc) => {
                let doc = self.document(*doc);
                Some(Found::Object(ObjHandle {
                    doc: doc.id,
                    obj: doc.root,
                }))
            }
            Resolved::Object(h) => Some(Found::Object(*h)),
            Resolved::Objects(hs) => Some(Found::Objects(hs.clone())),
            Resolved::Data(v) => Some(Found::Data(v.clone())),
        }
    }
}

/// Probe a raw-JSON leaf the same way objects are probed: id/name/type
/// equality for maps, element-wise matching for arrays.
fn find_in_json(value: &Value, target: &str, recursive: bool) -> Option<Found> {
    match value {
        Value::Object(map) => {
            for attr in ["id", "name", "type"] {
                if map.get(attr).and_then(Value::as_str) == Some(target) {
                    return Some(Found::Data(value.clone()));
                }
            }
            if let Some(child) = map.get(target) {
                return Some(Found::Data(child.clone()));
            }
            if recursive {
                map.values()
                    .find_map(|child| find_in_json(child, target, true))
            } else {
                None
            }
        }
        // Arrays are matched element-wise; that is how a channel is picked
        // out of a raw channel list by its id.
        Value::Array(items) => items
            .iter()
            .find_map(|child| find_in_json(child, target, recursive)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_in_json_matches_id_then_key() {
        let raw = json!([
            {"id": "x", "value": 1.0},
            {"id": "y", "value": 2.0}
        ]);
        let hit = find_in_json(&raw, "y", false).unwrap();
        assert_eq!(hit.as_data().unwrap()["value"], json!(2.0));

        let hit = find_in_json(hit.as_data().unwrap(), "value", false).unwrap();
        assert_eq!(hit.as_data(), Some(&json!(2.0)));
    }

    #[test]
    fn test_find_in_json_descends_only_when_recursive() {
        let raw = json!({"outer": {"inner": 5}});
        assert!(find_in_json(&raw, "inner", false).is_none());
        let hit = find_in_json(&raw, "inner", true).unwrap();
        assert_eq!(hit.as_data(), Some(&json!(5)));
    }
}
