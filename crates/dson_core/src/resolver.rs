//! Reference binding.
//!
//! Runs once per document, immediately after the build pass. Walks the
//! built tree and binds every reference slot:
//!
//! 1. URLs with a file path go through the session cache, which may
//!    construct and resolve another document before this pass continues.
//! 2. Conventionally-local relations (`parent`, `node`) prefer a sibling
//!    match, then an ancestor match, before the document-wide index --
//!    bone hierarchies reference by short id and the nearest match is the
//!    intended one.
//! 3. Everything else is a document-wide id/name lookup.
//!
//! Binding an instance-definition reference additionally installs the
//! target as the owner's prototype. An unrecognized scheme is the one
//! soft failure: warn and leave the slot unbound. Every other miss aborts
//! the load.

use crate::cache::{LoadError, Session};
use crate::object::{Field, ObjHandle, ObjId, Resolved};
use crate::registry::PropKind;
use crate::url::Url;

/// Field keys whose targets are conventionally near the referencing
/// object rather than document-global.
const LOCAL_RELATIONS: &[&str] = &["parent", "node"];

/// One unbound slot collected from the built tree.
struct PendingRef {
    obj: ObjId,
    key: String,
    index: Option<usize>,
    url: String,
    kind: PropKind,
}

impl Session {
    /// Bind every reference in `doc`. Re-entrant: resolving may trigger a
    /// full build-and-resolve of another document.
    pub(crate) fn resolve_document(&mut self, doc: usize) -> Result<(), LoadError> {
        let pending = self.collect_pending(doc);
        for p in pending {
            let owner = ObjHandle { doc, obj: p.obj };
            let target = self.resolve_ref(owner, &p.key, &p.url)?;

            if let Some(resolved) = &target {
                if p.kind == PropKind::InstDefRef {
                    match resolved {
                        Resolved::Object(proto) => {
                            self.docs[doc].objects[p.obj].inst_def = Some(*proto);
                        }
                        other => log::warn!(
                            "instance definition \"{}\" resolved to {:?}, not an object",
                            p.url,
                            other
                        ),
                    }
                }
                if p.key == "parent" {
                    if let Resolved::Object(parent) = resolved {
                        let links = self
                            .registry
                            .schema(self.docs[doc].objects[p.obj].type_name)
                            .is_some_and(|s| s.links_parent);
                        if links {
                            self.docs[parent.doc].objects[parent.obj].children.push(owner);
                        }
                    }
                }
            }

            let slot = match self.docs[doc].objects[p.obj].fields.get_mut(&p.key) {
                Some(Field::Ref(slot)) => slot,
                Some(Field::RefArray(slots)) => &mut slots[p.index.unwrap_or(0)],
                _ => continue,
            };
            slot.target = target;
        }
        Ok(())
    }

    fn collect_pending(&self, doc: usize) -> Vec<PendingRef> {
        let mut pending = Vec::new();
        for (obj, object) in self.docs[doc].objects.iter().enumerate() {
            let schema = self.registry.schema(object.type_name);
            for (key, field) in &object.fields {
                let kind = schema
                    .and_then(|s| s.prop_kind(key))
                    .unwrap_or(PropKind::Value);
                match field {
                    Field::Ref(slot) if slot.target.is_none() => pending.push(PendingRef {
                        obj,
                        key: key.clone(),
                        index: None,
                        url: slot.url.clone(),
                        kind,
                    }),
                    Field::RefArray(slots) => {
                        for (i, slot) in slots.iter().enumerate() {
                            if slot.target.is_none() {
                                pending.push(PendingRef {
                                    obj,
                                    key: key.clone(),
                                    index: Some(i),
                                    url: slot.url.clone(),
                                    kind,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        pending
    }

    /// Resolve one reference URL against its owner. `Ok(None)` is the
    /// soft-failure path: the slot stays unbound and loading continues.
    fn resolve_ref(
        &mut self,
        owner: ObjHandle,
        key: &str,
        raw_url: &str,
    ) -> Result<Option<Resolved>, LoadError> {
        let url = Url::parse(raw_url)?;

        // The `name` pseudo-scheme addresses whatever is selected in the
        // consuming application; there is nothing static to bind.
        if url.scheme.as_deref() == Some("name") {
            return Ok(None);
        }

        // `file` and schemeless are the loadable forms.
        if let Some(scheme) = &url.scheme {
            if !scheme.eq_ignore_ascii_case("file") {
                log::warn!(
                    "unknown scheme \"{}\" in reference \"{}\" on {}; leaving unbound",
                    scheme,
                    raw_url,
                    self.docs[owner.doc].objects[owner.obj].tree_path()
                );
                return Ok(None);
            }
        }

        if url.path.is_some() {
            return self.load_parsed(&url).map(Some);
        }

        let Some(fragment) = url.fragment.clone() else {
            log::warn!(
                "reference \"{}\" on {} has no fragment; leaving unbound",
                raw_url,
                self.docs[owner.doc].objects[owner.obj].tree_path()
            );
            return Ok(None);
        };

        let target = if LOCAL_RELATIONS.contains(&key) {
            self.local_relation(owner, &fragment)
        } else {
            None
        };
        let target = match target {
            Some(obj) => obj,
            None => self.docs[owner.doc]
                .get(&fragment)
                .map_err(|e| LoadError::lookup_in_url(raw_url, e))?,
        };

        let handle = ObjHandle {
            doc: owner.doc,
            obj: target,
        };
        match &url.prop_path {
            Some(steps) => {
                let steps: Vec<&str> = steps.iter().map(String::as_str).collect();
                let found = self
                    .path_get(handle, &steps, true)
                    .map_err(|e| LoadError::lookup_in_url(raw_url, e))?;
                Ok(Some(found_to_resolved(found)))
            }
            None => Ok(Some(Resolved::Object(handle))),
        }
    }

    /// Sibling match by id/name, then ancestor-chain match, for local
    /// relation kinds. Falls back to `None` so the caller tries the
    /// document index.
    fn local_relation(&self, owner: ObjHandle, fragment: &str) -> Option<ObjId> {
        let doc = &self.docs[owner.doc];
        let parent = doc.objects[owner.obj].parent;

        let matches = |obj: ObjId| {
            let o = &doc.objects[obj];
            o.id.as_deref() == Some(fragment) || o.name.as_deref() == Some(fragment)
        };

        if let Some(parent) = parent {
            if let Some(sibling) = doc.objects[parent]
                .contained
                .iter()
                .copied()
                .find(|&s| s != owner.obj && matches(s))
            {
                return Some(sibling);
            }
        }

        let mut ancestor = parent;
        while let Some(a) = ancestor {
            if matches(a) {
                return Some(a);
            }
            ancestor = doc.objects[a].parent;
        }
        None
    }
}

pub(crate) fn found_to_resolved(found: crate::lookup::Found) -> Resolved {
    match found {
        crate::lookup::Found::Object(h) => Resolved::Object(h),
        crate::lookup::Found::Objects(hs) => Resolved::Objects(hs),
        crate::lookup::Found::Data(v) => Resolved::Data(v),
    }
}
