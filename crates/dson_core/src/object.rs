//! Arena-backed object tree and per-document id index.
//!
//! Each document owns a flat `Vec` of [`Object`]s; tree edges are stored as
//! indices into that arena. The containment list is the only ownership
//! edge -- `parent` and `inst_def` are plain back-indices, so cycles in
//! prototype chains cannot create ownership cycles. Prototypes may live in
//! other documents, which is why `inst_def` and hierarchy children use the
//! cross-document [`ObjHandle`].

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde_json::Value;

/// Index of an object within its owning document's arena.
pub type ObjId = usize;

/// Index of a document within the owning session.
pub type DocId = usize;

/// Cross-document object address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjHandle {
    pub doc: DocId,
    pub obj: ObjId,
}

/// One step of a tree position: a JSON object key or array index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// Render steps as a dotted path, e.g. `scene.nodes[2].rotation`.
pub fn dotted(steps: &[Step]) -> String {
    let mut out = String::new();
    for step in steps {
        match step {
            Step::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            Step::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    if out.is_empty() {
        out.push_str("(root)");
    }
    out
}

/// A value a reference or URL resolves to.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    /// A whole document (URL with a path and no fragment).
    Document(DocId),

    /// A single object.
    Object(ObjHandle),

    /// An array-of-objects field.
    Objects(Vec<ObjHandle>),

    /// A scalar or raw-JSON leaf.
    Data(Value),
}

/// A reference field: the raw URL, plus the target once bound.
///
/// Targets start unbound and are bound at most once, during the resolve
/// pass. A slot that stays unbound after resolution is the soft-failure
/// case (unrecognized scheme or dynamic selection).
#[derive(Clone, Debug)]
pub struct RefSlot {
    pub url: String,
    pub target: Option<Resolved>,
}

impl RefSlot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            target: None,
        }
    }
}

/// A recognized field of an object, post-schema.
#[derive(Clone, Debug)]
pub enum Field {
    /// Copied-through raw JSON (also used for unknown keys, which are
    /// retained verbatim).
    Value(Value),

    /// A built child object.
    Object(ObjId),

    /// An array of built child objects.
    Array(Vec<ObjId>),

    /// An unresolved or bound reference.
    Ref(RefSlot),

    /// An array of references.
    RefArray(Vec<RefSlot>),
}

/// A typed object in the document tree.
#[derive(Clone, Debug)]
pub struct Object {
    /// Registry schema name this object was built with.
    pub type_name: &'static str,

    /// `id` attribute from the raw JSON, if any.
    pub id: Option<String>,

    /// `name` attribute from the raw JSON, if any.
    pub name: Option<String>,

    /// Declared `type` string from the raw JSON. The effective type of an
    /// instance missing this falls back to its prototype (see
    /// `Session::effective_type`).
    pub decl_type: Option<String>,

    /// Original raw JSON, retained for round-trip output.
    pub raw: Value,

    /// Recognized fields, keyed by JSON key. Sorted iteration keeps the
    /// build and lookup order deterministic.
    pub fields: BTreeMap<String, Field>,

    /// Construction parent within the same document.
    pub parent: Option<ObjId>,

    /// Construction children, in build order (the ownership edge).
    pub contained: Vec<ObjId>,

    /// Hierarchy children collected from bound `parent` references during
    /// the resolve pass (bones under their figure, scene node nesting).
    pub children: Vec<ObjHandle>,

    /// Prototype reference bound from an instance-definition URL.
    pub inst_def: Option<ObjHandle>,

    /// Position in the raw JSON tree; diagnostics and duplicate-id
    /// tie-breaking only.
    pub steps: Vec<Step>,

    /// Tree depth, fixed at construction.
    pub depth: usize,
}

impl Object {
    /// Human-readable summary used in error messages: name, id, type, or a
    /// `[count]` shape for channel-value arrays.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(name.clone());
        }
        if let Some(id) = &self.id {
            parts.push(format!("id:{id}"));
        }
        if let Some(t) = &self.decl_type {
            parts.push(format!("type:{t}"));
        }
        if parts.is_empty() {
            if let Some(map) = self.raw.as_object() {
                if let (Some(count), Some(_)) = (map.get("count"), map.get("values")) {
                    return format!("[{count}]");
                }
            }
        }
        if parts.is_empty() {
            return "unknown".to_string();
        }
        parts.join(" ")
    }

    /// Dotted tree path from the document root.
    pub fn tree_path(&self) -> String {
        dotted(&self.steps)
    }
}

/// One parsed-and-built file: the object arena plus its id index.
///
/// Identity is the canonical, search-path-resolved file path; the owning
/// session guarantees at most one `Document` per canonical path.
#[derive(Debug)]
pub struct Document {
    /// Document index within the owning session.
    pub id: DocId,

    /// Canonical file path (the cache key).
    pub path: PathBuf,

    /// All objects, in construction order. Index 0 is the root.
    pub objects: Vec<Object>,

    /// Arena index of the root object.
    pub root: ObjId,

    /// Every id-carrying candidate recorded during the build, in
    /// construction order. Losers stay in the tree; only `asset_map`
    /// forgets them.
    candidates: HashMap<String, Vec<ObjId>>,

    /// id -> winning object, resolved once construction completes.
    asset_map: HashMap<String, ObjId>,
}

impl Document {
    pub fn new(id: DocId, path: PathBuf) -> Self {
        Self {
            id,
            path,
            objects: Vec::new(),
            root: 0,
            candidates: HashMap::new(),
            asset_map: HashMap::new(),
        }
    }

    pub fn object(&self, id: ObjId) -> &Object {
        &self.objects[id]
    }

    /// Record an id-carrying object during the build pass.
    pub(crate) fn add_candidate(&mut self, id: &str, obj: ObjId) {
        self.candidates.entry(id.to_string()).or_default().push(obj);
    }

    /// Resolve duplicate ids once the build walk is complete: the
    /// shallowest candidate wins, construction order breaks ties.
    pub(crate) fn seal(&mut self) {
        for (id, cands) in &self.candidates {
            // min_by_key returns the first minimum, which is the earliest
            // constructed at that depth.
            let winner = cands
                .iter()
                .copied()
                .min_by_key(|&obj| self.objects[obj].depth);
            let Some(winner) = winner else { continue };
            for &loser in cands.iter().filter(|&&c| c != winner) {
                log::warn!(
                    "duplicate id \"{}\": keeping {}, ignoring {}",
                    id,
                    self.objects[winner].tree_path(),
                    self.objects[loser].tree_path()
                );
            }
            self.asset_map.insert(id.clone(), winner);
        }
    }

    /// Exact id-index lookup.
    pub fn asset(&self, id: &str) -> Option<ObjId> {
        self.asset_map.get(id).copied()
    }

    /// Lookup by id, then by case-folded name over the indexed assets.
    /// The name scan runs in construction order so a collision always
    /// picks the same winner.
    pub fn find(&self, id: &str) -> Option<ObjId> {
        if let Some(obj) = self.asset(id) {
            return Some(obj);
        }
        let folded = id.to_lowercase();
        self.objects.iter().enumerate().find_map(|(obj, o)| {
            let own_id = o.id.as_deref()?;
            if self.asset_map.get(own_id).copied() != Some(obj) {
                return None;
            }
            match &o.name {
                Some(name) if name.to_lowercase() == folded => Some(obj),
                _ => None,
            }
        })
    }

    /// Like [`Document::find`], but a miss is an error.
    pub fn get(&self, id: &str) -> Result<ObjId, crate::lookup::LookupError> {
        self.find(id)
            .ok_or_else(|| crate::lookup::LookupError::AssetNotFound {
                id: id.to_string(),
                doc: self.path.display().to_string(),
            })
    }

    /// Ids present in the resolved index.
    pub fn asset_ids(&self) -> impl Iterator<Item = &str> {
        self.asset_map.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stub(depth: usize, steps: Vec<Step>) -> Object {
        Object {
            type_name: "Object",
            id: Some("dup".to_string()),
            name: None,
            decl_type: None,
            raw: json!({}),
            fields: BTreeMap::new(),
            parent: None,
            contained: Vec::new(),
            children: Vec::new(),
            inst_def: None,
            steps,
            depth,
        }
    }

    #[test]
    fn test_duplicate_ids_shallowest_wins() {
        let mut doc = Document::new(0, PathBuf::from("/t.duf"));
        for (depth, key) in [(3, "a"), (1, "b"), (2, "c")] {
            let obj = doc.objects.len();
            doc.objects.push(stub(depth, vec![Step::Key(key.into())]));
            doc.add_candidate("dup", obj);
        }
        doc.seal();
        // Depths were [3, 1, 2]; the depth-1 object wins.
        assert_eq!(doc.asset("dup"), Some(1));
        // The losers are still in the tree.
        assert_eq!(doc.objects.len(), 3);
    }

    #[test]
    fn test_duplicate_ids_construction_order_breaks_ties() {
        let mut doc = Document::new(0, PathBuf::from("/t.duf"));
        for key in ["first", "second"] {
            let obj = doc.objects.len();
            doc.objects.push(stub(2, vec![Step::Key(key.into())]));
            doc.add_candidate("dup", obj);
        }
        doc.seal();
        assert_eq!(doc.asset("dup"), Some(0));
    }

    #[test]
    fn test_name_collision_picks_first_constructed() {
        // Four indexed assets whose names all case-fold to "same". The
        // scan must not depend on hash-map iteration order.
        let mut doc = Document::new(0, PathBuf::from("/t.duf"));
        for (i, (id, name)) in [("a1", "Same"), ("b1", "SAME"), ("c1", "sAmE"), ("d1", "samE")]
            .into_iter()
            .enumerate()
        {
            let mut obj = stub(1, vec![Step::Key("node_library".into()), Step::Index(i)]);
            obj.id = Some(id.to_string());
            obj.name = Some(name.to_string());
            doc.objects.push(obj);
            doc.add_candidate(id, i);
        }
        doc.seal();

        assert_eq!(doc.find("same"), Some(0));
        // Exact ids still win outright.
        assert_eq!(doc.find("c1"), Some(2));
    }

    #[test]
    fn test_find_falls_back_to_name() {
        let mut doc = Document::new(0, PathBuf::from("/t.duf"));
        let mut obj = stub(1, vec![Step::Key("node_library".into())]);
        obj.id = Some("hip-1".to_string());
        obj.name = Some("Hip".to_string());
        doc.objects.push(obj);
        doc.add_candidate("hip-1", 0);
        doc.seal();

        assert_eq!(doc.find("hip-1"), Some(0));
        assert_eq!(doc.find("hip"), Some(0));
        assert_eq!(doc.asset("hip"), None);
        assert!(doc.get("pelvis").is_err());
    }

    #[test]
    fn test_dotted_path() {
        let steps = vec![
            Step::Key("scene".into()),
            Step::Key("nodes".into()),
            Step::Index(2),
            Step::Key("rotation".into()),
        ];
        assert_eq!(dotted(&steps), "scene.nodes[2].rotation");
        assert_eq!(dotted(&[]), "(root)");
    }
}
