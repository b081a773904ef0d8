//! Session and document cache.
//!
//! A [`Session`] owns every loaded [`Document`] plus the search path used
//! to turn URL file paths into real files. Documents are keyed by their
//! canonical located path, so two URLs spelling the same file differently
//! still share one parsed instance.
//!
//! Loading is re-entrant: resolving the references of one document can
//! pull in further documents. A document is only published to the cache
//! after it has been fully built and resolved; an in-progress set guards
//! against reference cycles between files.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::builder::{self, BuildError};
use crate::lookup::LookupError;
use crate::object::{DocId, Document, ObjHandle, Object, Resolved};
use crate::registry::Registry;
use crate::resolver::found_to_resolved;
use crate::types;
use crate::url::{Url, UrlError};

/// Leading bytes of a gzip member with deflate compression.
const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// File extensions the cache will parse.
const EXTENSIONS: [&str; 2] = ["duf", "dsf"];

/// Errors that can occur while loading and resolving documents.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] UrlError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to resolve \"{url}\": {source}")]
    Reference {
        url: String,
        source: LookupError,
    },

    #[error("file \"{0}\" not found on the search path")]
    FileNotFound(String),

    #[error("unsupported file extension: \"{path}\"")]
    UnsupportedExtension { path: String },

    #[error("cyclic reference back into \"{path}\" while it is still loading")]
    CyclicReference { path: String },

    #[error("URL \"{url}\" names no file to load")]
    NoPath { url: String },
}

impl LoadError {
    pub(crate) fn lookup_in_url(url: &str, source: LookupError) -> Self {
        LoadError::Reference {
            url: url.to_string(),
            source,
        }
    }
}

/// Result type for document loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// A loading session: the type registry, the search path, and every
/// document loaded so far.
pub struct Session {
    pub(crate) registry: Registry,
    search_path: Vec<PathBuf>,
    pub(crate) docs: Vec<Document>,
    by_path: HashMap<PathBuf, DocId>,
    loading: HashSet<PathBuf>,
}

impl Session {
    /// Create a session with the standard type catalog. Search path
    /// directories are probed in order.
    pub fn new(search_path: Vec<PathBuf>) -> Session {
        Session::with_registry(search_path, types::standard())
    }

    /// Create a session with a custom registry.
    pub fn with_registry(search_path: Vec<PathBuf>, registry: Registry) -> Session {
        Session {
            registry,
            search_path,
            docs: Vec::new(),
            by_path: HashMap::new(),
            loading: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn document(&self, id: DocId) -> &Document {
        &self.docs[id]
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    pub fn object(&self, handle: ObjHandle) -> &Object {
        &self.docs[handle.doc].objects[handle.obj]
    }

    /// Load whatever `url` addresses: a whole document, an asset within
    /// one, or a property value under an asset.
    pub fn load_url(&mut self, url: &str) -> LoadResult<Resolved> {
        let parsed = Url::parse(url)?;
        if parsed.path.is_none() {
            return Err(LoadError::NoPath {
                url: url.to_string(),
            });
        }
        self.load_parsed(&parsed)
    }

    /// Load the target of an already-parsed URL with a file path.
    pub(crate) fn load_parsed(&mut self, url: &Url) -> LoadResult<Resolved> {
        let path = url.path.as_deref().ok_or_else(|| LoadError::NoPath {
            url: format!("{:?}", url),
        })?;
        let located = self.locate_file(path)?;

        let doc = match self.by_path.get(&located) {
            Some(&doc) => doc,
            None => self.load_document(&located)?,
        };

        let raw_url = || format!("{}#{}", path, url.fragment.as_deref().unwrap_or(""));

        let root = match &url.fragment {
            Some(fragment) => {
                let obj = self.docs[doc]
                    .get(fragment)
                    .map_err(|e| LoadError::lookup_in_url(&raw_url(), e))?;
                Some(ObjHandle { doc, obj })
            }
            None => None,
        };

        match &url.prop_path {
            Some(steps) => {
                let from = root.unwrap_or(ObjHandle {
                    doc,
                    obj: self.docs[doc].root,
                });
                let steps: Vec<&str> = steps.iter().map(String::as_str).collect();
                let found = self
                    .path_get(from, &steps, true)
                    .map_err(|e| LoadError::lookup_in_url(&raw_url(), e))?;
                Ok(found_to_resolved(found))
            }
            None => match root {
                Some(handle) => Ok(Resolved::Object(handle)),
                None => Ok(Resolved::Document(doc)),
            },
        }
    }

    /// Parse, build, and resolve one file, then publish it to the cache.
    fn load_document(&mut self, located: &Path) -> LoadResult<DocId> {
        if self.loading.contains(located) {
            return Err(LoadError::CyclicReference {
                path: located.display().to_string(),
            });
        }

        let ext = located.extension().and_then(|e| e.to_str());
        if !ext.is_some_and(|e| EXTENSIONS.contains(&e)) {
            return Err(LoadError::UnsupportedExtension {
                path: located.display().to_string(),
            });
        }

        log::info!("loading {}", located.display());
        let raw = read_document(located)?;

        let mark = self.docs.len();
        self.loading.insert(located.to_path_buf());
        let result = self.build_and_resolve(located, &raw);
        self.loading.remove(located);

        let doc = match result {
            Ok(doc) => doc,
            Err(err) => {
                // Discard this document and everything loaded while
                // resolving it; bindings into those documents can only
                // exist within the failed subtree.
                self.docs.truncate(mark);
                self.by_path.retain(|_, doc| *doc < mark);
                return Err(err);
            }
        };
        self.by_path.insert(located.to_path_buf(), doc);
        Ok(doc)
    }

    fn build_and_resolve(&mut self, located: &Path, raw: &serde_json::Value) -> LoadResult<DocId> {
        let doc_id = self.docs.len();
        let mut doc = Document::new(doc_id, located.to_path_buf());
        builder::build_root(&self.registry, &mut doc, raw)?;
        self.docs.push(doc);
        self.resolve_document(doc_id)?;
        log::debug!(
            "built {} ({} objects)",
            located.display(),
            self.docs[doc_id].objects.len()
        );
        Ok(doc_id)
    }

    /// Turn a URL file path into a canonical on-disk path: try it as
    /// given, then joined (with leading separators stripped) onto each
    /// search-path directory in order.
    fn locate_file(&self, path: &str) -> LoadResult<PathBuf> {
        let direct = Path::new(path);
        if direct.is_file() {
            return Ok(direct.canonicalize()?);
        }
        let relative = path.trim_start_matches(['/', '\\']);
        for dir in &self.search_path {
            let candidate = dir.join(relative);
            if candidate.is_file() {
                return Ok(candidate.canonicalize()?);
            }
        }
        Err(LoadError::FileNotFound(path.to_string()))
    }
}

/// Read and parse one file, transparently inflating gzip.
fn read_document(path: &Path) -> LoadResult<serde_json::Value> {
    let mut file = File::open(path)?;
    let mut head = [0u8; 3];
    let n = file.read(&mut head)?;

    let mut bytes = head[..n].to_vec();
    file.read_to_end(&mut bytes)?;

    if bytes.starts_with(&GZIP_MAGIC) {
        let value = serde_json::from_reader(GzDecoder::new(bytes.as_slice()))?;
        Ok(value)
    } else {
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::Found;
    use serde_json::json;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, value: &serde_json::Value) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(value.to_string().as_bytes()).unwrap();
    }

    fn scene_with_figure() -> serde_json::Value {
        json!({
            "node_library": [
                {
                    "id": "figure1",
                    "name": "Genesis",
                    "type": "figure",
                    "translation": [
                        {"id": "x", "type": "float", "value": 5.0},
                        {"id": "y", "type": "float", "value": 0.0}
                    ]
                },
                {
                    "id": "hip",
                    "name": "Hip",
                    "type": "bone",
                    "parent": "#figure1"
                }
            ]
        })
    }

    #[test]
    fn test_load_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.duf", &scene_with_figure());

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let first = session.load_url("/a.duf").unwrap();
        let second = session.load_url("/a.duf").unwrap();
        assert_eq!(first, second);
        assert_eq!(session.document_count(), 1);
    }

    #[test]
    fn test_fragment_and_prop_path() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.duf", &scene_with_figure());

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let hit = session.load_url("/a.duf#figure1?translation/x/value").unwrap();
        assert_eq!(hit, Resolved::Data(json!(5.0)));
    }

    #[test]
    fn test_parent_ref_binds_locally() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.duf", &scene_with_figure());

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let doc = match session.load_url("/a.duf").unwrap() {
            Resolved::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other),
        };

        let hip = session.document(doc).get("hip").unwrap();
        let figure = session.document(doc).get("figure1").unwrap();
        let parent = match session.document(doc).object(hip).fields.get("parent") {
            Some(crate::object::Field::Ref(slot)) => slot.target.clone(),
            other => panic!("expected a reference field, got {:?}", other),
        };
        assert_eq!(
            parent,
            Some(Resolved::Object(ObjHandle { doc, obj: figure }))
        );
        // The figure gained the bone as a hierarchy child.
        assert_eq!(
            session.document(doc).object(figure).children,
            vec![ObjHandle { doc, obj: hip }]
        );
    }

    #[test]
    fn test_cross_file_reference_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "figure.dsf", &scene_with_figure());
        write_file(
            dir.path(),
            "scene.duf",
            &json!({
                "scene": {
                    "nodes": [
                        {"id": "inst1", "url": "/figure.dsf#figure1"},
                        {"id": "inst2", "url": "/figure.dsf#figure1"}
                    ]
                }
            }),
        );

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let doc = match session.load_url("/scene.duf").unwrap() {
            Resolved::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other),
        };
        // scene.duf plus figure.dsf, loaded exactly once.
        assert_eq!(session.document_count(), 2);

        let inst = session.document(doc).get("inst1").unwrap();
        let proto = session.document(doc).object(inst).inst_def.unwrap();
        assert_eq!(
            session.object(proto).id.as_deref(),
            Some("figure1")
        );
        // The prototype supplies properties the instance lacks.
        let handle = ObjHandle { doc, obj: inst };
        let x = session
            .path_get(handle, &["translation", "x", "value"], true)
            .unwrap();
        assert_eq!(x, Found::Data(json!(5.0)));
        assert!(session
            .path_find(handle, &["translation", "x", "value"], false)
            .is_none());
    }

    #[test]
    fn test_file_scheme_reference() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "figure.dsf", &scene_with_figure());
        write_file(
            dir.path(),
            "scene.duf",
            &json!({"scene": {"nodes": [{"id": "i", "url": "file:figure.dsf#figure1"}]}}),
        );

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let doc = match session.load_url("/scene.duf").unwrap() {
            Resolved::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other),
        };
        let inst = session.document(doc).get("i").unwrap();
        let proto = session.document(doc).object(inst).inst_def.unwrap();
        assert_eq!(session.object(proto).id.as_deref(), Some("figure1"));
    }

    #[test]
    fn test_unknown_scheme_is_a_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "a.duf",
            &json!({"scene": {"nodes": [{"id": "i", "url": "weird:figure.dsf#x"}]}}),
        );

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let doc = match session.load_url("/a.duf").unwrap() {
            Resolved::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other),
        };
        let inst = session.document(doc).get("i").unwrap();
        assert!(session.document(doc).object(inst).inst_def.is_none());
    }

    #[test]
    fn test_search_path_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_file(
            first.path(),
            "a.duf",
            &json!({"node_library": [{"id": "from_first", "type": "node"}]}),
        );
        write_file(
            second.path(),
            "a.duf",
            &json!({"node_library": [{"id": "from_second", "type": "node"}]}),
        );

        let mut session = Session::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        session.load_url("/a.duf").unwrap();
        assert!(session.document(0).asset("from_first").is_some());
    }

    #[test]
    fn test_gzip_sniffing() {
        let dir = tempfile::tempdir().unwrap();
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(scene_with_figure().to_string().as_bytes())
            .unwrap();
        std::fs::write(dir.path().join("a.duf"), enc.finish().unwrap()).unwrap();

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let hit = session.load_url("/a.duf#figure1?translation/x/value").unwrap();
        assert_eq!(hit, Resolved::Data(json!(5.0)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.json", &json!({}));

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let err = session.load_url("/a.json").unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedExtension { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let err = session.load_url("/nope.duf").unwrap_err();
        assert!(matches!(err, LoadError::FileNotFound(_)));
    }

    #[test]
    fn test_url_without_path() {
        let mut session = Session::new(Vec::new());
        let err = session.load_url("#hip").unwrap_err();
        assert!(matches!(err, LoadError::NoPath { .. }));
    }

    #[test]
    fn test_cyclic_files_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "a.dsf",
            &json!({"scene": {"nodes": [{"id": "a1", "url": "/b.dsf#b1"}]}}),
        );
        write_file(
            dir.path(),
            "b.dsf",
            &json!({"scene": {"nodes": [{"id": "b1", "url": "/a.dsf#a1"}]}}),
        );

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let err = session.load_url("/a.dsf").unwrap_err();
        assert!(matches!(err, LoadError::CyclicReference { .. }));
    }

    #[test]
    fn test_name_scheme_stays_unbound() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "a.duf",
            &json!({"scene": {"nodes": [
                {"id": "n1", "url": "name://@selection#Genesis8Female"}
            ]}}),
        );

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let doc = match session.load_url("/a.duf").unwrap() {
            Resolved::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other),
        };
        let n1 = session.document(doc).get("n1").unwrap();
        assert!(session.document(doc).object(n1).inst_def.is_none());
    }

    #[test]
    fn test_path_get_miss_names_path_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.duf", &scene_with_figure());

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let doc = match session.load_url("/a.duf").unwrap() {
            Resolved::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other),
        };
        let figure = session.document(doc).get("figure1").unwrap();
        let handle = ObjHandle { doc, obj: figure };

        let err = session
            .path_get(handle, &["translation", "z", "value"], true)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("translation/z/value"), "{msg}");
        assert!(msg.contains("node_library[0]"), "{msg}");
        assert!(msg.contains("Genesis id:figure1 type:figure"), "{msg}");
        assert!(session
            .path_find(handle, &["translation", "z", "value"], true)
            .is_none());

        let err = session.get(handle, "no_such_channel", true).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no_such_channel"), "{msg}");
        assert!(msg.contains("node_library[0]"), "{msg}");
    }

    #[test]
    fn test_failed_load_leaves_no_documents_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "figure.dsf", &scene_with_figure());
        write_file(
            dir.path(),
            "scene.duf",
            &json!({
                "scene": {
                    "nodes": [
                        {"id": "i1", "url": "/figure.dsf#figure1"},
                        {"id": "i2", "parent": "#missing"}
                    ]
                }
            }),
        );

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        // The cross-file prototype loads fine, then the dangling parent
        // reference aborts the load.
        let err = session.load_url("/scene.duf").unwrap_err();
        assert!(matches!(err, LoadError::Reference { .. }));
        assert_eq!(session.document_count(), 0);

        // The cache is clean: a fresh load starts from the first slot.
        let resolved = session.load_url("/figure.dsf").unwrap();
        assert_eq!(resolved, Resolved::Document(0));
    }

    #[test]
    fn test_dangling_local_reference_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "a.duf",
            &json!({"node_library": [
                {"id": "lonely", "type": "bone", "parent": "#missing"}
            ]}),
        );

        let mut session = Session::new(vec![dir.path().to_path_buf()]);
        let err = session.load_url("/a.duf").unwrap_err();
        assert!(matches!(err, LoadError::Reference { .. }));
    }
}
