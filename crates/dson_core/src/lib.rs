//! DSON Core - typed loading and cross-referencing of DSON scene files.
//!
//! DSON is the JSON scene and asset format used by `.duf` (user files)
//! and `.dsf` (asset files). This crate provides:
//!
//! - **URL parsing**: the compact `[scheme:][/path][#fragment[?prop/path]]`
//!   addressing grammar (`url`)
//! - **Type catalog**: a layered schema registry describing every DSON
//!   object kind (`registry`, `types`)
//! - **Document loading**: search-path file location, gzip sniffing, and
//!   a per-session parse cache (`cache`)
//! - **Graph building and resolution**: raw JSON to typed object trees
//!   with every cross-reference bound (`builder`, `resolver`)
//! - **Lookup**: id/name/type/key probing and property paths with
//!   prototype fallback (`lookup`)
//!
//! # Example
//!
//! ```ignore
//! use dson_core::Session;
//!
//! let mut session = Session::new(vec!["/daz/content".into()]);
//! let figure = session.load_url("/People/Genesis8Female.duf#Genesis8Female")?;
//! ```

pub mod builder;
pub mod cache;
pub mod lookup;
pub mod object;
pub mod registry;
pub mod resolver;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use builder::{BuildError, BuildResult};
pub use cache::{LoadError, LoadResult, Session};
pub use lookup::{Found, LookupError};
pub use object::{DocId, Document, Field, ObjHandle, ObjId, Object, RefSlot, Resolved, Step};
pub use registry::{PropKind, Registry, Schema, SchemaBuilder};
pub use types::{standard, ROOT_SCHEMA};
pub use url::{Url, UrlError, UrlResult};
