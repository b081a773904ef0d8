//! DSON URL addressing grammar.
//!
//! Cross-references between assets use a compact URL form:
//!
//! `[scheme:][/file/path][#fragment[?prop/path/segments]]`
//!
//! - `path` names a document file, located through the session search path.
//! - `fragment` names an asset id within the target document.
//! - the segments after `?` form a property path inside that asset,
//!   evaluated step by step with prototype fallback.
//!
//! The reserved pseudo-scheme `name` addresses a dynamically selected
//! object (`name://@selection`) rather than a static id. Authoring tools
//! emit a stray trailing `:` on those URLs when the selection carries no
//! fragment; parsing strips it.

use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Errors that can occur while parsing a DSON URL.
#[derive(Error, Debug)]
pub enum UrlError {
    #[error("malformed percent escape in \"{0}\"")]
    MalformedEscape(String),

    #[error("percent-decoded component of \"{0}\" is not valid UTF-8")]
    InvalidUtf8(String),
}

/// Result type for URL parsing.
pub type UrlResult<T> = Result<T, UrlError>;

/// A parsed DSON URL.
///
/// All components are optional; the empty URL is valid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Url {
    /// Case-preserved scheme (`name` is the reserved pseudo-scheme).
    pub scheme: Option<String>,

    /// Percent-decoded file path, or the selection target for `name://` URLs.
    pub path: Option<String>,

    /// Percent-decoded asset id within the target document.
    pub fragment: Option<String>,

    /// Property steps following the fragment (from `#frag?a/b/c`), or the
    /// standalone query when the fragment carries no `?`.
    pub prop_path: Option<Vec<String>>,
}

impl Url {
    /// Parse a raw address string.
    pub fn parse(input: &str) -> UrlResult<Url> {
        let mut url = Url::default();

        // Fragment comes after the first '#'; everything in it (including
        // any '?') belongs to the fragment.
        let (head, fragment) = match input.split_once('#') {
            Some((h, f)) => (h, Some(f)),
            None => (input, None),
        };

        // A standalone query only exists when there is no fragment '?'.
        let (head, query) = match head.split_once('?') {
            Some((h, q)) => (h, Some(q)),
            None => (head, None),
        };

        // Generic URI decoding lowercases the scheme; keep the original
        // spelling by slicing it straight out of the input.
        let mut rest = head;
        if let Some(idx) = head.find(':') {
            if is_scheme(&head[..idx]) {
                url.scheme = Some(input[..idx].to_string());
                rest = &head[idx + 1..];
            }
        }

        // `scheme://target` -- fold the authority into the path.
        let rest = rest.strip_prefix("//").unwrap_or(rest);

        let mut path = rest.to_string();
        if url.scheme.as_deref() == Some("name") {
            // e.g. "name://@selection:" or "name://@selection/path:"
            if let Some(trimmed) = path.strip_suffix(':') {
                path = trimmed.to_string();
            }
        }
        if !path.is_empty() {
            url.path = Some(decode(&path)?);
        }

        if let Some(frag) = fragment {
            let (mut id, props) = match frag.split_once('?') {
                Some((i, p)) => (i, Some(p)),
                None => (frag, None),
            };
            if url.scheme.as_deref() == Some("name") {
                // "name://@selection#fragment:?value/value"
                id = id.strip_suffix(':').unwrap_or(id);
            }
            if !id.is_empty() {
                url.fragment = Some(decode(id)?);
            }
            if let Some(props) = props {
                url.prop_path = Some(split_props(props)?);
            }
        }

        if url.prop_path.is_none() {
            if let Some(q) = query {
                url.prop_path = Some(split_props(q)?);
            }
        }

        Ok(url)
    }

    /// True when every component is absent.
    pub fn is_empty(&self) -> bool {
        self.scheme.is_none()
            && self.path.is_none()
            && self.fragment.is_none()
            && self.prop_path.is_none()
    }
}

/// RFC 3986 scheme: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Percent-decode a component; malformed escapes are a hard error.
fn decode(raw: &str) -> UrlResult<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return Err(UrlError::MalformedEscape(raw.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| UrlError::InvalidUtf8(raw.to_string()))
}

fn split_props(raw: &str) -> UrlResult<Vec<String>> {
    raw.split('/').map(decode).collect()
}
