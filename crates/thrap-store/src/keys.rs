//! Engine key layout.
//!
//! ```text
//! <prefix>/<namespace>/objects/<raw digest bytes>
//! <prefix>/<namespace>/refs/<name>
//! ```
//!
//! Segments are joined and cleaned the way a POSIX path join does, so
//! `"/stack"` and `"/stack/"` address the same keys. This layout is shared
//! with stores written by earlier releases and must not change.

use thrap_types::Digest;

/// Directory segment holding objects.
pub const OBJECTS_DIR: &str = "objects";
/// Directory segment holding refs.
pub const REFS_DIR: &str = "refs";

/// Lexically clean a slash-separated path: collapse repeated slashes, drop
/// `.` components, and resolve `..` against the preceding component.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let body = parts.join("/");
    if rooted {
        format!("/{body}")
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}

/// Join non-empty segments with `/` and clean the result.
pub fn join_path(segments: &[&str]) -> String {
    let joined = segments
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        return joined;
    }
    clean_path(&joined)
}

/// What a key under a [`Keyspace`] addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedKey {
    Object { namespace: String, digest: Digest },
    Ref { namespace: String, name: String },
}

/// Key builder for one store prefix (for example `/stack`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    /// Create a keyspace rooted at `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: join_path(&[prefix]),
        }
    }

    /// The cleaned prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Every key in this keyspace starts with these bytes.
    pub fn root(&self) -> Vec<u8> {
        let mut root = self.prefix.clone().into_bytes();
        if !root.is_empty() && !root.ends_with(b"/") {
            root.push(b'/');
        }
        root
    }

    /// `<prefix>/<namespace>/objects/`
    pub fn objects_prefix(&self, namespace: &str) -> Vec<u8> {
        let mut key = join_path(&[&self.prefix, namespace, OBJECTS_DIR]).into_bytes();
        key.push(b'/');
        key
    }

    /// `<prefix>/<namespace>/objects/<raw digest bytes>`
    pub fn object_key(&self, namespace: &str, digest: &Digest) -> Vec<u8> {
        let mut key = self.objects_prefix(namespace);
        key.extend_from_slice(digest.as_bytes());
        key
    }

    /// `<prefix>/<namespace>/refs/`
    pub fn refs_prefix(&self, namespace: &str) -> Vec<u8> {
        let mut key = join_path(&[&self.prefix, namespace, REFS_DIR]).into_bytes();
        key.push(b'/');
        key
    }

    /// `<prefix>/<namespace>/refs/<name>`
    pub fn ref_key(&self, namespace: &str, name: &str) -> Vec<u8> {
        join_path(&[&self.prefix, namespace, REFS_DIR, name]).into_bytes()
    }

    /// Split a key into namespace and object digest or ref name.
    ///
    /// The namespace ends at the first `objects` or `refs` component, which
    /// namespace validation guarantees is unambiguous.
    pub fn parse(&self, key: &[u8]) -> Option<ParsedKey> {
        let rest = key.strip_prefix(self.root().as_slice())?;
        let mut start = 0;
        while start < rest.len() {
            let end = rest[start..]
                .iter()
                .position(|b| *b == b'/')
                .map(|p| start + p)?;
            let component = &rest[start..end];
            let tail = &rest[end + 1..];
            if component == OBJECTS_DIR.as_bytes() || component == REFS_DIR.as_bytes() {
                if start == 0 || tail.is_empty() {
                    return None;
                }
                let namespace = std::str::from_utf8(&rest[..start - 1]).ok()?.to_string();
                return if component == OBJECTS_DIR.as_bytes() {
                    Some(ParsedKey::Object {
                        namespace,
                        digest: Digest::from_slice(tail),
                    })
                } else {
                    let name = std::str::from_utf8(tail).ok()?.to_string();
                    Some(ParsedKey::Ref { namespace, name })
                };
            }
            start = end + 1;
        }
        None
    }
}
