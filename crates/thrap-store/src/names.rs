//! Namespace and ref name validation.
//!
//! Names become path segments of engine keys, and keys are cleaned like
//! POSIX paths. The rules below guarantee a name survives cleaning unchanged
//! and can never reach into another namespace:
//!
//! - Must be non-empty
//! - Must not contain whitespace or control characters
//! - Must not start or end with `/`, or contain `//`
//! - No path component may be `.` or `..`
//!
//! Namespaces additionally must not contain a component named `objects` or
//! `refs`, so the namespace part of any key can be recovered unambiguously.

use crate::error::{StoreError, StoreResult};
use crate::keys::{OBJECTS_DIR, REFS_DIR};

fn invalid(name: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn validate_path_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "must not be empty"));
    }

    if let Some(ch) = name.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid(
            name,
            format!("contains forbidden character: {ch:?}"),
        ));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }

    if name.contains("//") {
        return Err(invalid(name, "must not contain consecutive slashes '//'"));
    }

    for component in name.split('/') {
        if component == "." || component == ".." {
            return Err(invalid(
                name,
                format!("component must not be {component:?}"),
            ));
        }
    }

    Ok(())
}

/// Validate a namespace (for example an entity id).
pub fn validate_namespace(namespace: &str) -> StoreResult<()> {
    validate_path_name(namespace)?;
    for component in namespace.split('/') {
        if component == OBJECTS_DIR || component == REFS_DIR {
            return Err(invalid(
                namespace,
                format!("namespace component must not be {component:?}"),
            ));
        }
    }
    Ok(())
}

/// Validate a ref name (for example `latest`).
pub fn validate_ref_name(name: &str) -> StoreResult<()> {
    validate_path_name(name)
}
