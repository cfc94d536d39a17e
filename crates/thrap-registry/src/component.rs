use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thrap_store::ContentHasher;

/// Build context used when a buildable component leaves it empty.
pub const DEFAULT_BUILD_CONTEXT: &str = ".";

/// Role a component plays in a stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// User-facing UI.
    Web,
    Api,
    /// Databases, caches, storage and similar.
    Datastore,
    Batch,
    /// Cron-like jobs.
    Periodic,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Api => "api",
            Self::Datastore => "datastore",
            Self::Batch => "batch",
            Self::Periodic => "periodic",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container build settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    pub dockerfile: String,
    pub context: String,
}

/// Secrets delivery settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Secrets {
    pub destination: String,
    pub template: String,
}

/// Environment for a component: an optional env file plus inline variables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub file: String,
    pub vars: HashMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub source: String,
    pub target: String,
}

/// One deployable piece of a stack, or an external dependency of it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Component {
    /// Assigned from the component's key in the stack during validation.
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: Option<ComponentKind>,
    /// `<language>` or `<language>:<version>`.
    pub language: String,
    /// Directly exposed to users.
    pub head: bool,
    pub external: bool,
    pub build: Option<Build>,
    pub secrets: Option<Secrets>,
    pub ports: HashMap<String, i32>,
    pub env: Option<EnvConfig>,
    pub config: HashMap<String, String>,
    pub volumes: Vec<Volume>,
}

impl Component {
    pub fn new(name: &str, version: &str, kind: ComponentKind) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// A component is buildable when it names a Dockerfile.
    pub fn is_buildable(&self) -> bool {
        self.build.as_ref().is_some_and(|b| !b.dockerfile.is_empty())
    }

    pub fn has_secrets(&self) -> bool {
        self.secrets
            .as_ref()
            .is_some_and(|s| !s.destination.is_empty())
    }

    pub fn has_port(&self, port: i32) -> bool {
        self.ports.values().any(|p| *p == port)
    }

    pub fn has_volume_target(&self, target: &str) -> bool {
        self.volumes.iter().any(|v| v.target == target)
    }

    /// Language name without its version.
    pub fn language_name(&self) -> &str {
        self.language.split(':').next().unwrap_or_default()
    }

    /// Language version, empty when not given.
    pub fn language_version(&self) -> &str {
        match self.language.split_once(':') {
            Some((_, version)) if !version.contains(':') => version,
            _ => "",
        }
    }

    /// Validate a stack component and fill in the default build context.
    pub fn validate(&mut self) -> Result<(), String> {
        match self.kind {
            None => return Err("component type not specified".into()),
            Some(ComponentKind::Datastore) if self.head => {
                return Err("datastore cannot be a head".into())
            }
            Some(_) => {}
        }

        if self.is_buildable() {
            if !self.language_name().is_empty() {
                let version = self.language_version();
                if !version.is_empty() {
                    check_version(version).map_err(|e| format!("language {e}"))?;
                }
            }
            if let Some(build) = self.build.as_mut() {
                if build.context.is_empty() {
                    build.context = DEFAULT_BUILD_CONTEXT.to_string();
                }
            }
            Ok(())
        } else {
            check_version(&self.version)
        }
    }

    /// Validate a dependency. Dependencies are consumed as-is and may not be
    /// built.
    pub fn validate_dependency(&self) -> Result<(), String> {
        if self.is_buildable() {
            return Err("dependencies cannot be built".into());
        }
        Ok(())
    }

    /// Write the canonical encoding. Does not finalize.
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher
            .update_str(&self.id)
            .update_str(&self.name)
            .update_str(&self.version)
            .update_str(self.kind.map(|k| k.as_str()).unwrap_or_default())
            .update_str(&self.language)
            .update_bool(self.head)
            .update_bool(self.external);

        // Presence flags and counts keep adjacent fields from running together.
        hasher.update_bool(self.build.is_some());
        if let Some(build) = &self.build {
            hasher.update_str(&build.dockerfile).update_str(&build.context);
        }
        hasher.update_bool(self.secrets.is_some());
        if let Some(secrets) = &self.secrets {
            hasher
                .update_str(&secrets.destination)
                .update_str(&secrets.template);
        }
        hasher.update_len(self.ports.len());
        for (name, port) in sorted(&self.ports) {
            hasher.update_str(name).update_i32(*port);
        }
        hasher.update_bool(self.env.is_some());
        if let Some(env) = &self.env {
            hasher.update_str(&env.file).update_len(env.vars.len());
            for (key, value) in sorted(&env.vars) {
                hasher.update_str(key).update_str(value);
            }
        }
        hasher.update_len(self.config.len());
        for (key, value) in sorted(&self.config) {
            hasher.update_str(key).update_str(value);
        }
        hasher.update_len(self.volumes.len());
        for volume in &self.volumes {
            hasher.update_str(&volume.source).update_str(&volume.target);
        }
    }
}

/// Map entries in ascending key order.
pub(crate) fn sorted<V>(map: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Accept dotted numeric versions (`1`, `1.2`, `v1.2.3`) with an optional
/// `-prerelease` and `+metadata` suffix.
fn check_version(version: &str) -> Result<(), String> {
    let malformed = || format!("malformed version: {version:?}");
    let core = version.strip_prefix('v').unwrap_or(version);
    let core = core.split_once('+').map_or(core, |(c, _)| c);
    let (core, pre) = match core.split_once('-') {
        Some((c, p)) => (c, Some(p)),
        None => (core, None),
    };
    if core.is_empty() {
        return Err(malformed());
    }
    for segment in core.split('.') {
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
    }
    if let Some(pre) = pre {
        let ok = pre
            .split('.')
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_alphanumeric()));
        if !ok {
            return Err(malformed());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use thrap_crypto::{HashAlgorithm, Sha256};

    fn digest(c: &Component) -> thrap_store::Digest {
        let mut h = Sha256.hasher();
        c.hash_into(&mut h);
        h.finalize()
    }

    #[test]
    fn versions() {
        for ok in ["1", "1.2", "1.2.3", "v0.1.0", "1.0.0-beta.1", "1.0.0+build5"] {
            assert!(check_version(ok).is_ok(), "{ok}");
        }
        for bad in ["", "latest", "1..2", "1.x", "v", "1.0-"] {
            assert!(check_version(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn kind_required() {
        let mut c = Component::default();
        c.version = "1.0".into();
        assert_eq!(c.validate().unwrap_err(), "component type not specified");
    }

    #[test]
    fn datastore_cannot_be_head() {
        let mut c = Component::new("postgres", "15", ComponentKind::Datastore);
        c.head = true;
        assert_eq!(c.validate().unwrap_err(), "datastore cannot be a head");
    }

    #[test]
    fn non_buildable_needs_version() {
        let mut c = Component::new("redis", "", ComponentKind::Datastore);
        assert!(c.validate().is_err());
        c.version = "7.2".into();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn buildable_gets_default_context() {
        let mut c = Component::new("api", "", ComponentKind::Api);
        c.language = "go:1.21".into();
        c.build = Some(Build {
            dockerfile: "api.dockerfile".into(),
            context: String::new(),
        });
        c.validate().unwrap();
        assert_eq!(c.build.unwrap().context, DEFAULT_BUILD_CONTEXT);
    }

    #[test]
    fn buildable_checks_language_version() {
        let mut c = Component::new("api", "", ComponentKind::Api);
        c.language = "go:one".into();
        c.build = Some(Build {
            dockerfile: "Dockerfile".into(),
            ..Build::default()
        });
        assert!(c.validate().unwrap_err().starts_with("language"));
    }

    #[test]
    fn language_parts() {
        let mut c = Component::default();
        c.language = "rust:1.80".into();
        assert_eq!(c.language_name(), "rust");
        assert_eq!(c.language_version(), "1.80");
        c.language = "rust".into();
        assert_eq!(c.language_version(), "");
    }

    #[test]
    fn dependency_cannot_build() {
        let mut dep = Component::new("ecr", "1.0", ComponentKind::Datastore);
        assert!(dep.validate_dependency().is_ok());
        dep.build = Some(Build {
            dockerfile: "foo".into(),
            ..Build::default()
        });
        assert_eq!(
            dep.validate_dependency().unwrap_err(),
            "dependencies cannot be built"
        );
    }

    #[test]
    fn hash_ignores_map_insertion_order() {
        let mut a = Component::new("web", "1.0", ComponentKind::Web);
        let mut b = a.clone();
        for (k, v) in [("http", 80), ("https", 443), ("admin", 9000)] {
            a.ports.insert(k.into(), v);
        }
        for (k, v) in [("admin", 9000), ("http", 80), ("https", 443)] {
            b.ports.insert(k.into(), v);
        }
        a.config.insert("x".into(), "1".into());
        a.config.insert("y".into(), "2".into());
        b.config.insert("y".into(), "2".into());
        b.config.insert("x".into(), "1".into());
        assert_eq!(digest(&a), digest(&b));

        b.ports.insert("http".into(), 8080);
        assert_ne!(digest(&a), digest(&b));
    }

    #[test]
    fn parses_manifest_json() {
        let c: Component = serde_json::from_str(
            r#"{"name":"web","type":"web","version":"1.0","head":true,"ports":{"http":80}}"#,
        )
        .unwrap();
        assert_eq!(c.kind, Some(ComponentKind::Web));
        assert!(c.head);
        assert!(c.has_port(80));
        assert!(!c.is_buildable());
    }
}
