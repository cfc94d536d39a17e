use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thrap_store::{codec, ContentHasher, Object, StoreResult};

use crate::component::{sorted, Component};
use crate::entity::Entity;
use crate::error::ValidationErrors;

/// A deployable application: its own components plus the external
/// dependencies they rely on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stack {
    /// Defaults to `name` during validation.
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub components: HashMap<String, Component>,
    pub dependencies: HashMap<String, Component>,
}

impl Stack {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Validate every component and dependency.
    ///
    /// On success the stack id defaults to its name and every component id
    /// is set to its key. Failures are collected per component under
    /// `component.<key>` or `dependency.<key>`.
    pub fn validate(&mut self) -> Result<(), ValidationErrors> {
        if self.id.is_empty() {
            self.id = self.name.clone();
        }

        let mut errs = ValidationErrors::new();
        for (key, component) in &mut self.components {
            match component.validate() {
                Ok(()) => component.id = key.clone(),
                Err(reason) => errs.add(format!("component.{key}"), reason),
            }
        }
        for (key, dependency) in &mut self.dependencies {
            match dependency.validate_dependency() {
                Ok(()) => dependency.id = key.clone(),
                Err(reason) => errs.add(format!("dependency.{key}"), reason),
            }
        }
        errs.into_result()
    }
}

impl Object for Stack {
    fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher
            .update_str(&self.id)
            .update_str(&self.name)
            .update_str(&self.version)
            .update_str(&self.description)
            .update_len(self.components.len());
        for (key, component) in sorted(&self.components) {
            hasher.update_str(key);
            component.hash_into(hasher);
        }
        hasher.update_len(self.dependencies.len());
        for (key, dependency) in sorted(&self.dependencies) {
            hasher.update_str(key);
            dependency.hash_into(hasher);
        }
    }

    fn marshal(&self) -> StoreResult<Vec<u8>> {
        codec::encode(self)
    }

    fn unmarshal(bytes: &[u8]) -> StoreResult<Self> {
        codec::decode(bytes)
    }
}

impl Entity for Stack {
    const KIND: &'static str = "stack";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&mut self) -> Result<(), ValidationErrors> {
        Stack::validate(self)
    }
}
