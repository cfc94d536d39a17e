use std::sync::Arc;

use thrap_kv::KvEngine;
use thrap_store::{HashAlgorithm, ObjectStore, RefStore};

use crate::entity::{Entity, EntityStore};
use crate::identity::Identity;
use crate::stack::Stack;

/// Default key prefix for stacks.
pub const STACK_PREFIX: &str = "/stack";
/// Default key prefix for identities.
pub const IDENTITY_PREFIX: &str = "/identity";

pub type StackStore<E> = EntityStore<Arc<E>, Stack>;
pub type IdentityStore<E> = EntityStore<Arc<E>, Identity>;

/// One engine and hash algorithm shared by every entity store opened from
/// it. Stores differ only in key prefix.
pub struct Registry<E> {
    engine: Arc<E>,
    algorithm: Arc<dyn HashAlgorithm>,
}

impl<E: KvEngine> Registry<E> {
    pub fn new(engine: E, algorithm: Arc<dyn HashAlgorithm>) -> Self {
        Self {
            engine: Arc::new(engine),
            algorithm,
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn algorithm(&self) -> &dyn HashAlgorithm {
        self.algorithm.as_ref()
    }

    /// Raw ref store rooted at `prefix`.
    pub fn refs(&self, prefix: &str) -> RefStore<Arc<E>> {
        let objects = ObjectStore::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.algorithm),
            prefix,
        );
        RefStore::new(objects)
    }

    /// Entity store for `T` rooted at `prefix`.
    pub fn open<T: Entity>(&self, prefix: &str) -> EntityStore<Arc<E>, T> {
        EntityStore::new(self.refs(prefix))
    }

    pub fn open_stacks(&self) -> StackStore<E> {
        self.open(STACK_PREFIX)
    }

    pub fn open_identities(&self) -> IdentityStore<E> {
        self.open(IDENTITY_PREFIX)
    }
}

impl<E> std::fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("algorithm", &self.algorithm.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentKind};
    use crate::entity::LATEST;
    use crate::error::RegistryError;
    use thrap_crypto::{Blake3, Sha256};
    use thrap_kv::{MemoryEngine, RedbEngine};

    fn stack(name: &str, description: &str) -> Stack {
        let mut stack = Stack::new(name);
        stack.version = "0.1.0".into();
        stack.description = description.into();
        stack
            .components
            .insert("db".into(), Component::new("postgres", "15", ComponentKind::Datastore));
        stack
    }

    /// Register, read back, reject a duplicate, drop the ref, and read the
    /// orphaned payload by digest.
    fn lifecycle<E: KvEngine>(registry: &Registry<E>) {
        let stacks = registry.open_stacks();

        let (registered, header) = stacks.create(stack("foo", "P1")).unwrap();
        assert_eq!(header.height, 1);
        assert_eq!(stacks.get("foo").unwrap(), registered);

        let err = stacks.create(stack("foo", "P2")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { kind: "stack", .. }));
        assert_eq!(stacks.get("foo").unwrap().description, "P1");

        let refs = stacks.refs();
        assert!(refs.delete_ref("foo", LATEST).unwrap());
        assert!(refs.get_ref("foo", LATEST).unwrap_err().is_not_found());
        let orphan: Stack = refs.objects().get("foo", &header.data_digest).unwrap();
        assert_eq!(orphan, registered);
    }

    #[test]
    fn stack_lifecycle_in_memory() {
        lifecycle(&Registry::new(MemoryEngine::new(), Arc::new(Sha256)));
    }

    #[test]
    fn stack_lifecycle_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::open(dir.path()).unwrap();
        lifecycle(&Registry::new(engine, Arc::new(Blake3)));
    }

    #[test]
    fn stacks_and_identities_do_not_collide() {
        let registry = Registry::new(MemoryEngine::new(), Arc::new(Sha256));
        let stacks = registry.open_stacks();
        let identities = registry.open_identities();

        stacks.create(stack("alice@example.com", "odd name")).unwrap();
        let (ident, _) = identities
            .create(Identity::new("alice@example.com", vec![7; 32]))
            .unwrap();
        assert_eq!(ident.id, "alice@example.com");

        assert_eq!(stacks.list().unwrap(), vec!["alice@example.com"]);
        assert_eq!(identities.list().unwrap(), vec!["alice@example.com"]);
        assert_eq!(identities.get("alice@example.com").unwrap(), ident);
    }

    #[test]
    fn stack_ids_cannot_reach_identity_records() {
        let registry = Registry::new(MemoryEngine::new(), Arc::new(Sha256));
        let stacks = registry.open_stacks();
        let identities = registry.open_identities();
        let (ident, _) = identities
            .create(Identity::new("alice@example.com", vec![7; 32]))
            .unwrap();

        let crafted = "../identity/alice@example.com";
        for err in [
            stacks.delete(crafted).unwrap_err(),
            stacks.get(crafted).unwrap_err(),
            stacks.history(crafted).unwrap_err(),
            stacks.verify(crafted).unwrap_err(),
        ] {
            assert!(matches!(err, RegistryError::Invalid { kind: "stack", .. }), "{err:?}");
        }
        assert_eq!(identities.get("alice@example.com").unwrap(), ident);
        assert_eq!(identities.list().unwrap(), vec!["alice@example.com"]);
    }

    #[test]
    fn update_that_moves_text_between_fields_is_stored() {
        let registry = Registry::new(MemoryEngine::new(), Arc::new(Sha256));
        let stacks = registry.open_stacks();
        let mut first = Stack::new("foo");
        first.description = "ab".into();
        stacks.create(first).unwrap();

        let mut second = Stack::new("foo");
        second.version = "a".into();
        second.description = "b".into();
        let (_, header) = stacks.update(second).unwrap();
        assert_eq!(header.height, 2);

        let current = stacks.get("foo").unwrap();
        assert_eq!(current.version, "a");
        assert_eq!(current.description, "b");

        let history = stacks.history("foo").unwrap();
        assert_eq!(history.len(), 2);
        assert_ne!(history[0].header.data_digest, history[1].header.data_digest);
        assert_eq!(history[1].entity.description, "ab");
    }

    #[test]
    fn invalid_stack_is_rejected_before_storage() {
        let registry = Registry::new(MemoryEngine::new(), Arc::new(Sha256));
        let stacks = registry.open_stacks();
        let mut bad = stack("foo", "P1");
        bad.components.insert("web".into(), Component::default());
        let err = stacks.create(bad).unwrap_err();
        match err {
            RegistryError::Invalid { kind, reason } => {
                assert_eq!(kind, "stack");
                assert!(reason.contains("component.web"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(stacks.list().unwrap().is_empty());
    }

    #[test]
    fn stack_updates_are_versioned() {
        let registry = Registry::new(MemoryEngine::new(), Arc::new(Sha256));
        let stacks = registry.open_stacks();
        stacks.create(stack("foo", "P1")).unwrap();
        stacks.update(stack("foo", "P2")).unwrap();
        let history = stacks.history("foo").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].entity.description, "P2");
        assert_eq!(history[0].header.height, 2);
        assert_eq!(history[1].entity.description, "P1");
        assert_eq!(stacks.verify("foo").unwrap(), 3);
    }

    #[test]
    fn custom_prefix_is_separate() {
        let registry = Registry::new(MemoryEngine::new(), Arc::new(Sha256));
        let staging = registry.open::<Stack>("/staging/stack");
        staging.create(stack("foo", "P1")).unwrap();
        assert!(registry.open_stacks().get("foo").unwrap_err().is_not_found());
        assert_eq!(staging.get("foo").unwrap().description, "P1");
    }
}
