use std::marker::PhantomData;

use thrap_kv::KvEngine;
use thrap_store::{ChainHeader, Digest, Object, RefStore, StoreError};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult, ValidationErrors};

/// Ref name that tracks the current version of every entity.
pub const LATEST: &str = "latest";

/// A business object kept in a registry.
pub trait Entity: Object + Clone {
    /// Human label used in errors and logs, for example `"stack"`.
    const KIND: &'static str;

    /// Registry key. Also used as the entity's store namespace.
    fn id(&self) -> &str;

    /// Check the entity and fill in defaults before it is stored.
    fn validate(&mut self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// One recorded version of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version<T> {
    /// Digest of the chain header for this version.
    pub digest: Digest,
    pub header: ChainHeader,
    pub entity: T,
}

/// Create/get/update over a [`RefStore`] using one [`LATEST`] ref per id.
pub struct EntityStore<E, T> {
    refs: RefStore<E>,
    _entity: PhantomData<fn() -> T>,
}

impl<E: KvEngine, T: Entity> EntityStore<E, T> {
    pub fn new(refs: RefStore<E>) -> Self {
        Self {
            refs,
            _entity: PhantomData,
        }
    }

    /// The underlying ref store.
    pub fn refs(&self) -> &RefStore<E> {
        &self.refs
    }

    /// Register a new entity.
    ///
    /// Produces a two-version chain: an empty genesis and the entity at
    /// height 1, written in one transaction. Fails with
    /// [`RegistryError::AlreadyRegistered`] if the id is taken.
    pub fn create(&self, mut entity: T) -> RegistryResult<(T, ChainHeader)> {
        prepare(&mut entity)?;
        let id = entity.id().to_string();
        let (digest, header) = self
            .refs
            .create_chain(&id, LATEST, &entity)
            .map_err(|e| RegistryError::from_store(T::KIND, &id, e))?;
        info!(kind = T::KIND, id = %id, digest = %digest.short_hex(), "registered");
        Ok((entity, header))
    }

    /// Current version of `id`.
    pub fn get(&self, id: &str) -> RegistryResult<T> {
        self.get_with_header(id).map(|(entity, _)| entity)
    }

    /// Current version of `id` with the header that records it. Both are
    /// read from one snapshot.
    pub fn get_with_header(&self, id: &str) -> RegistryResult<(T, ChainHeader)> {
        let (header, _, entity) = self
            .refs
            .get_ref_payload::<T>(id, LATEST)
            .map_err(|e| RegistryError::from_store(T::KIND, id, e))?;
        match entity {
            Some(entity) => Ok((entity, header)),
            None => Err(RegistryError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            }),
        }
    }

    /// Record a new version of an already registered entity.
    ///
    /// Fails with [`RegistryError::NotFound`] for unknown ids and with
    /// [`RegistryError::Conflict`] if another writer advanced the entity
    /// first.
    pub fn update(&self, mut entity: T) -> RegistryResult<(T, ChainHeader)> {
        prepare(&mut entity)?;
        let id = entity.id().to_string();
        let classify = |e: StoreError| RegistryError::from_store(T::KIND, &id, e);
        let (_, current) = self.refs.get_ref(&id, LATEST).map_err(classify)?;
        let (digest, header) = self
            .refs
            .append(&id, LATEST, &current, &entity)
            .map_err(classify)?;
        info!(
            kind = T::KIND,
            id = %id,
            height = header.height,
            digest = %digest.short_hex(),
            "updated"
        );
        Ok((entity, header))
    }

    /// Every version of `id`, latest first. The empty genesis is omitted.
    pub fn history(&self, id: &str) -> RegistryResult<Vec<Version<T>>> {
        let chain = self
            .refs
            .history_with_payloads::<T>(id, LATEST)
            .map_err(|e| RegistryError::from_store(T::KIND, id, e))?;
        Ok(chain
            .into_iter()
            .filter_map(|(digest, header, entity)| {
                entity.map(|entity| Version {
                    digest,
                    header,
                    entity,
                })
            })
            .collect())
    }

    /// Ids of every registered entity, sorted.
    pub fn list(&self) -> RegistryResult<Vec<String>> {
        Ok(self.refs.namespaces_with_ref(LATEST)?)
    }

    /// Audit the version chain of `id` and return its length, genesis
    /// included.
    pub fn verify(&self, id: &str) -> RegistryResult<u64> {
        self.refs
            .verify_ref_chain(id, LATEST)
            .map_err(|e| RegistryError::from_store(T::KIND, id, e))
    }

    /// Unregister `id`. Its versions stay readable by digest.
    pub fn delete(&self, id: &str) -> RegistryResult<()> {
        let existed = self
            .refs
            .delete_ref(id, LATEST)
            .map_err(|e| RegistryError::from_store(T::KIND, id, e))?;
        if !existed {
            return Err(RegistryError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            });
        }
        debug!(kind = T::KIND, id, "unregistered");
        Ok(())
    }
}

fn prepare<T: Entity>(entity: &mut T) -> RegistryResult<()> {
    entity.validate().map_err(|errs| RegistryError::Invalid {
        kind: T::KIND,
        reason: errs.to_string(),
    })?;
    if entity.id().is_empty() {
        return Err(RegistryError::MissingId { kind: T::KIND });
    }
    Ok(())
}

impl<E, T> std::fmt::Debug for EntityStore<E, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("refs", &self.refs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use thrap_crypto::Sha256;
    use thrap_kv::MemoryEngine;
    use thrap_store::{ContentHasher, ObjectStore, StoreResult};

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Note {
        id: String,
        body: String,
    }

    impl Note {
        fn new(id: &str, body: &str) -> Self {
            Self {
                id: id.into(),
                body: body.into(),
            }
        }
    }

    impl Object for Note {
        fn hash_into(&self, hasher: &mut ContentHasher) {
            hasher.update_str(&self.id).update_str(&self.body);
        }

        fn marshal(&self) -> StoreResult<Vec<u8>> {
            Ok(format!("{}\n{}", self.id, self.body).into_bytes())
        }

        fn unmarshal(bytes: &[u8]) -> StoreResult<Self> {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let (id, body) = text
                .split_once('\n')
                .ok_or_else(|| StoreError::Serialization("missing separator".into()))?;
            Ok(Self::new(id, body))
        }
    }

    impl Entity for Note {
        const KIND: &'static str = "note";

        fn id(&self) -> &str {
            &self.id
        }

        fn validate(&mut self) -> Result<(), ValidationErrors> {
            let mut errs = ValidationErrors::new();
            if self.body.is_empty() {
                errs.add("body", "empty");
            }
            errs.into_result()
        }
    }

    fn notes() -> EntityStore<MemoryEngine, Note> {
        let objects = ObjectStore::new(MemoryEngine::new(), Arc::new(Sha256), "/note");
        EntityStore::new(RefStore::new(objects))
    }

    #[test]
    fn create_then_get() {
        let store = notes();
        let (note, header) = store.create(Note::new("foo", "hello")).unwrap();
        assert_eq!(header.height, 1);
        assert_eq!(store.get("foo").unwrap(), note);
        let (_, current) = store.get_with_header("foo").unwrap();
        assert_eq!(current, header);
    }

    #[test]
    fn create_twice_is_already_registered() {
        let store = notes();
        store.create(Note::new("foo", "hello")).unwrap();
        let err = store.create(Note::new("foo", "other")).unwrap_err();
        assert!(err.is_already_registered());
        assert_eq!(store.get("foo").unwrap().body, "hello");
    }

    #[test]
    fn missing_id_rejected() {
        let store = notes();
        let err = store.create(Note::new("", "hello")).unwrap_err();
        assert!(matches!(err, RegistryError::MissingId { kind: "note" }));
    }

    #[test]
    fn invalid_entity_rejected() {
        let store = notes();
        let err = store.create(Note::new("foo", "")).unwrap_err();
        match err {
            RegistryError::Invalid { reason, .. } => assert_eq!(reason, "body: empty"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.get("foo").unwrap_err().is_not_found());
    }

    #[test]
    fn unusable_id_is_invalid() {
        let store = notes();
        let err = store.create(Note::new("a//b", "hello")).unwrap_err();
        assert!(matches!(err, RegistryError::Invalid { .. }));
    }

    #[test]
    fn get_unknown_is_not_found() {
        let store = notes();
        assert!(store.get("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn ref_without_payload_reads_as_not_found() {
        let store = notes();
        store.refs().create_ref("bare", LATEST).unwrap();
        assert!(store.get("bare").unwrap_err().is_not_found());
    }

    #[test]
    fn update_extends_history() {
        let store = notes();
        store.create(Note::new("foo", "v1")).unwrap();
        let (_, header) = store.update(Note::new("foo", "v2")).unwrap();
        assert_eq!(header.height, 2);
        assert_eq!(store.get("foo").unwrap().body, "v2");

        let history = store.history("foo").unwrap();
        let bodies: Vec<_> = history.iter().map(|v| v.entity.body.as_str()).collect();
        assert_eq!(bodies, vec!["v2", "v1"]);
        assert_eq!(history[0].header.previous, history[1].digest);
        assert_eq!(store.verify("foo").unwrap(), 3);
    }

    #[test]
    fn header_and_entity_come_from_the_same_version() {
        let store = notes();
        store.create(Note::new("foo", "v1")).unwrap();
        store.update(Note::new("foo", "v2")).unwrap();
        let (note, header) = store.get_with_header("foo").unwrap();
        assert_eq!(note.body, "v2");
        assert_eq!(header.data_digest, store.refs().objects().digest_of(&note));
        for version in store.history("foo").unwrap() {
            assert_eq!(
                version.header.data_digest,
                store.refs().objects().digest_of(&version.entity)
            );
        }
    }

    #[test]
    fn update_unknown_is_not_found() {
        let store = notes();
        let err = store.update(Note::new("foo", "v1")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn list_returns_sorted_ids() {
        let store = notes();
        for id in ["zeta", "alpha", "mid"] {
            store.create(Note::new(id, "x")).unwrap();
        }
        assert_eq!(store.list().unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn delete_unregisters_but_keeps_versions() {
        let store = notes();
        let (note, header) = store.create(Note::new("foo", "keep")).unwrap();
        store.delete("foo").unwrap();
        assert!(store.get("foo").unwrap_err().is_not_found());
        assert!(store.delete("foo").unwrap_err().is_not_found());
        assert!(store.list().unwrap().is_empty());

        let orphan: Note = store
            .refs()
            .objects()
            .get("foo", &header.data_digest)
            .unwrap();
        assert_eq!(orphan, note);

        // The id can be registered again.
        store.create(Note::new("foo", "again")).unwrap();
    }
}
