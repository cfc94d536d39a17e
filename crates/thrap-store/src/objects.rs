use std::ops::ControlFlow;
use std::sync::Arc;

use thrap_crypto::HashAlgorithm;
use thrap_kv::{KvEngine, KvRead, KvWrite};
use thrap_types::Digest;
use tracing::debug;

use crate::error::{Entry, StoreError, StoreResult};
use crate::keys::Keyspace;
use crate::names::validate_namespace;
use crate::object::Object;

/// Namespaced store of immutable, content-addressed objects.
///
/// The digest of an object is a pure function of its content, so writing the
/// same content twice collides. [`set`](Self::set) reports the collision as
/// [`StoreError::AlreadyExists`] instead of silently overwriting; callers that
/// only need the digest treat that as "already stored".
pub struct ObjectStore<E> {
    engine: E,
    keys: Keyspace,
    algorithm: Arc<dyn HashAlgorithm>,
}

impl<E: KvEngine> ObjectStore<E> {
    /// Create a store over `engine`, hashing with `algorithm`, with every key
    /// under `prefix` (for example `/stack`).
    pub fn new(engine: E, algorithm: Arc<dyn HashAlgorithm>, prefix: &str) -> Self {
        Self {
            engine,
            keys: Keyspace::new(prefix),
            algorithm,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keys
    }

    pub fn algorithm(&self) -> &dyn HashAlgorithm {
        self.algorithm.as_ref()
    }

    /// The all-zero digest for this store's hash algorithm.
    pub fn zero_digest(&self) -> Digest {
        self.algorithm.zero_digest()
    }

    /// Digest `object` would be stored under.
    pub fn digest_of<T: Object>(&self, object: &T) -> Digest {
        object.digest(self.algorithm.as_ref())
    }

    /// Store `object` in `namespace` and return its digest.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the digest is already
    /// present in the namespace.
    pub fn set<T: Object>(&self, namespace: &str, object: &T) -> StoreResult<Digest> {
        validate_namespace(namespace)?;
        let digest = self.digest_of(object);
        let bytes = object.marshal()?;
        self.engine
            .update(|txn| self.insert_new(txn, namespace, &digest, &bytes))?;
        debug!(namespace, digest = %digest.short_hex(), size = bytes.len(), "stored object");
        Ok(digest)
    }

    /// Load the object stored at `digest`.
    pub fn get<T: Object>(&self, namespace: &str, digest: &Digest) -> StoreResult<T> {
        validate_namespace(namespace)?;
        self.engine.view(|txn| self.load(txn, namespace, digest))
    }

    /// Check whether `digest` is stored in `namespace`.
    pub fn exists(&self, namespace: &str, digest: &Digest) -> StoreResult<bool> {
        validate_namespace(namespace)?;
        let key = self.keys.object_key(namespace, digest);
        Ok(self.engine.view(|txn| txn.contains(&key))?)
    }

    /// Remove an object. Returns `true` if it existed.
    ///
    /// Intended for cleanup only. Deleting an object still referenced by a
    /// chain breaks reads and walks of that chain.
    pub fn delete(&self, namespace: &str, digest: &Digest) -> StoreResult<bool> {
        validate_namespace(namespace)?;
        let key = self.keys.object_key(namespace, digest);
        let existed = self.engine.update(|txn| -> StoreResult<bool> {
            let existed = txn.contains(&key)?;
            txn.delete(&key)?;
            Ok(existed)
        })?;
        debug!(namespace, digest = %digest.short_hex(), existed, "deleted object");
        Ok(existed)
    }

    /// Visit every object in `namespace` as a `T`, in digest order.
    ///
    /// A stored value that does not decode as `T`, or that decodes to content
    /// with a different digest, fails the iteration with
    /// [`StoreError::TypeMismatch`]. Use on namespaces holding a single
    /// object type.
    pub fn iter_objects<T, F>(&self, namespace: &str, mut visit: F) -> StoreResult<()>
    where
        T: Object,
        F: FnMut(&Digest, T) -> StoreResult<()>,
    {
        validate_namespace(namespace)?;
        let prefix = self.keys.objects_prefix(namespace);
        self.engine.view(|txn| -> StoreResult<()> {
            let mut failure = None;
            txn.scan_prefix(&prefix, &mut |key, value| {
                let digest = Digest::from_slice(&key[prefix.len()..]);
                let result = self
                    .decode_as::<T>(&digest, value)
                    .and_then(|object| visit(&digest, object));
                match result {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => {
                        failure = Some(e);
                        ControlFlow::Break(())
                    }
                }
            })?;
            failure.map_or(Ok(()), Err)
        })
    }

    fn decode_as<T: Object>(&self, digest: &Digest, bytes: &[u8]) -> StoreResult<T> {
        let mismatch = || StoreError::TypeMismatch {
            digest: digest.clone(),
            expected: std::any::type_name::<T>(),
        };
        let object = T::unmarshal(bytes).map_err(|_| mismatch())?;
        if self.digest_of(&object) != *digest {
            return Err(mismatch());
        }
        Ok(object)
    }

    // -----------------------------------------------------------------------
    // Transaction-scoped primitives shared with the ref store
    // -----------------------------------------------------------------------

    pub(crate) fn load<T, R>(&self, txn: &R, namespace: &str, digest: &Digest) -> StoreResult<T>
    where
        T: Object,
        R: KvRead + ?Sized,
    {
        let key = self.keys.object_key(namespace, digest);
        match txn.get(&key)? {
            Some(bytes) => T::unmarshal(&bytes),
            None => Err(StoreError::NotFound(Entry::object(namespace, digest))),
        }
    }

    pub(crate) fn insert_new<W>(
        &self,
        txn: &mut W,
        namespace: &str,
        digest: &Digest,
        bytes: &[u8],
    ) -> StoreResult<()>
    where
        W: KvWrite + ?Sized,
    {
        let key = self.keys.object_key(namespace, digest);
        if txn.contains(&key)? {
            return Err(StoreError::AlreadyExists(Entry::object(namespace, digest)));
        }
        txn.set(&key, bytes)?;
        Ok(())
    }

    /// Write an object, overwriting identical content if present.
    pub(crate) fn put<T, W>(&self, txn: &mut W, namespace: &str, object: &T) -> StoreResult<Digest>
    where
        T: Object,
        W: KvWrite + ?Sized,
    {
        let digest = self.digest_of(object);
        let bytes = object.marshal()?;
        txn.set(&self.keys.object_key(namespace, &digest), &bytes)?;
        Ok(digest)
    }

    /// Write an object unless its digest is already stored; either way
    /// return the digest.
    pub(crate) fn put_if_absent<T, W>(
        &self,
        txn: &mut W,
        namespace: &str,
        object: &T,
    ) -> StoreResult<Digest>
    where
        T: Object,
        W: KvWrite + ?Sized,
    {
        let digest = self.digest_of(object);
        let bytes = object.marshal()?;
        match self.insert_new(txn, namespace, &digest, &bytes) {
            Ok(()) => Ok(digest),
            Err(StoreError::AlreadyExists(_)) => {
                debug!(namespace, digest = %digest.short_hex(), "object already stored, reusing");
                Ok(digest)
            }
            Err(e) => Err(e),
        }
    }
}

impl<E> std::fmt::Debug for ObjectStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("prefix", &self.keys.prefix())
            .field("algorithm", &self.algorithm.name())
            .finish()
    }
}
