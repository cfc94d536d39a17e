use std::ops::ControlFlow;

use thrap_kv::{KvEngine, KvRead, KvWrite};
use thrap_types::Digest;
use tracing::{debug, warn};

use crate::error::{Entry, StoreError, StoreResult};
use crate::header::ChainHeader;
use crate::keys::ParsedKey;
use crate::names::{validate_namespace, validate_ref_name};
use crate::object::Object;
use crate::objects::ObjectStore;

/// Manager for named, hash-linked version chains.
///
/// A ref is a mutable pointer from `(namespace, name)` to the digest of the
/// latest [`ChainHeader`]. Each header links to its predecessor by digest, so
/// a chain reads like a commit log: `UNCREATED -> genesis (height 0) ->
/// height 1 -> ...`.
///
/// Advancing a ref is a compare-and-swap: the caller names the header it is
/// extending and the write fails with [`StoreError::Conflict`] if the ref has
/// moved since.
pub struct RefStore<E> {
    objects: ObjectStore<E>,
}

impl<E: KvEngine> RefStore<E> {
    pub fn new(objects: ObjectStore<E>) -> Self {
        Self { objects }
    }

    /// The object store holding headers and payloads.
    pub fn objects(&self) -> &ObjectStore<E> {
        &self.objects
    }

    /// Establish a new ref at a genesis header.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the ref is already set.
    pub fn create_ref(&self, namespace: &str, name: &str) -> StoreResult<(Digest, ChainHeader)> {
        validate_names(namespace, name)?;
        let (digest, header) = self
            .objects
            .engine()
            .update(|txn| self.write_genesis(txn, namespace, name))?;
        debug!(namespace, name, digest = %digest.short_hex(), "created ref");
        Ok((digest, header))
    }

    /// Advance a ref to `header`, which must extend the ref's current tip.
    ///
    /// `header.previous` must name a stored header (else
    /// [`StoreError::NotFound`]) and must equal the ref's current digest (else
    /// [`StoreError::Conflict`]). On success `header.height` is set to the
    /// predecessor's height plus one and the new header's digest is returned.
    pub fn set_ref(&self, namespace: &str, name: &str, header: &mut ChainHeader) -> StoreResult<Digest> {
        validate_names(namespace, name)?;
        let (digest, height) = self.objects.engine().update(|txn| {
            let mut staged = header.clone();
            let digest = self.advance(txn, namespace, name, &mut staged)?;
            Ok::<_, StoreError>((digest, staged.height))
        })?;
        header.height = height;
        debug!(namespace, name, height, digest = %digest.short_hex(), "advanced ref");
        Ok(digest)
    }

    /// Resolve a ref to its current header and that header's digest.
    pub fn get_ref(&self, namespace: &str, name: &str) -> StoreResult<(ChainHeader, Digest)> {
        validate_names(namespace, name)?;
        self.objects.engine().view(|txn| {
            let digest = self.read_ref(txn, namespace, name)?;
            let header = self.objects.load(txn, namespace, &digest)?;
            Ok((header, digest))
        })
    }

    /// Resolve a ref and load the payload its tip records, in one read
    /// snapshot. The payload is `None` while the tip is a genesis header.
    pub fn get_ref_payload<T: Object>(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<(ChainHeader, Digest, Option<T>)> {
        validate_names(namespace, name)?;
        self.objects.engine().view(|txn| {
            let digest = self.read_ref(txn, namespace, name)?;
            let header: ChainHeader = self.objects.load(txn, namespace, &digest)?;
            let payload = self.load_payload(txn, namespace, &header)?;
            Ok((header, digest, payload))
        })
    }

    /// Remove the ref pointer. Headers and payloads stay retrievable by
    /// digest. Returns `true` if the ref existed.
    pub fn delete_ref(&self, namespace: &str, name: &str) -> StoreResult<bool> {
        validate_names(namespace, name)?;
        let key = self.objects.keyspace().ref_key(namespace, name);
        let existed = self.objects.engine().update(|txn| -> StoreResult<bool> {
            let existed = txn.contains(&key)?;
            txn.delete(&key)?;
            Ok(existed)
        })?;
        debug!(namespace, name, existed, "deleted ref");
        Ok(existed)
    }

    /// Visit every header of a chain, latest first, ending at genesis.
    ///
    /// The walk runs inside one read snapshot. An error from `visit` stops the
    /// walk and is returned. `visit` must not write to this store.
    pub fn walk_ref_chain<F>(&self, namespace: &str, name: &str, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(&ChainHeader) -> StoreResult<()>,
    {
        validate_names(namespace, name)?;
        self.objects.engine().view(|txn| {
            let tip = self.read_ref(txn, namespace, name)?;
            self.walk_from(txn, namespace, tip, |_, header| visit(header))
        })
    }

    /// Every `(digest, header)` of a chain, latest first.
    pub fn history(&self, namespace: &str, name: &str) -> StoreResult<Vec<(Digest, ChainHeader)>> {
        validate_names(namespace, name)?;
        self.objects.engine().view(|txn| {
            let tip = self.read_ref(txn, namespace, name)?;
            let mut out = Vec::new();
            self.walk_from(txn, namespace, tip, |digest, header| {
                out.push((digest.clone(), header.clone()));
                Ok(())
            })?;
            Ok(out)
        })
    }

    /// Like [`history`](Self::history), with each header's payload loaded
    /// from the same snapshot. Genesis headers carry `None`.
    pub fn history_with_payloads<T: Object>(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Vec<(Digest, ChainHeader, Option<T>)>> {
        validate_names(namespace, name)?;
        self.objects.engine().view(|txn| {
            let tip = self.read_ref(txn, namespace, name)?;
            let mut out = Vec::new();
            self.walk_from(txn, namespace, tip, |digest, header| {
                let payload = self.load_payload(txn, namespace, header)?;
                out.push((digest.clone(), header.clone(), payload));
                Ok(())
            })?;
            Ok(out)
        })
    }

    /// Visit every ref in `namespace` as `(name, digest)`, ordered by name.
    pub fn iter_refs<F>(&self, namespace: &str, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(&str, &Digest) -> StoreResult<()>,
    {
        validate_namespace(namespace)?;
        let prefix = self.objects.keyspace().refs_prefix(namespace);
        self.objects.engine().view(|txn| -> StoreResult<()> {
            let mut failure = None;
            txn.scan_prefix(&prefix, &mut |key, value| {
                let result = match std::str::from_utf8(&key[prefix.len()..]) {
                    Ok(name) => visit(name, &Digest::from_slice(value)),
                    Err(e) => Err(StoreError::Serialization(format!("ref name is not UTF-8: {e}"))),
                };
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

    /// Every namespace holding a ref called `name`, sorted.
    pub fn namespaces_with_ref(&self, name: &str) -> StoreResult<Vec<String>> {
        validate_ref_name(name)?;
        let keys = self.objects.keyspace();
        let root = keys.root();
        let mut out = self.objects.engine().view(|txn| -> StoreResult<Vec<String>> {
            let mut out = Vec::new();
            txn.scan_prefix(&root, &mut |key, _| {
                if let Some(ParsedKey::Ref { namespace, name: found }) = keys.parse(key) {
                    if found == name {
                        out.push(namespace);
                    }
                }
                ControlFlow::Continue(())
            })?;
            Ok(out)
        })?;
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Audit a chain from its tip to genesis and return its length.
    ///
    /// Checks that every header re-hashes to the digest it is stored under,
    /// that heights descend by exactly one, and that the chain ends at a
    /// height-0 header with a zero predecessor.
    pub fn verify_ref_chain(&self, namespace: &str, name: &str) -> StoreResult<u64> {
        validate_names(namespace, name)?;
        self.objects.engine().view(|txn| {
            let tip = self.read_ref(txn, namespace, name)?;
            let mut expected_height: Option<u64> = None;
            let mut length = 0u64;
            self.walk_from(txn, namespace, tip, |digest, header| {
                let corrupt = |reason: String| StoreError::CorruptChain {
                    digest: digest.clone(),
                    reason,
                };
                let computed = self.objects.digest_of(header);
                if computed != *digest {
                    return Err(corrupt(format!("header re-hashes to {}", computed.short_hex())));
                }
                if let Some(expected) = expected_height {
                    if header.height != expected {
                        return Err(corrupt(format!(
                            "height {} follows height {}",
                            header.height,
                            expected + 1
                        )));
                    }
                }
                if header.previous.is_zero() && header.height != 0 {
                    return Err(corrupt(format!("chain ends at height {}", header.height)));
                }
                if !header.previous.is_zero() && header.height == 0 {
                    return Err(corrupt("height 0 header has a predecessor".into()));
                }
                expected_height = header.height.checked_sub(1);
                length += 1;
                Ok(())
            })?;
            Ok(length)
        })
    }

    // -----------------------------------------------------------------------
    // Composite writes: payload, header and ref move in one transaction
    // -----------------------------------------------------------------------

    /// Create a ref and record `payload` as its first version, atomically.
    ///
    /// Produces a two-header chain (genesis, then the payload at height 1)
    /// and returns the tip. Fails with [`StoreError::AlreadyExists`] if the
    /// ref exists; an already-stored payload is reused.
    pub fn create_chain<T: Object>(
        &self,
        namespace: &str,
        name: &str,
        payload: &T,
    ) -> StoreResult<(Digest, ChainHeader)> {
        validate_names(namespace, name)?;
        let (digest, header) = self.objects.engine().update(|txn| {
            let (genesis, _) = self.write_genesis(txn, namespace, name)?;
            let data = self.objects.put_if_absent(txn, namespace, payload)?;
            let mut header = ChainHeader::new(genesis, data);
            let digest = self.advance(txn, namespace, name, &mut header)?;
            Ok::<_, StoreError>((digest, header))
        })?;
        debug!(namespace, name, digest = %digest.short_hex(), "created chain");
        Ok((digest, header))
    }

    /// Record `payload` as the next version after `expected`, atomically.
    ///
    /// Fails with [`StoreError::Conflict`] if the ref no longer points at
    /// `expected`.
    pub fn append<T: Object>(
        &self,
        namespace: &str,
        name: &str,
        expected: &Digest,
        payload: &T,
    ) -> StoreResult<(Digest, ChainHeader)> {
        validate_names(namespace, name)?;
        let (digest, header) = self.objects.engine().update(|txn| {
            let data = self.objects.put_if_absent(txn, namespace, payload)?;
            let mut header = ChainHeader::new(expected.clone(), data);
            let digest = self.advance(txn, namespace, name, &mut header)?;
            Ok::<_, StoreError>((digest, header))
        })?;
        debug!(namespace, name, height = header.height, digest = %digest.short_hex(), "appended version");
        Ok((digest, header))
    }

    // -----------------------------------------------------------------------
    // Transaction-scoped primitives
    // -----------------------------------------------------------------------

    fn read_ref<R>(&self, txn: &R, namespace: &str, name: &str) -> StoreResult<Digest>
    where
        R: KvRead + ?Sized,
    {
        let key = self.objects.keyspace().ref_key(namespace, name);
        txn.get(&key)?
            .map(Digest::from_vec)
            .ok_or_else(|| StoreError::NotFound(Entry::reference(namespace, name)))
    }

    fn load_payload<T, R>(&self, txn: &R, namespace: &str, header: &ChainHeader) -> StoreResult<Option<T>>
    where
        T: Object,
        R: KvRead + ?Sized,
    {
        if header.is_genesis() {
            return Ok(None);
        }
        self.objects.load(txn, namespace, &header.data_digest).map(Some)
    }

    fn write_genesis<W>(&self, txn: &mut W, namespace: &str, name: &str) -> StoreResult<(Digest, ChainHeader)>
    where
        W: KvWrite + ?Sized,
    {
        let ref_key = self.objects.keyspace().ref_key(namespace, name);
        if txn.contains(&ref_key)? {
            return Err(StoreError::AlreadyExists(Entry::reference(namespace, name)));
        }
        let header = ChainHeader::genesis(self.objects.zero_digest());
        let digest = self.objects.put(txn, namespace, &header)?;
        txn.set(&ref_key, digest.as_bytes())?;
        Ok((digest, header))
    }

    fn advance<W>(&self, txn: &mut W, namespace: &str, name: &str, header: &mut ChainHeader) -> StoreResult<Digest>
    where
        W: KvWrite + ?Sized,
    {
        let previous: ChainHeader = self.objects.load(&*txn, namespace, &header.previous)?;
        let current = self.read_ref(&*txn, namespace, name)?;
        if current != header.previous {
            warn!(
                namespace,
                name,
                expected = %header.previous.short_hex(),
                actual = %current.short_hex(),
                "ref moved, rejecting stale update"
            );
            return Err(StoreError::Conflict {
                namespace: namespace.to_string(),
                name: name.to_string(),
                expected: header.previous.clone(),
                actual: current,
            });
        }
        header.height = previous.height + 1;
        let digest = self.objects.put(txn, namespace, header)?;
        let ref_key = self.objects.keyspace().ref_key(namespace, name);
        txn.set(&ref_key, digest.as_bytes())?;
        Ok(digest)
    }

    /// Walk from `digest` towards genesis, handing each header and its digest
    /// to `visit`. Stops at the zero digest.
    fn walk_from<R, F>(&self, txn: &R, namespace: &str, tip: Digest, mut visit: F) -> StoreResult<()>
    where
        R: KvRead + ?Sized,
        F: FnMut(&Digest, &ChainHeader) -> StoreResult<()>,
    {
        let mut digest = tip;
        let mut remaining: Option<u64> = None;
        while !digest.is_zero() {
            let header: ChainHeader = self.objects.load(txn, namespace, &digest)?;
            // Heights strictly descend, so a chain can never be longer than its
            // tip height. Anything else is a loop in tampered data.
            match remaining {
                None => remaining = Some(header.height),
                Some(0) => {
                    return Err(StoreError::CorruptChain {
                        digest,
                        reason: "chain continues past height 0".into(),
                    })
                }
                Some(n) => remaining = Some(n - 1),
            }
            visit(&digest, &header)?;
            digest = header.previous;
        }
        Ok(())
    }
}

fn validate_names(namespace: &str, name: &str) -> StoreResult<()> {
    validate_namespace(namespace)?;
    validate_ref_name(name)
}

impl<E> std::fmt::Debug for RefStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefStore")
            .field("objects", &self.objects)
            .finish()
    }
}
