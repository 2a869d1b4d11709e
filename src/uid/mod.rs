//! Name ↔ UID resolution.
//!
//! Each resolver owns one UID kind and maps human-readable names to
//! fixed-width big-endian identifiers stored in the UID table. Mappings are
//! written in both directions: the forward cell lives at
//! (name row, family `id`, qualifier = kind token) and the reverse cell at
//! (UID row, family `name`, qualifier = kind token). The per-kind allocation
//! counter is kept under the one-zero-byte row in the `id` family.
//!
//! Resolved mappings are cached in both directions; a UID, once assigned, is
//! never reused, so cached entries never go stale.

use crate::core::{Result, Uid, UidKind, WindrowError};
use crate::storage::StorageBackend;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Column family of forward (name → UID) cells and the allocation counter.
const FAMILY_ID: &[u8] = b"id";

/// Column family of reverse (UID → name) cells.
const FAMILY_NAME: &[u8] = b"name";

/// Row key under which the per-kind allocation counters live.
const MAXID_ROW: &[u8] = &[0];

/// Default number of results returned by suggest.
pub const DEFAULT_SUGGEST_LIMIT: usize = 25;

/// Resolver for one UID kind.
pub struct UidResolver {
    kind: UidKind,
    width: usize,
    table: String,
    store: Arc<dyn StorageBackend>,
    name_cache: DashMap<String, Uid>,
    id_cache: DashMap<Uid, String>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Serializes allocation so concurrent creators of one name converge
    /// on a single UID.
    alloc_lock: Mutex<()>,
}

impl UidResolver {
    /// Creates a resolver for `kind` with UIDs of `width` bytes, backed by
    /// the given UID table.
    pub fn new(kind: UidKind, width: usize, table: String, store: Arc<dyn StorageBackend>) -> Self {
        Self {
            kind,
            width,
            table,
            store,
            name_cache: DashMap::new(),
            id_cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            alloc_lock: Mutex::new(()),
        }
    }

    /// The kind this resolver serves.
    pub fn kind(&self) -> UidKind {
        self.kind
    }

    /// The configured UID width in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Resolves a name to its UID, failing with `NameNotFound` if absent.
    pub async fn id(&self, name: &str) -> Result<Uid> {
        if let Some(uid) = self.name_cache.get(name) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(uid.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.id_from_store(name).await? {
            Some(uid) => {
                self.cache(name.to_string(), uid.clone());
                Ok(uid)
            },
            None => Err(WindrowError::NameNotFound {
                kind: self.kind,
                name: name.to_string(),
            }),
        }
    }

    /// Forward lookup straight from the store, bypassing cache and counters.
    async fn id_from_store(&self, name: &str) -> Result<Option<Uid>> {
        let cells = self.store.get(&self.table, name.as_bytes()).await?;
        let token = self.kind.token().as_bytes();
        Ok(cells
            .iter()
            .find(|cell| cell.family == FAMILY_ID && cell.qualifier == token)
            .map(|cell| Uid::from_bytes(cell.value.to_vec())))
    }

    /// Resolves a UID to its name, failing with `UidNotFound` if absent.
    pub async fn name(&self, uid: &Uid) -> Result<String> {
        if let Some(name) = self.id_cache.get(uid) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(name.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let cells = self.store.get(&self.table, uid.as_bytes()).await?;
        let token = self.kind.token().as_bytes();
        let name = cells
            .iter()
            .find(|cell| cell.family == FAMILY_NAME && cell.qualifier == token)
            .map(|cell| String::from_utf8(cell.value.to_vec()))
            .transpose()
            .map_err(|_| WindrowError::storage("invalid UTF-8 in UID name cell"))?;
        match name {
            Some(name) => {
                self.cache(name.clone(), uid.clone());
                Ok(name)
            },
            None => Err(WindrowError::UidNotFound {
                kind: self.kind,
                uid: uid.to_string(),
            }),
        }
    }

    /// Resolves a name, allocating a new UID if the name is not yet assigned.
    ///
    /// Safe under concurrent calls for the same name: allocation runs under
    /// the resolver's allocation lock with a post-lock re-check, so at most
    /// one UID is ever created per name.
    pub async fn get_or_create(&self, name: &str) -> Result<Uid> {
        match self.id(name).await {
            Ok(uid) => Ok(uid),
            Err(WindrowError::NameNotFound { .. }) => self.allocate(name).await,
            Err(e) => Err(e),
        }
    }

    async fn allocate(&self, name: &str) -> Result<Uid> {
        let _guard = self.alloc_lock.lock().await;

        // Another creator may have won the race while we waited for the lock.
        if let Some(uid) = self.id_from_store(name).await? {
            self.cache(name.to_string(), uid.clone());
            return Ok(uid);
        }

        let token = self.kind.token().as_bytes();
        let cells = self.store.get(&self.table, MAXID_ROW).await?;
        let max = cells
            .iter()
            .find(|cell| cell.family == FAMILY_ID && cell.qualifier == token)
            .map(|cell| {
                let mut buf = [0u8; 8];
                let len = cell.value.len().min(8);
                buf[8 - len..].copy_from_slice(&cell.value[cell.value.len() - len..]);
                u64::from_be_bytes(buf)
            })
            .unwrap_or(0);
        let next = max + 1;
        let uid = Uid::from_u64(next, self.width).ok_or(WindrowError::UidExhausted {
            kind: self.kind,
            width: self.width,
        })?;

        self.store
            .put(
                &self.table,
                MAXID_ROW,
                FAMILY_ID,
                token,
                Bytes::copy_from_slice(&next.to_be_bytes()),
            )
            .await?;
        // Reverse mapping goes first: a crash between the two writes leaves
        // an unreferenced UID rather than a name resolving to nothing.
        self.store
            .put(
                &self.table,
                uid.as_bytes(),
                FAMILY_NAME,
                token,
                Bytes::copy_from_slice(name.as_bytes()),
            )
            .await?;
        self.store
            .put(
                &self.table,
                name.as_bytes(),
                FAMILY_ID,
                token,
                Bytes::copy_from_slice(uid.as_bytes()),
            )
            .await?;

        debug!(kind = %self.kind, name, uid = %uid, "assigned new UID");
        self.cache(name.to_string(), uid.clone());
        Ok(uid)
    }

    /// Returns up to `max` assigned names starting with `prefix`, in name
    /// order.
    pub async fn suggest(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let rows = self
            .store
            .scan_rows(
                &self.table,
                FAMILY_ID,
                self.kind.token().as_bytes(),
                prefix.as_bytes(),
                max.saturating_add(1),
            )
            .await?;
        let mut names = Vec::with_capacity(rows.len());
        for (row, _) in rows {
            // The allocation counter shares the `id` family; skip its row.
            if row.as_ref() == MAXID_ROW {
                continue;
            }
            if let Ok(name) = String::from_utf8(row.to_vec()) {
                names.push(name);
            }
            if names.len() == max {
                break;
            }
        }
        Ok(names)
    }

    /// Discards both cache directions. Counters are preserved.
    pub fn drop_caches(&self) {
        self.name_cache.clear();
        self.id_cache.clear();
    }

    /// Number of lookups served from the cache.
    pub fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that had to consult the store.
    pub fn cache_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of resident cache entries across both directions.
    pub fn cache_size(&self) -> usize {
        self.name_cache.len() + self.id_cache.len()
    }

    fn cache(&self, name: String, uid: Uid) {
        self.id_cache.insert(uid.clone(), name.clone());
        self.name_cache.insert(name, uid);
    }
}
