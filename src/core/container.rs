//! Distributed record container
//!
//! The container is the universe-wide key/value store the cloud writes
//! records to. It is addressed by [`RecordId`] and stores opaque framed
//! payloads. Anything implementing [`RecordContainer`] can back a cloud;
//! [`ShardedContainer`] is the in-process implementation.

use crate::core::error::Result;
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

/// Seed separating identity-derived ids from content hashes
const IDENTITY_SEED: u64 = 0x6964_656e_7469_7479;

/// Key of one record in the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Content hash of a wrapped encoding
    ///
    /// The encoding starts with the value's cookie, so equal payloads of
    /// different types never share an id.
    pub fn from_content(encoded: &[u8]) -> Self {
        RecordId(xxh3_64(encoded))
    }

    /// Id derived from a stable distributed identity
    pub fn from_identity(world: u64, serial: u64) -> Self {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&world.to_le_bytes());
        key[8..].copy_from_slice(&serial.to_le_bytes());
        RecordId(xxh3_64_with_seed(&key, IDENTITY_SEED))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

/// Container counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub records: u64,
    pub bytes: u64,
    pub writes: u64,
    /// Writes dropped because the record already existed
    pub duplicate_writes: u64,
    pub reads: u64,
    /// Reads of records that do not exist
    pub misses: u64,
}

/// Universe-wide record storage
///
/// Each id is written at most once: a second `put` of an existing id is
/// dropped and reports `false`. Payloads of one id are bit-identical, so
/// which writer wins does not matter.
pub trait RecordContainer: Send + Sync {
    /// Store a framed record, returning whether it was inserted
    fn put(&self, id: RecordId, frame: Vec<u8>) -> Result<bool>;

    /// Fetch a framed record
    fn get(&self, id: RecordId) -> Result<Option<Arc<[u8]>>>;

    fn contains(&self, id: RecordId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> ContainerStats;
}

#[derive(Debug, Default)]
struct Counters {
    writes: AtomicU64,
    duplicate_writes: AtomicU64,
    reads: AtomicU64,
    misses: AtomicU64,
    bytes: AtomicU64,
}

/// In-process container sharded by key
///
/// A record lives in shard `id mod shards`, the shard of its owning rank.
/// Writes are visible to every thread as soon as `put` returns.
pub struct ShardedContainer {
    shards: Vec<RwLock<AHashMap<RecordId, Arc<[u8]>>>>,
    counters: Counters,
}

impl ShardedContainer {
    pub const DEFAULT_SHARDS: usize = 16;

    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        ShardedContainer {
            shards: (0..shards).map(|_| RwLock::new(AHashMap::new())).collect(),
            counters: Counters::default(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard owning `id`
    pub fn owner(&self, id: RecordId) -> usize {
        (id.0 % self.shards.len() as u64) as usize
    }

    /// Records held by each shard
    pub fn shard_sizes(&self) -> Vec<usize> {
        self.shards.iter().map(|shard| shard.read().len()).collect()
    }

    /// Drop every record and reset the counters
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
        self.counters.writes.store(0, Ordering::Relaxed);
        self.counters.duplicate_writes.store(0, Ordering::Relaxed);
        self.counters.reads.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.bytes.store(0, Ordering::Relaxed);
    }
}

impl Default for ShardedContainer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SHARDS)
    }
}

impl RecordContainer for ShardedContainer {
    fn put(&self, id: RecordId, frame: Vec<u8>) -> Result<bool> {
        let mut shard = self.shards[self.owner(id)].write();
        if shard.contains_key(&id) {
            self.counters.duplicate_writes.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        self.counters
            .bytes
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        shard.insert(id, Arc::from(frame));
        Ok(true)
    }

    fn get(&self, id: RecordId) -> Result<Option<Arc<[u8]>>> {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        let found = self.shards[self.owner(id)].read().get(&id).cloned();
        if found.is_none() {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    fn contains(&self, id: RecordId) -> bool {
        self.shards[self.owner(id)].read().contains_key(&id)
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    fn stats(&self) -> ContainerStats {
        ContainerStats {
            records: self.len() as u64,
            bytes: self.counters.bytes.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            duplicate_writes: self.counters.duplicate_writes.load(Ordering::Relaxed),
            reads: self.counters.reads.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }
}
