//! Local cache of deserialized records
//!
//! The cache holds one [`CachedObject`] per record id. `CachedObject` is a
//! closed set of shapes; a new cacheable type gets a variant here and a
//! [`Cacheable`] impl.

use crate::core::archive::Archivable;
use crate::core::container::RecordId;
use crate::core::objects::{ObjectId, ObjectRef};
use crate::core::tensor::Tensor;
use crate::core::world::World;
use lru::LruCache;
use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// A value as it sits in the cache
#[derive(Clone)]
pub enum CachedObject {
    Size(usize),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    DoubleVec(Vec<f64>),
    Tensor(Tensor<f64>),
    /// Handle to a distributed object; `None` for the null handle
    Object {
        id: ObjectId,
        object: Option<Arc<dyn Any + Send + Sync>>,
    },
}

impl CachedObject {
    /// Short name of the shape, as reported in cache type errors
    pub fn kind(&self) -> &'static str {
        match self {
            CachedObject::Size(_) => "size",
            CachedObject::Int(_) => "int",
            CachedObject::Long(_) => "long",
            CachedObject::Double(_) => "double",
            CachedObject::Text(_) => "text",
            CachedObject::DoubleVec(_) => "double-vector",
            CachedObject::Tensor(_) => "tensor",
            CachedObject::Object { .. } => "object",
        }
    }
}

impl fmt::Debug for CachedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachedObject::Size(v) => write!(f, "Size({})", v),
            CachedObject::Int(v) => write!(f, "Int({})", v),
            CachedObject::Long(v) => write!(f, "Long({})", v),
            CachedObject::Double(v) => write!(f, "Double({})", v),
            CachedObject::Text(v) => write!(f, "Text({:?})", v),
            CachedObject::DoubleVec(v) => write!(f, "DoubleVec(len={})", v.len()),
            CachedObject::Tensor(t) => write!(f, "Tensor(dims={:?})", t.dims()),
            CachedObject::Object { id, .. } => write!(f, "Object({})", id),
        }
    }
}

/// A type the cloud can store as a single record and cache
pub trait Cacheable: Archivable + Default {
    /// Must match [`CachedObject::kind`] of the variant the type maps to
    const KIND: &'static str;

    /// Record id of `self`, given its wrapped encoding
    fn record_for(&self, encoded: &[u8]) -> RecordId {
        RecordId::from_content(encoded)
    }

    /// Fresh target to load into on a cache miss
    ///
    /// Override this for types whose empty state depends on the world doing
    /// the load, such as per-rank buffers sized by `world.size()`. Fields set
    /// here and not archived survive the load.
    fn allocate(_world: &dyn World) -> Self {
        Self::default()
    }

    fn to_cached(&self) -> CachedObject;

    fn from_cached(cached: &CachedObject) -> Option<Self>;
}

macro_rules! cacheable {
    ($($ty:ty => $variant:ident, $kind:expr;)*) => {$(
        impl Cacheable for $ty {
            const KIND: &'static str = $kind;

            fn to_cached(&self) -> CachedObject {
                CachedObject::$variant(self.clone())
            }

            fn from_cached(cached: &CachedObject) -> Option<Self> {
                match cached {
                    CachedObject::$variant(value) => Some(value.clone()),
                    _ => None,
                }
            }
        }
    )*};
}

cacheable! {
    usize => Size, "size";
    i32 => Int, "int";
    i64 => Long, "long";
    f64 => Double, "double";
    String => Text, "text";
    Vec<f64> => DoubleVec, "double-vector";
    Tensor<f64> => Tensor, "tensor";
}

/// Handles are keyed by identity, so an unchanged object is never rewritten
impl<T: Any + Send + Sync> Cacheable for ObjectRef<T> {
    const KIND: &'static str = "object";

    fn record_for(&self, _encoded: &[u8]) -> RecordId {
        self.id().record()
    }

    fn to_cached(&self) -> CachedObject {
        CachedObject::Object {
            id: self.id(),
            object: self
                .arc()
                .map(|object| Arc::clone(object) as Arc<dyn Any + Send + Sync>),
        }
    }

    fn from_cached(cached: &CachedObject) -> Option<Self> {
        match cached {
            CachedObject::Object { object: None, .. } => Some(ObjectRef::default()),
            CachedObject::Object {
                id,
                object: Some(object),
            } => Arc::clone(object)
                .downcast::<T>()
                .ok()
                .map(|object| ObjectRef::from_parts(*id, object)),
            _ => None,
        }
    }
}

/// Record id → cached object, optionally bounded with LRU eviction
pub struct RecordCache {
    cache: LruCache<RecordId, CachedObject>,
}

impl RecordCache {
    /// `None` gives an unbounded cache
    pub fn new(capacity: Option<usize>) -> Self {
        let cache = match capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        RecordCache { cache }
    }

    /// Look up `record`, marking it most recently used
    pub fn get(&mut self, record: &RecordId) -> Option<&CachedObject> {
        self.cache.get(record)
    }

    pub fn contains(&self, record: &RecordId) -> bool {
        self.cache.contains(record)
    }

    /// Insert or replace; the newest value for a record wins
    pub fn put(&mut self, record: RecordId, object: CachedObject) {
        self.cache.put(record, object);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
