//! Distributed objects
//!
//! A distributed object is created collectively and known to every rank by
//! its [`ObjectId`]. [`ObjectRef`] is the shared handle; on the wire it is
//! just the id, and loading it looks the object up in the
//! [`ObjectRegistry`] of the world bound to the input archive.

use crate::core::archive::{wrap_load, wrap_store, Archivable, InputArchive, OutputArchive};
use crate::core::container::RecordId;
use crate::core::error::{CloudError, Result};
use crate::core::registry::OBJECT_REF_COOKIE;
use crate::core::world::{World, WorldId};
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable identity of a distributed object; serial 0 is the null handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ObjectId {
    pub world: WorldId,
    pub serial: u64,
}

impl ObjectId {
    pub const NULL: ObjectId = ObjectId {
        world: WorldId(0),
        serial: 0,
    };

    pub fn is_null(&self) -> bool {
        self.serial == 0
    }

    /// Record id derived from this identity
    pub fn record(&self) -> RecordId {
        RecordId::from_identity(self.world.0, self.serial)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.world, self.serial)
    }
}

/// Universe-wide table of live distributed objects
pub struct ObjectRegistry {
    objects: RwLock<AHashMap<ObjectId, Arc<dyn Any + Send + Sync>>>,
    next_serial: AtomicU64,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        ObjectRegistry {
            objects: RwLock::new(AHashMap::new()),
            next_serial: AtomicU64::new(1),
        }
    }
}

impl ObjectRegistry {
    /// Register an object created in `world` under a fresh id
    pub fn register<T: Any + Send + Sync>(&self, world: WorldId, object: Arc<T>) -> ObjectId {
        let id = ObjectId {
            world,
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
        };
        self.objects.write().insert(id, object);
        id
    }

    /// Look up `id` as a `T`
    pub fn get<T: Any + Send + Sync>(&self, id: ObjectId) -> Result<Arc<T>> {
        self.get_any(id)
            .ok_or_else(|| CloudError::UnknownObject(id.to_string()))?
            .downcast::<T>()
            .map_err(|_| CloudError::ObjectTypeMismatch {
                id: id.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn get_any(&self, id: ObjectId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.objects.read().get(&id).cloned()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.read().contains_key(&id)
    }

    pub fn remove(&self, id: ObjectId) -> bool {
        self.objects.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

/// Shared handle to a distributed object
///
/// The default handle is null. Two handles to the same object share one
/// allocation.
pub struct ObjectRef<T> {
    id: ObjectId,
    object: Option<Arc<T>>,
}

impl<T: Any + Send + Sync> ObjectRef<T> {
    /// Create a distributed object collectively
    ///
    /// Rank 0 builds the object with `make` and registers it; the id is
    /// broadcast and every other rank resolves the same allocation.
    pub fn share<F>(world: &dyn World, make: F) -> Result<Self>
    where
        F: FnOnce() -> T,
    {
        let serial = if world.rank() == 0 {
            world.objects().register(world.id(), Arc::new(make())).serial
        } else {
            0
        };
        let serial = world.broadcast(serial, 0);

        Self::resolve(
            world,
            ObjectId {
                world: world.id(),
                serial,
            },
        )
    }

    /// Handle to an already registered object
    pub fn resolve(world: &dyn World, id: ObjectId) -> Result<Self> {
        if id.is_null() {
            return Ok(Self::default());
        }
        let object = world.objects().get::<T>(id)?;
        Ok(ObjectRef {
            id,
            object: Some(object),
        })
    }

    /// Build a handle from parts already resolved, e.g. a cached object
    pub fn from_parts(id: ObjectId, object: Arc<T>) -> Self {
        ObjectRef {
            id,
            object: Some(object),
        }
    }
}

impl<T> ObjectRef<T> {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn is_null(&self) -> bool {
        self.object.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.object.as_deref()
    }

    pub fn arc(&self) -> Option<&Arc<T>> {
        self.object.as_ref()
    }

    /// True if both handles point at the same allocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.object, &other.object) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Default for ObjectRef<T> {
    fn default() -> Self {
        ObjectRef {
            id: ObjectId::NULL,
            object: None,
        }
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        ObjectRef {
            id: self.id,
            object: self.object.clone(),
        }
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Wire format: world id and serial; loading requires a bound world
impl<T: Any + Send + Sync> Archivable for ObjectRef<T> {
    const COOKIE: u8 = OBJECT_REF_COOKIE;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        wrap_store(ar, &self.id.world.0)?;
        wrap_store(ar, &self.id.serial)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let mut world = 0u64;
        let mut serial = 0u64;
        wrap_load(ar, &mut world)?;
        wrap_load(ar, &mut serial)?;

        let id = ObjectId {
            world: WorldId(world),
            serial,
        };
        if id.is_null() {
            *self = Self::default();
            return Ok(());
        }

        let bound = ar.world().ok_or(CloudError::NoWorld)?;
        *self = Self::resolve(bound, id)?;
        Ok(())
    }
}
