//! The cloud: a deduplicating record store with a local cache
//!
//! A [`Cloud`] lives on one rank. It writes values into the universe-wide
//! [`RecordContainer`] and hands back a [`Recordlist`] naming the records.
//! Any world of the same universe can turn that recordlist back into the
//! value, fetching each record at most once per cache lifetime.
//!
//! ```
//! use archive_cloud::{Cloud, LocalUniverse};
//!
//! let universe = LocalUniverse::new(2);
//! let container = universe.container();
//!
//! universe.run(|world| {
//!     let mut cloud = Cloud::new(container.clone());
//!     let records = cloud.store(&world, &(42i64, "answer".to_string())).unwrap();
//!
//!     let sub = world.split(2).unwrap();
//!     let (n, text): (i64, String) = cloud.load(&sub, &records).unwrap();
//!     assert_eq!((n, text.as_str()), (42, "answer"));
//! });
//! ```

use crate::core::archive::{
    to_bytes, ContainerRecordInputArchive, ContainerRecordOutputArchive, OutputArchive,
};
use crate::core::cache::{Cacheable, RecordCache};
use crate::core::config::CloudConfig;
use crate::core::container::{RecordContainer, RecordId};
use crate::core::error::{CloudError, Result};
use crate::core::objects::ObjectRef;
use crate::core::recordlist::Recordlist;
use crate::core::tensor::Tensor;
use crate::core::world::World;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cloud counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudStats {
    /// Loads answered from the cache
    pub cache_hits: u64,
    /// Loads that had to read the container
    pub cache_misses: u64,
    /// Stores skipped because the record was already present
    pub cache_stores: u64,
    pub container_reads: u64,
    pub container_writes: u64,
    pub store_seconds: f64,
    pub load_seconds: f64,
}

/// Values the cloud can store and load
///
/// Single-record types go through [`Cloud::store_record`] and
/// [`Cloud::load_record`]; composites concatenate the recordlists of their
/// parts in order.
pub trait CloudStorable: Sized {
    fn store_into(&self, cloud: &mut Cloud, world: &dyn World) -> Result<Recordlist>;

    fn load_from(cloud: &mut Cloud, world: &dyn World, records: &mut Recordlist) -> Result<Self>;
}

macro_rules! single_record {
    ($($ty:ty),*) => {$(
        impl CloudStorable for $ty {
            fn store_into(&self, cloud: &mut Cloud, world: &dyn World) -> Result<Recordlist> {
                cloud.store_record(world, self)
            }

            fn load_from(
                cloud: &mut Cloud,
                world: &dyn World,
                records: &mut Recordlist,
            ) -> Result<Self> {
                cloud.load_record(world, records)
            }
        }
    )*};
}

single_record!(usize, i32, i64, f64, String, Vec<f64>, Tensor<f64>);

impl<T: Any + Send + Sync> CloudStorable for ObjectRef<T> {
    fn store_into(&self, cloud: &mut Cloud, world: &dyn World) -> Result<Recordlist> {
        cloud.store_record(world, self)
    }

    fn load_from(cloud: &mut Cloud, world: &dyn World, records: &mut Recordlist) -> Result<Self> {
        cloud.load_record(world, records)
    }
}

/// A length record followed by one record per handle
impl<T: Any + Send + Sync> CloudStorable for Vec<ObjectRef<T>> {
    fn store_into(&self, cloud: &mut Cloud, world: &dyn World) -> Result<Recordlist> {
        if cloud.config.debug {
            debug!(
                "Storing {} handles of {}",
                self.len(),
                std::any::type_name::<T>()
            );
        }
        let mut records = cloud.store_record(world, &self.len())?;
        for handle in self {
            records.append(cloud.store_record(world, handle)?);
        }
        Ok(records)
    }

    fn load_from(cloud: &mut Cloud, world: &dyn World, records: &mut Recordlist) -> Result<Self> {
        let len: usize = cloud.load_record(world, records)?;
        let mut handles = Vec::with_capacity(len.min(records.len()));
        for _ in 0..len {
            handles.push(cloud.load_record(world, records)?);
        }
        Ok(handles)
    }
}

macro_rules! tuple_storable {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: CloudStorable),+> CloudStorable for ($($name,)+) {
            fn store_into(&self, cloud: &mut Cloud, world: &dyn World) -> Result<Recordlist> {
                let mut records = Recordlist::new();
                $( records.append(self.$idx.store_into(cloud, world)?); )+
                Ok(records)
            }

            fn load_from(
                cloud: &mut Cloud,
                world: &dyn World,
                records: &mut Recordlist,
            ) -> Result<Self> {
                Ok(($( $name::load_from(cloud, world, records)?, )+))
            }
        }
    };
}

tuple_storable!(T0 0);
tuple_storable!(T0 0, T1 1);
tuple_storable!(T0 0, T1 1, T2 2);
tuple_storable!(T0 0, T1 1, T2 2, T3 3);
tuple_storable!(T0 0, T1 1, T2 2, T3 3, T4 4);
tuple_storable!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);
tuple_storable!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6);
tuple_storable!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7);

/// One rank's view of the record store
///
/// The cache and the presence set belong to this instance alone. Clear them
/// with [`clear_cache`](Self::clear_cache) before the world they were filled
/// in changes membership.
pub struct Cloud {
    container: Arc<dyn RecordContainer>,
    config: CloudConfig,
    cache: RecordCache,
    present: AHashSet<RecordId>,
    stats: CloudStats,
    store_time: Duration,
    load_time: Duration,
}

impl Cloud {
    /// Cloud over `container` with the default configuration
    pub fn new(container: Arc<dyn RecordContainer>) -> Self {
        let config = CloudConfig::default();
        Cloud {
            container,
            cache: RecordCache::new(config.cache_capacity),
            config,
            present: AHashSet::new(),
            stats: CloudStats::default(),
            store_time: Duration::ZERO,
            load_time: Duration::ZERO,
        }
    }

    pub fn with_config(container: Arc<dyn RecordContainer>, config: CloudConfig) -> Result<Self> {
        config.validate()?;
        let mut cloud = Self::new(container);
        cloud.cache = RecordCache::new(config.cache_capacity);
        cloud.config = config;
        Ok(cloud)
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    pub fn set_debug(&mut self, value: bool) {
        self.config.debug = value;
    }

    pub fn set_fence(&mut self, value: bool) {
        self.config.fence = value;
    }

    pub fn set_force_load_from_cache(&mut self, value: bool) {
        self.config.force_load_from_cache = value;
    }

    pub fn container(&self) -> &Arc<dyn RecordContainer> {
        &self.container
    }

    /// Store `value`, returning the records that reconstruct it
    ///
    /// # Errors
    ///
    /// Container and compression faults are propagated unchanged.
    pub fn store<T: CloudStorable>(&mut self, world: &dyn World, value: &T) -> Result<Recordlist> {
        let start = Instant::now();
        let records = value.store_into(self, world);
        if self.config.fence {
            world.fence();
        }
        self.store_time += start.elapsed();
        records
    }

    /// Rebuild a value from the records a matching `store` returned
    ///
    /// # Errors
    ///
    /// `RecordlistExhausted` if `records` is too short for `T`,
    /// `RecordlistMismatch` if records are left over, `CacheMissForced` in
    /// forced-cache mode, plus any container or decoding fault.
    pub fn load<T: CloudStorable>(&mut self, world: &dyn World, records: &Recordlist) -> Result<T> {
        let start = Instant::now();
        let mut remaining = records.clone();
        let loaded = T::load_from(self, world, &mut remaining);
        self.load_time += start.elapsed();

        let value = loaded?;
        if !remaining.is_empty() {
            return Err(CloudError::RecordlistMismatch {
                type_name: std::any::type_name::<T>(),
                unconsumed: remaining.len(),
            });
        }
        Ok(value)
    }

    /// Store one value as one record
    ///
    /// Rank 0 writes the record; every rank remembers it as present, so a
    /// second store of an equal value is skipped.
    pub fn store_record<T: Cacheable>(&mut self, world: &dyn World, value: &T) -> Result<Recordlist> {
        let encoded = to_bytes(value)?;
        let record = value.record_for(&encoded);

        if self.present.contains(&record) {
            self.stats.cache_stores += 1;
            if self.config.debug {
                debug!(
                    "Skipping store of {} to record {} (already present)",
                    std::any::type_name::<T>(),
                    record
                );
            }
            return Ok(Recordlist::from(record));
        }

        if self.config.debug {
            debug!(
                "Storing {} to record {} from {}",
                std::any::type_name::<T>(),
                record,
                world.id()
            );
        }

        if world.rank() == 0 {
            let compression = self.config.compression_config();
            let mut ar =
                ContainerRecordOutputArchive::new(self.container.as_ref(), record, &compression);
            ar.store_bytes(&encoded)?;
            if ar.close()? {
                self.stats.container_writes += 1;
            }
        }

        self.present.insert(record);
        Ok(Recordlist::from(record))
    }

    /// Load the record at the front of `records` as a `T`
    pub fn load_record<T: Cacheable>(
        &mut self,
        world: &dyn World,
        records: &mut Recordlist,
    ) -> Result<T> {
        let record = records
            .pop_front()
            .ok_or(CloudError::RecordlistExhausted(std::any::type_name::<T>()))?;

        if let Some(cached) = self.cache.get(&record) {
            self.stats.cache_hits += 1;
            if self.config.debug {
                debug!(
                    "Loading {} from cache record {} to {}",
                    std::any::type_name::<T>(),
                    record,
                    world.id()
                );
            }
            return T::from_cached(cached).ok_or_else(|| CloudError::CacheTypeMismatch {
                record: record.to_string(),
                expected: T::KIND,
                found: cached.kind(),
            });
        }

        if self.config.force_load_from_cache {
            return Err(CloudError::CacheMissForced {
                record: record.to_string(),
            });
        }

        self.stats.cache_misses += 1;
        if self.config.debug {
            debug!(
                "Loading {} from container record {} to {}",
                std::any::type_name::<T>(),
                record,
                world.id()
            );
        }

        let mut target = T::allocate(world);
        let mut ar = ContainerRecordInputArchive::open(
            self.container.as_ref(),
            record,
            Some(world),
            self.config.verify_checksums,
        )?;
        self.stats.container_reads += 1;
        ar.load(&mut target)?;

        self.cache.put(record, target.to_cached());
        self.present.insert(record);
        Ok(target)
    }

    pub fn is_cached(&self, record: RecordId) -> bool {
        self.cache.contains(&record)
    }

    /// True if this cloud knows `record` exists in the container
    pub fn is_present(&self, record: RecordId) -> bool {
        self.present.contains(&record)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Local counters and timings of this rank
    pub fn stats(&self) -> CloudStats {
        CloudStats {
            store_seconds: self.store_time.as_secs_f64(),
            load_seconds: self.load_time.as_secs_f64(),
            ..self.stats
        }
    }

    /// Drop the cache, the presence set and the cache counters. Collective.
    pub fn clear_cache(&mut self, world: &dyn World) {
        self.cache.clear();
        self.present.clear();
        self.stats.cache_hits = 0;
        self.stats.cache_misses = 0;
        self.stats.cache_stores = 0;
        world.fence();
    }

    /// Reset all counters and timings, keeping cached data
    pub fn clear_timings(&mut self) {
        self.stats = CloudStats::default();
        self.store_time = Duration::ZERO;
        self.load_time = Duration::ZERO;
    }

    /// Sum the statistics over `world` and log them on rank 0. Collective.
    pub fn report(&self, world: &dyn World) -> CloudStats {
        let local = self.stats();
        let total = CloudStats {
            cache_hits: world.sum(local.cache_hits as f64) as u64,
            cache_misses: world.sum(local.cache_misses as f64) as u64,
            cache_stores: world.sum(local.cache_stores as f64) as u64,
            container_reads: world.sum(local.container_reads as f64) as u64,
            container_writes: world.sum(local.container_writes as f64) as u64,
            store_seconds: world.sum(local.store_seconds),
            load_seconds: world.sum(local.load_seconds),
        };

        if world.rank() == 0 {
            info!("cloud storing time     {:.3}s", total.store_seconds);
            info!("cloud reading time     {:.3}s", total.load_seconds);
            info!("cloud cache stores     {}", total.cache_stores);
            info!("cloud cache loads      {}", total.cache_hits);
            info!("cloud container reads  {}", total.container_reads);
            info!("cloud container writes {}", total.container_writes);
        }
        total
    }
}
