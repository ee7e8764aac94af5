//! # archive-cloud - Typed Archives and a Deduplicating Record Store
//!
//! `archive-cloud` moves computed objects between execution contexts:
//!
//! - **Archives**: a cookie-tagged wire format with static dispatch. Every
//!   value is written behind a one-byte type cookie that is checked on load.
//!   Trivially codable data moves in bulk, aggregates recurse, user types
//!   describe their own fields.
//! - **Type registry**: cookie → type name table plus named callables,
//!   populated once at startup.
//! - **Cloud**: a per-rank record store over a universe-wide container.
//!   Stores are deduplicated by content or identity hash, loads are cached so
//!   each record is fetched at most once.
//!
//! ## Quick Start
//!
//! ```rust
//! use archive_cloud::{from_bytes, to_bytes, Result};
//!
//! # fn main() -> Result<()> {
//! let bytes = to_bytes(&vec![1.0f64, 2.0, 3.0])?;
//! let back: Vec<f64> = from_bytes(&bytes)?;
//! assert_eq!(back, vec![1.0, 2.0, 3.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Moving values between worlds
//!
//! ```rust
//! use archive_cloud::{Cloud, LocalUniverse, Result};
//!
//! # fn main() -> Result<()> {
//! let universe = LocalUniverse::new(4);
//! let container = universe.container();
//!
//! let results = universe.run(|world| -> Result<f64> {
//!     let mut cloud = Cloud::new(container.clone());
//!     let records = cloud.store(&world, &vec![0.5f64; 8])?;
//!
//!     // two sub-worlds of two ranks each
//!     let sub = world.split(2)?;
//!     let values: Vec<f64> = cloud.load(&sub, &records)?;
//!     Ok(values.iter().sum())
//! });
//!
//! for sum in results {
//!     assert_eq!(sum?, 4.0);
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    archive::{
        from_bytes, load_from_bytes, load_value, to_bytes, wrap_load, wrap_store, Archivable,
        BufferInputArchive, BufferOutputArchive, ContainerRecordInputArchive,
        ContainerRecordOutputArchive, FileInputArchive, FileOutputArchive, InputArchive,
        OutputArchive, SelfDescribing, Sequence, TriviallyCodable, Tuple,
    },
    cache::{CachedObject, Cacheable},
    callable::NamedFn,
    cloud::{Cloud, CloudStats, CloudStorable},
    compression::{CompressionConfig, CompressionMethod},
    config::CloudConfig,
    container::{ContainerStats, RecordContainer, RecordId, ShardedContainer},
    error::{CloudError, Result},
    objects::{ObjectId, ObjectRef, ObjectRegistry},
    recordlist::Recordlist,
    registry::{initialize_with, registry, RegistryBuilder, TypeRegistry},
    tensor::{Tensor, TensorElement},
    world::{LocalUniverse, ThreadWorld, World, WorldId},
};
pub use num_complex::Complex;
