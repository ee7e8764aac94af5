//! Execution contexts
//!
//! A [`World`] is a group of cooperating ranks that can fence, reduce and
//! broadcast collectively and that share a registry of distributed objects.
//! The cloud only talks to this trait, so a message-passing backend can
//! stand in for the in-process model below.
//!
//! The in-process model runs each rank on its own scoped thread
//! ([`LocalUniverse::run`]). Ranks share nothing but the collective state of
//! their group and the universe-wide object registry.

use crate::core::container::{RecordContainer, ShardedContainer};
use crate::core::error::{CloudError, Result};
use crate::core::objects::ObjectRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use tracing::debug;

/// Universe-unique name of an execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub u64);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world#{}", self.0)
    }
}

/// One rank's handle on its execution context
///
/// `fence`, `sum` and `broadcast` are collective: every rank of the world
/// must call them in the same order.
pub trait World {
    fn id(&self) -> WorldId;

    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Collective barrier
    fn fence(&self);

    /// Sum `value` over all ranks; every rank gets the total
    fn sum(&self, value: f64) -> f64;

    /// Every rank gets the value passed by `root`
    fn broadcast(&self, value: u64, root: usize) -> u64;

    /// Registry resolving distributed object handles
    fn objects(&self) -> &ObjectRegistry;
}

/// Universe-wide state shared by every world of a universe
#[derive(Default)]
struct UniverseShared {
    objects: ObjectRegistry,
    next_world: AtomicU64,
}

impl UniverseShared {
    fn next_world_id(&self) -> WorldId {
        WorldId(self.next_world.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Collective state of one world
struct Group {
    id: WorldId,
    size: usize,
    barrier: Barrier,
    accumulator: Mutex<f64>,
    broadcast: Mutex<u64>,
    split: Mutex<Option<Arc<Vec<Arc<Group>>>>>,
}

impl Group {
    fn new(id: WorldId, size: usize) -> Self {
        Group {
            id,
            size,
            barrier: Barrier::new(size),
            accumulator: Mutex::new(0.0),
            broadcast: Mutex::new(0),
            split: Mutex::new(None),
        }
    }
}

/// In-process world: one thread per rank
pub struct ThreadWorld {
    rank: usize,
    group: Arc<Group>,
    universe: Arc<UniverseShared>,
}

impl ThreadWorld {
    /// A world of one rank with a private universe
    pub fn solo() -> Self {
        ThreadWorld {
            rank: 0,
            group: Arc::new(Group::new(WorldId(0), 1)),
            universe: Arc::new(UniverseShared::default()),
        }
    }

    /// Partition the ranks round-robin into `groups` sub-worlds
    ///
    /// Rank `r` joins sub-world `r % groups` as rank `r / groups`. The
    /// sub-worlds share this world's universe, and with it the object
    /// registry. Collective.
    pub fn split(&self, groups: usize) -> Result<ThreadWorld> {
        let size = self.group.size;
        if groups == 0 || groups > size {
            return Err(CloudError::Config(format!(
                "cannot split a world of {} ranks into {} groups",
                size, groups
            )));
        }

        let subgroups = {
            let mut slot = self.group.split.lock();
            Arc::clone(slot.get_or_insert_with(|| {
                let created: Vec<Arc<Group>> = (0..groups)
                    .map(|color| {
                        let members = (size - color + groups - 1) / groups;
                        Arc::new(Group::new(self.universe.next_world_id(), members))
                    })
                    .collect();
                Arc::new(created)
            }))
        };

        if self.group.barrier.wait().is_leader() {
            *self.group.split.lock() = None;
        }
        self.group.barrier.wait();

        let color = self.rank % groups;
        let group = Arc::clone(&subgroups[color]);
        debug!(
            "Rank {} of {} joins {} as rank {} of {}",
            self.rank,
            self.group.id,
            group.id,
            self.rank / groups,
            group.size
        );

        Ok(ThreadWorld {
            rank: self.rank / groups,
            group,
            universe: Arc::clone(&self.universe),
        })
    }
}

impl World for ThreadWorld {
    fn id(&self) -> WorldId {
        self.group.id
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn fence(&self) {
        self.group.barrier.wait();
    }

    fn sum(&self, value: f64) -> f64 {
        *self.group.accumulator.lock() += value;
        self.group.barrier.wait();

        let total = *self.group.accumulator.lock();
        if self.group.barrier.wait().is_leader() {
            *self.group.accumulator.lock() = 0.0;
        }
        self.group.barrier.wait();
        total
    }

    fn broadcast(&self, value: u64, root: usize) -> u64 {
        if self.rank == root {
            *self.group.broadcast.lock() = value;
        }
        self.group.barrier.wait();

        let received = *self.group.broadcast.lock();
        self.group.barrier.wait();
        received
    }

    fn objects(&self) -> &ObjectRegistry {
        &self.universe.objects
    }
}

impl fmt::Debug for ThreadWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadWorld")
            .field("id", &self.group.id)
            .field("rank", &self.rank)
            .field("size", &self.group.size)
            .finish()
    }
}

/// A universe of ranks running as scoped threads around one container
pub struct LocalUniverse {
    size: usize,
    container: Arc<dyn RecordContainer>,
    shared: Arc<UniverseShared>,
}

impl LocalUniverse {
    /// Universe of `size` ranks backed by a fresh [`ShardedContainer`]
    pub fn new(size: usize) -> Self {
        Self::with_container(size, Arc::new(ShardedContainer::default()))
    }

    pub fn with_container(size: usize, container: Arc<dyn RecordContainer>) -> Self {
        LocalUniverse {
            size: size.max(1),
            container,
            shared: Arc::new(UniverseShared::default()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The universe-wide record container
    pub fn container(&self) -> Arc<dyn RecordContainer> {
        Arc::clone(&self.container)
    }

    /// Run `f` once per rank, each on its own thread, and collect the
    /// results in rank order
    ///
    /// A panic on any rank is resumed on the caller. Ranks waiting in a
    /// collective the panicking rank never reaches stay blocked, so `f`
    /// should report failures through its return value.
    pub fn run<F, R>(&self, f: F) -> Vec<R>
    where
        F: Fn(ThreadWorld) -> R + Sync,
        R: Send,
    {
        let group = Arc::new(Group::new(WorldId(0), self.size));
        let f = &f;

        let joined = crossbeam::scope(|scope| {
            let handles: Vec<_> = (0..self.size)
                .map(|rank| {
                    let world = ThreadWorld {
                        rank,
                        group: Arc::clone(&group),
                        universe: Arc::clone(&self.shared),
                    };
                    scope.spawn(move |_| f(world))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload));

        joined
            .into_iter()
            .map(|result| result.unwrap_or_else(|payload| std::panic::resume_unwind(payload)))
            .collect()
    }
}

impl fmt::Debug for LocalUniverse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalUniverse")
            .field("size", &self.size)
            .field("records", &self.container.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solo_world() {
        let world = ThreadWorld::solo();
        assert_eq!(world.rank(), 0);
        assert_eq!(world.size(), 1);
        assert_eq!(world.sum(2.5), 2.5);
        assert_eq!(world.broadcast(9, 0), 9);
        world.fence();
    }

    #[test]
    fn test_run_returns_in_rank_order() {
        let universe = LocalUniverse::new(4);
        let ranks = universe.run(|world| (world.rank(), world.size()));
        assert_eq!(ranks, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn test_repeated_sums() {
        let universe = LocalUniverse::new(5);
        let totals = universe.run(|world| {
            let first = world.sum(1.0);
            let second = world.sum(world.rank() as f64);
            (first, second)
        });

        for (first, second) in totals {
            assert_eq!(first, 5.0);
            assert_eq!(second, 10.0);
        }
    }

    #[test]
    fn test_broadcast_from_root() {
        let universe = LocalUniverse::new(3);
        let values = universe.run(|world| {
            let a = world.broadcast(100 + world.rank() as u64, 0);
            let b = world.broadcast(200 + world.rank() as u64, 2);
            (a, b)
        });
        assert!(values.iter().all(|&v| v == (100, 202)));
    }

    #[test]
    fn test_split_round_robin() {
        let universe = LocalUniverse::new(5);
        let layout = universe.run(|world| {
            let sub = world.split(2).unwrap();
            let total = sub.sum(1.0);
            (sub.id(), sub.rank(), sub.size(), total)
        });

        // colors 0,1,0,1,0
        assert_eq!(layout[0].1, 0);
        assert_eq!(layout[2].1, 1);
        assert_eq!(layout[4].1, 2);
        assert_eq!(layout[1].1, 0);
        assert_eq!(layout[3].1, 1);

        assert_eq!(layout[0].2, 3);
        assert_eq!(layout[1].2, 2);
        assert_eq!(layout[0].3, 3.0);
        assert_eq!(layout[1].3, 2.0);

        assert_eq!(layout[0].0, layout[2].0);
        assert_ne!(layout[0].0, layout[1].0);
        assert_ne!(layout[0].0, WorldId(0));
    }

    #[test]
    fn test_consecutive_splits_get_fresh_worlds() {
        let universe = LocalUniverse::new(4);
        let ids = universe.run(|world| {
            let a = world.split(2).unwrap().id();
            let b = world.split(2).unwrap().id();
            (a, b)
        });
        assert_ne!(ids[0].0, ids[0].1);
        assert_eq!(ids[0], ids[2]);
    }

    #[test]
    fn test_invalid_split() {
        let world = ThreadWorld::solo();
        assert!(matches!(world.split(0), Err(CloudError::Config(_))));
        assert!(matches!(world.split(2), Err(CloudError::Config(_))));
    }
}
