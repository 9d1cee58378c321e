//! Fixed-capacity particle pool
//!
//! [`ParticleDevice`] is the contract the emission controller drives. The
//! host [`CpuParticlePool`] implements it with the kernels in
//! [`crate::kernels`]; the GPU pool implements it with the same kernels in
//! WGSL.

use crate::config::ParticleConfig;
use crate::free_list::FreeList;
use crate::kernels::{emit_particles, init_particles, SpawnParams};
use crate::particle::Particle;

/// A particle pool living on some compute device
pub trait ParticleDevice {
    /// Number of slots, 0 when torn down
    fn capacity(&self) -> u32;

    /// Invocations per work-group
    fn group_size(&self) -> u32;

    /// Read the free-list size back from the device
    ///
    /// A synchronization point; call at most once per frame. The result is
    /// also cached as the bound for the next [`acquire`](Self::acquire).
    fn query_available_count(&mut self) -> u32;

    /// Spawn up to `requested` particles
    ///
    /// Grants `min(requested, last queried count)` and returns the granted
    /// number. Invocations that find the free-list empty are no-ops.
    fn acquire(&mut self, requested: u32, spawn: &SpawnParams) -> u32;
}

/// Number of work-groups needed for `count` invocations
pub fn dispatch_groups(count: u32, group_size: u32) -> u32 {
    count.div_ceil(group_size)
}

struct PoolStorage {
    particles: Vec<Particle>,
    free_list: FreeList,
}

/// Host reference pool
pub struct CpuParticlePool {
    group_size: u32,
    storage: Option<PoolStorage>,
    available_hint: u32,
    seed: u32,
}

impl CpuParticlePool {
    /// Create an uninitialized pool
    pub fn new(group_size: u32) -> Self {
        assert!(group_size > 0, "group size must be greater than zero");
        Self {
            group_size,
            storage: None,
            available_hint: 0,
            seed: 0,
        }
    }

    /// Create and initialize a pool from a validated config
    pub fn from_config(config: &ParticleConfig) -> Self {
        let mut pool = Self::new(config.group_size);
        pool.init(config.capacity);
        pool
    }

    /// Allocate `capacity` slots and run the Init kernel
    ///
    /// Re-initializing without a teardown drops the old storage first.
    pub fn init(&mut self, capacity: u32) {
        assert!(capacity > 0, "pool capacity must be greater than zero");
        assert!(
            capacity % self.group_size == 0,
            "pool capacity {capacity} is not a multiple of group size {}",
            self.group_size
        );
        if self.storage.is_some() {
            tracing::warn!("particle pool re-initialized without teardown");
        }

        let mut particles = vec![Particle::INACTIVE; capacity as usize];
        let free_list = FreeList::new(capacity);
        init_particles(&mut particles, &free_list);

        self.storage = Some(PoolStorage {
            particles,
            free_list,
        });
        self.available_hint = capacity;
        tracing::info!(
            "particle pool initialized: {} slots, {} groups",
            capacity,
            dispatch_groups(capacity, self.group_size)
        );
    }

    /// Release all storage; safe to call repeatedly
    pub fn teardown(&mut self) {
        if self.storage.take().is_some() {
            tracing::info!("particle pool torn down");
        }
        self.available_hint = 0;
    }

    pub fn is_initialized(&self) -> bool {
        self.storage.is_some()
    }

    /// All slots, empty when torn down
    pub fn particles(&self) -> &[Particle] {
        self.storage
            .as_ref()
            .map_or(&[][..], |storage| storage.particles.as_slice())
    }

    pub fn free_list(&self) -> Option<&FreeList> {
        self.storage.as_ref().map(|storage| &storage.free_list)
    }

    pub fn active_count(&self) -> u32 {
        self.particles().iter().filter(|p| p.is_active()).count() as u32
    }

    /// Cached bound from the last query, lowered by every grant since
    pub fn available_hint(&self) -> u32 {
        self.available_hint
    }

    /// Mutable records and the free-list, for the Update kernel
    pub(crate) fn storage_mut(&mut self) -> Option<(&mut [Particle], &FreeList)> {
        self.storage
            .as_mut()
            .map(|storage| (storage.particles.as_mut_slice(), &storage.free_list))
    }

    /// Whether the free-list holds exactly the inactive slots, once each
    pub fn is_consistent(&self) -> bool {
        let Some(storage) = &self.storage else {
            return true;
        };
        let mut free = storage.free_list.snapshot();
        free.sort_unstable();
        let inactive: Vec<u32> = storage
            .particles
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_active())
            .map(|(index, _)| index as u32)
            .collect();
        free == inactive
    }
}

impl ParticleDevice for CpuParticlePool {
    fn capacity(&self) -> u32 {
        self.particles().len() as u32
    }

    fn group_size(&self) -> u32 {
        self.group_size
    }

    fn query_available_count(&mut self) -> u32 {
        self.available_hint = self.free_list().map_or(0, FreeList::len);
        self.available_hint
    }

    fn acquire(&mut self, requested: u32, spawn: &SpawnParams) -> u32 {
        let granted = requested.min(self.available_hint);
        if granted == 0 {
            return 0;
        }
        let Some(storage) = self.storage.as_mut() else {
            return 0;
        };

        let seed = self.seed;
        self.seed = self.seed.wrapping_add(1);
        tracing::trace!(
            "emit dispatch: {} invocations in {} groups",
            granted,
            dispatch_groups(granted, self.group_size)
        );
        emit_particles(
            &mut storage.particles,
            &storage.free_list,
            granted,
            spawn,
            seed,
        );
        self.available_hint -= granted;
        granted
    }
}

impl std::fmt::Debug for CpuParticlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuParticlePool")
            .field("capacity", &self.capacity())
            .field("group_size", &self.group_size)
            .field("available_hint", &self.available_hint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn config(capacity: u32) -> ParticleConfig {
        ParticleConfig {
            capacity,
            group_size: 4,
            ..Default::default()
        }
    }

    fn spawn(config: &ParticleConfig) -> SpawnParams {
        SpawnParams::from_config(config, Vec3::ZERO, Vec3::Y)
    }

    #[test]
    fn test_dispatch_groups_round_up() {
        assert_eq!(dispatch_groups(0, 64), 0);
        assert_eq!(dispatch_groups(3, 64), 1);
        assert_eq!(dispatch_groups(64, 64), 1);
        assert_eq!(dispatch_groups(65, 64), 2);
    }

    #[test]
    fn test_init_gives_pristine_pool() {
        let mut pool = CpuParticlePool::from_config(&config(8));
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.query_available_count(), 8);
        assert_eq!(pool.active_count(), 0);
        assert!(pool.is_consistent());
    }

    #[test]
    fn test_init_teardown_init() {
        let config = config(8);
        let mut pool = CpuParticlePool::from_config(&config);
        pool.query_available_count();
        pool.acquire(5, &spawn(&config));
        pool.teardown();
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.query_available_count(), 0);
        pool.teardown();

        pool.init(8);
        assert_eq!(pool.query_available_count(), 8);
        assert_eq!(pool.active_count(), 0);
        assert!(pool.is_consistent());
    }

    #[test]
    fn test_reinit_without_teardown_is_pristine() {
        let config = config(8);
        let mut pool = CpuParticlePool::from_config(&config);
        pool.query_available_count();
        pool.acquire(3, &spawn(&config));
        pool.init(8);
        assert_eq!(pool.query_available_count(), 8);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_acquire_bounded_by_query() {
        let config = config(8);
        let mut pool = CpuParticlePool::from_config(&config);
        assert_eq!(pool.query_available_count(), 8);

        assert_eq!(pool.acquire(3, &spawn(&config)), 3);
        assert_eq!(pool.available_hint(), 5);
        assert_eq!(pool.acquire(100, &spawn(&config)), 5);
        assert_eq!(pool.acquire(1, &spawn(&config)), 0);

        assert_eq!(pool.active_count(), 8);
        assert_eq!(pool.query_available_count(), 0);
        assert!(pool.is_consistent());
    }

    #[test]
    fn test_acquire_on_torn_down_pool() {
        let config = config(8);
        let mut pool = CpuParticlePool::new(4);
        assert_eq!(pool.query_available_count(), 0);
        assert_eq!(pool.acquire(3, &spawn(&config)), 0);
        pool.teardown();
    }

    #[test]
    #[should_panic(expected = "not a multiple")]
    fn test_unaligned_capacity_panics() {
        CpuParticlePool::new(4).init(6);
    }
}
