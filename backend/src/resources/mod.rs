//! Shared resource pools
//!
//! A session reserves a fixed set of named capacity pools before agents are
//! created. Units are acquired and released one at a time by the engine:
//!
//! - **agent_slots**: one unit per created agent
//! - **event_slots**: one unit per stored event
//! - **hospital_beds**: one unit per admitted agent while in hospital
//!
//! # Critical Invariants
//!
//! 1. `0 <= allocated <= capacity` for every pool at all times
//! 2. After [`ResourceManager::deallocate`] or [`ResourceManager::deallocate2`]
//!    no pool holds any unit
//! 3. Teardown never fails, even on a manager that was never allocated

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pool of agent storage slots
pub const AGENT_SLOTS: &str = "agent_slots";
/// Pool of event storage slots
pub const EVENT_SLOTS: &str = "event_slots";
/// Pool of hospital beds consumed by admissions
pub const HOSPITAL_BEDS: &str = "hospital_beds";

/// Errors raised by the resource manager
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Resources are already allocated")]
    AlreadyAllocated,

    #[error("Unknown resource pool: {0}")]
    UnknownPool(String),

    #[error("Resource pool '{pool}' exhausted (capacity {capacity}, requested {requested})")]
    ResourceExhausted {
        pool: String,
        capacity: usize,
        requested: usize,
    },
}

/// Requested pool size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    pub capacity: usize,
}

impl PoolSpec {
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            capacity,
        }
    }
}

/// Handle returned for each reserved pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolHandle {
    pub index: usize,
    pub name: String,
    pub capacity: usize,
}

/// A finite shared capacity with utilization accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    name: String,
    capacity: usize,
    allocated: usize,

    /// Highest `allocated` observed
    peak_allocated: usize,

    /// Successful single-unit acquisitions
    acquisitions: u64,

    /// Acquisition attempts refused for lack of capacity
    rejections: u64,

    /// ∫ allocated dt (unit-years of use)
    unit_time: f64,

    /// Time of the last allocation change
    last_change: f64,
}

impl ResourcePool {
    fn new(spec: &PoolSpec) -> Self {
        Self {
            name: spec.name.clone(),
            capacity: spec.capacity,
            allocated: 0,
            peak_allocated: 0,
            acquisitions: 0,
            rejections: 0,
            unit_time: 0.0,
            last_change: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn available(&self) -> usize {
        self.capacity - self.allocated
    }

    pub fn peak_allocated(&self) -> usize {
        self.peak_allocated
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    pub fn rejections(&self) -> u64 {
        self.rejections
    }

    /// Unit-time integral up to the last allocation change
    pub fn unit_time(&self) -> f64 {
        self.unit_time
    }

    fn accrue(&mut self, at: f64) {
        if at > self.last_change {
            self.unit_time += self.allocated as f64 * (at - self.last_change);
            self.last_change = at;
        }
    }

    fn try_acquire(&mut self, count: usize, at: f64) -> bool {
        if count > self.available() {
            self.rejections += 1;
            return false;
        }
        self.accrue(at);
        self.allocated += count;
        self.acquisitions += count as u64;
        self.peak_allocated = self.peak_allocated.max(self.allocated);
        true
    }

    fn release(&mut self, count: usize, at: f64) -> usize {
        self.accrue(at);
        let released = count.min(self.allocated);
        self.allocated -= released;
        released
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            name: self.name.clone(),
            capacity: self.capacity,
            allocated: self.allocated,
            peak_allocated: self.peak_allocated,
            acquisitions: self.acquisitions,
            rejections: self.rejections,
            unit_time: self.unit_time,
        }
    }
}

/// Serializable view of a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub name: String,
    pub capacity: usize,
    pub allocated: usize,
    pub peak_allocated: usize,
    pub acquisitions: u64,
    pub rejections: u64,
    pub unit_time: f64,
}

/// Outcome of a teardown call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseReport {
    /// Whether any pool existed
    pub had_pools: bool,
    /// Pools dropped
    pub pools_released: usize,
    /// Units still held at teardown, force-released
    pub units_force_released: usize,
}

/// Tracks allocation and release of the session's pools
///
/// # Example
/// ```
/// use hemsim_core::resources::{PoolSpec, ResourceManager, HOSPITAL_BEDS};
///
/// let mut manager = ResourceManager::new();
/// manager.allocate(&[PoolSpec::new(HOSPITAL_BEDS, 1)]).unwrap();
///
/// assert!(manager.try_acquire(HOSPITAL_BEDS, 0.0).unwrap());
/// assert!(!manager.try_acquire(HOSPITAL_BEDS, 0.5).unwrap());
/// manager.release(HOSPITAL_BEDS, 1.0).unwrap();
///
/// let report = manager.deallocate();
/// assert_eq!(report.pools_released, 1);
/// assert!(!manager.is_allocated());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceManager {
    pools: Vec<ResourcePool>,
    allocated: bool,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the given pools
    ///
    /// # Errors
    /// `AlreadyAllocated` if pools exist and have not been deallocated.
    pub fn allocate(&mut self, specs: &[PoolSpec]) -> Result<Vec<PoolHandle>, ResourceError> {
        if self.allocated {
            return Err(ResourceError::AlreadyAllocated);
        }

        self.pools = specs.iter().map(ResourcePool::new).collect();
        self.allocated = true;

        Ok(self
            .pools
            .iter()
            .enumerate()
            .map(|(index, pool)| PoolHandle {
                index,
                name: pool.name.clone(),
                capacity: pool.capacity,
            })
            .collect())
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Look up a pool
    pub fn pool(&self, name: &str) -> Option<&ResourcePool> {
        self.pools.iter().find(|p| p.name == name)
    }

    fn pool_mut(&mut self, name: &str) -> Result<&mut ResourcePool, ResourceError> {
        self.pools
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ResourceError::UnknownPool(name.to_string()))
    }

    /// Take one unit at simulated time `at`
    ///
    /// Returns `Ok(false)` (and counts a rejection) when the pool is full.
    pub fn try_acquire(&mut self, name: &str, at: f64) -> Result<bool, ResourceError> {
        Ok(self.pool_mut(name)?.try_acquire(1, at))
    }

    /// Take `count` units at once, or none
    ///
    /// # Errors
    /// `ResourceExhausted` if fewer than `count` units are available.
    pub fn acquire_many(&mut self, name: &str, count: usize, at: f64) -> Result<(), ResourceError> {
        let pool = self.pool_mut(name)?;
        if pool.try_acquire(count, at) {
            Ok(())
        } else {
            Err(ResourceError::ResourceExhausted {
                pool: name.to_string(),
                capacity: pool.capacity,
                requested: count,
            })
        }
    }

    /// Return one unit at simulated time `at`
    ///
    /// Releasing from an empty pool is a no-op.
    pub fn release(&mut self, name: &str, at: f64) -> Result<(), ResourceError> {
        self.pool_mut(name)?.release(1, at);
        Ok(())
    }

    /// Close the utilization integral of every pool at time `at`
    pub fn settle(&mut self, at: f64) {
        for pool in &mut self.pools {
            pool.accrue(at);
        }
    }

    /// Snapshots of every pool
    pub fn snapshots(&self) -> Vec<PoolSnapshot> {
        self.pools.iter().map(ResourcePool::snapshot).collect()
    }

    /// Normal teardown: release every unit and drop the pools
    ///
    /// No-op on an un-allocated manager.
    pub fn deallocate(&mut self) -> ReleaseReport {
        self.release_all()
    }

    /// Error-path teardown
    ///
    /// Safe on partially initialised state. Force-releases whatever units
    /// are still held, reports how many, and drops the pools.
    pub fn deallocate2(&mut self) -> ReleaseReport {
        let report = self.release_all();
        if report.units_force_released > 0 {
            tracing::warn!(
                units = report.units_force_released,
                "force-released resource units still held at cleanup"
            );
        }
        report
    }

    fn release_all(&mut self) -> ReleaseReport {
        if !self.allocated && self.pools.is_empty() {
            return ReleaseReport::default();
        }

        let mut units = 0;
        for pool in &mut self.pools {
            units += pool.allocated;
            pool.allocated = 0;
        }

        let report = ReleaseReport {
            had_pools: true,
            pools_released: self.pools.len(),
            units_force_released: units,
        };
        self.pools.clear();
        self.allocated = false;
        report
    }
}
