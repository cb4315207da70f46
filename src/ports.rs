//! Host port allocation for worker containers.
//!
//! Each worker gets exactly one host port from a bounded pool for the
//! lifetime of its registry entry. The allocator always hands out the
//! lowest free port, which keeps port usage dense and predictable.

use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Bounded pool of host ports.
///
/// Reservation picks the lowest free port; release is idempotent.
/// The allocator itself is not synchronized - the orchestrator mutates
/// it under the same lock as the worker registry so that the free set
/// and the registry's in-use ports stay disjoint-complementary.
#[derive(Debug)]
pub struct PortAllocator {
    /// Inclusive lower bound of the pool.
    min: u16,
    /// Inclusive upper bound of the pool.
    max: u16,
    /// Ports currently free. Ordered so `reserve` is the first element.
    free: BTreeSet<u16>,
}

impl PortAllocator {
    /// Creates an allocator over the inclusive range `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`. Pool bounds come from validated
    /// configuration, not caller input.
    #[must_use]
    pub fn new(min: u16, max: u16) -> Self {
        assert!(min <= max, "port pool bounds inverted: {min} > {max}");
        Self {
            min,
            max,
            free: (min..=max).collect(),
        }
    }

    /// Reserves the lowest free port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortsExhausted`] when every port in the pool is
    /// reserved. Exhaustion is an operator-recoverable condition, not a
    /// fault: removing an idle worker frees a port.
    pub fn reserve(&mut self) -> Result<u16> {
        let port = self
            .free
            .iter()
            .next()
            .copied()
            .ok_or(Error::PortsExhausted {
                min: self.min,
                max: self.max,
            })?;
        self.free.remove(&port);
        Ok(port)
    }

    /// Returns a port to the free set.
    ///
    /// Releasing an already-free port or a port outside the pool is a
    /// no-op, so cleanup paths can release unconditionally.
    pub fn release(&mut self, port: u16) {
        if port < self.min || port > self.max {
            tracing::warn!(port, min = self.min, max = self.max, "released port outside pool");
            return;
        }
        self.free.insert(port);
    }

    /// True if the port is currently reserved.
    #[must_use]
    pub fn is_reserved(&self, port: u16) -> bool {
        port >= self.min && port <= self.max && !self.free.contains(&port)
    }

    /// Number of free ports remaining.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Total pool size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }
}
