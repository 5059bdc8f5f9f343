//! Per-stream batch window of the shipment aggregation engine.
//!
//! A [`BatchWindow`] groups orders into [`CombinedShipment`]s keyed by
//! destination and decides, after every order, whether the accumulated
//! shipments must be flushed. The decision is driven by a marker counter and
//! a [`BatchPolicy`]:
//!
//! - the marker starts at `initial_marker`;
//! - after each order, if `marker == batch_size` the window flushes and the
//!   marker becomes `reset_marker`, otherwise it is incremented.
//!
//! The default policy (`3`, `1`, `0`) flushes after the 3rd order of a stream
//! and then after every 4th. [`BatchPolicy::uniform`] flushes every
//! `batch_size` orders.

use ordermgt_core::proto::{CombinedShipment, Order};
use ordermgt_core::types::DEFAULT_BATCH_SIZE;
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchPolicyError {
    #[error("BATCH_SIZE must be greater than 0")]
    ZeroBatchSize,

    #[error("{name} ({value}) must not exceed BATCH_SIZE ({batch_size})")]
    MarkerOutOfRange {
        name: &'static str,
        value: usize,
        batch_size: usize,
    },
}

/// Flush threshold and counter offsets of a batch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    batch_size: usize,
    initial_marker: usize,
    reset_marker: usize,
}

impl BatchPolicy {
    /// Creates a policy, rejecting combinations that would never flush.
    pub fn new(
        batch_size: usize,
        initial_marker: usize,
        reset_marker: usize,
    ) -> Result<Self, BatchPolicyError> {
        if batch_size == 0 {
            return Err(BatchPolicyError::ZeroBatchSize);
        }
        for (name, value) in [
            ("BATCH_INITIAL_MARKER", initial_marker),
            ("BATCH_RESET_MARKER", reset_marker),
        ] {
            if value > batch_size {
                return Err(BatchPolicyError::MarkerOutOfRange {
                    name,
                    value,
                    batch_size,
                });
            }
        }

        Ok(Self {
            batch_size,
            initial_marker,
            reset_marker,
        })
    }

    /// Flushes after every `batch_size` orders, including the first window.
    pub fn uniform(batch_size: usize) -> Result<Self, BatchPolicyError> {
        Self::new(batch_size, 1, 1)
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub const fn initial_marker(&self) -> usize {
        self.initial_marker
    }

    pub const fn reset_marker(&self) -> usize {
        self.reset_marker
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            initial_marker: 1,
            reset_marker: 0,
        }
    }
}

/// In-progress shipments of one stream plus the batch marker.
#[derive(Debug)]
pub struct BatchWindow {
    policy: BatchPolicy,
    marker: usize,
    shipments: HashMap<String, CombinedShipment>,
}

impl BatchWindow {
    pub fn new(policy: BatchPolicy) -> Self {
        Self {
            policy,
            marker: policy.initial_marker,
            shipments: HashMap::new(),
        }
    }

    /// Adds `order` to the shipment of its destination.
    ///
    /// Returns the flushed shipments when this order hits the threshold. The
    /// window is empty and the marker reset when `Some` is returned.
    pub fn push(&mut self, order: Order) -> Option<Vec<CombinedShipment>> {
        let destination = order.destination.clone();
        self.shipments
            .entry(destination)
            .or_insert_with_key(|destination| CombinedShipment::for_destination(destination))
            .orders_list
            .push(order);

        if self.marker == self.policy.batch_size {
            self.marker = self.policy.reset_marker;
            Some(self.take())
        } else {
            self.marker += 1;
            None
        }
    }

    /// Empties the window without touching the marker. Used for the final
    /// drain on end-of-input.
    pub fn take(&mut self) -> Vec<CombinedShipment> {
        self.shipments.drain().map(|(_, shipment)| shipment).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    /// Number of destinations with a pending shipment.
    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    pub const fn marker(&self) -> usize {
        self.marker
    }
}
