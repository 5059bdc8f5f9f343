//! Bidirectional shipment aggregation behind `ProcessOrders`.
//!
//! [`process_orders`] reads order ids from an [`InboundStream`], resolves each
//! one against the [`OrderStore`] and feeds it to a [`BatchWindow`]. Whenever
//! the window reports a flush, every pending [`CombinedShipment`] is sent on
//! the [`OutboundSink`]. On clean end-of-input the remaining shipments are
//! drained and the call completes.
//!
//! ## Failure handling
//!
//! - A receive error ends the call immediately. Nothing pending is flushed.
//! - An id without a stored order fails the call with
//!   [`Error::UnknownOrder`]. Shipments flushed earlier stay delivered.
//! - A send error (the client went away) ends the call without any further
//!   sends.
//!
//! The engine never retries and never times out on its own; cancellation is
//! left to whoever drives the future.

use crate::server::{
    store::OrderStore,
    streaming::window::{BatchPolicy, BatchWindow},
    telemetry::{increment_orders_aggregated, increment_shipments_flushed},
};
use ordermgt_core::{
    Error, Result,
    intercept::{InboundStream, OutboundSink},
    proto::{CombinedShipment, OrderId},
};

/// Counters describing one completed aggregation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregationStats {
    /// Order ids received and resolved.
    pub orders: usize,
    /// Combined shipments sent, including the final drain.
    pub shipments: usize,
    /// Threshold flushes, not counting the final drain.
    pub flushes: usize,
}

/// Runs the aggregation loop until end-of-input or the first error.
pub async fn process_orders<I, O>(
    store: &OrderStore,
    policy: BatchPolicy,
    inbound: &mut I,
    outbound: &mut O,
) -> Result<AggregationStats>
where
    I: InboundStream<Message = OrderId>,
    O: OutboundSink<Message = CombinedShipment>,
{
    let mut window = BatchWindow::new(policy);
    let mut stats = AggregationStats::default();

    while let Some(OrderId { value: id }) = inbound.recv().await? {
        let order = store.get(&id).ok_or_else(|| Error::UnknownOrder { id })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            order_id = %order.id,
            destination = %order.destination,
            marker = window.marker(),
            "Aggregating order"
        );

        increment_orders_aggregated();
        stats.orders += 1;

        if let Some(batch) = window.push(order) {
            stats.flushes += 1;
            stats.shipments += send_all(outbound, batch).await?;
        }
    }

    let remaining = window.take();
    #[cfg(feature = "tracing")]
    tracing::debug!(shipments = remaining.len(), "End of input, draining window");
    stats.shipments += send_all(outbound, remaining).await?;

    Ok(stats)
}

async fn send_all<O>(outbound: &mut O, batch: Vec<CombinedShipment>) -> Result<usize>
where
    O: OutboundSink<Message = CombinedShipment>,
{
    let count = batch.len();
    for shipment in batch {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            shipment_id = %shipment.id,
            orders = shipment.orders_list.len(),
            "Sending combined shipment"
        );
        outbound.send(shipment).await?;
        increment_shipments_flushed(1);
    }
    Ok(count)
}
