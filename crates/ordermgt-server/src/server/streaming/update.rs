//! Client-streaming accumulator behind `UpdateOrders`.

use crate::server::store::OrderStore;
use ordermgt_core::{Result, intercept::InboundStream, proto::Order};

/// Upserts every received order and returns the ids in arrival order.
///
/// Orders are written as they arrive, so a receive error part-way through
/// leaves the earlier updates applied.
pub async fn update_orders<I>(store: &OrderStore, inbound: &mut I) -> Result<Vec<String>>
where
    I: InboundStream<Message = Order>,
{
    let mut updated = Vec::new();
    while let Some(order) = inbound.recv().await? {
        #[cfg(feature = "tracing")]
        tracing::debug!(order_id = %order.id, "Updating order");

        updated.push(order.id.clone());
        store.put(order);
    }
    Ok(updated)
}

/// Confirmation text sent once the client half-closes, e.g.
/// `Orders processed Updated Order IDs : 102, 103, `.
pub fn confirmation(updated: &[String]) -> String {
    let mut text = String::from("Orders processed Updated Order IDs : ");
    for id in updated {
        text.push_str(id);
        text.push_str(", ");
    }
    text
}
