//! Server-streaming producer behind `SearchOrders`.

use crate::server::store::OrderStore;
use ordermgt_core::{Result, intercept::OutboundSink, proto::Order};

/// Sends every order with an item containing `query`, one message per order.
///
/// The result set is a snapshot taken before the first send, so concurrent
/// writes never show up halfway through a search. Returns the number of
/// orders sent.
pub async fn search_orders<O>(store: &OrderStore, query: &str, outbound: &mut O) -> Result<usize>
where
    O: OutboundSink<Message = Order>,
{
    let matches = store.search(query);
    let count = matches.len();

    #[cfg(feature = "tracing")]
    tracing::debug!(query, matches = count, "Searching orders");

    for order in matches {
        outbound.send(order).await?;
    }

    Ok(count)
}
