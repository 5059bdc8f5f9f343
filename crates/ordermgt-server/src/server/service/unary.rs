//! `AddOrder` and `GetOrder`.

use crate::server::{
    service::metadata::{caller_timestamps, has_caller_metadata, insert_location, insert_timestamp},
    store::OrderStore,
};
use ordermgt_core::{
    Error,
    proto::{Confirmation, Order, OrderId},
    types::{INVALID_ORDER_ID, metadata::ADD_ORDER_LOCATION},
};
use tonic::{Request, Response};

/// Validates and upserts an order.
///
/// The reply carries `location` and `timestamp` headers.
///
/// # Errors
///
/// - [`Error::MetadataMissing`] if `require_metadata` is set and the caller
///   sent no metadata of its own.
/// - [`Error::InvalidField`] on field `ID` for the reserved id `-1`.
pub fn add_order(
    store: &OrderStore,
    require_metadata: bool,
    request: Request<Order>,
) -> Result<Response<Confirmation>, Error> {
    if require_metadata && !has_caller_metadata(request.metadata()) {
        return Err(Error::MetadataMissing);
    }

    let _timestamps = caller_timestamps(request.metadata());
    #[cfg(feature = "tracing")]
    {
        if !_timestamps.is_empty() {
            tracing::info!(timestamps = ?_timestamps, "AddOrder caller timestamps");
        }
    }

    let order = request.into_inner();
    if order.id == INVALID_ORDER_ID {
        #[cfg(feature = "tracing")]
        tracing::warn!(order_id = %order.id, "Rejecting order with invalid id");
        return Err(Error::invalid_order_id(&order.id, &order.description));
    }

    let value = format!("Order Added: {}", order.id);
    store.put(order);

    let mut response = Response::new(Confirmation { value });
    insert_location(response.metadata_mut(), ADD_ORDER_LOCATION);
    insert_timestamp(response.metadata_mut());
    Ok(response)
}

/// Returns the stored order, or an empty one when the id is unknown.
pub fn get_order(store: &OrderStore, request: Request<OrderId>) -> Response<Order> {
    let id = request.into_inner().value;
    let order = store.get(&id).unwrap_or_else(|| {
        #[cfg(feature = "tracing")]
        tracing::debug!(order_id = %id, "Order not found, replying with an empty order");
        Order::default()
    });
    Response::new(order)
}
