//! # Order Domain Constants and Helpers
//!
//! Shared constants and small helpers layered over the generated Protobuf
//! messages so the server and client agree on the literal values that travel
//! on the wire.
//!
//! ## Constants
//!
//! - [`INVALID_ORDER_ID`] - order id rejected by `AddOrder`
//! - [`SHIPMENT_ID_PREFIX`] / [`SHIPMENT_STATUS_PROCESSED`] - shape of a
//!   freshly created [`CombinedShipment`]
//! - [`DEFAULT_BATCH_SIZE`] - number of order ids per shipment flush
//! - [`methods`] - fully qualified RPC method names used by interceptors
//! - [`metadata`] - metadata keys and values exchanged on the side channel

use crate::proto::{CombinedShipment, Order};

/// Order id that `AddOrder` always rejects with a field violation.
pub const INVALID_ORDER_ID: &str = "-1";

/// Prefix of every combined shipment id; the destination is appended.
pub const SHIPMENT_ID_PREFIX: &str = "cmb - ";

/// Status assigned to every combined shipment on creation.
pub const SHIPMENT_STATUS_PROCESSED: &str = "Processed!";

/// Default number of order ids that trigger a shipment flush.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Fully qualified gRPC method names of the `OrderManagement` service.
pub mod methods {
    pub const ADD_ORDER: &str = "/ecommerce.OrderManagement/AddOrder";
    pub const GET_ORDER: &str = "/ecommerce.OrderManagement/GetOrder";
    pub const SEARCH_ORDERS: &str = "/ecommerce.OrderManagement/SearchOrders";
    pub const UPDATE_ORDERS: &str = "/ecommerce.OrderManagement/UpdateOrders";
    pub const PROCESS_ORDERS: &str = "/ecommerce.OrderManagement/ProcessOrders";
}

/// Metadata keys and fixed values exchanged alongside calls.
pub mod metadata {
    pub const TIMESTAMP: &str = "timestamp";
    pub const LOCATION: &str = "location";

    /// Location reported in the `AddOrder` response header.
    pub const ADD_ORDER_LOCATION: &str = "San Jose";
    /// Location reported in the `SearchOrders` response header.
    pub const SEARCH_LOCATION: &str = "MTV";

    /// Current local time with nanosecond precision, e.g.
    /// `Jan  2 15:04:05.000000000`.
    pub fn timestamp_now() -> String {
        chrono::Local::now()
            .format("%b %e %H:%M:%S%.9f")
            .to_string()
    }
}

impl CombinedShipment {
    /// Creates an empty shipment for `destination` with the fixed id prefix
    /// and processed status.
    pub fn for_destination(destination: &str) -> Self {
        Self {
            id: format!("{SHIPMENT_ID_PREFIX}{destination}"),
            status: SHIPMENT_STATUS_PROCESSED.to_string(),
            orders_list: Vec::new(),
        }
    }
}

impl Order {
    /// Returns `true` if any item contains `query` as a substring.
    pub fn matches_item(&self, query: &str) -> bool {
        self.items.iter().any(|item| item.contains(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipment_for_destination_uses_prefix_and_status() {
        let shipment = CombinedShipment::for_destination("San Jose, CA");
        assert_eq!(shipment.id, "cmb - San Jose, CA");
        assert_eq!(shipment.status, "Processed!");
        assert!(shipment.orders_list.is_empty());
    }

    #[test]
    fn matches_item_is_substring_based() {
        let order = Order {
            id: "106".to_string(),
            items: vec!["Amazon Echo".to_string(), "Apple iPhone XS".to_string()],
            ..Default::default()
        };
        assert!(order.matches_item("iPhone"));
        assert!(order.matches_item("Echo"));
        assert!(!order.matches_item("Google"));
    }

    #[test]
    fn timestamp_is_valid_metadata_value() {
        let ts = metadata::timestamp_now();
        assert!(ts.parse::<tonic::metadata::AsciiMetadataValue>().is_ok());
    }
}
