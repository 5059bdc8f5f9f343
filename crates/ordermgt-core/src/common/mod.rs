//! Shared types and error definitions used by the order management server
//! and client.
//!
//! ## Submodules
//!
//! - [`error`] - Centralized service error type and its mapping onto
//!   [`tonic::Status`].
//! - [`types`] - Domain constants and helpers around the generated messages.
//! - [`proto`] - Generated Protobuf messages and service bindings.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from
/// `proto/ordermgt.proto`.
///
/// ## Service
///
/// - `OrderManagement` with `AddOrder`, `GetOrder`, `SearchOrders`,
///   `UpdateOrders` and `ProcessOrders`.
///
/// ## Messages
///
/// - [`Order`](proto::Order) - a single order keyed by `id`.
/// - [`OrderId`](proto::OrderId), [`SearchQuery`](proto::SearchQuery),
///   [`Confirmation`](proto::Confirmation) - single string wrappers, wire
///   compatible with `google.protobuf.StringValue`.
/// - [`CombinedShipment`](proto::CombinedShipment) - orders grouped by
///   destination.
pub mod proto {
    tonic::include_proto!("ecommerce");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("ordermgt_descriptor");
}
