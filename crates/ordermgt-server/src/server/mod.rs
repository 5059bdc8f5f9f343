//! Server-side building blocks of the order management service.
//!
//! ## Structure
//!
//! - [`config`] - CLI / environment configuration.
//! - [`service`] - tonic service implementation.
//! - [`store`] - shared in-memory order table.
//! - [`streaming`] - streaming call bodies, including the shipment
//!   aggregation engine.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;

use ordermgt_core::proto::order_management_server::OrderManagementServer;
use service::handler::OrderService;
use tonic::codec::CompressionEncoding;

/// Wraps `service` in the generated tonic server with zstd, gzip and deflate
/// enabled in both directions.
pub fn build_order_service(service: OrderService) -> OrderManagementServer<OrderService> {
    OrderManagementServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}
