//! Streaming call bodies.
//!
//! Each function here is written against the [`InboundStream`] /
//! [`OutboundSink`] capabilities rather than tonic types, so the same code
//! runs behind the interceptor, in tests and in benchmarks.
//!
//! ## Structure
//!
//! - [`window`] - batch policy and per-stream shipment window.
//! - [`aggregator`] - `ProcessOrders` aggregation engine.
//! - [`search`] - `SearchOrders` producer.
//! - [`update`] - `UpdateOrders` accumulator.
//!
//! [`InboundStream`]: ordermgt_core::intercept::InboundStream
//! [`OutboundSink`]: ordermgt_core::intercept::OutboundSink

pub mod aggregator;
pub mod search;
pub mod update;
pub mod window;
