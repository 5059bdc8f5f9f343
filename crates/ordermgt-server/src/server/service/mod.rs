//! gRPC service implementation and call bookkeeping.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`OrderService`).
//! - [`unary`] - `AddOrder` / `GetOrder` bodies.
//! - [`metadata`] - header and trailer helpers.
//! - [`tracker`] - in-flight stream accounting and graceful shutdown.

pub mod handler;
pub mod metadata;
pub mod tracker;
pub mod unary;
