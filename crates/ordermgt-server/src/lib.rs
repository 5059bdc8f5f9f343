#![doc = include_str!("../README.md")]

pub mod server;

pub use server::{
    build_order_service,
    config::{CliArgs, ServerConfig},
    service::handler::OrderService,
    store::OrderStore,
    streaming::window::BatchPolicy,
};
