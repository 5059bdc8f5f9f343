#![doc = include_str!("../README.md")]

mod common;
pub mod intercept;

pub use common::*;
