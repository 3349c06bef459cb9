//! Core library for the workspace orchestration control plane
//!
//! This crate contains the state store (C1) and the task broker (C2):
//! the durable entity collections and the priority-FIFO task queues that
//! the gateway and orchestrator crates build on.

pub mod broker;
pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use error::CoreError;
pub type Result<T> = std::result::Result<T, CoreError>;
