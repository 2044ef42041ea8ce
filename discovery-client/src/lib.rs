//! Finds robots on the local network and keeps a ranked list of how to reach
//! each of them.
//!
//! Discovery events and health poll results are folded into a [`store`] by
//! the [`client::DiscoveryClient`], which restarts health polling when the set
//! of known addresses changes and notifies its consumer when the robot list
//! changes. [`service::DiscoveryHandle`] runs a client on a tokio task.

pub mod api;
pub mod client;
pub mod config;
pub mod hash;
pub mod health;
pub mod mdns;
pub mod service;
pub mod store;

pub use client::{ClientState, DiscoveryClient, DiscoveryClientConfig};
pub use service::DiscoveryHandle;
