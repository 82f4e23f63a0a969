//! Client for the capability registry and reputation ledger.
//!
//! The registry itself is an external collaborator: an identity
//! contract (capability discovery, agent cards) and a reputation
//! contract (scores, rate-limit windows, rating writes), consumed
//! through the read/write REST surface its gateway exposes. This crate
//! only wraps that contract interface; indexing and settlement
//! internals stay on the other side of the wire.

mod client;
mod http;

pub use client::RegistryClient;
pub use http::{HttpRegistryClient, RegistryEndpoints};
