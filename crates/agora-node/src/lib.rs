//! The Agora orchestration node.
//!
//! Accepts task requests over HTTP, resolves a paid provider through
//! the capability registry, runs the x402 payment exchange and streams
//! step-by-step progress to subscribers over SSE.

pub mod api;
pub mod broker;
pub mod config;
pub mod coordinator;
pub mod logging;
pub mod metrics;
pub mod node;
