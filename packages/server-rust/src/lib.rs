//! `MediaGate` Server: a fan-out search gateway over two provider services,
//! with per-operation resilience and symmetric decorators on both sides of
//! the RPC hop.

pub mod app;
pub mod network;
pub mod service;
pub mod telemetry;
