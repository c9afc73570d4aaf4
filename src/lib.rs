//! Tollgate - Per-Client Request Admission Limiter
//!
//! This crate implements an adaptive per-client rate limiter that sits in
//! front of an HTTP handler chain. Each client, identified by the host of its
//! peer address, gets a continuous token bucket; a background reaper evicts
//! clients that have gone idle so memory stays bounded. State is kept in
//! process memory only.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
