//! Write Path Integration Tests
//!
//! End-to-end behaviour of the write loop over the in-memory engine:
//! ordering, durability markers, failures, shutdown, back-pressure, pause.

mod common;

mod backpressure;
mod config;
mod durability;
mod failures;
mod ordering;
mod pause;
mod shutdown;
