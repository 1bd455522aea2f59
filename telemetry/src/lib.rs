//! Tracing and metrics setup shared by output mapping services and tests.

pub mod metrics;
pub mod tracing;

pub use crate::tracing::{init_test_tracing, init_tracing};
