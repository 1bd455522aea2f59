//! Client side of the remote tabular storage service.
//!
//! [`client::StorageClient`] is the contract output mapping is written against.
//! [`memory::MemoryStorage`] implements it in process and backs the test suites.

pub mod client;
pub mod error;
pub mod memory;
pub mod types;

pub use client::StorageClient;
pub use error::ClientError;
