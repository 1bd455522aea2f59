//! Configuration for output mapping runs.
//!
//! Holds the declarative mapping types (tables, files, manifests), the service level
//! settings and the hierarchical loader used to read them from disk.

pub mod environment;
pub mod load;
pub mod shared;
