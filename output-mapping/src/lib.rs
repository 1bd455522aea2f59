pub mod error;
pub mod failpoints;
pub mod inventory;
pub mod load;
mod macros;
pub mod mapping;
pub mod metrics;
pub mod prepare;
pub mod schema;
pub mod slicer;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod writer;

pub use error::{ErrorKind, OutputError, OutputResult};
pub use inventory::Staging;
pub use load::LoadTaskQueue;
pub use writer::{FileWriter, SystemMetadata, TableWriter};
