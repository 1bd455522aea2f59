//! Deferred table loads and their completion.

pub mod metadata;
pub mod queue;
pub mod task;

pub use metadata::MetadataOperation;
pub use queue::LoadTaskQueue;
pub use task::{DeferredLoadTask, LoadTaskState};
