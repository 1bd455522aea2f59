//! Entry points uploading staged tables and files.

pub mod file;
pub mod system_metadata;
pub mod table;
pub mod tags;

pub use file::FileWriter;
pub use system_metadata::{SYSTEM_PROVIDER, SystemMetadata};
pub use table::TableWriter;
pub use tags::{add_system_tags, rewrite_tags};
