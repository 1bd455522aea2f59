//! Resolution of physical items, declared mappings and manifests into sources to upload.

pub mod combiner;
pub mod configuration;
pub mod destination;
pub mod source;

pub use combiner::{CombineOptions, Combined, ConsumptionReport, SourceKind, combine};
pub use configuration::{ConfigOrigin, ManifestCodec, ResolvedConfiguration, SourceLayout};
pub use source::{DeclaredMapping, FileSource, ResolvedSource, TableSource};
