use config::shared::{FileMapping, TableMapping};

use crate::inventory::{ManifestFile, PhysicalItem};

/// A configuration entry declaring what to do with one source.
pub trait DeclaredMapping: Clone {
    /// Name of the physical item the entry refers to.
    fn source(&self) -> &str;

    /// Declared destination, if the entry kind has one.
    fn destination(&self) -> Option<&str>;
}

impl DeclaredMapping for TableMapping {
    fn source(&self) -> &str {
        &self.source
    }

    fn destination(&self) -> Option<&str> {
        self.table.destination.as_deref()
    }
}

impl DeclaredMapping for FileMapping {
    fn source(&self) -> &str {
        &self.source
    }

    fn destination(&self) -> Option<&str> {
        None
    }
}

/// One physical item bound to its manifest and declared mapping.
///
/// Values are never mutated once built. Slicing returns a new value describing the sliced
/// directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource<M> {
    pub source_name: String,
    pub item: PhysicalItem,
    pub manifest: Option<ManifestFile>,
    pub mapping: Option<M>,
}

pub type TableSource = ResolvedSource<TableMapping>;

pub type FileSource = ResolvedSource<FileMapping>;
