use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::inventory::manifest_path_for;

/// Temporary staging directory removed on drop.
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// Writes `<source>.manifest`.
    pub fn write_manifest(&self, source: &str, content: &str) -> PathBuf {
        let path = manifest_path_for(&self.path().join(source));
        fs::write(&path, content).unwrap();
        path
    }

    /// Creates a sliced source directory holding the given parts.
    pub fn write_sliced(&self, name: &str, parts: &[(&str, &str)]) -> PathBuf {
        let dir = self.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        for (part, content) in parts {
            fs::write(dir.join(part), content).unwrap();
        }
        dir
    }

    pub fn read(&self, name: &str) -> Vec<u8> {
        fs::read(self.path().join(name)).unwrap()
    }

    /// Names of all entries in the staging root, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut entries = fs::read_dir(self.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        entries.sort();
        entries
    }
}

impl Default for StagingDir {
    fn default() -> Self {
        Self::new()
    }
}
