//! Explicit registry root, replacing home-directory discovery via process
//! environment (spec §9 "Global working directories").

use std::path::{Path, PathBuf};

use crate::error::Result;

const APP_DIR: &str = ".artisan";

/// The filesystem layout rooted under a caller-chosen directory. Every
/// derived path is ensured to exist on construction, the way the teacher's
/// config loader ensures its defaults at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRoot {
    root: PathBuf,
}

impl RegistryRoot {
    /// Open (creating if needed) a registry rooted at `root`, laying out
    /// `files/`, `repository.json`'s parent, `build/`, `tmp/`, `tmp/run/`
    /// and `lang/` under `<root>/.artisan/` (spec §6).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let registry = Self { root: root.into() };
        for dir in [
            registry.files_dir(),
            registry.build_dir(),
            registry.tmp_dir(),
            registry.tmp_run_dir(),
            registry.lang_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(registry)
    }

    fn base(&self) -> PathBuf {
        self.root.join(APP_DIR)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.base().join("files")
    }

    pub fn repository_json(&self) -> PathBuf {
        self.base().join("repository.json")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.base().join("build")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.base().join("tmp")
    }

    pub fn tmp_run_dir(&self) -> PathBuf {
        self.tmp_dir().join("run")
    }

    pub fn lang_dir(&self) -> PathBuf {
        self.base().join("lang")
    }

    /// The zip and seal-json paths for a given file-store reference.
    pub fn file_ref_paths(&self, reference: &str) -> (PathBuf, PathBuf) {
        (
            self.files_dir().join(format!("{reference}.zip")),
            self.files_dir().join(format!("{reference}.json")),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_ensures_directory_layout() {
        let dir = tempdir().unwrap();
        let registry = RegistryRoot::open(dir.path()).unwrap();
        assert!(registry.files_dir().is_dir());
        assert!(registry.build_dir().is_dir());
        assert!(registry.tmp_run_dir().is_dir());
        assert!(registry.lang_dir().is_dir());
    }

    #[test]
    fn file_ref_paths_use_reference_not_id() {
        let dir = tempdir().unwrap();
        let registry = RegistryRoot::open(dir.path()).unwrap();
        let (zip, json) = registry.file_ref_paths("20260101000000-abc123");
        assert_eq!(zip.file_name().unwrap(), "20260101000000-abc123.zip");
        assert_eq!(json.file_name().unwrap(), "20260101000000-abc123.json");
    }
}
