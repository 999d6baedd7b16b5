//! Source acquisition: an opaque "get sources into a directory" operation
//! (out of scope per spec §1 — VCS/HTTP fetch are external collaborators).
//! This module defines the seam the Builder calls through and the one
//! concrete provider the core ships: a local filesystem copy.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;

/// Metadata recovered from source acquisition, carried into the manifest.
#[derive(Debug, Clone, Default)]
pub struct SourceMeta {
    pub commit: String,
    pub branch: String,
    pub source_uri: String,
}

/// A pluggable source acquisition strategy. Remote VCS/HTTP fetchers live
/// outside this core and implement this trait; the core ships only the
/// local provider below.
pub trait SourceProvider {
    fn acquire(
        &self,
        from: &str,
        from_path: Option<&str>,
        token: Option<&str>,
        copy: bool,
        dest: &Path,
    ) -> Result<SourceMeta>;
}

/// Resolves `from` as a local filesystem path. If `copy` is set, the tree
/// is copied into `dest`; otherwise `dest` is treated as an alias for the
/// resolved source root and the caller reads directly from `from`.
pub struct LocalSourceProvider;

impl SourceProvider for LocalSourceProvider {
    fn acquire(
        &self,
        from: &str,
        from_path: Option<&str>,
        _token: Option<&str>,
        copy: bool,
        dest: &Path,
    ) -> Result<SourceMeta> {
        let mut root = std::path::PathBuf::from(from);
        if let Some(sub) = from_path {
            root = root.join(sub);
        }
        if copy {
            copy_tree(&root, dest)?;
        }
        Ok(SourceMeta {
            commit: String::new(),
            branch: String::new(),
            source_uri: from.to_string(),
        })
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path == src {
            continue;
        }
        let relative = path.strip_prefix(src).expect("entry is under src");
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(path, &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_provider_copies_tree_when_requested() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hi").unwrap();
        let dest = tempdir().unwrap();
        let provider = LocalSourceProvider;
        provider
            .acquire(src.path().to_str().unwrap(), None, None, true, dest.path())
            .unwrap();
        assert_eq!(std::fs::read_to_string(dest.path().join("a.txt")).unwrap(), "hi");
    }

    #[test]
    fn local_provider_skips_copy_when_not_requested() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        let provider = LocalSourceProvider;
        provider
            .acquire(src.path().to_str().unwrap(), None, None, false, dest.path())
            .unwrap();
        assert!(!dest.path().join("a.txt").exists());
    }
}
