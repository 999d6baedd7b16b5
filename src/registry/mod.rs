//! The local registry: the indexed, name-and-id addressable package store
//! (spec §4.3).

pub mod index;
pub mod store;

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use zip::write::SimpleFileOptions;

use crate::config::RegistryRoot;
use crate::error::{ArtError, Result};
use crate::name::PackageName;
use crate::seal::Seal;
use index::{Index, Package};

/// A verification hook invoked by `open` before extraction (spec §4.3
/// `open` step 3, §9 "Dynamic dispatch at seal-time"). The default
/// registry carries none; callers needing signature/authorization checks
/// inject one.
pub trait VerifyHook {
    fn verify(&self, name: &PackageName, seal: &Seal, path: &Path) -> Result<()>;
}

/// The local, tag-addressable package registry rooted at a
/// [`RegistryRoot`].
pub struct Registry {
    root: RegistryRoot,
    index: Index,
}

impl Registry {
    pub fn open(root: RegistryRoot) -> Result<Self> {
        let index = Index::load(&root.repository_json())?;
        Ok(Self { root, index })
    }

    fn save_index(&self) -> Result<()> {
        self.index.save(&self.root.repository_json())
    }

    /// Add a just-built `(zip, seal)` pair under `name`, moving the files
    /// into the file-store keyed by the manifest's reference (spec §4.4
    /// step 11, §4.3 `add`).
    pub fn add(&mut self, zip_path: &Path, seal: &Seal, name: &PackageName) -> Result<()> {
        let reference = seal.manifest.ref_.clone();
        store::store(&self.root.files_dir(), &reference, zip_path, seal)?;
        let package = Package {
            id: seal.package_id()?,
            tags: vec![],
            size: seal.manifest.size.clone(),
            created: Utc::now(),
            package_type: seal.manifest.package_type.clone(),
            file_ref: reference,
        };
        self.index.add(&name.repository(), &name.tag, package)?;
        self.save_index()
    }

    pub fn find_by_name(&self, name: &PackageName) -> Result<&Package> {
        self.index
            .find_by_name(name)
            .ok_or_else(|| ArtError::not_found(name.fully_qualified()))
    }

    pub fn find_names_by_id(&self, id_prefix: &str) -> Result<Vec<String>> {
        self.index.find_names_by_id(id_prefix)
    }

    /// Look up a package by its exact id, regardless of which repository
    /// indexes it, for the `pull` fast-path (spec §4.3 pull step 2): a
    /// hit here means the bytes are already in the file-store and `name`
    /// only needs a tag, not a re-download.
    pub fn find_by_id(&self, id: &str) -> Option<&Package> {
        self.list().into_iter().find(|(_, p)| p.id == id).map(|(_, p)| p)
    }

    /// Attach `name` as a tag onto an already-stored package, without
    /// touching the file-store (spec §4.3 pull step 2 fast-path). Idempotent,
    /// like `tag`: re-attaching a name that already resolves to the same id
    /// is a no-op rather than `AlreadyExists`.
    pub fn attach_tag(&mut self, name: &PackageName, existing: &Package) -> Result<()> {
        let package = Package {
            id: existing.id.clone(),
            tags: vec![],
            size: existing.size.clone(),
            created: Utc::now(),
            package_type: existing.package_type.clone(),
            file_ref: existing.file_ref.clone(),
        };
        match self.index.add(&name.repository(), &name.tag, package) {
            Ok(()) | Err(ArtError::AlreadyExists(_)) => self.save_index(),
            Err(e) => Err(e),
        }
    }

    /// Load the manifest of a stored package, without extracting it
    /// (used by the flow manager to survey a package-sourced step).
    pub fn manifest(&self, name: &PackageName) -> Result<crate::manifest::Manifest> {
        let package = self.find_by_name(name)?;
        let seal = store::read_seal(&self.root.files_dir(), &package.file_ref)?;
        Ok(seal.manifest)
    }

    /// Move `dst`'s tag onto the package resolved by `src` (spec §4.3
    /// `tag`).
    pub fn tag(&mut self, src: &PackageName, dst: &PackageName) -> Result<()> {
        if src.repository() != dst.repository() {
            return Err(ArtError::invalid_name(
                "tag source and destination must share a repository",
            ));
        }
        self.index.tag(&src.repository(), &src.tag, &dst.tag)?;
        self.save_index()
    }

    /// Extract a stored package into `path` after recomputing and
    /// verifying its digest, optionally invoking `verify_hook`, and
    /// enforcing the OS-compatibility gate (spec §4.3 `open`).
    pub fn open(
        &self,
        name: &PackageName,
        path: &Path,
        verify_hook: Option<&dyn VerifyHook>,
    ) -> Result<Seal> {
        let package = self.find_by_name(name)?;
        let seal = store::verify(&self.root.files_dir(), &package.file_ref)?;

        if let Some(hook) = verify_hook {
            hook.verify(name, &seal, path)
                .map_err(|e| ArtError::VerifyRejected(e.to_string()))?;
        }

        store::extract(&self.root.files_dir(), &package.file_ref, path)?;

        if !seal.manifest.os.is_empty() {
            let host_os = std::env::consts::OS;
            if seal.manifest.os != host_os {
                return Err(ArtError::OsMismatch {
                    manifest_os: seal.manifest.os.clone(),
                    host_os: host_os.to_string(),
                });
            }
        }

        Ok(seal)
    }

    /// Remove one or more `repo:tag` names, garbage-collecting any files
    /// left unreferenced (spec §4.3 `remove`).
    pub fn remove(&mut self, names: &[PackageName]) -> Result<()> {
        let pairs: Vec<(String, String)> = names
            .iter()
            .map(|n| (n.repository(), n.tag.clone()))
            .collect();
        self.index.remove_tags(&pairs)?;
        self.gc()?;
        self.save_index()
    }

    pub fn remove_all(&mut self) -> Result<()> {
        let refs: Vec<String> = self
            .index
            .list()
            .into_iter()
            .map(|(_, p)| p.file_ref.clone())
            .collect();
        for reference in refs {
            store::delete(&self.root.files_dir(), &reference)?;
        }
        self.index.remove_all();
        self.save_index()
    }

    fn gc(&mut self) -> Result<()> {
        for (_, file_ref) in self.index.orphaned() {
            if !self.index.referenced_files().contains(&file_ref) {
                store::delete(&self.root.files_dir(), &file_ref)?;
            }
        }
        self.index.prune_orphans();
        Ok(())
    }

    /// Walk the file-store and delete any `(id.zip, id.json)` pair not
    /// referenced by any tag (spec §4.3 `prune`).
    pub fn prune(&mut self) -> Result<()> {
        self.gc()?;
        self.save_index()
    }

    pub fn list(&self) -> Vec<(&str, &Package)> {
        self.index.list()
    }

    /// Pack the `(zip, seal-json)` pair of each named package into a single
    /// archive written to `dst_uri`, a local filesystem path (spec §4.3
    /// `export`). One entry pair per name: `<fqdn>.zip`, `<fqdn>.json`.
    pub fn export(&self, names: &[PackageName], dst_uri: &Path) -> Result<()> {
        let files_dir = self.root.files_dir();
        let file = std::fs::File::create(dst_uri)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for name in names {
            let package = self.find_by_name(name)?;
            let zip_bytes = std::fs::read(store::zip_path(&files_dir, &package.file_ref))?;
            let json_bytes = std::fs::read(files_dir.join(format!("{}.json", package.file_ref)))?;
            let entry_name = name.fully_qualified().replace(['/', ':'], "_");

            writer.start_file(format!("{entry_name}.zip"), options)?;
            writer.write_all(&zip_bytes)?;
            writer.start_file(format!("{entry_name}.json"), options)?;
            writer.write_all(&json_bytes)?;
        }
        writer.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use tempfile::tempdir;

    fn make_zip(path: &Path) {
        use std::io::Write;
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("data.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn add_then_find_then_open_round_trips() {
        let dir = tempdir().unwrap();
        let root = RegistryRoot::open(dir.path()).unwrap();
        let mut registry = Registry::open(root).unwrap();

        let zip_path = dir.path().join("staged.zip");
        make_zip(&zip_path);
        let zip_bytes = std::fs::read(&zip_path).unwrap();
        let manifest = Manifest {
            ref_: "ref-1".into(),
            package_type: "content/file".into(),
            ..Default::default()
        };
        let seal = Seal::new(manifest, &zip_bytes).unwrap();

        let name = PackageName::parse("localhost/library/demo:latest").unwrap();
        registry.add(&zip_path, &seal, &name).unwrap();

        assert!(registry.find_by_name(&name).is_ok());

        let extract_to = dir.path().join("opened");
        registry.open(&name, &extract_to, None).unwrap();
        assert_eq!(
            std::fs::read_to_string(extract_to.join("data.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn export_writes_an_archive_with_one_entry_pair_per_name() {
        let dir = tempdir().unwrap();
        let root = RegistryRoot::open(dir.path()).unwrap();
        let mut registry = Registry::open(root).unwrap();

        let zip_path = dir.path().join("staged.zip");
        make_zip(&zip_path);
        let zip_bytes = std::fs::read(&zip_path).unwrap();
        let manifest = Manifest {
            ref_: "ref-export".into(),
            ..Default::default()
        };
        let seal = Seal::new(manifest, &zip_bytes).unwrap();
        let name = PackageName::parse("localhost/library/exported:latest").unwrap();
        registry.add(&zip_path, &seal, &name).unwrap();

        let dst = dir.path().join("out.art");
        registry.export(&[name.clone()], &dst).unwrap();

        let file = std::fs::File::open(&dst).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        let expected_prefix = name.fully_qualified().replace(['/', ':'], "_");
        assert!(names.contains(&format!("{expected_prefix}.zip")));
        assert!(names.contains(&format!("{expected_prefix}.json")));
    }

    #[test]
    fn find_by_id_locates_package_across_repositories() {
        let dir = tempdir().unwrap();
        let root = RegistryRoot::open(dir.path()).unwrap();
        let mut registry = Registry::open(root).unwrap();

        let zip_path = dir.path().join("staged.zip");
        make_zip(&zip_path);
        let zip_bytes = std::fs::read(&zip_path).unwrap();
        let manifest = Manifest {
            ref_: "ref-byid".into(),
            ..Default::default()
        };
        let seal = Seal::new(manifest, &zip_bytes).unwrap();
        let id = seal.package_id().unwrap();
        let name = PackageName::parse("localhost/library/byid:latest").unwrap();
        registry.add(&zip_path, &seal, &name).unwrap();

        let found = registry.find_by_id(&id).unwrap().clone();
        let alias = PackageName::parse("localhost/library/byid:v1").unwrap();
        registry.attach_tag(&alias, &found).unwrap();

        assert!(registry.find_by_name(&alias).is_ok());
        assert_eq!(registry.find_by_name(&alias).unwrap().file_ref, found.file_ref);
    }

    #[test]
    fn remove_then_prune_deletes_unreferenced_files() {
        let dir = tempdir().unwrap();
        let root = RegistryRoot::open(dir.path()).unwrap();
        let mut registry = Registry::open(root).unwrap();

        let zip_path = dir.path().join("staged.zip");
        make_zip(&zip_path);
        let zip_bytes = std::fs::read(&zip_path).unwrap();
        let manifest = Manifest {
            ref_: "ref-2".into(),
            ..Default::default()
        };
        let seal = Seal::new(manifest, &zip_bytes).unwrap();
        let name = PackageName::parse("localhost/library/demo2:latest").unwrap();
        registry.add(&zip_path, &seal, &name).unwrap();

        registry.remove(&[name.clone()]).unwrap();
        assert!(registry.find_by_name(&name).is_err());

        let (zip_file, json_file) = registry.root.file_ref_paths("ref-2");
        assert!(!zip_file.exists());
        assert!(!json_file.exists());
    }
}
