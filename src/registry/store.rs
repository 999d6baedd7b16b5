//! The file-store: `files/<ref>.zip` / `files/<ref>.json` pairs, with
//! zip-slip-guarded extraction.
//!
//! Grounded on `original_source/registry/lib.go`'s `unzip` (same guard: a
//! normalized destination path must stay under the extraction root) and
//! `MoveFile`/`CopyFile` (atomic move into the file-store).

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{ArtError, Result};
use crate::seal::Seal;

/// Move a freshly built `(zip, seal-json)` pair into the file-store under
/// `reference`, replacing whatever was already stored at that reference.
pub fn store(files_dir: &Path, reference: &str, zip_path: &Path, seal: &Seal) -> Result<()> {
    std::fs::create_dir_all(files_dir)?;
    let dest_zip = files_dir.join(format!("{reference}.zip"));
    let dest_json = files_dir.join(format!("{reference}.json"));
    std::fs::rename(zip_path, &dest_zip).or_else(|_| {
        std::fs::copy(zip_path, &dest_zip)?;
        std::fs::remove_file(zip_path)
    })?;
    let json = serde_json::to_vec_pretty(seal)?;
    std::fs::write(&dest_json, json)?;
    Ok(())
}

pub fn read_seal(files_dir: &Path, reference: &str) -> Result<Seal> {
    let path = files_dir.join(format!("{reference}.json"));
    let bytes = std::fs::read(&path)
        .map_err(|_| ArtError::not_found(format!("seal for reference '{reference}'")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn zip_path(files_dir: &Path, reference: &str) -> PathBuf {
    files_dir.join(format!("{reference}.zip"))
}

/// Recompute the digest of the stored `(zip, manifest)` pair and compare
/// it byte-equal against the seal's declared digest (spec §4.2
/// validation).
pub fn verify(files_dir: &Path, reference: &str) -> Result<Seal> {
    let seal = read_seal(files_dir, reference)?;
    let zip_bytes = std::fs::read(zip_path(files_dir, reference))?;
    seal.validate(&zip_bytes)?;
    Ok(seal)
}

/// Extract the zip stored under `reference` into `dest`, rejecting any
/// entry whose normalized path would escape `dest` (spec §4.3 step 4,
/// testable property 6).
pub fn extract(files_dir: &Path, reference: &str, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let dest = dest
        .canonicalize()
        .unwrap_or_else(|_| dest.to_path_buf());
    let file = File::open(zip_path(files_dir, reference))?;
    let mut archive = zip::ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(enclosed) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(ArtError::UnsafeArchive(entry.name().to_string()));
        };
        let out_path = dest.join(&enclosed);
        let normalized = normalize(&out_path);
        if !normalized.starts_with(&dest) {
            return Err(ArtError::UnsafeArchive(entry.name().to_string()));
        }
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        out_file.write_all(&buf)?;
    }
    Ok(())
}

/// Lexical normalization (no filesystem access): collapses `.`/`..`
/// components so a zip-slip entry can be caught even when `dest` itself
/// does not yet exist on disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Delete both files of a `(zip, json)` pair.
pub fn delete(files_dir: &Path, reference: &str) -> Result<()> {
    let zip = zip_path(files_dir, reference);
    let json = files_dir.join(format!("{reference}.json"));
    if zip.exists() {
        std::fs::remove_file(zip)?;
    }
    if json.exists() {
        std::fs::remove_file(json)?;
    }
    Ok(())
}
