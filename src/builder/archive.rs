//! Zip creation, honoring `.buildignore`.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::error::Result;

use super::ignore;

/// Recursively zip `target` into `dest_zip`, excluding any entry matched
/// by `.buildignore` (spec §4.4 step 9).
pub fn zip_directory(target: &Path, dest_zip: &Path) -> Result<()> {
    let patterns = ignore::load(target);
    let file = File::create(dest_zip)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(target).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path == target {
            continue;
        }
        if ignore::is_ignored(path, &patterns) {
            continue;
        }
        let relative = path.strip_prefix(target).expect("entry is under target");
        let name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        writer.start_file(name, options)?;
        let mut buf = Vec::new();
        File::open(path)?.read_to_end(&mut buf)?;
        writer.write_all(&buf)?;
    }
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn zips_files_and_respects_buildignore() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("data.txt"), b"hello").unwrap();
        std::fs::create_dir(src.path().join("excluded")).unwrap();
        std::fs::write(src.path().join("excluded").join("x.txt"), b"skip me").unwrap();
        std::fs::write(src.path().join(".buildignore"), "excluded\n").unwrap();

        let dest = tempdir().unwrap();
        let zip_path = dest.path().join("out.zip");
        zip_directory(src.path(), &zip_path).unwrap();

        let file = File::open(&zip_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "data.txt"));
        assert!(!names.iter().any(|n| n.starts_with("excluded")));
        assert!(!names.iter().any(|n| n == ".buildignore"));
    }
}
