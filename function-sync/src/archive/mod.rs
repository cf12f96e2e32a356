//! Zip packaging of function code.
//!
//! The package is built strictly from the manifest, never by scanning the
//! local tree, so stray local files (build output, editor swap files) can
//! never reach the deployed function.

use crate::engine::manifest::Manifest;
use crate::utils::{Result, SyncError};
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;
use tracing::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Unpack every entry of `archive_bytes` into `destination`.
///
/// Intermediate directories are created and existing files are overwritten.
/// Returns the number of files written (directory entries are not counted).
pub fn extract(archive_bytes: &[u8], destination: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let mut written = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            SyncError::Archive(format!("entry escapes destination: {}", entry.name()))
        })?;
        let target = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        out.flush()?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;
        }

        trace!("Extracted {}", target.display());
        written += 1;
    }

    debug!("Extracted {} files into {}", written, destination.display());
    Ok(written)
}

/// Build a package containing exactly the files named in `manifest`.
///
/// Each entry is read from `source_root/<entry>` and stored under the entry
/// name. Entries ending in `/` are stored as directories. A manifest entry
/// that does not exist locally fails the whole build with
/// [`SyncError::MissingFile`].
pub fn build(manifest: &Manifest, source_root: &Path) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let base_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in manifest.iter() {
        let source = source_root.join(entry);

        if entry.ends_with('/') {
            if !source.is_dir() {
                return Err(SyncError::MissingFile(entry.to_string()));
            }
            writer.add_directory(entry.as_str(), base_options)?;
            continue;
        }

        let mut file = fs::File::open(&source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SyncError::MissingFile(entry.to_string()),
            _ => SyncError::Io(e),
        })?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(SyncError::MissingFile(entry.to_string()));
        }

        writer.start_file(entry.as_str(), file_options(base_options, &metadata))?;
        io::copy(&mut file, &mut writer)?;
    }

    let package = writer.finish()?.into_inner();
    debug!("Built package with {} entries ({} bytes)", manifest.len(), package.len());
    Ok(package)
}

/// List the entry names of the archive at `path`, in stored order.
pub fn list_entries(path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(path).map_err(|e| {
        SyncError::Archive(format!("cannot open package {}: {}", path.display(), e))
    })?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| SyncError::Archive(format!("{} is not a readable package: {}", path.display(), e)))?;

    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        names.push(archive.by_index_raw(index)?.name().to_string());
    }

    Ok(names)
}

#[cfg(unix)]
fn file_options(base: SimpleFileOptions, metadata: &fs::Metadata) -> SimpleFileOptions {
    use std::os::unix::fs::PermissionsExt;
    base.unix_permissions(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_options(base: SimpleFileOptions, _metadata: &fs::Metadata) -> SimpleFileOptions {
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(entries: &[&str]) -> Manifest {
        Manifest::from_entries(entries.iter().map(|e| e.to_string()))
    }

    #[test]
    fn test_build_then_extract_reproduces_manifest_files() -> Result<()> {
        let source = TempDir::new()?;
        fs::create_dir(source.path().join("lib"))?;
        fs::write(source.path().join("app.py"), b"def handler(event, ctx):\n    return 1\n")?;
        fs::write(source.path().join("lib/util.py"), vec![0xAB_u8; 4096])?;
        // Not in the manifest, must not be packaged.
        fs::write(source.path().join("scratch.tmp"), b"junk")?;

        let package = build(&manifest(&["app.py", "lib/util.py"]), source.path())?;

        let destination = TempDir::new()?;
        let written = extract(&package, destination.path())?;
        assert_eq!(written, 2);

        for name in ["app.py", "lib/util.py"] {
            assert_eq!(
                fs::read(destination.path().join(name))?,
                fs::read(source.path().join(name))?
            );
        }
        assert!(!destination.path().join("scratch.tmp").exists());

        Ok(())
    }

    #[test]
    fn test_build_fails_on_missing_file() -> Result<()> {
        let source = TempDir::new()?;
        fs::write(source.path().join("app.py"), b"x")?;

        let err = build(&manifest(&["app.py", "gone.py"]), source.path()).unwrap_err();
        assert!(matches!(err, SyncError::MissingFile(ref name) if name == "gone.py"));

        Ok(())
    }

    #[test]
    fn test_build_keeps_directory_entries() -> Result<()> {
        let source = TempDir::new()?;
        fs::create_dir(source.path().join("lib"))?;
        fs::write(source.path().join("lib/util.py"), b"x = 1")?;

        let package = build(&manifest(&["lib/", "lib/util.py"]), source.path())?;

        let scratch = TempDir::new()?;
        let archive_path = scratch.path().join("pkg.zip");
        fs::write(&archive_path, &package)?;
        assert_eq!(list_entries(&archive_path)?, vec!["lib/", "lib/util.py"]);

        Ok(())
    }

    #[test]
    fn test_extract_overwrites_existing_files() -> Result<()> {
        let source = TempDir::new()?;
        fs::write(source.path().join("app.py"), b"remote version")?;
        let package = build(&manifest(&["app.py"]), source.path())?;

        let destination = TempDir::new()?;
        fs::write(destination.path().join("app.py"), b"local edit that gets clobbered")?;

        extract(&package, destination.path())?;
        assert_eq!(fs::read(destination.path().join("app.py"))?, b"remote version");

        Ok(())
    }

    #[test]
    fn test_list_entries_preserves_archive_order() -> Result<()> {
        let source = TempDir::new()?;
        for name in ["zeta.py", "alpha.py", "mid.py"] {
            fs::write(source.path().join(name), name.as_bytes())?;
        }
        let package = build(&manifest(&["zeta.py", "alpha.py", "mid.py"]), source.path())?;

        let scratch = TempDir::new()?;
        let archive_path = scratch.path().join("pkg.zip");
        fs::write(&archive_path, &package)?;

        assert_eq!(list_entries(&archive_path)?, vec!["zeta.py", "alpha.py", "mid.py"]);

        Ok(())
    }

    #[test]
    fn test_list_entries_rejects_corrupt_archive() -> Result<()> {
        let scratch = TempDir::new()?;
        let archive_path = scratch.path().join("pkg.zip");
        fs::write(&archive_path, b"definitely not a zip")?;

        assert!(matches!(list_entries(&archive_path), Err(SyncError::Archive(_))));
        assert!(matches!(
            list_entries(&scratch.path().join("missing.zip")),
            Err(SyncError::Archive(_))
        ));

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_survive_round_trip() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let source = TempDir::new()?;
        let script = source.path().join("bootstrap");
        fs::write(&script, b"#!/bin/sh\n")?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

        let package = build(&manifest(&["bootstrap"]), source.path())?;
        let destination = TempDir::new()?;
        extract(&package, destination.path())?;

        let mode = fs::metadata(destination.path().join("bootstrap"))?.permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        Ok(())
    }
}
