//! Where a function's code lives locally and in the scratch directory.

use std::path::{Path, PathBuf};

/// Immutable description of the package being synchronized.
#[derive(Debug, Clone)]
pub struct PackageReference {
    local_root: PathBuf,
    function_identifier: String,
    archive_path: PathBuf,
    manifest_path: PathBuf,
}

impl PackageReference {
    /// Derive the archive and manifest locations for `function_identifier`
    /// inside `scratch_dir`.
    pub fn new(
        local_root: impl Into<PathBuf>,
        function_identifier: impl Into<String>,
        scratch_dir: &Path,
    ) -> Self {
        let function_identifier = function_identifier.into();
        let file_stem = scratch_file_stem(&function_identifier);

        Self {
            local_root: local_root.into(),
            archive_path: scratch_dir.join(format!("{file_stem}.zip")),
            manifest_path: scratch_dir.join(format!(".function-sync.{file_stem}.json")),
            function_identifier,
        }
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn function_identifier(&self) -> &str {
        &self.function_identifier
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }
}

/// Function identifiers may be ARNs; keep the derived file names flat.
fn scratch_file_stem(function_identifier: &str) -> String {
    function_identifier
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}
