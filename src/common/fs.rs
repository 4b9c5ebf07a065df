use std::{
    fs,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::error::{Result, ZonalError};

/// Create the directory if it doesn't exist; error if a non-directory exists there.
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(ZonalError::Io(std::io::Error::other(format!(
                "path exists but is not a directory: {}", path.display()
            ))));
        }
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// First file beneath `root` (searched recursively, in sorted order) whose
/// extension is one of `extensions`, compared case-insensitively.
pub(crate) fn find_file_with_extension(root: &Path, extensions: &[&str]) -> Result<Option<PathBuf>> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ZonalError::Io(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry.path().extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|want| e.eq_ignore_ascii_case(want)));
        if matches {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}
