//! Destination naming with collision resolution.

use std::path::{Path, PathBuf};

use crate::TransferError;

/// Inserts `_{counter}` before the last extension of `file_name`.
///
/// `report.pdf` becomes `report_1.pdf`, `README` becomes `README_1`,
/// `archive.tar.gz` becomes `archive.tar_1.gz` and `.env` becomes `.env_1`.
pub fn suffixed_name(file_name: &str, counter: u64) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{counter}.{ext}"),
        None => format!("{stem}_{counter}"),
    }
}

/// Returns a path in `dir` for `file_name` that does not exist yet.
///
/// Uses `dir/file_name` when free, otherwise the first free
/// [`suffixed_name`] counting up from 1. The directory is checked at call
/// time only; nothing is reserved.
pub async fn resolve_destination(dir: &Path, file_name: &str) -> Result<PathBuf, TransferError> {
    let candidate = dir.join(file_name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let mut counter = 1u64;
    loop {
        let candidate = dir.join(suffixed_name(file_name, counter));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        counter += 1;
    }
}
