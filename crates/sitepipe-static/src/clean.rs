//! Pre-build cleanup.

use std::fs;
use std::io::ErrorKind;

use crate::error::AssetError;
use crate::paths::Paths;

/// Delete the build output directory wholesale.
///
/// Returns whether anything was removed.
pub fn remove_output_dir(paths: &Paths) -> Result<bool, AssetError> {
    let dir = &paths.dist.base.dir;
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::debug!("Removed {}", dir.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AssetError::remove(dir, e)),
    }
}

/// Delete the dependency lock file.
///
/// Returns whether anything was removed.
pub fn remove_lock_file(paths: &Paths) -> Result<bool, AssetError> {
    let file = &paths.base.package_lock;
    match fs::remove_file(file) {
        Ok(()) => {
            tracing::debug!("Removed {}", file.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AssetError::remove(file, e)),
    }
}
