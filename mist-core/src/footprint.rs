//! mtime marker files.
//!
//! A footprint is a tiny file whose modification time is the datum: liveness
//! beacons, valve transition timestamps and the hazard latch all live here.
//! Markers survive process restarts, which is what lets duty timing and the
//! hazard rate limit carry across a crash.

use std::path::Path;
use std::time::{Duration, SystemTime};

use mist_error::{CoolerError, Result};

/// Create or refresh a marker. The write goes to a sibling temp file first
/// and is renamed into place so observers never see a half-written marker.
pub fn update(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| CoolerError::FileWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, b"").map_err(|source| CoolerError::FileWrite {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| CoolerError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Remove a marker. Missing markers are not an error.
pub fn clear(path: impl AsRef<Path>) -> Result<()> {
    match std::fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CoolerError::FileWrite {
            path: path.as_ref().to_path_buf(),
            source,
        }),
    }
}

pub fn exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

/// Marker modification time, if the marker exists.
pub fn mtime(path: impl AsRef<Path>) -> Option<SystemTime> {
    std::fs::metadata(path.as_ref()).and_then(|m| m.modified()).ok()
}

/// Seconds since the marker was last updated. Missing markers report an
/// effectively infinite age so freshness checks fail closed.
pub fn elapsed(path: impl AsRef<Path>) -> f64 {
    match mtime(path) {
        Some(modified) => SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64(),
        None => f64::MAX,
    }
}
