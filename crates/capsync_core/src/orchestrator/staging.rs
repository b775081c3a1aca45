//! Copying captures into fast local storage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::jobs::Job;

use super::errors::StagingError;

/// Make the job's source available at its staging path.
///
/// A staged copy left by an earlier run is reused when its size matches
/// the source. Otherwise the source is copied to `<staging>.partial` and
/// renamed into place, so a partially copied file is never mistaken for a
/// complete one.
///
/// Returns true when an existing copy was reused.
pub fn stage_job(job: &Job) -> Result<bool, StagingError> {
    let source = job.source_path();
    let target = job.staging_path();

    let source_size = match fs::metadata(source) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StagingError::SourceMissing(source.to_path_buf()));
        }
        Err(e) => return Err(StagingError::io("stat source", source, e)),
    };

    if let Ok(meta) = fs::metadata(target) {
        if meta.is_file() && meta.len() == source_size {
            tracing::debug!("Reusing staged copy {}", target.display());
            return Ok(true);
        }
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| StagingError::io("create staging dir", parent, e))?;
    }

    let partial = partial_path(target);
    let copied = fs::copy(source, &partial).and_then(|_| fs::rename(&partial, target));
    if let Err(e) = copied {
        let _ = fs::remove_file(&partial);
        return Err(StagingError::io("copy to staging", target, e));
    }

    tracing::debug!(
        "Staged {} ({} bytes) -> {}",
        source.display(),
        source_size,
        target.display()
    );
    Ok(false)
}

/// Delete a job's staged copy. Missing files are not an error.
pub fn release_staged(job: &Job) {
    let target = job.staging_path();
    match fs::remove_file(target) {
        Ok(()) => tracing::debug!("Released {}", target.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove staged file {}: {}", target.display(), e),
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}
