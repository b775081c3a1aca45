//! Job discovery from a directory tree of capture files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::job::Job;

/// Errors from scanning the input tree.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Input root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not under data root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// Where discovered jobs read from and write to.
#[derive(Debug, Clone)]
pub struct DiscoveryRoots<'a> {
    pub input_root: &'a Path,
    pub output_root: &'a Path,
    pub staging_dir: &'a Path,
}

/// Recursively discover capture files and build one job per file.
///
/// Files match when their extension equals `extension` (case-insensitive).
/// Symlinked directories are not followed. Jobs are ordered by ascending
/// file size so small captures run (and fail) first; ties are ordered by
/// path.
pub fn discover_jobs(roots: &DiscoveryRoots<'_>, extension: &str) -> Result<Vec<Job>, DiscoveryError> {
    if !roots.input_root.is_dir() {
        return Err(DiscoveryError::RootNotFound(roots.input_root.to_path_buf()));
    }
    let input_root = fs::canonicalize(roots.input_root).map_err(|source| DiscoveryError::Io {
        path: roots.input_root.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    collect_files(&input_root, extension, &mut files)?;
    files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let jobs = files
        .into_iter()
        .map(|(path, size)| Job::new(&path, &input_root, roots.output_root, roots.staging_dir, size))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        "Discovered {} capture files under {}",
        jobs.len(),
        input_root.display()
    );
    Ok(jobs)
}

fn collect_files(
    dir: &Path,
    extension: &str,
    out: &mut Vec<(PathBuf, u64)>,
) -> Result<(), DiscoveryError> {
    let io_err = |source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let file_type = entry.file_type().map_err(io_err)?;
        let path = entry.path();

        if file_type.is_dir() {
            collect_files(&path, extension, out)?;
        } else if matches_extension(&path, extension) {
            // Follows file symlinks; a dangling link is reported as an error.
            let size = fs::metadata(&path)
                .map_err(|source| DiscoveryError::Io {
                    path: path.clone(),
                    source,
                })?
                .len();
            out.push((path, size));
        }
    }
    Ok(())
}

fn matches_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, size: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; size]).unwrap();
    }

    #[test]
    fn finds_nested_captures_sorted_by_size() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("in");
        write(&root.join("a/big.bag"), 30);
        write(&root.join("b/c/small.BAG"), 5);
        write(&root.join("mid.bag"), 10);
        write(&root.join("notes.txt"), 1);

        let out = dir.path().join("out");
        let fast = dir.path().join("fast");
        let roots = DiscoveryRoots {
            input_root: &root,
            output_root: &out,
            staging_dir: &fast,
        };
        let jobs = discover_jobs(&roots, "bag").unwrap();

        let refs: Vec<_> = jobs.iter().map(|j| j.reference_id().to_string()).collect();
        assert_eq!(refs, vec!["b_c_small.BAG", "mid.bag", "a_big.bag"]);
        assert!(jobs[0].source_path().is_absolute());
        assert_eq!(jobs[0].source_size(), 5);
    }

    #[test]
    fn equal_sizes_order_by_path() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("in");
        write(&root.join("z.bag"), 4);
        write(&root.join("a.bag"), 4);

        let roots = DiscoveryRoots {
            input_root: &root,
            output_root: dir.path(),
            staging_dir: dir.path(),
        };
        let jobs = discover_jobs(&roots, "bag").unwrap();
        assert_eq!(jobs[0].reference_id(), "a.bag");
        assert_eq!(jobs[1].reference_id(), "z.bag");
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let roots = DiscoveryRoots {
            input_root: &missing,
            output_root: dir.path(),
            staging_dir: dir.path(),
        };
        assert!(matches!(
            discover_jobs(&roots, "bag"),
            Err(DiscoveryError::RootNotFound(_))
        ));
    }
}
