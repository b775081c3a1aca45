//! Job definition.

use std::path::{Component, Path, PathBuf};

use super::discovery::DiscoveryError;

/// One capture file to process.
///
/// All paths are derived once from the source path and the data root, so
/// the same file always maps to the same reference id, output folders and
/// staging path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    source_path: PathBuf,
    source_size: u64,
    reference_id: String,
    stem: String,
    output_dir: PathBuf,
    label_dir: PathBuf,
    staging_path: PathBuf,
}

impl Job {
    /// Create a job for `source`, which must live under `data_root`.
    ///
    /// * `output_root` - where the `<name>` and `<name>_label` folders go
    /// * `staging_dir` - fast local storage for the staged copy
    /// * `source_size` - size of the source file in bytes
    pub fn new(
        source: &Path,
        data_root: &Path,
        output_root: &Path,
        staging_dir: &Path,
        source_size: u64,
    ) -> Result<Self, DiscoveryError> {
        let relative = source
            .strip_prefix(data_root)
            .map_err(|_| DiscoveryError::OutsideRoot {
                path: source.to_path_buf(),
                root: data_root.to_path_buf(),
            })?;

        let mut parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        let file_name = parts.pop().ok_or_else(|| DiscoveryError::OutsideRoot {
            path: source.to_path_buf(),
            root: data_root.to_path_buf(),
        })?;
        let stem = Path::new(&file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.clone());

        let reference_id = join_parts(&parts, &file_name);
        let output_name = join_parts(&parts, &stem);

        Ok(Self {
            source_path: source.to_path_buf(),
            source_size,
            staging_path: staging_dir.join(&reference_id),
            output_dir: output_root.join(&output_name),
            label_dir: output_root.join(format!("{}_label", output_name)),
            reference_id,
            stem,
        })
    }

    /// Absolute path of the capture file.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Size of the capture file in bytes at discovery time.
    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    /// Stable checkpoint key: relative path components joined by `_`.
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    /// Capture file name without extension, used in frame file names.
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Folder receiving the `frame_NNNNNN` pair folders.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Folder receiving flat copies of every paired color image.
    pub fn label_dir(&self) -> &Path {
        &self.label_dir
    }

    /// Location of the staged copy in fast storage.
    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }
}

fn join_parts(dirs: &[String], last: &str) -> String {
    let mut all: Vec<&str> = dirs.iter().map(String::as_str).collect();
    all.push(last);
    all.join("_")
}
