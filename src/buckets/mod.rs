//! Bucket sources
//!
//! The aggregator measures one bucket of test files at a time. When it is
//! not given an explicit list, it asks a [`BucketSource`] to expand the test
//! location into the files belonging to bucket `index` of `total`.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils::paths;

/// Bucket resolution errors
#[derive(Error, Debug)]
pub enum BucketError {
    #[error("No test files given")]
    Empty,

    #[error("{0} is a directory; pass the test files explicitly")]
    DirectoryUnsupported(PathBuf),

    #[error("Bucket index {index} is out of range for {total} buckets")]
    IndexOutOfRange { index: usize, total: usize },
}

/// Supplies the test files for one bucket
pub trait BucketSource: Send + Sync {
    fn files(&self, inputs: &[String], index: usize, total: usize)
        -> Result<Vec<String>, BucketError>;
}

/// Passes explicitly listed test files through unchanged
#[derive(Clone, Debug)]
pub struct FileListSource {
    root: PathBuf,
}

impl FileListSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl BucketSource for FileListSource {
    fn files(
        &self,
        inputs: &[String],
        index: usize,
        total: usize,
    ) -> Result<Vec<String>, BucketError> {
        if index >= total.max(1) {
            return Err(BucketError::IndexOutOfRange { index, total });
        }
        if inputs.is_empty() {
            return Err(BucketError::Empty);
        }

        for input in inputs {
            let path = paths::resolve(&self.root, Path::new(input));
            if path.is_dir() {
                return Err(BucketError::DirectoryUnsupported(path));
            }
        }

        Ok(inputs.to_vec())
    }
}
