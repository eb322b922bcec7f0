// Directory discovery module
// Lists regular files under a root, recursively or one level deep

use std::fs;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use crate::error::HashKeepError;
use crate::paths;

/// Source of candidate file paths for a run. The engine plans against this
/// trait so tests can substitute a fixed listing for a live filesystem.
pub trait FileLister {
    /// List regular files under `dir` (a storage-form path relative to the
    /// lister's root; empty string means the root itself), in storage form,
    /// sorted. `recursive` selects full traversal versus one level.
    fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, HashKeepError>;

    /// True if the storage-form path names an existing regular file.
    fn exists(&self, storage: &str) -> bool;
}

/// Filesystem-backed lister rooted at one directory.
pub struct DirLister {
    root: PathBuf,
    /// The checksum file being processed never lists itself
    exclude: Option<PathBuf>,
}

impl DirLister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: None,
        }
    }

    pub fn with_exclude(mut self, exclude: impl Into<PathBuf>) -> Self {
        self.exclude = Some(exclude.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded(&self, path: &Path) -> bool {
        match &self.exclude {
            Some(exclude) => match (path.canonicalize(), exclude.canonicalize()) {
                (Ok(a), Ok(b)) => a == b,
                _ => path == exclude,
            },
            None => false,
        }
    }

    fn list_recursive(&self, dir: &Path, out: &mut Vec<String>) {
        // parallel traversal in its own pool, away from the hashing pool
        for entry_result in WalkDir::new(dir)
            .parallelism(jwalk::Parallelism::RayonNewPool(0))
            .skip_hidden(false)
            .follow_links(false)
        {
            match entry_result {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let path = entry.path();
                    if self.is_excluded(&path) {
                        continue;
                    }
                    if let Some(storage) = paths::relative_storage_path(&path, &self.root) {
                        out.push(storage);
                    }
                }
                Err(e) => {
                    eprintln!("Warning: Error walking directory: {}", e);
                }
            }
        }
    }

    fn list_one_level(&self, dir: &Path, out: &mut Vec<String>) -> Result<(), HashKeepError> {
        // The listing root failing to open (permissions, races) is the same
        // condition as the root not existing, not a per-file failure
        let entries = fs::read_dir(dir).map_err(|e| HashKeepError::RootUnavailable {
            path: dir.to_path_buf(),
            source: e,
        })?;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    eprintln!("Warning: Error reading directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            let is_file = entry
                .file_type()
                .map(|ft| ft.is_file())
                .unwrap_or(false);
            if !is_file || self.is_excluded(&path) {
                continue;
            }
            if let Some(storage) = paths::relative_storage_path(&path, &self.root) {
                out.push(storage);
            }
        }
        Ok(())
    }
}

impl FileLister for DirLister {
    fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, HashKeepError> {
        let target = if dir.is_empty() {
            self.root.clone()
        } else {
            paths::platform_path(&self.root, dir)
        };
        if !target.is_dir() {
            return Err(HashKeepError::RootUnavailable {
                path: target,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "not a directory",
                ),
            });
        }

        let mut out = Vec::new();
        if recursive {
            self.list_recursive(&target, &mut out);
        } else {
            self.list_one_level(&target, &mut out)?;
        }
        out.sort();
        Ok(out)
    }

    fn exists(&self, storage: &str) -> bool {
        paths::platform_path(&self.root, storage).is_file()
    }
}
