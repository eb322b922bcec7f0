// Path normalization utilities
// Checksum files store forward-slash relative paths regardless of platform

use std::path::{Path, PathBuf};

/// Normalize a path string to its storage form: forward slashes, no leading
/// "./" prefix. Accepts backslash-separated input from Windows-made files.
pub fn storage_path(path_str: &str) -> String {
    let mut normalized = path_str.replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized
}

/// Convert a storage-form path into a platform path under `root`.
pub fn platform_path(root: &Path, storage: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in storage.split('/').filter(|c| !c.is_empty()) {
        path.push(component);
    }
    path
}

/// Convert a filesystem path relative to `root` into storage form.
pub fn relative_storage_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Parent directory of a storage-form path, in storage form.
/// Files at the root level map to the empty string.
pub fn parent_dir(storage: &str) -> String {
    match storage.rfind('/') {
        Some(pos) => storage[..pos].to_string(),
        None => String::new(),
    }
}

/// First path component of a storage-form path, or the empty string for
/// root-level files. Used to find the top-level directories a record set spans.
pub fn top_level_dir(storage: &str) -> String {
    match storage.find('/') {
        Some(pos) => storage[..pos].to_string(),
        None => String::new(),
    }
}

/// Join a storage-form directory and file name.
pub fn join_storage(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_normalizes_separators() {
        assert_eq!(storage_path("a\\b\\c.txt"), "a/b/c.txt");
        assert_eq!(storage_path("./a/b.txt"), "a/b.txt");
        assert_eq!(storage_path("plain.txt"), "plain.txt");
    }

    #[test]
    fn parent_and_top_level() {
        assert_eq!(parent_dir("a/b/c.txt"), "a/b");
        assert_eq!(parent_dir("c.txt"), "");
        assert_eq!(top_level_dir("a/b/c.txt"), "a");
        assert_eq!(top_level_dir("c.txt"), "");
    }

    #[test]
    fn join_handles_root_level() {
        assert_eq!(join_storage("", "a.txt"), "a.txt");
        assert_eq!(join_storage("sub", "a.txt"), "sub/a.txt");
    }
}
