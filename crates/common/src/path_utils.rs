//! Path helpers for archive-relative asset paths.
//!
//! Asset paths inside an archive and in the metadata sidecar are always
//! POSIX-style and relative to the working directory. Paths coming from
//! archives are untrusted, so resolving one back onto the host must never
//! leave the working directory.

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Lexical path normalization without filesystem access.
///
/// Removes `.` components and resolves `..` components lexically.
/// Does not access the filesystem or resolve symlinks.
///
/// # Arguments
/// * `path` - Path to normalize
///
/// # Returns
/// Normalized path with `.` and `..` resolved lexically.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::ParentDir) | Some(Component::RootDir)
                    )
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

/// Check if a path is within a root directory.
///
/// Uses lexical comparison, does not access filesystem.
///
/// # Arguments
/// * `path` - Path to check
/// * `root` - Root directory that should contain the path
pub fn is_within_root(path: &Path, root: &Path) -> bool {
    let norm_path: PathBuf = lexical_normalize(path);
    let norm_root: PathBuf = lexical_normalize(root);
    norm_path.starts_with(&norm_root)
}

/// Convert a path to POSIX-style string (forward slashes).
///
/// # Arguments
/// * `path` - Path to convert
///
/// # Returns
/// String with forward slashes as separators.
pub fn to_posix_path(path: &Path) -> String {
    path.components()
        .map(|c: Component| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Express `path` relative to `root` as a POSIX string.
///
/// # Errors
/// Returns `PathError::PathOutsideRoot` if `path` is not under `root`.
pub fn relative_posix_path(path: &Path, root: &Path) -> Result<String, PathError> {
    let relative: &Path = path
        .strip_prefix(root)
        .map_err(|_| PathError::PathOutsideRoot {
            path: path.display().to_string(),
            root: root.display().to_string(),
        })?;
    Ok(to_posix_path(relative))
}

/// Resolve a POSIX relative path onto a host directory.
///
/// Empty components are ignored. The result is checked lexically against
/// `root`; absolute inputs and `..` escapes are rejected.
///
/// # Arguments
/// * `relative` - POSIX path, e.g. `images/a.jpg`
/// * `root` - Host directory the path is relative to
///
/// # Errors
/// Returns `PathError::InvalidPath` for an empty or absolute path and
/// `PathError::PathOutsideRoot` if the path escapes `root`.
pub fn resolve_relative_path(relative: &str, root: &Path) -> Result<PathBuf, PathError> {
    if relative.is_empty() || relative.starts_with('/') {
        return Err(PathError::InvalidPath {
            path: relative.to_string(),
        });
    }

    let mut result: PathBuf = root.to_path_buf();
    for component in relative.split('/') {
        if !component.is_empty() {
            result.push(component);
        }
    }

    let normalized: PathBuf = lexical_normalize(&result);
    if !is_within_root(&normalized, root) {
        return Err(PathError::PathOutsideRoot {
            path: relative.to_string(),
            root: root.display().to_string(),
        });
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_normalize_removes_dot() {
        let path: PathBuf = PathBuf::from("/a/./b/./c");
        assert_eq!(lexical_normalize(&path), PathBuf::from("/a/b/c"));
    }

    #[test]
    fn test_lexical_normalize_resolves_dotdot() {
        let path: PathBuf = PathBuf::from("/a/b/../c");
        assert_eq!(lexical_normalize(&path), PathBuf::from("/a/c"));
    }

    #[test]
    fn test_is_within_root_with_dotdot() {
        assert!(!is_within_root(
            Path::new("/project/../etc/passwd"),
            Path::new("/project")
        ));
        assert!(is_within_root(
            Path::new("/project/images/a.jpg"),
            Path::new("/project")
        ));
    }

    #[test]
    fn test_relative_posix_path() {
        let relative: String =
            relative_posix_path(Path::new("/work/images/a.jpg"), Path::new("/work")).unwrap();
        assert_eq!(relative, "images/a.jpg");
    }

    #[test]
    fn test_relative_posix_path_outside_root() {
        let result = relative_posix_path(Path::new("/other/a.jpg"), Path::new("/work"));
        assert!(matches!(result, Err(PathError::PathOutsideRoot { .. })));
    }

    #[test]
    fn test_resolve_relative_path() {
        let resolved: PathBuf = resolve_relative_path("files//doc.pdf", Path::new("/work")).unwrap();
        assert_eq!(resolved, PathBuf::from("/work/files/doc.pdf"));
    }

    #[test]
    fn test_resolve_relative_path_rejects_escape() {
        let result = resolve_relative_path("images/../../secret", Path::new("/work"));
        assert!(matches!(result, Err(PathError::PathOutsideRoot { .. })));
    }

    #[test]
    fn test_resolve_relative_path_rejects_absolute() {
        let result = resolve_relative_path("/etc/passwd", Path::new("/work"));
        assert!(matches!(result, Err(PathError::InvalidPath { .. })));
    }
}
