//! Filesystem path helpers for submap persistence.

use std::path::Path;

/// Whether a string contains only printable ASCII.
pub fn has_only_ascii_characters(s: &str) -> bool {
    s.chars().all(|c| (' '..='~').contains(&c))
}

/// Create a directory path (and its parents) with permissions 0777.
///
/// Returns `true` when the path exists afterwards; an already existing
/// path counts as success. Single exit, no error masking.
pub fn create_path(path: &str) -> bool {
    if path.is_empty() || !has_only_ascii_characters(path) {
        log::error!("Cannot create path with empty or non-ASCII name: '{path}'");
        return false;
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    let created = match builder.create(path) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Unable to make path '{path}': {e}");
            false
        }
    };
    created || Path::new(path).is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_check() {
        assert!(has_only_ascii_characters("/tmp/maps/run_01"));
        assert!(!has_only_ascii_characters("/tmp/mäps"));
        assert!(!has_only_ascii_characters("/tmp/\u{7}bell"));
    }

    #[test]
    fn test_create_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        let nested = nested.to_str().unwrap();
        assert!(create_path(nested));
        assert!(Path::new(nested).is_dir());
        // Creating again is success, not an error.
        assert!(create_path(nested));
    }

    #[test]
    fn test_create_path_rejects_non_ascii() {
        assert!(!create_path("/tmp/ghana_map_tëst"));
    }
}
