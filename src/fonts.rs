//! Caption font resolution and loading.
//!
//! A bare file name like `arial.ttf` is resolved against the platform's
//! system font directories when it does not exist locally. Resolution and
//! loading both happen during pipeline construction so a missing or broken
//! font is reported before any network call is made.

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;

use crate::error::MemeError;

/// Resolves a font file reference to an on-disk path.
///
/// An existing path (relative or absolute) is returned unchanged; otherwise
/// the bare file name is searched for in the platform font directories.
pub fn resolve_font(font_file: &str) -> Result<PathBuf, MemeError> {
    let direct = PathBuf::from(font_file);
    if direct.is_file() {
        return Ok(direct);
    }

    find_in_dirs(font_file, &system_font_dirs())
        .ok_or_else(|| MemeError::FontNotFound(font_file.to_string()))
}

/// Resolves and loads the font in one step.
pub fn load_font(font_file: &str) -> Result<FontVec, MemeError> {
    let path = resolve_font(font_file)?;
    let bytes = std::fs::read(&path)?;
    FontVec::try_from_vec(bytes).map_err(|_| MemeError::InvalidFont(path.display().to_string()))
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if cfg!(target_os = "windows") {
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    } else if cfg!(target_os = "macos") {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    } else {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            let home = PathBuf::from(home);
            dirs.push(home.join(".fonts"));
            dirs.push(home.join(".local/share/fonts"));
        }
    }
    dirs
}

/// Walks each directory tree looking for a file with the given name.
fn find_in_dirs(file_name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| find_in_tree(file_name, dir))
}

fn find_in_tree(file_name: &str, dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_in_tree(file_name, &path) {
                return Some(found);
            }
        } else if path
            .file_name()
            .is_some_and(|name| name.eq_ignore_ascii_case(file_name))
        {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_path_resolves_to_itself() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let font_path = dir.path().join("custom.ttf");
        std::fs::write(&font_path, b"not really a font").expect("write file");

        let resolved = resolve_font(&font_path.display().to_string()).expect("resolve");
        assert_eq!(resolved, font_path);
    }

    #[test]
    fn missing_font_is_a_font_not_found_error() {
        let err = resolve_font("definitely-not-a-real-font-file.ttf").unwrap_err();
        assert!(matches!(err, MemeError::FontNotFound(_)));
        assert!(err.to_string().contains("definitely-not-a-real-font-file"));
    }

    #[test]
    fn search_descends_into_nested_directories() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let nested = dir.path().join("truetype").join("custom");
        std::fs::create_dir_all(&nested).expect("create nested dirs");
        let font_path = nested.join("fancy.ttf");
        std::fs::write(&font_path, b"bytes").expect("write file");

        let found = find_in_dirs("fancy.ttf", &[dir.path().to_path_buf()]);
        assert_eq!(found, Some(font_path));
    }

    #[test]
    fn search_matches_names_case_insensitively() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let font_path = dir.path().join("Fancy.TTF");
        std::fs::write(&font_path, b"bytes").expect("write file");

        let found = find_in_dirs("fancy.ttf", &[dir.path().to_path_buf()]);
        assert_eq!(found, Some(font_path));
    }

    #[test]
    fn unparsable_font_is_an_invalid_font_error() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let font_path = dir.path().join("broken.ttf");
        std::fs::write(&font_path, b"these are not font bytes").expect("write file");

        let err = load_font(&font_path.display().to_string()).unwrap_err();
        assert!(matches!(err, MemeError::InvalidFont(_)));
    }
}
