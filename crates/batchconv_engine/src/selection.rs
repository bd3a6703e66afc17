use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use batchconv_core::LanguagePair;
use batchconv_logging::{conv_debug, conv_warn};
use walkdir::WalkDir;

/// Expands a user selection into the source files to convert.
///
/// Directories are walked recursively in file-name order and contribute every
/// file with the source extension. Named files are kept only if they are
/// source files. Duplicates are dropped by normalised path, first one wins.
pub fn normalise_selection(paths: &[PathBuf], languages: &LanguagePair) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    let mut keep = |path: PathBuf| {
        let path = lexical_normalise(&path);
        if seen.insert(dedupe_key(&path)) {
            selected.push(path);
        }
    };

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() && languages.is_source(entry.path()) => {
                        keep(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(err) => conv_warn!("Skipping unreadable entry under {}: {}", path.display(), err),
                }
            }
        } else if languages.is_source(path) {
            keep(path.clone());
        } else {
            conv_debug!("Ignoring {}: not a .{} file", path.display(), languages.source_ext());
        }
    }

    selected
}

/// Resolves `.` and `..` without touching the filesystem.
fn lexical_normalise(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(windows)]
fn dedupe_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

#[cfg(not(windows))]
fn dedupe_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
