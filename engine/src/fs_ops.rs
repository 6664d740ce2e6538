//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Converting filesystem paths to `/`-separated archive names
//! - Resolving archive names back under a restore directory safely
//! - Creating parent directories recursively
//! - Reading and writing whole entries

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{EngineError, Result};

/// Join path components into a `/`-separated archive name.
///
/// Only normal components are kept; `.` and prefixes are dropped.
pub fn archive_name_from(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve an archive-relative name under `root`.
///
/// # Errors
/// Returns `Format` if the name is empty, absolute, or escapes `root` via `..`.
pub fn resolve_under(root: &Path, archive_name: &str) -> Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;

    for part in archive_name.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(EngineError::format(format!(
                    "entry path escapes the restore directory: {}",
                    archive_name
                )))
            }
            _ => {
                if depth == 0 && is_drive_prefix(part) {
                    return Err(EngineError::format(format!(
                        "entry path is not relative: {}",
                        archive_name
                    )));
                }
                resolved.push(part);
                depth += 1;
            }
        }
    }

    if depth == 0 {
        return Err(EngineError::format(format!(
            "entry path is empty: {:?}",
            archive_name
        )));
    }
    Ok(resolved)
}

fn is_drive_prefix(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns `Io` if the parent exists but is not a directory or cannot be created.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::Io {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::Io {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::Io {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// Write a restored entry, creating intermediate directories.
pub fn write_entry(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir_exists(path)?;
    fs::write(path, contents).map_err(|e| EngineError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
