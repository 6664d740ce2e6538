//! Path planning: turns a selection into the ordered list of archive entries.
//!
//! The plan is a lazy iterator over `Result<ArchiveEntry>`. Directory walks are
//! sorted by file name, so planning the same filesystem snapshot twice yields
//! the same order. Archive names are unique within one plan: a later entry
//! whose name is already taken gets a ` (2)`, ` (3)`, ... suffix before its
//! extension.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};
use crate::fs_ops::archive_name_from;
use crate::model::{ArchiveEntry, InclusionPolicy, SelectionItem, SelectionKind};

/// Plans archive entries for a fixed selection and policy.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    selection: Vec<SelectionItem>,
    policy: InclusionPolicy,
}

impl PathPlanner {
    pub fn new(selection: Vec<SelectionItem>, policy: InclusionPolicy) -> Self {
        PathPlanner { selection, policy }
    }

    /// Start a fresh pass over the selection.
    pub fn plan(&self) -> Plan<'_> {
        Plan {
            items: self.selection.iter(),
            policy: self.policy,
            walk: None,
            taken: HashSet::new(),
        }
    }

    /// Collect the whole plan and the sum of its entry sizes.
    ///
    /// # Errors
    /// Fails on the first item that is missing or is not a file/directory.
    pub fn plan_all(&self) -> Result<(Vec<ArchiveEntry>, u64)> {
        let entries = self.plan().collect::<Result<Vec<_>>>()?;
        let total = entries.iter().map(|e| e.size_bytes).sum();
        Ok((entries, total))
    }
}

/// Lazy iterator produced by [`PathPlanner::plan`].
pub struct Plan<'a> {
    items: std::slice::Iter<'a, SelectionItem>,
    policy: InclusionPolicy,
    walk: Option<DirectoryWalk>,
    /// Archive names handed out so far
    taken: HashSet<String>,
}

struct DirectoryWalk {
    /// Name of the selected directory, used as the first archive segment
    root_name: OsString,
    root: PathBuf,
    iter: walkdir::IntoIter,
}

impl Iterator for Plan<'_> {
    type Item = Result<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next_planned()?;
        Some(next.map(|mut entry| {
            entry.archive_name = self.claim_name(entry.archive_name);
            entry
        }))
    }
}

impl Plan<'_> {
    fn next_planned(&mut self) -> Option<Result<ArchiveEntry>> {
        loop {
            if let Some(walk) = self.walk.as_mut() {
                match walk.next_entry() {
                    Some(entry) => return Some(entry),
                    None => self.walk = None,
                }
            }

            let item = self.items.next()?;
            match item.kind {
                SelectionKind::File => return Some(plan_file(&item.path)),
                SelectionKind::Directory => match DirectoryWalk::open(&item.path, self.policy) {
                    Ok(walk) => self.walk = Some(walk),
                    Err(err) => return Some(Err(err)),
                },
            }
        }
    }

    /// Reserve `name`, or the first free numbered variant of it.
    fn claim_name(&mut self, name: String) -> String {
        if self.taken.insert(name.clone()) {
            return name;
        }
        let mut counter = 2usize;
        loop {
            let candidate = numbered_name(&name, counter);
            if self.taken.insert(candidate.clone()) {
                warn!(original = %name, renamed = %candidate, "duplicate archive name");
                return candidate;
            }
            counter += 1;
        }
    }
}

/// `dir/notes.txt` -> `dir/notes (n).txt`; names without an extension get the
/// suffix at the end.
fn numbered_name(name: &str, counter: usize) -> String {
    let (dir, file) = match name.rfind('/') {
        Some(at) => name.split_at(at + 1),
        None => ("", name),
    };
    match file.rfind('.') {
        Some(dot) if dot > 0 => format!(
            "{}{} ({}){}",
            dir,
            &file[..dot],
            counter,
            &file[dot..]
        ),
        _ => format!("{}{} ({})", dir, file, counter),
    }
}

impl DirectoryWalk {
    fn open(root: &Path, policy: InclusionPolicy) -> Result<Self> {
        check_kind(root, SelectionKind::Directory)?;

        let root_name = match root.file_name() {
            Some(name) => name.to_os_string(),
            None => fs::canonicalize(root)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_os_string()))
                .unwrap_or_else(|| OsString::from("root")),
        };

        let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
        if !policy.recurse_subdirectories {
            walker = walker.max_depth(1);
        }

        Ok(DirectoryWalk {
            root_name,
            root: root.to_path_buf(),
            iter: walker.into_iter(),
        })
    }

    fn next_entry(&mut self) -> Option<Result<ArchiveEntry>> {
        loop {
            let entry = match self.iter.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    // Unreadable subdirectories are skipped, like the size walk does.
                    warn!(root = %self.root.display(), error = %err, "skipping unreadable path");
                    continue;
                }
            };

            let path = entry.path();
            let metadata = match fs::metadata(path) {
                Ok(metadata) => metadata,
                // Vanished after listing; the writer records it as a failed entry.
                Err(_) if !entry.file_type().is_dir() => {
                    return Some(Ok(self.entry_for(path, 0)));
                }
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            return Some(Ok(self.entry_for(path, metadata.len())));
        }
    }

    fn entry_for(&self, path: &Path, size_bytes: u64) -> ArchiveEntry {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let archive_name = archive_name_from(&Path::new(&self.root_name).join(relative));
        ArchiveEntry {
            source_path: path.to_path_buf(),
            archive_name,
            size_bytes,
        }
    }
}

fn plan_file(path: &Path) -> Result<ArchiveEntry> {
    let metadata = check_kind(path, SelectionKind::File)?;
    let archive_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| EngineError::InvalidSelection {
            path: path.to_path_buf(),
            reason: "file selection has no file name".to_string(),
        })?;

    Ok(ArchiveEntry {
        source_path: path.to_path_buf(),
        archive_name,
        size_bytes: metadata.len(),
    })
}

/// Verify a selection item still exists with the expected kind.
fn check_kind(path: &Path, expected: SelectionKind) -> Result<fs::Metadata> {
    let metadata = fs::metadata(path).map_err(|e| EngineError::io(path, e))?;
    let actual_matches = match expected {
        SelectionKind::File => metadata.is_file(),
        SelectionKind::Directory => metadata.is_dir(),
    };
    if actual_matches {
        Ok(metadata)
    } else {
        Err(EngineError::InvalidSelection {
            path: path.to_path_buf(),
            reason: format!("expected a {:?}", expected).to_lowercase(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(planner: &PathPlanner) -> Vec<String> {
        planner
            .plan()
            .map(|entry| entry.expect("Failed to plan entry").archive_name)
            .collect()
    }

    fn make_tree(root: &Path) {
        fs::create_dir_all(root.join("sub").join("deeper")).expect("Failed to create dirs");
        fs::write(root.join("b.txt"), "bb").expect("Failed to write b");
        fs::write(root.join("a.txt"), "a").expect("Failed to write a");
        fs::write(root.join("sub").join("c.txt"), "ccc").expect("Failed to write c");
        fs::write(root.join("sub").join("deeper").join("d.txt"), "dddd")
            .expect("Failed to write d");
    }

    #[test]
    fn test_plan_top_level_only() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("project");
        make_tree(&root);

        let planner = PathPlanner::new(
            vec![SelectionItem::directory(&root)],
            InclusionPolicy::top_level_only(),
        );
        assert_eq!(names(&planner), vec!["project/a.txt", "project/b.txt"]);
    }

    #[test]
    fn test_plan_recursive_keeps_structure() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("project");
        make_tree(&root);

        let planner =
            PathPlanner::new(vec![SelectionItem::directory(&root)], InclusionPolicy::recursive());
        assert_eq!(
            names(&planner),
            vec![
                "project/a.txt",
                "project/b.txt",
                "project/sub/c.txt",
                "project/sub/deeper/d.txt",
            ]
        );

        let (entries, total) = planner.plan_all().expect("Failed to plan");
        assert_eq!(entries.len(), 4);
        assert_eq!(total, 10);
    }

    #[test]
    fn test_plan_is_restartable() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("project");
        make_tree(&root);

        let planner =
            PathPlanner::new(vec![SelectionItem::directory(&root)], InclusionPolicy::recursive());
        assert_eq!(names(&planner), names(&planner));
    }

    #[test]
    fn test_plan_file_uses_base_name() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("notes.md");
        fs::write(&file, "hello").expect("Failed to write file");

        let planner =
            PathPlanner::new(vec![SelectionItem::file(&file)], InclusionPolicy::default());
        let (entries, total) = planner.plan_all().expect("Failed to plan");
        assert_eq!(entries[0].archive_name, "notes.md");
        assert_eq!(entries[0].source_path, file);
        assert_eq!(total, 5);
    }

    #[test]
    fn test_plan_missing_item_is_not_found() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let planner = PathPlanner::new(
            vec![SelectionItem::file(temp_dir.path().join("gone.txt"))],
            InclusionPolicy::default(),
        );
        let result = planner.plan_all();
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    #[test]
    fn test_plan_kind_mismatch_is_invalid_selection() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let planner = PathPlanner::new(
            vec![SelectionItem::file(temp_dir.path())],
            InclusionPolicy::default(),
        );
        let result = planner.plan_all();
        assert!(matches!(result, Err(EngineError::InvalidSelection { .. })));
    }

    #[test]
    fn test_plan_renames_duplicate_names() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        for dir in ["a", "b", "c"] {
            fs::create_dir(temp_dir.path().join(dir)).expect("Failed to create dir");
            fs::write(temp_dir.path().join(dir).join("notes.txt"), dir)
                .expect("Failed to write notes");
        }

        let planner = PathPlanner::new(
            ["a", "b", "c"]
                .iter()
                .map(|dir| SelectionItem::file(temp_dir.path().join(dir).join("notes.txt")))
                .collect(),
            InclusionPolicy::default(),
        );
        assert_eq!(
            names(&planner),
            vec!["notes.txt", "notes (2).txt", "notes (3).txt"]
        );
    }

    #[test]
    fn test_plan_same_named_directories() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("project");
        make_tree(&root);

        // A second directory that is also called "project"
        let loose = temp_dir.path().join("loose");
        fs::create_dir(&loose).expect("Failed to create dir");
        fs::create_dir(loose.join("project")).expect("Failed to create dir");
        fs::write(loose.join("project").join("a.txt"), "x").expect("Failed to write a");

        let planner = PathPlanner::new(
            vec![
                SelectionItem::directory(&root),
                SelectionItem::directory(loose.join("project")),
            ],
            InclusionPolicy::top_level_only(),
        );
        assert_eq!(
            names(&planner),
            vec!["project/a.txt", "project/b.txt", "project/a (2).txt"]
        );
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("notes.txt", 2), "notes (2).txt");
        assert_eq!(numbered_name("dir/archive.tar.gz", 3), "dir/archive.tar (3).gz");
        assert_eq!(numbered_name("dir/README", 2), "dir/README (2)");
        assert_eq!(numbered_name(".bashrc", 2), ".bashrc (2)");
        assert_eq!(numbered_name("v1.0/notes", 2), "v1.0/notes (2)");
    }

    #[test]
    fn test_plan_empty_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let planner = PathPlanner::new(
            vec![SelectionItem::directory(temp_dir.path())],
            InclusionPolicy::recursive(),
        );
        let (entries, total) = planner.plan_all().expect("Failed to plan");
        assert!(entries.is_empty());
        assert_eq!(total, 0);
    }
}
