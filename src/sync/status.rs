// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Working tree status.
//!
//! A [`RepositoryChangeSet`] is a throwaway snapshot of what Git reports as
//! changed in the working copy. It holds at most one [`ChangeKind`] per path.

use git2::Status;
use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    /// New file staged in the index.
    Added,

    /// Tracked file modified in the working tree.
    Modified,

    /// Deletion staged in the index.
    Removed,

    /// New file not yet staged.
    Untracked,

    /// Modification staged in the index.
    Staged,

    /// Tracked file deleted from the working tree without staging.
    Missing,

    /// File renamed.
    Renamed,

    /// File type changed, e.g. from regular file to symlink.
    TypeChange,

    /// Unresolved merge conflict.
    Conflicted,
}

impl ChangeKind {
    /// Reduce libgit2 status flags to a single kind.
    ///
    /// Index-side flags take precedence over working tree flags. Returns
    /// `None` for unchanged or ignored entries.
    pub fn from_status(status: Status) -> Option<Self> {
        let kind = if status.is_conflicted() {
            Self::Conflicted
        } else if status.is_index_new() {
            Self::Added
        } else if status.is_index_deleted() {
            Self::Removed
        } else if status.is_index_renamed() {
            Self::Renamed
        } else if status.is_index_typechange() {
            Self::TypeChange
        } else if status.is_index_modified() {
            Self::Staged
        } else if status.is_wt_new() {
            Self::Untracked
        } else if status.is_wt_deleted() {
            Self::Missing
        } else if status.is_wt_modified() {
            Self::Modified
        } else if status.is_wt_renamed() {
            Self::Renamed
        } else if status.is_wt_typechange() {
            Self::TypeChange
        } else {
            return None;
        };

        Some(kind)
    }
}

impl Display for ChangeKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Untracked => "untracked",
            Self::Staged => "staged",
            Self::Missing => "missing",
            Self::Renamed => "renamed",
            Self::TypeChange => "typechange",
            Self::Conflicted => "conflicted",
        };

        fmt.write_str(name)
    }
}

/// Single changed file, path relative to the working copy root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Set of changed files, deduplicated by path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepositoryChangeSet {
    changes: BTreeMap<PathBuf, ChangeKind>,
}

impl RepositoryChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record change unless the path is already recorded.
    ///
    /// Returns `false` if the path was already present.
    pub fn insert(&mut self, change: FileChange) -> bool {
        match self.changes.entry(change.path) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(change.kind);
                true
            }
        }
    }

    /// Kind of change recorded for a path.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<ChangeKind> {
        self.changes.get(path.as_ref()).copied()
    }

    /// Iterate changes ordered by path.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, ChangeKind)> + '_ {
        self.changes
            .iter()
            .map(|(path, kind)| (path.as_path(), *kind))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FromIterator<FileChange> for RepositoryChangeSet {
    fn from_iter<I: IntoIterator<Item = FileChange>>(iter: I) -> Self {
        let mut set = Self::new();
        for change in iter {
            set.insert(change);
        }
        set
    }
}

/// Synchronization state of the working copy.
///
/// Recomputed on demand, in order of precedence: no path configured, path is
/// not a repository, repository without changes, repository with changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    NoRepoPath,
    NoValidRepo,
    Clean,
    Dirty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case(Status::WT_NEW, Some(ChangeKind::Untracked); "untracked")]
    #[test_case(Status::INDEX_NEW, Some(ChangeKind::Added); "added")]
    #[test_case(Status::INDEX_NEW | Status::WT_MODIFIED, Some(ChangeKind::Added); "added then edited")]
    #[test_case(Status::INDEX_MODIFIED, Some(ChangeKind::Staged); "staged")]
    #[test_case(Status::WT_MODIFIED, Some(ChangeKind::Modified); "modified")]
    #[test_case(Status::INDEX_DELETED, Some(ChangeKind::Removed); "removed")]
    #[test_case(Status::WT_DELETED, Some(ChangeKind::Missing); "missing")]
    #[test_case(Status::CONFLICTED, Some(ChangeKind::Conflicted); "conflicted")]
    #[test_case(Status::IGNORED, None; "ignored")]
    #[test_case(Status::CURRENT, None; "current")]
    #[test]
    fn kind_from_status(status: Status, expect: Option<ChangeKind>) {
        pretty_assertions::assert_eq!(ChangeKind::from_status(status), expect);
    }

    #[test]
    fn change_set_keeps_first_kind_per_path() {
        let set: RepositoryChangeSet = [
            FileChange::new("servers/a/metadata.yaml", ChangeKind::Added),
            FileChange::new("servers/a/metadata.yaml", ChangeKind::Modified),
            FileChange::new("servers/b/metadata.yaml", ChangeKind::Missing),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("servers/a/metadata.yaml"), Some(ChangeKind::Added));
        assert_eq!(set.get("servers/b/metadata.yaml"), Some(ChangeKind::Missing));
    }
}
