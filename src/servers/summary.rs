// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Human readable change summaries.
//!
//! Git reports changes per file. Users think in hosts. Changed files are
//! grouped by what happened to them and by the host directory they fall
//! under, then each group is described with one line.

use crate::{
    servers::{
        layout::{decode_dir_name, RecordKind, SERVERS_DIR},
        model::Host,
    },
    sync::status::{ChangeKind, RepositoryChangeSet},
};

use std::{
    collections::BTreeMap,
    fs,
    path::{Component, Path},
};
use tracing::{debug, warn};

/// Coarse grouping of file changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeGroup {
    Added,
    Modified,
    Removed,
}

impl ChangeGroup {
    /// Group a raw change kind, or `None` if the kind has no summary.
    pub fn from_kind(kind: ChangeKind) -> Option<Self> {
        match kind {
            ChangeKind::Added | ChangeKind::Untracked => Some(Self::Added),
            ChangeKind::Modified | ChangeKind::Staged => Some(Self::Modified),
            ChangeKind::Removed | ChangeKind::Missing => Some(Self::Removed),
            ChangeKind::Renamed | ChangeKind::TypeChange | ChangeKind::Conflicted => None,
        }
    }
}

/// Describe changes per host.
///
/// `hosts` is the current listing of the store, and `servers_dir` the
/// directory it was read from. Lines are ordered by group, then by host
/// directory name.
pub fn describe_changes(
    changes: &RepositoryChangeSet,
    hosts: &[Host],
    servers_dir: &Path,
) -> Vec<String> {
    let mut groups: BTreeMap<(ChangeGroup, String), usize> = BTreeMap::new();
    for (path, kind) in changes.iter() {
        let Some(group) = ChangeGroup::from_kind(kind) else {
            warn!("skip {kind} change to {:?}", path.display());
            continue;
        };

        let Some(host_dir) = host_dir_of(path) else {
            debug!("ignore change outside of servers: {:?}", path.display());
            continue;
        };

        *groups.entry((group, host_dir)).or_default() += 1;
    }

    groups
        .into_iter()
        .map(|((group, host_dir), changed)| {
            let host = match decode_dir_name(&host_dir) {
                Ok((RecordKind::Host, id)) => hosts.iter().find(|host| host.base.unique_id == Some(id)),
                _ => None,
            };

            let Some(host) = host else {
                return format!("deleted host with id {host_dir}");
            };

            let name = host.base.name();
            match group {
                ChangeGroup::Added if count_files(&servers_dir.join(&host_dir)) == changed => {
                    format!("created new host: {name}")
                }
                ChangeGroup::Added => format!("updating host with new features: {name}"),
                ChangeGroup::Modified => format!("modified host: {name}"),
                ChangeGroup::Removed => format!("removing features from host: {name}"),
            }
        })
        .collect()
}

// First path segment under "servers/", provided there is something below it.
fn host_dir_of(path: &Path) -> Option<String> {
    let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
    match components.next()? {
        Component::Normal(first) if first == SERVERS_DIR => {}
        _ => return None,
    }

    match components.next()? {
        Component::Normal(host_dir) => Some(host_dir.to_string_lossy().into_owned()),
        _ => None,
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| match entry.file_type() {
            Ok(kind) if kind.is_dir() => count_files(&entry.path()),
            Ok(_) => 1,
            Err(_) => 0,
        })
        .sum()
}
