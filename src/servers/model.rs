// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host and VM records.
//!
//! Hosts own their VMs. A VM only remembers the identifier of its host, which
//! is resolved against a host listing on demand through [`Vm::parent`].

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::{
    collections::BTreeMap,
    path::PathBuf,
};
use uuid::Uuid;

/// Operating system family of a server.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ServerKind {
    Windows,
    StandardLinux,
    TrueNasScale,
    #[default]
    #[serde(other)]
    Unspecified,
}

/// Contents of `metadata.yaml`.
#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerMetadata {
    pub display_name: String,
    pub name: String,
    pub ip_address: String,
    pub description: String,
    pub kind: ServerKind,

    /// Position among siblings. Maintained by the caller.
    pub display_index: u32,
}

impl ServerMetadata {
    /// Minimal metadata for a record directory lacking `metadata.yaml`.
    pub fn from_dir_name(dir_name: &str) -> Self {
        Self {
            display_name: dir_name.to_string(),
            name: dir_name.to_string(),
            ..Default::default()
        }
    }
}

/// Contents of `docker.yaml`, kept verbatim.
#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DockerCompose(pub Mapping);

/// Contents of `config.yaml`, kept verbatim.
#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ServerConfiguration(pub Mapping);

/// Fields shared by hosts and VMs.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ServerBase {
    /// Stable identity. Assigned on first save when unset.
    pub unique_id: Option<Uuid>,

    /// Directory the record was read from or written to. Never persisted.
    pub directory_path: Option<PathBuf>,

    pub metadata: Option<ServerMetadata>,
    pub docker_compose: Option<DockerCompose>,
    pub configuration: Option<ServerConfiguration>,
}

impl ServerBase {
    /// Construct unsaved record base with given metadata.
    pub fn new(metadata: ServerMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Default::default()
        }
    }

    /// Name from metadata, or empty if there is no metadata.
    pub fn name(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|metadata| metadata.name.as_str())
            .unwrap_or_default()
    }
}

/// Physical or primary server.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub base: ServerBase,

    /// VMs running on this host.
    pub vms: Vec<Vm>,
}

impl Host {
    /// Construct unsaved host without VMs.
    pub fn new(metadata: ServerMetadata) -> Self {
        Self {
            base: ServerBase::new(metadata),
            vms: Vec::new(),
        }
    }
}

/// Virtual machine nested inside a host.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Vm {
    pub base: ServerBase,

    /// Identifier of the owning host. Set when read from disk or saved.
    pub parent_host_id: Option<Uuid>,
}

impl Vm {
    /// Construct unsaved VM.
    pub fn new(metadata: ServerMetadata) -> Self {
        Self {
            base: ServerBase::new(metadata),
            parent_host_id: None,
        }
    }

    /// Resolve owning host in a host listing.
    pub fn parent<'a>(&self, hosts: &'a [Host]) -> Option<&'a Host> {
        let id = self.parent_host_id?;
        hosts.iter().find(|host| host.base.unique_id == Some(id))
    }
}

/// Borrowed view over either kind of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRecord<'a> {
    Host(&'a Host),
    Vm(&'a Vm),
}

impl<'a> ServerRecord<'a> {
    /// Shared fields of the record.
    pub fn base(&self) -> &'a ServerBase {
        match self {
            Self::Host(host) => &host.base,
            Self::Vm(vm) => &vm.base,
        }
    }

    pub fn is_vm(&self) -> bool {
        matches!(self, Self::Vm(_))
    }
}

/// Flatten hosts and their VMs into one listing, each host followed by its
/// VMs.
pub fn flatten(hosts: &[Host]) -> Vec<ServerRecord<'_>> {
    hosts
        .iter()
        .flat_map(|host| {
            std::iter::once(ServerRecord::Host(host)).chain(host.vms.iter().map(ServerRecord::Vm))
        })
        .collect()
}

/// Names used by more than one record across hosts and VMs, sorted.
///
/// Uniqueness is not enforced on write. This only reports collisions so the
/// caller can surface them.
pub fn duplicate_names(hosts: &[Host]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in flatten(hosts) {
        *counts.entry(record.base().name()).or_default() += 1;
    }

    counts
        .into_iter()
        .filter(|(name, count)| !name.is_empty() && *count > 1)
        .map(|(name, _)| name.to_string())
        .collect()
}
