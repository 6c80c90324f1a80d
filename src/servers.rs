// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Server inventory store.
//!
//! The inventory is a tree of YAML files inside the working copy of the
//! active profile. The [`ServerStore`] translates between that tree and
//! [`Host`]/[`Vm`] records. See [`layout`] for the exact tree shape.
//!
//! # Writes
//!
//! Saving a host overwrites the files of that host and of every VM passed
//! along with it. Nothing is ever deleted implicitly: a VM dropped from
//! [`Host::vms`] stays on disk until [`ServerStore::delete_vm`] is called for
//! it, and an optional file stays on disk when the matching field is `None`.
//!
//! # Ordering
//!
//! Listings come back in no particular order. Callers sort by
//! [`ServerMetadata::display_index`](model::ServerMetadata::display_index)
//! and are responsible for renumbering siblings themselves.

pub mod layout;
pub mod model;
pub mod summary;

use crate::{
    error::ErrorKind,
    notify::ChangeBus,
    servers::{
        layout::{
            decode_dir_name, encode_dir_name, RecordKind, CONFIG_FILE, DOCKER_FILE,
            METADATA_FILE, SERVERS_DIR,
        },
        model::{Host, ServerBase, ServerMetadata, Vm},
    },
    store::ProfileStore,
    sync::status::RepositoryChangeSet,
};

use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Source of the working copy path records are stored under.
///
/// Consulted on every operation so that profile switches take effect
/// immediately.
pub trait DataPathSource {
    /// Current working copy path, or `None` if none is configured.
    fn data_path(&self) -> Option<PathBuf>;
}

impl DataPathSource for PathBuf {
    fn data_path(&self) -> Option<PathBuf> {
        (!self.as_os_str().is_empty()).then(|| self.clone())
    }
}

impl DataPathSource for ProfileStore {
    fn data_path(&self) -> Option<PathBuf> {
        self.active()
            .ok()
            .map(|profile| profile.repo_data_path)
            .filter(|path| !path.as_os_str().is_empty())
    }
}

impl<T: DataPathSource + ?Sized> DataPathSource for Arc<T> {
    fn data_path(&self) -> Option<PathBuf> {
        (**self).data_path()
    }
}

impl<T: DataPathSource + ?Sized> DataPathSource for &T {
    fn data_path(&self) -> Option<PathBuf> {
        (**self).data_path()
    }
}

/// Notification published after a successful write or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerChange {
    /// Host, along with its listed VMs, was written.
    Saved { id: Uuid },

    /// Host or VM directory was removed.
    Deleted { id: Uuid },
}

/// Maps the `servers/` tree to typed records.
#[derive(Debug)]
pub struct ServerStore<S = Arc<ProfileStore>>
where
    S: DataPathSource,
{
    source: S,
    changes: ChangeBus<ServerChange>,
}

impl<S> ServerStore<S>
where
    S: DataPathSource,
{
    /// Construct new store reading its path from `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            changes: ChangeBus::new(),
        }
    }

    /// Notifications fired after every successful write or delete.
    pub fn changes(&self) -> &ChangeBus<ServerChange> {
        &self.changes
    }

    /// Path of the `servers/` directory, if a working copy is configured.
    pub fn servers_dir(&self) -> Option<PathBuf> {
        self.source.data_path().map(|path| path.join(SERVERS_DIR))
    }

    /// List every host along with its VMs.
    ///
    /// A missing working copy or `servers/` directory yields an empty
    /// listing. Directories whose names are not record identifiers, and
    /// records with malformed YAML files, are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - Return [`ServerError::Io`] if a directory or file cannot be read.
    #[instrument(skip(self), level = "debug")]
    pub fn get_servers(&self) -> Result<Vec<Host>> {
        let Some(servers_dir) = self.servers_dir().filter(|dir| dir.is_dir()) else {
            debug!("no servers directory, nothing to list");
            return Ok(Vec::new());
        };

        let mut hosts = Vec::new();
        for (name, path) in subdirectories(&servers_dir)? {
            let id = match decode_dir_name(&name) {
                Ok((RecordKind::Host, id)) => id,
                Ok((RecordKind::Vm, _)) => {
                    warn!("skip VM directory {name:?} outside of any host");
                    continue;
                }
                Err(error) => {
                    warn!("skip {:?}: {error}", path.display());
                    continue;
                }
            };

            let Some(base) = skip_malformed(read_base(&path, id, &name))? else {
                continue;
            };

            let mut vms = Vec::new();
            for (vm_name, vm_path) in subdirectories(&path)? {
                let vm_id = match decode_dir_name(&vm_name) {
                    Ok((RecordKind::Vm, vm_id)) => vm_id,
                    _ => {
                        debug!("ignore non-VM directory {:?}", vm_path.display());
                        continue;
                    }
                };

                if let Some(base) = skip_malformed(read_base(&vm_path, vm_id, &vm_name))? {
                    vms.push(Vm {
                        base,
                        parent_host_id: Some(id),
                    });
                }
            }

            hosts.push(Host { base, vms });
        }

        let duplicates = model::duplicate_names(&hosts);
        if !duplicates.is_empty() {
            warn!("names used by more than one record: {duplicates:?}");
        }

        Ok(hosts)
    }

    /// Write host and listed VMs, assigning identifiers where missing.
    ///
    /// A host without identifier is new and gets one. A host with one
    /// overwrites the files of its existing directory. The same applies to
    /// each VM. Assigned identifiers and directories are stored back into
    /// `host`.
    ///
    /// # Errors
    ///
    /// - Return [`ServerError::ArgumentInvalid`] if the host or a VM lacks
    ///   metadata.
    /// - Return [`ServerError::InvalidOperation`] if the working copy does
    ///   not exist.
    /// - Return [`ServerError::Io`] or [`ServerError::Yaml`] if writing fails.
    #[instrument(skip(self, host), fields(name = %host.base.name()), level = "debug")]
    pub fn add_or_update_server(&self, host: &mut Host) -> Result<Uuid> {
        if host.base.metadata.is_none() {
            return Err(ServerError::ArgumentInvalid {
                reason: "host has no metadata".into(),
            });
        }

        if host.vms.iter().any(|vm| vm.base.metadata.is_none()) {
            return Err(ServerError::ArgumentInvalid {
                reason: format!("a VM of host {:?} has no metadata", host.base.name()),
            });
        }

        let servers_dir = self.require_servers_dir()?;
        ensure_dir(&servers_dir)?;

        let id = *host.base.unique_id.get_or_insert_with(Uuid::new_v4);
        let host_dir = servers_dir.join(encode_dir_name(RecordKind::Host, id));
        ensure_dir(&host_dir)?;
        write_base(&host_dir, &host.base)?;
        host.base.directory_path = Some(host_dir.clone());

        for vm in host.vms.iter_mut() {
            let vm_id = *vm.base.unique_id.get_or_insert_with(Uuid::new_v4);
            let vm_dir = host_dir.join(encode_dir_name(RecordKind::Vm, vm_id));
            ensure_dir(&vm_dir)?;
            write_base(&vm_dir, &vm.base)?;
            vm.base.directory_path = Some(vm_dir);
            vm.parent_host_id = Some(id);
        }

        info!("saved host {id} with {} VMs", host.vms.len());
        self.changes.publish(&ServerChange::Saved { id });

        Ok(id)
    }

    /// Remove host directory along with every VM nested inside it.
    ///
    /// # Errors
    ///
    /// - Return [`ServerError::InvalidOperation`] if the working copy or the
    ///   host directory does not exist.
    /// - Return [`ServerError::InvalidDataState`] if the host has no
    ///   identifier.
    #[instrument(skip(self, host), fields(name = %host.base.name()), level = "debug")]
    pub fn delete_server(&self, host: &Host) -> Result<()> {
        let servers_dir = self.require_servers_dir()?;
        let id = host.base.unique_id.ok_or(ServerError::InvalidDataState {
            reason: "host has no identifier".into(),
        })?;

        let host_dir = servers_dir.join(encode_dir_name(RecordKind::Host, id));
        remove_record_dir(&host_dir)?;
        info!("deleted host {id}");
        self.changes.publish(&ServerChange::Deleted { id });

        Ok(())
    }

    /// Remove a single VM directory.
    ///
    /// # Errors
    ///
    /// - Return [`ServerError::InvalidOperation`] if the working copy or the
    ///   VM directory does not exist.
    /// - Return [`ServerError::InvalidDataState`] if the VM has no identifier
    ///   or no parent host.
    #[instrument(skip(self, vm), fields(name = %vm.base.name()), level = "debug")]
    pub fn delete_vm(&self, vm: &Vm) -> Result<()> {
        let servers_dir = self.require_servers_dir()?;
        let id = vm.base.unique_id.ok_or(ServerError::InvalidDataState {
            reason: "VM has no identifier".into(),
        })?;
        let host_id = vm.parent_host_id.ok_or(ServerError::InvalidDataState {
            reason: format!("VM {id} has no parent host"),
        })?;

        let vm_dir = servers_dir
            .join(encode_dir_name(RecordKind::Host, host_id))
            .join(encode_dir_name(RecordKind::Vm, id));
        remove_record_dir(&vm_dir)?;
        info!("deleted VM {id} of host {host_id}");
        self.changes.publish(&ServerChange::Deleted { id });

        Ok(())
    }

    /// Describe working copy changes per host in plain words.
    ///
    /// # Errors
    ///
    /// - Return any error of [`ServerStore::get_servers`].
    pub fn map_changes_to_human_readable_info(
        &self,
        changes: &RepositoryChangeSet,
    ) -> Result<Vec<String>> {
        let Some(servers_dir) = self.servers_dir() else {
            return Ok(Vec::new());
        };

        let hosts = self.get_servers()?;
        Ok(summary::describe_changes(changes, &hosts, &servers_dir))
    }

    fn require_servers_dir(&self) -> Result<PathBuf> {
        match self.source.data_path() {
            Some(path) if path.is_dir() => Ok(path.join(SERVERS_DIR)),
            Some(path) => Err(ServerError::InvalidOperation {
                reason: format!("working copy {:?} does not exist", path.display()),
            }),
            None => Err(ServerError::InvalidOperation {
                reason: "no working copy configured".into(),
            }),
        }
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(dir).map_err(|source| ServerError::Io {
        source,
        path: dir.to_path_buf(),
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ServerError::Io {
            source,
            path: dir.to_path_buf(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }

    Ok(dirs)
}

fn read_base(dir: &Path, id: Uuid, dir_name: &str) -> Result<ServerBase> {
    let metadata = read_yaml::<ServerMetadata>(&dir.join(METADATA_FILE))?.unwrap_or_else(|| {
        debug!("synthesize metadata for {:?}", dir.display());
        ServerMetadata::from_dir_name(dir_name)
    });

    Ok(ServerBase {
        unique_id: Some(id),
        directory_path: Some(dir.to_path_buf()),
        metadata: Some(metadata),
        docker_compose: read_yaml(&dir.join(DOCKER_FILE))?,
        configuration: read_yaml(&dir.join(CONFIG_FILE))?,
    })
}

fn skip_malformed(result: Result<ServerBase>) -> Result<Option<ServerBase>> {
    match result {
        Ok(base) => Ok(Some(base)),
        Err(error @ ServerError::Yaml { .. }) => {
            warn!("skip record: {error}");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

fn write_base(dir: &Path, base: &ServerBase) -> Result<()> {
    if let Some(metadata) = &base.metadata {
        write_yaml(&dir.join(METADATA_FILE), metadata)?;
    }

    if let Some(docker_compose) = &base.docker_compose {
        write_yaml(&dir.join(DOCKER_FILE), docker_compose)?;
    }

    if let Some(configuration) = &base.configuration {
        write_yaml(&dir.join(CONFIG_FILE), configuration)?;
    }

    Ok(())
}

// INVARIANT: Absent file means absent record part, empty file means default.
fn read_yaml<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned + Default,
{
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(error) if error.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ServerError::Io {
                source,
                path: path.to_path_buf(),
            })
        }
    };

    if data.trim().is_empty() {
        return Ok(Some(T::default()));
    }

    serde_yaml::from_str(&data)
        .map(Some)
        .map_err(|source| ServerError::Yaml {
            source,
            path: path.to_path_buf(),
        })
}

fn write_yaml(path: &Path, value: &impl Serialize) -> Result<()> {
    let data = serde_yaml::to_string(value).map_err(|source| ServerError::Yaml {
        source,
        path: path.to_path_buf(),
    })?;

    fs::write(path, data).map_err(|source| ServerError::Io {
        source,
        path: path.to_path_buf(),
    })
}

fn ensure_dir(path: &Path) -> Result<()> {
    mkdirp::mkdirp(path).map_err(|source| ServerError::Io {
        source,
        path: path.to_path_buf(),
    })?;

    Ok(())
}

fn remove_record_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(ServerError::InvalidOperation {
            reason: format!("record directory {:?} does not exist", path.display()),
        });
    }

    fs::remove_dir_all(path).map_err(|source| ServerError::Io {
        source,
        path: path.to_path_buf(),
    })
}

/// All possible error types for server store interaction.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Required input is missing.
    #[error("invalid argument: {reason}")]
    ArgumentInvalid { reason: String },

    /// Filesystem state does not allow the operation.
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// Record lacks what the operation needs to locate it.
    #[error("invalid data state: {reason}")]
    InvalidDataState { reason: String },

    /// Record file cannot be parsed or rendered.
    #[error("malformed record file {:?}", path.display())]
    Yaml {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },

    /// Record file or directory I/O failed.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl ServerError {
    /// Classify error for presentation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArgumentInvalid { .. } => ErrorKind::ArgumentInvalid,
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::InvalidDataState { .. } => ErrorKind::InvalidDataState,
            Self::Yaml { .. } => ErrorKind::Serialization,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ServerError> = std::result::Result<T, E>;
