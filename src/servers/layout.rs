// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! On-disk layout of the inventory.
//!
//! The inventory is a two-level directory tree under `servers/`. Hosts live
//! at the top level in directories named after their identifier. VMs live one
//! level down inside their host's directory, named after their identifier
//! with a [`VM_PREFIX`] in front, which is how they are told apart from
//! other entries of the host directory:
//!
//! ```text
//! <repo>/
//!   servers/
//!     0f8fad5b-d9cb-469f-a165-70867728950e/
//!       metadata.yaml
//!       docker.yaml        (optional)
//!       config.yaml        (optional)
//!       vm-7c9e6679-7425-40de-944b-e07fc1f90ae7/
//!         metadata.yaml
//! ```
//!
//! File names are fixed. Directory names are the only place where identity
//! and record kind are encoded, so all encoding and decoding goes through
//! [`encode_dir_name`] and [`decode_dir_name`].

use uuid::Uuid;

/// Directory under the repository root holding every host.
pub const SERVERS_DIR: &str = "servers";

/// Required record metadata.
pub const METADATA_FILE: &str = "metadata.yaml";

/// Optional docker compose settings.
pub const DOCKER_FILE: &str = "docker.yaml";

/// Optional free-form configuration.
pub const CONFIG_FILE: &str = "config.yaml";

/// Prefix marking a VM directory inside a host directory.
pub const VM_PREFIX: &str = "vm-";

const HYPHENATED_LEN: usize = 36;

/// Kind of record a directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Host,
    Vm,
}

/// Encode record kind and identifier as a directory name.
pub fn encode_dir_name(kind: RecordKind, id: Uuid) -> String {
    match kind {
        RecordKind::Host => id.hyphenated().to_string(),
        RecordKind::Vm => format!("{VM_PREFIX}{}", id.hyphenated()),
    }
}

/// Decode directory name into record kind and identifier.
///
/// Only names exactly as [`encode_dir_name`] produces them are accepted, so
/// every decoded record maps back to the directory it was read from.
///
/// # Errors
///
/// - Return [`LayoutError::InvalidDirName`] if the name is not a (prefixed)
///   lowercase hyphenated identifier.
pub fn decode_dir_name(name: &str) -> Result<(RecordKind, Uuid), LayoutError> {
    let (kind, raw) = match name.strip_prefix(VM_PREFIX) {
        Some(raw) => (RecordKind::Vm, raw),
        None => (RecordKind::Host, name),
    };

    if raw.len() != HYPHENATED_LEN {
        return Err(LayoutError::InvalidDirName {
            name: name.to_string(),
        });
    }

    match Uuid::try_parse(raw) {
        Ok(id) if encode_dir_name(kind, id) == name => Ok((kind, id)),
        _ => Err(LayoutError::InvalidDirName {
            name: name.to_string(),
        }),
    }
}

/// Directory layout error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Directory name does not encode a record.
    #[error("directory name {name:?} does not encode a record identifier")]
    InvalidDirName { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    const ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    #[test]
    fn encode_host_and_vm() -> anyhow::Result<()> {
        let id = Uuid::try_parse(ID)?;
        assert_eq!(encode_dir_name(RecordKind::Host, id), ID);
        assert_eq!(encode_dir_name(RecordKind::Vm, id), format!("vm-{ID}"));

        Ok(())
    }

    #[test_case("0f8fad5b-d9cb-469f-a165-70867728950e", RecordKind::Host; "host")]
    #[test_case("vm-0f8fad5b-d9cb-469f-a165-70867728950e", RecordKind::Vm; "vm")]
    #[test]
    fn decode_valid_names(name: &str, kind: RecordKind) -> anyhow::Result<()> {
        let result = decode_dir_name(name)?;
        pretty_assertions::assert_eq!(result, (kind, Uuid::try_parse(ID)?));

        Ok(())
    }

    #[test_case(""; "empty")]
    #[test_case("vm-"; "bare prefix")]
    #[test_case("0f8fad5bd9cb469fa16570867728950e"; "simple form")]
    #[test_case("{0f8fad5b-d9cb-469f-a165-70867728950e}"; "braced form")]
    #[test_case("docker"; "plain word")]
    #[test_case("0F8FAD5B-D9CB-469F-A165-70867728950E"; "uppercase host")]
    #[test_case("vm-0f8fad5b-D9CB-469f-a165-70867728950e"; "mixed case vm")]
    #[test_case("vm-vm-0f8fad5b-d9cb-469f-a165-70867728950e"; "double prefix")]
    #[test]
    fn decode_invalid_names(name: &str) {
        pretty_assertions::assert_eq!(
            decode_dir_name(name),
            Err(LayoutError::InvalidDirName { name: name.into() })
        );
    }
}
