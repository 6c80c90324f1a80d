// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for profile files to simplify the process of
//! serialization and deserialization. File I/O is left to the
//! [`ProfileStore`](crate::store::ProfileStore).

use crate::error::ErrorKind;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Core configuration profile.
///
/// A __profile__ points homelab-store at one inventory repository, the file
/// holding the Git identity to commit with, and the credentials used to talk
/// to the remote. Users may keep several profiles around, but only one of them
/// is __active__ at any time.
///
/// # General Layout
///
/// Profiles are stored as TOML, one file per profile, named after the profile
/// itself. Whether a profile is active is not part of the file: the
/// [`ProfileStore`](crate::store::ProfileStore) tracks that separately and
/// fills in [`Profile::is_active`] on load.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Unique name of the profile, also the file name stem.
    pub name: String,

    /// Absolute path to the Git working copy holding the inventory.
    #[serde(rename = "homeLabRepoDataPath", default)]
    pub repo_data_path: PathBuf,

    /// Path to a gitconfig style file holding `user.name` and `user.email`.
    #[serde(default)]
    pub git_config_file_path: PathBuf,

    /// User name for the remote.
    #[serde(default)]
    pub github_user_name: String,

    /// Personal access token for the remote.
    #[serde(default)]
    pub github_pat: String,

    /// Whether this profile is the active one.
    #[serde(skip)]
    pub is_active: bool,
}

impl Profile {
    /// Construct new inactive profile with nothing but a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check that referenced filesystem entries exist.
    ///
    /// Empty paths are allowed, anything further is a concern of the caller.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingPath`] if a non-empty path does not
    ///   exist.
    pub fn validate(&self) -> Result<()> {
        check_exists("homeLabRepoDataPath", &self.repo_data_path)?;
        check_exists("gitConfigFilePath", &self.git_config_file_path)?;
        Ok(())
    }

    /// Check that a profile name can safely serve as a file name stem.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::InvalidName`] if the name is blank, contains a
    ///   path separator, or starts with a dot.
    pub fn validate_name(name: &str) -> Result<()> {
        let bad = name.trim().is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.contains(std::path::MAIN_SEPARATOR);
        if bad {
            return Err(ConfigError::InvalidName {
                name: name.to_string(),
            });
        }

        Ok(())
    }

    /// Check if a token is configured for the remote.
    pub fn has_credentials(&self) -> bool {
        !self.github_pat.trim().is_empty()
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut profile: Profile = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on path fields.
        profile.repo_data_path = expand_path(&profile.repo_data_path)?;
        profile.git_config_file_path = expand_path(&profile.git_config_file_path)?;

        Ok(profile)
    }
}

impl Display for Profile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Ok(PathBuf::new());
    }

    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

fn check_exists(field: &'static str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }

    Err(ConfigError::MissingPath {
        field,
        path: path.to_path_buf(),
    })
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Path referenced by the profile does not exist.
    #[error("{field} refers to missing path {:?}", path.display())]
    MissingPath { field: &'static str, path: PathBuf },

    /// Profile name cannot be used as a file name.
    #[error("invalid profile name {name:?}")]
    InvalidName { name: String },
}

impl ConfigError {
    /// Classify error for presentation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Deserialize(_) | Self::Serialize(_) => ErrorKind::Serialization,
            Self::ShellExpansion(_) | Self::MissingPath { .. } => ErrorKind::ConfigInvalid,
            Self::InvalidName { .. } => ErrorKind::ArgumentInvalid,
        }
    }
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test(env = [("BLAH", "/home/blah/blah")])]
    fn deserialize_profile() -> anyhow::Result<()> {
        let result: Profile = r#"
            name = "Default"
            homeLabRepoDataPath = "$BLAH/homelab"
            gitConfigFilePath = "$BLAH/.gitconfig"
            githubUserName = "blah"
            githubPat = "ghp_blah"
        "#
        .parse()?;

        let expect = Profile {
            name: "Default".into(),
            repo_data_path: "/home/blah/blah/homelab".into(),
            git_config_file_path: "/home/blah/blah/.gitconfig".into(),
            github_user_name: "blah".into(),
            github_pat: "ghp_blah".into(),
            is_active: false,
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_profile_with_missing_fields() -> anyhow::Result<()> {
        let result: Profile = r#"name = "bare""#.parse()?;
        assert_eq!(result, Profile::new("bare"));

        Ok(())
    }

    #[test]
    fn serialize_profile_skips_active_flag() {
        let result = Profile {
            name: "Default".into(),
            repo_data_path: "/tmp/repo".into(),
            git_config_file_path: "/tmp/.gitconfig".into(),
            github_user_name: "blah".into(),
            github_pat: "ghp_blah".into(),
            is_active: true,
        }
        .to_string();

        let expect = indoc! {r#"
            name = "Default"
            homeLabRepoDataPath = "/tmp/repo"
            gitConfigFilePath = "/tmp/.gitconfig"
            githubUserName = "blah"
            githubPat = "ghp_blah"
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn validate_rejects_missing_paths() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut profile = Profile::new("Default");
        profile.validate()?;

        profile.repo_data_path = dir.path().to_path_buf();
        profile.validate()?;

        profile.git_config_file_path = dir.path().join("missing.gitconfig");
        let result = profile.validate().unwrap_err();
        assert_eq!(result.kind(), ErrorKind::ConfigInvalid);

        Ok(())
    }

    #[test_case("Default", true; "plain name")]
    #[test_case("home lab", true; "name with space")]
    #[test_case("", false; "empty")]
    #[test_case("   ", false; "blank")]
    #[test_case(".hidden", false; "leading dot")]
    #[test_case("a/b", false; "forward slash")]
    #[test_case("a\\b", false; "back slash")]
    #[test]
    fn validate_name_cases(name: &str, valid: bool) {
        pretty_assertions::assert_eq!(Profile::validate_name(name).is_ok(), valid);
    }
}
