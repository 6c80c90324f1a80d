// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Profile store management and manipulation.
//!
//! homelab-store groups all configuration profiles together into one place
//! called the __profile store__. Every other component asks the profile store
//! for the currently active profile when it needs a repository path or
//! credentials, so switching profiles takes effect on the very next operation.
//!
//! # Profile Store Layout
//!
//! The profile store is a flat directory. The default location is
//! `$XDG_CONFIG_HOME/homelab-store/profiles`. Each profile lives in its own
//! TOML file named after the profile, so `profiles/Default.toml` holds the
//! profile named "Default". The name of the active profile is kept in a
//! separate marker file named `active`:
//!
//! ```text
//! profiles/
//!   active          <- contains "Default"
//!   Default.toml
//!   Lab2.toml
//! ```
//!
//! Keeping the active flag out of the profile files means that switching the
//! active profile is a single write of the marker file. Every other profile
//! is demoted by that same write.
//!
//! # Invariants
//!
//! - Once any profile exists, exactly one profile is active.
//! - The active profile cannot be deleted or deactivated directly. Activate
//!   another profile first.

use crate::{
    config::{ConfigError, Profile},
    error::ErrorKind,
    notify::ChangeBus,
};

use std::{
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};
use tracing::{debug, info, instrument, warn};

const ACTIVE_MARKER: &str = "active";
const PROFILE_EXTENSION: &str = "toml";

/// Name and active state of a stored profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub name: String,
    pub is_active: bool,
}

/// Directory of profile files with exactly one active profile.
#[derive(Debug)]
pub struct ProfileStore {
    profile_dir: PathBuf,
    caching: bool,
    cache: Mutex<Option<Profile>>,
    changes: ChangeBus<Profile>,
}

impl ProfileStore {
    /// Open profile store at target directory.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ArgumentInvalid`] if `path` is empty.
    /// - Return [`StoreError::InvalidOperation`] if `path` is not an existing
    ///   directory.
    #[instrument(skip(path), level = "debug")]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(StoreError::ArgumentInvalid {
                reason: "profile directory path is empty".into(),
            });
        }

        if !path.is_dir() {
            return Err(StoreError::InvalidOperation {
                reason: format!("profile directory {:?} does not exist", path.display()),
            });
        }

        debug!("open profile store at {:?}", path.display());
        Ok(Self {
            profile_dir: path.to_path_buf(),
            caching: true,
            cache: Mutex::new(None),
            changes: ChangeBus::new(),
        })
    }

    /// Enable or disable in-memory caching of the active profile.
    ///
    /// With caching disabled every read parses the profile file again.
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    /// Directory holding the profile files.
    pub fn profile_dir(&self) -> &Path {
        self.profile_dir.as_path()
    }

    /// Notifications fired after every successful save or rename.
    pub fn changes(&self) -> &ChangeBus<Profile> {
        &self.changes
    }

    /// Get active profile, creating one if the store is empty.
    ///
    /// If no profile exists yet, `default` is called to produce one. That
    /// profile is marked active, validated, and persisted.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Config`] if the created or loaded profile fails
    ///   validation.
    /// - Return [`StoreError::NotFound`] if profiles exist but none is active.
    #[instrument(skip(self, default), level = "debug")]
    pub fn get_or_create_active(&self, default: impl FnOnce() -> Profile) -> Result<Profile> {
        if self.list_all()?.is_empty() {
            let mut profile = default();
            profile.is_active = true;
            profile.validate()?;
            info!("create initial profile {:?}", profile.name);
            self.save(&profile)?;
            return Ok(profile);
        }

        let profile = self.active()?;
        profile.validate()?;
        Ok(profile)
    }

    /// Get currently active profile.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if no profile is active.
    pub fn active(&self) -> Result<Profile> {
        if self.caching {
            if let Some(profile) = self.lock_cache().as_ref() {
                return Ok(profile.clone());
            }
        }

        let name = self.read_marker()?.ok_or(StoreError::NotFound {
            name: "<active profile>".into(),
        })?;
        let mut profile = self.load(&name)?;
        profile.is_active = true;

        if self.caching {
            *self.lock_cache() = Some(profile.clone());
        }

        Ok(profile)
    }

    /// Get profile by name regardless of active state.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if no such profile file exists.
    pub fn get(&self, name: &str) -> Result<Profile> {
        let mut profile = self.load(name)?;
        profile.is_active = self.read_marker()?.as_deref() == Some(name);
        Ok(profile)
    }

    /// Insert or update a profile.
    ///
    /// If `profile.is_active` is set, the profile becomes the only active
    /// one. The first profile saved into an empty store is always made
    /// active. Notifies subscribers with the saved profile.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Config`] if the name or paths are invalid.
    /// - Return [`StoreError::InvalidOperation`] if this would deactivate the
    ///   currently active profile.
    /// - Return [`StoreError::Io`] if a file cannot be written.
    #[instrument(skip(self, profile), fields(name = %profile.name), level = "debug")]
    pub fn save(&self, profile: &Profile) -> Result<()> {
        Profile::validate_name(&profile.name)?;
        profile.validate()?;

        let marker = self.read_marker()?;
        let active_exists = marker
            .as_deref()
            .is_some_and(|name| self.profile_path(name).is_file());
        if !profile.is_active && marker.as_deref() == Some(profile.name.as_str()) {
            return Err(StoreError::InvalidOperation {
                reason: format!(
                    "cannot deactivate active profile {:?}; activate another profile instead",
                    profile.name
                ),
            });
        }

        let mut saved = profile.clone();
        if !saved.is_active && !active_exists {
            debug!("no active profile exists, promote {:?}", saved.name);
            saved.is_active = true;
        }

        self.write_profile(&saved)?;
        if saved.is_active {
            self.write_marker(&saved.name)?;
        }

        self.refresh_cache(&saved);
        info!("saved profile {:?} (active: {})", saved.name, saved.is_active);
        self.changes.publish(&saved);

        Ok(())
    }

    /// Rename a stored profile.
    ///
    /// Writes `profile` under its new name and removes the stale file. The
    /// active marker follows the profile if it was active.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if `old_name` does not exist.
    /// - Return [`StoreError::InvalidOperation`] if a profile named
    ///   `profile.name` already exists.
    #[instrument(skip(self, profile), fields(new_name = %profile.name), level = "debug")]
    pub fn rename(&self, old_name: &str, profile: &Profile) -> Result<()> {
        if old_name == profile.name {
            return self.save(profile);
        }

        Profile::validate_name(&profile.name)?;
        profile.validate()?;

        let old_path = self.profile_path(old_name);
        if !old_path.is_file() {
            return Err(StoreError::NotFound {
                name: old_name.to_string(),
            });
        }

        if self.profile_path(&profile.name).exists() {
            return Err(StoreError::InvalidOperation {
                reason: format!("profile {:?} already exists", profile.name),
            });
        }

        let was_active = self.read_marker()?.as_deref() == Some(old_name);
        let mut renamed = profile.clone();
        renamed.is_active = was_active || profile.is_active;

        self.write_profile(&renamed)?;
        if renamed.is_active {
            self.write_marker(&renamed.name)?;
        }
        fs::remove_file(&old_path).map_err(|source| StoreError::Io {
            source,
            path: old_path.clone(),
        })?;

        *self.lock_cache() = None;
        info!("renamed profile {old_name:?} to {:?}", renamed.name);
        self.changes.publish(&renamed);

        Ok(())
    }

    /// List all stored profiles sorted by name.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Io`] if the profile directory cannot be read.
    pub fn list_all(&self) -> Result<Vec<ProfileEntry>> {
        let active = self.read_marker()?;
        let pattern = format!(
            "{}/*.{PROFILE_EXTENSION}",
            glob::Pattern::escape(self.profile_dir.to_string_lossy().as_ref())
        );

        let mut entries = Vec::new();
        for path in glob::glob(&pattern)? {
            let path = match path {
                Ok(path) => path,
                Err(error) => {
                    warn!("skip unreadable profile entry: {error}");
                    continue;
                }
            };

            if !path.is_file() {
                continue;
            }

            if let Some(name) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()) {
                let is_active = active.as_deref() == Some(name.as_str());
                entries.push(ProfileEntry { name, is_active });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries)
    }

    /// Delete a stored profile.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidOperation`] if the profile is active, or
    ///   if it does not exist.
    #[instrument(skip(self, profile), fields(name = %profile.name), level = "debug")]
    pub fn delete(&self, profile: &Profile) -> Result<()> {
        let path = self.profile_path(&profile.name);
        if !path.is_file() {
            return Err(StoreError::InvalidOperation {
                reason: format!("profile {:?} does not exist", profile.name),
            });
        }

        if self.read_marker()?.as_deref() == Some(profile.name.as_str()) {
            return Err(StoreError::InvalidOperation {
                reason: format!("cannot delete active profile {:?}", profile.name),
            });
        }

        fs::remove_file(&path).map_err(|source| StoreError::Io {
            source,
            path: path.clone(),
        })?;
        info!("deleted profile {:?}", profile.name);

        Ok(())
    }

    /// Path to the active profile's file, if any profile is active.
    pub fn active_config_path(&self) -> Option<PathBuf> {
        self.read_marker()
            .ok()
            .flatten()
            .map(|name| self.profile_path(&name))
            .filter(|path| path.is_file())
    }

    /// Path a profile with the given name is stored at.
    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profile_dir.join(format!("{name}.{PROFILE_EXTENSION}"))
    }

    fn load(&self, name: &str) -> Result<Profile> {
        let path = self.profile_path(name);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(error) if error.kind() == IoErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    name: name.to_string(),
                })
            }
            Err(source) => return Err(StoreError::Io { source, path }),
        };

        let mut profile: Profile = data.parse()?;
        if profile.name != name {
            warn!(
                "profile file {:?} names itself {:?}, using file name",
                path.display(),
                profile.name
            );
            profile.name = name.to_string();
        }

        Ok(profile)
    }

    fn write_profile(&self, profile: &Profile) -> Result<()> {
        let path = self.profile_path(&profile.name);
        let contents = toml::ser::to_string_pretty(profile).map_err(ConfigError::Serialize)?;
        fs::write(&path, contents).map_err(|source| StoreError::Io { source, path })
    }

    fn read_marker(&self) -> Result<Option<String>> {
        let path = self.profile_dir.join(ACTIVE_MARKER);
        match fs::read_to_string(&path) {
            Ok(name) => {
                let name = name.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(error) if error.kind() == IoErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { source, path }),
        }
    }

    // INVARIANT: Write through a temporary file so readers never see a
    // half-written marker.
    fn write_marker(&self, name: &str) -> Result<()> {
        let path = self.profile_dir.join(ACTIVE_MARKER);
        let staging = self.profile_dir.join(format!(".{ACTIVE_MARKER}.tmp"));
        fs::write(&staging, name).map_err(|source| StoreError::Io {
            source,
            path: staging.clone(),
        })?;
        fs::rename(&staging, &path).map_err(|source| StoreError::Io { source, path })
    }

    fn refresh_cache(&self, saved: &Profile) {
        let mut cache = self.lock_cache();
        if saved.is_active {
            *cache = self.caching.then(|| saved.clone());
        } else if cache.as_ref().is_some_and(|cached| cached.name == saved.name) {
            *cache = None;
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Option<Profile>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// All possible error types for profile store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Required input was empty.
    #[error("invalid argument: {reason}")]
    ArgumentInvalid { reason: String },

    /// Filesystem state does not allow the operation.
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// No profile by that name.
    #[error("profile {name:?} not found")]
    NotFound { name: String },

    /// Profile is invalid or cannot be (de)serialized.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Profile directory pattern is malformed.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Profile file I/O failed.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl StoreError {
    /// Classify error for presentation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArgumentInvalid { .. } => ErrorKind::ArgumentInvalid,
            Self::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Config(error) => error.kind(),
            Self::Pattern(_) => ErrorKind::ArgumentInvalid,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex as StdMutex};
    use tempfile::TempDir;

    fn profile(name: &str, active: bool) -> Profile {
        Profile {
            name: name.into(),
            github_user_name: "blah".into(),
            is_active: active,
            ..Default::default()
        }
    }

    fn store() -> anyhow::Result<(TempDir, ProfileStore)> {
        let dir = tempfile::tempdir()?;
        let store = ProfileStore::open(dir.path())?;
        Ok((dir, store))
    }

    #[test]
    fn open_rejects_bad_paths() {
        let result = ProfileStore::open("").unwrap_err();
        assert_eq!(result.kind(), ErrorKind::ArgumentInvalid);

        let result = ProfileStore::open("/definitely/not/here").unwrap_err();
        assert_eq!(result.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn get_or_create_active_uses_factory_once() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        let mut calls = 0;

        let first = store.get_or_create_active(|| {
            calls += 1;
            profile("Default", false)
        })?;
        assert!(first.is_active);

        let second = store.get_or_create_active(|| {
            calls += 1;
            profile("Other", false)
        })?;
        assert_eq!(second.name, "Default");
        assert_eq!(calls, 1);

        Ok(())
    }

    #[test]
    fn get_or_create_active_validates_default() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        let result = store
            .get_or_create_active(|| Profile {
                repo_data_path: "/definitely/not/here".into(),
                ..profile("Default", true)
            })
            .unwrap_err();
        assert_eq!(result.kind(), ErrorKind::ConfigInvalid);
        assert!(store.list_all()?.is_empty());

        Ok(())
    }

    #[test]
    fn active_fails_on_empty_store() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        assert_eq!(store.active().unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.active_config_path(), None);

        Ok(())
    }

    #[test]
    fn only_one_profile_stays_active() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        store.save(&profile("a", true))?;
        store.save(&profile("b", false))?;
        store.save(&profile("c", true))?;
        store.save(&profile("d", false))?;

        let result = store.list_all()?;
        let expect = vec![
            ProfileEntry { name: "a".into(), is_active: false },
            ProfileEntry { name: "b".into(), is_active: false },
            ProfileEntry { name: "c".into(), is_active: true },
            ProfileEntry { name: "d".into(), is_active: false },
        ];
        assert_eq!(result, expect);
        assert_eq!(store.active_config_path(), Some(store.profile_path("c")));
        assert_eq!(store.active()?.name, "c");
        assert!(!store.get("a")?.is_active);

        Ok(())
    }

    #[test]
    fn first_saved_profile_becomes_active() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        store.save(&profile("solo", false))?;
        assert!(store.get("solo")?.is_active);

        Ok(())
    }

    #[test]
    fn cannot_deactivate_active_profile() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        store.save(&profile("a", true))?;
        let result = store.save(&profile("a", false)).unwrap_err();
        assert_eq!(result.kind(), ErrorKind::InvalidOperation);

        Ok(())
    }

    #[test]
    fn delete_rules() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        store.save(&profile("a", true))?;
        store.save(&profile("b", false))?;

        let result = store.delete(&profile("a", true)).unwrap_err();
        assert_eq!(result.kind(), ErrorKind::InvalidOperation);

        let result = store.delete(&profile("ghost", false)).unwrap_err();
        assert_eq!(result.kind(), ErrorKind::InvalidOperation);

        store.delete(&profile("b", false))?;
        assert_eq!(store.get("b").unwrap_err().kind(), ErrorKind::NotFound);

        Ok(())
    }

    #[test]
    fn rename_moves_file_and_marker() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        store.save(&profile("old", true))?;

        store.rename("old", &profile("new", false))?;

        assert!(!store.profile_path("old").exists());
        assert_eq!(store.active()?.name, "new");
        assert_eq!(store.active_config_path(), Some(store.profile_path("new")));

        Ok(())
    }

    #[test]
    fn save_notifies_with_saved_profile() -> anyhow::Result<()> {
        let (_dir, store) = store()?;
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        store
            .changes()
            .subscribe(move |profile: &Profile| sink.lock().unwrap().push(profile.clone()));

        store.save(&profile("a", true))?;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, "a");
        assert!(seen[0].is_active);

        Ok(())
    }

    #[test]
    fn disabled_cache_reads_from_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ProfileStore::open(dir.path())?.with_caching(false);
        store.save(&profile("a", true))?;
        assert_eq!(store.active()?.github_user_name, "blah");

        // Edit behind the store's back.
        fs::write(
            store.profile_path("a"),
            "name = \"a\"\ngithubUserName = \"edited\"\n",
        )?;
        assert_eq!(store.active()?.github_user_name, "edited");

        Ok(())
    }
}
