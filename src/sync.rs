// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git synchronization of the inventory working copy.
//!
//! [`GitSync`] wraps the handful of Git operations the inventory needs:
//! working tree status, commit, push, fetch, and pull. It does not own a
//! timer or a background thread. Callers poll [`GitSync::repo_state`] when
//! they want to refresh an indicator, and run network operations wherever
//! blocking is acceptable.
//!
//! # Failures
//!
//! Local preconditions (no path configured, path is not a repository) are
//! checked before any network traffic and reported as
//! [`ErrorKind::InvalidOperation`]. Network and authentication failures are
//! not retried and surface as [`ErrorKind::GitOperationFailed`].

pub mod auth;
pub mod status;

use crate::{
    error::ErrorKind,
    store::ProfileStore,
    sync::{
        auth::{Credentials, NoPrompter},
        status::{ChangeKind, FileChange, RepoState, RepositoryChangeSet},
    },
};

use auth_git2::Prompter;
use git2::{
    build::CheckoutBuilder, AnnotatedCommit, Commit, Config, ErrorCode, FetchOptions,
    IndexAddOption, PushOptions, RemoteCallbacks, Repository, Signature, StatusOptions,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};

/// Everything a synchronization needs, read fresh per operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Working copy root.
    pub repo_path: PathBuf,

    /// Gitconfig style file holding the committer identity.
    pub identity_file: Option<PathBuf>,

    pub credentials: Credentials,
}

/// Source of [`SyncSettings`].
pub trait SyncSource {
    /// Current settings, or `None` if nothing is configured.
    fn sync_settings(&self) -> Option<SyncSettings>;
}

impl SyncSource for SyncSettings {
    fn sync_settings(&self) -> Option<SyncSettings> {
        Some(self.clone())
    }
}

impl SyncSource for ProfileStore {
    fn sync_settings(&self) -> Option<SyncSettings> {
        let profile = self.active().ok()?;
        let identity_file = (!profile.git_config_file_path.as_os_str().is_empty())
            .then_some(profile.git_config_file_path);

        Some(SyncSettings {
            repo_path: profile.repo_data_path,
            identity_file,
            credentials: Credentials::new(profile.github_user_name, profile.github_pat),
        })
    }
}

impl<T: SyncSource + ?Sized> SyncSource for Arc<T> {
    fn sync_settings(&self) -> Option<SyncSettings> {
        (**self).sync_settings()
    }
}

impl<T: SyncSource + ?Sized> SyncSource for &T {
    fn sync_settings(&self) -> Option<SyncSettings> {
        (**self).sync_settings()
    }
}

/// Result of a successful pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Local branch already contained everything upstream has.
    UpToDate,

    /// Local branch was moved forward to upstream.
    FastForward,

    /// Upstream was merged with a merge commit.
    Merged,
}

/// Git operations on the active working copy.
#[derive(Debug)]
pub struct GitSync<S = Arc<ProfileStore>, P = NoPrompter>
where
    S: SyncSource,
    P: Prompter + Clone + Send + 'static,
{
    source: S,
    prompter: P,
}

impl<S> GitSync<S, NoPrompter>
where
    S: SyncSource,
{
    /// Construct new non-interactive synchronizer.
    pub fn new(source: S) -> Self {
        Self {
            source,
            prompter: NoPrompter,
        }
    }
}

impl<S, P> GitSync<S, P>
where
    S: SyncSource,
    P: Prompter + Clone + Send + 'static,
{
    /// Ask `prompter` for credentials the profile does not provide.
    pub fn with_prompter<Q>(self, prompter: Q) -> GitSync<S, Q>
    where
        Q: Prompter + Clone + Send + 'static,
    {
        GitSync {
            source: self.source,
            prompter,
        }
    }

    /// Check if the configured path is the root of a Git repository.
    pub fn is_data_path_a_repo(&self) -> bool {
        self.source
            .sync_settings()
            .is_some_and(|settings| open_repo(&settings.repo_path).is_ok())
    }

    /// Compute current synchronization state.
    #[instrument(skip(self), level = "debug")]
    pub fn repo_state(&self) -> RepoState {
        let Some(settings) = self.source.sync_settings() else {
            return RepoState::NoRepoPath;
        };

        if is_blank(&settings.repo_path) {
            return RepoState::NoRepoPath;
        }

        let Ok(repo) = open_repo(&settings.repo_path) else {
            return RepoState::NoValidRepo;
        };

        match status_of(&repo) {
            Ok(changes) if changes.is_empty() => RepoState::Clean,
            Ok(_) => RepoState::Dirty,
            Err(error) => {
                warn!("cannot compute status: {error}");
                RepoState::NoValidRepo
            }
        }
    }

    /// Working tree status, one entry per changed path.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::InvalidOperation`] if no repository is
    ///   configured.
    /// - Return [`SyncError::Git2`] if the status cannot be computed.
    pub fn get_repo_status(&self) -> Result<RepositoryChangeSet> {
        let settings = self.settings()?;
        let repo = open_repo(&settings.repo_path)?;
        status_of(&repo)
    }

    /// Check if the working copy has anything to commit.
    ///
    /// # Errors
    ///
    /// - Return any error of [`GitSync::get_repo_status`].
    pub fn repo_has_uncommitted_changes(&self) -> Result<bool> {
        Ok(!self.get_repo_status()?.is_empty())
    }

    /// Fetch the tracked remote without touching the working copy.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::InvalidOperation`] if no repository is
    ///   configured, or the current branch cannot be determined.
    /// - Return [`SyncError::Git2`] on network or authentication failure.
    #[instrument(skip(self), level = "debug")]
    pub fn fetch(&self) -> Result<()> {
        let settings = self.settings()?;
        let repo = open_repo(&settings.repo_path)?;
        let tracking = Tracking::of(&repo)?;
        self.fetch_tracking(&repo, &settings, &tracking)
    }

    /// Fetch and integrate upstream changes into the current branch.
    ///
    /// Being up to date already is a success.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::InvalidOperation`] if no repository is
    ///   configured, or the current branch cannot be determined.
    /// - Return [`SyncError::MergeConflict`] if upstream conflicts with local
    ///   commits.
    /// - Return [`SyncError::Git2`] on network, authentication, or checkout
    ///   failure.
    #[instrument(skip(self), level = "debug")]
    pub fn pull_latest_changes(&self) -> Result<PullOutcome> {
        let settings = self.settings()?;
        let repo = open_repo(&settings.repo_path)?;
        let tracking = Tracking::of(&repo)?;
        self.fetch_tracking(&repo, &settings, &tracking)?;

        let fetched = match repo.find_reference(&tracking.remote_ref()) {
            Ok(reference) => reference,
            Err(error) if error.code() == ErrorCode::NotFound => {
                info!("nothing upstream at {}", tracking.remote_ref());
                return Ok(PullOutcome::UpToDate);
            }
            Err(error) => return Err(error.into()),
        };
        let upstream = repo.reference_to_annotated_commit(&fetched)?;

        let (analysis, _) = repo.merge_analysis(&[&upstream])?;
        if analysis.is_up_to_date() {
            info!("already up to date");
            Ok(PullOutcome::UpToDate)
        } else if analysis.is_fast_forward() || analysis.is_unborn() {
            fast_forward(&repo, &tracking, &upstream)?;
            info!("fast-forward to {}", upstream.id());
            Ok(PullOutcome::FastForward)
        } else {
            merge(&repo, &settings, &tracking, &upstream)?;
            info!("merged {}", tracking.remote_ref());
            Ok(PullOutcome::Merged)
        }
    }

    /// Stage everything, commit, and push to the tracked remote.
    ///
    /// Returns `false` if there was nothing to commit. Local commits the
    /// remote does not have yet, e.g., left behind by a failed push or made by
    /// a merging pull, are pushed either way.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::InvalidOperation`] if no repository is
    ///   configured, the current branch cannot be determined, or the index
    ///   has unresolved conflicts.
    /// - Return [`SyncError::Identity`] if the identity file lacks a name or
    ///   email.
    /// - Return [`SyncError::PushRejected`] if the remote refuses the update.
    /// - Return [`SyncError::Git2`] on network or authentication failure.
    #[instrument(skip(self, message), level = "debug")]
    pub fn commit_and_push_changes(&self, message: &str) -> Result<bool> {
        let settings = self.settings()?;
        let repo = open_repo(&settings.repo_path)?;
        let tracking = Tracking::of(&repo)?;

        let committed = if status_of(&repo)?.is_empty() {
            info!("nothing to commit");
            false
        } else {
            if repo.index()?.has_conflicts() {
                return Err(SyncError::InvalidOperation {
                    reason: "index has unresolved conflicts".into(),
                });
            }

            let mut index = repo.index()?;
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"].iter(), None)?;
            index.write()?;
            let tree = repo.find_tree(index.write_tree()?)?;

            let signature = signature(&repo, &settings)?;
            let parent = head_commit(&repo)?;
            let parents = parent.iter().collect::<Vec<_>>();
            let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
            info!("committed {oid}");
            true
        };

        if !committed && !is_ahead(&repo, &tracking)? {
            return Ok(false);
        }

        self.push_tracking(&repo, &settings, &tracking)?;

        Ok(committed)
    }

    fn settings(&self) -> Result<SyncSettings> {
        self.source
            .sync_settings()
            .filter(|settings| !is_blank(&settings.repo_path))
            .ok_or(SyncError::InvalidOperation {
                reason: "no working copy configured".into(),
            })
    }

    fn fetch_tracking(
        &self,
        repo: &Repository,
        settings: &SyncSettings,
        tracking: &Tracking,
    ) -> Result<()> {
        info!("fetch from {}", tracking.remote);
        let mut remote = find_remote(repo, &tracking.remote)?;
        let authenticator = auth::authenticator(&settings.credentials, &self.prompter);
        let config = repo_config(repo)?;

        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(authenticator.credentials(&config));
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        remote.fetch::<&str>(&[], Some(&mut options), None)?;

        Ok(())
    }

    fn push_tracking(
        &self,
        repo: &Repository,
        settings: &SyncSettings,
        tracking: &Tracking,
    ) -> Result<()> {
        info!("push {} to {}", tracking.local, tracking.remote);
        let mut remote = find_remote(repo, &tracking.remote)?;
        let authenticator = auth::authenticator(&settings.credentials, &self.prompter);
        let config = repo_config(repo)?;

        let mut rejected = Vec::new();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(authenticator.credentials(&config));
        callbacks.push_update_reference(|refname, status| {
            if let Some(reason) = status {
                rejected.push(format!("{refname}: {reason}"));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        let refspec = format!(
            "refs/heads/{}:refs/heads/{}",
            tracking.local, tracking.merge
        );
        remote.push(&[refspec.as_str()], Some(&mut options))?;
        drop(options);

        if !rejected.is_empty() {
            return Err(SyncError::PushRejected {
                reason: rejected.join(", "),
            });
        }

        Ok(())
    }
}

// Local branch, the remote it tracks, and the branch name on that remote.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tracking {
    local: String,
    remote: String,
    merge: String,
}

impl Tracking {
    // INVARIANT: Fall back to "origin" and the local branch name when the
    // branch has no upstream configured.
    fn of(repo: &Repository) -> Result<Self> {
        let local = current_branch(repo)?;
        let config = repo_config(repo)?;
        let remote = config
            .get_string(&format!("branch.{local}.remote"))
            .unwrap_or_else(|_| "origin".into());
        let merge = config
            .get_string(&format!("branch.{local}.merge"))
            .ok()
            .and_then(|merge| merge.strip_prefix("refs/heads/").map(str::to_owned))
            .unwrap_or_else(|| local.clone());

        debug!("branch {local} tracks {remote}/{merge}");
        Ok(Self {
            local,
            remote,
            merge,
        })
    }

    fn remote_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.merge)
    }

    fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.local)
    }
}

fn current_branch(repo: &Repository) -> Result<String> {
    match repo.head() {
        Ok(head) if head.is_branch() => head.shorthand().map(str::to_owned).ok_or(
            SyncError::InvalidOperation {
                reason: "current branch name is not valid UTF-8".into(),
            },
        ),
        Ok(_) => Err(SyncError::InvalidOperation {
            reason: "HEAD is detached".into(),
        }),
        // INVARIANT: Unborn HEAD still names the branch it will create.
        Err(error) if error.code() == ErrorCode::UnbornBranch => {
            let head = repo.find_reference("HEAD")?;
            head.symbolic_target()
                .and_then(|target| target.strip_prefix("refs/heads/"))
                .map(str::to_owned)
                .ok_or(SyncError::InvalidOperation {
                    reason: "HEAD does not point to a branch".into(),
                })
        }
        Err(error) => Err(error.into()),
    }
}

fn open_repo(path: &Path) -> Result<Repository> {
    if is_blank(path) {
        return Err(SyncError::InvalidOperation {
            reason: "no working copy configured".into(),
        });
    }

    if !path.is_dir() {
        return Err(SyncError::InvalidOperation {
            reason: format!("working copy {:?} does not exist", path.display()),
        });
    }

    Repository::open(path).map_err(|source| SyncError::NotARepository {
        source,
        path: path.to_path_buf(),
    })
}

fn find_remote<'r>(repo: &'r Repository, name: &str) -> Result<git2::Remote<'r>> {
    match repo.find_remote(name) {
        Ok(remote) => Ok(remote),
        Err(error) if matches!(error.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
            Err(SyncError::InvalidOperation {
                reason: format!("no remote named {name:?}"),
            })
        }
        Err(error) => Err(error.into()),
    }
}

fn repo_config(repo: &Repository) -> Result<Config> {
    Ok(repo.config()?)
}

fn is_blank(path: &Path) -> bool {
    path.to_string_lossy().trim().is_empty()
}

fn status_of(repo: &Repository) -> Result<RepositoryChangeSet> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let mut changes = RepositoryChangeSet::new();
    for entry in repo.statuses(Some(&mut options))?.iter() {
        let Some(path) = entry.path() else {
            warn!("skip status entry with non UTF-8 path");
            continue;
        };

        if let Some(kind) = ChangeKind::from_status(entry.status()) {
            changes.insert(FileChange::new(path, kind));
        }
    }

    Ok(changes)
}

// INVARIANT: A branch the remote has never seen is ahead as soon as it has a
// commit.
fn is_ahead(repo: &Repository, tracking: &Tracking) -> Result<bool> {
    let Some(local) = head_commit(repo)? else {
        return Ok(false);
    };

    let remote = match repo.find_reference(&tracking.remote_ref()) {
        Ok(reference) => reference.peel_to_commit()?,
        Err(error) if error.code() == ErrorCode::NotFound => return Ok(true),
        Err(error) => return Err(error.into()),
    };

    let (ahead, _) = repo.graph_ahead_behind(local.id(), remote.id())?;
    debug!("{} is {ahead} commits ahead of {}", tracking.local, tracking.remote_ref());
    Ok(ahead > 0)
}

fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(error) if matches!(error.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            Ok(None)
        }
        Err(error) => Err(error.into()),
    }
}

fn signature(repo: &Repository, settings: &SyncSettings) -> Result<Signature<'static>> {
    let Some(path) = &settings.identity_file else {
        return Ok(repo.signature()?);
    };

    let config = Config::open(path).map_err(|source| SyncError::IdentityFile {
        source,
        path: path.clone(),
    })?;
    let name = config
        .get_string("user.name")
        .map_err(|_| SyncError::Identity {
            path: path.clone(),
            key: "user.name",
        })?;
    let email = config
        .get_string("user.email")
        .map_err(|_| SyncError::Identity {
            path: path.clone(),
            key: "user.email",
        })?;

    Ok(Signature::now(&name, &email)?)
}

// INVARIANT: Update the working tree before moving the branch, so a checkout
// that would clobber local edits fails without side effects.
fn fast_forward(repo: &Repository, tracking: &Tracking, upstream: &AnnotatedCommit) -> Result<()> {
    let target = repo.find_commit(upstream.id())?;
    repo.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;

    let local_ref = tracking.local_ref();
    match repo.find_reference(&local_ref) {
        Ok(mut reference) => {
            reference.set_target(upstream.id(), "pull: fast-forward")?;
        }
        Err(_) => {
            repo.reference(&local_ref, upstream.id(), true, "pull: fast-forward")?;
        }
    }
    repo.set_head(&local_ref)?;

    Ok(())
}

// INVARIANT: Merge in memory first, so a conflicting merge leaves index and
// working tree exactly as they were.
fn merge(
    repo: &Repository,
    settings: &SyncSettings,
    tracking: &Tracking,
    upstream: &AnnotatedCommit,
) -> Result<()> {
    let ours = repo.head()?.peel_to_commit()?;
    let theirs = repo.find_commit(upstream.id())?;
    let mut merged = repo.merge_commits(&ours, &theirs, None)?;
    if merged.has_conflicts() {
        return Err(SyncError::MergeConflict {
            branch: tracking.remote_ref(),
        });
    }

    let tree = repo.find_tree(merged.write_tree_to(repo)?)?;
    repo.checkout_tree(tree.as_object(), Some(CheckoutBuilder::new().safe()))?;

    let signature = signature(repo, settings)?;
    let message = format!("Merge {}/{} into {}", tracking.remote, tracking.merge, tracking.local);
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        &message,
        &tree,
        &[&ours, &theirs],
    )?;

    Ok(())
}

/// All possible error types for Git synchronization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Local preconditions are not met.
    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// Configured path is not the root of a Git repository.
    #[error("{:?} is not a git repository", path.display())]
    NotARepository {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Identity file cannot be opened.
    #[error("cannot open identity file {:?}", path.display())]
    IdentityFile {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Identity file lacks a required key.
    #[error("identity file {:?} does not define {key}", path.display())]
    Identity { path: PathBuf, key: &'static str },

    /// Upstream changes conflict with local commits.
    #[error("merge with {branch} has conflicts")]
    MergeConflict { branch: String },

    /// Remote refused a reference update.
    #[error("push rejected: {reason}")]
    PushRejected { reason: String },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

impl SyncError {
    /// Classify error for presentation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOperation { .. } | Self::NotARepository { .. } => {
                ErrorKind::InvalidOperation
            }
            Self::IdentityFile { .. } | Self::Identity { .. } => ErrorKind::ConfigInvalid,
            Self::MergeConflict { .. } | Self::PushRejected { .. } | Self::Git2(_) => {
                ErrorKind::GitOperationFailed
            }
        }
    }

    /// Check if the remote refused the supplied credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Git2(error) if error.code() == ErrorCode::Auth)
    }
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
