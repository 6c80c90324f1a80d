// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Home lab inventory kept in Git.
//!
//! homelab-store keeps an inventory of servers and the VMs running on them as
//! a tree of YAML files inside a Git working copy, and keeps that working
//! copy in sync with a remote.
//!
//! # Components
//!
//! - [`ProfileStore`]: named configuration profiles, exactly one of which is
//!   active. The active profile names the working copy and the credentials.
//! - [`ServerStore`]: reads and writes [`Host`] and [`Vm`] records in the
//!   working copy of the active profile.
//! - [`GitSync`]: status, commit, push, fetch, and pull for that working
//!   copy.
//! - [`ChangeBus`]: callbacks fired after a store changes something.
//!
//! All operations are synchronous. None of the components lock the working
//! copy: a single writer at a time is assumed.

pub mod config;
pub mod error;
pub mod notify;
pub mod path;
pub mod servers;
pub mod store;
pub mod sync;

pub use config::Profile;
pub use error::ErrorKind;
pub use notify::{ChangeBus, SubscriptionId};
pub use servers::{
    model::{Host, ServerKind, ServerMetadata, ServerRecord, Vm},
    ServerChange, ServerStore,
};
pub use store::ProfileStore;
pub use sync::{
    status::{ChangeKind, RepoState, RepositoryChangeSet},
    GitSync, PullOutcome,
};
