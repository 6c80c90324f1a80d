// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{RemoteFixture, RepoFixture};

use anyhow::Result;
use homelab_store::{
    sync::SyncSettings, ErrorKind, GitSync, Host, Profile, ProfileStore, PullOutcome, RepoState,
    ServerKind, ServerMetadata, ServerStore, Vm,
};
use pretty_assertions::assert_eq;
use std::{fs, path::PathBuf, sync::Arc};

fn metadata(name: &str, index: u32) -> ServerMetadata {
    ServerMetadata {
        display_name: name.to_uppercase(),
        name: name.into(),
        ip_address: "10.0.0.2".into(),
        description: String::new(),
        kind: ServerKind::StandardLinux,
        display_index: index,
    }
}

fn sync_of(fixture: &RepoFixture) -> GitSync<SyncSettings> {
    GitSync::new(SyncSettings {
        repo_path: fixture.path(),
        ..Default::default()
    })
}

fn add_host(servers: &ServerStore<PathBuf>, name: &str) -> Result<Host> {
    let mut host = Host::new(metadata(name, 0));
    host.vms.push(Vm::new(metadata(&format!("{name}-vm"), 0)));
    servers.add_or_update_server(&mut host)?;
    Ok(host)
}

#[test]
fn default_profile_lists_new_host() -> Result<()> {
    let remote = RemoteFixture::new()?;
    let clone = remote.clone_into("alice")?;
    let profile_dir = remote.root().join("profiles");
    fs::create_dir_all(&profile_dir)?;

    let profiles = Arc::new(ProfileStore::open(&profile_dir)?);
    let mut profile = profiles.get_or_create_active(|| Profile::new("Default"))?;
    assert_eq!(profile.name, "Default");
    assert!(profile.is_active);

    profile.repo_data_path = clone.path();
    profiles.save(&profile)?;

    let servers = ServerStore::new(profiles.clone());
    let mut host = Host::new(metadata("srv1", 0));
    let id = servers.add_or_update_server(&mut host)?;

    let hosts = servers.get_servers()?;
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].base.unique_id, Some(id));
    assert_eq!(hosts[0].base.name(), "srv1");

    let sync = GitSync::new(profiles);
    assert_eq!(sync.repo_state(), RepoState::Dirty);
    let changes = sync.get_repo_status()?;
    let result = servers.map_changes_to_human_readable_info(&changes)?;
    assert_eq!(result, vec!["created new host: srv1".to_string()]);

    Ok(())
}

#[test]
fn commit_and_push_reaches_remote() -> Result<()> {
    let remote = RemoteFixture::new()?;
    let clone = remote.clone_into("alice")?;
    let servers = ServerStore::new(clone.path());
    let sync = sync_of(&clone);

    assert!(sync.is_data_path_a_repo());
    assert_eq!(sync.repo_state(), RepoState::Clean);
    assert!(!sync.commit_and_push_changes("nothing here")?);

    add_host(&servers, "srv1")?;
    assert!(sync.repo_has_uncommitted_changes()?);
    assert!(sync.commit_and_push_changes("add srv1")?);

    assert_eq!(sync.repo_state(), RepoState::Clean);
    assert_eq!(remote.head_message()?, "add srv1");
    assert!(clone.repo().statuses(None)?.is_empty());

    Ok(())
}

#[test]
fn pull_fast_forwards_second_clone() -> Result<()> {
    let remote = RemoteFixture::new()?;
    let alice = remote.clone_into("alice")?;
    let bob = remote.clone_into("bob")?;

    let host = add_host(&ServerStore::new(alice.path()), "srv1")?;
    assert!(sync_of(&alice).commit_and_push_changes("add srv1")?);

    let sync = sync_of(&bob);
    assert_eq!(sync.pull_latest_changes()?, PullOutcome::FastForward);
    assert_eq!(sync.pull_latest_changes()?, PullOutcome::UpToDate);
    assert_eq!(sync.repo_state(), RepoState::Clean);

    let hosts = ServerStore::new(bob.path()).get_servers()?;
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].base.unique_id, host.base.unique_id);
    assert_eq!(hosts[0].base.metadata, host.base.metadata);
    assert_eq!(hosts[0].vms.len(), 1);
    assert_eq!(hosts[0].vms[0].base.metadata, host.vms[0].base.metadata);

    Ok(())
}

#[test]
fn diverged_clones_merge_on_pull() -> Result<()> {
    let remote = RemoteFixture::new()?;
    let alice = remote.clone_into("alice")?;
    let bob = remote.clone_into("bob")?;

    alice.write("notes/alice.txt", "from alice\n")?;
    assert!(sync_of(&alice).commit_and_push_changes("alice notes")?);

    let sync = sync_of(&bob);
    bob.write("notes/bob.txt", "from bob\n")?;
    let result = sync.commit_and_push_changes("bob notes").unwrap_err();
    assert_eq!(result.kind(), ErrorKind::GitOperationFailed);

    assert_eq!(sync.pull_latest_changes()?, PullOutcome::Merged);
    assert_eq!(bob.head_parent_count()?, 2);
    assert_eq!(bob.read("notes/alice.txt")?, "from alice\n");
    assert_eq!(bob.read("notes/bob.txt")?, "from bob\n");

    // INVARIANT: Nothing new to commit, but the merge still reaches the remote.
    assert!(!sync.commit_and_push_changes("again")?);
    assert_eq!(remote.head_message()?, bob.head_message()?);
    assert!(remote.head_message()?.starts_with("Merge origin/main into main"));

    Ok(())
}

#[test]
fn failed_push_is_retried_without_new_changes() -> Result<()> {
    let remote = RemoteFixture::new()?;
    let clone = remote.clone_into("alice")?;
    let sync = sync_of(&clone);

    let missing = remote.root().join("missing.git");
    clone
        .repo()
        .remote_set_url("origin", &missing.to_string_lossy())?;
    add_host(&ServerStore::new(clone.path()), "srv1")?;
    let result = sync.commit_and_push_changes("add srv1").unwrap_err();
    assert_eq!(result.kind(), ErrorKind::GitOperationFailed);
    assert_eq!(sync.repo_state(), RepoState::Clean);

    clone.repo().remote_set_url("origin", &remote.url())?;
    assert!(!sync.commit_and_push_changes("retry")?);
    assert_eq!(remote.head_message()?, "add srv1");

    Ok(())
}

#[test]
fn fetch_leaves_working_copy_alone() -> Result<()> {
    let remote = RemoteFixture::new()?;
    let alice = remote.clone_into("alice")?;
    let bob = remote.clone_into("bob")?;

    alice.write("README.md", "# Alice lab\n")?;
    assert!(sync_of(&alice).commit_and_push_changes("alice readme")?);

    let sync = sync_of(&bob);
    sync.fetch()?;
    let fetched = bob
        .repo()
        .find_reference("refs/remotes/origin/main")?
        .peel_to_commit()?;
    assert_eq!(fetched.message(), Some("alice readme"));
    assert_eq!(bob.read("README.md")?, "# Home lab\n");
    assert_ne!(bob.head_message()?, "alice readme");
    assert_eq!(sync.repo_state(), RepoState::Clean);

    Ok(())
}

#[test]
fn conflicting_pull_leaves_no_merge_state() -> Result<()> {
    let remote = RemoteFixture::new()?;
    let alice = remote.clone_into("alice")?;
    let bob = remote.clone_into("bob")?;

    alice.write("README.md", "# Alice lab\n")?;
    assert!(sync_of(&alice).commit_and_push_changes("alice readme")?);
    bob.stage_and_commit("README.md", "# Bob lab\n")?;

    let sync = sync_of(&bob);
    let result = sync.pull_latest_changes().unwrap_err();
    assert_eq!(result.kind(), ErrorKind::GitOperationFailed);
    assert_eq!(bob.repo().state(), git2::RepositoryState::Clean);
    assert_eq!(bob.read("README.md")?, "# Bob lab\n");
    assert!(!bob.repo().index()?.has_conflicts());
    assert_eq!(sync.repo_state(), RepoState::Clean);

    // INVARIANT: Unmerged local commit is still refused by the remote.
    let result = sync.commit_and_push_changes("retry").unwrap_err();
    assert_eq!(result.kind(), ErrorKind::GitOperationFailed);
    assert_eq!(remote.head_message()?, "alice readme");

    Ok(())
}

#[test]
fn summaries_follow_host_lifecycle() -> Result<()> {
    let remote = RemoteFixture::new()?;
    let clone = remote.clone_into("alice")?;
    let servers = ServerStore::new(clone.path());
    let sync = sync_of(&clone);

    let mut host = add_host(&servers, "srv1")?;
    assert!(sync.commit_and_push_changes("add srv1")?);

    host.base.metadata = Some(ServerMetadata {
        description: "rack 2".into(),
        ..metadata("srv1", 0)
    });
    servers.add_or_update_server(&mut host)?;
    let result = servers.map_changes_to_human_readable_info(&sync.get_repo_status()?)?;
    assert_eq!(result, vec!["modified host: srv1".to_string()]);
    assert!(sync.commit_and_push_changes("describe srv1")?);

    host.vms.push(Vm::new(metadata("srv1-vm2", 1)));
    servers.add_or_update_server(&mut host)?;
    let result = servers.map_changes_to_human_readable_info(&sync.get_repo_status()?)?;
    assert_eq!(
        result,
        vec!["updating host with new features: srv1".to_string()]
    );
    assert!(sync.commit_and_push_changes("add vm")?);

    servers.delete_vm(&host.vms[1])?;
    let result = servers.map_changes_to_human_readable_info(&sync.get_repo_status()?)?;
    assert_eq!(
        result,
        vec!["removing features from host: srv1".to_string()]
    );
    assert!(sync.commit_and_push_changes("drop vm")?);

    servers.delete_server(&host)?;
    let id = host.base.unique_id.map(|id| id.to_string()).unwrap_or_default();
    let result = servers.map_changes_to_human_readable_info(&sync.get_repo_status()?)?;
    assert_eq!(result, vec![format!("deleted host with id {id}")]);

    Ok(())
}
