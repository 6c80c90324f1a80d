// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use homelab_store::{
    path::default_profile_dir,
    servers::model::ServerBase,
    sync::{GitSync, PullOutcome},
    ErrorKind, Host, Profile, ProfileStore, RepoState, ServerKind, ServerMetadata, ServerStore, Vm,
};

use anyhow::{anyhow, Result};
use auth_git2::Prompter;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
    time::Duration,
};
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  homelab [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Directory holding profile files.
    #[arg(long, global = true, value_name = "path")]
    pub profile_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let profiles = open_profiles(self.profile_dir)?;
        match self.command {
            Command::Profile(command) => run_profile(&profiles, command),
            Command::Server(command) => run_server(profiles, command),
            Command::Status => run_status(profiles),
            Command::Pull => run_pull(profiles).await,
            Command::Push(opts) => run_push(profiles, opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Manage configuration profiles.
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Manage server inventory of the active profile.
    #[command(subcommand)]
    Server(ServerCommand),

    /// Show synchronization state and pending changes.
    Status,

    /// Pull latest changes from the remote.
    Pull,

    /// Commit all changes and push them to the remote.
    #[command(override_usage = "homelab push [options] -m <message>")]
    Push(PushOptions),
}

#[derive(Debug, Clone, Subcommand)]
enum ProfileCommand {
    /// Show active profile.
    Show,

    /// List all profiles.
    List,

    /// Create or update a profile.
    Set(SetProfileOptions),

    /// Make a profile the active one.
    Activate {
        #[arg(value_name = "name")]
        name: String,
    },

    /// Rename a profile.
    Rename {
        #[arg(value_name = "old_name")]
        old_name: String,

        #[arg(value_name = "new_name")]
        new_name: String,
    },

    /// Remove an inactive profile.
    Remove {
        #[arg(value_name = "name")]
        name: String,
    },
}

#[derive(Parser, Clone, Debug)]
struct SetProfileOptions {
    /// Name of profile to create or update.
    #[arg(value_name = "name")]
    pub name: String,

    /// Path to inventory working copy.
    #[arg(short, long, value_name = "path")]
    pub repo: Option<PathBuf>,

    /// Path to gitconfig file holding committer identity.
    #[arg(short, long, value_name = "path")]
    pub identity: Option<PathBuf>,

    /// User name for the remote.
    #[arg(short, long, value_name = "user")]
    pub user: Option<String>,

    /// Personal access token for the remote.
    #[arg(short, long, value_name = "token")]
    pub token: Option<String>,

    /// Make this the active profile.
    #[arg(short, long)]
    pub activate: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum ServerCommand {
    /// List hosts and their VMs.
    List,

    /// Add host, or VM when a host is given.
    Add(AddServerOptions),

    /// Remove host with all its VMs, or a single VM.
    Remove {
        #[arg(value_name = "id")]
        id: Uuid,
    },
}

#[derive(Parser, Clone, Debug)]
struct AddServerOptions {
    /// Unique name of the server.
    #[arg(value_name = "name")]
    pub name: String,

    /// Name to display, defaults to the name.
    #[arg(short, long, value_name = "display_name")]
    pub display_name: Option<String>,

    #[arg(long, value_name = "address", default_value = "")]
    pub ip: String,

    #[arg(long, value_name = "text", default_value = "")]
    pub description: String,

    #[arg(short, long, value_enum, default_value_t = KindArg::Unspecified)]
    pub kind: KindArg,

    /// Add as VM of this host.
    #[arg(long, value_name = "host_id")]
    pub host: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Windows,
    StandardLinux,
    TrueNasScale,
    Unspecified,
}

impl From<KindArg> for ServerKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Windows => ServerKind::Windows,
            KindArg::StandardLinux => ServerKind::StandardLinux,
            KindArg::TrueNasScale => ServerKind::TrueNasScale,
            KindArg::Unspecified => ServerKind::Unspecified,
        }
    }
}

#[derive(Parser, Clone, Debug)]
struct PushOptions {
    /// Commit message.
    #[arg(short, long, value_name = "message")]
    pub message: String,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn open_profiles(dir: Option<PathBuf>) -> Result<Arc<ProfileStore>> {
    let dir = match dir {
        Some(dir) => dir,
        None => default_profile_dir()?,
    };
    mkdirp::mkdirp(&dir)?;

    let profiles = ProfileStore::open(&dir)?;
    profiles.get_or_create_active(|| Profile::new("Default"))?;
    profiles.changes().subscribe(|profile: &Profile| {
        info!("profile {:?} saved (active: {})", profile.name, profile.is_active)
    });

    Ok(Arc::new(profiles))
}

fn run_profile(profiles: &ProfileStore, command: ProfileCommand) -> Result<()> {
    match command {
        ProfileCommand::Show => {
            let profile = profiles.active()?;
            println!("name:      {}", profile.name);
            println!("repo:      {}", profile.repo_data_path.display());
            println!("identity:  {}", profile.git_config_file_path.display());
            println!("user:      {}", profile.github_user_name);
            println!("token:     {}", if profile.has_credentials() { "<set>" } else { "<unset>" });
            if let Some(path) = profiles.active_config_path() {
                println!("file:      {}", path.display());
            }
        }
        ProfileCommand::List => {
            for entry in profiles.list_all()? {
                let marker = if entry.is_active { "*" } else { " " };
                println!("{marker} {}", entry.name);
            }
        }
        ProfileCommand::Set(opts) => {
            let mut profile = existing_or_new(profiles, &opts.name)?;
            if let Some(repo) = opts.repo {
                profile.repo_data_path = repo;
            }
            if let Some(identity) = opts.identity {
                profile.git_config_file_path = identity;
            }
            if let Some(user) = opts.user {
                profile.github_user_name = user;
            }
            if let Some(token) = opts.token {
                profile.github_pat = token;
            }
            profile.is_active |= opts.activate;
            profiles.save(&profile)?;
        }
        ProfileCommand::Activate { name } => {
            let mut profile = profiles.get(&name)?;
            profile.is_active = true;
            profiles.save(&profile)?;
        }
        ProfileCommand::Rename { old_name, new_name } => {
            let mut profile = profiles.get(&old_name)?;
            profile.name = new_name;
            profiles.rename(&old_name, &profile)?;
        }
        ProfileCommand::Remove { name } => {
            let profile = profiles.get(&name)?;
            profiles.delete(&profile)?;
        }
    }

    Ok(())
}

// INVARIANT: Only a missing profile is replaced, unreadable ones are reported.
fn existing_or_new(profiles: &ProfileStore, name: &str) -> Result<Profile> {
    match profiles.get(name) {
        Ok(profile) => Ok(profile),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(Profile::new(name)),
        Err(error) => Err(error.into()),
    }
}

fn run_server(profiles: Arc<ProfileStore>, command: ServerCommand) -> Result<()> {
    let servers = ServerStore::new(profiles);
    let mut hosts = servers.get_servers()?;
    sort_by_display_index(&mut hosts);

    match command {
        ServerCommand::List => {
            for host in &hosts {
                print_record(&host.base, 0);
                for vm in &host.vms {
                    print_record(&vm.base, 2);
                }
            }
        }
        ServerCommand::Add(opts) => {
            let metadata = |index: usize| ServerMetadata {
                display_name: opts.display_name.clone().unwrap_or_else(|| opts.name.clone()),
                name: opts.name.clone(),
                ip_address: opts.ip.clone(),
                description: opts.description.clone(),
                kind: opts.kind.into(),
                display_index: index as u32,
            };

            // INVARIANT: New records go last among their siblings.
            let id = match opts.host {
                Some(host_id) => {
                    let host = hosts
                        .iter_mut()
                        .find(|host| host.base.unique_id == Some(host_id))
                        .ok_or_else(|| anyhow!("no host with id {host_id}"))?;
                    host.vms.push(Vm::new(metadata(host.vms.len())));
                    servers.add_or_update_server(host)?;
                    host.vms.last().and_then(|vm| vm.base.unique_id)
                }
                None => {
                    let mut host = Host::new(metadata(hosts.len()));
                    Some(servers.add_or_update_server(&mut host)?)
                }
            };

            if let Some(id) = id {
                println!("{id}");
            }
        }
        ServerCommand::Remove { id } => remove_server(&servers, &mut hosts, id)?,
    }

    Ok(())
}

// INVARIANT: Siblings after the removed record move up one place.
fn remove_server(
    servers: &ServerStore<Arc<ProfileStore>>,
    hosts: &mut Vec<Host>,
    id: Uuid,
) -> Result<()> {
    if let Some(position) = hosts.iter().position(|host| host.base.unique_id == Some(id)) {
        let host = hosts.remove(position);
        servers.delete_server(&host)?;
        for (index, host) in hosts.iter_mut().enumerate().skip(position) {
            reindex(&mut host.base, index);
            servers.add_or_update_server(host)?;
        }
        return Ok(());
    }

    for host in hosts.iter_mut() {
        if let Some(position) = host.vms.iter().position(|vm| vm.base.unique_id == Some(id)) {
            let vm = host.vms.remove(position);
            servers.delete_vm(&vm)?;
            for (index, vm) in host.vms.iter_mut().enumerate().skip(position) {
                reindex(&mut vm.base, index);
            }
            servers.add_or_update_server(host)?;
            return Ok(());
        }
    }

    Err(anyhow!("no server with id {id}"))
}

fn reindex(base: &mut ServerBase, index: usize) {
    if let Some(metadata) = base.metadata.as_mut() {
        metadata.display_index = index as u32;
    }
}

fn sort_by_display_index(hosts: &mut [Host]) {
    let index = |base: &ServerBase| {
        base.metadata.as_ref().map(|m| m.display_index).unwrap_or_default()
    };
    hosts.sort_by_key(|host| index(&host.base));
    for host in hosts.iter_mut() {
        host.vms.sort_by_key(|vm| index(&vm.base));
    }
}

fn print_record(base: &ServerBase, indent: usize) {
    let id = base.unique_id.map(|id| id.to_string()).unwrap_or_default();
    let (display_name, ip, kind) = base
        .metadata
        .as_ref()
        .map(|m| (m.display_name.as_str(), m.ip_address.as_str(), m.kind))
        .unwrap_or(("", "", ServerKind::Unspecified));
    println!("{:indent$}{id}  {display_name}  {ip}  {kind:?}", "");
}

fn run_status(profiles: Arc<ProfileStore>) -> Result<()> {
    let sync = GitSync::new(profiles.clone());
    let state = sync.repo_state();
    println!("state: {state:?}");
    if state != RepoState::Dirty {
        return Ok(());
    }

    let changes = sync.get_repo_status()?;
    let servers = ServerStore::new(profiles);
    for line in servers.map_changes_to_human_readable_info(&changes)? {
        println!("  {line}");
    }

    Ok(())
}

#[instrument(skip(profiles), level = "debug")]
async fn run_pull(profiles: Arc<ProfileStore>) -> Result<()> {
    let bar = spinner("pulling latest changes")?;
    let sync = GitSync::new(profiles).with_prompter(IndicatifPrompter::new(bar.clone()));
    let outcome = tokio::task::spawn_blocking(move || sync.pull_latest_changes()).await?;
    bar.finish_and_clear();

    match outcome? {
        PullOutcome::UpToDate => info!("already up to date"),
        PullOutcome::FastForward => info!("fast-forwarded to latest changes"),
        PullOutcome::Merged => info!("merged latest changes"),
    }

    Ok(())
}

#[instrument(skip(profiles, opts), level = "debug")]
async fn run_push(profiles: Arc<ProfileStore>, opts: PushOptions) -> Result<()> {
    let bar = spinner("committing and pushing changes")?;
    let sync = GitSync::new(profiles).with_prompter(IndicatifPrompter::new(bar.clone()));
    let pushed =
        tokio::task::spawn_blocking(move || sync.commit_and_push_changes(&opts.message)).await?;
    bar.finish_and_clear();

    match pushed {
        Ok(true) => info!("changes pushed"),
        Ok(false) => warn!("nothing to commit"),
        Err(error) if error.is_auth_failure() => {
            return Err(anyhow!("remote rejected credentials of the active profile"));
        }
        Err(error) => return Err(error.into()),
    }

    Ok(())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template(
        "{elapsed_precise:.green}  {spinner:.yellow}  {msg}",
    )?);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
struct IndicatifPrompter {
    bar: ProgressBar,
}

impl IndicatifPrompter {
    fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| {
            let username = Text::new("username").prompt().ok()?;
            let token = Password::new("token").without_confirmation().prompt().ok()?;
            Some((username, token))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar
            .suspend(|| Password::new("token").without_confirmation().prompt().ok())
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar
            .suspend(|| Password::new("passphrase").without_confirmation().prompt().ok())
    }
}
