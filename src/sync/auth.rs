// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote authentication.
//!
//! Credentials are never kept between network operations. Every fetch, pull,
//! or push builds a fresh [`GitAuthenticator`] from whatever the profile holds
//! at that moment, so a profile switch or an edited token is picked up on the
//! next attempt, and a failed prompt can simply be asked again.

use auth_git2::{GitAuthenticator, Prompter};
use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::Path,
};
use tracing::{debug, instrument};

/// User name and personal access token for the remote.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Check if a token is available.
    pub fn is_complete(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

impl Debug for Credentials {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Prompter that never answers.
///
/// Used when no interactive prompting is available, so a missing token fails
/// the operation instead of blocking on a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompter;

impl Prompter for NoPrompter {
    fn prompt_username_password(
        &mut self,
        _url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        None
    }

    fn prompt_password(
        &mut self,
        _username: &str,
        _url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        None
    }

    fn prompt_ssh_key_passphrase(
        &mut self,
        _ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        None
    }
}

/// Build authenticator for a single network operation.
///
/// Configured credentials are offered for every domain. The prompter is only
/// consulted when no token is configured.
#[instrument(skip(credentials, prompter), level = "debug")]
pub fn authenticator<P>(credentials: &Credentials, prompter: &P) -> GitAuthenticator
where
    P: Prompter + Clone + Send + 'static,
{
    let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
    if !credentials.is_complete() {
        debug!("no token configured, fall back to prompting");
        return authenticator;
    }

    let username = match credentials.username.trim() {
        "" => "git",
        username => username,
    };

    authenticator
        .add_plaintext_credentials("*", username, credentials.token.as_str())
        .try_password_prompt(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let credentials = Credentials::new("blah", "ghp_secret");
        let result = format!("{credentials:?}");
        assert!(result.contains("blah"));
        assert!(!result.contains("ghp_secret"));
    }

    const URL: &str = "https://example.com/blah/inventory.git";

    #[test]
    fn configured_token_answers_without_prompting() -> anyhow::Result<()> {
        let config = git2::Config::new()?;
        let authenticator = authenticator(&Credentials::new("", "ghp_secret"), &NoPrompter);
        let mut callback = authenticator.credentials(&config);
        let result = callback(URL, None, git2::CredentialType::USER_PASS_PLAINTEXT);
        assert!(result.is_ok());

        Ok(())
    }

    #[test]
    fn blank_token_without_prompter_fails() -> anyhow::Result<()> {
        let config = git2::Config::new()?;
        let authenticator = authenticator(&Credentials::new("blah", "  "), &NoPrompter);
        let mut callback = authenticator.credentials(&config);
        let result = callback(URL, Some("blah"), git2::CredentialType::USER_PASS_PLAINTEXT);
        assert!(result.is_err());

        Ok(())
    }

    #[test]
    fn blank_token_is_incomplete() {
        assert!(!Credentials::new("blah", "  ").is_complete());
        assert!(Credentials::new("", "ghp_secret").is_complete());
    }
}
