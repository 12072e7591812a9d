//! Authentication strategies, tried in order until one is accepted.

use crate::ssh_client::Client;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use russh::client::{AuthResult, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Asks the operator for a password when key authentication didn't work.
pub trait PasswordPrompt: Send + Sync {
    fn password(&self, target: &str) -> std::io::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Every identity held by the running ssh-agent.
    Agent,
    KeyFile(PathBuf),
    Password(String),
    /// Ask through the [`PasswordPrompt`], then try that password once.
    PromptPassword,
}

/// Why a single strategy did not authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The strategy could not even be tried (no agent, no such key file, ...).
    Unavailable(String),
    /// The server said no.
    Rejected(String),
}

impl std::fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStrategy::Agent => write!(f, "ssh-agent"),
            AuthStrategy::KeyFile(path) => write!(f, "key {}", path.display()),
            AuthStrategy::Password(_) => write!(f, "configured password"),
            AuthStrategy::PromptPassword => write!(f, "interactive password"),
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::Unavailable(why) => write!(f, "unavailable: {why}"),
            AuthFailure::Rejected(why) => write!(f, "rejected: {why}"),
        }
    }
}

const DEFAULT_KEYS: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// The ordered strategy list for a configuration.
///
/// A configured password is the only strategy. Otherwise keys are tried
/// (agent, explicit identity file, default `~/.ssh` keys) and then the
/// operator is asked for a password.
pub fn strategies(password: Option<&str>, identity_file: Option<&Path>) -> Vec<AuthStrategy> {
    if let Some(password) = password {
        return vec![AuthStrategy::Password(password.to_string())];
    }
    let mut out = vec![AuthStrategy::Agent];
    if let Some(identity) = identity_file {
        out.push(AuthStrategy::KeyFile(identity.to_path_buf()));
    }
    if let Some(home) = dirs::home_dir() {
        for name in DEFAULT_KEYS {
            out.push(AuthStrategy::KeyFile(home.join(".ssh").join(name)));
        }
    }
    out.push(AuthStrategy::PromptPassword);
    out
}

fn verdict(res: AuthResult) -> Result<(), AuthFailure> {
    match res {
        AuthResult::Success => Ok(()),
        AuthResult::Failure {
            remaining_methods,
            partial_success,
        } => Err(AuthFailure::Rejected(format!(
            "remaining_methods: {remaining_methods:?}, partial_success: {partial_success}"
        ))),
    }
}

/// One authentication method per call, as offered by an SSH session.
///
/// The outer error is a broken connection, which ends the whole attempt; the
/// inner one says why this single method did not work.
#[async_trait]
pub(crate) trait AuthSession: Send {
    async fn password(&mut self, user: &str, password: &str) -> Result<Result<(), AuthFailure>>;

    async fn key_file(&mut self, user: &str, path: &Path) -> Result<Result<(), AuthFailure>>;

    async fn agent(&mut self, user: &str) -> Result<Result<(), AuthFailure>>;
}

#[async_trait]
impl AuthSession for Handle<Client> {
    async fn password(&mut self, user: &str, password: &str) -> Result<Result<(), AuthFailure>> {
        Ok(verdict(self.authenticate_password(user, password).await?))
    }

    async fn key_file(&mut self, user: &str, path: &Path) -> Result<Result<(), AuthFailure>> {
        if !path.is_file() {
            return Ok(Err(AuthFailure::Unavailable("no such file".into())));
        }
        let key = match russh::keys::load_secret_key(path, None) {
            Ok(k) => k,
            Err(e) => return Ok(Err(AuthFailure::Unavailable(format!("unusable key: {e}")))),
        };
        let hash_alg = self.best_supported_rsa_hash().await?.flatten();
        let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);
        Ok(verdict(self.authenticate_publickey(user, key).await?))
    }

    #[cfg(unix)]
    async fn agent(&mut self, user: &str) -> Result<Result<(), AuthFailure>> {
        use russh::keys::agent::client::AgentClient;

        if std::env::var_os("SSH_AUTH_SOCK").is_none() {
            return Ok(Err(AuthFailure::Unavailable("SSH_AUTH_SOCK is not set".into())));
        }
        let mut agent = match AgentClient::connect_env().await {
            Ok(a) => a,
            Err(e) => return Ok(Err(AuthFailure::Unavailable(format!("agent: {e}")))),
        };
        let identities = match agent.request_identities().await {
            Ok(ids) => ids,
            Err(e) => return Ok(Err(AuthFailure::Unavailable(format!("agent: {e}")))),
        };
        if identities.is_empty() {
            return Ok(Err(AuthFailure::Unavailable("agent holds no identities".into())));
        }
        let hash_alg = self.best_supported_rsa_hash().await?.flatten();
        let mut last = AuthFailure::Unavailable("no identity tried".into());
        for key in identities {
            let res = self
                .authenticate_publickey_with(user, key, hash_alg, &mut agent)
                .await
                .map_err(|e| anyhow!("agent signing failed: {e}"))?;
            match verdict(res) {
                Ok(()) => return Ok(Ok(())),
                Err(failure) => last = failure,
            }
        }
        Ok(Err(last))
    }

    #[cfg(not(unix))]
    async fn agent(&mut self, _user: &str) -> Result<Result<(), AuthFailure>> {
        Ok(Err(AuthFailure::Unavailable("ssh-agent is only supported on unix".into())))
    }
}

impl AuthStrategy {
    /// Try this strategy once against `session`.
    pub(crate) async fn attempt<S: AuthSession + ?Sized>(
        &self,
        session: &mut S,
        user: &str,
        target: &str,
        prompt: &dyn PasswordPrompt,
    ) -> Result<Result<(), AuthFailure>> {
        match self {
            AuthStrategy::Password(password) => session.password(user, password).await,
            AuthStrategy::PromptPassword => match prompt.password(target) {
                Ok(password) => session.password(user, &password).await,
                Err(e) => Ok(Err(AuthFailure::Unavailable(format!("prompt failed: {e}")))),
            },
            AuthStrategy::KeyFile(path) => session.key_file(user, path).await,
            AuthStrategy::Agent => session.agent(user).await,
        }
    }
}

/// Walk `strategies` in order; the first accepted one wins.
pub(crate) async fn authenticate<S: AuthSession + ?Sized>(
    session: &mut S,
    user: &str,
    target: &str,
    strategies: &[AuthStrategy],
    prompt: &dyn PasswordPrompt,
) -> Result<()> {
    let mut failures = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        debug!("trying {strategy} for {target}");
        match strategy.attempt(session, user, target, prompt).await? {
            Ok(()) => {
                debug!("authenticated to {target} with {strategy}");
                return Ok(());
            }
            Err(failure) => {
                debug!("{strategy} failed: {failure}");
                failures.push(format!("{strategy}: {failure}"));
            }
        }
    }
    Err(anyhow!("all authentication methods failed ({})", failures.join("; ")))
}
