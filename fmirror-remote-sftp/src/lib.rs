mod auth;
mod ssh_client;

pub use auth::{strategies, AuthFailure, AuthStrategy, PasswordPrompt};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fmirror_core::{CommandOutput, RemoteError, RemoteFs};
use russh::client::Handle;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use ssh_client::Client;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Connection settings handed over by the configuration.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// `host` or `host:port`
    pub host:                 String,
    pub user:                 String,
    pub strategies:           Vec<AuthStrategy>,
    pub allowed_fingerprints: Option<Vec<String>>,
}

struct Inner {
    session: Handle<Client>,
    sftp: SftpSession,
}

/// The one SSH session of the process: shell commands go over exec channels,
/// uploads over a single SFTP channel. Uses are serialized.
pub struct SshRemote {
    target: String,
    inner: Mutex<Inner>,
}

/// Split `host`, `host:port`, `[v6addr]` or `[v6addr]:port`. A bare address
/// with several colons is IPv6 without a port.
fn split_host(host_with_port: &str) -> Result<(String, u16)> {
    let parse_port = |p: &str| {
        p.parse::<u16>()
            .map_err(|_| anyhow!("invalid port in host: {host_with_port}"))
    };
    if let Some(rest) = host_with_port.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("unclosed '[' in host: {host_with_port}"))?;
        let port = match after {
            "" => 22,
            _ => match after.strip_prefix(':') {
                Some(p) => parse_port(p)?,
                None => return Err(anyhow!("unexpected text after ']' in host: {host_with_port}")),
            },
        };
        return Ok((host.to_string(), port));
    }
    match host_with_port.split_once(':') {
        Some((h, p)) if !p.contains(':') => Ok((h.to_string(), parse_port(p)?)),
        _ => Ok((host_with_port.to_string(), 22)),
    }
}

impl SshRemote {
    pub async fn connect(
        opts: ConnectOptions,
        prompt: &dyn PasswordPrompt,
    ) -> Result<Self, RemoteError> {
        let target = format!("{}@{}", opts.user, opts.host);
        let connect_err = |e: anyhow::Error| RemoteError::Connect {
            target: target.clone(),
            reason: format!("{e:#}"),
        };

        let (host, port) = split_host(&opts.host).map_err(connect_err)?;
        let config = russh::client::Config::default();
        let client = Client {
            allowed_fingerprints: opts.allowed_fingerprints.clone(),
        };
        let mut session = russh::client::connect(Arc::new(config), (host.as_str(), port), client)
            .await
            .map_err(connect_err)?;

        auth::authenticate(&mut session, &opts.user, &target, &opts.strategies, prompt)
            .await
            .map_err(|e| RemoteError::Auth {
                target: target.clone(),
                reason: format!("{e:#}"),
            })?;

        let sftp = Self::open_sftp(&session).await.map_err(connect_err)?;
        info!("Successfully connected to {target}");
        Ok(Self {
            target,
            inner: Mutex::new(Inner { session, sftp }),
        })
    }

    async fn open_sftp(session: &Handle<Client>) -> Result<SftpSession> {
        let channel = session.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        debug!("remote working directory: {:?}", sftp.canonicalize(".").await?);
        Ok(sftp)
    }

    pub async fn disconnect(&self) {
        let inner = self.inner.lock().await;
        if let Err(e) = inner
            .session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("disconnect from {}: {e}", self.target);
        }
    }

    async fn run_command(session: &Handle<Client>, command: &str) -> Result<CommandOutput> {
        let mut channel = session.channel_open_session().await?;
        channel.exec(true, command).await?;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }
        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };
        match exit_status {
            Some(0) => Ok(output),
            Some(code) => Err(anyhow!("exit status {code}: {}", output.stderr.trim())),
            None => Err(anyhow!("channel closed without an exit status")),
        }
    }

    async fn put(sftp: &SftpSession, local: &Path, remote: &str) -> Result<()> {
        let mut reader = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("open {}", local.display()))?;
        let mut remote_file = sftp.create(remote).await?;
        tokio::io::copy(&mut reader, &mut remote_file).await?;
        remote_file.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteFs for SshRemote {
    fn target(&self) -> &str {
        &self.target
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let inner = self.inner.lock().await;
        debug!("{}$ {command}", self.target);
        Self::run_command(&inner.session, command)
            .await
            .map_err(|e| RemoteError::Command {
                command: command.to_string(),
                reason: format!("{e:#}"),
            })
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let inner = self.inner.lock().await;
        Self::put(&inner.sftp, local, remote)
            .await
            .map_err(|e| RemoteError::Transfer {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                reason: format!("{e:#}"),
            })
    }
}
