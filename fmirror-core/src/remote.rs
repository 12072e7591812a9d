use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Single remote operation derived from a local FS event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Upload { local: PathBuf, remote: String },
    MkDir { remote: String },
    Remove { remote: String },
    Rename { from: String, to: String },
}

impl RemoteOp {
    /// Shell command carrying out this op on the remote host, `None` for uploads.
    pub fn command(&self) -> Option<String> {
        match self {
            RemoteOp::Upload { .. } => None,
            RemoteOp::MkDir { remote } => Some(format!("mkdir -p {}", shell_quote(remote))),
            RemoteOp::Remove { remote } => Some(format!("rm -rf {}", shell_quote(remote))),
            RemoteOp::Rename { from, to } => {
                Some(format!("mv -f {} {}", shell_quote(from), shell_quote(to)))
            }
        }
    }
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOp::Upload { local, remote } => {
                write!(f, "upload {} to {remote}", local.display())
            }
            RemoteOp::MkDir { remote } => write!(f, "create directory {remote}"),
            RemoteOp::Remove { remote } => write!(f, "remove {remote}"),
            RemoteOp::Rename { from, to } => write!(f, "rename {from} to {to}"),
        }
    }
}

/// Quote `s` for a POSIX shell: wrap in single quotes, escape embedded ones.
pub fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Captured result of a remote command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("could not connect to {target}: {reason}")]
    Connect { target: String, reason: String },
    #[error("could not authenticate as {target}: {reason}")]
    Auth { target: String, reason: String },
    #[error("remote command `{command}` failed: {reason}")]
    Command { command: String, reason: String },
    #[error("transfer of {} to {remote} failed: {reason}", .local.display())]
    Transfer {
        local: PathBuf,
        remote: String,
        reason: String,
    },
}

/// The remote end of a mirror: one authenticated session shared by every mapping.
#[async_trait]
pub trait RemoteFs: Send + Sync + 'static {
    /// `user@host`, used to prefix remote paths in log messages.
    fn target(&self) -> &str;

    async fn execute(&self, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Copy `local` to `remote`, replacing whatever is there.
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;

    async fn apply(&self, op: &RemoteOp) -> Result<(), RemoteError> {
        match op {
            RemoteOp::Upload { local, remote } => self.upload_file(local, remote).await,
            other => {
                // every non-upload op renders to a command
                let command = other.command().unwrap_or_default();
                self.execute(&command).await.map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_paths_for_the_shell() {
        assert_eq!(shell_quote("/srv/a b"), "'/srv/a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn ops_render_to_commands() {
        let mkdir = RemoteOp::MkDir { remote: "/srv/x y".into() };
        assert_eq!(mkdir.command().unwrap(), "mkdir -p '/srv/x y'");
        let rm = RemoteOp::Remove { remote: "/srv/x".into() };
        assert_eq!(rm.command().unwrap(), "rm -rf '/srv/x'");
        let mv = RemoteOp::Rename { from: "/srv/a".into(), to: "/srv/b".into() };
        assert_eq!(mv.command().unwrap(), "mv -f '/srv/a' '/srv/b'");
        let up = RemoteOp::Upload { local: "/l/a".into(), remote: "/srv/a".into() };
        assert_eq!(up.command(), None);
    }
}
