//! Applies local changes to the remote tree of one mapping.
//!
//! Every operation is best effort: failures are logged and reported as
//! [`Outcome::Failed`], never propagated, so one bad transfer can't stop the
//! watch.

use crate::path::{remote_parent, resolve_remote};
use crate::remote::{RemoteFs, RemoteOp};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// A validated local base directory paired with its remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub local_base:  PathBuf,
    pub remote_base: String,
}

impl Mapping {
    pub fn remote_path(&self, local: &Path) -> String {
        resolve_remote(local, &self.local_base, &self.remote_base)
    }

    pub fn contains(&self, local: &Path) -> bool {
        local.starts_with(&self.local_base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Failed,
}

/// The three remote actions the dispatcher can ask for.
#[async_trait]
pub trait Mirror: Send + Sync + 'static {
    fn mapping(&self) -> &Mapping;
    async fn transfer_file(&self, local: &Path) -> Outcome;
    async fn delete_resource(&self, local: &Path) -> Outcome;
    async fn move_resource(&self, from: &Path, to: &Path) -> Outcome;
}

pub struct MirrorController<R: RemoteFs> {
    remote: Arc<R>,
    mapping: Mapping,
}

impl<R: RemoteFs> MirrorController<R> {
    pub fn new(remote: Arc<R>, mapping: Mapping) -> Self {
        Self { remote, mapping }
    }

    async fn run(&self, action: &str, ops: &[RemoteOp]) -> Outcome {
        for op in ops {
            if let Err(e) = self.remote.apply(op).await {
                error!("Caught error while {action} (step: {op}): {e}");
                return Outcome::Failed;
            }
        }
        Outcome::Applied
    }
}

#[async_trait]
impl<R: RemoteFs> Mirror for MirrorController<R> {
    fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    async fn transfer_file(&self, local: &Path) -> Outcome {
        let remote = self.mapping.remote_path(local);
        info!(
            "Copying\n\t{}\nto\n\t{}:{}",
            local.display(),
            self.remote.target(),
            remote
        );
        let ops = [
            RemoteOp::MkDir {
                remote: remote_parent(&remote).to_string(),
            },
            RemoteOp::Upload {
                local: local.to_path_buf(),
                remote,
            },
        ];
        self.run("copying", &ops).await
    }

    async fn delete_resource(&self, local: &Path) -> Outcome {
        let remote = self.mapping.remote_path(local);
        info!("Deleting {}:{}", self.remote.target(), remote);
        self.run("deleting", &[RemoteOp::Remove { remote }]).await
    }

    async fn move_resource(&self, from: &Path, to: &Path) -> Outcome {
        let from = self.mapping.remote_path(from);
        let to = self.mapping.remote_path(to);
        let target = self.remote.target();
        info!("Moving\n\t{target}:{from}\nto\n\t{target}:{to}");
        let ops = [
            RemoteOp::MkDir {
                remote: remote_parent(&to).to_string(),
            },
            RemoteOp::Rename { from, to },
        ];
        self.run("moving", &ops).await
    }
}
