//! Turns a loaded configuration into running mirrors.
//!
//! Everything here runs before the watch starts; any error is fatal.

use crate::{
    config::{expand_path, Config, ConfigError},
    dispatch::Dispatcher,
    filter::PathFilter,
    mirror::{Mapping, MirrorController},
    path::join_remote,
    remote::{RemoteError, RemoteFs},
    task::{spawn_monitor, MonitorHandle},
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "invalid local_root_path configured: {} is not a valid path on the local machine",
        .0.display()
    )]
    InvalidLocalRoot(PathBuf),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("no valid path mappings were configured, so there's nothing to do")]
    NoValidMappings,
    #[error("could not watch local paths: {0}")]
    Watch(#[from] notify::Error),
}

/// Everything derived from the configuration that doesn't need the remote.
#[derive(Debug)]
pub struct Plan {
    pub local_root: PathBuf,
    pub mappings:   Vec<Mapping>,
    pub filter:     Arc<PathFilter>,
    pub escalation: Option<u32>,
}

impl Plan {
    pub fn from_config(cfg: &Config) -> Result<Self, StartupError> {
        let local_root = expand_path(&cfg.local_root_path);
        if !local_root.is_dir() {
            return Err(StartupError::InvalidLocalRoot(cfg.local_root_path.clone()));
        }
        debug!("Using local root path: {}", local_root.display());
        let filter = Arc::new(PathFilter::new(&cfg.ignore_patterns)?);
        let mut mappings = Vec::with_capacity(cfg.path_mappings.len());
        for m in &cfg.path_mappings {
            let local_base = local_root.join(&m.local);
            if !local_base.is_dir() {
                warn!(
                    "Invalid path mapping configured: {} is not a valid path on the local machine",
                    local_base.display()
                );
                continue;
            }
            let remote_base = join_remote(&cfg.remote_root_path, &m.remote);
            mappings.push(Mapping { local_base, remote_base });
        }
        if mappings.is_empty() {
            return Err(StartupError::NoValidMappings);
        }
        Ok(Self {
            local_root,
            mappings,
            filter,
            escalation: cfg.escalation_threshold(),
        })
    }

    /// Bind every mapping to the shared session and start watching.
    pub fn start<R: RemoteFs>(self, remote: Arc<R>) -> Result<MonitorHandle, StartupError> {
        let dispatchers: Vec<_> = self
            .mappings
            .into_iter()
            .map(|mapping| {
                info!(
                    "Path mapping initializing:\nChanges at local path\n\t{}\n\
                     will be reflected at remote path\n\t{}:{}",
                    mapping.local_base.display(),
                    remote.target(),
                    mapping.remote_base
                );
                let mirror = MirrorController::new(remote.clone(), mapping);
                Dispatcher::new(mirror, self.filter.clone())
            })
            .collect();
        Ok(spawn_monitor(dispatchers, self.escalation)?)
    }
}
