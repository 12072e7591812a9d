//! In-memory `RemoteFs` used by the tests of this crate and its dependents.

use crate::remote::{CommandOutput, RemoteError, RemoteFs, RemoteOp};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    ops: Vec<RemoteOp>,
    fail_on: Option<String>,
}

/// Records every op and keeps a tiny model of the remote tree.
///
/// Uploads fail unless the parent directory was created first, and renames
/// fail when the source is missing, like the real thing.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

fn under(path: &str, root: &str) -> bool {
    path == root || path.starts_with(&format!("{}/", root.trim_end_matches('/')))
}

fn fail(op: &RemoteOp, reason: &str) -> RemoteError {
    match op {
        RemoteOp::Upload { local, remote } => RemoteError::Transfer {
            local: local.clone(),
            remote: remote.clone(),
            reason: reason.to_string(),
        },
        other => RemoteError::Command {
            command: other.command().unwrap_or_default(),
            reason: reason.to_string(),
        },
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every op whose description contains `needle` fail; `None` heals.
    pub fn fail_on(&self, needle: Option<&str>) {
        self.lock().fail_on = needle.map(str::to_string);
    }

    pub fn ops(&self) -> Vec<RemoteOp> {
        self.lock().ops.clone()
    }

    pub fn file(&self, remote: &str) -> Option<Vec<u8>> {
        self.lock().files.get(remote).cloned()
    }

    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.lock().files.clone()
    }

    pub fn has_dir(&self, remote: &str) -> bool {
        self.lock().dirs.contains(remote)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RemoteFs for MemoryRemote {
    fn target(&self) -> &str {
        "tester@memory"
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        Err(RemoteError::Command {
            command: command.to_string(),
            reason: "raw commands are not modelled".to_string(),
        })
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        self.apply(&RemoteOp::Upload {
            local: local.to_path_buf(),
            remote: remote.to_string(),
        })
        .await
    }

    async fn apply(&self, op: &RemoteOp) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.ops.push(op.clone());
        if let Some(needle) = &state.fail_on {
            if op.to_string().contains(needle.as_str()) {
                return Err(fail(op, "injected failure"));
            }
        }
        match op {
            RemoteOp::MkDir { remote } => {
                let mut cur = remote.trim_end_matches('/').to_string();
                while !cur.is_empty() && cur != "/" && state.dirs.insert(cur.clone()) {
                    let parent = crate::path::remote_parent(&cur).to_string();
                    if parent == cur {
                        break;
                    }
                    cur = parent;
                }
            }
            RemoteOp::Upload { local, remote } => {
                let parent = crate::path::remote_parent(remote);
                if parent != "/" && !state.dirs.contains(parent) {
                    return Err(fail(op, "no such directory"));
                }
                let data = std::fs::read(local).map_err(|e| fail(op, &e.to_string()))?;
                state.files.insert(remote.clone(), data);
            }
            RemoteOp::Remove { remote } => {
                state.files.retain(|p, _| !under(p, remote));
                state.dirs.retain(|p| !under(p, remote));
            }
            RemoteOp::Rename { from, to } => {
                let moved_files: Vec<(String, Vec<u8>)> = state
                    .files
                    .iter()
                    .filter(|(p, _)| under(p, from))
                    .map(|(p, d)| (format!("{to}{}", &p[from.len()..]), d.clone()))
                    .collect();
                let moved_dirs: Vec<String> = state
                    .dirs
                    .iter()
                    .filter(|p| under(p, from))
                    .map(|p| format!("{to}{}", &p[from.len()..]))
                    .collect();
                if moved_files.is_empty() && moved_dirs.is_empty() {
                    return Err(fail(op, "no such file or directory"));
                }
                state.files.retain(|p, _| !under(p, from));
                state.dirs.retain(|p| !under(p, from));
                state.files.extend(moved_files);
                state.dirs.extend(moved_dirs);
            }
        }
        Ok(())
    }
}
