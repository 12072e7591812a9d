//! Local to remote path translation. Remote paths are always POSIX style.

use std::path::Path;

pub fn as_posix_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Translate `local` (which must live under `local_base`) into the matching
/// path under `remote_base`.
///
/// The base is removed textually, so `local_base` must be spelled the same way
/// the watcher reports paths.
pub fn resolve_remote(local: &Path, local_base: &Path, remote_base: &str) -> String {
    let local = as_posix_path(local);
    let base = as_posix_path(local_base);
    debug_assert!(local.starts_with(&base), "{local} is not under {base}");
    let rel = local.strip_prefix(base.as_str()).unwrap_or(&local);
    join_remote(remote_base, rel.trim_start_matches('/'))
}

/// POSIX `join`: an absolute `rel` replaces `root`, an empty one leaves it as is.
pub fn join_remote(root: &str, rel: &str) -> String {
    if rel.starts_with('/') || root.is_empty() {
        return rel.to_string();
    }
    if rel.is_empty() {
        return root.to_string();
    }
    if root.ends_with('/') {
        format!("{root}{rel}")
    } else {
        format!("{root}/{rel}")
    }
}

/// POSIX `dirname` of a remote path.
pub fn remote_parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None if path.starts_with('/') => "/",
        None => ".",
    }
}
