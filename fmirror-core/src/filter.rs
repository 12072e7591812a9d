use crate::config::{ConfigError, Pattern};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Runtime filter compiled from the ignore pattern list.
///
/// Patterns are matched against the full local path and `*` also matches
/// `/`, so `*.swp` excludes swap files at any depth.
#[derive(Debug, Clone)]
pub struct PathFilter {
    ignore: GlobSet,
}

impl PathFilter {
    pub fn new(ignore: &[Pattern]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pat in ignore {
            let glob = Glob::new(&pat.0).map_err(|source| ConfigError::Pattern {
                pattern: pat.0.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let ignore = builder.build().map_err(|source| ConfigError::Pattern {
            pattern: ignore.iter().map(|p| p.0.as_str()).collect::<Vec<_>>().join(", "),
            source,
        })?;
        Ok(Self { ignore })
    }

    /// Determine whether a given path should be mirrored.
    pub fn check<P: AsRef<Path>>(&self, path: P) -> bool {
        !self.ignore.is_match(path.as_ref())
    }
}
