use crate::event::{EntryKind, FsEvent};
use crate::filter::PathFilter;
use crate::mirror::{Mirror, Outcome};
use std::sync::Arc;
use tracing::debug;

/// Routes the events of one mapping to its mirror.
///
/// Holds nothing but the ignore filter and the mirror, whose mapping marks
/// the boundary of what gets forwarded.
pub struct Dispatcher<M: Mirror> {
    mirror: M,
    filter: Arc<PathFilter>,
}

impl<M: Mirror> Dispatcher<M> {
    pub fn new(mirror: M, filter: Arc<PathFilter>) -> Self {
        Self { mirror, filter }
    }

    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    fn accepts(&self, event: &FsEvent) -> bool {
        let mapping = self.mirror.mapping();
        match event {
            FsEvent::Moved { from, to, .. } => {
                mapping.contains(from)
                    && mapping.contains(to)
                    && (self.filter.check(from) || self.filter.check(to))
            }
            _ => event
                .paths()
                .iter()
                .all(|p| mapping.contains(p) && self.filter.check(p)),
        }
    }

    /// Handle one event to completion. `None` when the event was not forwarded.
    pub async fn dispatch(&self, event: FsEvent) -> Option<Outcome> {
        if !self.accepts(&event) {
            debug!("Ignoring {event:?}");
            return None;
        }
        let outcome = match event {
            FsEvent::Created { kind: EntryKind::Directory, .. }
            | FsEvent::Modified { kind: EntryKind::Directory, .. } => {
                // remote directories appear when a file inside them is copied
                debug!("Ignoring directory event {event:?}");
                return None;
            }
            FsEvent::Created { path, kind: EntryKind::File }
            | FsEvent::Modified { path, kind: EntryKind::File } => {
                self.mirror.transfer_file(&path).await
            }
            FsEvent::Deleted { path, .. } => self.mirror.delete_resource(&path).await,
            FsEvent::Moved { from, to, .. } => self.mirror.move_resource(&from, &to).await,
        };
        Some(outcome)
    }
}
