use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    EventKind,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// How long the source half of a rename waits for its destination half
/// before it counts as a deletion.
pub const RENAME_WINDOW: Duration = Duration::from_millis(500);

/// What kind of filesystem entry an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// Look the kind up on disk. Paths that are gone count as files.
    fn on_disk(path: &Path) -> Self {
        if path.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

/// A local change, already reduced to what mirroring cares about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FsEvent {
    Created { path: PathBuf, kind: EntryKind },
    Modified { path: PathBuf, kind: EntryKind },
    Deleted { path: PathBuf, kind: EntryKind },
    Moved { from: PathBuf, to: PathBuf, kind: EntryKind },
}

impl FsEvent {
    pub fn kind(&self) -> EntryKind {
        match self {
            FsEvent::Created { kind, .. }
            | FsEvent::Modified { kind, .. }
            | FsEvent::Deleted { kind, .. }
            | FsEvent::Moved { kind, .. } => *kind,
        }
    }

    /// Every local path the event touches.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            FsEvent::Created { path, .. }
            | FsEvent::Modified { path, .. }
            | FsEvent::Deleted { path, .. } => vec![path.as_path()],
            FsEvent::Moved { from, to, .. } => vec![from.as_path(), to.as_path()],
        }
    }
}

/// `path` appeared. A directory brings everything below it along, since no
/// watch saw those entries being created.
fn appeared(path: PathBuf) -> Vec<FsEvent> {
    if !path.is_dir() {
        return vec![FsEvent::Created { path, kind: EntryKind::File }];
    }
    WalkDir::new(&path)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| {
            let kind = if entry.file_type().is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            FsEvent::Created { path: entry.into_path(), kind }
        })
        .collect()
}

/// Source half of a rename still waiting for its destination.
#[derive(Debug)]
struct PendingFrom {
    source: usize,
    tracker: Option<usize>,
    path: PathBuf,
    since: Instant,
}

/// Turns notify events into [`FsEvent`]s.
///
/// Events are tagged with the watcher (`source`) that produced them. Rename
/// halves are paired per source by their tracker: a matched pair becomes one
/// `Moved`, a destination without a source becomes `Created` (for a moved-in
/// directory, one per entry under it), and a source left unmatched for
/// [`RENAME_WINDOW`] becomes `Deleted`.
#[derive(Debug, Default)]
pub struct EventTranslator {
    pending: Vec<PendingFrom>,
    /// Pairs already reported as `Moved`, so the backend's own two-path
    /// summary of them is skipped.
    paired: Vec<(usize, usize, Instant)>,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one event of `source`; everything returned belongs to it.
    pub fn translate(
        &mut self,
        source: usize,
        event: notify::Event,
        now: Instant,
    ) -> Vec<FsEvent> {
        let tracker = event.attrs.tracker();
        let mut out = Vec::new();
        match event.kind {
            EventKind::Create(create) => {
                for path in event.paths {
                    let kind = match create {
                        CreateKind::File => EntryKind::File,
                        CreateKind::Folder => EntryKind::Directory,
                        _ => EntryKind::on_disk(&path),
                    };
                    out.push(FsEvent::Created { path, kind });
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in event.paths {
                    self.pending.push(PendingFrom { source, tracker, path, since: now });
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for to in event.paths {
                    match self.take_pending(source, tracker) {
                        Some(from) => {
                            if let Some(t) = tracker {
                                self.paired.push((source, t, now));
                            }
                            let kind = EntryKind::on_disk(&to);
                            out.push(FsEvent::Moved { from, to, kind });
                        }
                        None => out.extend(appeared(to)),
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) if event.paths.len() == 2 => {
                if let Some(t) = tracker {
                    let before = self.paired.len();
                    self.paired.retain(|&(s, p, _)| (s, p) != (source, t));
                    if self.paired.len() != before {
                        return out;
                    }
                    self.take_pending(source, tracker);
                }
                let mut paths = event.paths.into_iter();
                if let (Some(from), Some(to)) = (paths.next(), paths.next()) {
                    let kind = EntryKind::on_disk(&to);
                    out.push(FsEvent::Moved { from, to, kind });
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // one side of a rename with no way to pair it: trust the disk
                for path in event.paths {
                    if path.exists() {
                        out.extend(appeared(path));
                    } else {
                        out.push(FsEvent::Deleted { path, kind: EntryKind::File });
                    }
                }
            }
            EventKind::Modify(_) => {
                for path in event.paths {
                    let kind = EntryKind::on_disk(&path);
                    out.push(FsEvent::Modified { path, kind });
                }
            }
            EventKind::Remove(remove) => {
                for path in event.paths {
                    let kind = match remove {
                        RemoveKind::Folder => EntryKind::Directory,
                        _ => EntryKind::File,
                    };
                    out.push(FsEvent::Deleted { path, kind });
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
        out
    }

    /// Source halves that waited out [`RENAME_WINDOW`], as deletions.
    pub fn expire(&mut self, now: Instant) -> Vec<(usize, FsEvent)> {
        self.paired
            .retain(|&(_, _, since)| now.saturating_duration_since(since) < RENAME_WINDOW);
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if now.saturating_duration_since(self.pending[i].since) >= RENAME_WINDOW {
                let gone = self.pending.remove(i);
                if gone.path.exists() {
                    // something new took its place and reported itself
                    continue;
                }
                out.push((
                    gone.source,
                    FsEvent::Deleted { path: gone.path, kind: EntryKind::File },
                ));
            } else {
                i += 1;
            }
        }
        out
    }

    /// When the oldest waiting source half is due, if any.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.since + RENAME_WINDOW).min()
    }

    fn take_pending(&mut self, source: usize, tracker: Option<usize>) -> Option<PathBuf> {
        let idx = self
            .pending
            .iter()
            .rposition(|p| p.source == source && p.tracker == tracker)?;
        Some(self.pending.remove(idx).path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind};
    use notify::Event;

    fn translate(ev: Event) -> Vec<FsEvent> {
        EventTranslator::new().translate(0, ev, Instant::now())
    }

    fn rename(mode: RenameMode, tracker: Option<usize>, paths: &[&str]) -> Event {
        let mut ev = Event::new(EventKind::Modify(ModifyKind::Name(mode)));
        if let Some(t) = tracker {
            ev = ev.set_tracker(t);
        }
        for p in paths {
            ev = ev.add_path(p.into());
        }
        ev
    }

    #[test]
    fn create_kinds_are_kept() {
        let ev = Event::new(EventKind::Create(CreateKind::File)).add_path("/w/a.txt".into());
        assert_eq!(
            translate(ev),
            vec![FsEvent::Created { path: "/w/a.txt".into(), kind: EntryKind::File }]
        );
        let ev = Event::new(EventKind::Create(CreateKind::Folder)).add_path("/w/d".into());
        assert_eq!(translate(ev)[0].kind(), EntryKind::Directory);
    }

    #[test]
    fn unspecified_create_checks_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ev = Event::new(EventKind::Create(CreateKind::Any)).add_path(dir.path().to_path_buf());
        assert_eq!(translate(ev)[0].kind(), EntryKind::Directory);
    }

    #[test]
    fn data_and_metadata_changes_are_modifications() {
        for kind in [
            ModifyKind::Data(DataChange::Content),
            ModifyKind::Metadata(MetadataKind::Any),
            ModifyKind::Any,
        ] {
            let ev = Event::new(EventKind::Modify(kind)).add_path("/w/missing.txt".into());
            assert_eq!(
                translate(ev),
                vec![FsEvent::Modified { path: "/w/missing.txt".into(), kind: EntryKind::File }]
            );
        }
    }

    #[test]
    fn two_path_rename_is_a_move() {
        let ev = rename(RenameMode::Both, None, &["/w/a", "/w/b"]);
        assert_eq!(
            translate(ev),
            vec![FsEvent::Moved { from: "/w/a".into(), to: "/w/b".into(), kind: EntryKind::File }]
        );
    }

    #[test]
    fn paired_halves_make_a_single_move() {
        // inotify order: From, To, then a Both summarising the pair
        let mut tr = EventTranslator::new();
        let now = Instant::now();
        assert!(tr.translate(0, rename(RenameMode::From, Some(7), &["/w/a"]), now).is_empty());
        assert_eq!(
            tr.translate(0, rename(RenameMode::To, Some(7), &["/w/b"]), now),
            vec![FsEvent::Moved { from: "/w/a".into(), to: "/w/b".into(), kind: EntryKind::File }]
        );
        assert!(tr
            .translate(0, rename(RenameMode::Both, Some(7), &["/w/a", "/w/b"]), now)
            .is_empty());
        assert_eq!(tr.next_expiry(), None);
        assert!(tr.expire(now + RENAME_WINDOW).is_empty());
    }

    #[test]
    fn untracked_halves_pair_up_in_order() {
        let mut tr = EventTranslator::new();
        let now = Instant::now();
        tr.translate(0, rename(RenameMode::From, None, &["/w/a"]), now);
        assert_eq!(
            tr.translate(0, rename(RenameMode::To, None, &["/w/b"]), now),
            vec![FsEvent::Moved { from: "/w/a".into(), to: "/w/b".into(), kind: EntryKind::File }]
        );
    }

    #[test]
    fn unmatched_source_half_becomes_a_deletion_after_the_window() {
        let mut tr = EventTranslator::new();
        let now = Instant::now();
        assert!(tr.translate(3, rename(RenameMode::From, Some(1), &["/w/a"]), now).is_empty());
        assert_eq!(tr.next_expiry(), Some(now + RENAME_WINDOW));
        assert!(tr.expire(now + RENAME_WINDOW / 2).is_empty());
        assert_eq!(
            tr.expire(now + RENAME_WINDOW),
            vec![(3, FsEvent::Deleted { path: "/w/a".into(), kind: EntryKind::File })]
        );
        assert_eq!(tr.next_expiry(), None);
    }

    #[test]
    fn unmatched_destination_half_is_a_creation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.txt");
        std::fs::write(&file, "x").unwrap();
        let mut tr = EventTranslator::new();
        let ev = rename(RenameMode::To, Some(9), &[file.to_str().unwrap()]);
        assert_eq!(
            tr.translate(0, ev, Instant::now()),
            vec![FsEvent::Created { path: file, kind: EntryKind::File }]
        );
    }

    #[test]
    fn moved_in_directory_brings_its_contents() {
        let dir = tempfile::tempdir().unwrap();
        let moved = dir.path().join("moved");
        std::fs::create_dir_all(moved.join("sub")).unwrap();
        std::fs::write(moved.join("sub/deep.txt"), "x").unwrap();
        let ev = rename(RenameMode::To, Some(2), &[moved.to_str().unwrap()]);
        let events = EventTranslator::new().translate(0, ev, Instant::now());
        assert_eq!(
            events[0],
            FsEvent::Created { path: moved.clone(), kind: EntryKind::Directory }
        );
        assert!(events.contains(&FsEvent::Created {
            path: moved.join("sub"),
            kind: EntryKind::Directory,
        }));
        assert!(events.contains(&FsEvent::Created {
            path: moved.join("sub/deep.txt"),
            kind: EntryKind::File,
        }));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn halves_from_different_watchers_are_not_paired() {
        let dir = tempfile::tempdir().unwrap();
        let to = dir.path().join("b.txt");
        std::fs::write(&to, "x").unwrap();
        let mut tr = EventTranslator::new();
        let now = Instant::now();
        tr.translate(0, rename(RenameMode::From, Some(5), &["/one/a.txt"]), now);
        assert_eq!(
            tr.translate(1, rename(RenameMode::To, Some(5), &[to.to_str().unwrap()]), now),
            vec![FsEvent::Created { path: to, kind: EntryKind::File }]
        );
        assert_eq!(
            tr.expire(now + RENAME_WINDOW),
            vec![(0, FsEvent::Deleted { path: "/one/a.txt".into(), kind: EntryKind::File })]
        );
    }

    #[test]
    fn lone_rename_side_is_resolved_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("here.txt");
        std::fs::write(&present, "x").unwrap();
        let ev = rename(RenameMode::Any, None, &[present.to_str().unwrap()]);
        assert_eq!(
            translate(ev),
            vec![FsEvent::Created { path: present, kind: EntryKind::File }]
        );
        let gone = dir.path().join("gone.txt");
        let ev = rename(RenameMode::Any, None, &[gone.to_str().unwrap()]);
        assert_eq!(
            translate(ev),
            vec![FsEvent::Deleted { path: gone, kind: EntryKind::File }]
        );
    }

    #[test]
    fn removals_carry_folder_kind() {
        let ev = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path("/w/d".into());
        assert_eq!(
            translate(ev),
            vec![FsEvent::Deleted { path: "/w/d".into(), kind: EntryKind::Directory }]
        );
        let ev = Event::new(EventKind::Remove(RemoveKind::Any)).add_path("/w/f".into());
        assert_eq!(translate(ev)[0].kind(), EntryKind::File);
    }

    #[test]
    fn access_is_ignored() {
        let ev = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path("/w/a".into());
        assert!(translate(ev).is_empty());
    }
}
