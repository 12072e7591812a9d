//! Core library for fmirror – one-way, near real time mirroring of local
//! directory trees onto a remote host.

mod config;
mod dispatch;
mod event;
mod filter;
mod mirror;
mod path;
mod remote;
mod startup;
mod task;
pub mod testutils;

pub use config::{expand_path, Config, ConfigError, MappingConfig, Pattern};
pub use dispatch::Dispatcher;
pub use event::{EntryKind, EventTranslator, FsEvent, RENAME_WINDOW};
pub use filter::PathFilter;
pub use mirror::{Mapping, Mirror, MirrorController, Outcome};
pub use path::{as_posix_path, join_remote, remote_parent, resolve_remote};
pub use remote::{shell_quote, CommandOutput, RemoteError, RemoteFs, RemoteOp};
pub use startup::{Plan, StartupError};
pub use task::{spawn_monitor, MonitorHandle, TaskCommand, TaskState};
