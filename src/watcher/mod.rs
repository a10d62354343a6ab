//! Keeping the index in step with the filesystem.
//!
//! Discovery results and filesystem notifications are all sent as
//! [`WatchEvent`]s to a single [`WatchService`] task. The service debounces
//! change notifications and hands everything to the [`WatchCoordinator`],
//! which is the only writer of the [`SharedIndex`](crate::index::SharedIndex).
//!
//! ```text
//! discovery ──Scope──┐
//!                    ├─> mpsc ─> WatchService ─> WatchCoordinator ─> index
//! notify ──Changed/──┘            (debouncer)         │
//!          Removed                                    └─> Notice channel
//! ```

mod coordinator;
mod debouncer;
mod error;
mod notify_watcher;
mod service;

use std::path::Path;

pub use coordinator::{read_all, Notice, ReadResult, ReconcileReport, WatchCoordinator, WatchStats};
pub use debouncer::Debouncer;
pub use error::WatchError;
pub use notify_watcher::NotifyWatcher;
pub use service::{send_event, WatchEvent, WatchService};

/// Source of filesystem notifications for individual files.
///
/// Implementations report what they see by sending [`WatchEvent::Changed`]
/// and [`WatchEvent::Removed`] to the service channel.
pub trait FileWatcher: Send {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;
    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError>;
}

/// `None` watches nothing; files are still indexed whenever they enter scope.
impl<W: FileWatcher> FileWatcher for Option<W> {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        match self {
            Some(watcher) => watcher.watch(path),
            None => Ok(()),
        }
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError> {
        match self {
            Some(watcher) => watcher.unwatch(path),
            None => Ok(()),
        }
    }
}
