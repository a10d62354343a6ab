use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

use super::{send_event, FileWatcher, WatchError, WatchEvent};

/// [`FileWatcher`] backed by the platform watcher from `notify`.
///
/// Watches the directory holding each file rather than the file itself, so
/// saves that replace the file (write to temp, rename over) are still seen.
/// Directories are shared between files and only released when the last file
/// in them is unwatched.
pub struct NotifyWatcher {
    watcher: RecommendedWatcher,
    files: HashSet<PathBuf>,
    /// directory -> number of watched files in it
    directories: HashMap<PathBuf, usize>,
}

impl NotifyWatcher {
    pub fn new(events: UnboundedSender<WatchEvent>) -> Result<Self, WatchError> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for event in translate(event) {
                    if let Err(err) = send_event(&events, event) {
                        log::debug!("{err}; dropping file event");
                    }
                }
            }
            Err(err) => log::error!("file watch error: {err}"),
        })?;

        Ok(Self {
            watcher,
            files: HashSet::new(),
            directories: HashMap::new(),
        })
    }
}

/// Create and modify both mean "look at this file again"; the coordinator
/// checks whether it still exists.
fn translate(event: Event) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            event.paths.into_iter().map(WatchEvent::Changed).collect()
        }
        EventKind::Remove(_) => event.paths.into_iter().map(WatchEvent::Removed).collect(),
        _ => vec![],
    }
}

fn directory_of(path: &Path) -> Result<PathBuf, WatchError> {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| WatchError::PathWatchFailed {
            path: path.to_path_buf(),
            reason: "no parent directory".to_string(),
        })
}

impl FileWatcher for NotifyWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        if self.files.contains(path) {
            return Ok(());
        }

        let dir = directory_of(path)?;
        if !self.directories.contains_key(&dir) {
            self.watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|err| WatchError::PathWatchFailed {
                    path: dir.clone(),
                    reason: err.to_string(),
                })?;
            log::debug!("watching directory {}", dir.display());
        }

        *self.directories.entry(dir).or_insert(0) += 1;
        self.files.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError> {
        if !self.files.remove(path) {
            return Ok(());
        }

        let dir = directory_of(path)?;
        let Some(count) = self.directories.get_mut(&dir) else {
            return Ok(());
        };

        *count -= 1;
        if *count == 0 {
            self.directories.remove(&dir);
            log::debug!("releasing directory {}", dir.display());
            self.watcher
                .unwatch(&dir)
                .map_err(|err| WatchError::PathWatchFailed {
                    path: dir,
                    reason: err.to_string(),
                })?;
        }
        Ok(())
    }
}
