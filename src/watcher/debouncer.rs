//! Per-path settling of change notifications.
//!
//! Editors often write a file several times in a row when saving (temp file,
//! rename, format-on-save). A path is only handed out once no change for it
//! has arrived for the configured delay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    /// path -> time of the most recent change
    pending: HashMap<PathBuf, Instant>,
    delay: Duration,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            delay,
        }
    }

    /// Notes a change; restarts the delay for `path`.
    pub fn record(&mut self, path: PathBuf) {
        self.pending.insert(path, Instant::now());
    }

    /// Drops a pending change. Returns whether one was pending.
    pub fn cancel(&mut self, path: &Path) -> bool {
        self.pending.remove(path).is_some()
    }

    /// Paths that have been quiet for the whole delay, sorted.
    pub fn take_ready(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|path, last_change| {
            let settled = now.duration_since(*last_change) >= self.delay;
            if settled {
                ready.push(path.clone());
            }
            !settled
        });

        ready.sort();
        ready
    }

    /// Everything still pending, regardless of age. Used when shutting down.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        let mut all: Vec<_> = self.pending.drain().map(|(path, _)| path).collect();
        all.sort();
        all
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
