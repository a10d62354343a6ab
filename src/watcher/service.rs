use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, MissedTickBehavior};

use crate::bib::BibError;
use crate::discovery::ScopeResult;

use super::{read_all, Debouncer, FileWatcher, ReadResult, WatchCoordinator, WatchError};

/// Everything the watch service reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A fresh discovery result for the active document.
    Scope { scope: ScopeResult, prune: bool },
    Changed(PathBuf),
    Removed(PathBuf),
}

/// Queues `event` for the service.
pub fn send_event(
    events: &UnboundedSender<WatchEvent>,
    event: WatchEvent,
) -> Result<(), WatchError> {
    events.send(event).map_err(|_| WatchError::ChannelClosed)
}

/// Reads `paths` on the blocking pool so the runtime keeps serving requests.
async fn read_off_runtime(paths: Vec<PathBuf>) -> Vec<(PathBuf, ReadResult)> {
    if paths.is_empty() {
        return vec![];
    }

    let requested = paths.clone();
    match tokio::task::spawn_blocking(move || read_all(&paths)).await {
        Ok(parsed) => parsed,
        Err(err) => {
            log::error!("bibliography reader failed: {err}");
            requested
                .into_iter()
                .map(|path| {
                    let source = io::Error::other(err.to_string());
                    (path.clone(), Err(BibError::Read { path, source }))
                })
                .collect()
        }
    }
}

/// Drains the event queue into a [`WatchCoordinator`].
///
/// Changes are held back until the file has been quiet for the debounce
/// delay; removals and scope updates are applied as they arrive. File reads
/// run on the blocking pool, and their results are applied here, so the
/// coordinator stays the only writer.
pub struct WatchService<W: FileWatcher> {
    coordinator: WatchCoordinator<W>,
    events: UnboundedReceiver<WatchEvent>,
    debouncer: Debouncer,
    tick: Duration,
}

impl<W: FileWatcher> WatchService<W> {
    pub fn new(
        coordinator: WatchCoordinator<W>,
        events: UnboundedReceiver<WatchEvent>,
        delay: Duration,
    ) -> Self {
        Self {
            coordinator,
            events,
            debouncer: Debouncer::new(delay),
            tick: (delay / 4).clamp(Duration::from_millis(10), Duration::from_millis(100)),
        }
    }

    /// Runs until every sender is dropped, then applies whatever changes are
    /// still pending and hands the coordinator back.
    pub async fn run(mut self) -> WatchCoordinator<W> {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    let ready = self.debouncer.take_ready();
                    self.reread(ready).await;
                }
            }
        }

        let pending = self.debouncer.drain();
        self.reread(pending).await;
        log::debug!("watch service stopped");

        self.coordinator
    }

    async fn handle(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Scope { scope, prune } => {
                let report = self.coordinator.stage(&scope, prune);
                for path in &report.removed {
                    self.debouncer.cancel(path);
                }
                let parsed = read_off_runtime(report.added.clone()).await;
                self.coordinator.admit(&report, parsed);
            }
            WatchEvent::Changed(path) => {
                if self.coordinator.is_watched(&path) {
                    self.debouncer.record(path);
                }
            }
            WatchEvent::Removed(path) => {
                self.debouncer.cancel(&path);
                self.coordinator.on_removed(&path);
            }
        }
    }

    async fn reread(&mut self, paths: Vec<PathBuf>) {
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| self.coordinator.is_watched(path))
            .collect();

        for (path, result) in read_off_runtime(paths).await {
            self.coordinator.apply_change(&path, result);
        }
    }
}
