use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use rayon::prelude::*;
use tokio::sync::mpsc::UnboundedSender;

use crate::bib::{self, BibError, ParsedSource};
use crate::discovery::ScopeResult;
use crate::index::SharedIndex;

use super::FileWatcher;

/// Outcome of reading one bibliography file.
pub type ReadResult = Result<ParsedSource, BibError>;

/// Reads and parses `paths` on the rayon pool. Blocks until all are done.
pub fn read_all(paths: &[PathBuf]) -> Vec<(PathBuf, ReadResult)> {
    paths
        .par_iter()
        .map(|path| (path.clone(), bib::read_source(path)))
        .collect()
}

/// User-facing messages produced while maintaining the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    DuplicateKeys(Vec<String>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchStats {
    /// Files read and parsed successfully.
    pub parses: usize,
    /// Files dropped from the index.
    pub evictions: usize,
}

/// What a call to [`WatchCoordinator::reconcile`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Owns the set of watched files and applies every change to the index.
///
/// Every watched path has an entry in the index (possibly with no records),
/// and a path leaves the index in the same step it leaves the watch set.
pub struct WatchCoordinator<W: FileWatcher> {
    index: SharedIndex,
    watcher: W,
    watched: IndexSet<PathBuf>,
    stats: WatchStats,
    notices: Option<UnboundedSender<Notice>>,
}

impl<W: FileWatcher> WatchCoordinator<W> {
    pub fn new(index: SharedIndex, watcher: W) -> Self {
        Self {
            index,
            watcher,
            watched: IndexSet::new(),
            stats: WatchStats::default(),
            notices: None,
        }
    }

    pub fn with_notices(mut self, notices: UnboundedSender<Notice>) -> Self {
        self.notices = Some(notices);
        self
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn watcher(&self) -> &W {
        &self.watcher
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    pub fn stats(&self) -> WatchStats {
        self.stats
    }

    /// Brings the watch set in line with `scope`.
    ///
    /// New paths are watched and parsed right away. With `prune`, paths no
    /// longer in scope are unwatched and evicted. Paths in both are left alone.
    pub fn reconcile(&mut self, scope: &ScopeResult, prune: bool) -> ReconcileReport {
        let report = self.stage(scope, prune);
        let parsed = read_all(&report.added);
        self.admit(&report, parsed);
        report
    }

    /// First half of [`reconcile`](Self::reconcile): evicts what left `scope`
    /// and reports which paths still have to be read and admitted.
    pub fn stage(&mut self, scope: &ScopeResult, prune: bool) -> ReconcileReport {
        let added: Vec<PathBuf> = scope
            .iter()
            .filter(|path| !self.watched.contains(*path))
            .cloned()
            .collect();

        let removed: Vec<PathBuf> = if prune {
            self.watched
                .iter()
                .filter(|path| !scope.contains(*path))
                .cloned()
                .collect()
        } else {
            vec![]
        };

        for path in &removed {
            log::info!("forgetting bibliography {}", path.display());
            self.forget(path);
        }

        ReconcileReport { added, removed }
    }

    /// Second half of [`reconcile`](Self::reconcile): watches and indexes the
    /// staged paths from their read results.
    pub fn admit(&mut self, report: &ReconcileReport, parsed: Vec<(PathBuf, ReadResult)>) {
        for (path, result) in parsed {
            log::info!("watching bibliography {}", path.display());
            if let Err(err) = self.watcher.watch(&path) {
                log::warn!("{err}; changes to it will not be picked up");
            }
            self.watched.insert(path.clone());

            let records = match result {
                Ok(source) => self.accept(&path, source),
                Err(err) => {
                    log::warn!("{err}");
                    vec![]
                }
            };
            self.index.write().set_records(&path, records);
        }

        if !report.is_empty() {
            self.announce_duplicates();
        }
    }

    /// Re-reads a watched file. Returns whether the index changed.
    ///
    /// A file that no longer exists is treated as removed. Any other read
    /// failure keeps the records from the last good parse.
    pub fn on_changed(&mut self, path: &Path) -> bool {
        if !self.watched.contains(path) {
            log::debug!("ignoring change to unwatched {}", path.display());
            return false;
        }
        self.apply_change(path, bib::read_source(path))
    }

    /// Applies a re-read of `path` done elsewhere.
    pub fn apply_change(&mut self, path: &Path, result: ReadResult) -> bool {
        if !self.watched.contains(path) {
            return false;
        }

        match result {
            Ok(source) => {
                log::info!("re-reading bibliography {}", path.display());
                let records = self.accept(path, source);
                self.index.write().set_records(path, records);
                self.announce_duplicates();
                true
            }
            Err(err) if err.is_not_found() => self.on_removed(path),
            Err(err) => {
                log::warn!("{err}; keeping previous records");
                false
            }
        }
    }

    /// Drops a watched file that disappeared. Returns whether the index changed.
    pub fn on_removed(&mut self, path: &Path) -> bool {
        if !self.watched.contains(path) {
            return false;
        }

        log::info!("bibliography {} was removed", path.display());
        self.forget(path);
        self.announce_duplicates();
        true
    }

    fn accept(&mut self, path: &Path, source: ParsedSource) -> Vec<bib::CitationRecord> {
        self.stats.parses += 1;
        for warning in &source.warnings {
            log::warn!("{warning}");
        }
        log::debug!("{} records in {}", source.records.len(), path.display());
        source.records
    }

    fn forget(&mut self, path: &Path) {
        if let Err(err) = self.watcher.unwatch(path) {
            log::warn!("{err}");
        }
        self.watched.shift_remove(path);
        if self.index.write().evict(path) {
            self.stats.evictions += 1;
        }
    }

    fn announce_duplicates(&self) {
        let Some(notices) = &self.notices else {
            return;
        };

        let duplicates = self.index.read().duplicate_keys();
        if !duplicates.is_empty() && notices.send(Notice::DuplicateKeys(duplicates)).is_err() {
            log::debug!("nobody is listening for notices");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BibliographyIndex;
    use crate::test_utils::{create_test_workspace_dir, write_file, SAMPLE_BIB};
    use crate::watcher::WatchError;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Recorder {
        watching: Vec<PathBuf>,
    }

    impl FileWatcher for Recorder {
        fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
            self.watching.push(path.to_path_buf());
            Ok(())
        }

        fn unwatch(&mut self, path: &Path) -> Result<(), WatchError> {
            self.watching.retain(|watched| watched != path);
            Ok(())
        }
    }

    fn scope(paths: &[&PathBuf]) -> ScopeResult {
        paths.iter().map(|path| (*path).clone()).collect()
    }

    #[test]
    fn test_reconcile_adds_and_prunes() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", SAMPLE_BIB);
        let other = write_file(&workspace, "other.bib", "@misc{x, title={X}}");

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());

        let report = coordinator.reconcile(&scope(&[&refs, &other]), true);
        assert_eq!(report.added, vec![refs.clone(), other.clone()]);
        assert_eq!(coordinator.index().read().record_count(), 4);
        assert_eq!(coordinator.watcher().watching, vec![refs.clone(), other.clone()]);

        let report = coordinator.reconcile(&scope(&[&refs]), true);
        assert_eq!(report.removed, vec![other.clone()]);
        assert!(coordinator.index().read().find_by_key("x").is_none());
        assert!(!coordinator.is_watched(&other));
        assert_eq!(coordinator.watcher().watching, vec![refs]);
        assert_eq!(coordinator.stats(), WatchStats { parses: 2, evictions: 1 });
    }

    #[test]
    fn test_reconcile_without_prune_keeps_stale_files() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", SAMPLE_BIB);

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());
        coordinator.reconcile(&scope(&[&refs]), false);
        let report = coordinator.reconcile(&ScopeResult::new(), false);

        assert!(report.is_empty());
        assert!(coordinator.is_watched(&refs));
        assert!(coordinator.index().read().find_by_key("doe2020").is_some());
    }

    #[test]
    fn test_unreadable_new_file_gets_empty_entry() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let ghost = workspace.join("ghost.bib");

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());
        coordinator.reconcile(&scope(&[&ghost]), true);

        assert!(coordinator.is_watched(&ghost));
        assert_eq!(coordinator.index().read().records(&ghost).map(<[_]>::len), Some(0));
        assert_eq!(coordinator.stats().parses, 0);
    }

    #[test]
    fn test_change_replaces_records() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", SAMPLE_BIB);

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());
        coordinator.reconcile(&scope(&[&refs]), true);

        std::fs::write(&refs, "@misc{fresh, title={Fresh}}").unwrap();
        assert!(coordinator.on_changed(&refs));

        let index = coordinator.index().read();
        assert_eq!(index.record_count(), 1);
        assert!(index.find_by_key("fresh").is_some());
        assert!(index.find_by_key("doe2020").is_none());
    }

    #[test]
    fn test_change_to_missing_file_evicts() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", SAMPLE_BIB);

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());
        coordinator.reconcile(&scope(&[&refs]), true);

        std::fs::remove_file(&refs).unwrap();
        assert!(coordinator.on_changed(&refs));
        assert!(!coordinator.is_watched(&refs));
        assert!(coordinator.index().read().is_empty());
    }

    #[test]
    fn test_read_failure_keeps_previous_records() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", SAMPLE_BIB);

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());
        coordinator.reconcile(&scope(&[&refs]), true);

        // Invalid UTF-8 makes the read fail while the file still exists.
        std::fs::write(&refs, [0xff, 0xfe, 0xfd]).unwrap();
        assert!(!coordinator.on_changed(&refs));
        assert_eq!(coordinator.index().read().record_count(), 3);
    }

    #[test]
    fn test_stage_then_admit_matches_reconcile() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", SAMPLE_BIB);

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());
        let report = coordinator.stage(&scope(&[&refs]), true);

        assert_eq!(report.added, vec![refs.clone()]);
        assert!(!coordinator.is_watched(&refs));
        assert!(coordinator.index().read().is_empty());

        coordinator.admit(&report, read_all(&report.added));
        assert!(coordinator.is_watched(&refs));
        assert_eq!(coordinator.index().read().record_count(), 3);
        assert_eq!(coordinator.stats().parses, 1);
    }

    #[test]
    fn test_apply_change_from_outside_read() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let refs = write_file(&workspace, "refs.bib", SAMPLE_BIB);

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());
        coordinator.reconcile(&scope(&[&refs]), true);

        std::fs::remove_file(&refs).unwrap();
        let result = bib::read_source(&refs);
        assert!(coordinator.apply_change(&refs, result));
        assert!(!coordinator.is_watched(&refs));
        assert!(coordinator.index().read().is_empty());
    }

    #[test]
    fn test_events_for_unknown_paths_are_ignored() {
        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default());
        let stranger = PathBuf::from("/nowhere/stranger.bib");

        assert!(!coordinator.on_changed(&stranger));
        assert!(!coordinator.on_removed(&stranger));
        assert_eq!(coordinator.stats(), WatchStats::default());
    }

    #[test]
    fn test_duplicate_keys_are_announced() {
        let (_temp_dir, workspace) = create_test_workspace_dir();
        let one = write_file(&workspace, "one.bib", "@misc{a}\n@misc{b}");
        let two = write_file(&workspace, "two.bib", "@misc{a}");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut coordinator = WatchCoordinator::new(BibliographyIndex::shared(), Recorder::default())
            .with_notices(tx);
        coordinator.reconcile(&scope(&[&one]), true);
        assert!(rx.try_recv().is_err());

        coordinator.reconcile(&scope(&[&one, &two]), true);
        assert_eq!(
            rx.try_recv().unwrap(),
            Notice::DuplicateKeys(vec!["a".to_string()])
        );
        assert!(rx.try_recv().is_err());
    }
}
