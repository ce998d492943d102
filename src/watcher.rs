// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher for viewer directories
//!
//! Collections change as renders land on disk. The watcher reports those
//! changes in batches so a burst of writes causes one re-alignment.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::loader::should_process;
use crate::Result;

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file was added, rewritten or removed
    Changed(PathBuf),
    /// Watcher error
    Error(String),
}

enum Received {
    Event(WatchEvent),
    /// An event arrived but nothing in it concerns a collection
    Ignored,
    Timeout,
    Disconnected,
}

/// Watches every viewer directory recursively
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched_paths: Vec<PathBuf>,
    event_rx: Receiver<notify::Result<Event>>,
}

impl FileWatcher {
    /// Create a new file watcher
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default()
            .with_poll_interval(Duration::from_secs(2));

        let watcher = RecommendedWatcher::new(tx, config)?;

        Ok(Self {
            watcher,
            watched_paths: Vec::new(),
            event_rx: rx,
        })
    }

    /// Add a viewer directory
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        self.watcher.watch(path, RecursiveMode::Recursive)?;
        self.watched_paths.push(path.to_path_buf());
        info!("Watching: {:?}", path);
        Ok(())
    }

    /// Stop watching a directory
    pub fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.watcher.unwatch(path)?;
        self.watched_paths.retain(|p| p != path);
        info!("Stopped watching: {:?}", path);
        Ok(())
    }

    /// Get the next event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<WatchEvent> {
        match self.receive(timeout) {
            Received::Event(event) => Some(event),
            Received::Disconnected => Some(WatchEvent::Error("Watcher disconnected".to_string())),
            Received::Ignored | Received::Timeout => None,
        }
    }

    fn receive(&self, timeout: Duration) -> Received {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => Self::convert_event(event).map_or(Received::Ignored, Received::Event),
            Ok(Err(e)) => Received::Event(WatchEvent::Error(e.to_string())),
            Err(RecvTimeoutError::Timeout) => Received::Timeout,
            Err(RecvTimeoutError::Disconnected) => Received::Disconnected,
        }
    }

    /// Wait up to `timeout` for a change, then keep collecting until the
    /// directories stay quiet for `debounce`. Returns the changed paths.
    ///
    /// Events that are filtered out neither start nor end a batch.
    pub fn next_batch(&self, timeout: Duration, debounce: Duration) -> BTreeSet<PathBuf> {
        let mut changed = BTreeSet::new();

        let started = Instant::now();
        loop {
            match self.receive(timeout.saturating_sub(started.elapsed())) {
                Received::Event(WatchEvent::Changed(path)) => {
                    changed.insert(path);
                    break;
                }
                Received::Event(WatchEvent::Error(e)) => {
                    warn!("Watch error: {}", e);
                    return changed;
                }
                Received::Ignored => continue,
                Received::Timeout => return changed,
                Received::Disconnected => {
                    warn!("Watcher disconnected");
                    return changed;
                }
            }
        }

        let mut quiet_since = Instant::now();
        while quiet_since.elapsed() < debounce {
            match self.receive(debounce.saturating_sub(quiet_since.elapsed())) {
                Received::Event(WatchEvent::Changed(path)) => {
                    changed.insert(path);
                    quiet_since = Instant::now();
                }
                Received::Event(WatchEvent::Error(e)) => warn!("Watch error: {}", e),
                Received::Ignored => continue,
                Received::Timeout | Received::Disconnected => break,
            }
        }

        debug!("Collected {} changed paths", changed.len());
        changed
    }

    /// Convert notify event to our event type
    fn convert_event(event: Event) -> Option<WatchEvent> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => event
                .paths
                .into_iter()
                .find(|p| should_process(p))
                .map(WatchEvent::Changed),
            _ => None,
        }
    }

    /// Get currently watched paths
    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched_paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};

    #[test]
    fn test_convert_event_filters_system_files() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/r/.DS_Store"))
            .add_path(PathBuf::from("/r/chair.png"));
        assert_eq!(
            FileWatcher::convert_event(event),
            Some(WatchEvent::Changed(PathBuf::from("/r/chair.png")))
        );

        let ignored = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/r/x.part"));
        assert_eq!(FileWatcher::convert_event(ignored), None);

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/r/chair.png"));
        assert_eq!(FileWatcher::convert_event(access), None);
    }

    #[test]
    fn test_filtered_events_do_not_split_batch() {
        let (tx, rx) = channel();
        let mut watcher = FileWatcher::new().unwrap();
        watcher.event_rx = rx;

        let create = |path: &str| -> notify::Result<Event> {
            Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from(path)))
        };
        tx.send(Ok(Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/r/a.png"))))
            .unwrap();
        tx.send(create("/r/a.png")).unwrap();
        tx.send(create("/r/Thumbs.db")).unwrap();
        tx.send(create("/r/b.png")).unwrap();

        let batch = watcher.next_batch(Duration::from_secs(2), Duration::from_millis(200));
        let expected: BTreeSet<PathBuf> =
            [PathBuf::from("/r/a.png"), PathBuf::from("/r/b.png")].into_iter().collect();
        assert_eq!(batch, expected);

        assert!(watcher.next_batch(Duration::from_millis(50), Duration::from_millis(50)).is_empty());
        drop(tx);
    }

    #[test]
    fn test_watch_tracks_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let mut watcher = FileWatcher::new().unwrap();
        watcher.watch(tmp.path()).unwrap();
        assert_eq!(watcher.watched_paths(), &[tmp.path().to_path_buf()]);
        watcher.unwatch(tmp.path()).unwrap();
        assert!(watcher.watched_paths().is_empty());
    }
}
