//! Directory subscription using the notify crate.
//!
//! The followed file's parent directory is watched rather than the file: a
//! removal or rename of the file itself is not reliably reported by watching
//! the file, and the directory keeps reporting after the file is replaced.

use crate::error::{Error, Result};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Anything the reactor can pull raw notification events from.
pub(crate) trait EventSource: Send {
    /// Next event or subscription error; `None` once the source is closed.
    fn next_event(&mut self) -> impl Future<Output = Option<notify::Result<Event>>> + Send;
}

/// Watches the directory containing the followed file.
pub(crate) struct DirWatcher {
    watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    dir: PathBuf,
}

impl DirWatcher {
    /// Creates a watcher for the directory containing `target`. Nothing is
    /// delivered until [`DirWatcher::start_watching`] arms it.
    pub(crate) fn new(target: &Path) -> Result<Self> {
        let dir = target
            .parent()
            .ok_or_else(|| Error::InvalidPath {
                message: format!("{} has no parent directory", target.display()),
            })?
            .to_path_buf();

        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            receiver: rx,
            dir,
        })
    }

    /// Arms the directory subscription.
    pub(crate) fn start_watching(&mut self) -> Result<()> {
        self.watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %self.dir.display(), "directory subscription armed");
        Ok(())
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl EventSource for DirWatcher {
    async fn next_event(&mut self) -> Option<notify::Result<Event>> {
        self.receiver.recv().await
    }
}

impl EventSource for mpsc::UnboundedReceiver<notify::Result<Event>> {
    async fn next_event(&mut self) -> Option<notify::Result<Event>> {
        self.recv().await
    }
}

/// What a notification means for the followed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    Modified,
    Created,
    Removed,
    /// Renamed away from, or replaced by a rename onto, the followed path.
    Renamed,
}

/// Classifies `event` with respect to `target`; `None` when the event names
/// some other entry or carries nothing the follower acts on.
pub(crate) fn classify(event: &Event, target: &Path) -> Option<Change> {
    if !is_event_relevant_to_file(event, target) {
        return None;
    }

    match event.kind {
        EventKind::Modify(ModifyKind::Name(_)) => Some(Change::Renamed),
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Some(Change::Modified),
        EventKind::Create(_) => Some(Change::Created),
        EventKind::Remove(_) => Some(Change::Removed),
        _ => None,
    }
}

/// Check if a notify event names exactly `target`.
pub(crate) fn is_event_relevant_to_file(event: &Event, target: &Path) -> bool {
    event.paths.iter().any(|path| path == target)
}
