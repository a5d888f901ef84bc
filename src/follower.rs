//! Follow session lifecycle and the control surface callers hold.

use crate::config::{FollowConfig, StartPosition};
use crate::context::FollowContext;
use crate::error::{Error, Result};
use crate::reactor::Reactor;
use crate::stream::{RECORD_CHANNEL_CAPACITY, Record, Records};
use crate::watcher::{DirWatcher, EventSource};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Where a follow session is in its life.
///
/// Sessions move `Initializing → Watching`, back and forth between
/// `Watching` and `Reconnecting`, and from anywhere into `Stopped` or
/// `Failed`, which are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not started, or still opening the file and arming the subscription.
    Initializing,
    /// Following an open file.
    Watching,
    /// The file went away; trying to reattach.
    Reconnecting,
    /// Ended by stop, cancellation, or the consumer going away.
    Stopped,
    /// Ended by a setup failure or a fatal error.
    Failed,
}

impl Lifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Stopped | Lifecycle::Failed)
    }

    pub(crate) fn can_transition_to(self, next: Lifecycle) -> bool {
        match (self, next) {
            (Lifecycle::Stopped | Lifecycle::Failed, _) => false,
            (_, Lifecycle::Stopped | Lifecycle::Failed) => true,
            (Lifecycle::Initializing, Lifecycle::Watching) => true,
            (Lifecycle::Watching, Lifecycle::Reconnecting) => true,
            (Lifecycle::Reconnecting, Lifecycle::Watching) => true,
            _ => false,
        }
    }
}

/// State shared between the control surface and the running session.
pub(crate) struct Shared {
    pub(crate) config: FollowConfig,
    pub(crate) stop: CancellationToken,
    /// The one open handle. The reactor holds the lock for every read, close
    /// and reopen; callers only lock it to inspect the cursor.
    pub(crate) handle: Mutex<Option<File>>,
    state: watch::Sender<Lifecycle>,
    reopen_tx: mpsc::Sender<()>,
    pending: std::sync::Mutex<Option<Channels>>,
    started: AtomicBool,
}

/// The session's ends of the record and reopen channels, handed over once.
pub(crate) struct Channels {
    pub(crate) records: mpsc::Sender<Record>,
    pub(crate) reopen: mpsc::Receiver<()>,
}

impl Shared {
    pub(crate) fn set_state(&self, next: Lifecycle) {
        self.state.send_if_modified(|current| {
            if *current == next || !current.can_transition_to(next) {
                return false;
            }
            tracing::debug!(from = ?current, to = ?next, "lifecycle transition");
            *current = next;
            true
        });
    }

    fn take_channels(&self) -> Option<Channels> {
        let channels = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if channels.is_some() {
            self.started.store(true, Ordering::SeqCst);
        }
        channels
    }
}

/// Follows one file for appended lines.
///
/// Cloning is cheap; every clone controls the same session, so one task can
/// run [`Follower::start`] while others call [`Follower::stop`] or
/// [`Follower::reopen`]. A follower runs at most one session.
#[derive(Clone)]
pub struct Follower {
    shared: Arc<Shared>,
}

impl Follower {
    /// Creates a follower and the stream its records arrive on.
    pub fn new(config: FollowConfig) -> (Self, Records) {
        let (records_tx, records_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (reopen_tx, reopen_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(Lifecycle::Initializing);

        let channels = Channels {
            records: records_tx,
            reopen: reopen_rx,
        };
        let shared = Shared {
            config,
            stop: CancellationToken::new(),
            handle: Mutex::new(None),
            state,
            reopen_tx,
            pending: std::sync::Mutex::new(Some(channels)),
            started: AtomicBool::new(false),
        };

        (
            Self {
                shared: Arc::new(shared),
            },
            Records::new(records_rx),
        )
    }

    /// Follows `path` until stopped, cancelled, or a fatal error.
    ///
    /// Returns `Ok` after [`Follower::stop`] or ordinary cancellation of
    /// `ctx`, and the fatal error otherwise. Setup failures (missing file,
    /// unusable path, subscription errors) are returned without producing
    /// any record; the record stream then ends without [`Record::Eof`].
    pub async fn start(&self, ctx: FollowContext, path: impl AsRef<Path>) -> Result<()> {
        self.start_with_source(ctx, path.as_ref(), |target| {
            let mut watcher = DirWatcher::new(target)?;
            watcher.start_watching()?;
            Ok(watcher)
        })
        .await
    }

    pub(crate) async fn start_with_source<S, F>(
        &self,
        ctx: FollowContext,
        path: &Path,
        subscribe: F,
    ) -> Result<()>
    where
        S: EventSource,
        F: FnOnce(&Path) -> Result<S>,
    {
        let channels = self.shared.take_channels().ok_or(Error::AlreadyStarted)?;

        let setup = async {
            let target = resolve_target(path)?;
            let file = open_initial(&target, self.shared.config.start_position).await?;
            let source = subscribe(&target)?;
            Ok::<_, Error>((target, file, source))
        };

        let (target, file, source) = match setup.await {
            Ok(parts) => parts,
            Err(e) => {
                self.shared.set_state(Lifecycle::Failed);
                return Err(e);
            }
        };

        tracing::debug!(path = %target.display(), "following");
        *self.shared.handle.lock().await = Some(file);
        self.shared.set_state(Lifecycle::Watching);

        Reactor::new(Arc::clone(&self.shared), target, source, channels)
            .run(ctx)
            .await
    }

    /// Stops the session and waits until it has emitted [`Record::Eof`].
    ///
    /// Calling it again, or after the session ended, returns at once. Called
    /// before [`Follower::start`], the request is remembered and returns at
    /// once; the later session ends right after it is armed. A stop that
    /// races a concurrent `start` which has not yet claimed the session
    /// counts as one issued before it.
    pub async fn stop(&self) {
        self.shared.stop.cancel();
        if !self.shared.started.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(Lifecycle::is_terminal).await;
    }

    /// Asks the session to reopen the file at its current offset, e.g. after
    /// an external rotation signal. Requests made while one is pending are
    /// merged.
    pub fn reopen(&self) {
        let _ = self.shared.reopen_tx.try_send(());
    }

    /// Waits until the directory subscription is armed, or the session ended
    /// during setup. Returns the state observed.
    pub async fn ready(&self) -> Lifecycle {
        let mut state = self.shared.state.subscribe();
        match state.wait_for(|s| *s != Lifecycle::Initializing).await {
            Ok(s) => *s,
            Err(_) => Lifecycle::Failed,
        }
    }

    pub fn state(&self) -> Lifecycle {
        *self.shared.state.borrow()
    }

    /// Byte offset of the read cursor, if a file is currently open.
    pub async fn position(&self) -> Option<u64> {
        let mut handle = self.shared.handle.lock().await;
        match handle.as_mut() {
            Some(file) => file.stream_position().await.ok(),
            None => None,
        }
    }
}

/// Makes `path` absolute with a canonical parent directory, so it compares
/// equal to the paths notifications carry.
fn resolve_target(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let name = absolute.file_name().ok_or_else(|| Error::InvalidPath {
        message: format!("{} does not name a file", path.display()),
    })?;
    let parent = absolute.parent().ok_or_else(|| Error::InvalidPath {
        message: format!("{} has no parent directory", path.display()),
    })?;
    let dir = parent.canonicalize().map_err(|e| Error::InvalidPath {
        message: format!("{}: {e}", parent.display()),
    })?;
    Ok(dir.join(name))
}

async fn open_initial(target: &Path, start: StartPosition) -> Result<File> {
    let mut file = File::open(target).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::FileNotFound {
            path: target.display().to_string(),
        },
        _ => Error::Io(e),
    })?;
    if start == StartPosition::End {
        file.seek(SeekFrom::End(0)).await?;
    }
    Ok(file)
}
