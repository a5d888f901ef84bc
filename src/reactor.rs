//! The event loop that drives a follow session.
//!
//! Every iteration waits for exactly one [`Signal`], handles it, and loops
//! until a handler produces an [`Exit`]. Only then is the terminal record
//! emitted, so nothing can follow it.

use crate::config::StartPosition;
use crate::context::{Cancelled, FollowContext};
use crate::error::{Error, Result};
use crate::follower::{Channels, Lifecycle, Shared};
use crate::reader::{is_same_file, read_new_lines};
use crate::reconnect::Backoff;
use crate::stream::Record;
use crate::watcher::{Change, EventSource, classify};
use notify::Event;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

/// One ready event source, as seen by a single multiplexing step.
#[derive(Debug)]
enum Signal {
    Cancelled(Cancelled),
    Stop,
    Reopen,
    RetryDue,
    Fs(Event),
    SourceError(notify::Error),
    SourceClosed,
}

enum Mode {
    Watching,
    Reconnecting {
        backoff: Backoff,
        next_attempt: Instant,
    },
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Stopped,
    Cancelled,
    DeadlineExceeded,
    FileGone,
    SourceClosed,
    ConsumerGone,
}

/// `Err` carries the loop out.
type Flow = std::result::Result<(), Exit>;

pub(crate) struct Reactor<S> {
    shared: Arc<Shared>,
    target: PathBuf,
    source: S,
    records: mpsc::Sender<Record>,
    reopen: mpsc::Receiver<()>,
    mode: Mode,
}

impl<S: EventSource> Reactor<S> {
    pub(crate) fn new(
        shared: Arc<Shared>,
        target: PathBuf,
        source: S,
        channels: Channels,
    ) -> Self {
        Self {
            shared,
            target,
            source,
            records: channels.records,
            reopen: channels.reopen,
            mode: Mode::Watching,
        }
    }

    pub(crate) async fn run(mut self, ctx: FollowContext) -> Result<()> {
        let exit = self.drive(&ctx).await;
        self.finish(exit).await
    }

    async fn drive(&mut self, ctx: &FollowContext) -> Exit {
        if self.shared.config.start_position == StartPosition::Beginning {
            if let Err(exit) = self.read_and_emit().await {
                return exit;
            }
        }

        loop {
            let signal = self.next_signal(ctx).await;
            tracing::trace!(?signal, "signal");
            if let Err(exit) = self.handle(signal).await {
                return exit;
            }
        }
    }

    async fn next_signal(&mut self, ctx: &FollowContext) -> Signal {
        let retry_at = match &self.mode {
            Mode::Reconnecting { next_attempt, .. } => Some(*next_attempt),
            Mode::Watching => None,
        };

        tokio::select! {
            biased;

            cause = ctx.done() => Signal::Cancelled(cause),
            _ = self.shared.stop.cancelled() => Signal::Stop,
            Some(()) = self.reopen.recv() => Signal::Reopen,
            _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                Signal::RetryDue
            }
            event = self.source.next_event() => match event {
                Some(Ok(event)) => Signal::Fs(event),
                Some(Err(e)) => Signal::SourceError(e),
                None => Signal::SourceClosed,
            },
        }
    }

    async fn handle(&mut self, signal: Signal) -> Flow {
        match signal {
            Signal::Cancelled(Cancelled::Requested) => Err(Exit::Cancelled),
            Signal::Cancelled(Cancelled::DeadlineExceeded) => Err(Exit::DeadlineExceeded),
            Signal::Stop => Err(Exit::Stopped),
            Signal::SourceClosed => Err(Exit::SourceClosed),
            Signal::SourceError(e) => self.emit(Record::Error(Error::Watcher(e))).await,
            Signal::Reopen => self.reopen().await,
            Signal::RetryDue => self.retry().await,
            Signal::Fs(event) => match classify(&event, &self.target) {
                Some(change) => self.on_change(change).await,
                None => Ok(()),
            },
        }
    }

    async fn on_change(&mut self, change: Change) -> Flow {
        let reconnecting = matches!(self.mode, Mode::Reconnecting { .. });
        match (reconnecting, change) {
            (false, Change::Modified) => self.read_and_emit().await,
            (false, Change::Removed | Change::Renamed) => self.detach().await,
            (false, Change::Created) => Ok(()),
            (true, Change::Created) => {
                self.attempt_reattach().await;
                Ok(())
            }
            // The write this event reports is not announced again.
            (true, Change::Modified) => {
                if self.attempt_reattach().await {
                    self.read_and_emit().await
                } else {
                    Ok(())
                }
            }
            (true, Change::Removed | Change::Renamed) => Ok(()),
        }
    }

    async fn read_and_emit(&mut self) -> Flow {
        let result = {
            let mut handle = self.shared.handle.lock().await;
            match handle.as_mut() {
                Some(file) => read_new_lines(file, self.shared.config.delimiter).await,
                None => Ok(Vec::new()),
            }
        };

        match result {
            Ok(lines) => self.emit_lines(lines).await,
            Err(e) => self.emit(Record::Error(Error::Io(e))).await,
        }
    }

    /// The path no longer names the open file: drain what is still readable
    /// through the old handle, close it, and start reconnecting.
    async fn detach(&mut self) -> Flow {
        let drained = {
            let mut handle = self.shared.handle.lock().await;
            let drained = match handle.as_mut() {
                Some(file) => {
                    if is_same_file(file, &self.target).await {
                        tracing::trace!("stale removal or rename notification");
                        return Ok(());
                    }
                    read_new_lines(file, self.shared.config.delimiter).await
                }
                None => Ok(Vec::new()),
            };
            *handle = None;
            drained
        };

        tracing::debug!(path = %self.target.display(), "file went away, reconnecting");
        self.enter_reconnecting();

        match drained {
            Ok(lines) => self.emit_lines(lines).await,
            Err(e) => self.emit(Record::Error(Error::Io(e))).await,
        }
    }

    /// Swaps the handle for a fresh one at the same offset. A replacement
    /// shorter than the offset is caught as a truncation on the next read.
    async fn reopen(&mut self) -> Flow {
        if let Mode::Reconnecting { .. } = self.mode {
            self.attempt_reattach().await;
            return Ok(());
        }

        let mut handle = self.shared.handle.lock().await;
        let position = match handle.as_mut() {
            Some(file) => file.stream_position().await,
            None => Ok(0),
        };
        let position = match position {
            Ok(position) => position,
            Err(e) => {
                drop(handle);
                return self.emit(Record::Error(Error::Io(e))).await;
            }
        };

        *handle = None;
        match open_at(&self.target, position).await {
            Ok(file) => {
                *handle = Some(file);
                tracing::debug!(position, "reopened");
            }
            Err(e) => {
                drop(handle);
                tracing::debug!(error = %e, "reopen failed, reconnecting");
                self.enter_reconnecting();
            }
        }
        Ok(())
    }

    async fn retry(&mut self) -> Flow {
        if self.attempt_reattach().await {
            return Ok(());
        }

        let Mode::Reconnecting {
            backoff,
            next_attempt,
        } = &mut self.mode
        else {
            return Ok(());
        };

        let now = Instant::now();
        match backoff.next_delay(now) {
            Some(delay) => {
                tracing::trace!(
                    failures = backoff.failures(),
                    slow = backoff.in_slow_phase(),
                    ?delay,
                    "reattach attempt failed"
                );
                *next_attempt = now + delay;
                Ok(())
            }
            None => Err(Exit::FileGone),
        }
    }

    fn enter_reconnecting(&mut self) {
        self.mode = Mode::Reconnecting {
            backoff: Backoff::new(&self.shared.config),
            next_attempt: Instant::now(),
        };
        self.shared.set_state(Lifecycle::Reconnecting);
    }

    /// Opens the path again at offset zero; a file that reappears is new.
    async fn attempt_reattach(&mut self) -> bool {
        match File::open(&self.target).await {
            Ok(file) => {
                *self.shared.handle.lock().await = Some(file);
                self.mode = Mode::Watching;
                self.shared.set_state(Lifecycle::Watching);
                tracing::debug!(path = %self.target.display(), "reattached");
                true
            }
            Err(e) => {
                tracing::trace!(error = %e, "reattach failed");
                false
            }
        }
    }

    async fn emit_lines(&mut self, lines: Vec<Vec<u8>>) -> Flow {
        for line in lines {
            self.emit(Record::Line(line)).await?;
        }
        Ok(())
    }

    async fn emit(&mut self, record: Record) -> Flow {
        self.records
            .send(record)
            .await
            .map_err(|_| Exit::ConsumerGone)
    }

    /// Closes the handle, emits the closing records and settles the state.
    async fn finish(&mut self, exit: Exit) -> Result<()> {
        self.shared.handle.lock().await.take();
        tracing::debug!(?exit, "follow loop exited");

        let (outcome, state) = match exit {
            Exit::Stopped | Exit::Cancelled => (Ok(()), Lifecycle::Stopped),
            Exit::DeadlineExceeded => (Err(Error::DeadlineExceeded), Lifecycle::Stopped),
            Exit::FileGone => (Err(self.file_gone()), Lifecycle::Failed),
            Exit::SourceClosed => (Err(Error::SourceClosed), Lifecycle::Failed),
            Exit::ConsumerGone => {
                self.shared.set_state(Lifecycle::Stopped);
                return Err(Error::StreamClosed);
            }
        };

        let surfaced = match exit {
            Exit::DeadlineExceeded => Some(Error::DeadlineExceeded),
            Exit::FileGone => Some(self.file_gone()),
            Exit::SourceClosed => Some(Error::SourceClosed),
            _ => None,
        };
        let mut delivered = match surfaced {
            Some(error) => self.emit(Record::Error(error)).await,
            None => Ok(()),
        };
        if delivered.is_ok() {
            delivered = self.emit(Record::Eof).await;
        }

        self.shared.set_state(state);
        match (outcome, delivered) {
            (Ok(()), Err(_)) => Err(Error::StreamClosed),
            (outcome, _) => outcome,
        }
    }

    fn file_gone(&self) -> Error {
        Error::FileGone {
            path: self.target.display().to_string(),
        }
    }
}

async fn open_at(path: &Path, position: u64) -> std::io::Result<File> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(position)).await?;
    Ok(file)
}
