//! The output side of a follow session.

use crate::error::Error;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// One unit of output from a follow session.
#[derive(Debug)]
pub enum Record {
    /// A complete line, delimiter stripped.
    Line(Vec<u8>),
    /// A non-terminal error, or a fatal one when [`Error::is_fatal`] says so.
    Error(Error),
    /// End of stream. Always the last record of a session, emitted once.
    Eof,
}

impl Record {
    pub fn as_line(&self) -> Option<&[u8]> {
        match self {
            Record::Line(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Record::Eof)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Line(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Record::Error(e) => write!(f, "{e}"),
            Record::Eof => f.write_str("EOF"),
        }
    }
}

/// Capacity of the record channel. One slot is the closest tokio gets to a
/// rendezvous: the session waits for the consumer before producing more.
pub(crate) const RECORD_CHANNEL_CAPACITY: usize = 1;

/// Records produced by a [`Follower`](crate::Follower), in file order.
///
/// The stream ends after yielding [`Record::Eof`].
pub struct Records {
    receiver: mpsc::Receiver<Record>,
    finished: bool,
}

impl Records {
    pub(crate) fn new(receiver: mpsc::Receiver<Record>) -> Self {
        Self {
            receiver,
            finished: false,
        }
    }

    /// Receives the next record; `None` after [`Record::Eof`].
    pub async fn recv(&mut self) -> Option<Record> {
        if self.finished {
            return None;
        }
        let record = self.receiver.recv().await;
        self.observe(record)
    }

    fn observe(&mut self, record: Option<Record>) -> Option<Record> {
        match record {
            Some(Record::Eof) | None => self.finished = true,
            Some(_) => {}
        }
        record
    }
}

impl Stream for Records {
    type Item = Record;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(record) => Poll::Ready(self.observe(record)),
            Poll::Pending => Poll::Pending,
        }
    }
}
