//! Error types for the follow engine.

use thiserror::Error;

/// The main error type for follow operations.
///
/// Errors reach callers two ways: returned from [`Follower::start`] (setup
/// failures and the reason a session ended) or delivered as
/// [`Record::Error`] on the output stream. [`Error::is_fatal`] tells the two
/// kinds of record errors apart.
///
/// [`Follower::start`]: crate::Follower::start
/// [`Record::Error`]: crate::Record::Error
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when opening, reading or seeking the followed file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory subscription errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The path could not be resolved to a file inside an existing directory.
    #[error("Invalid file path: {message}")]
    InvalidPath { message: String },

    /// The file did not exist when the session started.
    #[error("File does not exist: {path}")]
    FileNotFound { path: String },

    /// The file went away and every reconnect attempt failed.
    #[error("File went away and can't be reopened: {path}")]
    FileGone { path: String },

    /// The follow context's deadline elapsed.
    #[error("Follow deadline exceeded")]
    DeadlineExceeded,

    /// The directory notification source stopped delivering events.
    #[error("File watcher closed")]
    SourceClosed,

    /// `start` was called on a follower that already ran a session.
    #[error("Follower already started")]
    AlreadyStarted,

    /// The consumer dropped the record stream.
    #[error("Stream closed")]
    StreamClosed,

    /// The task running the session panicked or was aborted.
    #[error("Follow task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether a record carrying this error means the session has already
    /// ended. Any other record error is followed by more records.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FileGone { .. } | Error::DeadlineExceeded | Error::SourceClosed
        )
    }
}

/// A convenient Result type for follow operations.
pub type Result<T> = std::result::Result<T, Error>;
