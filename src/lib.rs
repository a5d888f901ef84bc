//! Follow a file for appended lines, across truncation and rotation.
//!
//! A [`Follower`] opens the file, subscribes to its parent directory and
//! emits every complete line appended after the subscription is armed. A
//! truncated file is re-read from the start; a removed or renamed file is
//! drained and then reattached when the path exists again.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_follow::{FollowConfig, FollowContext, Record, follow};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = FollowContext::new();
//!     let (_follower, mut records, task) =
//!         follow(ctx, "app.log", FollowConfig::default()).await?;
//!
//!     while let Some(record) = records.next().await {
//!         match record {
//!             Record::Line(line) => println!("{}", String::from_utf8_lossy(&line)),
//!             Record::Error(e) => eprintln!("Error: {}", e),
//!             Record::Eof => break,
//!         }
//!     }
//!
//!     task.await??;
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod config;
mod context;
mod error;
mod follower;
mod reactor;
mod reader;
mod reconnect;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{FollowConfig, FollowConfigBuilder, RetryBudget, StartPosition};
pub use context::{Cancelled, FollowContext};
pub use error::{Error, Result};
pub use follower::{Follower, Lifecycle};
pub use stream::{Record, Records};

use std::path::Path;
use tokio::task::JoinHandle;

/// Starts following `path` on a background task and waits until the
/// directory subscription is armed.
///
/// Setup failures are returned here. Otherwise the follower, its records,
/// and the task running the session are handed back; the task resolves to
/// the session's outcome once it ends.
///
/// # Example
///
/// ```rust,no_run
/// use log_follow::{FollowConfig, FollowContext, follow};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ctx = FollowContext::new().with_timeout(Duration::from_secs(30));
///     let (follower, mut records, task) =
///         follow(ctx, "app.log", FollowConfig::default()).await?;
///
///     if let Some(record) = records.recv().await {
///         println!("{}", record);
///     }
///
///     let (_, _) = tokio::join!(follower.stop(), records.recv());
///     task.await??;
///     Ok(())
/// }
/// ```
pub async fn follow(
    ctx: FollowContext,
    path: impl AsRef<Path>,
    config: FollowConfig,
) -> Result<(Follower, Records, JoinHandle<Result<()>>)> {
    let (follower, records) = Follower::new(config);
    let path = path.as_ref().to_path_buf();

    let task = {
        let follower = follower.clone();
        tokio::spawn(async move { follower.start(ctx, path).await })
    };

    if follower.ready().await == Lifecycle::Failed {
        task.await??;
        return Err(Error::SourceClosed);
    }

    Ok((follower, records, task))
}
