//! `log-follow`: print lines appended to a file, across truncation and
//! rotation.
//!
//! ```bash
//! log-follow /var/log/app.log
//! log-follow --from-start --retry-ms 30000 /var/log/app.log
//! ```

use anyhow::Context;
use clap::Parser;
use log_follow::{FollowConfig, FollowContext, Follower, Record, RetryBudget, StartPosition, follow};
use std::path::PathBuf;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_stream::StreamExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Follow a file and print each appended line.
#[derive(Parser)]
#[command(name = "log-follow", version, about, long_about = None)]
struct Cli {
    /// File to follow.
    file: PathBuf,

    /// How long to keep trying to reattach after the file goes away, in
    /// milliseconds. `0` gives up after the fast retries; negative never
    /// gives up.
    #[arg(long, env = "LOG_FOLLOW_RETRY_MS", default_value_t = -1, allow_negative_numbers = true)]
    retry_ms: i64,

    /// Print the existing content before following.
    #[arg(long)]
    from_start: bool,

    /// Lines are terminated by NUL instead of newline.
    #[arg(short = 'z', long)]
    zero_terminated: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn delimiter(&self) -> u8 {
        if self.zero_terminated { b'\0' } else { b'\n' }
    }

    fn config(&self) -> FollowConfig {
        let start_position = if self.from_start {
            StartPosition::Beginning
        } else {
            StartPosition::End
        };

        FollowConfig::builder()
            .delimiter(self.delimiter())
            .start_position(start_position)
            .retry_budget(RetryBudget::from_millis(self.retry_ms))
            .build()
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "warn" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Ctrl-C cancels the session; SIGHUP asks it to reopen the file.
fn spawn_signal_handlers(ctx: FollowContext, follower: Follower) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            ctx.cancel();
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGHUP");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            tracing::debug!("SIGHUP received, reopening");
            follower.reopen();
        }
    });

    #[cfg(not(unix))]
    drop(follower);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = FollowContext::new();
    let (follower, mut records, task) = follow(ctx.clone(), &cli.file, cli.config())
        .await
        .with_context(|| format!("cannot follow {}", cli.file.display()))?;
    spawn_signal_handlers(ctx, follower);

    let delimiter = cli.delimiter();
    let mut out = BufWriter::new(tokio::io::stdout());
    while let Some(record) = records.next().await {
        match record {
            Record::Line(line) => {
                out.write_all(&line).await?;
                out.write_all(&[delimiter]).await?;
                out.flush().await?;
            }
            // Surfaced again by the task below.
            Record::Error(e) if e.is_fatal() => {}
            Record::Error(e) => tracing::warn!("{e}"),
            Record::Eof => break,
        }
    }

    task.await?
        .with_context(|| format!("stopped following {}", cli.file.display()))
}
