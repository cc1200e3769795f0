use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tweetsync::api::TweetDraft;
use tweetsync::config::Config;
use tweetsync::proxy::ResponseSource;
use tweetsync::sync::{Connectivity, TriggerOutcome};
use tweetsync::OfflineClient;

#[derive(Parser, Debug)]
#[command(name = "tweetsync")]
#[command(about = "Offline-tolerant tweet client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tweetsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Start with the connectivity signal set to offline
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show the tweet feed
  Feed,
  /// Post a tweet, queueing it if the service is unreachable
  Post {
    content: String,
    /// Image to attach
    #[arg(long)]
    image: Option<PathBuf>,
  },
  /// List writes waiting to be synced
  Pending,
  /// Drop a pending write
  Discard { id: String },
  /// Submit pending writes now
  Sync,
  /// Fetch and store the static assets
  Precache,
  /// Probe connectivity and sync on reconnect until interrupted
  Watch,
}

/// Initialize logging to stderr and a daily rolling file.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(config: &Config) -> Result<WorkerGuard> {
  let log_dir = config.log_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;
  let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "tweetsync.log"));

  // RUST_LOG controls the level (e.g., RUST_LOG=tweetsync=debug)
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr))
    .with(fmt::layer().with_ansi(false).with_writer(file_writer))
    .with(filter)
    .init();

  Ok(guard)
}

fn read_draft(content: String, image: Option<&Path>) -> Result<TweetDraft> {
  let Some(path) = image else {
    return Ok(TweetDraft::text(content));
  };

  let bytes = std::fs::read(path).map_err(|e| eyre!("Failed to read image {}: {}", path.display(), e))?;
  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .ok_or_else(|| eyre!("Image path has no file name: {}", path.display()))?;
  let mime_type = match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
    Some("png") => "image/png",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    _ => "image/jpeg",
  };

  Ok(TweetDraft::with_image(content, file_name, mime_type, bytes))
}

fn describe(source: &ResponseSource) -> &'static str {
  match source {
    ResponseSource::Network => "live",
    ResponseSource::StaticCache => "static cache",
    ResponseSource::OfflineCache => "offline cache",
    ResponseSource::Queued { .. } => "queued",
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _guard = init_tracing(&config)?;

  let client = OfflineClient::new(&config)?;
  if args.offline {
    client.signal().set(Connectivity::Offline);
  }

  match args.command {
    Command::Feed => {
      let (tweets, source) = client.feed().await?;
      println!("{} tweets ({})", tweets.len(), describe(&source));
      for tweet in tweets {
        let when = tweet
          .created_at
          .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
          .unwrap_or_default();
        println!("#{} [{}] @{} {}", tweet.display_id(), when, tweet.username(), tweet.content);
      }
    }
    Command::Post { content, image } => {
      let draft = read_draft(content, image.as_deref())?;
      let result = client.post(draft).await?;
      match result.source {
        ResponseSource::Queued { pending_id } => println!("Offline: queued as {}", pending_id),
        source => println!("Posted (status {}, {})", result.response.status, describe(&source)),
      }
    }
    Command::Pending => {
      let pending = client.pending()?;
      if pending.is_empty() {
        println!("No pending writes");
      }
      for (entity, attempt) in pending {
        print!("{}  {}  {}", entity.id, entity.created_at.format("%Y-%m-%d %H:%M"), entity.payload.content);
        match attempt {
          Some(a) => println!("  ({} failed attempts, last: {})", a.attempts, a.last_error),
          None => println!(),
        }
      }
    }
    Command::Discard { id } => {
      client.discard(&id)?;
      println!("Discarded {}", id);
    }
    Command::Sync => match client.sync().await? {
      TriggerOutcome::Drained(report) => println!(
        "Submitted {}, rejected {}, failed {}, unremoved {}, deferred {}",
        report.submitted.len(),
        report.rejected.len(),
        report.failed.len(),
        report.unremoved.len(),
        report.deferred
      ),
      TriggerOutcome::AlreadyDraining => println!("A sync is already running"),
    },
    Command::Precache => {
      let report = client.precache().await;
      println!("Cached {} assets", report.stored);
      for url in report.failed {
        println!("  failed: {}", url);
      }
    }
    Command::Watch => {
      let tasks = client.watch();
      println!("Watching connectivity, Ctrl-C to stop");
      tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
      for task in tasks {
        task.abort();
      }
    }
  }

  Ok(())
}
