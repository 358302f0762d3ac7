mod app;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use forumq::config::Config;
use forumq::logging;

#[derive(Parser, Debug)]
#[command(name = "forumq")]
#[command(about = "Offline-first reader for a discussion forum")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/forumq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Don't restore or save the persisted cache
  #[arg(long)]
  no_persist: bool,

  /// Log at debug level
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List topics of a node
  Topics {
    node: String,
    /// Pages to load
    #[arg(short, long, default_value_t = 1)]
    pages: u32,
  },
  /// Show a topic and its replies
  Topic {
    id: u64,
    #[arg(short, long, default_value_t = 1)]
    pages: u32,
  },
  /// Full-text search
  Search {
    query: String,
    #[arg(short, long, default_value_t = 1)]
    pages: u32,
  },
  /// Favorite or unfavorite a topic
  Like { id: u64 },
  /// Thank a topic's author
  Thank { id: u64 },
  /// Inspect or clear the persisted cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
  /// Show what is cached
  Stats,
  /// Remove everything
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if args.no_persist {
    config.persist.enabled = false;
  }

  let _log_guard = logging::init(&config.log, args.verbose)?;

  // Initialize and run the app
  let app = app::App::new(config)?;
  app.run(args.command).await?;

  Ok(())
}
