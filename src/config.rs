use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::forum::types::SearchArgs;
use crate::query::{
  MutationDefaults, NetworkMode, QueryClientConfig, QueryDefaults, RetryPolicy,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub forum: ForumConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub persist: PersistConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
  pub url: String,
  /// Full-text search service
  pub search_url: String,
  pub timeout_secs: u64,
  /// Hits per search page
  pub search_page_size: u32,
  /// Sort, order and filters sent with every search
  pub search: SearchArgs,
}

impl Default for ForumConfig {
  fn default() -> Self {
    Self {
      url: "https://www.v2ex.com".to_string(),
      search_url: "https://www.sov2ex.com".to_string(),
      timeout_secs: 15,
      search_page_size: 10,
      search: SearchArgs::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Idle time before an unobserved entry is dropped (default: 24 hours)
  pub gc_time_secs: u64,
  pub stale_time_secs: u64,
  /// Retries after a failed fetch
  pub retry: u32,
  pub retry_delay_ms: u64,
  pub refetch_on_window_focus: bool,
  pub refetch_on_reconnect: bool,
  pub network_mode: NetworkMode,
  pub mutation_network_mode: NetworkMode,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      gc_time_secs: 60 * 60 * 24,
      stale_time_secs: 0,
      retry: 2,
      retry_delay_ms: 1000,
      refetch_on_window_focus: false,
      refetch_on_reconnect: true,
      network_mode: NetworkMode::OfflineFirst,
      mutation_network_mode: NetworkMode::OfflineFirst,
    }
  }
}

impl CacheConfig {
  pub fn gc_time(&self) -> Duration {
    Duration::from_secs(self.gc_time_secs)
  }

  pub fn client_config(&self) -> QueryClientConfig {
    let retry = RetryPolicy::default()
      .with_retries(self.retry)
      .with_base_delay(Duration::from_millis(self.retry_delay_ms));

    QueryClientConfig {
      queries: QueryDefaults {
        gc_time: self.gc_time(),
        stale_time: Duration::from_secs(self.stale_time_secs),
        retry,
        refetch_on_window_focus: self.refetch_on_window_focus,
        refetch_on_reconnect: self.refetch_on_reconnect,
        network_mode: self.network_mode,
      },
      mutations: MutationDefaults {
        network_mode: self.mutation_network_mode,
        ..MutationDefaults::default()
      },
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
  pub enabled: bool,
  /// Database file (default: $XDG_DATA_HOME/forumq/queries.db)
  pub path: Option<PathBuf>,
}

impl Default for PersistConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive, overridden by RUST_LOG
  pub level: String,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "warn".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./forumq.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/forumq/config.yaml
  ///
  /// Without a file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("forumq.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("forumq").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the forum API token from environment variables.
  ///
  /// Checks FORUMQ_TOKEN first, then V2EX_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("FORUMQ_TOKEN")
      .or_else(|_| std::env::var("V2EX_TOKEN"))
      .ok()
      .filter(|token| !token.is_empty())
  }
}
