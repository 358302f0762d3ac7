use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::{stream, Stream};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use forumq::config::Config;
use forumq::forum::queries::{self, all_nodes, match_nodes, thank, toggle_like, unique_hits};
use forumq::forum::types::{SearchPage, Topic, TopicDetailPage, TopicPage};
use forumq::forum::ForumClient;
use forumq::persist::{NoopPersister, PersistLayer, Persister, SqlitePersister};
use forumq::query::{
  wire_signals, AppStatus, InfiniteData, NetState, Platform, QueryClient, QueryConsumer,
  QueryState, RemoveUnnecessaryPages,
};

use crate::{CacheAction, Command};

/// How often reachability is re-probed while the process runs
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

type Pages<P> = QueryState<InfiniteData<P, u32>>;

pub struct App {
  config: Config,
  client: QueryClient,
  forum: ForumClient,
  persist: PersistLayer<Box<dyn Persister>>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = QueryClient::new(config.cache.client_config());
    let forum = ForumClient::new(&config.forum)?;

    let storage: Box<dyn Persister> = if config.persist.enabled {
      match &config.persist.path {
        Some(path) => Box::new(SqlitePersister::open(path)?),
        None => Box::new(SqlitePersister::open_default()?),
      }
    } else {
      Box::new(NoopPersister)
    };
    let persist = PersistLayer::new(storage).with_max_age(config.cache.gc_time());

    Ok(Self {
      config,
      client,
      forum,
      persist,
    })
  }

  pub async fn run(self, command: Command) -> Result<()> {
    if let Command::Cache { action } = command {
      return self.run_cache(action);
    }

    if let Err(e) = self.persist.restore(&self.client) {
      warn!(error = %e, "could not restore persisted queries");
    }

    wire_signals(
      &self.client,
      Platform::current(),
      stream::once(async { AppStatus::Active }),
      reachability(self.forum.clone()),
    );
    let maintenance = self.client.mount();

    let result = match command {
      Command::Topics { node, pages } => self.show_topics(&node, pages).await,
      Command::Topic { id, pages } => self.show_topic(id, pages).await,
      Command::Search { query, pages } => self.show_search(&query, pages).await,
      Command::Like { id } => self.like(id).await,
      Command::Thank { id } => self.thank(id).await,
      Command::Cache { .. } => Ok(()),
    };

    maintenance.abort();
    if let Err(e) = self.persist.persist(&self.client) {
      warn!(error = %e, "could not persist queries");
    }
    result
  }

  fn run_cache(&self, action: CacheAction) -> Result<()> {
    match action {
      CacheAction::Stats => {
        let stored = self.persist.storage().count()?;
        println!("{} persisted queries", stored);

        self.persist.restore(&self.client)?;
        for key in self.client.cache().keys() {
          let pages = self
            .client
            .get_query_data::<InfiniteData<serde_json::Value, serde_json::Value>>(&key)
            .ok()
            .flatten()
            .map_or(0, |data| data.len());
          println!("  {} ({} pages)", key, pages);
        }
      }
      CacheAction::Clear => {
        self.persist.storage().clear()?;
        println!("Cache cleared");
      }
    }
    Ok(())
  }

  async fn show_topics(&self, node: &str, pages: u32) -> Result<()> {
    let forum = self.forum.clone();
    let node_name = node.to_string();
    let consumer = QueryConsumer::new(
      self.client.clone(),
      queries::node_topics(node)?,
      move |page| {
        let forum = forum.clone();
        let node = node_name.clone();
        async move { forum.node_topics(&node, page).await }
      },
    );

    let state: Pages<TopicPage> = load(consumer, pages).await?;
    for page in state.data().map(|d| d.pages()).unwrap_or_default() {
      for topic in &page.topics {
        println!("{:>8}  {}  ({} replies)", topic.id, topic.title, topic.replies);
      }
    }
    Ok(())
  }

  async fn show_topic(&self, id: u64, pages: u32) -> Result<()> {
    let state = self.load_topic(id, pages).await?;
    let Some(data) = state.data() else {
      return Err(eyre!("Topic {} is not available", id));
    };

    if let Some(first) = data.pages().first() {
      print_topic(&first.topic);
    }
    for page in data.pages() {
      for reply in &page.replies {
        let author = reply.member.as_ref().map_or("?", |m| m.username.as_str());
        println!("--- {} at {}", author, reply.created);
        println!("{}", reply.content);
      }
    }
    Ok(())
  }

  async fn show_search(&self, query: &str, pages: u32) -> Result<()> {
    self.show_matching_nodes(query).await;

    let forum = self.forum.clone();
    let q = query.to_string();
    let args = self.config.forum.search.clone();
    let size = self.config.forum.search_page_size;
    let consumer = QueryConsumer::new(
      self.client.clone(),
      queries::search_topics(query, &args, size)?,
      move |from| {
        let forum = forum.clone();
        let q = q.clone();
        let args = args.clone();
        async move { forum.search(&q, &args, from, size).await }
      },
    );

    let state: Pages<SearchPage> = load(consumer, pages).await?;
    let Some(data) = state.data() else {
      println!("Nothing to search for");
      return Ok(());
    };
    if let Some((last, _)) = data.last() {
      println!("{} results", last.total);
    }
    for hit in unique_hits(data.pages()) {
      println!("{:>8}  {}  [{}] by {}", hit.id, hit.title, hit.node, hit.member);
    }
    Ok(())
  }

  /// Nodes matching the search text, listed before the topics.
  async fn show_matching_nodes(&self, query: &str) {
    if query.trim().is_empty() {
      return;
    }
    let nodes = match all_nodes(&self.client, &self.forum).await {
      Ok(state) => state.data.unwrap_or_default(),
      Err(e) => {
        warn!(error = %e, "could not load the node list");
        return;
      }
    };

    let matches = match_nodes(&nodes, query);
    if matches.is_empty() {
      return;
    }
    println!("Nodes:");
    for node in matches {
      println!("  {}  ({})", node.title, node.name);
    }
    println!();
  }

  async fn like(&self, id: u64) -> Result<()> {
    let topic = self.current_topic(id).await?;
    toggle_like(&self.client, &self.forum, &topic).await?;
    println!(
      "{} topic {}",
      if topic.liked { "Unfavorited" } else { "Favorited" },
      id
    );
    Ok(())
  }

  async fn thank(&self, id: u64) -> Result<()> {
    let topic = self.current_topic(id).await?;
    thank(&self.client, &self.forum, &topic).await?;
    println!("Thanked the author of topic {}", id);
    Ok(())
  }

  async fn current_topic(&self, id: u64) -> Result<Topic> {
    let state = self.load_topic(id, 1).await?;
    state
      .data()
      .and_then(|data| data.pages().first())
      .map(|page| page.topic.clone())
      .ok_or_else(|| eyre!("Topic {} is not available", id))
  }

  async fn load_topic(&self, id: u64, pages: u32) -> Result<Pages<TopicDetailPage>> {
    let forum = self.forum.clone();
    let consumer = QueryConsumer::new(
      self.client.clone(),
      queries::topic_detail(id)?,
      move |page| {
        let forum = forum.clone();
        async move { forum.topic_detail(id, page).await }
      },
    );
    load(consumer, pages).await
  }
}

/// Mount the consumer and load up to `pages` pages.
///
/// A failed refresh over cached data still shows the cached pages.
async fn load<P>(consumer: QueryConsumer<P, u32>, pages: u32) -> Result<Pages<P>>
where
  P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
  let mut consumer = consumer.with_middleware(RemoveUnnecessaryPages);
  consumer.mount();

  let mut state = consumer.fetch().await?;
  for _ in 1..pages {
    if !consumer.has_next_page() {
      break;
    }
    state = consumer.fetch_next_page().await?;
  }

  if let Some(error) = state.error() {
    if state.data().is_none() {
      return Err(eyre!("{}", error));
    }
    warn!(%error, "showing cached results");
  }
  debug!(pages = state.data().map_or(0, |d| d.len()), "loaded");
  Ok(state)
}

fn print_topic(topic: &Topic) {
  let author = topic.member.as_ref().map_or("?", |m| m.username.as_str());
  println!("{}", topic.title);
  println!("by {} at {}  ({} replies)", author, topic.created, topic.replies);
  println!();
  println!("{}", topic.content);
  for supplement in &topic.supplements {
    println!();
    println!("+ {}", supplement.content);
  }
  println!();
}

/// Reachability reports: one immediately, then one per interval.
fn reachability(forum: ForumClient) -> impl Stream<Item = NetState> + Send + 'static {
  stream::unfold((forum, true), |(forum, first)| async move {
    if !first {
      tokio::time::sleep(PROBE_INTERVAL).await;
    }
    let state = forum.probe().await;
    Some((state, (forum, false)))
  })
}
