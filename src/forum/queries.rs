//! Query keys, paginated query options and optimistic actions for the forum.

use std::collections::HashSet;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;

use crate::query::{
  InfiniteData, InfiniteQueryOptions, QueryClient, QueryKey, QueryOptions, QueryState,
};

use super::client::ForumClient;
use super::types::{Node, SearchArgs, SearchHit, SearchPage, Topic, TopicDetailPage, TopicPage};

pub const NODE_ALL: &str = "node.all";
pub const NODE_TOPICS: &str = "node.topics";
pub const TOPIC_DETAIL: &str = "topic.detail";
pub const SEARCH_TOPICS: &str = "search.topics";

#[derive(Serialize)]
struct NodeVars<'a> {
  name: &'a str,
}

#[derive(Serialize)]
struct TopicVars {
  id: u64,
}

#[derive(Serialize)]
struct SearchVars<'a> {
  q: &'a str,
  size: u32,
  #[serde(flatten)]
  args: &'a SearchArgs,
}

/// The node list rarely changes
const NODE_ALL_STALE_TIME: Duration = Duration::from_secs(60 * 60);

/// Next page number while there are pages left.
fn next_page(page: u32, last_page: u32) -> Option<u32> {
  (page < last_page).then_some(page + 1)
}

/// A node's topic list; pages are numbered from 1.
pub fn node_topics(node: &str) -> Result<InfiniteQueryOptions<TopicPage, u32>> {
  let key = QueryKey::new(NODE_TOPICS, &NodeVars { name: node })?;
  Ok(
    InfiniteQueryOptions::new(key, 1)
      .with_next_page_param(|last: &TopicPage, _, _| next_page(last.page, last.last_page)),
  )
}

/// A topic thread; pages are numbered from 1.
pub fn topic_detail(id: u64) -> Result<InfiniteQueryOptions<TopicDetailPage, u32>> {
  let key = topic_detail_key(id)?;
  Ok(
    InfiniteQueryOptions::new(key, 1)
      .with_next_page_param(|last: &TopicDetailPage, _, _| next_page(last.page, last.last_page)),
  )
}

pub fn topic_detail_key(id: u64) -> Result<QueryKey> {
  QueryKey::new(TOPIC_DETAIL, &TopicVars { id })
}

/// Every node of the forum.
pub async fn all_nodes(client: &QueryClient, forum: &ForumClient) -> Result<QueryState<Vec<Node>>> {
  let forum = forum.clone();
  client
    .fetch_query(
      &QueryKey::kind(NODE_ALL),
      &QueryOptions::default().with_stale_time(NODE_ALL_STALE_TIME),
      move || {
        let forum = forum.clone();
        async move { forum.all_nodes().await }
      },
    )
    .await
}

/// Nodes whose title, alternative title, name or an alias contains `text`,
/// ignoring case.
pub fn match_nodes<'a>(nodes: &'a [Node], text: &str) -> Vec<&'a Node> {
  let needle = text.trim().to_lowercase();
  nodes
    .iter()
    .filter(|node| {
      std::iter::once(node.title.as_str())
        .chain(node.title_alternative.as_deref())
        .chain(std::iter::once(node.name.as_str()))
        .chain(node.aliases.iter().map(String::as_str))
        .any(|candidate| candidate.to_lowercase().contains(&needle))
    })
    .collect()
}

/// Hits of all pages in order, each topic once.
///
/// Offsets shift when topics are indexed between page fetches, so a hit can
/// show up on two pages.
pub fn unique_hits(pages: &[SearchPage]) -> Vec<&SearchHit> {
  let mut seen = HashSet::new();
  pages
    .iter()
    .flat_map(|page| &page.hits)
    .filter(|hit| seen.insert(hit.id))
    .collect()
}

/// Search results; the page param is the hit offset.
pub fn search_topics(
  query: &str,
  args: &SearchArgs,
  size: u32,
) -> Result<InfiniteQueryOptions<SearchPage, u32>> {
  let key = QueryKey::new(
    SEARCH_TOPICS,
    &SearchVars {
      q: query,
      size,
      args,
    },
  )?;
  Ok(
    InfiniteQueryOptions::new(key, 0)
      .with_enabled(!query.trim().is_empty())
      .with_next_page_param(|last: &SearchPage, _, from: &u32| {
        let next = from + last.size;
        (last.size > 0 && next < last.total).then_some(next)
      }),
  )
}

/// Apply `patch` to the topic on every cached page of its thread.
fn patch_topic(pages: &mut InfiniteData<TopicDetailPage, u32>, patch: impl Fn(&mut Topic)) {
  for page in pages.pages_mut() {
    patch(&mut page.topic);
  }
}

/// Favorite or unfavorite a topic, updating the cached thread immediately.
pub async fn toggle_like(client: &QueryClient, forum: &ForumClient, topic: &Topic) -> Result<()> {
  let once = topic
    .once
    .clone()
    .ok_or_else(|| eyre!("Sign in to favorite topics"))?;
  let id = topic.id;
  let like = !topic.liked;
  let likes = if like {
    topic.likes + 1
  } else {
    topic.likes.saturating_sub(1)
  };

  client
    .mutate_optimistic(
      &topic_detail_key(id)?,
      |pages: &mut InfiniteData<TopicDetailPage, u32>| {
        patch_topic(pages, |t| {
          t.liked = like;
          t.likes = likes;
        })
      },
      || forum.favorite_topic(id, &once, like),
    )
    .await
}

/// Thank a topic's author. Topics can only be thanked once.
pub async fn thank(client: &QueryClient, forum: &ForumClient, topic: &Topic) -> Result<()> {
  if topic.thanked {
    return Err(eyre!("Topic {} was already thanked", topic.id));
  }
  let once = topic
    .once
    .clone()
    .ok_or_else(|| eyre!("Sign in to thank topics"))?;
  let id = topic.id;
  let thanks = topic.thanks + 1;

  client
    .mutate_optimistic(
      &topic_detail_key(id)?,
      |pages: &mut InfiniteData<TopicDetailPage, u32>| {
        patch_topic(pages, |t| {
          t.thanked = true;
          t.thanks = thanks;
        })
      },
      || forum.thank_topic(id, &once),
    )
    .await
}
