//! Mount-time middlewares for paginated queries.

use serde_json::{json, Value};
use tracing::debug;

use super::client::QueryClient;
use super::infinite::{is_infinite_shape, InfiniteQueryOptions};
use super::key::QueryKey;
use super::state::QueryStatus;

/// What a middleware gets to see about the query being mounted.
#[derive(Debug, Clone, Copy)]
pub struct MountContext<'a> {
  pub key: &'a QueryKey,
  pub enabled: bool,
  /// The query can compute next-page params
  pub paginated: bool,
}

impl<'a> MountContext<'a> {
  pub fn for_infinite<P, M>(options: &'a InfiniteQueryOptions<P, M>) -> Self {
    Self {
      key: &options.key,
      enabled: options.enabled,
      paginated: options.is_paginated(),
    }
  }
}

/// Hook run once when a consumer of a query mounts, before it reads any data.
pub trait Middleware: Send + Sync {
  fn on_mount(&self, client: &QueryClient, ctx: &MountContext<'_>);
}

/// Collapse a cached multi-page result to its first page before mount.
///
/// Long lists that were scrolled deep keep all their pages in the cache; when
/// the list is shown again only the first page is kept, and further pages are
/// fetched again as the user scrolls.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveUnnecessaryPages;

impl Middleware for RemoveUnnecessaryPages {
  fn on_mount(&self, client: &QueryClient, ctx: &MountContext<'_>) {
    if !ctx.enabled || !ctx.paginated {
      return;
    }

    let Some(state) = client.cache().find(ctx.key) else {
      return;
    };
    let Some(data) = state.data.as_ref().filter(|data| is_infinite_shape(data)) else {
      return;
    };
    if state.status != QueryStatus::Success {
      return;
    }

    if let Some(first_page) = first_page_only(data) {
      debug!(query = %ctx.key, "keeping only the first page before mount");
      client.cache().set_data(ctx.key, first_page);
    }
  }
}

/// `{ pages: [pages[0]], pageParams: [pageParams[0]] }` if there are at least two pages.
fn first_page_only(data: &Value) -> Option<Value> {
  let pages = data.get("pages")?.as_array()?;
  let params = data.get("pageParams")?.as_array()?;
  if pages.len() < 2 {
    return None;
  }
  Some(json!({
    "pages": [pages.first()?],
    "pageParams": [params.first()?],
  }))
}
