//! Paginated ("infinite") query data and options.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::key::QueryKey;
use super::options::QueryOptions;

/// Pages of a paginated query together with the params used to fetch them.
///
/// `pages[i]` was fetched with `page_params[i]`; both always have the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
  rename_all = "camelCase",
  try_from = "RawInfiniteData<P, M>",
  bound(
    serialize = "P: Serialize, M: Serialize",
    deserialize = "P: Deserialize<'de>, M: Deserialize<'de>"
  )
)]
pub struct InfiniteData<P, M> {
  pages: Vec<P>,
  page_params: Vec<M>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInfiniteData<P, M> {
  pages: Vec<P>,
  page_params: Vec<M>,
}

impl<P, M> TryFrom<RawInfiniteData<P, M>> for InfiniteData<P, M> {
  type Error = String;

  fn try_from(raw: RawInfiniteData<P, M>) -> Result<Self, Self::Error> {
    if raw.pages.len() != raw.page_params.len() {
      return Err(format!(
        "{} pages but {} page params",
        raw.pages.len(),
        raw.page_params.len()
      ));
    }
    Ok(Self {
      pages: raw.pages,
      page_params: raw.page_params,
    })
  }
}

impl<P, M> InfiniteData<P, M> {
  /// A single first page.
  pub fn first(page: P, param: M) -> Self {
    Self {
      pages: vec![page],
      page_params: vec![param],
    }
  }

  pub fn from_parts(pages: Vec<P>, page_params: Vec<M>) -> Result<Self> {
    if pages.len() != page_params.len() {
      return Err(eyre!(
        "{} pages but {} page params",
        pages.len(),
        page_params.len()
      ));
    }
    Ok(Self { pages, page_params })
  }

  pub fn push(&mut self, page: P, param: M) {
    self.pages.push(page);
    self.page_params.push(param);
  }

  pub fn pages(&self) -> &[P] {
    &self.pages
  }

  /// Mutable access to pages for in-place edits; the page count can't change.
  pub fn pages_mut(&mut self) -> &mut [P] {
    &mut self.pages
  }

  pub fn page_params(&self) -> &[M] {
    &self.page_params
  }

  pub fn len(&self) -> usize {
    self.pages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pages.is_empty()
  }

  pub fn last(&self) -> Option<(&P, &M)> {
    self.pages.last().zip(self.page_params.last())
  }

  pub fn into_pages(self) -> Vec<P> {
    self.pages
  }
}

/// Whether a cached value has the `{ pages: [...], pageParams: [...] }` shape.
pub fn is_infinite_shape(data: &Value) -> bool {
  data.get("pages").is_some_and(Value::is_array)
    && data.get("pageParams").is_some_and(Value::is_array)
}

/// Computes the param for the page after `last_page`, or `None` at the end.
pub type NextPageParamFn<P, M> = Arc<dyn Fn(&P, &[P], &M) -> Option<M> + Send + Sync>;

/// Options for a paginated query.
pub struct InfiniteQueryOptions<P, M> {
  pub key: QueryKey,
  /// `false` disables fetching and the mount middlewares
  pub enabled: bool,
  pub initial_page_param: M,
  pub get_next_page_param: Option<NextPageParamFn<P, M>>,
  pub query: QueryOptions,
}

impl<P, M> InfiniteQueryOptions<P, M> {
  pub fn new(key: QueryKey, initial_page_param: M) -> Self {
    Self {
      key,
      enabled: true,
      initial_page_param,
      get_next_page_param: None,
      query: QueryOptions::default(),
    }
  }

  pub fn with_next_page_param<F>(mut self, f: F) -> Self
  where
    F: Fn(&P, &[P], &M) -> Option<M> + Send + Sync + 'static,
  {
    self.get_next_page_param = Some(Arc::new(f));
    self
  }

  pub fn with_enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn with_query_options(mut self, query: QueryOptions) -> Self {
    self.query = query;
    self
  }

  pub fn is_paginated(&self) -> bool {
    self.get_next_page_param.is_some()
  }

  /// Param for the page after the last one in `data`.
  pub fn next_page_param(&self, data: &InfiniteData<P, M>) -> Option<M> {
    let next = self.get_next_page_param.as_ref()?;
    let (last_page, last_param) = data.last()?;
    next(last_page, data.pages(), last_param)
  }
}

impl<P, M: Clone> Clone for InfiniteQueryOptions<P, M> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      enabled: self.enabled,
      initial_page_param: self.initial_page_param.clone(),
      get_next_page_param: self.get_next_page_param.clone(),
      query: self.query.clone(),
    }
  }
}
