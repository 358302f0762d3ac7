use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{Config, ForumConfig};
use crate::forum::api_types::{ApiNode, ApiReply, ApiResponse, ApiSearchResponse, ApiTopic};
use crate::forum::types::{Node, SearchArgs, SearchPage, TopicDetailPage, TopicPage};
use crate::query::NetState;

/// Forum HTTP API client
#[derive(Clone)]
pub struct ForumClient {
  http: reqwest::Client,
  base_url: Url,
  search_url: Url,
  token: Option<String>,
}

impl ForumClient {
  pub fn new(config: &ForumConfig) -> Result<Self> {
    let base_url = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid forum url {}: {}", config.url, e))?;
    let search_url = Url::parse(&config.search_url)
      .map_err(|e| eyre!("Invalid search url {}: {}", config.search_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(concat!("forumq/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      search_url,
      token: Config::get_api_token(),
    })
  }

  fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
    debug!(%url, "GET");
    let mut request = self.http.get(url.clone());
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;
    let status = response.status();
    if !status.is_success() {
      return Err(eyre!("Request to {} returned {}", url, status));
    }

    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }

  async fn get_api<T: DeserializeOwned>(&self, url: Url) -> Result<(T, u32)> {
    let response: ApiResponse<T> = self.get_json(url.clone()).await?;
    if !response.success {
      return Err(eyre!(
        "{} failed: {}",
        url,
        response.message.unwrap_or_else(|| "unknown error".to_string())
      ));
    }
    let pages = response.pagination.map_or(1, |p| p.pages.max(1));
    let result = response
      .result
      .ok_or_else(|| eyre!("{} returned no result", url))?;
    Ok((result, pages))
  }

  /// Topics of a node, one page at a time (pages start at 1)
  pub async fn node_topics(&self, node: &str, page: u32) -> Result<TopicPage> {
    let mut url = Self::endpoint(&self.base_url, &format!("/api/v2/nodes/{}/topics", node))?;
    url.query_pairs_mut().append_pair("p", &page.to_string());

    let (topics, last_page): (Vec<ApiTopic>, u32) = self.get_api(url).await?;
    Ok(TopicPage {
      topics: topics.into_iter().map(ApiTopic::into_topic).collect(),
      page,
      last_page,
    })
  }

  /// A topic and one page of its replies (pages start at 1)
  pub async fn topic_detail(&self, id: u64, page: u32) -> Result<TopicDetailPage> {
    let topic_url = Self::endpoint(&self.base_url, &format!("/api/v2/topics/{}", id))?;
    let mut replies_url = Self::endpoint(&self.base_url, &format!("/api/v2/topics/{}/replies", id))?;
    replies_url
      .query_pairs_mut()
      .append_pair("p", &page.to_string());

    let (topic, replies) = tokio::try_join!(
      self.get_api::<ApiTopic>(topic_url),
      self.get_api::<Vec<ApiReply>>(replies_url),
    )?;

    Ok(TopicDetailPage {
      topic: topic.0.into_topic(),
      replies: replies.0.into_iter().map(ApiReply::into_reply).collect(),
      page,
      last_page: replies.1,
    })
  }

  /// Every node of the forum
  pub async fn all_nodes(&self) -> Result<Vec<Node>> {
    let url = Self::endpoint(&self.base_url, "/api/nodes/all.json")?;
    let nodes: Vec<ApiNode> = self.get_json(url).await?;
    Ok(nodes.into_iter().map(Node::from).collect())
  }

  /// Full-text search, `size` hits starting at offset `from`
  pub async fn search(
    &self,
    query: &str,
    args: &SearchArgs,
    from: u32,
    size: u32,
  ) -> Result<SearchPage> {
    let url = self.search_endpoint(query, args, from, size)?;
    let response: ApiSearchResponse = self.get_json(url).await?;
    Ok(response.into_page(from, size))
  }

  fn search_endpoint(&self, query: &str, args: &SearchArgs, from: u32, size: u32) -> Result<Url> {
    let mut url = Self::endpoint(&self.search_url, "/api/search")?;
    {
      let mut pairs = url.query_pairs_mut();
      pairs
        .append_pair("q", query)
        .append_pair("from", &from.to_string())
        .append_pair("size", &size.to_string())
        .append_pair("sort", args.sort.as_str())
        .append_pair("order", &args.order.to_string())
        .append_pair("operator", args.operator.as_str());
      if let Some(node) = &args.node {
        pairs.append_pair("node", node);
      }
      if let Some(gte) = args.gte {
        pairs.append_pair("gte", &gte.to_string());
      }
      if let Some(lte) = args.lte {
        pairs.append_pair("lte", &lte.to_string());
      }
    }
    Ok(url)
  }

  /// Add or remove a topic from the signed-in member's favorites
  pub async fn favorite_topic(&self, id: u64, once: &str, favorite: bool) -> Result<()> {
    let action = if favorite { "favorite" } else { "unfavorite" };
    let mut url = Self::endpoint(&self.base_url, &format!("/{}/topic/{}", action, id))?;
    url.query_pairs_mut().append_pair("once", once);
    self.send_action(self.http.get(url)).await
  }

  /// Send thanks to a topic's author
  pub async fn thank_topic(&self, id: u64, once: &str) -> Result<()> {
    let mut url = Self::endpoint(&self.base_url, &format!("/thank/topic/{}", id))?;
    url.query_pairs_mut().append_pair("once", once);
    self.send_action(self.http.post(url)).await
  }

  async fn send_action(&self, mut request: reqwest::RequestBuilder) -> Result<()> {
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Action failed: {}", e))?;
    match response.status() {
      status if status.is_success() || status.is_redirection() => Ok(()),
      StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Err(eyre!("Not signed in")),
      status => Err(eyre!("Action returned {}", status)),
    }
  }

  /// Probe the forum to report reachability.
  pub async fn probe(&self) -> NetState {
    match self.http.head(self.base_url.clone()).send().await {
      Ok(_) => NetState {
        is_connected: Some(true),
        is_internet_reachable: Some(true),
      },
      Err(e) if e.is_connect() || e.is_timeout() => {
        debug!(error = %e, "forum unreachable");
        NetState {
          is_connected: Some(true),
          is_internet_reachable: Some(false),
        }
      }
      Err(_) => NetState {
        is_connected: Some(true),
        is_internet_reachable: None,
      },
    }
  }
}
