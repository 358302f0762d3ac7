use serde::{Deserialize, Serialize};

/// Author of a topic or reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
  pub username: String,
  pub avatar: Option<String>,
}

/// A forum section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub name: String,
  pub title: String,
  #[serde(default)]
  pub title_alternative: Option<String>,
  #[serde(default)]
  pub aliases: Vec<String>,
}

/// Text appended to a topic after it was posted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplement {
  pub content: String,
  pub created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
  pub id: u64,
  pub title: String,
  /// Rendered HTML
  pub content: String,
  pub member: Option<Member>,
  pub node: Option<Node>,
  pub replies: u32,
  pub created: String,
  #[serde(default)]
  pub supplements: Vec<Supplement>,
  // Viewer-specific state, only known when signed in
  #[serde(default)]
  pub liked: bool,
  #[serde(default)]
  pub likes: u32,
  #[serde(default)]
  pub thanked: bool,
  #[serde(default)]
  pub thanks: u32,
  /// Anti-CSRF token required by write actions
  pub once: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
  pub id: u64,
  pub content: String,
  pub member: Option<Member>,
  pub created: String,
}

/// One page of a node's topic list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicPage {
  pub topics: Vec<Topic>,
  pub page: u32,
  pub last_page: u32,
}

/// One page of a topic thread. Every page carries the topic itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicDetailPage {
  pub topic: Topic,
  pub replies: Vec<Reply>,
  pub page: u32,
  pub last_page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
  pub id: u64,
  pub title: String,
  pub content: String,
  pub node: String,
  pub member: String,
  pub replies: u32,
  pub created: String,
}

/// One page of full-text search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
  pub hits: Vec<SearchHit>,
  pub total: u32,
  pub from: u32,
  pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
  /// Relevance weighted by activity
  #[default]
  Sumup,
  Created,
}

impl SearchSort {
  pub fn as_str(&self) -> &'static str {
    match self {
      SearchSort::Sumup => "sumup",
      SearchSort::Created => "created",
    }
  }
}

/// How the words of a query are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOperator {
  #[default]
  Or,
  And,
}

impl SearchOperator {
  pub fn as_str(&self) -> &'static str {
    match self {
      SearchOperator::Or => "or",
      SearchOperator::And => "and",
    }
  }
}

/// Options sent to the search service with every query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchArgs {
  pub sort: SearchSort,
  /// 0 for descending, 1 for ascending
  pub order: u8,
  pub operator: SearchOperator,
  /// Only topics of this node
  pub node: Option<String>,
  /// Created at or after (unix seconds)
  pub gte: Option<i64>,
  /// Created at or before (unix seconds)
  pub lte: Option<i64>,
}
