//! Serde-deserializable types matching the forum and search API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{Member, Node, Reply, SearchHit, SearchPage, Supplement, Topic};

// ============================================================================
// Common envelope
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
  pub success: bool,
  pub message: Option<String>,
  pub result: Option<T>,
  pub pagination: Option<ApiPagination>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPagination {
  pub per_page: u32,
  pub total: u32,
  pub pages: u32,
}

// ============================================================================
// Nested field types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMember {
  pub username: String,
  #[serde(alias = "avatar_large")]
  pub avatar: Option<String>,
}

impl From<ApiMember> for Member {
  fn from(member: ApiMember) -> Self {
    Member {
      username: member.username,
      avatar: member.avatar,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiNode {
  pub name: String,
  pub title: String,
  #[serde(default)]
  pub title_alternative: Option<String>,
  #[serde(default)]
  pub aliases: Vec<String>,
}

impl From<ApiNode> for Node {
  fn from(node: ApiNode) -> Self {
    Node {
      name: node.name,
      title: node.title,
      title_alternative: node.title_alternative.filter(|t| !t.is_empty()),
      aliases: node.aliases,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiSupplement {
  #[serde(default)]
  pub content_rendered: String,
  pub created: i64,
}

// ============================================================================
// Topics and replies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTopic {
  pub id: u64,
  pub title: String,
  #[serde(default)]
  pub content_rendered: String,
  #[serde(default)]
  pub replies: u32,
  pub created: i64,
  pub member: Option<ApiMember>,
  pub node: Option<ApiNode>,
  #[serde(default)]
  pub supplements: Vec<ApiSupplement>,
}

impl ApiTopic {
  pub fn into_topic(self) -> Topic {
    Topic {
      id: self.id,
      title: self.title,
      content: self.content_rendered,
      member: self.member.map(Member::from),
      node: self.node.map(Node::from),
      replies: self.replies,
      created: format_timestamp(self.created),
      supplements: self
        .supplements
        .into_iter()
        .map(|s| Supplement {
          content: s.content_rendered,
          created: format_timestamp(s.created),
        })
        .collect(),
      liked: false,
      likes: 0,
      thanked: false,
      thanks: 0,
      once: None,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiReply {
  pub id: u64,
  #[serde(default)]
  pub content_rendered: String,
  pub created: i64,
  pub member: Option<ApiMember>,
}

impl ApiReply {
  pub fn into_reply(self) -> Reply {
    Reply {
      id: self.id,
      content: self.content_rendered,
      member: self.member.map(Member::from),
      created: format_timestamp(self.created),
    }
  }
}

// ============================================================================
// Search endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  pub total: u32,
  #[serde(default)]
  pub hits: Vec<ApiSearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchHit {
  #[serde(rename = "_source")]
  pub source: ApiSearchSource,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchSource {
  pub id: u64,
  pub title: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub node: serde_json::Value,
  #[serde(default)]
  pub member: String,
  #[serde(default)]
  pub replies: u32,
  #[serde(default)]
  pub created: String,
}

impl ApiSearchResponse {
  pub fn into_page(self, from: u32, size: u32) -> SearchPage {
    SearchPage {
      hits: self
        .hits
        .into_iter()
        .map(|hit| {
          let s = hit.source;
          SearchHit {
            id: s.id,
            title: s.title,
            content: s.content,
            // The index stores node ids as numbers for older topics
            node: match s.node {
              serde_json::Value::String(name) => name,
              other => other.to_string(),
            },
            member: s.member,
            replies: s.replies,
            created: s.created,
          }
        })
        .collect(),
      total: self.total,
      from,
      size,
    }
  }
}

/// Unix seconds to RFC 3339; falls back to the raw number.
fn format_timestamp(secs: i64) -> String {
  DateTime::<Utc>::from_timestamp(secs, 0)
    .map(|dt| dt.to_rfc3339())
    .unwrap_or_else(|| secs.to_string())
}
