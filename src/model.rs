use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static URLNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid urlname pattern"));

/// Reply status derived for each comment. Variants are declared in display rank order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Unreplied,
    Liked,
    Replied,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Unreplied => "unreplied",
            ReplyStatus::Liked => "liked",
            ReplyStatus::Replied => "replied",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "unreplied" => Some(ReplyStatus::Unreplied),
            "liked" => Some(ReplyStatus::Liked),
            "replied" => Some(ReplyStatus::Replied),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            ReplyStatus::Unreplied => 0,
            ReplyStatus::Liked => 1,
            ReplyStatus::Replied => 2,
        }
    }

    /// Unreplied and liked comments still need the creator's attention.
    pub fn needs_attention(&self) -> bool {
        !matches!(self, ReplyStatus::Replied)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: u64,
    pub key: String,
    pub title: String,
    pub comment_count: u32,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_pinned: bool,
    /// Owner of the article.
    pub urlname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub urlname: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

impl CommentAuthor {
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.urlname)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub key: String,
    #[serde(default)]
    pub body: CommentBody,
    pub author: Option<CommentAuthor>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub creator_replied: bool,
    #[serde(default)]
    pub creator_liked: bool,
}

impl Comment {
    pub fn is_authored_by(&self, urlname: &str) -> bool {
        self.author.as_ref().is_some_and(|a| a.urlname == urlname)
    }
}

/// A comment body as delivered by the upstream: either plain text, a node
/// tree (`{type, value, children}`), or a bare list of nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommentBody {
    PlainText(String),
    Nodes(Vec<CommentBody>),
    Node(BodyNode),
    Other(Value),
}

impl Default for CommentBody {
    fn default() -> Self {
        CommentBody::PlainText(String::new())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BodyNode {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CommentBody>,
}

impl CommentBody {
    /// Plain text of the body. Top-level blocks are separated by newlines,
    /// inline content within a block is concatenated.
    pub fn text(&self) -> String {
        match self {
            CommentBody::PlainText(s) => s.clone(),
            CommentBody::Nodes(blocks) => join_blocks(blocks),
            CommentBody::Node(node) if !node.children.is_empty() => join_blocks(&node.children),
            CommentBody::Node(_) => inline_text(self),
            CommentBody::Other(Value::Number(n)) => n.to_string(),
            CommentBody::Other(Value::Bool(b)) => b.to_string(),
            CommentBody::Other(_) => String::new(),
        }
    }
}

fn join_blocks(blocks: &[CommentBody]) -> String {
    blocks.iter().map(inline_text).collect::<Vec<_>>().join("\n")
}

fn inline_text(body: &CommentBody) -> String {
    let mut out = String::new();
    push_text(body, &mut out);
    out
}

fn push_text(body: &CommentBody, out: &mut String) {
    match body {
        CommentBody::PlainText(s) => out.push_str(s),
        CommentBody::Node(node) if node.kind == "text" => {
            out.push_str(node.value.as_deref().unwrap_or_default())
        }
        CommentBody::Node(node) => node.children.iter().for_each(|c| push_text(c, out)),
        CommentBody::Nodes(nodes) => nodes.iter().for_each(|c| push_text(c, out)),
        CommentBody::Other(_) => {}
    }
}

/// Article plus its fetched comments; the unit of caching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrichedArticle {
    #[serde(flatten)]
    pub article: Article,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub urlname: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub articles: Vec<EnrichedArticle>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClassifiedComment {
    pub comment: Comment,
    pub status: ReplyStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClassifiedArticle {
    pub article: Article,
    pub comments: Vec<ClassifiedComment>,
    pub unreplied_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub urlname: String,
    /// Lookback window in days; 0 means unbounded.
    pub range_days: u32,
}

impl Settings {
    pub fn is_configured(&self) -> bool {
        !self.urlname.trim().is_empty()
    }

    pub fn valid_urlname(urlname: &str) -> bool {
        URLNAME_RE.is_match(urlname)
    }
}
