//! Upstream response shapes for the article and comment feeds.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{Article, Comment, CommentAuthor, CommentBody};

#[derive(Deserialize, Debug, Default)]
pub struct ArticleFeedResp {
    #[serde(default)]
    pub data: Option<ArticleFeedData>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ArticleFeedData {
    #[serde(default)]
    pub contents: Option<Vec<ArticleEntry>>,
    #[serde(rename = "isLastPage", default)]
    pub is_last_page: Option<bool>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ArticleEntry {
    #[serde(default)]
    pub id: u64,
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub publish_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_pinned: bool,
}

impl ArticleFeedResp {
    pub fn into_page(self) -> (Vec<ArticleEntry>, bool) {
        let data = self.data.unwrap_or_default();
        // A missing flag ends pagination.
        let last = data.is_last_page.unwrap_or(true);
        (data.contents.unwrap_or_default(), last)
    }
}

impl ArticleEntry {
    pub fn into_article(self, urlname: &str) -> Article {
        Article {
            id: self.id,
            key: self.key,
            title: self.name.unwrap_or_default(),
            comment_count: self.comment_count,
            published_at: self.publish_at,
            is_pinned: self.is_pinned,
            urlname: urlname.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct CommentFeedResp {
    #[serde(default)]
    pub data: Option<Vec<CommentEntry>>,
    #[serde(default)]
    pub next_page: Value,
}

impl CommentFeedResp {
    /// The upstream signals more pages with a truthy `next_page`.
    pub fn has_next_page(&self) -> bool {
        match &self.next_page {
            Value::Null | Value::Bool(false) => false,
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CommentEntry {
    pub key: String,
    #[serde(default)]
    pub body: Option<CommentBody>,
    /// Older payloads carry the text under `comment`.
    #[serde(default)]
    pub comment: Option<CommentBody>,
    #[serde(default)]
    pub user: Option<UserEntry>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_creator_replied: bool,
    #[serde(default)]
    pub is_creator_liked: bool,
}

#[derive(Deserialize, Debug)]
pub struct UserEntry {
    #[serde(default)]
    pub urlname: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

fn is_blank(body: &CommentBody) -> bool {
    match body {
        CommentBody::PlainText(s) => s.is_empty(),
        CommentBody::Other(Value::Null) => true,
        _ => false,
    }
}

impl From<CommentEntry> for Comment {
    fn from(entry: CommentEntry) -> Self {
        let body = entry
            .body
            .filter(|b| !is_blank(b))
            .or(entry.comment)
            .unwrap_or_default();
        Comment {
            key: entry.key,
            body,
            author: entry.user.map(|u| CommentAuthor {
                urlname: u.urlname,
                nickname: u.nickname,
                avatar_url: u.profile_image_url,
            }),
            created_at: entry.created_at,
            creator_replied: entry.is_creator_replied,
            creator_liked: entry.is_creator_liked,
        }
    }
}
