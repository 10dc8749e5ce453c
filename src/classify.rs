//! Reply-status classification and worklist ordering.
//!
//! Everything here is a pure function of the enriched articles, the manual
//! reply marks and the viewer's urlname, so it is re-run on every render.
use serde::{Deserialize, Serialize};

use crate::marks::ManualReplySet;
use crate::model::{
    ClassifiedArticle, ClassifiedComment, Comment, EnrichedArticle, ReplyStatus,
};

/// How articles are ordered in the worklist.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArticleOrder {
    /// Most recently published first.
    #[default]
    PublishedAt,
    /// Most comments needing a reply first.
    UnrepliedCount,
}

/// Which comments count towards an article's `unreplied_count`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnrepliedMetric {
    /// Everything not yet replied, liked comments included.
    #[default]
    NeedsAttention,
    /// Only comments with status `unreplied`.
    UnrepliedOnly,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankingPolicy {
    pub order: ArticleOrder,
    pub metric: UnrepliedMetric,
}

impl UnrepliedMetric {
    pub fn counts(&self, status: ReplyStatus) -> bool {
        match self {
            UnrepliedMetric::NeedsAttention => status.needs_attention(),
            UnrepliedMetric::UnrepliedOnly => status == ReplyStatus::Unreplied,
        }
    }
}

pub fn status_of(comment: &Comment, manual: &ManualReplySet) -> ReplyStatus {
    if comment.creator_replied || manual.contains(&comment.key) {
        ReplyStatus::Replied
    } else if comment.creator_liked {
        ReplyStatus::Liked
    } else {
        ReplyStatus::Unreplied
    }
}

/// Classify one article's comments, or `None` when nothing is left to show.
///
/// Comments written by the viewer, and comments without a known author, are
/// dropped. The remainder is stably sorted by status rank so fetch order is
/// kept within each status.
pub fn classify_article(
    enriched: &EnrichedArticle,
    manual: &ManualReplySet,
    viewer_urlname: &str,
    metric: UnrepliedMetric,
) -> Option<ClassifiedArticle> {
    let mut comments: Vec<ClassifiedComment> = enriched
        .comments
        .iter()
        .filter(|c| c.author.is_some() && !c.is_authored_by(viewer_urlname))
        .map(|c| ClassifiedComment {
            status: status_of(c, manual),
            comment: c.clone(),
        })
        .collect();
    if comments.is_empty() {
        return None;
    }
    comments.sort_by_key(|c| c.status.rank());

    let unreplied_count = comments.iter().filter(|c| metric.counts(c.status)).count();
    Some(ClassifiedArticle {
        article: enriched.article.clone(),
        comments,
        unreplied_count,
    })
}

/// Build the ordered worklist.
pub fn classify(
    articles: &[EnrichedArticle],
    manual: &ManualReplySet,
    viewer_urlname: &str,
    policy: RankingPolicy,
) -> Vec<ClassifiedArticle> {
    let mut out: Vec<ClassifiedArticle> = articles
        .iter()
        .filter_map(|a| classify_article(a, manual, viewer_urlname, policy.metric))
        .collect();
    match policy.order {
        ArticleOrder::PublishedAt => {
            out.sort_by(|a, b| b.article.published_at.cmp(&a.article.published_at))
        }
        ArticleOrder::UnrepliedCount => {
            out.sort_by(|a, b| b.unreplied_count.cmp(&a.unreplied_count))
        }
    }
    out
}

/// Headline numbers for the worklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub unreplied: usize,
    pub comments: usize,
}

impl Summary {
    pub fn all_replied(&self) -> bool {
        self.comments > 0 && self.unreplied == 0
    }
}

pub fn summarize(worklist: &[ClassifiedArticle]) -> Summary {
    worklist.iter().fold(Summary::default(), |acc, a| Summary {
        unreplied: acc.unreplied + a.unreplied_count,
        comments: acc.comments + a.comments.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Article, CommentAuthor, CommentBody};
    use chrono::{TimeZone, Utc};

    const VIEWER: &str = "alice";

    fn comment(key: &str, author: &str, replied: bool, liked: bool) -> Comment {
        Comment {
            key: key.into(),
            body: CommentBody::PlainText(format!("text {key}")),
            author: Some(CommentAuthor {
                urlname: author.into(),
                nickname: None,
                avatar_url: None,
            }),
            created_at: None,
            creator_replied: replied,
            creator_liked: liked,
        }
    }

    fn enriched(key: &str, day: u32, comments: Vec<Comment>) -> EnrichedArticle {
        EnrichedArticle {
            article: Article {
                id: 0,
                key: key.into(),
                title: key.into(),
                comment_count: comments.len() as u32,
                published_at: Some(Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()),
                is_pinned: false,
                urlname: VIEWER.into(),
            },
            comments,
        }
    }

    fn statuses(article: &ClassifiedArticle) -> Vec<(&str, ReplyStatus)> {
        article
            .comments
            .iter()
            .map(|c| (c.comment.key.as_str(), c.status))
            .collect()
    }

    #[test]
    fn drops_self_and_authorless_comments() {
        let mut anonymous = comment("anon", "x", false, false);
        anonymous.author = None;
        let input = vec![enriched(
            "a",
            1,
            vec![
                comment("mine", VIEWER, false, false),
                anonymous,
                comment("theirs", "bob", false, false),
            ],
        )];
        let out = classify(&input, &ManualReplySet::default(), VIEWER, RankingPolicy::default());
        assert_eq!(out.len(), 1);
        assert_eq!(statuses(&out[0]), vec![("theirs", ReplyStatus::Unreplied)]);
        assert!(out
            .iter()
            .flat_map(|a| &a.comments)
            .all(|c| !c.comment.is_authored_by(VIEWER)));
    }

    #[test]
    fn article_with_only_self_comments_is_dropped() {
        let input = vec![enriched("a", 1, vec![comment("mine", VIEWER, false, false)])];
        let out = classify(&input, &ManualReplySet::default(), VIEWER, RankingPolicy::default());
        assert!(out.is_empty());
    }

    #[test]
    fn status_derivation_and_stable_rank_sort() {
        let mut manual = ManualReplySet::default();
        manual.insert("m1");
        let input = vec![enriched(
            "a",
            1,
            vec![
                comment("r1", "bob", true, true),
                comment("l1", "bob", false, true),
                comment("u1", "bob", false, false),
                comment("m1", "carol", false, true),
                comment("l2", "dave", false, true),
                comment("u2", "erin", false, false),
            ],
        )];
        let out = classify(&input, &manual, VIEWER, RankingPolicy::default());
        assert_eq!(
            statuses(&out[0]),
            vec![
                ("u1", ReplyStatus::Unreplied),
                ("u2", ReplyStatus::Unreplied),
                ("l1", ReplyStatus::Liked),
                ("l2", ReplyStatus::Liked),
                ("r1", ReplyStatus::Replied),
                ("m1", ReplyStatus::Replied),
            ]
        );
    }

    #[test]
    fn metric_needs_attention_counts_liked() {
        let input = vec![enriched(
            "a",
            1,
            vec![
                comment("u", "bob", false, false),
                comment("l", "bob", false, true),
                comment("r", "bob", true, false),
            ],
        )];
        let attention = classify(&input, &ManualReplySet::default(), VIEWER, RankingPolicy::default());
        assert_eq!(attention[0].unreplied_count, 2);

        let strict = RankingPolicy {
            metric: UnrepliedMetric::UnrepliedOnly,
            ..RankingPolicy::default()
        };
        let strict_out = classify(&input, &ManualReplySet::default(), VIEWER, strict);
        assert_eq!(strict_out[0].unreplied_count, 1);
    }

    #[test]
    fn published_at_order_puts_newest_first() {
        let input = vec![
            enriched("old", 1, vec![comment("a", "bob", false, false), comment("b", "bob", false, false)]),
            enriched("new", 20, vec![comment("c", "bob", true, false)]),
            enriched("mid", 10, vec![comment("d", "bob", false, false)]),
        ];
        let out = classify(&input, &ManualReplySet::default(), VIEWER, RankingPolicy::default());
        let keys: Vec<_> = out.iter().map(|a| a.article.key.as_str()).collect();
        assert_eq!(keys, vec!["new", "mid", "old"]);
    }

    #[test]
    fn unreplied_count_order_puts_busiest_first_and_keeps_ties_stable() {
        let policy = RankingPolicy {
            order: ArticleOrder::UnrepliedCount,
            metric: UnrepliedMetric::UnrepliedOnly,
        };
        let input = vec![
            enriched("one", 20, vec![comment("a", "bob", false, false)]),
            enriched("liked", 15, vec![comment("b", "bob", false, true), comment("c", "bob", false, true)]),
            enriched("two", 1, vec![comment("d", "bob", false, false), comment("e", "bob", false, false)]),
            enriched("one-b", 10, vec![comment("f", "bob", false, false)]),
        ];
        let out = classify(&input, &ManualReplySet::default(), VIEWER, policy);
        let keys: Vec<_> = out.iter().map(|a| a.article.key.as_str()).collect();
        assert_eq!(keys, vec!["two", "one", "one-b", "liked"]);
    }

    #[test]
    fn classification_is_idempotent() {
        let mut manual = ManualReplySet::default();
        manual.insert("l1");
        let input = vec![
            enriched("a", 3, vec![comment("l1", "bob", false, true), comment("u1", "bob", false, false)]),
            enriched("b", 5, vec![comment("r1", "bob", true, false)]),
        ];
        let first = classify(&input, &manual, VIEWER, RankingPolicy::default());
        let second = classify(&input, &manual, VIEWER, RankingPolicy::default());
        assert_eq!(first, second);
    }

    #[test]
    fn summary_totals() {
        let input = vec![
            enriched("a", 3, vec![comment("l1", "bob", false, true), comment("u1", "bob", false, false)]),
            enriched("b", 5, vec![comment("r1", "bob", true, false)]),
        ];
        let out = classify(&input, &ManualReplySet::default(), VIEWER, RankingPolicy::default());
        let summary = summarize(&out);
        assert_eq!(summary, Summary { unreplied: 2, comments: 3 });
        assert!(!summary.all_replied());
        assert!(!summarize(&[]).all_replied());
    }
}
