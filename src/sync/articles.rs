use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, instrument};

use super::{pause, ProgressEvent, SyncContext, SyncError};
use crate::gateway::article_feed_path;
use crate::gateway::model::ArticleFeedResp;
use crate::model::Article;

/// Oldest publish time still inside the lookback window, or `None` when the
/// window is unbounded. A window reaching past the representable date range
/// is unbounded too.
pub fn cutoff(range_days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if range_days == 0 {
        return None;
    }
    ChronoDuration::try_days(i64::from(range_days)).and_then(|window| now.checked_sub_signed(window))
}

/// Walk the creator's article feed newest-first and collect the articles that
/// have comments.
///
/// Pagination stops at the last page, at an empty page, or at the first
/// non-pinned article older than the lookback window. The feed is ordered by
/// publish time, so nothing after that article can be inside the window.
/// Pinned articles are exempt from the cutoff check.
#[instrument(skip(ctx, now))]
pub async fn list_commented_articles(
    ctx: SyncContext<'_>,
    urlname: &str,
    range_days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<Article>, SyncError> {
    let cutoff = cutoff(range_days, now);
    let mut articles = Vec::new();
    let mut page = 1u32;

    loop {
        ctx.progress.emit(ProgressEvent::ListingArticles {
            page,
            collected: articles.len(),
        });

        let resp: ArticleFeedResp = ctx.fetch(&article_feed_path(urlname, page)).await?;
        let (entries, is_last_page) = resp.into_page();
        if entries.is_empty() {
            debug!(page, "empty article page");
            break;
        }

        let mut reached_cutoff = false;
        for entry in entries {
            let outside_window = match (cutoff, entry.publish_at) {
                (Some(cutoff), Some(published)) => !entry.is_pinned && published < cutoff,
                _ => false,
            };
            if outside_window {
                reached_cutoff = true;
                break;
            }
            if entry.comment_count > 0 {
                articles.push(entry.into_article(urlname));
            }
        }

        if reached_cutoff {
            debug!(page, "reached lookback cutoff");
            break;
        }
        if is_last_page {
            break;
        }
        page += 1;
        pause(ctx.pacing.article_page_delay).await;
    }

    info!(count = articles.len(), pages = page, "listed commented articles");
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::RecordingGateway;
    use crate::sync::{Pacing, ProgressSink};
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> String {
        (now() - ChronoDuration::days(days)).to_rfc3339()
    }

    fn entry(key: &str, comments: u32, days: i64, pinned: bool) -> Value {
        json!({
            "id": 1,
            "key": key,
            "name": format!("title {key}"),
            "commentCount": comments,
            "publishAt": days_ago(days),
            "isPinned": pinned
        })
    }

    fn page(entries: Vec<Value>, last: bool) -> Value {
        json!({"data": {"contents": entries, "isLastPage": last}})
    }

    fn keys(articles: &[Article]) -> Vec<&str> {
        articles.iter().map(|a| a.key.as_str()).collect()
    }

    #[test]
    fn cutoff_bounds() {
        assert_eq!(cutoff(0, now()), None);
        assert_eq!(cutoff(7, now()), Some(now() - ChronoDuration::days(7)));
        assert_eq!(cutoff(u32::MAX, now()), None);
    }

    #[tokio::test]
    async fn out_of_range_window_lists_everything() {
        let gw = RecordingGateway::default().with(
            article_feed_path("alice", 1),
            page(vec![entry("a", 1, 1, false), entry("old", 2, 4000, false)], true),
        );
        let sink = ProgressSink::silent();
        let ctx = SyncContext::new(&gw, Pacing::none(), &sink);

        let articles = list_commented_articles(ctx, "alice", u32::MAX, now()).await.unwrap();
        assert_eq!(keys(&articles), vec!["a", "old"]);
    }

    #[tokio::test]
    async fn paginates_until_last_page_and_filters_uncommented() {
        let gw = RecordingGateway::default()
            .with(
                article_feed_path("alice", 1),
                page(vec![entry("a", 2, 1, false), entry("b", 0, 2, false)], false),
            )
            .with(
                article_feed_path("alice", 2),
                page(vec![entry("c", 1, 40, false)], true),
            );
        let sink = ProgressSink::silent();
        let ctx = SyncContext::new(&gw, Pacing::none(), &sink);

        let articles = list_commented_articles(ctx, "alice", 0, now()).await.unwrap();
        assert_eq!(keys(&articles), vec!["a", "c"]);
        assert_eq!(gw.calls().len(), 2);
        assert!(articles.iter().all(|a| a.urlname == "alice"));
    }

    #[tokio::test]
    async fn old_unpinned_article_halts_pagination() {
        let gw = RecordingGateway::default().with(
            article_feed_path("alice", 1),
            page(
                vec![
                    entry("fresh", 1, 2, false),
                    entry("old", 3, 8, false),
                    entry("after", 5, 9, false),
                ],
                false,
            ),
        );
        let sink = ProgressSink::silent();
        let ctx = SyncContext::new(&gw, Pacing::none(), &sink);

        let articles = list_commented_articles(ctx, "alice", 7, now()).await.unwrap();
        assert_eq!(keys(&articles), vec!["fresh"]);
        assert_eq!(gw.calls(), vec![article_feed_path("alice", 1)]);
    }

    #[tokio::test]
    async fn pinned_old_article_does_not_halt_and_is_still_filtered() {
        let gw = RecordingGateway::default()
            .with(
                article_feed_path("alice", 1),
                page(
                    vec![
                        entry("pinned-empty", 0, 8, true),
                        entry("pinned", 4, 8, true),
                        entry("fresh", 1, 1, false),
                    ],
                    false,
                ),
            )
            .with(
                article_feed_path("alice", 2),
                page(vec![entry("recent", 2, 3, false)], true),
            );
        let sink = ProgressSink::silent();
        let ctx = SyncContext::new(&gw, Pacing::none(), &sink);

        let articles = list_commented_articles(ctx, "alice", 7, now()).await.unwrap();
        assert_eq!(keys(&articles), vec!["pinned", "fresh", "recent"]);
        assert_eq!(gw.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_page_stops_even_without_last_flag() {
        let gw = RecordingGateway::default()
            .with(
                article_feed_path("alice", 1),
                page(vec![entry("a", 1, 1, false)], false),
            )
            .with(article_feed_path("alice", 2), page(vec![], false));
        let sink = ProgressSink::silent();
        let ctx = SyncContext::new(&gw, Pacing::none(), &sink);

        let articles = list_commented_articles(ctx, "alice", 0, now()).await.unwrap();
        assert_eq!(keys(&articles), vec!["a"]);
        assert_eq!(gw.calls().len(), 2);
    }

    #[tokio::test]
    async fn failure_aborts_listing() {
        let gw = RecordingGateway::default()
            .with(
                article_feed_path("alice", 1),
                page(vec![entry("a", 1, 1, false)], false),
            )
            .failing(article_feed_path("alice", 2), 503);
        let sink = ProgressSink::silent();
        let ctx = SyncContext::new(&gw, Pacing::none(), &sink);

        let err = list_commented_articles(ctx, "alice", 0, now())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn progress_is_reported_before_each_page() {
        let gw = RecordingGateway::default()
            .with(
                article_feed_path("alice", 1),
                page(vec![entry("a", 1, 1, false), entry("b", 1, 1, false)], false),
            )
            .with(article_feed_path("alice", 2), page(vec![], true));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ProgressSink::new(tx);
        let ctx = SyncContext::new(&gw, Pacing::none(), &sink);

        list_commented_articles(ctx, "alice", 0, now()).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::ListingArticles { page: 1, collected: 0 }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::ListingArticles { page: 2, collected: 2 }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_pages_only() {
        let gw = RecordingGateway::default()
            .with(
                article_feed_path("alice", 1),
                page(vec![entry("a", 1, 1, false)], false),
            )
            .with(
                article_feed_path("alice", 2),
                page(vec![entry("b", 1, 1, false)], false),
            )
            .with(
                article_feed_path("alice", 3),
                page(vec![entry("c", 1, 1, false)], true),
            );
        let sink = ProgressSink::silent();
        let ctx = SyncContext::new(&gw, Pacing::default(), &sink);

        let started = tokio::time::Instant::now();
        list_commented_articles(ctx, "alice", 0, now()).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed < std::time::Duration::from_millis(1500), "{elapsed:?}");
    }

    #[test]
    fn cutoff_is_unbounded_for_zero_days() {
        assert_eq!(cutoff(0, now()), None);
        assert_eq!(cutoff(7, now()), Some(now() - ChronoDuration::days(7)));
    }
}
