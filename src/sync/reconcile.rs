use std::collections::HashMap;
use tracing::{info, instrument};

use super::{fetch_all_comments, pause, ProgressEvent, SyncContext, SyncError};
use crate::model::{Article, EnrichedArticle};

fn reusable<'c>(
    cache: &HashMap<&str, &'c EnrichedArticle>,
    article: &Article,
) -> Option<&'c EnrichedArticle> {
    cache
        .get(article.key.as_str())
        .copied()
        .filter(|cached| cached.article.comment_count == article.comment_count)
}

/// Attach comments to each freshly listed article, reusing cached comments
/// when the upstream comment count is unchanged.
///
/// The comment count is only a cheap staleness signal; a deleted-then-added
/// comment goes unnoticed until the count moves. Output follows the order of
/// `fresh`. Any fetch failure aborts the whole run.
#[instrument(skip_all, fields(articles = fresh.len()))]
pub async fn reconcile(
    ctx: SyncContext<'_>,
    fresh: Vec<Article>,
    cached: Option<&[EnrichedArticle]>,
) -> Result<Vec<EnrichedArticle>, SyncError> {
    let cache: HashMap<&str, &EnrichedArticle> = cached
        .unwrap_or_default()
        .iter()
        .map(|a| (a.article.key.as_str(), a))
        .collect();

    let total = fresh
        .iter()
        .filter(|a| reusable(&cache, a).is_none())
        .count();

    let mut fetched = 0usize;
    let mut result = Vec::with_capacity(fresh.len());
    for article in fresh {
        if let Some(cached) = reusable(&cache, &article) {
            let comments = cached.comments.clone();
            result.push(EnrichedArticle { article, comments });
            continue;
        }

        fetched += 1;
        ctx.progress.emit(ProgressEvent::FetchingComments {
            index: fetched,
            total,
            title: article.title.clone(),
        });
        let comments = fetch_all_comments(ctx, &article.key).await?;
        result.push(EnrichedArticle { article, comments });

        if fetched < total {
            pause(ctx.pacing.comment_delay).await;
        }
    }

    info!(
        fetched,
        reused = result.len() - fetched,
        "reconciled articles with cache"
    );
    Ok(result)
}
