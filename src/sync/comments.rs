use tracing::{debug, instrument};

use super::{pause, SyncContext, SyncError};
use crate::gateway::comment_feed_path;
use crate::gateway::model::CommentFeedResp;
use crate::model::Comment;

/// Fetch every comment on one article, page by page, in upstream order.
/// A failure on any page discards the pages already read.
#[instrument(skip(ctx))]
pub async fn fetch_all_comments(
    ctx: SyncContext<'_>,
    article_key: &str,
) -> Result<Vec<Comment>, SyncError> {
    let mut comments = Vec::new();
    let mut page = 1u32;

    loop {
        let resp: CommentFeedResp = ctx.fetch(&comment_feed_path(article_key, page)).await?;
        let has_next = resp.has_next_page();
        let data = resp.data.unwrap_or_default();
        if data.is_empty() {
            break;
        }
        comments.extend(data.into_iter().map(Comment::from));

        if !has_next {
            break;
        }
        page += 1;
        pause(ctx.pacing.comment_delay).await;
    }

    debug!(count = comments.len(), pages = page, "fetched comments");
    Ok(comments)
}
