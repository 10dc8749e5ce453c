//! Plain-text rendering of the worklist for the terminal.
use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::classify::{summarize, Summary};
use crate::model::{ClassifiedArticle, ReplyStatus};

const BODY_PREVIEW_CHARS: usize = 120;

/// Human label for how long ago `then` was, e.g. `3h ago`.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else if days < 30 {
        format!("{}w ago", days / 7)
    } else if days < 365 {
        format!("{}mo ago", days / 30)
    } else {
        format!("{}y ago", days / 365)
    }
}

/// `None` when there is nothing to summarise.
pub fn headline(summary: &Summary) -> Option<String> {
    if summary.comments == 0 {
        None
    } else if summary.unreplied == 0 {
        Some("All replied".to_string())
    } else if summary.unreplied == 1 {
        Some("1 unreplied comment".to_string())
    } else {
        Some(format!("{} unreplied comments", summary.unreplied))
    }
}

fn status_badge(status: ReplyStatus) -> &'static str {
    match status {
        ReplyStatus::Unreplied => "[unreplied]",
        ReplyStatus::Liked => "[liked]    ",
        ReplyStatus::Replied => "[replied]  ",
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= BODY_PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(BODY_PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}

pub fn render(worklist: &[ClassifiedArticle], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let summary = summarize(worklist);
    match headline(&summary) {
        Some(line) => {
            let _ = writeln!(out, "{line}");
        }
        None => {
            out.push_str("No articles with comments.\n");
            return out;
        }
    }

    for article in worklist {
        let count = if article.unreplied_count > 0 {
            format!("{} unreplied", article.unreplied_count)
        } else {
            "done".to_string()
        };
        let _ = writeln!(out, "\n## {} ({count})", article.article.title);
        for item in &article.comments {
            let comment = &item.comment;
            let author = comment
                .author
                .as_ref()
                .map(|a| a.display_name())
                .unwrap_or("?");
            let when = comment
                .created_at
                .map(|t| relative_time(t, now))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {} {} {author} {when}\n      {}",
                status_badge(item.status),
                comment.key,
                preview(&comment.body.text())
            );
        }
    }
    out
}
