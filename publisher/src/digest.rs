use tracing::info;
use turtlebot_core::{ContentSource, CoreError, Item, Submission};

pub fn digest_title(from: &str) -> String {
    format!("Top ranked {} posts", from)
}

/// Titles as a Markdown bullet list, one blank line between entries.
pub fn digest_body(posts: &[Item]) -> String {
    posts
        .iter()
        .filter_map(|post| post.title.as_deref())
        .map(|title| format!("- {}", title))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Reposts the titles of the current hot posts of `from` as a single self
/// post in `to`.
pub async fn publish_digest(
    source: &dyn ContentSource,
    from: &str,
    to: &str,
    limit: u32,
) -> Result<Submission, CoreError> {
    let posts = source.fetch_hot(from, limit).await?;
    let body = digest_body(&posts);
    if body.is_empty() {
        return Err(CoreError::InvalidInput {
            message: format!("r/{} has no hot posts to digest", from),
        });
    }

    let submission = source
        .submit_self_post(to, &digest_title(from), &body)
        .await?;
    info!(
        "Posted digest of {} r/{} posts to r/{} ({})",
        posts.len(),
        from,
        to,
        submission.fullname()
    );
    Ok(submission)
}
