use crate::{CoreError, Item, ItemKind, ReplyHandle, Submission};
use async_trait::async_trait;

/// Remote content service the monitor and the publisher talk to.
///
/// `RedditClient` is the production implementation; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Most recent items of `kind` across the union of `subreddits`, in the
    /// service's native order.
    async fn fetch_recent(
        &self,
        subreddits: &[String],
        kind: ItemKind,
        limit: u32,
    ) -> Result<Vec<Item>, CoreError>;

    async fn fetch_hot(&self, subreddit: &str, limit: u32) -> Result<Vec<Item>, CoreError>;

    async fn reply(&self, item: &Item, text: &str) -> Result<ReplyHandle, CoreError>;

    async fn upvote(&self, item: &Item) -> Result<(), CoreError>;

    async fn submit_self_post(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<Submission, CoreError>;

    async fn pin(&self, submission: &Submission) -> Result<(), CoreError>;
}
