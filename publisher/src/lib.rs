//! Scheduled self posts: the weekly episode rewatch thread and the one-shot
//! hot-post digest.

pub mod digest;
pub mod episode;

pub use digest::{digest_body, digest_title, publish_digest};
pub use episode::{EpisodeProgress, EpisodePublisher, EpisodeSchedule, ProgressStore, PublishOutcome};
