//! Weekly rewatch threads.
//!
//! The pointer to the next episode lives in a small JSON file so the series
//! continues across restarts. It only moves forward after Reddit accepted
//! the submission.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use turtlebot_core::{
    ContentSource, CoreError, EpisodeSettings, ErrorExt, PersistenceError, Submission,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeProgress {
    pub current_season: u32,
    pub current_episode: u32,
}

impl Default for EpisodeProgress {
    fn default() -> Self {
        Self {
            current_season: 1,
            current_episode: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeSchedule {
    season_lengths: Vec<u32>,
}

impl EpisodeSchedule {
    pub fn new(season_lengths: Vec<u32>) -> Self {
        Self { season_lengths }
    }

    pub fn seasons(&self) -> u32 {
        self.season_lengths.len() as u32
    }

    pub fn season_length(&self, season: u32) -> Option<u32> {
        let index = season.checked_sub(1)? as usize;
        self.season_lengths.get(index).copied()
    }

    /// True once the pointer has moved past the final episode.
    pub fn is_finished(&self, progress: EpisodeProgress) -> bool {
        progress.current_season > self.seasons()
    }

    pub fn is_valid(&self, progress: EpisodeProgress) -> bool {
        match self.season_length(progress.current_season) {
            Some(length) => (1..=length).contains(&progress.current_episode),
            None => false,
        }
    }

    /// The episode after `progress`; past the finale this is season
    /// `seasons() + 1`, episode 1.
    pub fn advance(&self, progress: EpisodeProgress) -> EpisodeProgress {
        let length = self.season_length(progress.current_season).unwrap_or(0);
        if progress.current_episode >= length {
            EpisodeProgress {
                current_season: progress.current_season + 1,
                current_episode: 1,
            }
        } else {
            EpisodeProgress {
                current_episode: progress.current_episode + 1,
                ..progress
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Falls back to season 1, episode 1 (and rewrites the file) when it is
    /// missing or unreadable.
    pub async fn load(&self) -> EpisodeProgress {
        match self.read().await {
            Ok(progress) => progress,
            Err(e) => {
                e.log_warn();
                let progress = EpisodeProgress::default();
                if let Err(e) = self.save(progress).await {
                    e.log_error();
                }
                progress
            }
        }
    }

    async fn read(&self) -> Result<EpisodeProgress, CoreError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PersistenceError::ReadFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        let progress = serde_json::from_str(&raw).map_err(|e| PersistenceError::CorruptState {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(progress)
    }

    pub async fn save(&self, progress: EpisodeProgress) -> Result<(), CoreError> {
        let payload = serde_json::to_vec(&progress)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, payload)
            .await
            .map_err(|e| PersistenceError::WriteFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            "Saved episode progress S{}E{}",
            progress.current_season, progress.current_episode
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published {
        season: u32,
        episode: u32,
        submission: Submission,
    },
    Finished,
}

pub struct EpisodePublisher {
    source: Arc<dyn ContentSource>,
    settings: EpisodeSettings,
    schedule: EpisodeSchedule,
    store: ProgressStore,
}

impl EpisodePublisher {
    pub fn new(source: Arc<dyn ContentSource>, settings: EpisodeSettings) -> Self {
        Self {
            source,
            schedule: EpisodeSchedule::new(settings.season_lengths.clone()),
            store: ProgressStore::new(settings.progress_path.clone()),
            settings,
        }
    }

    pub fn schedule(&self) -> &EpisodeSchedule {
        &self.schedule
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn title_for(&self, progress: EpisodeProgress) -> String {
        fill(&self.settings.title_template, progress)
    }

    pub fn body_for(&self, progress: EpisodeProgress) -> String {
        fill(&self.settings.body_template, progress)
    }

    pub async fn publish_next(&self) -> Result<PublishOutcome, CoreError> {
        let progress = self.store.load().await;
        if self.schedule.is_finished(progress) {
            info!("Rewatch finished, nothing left to post");
            return Ok(PublishOutcome::Finished);
        }
        if !self.schedule.is_valid(progress) {
            return Err(CoreError::InvalidInput {
                message: format!(
                    "episode progress S{}E{} is outside the schedule",
                    progress.current_season, progress.current_episode
                ),
            });
        }

        let submission = self
            .source
            .submit_self_post(
                &self.settings.subreddit,
                &self.title_for(progress),
                &self.body_for(progress),
            )
            .await?;
        info!(
            "Posted rewatch thread S{}E{} ({})",
            progress.current_season,
            progress.current_episode,
            submission.fullname()
        );

        if self.settings.pin {
            if let Err(e) = self.source.pin(&submission).await {
                warn!("Could not pin {}: {}", submission.fullname(), e);
            }
        }

        self.store.save(self.schedule.advance(progress)).await?;

        Ok(PublishOutcome::Published {
            season: progress.current_season,
            episode: progress.current_episode,
            submission,
        })
    }

    /// Posts once per interval until shutdown. The first post waits one full
    /// interval so a restart does not post twice. The progress file is
    /// created right away if it is missing.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let progress = self.store.load().await;
        debug!(
            "Next rewatch thread is S{}E{}",
            progress.current_season, progress.current_episode
        );

        let interval = Duration::from_secs(self.settings.interval_hours.max(1) * 3600);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            "Episode publisher posting to r/{} every {}h",
            self.settings.subreddit, self.settings.interval_hours
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.publish_next().await {
                        Ok(PublishOutcome::Finished) => break,
                        Ok(PublishOutcome::Published { .. }) => {}
                        Err(e) => {
                            e.log_error();
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Episode publisher stopped");
    }
}

fn fill(template: &str, progress: EpisodeProgress) -> String {
    template
        .replace("{season}", &progress.current_season.to_string())
        .replace("{episode}", &progress.current_episode.to_string())
}
