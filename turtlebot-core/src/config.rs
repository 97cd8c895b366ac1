//! TOML configuration for the bot.
//!
//! Every section has defaults so a config file only needs the values that
//! differ. Reddit credentials can also come from the environment, which
//! takes precedence over the file.

use crate::{ConfigError, CoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ENV_CLIENT_ID: &str = "TURTLEBOT_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "TURTLEBOT_CLIENT_SECRET";
pub const ENV_USERNAME: &str = "TURTLEBOT_USERNAME";
pub const ENV_PASSWORD: &str = "TURTLEBOT_PASSWORD";
pub const ENV_USER_AGENT: &str = "TURTLEBOT_USER_AGENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub reddit: RedditSettings,
    pub monitor: MonitorSettings,
    pub episodes: EpisodeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            user_agent: "turtlebot/0.1 (keyword reply bot)".to_string(),
        }
    }
}

/// How a canned-reply rule is compared against the matched keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMatching {
    /// A rule fires when its keyword is one of the matched keywords.
    #[default]
    Containment,
    /// A rule fires only when the comma-joined matched collection equals the
    /// rule keyword, so only single-keyword matches can ever select it.
    WholeSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CannedReply {
    pub keyword: String,
    pub reply: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub subreddits: Vec<String>,
    pub watch_posts: bool,
    pub watch_comments: bool,
    pub post_limit: u32,
    pub comment_limit: u32,
    pub poll_interval_secs: u64,
    pub flush_interval_secs: u64,
    pub ledger_path: PathBuf,
    /// Accounts whose items are never evaluated, besides the bot itself.
    pub ignored_authors: Vec<String>,
    pub keywords: Vec<String>,
    pub anniversary_keywords: Vec<String>,
    pub anniversary_reply: String,
    pub canned_replies: Vec<CannedReply>,
    pub special_reply: String,
    /// Chance that a generic match gets no reaction at all; the rest are upvoted.
    pub suppress_probability: f64,
    pub rule_matching: RuleMatching,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            subreddits: vec!["MyNameIsEarlFans".to_string()],
            watch_posts: true,
            watch_comments: true,
            post_limit: 10,
            comment_limit: 25,
            poll_interval_secs: 30,
            flush_interval_secs: 300,
            ledger_path: PathBuf::from("seen_items.json"),
            ignored_authors: vec!["AutoModerator".to_string()],
            keywords: [
                "earl",
                "randy",
                "joy",
                "darnell",
                "crabman",
                "catalina",
                "karma",
                "list",
                "mr. turtle",
                "camden",
                "anniversary",
                "20 years",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            anniversary_keywords: vec!["anniversary".to_string(), "20 years".to_string()],
            anniversary_reply: "Happy anniversary, {author}! Twenty years of making a list \
                and crossing things off. Karma salutes you."
                .to_string(),
            canned_replies: vec![
                CannedReply {
                    keyword: "earl".to_string(),
                    reply: "You mentioned {keywords}! Do good things and good things happen \
                        to you. That's karma."
                        .to_string(),
                },
                CannedReply {
                    keyword: "randy".to_string(),
                    reply: "Randy would like to remind everyone that Mr. Pibb plus Red Vines \
                        equals crazy delicious."
                        .to_string(),
                },
                CannedReply {
                    keyword: "crabman".to_string(),
                    reply: "Crabman here. Well, a bot. Same thing at the Crab Shack.".to_string(),
                },
                CannedReply {
                    keyword: "mr. turtle".to_string(),
                    reply: "Mr. Turtle has been summoned. He is slow, but he is coming."
                        .to_string(),
                },
            ],
            special_reply: "Mr. Turtle knocked over a candle? That turtle has a list of his \
                own now."
                .to_string(),
            suppress_probability: 0.9,
            rule_matching: RuleMatching::Containment,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeSettings {
    pub enabled: bool,
    pub subreddit: String,
    pub progress_path: PathBuf,
    pub interval_hours: u64,
    /// Number of episodes in each season, in order.
    pub season_lengths: Vec<u32>,
    pub title_template: String,
    pub body_template: String,
    pub pin: bool,
}

impl Default for EpisodeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            subreddit: "MyNameIsEarlFans".to_string(),
            progress_path: PathBuf::from("episode_progress.json"),
            interval_hours: 24 * 7,
            season_lengths: vec![24, 23, 22, 27],
            title_template: "Rewatch: Season {season}, Episode {episode} Discussion".to_string(),
            body_template: "This week's rewatch is Season {season}, Episode {episode}. \
                What's on your list?"
                .to_string(),
            pin: true,
        }
    }
}

/// Credentials for the Reddit password grant, all fields resolved.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl RedditSettings {
    pub fn resolve(&self) -> Result<ResolvedCredentials, ConfigError> {
        fn required(value: &Option<String>, field: &str) -> Result<String, ConfigError> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v.clone()),
                _ => Err(ConfigError::MissingField {
                    field: format!("reddit.{}", field),
                }),
            }
        }

        Ok(ResolvedCredentials {
            client_id: required(&self.client_id, "client_id")?,
            client_secret: required(&self.client_secret, "client_secret")?,
            username: required(&self.username, "username")?,
            password: required(&self.password, "password")?,
            user_agent: self.user_agent.clone(),
        })
    }
}

impl BotConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        let config: BotConfig = toml::from_str(raw).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, CoreError> {
        match Self::load(path) {
            Err(CoreError::Config(ConfigError::FileNotFound { path })) => {
                warn!("Configuration file {} not found, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_CLIENT_ID) {
            self.reddit.client_id = Some(v);
        }
        if let Some(v) = lookup(ENV_CLIENT_SECRET) {
            self.reddit.client_secret = Some(v);
        }
        if let Some(v) = lookup(ENV_USERNAME) {
            self.reddit.username = Some(v);
        }
        if let Some(v) = lookup(ENV_PASSWORD) {
            self.reddit.password = Some(v);
        }
        if let Some(v) = lookup(ENV_USER_AGENT) {
            self.reddit.user_agent = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reddit.resolve()?;

        let monitor = &self.monitor;
        if (monitor.watch_posts || monitor.watch_comments) && monitor.subreddits.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "monitor.subreddits must not be empty while a stream is watched"
                    .to_string(),
            });
        }
        if !(0.0..=1.0).contains(&monitor.suppress_probability) {
            return Err(ConfigError::InvalidValue {
                field: "monitor.suppress_probability".to_string(),
                value: monitor.suppress_probability.to_string(),
            });
        }
        if monitor.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitor.poll_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if monitor.flush_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitor.flush_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }

        let episodes = &self.episodes;
        if episodes.enabled {
            if episodes.subreddit.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "episodes.subreddit".to_string(),
                });
            }
            if episodes.season_lengths.is_empty() || episodes.season_lengths.contains(&0) {
                return Err(ConfigError::ValidationFailed {
                    reason: "episodes.season_lengths must list at least one non-empty season"
                        .to_string(),
                });
            }
            if episodes.interval_hours == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "episodes.interval_hours".to_string(),
                    value: "0".to_string(),
                });
            }
        }

        Ok(())
    }
}
