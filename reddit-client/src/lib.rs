//! Reddit client used by the bot.
//!
//! Authentication is the OAuth2 password grant for "script" apps: the bot
//! account's own credentials are exchanged for a bearer token, which is
//! renewed transparently when it expires or the API rejects it.

pub mod api;

#[cfg(test)]
mod tests;

use api::RedditApiClient;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, ResourceOwnerPassword,
    ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use turtlebot_core::{
    ContentSource, CoreError, Item, ItemKind, RedditApiError, ReplyHandle, ResolvedCredentials,
    Submission,
};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are renewed this long before reddit would expire them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl RedditOAuth2Config {
    pub fn new(
        client_id: String,
        client_secret: String,
        username: String,
        password: String,
        user_agent: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            username,
            password,
            user_agent,
        }
    }
}

impl From<ResolvedCredentials> for RedditOAuth2Config {
    fn from(creds: ResolvedCredentials) -> Self {
        Self::new(
            creds.client_id,
            creds.client_secret,
            creds.username,
            creds.password,
            creds.user_agent,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() + EXPIRY_MARGIN >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub enum AuthState {
    NotAuthenticated,
    Authenticated { expires_at: SystemTime },
    TokenExpired { expired_at: SystemTime },
}

pub struct RedditClient {
    config: RedditOAuth2Config,
    oauth_client: BasicClient,
    api: RedditApiClient,
    token: RwLock<Option<RedditToken>>,
    // Serialises re-authentication so concurrent loops don't all hit the token endpoint.
    auth_lock: Mutex<()>,
}

impl RedditClient {
    pub fn new(config: RedditOAuth2Config) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(config.user_agent.clone())?;
        Self::with_api(config, api)
    }

    pub fn with_api(config: RedditOAuth2Config, api: RedditApiClient) -> Result<Self, CoreError> {
        let auth_url =
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| CoreError::Internal {
                message: format!("invalid auth url: {}", e),
            })?;
        let token_url =
            TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| CoreError::Internal {
                message: format!("invalid token url: {}", e),
            })?;

        let oauth_client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            config,
            oauth_client,
            api,
            token: RwLock::new(None),
            auth_lock: Mutex::new(()),
        })
    }

    pub fn get_required_scopes() -> Vec<&'static str> {
        vec!["identity", "read", "submit", "vote", "modposts"]
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    pub fn api(&self) -> &RedditApiClient {
        &self.api
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }

    pub async fn get_auth_state(&self) -> AuthState {
        match self.token.read().await.as_ref() {
            None => AuthState::NotAuthenticated,
            Some(token) if token.is_expired() => AuthState::TokenExpired {
                expired_at: token.expires_at,
            },
            Some(token) => AuthState::Authenticated {
                expires_at: token.expires_at,
            },
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(self.get_auth_state().await, AuthState::Authenticated { .. })
    }

    /// Exchanges the bot's username and password for a fresh bearer token.
    pub async fn authenticate(&self) -> Result<(), CoreError> {
        let username = ResourceOwnerUsername::new(self.config.username.clone());
        let password = ResourceOwnerPassword::new(self.config.password.clone());

        let mut request = self.oauth_client.exchange_password(&username, &password);
        for scope in Self::get_required_scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }

        let http = self.api.http_client().clone();
        let response = request
            .request_async(|req| send_oauth_request(http, req))
            .await
            .map_err(|e| {
                warn!("Reddit token exchange failed: {}", e);
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            })?;

        let expires_in = response
            .expires_in()
            .unwrap_or_else(|| Duration::from_secs(3600));
        let scope = response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();

        self.set_token(RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + expires_in,
            scope,
        })
        .await;

        info!(
            "Authenticated with Reddit as u/{} (token valid for {:?})",
            self.config.username, expires_in
        );
        Ok(())
    }

    /// Returns a usable bearer token, authenticating first when needed.
    pub async fn ensure_authenticated(&self) -> Result<String, CoreError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        let _guard = self.auth_lock.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Reddit token missing or expired, authenticating");
        self.authenticate().await?;
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| {
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: "token missing after authentication".to_string(),
                })
            })
    }

    /// Drops the cached token when the API says it is no longer valid.
    async fn observe<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            warn!("Reddit rejected the bearer token, it will be renewed on the next call");
            self.clear_token().await;
        }
        result
    }
}

/// Sends the token request through our reqwest client so reddit sees the
/// bot's user agent.
async fn send_oauth_request(
    http: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let mut builder = http
        .request(request.method, request.url.as_str())
        .body(request.body);
    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }

    let response = builder.send().await?;
    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn fetch_recent(
        &self,
        subreddits: &[String],
        kind: ItemKind,
        limit: u32,
    ) -> Result<Vec<Item>, CoreError> {
        let token = self.ensure_authenticated().await?;
        let multi = subreddits.join("+");

        let result = match kind {
            ItemKind::Post => self
                .api
                .get_new_posts(&token, &multi, limit)
                .await
                .map(|listing| {
                    listing
                        .data
                        .children
                        .into_iter()
                        .map(|child| Item::from(child.data))
                        .collect()
                }),
            ItemKind::Comment => self
                .api
                .get_new_comments(&token, &multi, limit)
                .await
                .map(|listing| {
                    listing
                        .data
                        .children
                        .into_iter()
                        .map(|child| Item::from(child.data))
                        .collect()
                }),
        };
        self.observe(result).await
    }

    async fn fetch_hot(&self, subreddit: &str, limit: u32) -> Result<Vec<Item>, CoreError> {
        let token = self.ensure_authenticated().await?;
        let result = self
            .api
            .get_hot_posts(&token, subreddit, Some(limit))
            .await
            .map(|listing| {
                listing
                    .data
                    .children
                    .into_iter()
                    .map(|child| Item::from(child.data))
                    .collect()
            });
        self.observe(result).await
    }

    async fn reply(&self, item: &Item, text: &str) -> Result<ReplyHandle, CoreError> {
        let token = self.ensure_authenticated().await?;
        let result = self.api.post_comment(&token, &item.fullname(), text).await;
        self.observe(result).await
    }

    async fn upvote(&self, item: &Item) -> Result<(), CoreError> {
        let token = self.ensure_authenticated().await?;
        let result = self.api.vote(&token, &item.fullname(), 1).await;
        self.observe(result).await
    }

    async fn submit_self_post(
        &self,
        subreddit: &str,
        title: &str,
        body: &str,
    ) -> Result<Submission, CoreError> {
        let token = self.ensure_authenticated().await?;
        let result = self
            .api
            .submit_self_post(&token, subreddit, title, body)
            .await;
        self.observe(result).await
    }

    async fn pin(&self, submission: &Submission) -> Result<(), CoreError> {
        let token = self.ensure_authenticated().await?;
        let result = self
            .api
            .set_sticky(&token, &submission.fullname(), true)
            .await;
        self.observe(result).await
    }
}
