use turtlebot_core::{CoreError, Item, ItemKind, RedditApiError, ReplyHandle, Submission};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// What a request is about, so a 404 can name the missing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget<'a> {
    Subreddit(&'a str),
    Thing(&'a str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub stickied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    pub body: String,
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub link_id: Option<String>,
}

/// Envelope returned by the `api_type=json` write endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonEnvelope<T> {
    pub json: JsonEnvelopeBody<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonEnvelopeBody<T> {
    #[serde(default)]
    pub errors: Vec<Vec<serde_json::Value>>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentResponseData {
    pub things: Vec<RedditListingChild<CommentThing>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentThing {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponseData {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl<T> JsonEnvelope<T> {
    /// Turns reddit's in-band `errors` array into a `RedditApiError`.
    pub fn into_result(self, operation: &str) -> Result<Option<T>, CoreError> {
        if let Some(first) = self.json.errors.first() {
            let code = first
                .first()
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string();
            let message = first
                .get(1)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            warn!("Reddit rejected {}: {} {}", operation, code, message);
            if code == "RATELIMIT" {
                return Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded {
                    retry_after: 60,
                }));
            }
            return Err(CoreError::RedditApi(RedditApiError::Rejected {
                details: format!("{}: {} {}", operation, code, message),
            }));
        }
        Ok(self.json.data)
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    base_url: Url,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        Self::with_base_url(user_agent, REDDIT_API_BASE)
    }

    pub fn with_base_url(user_agent: String, base_url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid API base url {}: {}", base_url, e),
        })?;

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, CoreError> {
        self.base_url
            .join(endpoint)
            .map_err(|e| CoreError::InvalidInput {
                message: format!("invalid endpoint {}: {}", endpoint, e),
            })
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        target: RequestTarget<'_>,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
        form: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = self.endpoint_url(endpoint)?;
        let start_time = Instant::now();

        let mut request_builder = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }
        if let Some(fields) = form {
            request_builder = request_builder.form(fields);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!("Request failed with status: {} for {}", status, endpoint);

            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(status_error(status, retry_after, endpoint, target));
        }

        debug!(
            "Request successful: {} {} in {:?}",
            status,
            endpoint,
            start_time.elapsed()
        );
        Ok(response)
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: Response,
        what: &str,
    ) -> Result<T, CoreError> {
        response.json().await.map_err(|e| {
            error!("Failed to parse {}: {}", what, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse {}", what),
            })
        })
    }

    /// Newest posts across `subreddits` ("a+b" style multireddit).
    pub async fn get_new_posts(
        &self,
        access_token: &str,
        subreddits: &str,
        limit: u32,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/new", subreddits);
        let limit = limit.to_string();
        let params = [("limit", limit.as_str()), ("raw_json", "1")];

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                RequestTarget::Subreddit(subreddits),
                access_token,
                Some(&params),
                None,
            )
            .await?;
        let listing: RedditListing<RedditPostData> =
            Self::parse_json(response, &format!("new posts for r/{}", subreddits)).await?;

        debug!(
            "Retrieved {} new posts from r/{}",
            listing.data.children.len(),
            subreddits
        );
        Ok(listing)
    }

    pub async fn get_new_comments(
        &self,
        access_token: &str,
        subreddits: &str,
        limit: u32,
    ) -> Result<RedditListing<RedditCommentData>, CoreError> {
        let endpoint = format!("/r/{}/comments", subreddits);
        let limit = limit.to_string();
        let params = [("limit", limit.as_str()), ("raw_json", "1")];

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                RequestTarget::Subreddit(subreddits),
                access_token,
                Some(&params),
                None,
            )
            .await?;
        let listing: RedditListing<RedditCommentData> =
            Self::parse_json(response, &format!("comments for r/{}", subreddits)).await?;

        debug!(
            "Retrieved {} new comments from r/{}",
            listing.data.children.len(),
            subreddits
        );
        Ok(listing)
    }

    pub async fn get_hot_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        limit: Option<u32>,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/hot", subreddit);
        let mut params = Vec::with_capacity(2);
        let limit_str = limit.map(|l| l.to_string());

        if let Some(ref limit_s) = limit_str {
            params.push(("limit", limit_s.as_str()));
        }
        params.push(("raw_json", "1"));

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                RequestTarget::Subreddit(subreddit),
                access_token,
                Some(&params),
                None,
            )
            .await?;
        let listing: RedditListing<RedditPostData> =
            Self::parse_json(response, &format!("posts for r/{}", subreddit)).await?;

        info!(
            "Retrieved {} hot posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }

    pub async fn post_comment(
        &self,
        access_token: &str,
        parent_fullname: &str,
        text: &str,
    ) -> Result<ReplyHandle, CoreError> {
        let form = [
            ("api_type", "json"),
            ("thing_id", parent_fullname),
            ("text", text),
        ];
        let response = self
            .make_request(
                Method::POST,
                "/api/comment",
                RequestTarget::Thing(parent_fullname),
                access_token,
                None,
                Some(&form),
            )
            .await?;
        let envelope: JsonEnvelope<CommentResponseData> =
            Self::parse_json(response, "comment response").await?;

        let id = envelope
            .into_result("comment")?
            .and_then(|data| data.things.into_iter().next())
            .map(|thing| thing.data.id)
            .ok_or_else(|| {
                CoreError::RedditApi(RedditApiError::InvalidResponse {
                    details: "comment response carried no thing".to_string(),
                })
            })?;

        info!("Replied to {} with comment {}", parent_fullname, id);
        Ok(ReplyHandle {
            id,
            parent_fullname: parent_fullname.to_string(),
        })
    }

    pub async fn vote(
        &self,
        access_token: &str,
        fullname: &str,
        direction: i8,
    ) -> Result<(), CoreError> {
        let dir = direction.to_string();
        let form = [("id", fullname), ("dir", dir.as_str())];
        self.make_request(
            Method::POST,
            "/api/vote",
            RequestTarget::Thing(fullname),
            access_token,
            None,
            Some(&form),
        )
        .await?;

        debug!("Voted {} on {}", direction, fullname);
        Ok(())
    }

    pub async fn submit_self_post(
        &self,
        access_token: &str,
        subreddit: &str,
        title: &str,
        text: &str,
    ) -> Result<Submission, CoreError> {
        let form = [
            ("api_type", "json"),
            ("kind", "self"),
            ("sr", subreddit),
            ("title", title),
            ("text", text),
        ];
        let response = self
            .make_request(
                Method::POST,
                "/api/submit",
                RequestTarget::Subreddit(subreddit),
                access_token,
                None,
                Some(&form),
            )
            .await?;
        let envelope: JsonEnvelope<SubmitResponseData> =
            Self::parse_json(response, "submit response").await?;

        let data = envelope.into_result("submit")?.ok_or_else(|| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "submit response carried no data".to_string(),
            })
        })?;

        info!("Submitted post {} to r/{}", data.id, subreddit);
        Ok(Submission {
            id: data.id,
            url: data.url,
        })
    }

    pub async fn set_sticky(
        &self,
        access_token: &str,
        fullname: &str,
        state: bool,
    ) -> Result<(), CoreError> {
        let state = if state { "true" } else { "false" };
        let form = [("api_type", "json"), ("id", fullname), ("state", state)];
        let response = self
            .make_request(
                Method::POST,
                "/api/set_subreddit_sticky",
                RequestTarget::Thing(fullname),
                access_token,
                None,
                Some(&form),
            )
            .await?;
        let envelope: JsonEnvelope<serde_json::Value> =
            Self::parse_json(response, "sticky response").await?;
        envelope.into_result("sticky")?;

        debug!("Set sticky={} on {}", state, fullname);
        Ok(())
    }
}

/// Maps a non-success HTTP status to the error the bot reacts to.
pub fn status_error(
    status: StatusCode,
    retry_after: Option<u64>,
    endpoint: &str,
    target: RequestTarget<'_>,
) -> CoreError {
    let error = match status.as_u16() {
        429 => {
            let retry_after = retry_after.unwrap_or(60);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => match target {
            RequestTarget::Subreddit(subreddit) => RedditApiError::SubredditNotFound {
                subreddit: subreddit.to_string(),
            },
            RequestTarget::Thing(fullname) => RedditApiError::ThingNotFound {
                fullname: fullname.to_string(),
            },
        },
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, endpoint),
        },
    };
    CoreError::RedditApi(error)
}

impl From<RedditPostData> for Item {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            kind: ItemKind::Post,
            author: post_data.author,
            created_utc: post_data.created_utc as i64,
            title: Some(post_data.title),
            body: if post_data.selftext.is_empty() {
                None
            } else {
                Some(post_data.selftext)
            },
            subreddit: post_data.subreddit,
            permalink: post_data.permalink,
        }
    }
}

impl From<RedditCommentData> for Item {
    fn from(comment: RedditCommentData) -> Self {
        Self {
            id: comment.id,
            kind: ItemKind::Comment,
            author: comment.author,
            created_utc: comment.created_utc as i64,
            title: None,
            body: Some(comment.body),
            subreddit: comment.subreddit,
            permalink: comment.permalink,
        }
    }
}
