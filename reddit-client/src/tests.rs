#[cfg(test)]
mod tests {
    use crate::{api, AuthState, RedditClient, RedditOAuth2Config, RedditToken};
    use std::time::{Duration, SystemTime};
    use turtlebot_core::{Item, ItemKind, ResolvedCredentials};

    fn create_test_config() -> RedditOAuth2Config {
        RedditOAuth2Config::new(
            "test_client_id".to_string(),
            "test_client_secret".to_string(),
            "MrTurtleBot".to_string(),
            "hunter2".to_string(),
            "turtlebot/1.0 by test_user".to_string(),
        )
    }

    fn token(expires_at: SystemTime) -> RedditToken {
        RedditToken {
            access_token: "token".to_string(),
            expires_at,
            scope: vec!["identity".to_string(), "read".to_string()],
        }
    }

    #[test]
    fn test_config_creation() {
        let config = create_test_config();
        assert_eq!(config.client_id, "test_client_id");
        assert_eq!(config.client_secret, "test_client_secret");
        assert_eq!(config.username, "MrTurtleBot");
        assert_eq!(config.user_agent, "turtlebot/1.0 by test_user");
    }

    #[test]
    fn test_config_from_resolved_credentials() {
        let config: RedditOAuth2Config = ResolvedCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "bot".to_string(),
            password: "pw".to_string(),
            user_agent: "ua".to_string(),
        }
        .into();
        assert_eq!(config.username, "bot");
        assert_eq!(config.password, "pw");
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = RedditClient::new(create_test_config()).unwrap();
        assert!(!client.is_authenticated().await);
        assert_eq!(client.username(), "MrTurtleBot");
        assert!(matches!(
            client.get_auth_state().await,
            AuthState::NotAuthenticated
        ));
    }

    #[test]
    fn test_required_scopes() {
        let scopes = RedditClient::get_required_scopes();
        assert_eq!(scopes, vec!["identity", "read", "submit", "vote", "modposts"]);
    }

    #[tokio::test]
    async fn test_token_expiry_drives_auth_state() {
        let client = RedditClient::new(create_test_config()).unwrap();
        let now = SystemTime::now();

        client.set_token(token(now + Duration::from_secs(3600))).await;
        assert!(client.is_authenticated().await);

        client.set_token(token(now - Duration::from_secs(3600))).await;
        assert!(!client.is_authenticated().await);
        assert!(matches!(
            client.get_auth_state().await,
            AuthState::TokenExpired { .. }
        ));

        client.clear_token().await;
        assert!(matches!(
            client.get_auth_state().await,
            AuthState::NotAuthenticated
        ));
    }

    #[test]
    fn test_token_inside_margin_counts_as_expired() {
        let almost = token(SystemTime::now() + Duration::from_secs(10));
        assert!(almost.is_expired());
    }

    #[test]
    fn test_cached_token_is_reused_without_network() {
        let client = RedditClient::new(create_test_config()).unwrap();
        tokio_test::block_on(client.set_token(token(
            SystemTime::now() + Duration::from_secs(3600),
        )));

        let access = tokio_test::block_on(client.ensure_authenticated()).unwrap();
        assert_eq!(access, "token");
    }

    #[test]
    fn test_token_serialization() {
        let token = RedditToken {
            access_token: "test_access_token".to_string(),
            expires_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1640995200),
            scope: vec!["identity".to_string(), "read".to_string()],
        };

        let serialized = serde_json::to_string(&token).unwrap();
        assert!(serialized.contains("test_access_token"));

        let deserialized: RedditToken = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.access_token, token.access_token);
        assert_eq!(deserialized.expires_at, token.expires_at);
        assert_eq!(deserialized.scope, token.scope);
    }

    #[test]
    fn test_reddit_post_data_conversion() {
        let post_data = api::RedditPostData {
            id: "test123".to_string(),
            title: "Earl's list".to_string(),
            selftext: "Number 1: stole ten bucks".to_string(),
            author: "test_user".to_string(),
            subreddit: "MyNameIsEarlFans".to_string(),
            permalink: "/r/MyNameIsEarlFans/comments/test123".to_string(),
            created_utc: 1640995200.0,
            url: Some("https://reddit.com/r/MyNameIsEarlFans/comments/test123".to_string()),
            is_self: true,
            stickied: false,
        };

        let item: Item = post_data.into();
        assert_eq!(item.id, "test123");
        assert_eq!(item.kind, ItemKind::Post);
        assert_eq!(item.title.as_deref(), Some("Earl's list"));
        assert_eq!(item.body.as_deref(), Some("Number 1: stole ten bucks"));
        assert_eq!(item.created_utc, 1640995200);
        assert_eq!(item.fullname(), "t3_test123");
    }

    #[test]
    fn test_link_post_has_no_body() {
        let post_data = api::RedditPostData {
            id: "link1".to_string(),
            title: "Clip".to_string(),
            selftext: String::new(),
            author: "someone".to_string(),
            subreddit: "MyNameIsEarlFans".to_string(),
            permalink: "/r/MyNameIsEarlFans/comments/link1".to_string(),
            created_utc: 1.0,
            url: Some("https://youtube.com/watch?v=x".to_string()),
            is_self: false,
            stickied: false,
        };

        let item: Item = post_data.into();
        assert_eq!(item.body, None);
    }
}
