use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Post,
    Comment,
}

impl ItemKind {
    /// Reddit "thing" prefix used to build fullnames.
    pub fn thing_prefix(&self) -> &'static str {
        match self {
            ItemKind::Post => "t3",
            ItemKind::Comment => "t1",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Post => write!(f, "post"),
            ItemKind::Comment => write!(f, "comment"),
        }
    }
}

/// A post or comment as fetched from the content source.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub author: String,
    pub created_utc: i64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub subreddit: String,
    pub permalink: String,
}

impl Item {
    pub fn fullname(&self) -> String {
        format!("{}_{}", self.kind.thing_prefix(), self.id)
    }

    /// Title and body joined and lower-cased.
    pub fn normalized_text(&self) -> String {
        let mut text = String::new();
        if let Some(title) = &self.title {
            text.push_str(title);
        }
        if let Some(body) = &self.body {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(body);
        }
        text.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyHandle {
    pub id: String,
    pub parent_fullname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: String,
    pub url: Option<String>,
}

impl Submission {
    pub fn fullname(&self) -> String {
        format!("{}_{}", ItemKind::Post.thing_prefix(), self.id)
    }
}

/// Current wall-clock time as epoch seconds.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: ItemKind) -> Item {
        Item {
            id: "abc".to_string(),
            kind,
            author: "someone".to_string(),
            created_utc: 1_700_000_000,
            title: Some("Earl's LIST".to_string()),
            body: Some("Crabman".to_string()),
            subreddit: "MyNameIsEarlFans".to_string(),
            permalink: "/r/MyNameIsEarlFans/comments/abc".to_string(),
        }
    }

    #[test]
    fn test_fullname_prefix_follows_kind() {
        assert_eq!(item(ItemKind::Post).fullname(), "t3_abc");
        assert_eq!(item(ItemKind::Comment).fullname(), "t1_abc");
    }

    #[test]
    fn test_normalized_text_joins_and_lowercases() {
        assert_eq!(item(ItemKind::Post).normalized_text(), "earl's list\ncrabman");

        let mut comment = item(ItemKind::Comment);
        comment.title = None;
        assert_eq!(comment.normalized_text(), "crabman");
    }
}
