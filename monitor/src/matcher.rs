use regex::Regex;
use std::sync::LazyLock;

/// "turtle ... knock(ed) [up to four words] candle", articles and filler
/// words allowed in between.
static SPECIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bturtle\b.*?\bknock(?:s|ed|ing)?\b(?:\W+\w+){0,4}?\W+candles?\b")
        .expect("hardcoded regex")
});

pub fn find_special_pattern(text: &str) -> bool {
    SPECIAL_PATTERN.is_match(&text.to_lowercase())
}

/// Case-insensitive substring matcher over a fixed keyword list.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }
        Self {
            keywords: normalized,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Keywords found in either field, in declaration order.
    pub fn find_matches(&self, title: Option<&str>, body: Option<&str>) -> Vec<String> {
        let title = title.map(str::to_lowercase);
        let body = body.map(str::to_lowercase);

        self.keywords
            .iter()
            .filter(|keyword| {
                let in_title = title.as_deref().is_some_and(|t| t.contains(keyword.as_str()));
                let in_body = body.as_deref().is_some_and(|b| b.contains(keyword.as_str()));
                in_title || in_body
            })
            .cloned()
            .collect()
    }
}
