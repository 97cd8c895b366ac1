//! Chooses the bot's reaction to a set of matched keywords.

use turtlebot_core::{CannedReply, ItemKind, MonitorSettings, RuleMatching};

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Ignore,
    Upvote,
    Reply(String),
}

#[derive(Debug, Clone)]
pub struct ResponsePolicy {
    canned_replies: Vec<CannedReply>,
    anniversary_keywords: Vec<String>,
    anniversary_reply: String,
    suppress_probability: f64,
    rule_matching: RuleMatching,
}

impl ResponsePolicy {
    pub fn new(
        canned_replies: Vec<CannedReply>,
        anniversary_keywords: Vec<String>,
        anniversary_reply: String,
        suppress_probability: f64,
        rule_matching: RuleMatching,
    ) -> Self {
        let lower = |s: &str| s.trim().to_lowercase();
        Self {
            canned_replies: canned_replies
                .into_iter()
                .map(|rule| CannedReply {
                    keyword: lower(rule.keyword.as_str()),
                    reply: rule.reply,
                })
                .collect(),
            anniversary_keywords: anniversary_keywords
                .iter()
                .map(|k| lower(k.as_str()))
                .collect(),
            anniversary_reply,
            suppress_probability: suppress_probability.clamp(0.0, 1.0),
            rule_matching,
        }
    }

    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self::new(
            settings.canned_replies.clone(),
            settings.anniversary_keywords.clone(),
            settings.anniversary_reply.clone(),
            settings.suppress_probability,
            settings.rule_matching,
        )
    }

    pub fn suppress_probability(&self) -> f64 {
        self.suppress_probability
    }

    /// `decide` with a fresh roll in `[0, 1)`.
    pub fn decide_random(&self, matches: &[String], author: &str, kind: ItemKind) -> Decision {
        self.decide(matches, author, kind, fastrand::f64())
    }

    /// `roll` only matters for the generic case: below the suppress
    /// probability the match is ignored, otherwise it is upvoted.
    pub fn decide(&self, matches: &[String], author: &str, _kind: ItemKind, roll: f64) -> Decision {
        if matches.is_empty() {
            return Decision::Ignore;
        }

        let enumeration = enumerate_keywords(matches);

        if self
            .anniversary_keywords
            .iter()
            .any(|keyword| self.rule_applies(matches, keyword))
        {
            return Decision::Reply(render(&self.anniversary_reply, &enumeration, author));
        }

        if let Some(rule) = self.canned_rule(matches) {
            return Decision::Reply(render(&rule.reply, &enumeration, author));
        }

        if roll < self.suppress_probability {
            Decision::Ignore
        } else {
            Decision::Upvote
        }
    }

    /// Containment takes the first applicable rule in declaration order;
    /// whole-set comparison needs exactly one applicable rule.
    fn canned_rule(&self, matches: &[String]) -> Option<&CannedReply> {
        let mut applicable = self
            .canned_replies
            .iter()
            .filter(|rule| self.rule_applies(matches, &rule.keyword));
        match self.rule_matching {
            RuleMatching::Containment => applicable.next(),
            RuleMatching::WholeSet => match (applicable.next(), applicable.next()) {
                (Some(rule), None) => Some(rule),
                _ => None,
            },
        }
    }

    fn rule_applies(&self, matches: &[String], keyword: &str) -> bool {
        match self.rule_matching {
            RuleMatching::Containment => matches.iter().any(|m| m == keyword),
            RuleMatching::WholeSet => matches.join(",") == keyword,
        }
    }
}

/// `"earl"`, or `"earl", "randy" and "joy"`.
pub fn enumerate_keywords(keywords: &[String]) -> String {
    let quoted: Vec<String> = keywords.iter().map(|k| format!("\"{}\"", k)).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn render(template: &str, enumeration: &str, author: &str) -> String {
    template
        .replace("{keywords}", enumeration)
        .replace("{author}", author)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn policy(rule_matching: RuleMatching) -> ResponsePolicy {
        ResponsePolicy::new(
            vec![
                CannedReply {
                    keyword: "earl".to_string(),
                    reply: "Earl reply for {author}: {keywords}".to_string(),
                },
                CannedReply {
                    keyword: "Crabman".to_string(),
                    reply: "Crabman reply".to_string(),
                },
            ],
            keywords(&["anniversary"]),
            "Happy anniversary {author}".to_string(),
            0.9,
            rule_matching,
        )
    }

    #[test]
    fn test_empty_matches_are_ignored() {
        let decision = policy(RuleMatching::Containment).decide(&[], "joy", ItemKind::Post, 0.99);
        assert_eq!(decision, Decision::Ignore);
    }

    #[test]
    fn test_single_canned_keyword_is_deterministic() {
        let p = policy(RuleMatching::Containment);
        for roll in [0.0, 0.5, 0.95] {
            assert_eq!(
                p.decide(&keywords(&["earl"]), "randy", ItemKind::Comment, roll),
                Decision::Reply("Earl reply for randy: \"earl\"".to_string())
            );
        }
    }

    #[test]
    fn test_anniversary_overrides_everything() {
        let p = policy(RuleMatching::Containment);
        let decision = p.decide(
            &keywords(&["earl", "anniversary"]),
            "joy",
            ItemKind::Post,
            0.0,
        );
        assert_eq!(decision, Decision::Reply("Happy anniversary joy".to_string()));
    }

    #[test]
    fn test_list_and_crabman_do_not_trigger_anniversary() {
        let p = policy(RuleMatching::Containment);
        let decision = p.decide(&keywords(&["list", "crabman"]), "joy", ItemKind::Post, 0.0);
        assert_eq!(decision, Decision::Reply("Crabman reply".to_string()));

        let p = policy(RuleMatching::WholeSet);
        let decision = p.decide(&keywords(&["list", "crabman"]), "joy", ItemKind::Post, 0.0);
        assert_eq!(decision, Decision::Ignore);
    }

    #[test]
    fn test_first_declared_canned_rule_wins() {
        let p = policy(RuleMatching::Containment);
        let matches = keywords(&["earl", "crabman"]);
        for roll in [0.0, 0.95] {
            assert_eq!(
                p.decide(&matches, "joy", ItemKind::Comment, roll),
                Decision::Reply("Earl reply for joy: \"earl\" and \"crabman\"".to_string())
            );
        }

        // Declaration order decides, not match order.
        let matches = keywords(&["crabman", "earl"]);
        assert!(matches!(
            p.decide(&matches, "joy", ItemKind::Comment, 0.0),
            Decision::Reply(text) if text.starts_with("Earl reply")
        ));
    }

    #[test]
    fn test_default_rules_reply_to_earl_and_crabman() {
        let p = ResponsePolicy::from_settings(&MonitorSettings::default());
        let matches = keywords(&["earl", "crabman"]);
        for roll in [0.0, 0.95] {
            match p.decide(&matches, "joy", ItemKind::Comment, roll) {
                Decision::Reply(text) => assert!(text.contains("\"earl\" and \"crabman\"")),
                other => panic!("Expected the Earl reply, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_generic_throttle_boundary() {
        let p = policy(RuleMatching::Containment);
        let matches = keywords(&["karma"]);
        assert_eq!(p.decide(&matches, "a", ItemKind::Post, 0.0), Decision::Ignore);
        assert_eq!(p.decide(&matches, "a", ItemKind::Post, 0.899), Decision::Ignore);
        assert_eq!(p.decide(&matches, "a", ItemKind::Post, 0.9), Decision::Upvote);
    }

    #[test]
    fn test_whole_set_only_fires_on_exact_collection() {
        let p = policy(RuleMatching::WholeSet);
        assert!(matches!(
            p.decide(&keywords(&["earl"]), "a", ItemKind::Post, 0.0),
            Decision::Reply(_)
        ));
        assert_eq!(
            p.decide(&keywords(&["earl", "anniversary"]), "a", ItemKind::Post, 0.0),
            Decision::Ignore
        );
    }

    #[test]
    fn test_probability_is_clamped() {
        let p = ResponsePolicy::new(vec![], vec![], String::new(), 3.0, RuleMatching::Containment);
        assert_eq!(p.suppress_probability(), 1.0);
        assert_eq!(
            p.decide_random(&keywords(&["list"]), "a", ItemKind::Post),
            Decision::Ignore
        );
    }

    #[test]
    fn test_enumeration() {
        assert_eq!(enumerate_keywords(&[]), "");
        assert_eq!(enumerate_keywords(&keywords(&["earl"])), "\"earl\"");
        assert_eq!(
            enumerate_keywords(&keywords(&["earl", "randy"])),
            "\"earl\" and \"randy\""
        );
        assert_eq!(
            enumerate_keywords(&keywords(&["earl", "randy", "joy"])),
            "\"earl\", \"randy\" and \"joy\""
        );
    }
}
