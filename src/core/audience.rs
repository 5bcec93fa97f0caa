//! Audience classification for incoming chat lines.
//!
//! Each line is tested against an ordered rule list loaded from
//! `audiences.toml`. The first rule whose pattern for the line's channel
//! matches decides the category, so rule order is significant. Lines that
//! match nothing are informational.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::AudienceRule;
use crate::text::FormattedLine;

/// How a line reached us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    /// Normal one-shot chat line
    Foreground,
    /// Line recovered from inside a screen dump, with degraded styling
    Background,
}

/// Who a chat line was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceCategory {
    Info,
    Client,
    Npc,
    GameMessage,
    Shout,
    Pets,
    Private,
    Party,
    Guild,
    Global,
    Local,
}

impl AudienceCategory {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Info => "info",
            Self::Client => "client",
            Self::Npc => "npc",
            Self::GameMessage => "game",
            Self::Shout => "shout",
            Self::Pets => "pets",
            Self::Private => "private",
            Self::Party => "party",
            Self::Guild => "guild",
            Self::Global => "global",
            Self::Local => "local",
        }
    }
}

enum Matcher {
    Regex(Regex),
    Literals(AhoCorasick), // fast_parse rules, matched against plain text
}

impl Matcher {
    fn is_match(&self, line: &FormattedLine) -> bool {
        match self {
            Matcher::Regex(regex) => line.find(regex),
            Matcher::Literals(ac) => ac.is_match(line.plain().as_str()),
        }
    }
}

struct CompiledRule {
    category: AudienceCategory,
    foreground: Option<Matcher>,
    background: Option<Matcher>,
}

pub struct AudienceClassifier {
    rules: Vec<CompiledRule>,
}

impl AudienceClassifier {
    /// Compile the rule list. Disabled rules are dropped; invalid patterns are
    /// logged and skipped without disturbing the order of the remaining rules.
    pub fn new(rules: &[AudienceRule]) -> Self {
        let compiled = rules
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| CompiledRule {
                category: rule.category,
                foreground: rule
                    .foreground
                    .as_deref()
                    .and_then(|p| compile_matcher(rule.category, p, rule.fast_parse)),
                background: rule
                    .background
                    .as_deref()
                    .and_then(|p| compile_matcher(rule.category, p, rule.fast_parse)),
            })
            .collect();

        Self { rules: compiled }
    }

    /// Classify a line. Never fails: no match means `Info`.
    pub fn classify(&self, line: &FormattedLine, channel: MessageChannel) -> AudienceCategory {
        self.rules
            .iter()
            .find(|rule| {
                let matcher = match channel {
                    MessageChannel::Foreground => rule.foreground.as_ref(),
                    MessageChannel::Background => rule.background.as_ref(),
                };
                matcher.is_some_and(|m| m.is_match(line))
            })
            .map(|rule| rule.category)
            .unwrap_or(AudienceCategory::Info)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile_matcher(category: AudienceCategory, pattern: &str, fast_parse: bool) -> Option<Matcher> {
    if fast_parse {
        // Split pattern on | and match each literal
        let literals: Vec<&str> = pattern
            .split('|')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if literals.is_empty() {
            tracing::warn!("Audience rule '{}' has an empty literal list", category.display_name());
            return None;
        }
        return match AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .build(&literals)
        {
            Ok(ac) => Some(Matcher::Literals(ac)),
            Err(e) => {
                tracing::warn!(
                    "Failed to build literal matcher for audience '{}': {}",
                    category.display_name(),
                    e
                );
                None
            }
        };
    }

    match Regex::new(pattern) {
        Ok(regex) => Some(Matcher::Regex(regex)),
        Err(e) => {
            tracing::warn!(
                "Invalid audience pattern for '{}': {}",
                category.display_name(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn rule(category: AudienceCategory, fg: Option<&str>, bg: Option<&str>) -> AudienceRule {
        AudienceRule {
            category,
            foreground: fg.map(String::from),
            background: bg.map(String::from),
            fast_parse: false,
            enabled: true,
        }
    }

    #[test]
    fn test_unmatched_line_is_info() {
        let classifier = AudienceClassifier::new(&[rule(AudienceCategory::Party, Some("^party"), None)]);
        let line = FormattedLine::new("You feel refreshed.");
        assert_eq!(
            classifier.classify(&line, MessageChannel::Foreground),
            AudienceCategory::Info
        );
    }

    #[test]
    fn test_first_match_wins() {
        let classifier = AudienceClassifier::new(&[
            rule(AudienceCategory::Guild, Some("^§3"), None),
            rule(AudienceCategory::Local, Some("^§3Bob"), None),
        ]);
        let line = FormattedLine::new("§3Bob: hi");
        assert_eq!(
            classifier.classify(&line, MessageChannel::Foreground),
            AudienceCategory::Guild
        );
    }

    #[test]
    fn test_channel_selects_pattern() {
        let classifier = AudienceClassifier::new(&[rule(
            AudienceCategory::Party,
            Some("^§e"),
            Some("^§8"),
        )]);
        let background = FormattedLine::new("§8Ann: hello");
        assert_eq!(
            classifier.classify(&background, MessageChannel::Background),
            AudienceCategory::Party
        );
        assert_eq!(
            classifier.classify(&background, MessageChannel::Foreground),
            AudienceCategory::Info
        );
    }

    #[test]
    fn test_invalid_and_disabled_rules_skipped() {
        let mut disabled = rule(AudienceCategory::Shout, Some("."), None);
        disabled.enabled = false;
        let classifier = AudienceClassifier::new(&[
            rule(AudienceCategory::Guild, Some("(unclosed"), None),
            disabled,
            rule(AudienceCategory::Local, Some("hi"), None),
        ]);
        assert_eq!(classifier.len(), 2);
        assert_eq!(
            classifier.classify(&FormattedLine::new("hi"), MessageChannel::Foreground),
            AudienceCategory::Local
        );
    }

    #[test]
    fn test_fast_parse_matches_plain_text() {
        let mut pets = rule(AudienceCategory::Pets, Some("[Pet] | [Mount]"), None);
        pets.fast_parse = true;
        let classifier = AudienceClassifier::new(&[pets]);
        assert_eq!(
            classifier.classify(&FormattedLine::new("§2[Mount] Dusty neighs"), MessageChannel::Foreground),
            AudienceCategory::Pets
        );
        // Codes split the literal, so only the plain text can match it
        let line = FormattedLine::new("§2[§aPet§2] Rex: woof");
        assert_eq!(
            classifier.classify(&line, MessageChannel::Foreground),
            AudienceCategory::Pets
        );
    }

    #[test]
    fn test_default_rules() {
        let classifier = AudienceClassifier::new(&Config::default_audiences());
        let npc = FormattedLine::new("§7[1/3] §2Guard: §aHalt, traveler!");
        assert_eq!(
            classifier.classify(&npc, MessageChannel::Foreground),
            AudienceCategory::Npc
        );
        let party = FormattedLine::new("§7[§eAnn§7] §fready?");
        assert_eq!(
            classifier.classify(&party, MessageChannel::Foreground),
            AudienceCategory::Party
        );
        let guild = FormattedLine::new("§3[★★§bBob§3] §bwar at 8");
        assert_eq!(
            classifier.classify(&guild, MessageChannel::Foreground),
            AudienceCategory::Guild
        );
        let faded_npc = FormattedLine::new("§8[2/3] §7Guard: §7Move along.");
        assert_eq!(
            classifier.classify(&faded_npc, MessageChannel::Background),
            AudienceCategory::Npc
        );
    }
}
