//! Keyword intent rules and first-match classification.
//!
//! Rules are checked in priority order against the lowercased input; a rule
//! matches when the input contains any of its keywords as a substring. The
//! first matching rule wins, and the fallback response covers everything else.

use std::{fs, path::Path};

use serde::Deserialize;

use crate::{errors::Error, Result};

pub const AIR_QUALITY_RESPONSE: &str = "Based on the MongoDB data, current AQI levels show: Major cities averaging 156 AQI (Unhealthy for Sensitive Groups). PM2.5 levels are elevated due to industrial activity and vehicle emissions. Would you like specific city data or pollution trend analysis?";

pub const PUBLIC_HEALTH_RESPONSE: &str = "COVID-19 data analysis from our database: 89% vaccination coverage achieved, with a 15% decrease in active cases this month. Hospital capacity is stable at 67% utilization. Recovery rates have improved to 94.8%. Need specific regional data?";

pub const EDUCATION_RESPONSE: &str = "Education statistics from our database show: Global literacy rate at 78.2% with a 5.4% improvement year-over-year. Digital literacy programs have reached 2.3M students. Gender gap in STEM education has decreased by 12%. Want breakdown by region or age group?";

pub const CRIME_RESPONSE: &str = "Crime statistics analysis: Overall crime rate decreased by 8.3% this year. Property crimes down 12%, violent crimes at historic lows (2.1% of total incidents). Community policing initiatives show 23% improvement in response times. Need specific crime category data?";

pub const TRENDS_RESPONSE: &str = "Current trends across all datasets: AQI improving in 60% of monitored cities, COVID cases stabilizing, literacy rates climbing globally, and crime rates decreasing in urban areas. Cross-correlation analysis shows education investment correlates with crime reduction. Want detailed trend analysis?";

pub const FALLBACK_RESPONSE: &str = "I can provide insights on AQI (Air Quality), COVID statistics, literacy rates, and crime data from our MongoDB database. Try asking about specific metrics, trends, or regional comparisons. What data interests you most?";

/// Opening bot message of a fresh conversation.
pub const GREETING: &str = "Hello! I'm your AI assistant connected to the MongoDB dataset. I can help you analyze AQI, COVID statistics, literacy rates, and crime data. What would you like to know?";

/// A keyword set paired with the response it selects.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IntentRule {
    pub topic: String,
    pub keywords: Vec<String>,
    pub response: String,
}

impl IntentRule {
    pub fn new(topic: &str, keywords: &[&str], response: &str) -> Self {
        Self {
            topic: topic.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            response: response.to_string(),
        }
    }

    /// `normalized` must already be lowercased.
    pub fn matches(&self, normalized: &str) -> bool {
        self.keywords.iter().any(|k| normalized.contains(k.as_str()))
    }
}

/// Result of classifying one utterance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification<'a> {
    /// `None` when the fallback answered.
    pub topic: Option<&'a str>,
    /// Zero-based priority of the matched rule.
    pub priority: Option<usize>,
    pub response: &'a str,
}

impl Classification<'_> {
    pub fn is_fallback(&self) -> bool {
        self.topic.is_none()
    }
}

/// Ordered rules plus the always-matching fallback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<IntentRule>,
    fallback: String,
}

#[derive(Deserialize)]
struct RuleFile {
    rules: Vec<IntentRule>,
    fallback: String,
}

impl RuleSet {
    /// Build a rule set, rejecting rules that could never match or would match
    /// everything.
    pub fn new(rules: Vec<IntentRule>, fallback: impl Into<String>) -> Result<Self> {
        let fallback = fallback.into();
        if fallback.trim().is_empty() {
            return Err(Error::Config("fallback response must not be blank".to_string()));
        }

        let mut normalized = Vec::with_capacity(rules.len());
        for (idx, rule) in rules.into_iter().enumerate() {
            if rule.topic.trim().is_empty() {
                return Err(Error::Config(format!("rule #{} has a blank topic", idx + 1)));
            }
            if rule.keywords.is_empty() {
                return Err(Error::Config(format!(
                    "rule `{}` has no keywords",
                    rule.topic
                )));
            }
            // A blank keyword is a substring of every input and would shadow
            // all lower-priority rules.
            if rule.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "rule `{}` has a blank keyword",
                    rule.topic
                )));
            }
            if rule.response.trim().is_empty() {
                return Err(Error::Config(format!(
                    "rule `{}` has a blank response",
                    rule.topic
                )));
            }

            normalized.push(IntentRule {
                keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
                ..rule
            });
        }

        Ok(Self {
            rules: normalized,
            fallback,
        })
    }

    /// Air quality, public health, education, crime, trends; in that order.
    pub fn canonical() -> Self {
        Self {
            rules: vec![
                IntentRule::new("air_quality", &["aqi", "air quality"], AIR_QUALITY_RESPONSE),
                IntentRule::new(
                    "public_health",
                    &["covid", "coronavirus"],
                    PUBLIC_HEALTH_RESPONSE,
                ),
                IntentRule::new("education", &["literacy", "education"], EDUCATION_RESPONSE),
                IntentRule::new("crime", &["crime", "safety"], CRIME_RESPONSE),
                IntentRule::new("trends", &["trends", "analysis"], TRENDS_RESPONSE),
            ],
            fallback: FALLBACK_RESPONSE.to_string(),
        }
    }

    /// Parse a rule file of the form
    /// `{"rules": [{"topic", "keywords", "response"}], "fallback": "..."}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(json)?;
        Self::new(file.rules, file.fallback)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn classify(&self, input: &str) -> Classification<'_> {
        let normalized = input.to_lowercase();
        match self
            .rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(&normalized))
        {
            Some((priority, rule)) => Classification {
                topic: Some(rule.topic.as_str()),
                priority: Some(priority),
                response: rule.response.as_str(),
            },
            None => Classification {
                topic: None,
                priority: None,
                response: self.fallback.as_str(),
            },
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_topic_keyword_selects_its_response() {
        let rules = RuleSet::canonical();
        for (input, expected) in [
            ("How is the air quality today?", AIR_QUALITY_RESPONSE),
            ("coronavirus numbers please", PUBLIC_HEALTH_RESPONSE),
            ("education spending", EDUCATION_RESPONSE),
            ("is the city safety improving", CRIME_RESPONSE),
            ("show me the trends", TRENDS_RESPONSE),
        ] {
            assert_eq!(rules.classify(input).response, expected, "input: {input}");
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        let rules = RuleSet::canonical();
        for input in ["AQI", "aqi", "Aqi", "What's the current AQI?", "AIR Quality"] {
            let c = rules.classify(input);
            assert_eq!(c.topic, Some("air_quality"), "input: {input}");
            assert_eq!(c.priority, Some(0));
        }
    }

    #[test]
    fn higher_priority_rule_wins_when_several_match() {
        let rules = RuleSet::canonical();
        assert_eq!(rules.classify("covid and crime").response, PUBLIC_HEALTH_RESPONSE);
        assert_eq!(rules.classify("crime vs COVID").response, PUBLIC_HEALTH_RESPONSE);
        assert_eq!(rules.classify("literacy analysis").response, EDUCATION_RESPONSE);
        assert_eq!(rules.classify("aqi trends").response, AIR_QUALITY_RESPONSE);
    }

    #[test]
    fn substring_containment_not_word_match() {
        let rules = RuleSet::canonical();
        // "aqis" and "analysis," still contain the keywords.
        assert_eq!(rules.classify("aqis").topic, Some("air_quality"));
        assert_eq!(rules.classify("deep-analysis,please").topic, Some("trends"));
    }

    #[test]
    fn unmatched_input_falls_back() {
        let rules = RuleSet::canonical();
        for input in ["hello", "HELLO", "what can you do?", "air-quality"] {
            let c = rules.classify(input);
            assert!(c.is_fallback(), "input: {input}");
            assert_eq!(c.response, FALLBACK_RESPONSE);
            assert_eq!(c.response, rules.fallback());
        }
    }

    #[test]
    fn rule_file_parses_and_keeps_order() {
        let json = r#"{
          "rules": [
            {"topic": "weather", "keywords": ["Rain", "sun"], "response": "Sunny with rain."},
            {"topic": "rain_only", "keywords": ["rain"], "response": "never reached"}
          ],
          "fallback": "Ask about weather."
        }"#;
        let rules = RuleSet::from_json_str(json).unwrap();
        assert_eq!(rules.rules().len(), 2);
        assert_eq!(rules.rules()[0].keywords, vec!["rain", "sun"]);
        assert_eq!(rules.classify("RAIN tomorrow?").response, "Sunny with rain.");
        assert_eq!(rules.classify("snow?").response, "Ask about weather.");
    }

    #[test]
    fn rule_file_rejects_rules_that_would_shadow_everything() {
        let blank_keyword = r#"{
          "rules": [{"topic": "x", "keywords": [" "], "response": "r"}],
          "fallback": "f"
        }"#;
        assert!(matches!(
            RuleSet::from_json_str(blank_keyword),
            Err(Error::Config(_))
        ));

        let no_keywords = r#"{
          "rules": [{"topic": "x", "keywords": [], "response": "r"}],
          "fallback": "f"
        }"#;
        assert!(matches!(
            RuleSet::from_json_str(no_keywords),
            Err(Error::Config(_))
        ));

        let blank_fallback = r#"{"rules": [], "fallback": ""}"#;
        assert!(matches!(
            RuleSet::from_json_str(blank_fallback),
            Err(Error::Config(_))
        ));

        assert!(matches!(
            RuleSet::from_json_str("{not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn load_reads_rule_file_from_disk() {
        let path = std::env::temp_dir().join(format!("datachat-rules-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"rules": [{"topic": "t", "keywords": ["ping"], "response": "pong"}], "fallback": "?"}"#,
        )
        .unwrap();

        let rules = RuleSet::load(&path).unwrap();
        assert_eq!(rules.classify("Ping!").response, "pong");
        let _ = std::fs::remove_file(&path);

        assert!(matches!(RuleSet::load(&path), Err(Error::Io(_))));
    }
}
