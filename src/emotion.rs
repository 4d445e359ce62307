//! Emotion labels and a keyword + lexicon classifier for response text.

use crate::config::EmotionConfig;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of emotions the robot can express
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Confused,
    Excited,
    Thinking,
    Agreement,
    Disagreement,
    Empathy,
    Listening,
    Greeting,
}

impl EmotionLabel {
    /// Every label
    pub const ALL: [Self; 13] = [
        Self::Neutral,
        Self::Happy,
        Self::Sad,
        Self::Angry,
        Self::Surprised,
        Self::Confused,
        Self::Excited,
        Self::Thinking,
        Self::Agreement,
        Self::Disagreement,
        Self::Empathy,
        Self::Listening,
        Self::Greeting,
    ];

    /// Lower-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Confused => "confused",
            Self::Excited => "excited",
            Self::Thinking => "thinking",
            Self::Agreement => "agreement",
            Self::Disagreement => "disagreement",
            Self::Empathy => "empathy",
            Self::Listening => "listening",
            Self::Greeting => "greeting",
        }
    }

    /// Parse a label, mapping anything unrecognized to [`EmotionLabel::Neutral`]
    #[must_use]
    pub fn parse_or_neutral(name: &str) -> Self {
        name.parse().unwrap_or(Self::Neutral)
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a name that is not an [`EmotionLabel`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for EmotionLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == wanted)
            .ok_or(UnknownLabel(wanted))
    }
}

/// Maps text to one emotion label
pub trait EmotionClassifier: Send {
    /// Classify `text`
    fn classify(&mut self, text: &str) -> EmotionLabel;

    /// Counters, for classifiers that keep them
    fn metrics(&self) -> Option<ClassifierMetrics> {
        None
    }
}

/// Classifier counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierMetrics {
    /// Calls to `classify`
    pub total: u64,
    /// Answers served from the cache
    pub cache_hits: u64,
    /// Answers from a keyword pattern
    pub keyword: u64,
    /// Answers from lexicon polarity
    pub fallback: u64,
}

// Checked in order, first match wins
const KEYWORD_PATTERNS: [(&str, EmotionLabel); 9] = [
    (r"\b(hi|hello|hey|greetings)\b", EmotionLabel::Greeting),
    (r"\b(yes|yeah|sure|okay)\b", EmotionLabel::Agreement),
    (r"\b(no|nope|not)\b", EmotionLabel::Disagreement),
    (r"\b(wow|whoa|amazing)\b", EmotionLabel::Surprised),
    (r"\b(what|huh|why)\b", EmotionLabel::Confused),
    (r"\b(sorry|understand|feel)\b", EmotionLabel::Empathy),
    (r"\b(great|awesome|love|good)\b", EmotionLabel::Happy),
    (r"\b(bad|terrible|sad|cry)\b", EmotionLabel::Sad),
    (r"\b(wait|let me see|hmm)\b", EmotionLabel::Thinking),
];

const LEXICON: [(&str, f64); 40] = [
    ("wonderful", 1.0),
    ("excellent", 1.0),
    ("perfect", 1.0),
    ("fantastic", 0.9),
    ("delighted", 0.9),
    ("brilliant", 0.9),
    ("best", 1.0),
    ("beautiful", 0.85),
    ("excited", 0.75),
    ("exciting", 0.75),
    ("happy", 0.8),
    ("glad", 0.5),
    ("fun", 0.3),
    ("nice", 0.6),
    ("pleasant", 0.7),
    ("interesting", 0.5),
    ("cool", 0.35),
    ("fine", 0.4),
    ("thanks", 0.2),
    ("kind", 0.6),
    ("better", 0.5),
    ("lucky", 0.3),
    ("hope", 0.2),
    ("worst", -1.0),
    ("awful", -1.0),
    ("horrible", -1.0),
    ("hate", -0.8),
    ("disgusting", -1.0),
    ("miserable", -1.0),
    ("angry", -0.5),
    ("upset", -0.4),
    ("poor", -0.4),
    ("wrong", -0.5),
    ("difficult", -0.5),
    ("hard", -0.3),
    ("tired", -0.4),
    ("lonely", -0.5),
    ("worried", -0.3),
    ("boring", -1.0),
    ("unfortunately", -0.5),
];

const NEGATIONS: [&str; 4] = ["never", "don't", "isn't", "wasn't"];
const INTENSIFIERS: [&str; 5] = ["very", "really", "so", "extremely", "incredibly"];

/// Mean polarity of the lexicon words in `text`, in `[-1, 1]`
#[must_use]
pub fn lexicon_polarity(text: &str) -> f64 {
    let lexicon: HashMap<&str, f64> = LEXICON.into_iter().collect();
    let words: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut scores = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let Some(&base) = lexicon.get(word.as_str()) else {
            continue;
        };
        let mut score = base;
        let previous = i.checked_sub(1).map(|j| words[j].as_str());
        if previous.is_some_and(|p| INTENSIFIERS.contains(&p)) {
            score *= 1.3;
        }
        if words[i.saturating_sub(2)..i].iter().any(|w| NEGATIONS.contains(&w.as_str())) {
            score *= -0.5;
        }
        scores.push(score.clamp(-1.0, 1.0));
    }

    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Two-tier classifier: ordered keyword patterns, then lexicon polarity
pub struct KeywordSentimentClassifier {
    patterns: Vec<(Regex, EmotionLabel)>,
    config: EmotionConfig,
    cache: HashMap<String, EmotionLabel>,
    metrics: ClassifierMetrics,
}

impl KeywordSentimentClassifier {
    /// Create a classifier with the given thresholds and cache size
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile
    pub fn new(config: EmotionConfig) -> crate::Result<Self> {
        let patterns = KEYWORD_PATTERNS
            .iter()
            .map(|&(pattern, label)| {
                Regex::new(pattern)
                    .map(|re| (re, label))
                    .map_err(|e| crate::Error::ConfigError(format!("Bad keyword pattern {pattern}: {e}")))
            })
            .collect::<crate::Result<Vec<_>>>()?;
        info!("Emotion classifier ready with {} keyword patterns", patterns.len());
        Ok(Self {
            patterns,
            config,
            cache: HashMap::new(),
            metrics: ClassifierMetrics::default(),
        })
    }

    fn label_for_polarity(&self, polarity: f64) -> EmotionLabel {
        let t = &self.config;
        if polarity > t.excited_threshold {
            EmotionLabel::Excited
        } else if polarity > t.happy_threshold {
            EmotionLabel::Happy
        } else if polarity < t.sad_threshold {
            EmotionLabel::Sad
        } else if polarity < t.empathy_threshold {
            EmotionLabel::Empathy
        } else {
            EmotionLabel::Neutral
        }
    }
}

impl EmotionClassifier for KeywordSentimentClassifier {
    fn classify(&mut self, text: &str) -> EmotionLabel {
        let key = text.to_lowercase();
        self.metrics.total += 1;

        if let Some(&label) = self.cache.get(&key) {
            self.metrics.cache_hits += 1;
            return label;
        }

        let label = if let Some(&(_, label)) = self.patterns.iter().find(|(re, _)| re.is_match(&key)) {
            self.metrics.keyword += 1;
            debug!("Emotion (keyword): {label}");
            label
        } else {
            let polarity = lexicon_polarity(text);
            let label = self.label_for_polarity(polarity);
            self.metrics.fallback += 1;
            debug!("Emotion (lexicon): {label} ({polarity:.2})");
            label
        };

        if self.cache.len() >= self.config.cache_capacity {
            self.cache.clear();
        }
        if self.config.cache_capacity > 0 {
            self.cache.insert(key, label);
        }
        label
    }

    fn metrics(&self) -> Option<ClassifierMetrics> {
        Some(self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordSentimentClassifier {
        KeywordSentimentClassifier::new(EmotionConfig::default()).unwrap()
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("Happy".parse::<EmotionLabel>(), Ok(EmotionLabel::Happy));
        assert_eq!(EmotionLabel::parse_or_neutral("mysterious"), EmotionLabel::Neutral);
        for label in EmotionLabel::ALL {
            assert_eq!(label.as_str().parse::<EmotionLabel>(), Ok(label));
        }
    }

    #[test]
    fn test_keywords_in_order() {
        let mut c = classifier();
        assert_eq!(c.classify("Hello there!"), EmotionLabel::Greeting);
        assert_eq!(c.classify("Yes, I can do that"), EmotionLabel::Agreement);
        // "no" comes before "good" in the pattern order
        assert_eq!(c.classify("No, that is not good"), EmotionLabel::Disagreement);
        assert_eq!(c.classify("Wow, look at that"), EmotionLabel::Surprised);
        assert_eq!(c.classify("Hmm, let me see"), EmotionLabel::Thinking);
        assert_eq!(c.metrics().unwrap().keyword, 5);
    }

    #[test]
    fn test_word_boundaries() {
        let mut c = classifier();
        // "think" must not match "hi", "nothing" must not match "no"
        assert_eq!(c.classify("The weather is quite mild"), EmotionLabel::Neutral);
        assert_eq!(c.classify("Nothing much"), EmotionLabel::Neutral);
    }

    #[test]
    fn test_lexicon_fallback_thresholds() {
        let mut c = classifier();
        assert_eq!(c.classify("That sounds wonderful"), EmotionLabel::Excited);
        assert_eq!(c.classify("The view is pleasant and a bit fun"), EmotionLabel::Happy);
        assert_eq!(c.classify("Traffic was horrible today"), EmotionLabel::Sad);
        assert_eq!(c.classify("Those roads are hard"), EmotionLabel::Empathy);
        assert_eq!(c.classify("The train leaves at noon"), EmotionLabel::Neutral);
        assert_eq!(c.metrics().unwrap().fallback, 5);
    }

    #[test]
    fn test_negation_flips_polarity() {
        assert!(lexicon_polarity("it was wonderful") > 0.5);
        assert!(lexicon_polarity("it never was wonderful") < 0.0);
        assert!(lexicon_polarity("really nice") > lexicon_polarity("nice"));
        assert_eq!(lexicon_polarity(""), 0.0);
    }

    #[test]
    fn test_cache_is_instance_scoped() {
        let mut first = classifier();
        assert_eq!(first.classify("That sounds wonderful"), EmotionLabel::Excited);
        assert_eq!(first.classify("THAT SOUNDS WONDERFUL"), EmotionLabel::Excited);
        assert_eq!(first.metrics().unwrap().cache_hits, 1);
        assert_eq!(first.metrics().unwrap().total, 2);

        let mut second = classifier();
        second.classify("That sounds wonderful");
        assert_eq!(second.metrics().unwrap().cache_hits, 0);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = EmotionConfig {
            excited_threshold: 0.95,
            ..EmotionConfig::default()
        };
        let mut c = KeywordSentimentClassifier::new(config).unwrap();
        assert_eq!(c.classify("That sounds pleasant"), EmotionLabel::Happy);
    }
}
