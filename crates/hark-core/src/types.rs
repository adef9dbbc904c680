use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarkError;

/// The decoder search that is currently active.
///
/// The listener manages exactly two named searches: `"keyword"` (wake-phrase
/// spotting) and `"grammar"` (command recognition). The session state machine
/// is the sole mutator of the active search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Passive listening for the wake phrase.
    Keyword,
    /// Command recognition against the loaded grammar.
    Grammar,
}

impl SearchMode {
    /// Returns the decoder-facing search name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Grammar => "grammar",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = HarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(SearchMode::Keyword),
            "grammar" => Ok(SearchMode::Grammar),
            other => Err(HarkError::Decoder(format!(
                "Unknown search mode: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_mode_as_str() {
        assert_eq!(SearchMode::Keyword.as_str(), "keyword");
        assert_eq!(SearchMode::Grammar.as_str(), "grammar");
    }

    #[test]
    fn test_search_mode_display() {
        assert_eq!(SearchMode::Keyword.to_string(), "keyword");
        assert_eq!(SearchMode::Grammar.to_string(), "grammar");
    }

    #[test]
    fn test_search_mode_round_trip() {
        for mode in [SearchMode::Keyword, SearchMode::Grammar] {
            let parsed: SearchMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_search_mode_from_str_rejects_unknown() {
        let result: Result<SearchMode, _> = "ngram".parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_search_mode_serde_round_trip() {
        let json = serde_json::to_string(&SearchMode::Grammar).unwrap();
        assert_eq!(json, "\"grammar\"");
        let back: SearchMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SearchMode::Grammar);
    }
}
