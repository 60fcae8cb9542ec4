//! Tokenizer (C7): lexicon-aware entity/concept extractor.
//!
//! Greedy longest-match-wins over a vocabulary built from the persona
//! lexicon, confirmed against the original text with a word-boundary
//! regex (spec.md §4.7). The broader NER surface the extracted-entities
//! shape hints at (people/places/organizations/money) is explicitly
//! optional per spec.md §4.7 — only the lexicon-driven path is mandated,
//! so those fields stay empty unless a future auxiliary stage populates
//! them.

use regex::Regex;
use std::collections::HashMap;

/// The tag a lexicon vocabulary entry carries (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexiconTag {
    Protocol,
    Concept,
    Organization,
}

/// One entry of the persona lexicon, as loaded from JSON (spec.md §4.11).
#[derive(Debug, Clone, Default)]
pub struct LexiconEntry {
    pub id: String,
    pub title: Option<String>,
    pub aliases: Vec<String>,
    pub category: Option<String>,
    pub entry_type: Option<String>,
}

/// Entities extracted from one box of text.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExtractedEntities {
    pub people: Vec<String>,
    pub places: Vec<String>,
    pub organizations: Vec<String>,
    pub topics: Vec<String>,
    pub money: Vec<String>,
    pub protocols: Vec<String>,
    pub concepts: Vec<String>,
}

struct VocabEntry {
    tag: LexiconTag,
    pattern: Regex,
}

/// Built once from the persona lexicon (spec.md §4.7) and reused across an
/// ingestion run (spec.md §5: "the lexicon (immutable after Phase 1
/// seeding)").
pub struct Tokenizer {
    // Search keys ordered longest-first so the first confirmed match wins.
    vocabulary: Vec<(String, VocabEntry)>,
}

impl Tokenizer {
    /// `tag` is `Protocol` for `type == "operational-heuristic"`,
    /// `Organization` for `category == "Tool"`, else `Concept`. Each entry
    /// contributes its title, its id, and a hyphen-to-space variant of its
    /// id (spec.md §4.7).
    pub fn from_lexicon(entries: &[LexiconEntry]) -> Self {
        let mut raw: HashMap<String, LexiconTag> = HashMap::new();

        for entry in entries {
            let tag = if entry.entry_type.as_deref() == Some("operational-heuristic") {
                LexiconTag::Protocol
            } else if entry.category.as_deref() == Some("Tool") {
                LexiconTag::Organization
            } else {
                LexiconTag::Concept
            };

            if let Some(title) = &entry.title {
                raw.entry(title.to_lowercase()).or_insert(tag);
            }
            raw.entry(entry.id.to_lowercase()).or_insert(tag);
            raw.entry(entry.id.replace('-', " ").to_lowercase())
                .or_insert(tag);
            for alias in &entry.aliases {
                raw.entry(alias.to_lowercase()).or_insert(tag);
            }
        }

        let mut search_keys: Vec<String> = raw.keys().cloned().collect();
        search_keys.sort_by(|a, b| b.len().cmp(&a.len()));

        let vocabulary = search_keys
            .into_iter()
            .filter(|key| !key.trim().is_empty())
            .filter_map(|key| {
                let tag = *raw.get(&key)?;
                let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&key))).ok()?;
                Some((key, VocabEntry { tag, pattern }))
            })
            .collect();

        Self { vocabulary }
    }

    /// Extract lexicon-aligned entities from `text`. For each vocabulary
    /// key, a lowercase substring match is cheaply checked first; only on
    /// that hit is the word-boundary regex run against the original-cased
    /// text, and the *matched* substring (original casing) is recorded.
    pub fn extract(&self, text: &str) -> ExtractedEntities {
        let lowered = text.to_lowercase();
        let mut out = ExtractedEntities::default();
        // Byte ranges already claimed by a (longer, earlier-processed) key,
        // so a shorter overlapping key never re-claims the same span.
        let mut claimed: Vec<(usize, usize)> = Vec::new();

        for (key, entry) in &self.vocabulary {
            if !lowered.contains(key.as_str()) {
                continue;
            }
            for m in entry.pattern.find_iter(text) {
                let (start, end) = (m.start(), m.end());
                if claimed.iter().any(|(s, e)| start < *e && end > *s) {
                    continue;
                }
                claimed.push((start, end));
                let matched = m.as_str().to_string();
                match entry.tag {
                    LexiconTag::Protocol => out.protocols.push(matched),
                    LexiconTag::Concept => out.concepts.push(matched),
                    LexiconTag::Organization => out.organizations.push(matched),
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> Vec<LexiconEntry> {
        vec![
            LexiconEntry {
                id: "term-flow-state".to_string(),
                title: Some("Flow State".to_string()),
                entry_type: None,
                category: None,
                aliases: vec![],
            },
            LexiconEntry {
                id: "term-after-action-review".to_string(),
                title: Some("After Action Review".to_string()),
                entry_type: Some("operational-heuristic".to_string()),
                category: None,
                aliases: vec![],
            },
            LexiconEntry {
                id: "term-jira".to_string(),
                title: Some("Jira".to_string()),
                entry_type: None,
                category: Some("Tool".to_string()),
                aliases: vec![],
            },
        ]
    }

    #[test]
    fn extracts_a_concept_by_title() {
        let tokenizer = Tokenizer::from_lexicon(&lexicon());
        let result = tokenizer.extract("Getting into Flow State takes practice.");
        assert_eq!(result.concepts, vec!["Flow State".to_string()]);
    }

    #[test]
    fn extracts_a_protocol_from_operational_heuristic_type() {
        let tokenizer = Tokenizer::from_lexicon(&lexicon());
        let result = tokenizer.extract("We ran an After Action Review today.");
        assert_eq!(result.protocols, vec!["After Action Review".to_string()]);
    }

    #[test]
    fn extracts_an_organization_from_tool_category() {
        let tokenizer = Tokenizer::from_lexicon(&lexicon());
        let result = tokenizer.extract("Filed the ticket in Jira.");
        assert_eq!(result.organizations, vec!["Jira".to_string()]);
    }

    #[test]
    fn longest_match_wins_over_a_shorter_overlapping_key() {
        let entries = vec![
            LexiconEntry {
                id: "term-flow".to_string(),
                title: Some("Flow".to_string()),
                entry_type: None,
                category: None,
                aliases: vec![],
            },
            LexiconEntry {
                id: "term-flow-state".to_string(),
                title: Some("Flow State".to_string()),
                entry_type: None,
                category: None,
                aliases: vec![],
            },
        ];
        let tokenizer = Tokenizer::from_lexicon(&entries);
        let result = tokenizer.extract("Flow State is the goal.");
        assert_eq!(result.concepts, vec!["Flow State".to_string()]);
    }

    #[test]
    fn word_boundary_prevents_substring_false_positives() {
        let tokenizer = Tokenizer::from_lexicon(&lexicon());
        let result = tokenizer.extract("Overflow States are not the same thing.");
        assert!(result.concepts.is_empty());
    }
}
