//! JSON artifact shapes for Phase 1 persona ingestion (spec.md §4.11).

use serde::Deserialize;

/// One lexicon entry (spec.md §4.7 vocabulary source).
#[derive(Debug, Clone, Deserialize)]
pub struct LexiconEntryJson {
    pub id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
}

/// A validated relationship carried by an enriched directive entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectiveRelationshipJson {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub target: String,
}

/// One enriched-directive entry (spec.md §4.11).
#[derive(Debug, Clone, Deserialize)]
pub struct DirectiveEntryJson {
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub relationships: Vec<DirectiveRelationshipJson>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicon_entry_deserializes_from_json() {
        let json = r#"{"id":"term-flow-state","title":"Flow State","aliases":["flow"],"category":"Concept","type":"concept"}"#;
        let entry: LexiconEntryJson = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "term-flow-state");
        assert_eq!(entry.aliases.unwrap(), vec!["flow".to_string()]);
    }

    #[test]
    fn directive_entry_deserializes_with_relationships() {
        let json = r#"{"id":"dir-1","title":"Do the thing","relationships":[{"type":"requires","target":"term-flow-state"}]}"#;
        let entry: DirectiveEntryJson = serde_json::from_str(json).unwrap();
        assert_eq!(entry.relationships.len(), 1);
        assert_eq!(entry.relationships[0].rel_type, "requires");
    }
}
