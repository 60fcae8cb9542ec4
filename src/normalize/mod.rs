//! Normalizer (C3): deterministic repair of malformed heading structure
//! (spec.md §4.3), applied before a document reaches [`crate::bento`].
//!
//! Line-oriented rather than AST-based — each heuristic only needs to
//! recognize an ATX heading line (`^#{1,6}\s`), which a regex expresses
//! more directly than a round trip through `pulldown_cmark`'s event
//! stream (grounded in the teacher's preference for direct string/regex
//! transforms in `adapter::tag_bridger`-style content scanning over AST
//! rewriting, since pulldown-cmark has no rewriting API).

use once_cell::sync::Lazy;
use regex::Regex;

static ATX_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.*)$").unwrap());
static FRONTMATTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^---\r?\n.*?\r?\n---\r?\n?").unwrap());

pub struct Normalizer;

impl Normalizer {
    /// Apply the Headless, Shouting, and Deep-nesting heuristics in order
    /// (spec.md §4.3). `filename` is used only by the Headless heuristic
    /// to synthesize a Title-Cased `# H1` when none is present.
    pub fn normalize(content: &str, filename: &str) -> String {
        let content = Self::headless(content, filename);
        let content = Self::shouting(&content);
        Self::deep_nesting(&content)
    }

    /// If no `# H1` precedes content (ignoring optional YAML frontmatter),
    /// synthesize one from the Title-Cased filename stem.
    fn headless(content: &str, filename: &str) -> String {
        let (frontmatter, body) = Self::split_frontmatter(content);

        let has_h1 = ATX_HEADING
            .captures_iter(body)
            .any(|cap| cap[1].len() == 1);
        if has_h1 {
            return content.to_string();
        }

        let title = title_case_filename(filename);
        format!("{frontmatter}# {title}\n\n{body}")
    }

    /// Demote every `# H1` after the first to `## H2`.
    fn shouting(content: &str) -> String {
        let (frontmatter, body) = Self::split_frontmatter(content);
        let mut seen_h1 = false;
        let mut out = String::with_capacity(body.len());
        let mut last_end = 0;

        for cap in ATX_HEADING.captures_iter(body) {
            let whole = cap.get(0).unwrap();
            let hashes = &cap[1];
            if hashes.len() == 1 {
                out.push_str(&body[last_end..whole.start()]);
                if seen_h1 {
                    out.push_str("## ");
                    out.push_str(cap[2].trim());
                } else {
                    seen_h1 = true;
                    out.push_str(whole.as_str());
                }
                last_end = whole.end();
            }
        }
        out.push_str(&body[last_end..]);
        format!("{frontmatter}{out}")
    }

    /// Convert `#### … ######` headings to bold inline text.
    fn deep_nesting(content: &str) -> String {
        let (frontmatter, body) = Self::split_frontmatter(content);
        let replaced = ATX_HEADING.replace_all(body, |cap: &regex::Captures| {
            let hashes = &cap[1];
            let text = cap[2].trim();
            if hashes.len() >= 4 {
                format!("**{text}**")
            } else {
                cap[0].to_string()
            }
        });
        format!("{frontmatter}{replaced}")
    }

    fn split_frontmatter(content: &str) -> (&str, &str) {
        match FRONTMATTER.find(content) {
            Some(m) => (&content[..m.end()], &content[m.end()..]),
            None => ("", content),
        }
    }
}

fn title_case_filename(filename: &str) -> String {
    let stem = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".md")
        .trim_end_matches(".markdown");

    stem.split(|c: char| c == '-' || c == '_' || c == ' ')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_synthesizes_h1_from_filename() {
        let out = Normalizer::normalize("Some content with no heading.", "flow-state-notes.md");
        assert!(out.starts_with("# Flow State Notes"));
    }

    #[test]
    fn headless_leaves_content_with_existing_h1_untouched() {
        let out = Normalizer::normalize("# Already Titled\n\nBody.", "whatever.md");
        assert_eq!(out.matches("# Already Titled").count(), 1);
        assert!(!out.contains("# Whatever"));
    }

    #[test]
    fn shouting_demotes_every_h1_after_the_first() {
        let out = Normalizer::normalize(
            "# First\n\nBody one.\n\n# Second\n\nBody two.",
            "doc.md",
        );
        assert!(out.contains("# First"));
        assert!(out.contains("## Second"));
        assert!(!out.contains("\n# Second"));
    }

    #[test]
    fn deep_nesting_converts_to_bold_text() {
        let out = Normalizer::normalize("# Title\n\n##### Deep Heading\n\nBody.", "doc.md");
        assert!(out.contains("**Deep Heading**"));
        assert!(!out.contains("##### Deep Heading"));
    }

    #[test]
    fn frontmatter_is_preserved_and_not_scanned_for_headings() {
        let content = "---\ntitle: Foo\n---\n\nBody with no heading.";
        let out = Normalizer::normalize(content, "doc.md");
        assert!(out.starts_with("---\ntitle: Foo\n---\n"));
        assert!(out.contains("# Doc"));
    }
}
