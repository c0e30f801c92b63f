//! Text cleanup applied to titles and descriptions before tagging.
//! Drops @-mentions and decodes the few HTML numeric entities the news feed leaks.

use std::sync::LazyLock;

use regex::Regex;

use super::error::EnrichmentError;
use super::traits::TextNormalizer;

/// `@handle` up to the last whitespace on the line.
static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@.*\s").unwrap());

/// Numeric entities and their replacements, applied in order.
const ENTITY_REPLACEMENTS: &[(&str, &str)] = &[
    ("&#8217;", "'"),
    ("&#8220;", " \" "),
    ("&#8221;", " \" "),
    ("&#8230;", " ... "),
];

/// Clean a raw news string for the tagger.
pub fn clean_text(text: &str) -> String {
    let mut cleaned = MENTION.replace_all(text, "").into_owned();
    for (entity, replacement) in ENTITY_REPLACEMENTS {
        cleaned = cleaned.replace(entity, replacement);
    }
    cleaned
}

/// Default normalizer backed by [`clean_text`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NewsTextNormalizer;

impl TextNormalizer for NewsTextNormalizer {
    fn normalize(&self, text: &str) -> Result<String, EnrichmentError> {
        Ok(clean_text(text))
    }
}
