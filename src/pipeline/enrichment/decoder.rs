//! Entity span decoder: BIO-tagged tokens → grouped entity strings.
//!
//! Tags are either `O` or `<prefix>-<category>`. Prefix is the text before the
//! first `-`, category the text after the last one. A span closes when a `B`
//! tag arrives with tokens pending, or when an `I` tag switches category.

use super::types::{EntityCategory, EntityLists, TaggedToken, OUTSIDE_TAG};

/// Decode one text's prediction into per-category entity spans.
///
/// Single pass over the tokens. Spans whose category is not one of the
/// tracked [`EntityCategory`] values are dropped.
pub fn decode_entities(tokens: &[TaggedToken]) -> EntityLists {
    let mut lists = EntityLists::default();
    let mut accumulated: Vec<String> = Vec::new();
    let mut current_category = "";

    for item in tokens.iter().filter(|t| t.tag != OUTSIDE_TAG) {
        let (prefix, category) = split_tag(&item.tag);

        let closes_span = match prefix {
            "B" => !accumulated.is_empty(),
            // Category change inside an I-run starts a new span even without B.
            "I" => category != current_category,
            _ => false,
        };
        if closes_span {
            flush(&mut lists, current_category, &mut accumulated);
        }

        current_category = category;
        accumulated.push(item.token.replace(';', " "));
    }

    flush(&mut lists, current_category, &mut accumulated);
    lists
}

fn split_tag(tag: &str) -> (&str, &str) {
    let prefix = tag.split_once('-').map_or(tag, |(p, _)| p);
    let category = tag.rsplit_once('-').map_or(tag, |(_, c)| c);
    (prefix, category)
}

fn flush(lists: &mut EntityLists, category: &str, accumulated: &mut Vec<String>) {
    if accumulated.is_empty() {
        return;
    }
    let span = accumulated.join(" ");
    accumulated.clear();
    if let Some(category) = EntityCategory::from_str(category) {
        lists.push(category, span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(pairs: &[(&str, &str)]) -> Vec<TaggedToken> {
        pairs
            .iter()
            .map(|(tag, token)| TaggedToken::new(token, tag))
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_lists() {
        let lists = decode_entities(&[]);
        assert_eq!(lists, EntityLists::default());
    }

    #[test]
    fn all_outside_tags_yield_empty_lists() {
        let lists = decode_entities(&tokens(&[("O", "The"), ("O", "cat"), ("O", "sat")]));
        assert!(lists.is_empty());
    }

    #[test]
    fn person_and_org_are_grouped() {
        let lists = decode_entities(&tokens(&[
            ("B-per", "John"),
            ("I-per", "Smith"),
            ("O", "said"),
            ("B-org", "Acme"),
        ]));
        assert_eq!(lists.per, vec!["John Smith"]);
        assert_eq!(lists.org, vec!["Acme"]);
        assert!(lists.geo.is_empty());
        assert!(lists.gpe.is_empty());
    }

    #[test]
    fn repeated_begin_tags_are_not_merged() {
        let lists = decode_entities(&tokens(&[("B-org", "Foo"), ("B-org", "Bar")]));
        assert_eq!(lists.org, vec!["Foo", "Bar"]);
    }

    #[test]
    fn semicolons_in_tokens_become_spaces() {
        let lists = decode_entities(&tokens(&[("B-per", "A;B")]));
        assert_eq!(lists.per, vec!["A B"]);
    }

    #[test]
    fn inside_run_without_begin_is_one_span() {
        let lists = decode_entities(&tokens(&[("I-geo", "New"), ("I-geo", "York")]));
        assert_eq!(lists.geo, vec!["New York"]);
    }

    #[test]
    fn inside_category_switch_starts_new_span() {
        let lists = decode_entities(&tokens(&[
            ("B-per", "Angela"),
            ("I-per", "Merkel"),
            ("I-geo", "Berlin"),
        ]));
        assert_eq!(lists.per, vec!["Angela Merkel"]);
        assert_eq!(lists.geo, vec!["Berlin"]);
    }

    #[test]
    fn outside_token_does_not_break_a_span() {
        // `O` tokens are discarded before grouping, so I-tokens on either side join.
        let lists = decode_entities(&tokens(&[
            ("B-org", "United"),
            ("O", "the"),
            ("I-org", "Nations"),
        ]));
        assert_eq!(lists.org, vec!["United Nations"]);
    }

    #[test]
    fn untracked_categories_are_dropped() {
        let lists = decode_entities(&tokens(&[
            ("B-tim", "Monday"),
            ("B-gpe", "French"),
            ("B-art", "Mona"),
            ("I-art", "Lisa"),
        ]));
        assert_eq!(lists.gpe, vec!["French"]);
        assert!(lists.org.is_empty());
        assert!(lists.per.is_empty());
        assert!(lists.geo.is_empty());
    }

    #[test]
    fn begin_after_untracked_run_keeps_following_span() {
        let lists = decode_entities(&tokens(&[
            ("B-tim", "Tuesday"),
            ("I-tim", "morning"),
            ("B-geo", "Iraq"),
        ]));
        assert_eq!(lists.geo, vec!["Iraq"]);
    }

    #[test]
    fn category_is_text_after_last_dash() {
        let lists = decode_entities(&tokens(&[("B-x-per", "Ann")]));
        assert_eq!(lists.per, vec!["Ann"]);
    }

    #[test]
    fn split_tag_without_dash_uses_whole_tag() {
        assert_eq!(split_tag("per"), ("per", "per"));
        assert_eq!(split_tag("B-geo"), ("B", "geo"));
    }
}
