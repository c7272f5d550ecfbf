//! Fuzzy name resolution: maps human device phrases ("kitchen lights",
//! "kitchen above cabinet light") onto candidate entities.
//!
//! Matching contract: an entity is a candidate iff every filter token occurs
//! as a substring of the normalized concatenation of its friendly name and
//! entity id. Short filters (under three words) express room-level intent and
//! return every match; longer filters express device-level intent and return
//! the single best match.

use super::EntityState;

const STOP_WORDS: &[&str] = &["and", "or", "the"];

/// Lowercase, underscores to spaces, punctuation stripped, whitespace
/// collapsed, trailing plural `s` removed ("lamps" matches "lamp").
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_alphanumeric() || ch.is_whitespace() {
            out.extend(ch.to_lowercase());
        }
    }
    let mut collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() > 3 && collapsed.ends_with('s') {
        collapsed.pop();
    }
    collapsed
}

/// Tokens the matcher actually tests: normalized words minus connective
/// stop-words and bare numbers.
pub fn filter_tokens(filter: &str) -> Vec<String> {
    normalize(filter)
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(word) && !word.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Word count of the normalized filter, before stop-word removal. Drives the
/// room-level vs device-level policy split.
pub fn word_count(filter: &str) -> usize {
    normalize(filter).split_whitespace().count()
}

fn haystack(entity: &EntityState) -> String {
    format!(
        "{} {}",
        normalize(entity.friendly_name()),
        normalize(&entity.entity_id)
    )
}

/// Candidate test: every token must appear somewhere in the entity's
/// normalized name material. Adding tokens can only shrink the match set.
pub fn matches(tokens: &[String], entity: &EntityState) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let haystack = haystack(entity);
    tokens.iter().all(|token| haystack.contains(token.as_str()))
}

/// Score for best-single-match selection: the number of filter tokens that
/// appear as exact words of the friendly name.
fn exact_token_score(tokens: &[String], entity: &EntityState) -> usize {
    let name = normalize(entity.friendly_name());
    let words: Vec<&str> = name.split_whitespace().collect();
    tokens
        .iter()
        .filter(|token| words.contains(&token.as_str()))
        .count()
}

/// Resolve a filter against a candidate list.
///
/// Filters of three or more words select the single best match (highest
/// exact-token score, ties broken by shorter entity id); shorter filters
/// return every match.
pub fn resolve<'a>(filter: &str, candidates: &'a [EntityState]) -> Vec<&'a EntityState> {
    let tokens = filter_tokens(filter);
    let matching: Vec<&EntityState> = candidates
        .iter()
        .filter(|entity| matches(&tokens, entity))
        .collect();

    if matching.len() <= 1 || word_count(filter) < 3 {
        return matching;
    }

    let best = matching.iter().copied().max_by(|a, b| {
        exact_token_score(&tokens, a)
            .cmp(&exact_token_score(&tokens, b))
            .then(b.entity_id.len().cmp(&a.entity_id.len()))
    });
    best.map(|entity| vec![entity]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(entity_id: &str, friendly: &str) -> EntityState {
        let mut attributes = serde_json::Map::new();
        attributes.insert("friendly_name".to_string(), json!(friendly));
        EntityState {
            entity_id: entity_id.to_string(),
            state: "off".to_string(),
            attributes,
            last_changed: None,
            last_updated: None,
        }
    }

    fn kitchen() -> Vec<EntityState> {
        vec![
            entity("light.kitchen_ceiling", "Kitchen Ceiling"),
            entity("light.kitchen_island", "Kitchen Island"),
            entity("light.kitchen_cabinet", "Kitchen Above Cabinet Light"),
            entity("light.bedroom", "Bedroom Lamp"),
        ]
    }

    #[test]
    fn normalize_strips_punctuation_and_plural() {
        assert_eq!(normalize("Kitchen Lights!"), "kitchen light");
        assert_eq!(normalize("living_room_lamp"), "living room lamp");
        assert_eq!(normalize("  many   spaces  "), "many space");
    }

    #[test]
    fn normalize_keeps_short_words_whole() {
        // "gas" is length 3, the plural strip must not touch it
        assert_eq!(normalize("gas"), "gas");
    }

    #[test]
    fn short_filter_returns_all_room_matches() {
        let candidates = kitchen();
        let matched = resolve("kitchen", &candidates);
        assert_eq!(matched.len(), 3);
        assert!(matched.iter().all(|e| e.entity_id.starts_with("light.kitchen")));
    }

    #[test]
    fn two_word_filter_still_room_level() {
        let candidates = kitchen();
        let matched = resolve("kitchen lights", &candidates);
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn long_filter_selects_single_best() {
        let candidates = kitchen();
        let matched = resolve("kitchen above cabinet light", &candidates);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].entity_id, "light.kitchen_cabinet");
    }

    #[test]
    fn adding_tokens_never_widens_the_match_set() {
        let candidates = kitchen();
        let broad = resolve("kitchen", &candidates).len();
        let narrower = resolve("kitchen island", &candidates).len();
        let narrowest = resolve("kitchen island light fixture", &candidates).len();
        assert!(narrower <= broad);
        assert!(narrowest <= narrower);
    }

    #[test]
    fn stop_words_and_numbers_are_ignored_for_matching() {
        let candidates = kitchen();
        assert_eq!(
            filter_tokens("the kitchen and the island 2"),
            vec!["kitchen", "island"]
        );
        let matched = resolve("the island", &candidates);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].entity_id, "light.kitchen_island");
    }

    #[test]
    fn no_tokens_matches_nothing() {
        let candidates = kitchen();
        assert!(resolve("the and or", &candidates).is_empty());
    }

    #[test]
    fn filter_matches_against_entity_id_too() {
        let candidates = vec![entity("switch.coffee_maker", "Coffee")];
        let matched = resolve("coffee maker", &candidates);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn tie_breaks_on_shorter_entity_id() {
        let candidates = vec![
            entity("light.office_desk_extended", "Office Desk Light"),
            entity("light.office_desk", "Office Desk Light"),
        ];
        let matched = resolve("the office desk light", &candidates);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].entity_id, "light.office_desk");
    }
}
