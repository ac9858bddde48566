//! Card decks: presets and the custom deck validator.

use std::collections::HashSet;

use huddle_proto::{Card, CardConfig, CardPreset};

use crate::error::CardError;

/// Longest accepted card value, in characters.
pub const MAX_CARD_LEN: usize = 10;
/// Fewest cards in a custom deck.
pub const MIN_CARDS: usize = 2;
/// Most cards in a custom deck.
pub const MAX_CARDS: usize = 15;

/// "Unsure" card.
pub const UNSURE: &str = "?";
/// "Need a break" card.
pub const COFFEE: &str = "\u{2615}";

/// Presets offered for new rooms, in display order.
pub const PRESETS: [CardPreset; 5] = [
    CardPreset::Fibonacci,
    CardPreset::ModifiedFibonacci,
    CardPreset::TShirt,
    CardPreset::PowersOfTwo,
    CardPreset::Linear,
];

/// Display name of a preset.
pub fn preset_name(preset: CardPreset) -> &'static str {
    match preset {
        CardPreset::Unspecified | CardPreset::Fibonacci => "Fibonacci",
        CardPreset::ModifiedFibonacci => "Modified Fibonacci",
        CardPreset::TShirt => "T-Shirt Sizes",
        CardPreset::PowersOfTwo => "Powers of 2",
        CardPreset::Linear => "Linear",
        CardPreset::Custom => "Custom",
    }
}

/// Cards of a preset. Custom decks have no fixed cards.
pub fn preset_cards(preset: CardPreset) -> Vec<Card> {
    let mut cards: Vec<Card> = match preset {
        CardPreset::Unspecified | CardPreset::Fibonacci => numeric(&[1, 2, 3, 5, 8, 13, 21]),
        CardPreset::ModifiedFibonacci => numeric(&[0, 1, 2, 3, 5, 8, 13, 20, 40, 100]),
        CardPreset::PowersOfTwo => numeric(&[1, 2, 4, 8, 16, 32]),
        CardPreset::Linear => numeric(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
        CardPreset::TShirt => [("XS", 1), ("S", 2), ("M", 3), ("L", 5), ("XL", 8)]
            .into_iter()
            .map(|(value, weight)| Card::new(value, weight, false))
            .collect(),
        CardPreset::Custom => return Vec::new(),
    };
    cards.push(Card::new(UNSURE, 0, false));
    cards.push(Card::new(COFFEE, 0, false));
    cards
}

fn numeric(values: &[i64]) -> Vec<Card> {
    values.iter().map(|v| Card::new(v.to_string(), *v, true)).collect()
}

/// Deck of a preset.
pub fn preset_config(preset: CardPreset) -> CardConfig {
    CardConfig { preset, cards: preset_cards(preset) }
}

/// Deck of user supplied cards.
pub fn custom_config(cards: Vec<Card>) -> CardConfig {
    CardConfig { preset: CardPreset::Custom, cards }
}

/// Deck used when none is chosen.
pub fn default_config() -> CardConfig {
    preset_config(CardPreset::Fibonacci)
}

/// Parse a comma separated custom deck.
///
/// Values are trimmed, blanks skipped and exact duplicates collapsed, keeping
/// first occurrence order. A value is numeric when it starts with an integer
/// and is neither [`UNSURE`] nor [`COFFEE`].
pub fn parse_custom_cards(input: &str) -> Result<Vec<Card>, CardError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CardError::Empty);
    }

    let mut seen = HashSet::new();
    let mut cards = Vec::new();
    for value in input.split(',').map(str::trim).filter(|v| !v.is_empty()) {
        if value.chars().count() > MAX_CARD_LEN {
            return Err(CardError::TooLong(value.to_owned()));
        }
        if !seen.insert(value) {
            continue;
        }

        let card = match leading_integer(value) {
            Some(number) if value != UNSURE && value != COFFEE => Card::new(value, number, true),
            _ => Card::new(value, 0, false),
        };
        cards.push(card);
    }

    if cards.len() < MIN_CARDS {
        return Err(CardError::TooFew);
    }
    if cards.len() > MAX_CARDS {
        return Err(CardError::TooMany);
    }
    Ok(cards)
}

/// Integer prefix of `value`: optional sign followed by at least one digit.
fn leading_integer(value: &str) -> Option<i64> {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let digits = unsigned.len() - unsigned.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }

    let end = value.len() - unsigned.len() + digits;
    let number = value[..end].parse::<i64>().ok()?;
    Some(number)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn values(cards: &[Card]) -> Vec<&str> {
        cards.iter().map(|c| c.value.as_str()).collect()
    }

    #[test]
    fn parses_mixed_deck() {
        let cards = parse_custom_cards("1, 2, 3, 5, 8, ?").unwrap();

        assert_eq!(values(&cards), vec!["1", "2", "3", "5", "8", "?"]);
        assert!(cards[..5].iter().all(|c| c.is_numeric));
        assert_eq!(cards[5], Card::new("?", 0, false));
    }

    #[test]
    fn blank_input_is_rejected() {
        assert_eq!(parse_custom_cards(""), Err(CardError::Empty));
        assert_eq!(parse_custom_cards("   "), Err(CardError::Empty));
        assert_eq!(CardError::Empty.to_string(), "Enter at least 2 card values");
    }

    #[test]
    fn duplicates_collapse() {
        let cards = parse_custom_cards("1,1,2").unwrap();
        assert_eq!(values(&cards), vec!["1", "2"]);
    }

    #[test]
    fn long_value_is_named() {
        let long = "a".repeat(11);
        let err = parse_custom_cards(&long).unwrap_err();

        assert_eq!(err, CardError::TooLong(long.clone()));
        assert_eq!(err.to_string(), format!("Card \"{long}\" is too long (max 10 chars)"));
        assert!(parse_custom_cards(&"a".repeat(10)).is_err_and(|e| e == CardError::TooFew));
    }

    #[test]
    fn length_counts_characters() {
        let cards = parse_custom_cards("☕☕☕☕☕☕☕☕☕☕, 1").unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[test]
    fn bounds_have_distinct_messages() {
        assert_eq!(parse_custom_cards("1"), Err(CardError::TooFew));
        assert_eq!(parse_custom_cards("1, 1, ,"), Err(CardError::TooFew));

        let sixteen: Vec<String> = (1..=16).map(|n| n.to_string()).collect();
        assert_eq!(parse_custom_cards(&sixteen.join(",")), Err(CardError::TooMany));
        assert_eq!(parse_custom_cards(&sixteen[..15].join(",")).unwrap().len(), 15);
    }

    #[test]
    fn numeric_classification() {
        let cards = parse_custom_cards("5pts, -3, XL, ☕, +2").unwrap();

        assert_eq!(cards[0], Card::new("5pts", 5, true));
        assert_eq!(cards[1], Card::new("-3", -3, true));
        assert_eq!(cards[2], Card::new("XL", 0, false));
        assert_eq!(cards[3], Card::new("☕", 0, false));
        assert_eq!(cards[4], Card::new("+2", 2, true));
    }

    #[test]
    fn presets_end_with_special_cards() {
        for preset in PRESETS {
            let cards = preset_cards(preset);
            let tail: Vec<&str> = values(&cards[cards.len() - 2..]);
            assert_eq!(tail, vec![UNSURE, COFFEE], "{}", preset_name(preset));
        }
        assert!(preset_cards(CardPreset::Custom).is_empty());
        assert_eq!(default_config().preset, CardPreset::Fibonacci);
        assert_eq!(default_config().cards.len(), 9);
    }

    proptest! {
        #[test]
        fn parsed_decks_are_distinct_and_bounded(tokens in prop::collection::vec("[0-9a-z?]{1,4}", 0..30)) {
            if let Ok(cards) = parse_custom_cards(&tokens.join(",")) {
                let unique: HashSet<&str> = values(&cards).into_iter().collect();
                prop_assert_eq!(unique.len(), cards.len());
                prop_assert!((MIN_CARDS..=MAX_CARDS).contains(&cards.len()));
            }
        }
    }
}
