use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chip counts, bets and pot totals.
pub type Chips = u64;

// --- Card primitives ---

/// Suit. The discriminants are bit flags so a set of suits fits in one byte.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    Club = 1,
    Diamond = 2,
    Heart = 4,
    Spade = 8,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Club, Suit::Diamond, Suit::Heart, Suit::Spade];

    pub fn flag(self) -> u8 {
        self as u8
    }
}

/// Rank, numerically valued 2..=14.
/// Ace is high by default; the hand evaluator also lets it play low in a 5-high straight.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven, Rank::Eight,
        Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King, Rank::Ace,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Rank> {
        Rank::ALL.iter().copied().find(|r| r.value() == value)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }

    /// Numeric value used for sorting and tie-breaking.
    pub fn value(&self) -> u8 {
        self.rank.value()
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Spade => "♠",
            Suit::Heart => "♥",
            Suit::Club => "♣",
            Suit::Diamond => "♦",
        })
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

/// Formats a run of cards as `[A♠] [10♥] ...`.
pub fn cards_to_string(cards: &[Card]) -> String {
    cards.iter().map(|c| format!("[{}]", c)).collect::<Vec<_>>().join(" ")
}

// --- Deck ---

/// A 52-card identity set plus a draw cursor.
///
/// Shuffling permutes the set in place and rewinds the cursor, so a shuffle
/// cycle never duplicates or loses a card.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
    pos: usize,
    rng: StdRng,
}

impl Deck {
    pub const SIZE: usize = 52;

    pub fn new() -> Deck {
        Deck::with_rng(StdRng::from_rng(&mut rand::rng()))
    }

    /// A deck whose shuffles are reproducible.
    pub fn seeded(seed: u64) -> Deck {
        Deck::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Deck {
        let mut cards = Vec::with_capacity(Deck::SIZE);
        for &suit in &Suit::ALL {
            for &rank in &Rank::ALL {
                cards.push(Card { rank, suit });
            }
        }
        Deck { cards, pos: 0, rng }
    }

    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut self.rng);
        self.pos = 0;
    }

    /// Next card of the current shuffle cycle, `None` once all 52 are out.
    pub fn draw(&mut self) -> Option<Card> {
        let card = self.cards.get(self.pos).copied()?;
        self.pos += 1;
        Some(card)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.pos
    }
}

impl Default for Deck {
    fn default() -> Self {
        Deck::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fresh_deck_is_complete() {
        let mut deck = Deck::seeded(1);
        let cards: HashSet<Card> = std::iter::from_fn(|| deck.draw()).collect();
        assert_eq!(cards.len(), 52);
        assert_eq!(deck.remaining(), 0);
        assert_eq!(deck.draw(), None);
    }

    #[test]
    fn test_shuffle_keeps_identity_set() {
        // every cycle of every seed yields the full identity set
        for seed in 0..20 {
            let mut deck = Deck::seeded(seed);
            for _ in 0..3 {
                deck.shuffle();
                assert_eq!(deck.remaining(), 52);
                let mut seen = HashSet::new();
                for _ in 0..52 {
                    let card = deck.draw().expect("deck ran out early");
                    assert!(seen.insert(card), "duplicate card {}", card);
                }
                assert_eq!(deck.draw(), None);
            }
        }
    }

    #[test]
    fn test_shuffle_rewinds_cursor() {
        let mut deck = Deck::seeded(7);
        deck.shuffle();
        for _ in 0..10 {
            deck.draw();
        }
        assert_eq!(deck.remaining(), 42);
        deck.shuffle();
        assert_eq!(deck.remaining(), 52);
    }

    #[test]
    fn test_seeded_shuffles_repeat() {
        let mut a = Deck::seeded(42);
        let mut b = Deck::seeded(42);
        a.shuffle();
        b.shuffle();
        for _ in 0..52 {
            assert_eq!(a.draw(), b.draw());
        }
    }

    #[test]
    fn test_rank_values() {
        assert_eq!(Rank::Two.value(), 2);
        assert_eq!(Rank::Ace.value(), 14);
        assert_eq!(Rank::from_value(11), Some(Rank::Jack));
        assert_eq!(Rank::from_value(1), None);
        assert_eq!(Suit::Heart.flag() | Suit::Club.flag(), 5);
    }

    #[test]
    fn test_card_display() {
        assert_eq!(Card::new(Rank::Ten, Suit::Heart).to_string(), "10♥");
        assert_eq!(
            cards_to_string(&[Card::new(Rank::Ace, Suit::Spade), Card::new(Rank::Two, Suit::Club)]),
            "[A♠] [2♣]"
        );
    }
}
