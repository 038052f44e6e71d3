use crate::card::{Card, Suit};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hand categories, weakest first, so `Ord` ranks them directly.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum HandRank {
    HighCard = 1,
    Pair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            HandRank::HighCard => "high card",
            HandRank::Pair => "pair",
            HandRank::TwoPair => "two pair",
            HandRank::ThreeOfAKind => "three of a kind",
            HandRank::Straight => "straight",
            HandRank::Flush => "flush",
            HandRank::FullHouse => "full house",
            HandRank::FourOfAKind => "four of a kind",
            HandRank::StraightFlush => "straight flush",
            HandRank::RoyalFlush => "royal flush",
        })
    }
}

/// The best five cards a player holds, plus their category.
///
/// Cards are laid out so that index 4 carries the most weight and index 0 the
/// least, which is the order tie-breaking walks:
///
/// | rank            | layout                          |
/// |-----------------|---------------------------------|
/// | high card/flush | ascending                       |
/// | pair            | `[k, k, k, P, P]`               |
/// | two pair        | `[k, L, L, H, H]`               |
/// | three of a kind | `[k, k, T, T, T]`               |
/// | straight (flush)| ascending, wheel is `[A,2,3,4,5]` |
/// | full house      | `[P, P, T, T, T]`               |
/// | four of a kind  | `[k, Q, Q, Q, Q]`               |
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Hand {
    pub rank: HandRank,
    pub cards: [Card; 5],
}

impl Hand {
    /// Same category and the same value at every position.
    pub fn ties_with(&self, other: &Hand) -> bool {
        self.rank == other.rank
            && self.cards.iter().zip(other.cards.iter()).all(|(a, b)| a.value() == b.value())
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.rank, crate::card::cards_to_string(&self.cards))
    }
}

/// Computes the best five-card hand from two hole cards and the shared cards.
///
/// Returns `None` while fewer than three community cards are out (or fewer
/// than five cards in total), since no five-card hand exists yet.
pub fn assemble_best_hand(hole: &[Card], community: &[Card]) -> Option<Hand> {
    if community.len() < 3 || hole.len() + community.len() < 5 {
        return None;
    }

    let mut cards: Vec<Card> = hole.iter().chain(community.iter()).copied().collect();
    cards.sort_by_key(|c| (c.value(), c.suit));

    // ascending runs of equal value
    let mut groups: Vec<Vec<Card>> = Vec::new();
    for card in &cards {
        match groups.last_mut() {
            Some(group) if group[0].value() == card.value() => group.push(*card),
            _ => groups.push(vec![*card]),
        }
    }

    let flush = flush_cards(&cards);

    if let Some(suited) = &flush {
        if let Some(run) = highest_straight(suited) {
            let rank = if run[4].value() == 14 && run[0].value() == 10 {
                HandRank::RoyalFlush
            } else {
                HandRank::StraightFlush
            };
            return Some(Hand { rank, cards: run });
        }
    }

    let has_matches = groups.iter().any(|g| g.len() > 1);

    if !has_matches {
        let straight = highest_straight(&cards);
        if let Some(suited) = &flush {
            return Some(Hand { rank: HandRank::Flush, cards: top_five(suited) });
        }
        if let Some(run) = straight {
            return Some(Hand { rank: HandRank::Straight, cards: run });
        }
        return Some(Hand { rank: HandRank::HighCard, cards: top_five(&cards) });
    }

    if let Some(quads) = groups.iter().rev().find(|g| g.len() == 4) {
        let kicker = kickers(&cards, &[quads[0].value()], 1);
        return Some(Hand { rank: HandRank::FourOfAKind, cards: layout(&kicker, &[&quads[..]]) });
    }

    if let Some(trips) = groups.iter().rev().find(|g| g.len() == 3) {
        let pair = groups
            .iter()
            .rev()
            .find(|g| g.len() >= 2 && g[0].value() != trips[0].value());
        if let Some(pair) = pair {
            return Some(Hand { rank: HandRank::FullHouse, cards: layout(&[], &[&pair[..2], &trips[..]]) });
        }
    }

    if let Some(suited) = &flush {
        return Some(Hand { rank: HandRank::Flush, cards: top_five(suited) });
    }

    if let Some(run) = highest_straight(&cards) {
        return Some(Hand { rank: HandRank::Straight, cards: run });
    }

    if let Some(trips) = groups.iter().rev().find(|g| g.len() == 3) {
        let kicker = kickers(&cards, &[trips[0].value()], 2);
        return Some(Hand { rank: HandRank::ThreeOfAKind, cards: layout(&kicker, &[&trips[..]]) });
    }

    let pairs: Vec<&Vec<Card>> = groups.iter().rev().filter(|g| g.len() == 2).collect();
    match pairs.as_slice() {
        [high, low, ..] => {
            let kicker = kickers(&cards, &[high[0].value(), low[0].value()], 1);
            Some(Hand { rank: HandRank::TwoPair, cards: layout(&kicker, &[&low[..], &high[..]]) })
        }
        [pair] => {
            let kicker = kickers(&cards, &[pair[0].value()], 3);
            Some(Hand { rank: HandRank::Pair, cards: layout(&kicker, &[&pair[..]]) })
        }
        [] => Some(Hand { rank: HandRank::HighCard, cards: top_five(&cards) }),
    }
}

/// All cards of the suit holding five or more, ascending.
fn flush_cards(sorted: &[Card]) -> Option<Vec<Card>> {
    Suit::ALL.iter().find_map(|&suit| {
        let suited: Vec<Card> = sorted.iter().filter(|c| c.suit == suit).copied().collect();
        (suited.len() >= 5).then_some(suited)
    })
}

/// Highest five-card run in `sorted` (ascending input), ace playing low when
/// that completes a 5-high straight.
fn highest_straight(sorted: &[Card]) -> Option<[Card; 5]> {
    let mut distinct: Vec<Card> = Vec::with_capacity(sorted.len());
    for card in sorted {
        match distinct.last() {
            Some(last) if last.value() == card.value() => {}
            _ => distinct.push(*card),
        }
    }

    for end in (4..distinct.len()).rev() {
        let window = &distinct[end - 4..=end];
        if window.windows(2).all(|w| w[1].value() == w[0].value() + 1) {
            return window.try_into().ok();
        }
    }

    // wheel: A-2-3-4-5
    let ace = distinct.iter().find(|c| c.value() == 14)?;
    let mut wheel = vec![*ace];
    for value in 2..=5 {
        wheel.push(*distinct.iter().find(|c| c.value() == value)?);
    }
    wheel.try_into().ok()
}

fn top_five(sorted: &[Card]) -> [Card; 5] {
    let start = sorted.len().saturating_sub(5);
    let mut out = [sorted[start]; 5];
    out.copy_from_slice(&sorted[start..]);
    out
}

/// The `n` highest cards whose value is not in `exclude`, ascending.
fn kickers(sorted: &[Card], exclude: &[u8], n: usize) -> Vec<Card> {
    let mut picked: Vec<Card> = sorted
        .iter()
        .rev()
        .filter(|c| !exclude.contains(&c.value()))
        .take(n)
        .copied()
        .collect();
    picked.reverse();
    picked
}

/// Concatenates the kickers and the matched groups into a five-card layout.
fn layout(kickers: &[Card], groups: &[&[Card]]) -> [Card; 5] {
    let cards: Vec<Card> = kickers.iter().chain(groups.iter().flat_map(|g| g.iter())).copied().collect();
    let mut out = [cards[0]; 5];
    out.copy_from_slice(&cards[..5]);
    out
}

/// Narrows contenders that share the best category down to the winners.
///
/// Compares position `card_idx` across all remaining contenders, keeps the
/// ones holding the highest value there and recurses one position lower.
/// A single remaining contender, or running out of positions, ends the
/// recursion. More than one survivor means a split pot.
pub fn check_ties<T: Copy>(contenders: &[(T, Hand)], card_idx: Option<usize>) -> Vec<(T, Hand)> {
    let Some(idx) = card_idx else {
        return contenders.to_vec();
    };
    if contenders.len() <= 1 {
        return contenders.to_vec();
    }

    let best = contenders.iter().map(|(_, h)| h.cards[idx].value()).max().unwrap_or(0);
    let survivors: Vec<(T, Hand)> = contenders
        .iter()
        .filter(|(_, h)| h.cards[idx].value() == best)
        .copied()
        .collect();

    check_ties(&survivors, idx.checked_sub(1))
}

/// Winners among `contenders`: highest category first, then positional tie-break.
pub fn best_hands<T: Copy>(contenders: &[(T, Hand)]) -> Vec<T> {
    let Some(top) = contenders.iter().map(|(_, h)| h.rank).max() else {
        return Vec::new();
    };
    let best: Vec<(T, Hand)> = contenders.iter().filter(|(_, h)| h.rank == top).copied().collect();
    check_ties(&best, Some(4)).into_iter().map(|(t, _)| t).collect()
}
