use crate::card::{Card, Chips, cards_to_string};
use crate::error::{InvariantError, TableError};
use crate::format::ChipFormatter;
use crate::hand::{Hand, best_hands};
use crate::player::SeatId;
use crate::state::{Table, TableState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Chips handed to one winner of one pot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub seat: SeatId,
    pub name: String,
    pub amount: Chips,
    pub hand: Option<Hand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotResult {
    pub total: Chips,
    pub winners: Vec<Payout>,
}

impl PotResult {
    pub fn is_split(&self) -> bool {
        self.winners.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShownHand {
    pub seat: SeatId,
    pub name: String,
    pub hole: Vec<Card>,
    pub hand: Option<Hand>,
}

/// Outcome of a settled round. Pots are listed main pot first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub community: Vec<Card>,
    pub pots: Vec<PotResult>,
    pub shown: Vec<ShownHand>,
    pub by_folds: bool,
    /// The last seated player had folded; nobody was paid.
    pub abandoned: bool,
}

impl RoundSummary {
    /// Human readable lines, one per pot.
    pub fn describe(&self, fmt: &ChipFormatter) -> Vec<String> {
        if self.abandoned {
            return vec!["the last player folded, pots abandoned".to_string()];
        }
        if self.by_folds {
            return self
                .pots
                .iter()
                .flat_map(|p| p.winners.iter())
                .map(|w| format!("{} wins {} by folds", w.name, fmt.chips(w.amount)))
                .collect();
        }

        let mut lines = Vec::with_capacity(self.pots.len() + 1);
        lines.push(format!("community: {}", cards_to_string(&self.community)));
        for (idx, pot) in self.pots.iter().enumerate() {
            let label = if idx == 0 { "main pot".to_string() } else { format!("side pot #{}", idx) };
            let rank = pot.winners.first().and_then(|w| w.hand).map(|h| h.rank.to_string()).unwrap_or_default();
            if pot.is_split() {
                let names: Vec<&str> = pot.winners.iter().map(|w| w.name.as_str()).collect();
                lines.push(format!(
                    "{} ({}) split between {}: winning hand => {}",
                    label,
                    fmt.chips(pot.total),
                    names.join(", "),
                    rank
                ));
            } else if let Some(w) = pot.winners.first() {
                lines.push(format!("{} wins {} ({}) with {}", w.name, label, fmt.chips(w.amount), rank));
            }
        }
        lines
    }
}

/// Divides `total` between `winners`. The odd chips go one each to the
/// earliest winners in the given order.
pub fn split_pot(total: Chips, winners: &[SeatId]) -> Vec<(SeatId, Chips)> {
    if winners.is_empty() {
        return Vec::new();
    }
    let n = winners.len() as Chips;
    let share = total / n;
    let rem = (total % n) as usize;
    winners.iter().enumerate().map(|(i, &seat)| (seat, share + Chips::from(i < rem))).collect()
}

impl Table {
    /// Seats in ring order starting left of the dealer.
    fn seats_left_of_dealer(&self) -> Vec<SeatId> {
        let start = self.dealer.and_then(|d| self.active.next_of(d)).or(self.active.head());
        match start {
            Some(s) => self.active.iter_from(s).collect(),
            None => Vec::new(),
        }
    }

    fn order_from_dealer(&self, mut seats: Vec<SeatId>) -> Vec<SeatId> {
        let order = self.seats_left_of_dealer();
        seats.sort_by_key(|s| order.iter().position(|o| o == s).unwrap_or(usize::MAX));
        seats
    }

    /// Settles the round: awards every pot to its best eligible hand, or the
    /// whole pot to the last contender when everyone else folded.
    ///
    /// A pot none of whose seats reached showdown rolls down into the next
    /// lower pot. Chips that no contender can claim are an invariant error.
    pub fn finish_round(&mut self) -> Result<RoundSummary, TableError> {
        if self.active.len() == 1 {
            if let Some(last) = self.active.head().filter(|&s| self.players[s].is_folded()) {
                warn!(seat = last, pot = self.pots.total(), "last player folded, abandoning pots");
                self.state = TableState::GameOver;
                self.winners = vec![last];
                self.game_winner = Some(last);
                self.pots.clear();
                let summary = RoundSummary { abandoned: true, ..RoundSummary::default() };
                self.last_summary = Some(summary.clone());
                return Ok(summary);
            }
        }

        self.pots.calculate_side_pot_totals();
        self.pots.check_conservation()?;

        let contenders = self.non_folded_seats();
        let summary = match contenders.as_slice() {
            [] if self.pots.total() == 0 => {
                self.state = TableState::RoundOver;
                RoundSummary { community: self.community.clone(), ..RoundSummary::default() }
            }
            [] => return Err(InvariantError::UnclaimedPot(self.pots.total()).into()),
            [seat] => self.award_by_folds(*seat),
            _ => self.showdown(&contenders)?,
        };

        self.pots.clear();
        self.last_summary = Some(summary.clone());
        Ok(summary)
    }

    fn award_by_folds(&mut self, seat: SeatId) -> RoundSummary {
        let total = self.pots.total();
        let player = &mut self.players[seat];
        player.chip_count += total;
        info!(seat, name = %player.name, total, "wins by folds");

        self.state = TableState::RoundOver;
        self.winners = vec![seat];
        RoundSummary {
            community: self.community.clone(),
            pots: vec![PotResult {
                total,
                winners: vec![Payout { seat, name: player.name.clone(), amount: total, hand: None }],
            }],
            shown: Vec::new(),
            by_folds: true,
            abandoned: false,
        }
    }

    fn showdown(&mut self, contenders: &[SeatId]) -> Result<RoundSummary, TableError> {
        while self.community.len() < 5 {
            let card = self.deck.draw().ok_or(InvariantError::DeckExhausted)?;
            self.community.push(card);
        }
        self.refresh_hands();
        self.state = TableState::ShowHands;

        let hands: Vec<(SeatId, Hand)> = contenders
            .iter()
            .filter_map(|&s| self.players[s].hand.map(|h| (s, h)))
            .collect();

        let pots = self.pots.settlement_pots();
        let mut results = Vec::with_capacity(pots.len());
        let mut winners: Vec<SeatId> = Vec::new();
        let mut carry: Chips = 0;

        // top tier first so an unclaimed pot can roll down
        for (idx, pot) in pots.iter().enumerate().rev() {
            let total = pot.total + carry;
            let eligible: Vec<(SeatId, Hand)> = hands.iter().filter(|(s, _)| pot.has_player(*s)).copied().collect();
            if eligible.is_empty() {
                debug!(tier = idx, total, "no contender for pot, rolling down");
                carry = total;
                continue;
            }
            carry = 0;

            let pot_winners = self.order_from_dealer(best_hands(&eligible));
            if idx == 0 && pot_winners.len() > 1 {
                self.state = TableState::SplitPot;
            }

            let mut payouts = Vec::with_capacity(pot_winners.len());
            for (seat, amount) in split_pot(total, &pot_winners) {
                let player = &mut self.players[seat];
                player.chip_count += amount;
                payouts.push(Payout { seat, name: player.name.clone(), amount, hand: player.hand });
                if !winners.contains(&seat) {
                    winners.push(seat);
                }
            }
            info!(tier = idx, total, winners = ?pot_winners, "pot settled");
            results.push(PotResult { total, winners: payouts });
        }

        if carry > 0 {
            return Err(InvariantError::UnclaimedPot(carry).into());
        }
        results.reverse();

        self.winners = winners;
        let shown = contenders
            .iter()
            .map(|&s| {
                let p = &self.players[s];
                ShownHand { seat: s, name: p.name.clone(), hole: p.hole.clone(), hand: p.hand }
            })
            .collect();

        Ok(RoundSummary { community: self.community.clone(), pots: results, shown, by_folds: false, abandoned: false })
    }
}
