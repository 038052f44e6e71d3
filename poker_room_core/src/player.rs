use crate::card::{Card, Chips};
use crate::hand::Hand;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Index of a seat in the table's fixed seat array.
pub type SeatId = usize;

/// What a seat last did (or is marked as) this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    FirstAction,
    AllIn,
    Bet,
    Call,
    Check,
    Fold,
    VacantSeat,
    PlayerTurn,
    /// Took a seat while a round was running; joins at the next round.
    MidroundAddition,
}

/// A player's action. `amount` is the total put in during the current
/// betting stage, not the increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub amount: Chips,
}

impl Action {
    pub fn new(kind: ActionKind, amount: Chips) -> Action {
        Action { kind, amount }
    }

    pub fn first() -> Action {
        Action::new(ActionKind::FirstAction, 0)
    }

    pub fn clear(&mut self) {
        *self = Action::first();
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::first()
    }
}

/// A long-lived seat. Cleared, never destroyed, when its occupant leaves.
#[derive(Debug, Clone)]
pub struct Player {
    pub seat: SeatId,
    default_name: String,
    pub name: String,
    pub is_vacant: bool,
    pub chip_count: Chips,
    pub hole: Vec<Card>,
    pub hand: Option<Hand>,
    pub action: Action,
}

impl Player {
    pub fn new(seat: SeatId, starting_chips: Chips) -> Player {
        let default_name = format!("p{}", seat);
        Player {
            seat,
            name: default_name.clone(),
            default_name,
            is_vacant: true,
            chip_count: starting_chips,
            hole: Vec::with_capacity(2),
            hand: None,
            action: Action::new(ActionKind::VacantSeat, 0),
        }
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Renames the seat. An empty name falls back to the seat's default name.
    pub fn set_name(&mut self, name: &str) {
        if name.is_empty() {
            self.name = self.default_name.clone();
        } else {
            self.name = name.to_string();
        }
    }

    /// Still able to put chips in this stage.
    pub fn can_bet(&self) -> bool {
        !self.is_vacant
            && !matches!(
                self.action.kind,
                ActionKind::Fold | ActionKind::AllIn | ActionKind::MidroundAddition | ActionKind::VacantSeat
            )
    }

    pub fn is_folded(&self) -> bool {
        self.action.kind == ActionKind::Fold
    }

    pub fn new_cards(&mut self) {
        self.hole.clear();
        self.hand = None;
    }

    /// Returns the seat to its vacant state.
    pub fn clear(&mut self, starting_chips: Chips) {
        self.name = self.default_name.clone();
        self.is_vacant = true;
        self.chip_count = starting_chips;
        self.new_cards();
        self.action = Action::new(ActionKind::VacantSeat, 0);
    }

    /// Public projection. Hole cards and hand are only included when `reveal` is set.
    pub fn view(&self, reveal: bool) -> PlayerView {
        PlayerView {
            seat: self.seat,
            name: self.name.clone(),
            chip_count: self.chip_count,
            action: self.action,
            hole: if reveal { self.hole.clone() } else { Vec::new() },
            hand: if reveal { self.hand } else { None },
        }
    }
}

/// What other clients may see of a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub seat: SeatId,
    pub name: String,
    pub chip_count: Chips,
    pub action: Action,
    pub hole: Vec<Card>,
    pub hand: Option<Hand>,
}

/// Circular roster of seats.
///
/// The front of the deque is the ring head; the successor of the last entry is
/// the head again. Rotation is a head move, removal hands back the successor
/// of the removed seat so the caller can keep its turn pointer valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerList {
    ring: VecDeque<SeatId>,
}

impl PlayerList {
    pub fn new() -> PlayerList {
        PlayerList::default()
    }

    pub fn from_seats(seats: impl IntoIterator<Item = SeatId>) -> PlayerList {
        let mut list = PlayerList::new();
        for seat in seats {
            list.add(seat);
        }
        list
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn head(&self) -> Option<SeatId> {
        self.ring.front().copied()
    }

    pub fn contains(&self, seat: SeatId) -> bool {
        self.ring.contains(&seat)
    }

    fn position(&self, seat: SeatId) -> Option<usize> {
        self.ring.iter().position(|&s| s == seat)
    }

    /// Inserts `seat` just before the head, i.e. last in ring order.
    /// Adding a seat that is already present is a no-op.
    pub fn add(&mut self, seat: SeatId) {
        if !self.contains(seat) {
            self.ring.push_back(seat);
        }
    }

    /// Removes `seat` and returns its successor, or `None` when the seat was
    /// absent or the ring is now empty. Removing the head promotes its successor.
    pub fn remove(&mut self, seat: SeatId) -> Option<SeatId> {
        let idx = self.position(seat)?;
        self.ring.remove(idx);
        if self.ring.is_empty() {
            return None;
        }
        let next = if idx < self.ring.len() { idx } else { 0 };
        self.ring.get(next).copied()
    }

    pub fn next_of(&self, seat: SeatId) -> Option<SeatId> {
        let idx = self.position(seat)?;
        self.ring.get((idx + 1) % self.ring.len()).copied()
    }

    pub fn prev_of(&self, seat: SeatId) -> Option<SeatId> {
        let idx = self.position(seat)?;
        self.ring.get((idx + self.ring.len() - 1) % self.ring.len()).copied()
    }

    /// Rotates the ring so that `seat` becomes the head. Returns `false` if absent.
    pub fn set_head(&mut self, seat: SeatId) -> bool {
        match self.position(seat) {
            Some(idx) => {
                self.ring.rotate_left(idx);
                true
            }
            None => false,
        }
    }

    /// Seats in ring order starting at the head.
    pub fn iter(&self) -> impl Iterator<Item = SeatId> + '_ {
        self.ring.iter().copied()
    }

    /// Seats in ring order starting at `seat` (inclusive).
    pub fn iter_from(&self, seat: SeatId) -> impl Iterator<Item = SeatId> + '_ {
        let start = self.position(seat).unwrap_or(0);
        let len = self.ring.len();
        (0..len).filter_map(move |i| self.ring.get((start + i) % len).copied())
    }

    pub fn to_vec(&self) -> Vec<SeatId> {
        self.ring.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}
