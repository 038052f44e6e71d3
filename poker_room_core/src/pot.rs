use crate::card::Chips;
use crate::error::InvariantError;
use crate::player::SeatId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A chip ledger for one betting tier.
///
/// `bet` is the tier's threshold, `players` the non-folded seats that put in
/// the full threshold and so can win it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pot {
    pub bet: Chips,
    pub total: Chips,
    pub players: BTreeSet<SeatId>,
    pub is_closed: bool,
}

impl Pot {
    pub fn has_player(&self, seat: SeatId) -> bool {
        self.players.contains(&seat)
    }
}

/// A tier created by an all-in. `must_call` lists seats that have put in
/// only part of the tier so far; folding forfeits just that part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePot {
    pub pot: Pot,
    pub must_call: Option<Pot>,
}

/// Every tier above the main pot: the all-in tiers in ascending order, then
/// the betting pot holding chips above the largest all-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePots {
    pub all_in_pots: Vec<SidePot>,
    pub betting_pot: Option<Pot>,
}

impl SidePots {
    pub fn is_empty(&self) -> bool {
        self.all_in_pots.is_empty() && self.betting_pot.is_none()
    }

    pub fn len(&self) -> usize {
        self.all_in_pots.len() + usize::from(self.betting_pot.is_some())
    }

    pub fn total(&self) -> Chips {
        self.all_in_pots.iter().map(|sp| sp.pot.total).sum::<Chips>()
            + self.betting_pot.as_ref().map_or(0, |p| p.total)
    }

    /// All-in tiers that no stage has closed yet.
    pub fn open_pots(&self) -> impl Iterator<Item = &SidePot> {
        self.all_in_pots.iter().filter(|sp| !sp.pot.is_closed)
    }

    pub fn get(&self, index: usize) -> Result<&SidePot, InvariantError> {
        self.all_in_pots
            .get(index)
            .ok_or(InvariantError::SidePotIndex { index, len: self.all_in_pots.len() })
    }
}

/// Where a new all-in amount lands among the existing boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Equal to the boundary at this index; joins that tier.
    Matched(usize),
    /// Strictly between two boundaries; a new tier is inserted at this index.
    Inserted(usize),
    /// Above every boundary; becomes the new largest tier.
    Largest,
}

/// Locates `amount` in the ascending `boundaries` list.
pub fn place_boundary(boundaries: &[Chips], amount: Chips) -> Placement {
    match boundaries.binary_search(&amount) {
        Ok(idx) => Placement::Matched(idx),
        Err(idx) if idx == boundaries.len() => Placement::Largest,
        Err(idx) => Placement::Inserted(idx),
    }
}

/// Adds `amount` to `boundaries` keeping them sorted and distinct.
pub fn insert_boundary(boundaries: &mut Vec<Chips>, amount: Chips) -> Placement {
    let placement = place_boundary(boundaries, amount);
    match placement {
        Placement::Matched(_) => {}
        Placement::Inserted(idx) => boundaries.insert(idx, amount),
        Placement::Largest => boundaries.push(amount),
    }
    placement
}

/// Per-hand chip accounting.
///
/// Every seat's cumulative contribution for the hand is recorded; all-in
/// contributions become tier boundaries. The main pot, the all-in tiers and
/// the betting pot are derived from those two lists, so the pots always
/// partition exactly the chips that left the players' stacks.
#[derive(Debug, Clone, Default)]
pub struct PotLedger {
    contributions: BTreeMap<SeatId, Chips>,
    all_in: BTreeSet<SeatId>,
    folded: BTreeSet<SeatId>,
    boundaries: Vec<Chips>,
    /// boundaries below this index were fixed by an earlier stage
    closed: usize,
    /// what every still-betting seat had in when the current stage opened
    stage_base: Chips,
    main_pot: Pot,
    side_pots: SidePots,
}

impl PotLedger {
    pub fn new() -> PotLedger {
        PotLedger::default()
    }

    pub fn clear(&mut self) {
        *self = PotLedger::default();
    }

    pub fn main_pot(&self) -> &Pot {
        &self.main_pot
    }

    pub fn side_pots(&self) -> &SidePots {
        &self.side_pots
    }

    pub fn boundaries(&self) -> &[Chips] {
        &self.boundaries
    }

    pub fn stage_base(&self) -> Chips {
        self.stage_base
    }

    /// Cumulative chips `seat` has put in this hand.
    pub fn contribution(&self, seat: SeatId) -> Chips {
        self.contributions.get(&seat).copied().unwrap_or(0)
    }

    /// Chips moved out of stacks this hand.
    pub fn wagered(&self) -> Chips {
        self.contributions.values().sum()
    }

    /// Sum of every pot total.
    pub fn total(&self) -> Chips {
        self.main_pot.total + self.side_pots.total()
    }

    pub fn check_conservation(&self) -> Result<(), InvariantError> {
        let (wagered, pots) = (self.wagered(), self.total());
        if wagered != pots {
            return Err(InvariantError::ChipsNotConserved { wagered, pots });
        }
        Ok(())
    }

    /// Records that `seat` now has `stage_amount` in for the current stage.
    ///
    /// Returns how many chips this call added. An all-in becomes a tier
    /// boundary; any other contribution must reach every tier opened this
    /// stage.
    pub fn commit(&mut self, seat: SeatId, stage_amount: Chips, all_in: bool) -> Result<Chips, InvariantError> {
        let was = self.contribution(seat);
        let now = self.stage_base + stage_amount;
        if now < was {
            return Err(InvariantError::ContributionDecreased { seat, was, now });
        }

        if all_in {
            self.all_in.insert(seat);
            if now > 0 {
                let placement = insert_boundary(&mut self.boundaries, now);
                debug!(seat, amount = now, ?placement, "all-in boundary placed");
            }
        } else if let Some(&boundary) = self.boundaries[self.closed..].iter().rev().find(|&&b| now < b) {
            return Err(InvariantError::BoundaryNotCovered { seat, contributed: now, boundary });
        }

        self.contributions.insert(seat, now);
        self.calculate_side_pot_totals();
        Ok(now - was)
    }

    /// The seat's chips stay in the pots as dead money.
    pub fn fold(&mut self, seat: SeatId) {
        if self.folded.insert(seat) {
            self.calculate_side_pot_totals();
        }
    }

    pub fn is_folded(&self, seat: SeatId) -> bool {
        self.folded.contains(&seat)
    }

    /// Recomputes every pot from the contribution list: tier totals, eligible
    /// seats, and must-call sub-ledgers for seats part-way through a tier.
    pub fn calculate_side_pot_totals(&mut self) {
        let tiers = self.tiers();
        let mut pots = tiers.into_iter();

        self.main_pot = match pots.next() {
            Some(tier) => tier.pot,
            None => Pot::default(),
        };

        let mut all_in_pots = Vec::new();
        let mut betting_pot = None;
        for tier in pots {
            if tier.upper.is_some() {
                all_in_pots.push(SidePot { pot: tier.pot, must_call: tier.must_call });
            } else {
                betting_pot = Some(tier.pot);
            }
        }
        self.side_pots = SidePots { all_in_pots, betting_pot };
    }

    /// Fixes every tier created so far; later all-ins can only open tiers above them.
    pub fn close_side_pots(&mut self) {
        if self.boundaries.is_empty() {
            return;
        }
        self.closed = self.boundaries.len();
        self.main_pot.is_closed = true;
        for sp in self.side_pots.all_in_pots.iter_mut() {
            sp.pot.is_closed = true;
        }
    }

    /// Ends a betting stage: totals are finalized, open tiers close and the
    /// next stage's amounts are measured from what the still-betting seats have in.
    pub fn close_stage(&mut self) {
        self.calculate_side_pot_totals();
        self.close_side_pots();
        self.stage_base = self
            .contributions
            .iter()
            .filter(|(seat, _)| !self.all_in.contains(seat) && !self.folded.contains(seat))
            .map(|(_, &c)| c)
            .max()
            .unwrap_or(self.stage_base);
        debug!(stage_base = self.stage_base, tiers = self.boundaries.len(), "betting stage closed");
    }

    /// Pots that hold chips, lowest tier first, for settlement.
    pub fn settlement_pots(&self) -> Vec<Pot> {
        std::iter::once(&self.main_pot)
            .chain(self.side_pots.all_in_pots.iter().map(|sp| &sp.pot))
            .chain(self.side_pots.betting_pot.iter())
            .filter(|p| p.total > 0)
            .cloned()
            .collect()
    }

    fn tiers(&self) -> Vec<Tier> {
        let mut tiers = Vec::with_capacity(self.boundaries.len() + 1);
        let mut lower = 0;
        for (idx, &upper) in self.boundaries.iter().enumerate() {
            let mut tier = self.tier(lower, Some(upper));
            tier.pot.is_closed = idx < self.closed;
            tiers.push(tier);
            lower = upper;
        }
        if self.boundaries.is_empty() {
            let mut tier = self.tier(0, None);
            tier.pot.bet = self.contributions.values().copied().max().unwrap_or(0);
            tiers.push(tier);
        } else {
            let mut tier = self.tier(lower, None);
            tier.pot.bet = self
                .contributions
                .values()
                .map(|&c| c.saturating_sub(lower))
                .max()
                .unwrap_or(0);
            tiers.push(tier);
        }
        tiers
    }

    fn tier(&self, lower: Chips, upper: Option<Chips>) -> Tier {
        let mut pot = Pot { bet: upper.unwrap_or(0), ..Pot::default() };
        let mut must_call = Pot { bet: upper.map_or(0, |u| u - lower), ..Pot::default() };

        for (&seat, &c) in &self.contributions {
            let above = c.saturating_sub(lower);
            let share = match upper {
                Some(u) => above.min(u - lower),
                None => above,
            };
            pot.total += share;

            if self.folded.contains(&seat) {
                continue;
            }
            match upper {
                Some(u) if c >= u => {
                    pot.players.insert(seat);
                }
                Some(_) if !self.all_in.contains(&seat) => {
                    must_call.total += share;
                    must_call.players.insert(seat);
                }
                None if above > 0 => {
                    pot.players.insert(seat);
                }
                _ => {}
            }
        }

        Tier {
            upper,
            pot,
            must_call: (!must_call.players.is_empty()).then_some(must_call),
        }
    }
}

struct Tier {
    upper: Option<Chips>,
    pot: Pot,
    must_call: Option<Pot>,
}
