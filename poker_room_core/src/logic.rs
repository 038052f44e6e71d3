use crate::card::{Chips, Deck};
use crate::error::{ActionError, InvariantError, TableError};
use crate::hand::assemble_best_hand;
use crate::player::{Action, ActionKind, Player, PlayerList, SeatId};
use crate::pot::PotLedger;
use crate::state::*;
use tracing::{debug, info, warn};

// --- Results handed back to the orchestration layer ---

/// Who posted the blinds and which of them the post left without chips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlindPosting {
    pub small_blind: Option<SeatId>,
    pub big_blind: Option<SeatId>,
    pub forced_all_in: Vec<SeatId>,
}

/// What the table looks like after a seat was vacated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Enough players remain to keep playing.
    Continue,
    /// Only this seat is still occupied.
    OnePlayerLeft(SeatId),
    /// Nobody is seated any more.
    Empty,
}

// --- Table setup and seats ---

impl Table {
    pub fn new(config: TableConfig) -> Result<Table, ActionError> {
        Table::with_deck(config, Deck::new())
    }

    /// Builds a table around a given deck, so tests can fix the shuffle.
    pub fn with_deck(config: TableConfig, mut deck: Deck) -> Result<Table, ActionError> {
        if !(MIN_SEATS..=MAX_SEATS).contains(&config.num_seats) {
            return Err(ActionError::InvalidSeatCount);
        }
        deck.shuffle();

        Ok(Table {
            deck,
            community: Vec::with_capacity(5),
            pots: PotLedger::new(),
            players: (0..MAX_SEATS).map(|seat| Player::new(seat, config.starting_chips)).collect(),
            active: PlayerList::new(),
            current: PlayerList::new(),
            cur_player: None,
            better: None,
            dealer: None,
            small_blind: None,
            big_blind: None,
            ante: config.ante,
            bet: 0,
            state: TableState::NotStarted,
            comm_state: TableState::NotStarted,
            lock: TableLock::None,
            password: String::new(),
            num_seats: config.num_seats,
            num_players: 0,
            num_connected: 0,
            round_count: 0,
            winners: Vec::new(),
            game_winner: None,
            last_summary: None,
            config,
        })
    }

    pub fn set_num_seats(&mut self, num_seats: usize) -> Result<(), ActionError> {
        if !(MIN_SEATS..=MAX_SEATS).contains(&num_seats) {
            return Err(ActionError::InvalidSeatCount);
        }
        if num_seats < self.num_players {
            return Err(ActionError::SeatCountBelowPlayers);
        }
        self.num_seats = num_seats;
        Ok(())
    }

    /// Claims the first vacant seat and puts it in the rings.
    ///
    /// Before the game starts the seat joins both rings; afterwards it is a
    /// `MidroundAddition` that only joins the active ring and is dealt in at
    /// the next round.
    pub fn take_seat(&mut self) -> Option<SeatId> {
        if self.num_open_seats() == 0 {
            return None;
        }
        let seat = self.players.iter().position(|p| p.is_vacant)?;
        let started = self.state != TableState::NotStarted;

        let starting_chips = self.config.starting_chips;
        let player = &mut self.players[seat];
        player.is_vacant = false;
        player.chip_count = starting_chips;
        player.new_cards();
        player.action = if started { Action::new(ActionKind::MidroundAddition, 0) } else { Action::first() };

        self.num_players += 1;
        self.active.add(seat);
        if !started {
            self.current.add(seat);
            if self.cur_player.is_none() {
                self.cur_player = self.current.head();
            }
            if self.dealer.is_none() {
                self.dealer = self.active.head();
            } else if self.small_blind.is_none() {
                self.small_blind = self.dealer.and_then(|d| self.active.next_of(d));
            } else if self.big_blind.is_none() {
                self.big_blind = self.small_blind.and_then(|s| self.active.next_of(s));
            }
        }

        info!(seat, midround = started, players = self.num_players, "seat taken");
        Some(seat)
    }

    /// Vacates `seat`. Chips it already put in stay in the pots as dead money.
    ///
    /// Markers held by the seat are cleared and rebuilt at the next rotation.
    /// If the departure leaves one contender or nobody able to bet, the state
    /// moves on so the caller can finish the stage or the round.
    pub fn remove_player(&mut self, seat: SeatId) -> Result<Departure, InvariantError> {
        let Some(player) = self.players.get(seat) else {
            return Err(InvariantError::MissingRingMember(seat, "seat"));
        };
        if player.is_vacant {
            warn!(seat, "tried to vacate an empty seat");
            return Ok(Departure::Continue);
        }
        info!(seat, name = %player.name, "removing player");

        self.active.remove(seat);
        let next = self.current.remove(seat);
        if self.cur_player == Some(seat) {
            self.cur_player = next;
        }
        if self.better == Some(seat) {
            self.better = None;
        }
        self.pots.fold(seat);
        self.winners.retain(|&s| s != seat);

        let starting_chips = self.config.starting_chips;
        self.players[seat].clear(starting_chips);
        self.num_players = self.num_players.saturating_sub(1);

        for marker in [&mut self.dealer, &mut self.small_blind, &mut self.big_blind] {
            if *marker == Some(seat) {
                *marker = None;
            }
        }

        if self.num_players < 2 {
            return Ok(match self.active.head() {
                Some(last) => Departure::OnePlayerLeft(last),
                None => Departure::Empty,
            });
        }

        self.repair_after_departure();
        Ok(Departure::Continue)
    }

    fn repair_after_departure(&mut self) {
        if !self.in_betting_state() {
            return;
        }
        if self.non_folded_seats().len() <= 1 {
            debug!("departure left a single contender");
            self.state = TableState::RoundOver;
        } else if self.current.is_empty() || self.stage_complete() {
            self.done_betting();
        }
    }

    /// Folds `seat` and passes the turn on if it is the seat's turn.
    /// Used when a player walks away mid-hand. Returns whether a fold happened.
    pub fn forfeit_turn(&mut self, seat: SeatId) -> Result<bool, InvariantError> {
        if !self.in_betting_state() || self.active.len() < 2 || self.cur_player != Some(seat) {
            return Ok(false);
        }
        self.players[seat].action.kind = ActionKind::Fold;
        self.pots.fold(seat);
        self.set_next_player_turn()?;
        Ok(true)
    }

    /// Active seats with no chips left. When they are everyone but one the
    /// game is over and the remaining seat is recorded as the game winner.
    pub fn eliminated_players(&mut self) -> Vec<SeatId> {
        let out: Vec<SeatId> = self.active.iter().filter(|&s| self.players[s].chip_count == 0).collect();

        if out.len() + 1 == self.num_players {
            self.state = TableState::GameOver;
            self.game_winner = self.active.iter().find(|&s| self.players[s].chip_count > 0);
            info!(winner = ?self.game_winner, "game over");
        }
        out
    }

    /// Starts a fresh game. `keep` stays seated (with a fresh stack); every
    /// other seat is cleared.
    pub fn reset(&mut self, keep: Option<SeatId>) {
        let keep = keep.filter(|&s| self.players.get(s).is_some_and(|p| !p.is_vacant));
        let starting_chips = self.config.starting_chips;

        for player in self.players.iter_mut() {
            if Some(player.seat) == keep {
                player.action.clear();
                player.new_cards();
                player.chip_count = starting_chips;
            } else {
                player.clear(starting_chips);
            }
        }

        self.active = PlayerList::from_seats(keep);
        self.current = PlayerList::from_seats(keep);
        self.cur_player = keep;
        self.better = None;
        self.dealer = keep;
        self.small_blind = None;
        self.big_blind = None;

        self.ante = self.config.ante;
        self.bet = 0;
        self.community.clear();
        self.pots.clear();
        self.num_players = usize::from(keep.is_some());
        self.round_count = 0;
        self.winners.clear();
        self.game_winner = None;
        self.last_summary = None;
        self.state = TableState::NotStarted;
        self.comm_state = TableState::NotStarted;
        self.deck.shuffle();

        info!(kept = ?keep, "table reset");
    }

    pub fn start_game(&mut self) -> Result<BlindPosting, TableError> {
        if self.state != TableState::NotStarted {
            return Err(ActionError::AlreadyStarted.into());
        }
        if self.num_players < 2 {
            return Err(ActionError::NotEnoughPlayers.into());
        }
        info!(players = self.num_players, "starting game");
        self.next_table_action()
    }
}

// --- Rounds, blinds and turn order ---

impl Table {
    /// Seats still contesting the pot: active, dealt in and not folded.
    pub fn non_folded_seats(&self) -> Vec<SeatId> {
        self.active
            .iter()
            .filter(|&s| !matches!(self.players[s].action.kind, ActionKind::Fold | ActionKind::MidroundAddition))
            .collect()
    }

    fn active_next(&self, seat: SeatId) -> Result<SeatId, InvariantError> {
        self.active.next_of(seat).ok_or(InvariantError::MissingRingMember(seat, "active"))
    }

    fn active_prev(&self, seat: SeatId) -> Result<SeatId, InvariantError> {
        self.active.prev_of(seat).ok_or(InvariantError::MissingRingMember(seat, "active"))
    }

    /// Prepares the next round: fresh shuffle, new players dealt in, actions
    /// and community cleared, ante doubling, orphaned markers repaired.
    pub fn new_round(&mut self) -> Result<(), InvariantError> {
        self.deck.shuffle();

        for seat in self.active.to_vec() {
            let player = &mut self.players[seat];
            if player.action.kind == ActionKind::MidroundAddition {
                info!(seat, name = %player.name, "adding new player");
            }
            player.new_cards();
            player.action = Action::first();
        }

        self.community.clear();
        self.round_count += 1;

        let every = self.config.ante_double_interval;
        if every > 0 && self.round_count % every == 0 {
            self.ante = self.ante.saturating_mul(2);
            info!(ante = self.ante, round = self.round_count, "ante increased");
        }

        self.handle_orphaned_seats()?;

        self.current = self.active.clone();
        self.better = None;
        self.bet = self.ante;
        self.pots.clear();
        self.winners.clear();
        self.state = TableState::NewRound;
        Ok(())
    }

    /// Rotates (or repairs) the markers, posts the blinds, deals and hands
    /// the turn to the big blind's successor.
    pub fn next_table_action(&mut self) -> Result<BlindPosting, TableError> {
        match self.state {
            TableState::NotStarted => {
                if self.dealer.is_none() || self.small_blind.is_none() || self.big_blind.is_none() {
                    self.handle_orphaned_seats()?;
                }
                self.deck.shuffle();
            }
            TableState::NewRound => self.rotate_players()?,
            TableState::GameOver => {
                info!("game over, no table action");
                return Ok(BlindPosting::default());
            }
            other => return Err(ActionError::InvalidState(other.to_string()).into()),
        }

        let sb = self.small_blind.ok_or(InvariantError::MissingMarker("small blind"))?;
        let bb = self.big_blind.ok_or(InvariantError::MissingMarker("big blind"))?;

        self.bet = self.ante;
        self.post_blind(sb, self.ante / 2)?;
        self.post_blind(bb, self.ante)?;

        self.deal()?;
        self.comm_state = TableState::PreFlop;
        self.state = TableState::PreFlop;
        self.reorder_players()?;

        let mut forced_all_in = Vec::new();
        for seat in [sb, bb] {
            if self.players[seat].action.kind == ActionKind::AllIn && !forced_all_in.contains(&seat) {
                info!(seat, "blind forced all in");
                let next = self.current.remove(seat);
                if self.cur_player == Some(seat) {
                    self.cur_player = next;
                }
                forced_all_in.push(seat);
            }
        }
        if self.current.is_empty() {
            self.done_betting();
        }

        Ok(BlindPosting { small_blind: Some(sb), big_blind: Some(bb), forced_all_in })
    }

    fn post_blind(&mut self, seat: SeatId, want: Chips) -> Result<Chips, InvariantError> {
        let player = &mut self.players[seat];
        let amount = want.min(player.chip_count);
        player.chip_count -= amount;
        player.action.amount = amount;
        let all_in = player.chip_count == 0;
        if all_in {
            player.action.kind = ActionKind::AllIn;
        }
        self.pots.commit(seat, amount, all_in)?;
        debug!(seat, amount, all_in, "blind posted");
        Ok(amount)
    }

    fn deal(&mut self) -> Result<(), InvariantError> {
        for seat in self.current.to_vec() {
            for _ in 0..2 {
                let card = self.deck.draw().ok_or(InvariantError::DeckExhausted)?;
                self.players[seat].hole.push(card);
            }
        }
        Ok(())
    }

    fn draw_community(&mut self, count: usize) -> Result<(), InvariantError> {
        for _ in 0..count {
            let card = self.deck.draw().ok_or(InvariantError::DeckExhausted)?;
            self.community.push(card);
        }
        Ok(())
    }

    /// Recomputes the cached best hand of every contender.
    pub(crate) fn refresh_hands(&mut self) {
        for seat in self.non_folded_seats() {
            let player = &mut self.players[seat];
            player.hand = assemble_best_hand(&player.hole, &self.community);
        }
    }

    /// Sets the ring heads and the current player for a new betting stage:
    /// the big blind's successor preflop, the small blind (or the next seat
    /// still able to bet) afterwards.
    pub fn reorder_players(&mut self) -> Result<(), InvariantError> {
        let anchor = if matches!(self.state, TableState::NewRound | TableState::PreFlop) {
            let bb = self.big_blind.ok_or(InvariantError::MissingMarker("big blind"))?;
            let head = self.active_next(bb)?;
            self.active.set_head(head);
            head
        } else if let Some(sb) = self.small_blind {
            sb
        } else if let Some(dealer) = self.dealer {
            self.active_next(dealer)?
        } else if let Some(bb) = self.big_blind {
            self.active_prev(bb)?
        } else {
            self.handle_orphaned_seats()?;
            self.small_blind.ok_or(InvariantError::MissingMarker("small blind"))?
        };

        let head = self.active.iter_from(anchor).find(|&s| self.current.contains(s));
        if let Some(head) = head {
            self.current.set_head(head);
        }
        self.cur_player = self.current.head();
        debug!(anchor, head = ?self.cur_player, "players reordered");
        Ok(())
    }

    /// Fills in any dealer/blind marker whose seat was vacated, deriving it
    /// from the markers that remain.
    fn handle_orphaned_seats(&mut self) -> Result<(), InvariantError> {
        if self.dealer.is_none() && self.small_blind.is_none() && self.big_blind.is_none() {
            let dealer = self.active.head().ok_or(InvariantError::MissingMarker("dealer"))?;
            let sb = self.active_next(dealer)?;
            self.dealer = Some(dealer);
            self.small_blind = Some(sb);
            self.big_blind = Some(self.active_next(sb)?);
        }

        if self.dealer.is_none() && self.small_blind.is_none() {
            let bb = self.big_blind.ok_or(InvariantError::MissingMarker("big blind"))?;
            let sb = self.active_prev(bb)?;
            self.small_blind = Some(sb);
            self.dealer = Some(self.active_prev(sb)?);
        }

        let sb = match (self.dealer, self.small_blind) {
            (None, Some(sb)) => {
                self.dealer = Some(self.active_prev(sb)?);
                sb
            }
            (Some(dealer), None) => {
                let sb = self.active_next(dealer)?;
                self.small_blind = Some(sb);
                sb
            }
            (_, Some(sb)) => sb,
            (None, None) => return Err(InvariantError::MissingMarker("dealer")),
        };

        if self.big_blind.is_none() {
            self.big_blind = Some(self.active_next(sb)?);
        }

        debug!(dealer = ?self.dealer, sb = ?self.small_blind, bb = ?self.big_blind, "markers checked");
        Ok(())
    }

    /// Moves the dealer one seat on and derives the blinds from it.
    fn rotate_players(&mut self) -> Result<(), InvariantError> {
        if self.active.len() < 2 {
            return Ok(());
        }
        if self.dealer.is_none() || self.small_blind.is_none() || self.big_blind.is_none() {
            self.handle_orphaned_seats()?;
        }

        let dealer = self.dealer.ok_or(InvariantError::MissingMarker("dealer"))?;
        let dealer = self.active_next(dealer)?;
        let sb = self.active_next(dealer)?;
        self.dealer = Some(dealer);
        self.small_blind = Some(sb);
        self.big_blind = Some(self.active_next(sb)?);

        info!(dealer, sb, bb = ?self.big_blind, "blinds rotated");
        Ok(())
    }
}

// --- Betting ---

impl Table {
    /// Applies `action` for `seat`, the single mutating entry point of a round.
    ///
    /// Rejections leave the table untouched. On success chips move into the
    /// pot ledger and the turn advances.
    pub fn player_action(&mut self, seat: SeatId, action: Action) -> Result<(), TableError> {
        match self.state {
            TableState::NotStarted => return Err(ActionError::NotStarted.into()),
            TableState::Rounds | TableState::PlayerRaised | TableState::PreFlop => {}
            other => return Err(ActionError::InvalidState(other.to_string()).into()),
        }

        let Some(player) = self.players.get(seat).filter(|p| !p.is_vacant) else {
            return Err(ActionError::NotAPlayer.into());
        };
        if self.cur_player != Some(seat) {
            return Err(ActionError::NotYourTurn.into());
        }
        if self.current.len() == 1 && matches!(action.kind, ActionKind::AllIn | ActionKind::Bet) {
            return Err(ActionError::MustCallOrFold(self.bet).into());
        }

        let chip_count = player.chip_count;
        let prev = player.action.amount;
        let reach = chip_count + prev;
        let to_call = self.bet.saturating_sub(prev);

        let mut kind = action.kind;
        if chip_count == 0 && kind != ActionKind::AllIn {
            debug!(seat, "no chips left, treating action as all in");
            kind = ActionKind::AllIn;
        }

        match kind {
            ActionKind::AllIn => {
                let amount = self.all_in_amount(reach, prev);
                self.commit_action(seat, ActionKind::AllIn, amount, reach)?;
                if amount > self.bet {
                    self.raise_to(seat, amount);
                }
            }
            ActionKind::Bet => {
                if action.amount < self.ante {
                    return Err(ActionError::BetBelowAnte(self.ante).into());
                } else if action.amount <= self.bet {
                    return Err(ActionError::BetNotAboveCurrent(self.bet).into());
                } else if action.amount > reach {
                    return Err(ActionError::NotEnoughChips.into());
                }

                // a chip leader can only bet what someone else can match
                let (leader, second) = self.chip_leaders();
                let amount = if reach == leader { action.amount.min(second) } else { action.amount };

                if amount <= self.bet {
                    debug!(seat, amount, "capped bet only matches the current bet");
                    self.commit_action(seat, ActionKind::Call, self.bet, reach)?;
                } else {
                    let kind = if amount == reach { ActionKind::AllIn } else { ActionKind::Bet };
                    self.commit_action(seat, kind, amount, reach)?;
                    self.raise_to(seat, amount);
                }
            }
            ActionKind::Call => {
                if to_call == 0 {
                    return Err(ActionError::NothingToCall.into());
                }
                if self.bet >= reach {
                    self.commit_action(seat, ActionKind::AllIn, reach, reach)?;
                } else {
                    self.commit_action(seat, ActionKind::Call, self.bet, reach)?;
                }
            }
            ActionKind::Check => {
                if to_call > 0 {
                    return Err(ActionError::MustCall(self.bet).into());
                }
                self.commit_action(seat, ActionKind::Check, prev, reach)?;
            }
            ActionKind::Fold => {
                self.players[seat].action.kind = ActionKind::Fold;
                self.pots.fold(seat);
            }
            other => {
                return Err(ActionError::InvalidState(format!("{:?} is not a betting action", other)).into());
            }
        }

        let player = &self.players[seat];
        info!(
            seat,
            action = ?player.action.kind,
            amount = player.action.amount,
            chips = player.chip_count,
            "player acted"
        );

        self.set_next_player_turn()?;
        Ok(())
    }

    fn all_in_amount(&self, reach: Chips, prev: Chips) -> Chips {
        let amount = if self.betting_is_impossible() {
            self.bet.min(reach)
        } else {
            let (leader, second) = self.chip_leaders();
            if reach >= self.bet && reach == leader { second } else { reach }
        };
        // a capped all-in still covers the current bet
        amount.max(self.bet.min(reach)).max(prev)
    }

    fn commit_action(&mut self, seat: SeatId, kind: ActionKind, amount: Chips, reach: Chips) -> Result<(), InvariantError> {
        self.pots.commit(seat, amount, kind == ActionKind::AllIn)?;
        let player = &mut self.players[seat];
        player.chip_count = reach - amount;
        player.action = Action::new(kind, amount);
        Ok(())
    }

    fn raise_to(&mut self, seat: SeatId, amount: Chips) {
        self.bet = amount;
        self.better = Some(seat);
        self.state = TableState::PlayerRaised;
        // the new better heads the ring
        self.current.set_head(seat);
    }

    /// Largest and second-largest stacks among contenders, counting what each
    /// has in this stage. Equal leaders report the same value twice.
    fn chip_leaders(&self) -> (Chips, Chips) {
        let counts: Vec<Chips> = self
            .non_folded_seats()
            .into_iter()
            .map(|s| self.players[s].chip_count + self.players[s].action.amount)
            .collect();

        let leader = counts.iter().copied().max().unwrap_or(0);
        if counts.iter().filter(|&&c| c == leader).count() > 1 {
            return (leader, leader);
        }
        let second = counts.iter().copied().filter(|&c| c != leader).max().unwrap_or(leader);
        (leader, second)
    }

    /// Everyone still able to bet has acted and matched the bet.
    fn stage_complete(&self) -> bool {
        self.current.iter().all(|s| {
            let action = self.players[s].action;
            action.kind != ActionKind::FirstAction && action.amount == self.bet
        })
    }

    fn done_betting(&mut self) {
        self.state = TableState::DoneBetting;
        self.better = None;
        self.pots.calculate_side_pot_totals();
        self.pots.close_stage();
        debug!(pot = self.pots.total(), "done betting");
    }

    /// Advances the turn after an action. Folded and all-in seats leave the
    /// current ring. One contender left ends the round; everyone matched
    /// ends the betting stage.
    pub fn set_next_player_turn(&mut self) -> Result<(), InvariantError> {
        if self.state == TableState::NotStarted {
            return Ok(());
        }

        let this = self.cur_player.ok_or(InvariantError::NoCurrentPlayer)?;
        if !self.current.contains(this) {
            return Err(InvariantError::MissingRingMember(this, "current"));
        }

        self.cur_player = match self.players[this].action.kind {
            ActionKind::Fold | ActionKind::AllIn => self.current.remove(this),
            _ => self.current.next_of(this),
        };

        if self.non_folded_seats().len() <= 1 {
            debug!("one contender left");
            self.better = None;
            self.state = TableState::RoundOver;
        } else if self.current.is_empty() || self.stage_complete() {
            self.done_betting();
        }
        Ok(())
    }

    /// Deals the next community stage. After the river the round is over.
    ///
    /// When at least two seats can still bet, a new betting stage opens:
    /// the bet and their actions are cleared and the turn order is rebuilt.
    pub fn next_community_action(&mut self) -> Result<(), TableError> {
        match self.comm_state {
            TableState::PreFlop => {
                self.draw_community(3)?;
                self.comm_state = TableState::Flop;
            }
            TableState::Flop => {
                self.draw_community(1)?;
                self.comm_state = TableState::Turn;
            }
            TableState::Turn => {
                self.draw_community(1)?;
                self.comm_state = TableState::River;
            }
            TableState::River => {
                self.state = TableState::RoundOver;
                return Ok(());
            }
            other => return Err(ActionError::InvalidState(other.to_string()).into()),
        }

        self.state = TableState::Rounds;
        self.refresh_hands();
        debug!(stage = %self.comm_state, "community cards dealt");

        if !self.betting_is_impossible() {
            self.bet = 0;
            self.better = None;
            for seat in self.current.to_vec() {
                self.players[seat].action.clear();
            }
            self.reorder_players()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Card, Rank, Suit};
    use crate::player::ActionKind::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn card(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }

    fn table_with(stacks: &[Chips]) -> Table {
        let config = TableConfig { starting_chips: 1000, ..TableConfig::default() };
        let mut table = Table::with_deck(config, Deck::seeded(7)).unwrap();
        for &stack in stacks {
            let seat = table.take_seat().unwrap();
            table.players[seat].chip_count = stack;
        }
        table
    }

    fn act(table: &mut Table, seat: SeatId, kind: ActionKind, amount: Chips) -> Result<(), TableError> {
        table.player_action(seat, Action::new(kind, amount))
    }

    fn chips_on_table(table: &Table) -> Chips {
        table.occupied_seats().map(|p| p.chip_count).sum::<Chips>() + table.pots.total()
    }

    /// The current ring holds exactly the contenders that can still bet.
    fn assert_ring_valid(table: &Table) {
        let expected: BTreeSet<SeatId> = table
            .active
            .iter()
            .filter(|&s| {
                !matches!(table.players[s].action.kind, Fold | AllIn | MidroundAddition)
            })
            .collect();
        let ring: BTreeSet<SeatId> = table.current.iter().collect();
        assert_eq!(ring, expected, "current ring out of sync");
        assert_eq!(table.current.len(), ring.len());
        if let Some(cur) = table.cur_player {
            if table.in_betting_state() {
                assert!(table.current.contains(cur), "turn pointer dangles at seat {}", cur);
            }
        }
    }

    #[test]
    fn test_take_seat_assigns_markers() {
        let table = table_with(&[1000, 1000, 1000]);
        assert_eq!(table.dealer(), Some(0));
        assert_eq!(table.small_blind(), Some(1));
        assert_eq!(table.big_blind(), Some(2));
        assert_eq!(table.num_players, 3);
        assert_eq!(table.num_open_seats(), 4);
        assert_eq!(table.player(1).unwrap().name, "p1");
    }

    #[test]
    fn test_take_seat_respects_seat_count() {
        let mut table = table_with(&[]);
        table.set_num_seats(2).unwrap();
        assert!(table.take_seat().is_some());
        assert!(table.take_seat().is_some());
        assert_eq!(table.take_seat(), None);
        assert_eq!(table.set_num_seats(8), Err(ActionError::InvalidSeatCount));
        assert_eq!(table.set_num_seats(1), Err(ActionError::InvalidSeatCount));
    }

    #[test]
    fn test_seat_count_cannot_drop_below_players() {
        let mut table = table_with(&[1000, 1000, 1000]);
        assert_eq!(table.set_num_seats(2), Err(ActionError::SeatCountBelowPlayers));
        table.set_num_seats(3).unwrap();
        assert_eq!(table.num_open_seats(), 0);
    }

    #[test]
    fn test_start_game_posts_blinds_and_deals() {
        let mut table = table_with(&[1000, 1000, 1000]);
        let posting = table.start_game().unwrap();
        assert_eq!(posting.small_blind, Some(1));
        assert_eq!(posting.big_blind, Some(2));
        assert!(posting.forced_all_in.is_empty());

        assert_eq!(table.state, TableState::PreFlop);
        assert_eq!(table.player(1).unwrap().chip_count, 995);
        assert_eq!(table.player(2).unwrap().chip_count, 990);
        assert_eq!(table.pots().main_pot().total, 15);
        assert_eq!(table.bet, 10);
        assert_eq!(table.cur_player(), Some(0));
        for seat in 0..3 {
            assert_eq!(table.player(seat).unwrap().hole.len(), 2);
        }
        assert_eq!(table.deck.remaining(), 52 - 6);
        assert_ring_valid(&table);
    }

    #[test]
    fn test_start_game_checks() {
        let mut table = table_with(&[1000]);
        assert_eq!(table.start_game(), Err(ActionError::NotEnoughPlayers.into()));
        table.take_seat();
        table.start_game().unwrap();
        assert_eq!(table.start_game(), Err(ActionError::AlreadyStarted.into()));
    }

    #[test]
    fn test_action_before_start_rejected() {
        let mut table = table_with(&[1000, 1000]);
        assert_eq!(act(&mut table, 0, Check, 0), Err(ActionError::NotStarted.into()));
    }

    #[test]
    fn test_out_of_turn_rejected_without_mutation() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();
        let before = table.pots().total();
        assert_eq!(act(&mut table, 1, Call, 0), Err(ActionError::NotYourTurn.into()));
        assert_eq!(act(&mut table, 5, Call, 0), Err(ActionError::NotAPlayer.into()));
        assert_eq!(table.pots().total(), before);
        assert_eq!(table.player(1).unwrap().chip_count, 995);
        assert_eq!(table.cur_player(), Some(0));
    }

    #[test]
    fn test_preflop_calls_reach_the_flop() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();

        act(&mut table, 0, Call, 0).unwrap();
        act(&mut table, 1, Call, 0).unwrap();
        assert_eq!(table.cur_player(), Some(2));
        // big blind keeps the option
        act(&mut table, 2, Check, 0).unwrap();
        assert_eq!(table.state, TableState::DoneBetting);
        assert_eq!(table.pots().main_pot().total, 30);

        table.next_community_action().unwrap();
        assert_eq!(table.comm_state, TableState::Flop);
        assert_eq!(table.state, TableState::Rounds);
        assert_eq!(table.community.len(), 3);
        assert_eq!(table.bet, 0);
        assert_eq!(table.cur_player(), Some(1));
        assert!(table.player(0).unwrap().hand.is_some());
        assert_ring_valid(&table);
    }

    #[test]
    fn test_small_blind_must_call_big_blind() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();
        act(&mut table, 0, Call, 0).unwrap();
        assert_eq!(act(&mut table, 1, Check, 0), Err(ActionError::MustCall(10).into()));
    }

    #[test]
    fn test_bet_validation() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();
        assert_eq!(act(&mut table, 0, Bet, 5), Err(ActionError::BetBelowAnte(10).into()));
        assert_eq!(act(&mut table, 0, Bet, 10), Err(ActionError::BetNotAboveCurrent(10).into()));
        assert_eq!(act(&mut table, 0, Bet, 5000), Err(ActionError::NotEnoughChips.into()));
        act(&mut table, 0, Bet, 40).unwrap();
        assert_eq!(table.state, TableState::PlayerRaised);
        assert_eq!(table.better(), Some(0));
        assert_eq!(table.bet, 40);
    }

    #[test]
    fn test_raise_reopens_action() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();
        act(&mut table, 0, Bet, 30).unwrap();
        act(&mut table, 1, Bet, 60).unwrap();
        act(&mut table, 2, Call, 0).unwrap();
        assert_eq!(table.cur_player(), Some(0));
        assert_eq!(table.state, TableState::PlayerRaised);
        act(&mut table, 0, Call, 0).unwrap();
        assert_eq!(table.state, TableState::DoneBetting);
        assert_eq!(table.pots().main_pot().total, 180);
    }

    #[test]
    fn test_nothing_to_call_after_flop() {
        let mut table = table_with(&[1000, 1000]);
        table.start_game().unwrap();
        // heads up: dealer 0 is also the big blind, 1 posts the small blind and acts first
        assert_eq!(table.big_blind(), Some(0));
        assert_eq!(table.cur_player(), Some(1));
        act(&mut table, 1, Call, 0).unwrap();
        act(&mut table, 0, Check, 0).unwrap();
        table.next_community_action().unwrap();
        assert_eq!(table.cur_player(), Some(1));
        assert_eq!(act(&mut table, 1, Call, 0), Err(ActionError::NothingToCall.into()));
        act(&mut table, 1, Check, 0).unwrap();
        act(&mut table, 0, Check, 0).unwrap();
        assert_eq!(table.state, TableState::DoneBetting);
    }

    #[test]
    fn test_lone_bettor_must_call_or_fold() {
        let mut table = table_with(&[1000, 1000, 30]);
        table.start_game().unwrap();
        act(&mut table, 0, Fold, 0).unwrap();
        act(&mut table, 1, AllIn, 0).unwrap();
        // seat 1 is the chip leader and is capped at what seat 2 can match
        assert_eq!(table.player(1).unwrap().action.amount, 30);
        assert_eq!(table.player(1).unwrap().chip_count, 970);
        assert_eq!(act(&mut table, 2, Bet, 25), Err(ActionError::MustCallOrFold(30).into()));
        act(&mut table, 2, Call, 0).unwrap();
        assert_eq!(table.player(2).unwrap().action.kind, AllIn);
        assert_eq!(table.state, TableState::DoneBetting);
        assert!(table.betting_is_impossible());
    }

    #[test]
    fn test_win_by_folds() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();
        act(&mut table, 0, Fold, 0).unwrap();
        act(&mut table, 1, Fold, 0).unwrap();
        assert_eq!(table.state, TableState::RoundOver);

        let summary = table.finish_round().unwrap();
        assert!(summary.by_folds);
        assert_eq!(table.player(2).unwrap().chip_count, 1005);
        assert_eq!(table.winners(), &[2]);
        assert_eq!(chips_on_table(&table), 3000);
    }

    #[test]
    fn test_three_stacks_all_in_smallest_first() {
        let mut table = table_with(&[50, 150, 300]);
        table.start_game().unwrap();
        assert_eq!(table.cur_player(), Some(0));

        act(&mut table, 0, AllIn, 0).unwrap();
        act(&mut table, 1, AllIn, 0).unwrap();
        act(&mut table, 2, AllIn, 0).unwrap();
        assert_eq!(table.state, TableState::DoneBetting);
        assert!(table.current.is_empty());

        let main = table.pots().main_pot();
        assert_eq!((main.bet, main.total), (50, 150));
        assert_eq!(main.players, BTreeSet::from([0, 1, 2]));
        assert!(main.is_closed);

        // the chip leader is capped at 150, so its shove only meets the 150
        // boundary: one all-in tier, then an empty betting pot
        let side = table.pots().side_pots();
        assert_eq!(table.pots().boundaries(), &[50, 150]);
        assert_eq!(side.all_in_pots.len(), 1);
        let tier = &side.all_in_pots[0].pot;
        assert_eq!((tier.bet, tier.total), (150, 200));
        assert_eq!(tier.players, BTreeSet::from([1, 2]));
        assert!(tier.is_closed);
        let betting = side.betting_pot.as_ref().unwrap();
        assert_eq!(betting.total, 0);
        assert!(betting.players.is_empty());
        // the 150 nobody can match never leaves the big stack
        assert_eq!(table.player(2).unwrap().chip_count, 150);
        assert_eq!(table.pots().total(), 350);

        while table.state != TableState::RoundOver {
            table.next_community_action().unwrap();
        }
        assert_eq!(table.community.len(), 5);

        table.community = vec![
            card(Rank::Two, Suit::Club),
            card(Rank::Seven, Suit::Diamond),
            card(Rank::Nine, Suit::Heart),
            card(Rank::Jack, Suit::Spade),
            card(Rank::Four, Suit::Club),
        ];
        table.players[0].hole = vec![card(Rank::Ace, Suit::Spade), card(Rank::Ace, Suit::Heart)];
        table.players[1].hole = vec![card(Rank::King, Suit::Spade), card(Rank::King, Suit::Heart)];
        table.players[2].hole = vec![card(Rank::Queen, Suit::Spade), card(Rank::Three, Suit::Heart)];

        let summary = table.finish_round().unwrap();
        assert_eq!(summary.pots.len(), 2);
        assert_eq!(table.player(0).unwrap().chip_count, 150);
        assert_eq!(table.player(1).unwrap().chip_count, 200);
        assert_eq!(table.player(2).unwrap().chip_count, 150);
        assert_eq!(table.state, TableState::ShowHands);
    }

    #[test]
    fn test_short_blind_is_forced_all_in() {
        let mut table = table_with(&[1000, 4, 1000]);
        let posting = table.start_game().unwrap();
        assert_eq!(posting.forced_all_in, vec![1]);
        assert!(!table.current.contains(1));
        assert_eq!(table.player(1).unwrap().action.kind, AllIn);
        assert_eq!(table.pots().boundaries(), &[4]);
        assert_ring_valid(&table);
    }

    #[test]
    fn test_rotation_moves_dealer() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();
        act(&mut table, 0, Fold, 0).unwrap();
        act(&mut table, 1, Fold, 0).unwrap();
        table.finish_round().unwrap();

        table.new_round().unwrap();
        table.next_table_action().unwrap();
        assert_eq!(table.dealer(), Some(1));
        assert_eq!(table.small_blind(), Some(2));
        assert_eq!(table.big_blind(), Some(0));
        assert_eq!(table.cur_player(), Some(1));
        assert_eq!(table.round_count(), 1);
    }

    #[test]
    fn test_ante_doubles_on_interval() {
        let mut table = table_with(&[1000, 1000]);
        table.config.ante_double_interval = 2;
        table.start_game().unwrap();
        table.new_round().unwrap();
        assert_eq!(table.ante, 10);
        table.new_round().unwrap();
        assert_eq!(table.ante, 20);
        assert_eq!(table.bet, 20);
    }

    #[test]
    fn test_midround_addition_waits_for_next_round() {
        let mut table = table_with(&[1000, 1000]);
        table.start_game().unwrap();
        let seat = table.take_seat().unwrap();
        assert_eq!(table.player(seat).unwrap().action.kind, MidroundAddition);
        assert!(table.active.contains(seat));
        assert!(!table.current.contains(seat));
        assert_ring_valid(&table);

        table.new_round().unwrap();
        assert_eq!(table.player(seat).unwrap().action.kind, FirstAction);
        assert!(table.current.contains(seat));
    }

    #[test]
    fn test_departure_on_turn_folds_and_moves_on() {
        let mut table = table_with(&[1000, 1000, 1000, 1000]);
        table.start_game().unwrap();
        assert_eq!(table.cur_player(), Some(3));
        assert!(table.forfeit_turn(3).unwrap());
        assert_eq!(table.cur_player(), Some(0));
        assert_eq!(table.remove_player(3).unwrap(), Departure::Continue);
        assert!(!table.active.contains(3));
        assert!(table.player(3).unwrap().is_vacant);
        assert_ring_valid(&table);
    }

    #[test]
    fn test_departure_of_big_blind_repairs_markers() {
        let mut table = table_with(&[1000, 1000, 1000, 1000]);
        table.start_game().unwrap();
        assert_eq!(table.remove_player(2).unwrap(), Departure::Continue);
        assert_eq!(table.big_blind(), None);
        // chips the big blind posted stay in the pot
        assert_eq!(table.pots().total(), 15);

        act(&mut table, 3, Call, 0).unwrap();
        act(&mut table, 0, Call, 0).unwrap();
        act(&mut table, 1, Call, 0).unwrap();
        assert_eq!(table.state, TableState::DoneBetting);
        table.next_community_action().unwrap();
        assert_eq!(table.cur_player(), Some(1));

        table.new_round().unwrap();
        assert!(table.big_blind().is_some());
        table.next_table_action().unwrap();
        assert_ring_valid(&table);
    }

    #[test]
    fn test_departure_leaving_one_contender_ends_round() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();
        act(&mut table, 0, Fold, 0).unwrap();
        assert_eq!(table.remove_player(2).unwrap(), Departure::Continue);
        assert_eq!(table.state, TableState::RoundOver);
        let summary = table.finish_round().unwrap();
        assert!(summary.by_folds);
        assert_eq!(table.winners(), &[1]);
    }

    #[test]
    fn test_last_departures() {
        let mut table = table_with(&[1000, 1000]);
        table.start_game().unwrap();
        assert_eq!(table.remove_player(0).unwrap(), Departure::OnePlayerLeft(1));
        assert_eq!(table.remove_player(1).unwrap(), Departure::Empty);
        assert_eq!(table.num_players, 0);
    }

    #[test]
    fn test_elimination_ends_game() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.players[0].chip_count = 0;
        table.players[1].chip_count = 0;
        let out = table.eliminated_players();
        assert_eq!(out, vec![0, 1]);
        assert_eq!(table.state, TableState::GameOver);
        assert_eq!(table.game_winner(), Some(2));
    }

    #[test]
    fn test_reset_keeps_winner() {
        let mut table = table_with(&[1000, 1000, 1000]);
        table.start_game().unwrap();
        table.reset(Some(2));
        assert_eq!(table.state, TableState::NotStarted);
        assert_eq!(table.num_players, 1);
        assert_eq!(table.active.to_vec(), vec![2]);
        assert_eq!(table.dealer(), Some(2));
        assert!(table.player(0).unwrap().is_vacant);
        assert_eq!(table.player(2).unwrap().chip_count, 1000);
        assert_eq!(table.pots().total(), 0);

        // the next two joiners take the blinds
        table.take_seat();
        table.take_seat();
        assert_eq!(table.small_blind(), Some(0));
        assert_eq!(table.big_blind(), Some(1));
    }

    /// Random legal play over many hands: the current ring always matches the
    /// contenders that can bet, and chips are never created or destroyed.
    #[test]
    fn test_random_play_keeps_rings_and_chips() {
        let mut rng = StdRng::seed_from_u64(0x7ab1e);

        for game in 0..40 {
            let n = rng.random_range(2..=7);
            let stacks: Vec<Chips> = (0..n).map(|_| rng.random_range(5..=300)).collect();
            let config = TableConfig { starting_chips: 200, ante_double_interval: 3, ..TableConfig::default() };
            let mut table = Table::with_deck(config, Deck::seeded(game)).unwrap();
            for &stack in &stacks {
                let seat = table.take_seat().unwrap();
                table.players[seat].chip_count = stack;
            }
            let mut total = chips_on_table(&table);
            table.start_game().unwrap();

            for _ in 0..400 {
                assert_eq!(chips_on_table(&table), total);
                match table.state {
                    TableState::PreFlop | TableState::Rounds | TableState::PlayerRaised => {
                        let seat = table.cur_player().unwrap();
                        let chips = table.player(seat).unwrap().chip_count;
                        let choice = match rng.random_range(0..8) {
                            0 => Action::new(Fold, 0),
                            1 => Action::new(AllIn, 0),
                            2 | 3 => Action::new(Bet, table.bet + rng.random_range(1..=chips.max(1))),
                            4 | 5 => Action::new(Call, 0),
                            _ => Action::new(Check, 0),
                        };
                        if table.player_action(seat, choice).is_err() {
                            let fallback = if table.bet > table.player(seat).unwrap().action.amount { Call } else { Check };
                            if table.player_action(seat, Action::new(fallback, 0)).is_err() {
                                table.player_action(seat, Action::new(Fold, 0)).unwrap();
                            }
                        }
                        assert_ring_valid(&table);
                        table.pots().check_conservation().unwrap();
                    }
                    TableState::DoneBetting => {
                        assert_ring_valid(&table);
                        if table.betting_is_impossible() {
                            while table.state != TableState::RoundOver {
                                table.next_community_action().unwrap();
                            }
                        } else {
                            table.next_community_action().unwrap();
                        }
                    }
                    TableState::RoundOver => {
                        let before = chips_on_table(&table);
                        table.finish_round().unwrap();
                        assert_eq!(table.pots().total(), 0);
                        assert_eq!(chips_on_table(&table), before);
                        for seat in table.eliminated_players() {
                            table.remove_player(seat).unwrap();
                        }
                        if table.state == TableState::GameOver {
                            break;
                        }
                        total = chips_on_table(&table);
                        table.new_round().unwrap();
                        table.next_table_action().unwrap();
                    }
                    TableState::ShowHands | TableState::SplitPot => {
                        unreachable!("settlement states are left by the round-over branch")
                    }
                    other => panic!("unexpected state {:?}", other),
                }
            }
        }
    }
}
