use crate::card::{Card, Chips, Deck};
use crate::format::ChipFormatter;
use crate::player::{Player, PlayerList, PlayerView, SeatId};
use crate::pot::{Pot, PotLedger};
use crate::showdown::RoundSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_SEATS: usize = 2;
pub const MAX_SEATS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableState {
    NotStarted,
    // community stages, also tracked separately in `comm_state`
    PreFlop,
    Flop,
    Turn,
    River,
    // betting
    Rounds,
    PlayerRaised,
    DoneBetting,
    // settlement
    ShowHands,
    SplitPot,
    RoundOver,
    NewRound,
    GameOver,
    Reset,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            TableState::NotStarted => "waiting for start",
            TableState::PreFlop => "preflop",
            TableState::Flop => "flop",
            TableState::Turn => "turn",
            TableState::River => "river",
            TableState::Rounds => "betting rounds",
            TableState::PlayerRaised => "player raised",
            TableState::DoneBetting => "finished betting",
            TableState::ShowHands => "showing hands",
            TableState::SplitPot => "split pot",
            TableState::RoundOver => "round over",
            TableState::NewRound => "new round",
            TableState::GameOver => "game over",
            TableState::Reset => "reset",
        })
    }
}

/// Restricts who may join the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableLock {
    #[default]
    None,
    /// New connections may only spectate.
    PlayersLocked,
    /// New connections are refused once every seat is taken.
    SpectatorsLocked,
    /// Nobody new may connect.
    AllLocked,
}

impl fmt::Display for TableLock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            TableLock::None => "no lock",
            TableLock::PlayersLocked => "player lock",
            TableLock::SpectatorsLocked => "spectator lock",
            TableLock::AllLocked => "player & spectator lock",
        })
    }
}

/// Knobs a table is created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub num_seats: usize,
    pub starting_chips: Chips,
    pub ante: Chips,
    /// Rounds between ante doublings; 0 keeps the ante fixed.
    pub ante_double_interval: u64,
    pub formatter: ChipFormatter,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            num_seats: MAX_SEATS,
            starting_chips: 100_000,
            ante: 10,
            ante_double_interval: 10,
            formatter: ChipFormatter::default(),
        }
    }
}

/// The aggregate root: seats, the two rings, markers, pots and the state machine.
///
/// Seats are allocated once for the largest table size and are never dropped;
/// `num_seats` only limits how many of them may be occupied at a time.
#[derive(Debug, Clone)]
pub struct Table {
    pub(crate) config: TableConfig,
    pub(crate) deck: Deck,
    pub community: Vec<Card>,
    pub(crate) pots: PotLedger,

    pub(crate) players: Vec<Player>,
    /// everyone seated, survives folds
    pub(crate) active: PlayerList,
    /// still able to bet this stage
    pub(crate) current: PlayerList,
    pub(crate) cur_player: Option<SeatId>,
    pub(crate) better: Option<SeatId>,

    pub(crate) dealer: Option<SeatId>,
    pub(crate) small_blind: Option<SeatId>,
    pub(crate) big_blind: Option<SeatId>,

    pub ante: Chips,
    pub bet: Chips,
    pub state: TableState,
    pub comm_state: TableState,
    pub lock: TableLock,
    pub password: String,
    pub num_seats: usize,
    pub num_players: usize,
    pub num_connected: usize,

    pub(crate) round_count: u64,
    pub(crate) winners: Vec<SeatId>,
    pub(crate) game_winner: Option<SeatId>,
    pub(crate) last_summary: Option<RoundSummary>,
}

impl Table {
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn formatter(&self) -> &ChipFormatter {
        &self.config.formatter
    }

    pub fn pots(&self) -> &PotLedger {
        &self.pots
    }

    pub fn player(&self, seat: SeatId) -> Option<&Player> {
        self.players.get(seat)
    }

    pub fn player_mut(&mut self, seat: SeatId) -> Option<&mut Player> {
        self.players.get_mut(seat)
    }

    pub fn seats(&self) -> &[Player] {
        &self.players
    }

    pub fn active_players(&self) -> &PlayerList {
        &self.active
    }

    pub fn cur_players(&self) -> &PlayerList {
        &self.current
    }

    pub fn cur_player(&self) -> Option<SeatId> {
        self.cur_player
    }

    pub fn better(&self) -> Option<SeatId> {
        self.better
    }

    pub fn dealer(&self) -> Option<SeatId> {
        self.dealer
    }

    pub fn small_blind(&self) -> Option<SeatId> {
        self.small_blind
    }

    pub fn big_blind(&self) -> Option<SeatId> {
        self.big_blind
    }

    pub fn round_count(&self) -> u64 {
        self.round_count
    }

    pub fn winners(&self) -> &[SeatId] {
        &self.winners
    }

    /// Set once eliminations or departures leave a single player standing.
    pub fn game_winner(&self) -> Option<SeatId> {
        self.game_winner
    }

    pub fn last_summary(&self) -> Option<&RoundSummary> {
        self.last_summary.as_ref()
    }

    pub fn num_open_seats(&self) -> usize {
        self.num_seats.saturating_sub(self.num_players)
    }

    pub fn occupied_seats(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.is_vacant)
    }

    pub fn default_player_names(&self) -> Vec<&str> {
        self.players.iter().map(|p| p.default_name()).collect()
    }

    pub fn in_betting_state(&self) -> bool {
        !matches!(
            self.state,
            TableState::NotStarted
                | TableState::DoneBetting
                | TableState::RoundOver
                | TableState::ShowHands
                | TableState::SplitPot
                | TableState::NewRound
                | TableState::GameOver
                | TableState::Reset
        )
    }

    /// At most one player can still put chips in.
    pub fn betting_is_impossible(&self) -> bool {
        self.current.len() < 2
    }

    fn seat_name(&self, seat: Option<SeatId>) -> Option<String> {
        seat.and_then(|s| self.players.get(s)).map(|p| p.name.clone())
    }

    /// Public projection of a seat. Cards stay hidden unless hands are being
    /// shown or `own` is set (the view goes to the seat's own client).
    pub fn player_view(&self, seat: SeatId, own: bool) -> Option<PlayerView> {
        let reveal = own || matches!(self.state, TableState::ShowHands | TableState::SplitPot);
        self.players.get(seat).map(|p| p.view(reveal))
    }

    pub fn view(&self) -> TableView {
        let side = self.pots.side_pots();
        TableView {
            community: self.community.clone(),
            main_pot: self.pots.main_pot().clone(),
            side_pots: side.all_in_pots.iter().map(|sp| sp.pot.clone()).collect(),
            betting_pot: side.betting_pot.clone(),
            ante: self.ante,
            bet: self.bet,
            dealer: self.seat_name(self.dealer),
            small_blind: self.seat_name(self.small_blind),
            big_blind: self.seat_name(self.big_blind),
            state: self.state,
            comm_state: self.comm_state,
            num_seats: self.num_seats,
            num_players: self.num_players,
            num_open_seats: self.num_open_seats(),
            lock: self.lock,
            needs_password: !self.password.is_empty(),
            num_connected: self.num_connected,
            cur_player: self.cur_player,
            player_head: self.current.head(),
        }
    }
}

/// Serializable snapshot of the table for clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    pub community: Vec<Card>,
    pub main_pot: Pot,
    pub side_pots: Vec<Pot>,
    pub betting_pot: Option<Pot>,
    pub ante: Chips,
    pub bet: Chips,
    pub dealer: Option<String>,
    pub small_blind: Option<String>,
    pub big_blind: Option<String>,
    pub state: TableState,
    pub comm_state: TableState,
    pub num_seats: usize,
    pub num_players: usize,
    pub num_open_seats: usize,
    pub lock: TableLock,
    pub needs_password: bool,
    pub num_connected: usize,
    pub cur_player: Option<SeatId>,
    pub player_head: Option<SeatId>,
}

impl TableView {
    pub fn pot_total(&self) -> Chips {
        self.main_pot.total
            + self.side_pots.iter().map(|p| p.total).sum::<Chips>()
            + self.betting_pot.as_ref().map_or(0, |p| p.total)
    }
}
