use crate::card::Chips;
use crate::format::ChipFormatter;
use crate::player::SeatId;
use thiserror::Error;

/// An illegal request given the table's state. Nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("game has not started yet")]
    NotStarted,
    #[error("this game has already started")]
    AlreadyStarted,
    #[error("not enough players to start")]
    NotEnoughPlayers,
    #[error("invalid table state: {0}")]
    InvalidState(String),
    #[error("it's not your turn")]
    NotYourTurn,
    #[error("you are not a player")]
    NotAPlayer,
    #[error("bet must be greater than the ante ({0} chips)")]
    BetBelowAnte(Chips),
    #[error("bet must be greater than the current bet ({0} chips)")]
    BetNotAboveCurrent(Chips),
    #[error("not enough chips")]
    NotEnoughChips,
    #[error("nothing to call")]
    NothingToCall,
    #[error("you must call the raise ({0} chips)")]
    MustCall(Chips),
    #[error("you must call the raise ({0} chips) or fold")]
    MustCallOrFold(Chips),
    #[error("numSeats must be between 2 and 7")]
    InvalidSeatCount,
    #[error("numSeats must be greater than the current number of players")]
    SeatCountBelowPlayers,
}

impl ActionError {
    /// The reason as shown to players, with amounts run through `fmt`.
    pub fn describe(&self, fmt: &ChipFormatter) -> String {
        match self {
            ActionError::BetBelowAnte(c) => format!("bet must be greater than the ante ({})", fmt.chips(*c)),
            ActionError::BetNotAboveCurrent(c) => {
                format!("bet must be greater than the current bet ({})", fmt.chips(*c))
            }
            ActionError::MustCall(c) => format!("you must call the raise ({})", fmt.chips(*c)),
            ActionError::MustCallOrFold(c) => format!("you must call the raise ({}) or fold", fmt.chips(*c)),
            ActionError::InvalidSeatCount => "the number of seats must be between 2 and 7".to_string(),
            ActionError::SeatCountBelowPlayers => {
                "the number of seats can't be lower than the number of seated players".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// A chip-accounting or roster impossibility. Fatal for the table that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    #[error("seat {seat} contributed {contributed} but an open side pot requires {boundary}")]
    BoundaryNotCovered { seat: SeatId, contributed: Chips, boundary: Chips },
    #[error("seat {seat} contribution went from {was} down to {now}")]
    ContributionDecreased { seat: SeatId, was: Chips, now: Chips },
    #[error("seat {0} is not in the {1} ring")]
    MissingRingMember(SeatId, &'static str),
    #[error("no {0} seat is set")]
    MissingMarker(&'static str),
    #[error("side pot index {index} out of range ({len} pots)")]
    SidePotIndex { index: usize, len: usize },
    #[error("{0} chips are not claimed by any contender")]
    UnclaimedPot(Chips),
    #[error("chips not conserved: {wagered} wagered but pots hold {pots}")]
    ChipsNotConserved { wagered: Chips, pots: Chips },
    #[error("the deck ran out of cards")]
    DeckExhausted,
    #[error("no current player while betting is in progress")]
    NoCurrentPlayer,
}

/// Any failure coming out of the table engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}
