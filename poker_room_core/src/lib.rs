//! # Poker room core
//!
//! Everything a poker table needs that does not touch the network: cards and
//! the deck, hand evaluation, the seat rings, the side-pot ledger, the betting
//! state machine and the message vocabulary spoken between clients and the
//! server. The server crate drives a [`Table`] and fans out [`ServerMessage`]s;
//! nothing here knows about sockets.

mod card;
mod error;
mod format;
mod hand;
mod logic;
mod message;
mod player;
mod pot;
mod showdown;
mod state;

pub use card::*;
pub use error::*;
pub use format::*;
pub use hand::*;
pub use logic::*;
pub use message::*;
pub use player::*;
pub use pot::*;
pub use showdown::*;
pub use state::*;
