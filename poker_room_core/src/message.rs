use crate::player::{Action, PlayerView};
use crate::showdown::RoundSummary;
use crate::state::{TableLock, TableView};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public identifier of a connected client.
pub type ClientId = Uuid;
/// Secret handed to a client once, used to reclaim its seat after a disconnect.
pub type PrivateId = Uuid;

// --- client -> server ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ClientMessage {
    /// First message on a fresh connection.
    NewConnection(ClientSettings),
    /// First message on a fresh connection that wants an old seat back.
    Reconnect { private_id: PrivateId },
    /// Clean goodbye: the client leaves and any seat is vacated at once.
    ClientExited,
    /// Gives up the seat but stays connected as a spectator.
    PlayerLeft,
    ClientSettings(ClientSettings),
    StartGame,
    Chat(String),
    PlayerAction(Action),
}

/// Settings a client sends on connect and whenever it changes them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ClientSettings {
    pub name: String,
    pub is_spectator: bool,
    /// Room password, checked on connect.
    pub password: String,
    /// Only honored for the table admin.
    pub admin: Option<AdminSettings>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AdminSettings {
    pub room_name: String,
    pub num_seats: usize,
    pub lock: TableLock,
    pub password: String,
}

// --- server -> client ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ServerKind {
    NewConnection,
    YourPlayer,
    NewPlayer,
    CurrentPlayers,
    UpdatePlayer,
    UpdateTable,
    PlayerLeft,
    ClientExited,
    ClientSettings,
    Reset,
    MakeAdmin,
    StartGame,
    Chat,
    PlayerAction,
    PlayerTurn,
    PlayerHead,
    Deal,
    Flop,
    Turn,
    River,
    RoundOver,
    Eliminated,
    PlayerReconnecting,
    PlayerReconnected,
    ServerMessage,
    BadRequest,
    TableLocked,
    BadAuth,
    ServerClosed,
}

/// What a client learns about itself or another client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    /// Only ever sent to the client it belongs to.
    pub private_id: Option<PrivateId>,
    pub name: String,
    pub room_name: String,
    pub is_admin: bool,
    pub is_spectator: bool,
}

/// A notification. Every kind carries the same optional payloads; which of
/// them are filled depends on the kind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerMessage {
    pub kind: ServerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<PlayerView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RoundSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ServerMessage {
    pub fn new(kind: ServerKind) -> ServerMessage {
        ServerMessage { kind, client: None, player: None, players: Vec::new(), table: None, summary: None, msg: None }
    }

    pub fn text(kind: ServerKind, msg: impl Into<String>) -> ServerMessage {
        ServerMessage::new(kind).with_msg(msg)
    }

    pub fn with_client(mut self, client: ClientInfo) -> ServerMessage {
        self.client = Some(client);
        self
    }

    pub fn with_player(mut self, player: PlayerView) -> ServerMessage {
        self.player = Some(player);
        self
    }

    pub fn with_players(mut self, players: Vec<PlayerView>) -> ServerMessage {
        self.players = players;
        self
    }

    pub fn with_table(mut self, table: TableView) -> ServerMessage {
        self.table = Some(table);
        self
    }

    pub fn with_summary(mut self, summary: RoundSummary) -> ServerMessage {
        self.summary = Some(summary);
        self
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> ServerMessage {
        self.msg = Some(msg.into());
        self
    }
}

impl From<Action> for ClientMessage {
    fn from(action: Action) -> Self {
        ClientMessage::PlayerAction(action)
    }
}
