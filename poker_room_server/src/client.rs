use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use poker_room_core::{ClientId, ClientInfo, PrivateId, SeatId, ServerMessage};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Identifies one websocket connection. A client keeps its id across
/// reconnects but gets a new connection id each time.
pub type ConnId = Uuid;

/// Channel feeding a connection's writer task.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// A connected (or briefly disconnected) participant in a room.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub private_id: PrivateId,
    pub name: String,
    pub seat: Option<SeatId>,
    pub is_spectator: bool,
    conn: Option<(ConnId, Outbox)>,
    /// Bumped on every disconnect and reconnect; a pending vacate timer only
    /// fires if the epoch it captured is still current.
    epoch: u64,
    /// Set when the outbox overflowed. Nothing more is queued until the
    /// room drops the connection.
    lagged: AtomicBool,
}

impl Client {
    pub fn new(conn: ConnId, outbox: Outbox) -> Client {
        Client {
            id: Uuid::new_v4(),
            private_id: Uuid::new_v4(),
            name: String::new(),
            seat: None,
            is_spectator: true,
            conn: Some((conn, outbox)),
            epoch: 0,
            lagged: AtomicBool::new(false),
        }
    }

    /// First seven characters of the public id.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string().chars().take(7).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn is_bound_to(&self, conn: ConnId) -> bool {
        matches!(self.conn, Some((c, _)) if c == conn)
    }

    pub fn conn_id(&self) -> Option<ConnId> {
        self.conn.as_ref().map(|(c, _)| *c)
    }

    pub fn is_lagged(&self) -> bool {
        self.lagged.load(Ordering::Relaxed)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Drops the connection and returns the new epoch.
    pub fn unbind(&mut self) -> u64 {
        self.conn = None;
        self.epoch += 1;
        self.epoch
    }

    pub fn rebind(&mut self, conn: ConnId, outbox: Outbox) {
        self.conn = Some((conn, outbox));
        self.epoch += 1;
        self.lagged.store(false, Ordering::Relaxed);
    }

    /// `private` is only set for the client's own copy.
    pub fn info(&self, room_name: &str, is_admin: bool, private: bool) -> ClientInfo {
        ClientInfo {
            id: self.id,
            private_id: private.then_some(self.private_id),
            name: self.name.clone(),
            room_name: room_name.to_string(),
            is_admin,
            is_spectator: self.seat.is_none(),
        }
    }

    /// Queues `msg` without waiting. A full outbox marks the client lagged
    /// instead of holding up the room.
    pub async fn send(&self, msg: ServerMessage) {
        let Some((_, outbox)) = &self.conn else { return };
        if self.is_lagged() {
            return;
        }
        match outbox.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client = %self.id, "outbox full, dropping slow connection");
                self.lagged.store(true, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(client = %self.id, "failed to queue message (connection closing)");
            }
        }
    }
}

/// Everyone in a room, plus who administers the table.
#[derive(Debug, Default)]
pub struct Clients {
    by_id: HashMap<ClientId, Client>,
    pub admin: Option<ClientId>,
}

impl Clients {
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn insert(&mut self, client: Client) {
        self.by_id.insert(client.id, client);
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        if self.admin == Some(id) {
            self.admin = None;
        }
        self.by_id.remove(&id)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.by_id.get_mut(&id)
    }

    pub fn by_private_mut(&mut self, private_id: PrivateId) -> Option<&mut Client> {
        self.by_id.values_mut().find(|c| c.private_id == private_id)
    }

    pub fn by_seat(&self, seat: SeatId) -> Option<&Client> {
        self.by_id.values().find(|c| c.seat == Some(seat))
    }

    pub fn is_admin(&self, id: ClientId) -> bool {
        self.admin == Some(id)
    }

    /// Some other client already goes by `name`.
    pub fn name_taken(&self, name: &str, except: ClientId) -> bool {
        self.by_id.values().any(|c| c.id != except && c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.by_id.values()
    }

    /// Clients whose outbox overflowed, with the connection to drop.
    pub fn lagged(&self) -> Vec<(ClientId, ConnId)> {
        self.by_id
            .values()
            .filter(|c| c.is_lagged())
            .filter_map(|c| c.conn_id().map(|conn| (c.id, conn)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.admin = None;
    }

    pub async fn send_to(&self, id: ClientId, msg: ServerMessage) {
        if let Some(client) = self.by_id.get(&id) {
            client.send(msg).await;
        }
    }

    pub async fn broadcast(&self, msg: &ServerMessage, exclude: Option<ClientId>) {
        for client in self.by_id.values() {
            if Some(client.id) == exclude {
                continue;
            }
            client.send(msg.clone()).await;
        }
    }
}
