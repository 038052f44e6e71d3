use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock as P_RwLock;
use poker_room_core::{
    Action, ActionError, AdminSettings, ClientId, ClientInfo, ClientMessage, ClientSettings, Departure,
    InvariantError, PrivateId, RoundSummary, SeatId, ServerKind, ServerMessage, Table, TableError, TableLock,
    TableState, TableView,
};
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

use crate::client::{Client, Clients, ConnId, Outbox};
use crate::config::ServerConfig;
use crate::error::RoomError;
use crate::session::AppState;

pub const MAX_NAME_LEN: usize = 15;
pub const MAX_PASSWORD_LEN: usize = 50;
pub const MAX_ROOM_NAME_LEN: usize = 50;
const SPECTATOR_NAME: &str = "spectator";

/// Whether the connection should keep reading after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// One table and everyone connected to it.
///
/// Lock order is table -> clients. Never wait on the table while holding
/// the clients lock. Every table mutation, and the broadcasts that report
/// it, happen under the table lock so clients see state changes in order.
pub struct Room {
    name: P_RwLock<String>,
    config: Arc<ServerConfig>,
    app: Weak<AppState>,
    table: Mutex<Table>,
    clients: RwLock<Clients>,
    closed: AtomicBool,
    /// Set when the last client left and the room dropped out of the directory.
    retired: AtomicBool,
    /// Odd while a settings change holds the table. Bumped on entry and exit.
    settings_seq: AtomicU64,
}

/// Marks the end of a settings change when dropped.
struct SettingsChange<'a>(&'a AtomicU64);

impl<'a> SettingsChange<'a> {
    fn begin(seq: &'a AtomicU64) -> SettingsChange<'a> {
        seq.fetch_add(1, Ordering::SeqCst);
        SettingsChange(seq)
    }
}

impl Drop for SettingsChange<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Room {
    pub fn new(name: &str, config: Arc<ServerConfig>, app: Weak<AppState>) -> Result<Arc<Room>, ActionError> {
        let table = Table::new(config.room.table.clone())?;
        info!(room = name, seats = table.num_seats, "room created");
        Ok(Arc::new(Room {
            name: P_RwLock::new(name.to_string()),
            config,
            app,
            table: Mutex::new(table),
            clients: RwLock::new(Clients::default()),
            closed: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            settings_seq: AtomicU64::new(0),
        }))
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Set once the table hit an invariant error. A closed room accepts nothing.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The room emptied out and left the directory. Joins should go to a
    /// fresh room under the same name.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub async fn num_clients(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn admin(&self) -> Option<ClientId> {
        self.clients.read().await.admin
    }

    pub async fn seat_of(&self, id: ClientId) -> Option<SeatId> {
        self.clients.read().await.get(id).and_then(|c| c.seat)
    }

    pub async fn table_view(&self) -> TableView {
        self.table.lock().await.view()
    }

    /// Runs `f` against the table, waiting for whatever is in progress.
    pub async fn with_table<R>(&self, f: impl FnOnce(&Table) -> R) -> R {
        f(&*self.table.lock().await)
    }

    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn info(&self, clients: &Clients, client: &Client, private: bool) -> ClientInfo {
        client.info(&self.name(), clients.is_admin(client.id), private)
    }

    // --- connecting ---

    /// Admits a fresh connection. Returns the new client's id, or `None` if
    /// the connection was turned away (the reason has already been sent).
    pub async fn join(&self, conn: ConnId, outbox: Outbox, settings: ClientSettings) -> Option<ClientId> {
        if self.is_closed() {
            let _ = outbox.try_send(ServerMessage::text(ServerKind::ServerClosed, "this table has closed"));
            return None;
        }
        let mut table = self.table.lock().await;
        if self.is_retired() {
            debug!(room = %self.name(), "join raced the room's removal");
            return None;
        }

        if table.lock == TableLock::AllLocked {
            let _ = outbox.try_send(ServerMessage::text(ServerKind::TableLocked, format!("table lock: {}", table.lock)));
            return None;
        }
        if !table.password.is_empty() && settings.password != table.password {
            info!(room = %self.name(), "wrong password on connect");
            let _ = outbox.try_send(ServerMessage::text(ServerKind::BadAuth, "your password was incorrect"));
            return None;
        }

        let mut clients = self.clients.write().await;
        let mut client = Client::new(conn, outbox);
        let id = client.id;

        // only a refused or defaulted name is worth a note on connect
        let (name, note) = check_name(&clients, &table, id, &settings.name, "");
        let note = note.filter(|_| name.as_deref().is_none_or(str::is_empty));
        client.name = name.unwrap_or_default();

        // decide the seat before anyone hears about the newcomer
        let mut seat = None;
        let mut seat_note = None;
        if !settings.is_spectator {
            if table.lock == TableLock::PlayersLocked {
                seat_note = Some("This table is not allowing new players. You have been added as a spectator.");
            } else if let Some(s) = table.take_seat() {
                if let Some(player) = table.player_mut(s) {
                    player.set_name(&client.name);
                    client.name = player.name.clone();
                }
                client.seat = Some(s);
                client.is_spectator = false;
                seat = Some(s);
            } else if table.lock == TableLock::SpectatorsLocked {
                info!(room = %self.name(), "no seat and spectators locked, refusing connection");
                client
                    .send(ServerMessage::text(ServerKind::TableLocked, format!("table lock: {}", table.lock)))
                    .await;
                return None;
            } else {
                seat_note = Some("No open seats available. You have been added as a spectator");
            }
        }
        if client.name.is_empty() {
            client.name = SPECTATOR_NAME.to_string();
        }

        table.num_connected += 1;
        clients.insert(client);
        let client = clients.get(id)?;
        info!(room = %self.name(), client = %id, name = %client.name, ?seat, "client joined");

        let view = table.view();
        clients
            .broadcast(&ServerMessage::new(ServerKind::NewConnection).with_client(self.info(&clients, client, false)).with_table(view.clone()), Some(id))
            .await;
        client
            .send(
                ServerMessage::new(ServerKind::NewConnection)
                    .with_client(self.info(&clients, client, true))
                    .with_table(view.clone())
                    .with_msg(client.private_id.to_string()),
            )
            .await;
        if table.num_connected > 1 {
            let players = table.occupied_seats().filter(|p| Some(p.seat) != seat).map(|p| p.view(false)).collect();
            client.send(ServerMessage::new(ServerKind::CurrentPlayers).with_players(players).with_table(view.clone())).await;
        }

        if seat.is_some() {
            self.announce_player(&table, &clients, id).await;
        }
        if let Some(note) = seat_note {
            client.send(ServerMessage::text(ServerKind::ServerMessage, note)).await;
        }
        if let Some(note) = note {
            client.send(ServerMessage::text(ServerKind::ServerMessage, note)).await;
        }

        if seat.is_some() && clients.admin.is_none() {
            self.make_admin(&mut clients, &table, id).await;
        }

        clients.send_to(id, ServerMessage::new(ServerKind::UpdateTable).with_table(table.view())).await;
        if table.state != TableState::NotStarted {
            self.send_player_turn(&table, &clients, Some(id)).await;
        }
        Some(id)
    }

    /// Rebinds a client that lost its connection, using the private id it
    /// was handed on first connect.
    pub async fn reconnect(&self, conn: ConnId, outbox: Outbox, private_id: PrivateId) -> Option<ClientId> {
        if self.is_closed() {
            let _ = outbox.try_send(ServerMessage::text(ServerKind::ServerClosed, "this table has closed"));
            return None;
        }
        let table = self.table.lock().await;
        let mut clients = self.clients.write().await;

        let Some(client) = clients.by_private_mut(private_id) else {
            info!(room = %self.name(), "reconnect with unknown private id");
            let _ = outbox.try_send(ServerMessage::text(
                ServerKind::BadRequest,
                "failed to reconnect: invalid or expired private ID",
            ));
            return None;
        };
        client.rebind(conn, outbox);
        let id = client.id;
        info!(room = %self.name(), client = %id, name = %client.name, "client reconnected");

        let clients = RwLockWriteGuard::downgrade(clients);
        if let Some(client) = clients.get(id) {
            let msg = ServerMessage::new(ServerKind::PlayerReconnected).with_client(self.info(&clients, client, false));
            clients.broadcast(&msg, Some(id)).await;
        }
        self.replay(&table, &clients, id).await;
        Some(id)
    }

    /// Sends a reconnected client everything it needs to redraw the table.
    async fn replay(&self, table: &Table, clients: &Clients, id: ClientId) {
        let Some(client) = clients.get(id) else { return };
        let view = table.view();

        client.send(ServerMessage::new(ServerKind::ClientSettings).with_client(self.info(clients, client, true))).await;
        if let Some(own) = client.seat.and_then(|s| table.player_view(s, true)) {
            let msg = ServerMessage::new(ServerKind::YourPlayer)
                .with_client(self.info(clients, client, true))
                .with_player(own)
                .with_table(view.clone());
            client.send(msg).await;
        }
        let others = table
            .occupied_seats()
            .filter(|p| Some(p.seat) != client.seat)
            .filter_map(|p| table.player_view(p.seat, false))
            .collect();
        client.send(ServerMessage::new(ServerKind::CurrentPlayers).with_players(others).with_table(view.clone())).await;
        client.send(ServerMessage::new(ServerKind::UpdateTable).with_table(view)).await;
        if table.state != TableState::NotStarted {
            self.send_player_turn(table, clients, Some(id)).await;
        }
    }

    /// Called when a connection ends. A clean exit (or a spectator) is
    /// removed at once; a seated player keeps the seat for the reconnect
    /// grace period.
    pub async fn disconnect(self: &Arc<Self>, id: ClientId, conn: ConnId, clean: bool) {
        let (epoch, seated) = {
            let mut clients = self.clients.write().await;
            let Some(client) = clients.get_mut(id) else { return };
            if !client.is_bound_to(conn) {
                debug!(client = %id, "stale connection closed");
                return;
            }
            (client.unbind(), client.seat.is_some())
        };

        if clean || !seated || self.is_closed() {
            self.remove_client(id, None).await;
            return;
        }

        info!(room = %self.name(), client = %id, "connection lost, holding seat");
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(id) {
                let msg = ServerMessage::new(ServerKind::PlayerReconnecting).with_client(self.info(&clients, client, false));
                clients.broadcast(&msg, Some(id)).await;
            }
        }

        let room = Arc::clone(self);
        let grace = self.config.reconnect_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            room.remove_client(id, Some(epoch)).await;
        });
    }

    /// Removes a client and frees its seat. With `epoch` set the removal only
    /// goes ahead if the client has not reconnected since.
    async fn remove_client(&self, id: ClientId, epoch: Option<u64>) {
        let mut table = self.table.lock().await;
        {
            let clients = self.clients.read().await;
            let Some(client) = clients.get(id) else { return };
            if let Some(epoch) = epoch {
                if client.epoch() != epoch || client.is_connected() {
                    return;
                }
                info!(room = %self.name(), client = %id, "reconnect window elapsed");
            }
        }

        if let Err(e) = self.vacate(&mut table, id, false).await {
            match e {
                RoomError::Fatal(e) => {
                    self.fail(&e).await;
                    return;
                }
                RoomError::Rejected(reason) => warn!(client = %id, %reason, "while vacating seat"),
            }
        }

        let mut clients = self.clients.write().await;
        let was_admin = clients.is_admin(id);
        if let Some(client) = clients.remove(id) {
            table.num_connected = table.num_connected.saturating_sub(1);
            info!(room = %self.name(), client = %id, name = %client.name, "client removed");
            let msg = ServerMessage::new(ServerKind::ClientExited)
                .with_client(client.info(&self.name(), was_admin, false))
                .with_table(table.view());
            clients.broadcast(&msg, None).await;
        }

        // retire while the table is still held so no join slips in
        if clients.is_empty() {
            self.retired.store(true, Ordering::SeqCst);
            self.remove_from_directory();
        }
    }

    fn remove_from_directory(&self) {
        let Some(app) = self.app.upgrade() else { return };
        let name = self.name();
        if app.rooms.remove_if(&name, |_, room| std::ptr::eq(Arc::as_ptr(room), self)).is_some() {
            info!(room = %name, "room closed");
        }
    }

    /// Shuts the room down after the table broke an invariant.
    async fn fail(&self, err: &InvariantError) {
        error!(room = %self.name(), error = %err, "table invariant violated, closing room");
        self.closed.store(true, Ordering::SeqCst);
        {
            let mut clients = self.clients.write().await;
            let msg = ServerMessage::text(ServerKind::ServerClosed, "the table hit an internal error and was closed");
            clients.broadcast(&msg, None).await;
            clients.clear();
        }
        self.remove_from_directory();
    }

    // --- requests ---

    /// Handles one request from a connected client.
    pub async fn handle(self: &Arc<Self>, id: ClientId, msg: ClientMessage) -> Flow {
        let flow = self.handle_request(id, msg).await;
        self.drop_lagged().await;
        flow
    }

    /// Drops every connection whose outbox overflowed. Seated players get
    /// the usual reconnect grace.
    pub async fn drop_lagged(self: &Arc<Self>) {
        let lagged = self.clients.read().await.lagged();
        for (id, conn) in lagged {
            warn!(room = %self.name(), client = %id, "client fell behind, disconnecting");
            self.disconnect(id, conn, false).await;
        }
    }

    async fn handle_request(&self, id: ClientId, msg: ClientMessage) -> Flow {
        if self.is_closed() {
            return Flow::Exit;
        }
        let result = match msg {
            ClientMessage::NewConnection(_) | ClientMessage::Reconnect { .. } => {
                Err(RoomError::Rejected("you are already connected to this room".to_string()))
            }
            ClientMessage::ClientExited => return Flow::Exit,
            ClientMessage::PlayerLeft => self.leave_seat(id).await,
            ClientMessage::ClientSettings(settings) => self.change_settings(id, settings).await,
            ClientMessage::StartGame => self.start_game(id).await,
            ClientMessage::Chat(text) => {
                self.chat(id, text).await;
                Ok(())
            }
            ClientMessage::PlayerAction(action) => self.player_action(id, action).await,
        };

        match result {
            Ok(()) => Flow::Continue,
            Err(RoomError::Rejected(reason)) => {
                debug!(client = %id, %reason, "request rejected");
                self.clients.read().await.send_to(id, ServerMessage::text(ServerKind::BadRequest, reason)).await;
                Flow::Continue
            }
            Err(RoomError::Fatal(e)) => {
                self.fail(&e).await;
                Flow::Exit
            }
        }
    }

    async fn player_action(&self, id: ClientId, action: Action) -> Result<(), RoomError> {
        // actions wait behind a running round, never behind a settings change
        let seq = self.settings_seq.load(Ordering::SeqCst);
        if seq % 2 == 1 {
            return Err(RoomError::Rejected("that action is not valid at this time".to_string()));
        }
        let mut table = self.table.lock().await;
        if self.settings_seq.load(Ordering::SeqCst) != seq {
            return Err(RoomError::Rejected("that action is not valid at this time".to_string()));
        }
        let seat = self.clients.read().await.get(id).and_then(|c| c.seat);
        let Some(seat) = seat else {
            return Err(RoomError::Rejected(ActionError::NotAPlayer.to_string()));
        };
        if table.state == TableState::NotStarted {
            return Err(RoomError::Rejected("a game has not been started yet".to_string()));
        }
        if table.cur_player() != Some(seat) {
            return Err(RoomError::Rejected(ActionError::NotYourTurn.to_string()));
        }

        match table.player_action(seat, action) {
            Ok(()) => {}
            Err(TableError::Action(e)) => return Err(RoomError::Rejected(e.describe(table.formatter()))),
            Err(TableError::Invariant(e)) => return Err(RoomError::Fatal(e)),
        }
        debug!(room = %self.name(), seat, ?action, "action taken");
        self.run_chain(&mut table, Some(seat)).await
    }

    async fn start_game(&self, id: ClientId) -> Result<(), RoomError> {
        let mut table = self.table.lock().await;
        if !self.clients.read().await.is_admin(id) {
            return Err(RoomError::Rejected("only the table admin can do that".to_string()));
        }
        let posting = table.start_game()?;
        info!(room = %self.name(), players = table.num_players, "game started");

        self.clients.read().await.broadcast(&ServerMessage::new(ServerKind::StartGame).with_table(table.view()), None).await;
        self.deal_out(&table, &posting.forced_all_in).await;
        self.run_chain(&mut table, None).await
    }

    /// Gives up the seat and stays on as a spectator.
    async fn leave_seat(&self, id: ClientId) -> Result<(), RoomError> {
        let mut table = self.table.lock().await;
        if self.clients.read().await.get(id).and_then(|c| c.seat).is_none() {
            return Err(RoomError::Rejected(ActionError::NotAPlayer.to_string()));
        }
        self.vacate(&mut table, id, true).await?;
        if let Some(client) = self.clients.write().await.get_mut(id) {
            client.is_spectator = true;
        }
        Ok(())
    }

    async fn chat(&self, id: ClientId, mut text: String) {
        let clients = self.clients.read().await;
        let Some(client) = clients.get(id) else { return };

        let max = self.config.max_chat_len;
        if text.len() > max {
            let mut end = max;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
            text.push_str("(snipped)");
        }
        let line = if client.seat.is_some() {
            format!("[{} id: {}]: {}", client.name, client.short_id(), text)
        } else {
            format!("{{{} id: {}}}: {}", client.name, client.short_id(), text)
        };
        let msg = ServerMessage::new(ServerKind::Chat).with_client(self.info(&clients, client, false)).with_msg(line);
        clients.broadcast(&msg, None).await;
    }

    async fn change_settings(&self, id: ClientId, settings: ClientSettings) -> Result<(), RoomError> {
        // a round in progress owns the table; don't queue behind it
        let Ok(mut table) = self.table.try_lock() else {
            let msg = ServerMessage::text(
                ServerKind::ServerMessage,
                "cannot change your settings right now. please try again later",
            );
            self.clients.read().await.send_to(id, msg).await;
            return Ok(());
        };
        let _change = SettingsChange::begin(&self.settings_seq);

        let mut lines = Vec::new();
        let is_admin = self.clients.read().await.is_admin(id);
        if let (true, Some(admin)) = (is_admin, &settings.admin) {
            self.apply_admin_settings(&mut table, admin, &mut lines)?;
        }

        let mut clients = self.clients.write().await;
        let current = match clients.get(id) {
            Some(client) => client.name.clone(),
            None => return Ok(()),
        };
        let (name, note) = check_name(&clients, &table, id, &settings.name, &current);
        lines.extend(note);

        let Some(client) = clients.get_mut(id) else { return Ok(()) };
        if let Some(name) = name {
            match client.seat.and_then(|s| table.player_mut(s)) {
                Some(player) => {
                    player.set_name(&name);
                    client.name = player.name.clone();
                }
                None => client.name = if name.is_empty() { SPECTATOR_NAME.to_string() } else { name },
            }
            info!(room = %self.name(), client = %id, name = %client.name, "client renamed");
        }
        let seat = client.seat;

        let clients = RwLockWriteGuard::downgrade(clients);
        let Some(client) = clients.get(id) else { return Ok(()) };
        if let Some(public) = seat.and_then(|s| table.player_view(s, false)) {
            let msg = ServerMessage::new(ServerKind::UpdatePlayer)
                .with_client(self.info(&clients, client, false))
                .with_player(public);
            clients.broadcast(&msg, Some(id)).await;
        }
        client.send(ServerMessage::new(ServerKind::ClientSettings).with_client(self.info(&clients, client, true))).await;
        clients.broadcast(&ServerMessage::new(ServerKind::UpdateTable).with_table(table.view()), None).await;
        if !lines.is_empty() {
            let text = format!("server response: settings changes:\n\n{}", lines.join("\n"));
            client.send(ServerMessage::text(ServerKind::ServerMessage, text)).await;
        }
        drop(clients);

        if settings.is_spectator && seat.is_some() {
            self.vacate(&mut table, id, true).await?;
        } else if !settings.is_spectator && seat.is_none() {
            self.claim_seat(&mut table, id).await;
        }
        Ok(())
    }

    /// Applies the admin block of a settings request. Validation happens
    /// before anything changes; a rejected request changes nothing.
    fn apply_admin_settings(&self, table: &mut Table, admin: &AdminSettings, lines: &mut Vec<String>) -> Result<(), RoomError> {
        if admin.password.chars().count() > MAX_PASSWORD_LEN {
            return Err(RoomError::Rejected(format!(
                "your password is too long. please choose a password of at most {} characters",
                MAX_PASSWORD_LEN
            )));
        }

        let mut errors = Vec::new();
        let room_name = admin.room_name.trim();
        let rename = !room_name.is_empty() && room_name != self.name();
        if rename && (room_name.len() > MAX_ROOM_NAME_LEN || room_name.contains('/')) {
            errors.push("room name: invalid name requested".to_string());
        }
        let reseat = admin.num_seats != 0 && admin.num_seats != table.num_seats;
        if reseat && errors.is_empty() {
            if let Err(e) = table.set_num_seats(admin.num_seats) {
                errors.push(format!("num seats: {}", e.describe(table.formatter())));
            }
        }
        if !errors.is_empty() {
            return Err(RoomError::Rejected(format!(
                "server response: unable to complete request due to following errors:\n\n{}",
                errors.join("\n")
            )));
        }

        if !rename {
            lines.push("room name: unchanged".to_string());
        } else if self.rename(room_name) {
            lines.push("room name: changed".to_string());
        } else {
            lines.push("room name: requested name already taken".to_string());
        }
        lines.push(if reseat { "num seats: changed" } else { "num seats: unchanged" }.to_string());

        if admin.lock == table.lock {
            lines.push("table lock: unchanged".to_string());
        } else {
            table.lock = admin.lock;
            lines.push("table lock: changed".to_string());
        }

        if admin.password == table.password {
            lines.push("password: unchanged".to_string());
        } else {
            lines.push(if admin.password.is_empty() { "password: removed" } else { "password: changed" }.to_string());
            table.password = admin.password.clone();
        }

        info!(room = %self.name(), seats = table.num_seats, lock = %table.lock, "table settings updated");
        Ok(())
    }

    /// Moves the room to a new directory key. False if the name is taken.
    fn rename(&self, new_name: &str) -> bool {
        let old = self.name();
        if let Some(app) = self.app.upgrade() {
            let Some(me) = app.rooms.get(&old).map(|r| Arc::clone(r.value())) else { return false };
            match app.rooms.entry(new_name.to_string()) {
                dashmap::mapref::entry::Entry::Occupied(_) => return false,
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(me);
                }
            }
            app.rooms.remove(&old);
        }
        *self.name.write() = new_name.to_string();
        info!(from = %old, to = new_name, "room renamed");
        true
    }

    // --- seats ---

    /// Frees `id`'s seat in the middle of whatever is going on. If it was the
    /// seat's turn the seat folds first; then the table finishes the stage,
    /// the round or the game as the departure requires.
    async fn vacate(&self, table: &mut Table, id: ClientId, to_spectator: bool) -> Result<(), RoomError> {
        let Some(seat) = self.clients.read().await.get(id).and_then(|c| c.seat) else {
            return Ok(());
        };

        if table.forfeit_turn(seat)? {
            debug!(seat, "leaving player folded");
            self.send_player_action(table, seat).await;
        }

        match self.release_seat(table, id, seat, to_spectator).await? {
            Departure::Empty => {
                table.reset(None);
                self.clients
                    .read()
                    .await
                    .broadcast(&ServerMessage::new(ServerKind::Reset).with_table(table.view()), None)
                    .await;
            }
            Departure::OnePlayerLeft(_) if table.state == TableState::NotStarted => {}
            Departure::OnePlayerLeft(last) => {
                info!(room = %self.name(), seat = last, "one player left");
                let summary = table.finish_round()?;
                self.broadcast_round_over(table, summary).await;
                self.game_over(table).await;
            }
            Departure::Continue => {
                if matches!(table.state, TableState::DoneBetting | TableState::RoundOver) {
                    self.run_chain(table, None).await?;
                } else if table.in_betting_state() {
                    self.send_player_turn(table, &*self.clients.read().await, None).await;
                }
            }
        }
        Ok(())
    }

    /// Takes `seat` away from `id` and tells everyone. The admin role moves
    /// on to whoever sits at the head of the table.
    async fn release_seat(&self, table: &mut Table, id: ClientId, seat: SeatId, to_spectator: bool) -> Result<Departure, RoomError> {
        let departure = table.remove_player(seat)?;

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get_mut(id) {
            client.seat = None;
        }
        if let Some(client) = clients.get(id) {
            let msg = ServerMessage::new(ServerKind::PlayerLeft)
                .with_client(self.info(&clients, client, false))
                .with_table(table.view());
            let exclude = if to_spectator { None } else { Some(id) };
            clients.broadcast(&msg, exclude).await;
        }

        if clients.is_admin(id) {
            clients.admin = None;
            let next = table.active_players().head().and_then(|s| clients.by_seat(s)).map(|c| c.id);
            if let Some(next) = next {
                self.make_admin(&mut clients, table, next).await;
            }
        }
        Ok(departure)
    }

    /// Seats a spectator if the lock and the open seats allow it.
    async fn claim_seat(&self, table: &mut Table, id: ClientId) {
        let note = if matches!(table.lock, TableLock::PlayersLocked | TableLock::AllLocked) {
            Some("This table is not allowing new players.")
        } else if let Some(seat) = table.take_seat() {
            let mut clients = self.clients.write().await;
            if let Some(client) = clients.get_mut(id) {
                if let Some(player) = table.player_mut(seat) {
                    player.set_name(if client.name == SPECTATOR_NAME { "" } else { &client.name });
                    client.name = player.name.clone();
                }
                client.seat = Some(seat);
                client.is_spectator = false;
                info!(room = %self.name(), client = %id, seat, "spectator took a seat");
            }
            self.announce_player(table, &clients, id).await;
            if clients.admin.is_none() {
                self.make_admin(&mut clients, table, id).await;
            }
            None
        } else {
            Some("No open seats available.")
        };
        if let Some(note) = note {
            self.clients.read().await.send_to(id, ServerMessage::text(ServerKind::ServerMessage, note)).await;
        }
    }

    /// `new-player` to the table and `your-player` to the new seat's owner.
    async fn announce_player(&self, table: &Table, clients: &Clients, id: ClientId) {
        let Some(client) = clients.get(id) else { return };
        let Some(seat) = client.seat else { return };
        let view = table.view();
        if let Some(public) = table.player_view(seat, false) {
            let msg = ServerMessage::new(ServerKind::NewPlayer)
                .with_client(self.info(clients, client, false))
                .with_player(public)
                .with_table(view.clone());
            clients.broadcast(&msg, Some(id)).await;
        }
        if let Some(own) = table.player_view(seat, true) {
            let msg = ServerMessage::new(ServerKind::YourPlayer)
                .with_client(self.info(clients, client, true))
                .with_player(own)
                .with_table(view);
            client.send(msg).await;
        }
    }

    async fn make_admin(&self, clients: &mut Clients, table: &Table, id: ClientId) {
        clients.admin = Some(id);
        let Some(client) = clients.get(id) else { return };
        info!(room = %self.name(), client = %id, name = %client.name, "new table admin");
        let msg = ServerMessage::new(ServerKind::MakeAdmin)
            .with_client(client.info(&self.name(), true, true))
            .with_table(table.view());
        client.send(msg).await;
    }

    // --- the round ---

    /// Drives the table forward until it waits on a player again: settles
    /// finished betting stages and rounds, then announces whose turn it is.
    async fn run_chain(&self, table: &mut Table, mut actor: Option<SeatId>) -> Result<(), RoomError> {
        loop {
            match table.state {
                TableState::DoneBetting => self.post_betting(table, actor.take()).await?,
                TableState::RoundOver => self.round_over(table, actor.take()).await?,
                _ => {
                    if let Some(seat) = actor.take() {
                        self.send_player_action(table, seat).await;
                        self.pause(self.config.room.action_delay()).await;
                    }
                    if table.in_betting_state() {
                        self.send_player_turn(table, &*self.clients.read().await, None).await;
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn post_betting(&self, table: &mut Table, actor: Option<SeatId>) -> Result<(), RoomError> {
        if let Some(seat) = actor {
            self.send_player_action(table, seat).await;
            self.pause(self.config.room.action_delay()).await;
        }

        if table.betting_is_impossible() {
            debug!(room = %self.name(), "no more betting, running out the board");
            self.reveal_hands(table).await;
            while table.state != TableState::RoundOver {
                table.next_community_action()?;
                if table.state == TableState::RoundOver {
                    break;
                }
                self.send_community(table).await;
                self.pause(self.config.room.reveal_delay()).await;
            }
            return Ok(());
        }

        table.next_community_action()?;
        if table.state != TableState::RoundOver {
            self.send_community(table).await;
            self.send_all_players(table).await;
        }
        Ok(())
    }

    async fn round_over(&self, table: &mut Table, actor: Option<SeatId>) -> Result<(), RoomError> {
        if let Some(seat) = actor {
            self.send_player_action(table, seat).await;
        }

        let summary = table.finish_round()?;
        let abandoned = summary.abandoned;
        self.broadcast_round_over(table, summary).await;
        self.send_all_players(table).await;

        if abandoned {
            self.game_over(table).await;
            return Ok(());
        }
        self.remove_eliminated(table).await?;
        self.pause(self.config.room.round_over_delay()).await;

        if table.state == TableState::GameOver || table.num_players < 2 {
            self.game_over(table).await;
            return Ok(());
        }

        table.new_round()?;
        let posting = table.next_table_action()?;
        info!(room = %self.name(), round = table.round_count(), "new round");
        self.deal_out(table, &posting.forced_all_in).await;
        Ok(())
    }

    async fn broadcast_round_over(&self, table: &Table, summary: RoundSummary) {
        let text = summary.describe(table.formatter()).join("\n");
        info!(room = %self.name(), "round over: {}", text.replace('\n', "; "));
        if !summary.by_folds && !summary.abandoned {
            self.reveal_hands(table).await;
        }
        let msg = ServerMessage::new(ServerKind::RoundOver)
            .with_table(table.view())
            .with_summary(summary)
            .with_msg(text);
        self.clients.read().await.broadcast(&msg, None).await;
    }

    /// Unseats every player who ran out of chips. They stay on as spectators.
    async fn remove_eliminated(&self, table: &mut Table) -> Result<(), RoomError> {
        for seat in table.eliminated_players() {
            let client = self.clients.read().await.by_seat(seat).map(|c| (c.id, c.name.clone(), c.short_id()));
            let Some((id, name, short_id)) = client else {
                table.remove_player(seat)?;
                continue;
            };
            info!(room = %self.name(), seat, %name, "player eliminated");
            self.release_seat(table, id, seat, true).await?;

            let clients = self.clients.read().await;
            if let Some(client) = clients.get(id) {
                let msg = ServerMessage::new(ServerKind::Eliminated)
                    .with_client(self.info(&clients, client, false))
                    .with_msg(format!("<{} id: {}> was eliminated", name, short_id));
                clients.broadcast(&msg, None).await;
            }
        }
        Ok(())
    }

    /// Announces the winner and resets the table around them.
    async fn game_over(&self, table: &mut Table) {
        let winner = table.game_winner().or_else(|| table.winners().first().copied());
        let winner_name = winner.and_then(|s| table.player(s)).map(|p| p.name.clone()).unwrap_or_default();
        info!(room = %self.name(), winner = %winner_name, "game over");

        table.reset(winner);

        let mut clients = self.clients.write().await;
        let winner_client = winner.and_then(|s| clients.by_seat(s)).map(|c| c.id);
        let stale: Vec<ClientId> = clients
            .iter()
            .filter(|c| c.seat.is_some_and(|s| table.player(s).is_none_or(|p| p.is_vacant)))
            .map(|c| c.id)
            .collect();
        for id in stale {
            if let Some(client) = clients.get_mut(id) {
                client.seat = None;
            }
        }

        clients
            .broadcast(&ServerMessage::text(ServerKind::ServerMessage, format!("game over, {} wins", winner_name)), None)
            .await;
        match winner_client {
            Some(id) if !clients.is_admin(id) => self.make_admin(&mut clients, table, id).await,
            Some(_) => {}
            None => clients.admin = None,
        }

        let mut msg = ServerMessage::new(ServerKind::Reset).with_table(table.view());
        if let Some(client) = winner_client.and_then(|id| clients.get(id)) {
            msg = msg.with_client(self.info(&clients, client, false));
        }
        clients.broadcast(&msg, None).await;
        if let Some(own) = winner.and_then(|s| table.player_view(s, true)) {
            if let Some(id) = winner_client {
                clients.send_to(id, ServerMessage::new(ServerKind::YourPlayer).with_player(own)).await;
            }
        }
    }

    // --- notifications ---

    /// Hole cards to each dealt seat, forced all-in blinds, fresh stacks
    /// and the table.
    async fn deal_out(&self, table: &Table, forced_all_in: &[SeatId]) {
        {
            let clients = self.clients.read().await;
            for player in table.occupied_seats().filter(|p| p.hole.len() == 2) {
                let (Some(client), Some(own)) = (clients.by_seat(player.seat), table.player_view(player.seat, true)) else {
                    continue;
                };
                let msg = ServerMessage::new(ServerKind::Deal)
                    .with_client(self.info(&clients, client, true))
                    .with_player(own)
                    .with_table(table.view());
                client.send(msg).await;
            }
        }
        for &seat in forced_all_in {
            self.send_player_action(table, seat).await;
        }
        self.send_all_players(table).await;
        self.clients.read().await.broadcast(&ServerMessage::new(ServerKind::UpdateTable).with_table(table.view()), None).await;
    }

    async fn send_community(&self, table: &Table) {
        let kind = match table.comm_state {
            TableState::Flop => ServerKind::Flop,
            TableState::Turn => ServerKind::Turn,
            TableState::River => ServerKind::River,
            _ => ServerKind::UpdateTable,
        };
        self.clients.read().await.broadcast(&ServerMessage::new(kind).with_table(table.view()), None).await;
    }

    /// Shows every contender's cards to the whole table.
    async fn reveal_hands(&self, table: &Table) {
        let clients = self.clients.read().await;
        for seat in table.non_folded_seats() {
            let Some(view) = table.player_view(seat, true) else { continue };
            let mut msg = ServerMessage::new(ServerKind::UpdatePlayer).with_player(view);
            if let Some(client) = clients.by_seat(seat) {
                msg = msg.with_client(self.info(&clients, client, false));
            }
            clients.broadcast(&msg, None).await;
        }
    }

    /// Every seat's public view to the table and its own view to its owner.
    async fn send_all_players(&self, table: &Table) {
        let clients = self.clients.read().await;
        for player in table.occupied_seats() {
            let (Some(public), Some(own)) = (table.player_view(player.seat, false), table.player_view(player.seat, true))
            else {
                continue;
            };
            match clients.by_seat(player.seat) {
                Some(client) => {
                    let info = self.info(&clients, client, false);
                    clients
                        .broadcast(&ServerMessage::new(ServerKind::UpdatePlayer).with_client(info.clone()).with_player(public), Some(client.id))
                        .await;
                    client.send(ServerMessage::new(ServerKind::UpdatePlayer).with_client(info).with_player(own)).await;
                }
                None => clients.broadcast(&ServerMessage::new(ServerKind::UpdatePlayer).with_player(public), None).await,
            }
        }
    }

    async fn send_player_action(&self, table: &Table, seat: SeatId) {
        let clients = self.clients.read().await;
        let Some(public) = table.player_view(seat, false) else { return };
        let mut msg = ServerMessage::new(ServerKind::PlayerAction).with_player(public).with_table(table.view());
        match clients.by_seat(seat) {
            Some(client) => {
                msg = msg.with_client(self.info(&clients, client, false));
                clients.broadcast(&msg, Some(client.id)).await;
                if let Some(own) = table.player_view(seat, true) {
                    client.send(msg.with_player(own)).await;
                }
            }
            None => clients.broadcast(&msg, None).await,
        }
    }

    /// Whose turn it is, and who heads the betting order if that is someone
    /// else. `to` limits the notice to one client.
    async fn send_player_turn(&self, table: &Table, clients: &Clients, to: Option<ClientId>) {
        let mut messages = Vec::with_capacity(2);
        if let Some(cur) = table.cur_player().filter(|_| table.in_betting_state()) {
            if let Some(view) = table.player_view(cur, false) {
                let mut msg = ServerMessage::new(ServerKind::PlayerTurn).with_player(view).with_table(table.view());
                if let Some(client) = clients.by_seat(cur) {
                    msg = msg.with_client(self.info(clients, client, false));
                }
                messages.push(msg);
            }
        }

        let head = table
            .cur_players()
            .head()
            .filter(|&h| table.in_betting_state() && Some(h) != table.cur_player())
            .and_then(|h| table.player_view(h, false));
        messages.push(match head {
            Some(view) => ServerMessage::new(ServerKind::PlayerHead).with_player(view),
            None => ServerMessage::new(ServerKind::PlayerHead),
        });

        for msg in messages {
            match to {
                Some(id) => clients.send_to(id, msg).await,
                None => clients.broadcast(&msg, None).await,
            }
        }
    }
}

/// Validates a requested name. Returns the name to apply (empty meaning
/// the default) and a note for the requester.
fn check_name(clients: &Clients, table: &Table, id: ClientId, requested: &str, current: &str) -> (Option<String>, Option<String>) {
    let name = requested.trim();
    if name.is_empty() {
        return (None, None);
    }
    if name.chars().count() > MAX_NAME_LEN {
        let note = format!(
            "You've requested a name that was longer than {} characters. Using a default name.",
            MAX_NAME_LEN
        );
        return (Some(String::new()), Some(note));
    }
    if name == current {
        return (None, Some("name: unchanged".to_string()));
    }
    if clients.name_taken(name, id) || table.default_player_names().contains(&name) {
        return (None, Some(format!("Name '{}' already in use. Current name unchanged.", name)));
    }
    (Some(name.to_string()), Some("name: changed".to_string()))
}
