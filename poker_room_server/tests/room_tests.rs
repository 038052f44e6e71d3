use std::sync::{Arc, Weak};
use std::time::Duration;

use poker_room_core::{
    Action, ActionKind, AdminSettings, Chips, ClientId, ClientMessage, ClientSettings, PlayerList, PrivateId, SeatId,
    ServerKind, ServerMessage, TableLock, TableState,
};
use poker_room_server::{AppState, ConnId, Flow, Room, RoomConfig, ServerConfig};
use tokio::sync::mpsc::{self, error::TryRecvError};
use uuid::Uuid;

struct Conn {
    id: ClientId,
    conn: ConnId,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Conn {
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn private_id(msgs: &[ServerMessage]) -> PrivateId {
        msgs.iter()
            .find(|m| m.kind == ServerKind::NewConnection)
            .and_then(|m| m.client.as_ref())
            .and_then(|c| c.private_id)
            .expect("own new-connection carries the private id")
    }
}

fn config(grace_ms: u64) -> Arc<ServerConfig> {
    Arc::new(ServerConfig {
        reconnect_grace_ms: grace_ms,
        max_chat_len: 8,
        room: RoomConfig::unpaced(),
        ..ServerConfig::default()
    })
}

fn new_room(grace_ms: u64) -> Arc<Room> {
    Room::new("test", config(grace_ms), Weak::new()).unwrap()
}

fn settings(name: &str) -> ClientSettings {
    ClientSettings { name: name.to_string(), ..ClientSettings::default() }
}

async fn try_join(room: &Arc<Room>, settings: ClientSettings) -> (Option<ClientId>, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(512);
    let id = room.join(Uuid::new_v4(), tx, settings).await;
    (id, rx)
}

async fn join(room: &Arc<Room>, name: &str) -> Conn {
    let (tx, rx) = mpsc::channel(512);
    let conn = Uuid::new_v4();
    let id = room.join(conn, tx, settings(name)).await.expect("join accepted");
    Conn { id, conn, rx }
}

/// Stacks of everyone seated plus whatever sits in the pots.
async fn chips_in_play(room: &Arc<Room>) -> Chips {
    room.with_table(|t| t.occupied_seats().map(|p| p.chip_count).sum::<Chips>() + t.pots().total()).await
}

/// Seats of a ring in seat order, after checking it closes on itself.
fn ring(list: &PlayerList) -> Vec<SeatId> {
    let mut seats: Vec<SeatId> = list.iter().collect();
    for &seat in &seats {
        let next = list.next_of(seat).expect("ring member has a successor");
        assert_eq!(list.prev_of(next), Some(seat));
    }
    seats.sort_unstable();
    seats
}

fn kinds(msgs: &[ServerMessage]) -> Vec<ServerKind> {
    msgs.iter().map(|m| m.kind).collect()
}

fn texts(msgs: &[ServerMessage], kind: ServerKind) -> Vec<String> {
    msgs.iter().filter(|m| m.kind == kind).filter_map(|m| m.msg.clone()).collect()
}

fn call() -> ClientMessage {
    Action::new(ActionKind::Call, 0).into()
}

fn admin_settings(lock: TableLock, password: &str) -> ClientMessage {
    ClientMessage::ClientSettings(ClientSettings {
        admin: Some(AdminSettings { lock, password: password.to_string(), ..AdminSettings::default() }),
        ..ClientSettings::default()
    })
}

#[tokio::test]
async fn test_first_seated_client_becomes_admin() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;

    assert_eq!(room.admin().await, Some(ana.id));
    assert_eq!(room.seat_of(ana.id).await, Some(0));
    assert_eq!(room.seat_of(bo.id).await, Some(1));

    let msgs = ana.drain();
    assert!(kinds(&msgs).contains(&ServerKind::MakeAdmin));
    assert!(kinds(&msgs).contains(&ServerKind::NewPlayer));
    let _ = Conn::private_id(&msgs);

    let msgs = bo.drain();
    assert!(kinds(&msgs).contains(&ServerKind::CurrentPlayers));
    assert!(!kinds(&msgs).contains(&ServerKind::MakeAdmin));
    let me = msgs.iter().find(|m| m.kind == ServerKind::YourPlayer).unwrap();
    assert_eq!(me.player.as_ref().unwrap().name, "bo");
}

#[tokio::test]
async fn test_only_admin_starts_the_game() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;
    ana.drain();
    bo.drain();

    assert_eq!(room.handle(bo.id, ClientMessage::StartGame).await, Flow::Continue);
    assert_eq!(texts(&bo.drain(), ServerKind::BadRequest), vec!["only the table admin can do that"]);
    assert_eq!(room.table_view().await.state, TableState::NotStarted);

    room.handle(ana.id, ClientMessage::StartGame).await;
    let view = room.table_view().await;
    assert_eq!(view.state, TableState::PreFlop);
    for conn in [&mut ana, &mut bo] {
        let msgs = conn.drain();
        let deal = msgs.iter().find(|m| m.kind == ServerKind::Deal).expect("dealt in");
        assert_eq!(deal.player.as_ref().unwrap().hole.len(), 2);
        assert!(kinds(&msgs).contains(&ServerKind::PlayerTurn));
    }

    room.handle(ana.id, ClientMessage::StartGame).await;
    assert_eq!(texts(&ana.drain(), ServerKind::BadRequest), vec!["this game has already started"]);
}

#[tokio::test]
async fn test_action_before_start_is_rejected() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let mut watcher = join_spectator(&room, "eve").await;
    ana.drain();

    room.handle(ana.id, call()).await;
    assert_eq!(texts(&ana.drain(), ServerKind::BadRequest), vec!["a game has not been started yet"]);

    room.handle(watcher.id, call()).await;
    assert_eq!(texts(&watcher.drain(), ServerKind::BadRequest), vec!["you are not a player"]);
}

async fn join_spectator(room: &Arc<Room>, name: &str) -> Conn {
    let (tx, rx) = mpsc::channel(512);
    let conn = Uuid::new_v4();
    let settings = ClientSettings { name: name.to_string(), is_spectator: true, ..ClientSettings::default() };
    let id = room.join(conn, tx, settings).await.expect("join accepted");
    Conn { id, conn, rx }
}

#[tokio::test]
async fn test_concurrent_actions_apply_once() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;
    room.handle(ana.id, ClientMessage::StartGame).await;
    ana.drain();
    bo.drain();

    // heads up: seat 1 posts the small blind and acts first
    assert_eq!(room.table_view().await.cur_player, Some(1));
    let (first, second) = tokio::join!(room.handle(bo.id, call()), room.handle(bo.id, call()));
    assert_eq!((first, second), (Flow::Continue, Flow::Continue));

    assert_eq!(texts(&bo.drain(), ServerKind::BadRequest), vec!["it's not your turn"]);
    let view = room.table_view().await;
    assert_eq!(view.cur_player, Some(0));
    assert_eq!(view.main_pot.total, 20);
}

#[tokio::test]
async fn test_fold_settles_and_deals_next_round() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let bo = join(&room, "bo").await;
    room.handle(ana.id, ClientMessage::StartGame).await;
    ana.drain();

    room.handle(bo.id, Action::new(ActionKind::Fold, 0).into()).await;

    let msgs = ana.drain();
    let over = msgs.iter().find(|m| m.kind == ServerKind::RoundOver).expect("round over sent");
    let summary = over.summary.as_ref().unwrap();
    assert!(summary.by_folds);
    assert_eq!(summary.pots[0].total, 15);
    assert_eq!(over.msg.as_deref(), Some("ana wins 15 chips by folds"));

    let view = room.table_view().await;
    assert_eq!(view.state, TableState::PreFlop);
    assert_eq!(room.with_table(|t| t.round_count()).await, 1);
    let chips = room.with_table(|t| t.occupied_seats().map(|p| p.chip_count).sum::<u64>()).await;
    assert_eq!(chips + view.pot_total(), 200_000);
}

#[tokio::test]
async fn test_reconnect_within_grace_keeps_seat() {
    let room = new_room(200);
    let mut ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;
    let private_id = Conn::private_id(&bo.drain());
    room.handle(ana.id, ClientMessage::StartGame).await;
    ana.drain();

    room.disconnect(bo.id, bo.conn, false).await;
    assert!(kinds(&ana.drain()).contains(&ServerKind::PlayerReconnecting));
    assert_eq!(room.seat_of(bo.id).await, Some(1));

    let (tx, mut rx) = mpsc::channel(512);
    let back = room.reconnect(Uuid::new_v4(), tx, private_id).await;
    assert_eq!(back, Some(bo.id));
    let msgs: Vec<ServerMessage> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    let me = msgs.iter().find(|m| m.kind == ServerKind::YourPlayer).expect("own seat replayed");
    assert_eq!(me.player.as_ref().unwrap().hole.len(), 2);
    assert!(kinds(&msgs).contains(&ServerKind::PlayerTurn));
    assert!(kinds(&ana.drain()).contains(&ServerKind::PlayerReconnected));

    // the old vacate timer must not fire
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(room.seat_of(bo.id).await, Some(1));
    assert_eq!(room.with_table(|t| t.num_players).await, 2);
}

#[tokio::test]
async fn test_seat_vacated_after_grace() {
    let room = new_room(50);
    let mut ana = join(&room, "ana").await;
    let bo = join(&room, "bo").await;
    ana.drain();

    room.disconnect(bo.id, bo.conn, false).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(room.num_clients().await, 1);
    assert_eq!(room.with_table(|t| t.num_players).await, 1);
    assert!(kinds(&ana.drain()).contains(&ServerKind::ClientExited));
}

#[tokio::test]
async fn test_stale_connection_close_is_ignored() {
    let room = new_room(1000);
    let ana = join(&room, "ana").await;
    room.disconnect(ana.id, Uuid::new_v4(), true).await;
    assert_eq!(room.num_clients().await, 1);

    room.disconnect(ana.id, ana.conn, true).await;
    assert_eq!(room.num_clients().await, 0);
}

#[tokio::test]
async fn test_unknown_private_id_is_refused() {
    let room = new_room(1000);
    let _ana = join(&room, "ana").await;
    let (tx, mut rx) = mpsc::channel(8);
    assert_eq!(room.reconnect(Uuid::new_v4(), tx, Uuid::new_v4()).await, None);
    let msg = rx.try_recv().unwrap();
    assert_eq!(msg.kind, ServerKind::BadRequest);
    assert_eq!(msg.msg.as_deref(), Some("failed to reconnect: invalid or expired private ID"));
}

#[tokio::test]
async fn test_password_and_locks() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    ana.drain();

    room.handle(ana.id, admin_settings(TableLock::PlayersLocked, "pw")).await;
    let notes = texts(&ana.drain(), ServerKind::ServerMessage);
    assert!(notes[0].contains("table lock: changed"));
    assert!(notes[0].contains("password: changed"));

    let (id, mut rx) = try_join(&room, settings("bo")).await;
    assert_eq!(id, None);
    assert_eq!(rx.try_recv().unwrap().kind, ServerKind::BadAuth);

    let (id, mut rx) = try_join(&room, ClientSettings { password: "pw".to_string(), ..settings("bo") }).await;
    let bo = id.expect("right password accepted");
    assert_eq!(room.seat_of(bo).await, None);
    let msgs: Vec<ServerMessage> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(texts(&msgs, ServerKind::ServerMessage)[0].starts_with("This table is not allowing new players"));

    room.handle(ana.id, admin_settings(TableLock::AllLocked, "pw")).await;
    let (id, mut rx) = try_join(&room, ClientSettings { password: "pw".to_string(), ..settings("cy") }).await;
    assert_eq!(id, None);
    let msg = rx.try_recv().unwrap();
    assert_eq!(msg.kind, ServerKind::TableLocked);
    assert_eq!(msg.msg.as_deref(), Some("table lock: player & spectator lock"));
}

#[tokio::test]
async fn test_spectator_lock_refuses_when_full() {
    let room = new_room(1000);
    let ana = join(&room, "ana").await;
    let _bo = join(&room, "bo").await;
    room.handle(
        ana.id,
        ClientMessage::ClientSettings(ClientSettings {
            admin: Some(AdminSettings { num_seats: 2, lock: TableLock::SpectatorsLocked, ..AdminSettings::default() }),
            ..ClientSettings::default()
        }),
    )
    .await;
    assert_eq!(room.table_view().await.num_open_seats, 0);

    let (id, mut rx) = try_join(&room, settings("cy")).await;
    assert_eq!(id, None);
    assert_eq!(rx.try_recv().unwrap().kind, ServerKind::TableLocked);
    assert_eq!(room.num_clients().await, 2);
    assert_eq!(room.table_view().await.num_connected, 2);
}

#[tokio::test]
async fn test_chat_is_truncated_and_tagged() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let mut eve = join_spectator(&room, "eve").await;
    ana.drain();
    eve.drain();

    room.handle(ana.id, ClientMessage::Chat("hello world!".to_string())).await;
    let line = texts(&eve.drain(), ServerKind::Chat).remove(0);
    assert!(line.starts_with("[ana id: "));
    assert!(line.ends_with("]: hello wo(snipped)"));

    room.handle(eve.id, ClientMessage::Chat("hi".to_string())).await;
    let line = texts(&ana.drain(), ServerKind::Chat).remove(0);
    assert!(line.starts_with("{eve id: "));
    assert!(line.ends_with("}: hi"));
}

#[tokio::test]
async fn test_name_rules() {
    let room = new_room(1000);
    let _ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;
    bo.drain();

    let rename = |name: &str| ClientMessage::ClientSettings(settings(name));

    room.handle(bo.id, rename("ana")).await;
    assert!(texts(&bo.drain(), ServerKind::ServerMessage)[0].contains("Name 'ana' already in use"));

    room.handle(bo.id, rename("p4")).await;
    assert!(texts(&bo.drain(), ServerKind::ServerMessage)[0].contains("Name 'p4' already in use"));

    room.handle(bo.id, rename("bo")).await;
    assert!(texts(&bo.drain(), ServerKind::ServerMessage)[0].contains("name: unchanged"));

    room.handle(bo.id, rename("a-very-long-name-indeed")).await;
    assert!(texts(&bo.drain(), ServerKind::ServerMessage)[0].contains("longer than 15 characters"));
    assert_eq!(room.with_table(|t| t.player(1).map(|p| p.name.clone())).await.as_deref(), Some("p1"));

    room.handle(bo.id, rename("  bob ")).await;
    assert_eq!(room.with_table(|t| t.player(1).map(|p| p.name.clone())).await.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_leaving_on_turn_heads_up_ends_the_game() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let bo = join(&room, "bo").await;
    room.handle(ana.id, ClientMessage::StartGame).await;
    ana.drain();

    room.handle(bo.id, ClientMessage::PlayerLeft).await;

    assert_eq!(room.seat_of(bo.id).await, None);
    assert_eq!(room.num_clients().await, 2);
    let view = room.table_view().await;
    assert_eq!(view.state, TableState::NotStarted);
    assert_eq!(view.num_players, 1);
    assert_eq!(room.with_table(|t| t.player(0).map(|p| p.chip_count)).await, Some(100_000));

    let msgs = ana.drain();
    assert!(kinds(&msgs).contains(&ServerKind::PlayerLeft));
    assert!(kinds(&msgs).contains(&ServerKind::RoundOver));
    assert!(kinds(&msgs).contains(&ServerKind::Reset));
    assert_eq!(texts(&msgs, ServerKind::ServerMessage), vec!["game over, ana wins"]);
}

#[tokio::test]
async fn test_admin_moves_on_when_admin_leaves() {
    let room = new_room(1000);
    let ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;
    let _cy = join(&room, "cy").await;

    room.handle(ana.id, ClientMessage::PlayerLeft).await;
    let admin = room.admin().await;
    assert!(admin.is_some_and(|id| id != ana.id));
    if admin == Some(bo.id) {
        assert!(kinds(&bo.drain()).contains(&ServerKind::MakeAdmin));
    }

    assert_eq!(room.handle(ana.id, ClientMessage::ClientExited).await, Flow::Exit);
}

#[tokio::test]
async fn test_spectator_flag_moves_between_seat_and_rail() {
    let room = new_room(1000);
    let ana = join(&room, "ana").await;
    let mut eve = join_spectator(&room, "eve").await;
    eve.drain();

    let sit = ClientSettings { name: "eve".to_string(), ..ClientSettings::default() };
    room.handle(eve.id, ClientMessage::ClientSettings(sit)).await;
    assert_eq!(room.seat_of(eve.id).await, Some(1));
    let me = eve.drain().into_iter().find(|m| m.kind == ServerKind::YourPlayer).expect("seat announced");
    assert_eq!(me.player.unwrap().name, "eve");

    let watch = ClientSettings { name: "ana".to_string(), is_spectator: true, ..ClientSettings::default() };
    room.handle(ana.id, ClientMessage::ClientSettings(watch)).await;
    assert_eq!(room.seat_of(ana.id).await, None);
    assert_eq!(room.admin().await, Some(eve.id));
    assert_eq!(room.with_table(|t| t.num_players).await, 1);
}

#[tokio::test]
async fn test_actions_from_two_connections_apply_once() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;
    room.handle(ana.id, ClientMessage::StartGame).await;
    ana.drain();
    bo.drain();

    // seat 1 holds the turn; seat 0 tries to check at the same moment
    let check: ClientMessage = Action::new(ActionKind::Check, 0).into();
    let (early, on_turn) = tokio::join!(room.handle(ana.id, check), room.handle(bo.id, call()));
    assert_eq!((early, on_turn), (Flow::Continue, Flow::Continue));

    assert_eq!(texts(&ana.drain(), ServerKind::BadRequest), vec!["it's not your turn"]);
    assert!(texts(&bo.drain(), ServerKind::BadRequest).is_empty());
    let view = room.table_view().await;
    assert_eq!(view.state, TableState::PreFlop);
    assert_eq!(view.cur_player, Some(0));
    assert_eq!(view.pot_total(), 20);
    assert_eq!(chips_in_play(&room).await, 200_000);
}

#[tokio::test]
async fn test_turn_holder_folded_when_grace_expires() {
    let room = new_room(50);
    let ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;
    let _cy = join(&room, "cy").await;
    room.handle(ana.id, ClientMessage::StartGame).await;
    // seat 0 deals, seats 1 and 2 post the blinds, seat 0 acts first
    assert_eq!(room.table_view().await.cur_player, Some(0));
    bo.drain();

    room.disconnect(ana.id, ana.conn, false).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(room.num_clients().await, 2);
    let view = room.table_view().await;
    assert_eq!(view.state, TableState::PreFlop);
    assert_eq!(view.num_players, 2);
    assert_eq!(view.cur_player, Some(1));
    assert_eq!(view.pot_total(), 15);
    assert_eq!(chips_in_play(&room).await, 200_000);

    let msgs = bo.drain();
    assert!(kinds(&msgs).contains(&ServerKind::PlayerAction));
    assert!(kinds(&msgs).contains(&ServerKind::PlayerTurn));
    assert!(kinds(&msgs).contains(&ServerKind::ClientExited));
    assert_eq!(room.admin().await, Some(bo.id));
}

#[tokio::test]
async fn test_absent_player_expires_mid_hand() {
    let room = new_room(50);
    let ana = join(&room, "ana").await;
    let bo = join(&room, "bo").await;
    let cy = join(&room, "cy").await;
    room.handle(ana.id, ClientMessage::StartGame).await;
    room.handle(ana.id, call()).await;
    assert_eq!(room.table_view().await.cur_player, Some(1));

    // the big blind drops while seat 1 is still to act
    room.disconnect(cy.id, cy.conn, false).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(room.seat_of(cy.id).await, None);
    let view = room.table_view().await;
    assert_eq!(view.num_players, 2);
    assert_eq!(view.cur_player, Some(1));
    assert_eq!(room.with_table(|t| ring(t.active_players())).await, vec![0, 1]);
    assert_eq!(room.with_table(|t| ring(t.cur_players())).await, vec![0, 1]);
    // the big blind stays in as dead money, the rest of that stack left with it
    assert_eq!(view.pot_total(), 25);
    assert_eq!(chips_in_play(&room).await, 300_000 - 99_990);

    room.handle(bo.id, call()).await;
    let view = room.table_view().await;
    assert_eq!(view.state, TableState::Rounds);
    assert_eq!(view.comm_state, TableState::Flop);
    assert_eq!(view.pot_total(), 30);
    assert_eq!(chips_in_play(&room).await, 300_000 - 99_990);
}

#[tokio::test]
async fn test_action_during_settings_change_is_rejected() {
    let config = Arc::new(ServerConfig {
        room: RoomConfig { round_over_delay_ms: 300, ..RoomConfig::unpaced() },
        ..ServerConfig::default()
    });
    let room = Room::new("test", config, Weak::new()).unwrap();
    let ana = join(&room, "ana").await;
    let mut bo = join(&room, "bo").await;
    let cy = join(&room, "cy").await;
    room.handle(ana.id, ClientMessage::StartGame).await;
    room.handle(ana.id, Action::new(ActionKind::Fold, 0).into()).await;
    assert_eq!(room.table_view().await.cur_player, Some(1));
    bo.drain();

    // the big blind steps out to watch; that settles the round and the
    // settings change holds the table through the pause before the next deal
    let watch = ClientSettings { name: "cy".to_string(), is_spectator: true, ..ClientSettings::default() };
    let pending = {
        let (room, id) = (Arc::clone(&room), cy.id);
        tokio::spawn(async move { room.handle(id, ClientMessage::ClientSettings(watch)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    room.handle(bo.id, call()).await;
    assert_eq!(pending.await.unwrap(), Flow::Continue);

    let msgs = bo.drain();
    assert_eq!(texts(&msgs, ServerKind::BadRequest), vec!["that action is not valid at this time"]);
    assert!(kinds(&msgs).contains(&ServerKind::RoundOver));
    assert_eq!(room.with_table(|t| t.round_count()).await, 1);
    assert_eq!(room.table_view().await.state, TableState::PreFlop);
    assert_eq!(chips_in_play(&room).await, 300_000 - 99_990);
}

#[tokio::test]
async fn test_slow_connection_is_dropped() {
    let room = new_room(1000);
    let mut ana = join(&room, "ana").await;
    let (tx, mut slow) = mpsc::channel(16);
    let watch = ClientSettings { name: "eve".to_string(), is_spectator: true, ..ClientSettings::default() };
    room.join(Uuid::new_v4(), tx, watch).await.expect("join accepted");
    ana.drain();

    for _ in 0..20 {
        room.handle(ana.id, ClientMessage::Chat("hi".to_string())).await;
    }
    assert_eq!(room.num_clients().await, 1);
    assert!(kinds(&ana.drain()).contains(&ServerKind::ClientExited));

    let queued: Vec<ServerMessage> = std::iter::from_fn(|| slow.try_recv().ok()).collect();
    assert_eq!(queued.len(), 16);
    assert_eq!(slow.try_recv().unwrap_err(), TryRecvError::Disconnected);
}

#[tokio::test]
async fn test_emptied_room_turns_away_late_joins() {
    let state = AppState::new(ServerConfig { room: RoomConfig::unpaced(), ..ServerConfig::default() });
    let room = state.room("lobby").unwrap();
    let ana = join(&room, "ana").await;
    room.disconnect(ana.id, ana.conn, true).await;

    assert!(room.is_retired());
    assert!(!state.rooms.contains_key("lobby"));

    // a join still holding the old room is turned away quietly
    let (id, mut rx) = try_join(&room, settings("bo")).await;
    assert_eq!(id, None);
    assert!(rx.try_recv().is_err());

    let fresh = state.room("lobby").unwrap();
    assert!(!Arc::ptr_eq(&room, &fresh));
    let bo = join(&fresh, "bo").await;
    assert_eq!(fresh.admin().await, Some(bo.id));
}
