use std::io::Write;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;
use uuid::Uuid;

use poker_room_core::{
    Action, ActionKind, AdminSettings, ClientMessage, ClientSettings, ServerKind, ServerMessage, TableLock, TableView,
    cards_to_string,
};

const DEFAULT_SERVER: &str = "127.0.0.1:25917";

const HELP: &str = "\
commands:
  start                 start the game (admin only)
  check | call | fold   act on your turn
  bet <amount>          raise the bet to <amount> for this stage
  allin                 push every chip in
  chat <text>           talk to the table
  name <name>           change your name
  spectate | sit        watch the table, or take an open seat
  leave                 give up your seat and spectate
  seats <n>             admin: table size, 2 to 7
  lock <none|players|spectators|all>
                        admin: who may join
  password <pw>         admin: room password, empty to clear
  quit                  leave the room";

struct Args {
    server: String,
    room: String,
    settings: ClientSettings,
    reconnect: Option<Uuid>,
}

fn parse_args() -> Result<Args, String> {
    let mut server = std::env::var("POKER_ROOM_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string());
    let mut settings = ClientSettings::default();
    let mut reconnect = None;
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--server" => server = args.next().ok_or("--server needs an address")?,
            "--password" => settings.password = args.next().ok_or("--password needs a value")?,
            "--spectate" => settings.is_spectator = true,
            "--reconnect" => {
                let token = args.next().ok_or("--reconnect needs the token printed on connect")?;
                reconnect = Some(token.parse::<Uuid>().map_err(|e| format!("bad reconnect token: {}", e))?);
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let room = positional.next().ok_or("usage: poker_room_client <room> [name] [--spectate] [--password pw] [--reconnect token] [--server host:port]")?;
    settings.name = positional.next().unwrap_or_default();
    Ok(Args { server, room, settings, reconnect })
}

fn parse_lock(word: &str) -> Option<TableLock> {
    match word {
        "none" => Some(TableLock::None),
        "players" => Some(TableLock::PlayersLocked),
        "spectators" => Some(TableLock::SpectatorsLocked),
        "all" => Some(TableLock::AllLocked),
        _ => None,
    }
}

/// One line for a notification, or nothing for bookkeeping messages.
fn render(msg: &ServerMessage) -> Option<String> {
    let who = msg
        .player
        .as_ref()
        .map(|p| p.name.clone())
        .or_else(|| msg.client.as_ref().map(|c| c.name.clone()))
        .unwrap_or_default();
    let text = msg.msg.clone().unwrap_or_default();

    match msg.kind {
        ServerKind::NewConnection => match msg.client.as_ref().and_then(|c| c.private_id) {
            Some(token) => Some(format!("connected as {} (reconnect token: {})", who, token)),
            None => Some(format!("{} connected", who)),
        },
        ServerKind::NewPlayer => Some(format!("{} sat down", who)),
        ServerKind::PlayerLeft => Some(format!("{} left their seat", who)),
        ServerKind::ClientExited => Some(format!("{} left", who)),
        ServerKind::MakeAdmin => Some("you are now the table admin".to_string()),
        ServerKind::StartGame => Some("the game has started".to_string()),
        ServerKind::Deal | ServerKind::YourPlayer => msg.player.as_ref().filter(|p| !p.hole.is_empty()).map(|p| {
            format!("your cards: {} ({} chips)", cards_to_string(&p.hole), p.chip_count)
        }),
        ServerKind::Flop | ServerKind::Turn | ServerKind::River => msg
            .table
            .as_ref()
            .map(|t| format!("{:?}: {}  pot {}", msg.kind, cards_to_string(&t.community), t.pot_total())),
        ServerKind::PlayerAction => msg.player.as_ref().map(|p| {
            format!("{}: {:?} {} ({} left)", p.name, p.action.kind, p.action.amount, p.chip_count)
        }),
        ServerKind::PlayerTurn => {
            let bet = msg.table.as_ref().map(|t| t.bet).unwrap_or_default();
            Some(format!("{}'s turn, current bet {}", who, bet))
        }
        ServerKind::PlayerReconnecting => Some(format!("{} lost connection", who)),
        ServerKind::PlayerReconnected => Some(format!("{} is back", who)),
        ServerKind::Reset => Some("the table was reset".to_string()),
        ServerKind::Chat
        | ServerKind::RoundOver
        | ServerKind::Eliminated
        | ServerKind::ServerMessage
        | ServerKind::ServerClosed => Some(text),
        ServerKind::BadRequest | ServerKind::TableLocked | ServerKind::BadAuth => Some(format!("error: {}", text)),
        ServerKind::CurrentPlayers
        | ServerKind::UpdatePlayer
        | ServerKind::UpdateTable
        | ServerKind::ClientSettings
        | ServerKind::PlayerHead => None,
    }
}

/// What the client remembers between commands so a settings request can be
/// sent whole.
#[derive(Debug, Clone, Default)]
struct Prefs {
    name: String,
    password: String,
    spectating: bool,
}

impl Prefs {
    fn settings(&self, admin: Option<AdminSettings>) -> ClientMessage {
        ClientMessage::ClientSettings(ClientSettings {
            name: self.name.clone(),
            is_spectator: self.spectating,
            password: String::new(),
            admin,
        })
    }
}

/// Turns a typed line into a request. `Err` carries a usage hint.
fn parse_command(line: &str, table: &Option<TableView>, prefs: &mut Prefs) -> Result<Option<ClientMessage>, String> {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').map(|(c, r)| (c, r.trim())).unwrap_or((line, ""));

    // lock and password are absolute, so resend the ones in force
    let admin = AdminSettings {
        lock: table.as_ref().map(|t| t.lock).unwrap_or_default(),
        password: prefs.password.clone(),
        ..AdminSettings::default()
    };

    let msg = match command {
        "" => return Ok(None),
        "help" => return Err(HELP.to_string()),
        "start" => ClientMessage::StartGame,
        "check" => Action::new(ActionKind::Check, 0).into(),
        "call" => Action::new(ActionKind::Call, 0).into(),
        "fold" => Action::new(ActionKind::Fold, 0).into(),
        "allin" => Action::new(ActionKind::AllIn, 0).into(),
        "bet" => {
            let amount = rest.parse().map_err(|_| "usage: bet <amount>".to_string())?;
            Action::new(ActionKind::Bet, amount).into()
        }
        "chat" => ClientMessage::Chat(rest.to_string()),
        "name" => {
            prefs.name = rest.to_string();
            prefs.settings(None)
        }
        "spectate" => {
            prefs.spectating = true;
            prefs.settings(None)
        }
        "sit" => {
            prefs.spectating = false;
            prefs.settings(None)
        }
        "leave" => {
            prefs.spectating = true;
            ClientMessage::PlayerLeft
        }
        "seats" => {
            let num_seats = rest.parse().map_err(|_| "usage: seats <2-7>".to_string())?;
            prefs.settings(Some(AdminSettings { num_seats, ..admin }))
        }
        "lock" => {
            let lock = parse_lock(rest).ok_or("usage: lock <none|players|spectators|all>".to_string())?;
            prefs.settings(Some(AdminSettings { lock, ..admin }))
        }
        "password" => {
            prefs.password = rest.to_string();
            prefs.settings(Some(AdminSettings { password: prefs.password.clone(), ..admin }))
        }
        "quit" | "exit" => ClientMessage::ClientExited,
        other => return Err(format!("unknown command: {} (try help)", other)),
    };
    Ok(Some(msg))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(usage) => {
            eprintln!("{}", usage);
            std::process::exit(2);
        }
    };
    let url = Url::parse(&format!("ws://{}/ws/{}", args.server, args.room))?;

    println!("connecting to {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let hello = match args.reconnect {
        Some(private_id) => ClientMessage::Reconnect { private_id },
        None => ClientMessage::NewConnection(args.settings.clone()),
    };
    write.send(Message::Text(serde_json::to_string(&hello)?.into())).await?;

    // latest table snapshot, for admin commands that resend the whole block
    let (table_tx, table_rx) = watch::channel::<Option<TableView>>(None);

    let reader = tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                    Ok(msg) => {
                        if let Some(table) = &msg.table {
                            table_tx.send_replace(Some(table.clone()));
                        }
                        if let Some(line) = render(&msg) {
                            println!("\n{}", line);
                            print!("> ");
                            let _ = std::io::stdout().flush();
                        }
                        if msg.kind == ServerKind::ServerClosed {
                            break;
                        }
                    }
                    Err(e) => eprintln!("couldn't parse server message: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("connection error: {}", e);
                    break;
                }
            }
        }
        println!("\ndisconnected");
    });

    println!("{}", HELP);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut prefs = Prefs {
        name: args.settings.name.clone(),
        password: args.settings.password.clone(),
        spectating: args.settings.is_spectator,
    };

    loop {
        if reader.is_finished() {
            break;
        }
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else { break };
        let msg = match parse_command(&line, &table_rx.borrow(), &mut prefs) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(hint) => {
                println!("{}", hint);
                continue;
            }
        };

        let exiting = msg == ClientMessage::ClientExited;
        write.send(Message::Text(serde_json::to_string(&msg)?.into())).await?;
        if exiting {
            let _ = write.close().await;
            break;
        }
    }

    Ok(())
}
