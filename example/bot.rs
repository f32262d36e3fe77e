// Plays every game of a BOT account with the first legal move it finds.
// Run with:
// cargo run --example bot -- <api key>

use chess::MoveGen;
use lichess_client::board::replay;
use lichess_client::models::{BoardEvent, Color, IncomingEvent};
use lichess_client::{Bot, Event, Request};
use log::{error, info, warn};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

type LichessBot = Bot<Request>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let api_key = std::env::var("LICHESS_API_KEY").unwrap_or_else(|_| {
        let args: Vec<String> = std::env::args().collect();
        if args.len() < 2 {
            eprintln!(
                "Please provide API key as argument or set LICHESS_API_KEY environment variable"
            );
            std::process::exit(1);
        }
        args[1].clone()
    });

    let bot = Arc::new(Bot::connect(Request::new(api_key)).await?);
    let me = bot.get_profile().await?.id;

    let weak = Arc::downgrade(&bot);
    let events = bot.on_new_event(move |event| on_event(&weak, &me, event))?;
    info!("waiting for challenges");

    tokio::select! {
        outcome = events.stream.wait() => info!("event stream ended: {:?}", outcome),
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    bot.close();
    Ok(())
}

fn on_event(bot: &Weak<LichessBot>, me: &str, event: &Event) {
    let Some(bot) = bot.upgrade() else {
        return;
    };
    match event.decode::<IncomingEvent>() {
        Ok(IncomingEvent::Challenge { challenge }) => {
            let ours = challenge
                .challenger
                .as_ref()
                .is_some_and(|challenger| challenger.id == me);
            if ours {
                return;
            }
            tokio::spawn(async move {
                match bot.accept_challenge(&challenge.id).await {
                    Ok(_) => info!("accepted challenge {}", challenge.id),
                    Err(e) => error!("could not accept challenge {}: {}", challenge.id, e),
                }
            });
        }
        Ok(IncomingEvent::GameStart { game }) => play(&bot, game.game_id, game.color),
        Ok(IncomingEvent::GameFinish { game }) => info!("game {} finished", game.game_id),
        Ok(_) => {}
        Err(e) => warn!("unexpected event {}: {}", event.payload(), e),
    }
}

fn play(bot: &Arc<LichessBot>, game_id: String, color: Color) {
    let side = match color {
        Color::White => chess::Color::White,
        Color::Black => chess::Color::Black,
    };
    let initial_fen = Mutex::new(String::from("startpos"));
    let handler = Arc::new(OnceLock::new());
    let weak = Arc::downgrade(bot);
    let id = game_id.clone();
    let own_handler = handler.clone();

    let listener = bot.on_new_game_state(&game_id, move |event| {
        let Some(bot) = weak.upgrade() else {
            return;
        };
        let state = match event.decode::<BoardEvent>() {
            Ok(BoardEvent::GameFull(full)) => {
                *initial_fen.lock().unwrap_or_else(PoisonError::into_inner) = full.initial_fen;
                full.state
            }
            Ok(BoardEvent::GameState(state)) => state,
            Ok(_) => return,
            Err(e) => {
                warn!("unexpected game state {}: {}", event.payload(), e);
                return;
            }
        };

        if !state.is_started() {
            info!("game {} is over: {}", id, state.status);
            if let Some(handler) = own_handler.get() {
                bot.remove_handler(*handler);
            }
            return;
        }

        let fen = initial_fen.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let game = match replay(&fen, &state.moves) {
            Ok(game) => game,
            Err(e) => {
                error!("could not replay game {}: {}", id, e);
                return;
            }
        };
        if game.side_to_move() != side {
            return;
        }
        let Some(next) = MoveGen::new_legal(&game.current_position()).next() else {
            return;
        };

        let id = id.clone();
        tokio::spawn(async move {
            let uci = next.to_string();
            match bot.make_board_move(&id, &uci, None).await {
                Ok(_) => info!("played {} in {}", uci, id),
                Err(e) => error!("move {} rejected in {}: {}", uci, id, e),
            }
        });
    });

    match listener {
        Ok(listener) => {
            let _ = handler.set(listener.handler);
        }
        Err(e) => error!("could not follow game {}: {}", game_id, e),
    }
}
