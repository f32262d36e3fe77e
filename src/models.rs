//! Typed views of Lichess payloads.
//!
//! Only the fields this crate relies on are spelled out. Anything else is
//! still reachable through [`crate::Event::payload`] or the `extra` maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Player {
    pub fn is_bot(&self) -> bool {
        self.title.as_deref() == Some("BOT")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub playing_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Variant {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChallengeUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub challenger: Option<ChallengeUser>,
    #[serde(default)]
    pub dest_user: Option<ChallengeUser>,
    #[serde(default)]
    pub rated: bool,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub variant: Option<Variant>,
}

/// The `game` object of `gameStart` and `gameFinish` events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub game_id: String,
    pub full_id: String,
    pub color: Color,
    #[serde(default)]
    pub fen: Option<String>,
    #[serde(default)]
    pub is_my_turn: bool,
    #[serde(default)]
    pub last_move: Option<String>,
    #[serde(default)]
    pub opponent: Option<Value>,
    #[serde(default)]
    pub speed: Option<String>,
}

/// Lines of the incoming event stream (`/api/stream/event`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IncomingEvent {
    Challenge { challenge: Challenge },
    ChallengeCanceled { challenge: Challenge },
    ChallengeDeclined { challenge: Challenge },
    GameStart { game: GameInfo },
    GameFinish { game: GameInfo },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ai_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GameState {
    /// Moves in UCI notation, separated by spaces.
    pub moves: String,
    #[serde(default)]
    pub wtime: u64,
    #[serde(default)]
    pub btime: u64,
    #[serde(default)]
    pub winc: u64,
    #[serde(default)]
    pub binc: u64,
    pub status: String,
    #[serde(default)]
    pub winner: Option<Color>,
    #[serde(default)]
    pub wdraw: bool,
    #[serde(default)]
    pub bdraw: bool,
    #[serde(default)]
    pub wtakeback: bool,
    #[serde(default)]
    pub btakeback: bool,
}

impl GameState {
    pub fn move_list(&self) -> Vec<&str> {
        self.moves.split_whitespace().collect()
    }

    pub fn last_move(&self) -> Option<&str> {
        self.moves.split_whitespace().last()
    }

    /// Side to move, assuming the game started from a position with white to move.
    pub fn side_to_move(&self) -> Color {
        if self.moves.split_whitespace().count() % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    pub fn is_started(&self) -> bool {
        self.status == "started"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFull {
    pub id: String,
    /// A FEN, or `startpos`.
    pub initial_fen: String,
    pub white: GamePlayer,
    pub black: GamePlayer,
    pub state: GameState,
    #[serde(default)]
    pub rated: Option<bool>,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub variant: Option<Variant>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatLine {
    pub username: String,
    pub text: String,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentGone {
    pub gone: bool,
    #[serde(default)]
    pub claim_win_in_seconds: Option<u64>,
}

/// Lines of a board or bot game stream. The first line is always `gameFull`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoardEvent {
    GameFull(GameFull),
    GameState(GameState),
    ChatLine(ChatLine),
    OpponentGone(OpponentGone),
    #[serde(other)]
    Unknown,
}

/// A position update of the TV feed or a game move stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionUpdate {
    pub fen: String,
    #[serde(default)]
    pub lm: Option<String>,
    /// Clocks in seconds.
    #[serde(default)]
    pub wc: Option<u64>,
    #[serde(default)]
    pub bc: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TvFeatured {
    pub id: String,
    pub orientation: Color,
    #[serde(default)]
    pub players: Vec<Value>,
    #[serde(default)]
    pub fen: Option<String>,
}

/// Lines of the TV feed (`/api/tv/feed`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "camelCase")]
pub enum TvMessage {
    Featured(TvFeatured),
    Fen(PositionUpdate),
}

/// Lines of the games-by-users stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub id: String,
    #[serde(default)]
    pub rated: Option<bool>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub created_at: Option<u64>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub status_name: Option<String>,
    #[serde(default)]
    pub players: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub(crate) struct OkResponse {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_incoming_events() {
        let challenge: IncomingEvent = serde_json::from_value(json!({
            "type": "challenge",
            "challenge": {
                "id": "7pGLxJ4F",
                "status": "created",
                "challenger": {"id": "lovlas", "name": "Lovlas", "rating": 1500},
                "destUser": {"id": "mybot", "name": "MyBot", "title": "BOT"},
                "rated": true,
                "speed": "rapid",
                "variant": {"key": "standard", "name": "Standard"}
            }
        }))
        .unwrap();
        let IncomingEvent::Challenge { challenge } = challenge else {
            panic!("expected a challenge");
        };
        assert_eq!(challenge.challenger.unwrap().id, "lovlas");
        assert_eq!(challenge.dest_user.unwrap().title.as_deref(), Some("BOT"));

        let start: IncomingEvent = serde_json::from_value(json!({
            "type": "gameStart",
            "game": {"gameId": "5IrD6Gzz", "fullId": "5IrD6GzzktHv", "color": "black", "isMyTurn": false}
        }))
        .unwrap();
        assert!(matches!(start, IncomingEvent::GameStart { ref game } if game.color == Color::Black));

        let other: IncomingEvent = serde_json::from_value(json!({"type": "somethingNew"})).unwrap();
        assert_eq!(other, IncomingEvent::Unknown);
    }

    #[test]
    fn test_board_events() {
        let full: BoardEvent = serde_json::from_value(json!({
            "type": "gameFull",
            "id": "5IrD6Gzz",
            "initialFen": "startpos",
            "white": {"id": "lovlas", "name": "Lovlas", "rating": 1500},
            "black": {"aiLevel": 1},
            "state": {
                "type": "gameState",
                "moves": "e2e4 c7c5",
                "wtime": 7598040, "btime": 8395220, "winc": 10000, "binc": 10000,
                "status": "started"
            }
        }))
        .unwrap();
        let BoardEvent::GameFull(full) = full else {
            panic!("expected gameFull");
        };
        assert_eq!(full.state.move_list(), vec!["e2e4", "c7c5"]);
        assert_eq!(full.state.side_to_move(), Color::White);
        assert_eq!(full.black.ai_level, Some(1));

        let state: BoardEvent = serde_json::from_value(json!({
            "type": "gameState", "moves": "e2e4", "status": "resign", "winner": "white"
        }))
        .unwrap();
        let BoardEvent::GameState(state) = state else {
            panic!("expected gameState");
        };
        assert!(!state.is_started());
        assert_eq!(state.winner, Some(Color::White));
        assert_eq!(state.last_move(), Some("e2e4"));
    }

    #[test]
    fn test_tv_messages() {
        let featured: TvMessage = serde_json::from_value(json!({
            "t": "featured",
            "d": {"id": "qVSOPtMc", "orientation": "black", "players": [], "fen": "8/8/8/8/8/8/8/8"}
        }))
        .unwrap();
        assert!(matches!(featured, TvMessage::Featured(ref f) if f.id == "qVSOPtMc"));

        let fen: TvMessage = serde_json::from_value(json!({
            "t": "fen", "d": {"fen": "8/8/8/8/8/8/8/8 w", "lm": "h7h5", "wc": 60, "bc": 59}
        }))
        .unwrap();
        assert!(matches!(fen, TvMessage::Fen(ref p) if p.lm.as_deref() == Some("h7h5")));
    }

    #[test]
    fn test_player_keeps_unknown_fields() {
        let player: Player = serde_json::from_value(json!({
            "id": "mybot", "username": "MyBot", "title": "BOT", "createdAt": 1290415680000u64,
            "perfs": {"blitz": {"rating": 1800}}
        }))
        .unwrap();
        assert!(player.is_bot());
        assert!(player.extra.contains_key("perfs"));
    }
}
