#![cfg(feature = "board")]

//! Rebuilding a playable position from the move list of a game stream.

use crate::models::{GameFull, GameState};
use chess::{ChessMove, Game};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("board could not be loaded by the given FEN: {0}")]
    LoadingFen(String),
    #[error("move {0:?} could not be parsed")]
    InvalidMove(String),
    #[error("move {0:?} is not legal in this position")]
    IllegalMove(String),
}

/// Plays `moves` (UCI, space separated) from `initial_fen` (a FEN or `startpos`).
pub fn replay(initial_fen: &str, moves: &str) -> Result<Game, BoardError> {
    let mut game = if initial_fen == "startpos" || initial_fen.is_empty() {
        Game::new()
    } else {
        Game::from_str(initial_fen).map_err(|e| BoardError::LoadingFen(e.to_string()))?
    };

    for m in moves.split_whitespace() {
        let chess_move =
            ChessMove::from_str(m).map_err(|_| BoardError::InvalidMove(m.to_string()))?;
        if !game.make_move(chess_move) {
            return Err(BoardError::IllegalMove(m.to_string()));
        }
    }
    Ok(game)
}

impl GameFull {
    /// The current position of the game.
    pub fn game(&self) -> Result<Game, BoardError> {
        replay(&self.initial_fen, &self.state.moves)
    }
}

impl GameState {
    /// The position after this state's moves, starting from the `initialFen` of the `gameFull` line.
    pub fn game(&self, initial_fen: &str) -> Result<Game, BoardError> {
        replay(initial_fen, &self.moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::{Color, Piece, Square};

    #[test]
    fn test_replay_from_startpos() {
        let game = replay("startpos", "e2e4 e7e5 g1f3").unwrap();
        assert_eq!(game.side_to_move(), Color::Black);
        assert_eq!(
            game.current_position().piece_on(Square::F3),
            Some(Piece::Knight)
        );
    }

    #[test]
    fn test_replay_from_fen() {
        let game = replay("4k3/8/8/8/8/8/8/4K2R w K - 0 1", "h1h7").unwrap();
        assert_eq!(game.current_position().piece_on(Square::H7), Some(Piece::Rook));
        assert_eq!(game.side_to_move(), Color::Black);
    }

    #[test]
    fn test_illegal_and_invalid_moves() {
        assert!(matches!(
            replay("startpos", "e2e5"),
            Err(BoardError::IllegalMove(m)) if m == "e2e5"
        ));
        assert!(matches!(
            replay("startpos", "nonsense"),
            Err(BoardError::InvalidMove(_))
        ));
        assert!(matches!(
            replay("not a fen", ""),
            Err(BoardError::LoadingFen(_))
        ));
    }
}
