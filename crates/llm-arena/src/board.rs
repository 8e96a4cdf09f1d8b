//! Board state backed by the `shakmaty` rules engine.
//!
//! [`Board`] wraps a [`shakmaty::Chess`] position together with the list of
//! position hashes seen since the start of the game, so that repetition draws
//! can be detected. All chess rules (legal moves, check, mate, material) come
//! from `shakmaty`; this module only translates between coordinate-move
//! strings and the engine's types.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};
use std::fmt;
use thiserror::Error;

/// Half-moves without capture or pawn move after which the game is drawn.
pub const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;

/// Occurrences of one position after which the game is drawn.
pub const FIVEFOLD: usize = 5;

/// Errors raised by board operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// The FEN string could not be parsed or describes an impossible position.
    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },
    /// The move is not in coordinate notation.
    #[error("not a coordinate move: {0}")]
    InvalidNotation(String),
    /// The move is well-formed but not legal in the current position.
    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// One of the two players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// Lower-case name, as used in prompts and file output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Self::White,
            Color::Black => Self::Black,
        }
    }
}

/// Reason for a drawn game other than stalemate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    /// Neither side can deliver mate.
    InsufficientMaterial,
    /// The same position occurred five times.
    FivefoldRepetition,
    /// 75 moves by each side without capture or pawn move.
    SeventyFiveMoveRule,
}

impl fmt::Display for DrawReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientMaterial => f.write_str("insufficient material"),
            Self::FivefoldRepetition => f.write_str("fivefold repetition"),
            Self::SeventyFiveMoveRule => f.write_str("seventy-five move rule"),
        }
    }
}

/// Terminal state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardStatus {
    /// The side to move is mated.
    Checkmate { winner: Side },
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// Drawn by rule.
    Draw(DrawReason),
}

/// A chess position with repetition history.
#[derive(Debug, Clone)]
pub struct Board {
    position: Chess,
    history: Vec<Zobrist64>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// The standard starting position.
    pub fn new() -> Self {
        Self::from_position(Chess::default())
    }

    /// Sets up a board from a FEN string.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::InvalidFen`] if the string does not parse or the
    /// position is not legal.
    pub fn from_fen(fen: &str) -> Result<Self, BoardError> {
        let invalid = |reason: String| BoardError::InvalidFen {
            fen: fen.to_string(),
            reason,
        };
        let parsed: Fen = fen.trim().parse().map_err(|e| invalid(format!("{e}")))?;
        let position: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))?;
        Ok(Self::from_position(position))
    }

    fn from_position(position: Chess) -> Self {
        let hash = position.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);
        Self {
            position,
            history: vec![hash],
        }
    }

    /// The current position in FEN.
    pub fn fen(&self) -> String {
        Fen::from_setup(self.position.clone().into_setup(EnPassantMode::Legal)).to_string()
    }

    /// The side to move.
    pub fn side_to_move(&self) -> Side {
        self.position.turn().into()
    }

    /// Full-move number, starting at 1.
    pub fn fullmove_number(&self) -> u32 {
        self.position.fullmoves().get()
    }

    /// All legal moves in coordinate notation (`e2e4`, `e7e8q`, `e1g1`).
    pub fn legal_moves(&self) -> Vec<String> {
        self.position
            .legal_moves()
            .iter()
            .map(|m| UciMove::from_move(m, CastlingMode::Standard).to_string())
            .collect()
    }

    /// Whether the side to move is in check.
    pub fn is_check(&self) -> bool {
        self.position.is_check()
    }

    /// Plays a coordinate move and returns its SAN.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::InvalidNotation`] if `uci` is not a coordinate
    /// move, or [`BoardError::IllegalMove`] if it is not legal here.
    pub fn play(&mut self, uci: &str) -> Result<String, BoardError> {
        let parsed: UciMove = uci
            .parse()
            .map_err(|_| BoardError::InvalidNotation(uci.to_string()))?;
        let m = parsed
            .to_move(&self.position)
            .map_err(|_| BoardError::IllegalMove(uci.to_string()))?;

        let san = SanPlus::from_move_and_play_unchecked(&mut self.position, &m);
        self.history
            .push(self.position.zobrist_hash::<Zobrist64>(EnPassantMode::Legal));
        Ok(san.to_string())
    }

    /// How many times the current position has occurred.
    pub fn repetitions(&self) -> usize {
        let current = self.history.last().copied();
        self.history
            .iter()
            .filter(|&&h| Some(h) == current)
            .count()
    }

    /// Terminal status, if any.
    ///
    /// Predicates are checked in a fixed order: checkmate, stalemate,
    /// insufficient material, fivefold repetition, seventy-five-move rule.
    pub fn status(&self) -> Option<BoardStatus> {
        if self.position.is_checkmate() {
            return Some(BoardStatus::Checkmate {
                winner: self.side_to_move().opposite(),
            });
        }
        if self.position.is_stalemate() {
            return Some(BoardStatus::Stalemate);
        }
        if self.position.is_insufficient_material() {
            return Some(BoardStatus::Draw(DrawReason::InsufficientMaterial));
        }
        if self.repetitions() >= FIVEFOLD {
            return Some(BoardStatus::Draw(DrawReason::FivefoldRepetition));
        }
        if self.position.halfmoves() >= SEVENTY_FIVE_MOVE_PLIES {
            return Some(BoardStatus::Draw(DrawReason::SeventyFiveMoveRule));
        }
        None
    }

    /// ASCII diagram, rank 8 first, `.` for empty squares.
    pub fn diagram(&self) -> String {
        diagram_from_fen(&self.fen())
    }
}

/// Renders the piece-placement field of a FEN string as an 8x8 diagram.
pub fn diagram_from_fen(fen: &str) -> String {
    let placement = fen.split_whitespace().next().unwrap_or("");
    placement
        .split('/')
        .map(|rank| {
            let mut squares = Vec::with_capacity(8);
            for c in rank.chars() {
                match c.to_digit(10) {
                    Some(empty) => squares.extend((0..empty).map(|_| '.')),
                    None => squares.push(c),
                }
            }
            squares
                .iter()
                .map(char::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_new_board_is_start_position() {
        let board = Board::new();
        assert_eq!(board.fen(), START_FEN);
        assert_eq!(board.side_to_move(), Side::White);
        assert_eq!(board.legal_moves().len(), 20);
        assert_eq!(board.status(), None);
    }

    #[test]
    fn test_play_returns_san_and_switches_side() {
        let mut board = Board::new();
        assert_eq!(board.play("g1f3").unwrap(), "Nf3");
        assert_eq!(board.side_to_move(), Side::Black);
        assert_eq!(board.play("e7e5").unwrap(), "e5");
        assert_eq!(board.fullmove_number(), 2);
    }

    #[test]
    fn test_play_rejects_illegal_and_malformed() {
        let mut board = Board::new();
        assert_eq!(
            board.play("e2e5"),
            Err(BoardError::IllegalMove("e2e5".to_string()))
        );
        assert_eq!(
            board.play("hello"),
            Err(BoardError::InvalidNotation("hello".to_string()))
        );
        assert_eq!(board.fen(), START_FEN);
    }

    #[test]
    fn test_legal_moves_use_coordinate_castling() {
        let board = Board::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let moves = board.legal_moves();
        assert!(moves.contains(&"e1g1".to_string()));
        assert!(moves.contains(&"e1c1".to_string()));
    }

    #[test]
    fn test_legal_moves_include_promotions() {
        let board = Board::from_fen("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        let moves = board.legal_moves();
        for promo in ["a7a8q", "a7a8r", "a7a8b", "a7a8n"] {
            assert!(moves.contains(&promo.to_string()), "missing {promo}");
        }
    }

    #[test]
    fn test_fools_mate_is_checkmate_for_black() {
        let mut board = Board::new();
        for m in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            board.play(m).unwrap();
        }
        assert!(board.is_check());
        assert_eq!(
            board.status(),
            Some(BoardStatus::Checkmate {
                winner: Side::Black
            })
        );
    }

    #[test]
    fn test_stalemate_detected() {
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(board.status(), Some(BoardStatus::Stalemate));
    }

    #[test]
    fn test_insufficient_material_detected() {
        let board = Board::from_fen("8/8/8/8/8/8/8/4K2k w - - 0 1").unwrap();
        assert_eq!(
            board.status(),
            Some(BoardStatus::Draw(DrawReason::InsufficientMaterial))
        );
    }

    #[test]
    fn test_seventy_five_move_rule_detected() {
        let board = Board::from_fen("8/8/8/8/8/8/8/R3K2k w Q - 150 80").unwrap();
        assert_eq!(
            board.status(),
            Some(BoardStatus::Draw(DrawReason::SeventyFiveMoveRule))
        );
    }

    #[test]
    fn test_fivefold_repetition_detected() {
        let mut board = Board::new();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        for _ in 0..3 {
            for m in shuffle {
                board.play(m).unwrap();
            }
        }
        assert_eq!(board.repetitions(), 4);
        assert_eq!(board.status(), None);

        for m in shuffle {
            board.play(m).unwrap();
        }
        assert_eq!(board.repetitions(), 5);
        assert_eq!(
            board.status(),
            Some(BoardStatus::Draw(DrawReason::FivefoldRepetition))
        );
    }

    #[test]
    fn test_invalid_fen_rejected() {
        let err = Board::from_fen("not a fen").unwrap_err();
        assert!(matches!(err, BoardError::InvalidFen { .. }));
        assert!(err.to_string().starts_with("invalid FEN 'not a fen'"));
    }

    #[test]
    fn test_diagram_of_start_position() {
        let diagram = Board::new().diagram();
        let rows: Vec<&str> = diagram.lines().collect();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0], "r n b q k b n r");
        assert_eq!(rows[3], ". . . . . . . .");
        assert_eq!(rows[7], "R N B Q K B N R");
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(Side::White.opposite(), Side::Black);
        assert_eq!(Side::Black.to_string(), "black");
        assert_eq!(Side::from(Color::White), Side::White);
    }
}
