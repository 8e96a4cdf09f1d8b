//! JSON export of finished games.
//!
//! The file carries the full [`Outcome`]: termination reason, winner, timing
//! and every move with the number of requests it took.

use crate::board::Side;
use crate::game_runner::{MatchResult, MoveRecord, Outcome, Termination};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;

/// JSON representation of a complete game.
#[derive(Serialize)]
struct GameJson<'a> {
    /// Unique identifier for the game.
    id: &'a str,
    white: &'a str,
    black: &'a str,
    result: MatchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner: Option<Side>,
    termination: &'a Termination,
    /// Human-readable form of `termination`.
    reason: String,
    plies: u32,
    duration_secs: f64,
    /// Requests spent on accepted moves.
    total_attempts: u32,
    start_fen: &'a str,
    final_fen: &'a str,
    moves: &'a [MoveRecord],
    /// ISO 8601 timestamp when the file was created.
    created_at: String,
}

/// Writes a finished game to a JSON file.
///
/// # Arguments
///
/// * `path` - The filesystem path where the JSON file should be written.
/// * `id` - A unique identifier for this game (typically a UUID).
/// * `outcome` - The finished game.
///
/// # Errors
///
/// Returns an `std::io::Error` if the file cannot be created or written to.
///
/// # File Format
///
/// ```json
/// {
///   "id": "game-uuid",
///   "white": "Player_White",
///   "black": "Player_Black",
///   "result": "white_wins",
///   "winner": "white",
///   "termination": { "kind": "checkmate", "winner": "white" },
///   "reason": "checkmate, white wins",
///   "plies": 41,
///   "duration_secs": 512.3,
///   "total_attempts": 47,
///   "start_fen": "...",
///   "final_fen": "...",
///   "moves": [
///     { "ply": 1, "fullmove": 1, "side": "white", "uci": "e2e4", "san": "e4", "attempts": 1, "fen": "..." }
///   ],
///   "created_at": "2024-01-15T12:00:00+00:00"
/// }
/// ```
pub fn write_json<P: AsRef<Path>>(path: P, id: &str, outcome: &Outcome) -> std::io::Result<()> {
    let json = GameJson {
        id,
        white: &outcome.white_name,
        black: &outcome.black_name,
        result: outcome.result,
        winner: outcome.winner,
        termination: &outcome.termination,
        reason: outcome.termination.to_string(),
        plies: outcome.plies,
        duration_secs: outcome.duration.as_secs_f64(),
        total_attempts: outcome.moves.iter().map(|m| m.attempts).sum(),
        start_fen: &outcome.start_fen,
        final_fen: &outcome.final_fen,
        moves: &outcome.moves,
        created_at: Utc::now().to_rfc3339(),
    };

    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &json)?;
    Ok(())
}
