//! PGN (Portable Game Notation) export of finished games.
//!
//! Produces the Seven Tag Roster plus `Termination` and `PlyCount` tags, and
//! `SetUp`/`FEN` when the game did not start from the initial position.

use crate::board::Side;
use crate::game_runner::Outcome;
use chrono::Utc;
use std::fmt;
use std::path::Path;

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const LINE_WIDTH: usize = 80;

/// Renders `outcome` as PGN text.
///
/// Moves are written in SAN with move numbers; a game starting with Black to
/// move opens with `N...`. Move text is wrapped at 80 columns without
/// splitting tokens.
pub fn format_pgn(outcome: &Outcome) -> String {
    Pgn(outcome).to_string()
}

struct Pgn<'a>(&'a Outcome);

impl Pgn<'_> {
    fn move_text(&self) -> Vec<String> {
        let outcome = self.0;
        let mut tokens: Vec<String> = Vec::with_capacity(outcome.moves.len() * 3 / 2 + 2);
        for (i, mv) in outcome.moves.iter().enumerate() {
            match mv.side {
                Side::White => tokens.push(format!("{}.", mv.fullmove)),
                Side::Black if i == 0 => tokens.push(format!("{}...", mv.fullmove)),
                Side::Black => {}
            }
            tokens.push(mv.san.clone());
        }
        tokens.push(format!("{{{}}}", outcome.termination));
        tokens.push(outcome.result.as_pgn().to_string());
        tokens
    }
}

impl fmt::Display for Pgn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.0;

        writeln!(f, "[Event \"LLM Arena Match\"]")?;
        writeln!(f, "[Site \"local\"]")?;
        writeln!(f, "[Date \"{}\"]", Utc::now().format("%Y.%m.%d"))?;
        writeln!(f, "[Round \"-\"]")?;
        writeln!(f, "[White \"{}\"]", escape(&outcome.white_name))?;
        writeln!(f, "[Black \"{}\"]", escape(&outcome.black_name))?;
        writeln!(f, "[Result \"{}\"]", outcome.result.as_pgn())?;
        writeln!(f, "[Termination \"{}\"]", outcome.termination.pgn_tag())?;
        writeln!(f, "[PlyCount \"{}\"]", outcome.plies)?;
        if outcome.start_fen != START_FEN {
            writeln!(f, "[SetUp \"1\"]")?;
            writeln!(f, "[FEN \"{}\"]", outcome.start_fen)?;
        }
        writeln!(f)?;

        let mut width = 0;
        for token in self.move_text() {
            if width > 0 && width + 1 + token.len() > LINE_WIDTH {
                writeln!(f)?;
                width = 0;
            }
            if width > 0 {
                f.write_str(" ")?;
                width += 1;
            }
            f.write_str(&token)?;
            width += token.len();
        }
        writeln!(f)
    }
}

fn escape(tag: &str) -> String {
    tag.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Writes a finished game to a PGN file.
///
/// # Arguments
///
/// * `path` - The filesystem path where the PGN file should be written.
/// * `outcome` - The finished game.
///
/// # Errors
///
/// Returns an `std::io::Error` if the file cannot be created or written to.
pub fn write_pgn<P: AsRef<Path>>(path: P, outcome: &Outcome) -> std::io::Result<()> {
    std::fs::write(path, format_pgn(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{DrawReason, Side};
    use crate::game_runner::{MatchResult, MoveRecord, Termination};
    use std::time::Duration;

    fn record(ply: u32, fullmove: u32, side: Side, uci: &str, san: &str) -> MoveRecord {
        MoveRecord {
            ply,
            fullmove,
            side,
            uci: uci.to_string(),
            san: san.to_string(),
            attempts: 1,
            fen: String::new(),
        }
    }

    /// Helper function to create a test outcome.
    fn create_test_outcome() -> Outcome {
        let termination = Termination::Checkmate {
            winner: Side::Black,
        };
        Outcome {
            termination,
            result: termination.result(),
            winner: termination.winner(),
            plies: 4,
            duration: Duration::from_secs(42),
            moves: vec![
                record(1, 1, Side::White, "f2f3", "f3"),
                record(2, 1, Side::Black, "e7e5", "e5"),
                record(3, 2, Side::White, "g2g4", "g4"),
                record(4, 2, Side::Black, "d8h4", "Qh4#"),
            ],
            start_fen: START_FEN.to_string(),
            final_fen: "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3"
                .to_string(),
            white_name: "TestWhite".to_string(),
            black_name: "TestBlack".to_string(),
        }
    }

    #[test]
    fn test_write_pgn_creates_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let pgn_path = dir.path().join("game.pgn");

        write_pgn(&pgn_path, &create_test_outcome()).expect("Failed to write PGN file");

        let contents = std::fs::read_to_string(&pgn_path).expect("Failed to read PGN file");
        assert!(
            contents.contains("[Event \"LLM Arena Match\"]"),
            "Should contain Event header"
        );
        assert!(contents.contains("[Date \""), "Should contain Date header");
        assert!(
            contents.contains("[White \"TestWhite\"]"),
            "Should contain White header"
        );
        assert!(
            contents.contains("[Black \"TestBlack\"]"),
            "Should contain Black header"
        );
        assert!(
            contents.contains("[Result \"0-1\"]"),
            "Should contain Result header"
        );
        assert!(
            contents.contains("[Termination \"normal\"]"),
            "Should contain Termination header"
        );
        assert!(contents.contains("[PlyCount \"4\"]"));
        assert!(!contents.contains("[SetUp"), "Standard start needs no FEN tag");
    }

    #[test]
    fn test_moves_are_numbered_san() {
        let pgn = format_pgn(&create_test_outcome());

        assert!(
            pgn.contains("1. f3 e5 2. g4 Qh4# {checkmate, black wins} 0-1"),
            "Unexpected move text: {}",
            pgn
        );
    }

    #[test]
    fn test_custom_start_with_black_to_move() {
        let termination = Termination::MoveLimit { max_moves: 1 };
        let outcome = Outcome {
            termination,
            result: MatchResult::Unfinished,
            winner: None,
            plies: 1,
            duration: Duration::ZERO,
            moves: vec![record(1, 12, Side::Black, "h8g8", "Kg8")],
            start_fen: "7k/8/8/8/8/8/8/K6R b - - 3 12".to_string(),
            final_fen: "6k1/8/8/8/8/8/8/K6R w - - 4 13".to_string(),
            white_name: "W".to_string(),
            black_name: "B".to_string(),
        };

        let pgn = format_pgn(&outcome);

        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.contains("[FEN \"7k/8/8/8/8/8/8/K6R b - - 3 12\"]"));
        assert!(pgn.contains("[Termination \"unterminated\"]"));
        assert!(pgn.contains("12... Kg8"));
        assert!(pgn.trim_end().ends_with('*'));
    }

    #[test]
    fn test_long_games_wrap_without_splitting_tokens() {
        let mut outcome = create_test_outcome();
        outcome.termination = Termination::Draw {
            rule: DrawReason::FivefoldRepetition,
        };
        outcome.result = MatchResult::Draw;
        outcome.moves = (0..80)
            .map(|i| {
                let side = if i % 2 == 0 { Side::White } else { Side::Black };
                record(i + 1, i / 2 + 1, side, "g1f3", "Nf3")
            })
            .collect();

        let pgn = format_pgn(&outcome);
        let move_text: Vec<&str> = pgn.split("\n\n").nth(1).unwrap().lines().collect();

        assert!(move_text.len() > 1);
        for line in &move_text {
            assert!(line.len() <= LINE_WIDTH, "line too long: {}", line);
        }
        assert!(move_text.join(" ").contains("40. Nf3 Nf3"));
        assert!(pgn.contains("[Result \"1/2-1/2\"]"));
    }

    #[test]
    fn test_player_names_are_escaped() {
        let mut outcome = create_test_outcome();
        outcome.white_name = "Model \"A\"".to_string();

        assert!(format_pgn(&outcome).contains("[White \"Model \\\"A\\\"\"]"));
    }

    #[test]
    fn test_empty_game_still_has_result() {
        let mut outcome = create_test_outcome();
        outcome.moves.clear();
        outcome.plies = 0;
        outcome.termination = Termination::Stalemate;
        outcome.result = MatchResult::Draw;

        let pgn = format_pgn(&outcome);

        assert!(pgn.contains("[Result \"1/2-1/2\"]"));
        assert!(pgn.trim_end().ends_with("{stalemate} 1/2-1/2"));
    }
}
