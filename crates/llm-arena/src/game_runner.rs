//! Game execution logic for matches between two language-model players.
//!
//! This module provides the [`GameRunner`] struct, which alternates move
//! requests between the two sides, applies accepted moves to the board and
//! decides when and why the game ends.

use crate::board::{Board, BoardStatus, DrawReason, Side};
use crate::completion::CompletionEndpoint;
use crate::config::PlayerConfig;
use crate::export::BoardExporter;
use crate::resolver::{MoveResolver, ResolveError};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// A single applied move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    /// 1-based ply index.
    pub ply: u32,
    /// Fullmove number before the move.
    pub fullmove: u32,
    pub side: Side,
    /// The move in UCI notation (e.g., "e2e4", "g1f3").
    pub uci: String,
    /// The move in standard algebraic notation.
    pub san: String,
    /// Requests needed to obtain the move.
    pub attempts: u32,
    /// Position after the move.
    pub fen: String,
}

/// The outcome of a chess game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    /// White won by checkmate.
    WhiteWins,
    /// Black won by checkmate.
    BlackWins,
    /// Stalemate or a drawing rule.
    Draw,
    /// The game stopped before a result was reached.
    Unfinished,
}

impl MatchResult {
    /// PGN result token.
    pub fn as_pgn(self) -> &'static str {
        match self {
            Self::WhiteWins => "1-0",
            Self::BlackWins => "0-1",
            Self::Draw => "1/2-1/2",
            Self::Unfinished => "*",
        }
    }
}

/// Why the game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    Checkmate { winner: Side },
    Stalemate,
    Draw { rule: DrawReason },
    /// The ply ceiling was reached.
    MoveLimit { max_moves: u32 },
    /// `side` failed to produce a legal move `errors` plies in a row.
    TooManyConsecutiveErrors { side: Side, errors: u32 },
    /// The daily call budget ran out.
    QuotaExhausted { limit: u32, date: NaiveDate },
}

impl Termination {
    pub fn winner(&self) -> Option<Side> {
        match self {
            Self::Checkmate { winner } => Some(*winner),
            _ => None,
        }
    }

    pub fn result(&self) -> MatchResult {
        match self {
            Self::Checkmate { winner: Side::White } => MatchResult::WhiteWins,
            Self::Checkmate { winner: Side::Black } => MatchResult::BlackWins,
            Self::Stalemate | Self::Draw { .. } => MatchResult::Draw,
            Self::MoveLimit { .. }
            | Self::TooManyConsecutiveErrors { .. }
            | Self::QuotaExhausted { .. } => MatchResult::Unfinished,
        }
    }

    /// Whether the game was cut short by a failure rather than by the rules
    /// or the move limit.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            Self::TooManyConsecutiveErrors { .. } | Self::QuotaExhausted { .. }
        )
    }

    /// Value of the PGN `Termination` tag.
    pub fn pgn_tag(&self) -> &'static str {
        match self {
            Self::Checkmate { .. } | Self::Stalemate | Self::Draw { .. } => "normal",
            Self::MoveLimit { .. } => "unterminated",
            Self::TooManyConsecutiveErrors { .. } | Self::QuotaExhausted { .. } => "abandoned",
        }
    }
}

impl From<BoardStatus> for Termination {
    fn from(status: BoardStatus) -> Self {
        match status {
            BoardStatus::Checkmate { winner } => Self::Checkmate { winner },
            BoardStatus::Stalemate => Self::Stalemate,
            BoardStatus::Draw(rule) => Self::Draw { rule },
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkmate { winner } => write!(f, "checkmate, {winner} wins"),
            Self::Stalemate => f.write_str("stalemate"),
            Self::Draw { rule } => write!(f, "draw by {rule}"),
            Self::MoveLimit { max_moves } => write!(f, "move limit of {max_moves} plies reached"),
            Self::TooManyConsecutiveErrors { side, errors } => write!(
                f,
                "{side} failed to produce a legal move {errors} times in a row"
            ),
            Self::QuotaExhausted { limit, date } => {
                write!(f, "daily quota of {limit} calls exhausted for {date}")
            }
        }
    }
}

/// The result of a finished game.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub termination: Termination,
    pub result: MatchResult,
    /// Winning side, if the game ended in checkmate.
    pub winner: Option<Side>,
    /// Moves applied.
    pub plies: u32,
    /// Wall-clock time spent in [`GameRunner::play_game`].
    pub duration: Duration,
    pub moves: Vec<MoveRecord>,
    pub start_fen: String,
    pub final_fen: String,
    pub white_name: String,
    pub black_name: String,
}

/// Limits applied to a single game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSettings {
    /// Ply ceiling.
    pub max_moves: u32,
    /// Failed plies in a row before the game is abandoned.
    pub max_consecutive_errors: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_moves: 100,
            max_consecutive_errors: 5,
        }
    }
}

/// Plays one game between two players that share a resolver.
///
/// # Example
///
/// ```ignore
/// let mut runner = GameRunner::new(resolver, white, black, GameSettings::default())
///     .with_exporter(Box::new(SvgExporter::new("moves")));
/// let outcome = runner.play_game();
/// println!("{}", outcome.termination);
/// ```
pub struct GameRunner<E> {
    resolver: MoveResolver<E>,
    white: PlayerConfig,
    black: PlayerConfig,
    settings: GameSettings,
    board: Board,
    exporter: Option<Box<dyn BoardExporter>>,
}

impl<E: CompletionEndpoint> GameRunner<E> {
    /// Creates a runner starting from the standard position.
    ///
    /// # Arguments
    ///
    /// * `resolver` - Produces validated moves for either side
    /// * `white` - Configuration of the white player
    /// * `black` - Configuration of the black player
    /// * `settings` - Move limit and error threshold
    pub fn new(
        resolver: MoveResolver<E>,
        white: PlayerConfig,
        black: PlayerConfig,
        settings: GameSettings,
    ) -> Self {
        Self {
            resolver,
            white,
            black,
            settings,
            board: Board::new(),
            exporter: None,
        }
    }

    /// Starts from `board` instead of the standard position.
    pub fn with_board(mut self, board: Board) -> Self {
        self.board = board;
        self
    }

    /// Sends the position after every move to `exporter`.
    pub fn with_exporter(mut self, exporter: Box<dyn BoardExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn resolver(&self) -> &MoveResolver<E> {
        &self.resolver
    }

    /// Plays until the rules, the move limit or a failure end the game.
    ///
    /// Terminal positions are checked before every ply in a fixed order:
    /// checkmate, stalemate, drawing rules, then the move limit. A ply whose
    /// attempts are exhausted is retried for the same side until
    /// `max_consecutive_errors` plies in a row have failed.
    pub fn play_game(&mut self) -> Outcome {
        let started = Instant::now();
        let start_fen = self.board.fen();
        let mut moves: Vec<MoveRecord> = Vec::new();
        let mut consecutive_errors = 0;

        let termination = loop {
            if let Some(status) = self.board.status() {
                break Termination::from(status);
            }
            let plies = moves.len() as u32;
            if plies >= self.settings.max_moves {
                break Termination::MoveLimit {
                    max_moves: self.settings.max_moves,
                };
            }

            let side = self.board.side_to_move();
            let player = match side {
                Side::White => &self.white,
                Side::Black => &self.black,
            };

            let resolved = match self.resolver.resolve_move(&self.board, player) {
                Ok(resolved) => resolved,
                Err(ResolveError::QuotaExhausted(rate_governor::RateError::QuotaExhausted {
                    limit,
                    date,
                })) => {
                    error!(limit, %date, "daily quota exhausted, stopping game");
                    break Termination::QuotaExhausted { limit, date };
                }
                Err(e @ ResolveError::MoveGenerationExhausted { .. }) => {
                    consecutive_errors += 1;
                    warn!(
                        player = %player.name,
                        consecutive_errors,
                        max = self.settings.max_consecutive_errors,
                        "{e}"
                    );
                    if consecutive_errors >= self.settings.max_consecutive_errors {
                        break Termination::TooManyConsecutiveErrors {
                            side,
                            errors: consecutive_errors,
                        };
                    }
                    continue;
                }
            };

            let fullmove = self.board.fullmove_number();
            let san = match self.board.play(&resolved.uci) {
                Ok(san) => san,
                Err(e) => {
                    // The resolver only returns moves from the legal list.
                    error!(uci = %resolved.uci, "validated move rejected by board: {e}");
                    consecutive_errors += 1;
                    if consecutive_errors >= self.settings.max_consecutive_errors {
                        break Termination::TooManyConsecutiveErrors {
                            side,
                            errors: consecutive_errors,
                        };
                    }
                    continue;
                }
            };
            consecutive_errors = 0;

            let ply = plies + 1;
            let fen = self.board.fen();
            info!(
                ply,
                player = %player.name,
                uci = %resolved.uci,
                attempts = resolved.attempts,
                "Move {fullmove}: {side} plays {san}"
            );

            if let Some(exporter) = self.exporter.as_mut() {
                if let Err(e) = exporter.export(&fen, ply) {
                    warn!(ply, "board export failed: {e}");
                }
            }

            moves.push(MoveRecord {
                ply,
                fullmove,
                side,
                uci: resolved.uci,
                san,
                attempts: resolved.attempts,
                fen,
            });
        };

        let duration = started.elapsed();
        info!(plies = moves.len(), ?duration, "Game over: {termination}");

        Outcome {
            termination,
            result: termination.result(),
            winner: termination.winner(),
            plies: moves.len() as u32,
            duration,
            moves,
            start_fen,
            final_fen: self.board.fen(),
            white_name: self.white.name.clone(),
            black_name: self.black.name.clone(),
        }
    }
}
