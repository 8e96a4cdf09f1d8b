//! Turns raw completion text into a legal move.
//!
//! [`MoveResolver::resolve_move`] runs a small state machine per ply:
//!
//! ```text
//! REQUEST -> PARSE -> VALIDATE -> ACCEPT
//!    ^         |         |
//!    +--- REJECT <-------+----> ABORT (attempt ceiling reached)
//! ```
//!
//! A failed request, a response without a coordinate move and an illegal
//! move are all rejections. Each rejection is echoed back in the next prompt.
//! A quota refusal from the governor ends resolution immediately.

use crate::board::Board;
use crate::completion::{CompletionEndpoint, CompletionError};
use crate::config::PlayerConfig;
use crate::move_client::{MoveClient, MoveClientError, MoveRequest};
use rate_governor::RateError;
use thiserror::Error;
use tracing::{debug, warn};

/// Requests per ply before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Longest response excerpt echoed back to the model.
const ECHO_LIMIT: usize = 40;

/// Errors from [`MoveResolver::resolve_move`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Every attempt for this ply was rejected.
    #[error("no legal move after {attempts} attempts")]
    MoveGenerationExhausted { attempts: u32 },
    /// The daily call budget is spent.
    #[error(transparent)]
    QuotaExhausted(#[from] RateError),
}

/// One request/response cycle within a ply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveAttempt {
    /// 1-based attempt number.
    pub index: u32,
    /// The raw text, or why no text arrived.
    pub response: Result<String, CompletionError>,
    /// The normalized coordinate move found in the text.
    pub candidate: Option<String>,
    /// Whether `candidate` is legal in the current position.
    pub legal: bool,
}

impl MoveAttempt {
    /// Whether the response contained a coordinate move.
    pub fn parsed(&self) -> bool {
        self.candidate.is_some()
    }

    /// Why this attempt was rejected, phrased for the model.
    pub fn reason(&self) -> String {
        match (&self.response, &self.candidate) {
            (Err(e), _) => format!("the request failed ({e})"),
            (Ok(text), None) => format!(
                "\"{}\" does not contain a move in UCI format",
                excerpt(text)
            ),
            (Ok(_), Some(candidate)) if !self.legal => {
                format!("{candidate} is not a legal move in this position")
            }
            (Ok(_), Some(candidate)) => format!("{candidate} was accepted"),
        }
    }
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > ECHO_LIMIT {
        let cut: String = flat.chars().take(ECHO_LIMIT).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

/// A move accepted by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMove {
    /// Coordinate notation, e.g. `e2e4` or `e7e8q`.
    pub uci: String,
    /// Requests used, including the accepted one.
    pub attempts: u32,
}

enum State {
    Request,
    Parse(String),
    Validate { text: String, candidate: String },
    Accept(String),
    Reject(MoveAttempt),
    Abort,
}

/// Obtains a validated move for the side to move.
pub struct MoveResolver<E> {
    client: MoveClient<E>,
    max_attempts: u32,
}

impl<E: CompletionEndpoint> MoveResolver<E> {
    /// Creates a resolver. A `max_attempts` of zero is treated as one.
    pub fn new(client: MoveClient<E>, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn client(&self) -> &MoveClient<E> {
        &self.client
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Asks for a move until one is legal or the attempt ceiling is reached.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::MoveGenerationExhausted`] after
    /// `max_attempts` rejections, or [`ResolveError::QuotaExhausted`] as soon
    /// as the governor refuses a call.
    pub fn resolve_move(
        &self,
        board: &Board,
        player: &PlayerConfig,
    ) -> Result<ResolvedMove, ResolveError> {
        let legal = board.legal_moves();
        let mut history: Vec<MoveAttempt> = Vec::new();
        let mut attempt = 1;
        let mut state = State::Request;

        loop {
            state = match state {
                State::Request => {
                    let request = MoveRequest {
                        board,
                        legal_moves: &legal,
                        player,
                        history: &history,
                        full_move_list: attempt > 1 && attempt == self.max_attempts,
                    };
                    match self.client.request_move(&request) {
                        Ok(text) => State::Parse(text),
                        Err(MoveClientError::Quota(e)) => return Err(e.into()),
                        Err(MoveClientError::Completion(e)) => State::Reject(MoveAttempt {
                            index: attempt,
                            response: Err(e),
                            candidate: None,
                            legal: false,
                        }),
                    }
                }
                State::Parse(text) => match extract_candidate(&text) {
                    Some(candidate) => State::Validate { text, candidate },
                    None => State::Reject(MoveAttempt {
                        index: attempt,
                        response: Ok(text),
                        candidate: None,
                        legal: false,
                    }),
                },
                State::Validate { text, candidate } => {
                    if legal.contains(&candidate) {
                        State::Accept(candidate)
                    } else {
                        State::Reject(MoveAttempt {
                            index: attempt,
                            response: Ok(text),
                            candidate: Some(candidate),
                            legal: false,
                        })
                    }
                }
                State::Accept(uci) => {
                    debug!(player = %player.name, %uci, attempt, "move accepted");
                    return Ok(ResolvedMove {
                        uci,
                        attempts: attempt,
                    });
                }
                State::Reject(rejected) => {
                    warn!(
                        player = %player.name,
                        attempt,
                        max_attempts = self.max_attempts,
                        parsed = rejected.parsed(),
                        reason = %rejected.reason(),
                        "attempt rejected"
                    );
                    history.push(rejected);
                    if attempt >= self.max_attempts {
                        State::Abort
                    } else {
                        attempt += 1;
                        State::Request
                    }
                }
                State::Abort => {
                    return Err(ResolveError::MoveGenerationExhausted { attempts: attempt });
                }
            };
        }
    }
}

/// Finds the first coordinate move in `text`.
///
/// Tokens are split on anything other than letters, digits, `-` and `=`,
/// then lower-cased with `-` and `=` removed, so `E2-E4` yields `e2e4` and
/// `e7e8=Q` yields `e7e8q`.
pub fn extract_candidate(text: &str) -> Option<String> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '='))
        .map(normalize_token)
        .find(|token| is_coordinate_move(token))
}

fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|&c| c != '-' && c != '=')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Whether `token` matches `[a-h][1-8][a-h][1-8][qrbn]?` exactly.
pub fn is_coordinate_move(token: &str) -> bool {
    let b = token.as_bytes();
    let file = |c: u8| (b'a'..=b'h').contains(&c);
    let rank = |c: u8| (b'1'..=b'8').contains(&c);
    match b.len() {
        4 => file(b[0]) && rank(b[1]) && file(b[2]) && rank(b[3]),
        5 => {
            file(b[0])
                && rank(b[1])
                && file(b[2])
                && rank(b[3])
                && matches!(b[4], b'q' | b'r' | b'b' | b'n')
        }
        _ => false,
    }
}
