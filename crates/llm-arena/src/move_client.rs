//! A single rate-governed request for a move.

use crate::board::Board;
use crate::completion::{CompletionEndpoint, CompletionError, CompletionRequest};
use crate::config::PlayerConfig;
use crate::prompt::build_prompt;
use crate::resolver::MoveAttempt;
use rate_governor::{RateError, RateGovernor};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from [`MoveClient::request_move`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveClientError {
    /// The governor refused the call. No further calls are possible today.
    #[error(transparent)]
    Quota(#[from] RateError),
    /// The endpoint failed. The caller may try again.
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Everything the prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct MoveRequest<'a> {
    pub board: &'a Board,
    /// Legal moves of `board` in coordinate notation.
    pub legal_moves: &'a [String],
    pub player: &'a PlayerConfig,
    /// Rejected attempts for the current ply, oldest first.
    pub history: &'a [MoveAttempt],
    /// List every legal move instead of the first few.
    pub full_move_list: bool,
}

/// Asks the completion endpoint for a move, subject to the rate governor.
pub struct MoveClient<E> {
    endpoint: E,
    governor: Arc<RateGovernor>,
    legal_moves_in_prompt: usize,
}

impl<E: CompletionEndpoint> MoveClient<E> {
    /// Creates a client.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Where completions come from
    /// * `governor` - Call budget, possibly shared with other games
    /// * `legal_moves_in_prompt` - Legal moves listed before the final attempt
    pub fn new(endpoint: E, governor: Arc<RateGovernor>, legal_moves_in_prompt: usize) -> Self {
        Self {
            endpoint,
            governor,
            legal_moves_in_prompt,
        }
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Waits for the governor, then sends one prompt and returns the raw text.
    ///
    /// # Errors
    ///
    /// Returns [`MoveClientError::Quota`] if the daily budget is spent, or
    /// [`MoveClientError::Completion`] if the endpoint fails. Failures are
    /// never retried here.
    pub fn request_move(&self, request: &MoveRequest<'_>) -> Result<String, MoveClientError> {
        let admission = self.governor.admit()?;
        let usage = admission.usage;
        info!(
            player = %request.player.name,
            minute = usage.calls_this_minute,
            per_minute = usage.per_minute,
            today = usage.calls_today,
            per_day = usage.per_day,
            "requesting move"
        );

        let prompt = build_prompt(request, self.legal_moves_in_prompt);
        debug!(%prompt, "prompt");

        let text = self.endpoint.complete(&CompletionRequest {
            prompt,
            temperature: request.player.temperature,
            max_output_tokens: request.player.max_output_tokens,
        })?;
        debug!(response = %text, "raw response");
        Ok(text)
    }
}
