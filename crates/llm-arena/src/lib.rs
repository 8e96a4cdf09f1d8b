//! LLM Arena - chess matches between two language-model players.
//!
//! Each side's move comes from a text-completion call. Replies are parsed for
//! a coordinate move, checked against the legal moves of the position and
//! retried with feedback when they do not fit. Calls are paced by a
//! [`rate_governor::RateGovernor`] so per-minute and per-day API budgets
//! hold.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration and command-line overrides
//! - [`board`] - Chess rules adapter (FEN, legal moves, terminal states)
//! - [`completion`] - Completion endpoint trait and the Gemini HTTP client
//! - [`prompt`] - Prompt text and retry feedback
//! - [`move_client`] - One rate-governed request for a move
//! - [`resolver`] - Parse, validate and retry until a move is legal
//! - [`game_runner`] - Game loop and termination
//! - [`export`] - Per-move SVG board images
//! - [`pgn`] - PGN file generation
//! - [`json_output`] - JSON file generation

pub mod board;
pub mod completion;
pub mod config;
pub mod export;
pub mod game_runner;
pub mod json_output;
pub mod move_client;
pub mod pgn;
pub mod prompt;
pub mod resolver;
