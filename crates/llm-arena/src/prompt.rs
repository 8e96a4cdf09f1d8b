//! Prompt construction.

use crate::move_client::MoveRequest;
use std::fmt;

/// Closing line of every prompt.
pub const MOVE_CUE: &str = "Your move (UCI format only):";

/// Builds the prompt text for one completion request.
///
/// Lists the first `legal_limit` legal moves, or all of them when
/// `request.full_move_list` is set. A limit of zero leaves the list out until
/// the final attempt. Every rejected attempt of the current ply is echoed
/// back with its reason.
pub fn build_prompt(request: &MoveRequest<'_>, legal_limit: usize) -> String {
    Prompt {
        request,
        legal_limit,
    }
    .to_string()
}

struct Prompt<'r, 'a> {
    request: &'r MoveRequest<'a>,
    legal_limit: usize,
}

impl Prompt<'_, '_> {
    fn legal_list(&self) -> Option<String> {
        let legal = self.request.legal_moves;
        let shown = if self.request.full_move_list {
            legal.len()
        } else {
            self.legal_limit.min(legal.len())
        };
        if shown == 0 {
            return None;
        }
        let mut list = legal[..shown].join(", ");
        if shown < legal.len() {
            list.push_str(", ...");
        }
        Some(list)
    }
}

impl fmt::Display for Prompt<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request = self.request;
        let side = request.board.side_to_move();

        writeln!(f, "{}\n", request.player.system_prompt)?;
        writeln!(f, "Current chess position (FEN): {}\n", request.board.fen())?;
        writeln!(f, "Board (uppercase = white, lowercase = black):")?;
        writeln!(f, "{}\n", request.board.diagram())?;
        if request.board.is_check() {
            writeln!(f, "{side} is in check.")?;
        }
        match self.legal_list() {
            Some(list) => writeln!(f, "It's {side}'s turn. Legal moves: {list}\n")?,
            None => writeln!(f, "It's {side}'s turn.\n")?,
        }

        if !request.history.is_empty() {
            writeln!(f, "Your previous answers for this move were rejected:")?;
            for attempt in request.history {
                writeln!(f, "- Attempt {}: {}", attempt.index, attempt.reason())?;
            }
            if request.full_move_list {
                writeln!(
                    f,
                    "This is your last attempt. Pick exactly one move from the complete legal move list above."
                )?;
            } else {
                writeln!(f, "Reply with exactly one move from the legal move list.")?;
            }
            writeln!(f)?;
        }

        f.write_str(MOVE_CUE)
    }
}
