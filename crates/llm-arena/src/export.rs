//! Board image export after each ply.
//!
//! The game runner calls a [`BoardExporter`] with the position after every
//! applied move. Export failures are logged by the caller and never stop a
//! game.

use askama::Template;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SQUARE: usize = 45;
const MARGIN: usize = 20;
const LIGHT: &str = "#f0d9b5";
const DARK: &str = "#b58863";

/// Errors that can occur while exporting a board.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write board image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to render board image: {0}")]
    Render(#[from] askama::Error),
}

/// Receives the position after each applied move.
pub trait BoardExporter {
    /// Exports the position `fen` reached after ply `ply` (1-based).
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`] if the export could not be written.
    fn export(&mut self, fen: &str, ply: u32) -> Result<(), ExportError>;
}

/// A square of the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquareView {
    pub x: usize,
    pub y: usize,
    pub fill: &'static str,
}

/// A piece to render on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceView {
    /// Center of the square.
    pub x: usize,
    pub y: usize,
    /// Unicode chess piece symbol.
    pub symbol: char,
}

/// A file or rank coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelView {
    pub x: usize,
    pub y: usize,
    pub text: char,
}

/// SVG chess board template.
#[derive(Template)]
#[template(path = "board.svg")]
pub struct BoardSvg {
    pub title: String,
    pub size: usize,
    pub square_size: usize,
    pub piece_size: usize,
    pub squares: Vec<SquareView>,
    pub labels: Vec<LabelView>,
    pub pieces: Vec<PieceView>,
}

impl BoardSvg {
    /// Lays out the position from the piece placement field of `fen`.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_arena::export::BoardSvg;
    ///
    /// let board = BoardSvg::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", "Start");
    /// assert_eq!(board.pieces.len(), 32);
    /// assert_eq!(board.squares.len(), 64);
    /// ```
    pub fn from_fen(fen: &str, title: impl Into<String>) -> Self {
        let placement = fen.split_whitespace().next().unwrap_or("");
        let mut pieces = Vec::new();

        for (row, rank) in placement.split('/').take(8).enumerate() {
            let mut col = 0;
            for c in rank.chars() {
                if let Some(skip) = c.to_digit(10) {
                    col += skip as usize;
                    continue;
                }
                if let Some(symbol) = piece_symbol(c) {
                    if col < 8 {
                        pieces.push(PieceView {
                            x: MARGIN + col * SQUARE + SQUARE / 2,
                            y: MARGIN + row * SQUARE + SQUARE / 2,
                            symbol,
                        });
                    }
                }
                col += 1;
            }
        }

        let squares = (0..8)
            .flat_map(|row| (0..8).map(move |col| (row, col)))
            .map(|(row, col)| SquareView {
                x: MARGIN + col * SQUARE,
                y: MARGIN + row * SQUARE,
                fill: if (row + col) % 2 == 0 { LIGHT } else { DARK },
            })
            .collect();

        let files = ('a'..='h').enumerate().map(|(col, text)| LabelView {
            x: MARGIN + col * SQUARE + SQUARE / 2 - 3,
            y: MARGIN + 8 * SQUARE + 14,
            text,
        });
        let ranks = ('1'..='8').rev().enumerate().map(|(row, text)| LabelView {
            x: 6,
            y: MARGIN + row * SQUARE + SQUARE / 2 + 4,
            text,
        });

        Self {
            title: title.into(),
            size: 8 * SQUARE + 2 * MARGIN,
            square_size: SQUARE,
            piece_size: SQUARE * 4 / 5,
            squares,
            labels: files.chain(ranks).collect(),
            pieces,
        }
    }
}

const fn piece_symbol(piece: char) -> Option<char> {
    match piece {
        'K' => Some('\u{2654}'),
        'Q' => Some('\u{2655}'),
        'R' => Some('\u{2656}'),
        'B' => Some('\u{2657}'),
        'N' => Some('\u{2658}'),
        'P' => Some('\u{2659}'),
        'k' => Some('\u{265A}'),
        'q' => Some('\u{265B}'),
        'r' => Some('\u{265C}'),
        'b' => Some('\u{265D}'),
        'n' => Some('\u{265E}'),
        'p' => Some('\u{265F}'),
        _ => None,
    }
}

/// Writes `move_{ply}.svg` files into a directory.
#[derive(Debug, Clone)]
pub struct SvgExporter {
    dir: PathBuf,
}

impl SvgExporter {
    /// Creates an exporter. The directory is created on first export.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the image for `ply`.
    pub fn path_for(&self, ply: u32) -> PathBuf {
        self.dir.join(format!("move_{ply}.svg"))
    }
}

impl BoardExporter for SvgExporter {
    fn export(&mut self, fen: &str, ply: u32) -> Result<(), ExportError> {
        fs::create_dir_all(&self.dir)?;
        let svg = BoardSvg::from_fen(fen, format!("Ply {ply}: {fen}")).render()?;
        fs::write(self.path_for(ply), svg)?;
        Ok(())
    }
}
