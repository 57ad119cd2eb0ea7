//! Board engine adapter.
//!
//! Every chess rule used by the trainer goes through [`Board`], which delegates
//! to `shakmaty`. The trainer itself never decides legality.

use serde::{Deserialize, Serialize};
use shakmaty::{
    fen::Fen, san::SanPlus, uci::UciMove, CastlingMode, Chess, Color, EnPassantMode, Move,
    Outcome, Position, Role, Square,
};

use crate::error::{Error, Result};

/// Side of the board, serialised the way line descriptors store it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "w")]
    White,
    #[serde(alias = "b")]
    Black,
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::White => f.write_str("white"),
            Side::Black => f.write_str("black"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "w" | "white" => Ok(Side::White),
            "b" | "black" => Ok(Side::Black),
            other => Err(Error::InvalidConfig(format!("unknown side '{}'", other))),
        }
    }
}

/// A move that was accepted by the board, in canonical and square form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayedMove {
    pub san: String,
    pub uci: String,
    pub from: Option<String>,
    pub to: String,
    pub mover: Side,
}

/// Render a position in its canonical serialisable form.
pub fn position_fen(pos: &Chess) -> String {
    Fen::from_setup(pos.clone().into_setup(EnPassantMode::Legal)).to_string()
}

/// From and to squares of `mv` as a player enters them. Castling goes king to
/// its destination square (`e1g1`), not onto the rook.
fn move_squares(mv: &Move) -> (Option<Square>, Square) {
    match mv.to_uci(CastlingMode::Standard) {
        UciMove::Normal { from, to, .. } => (Some(from), to),
        UciMove::Put { to, .. } => (None, to),
        UciMove::Null => (mv.from(), mv.to()),
    }
}

/// Resolve a SAN string against `pos` and play it, returning the canonical SAN.
///
/// The canonical rendering carries the correct check/mate suffix regardless of
/// what the input string claimed.
pub fn play_san(pos: &mut Chess, san: &str) -> Result<(Move, String)> {
    let parsed = SanPlus::from_ascii(san.as_bytes())
        .map_err(|_| Error::InvalidMoveToken(san.to_string()))?;
    let mv = parsed
        .san
        .to_move(pos)
        .map_err(|_| Error::IllegalMove(san.to_string()))?;
    let canonical = SanPlus::from_move_and_play_unchecked(pos, &mv);
    Ok((mv, canonical.to_string()))
}

/// Game board with history, standing in for the external board engine.
#[derive(Debug, Clone)]
pub struct Board {
    position: Chess,
    history: Vec<(Chess, PlayedMove)>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            position: Chess::default(),
            history: Vec::new(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self> {
        let fen: Fen = fen.parse()?;
        let position: Chess = fen.into_position(CastlingMode::Standard)?;
        Ok(Self {
            position,
            history: Vec::new(),
        })
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn fen(&self) -> String {
        position_fen(&self.position)
    }

    pub fn turn(&self) -> Side {
        self.position.turn().into()
    }

    pub fn history(&self) -> impl Iterator<Item = &PlayedMove> {
        self.history.iter().map(|(_, played)| played)
    }

    pub fn ply(&self) -> usize {
        self.history.len()
    }

    pub fn is_game_over(&self) -> bool {
        self.position.is_game_over()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.position.outcome()
    }

    /// Play a move given in SAN.
    pub fn play_san(&mut self, san: &str) -> Result<PlayedMove> {
        let mut next = self.position.clone();
        let (mv, canonical) = play_san(&mut next, san)?;
        Ok(self.commit(next, &mv, canonical))
    }

    /// Play a move given in UCI form (`e2e4`, `e7e8q`).
    pub fn play_uci(&mut self, uci: &str) -> Result<PlayedMove> {
        let parsed: UciMove = uci.parse()?;
        let mv = parsed
            .to_move(&self.position)
            .map_err(|_| Error::IllegalMove(uci.to_string()))?;
        let mut next = self.position.clone();
        let canonical = SanPlus::from_move_and_play_unchecked(&mut next, &mv).to_string();
        Ok(self.commit(next, &mv, canonical))
    }

    /// Play a move given as squares. Promotions need an explicit piece.
    pub fn play_squares(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Result<PlayedMove> {
        if promotion.is_none() && self.is_promotion(from, to) {
            return Err(Error::PromotionRequired {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let mv = UciMove::Normal {
            from,
            to,
            promotion,
        }
        .to_move(&self.position)
        .map_err(|_| Error::IllegalMove(format!("{}{}", from, to)))?;
        let mut next = self.position.clone();
        let canonical = SanPlus::from_move_and_play_unchecked(&mut next, &mv).to_string();
        Ok(self.commit(next, &mv, canonical))
    }

    /// Whether moving `from` → `to` is a legal pawn promotion that needs a piece.
    pub fn is_promotion(&self, from: Square, to: Square) -> bool {
        self.position
            .legal_moves()
            .iter()
            .any(|m| m.from() == Some(from) && m.to() == to && m.is_promotion())
    }

    /// Squares of a SAN move in the current position without playing it.
    pub fn squares_of(&self, san: &str) -> Option<(Option<Square>, Square)> {
        let parsed = SanPlus::from_ascii(san.as_bytes()).ok()?;
        let mv = parsed.san.to_move(&self.position).ok()?;
        Some(move_squares(&mv))
    }

    /// Take back the last move.
    pub fn undo(&mut self) -> Option<PlayedMove> {
        let (previous, played) = self.history.pop()?;
        self.position = previous;
        Some(played)
    }

    fn commit(&mut self, next: Chess, mv: &Move, san: String) -> PlayedMove {
        let (from, to) = move_squares(mv);
        let played = PlayedMove {
            san,
            uci: mv.to_uci(CastlingMode::Standard).to_string(),
            from: from.map(|sq| sq.to_string()),
            to: to.to_string(),
            mover: self.turn(),
        };
        let previous = std::mem::replace(&mut self.position, next);
        self.history.push((previous, played.clone()));
        played
    }

    /// Played moves as numbered movetext, e.g. `1. e4 e5 2. Nf3`.
    pub fn movetext(&self) -> String {
        let mut out = String::new();
        for (ply, (before, played)) in self.history.iter().enumerate() {
            let number = before.fullmoves();
            if before.turn() == Color::White {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&format!("{}. {}", number, played.san));
            } else if ply == 0 {
                out.push_str(&format!("{}... {}", number, played.san));
            } else {
                out.push(' ');
                out.push_str(&played.san);
            }
        }
        out
    }

    /// Link to the Lichess analysis board for the current position.
    pub fn analysis_url(&self) -> String {
        format!("https://lichess.org/analysis/{}", self.fen().replace(' ', "_"))
    }
}
