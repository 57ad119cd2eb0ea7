//! Chess opening repertoire trainer.
//!
//! Repertoire lines are written as movetext with nested variations, parsed
//! once into move trees and then walked move by move while the trainee plays.

pub mod app;
pub mod board;
pub mod chess;
pub mod config;
pub mod error;
pub mod lexer;
pub mod opening;
pub mod session;
pub mod store;
pub mod traversal;
pub mod tree;

pub use board::{Board, PlayedMove, Side};
pub use error::{Error, Result};
pub use opening::{Difficulty, LineDescriptor, LineKind, OpeningLine, RepertoireIndex};
pub use session::{GameStatus, Mode, MoveInput, OpponentRequest, SessionEvent, TrainingSession};
pub use tree::{parse_pgn_to_tree, MoveNode};
