use std::path::PathBuf;

use shakmaty::{fen::ParseFenError, uci::ParseUciMoveError, Chess, PositionError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    FenError(#[from] ParseFenError),

    #[error(transparent)]
    PositionError(#[from] Box<PositionError<Chess>>),

    #[error(transparent)]
    UciMoveError(#[from] ParseUciMoveError),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Invalid move token '{0}'")]
    InvalidMoveToken(String),

    #[error("Unbalanced variation brackets")]
    UnbalancedVariation,

    #[error("Variation opened before any move")]
    OrphanVariation,

    #[error("Variations nested deeper than {0} levels")]
    VariationTooDeep(usize),

    #[error("Movetext does not contain any playable move")]
    InvalidMovetext,

    #[error("No opening line with id '{0}'")]
    NoOpeningFound(String),

    #[error("Opening line '{0}' is built in and cannot be removed")]
    BuiltinLine(String),

    #[error("It is not the trainee's turn")]
    NotYourTurn,

    #[error("The game is already finished")]
    GameFinished,

    #[error("Move {from}{to} needs a promotion piece")]
    PromotionRequired { from: String, to: String },

    #[error("No moves to take back")]
    NothingToUndo,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Engine not found at {0}")]
    EngineNotFound(PathBuf),

    #[error("Engine failed to initialize: {0}")]
    EngineInitFailed(String),

    #[error("Engine timed out: {0}")]
    EngineTimeout(String),

    #[error("No stdin")]
    NoStdin,

    #[error("No stdout")]
    NoStdout,
}

impl From<PositionError<Chess>> for Error {
    fn from(e: PositionError<Chess>) -> Self {
        Error::PositionError(Box::new(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
