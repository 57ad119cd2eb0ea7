//! Types exchanged with the analysis engine client.

use derivative::Derivative;
use serde::{Deserialize, Serialize};

/// Search settings applied to every request.
#[derive(Deserialize, Serialize, Debug, Clone, Derivative, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[derivative(Default)]
pub struct EngineSettings {
    #[derivative(Default(value = "10"))]
    pub skill_level: u8,
    #[derivative(Default(value = "10"))]
    pub eval_depth: u32,
    #[derivative(Default(value = "15"))]
    pub move_depth: u32,
}

/// Position score, always from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Evaluation {
    Centipawns(i32),
    /// Mate in N moves; negative when Black mates.
    Mate(i32),
}

impl Evaluation {
    pub fn inverted(self) -> Self {
        match self {
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(-cp),
            Evaluation::Mate(n) => Evaluation::Mate(-n),
        }
    }
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Evaluation::Centipawns(cp) => write!(f, "{:+.2}", *cp as f64 / 100.0),
            Evaluation::Mate(n) => write!(f, "#{}", n),
        }
    }
}

/// Handle of one engine request. A newer token supersedes every older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Evaluate,
    BestMove,
}

/// Output of the engine attributed to the newest request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnalysisEvent {
    Evaluation {
        token: RequestToken,
        fen: String,
        depth: u32,
        evaluation: Evaluation,
    },
    BestMove {
        token: RequestToken,
        fen: String,
        uci: String,
    },
    /// The engine process went away.
    Stopped,
}
