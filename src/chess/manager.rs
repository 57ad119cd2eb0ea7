//! Analysis engine client.
//!
//! [`AnalysisClient`] owns one engine process and a background reader task.
//! Every request returns a [`RequestToken`]; issuing a new one stops the search
//! in progress, and the reader only attributes output to the newest search.
//! The UCI protocol answers every `go` with exactly one `bestmove`, so output
//! is matched to searches by counting `bestmove` lines still owed to searches
//! that were superseded.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use shakmaty::Color;
use tokio::sync::{mpsc, Mutex};

use crate::board::Board;
use crate::error::Error;

use super::process::{parse_best_move, parse_evaluation, EngineProcess, EngineReader};
use super::types::{AnalysisEvent, EngineSettings, RequestKind, RequestToken};

#[derive(Debug, Clone)]
struct ActiveSearch {
    token: RequestToken,
    kind: RequestKind,
    fen: String,
    turn: Color,
}

/// Attributes engine output to the newest search.
#[derive(Debug, Default)]
struct SearchRouter {
    current: Option<ActiveSearch>,
    searching: bool,
    /// `bestmove` lines still expected from stopped searches.
    superseded: usize,
}

impl SearchRouter {
    fn begin(&mut self, search: ActiveSearch) {
        self.current = Some(search);
        self.searching = true;
    }

    /// Forget the current search. Returns whether a `stop` must be sent.
    fn supersede(&mut self) -> bool {
        self.current = None;
        if self.searching {
            self.searching = false;
            self.superseded += 1;
            true
        } else {
            false
        }
    }

    fn route(&mut self, line: &str) -> Option<AnalysisEvent> {
        if let Some(uci) = parse_best_move(line) {
            if self.superseded > 0 {
                self.superseded -= 1;
                debug!("Dropping stale bestmove {}", uci);
                return None;
            }
            self.searching = false;
            let search = self.current.take()?;
            return match search.kind {
                RequestKind::BestMove => Some(AnalysisEvent::BestMove {
                    token: search.token,
                    fen: search.fen,
                    uci,
                }),
                RequestKind::Evaluate => None,
            };
        }

        if self.superseded > 0 {
            return None;
        }
        let search = self.current.as_ref()?;
        let (depth, evaluation) = parse_evaluation(line, search.turn)?;
        Some(AnalysisEvent::Evaluation {
            token: search.token,
            fen: search.fen.clone(),
            depth,
            evaluation,
        })
    }
}

struct EngineSlot {
    process: EngineProcess,
    router: SearchRouter,
}

/// Handle to a running analysis engine.
pub struct AnalysisClient {
    slot: Arc<Mutex<EngineSlot>>,
    settings: EngineSettings,
    next_token: u64,
}

impl AnalysisClient {
    /// Start the engine at `path` and forward its output to `events`.
    pub async fn spawn(
        path: &Path,
        settings: EngineSettings,
        events: mpsc::UnboundedSender<AnalysisEvent>,
    ) -> Result<Self, Error> {
        let (mut process, reader) = EngineProcess::new(path).await?;
        process
            .set_option("Skill Level", settings.skill_level.min(20))
            .await?;

        let slot = Arc::new(Mutex::new(EngineSlot {
            process,
            router: SearchRouter::default(),
        }));
        tokio::spawn(read_engine_output(reader, slot.clone(), events));
        info!("Analysis engine ready: {:?}", path);

        Ok(Self {
            slot,
            settings,
            next_token: 0,
        })
    }

    /// Evaluate a position. Scores arrive as [`AnalysisEvent::Evaluation`].
    pub async fn evaluate(&mut self, fen: &str) -> Result<RequestToken, Error> {
        let depth = self.settings.eval_depth;
        self.request(RequestKind::Evaluate, fen, depth).await
    }

    /// Ask for a move. The answer arrives as [`AnalysisEvent::BestMove`];
    /// scores seen during the search are reported as well.
    pub async fn best_move(&mut self, fen: &str) -> Result<RequestToken, Error> {
        let depth = self.settings.move_depth;
        self.request(RequestKind::BestMove, fen, depth).await
    }

    /// Stop whatever the engine is doing; its output is dropped.
    pub async fn cancel(&mut self) -> Result<(), Error> {
        let mut slot = self.slot.lock().await;
        supersede(&mut slot).await
    }

    pub async fn shutdown(self) -> Result<(), Error> {
        let mut slot = self.slot.lock().await;
        slot.router.supersede();
        slot.process.kill().await
    }

    async fn request(
        &mut self,
        kind: RequestKind,
        fen: &str,
        depth: u32,
    ) -> Result<RequestToken, Error> {
        let turn = Color::from(Board::from_fen(fen)?.turn());
        self.next_token += 1;
        let token = RequestToken(self.next_token);

        let mut slot = self.slot.lock().await;
        supersede(&mut slot).await?;
        slot.process.set_position(fen).await?;
        slot.process.go(depth).await?;
        slot.router.begin(ActiveSearch {
            token,
            kind,
            fen: fen.to_string(),
            turn,
        });
        debug!("Engine request {:?} ({:?})", token, kind);
        Ok(token)
    }
}

async fn supersede(slot: &mut EngineSlot) -> Result<(), Error> {
    if slot.router.supersede() {
        slot.process.stop().await?;
    }
    Ok(())
}

async fn read_engine_output(
    mut reader: EngineReader,
    slot: Arc<Mutex<EngineSlot>>,
    events: mpsc::UnboundedSender<AnalysisEvent>,
) {
    info!("Engine reader started");
    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading from engine stdout: {}", e);
                break;
            }
        };
        debug!("[engine-stdout] {}", line);
        let event = slot.lock().await.router.route(&line);
        if let Some(event) = event {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    info!("Engine reader finished");
    let _ = events.send(AnalysisEvent::Stopped);
}
