//! Terminal front-end for a training session.
//!
//! Reads commands and moves from stdin, plays book moves after the configured
//! delay and relays engine moves and scores, all on one task.

use log::{debug, info, warn};
use shakmaty::uci::UciMove;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::board::Side;
use crate::chess::{AnalysisClient, AnalysisEvent, RequestToken};
use crate::config::TrainerConfig;
use crate::error::{Error, Result};
use crate::session::{
    GameStatus, Mode, MoveInput, OpponentRequest, SessionEvent, Ticket, TrainingSession,
};

const HELP: &str = "\
Moves: SAN (Nf3, exd5, O-O) or squares (g1f3, e7e8q)
  hint      known continuations
  undo      take back your last move
  reset     start over
  continue  keep playing against the engine after the line ends
  moves     movetext and analysis link of the game so far
  fen       current position
  quit      leave";

enum Input {
    Line(Option<String>),
    BookDue,
    Engine(Option<AnalysisEvent>),
}

struct BookMove {
    ticket: Ticket,
    san: String,
    due: Instant,
}

struct Trainer {
    session: TrainingSession,
    config: TrainerConfig,
    engine: Option<AnalysisClient>,
    book: Option<BookMove>,
    engine_move: Option<(RequestToken, Ticket)>,
    evaluated_fen: Option<String>,
    warned_no_engine: bool,
}

/// Run `session` interactively until stdin closes or the trainee quits.
pub async fn run(session: TrainingSession, config: TrainerConfig) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = match &config.engine_path {
        Some(path) => match AnalysisClient::spawn(path, config.engine_settings(), tx).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Analysis engine unavailable: {}", e);
                println!("Engine unavailable ({}), continuing without analysis.", e);
                None
            }
        },
        None => None,
    };

    let mut trainer = Trainer {
        session,
        config,
        engine,
        book: None,
        engine_move: None,
        evaluated_fen: None,
        warned_no_engine: false,
    };
    println!(
        "{} ({:?}, playing {})",
        trainer.session.title(),
        trainer.session.mode(),
        trainer.session.side()
    );
    println!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        trainer.render_events();
        trainer.schedule().await?;
        trainer.prompt();

        let book_due = trainer.book.as_ref().map(|b| b.due);
        let wake = book_due.unwrap_or_else(Instant::now);
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            _ = tokio::time::sleep_until(wake), if book_due.is_some() => Input::BookDue,
            event = rx.recv(), if trainer.engine.is_some() => Input::Engine(event),
        };

        match input {
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                if !trainer.command(line.trim()).await? {
                    break;
                }
            }
            Input::BookDue => trainer.play_book_move(),
            Input::Engine(Some(event)) => trainer.engine_event(event),
            Input::Engine(None) => {
                warn!("Engine channel closed");
                trainer.engine = None;
            }
        }
        trainer.sync_pending().await;
    }

    if let Some(engine) = trainer.engine.take() {
        engine.shutdown().await?;
    }
    Ok(())
}

impl Trainer {
    /// Handle one line of input. Returns `false` to quit.
    async fn command(&mut self, line: &str) -> Result<bool> {
        match line {
            "" => {}
            "quit" | "q" | "exit" => return Ok(false),
            "help" | "?" => println!("{}", HELP),
            "hint" | "h" => self.print_hints(true),
            "undo" | "u" => {
                if let Err(e) = self.session.undo() {
                    println!("{}", e);
                }
            }
            "reset" | "r" => {
                self.session.reset();
                println!("Starting over.");
            }
            "continue" | "c" => match self.session.continue_in_explorer() {
                Ok(()) => println!("Continuing against the engine."),
                Err(e) => println!("{}", e),
            },
            "moves" | "pgn" => {
                println!("{}", self.session.movetext());
                println!("{}", self.session.analysis_url());
            }
            "fen" => println!("{}", self.session.board().fen()),
            mv => self.trainee_move(mv),
        }
        Ok(true)
    }

    fn trainee_move(&mut self, text: &str) {
        match self.session.play(parse_move_input(text)) {
            Ok(played) => debug!("Trainee played {}", played.san),
            Err(Error::PromotionRequired { from, to }) => {
                println!("Promotion needs a piece, e.g. {}{}q", from, to)
            }
            Err(e) => println!("{}", e),
        }
    }

    /// Ask the session for an opponent move when nothing is pending.
    async fn schedule(&mut self) -> Result<()> {
        if self.book.is_none() && self.engine_move.is_none() {
            match self.session.next_opponent_move() {
                Some(OpponentRequest::Book { ticket, san }) => {
                    self.book = Some(BookMove {
                        ticket,
                        san,
                        due: Instant::now() + self.config.move_delay(),
                    });
                }
                Some(OpponentRequest::Engine { ticket, fen }) => match self.engine.as_mut() {
                    Some(engine) => {
                        let token = engine.best_move(&fen).await?;
                        self.engine_move = Some((token, ticket));
                        self.evaluated_fen = Some(fen);
                    }
                    None => {
                        if !self.warned_no_engine {
                            println!("No engine configured; the opponent's move stays pending.");
                            self.warned_no_engine = true;
                        }
                    }
                },
                None => {}
            }
        }

        let fen = self.session.board().fen();
        if self.engine_move.is_none() && self.evaluated_fen.as_deref() != Some(fen.as_str()) {
            if let Some(engine) = self.engine.as_mut() {
                engine.evaluate(&fen).await?;
                self.evaluated_fen = Some(fen);
            }
        }
        Ok(())
    }

    /// Drop local bookkeeping for requests the session no longer waits on.
    async fn sync_pending(&mut self) {
        let pending = self.session.pending();
        if self.book.as_ref().map_or(false, |b| Some(b.ticket) != pending) {
            debug!("Dropping deferred book move");
            self.book = None;
        }
        if self.engine_move.map_or(false, |(_, t)| Some(t) != pending) {
            self.engine_move = None;
            if let Some(engine) = self.engine.as_mut() {
                if let Err(e) = engine.cancel().await {
                    warn!("Failed to stop engine search: {}", e);
                }
            }
            self.evaluated_fen = None;
        }
    }

    fn play_book_move(&mut self) {
        let Some(book) = self.book.take() else {
            return;
        };
        if let Err(e) = self.session.resolve_book_move(book.ticket, &book.san) {
            warn!("Book move {} rejected: {}", book.san, e);
        }
    }

    fn engine_event(&mut self, event: AnalysisEvent) {
        match event {
            AnalysisEvent::BestMove { token, uci, .. } => match self.engine_move {
                Some((expected, ticket)) if expected == token => {
                    self.engine_move = None;
                    if let Err(e) = self.session.resolve_engine_move(ticket, &uci) {
                        warn!("Engine move {} rejected: {}", uci, e);
                    }
                }
                _ => debug!("Ignoring stale engine move {}", uci),
            },
            AnalysisEvent::Evaluation {
                fen,
                depth,
                evaluation,
                ..
            } => {
                if fen == self.session.board().fen() && depth == self.config.eval_depth {
                    println!("Evaluation: {} (depth {})", evaluation, depth);
                }
            }
            AnalysisEvent::Stopped => {
                warn!("Analysis engine stopped");
                println!("The engine stopped; analysis is no longer available.");
                self.engine = None;
                self.engine_move = None;
            }
        }
    }

    fn render_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                SessionEvent::MovePlayed(played) => {
                    let who = if played.mover == self.session.side() {
                        "You"
                    } else {
                        "Opponent"
                    };
                    println!("{} played {}", who, played.san);
                }
                SessionEvent::TargetSwitched { name } => {
                    info!("Hidden target is now {}", name);
                    println!("The hidden opening has changed.");
                }
                SessionEvent::Completed { message, .. } => {
                    println!("{}", message);
                    println!("'continue' to play on against the engine, 'reset' to start over.");
                }
                SessionEvent::PositionChanged { fen } => debug!("Position: {}", fen),
            }
        }
    }

    fn print_hints(&self, asked: bool) {
        let hints = self.session.hints();
        if hints.is_empty() {
            if asked {
                println!("No known continuation here.");
            }
            return;
        }
        let moves: Vec<String> = hints
            .iter()
            .map(|h| match &h.comment {
                Some(comment) => format!("{} ({})", h.san, comment),
                None => h.san.clone(),
            })
            .collect();
        println!("Book: {}", moves.join(", "));
    }

    fn prompt(&self) {
        let status = self.session.status();
        if status.is_finished() || self.book.is_some() || self.engine_move.is_some() {
            return;
        }
        let free_play = self.session.mode() == Mode::Explorer && status == GameStatus::OutOfBook;
        if !self.session.is_trainee_turn() && !free_play {
            return;
        }
        if self.config.show_hints {
            self.print_hints(false);
        }
        let to_move = match self.session.board().turn() {
            Side::White => "White",
            Side::Black => "Black",
        };
        let remaining = self
            .session
            .candidates_remaining()
            .map(|n| format!(", {} candidate lines", n))
            .unwrap_or_default();
        println!("[{} to move{}]", to_move, remaining);
    }
}

/// `e2e4` / `e7e8q` become square moves; everything else is taken as SAN.
fn parse_move_input(text: &str) -> MoveInput {
    if let Ok(UciMove::Normal {
        from,
        to,
        promotion,
    }) = UciMove::from_ascii(text.as_bytes())
    {
        return MoveInput::Squares {
            from,
            to,
            promotion,
        };
    }
    MoveInput::San(text.to_string())
}
