//! A training game: board, traversal state and the opponent's pending move.
//!
//! The session is driven by discrete events. The caller asks for the next
//! opponent move with [`TrainingSession::next_opponent_move`], waits however
//! long it likes (presentation delay, engine search) and hands the answer back
//! with the [`Ticket`] it was given. Only one opponent move can be pending;
//! resets and take-backs invalidate outstanding tickets so late answers are
//! dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info};
use rand::rngs::StdRng;
use serde::Serialize;
use shakmaty::{Outcome, Role, Square};

use crate::board::{Board, PlayedMove, Side};
use crate::error::{Error, Result};
use crate::opening::OpeningLine;
use crate::traversal::{CandidateOutcome, CandidateState, LineStatus, Policy, TraversalState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Follow one line; any deviation loses.
    Trainer,
    /// Follow one line; leaving it hands the opponent to the engine.
    Explorer,
    /// Follow a hidden line picked among every line for the trainee's side.
    Blind,
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trainer" => Ok(Mode::Trainer),
            "explorer" => Ok(Mode::Explorer),
            "blind" => Ok(Mode::Blind),
            other => Err(Error::InvalidConfig(format!("unknown mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    Playing,
    OutOfBook,
    Won,
    Lost,
    Drawn,
}

impl GameStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, GameStatus::Won | GameStatus::Lost | GameStatus::Drawn)
    }
}

/// Identifies one opponent-move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    epoch: u64,
    seq: u64,
}

/// What the caller must produce for the opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpponentRequest {
    /// Play this known move, after any presentation delay.
    Book { ticket: Ticket, san: String },
    /// Ask the analysis engine for a move in this position.
    Engine { ticket: Ticket, fen: String },
}

impl OpponentRequest {
    pub fn ticket(&self) -> Ticket {
        match self {
            OpponentRequest::Book { ticket, .. } | OpponentRequest::Engine { ticket, .. } => {
                *ticket
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    MovePlayed(PlayedMove),
    TargetSwitched { name: String },
    Completed { success: bool, message: String },
    PositionChanged { fen: String },
}

/// A trainee move as entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveInput {
    San(String),
    Squares {
        from: Square,
        to: Square,
        promotion: Option<Role>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hint {
    pub san: String,
    pub from: Option<String>,
    pub to: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
enum Tracker {
    Single(TraversalState),
    Candidates(CandidateState),
}

#[derive(Debug)]
pub struct TrainingSession {
    mode: Mode,
    initial_mode: Mode,
    side: Side,
    title: String,
    board: Board,
    tracker: Tracker,
    status: GameStatus,
    epoch: u64,
    seq: u64,
    pending: Option<Ticket>,
    events: VecDeque<SessionEvent>,
    rng: StdRng,
}

impl TrainingSession {
    /// Session over one line, in trainer or explorer mode.
    pub fn single(line: Arc<OpeningLine>, mode: Mode, rng: StdRng) -> Self {
        let mode = if mode == Mode::Blind {
            Mode::Trainer
        } else {
            mode
        };
        info!("Starting {:?} session on {}", mode, line.name);
        Self::build(
            mode,
            line.side,
            line.name.clone(),
            Tracker::Single(TraversalState::new(line)),
            rng,
        )
    }

    /// Blind session over `lines`, all played from `side`.
    pub fn blind(lines: Vec<Arc<OpeningLine>>, side: Side, mut rng: StdRng) -> Self {
        let lines: Vec<_> = lines.into_iter().filter(|l| l.side == side).collect();
        info!("Starting blind session over {} lines as {}", lines.len(), side);
        let candidates = CandidateState::new(lines, &mut rng);
        Self::build(
            Mode::Blind,
            side,
            "Blind training".to_string(),
            Tracker::Candidates(candidates),
            rng,
        )
    }

    fn build(mode: Mode, side: Side, title: String, tracker: Tracker, rng: StdRng) -> Self {
        let board = Board::new();
        let mut events = VecDeque::new();
        events.push_back(SessionEvent::PositionChanged { fen: board.fen() });
        Self {
            mode,
            initial_mode: mode,
            side,
            title,
            board,
            tracker,
            status: GameStatus::Playing,
            epoch: 0,
            seq: 0,
            pending: None,
            events,
            rng,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn pending(&self) -> Option<Ticket> {
        self.pending
    }

    pub fn is_trainee_turn(&self) -> bool {
        self.board.turn() == self.side
    }

    /// Name of the line currently being followed. Hidden in blind mode until
    /// the game is over.
    pub fn target_name(&self) -> Option<&str> {
        match &self.tracker {
            Tracker::Single(state) => Some(state.line().name.as_str()),
            Tracker::Candidates(state) => state.target().map(|t| t.line().name.as_str()),
        }
    }

    pub fn candidates_remaining(&self) -> Option<usize> {
        match &self.tracker {
            Tracker::Single(_) => None,
            Tracker::Candidates(state) => Some(state.candidates().len()),
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Apply a trainee move.
    pub fn play(&mut self, input: MoveInput) -> Result<PlayedMove> {
        if self.status.is_finished() {
            return Err(Error::GameFinished);
        }
        let free_play = self.mode == Mode::Explorer && self.status == GameStatus::OutOfBook;
        if !free_play && !self.is_trainee_turn() {
            return Err(Error::NotYourTurn);
        }

        let played = match input {
            MoveInput::San(san) => self.board.play_san(&san)?,
            MoveInput::Squares {
                from,
                to,
                promotion,
            } => self.board.play_squares(from, to, promotion)?,
        };
        // A move from the trainee supersedes anything the opponent was about to do.
        self.cancel_pending();
        self.after_move(&played);
        Ok(played)
    }

    /// Next opponent move, or `None` when nothing should be requested right
    /// now (trainee to move, game over, or a request already pending).
    pub fn next_opponent_move(&mut self) -> Option<OpponentRequest> {
        if self.pending.is_some() || self.status.is_finished() || self.board.is_game_over() {
            return None;
        }
        if self.is_trainee_turn() {
            return None;
        }

        if self.status == GameStatus::Playing {
            let choice = match &self.tracker {
                Tracker::Single(state) => state.choose_continuation(&mut self.rng),
                Tracker::Candidates(state) => state.choose_continuation(&mut self.rng),
            }
            .map(|node| node.san.clone());

            if let Some(san) = choice {
                let ticket = self.issue_ticket();
                debug!("Book move {} requested", san);
                return Some(OpponentRequest::Book { ticket, san });
            }

            if self.mode == Mode::Explorer {
                info!("Book exhausted, handing over to the engine");
                self.leave_book();
            } else {
                let message = self.success_message();
                self.finish(GameStatus::Won, message);
                return None;
            }
        }

        let ticket = self.issue_ticket();
        Some(OpponentRequest::Engine {
            ticket,
            fen: self.board.fen(),
        })
    }

    /// Apply a book move chosen earlier. Stale tickets are ignored.
    pub fn resolve_book_move(&mut self, ticket: Ticket, san: &str) -> Result<Option<PlayedMove>> {
        if !self.take_ticket(ticket) {
            return Ok(None);
        }
        let played = self.board.play_san(san)?;
        self.after_move(&played);
        Ok(Some(played))
    }

    /// Apply the engine's move (UCI form). Stale tickets are ignored.
    pub fn resolve_engine_move(&mut self, ticket: Ticket, uci: &str) -> Result<Option<PlayedMove>> {
        if !self.take_ticket(ticket) {
            return Ok(None);
        }
        let played = self.board.play_uci(uci)?;
        self.after_move(&played);
        Ok(Some(played))
    }

    /// Drop the pending opponent move, if any.
    pub fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            debug!("Cancelled pending opponent move");
        }
        self.epoch += 1;
    }

    /// Back to the starting position with a fresh traversal.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.mode = self.initial_mode;
        self.board = Board::new();
        self.status = GameStatus::Playing;
        match &mut self.tracker {
            Tracker::Single(state) => state.reset(),
            Tracker::Candidates(state) => state.reset(&mut self.rng),
        }
        self.events.clear();
        self.events.push_back(SessionEvent::PositionChanged {
            fen: self.board.fen(),
        });
    }

    /// Take back the trainee's last move, and the opponent's reply if it was
    /// already played, then resynchronise the tree pointer.
    pub fn undo(&mut self) -> Result<()> {
        if self.board.ply() == 0 {
            return Err(Error::NothingToUndo);
        }
        self.cancel_pending();
        while self.board.undo().is_some() {
            if self.is_trainee_turn() || self.board.ply() == 0 {
                break;
            }
        }
        self.resync();
        self.events.push_back(SessionEvent::PositionChanged {
            fen: self.board.fen(),
        });
        Ok(())
    }

    /// Keep playing against the engine after a finished line.
    pub fn continue_in_explorer(&mut self) -> Result<()> {
        if self.board.is_game_over() {
            return Err(Error::GameFinished);
        }
        self.cancel_pending();
        self.mode = Mode::Explorer;
        self.leave_book();
        Ok(())
    }

    /// Known continuations for the trainee at the current pointer.
    pub fn hints(&self) -> Vec<Hint> {
        if self.status != GameStatus::Playing || !self.is_trainee_turn() {
            return Vec::new();
        }
        let nodes = match &self.tracker {
            Tracker::Single(state) => state.continuations(),
            Tracker::Candidates(state) => state.target().map_or(&[][..], |t| t.continuations()),
        };
        nodes
            .iter()
            .filter_map(|node| {
                let (from, to) = self.board.squares_of(&node.san)?;
                Some(Hint {
                    san: node.san.clone(),
                    from: from.map(|sq| sq.to_string()),
                    to: to.to_string(),
                    comment: node.comment.clone(),
                })
            })
            .collect()
    }

    pub fn movetext(&self) -> String {
        self.board.movetext()
    }

    pub fn analysis_url(&self) -> String {
        self.board.analysis_url()
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.seq += 1;
        let ticket = Ticket {
            epoch: self.epoch,
            seq: self.seq,
        };
        self.pending = Some(ticket);
        ticket
    }

    fn take_ticket(&mut self, ticket: Ticket) -> bool {
        if self.pending != Some(ticket) {
            debug!("Discarding stale opponent move {:?}", ticket);
            return false;
        }
        self.pending = None;
        true
    }

    fn after_move(&mut self, played: &PlayedMove) {
        self.events.push_back(SessionEvent::MovePlayed(played.clone()));
        self.track(&played.san);
        if !self.status.is_finished() {
            if let Some(outcome) = self.board.outcome() {
                self.finish_by_outcome(outcome);
            }
        }
    }

    fn track(&mut self, san: &str) {
        if self.status != GameStatus::Playing {
            return;
        }
        match &mut self.tracker {
            Tracker::Single(state) => {
                let policy = match self.mode {
                    Mode::Explorer => Policy::Permissive,
                    _ => Policy::Strict,
                };
                match state.advance(san, policy) {
                    LineStatus::InBook => {}
                    LineStatus::OutOfBook => self.status = GameStatus::OutOfBook,
                    LineStatus::LineComplete if self.mode == Mode::Explorer => {
                        info!("End of {}, handing over to the engine", state.line().name);
                        self.leave_book();
                    }
                    LineStatus::LineComplete => {
                        let message = self.success_message();
                        self.finish(GameStatus::Won, message);
                    }
                    LineStatus::Deviated => {
                        let message = format!("You deviated from the {} line!", state.line().name);
                        self.finish(GameStatus::Lost, message);
                    }
                }
            }
            Tracker::Candidates(state) => match state.advance(san, &mut self.rng) {
                CandidateOutcome::Deviated => {
                    self.finish(
                        GameStatus::Lost,
                        "You deviated from all known openings!".to_string(),
                    );
                }
                CandidateOutcome::Narrowed {
                    switched_to,
                    target_complete,
                    ..
                } => {
                    if let Some(name) = switched_to {
                        self.events.push_back(SessionEvent::TargetSwitched { name });
                    }
                    if target_complete {
                        let message = self.success_message();
                        self.finish(GameStatus::Won, message);
                    }
                }
            },
        }
    }

    fn resync(&mut self) {
        let history: Vec<String> = self.board.history().map(|m| m.san.clone()).collect();
        let sans = history.iter().map(String::as_str);
        self.status = match &mut self.tracker {
            Tracker::Candidates(_) if self.mode == Mode::Explorer => GameStatus::OutOfBook,
            Tracker::Single(state) => {
                let policy = match self.mode {
                    Mode::Explorer => Policy::Permissive,
                    _ => Policy::Strict,
                };
                match state.replay(sans, policy) {
                    LineStatus::InBook => GameStatus::Playing,
                    LineStatus::OutOfBook => GameStatus::OutOfBook,
                    LineStatus::LineComplete if self.mode == Mode::Explorer => {
                        state.leave_book();
                        GameStatus::OutOfBook
                    }
                    LineStatus::LineComplete => GameStatus::Won,
                    LineStatus::Deviated => GameStatus::Lost,
                }
            }
            Tracker::Candidates(state) => match state.replay(sans, &mut self.rng) {
                Some(CandidateOutcome::Deviated) => GameStatus::Lost,
                Some(CandidateOutcome::Narrowed {
                    target_complete: true,
                    ..
                }) => GameStatus::Won,
                _ => GameStatus::Playing,
            },
        };
        debug!("Resynchronised after take-back: {:?}", self.status);
    }

    fn leave_book(&mut self) {
        if let Tracker::Single(state) = &mut self.tracker {
            state.leave_book();
        }
        self.status = GameStatus::OutOfBook;
    }

    fn success_message(&self) -> String {
        let name = self.target_name().unwrap_or("opening");
        match self.mode {
            Mode::Blind => format!("Victory! You completed the hidden opening: {}", name),
            _ => format!("You successfully navigated the {}!", name),
        }
    }

    fn finish_by_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Decisive { winner } if Side::from(winner) == self.side => {
                self.finish(GameStatus::Won, "Checkmate, you win!".to_string())
            }
            Outcome::Decisive { .. } => {
                self.finish(GameStatus::Lost, "Checkmate, you lose.".to_string())
            }
            Outcome::Draw => self.finish(GameStatus::Drawn, "Draw.".to_string()),
        }
    }

    fn finish(&mut self, status: GameStatus, message: String) {
        info!("{} ({:?})", message, status);
        self.status = status;
        self.cancel_pending();
        self.events.push_back(SessionEvent::Completed {
            success: status == GameStatus::Won,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opening::{Difficulty, LineDescriptor, LineKind};
    use rand::SeedableRng;

    fn line(id: &str, side: Side, movetext: &str) -> Arc<OpeningLine> {
        let descriptor = LineDescriptor {
            name: format!("Line {}", id),
            movetext: movetext.to_string(),
            side,
            difficulty: Difficulty::Easy,
            kind: LineKind::Opening,
            description: String::new(),
        };
        Arc::new(OpeningLine::from_descriptor(id, descriptor).unwrap())
    }

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    fn san(s: &str) -> MoveInput {
        MoveInput::San(s.to_string())
    }

    fn play_book_reply(session: &mut TrainingSession) -> PlayedMove {
        match session.next_opponent_move() {
            Some(OpponentRequest::Book { ticket, san }) => {
                session.resolve_book_move(ticket, &san).unwrap().unwrap()
            }
            other => panic!("expected a book move, got {:?}", other),
        }
    }

    fn completion(events: &[SessionEvent]) -> Option<(bool, String)> {
        events.iter().find_map(|e| match e {
            SessionEvent::Completed { success, message } => Some((*success, message.clone())),
            _ => None,
        })
    }

    #[test]
    fn trainer_line_to_completion() {
        let italian = line("italian", Side::White, "1. e4 e5 2. Nf3 Nc6 3. Bc4");
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(1));

        session.play(san("e4")).unwrap();
        assert_eq!(play_book_reply(&mut session).san, "e5");
        session.play(san("Nf3")).unwrap();
        assert_eq!(play_book_reply(&mut session).san, "Nc6");
        session.play(san("Bc4")).unwrap();

        assert_eq!(session.status(), GameStatus::Won);
        let events = session.drain_events();
        assert_eq!(
            completion(&events),
            Some((true, "You successfully navigated the Line italian!".to_string()))
        );
        assert!(matches!(session.play(san("Nf6")), Err(Error::GameFinished)));
        assert_eq!(session.movetext(), "1. e4 e5 2. Nf3 Nc6 3. Bc4");
    }

    #[test]
    fn first_move_deviation_loses() {
        let italian = line("italian", Side::White, "1. e4 e5 2. Nf3");
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(1));
        session.play(san("d4")).unwrap();
        assert_eq!(session.status(), GameStatus::Lost);
        assert_eq!(
            completion(&session.drain_events()),
            Some((false, "You deviated from the Line italian line!".to_string()))
        );
        assert!(session.next_opponent_move().is_none());
    }

    #[test]
    fn rejects_moves_out_of_turn() {
        let italian = line("italian", Side::White, "1. e4 e5 2. Nf3");
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(1));
        session.play(san("e4")).unwrap();
        assert!(matches!(session.play(san("e5")), Err(Error::NotYourTurn)));
        assert!(matches!(session.play(san("Ke2")), Err(Error::NotYourTurn)));
    }

    #[test]
    fn illegal_move_has_no_effect() {
        let italian = line("italian", Side::White, "1. e4 e5 2. Nf3");
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(1));
        assert!(matches!(session.play(san("e5")), Err(Error::IllegalMove(_))));
        assert_eq!(session.status(), GameStatus::Playing);
        assert_eq!(session.board().ply(), 0);
    }

    #[test]
    fn one_opponent_move_in_flight() {
        let sicilian = line("sicilian", Side::Black, "1. e4 c5 2. Nf3 d6");
        let mut session = TrainingSession::single(sicilian, Mode::Trainer, rng(4));
        let request = session.next_opponent_move().unwrap();
        assert!(session.next_opponent_move().is_none());
        assert_eq!(session.pending(), Some(request.ticket()));
    }

    #[test]
    fn stale_answers_are_discarded() {
        let sicilian = line("sicilian", Side::Black, "1. e4 c5 2. Nf3 d6");
        let mut session = TrainingSession::single(sicilian, Mode::Trainer, rng(4));
        let Some(OpponentRequest::Book { ticket, san }) = session.next_opponent_move() else {
            panic!("expected a book move");
        };
        session.reset();
        assert_eq!(session.resolve_book_move(ticket, &san).unwrap(), None);
        assert_eq!(session.board().ply(), 0);

        // a fresh request is accepted
        let request = session.next_opponent_move().unwrap();
        assert_ne!(request.ticket(), ticket);
    }

    #[test]
    fn black_trainee_sees_every_root_move() {
        let two = line("two", Side::Black, "1. e4 (1. d4 d5) 1... c5");
        let mut seen = std::collections::HashSet::new();
        for seed in 0..40 {
            let mut session = TrainingSession::single(two.clone(), Mode::Trainer, rng(seed));
            seen.insert(play_book_reply(&mut session).san);
            assert!(session.is_trainee_turn());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn explorer_hands_off_to_engine() {
        let italian = line("italian", Side::White, "1. e4 e5 2. Nf3 Nc6");
        let mut session = TrainingSession::single(italian, Mode::Explorer, rng(2));
        session.play(san("e4")).unwrap();
        play_book_reply(&mut session);
        session.play(san("Bc4")).unwrap();
        assert_eq!(session.status(), GameStatus::OutOfBook);

        let Some(OpponentRequest::Engine { ticket, fen }) = session.next_opponent_move() else {
            panic!("expected an engine request");
        };
        assert_eq!(fen, session.board().fen());
        let reply = session.resolve_engine_move(ticket, "g8f6").unwrap().unwrap();
        assert_eq!(reply.san, "Nf6");
        assert_eq!(session.status(), GameStatus::OutOfBook);
    }

    #[test]
    fn explorer_end_of_line_goes_to_engine() {
        let short = line("short", Side::White, "1. e4 e5");
        let mut session = TrainingSession::single(short, Mode::Explorer, rng(2));
        session.play(san("e4")).unwrap();
        play_book_reply(&mut session);
        assert_eq!(session.status(), GameStatus::OutOfBook);
        assert!(completion(&session.drain_events()).is_none());
    }

    #[test]
    fn engine_answer_after_trainee_move_is_stale() {
        let italian = line("italian", Side::White, "1. e4 e5");
        let mut session = TrainingSession::single(italian, Mode::Explorer, rng(2));
        session.play(san("d4")).unwrap();
        let request = session.next_opponent_move().unwrap();
        // explorer lets the trainee move the other side while out of book
        session.play(san("d5")).unwrap();
        assert_eq!(session.resolve_engine_move(request.ticket(), "g8f6").unwrap(), None);
        assert_eq!(session.board().ply(), 2);
    }

    #[test]
    fn undo_takes_back_a_full_turn() {
        let italian = line("italian", Side::White, "1. e4 e5 2. Nf3 Nc6 3. Bc4");
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(3));
        session.play(san("e4")).unwrap();
        play_book_reply(&mut session);
        session.play(san("d4")).unwrap();
        assert_eq!(session.status(), GameStatus::Lost);

        session.undo().unwrap();
        assert_eq!(session.status(), GameStatus::Playing);
        assert_eq!(session.board().ply(), 2);
        assert_eq!(session.hints()[0].san, "Nf3");

        session.undo().unwrap();
        assert_eq!(session.board().ply(), 0);
        assert!(matches!(session.undo(), Err(Error::NothingToUndo)));
    }

    #[test]
    fn undo_invalidates_pending_move() {
        let italian = line("italian", Side::White, "1. e4 e5 2. Nf3");
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(3));
        session.play(san("e4")).unwrap();
        let request = session.next_opponent_move().unwrap();
        session.undo().unwrap();
        assert_eq!(session.pending(), None);
        let OpponentRequest::Book { ticket, san } = request else {
            panic!("expected a book move");
        };
        assert_eq!(session.resolve_book_move(ticket, &san).unwrap(), None);
        assert_eq!(session.board().ply(), 0);
    }

    #[test]
    fn hints_only_on_trainee_turn() {
        let italian = line("italian", Side::White, "1. e4 {Center} e5 (1... c5) 2. Nf3");
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(3));
        let hints = session.hints();
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].from.as_deref(), Some("e2"));
        assert_eq!(hints[0].to, "e4");
        assert_eq!(hints[0].comment.as_deref(), Some("Center"));
        session.play(san("e4")).unwrap();
        assert!(session.hints().is_empty());
    }

    #[test]
    fn castling_entered_as_king_squares() {
        let italian = line(
            "italian",
            Side::White,
            "1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. O-O Nf6",
        );
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(3));
        for mv in ["e4", "Nf3", "Bc4"] {
            session.play(san(mv)).unwrap();
            play_book_reply(&mut session);
        }

        let hints = session.hints();
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].san, "O-O");
        assert_eq!(hints[0].from.as_deref(), Some("e1"));
        assert_eq!(hints[0].to, "g1");

        let castled = session
            .play(MoveInput::Squares {
                from: shakmaty::Square::E1,
                to: shakmaty::Square::G1,
                promotion: None,
            })
            .unwrap();
        assert_eq!(castled.san, "O-O");
        assert_eq!(castled.to, "g1");
        assert_eq!(session.status(), GameStatus::Playing);
        assert_eq!(play_book_reply(&mut session).san, "Nf6");
    }

    #[test]
    fn continue_after_loss() {
        let italian = line("italian", Side::White, "1. e4 e5");
        let mut session = TrainingSession::single(italian, Mode::Trainer, rng(3));
        session.play(san("c4")).unwrap();
        assert_eq!(session.status(), GameStatus::Lost);
        session.continue_in_explorer().unwrap();
        assert_eq!(session.mode(), Mode::Explorer);
        assert_eq!(session.status(), GameStatus::OutOfBook);
        assert!(matches!(
            session.next_opponent_move(),
            Some(OpponentRequest::Engine { .. })
        ));

        session.reset();
        assert_eq!(session.mode(), Mode::Trainer);
        assert_eq!(session.status(), GameStatus::Playing);
    }

    #[test]
    fn checkmate_ends_the_game() {
        let mate = line("mate", Side::White, "1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6");
        let mut session = TrainingSession::single(mate, Mode::Explorer, rng(5));
        for _ in 0..3 {
            let mv = session.hints()[0].san.clone();
            session.play(MoveInput::San(mv)).unwrap();
            play_book_reply(&mut session);
        }
        session.play(san("Qxf7")).unwrap();
        assert_eq!(session.status(), GameStatus::Won);
        assert!(session.continue_in_explorer().is_err());
    }

    fn blind_lines() -> Vec<Arc<OpeningLine>> {
        vec![
            line("a", Side::White, "1. e4 e5 2. Nf3 Nc6"),
            line("b", Side::White, "1. e4 e5 2. Bc4 Nf6"),
            line("c", Side::White, "1. d4 d5 2. c4"),
            line("black", Side::Black, "1. e4 c5"),
        ]
    }

    #[test]
    fn blind_game_reveals_the_target() {
        for seed in 0..8 {
            let mut session = TrainingSession::blind(blind_lines(), Side::White, rng(seed));
            assert_eq!(session.candidates_remaining(), Some(3));
            let initial = session.target_name().unwrap().to_string();

            session.play(san("e4")).unwrap();
            assert_eq!(session.candidates_remaining(), Some(2));
            assert_eq!(play_book_reply(&mut session).san, "e5");
            session.play(san("Bc4")).unwrap();
            assert_eq!(session.target_name(), Some("Line b"));
            assert_eq!(play_book_reply(&mut session).san, "Nf6");

            assert_eq!(session.status(), GameStatus::Won);
            let events = session.drain_events();
            let switches = events
                .iter()
                .filter(|e| matches!(e, SessionEvent::TargetSwitched { .. }))
                .count();
            if initial == "Line b" {
                assert_eq!(switches, 0);
            } else {
                assert!(switches >= 1);
            }
            assert_eq!(
                completion(&events),
                Some((
                    true,
                    "Victory! You completed the hidden opening: Line b".to_string()
                ))
            );
        }
    }

    #[test]
    fn blind_deviation_from_everything() {
        let mut session = TrainingSession::blind(blind_lines(), Side::White, rng(6));
        session.play(san("c4")).unwrap();
        assert_eq!(session.status(), GameStatus::Lost);
        assert_eq!(
            completion(&session.drain_events()),
            Some((false, "You deviated from all known openings!".to_string()))
        );
    }

    #[test]
    fn blind_undo_renarrows() {
        let mut session = TrainingSession::blind(blind_lines(), Side::White, rng(7));
        session.play(san("e4")).unwrap();
        play_book_reply(&mut session);
        session.play(san("Nf3")).unwrap();
        assert_eq!(session.candidates_remaining(), Some(1));

        session.undo().unwrap();
        assert_eq!(session.status(), GameStatus::Playing);
        assert_eq!(session.candidates_remaining(), Some(2));
    }
}
