//! Tracking progress through repertoire trees.
//!
//! [`TraversalState`] follows a single line. [`CandidateState`] follows every
//! line that is still consistent with the moves played so far and keeps one of
//! them as the hidden target.
//!
//! Pointers are stored as index paths from the forest root, so a state owns its
//! position in the tree without borrowing the line.

use std::sync::Arc;

use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::opening::OpeningLine;
use crate::tree::MoveNode;

/// How a move that is not a known continuation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Leaving the line is a failure.
    Strict,
    /// Leaving the line hands the game over to the analysis engine.
    Permissive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LineStatus {
    InBook,
    OutOfBook,
    LineComplete,
    Deviated,
}

impl LineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LineStatus::LineComplete | LineStatus::Deviated)
    }
}

/// Index path from the forest into a tree. Empty means "at root".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    path: Vec<usize>,
}

impl Cursor {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Node the cursor points at; `None` at root.
    pub fn node<'a>(&self, forest: &'a [MoveNode]) -> Option<&'a MoveNode> {
        let (first, rest) = self.path.split_first()?;
        let mut node = forest.get(*first)?;
        for &idx in rest {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    /// Known continuations from the cursor.
    pub fn continuations<'a>(&self, forest: &'a [MoveNode]) -> &'a [MoveNode] {
        if self.is_root() {
            forest
        } else {
            self.node(forest).map_or(&[], |node| node.children.as_slice())
        }
    }

    /// Step into the continuation named `san`, if there is one.
    pub fn advance(&mut self, forest: &[MoveNode], san: &str) -> bool {
        match self
            .continuations(forest)
            .iter()
            .position(|child| child.san == san)
        {
            Some(idx) => {
                self.path.push(idx);
                true
            }
            None => false,
        }
    }

    pub fn is_leaf(&self, forest: &[MoveNode]) -> bool {
        self.continuations(forest).is_empty()
    }
}

fn pick<'a, R: Rng + ?Sized>(children: &'a [MoveNode], rng: &mut R) -> Option<&'a MoveNode> {
    children.choose(rng)
}

/// Progress through one line.
#[derive(Debug, Clone)]
pub struct TraversalState {
    line: Arc<OpeningLine>,
    cursor: Option<Cursor>,
    status: LineStatus,
}

impl TraversalState {
    pub fn new(line: Arc<OpeningLine>) -> Self {
        Self {
            line,
            cursor: Some(Cursor::root()),
            status: LineStatus::InBook,
        }
    }

    pub fn line(&self) -> &Arc<OpeningLine> {
        &self.line
    }

    pub fn status(&self) -> LineStatus {
        self.status
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Node reached so far; `None` at root or once out of book.
    pub fn current(&self) -> Option<&MoveNode> {
        self.cursor.as_ref()?.node(&self.line.forest)
    }

    /// Known continuations, empty once the pointer has been abandoned.
    pub fn continuations(&self) -> &[MoveNode] {
        match &self.cursor {
            Some(cursor) if self.status == LineStatus::InBook => {
                cursor.continuations(&self.line.forest)
            }
            _ => &[],
        }
    }

    pub fn reset(&mut self) {
        self.cursor = Some(Cursor::root());
        self.status = LineStatus::InBook;
    }

    /// Apply a played move.
    ///
    /// Terminal states and out-of-book play ignore further moves.
    pub fn advance(&mut self, san: &str, policy: Policy) -> LineStatus {
        if self.status != LineStatus::InBook {
            return self.status;
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return self.status;
        };
        if cursor.advance(&self.line.forest, san) {
            if cursor.is_leaf(&self.line.forest) {
                self.status = LineStatus::LineComplete;
            }
        } else {
            debug!("{} is not a continuation of {}", san, self.line.name);
            match policy {
                Policy::Strict => self.status = LineStatus::Deviated,
                Policy::Permissive => self.leave_book(),
            }
        }
        self.status
    }

    /// Drop the pointer; the analysis engine takes over from here.
    pub fn leave_book(&mut self) {
        self.cursor = None;
        self.status = LineStatus::OutOfBook;
    }

    /// Uniformly random known continuation, or `None` when the book is
    /// exhausted.
    pub fn choose_continuation<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&MoveNode> {
        pick(self.continuations(), rng)
    }

    /// Rebuild the pointer from a full move history, as after a take-back.
    pub fn replay<'a, I>(&mut self, history: I, policy: Policy) -> LineStatus
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.reset();
        for san in history {
            self.advance(san, policy);
        }
        self.status
    }
}

/// One line still consistent with the moves played.
#[derive(Debug, Clone)]
pub struct Candidate {
    line: Arc<OpeningLine>,
    cursor: Cursor,
}

impl Candidate {
    pub fn new(line: Arc<OpeningLine>) -> Self {
        Self {
            line,
            cursor: Cursor::root(),
        }
    }

    pub fn line(&self) -> &Arc<OpeningLine> {
        &self.line
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn continuations(&self) -> &[MoveNode] {
        self.cursor.continuations(&self.line.forest)
    }

    pub fn is_complete(&self) -> bool {
        !self.cursor.is_root() && self.cursor.is_leaf(&self.line.forest)
    }
}

/// Result of playing a move in candidate mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// No line matches the moves played.
    Deviated,
    Narrowed {
        remaining: usize,
        /// Name of the new target when the previous one dropped out.
        switched_to: Option<String>,
        /// The target reached the end of its line.
        target_complete: bool,
    },
}

/// Every line still in play, plus the hidden target.
#[derive(Debug, Clone)]
pub struct CandidateState {
    pool: Vec<Arc<OpeningLine>>,
    candidates: Vec<Candidate>,
    target: Option<usize>,
}

impl CandidateState {
    pub fn new<R: Rng + ?Sized>(lines: Vec<Arc<OpeningLine>>, rng: &mut R) -> Self {
        let mut state = Self {
            pool: lines,
            candidates: Vec::new(),
            target: None,
        };
        state.reset(rng);
        state
    }

    /// Restore the full candidate set and draw a fresh target.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.candidates = self.pool.iter().cloned().map(Candidate::new).collect();
        self.target = if self.candidates.is_empty() {
            None
        } else {
            Some(rng.gen_range(0..self.candidates.len()))
        };
        if let Some(target) = self.target() {
            info!("Blind target: {}", target.line.name);
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn target(&self) -> Option<&Candidate> {
        self.candidates.get(self.target?)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Narrow the set by a played move and retarget when needed.
    pub fn advance<R: Rng + ?Sized>(&mut self, san: &str, rng: &mut R) -> CandidateOutcome {
        let target_id = self.target().map(|t| t.line.id.clone());

        let mut survivors = Vec::with_capacity(self.candidates.len());
        for mut candidate in self.candidates.drain(..) {
            if candidate.cursor.advance(&candidate.line.forest, san) {
                survivors.push(candidate);
            }
        }
        self.candidates = survivors;

        if self.candidates.is_empty() {
            self.target = None;
            debug!("{} leaves every candidate line", san);
            return CandidateOutcome::Deviated;
        }

        let kept = target_id
            .as_deref()
            .and_then(|id| self.candidates.iter().position(|c| c.line.id == id));
        let switched_to = match kept {
            Some(idx) => {
                self.target = Some(idx);
                None
            }
            None => {
                let idx = rng.gen_range(0..self.candidates.len());
                self.target = Some(idx);
                let name = self.candidates[idx].line.name.clone();
                info!("Blind target switched to {}", name);
                Some(name)
            }
        };

        CandidateOutcome::Narrowed {
            remaining: self.candidates.len(),
            switched_to,
            target_complete: self.target().map_or(false, Candidate::is_complete),
        }
    }

    /// Opponent moves always come from the target's continuations.
    pub fn choose_continuation<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&MoveNode> {
        pick(self.target()?.continuations(), rng)
    }

    /// Rebuild from the full set after a take-back, keeping the target if it
    /// is still consistent with `history`.
    pub fn replay<'a, I, R>(&mut self, history: I, rng: &mut R) -> Option<CandidateOutcome>
    where
        I: IntoIterator<Item = &'a str>,
        R: Rng + ?Sized,
    {
        let target_id = self.target().map(|t| t.line.id.clone());
        self.candidates = self.pool.iter().cloned().map(Candidate::new).collect();
        self.target = target_id
            .as_deref()
            .and_then(|id| self.candidates.iter().position(|c| c.line.id == id));
        if self.target.is_none() && !self.candidates.is_empty() {
            self.target = Some(rng.gen_range(0..self.candidates.len()));
        }

        let mut last = None;
        for san in history {
            let outcome = self.advance(san, rng);
            let deviated = outcome == CandidateOutcome::Deviated;
            last = Some(outcome);
            if deviated {
                break;
            }
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Side;
    use crate::opening::{Difficulty, LineDescriptor, LineKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn line(id: &str, movetext: &str) -> Arc<OpeningLine> {
        let descriptor = LineDescriptor {
            name: format!("Line {}", id),
            movetext: movetext.to_string(),
            side: Side::White,
            difficulty: Difficulty::Medium,
            kind: LineKind::Opening,
            description: String::new(),
        };
        Arc::new(OpeningLine::from_descriptor(id, descriptor).unwrap())
    }

    fn three_lines() -> Vec<Arc<OpeningLine>> {
        vec![
            line("italian", "1. e4 e5 2. Nf3 Nc6 3. Bc4"),
            line("sicilian", "1. e4 c5 2. Nf3 d6"),
            line("french", "1. e4 e6 2. d4 d5"),
        ]
    }

    #[test]
    fn single_line_to_completion() {
        let mut state = TraversalState::new(line("italian", "1. e4 e5 2. Nf3 Nc6 3. Bc4"));
        for san in ["e4", "e5", "Nf3", "Nc6"] {
            assert_eq!(state.advance(san, Policy::Strict), LineStatus::InBook);
        }
        assert_eq!(state.current().unwrap().san, "Nc6");
        assert_eq!(state.advance("Bc4", Policy::Strict), LineStatus::LineComplete);
        assert!(state.continuations().is_empty());
        // terminal: further moves are ignored
        assert_eq!(state.advance("Nf6", Policy::Strict), LineStatus::LineComplete);
    }

    #[test]
    fn first_move_deviation_is_immediate() {
        let mut state = TraversalState::new(line("italian", "1. e4 e5 2. Nf3"));
        assert_eq!(state.advance("d4", Policy::Strict), LineStatus::Deviated);
        assert!(state.current().is_none());
        state.reset();
        assert_eq!(state.status(), LineStatus::InBook);
        assert!(state.cursor().unwrap().is_root());
    }

    #[test]
    fn permissive_policy_leaves_book() {
        let mut state = TraversalState::new(line("italian", "1. e4 e5 2. Nf3"));
        state.advance("e4", Policy::Permissive);
        assert_eq!(state.advance("c5", Policy::Permissive), LineStatus::OutOfBook);
        assert!(state.cursor().is_none());
        assert!(state.continuations().is_empty());
        // no re-entry into the tree
        assert_eq!(state.advance("Nf3", Policy::Permissive), LineStatus::OutOfBook);
    }

    #[test]
    fn notation_must_match_exactly() {
        let mate = line("mate", "1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7#");
        let mut state = TraversalState::new(mate);
        for san in ["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6"] {
            state.advance(san, Policy::Strict);
        }
        assert_eq!(state.advance("Qxf7", Policy::Strict), LineStatus::Deviated);
    }

    #[test]
    fn random_choice_covers_every_child() {
        let state = TraversalState::new(line("multi", "1. e4 (1. d4) (1. c4) (1. Nf3)"));
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(state.choose_continuation(&mut rng).unwrap().san.clone());
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn book_exhausted_at_leaf() {
        let mut state = TraversalState::new(line("short", "1. d4"));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(state.choose_continuation(&mut rng).unwrap().san, "d4");
        state.advance("d4", Policy::Strict);
        assert!(state.choose_continuation(&mut rng).is_none());
    }

    #[test]
    fn replay_resyncs_pointer() {
        let mut state = TraversalState::new(line("italian", "1. e4 e5 2. Nf3 Nc6 3. Bc4"));
        state.advance("d4", Policy::Strict);
        assert_eq!(state.replay(["e4", "e5"], Policy::Strict), LineStatus::InBook);
        assert_eq!(state.current().unwrap().san, "e5");
    }

    #[test]
    fn candidates_narrow_to_one() {
        let mut rng = StdRng::seed_from_u64(3);
        for seed in 0..10 {
            let mut rng_seeded = StdRng::seed_from_u64(seed);
            let mut state = CandidateState::new(three_lines(), &mut rng_seeded);
            let before = state.target().unwrap().line().id.clone();

            let outcome = state.advance("e4", &mut rng);
            assert_eq!(
                outcome,
                CandidateOutcome::Narrowed {
                    remaining: 3,
                    switched_to: None,
                    target_complete: false
                }
            );

            let outcome = state.advance("c5", &mut rng);
            let CandidateOutcome::Narrowed {
                remaining,
                switched_to,
                ..
            } = outcome
            else {
                panic!("expected narrowing");
            };
            assert_eq!(remaining, 1);
            assert_eq!(state.target().unwrap().line().id, "sicilian");
            if before == "sicilian" {
                assert_eq!(switched_to, None);
            } else {
                assert_eq!(switched_to.as_deref(), Some("Line sicilian"));
            }
        }
    }

    #[test]
    fn candidate_target_completion() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut state = CandidateState::new(three_lines(), &mut rng);
        for san in ["e4", "e6", "d4"] {
            state.advance(san, &mut rng);
        }
        assert_eq!(
            state.advance("d5", &mut rng),
            CandidateOutcome::Narrowed {
                remaining: 1,
                switched_to: None,
                target_complete: true
            }
        );
    }

    #[test]
    fn candidates_exhausted() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = CandidateState::new(three_lines(), &mut rng);
        assert_eq!(state.advance("d4", &mut rng), CandidateOutcome::Deviated);
        assert!(state.is_empty());
        assert!(state.target().is_none());
        state.reset(&mut rng);
        assert_eq!(state.candidates().len(), 3);
        assert!(state.target().is_some());
    }

    #[test]
    fn opponent_moves_come_from_target() {
        let lines = vec![
            line("a", "1. e4 e5 2. Nf3"),
            line("b", "1. d4 d5 2. c4"),
        ];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let state = CandidateState::new(lines.clone(), &mut rng);
            let target_first = state.target().unwrap().line().forest[0].san.clone();
            let chosen = state.choose_continuation(&mut rng).unwrap();
            assert_eq!(chosen.san, target_first);
        }
    }

    #[test]
    fn several_opponent_first_moves_at_root() {
        // Trainee plays black; the line knows two white first moves.
        let state = TraversalState::new(line("two", "1. e4 (1. d4 d5) 1... c5"));
        let mut rng = StdRng::seed_from_u64(9);
        let mut seen = HashSet::new();
        for _ in 0..100 {
            seen.insert(state.choose_continuation(&mut rng).unwrap().san.clone());
        }
        assert_eq!(seen, HashSet::from(["e4".to_string(), "d4".to_string()]));
    }

    #[test]
    fn candidate_replay_keeps_surviving_target() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut state = CandidateState::new(three_lines(), &mut rng);
        state.advance("e4", &mut rng);
        state.advance("c5", &mut rng);
        assert_eq!(state.target().unwrap().line().id, "sicilian");

        let outcome = state.replay(["e4"], &mut rng);
        assert!(matches!(
            outcome,
            Some(CandidateOutcome::Narrowed {
                remaining: 3,
                switched_to: None,
                ..
            })
        ));
        assert_eq!(state.candidates().len(), 3);
        assert_eq!(state.target().unwrap().line().id, "sicilian");
    }

    #[test]
    fn empty_pool_has_no_target() {
        let mut rng = StdRng::seed_from_u64(0);
        let state = CandidateState::new(Vec::new(), &mut rng);
        assert!(state.target().is_none());
        assert!(state.choose_continuation(&mut rng).is_none());
    }
}
