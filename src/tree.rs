//! Move trees built from parsed movetext.
//!
//! [`build_forest`] replays a [`MoveToken`] list through the board engine and
//! produces the forest of first moves. Siblings are alternative moves from the
//! same position; children are the known continuations.

use log::{debug, warn};
use shakmaty::{Chess, Position};

use crate::board::{play_san, position_fen, Side};
use crate::lexer::{parse_movetext, MoveToken};

/// One known move of a repertoire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveNode {
    pub san: String,
    pub position: Chess,
    pub mover: Side,
    pub children: Vec<MoveNode>,
    pub comment: Option<String>,
}

impl MoveNode {
    pub fn fen(&self) -> String {
        position_fen(&self.position)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, san: &str) -> Option<&MoveNode> {
        find_move(&self.children, san)
    }
}

/// Look a move up among siblings by exact notation.
pub fn find_move<'a>(nodes: &'a [MoveNode], san: &str) -> Option<&'a MoveNode> {
    nodes.iter().find(|n| n.san == san)
}

struct Slot {
    san: String,
    position: Chess,
    mover: Side,
    comment: Option<String>,
    children: Vec<usize>,
}

/// Pending piece of work: play `tokens[0]` from `position` and attach the
/// result under `parent` (`None` for the forest roots).
struct Branch<'a> {
    tokens: &'a [MoveToken],
    position: Chess,
    parent: Option<usize>,
}

/// Build the move forest for `tokens`, starting from `start`.
///
/// A move the board rejects abandons its branch (and the alternatives attached
/// to it); everything built before it and every sibling branch stays. Repeated
/// notations among siblings are merged into the first occurrence.
pub fn build_forest(tokens: &[MoveToken], start: &Chess) -> Vec<MoveNode> {
    let mut slots: Vec<Slot> = Vec::new();
    let mut roots: Vec<usize> = Vec::new();
    let mut work = vec![Branch {
        tokens,
        position: start.clone(),
        parent: None,
    }];

    while let Some(Branch {
        tokens,
        position,
        parent,
    }) = work.pop()
    {
        let Some((token, rest)) = tokens.split_first() else {
            continue;
        };

        let mover = Side::from(position.turn());
        let mut after = position.clone();
        let san = match play_san(&mut after, &token.san) {
            Ok((_, san)) => san,
            Err(e) => {
                warn!("Abandoning branch at '{}': {}", token.san, e);
                continue;
            }
        };

        let siblings = match parent {
            Some(idx) => &slots[idx].children,
            None => &roots,
        };
        let existing = siblings.iter().copied().find(|&i| slots[i].san == san);
        let idx = match existing {
            Some(idx) => {
                debug!("Merging repeated move {}", san);
                if slots[idx].comment.is_none() {
                    slots[idx].comment = token.comment();
                }
                idx
            }
            None => {
                slots.push(Slot {
                    san,
                    position: after.clone(),
                    mover,
                    comment: token.comment(),
                    children: Vec::new(),
                });
                let idx = slots.len() - 1;
                match parent {
                    Some(p) => slots[p].children.push(idx),
                    None => roots.push(idx),
                }
                idx
            }
        };

        // LIFO: the first alternative must be attached before later ones, and
        // each alternative's own nested siblings right after it.
        for variation in token.variations.iter().rev() {
            work.push(Branch {
                tokens: variation,
                position: position.clone(),
                parent,
            });
        }
        work.push(Branch {
            tokens: rest,
            position: after,
            parent: Some(idx),
        });
    }

    materialize(slots, &roots)
}

/// Turn the flat slot arena into owned nodes. Children always sit at higher
/// indices than their parent, so a reverse sweep sees every child first.
fn materialize(slots: Vec<Slot>, roots: &[usize]) -> Vec<MoveNode> {
    let mut built: Vec<Option<MoveNode>> = Vec::with_capacity(slots.len());
    built.resize_with(slots.len(), || None);

    for (idx, slot) in slots.into_iter().enumerate().rev() {
        let children = slot
            .children
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[idx] = Some(MoveNode {
            san: slot.san,
            position: slot.position,
            mover: slot.mover,
            children,
            comment: slot.comment,
        });
    }

    roots.iter().filter_map(|&idx| built[idx].take()).collect()
}

/// Parse movetext and build its forest from the standard starting position.
///
/// Malformed movetext yields an empty forest.
pub fn parse_pgn_to_tree(movetext: &str) -> Vec<MoveNode> {
    let tokens = parse_movetext(movetext);
    if tokens.is_empty() {
        return Vec::new();
    }
    build_forest(&tokens, &Chess::default())
}

/// Count of nodes in a forest, walked without recursion.
pub fn node_count(forest: &[MoveNode]) -> usize {
    let mut stack: Vec<&MoveNode> = forest.iter().collect();
    let mut count = 0;
    while let Some(node) = stack.pop() {
        count += 1;
        stack.extend(node.children.iter());
    }
    count
}

/// Every complete line of a forest as a list of SAN moves, in sibling order.
pub fn leaf_lines(forest: &[MoveNode]) -> Vec<Vec<String>> {
    let mut lines = Vec::new();
    let mut stack: Vec<(&MoveNode, Vec<String>)> =
        forest.iter().rev().map(|n| (n, Vec::new())).collect();
    while let Some((node, mut path)) = stack.pop() {
        path.push(node.san.clone());
        if node.is_leaf() {
            lines.push(path);
        } else {
            for child in node.children.iter().rev() {
                stack.push((child, path.clone()));
            }
        }
    }
    lines
}
