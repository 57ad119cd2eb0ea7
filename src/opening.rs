use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use shakmaty::Chess;
use strsim::{jaro_winkler, sorensen_dice};

use crate::board::Side;
use crate::error::{Error, Result};
use crate::lexer::try_parse_movetext;
use crate::store::{LineStore, CUSTOM_LINES_KEY};
use crate::tree::{build_forest, parse_pgn_to_tree, MoveNode};

const LINES_TSV: &[u8] = include_bytes!("../data/lines.tsv");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[serde(alias = "Easy")]
    Easy,
    #[serde(alias = "Medium")]
    Medium,
    #[serde(alias = "Hard")]
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    #[serde(alias = "Trap")]
    Trap,
    #[serde(alias = "Gambit")]
    Gambit,
    #[serde(alias = "Opening")]
    Opening,
}

/// Everything needed to create a line, as entered by the trainee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDescriptor {
    pub name: String,
    pub movetext: String,
    pub side: Side,
    pub difficulty: Difficulty,
    pub kind: LineKind,
    #[serde(default)]
    pub description: String,
}

/// Custom line as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLine {
    id: String,
    #[serde(flatten)]
    descriptor: LineDescriptor,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BuiltinRecord {
    id: String,
    name: String,
    side: Side,
    difficulty: Difficulty,
    kind: LineKind,
    movetext: String,
    description: String,
}

/// A repertoire line with its move forest built once, up front.
#[derive(Debug, Clone)]
pub struct OpeningLine {
    pub id: String,
    pub name: String,
    pub description: String,
    pub movetext: String,
    pub side: Side,
    pub difficulty: Difficulty,
    pub kind: LineKind,
    pub builtin: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub forest: Vec<MoveNode>,
}

impl OpeningLine {
    /// Build a line from a descriptor. Fails if the movetext yields no moves.
    pub fn from_descriptor(id: impl Into<String>, descriptor: LineDescriptor) -> Result<Self> {
        let tokens = try_parse_movetext(&descriptor.movetext)?;
        let forest = build_forest(&tokens, &Chess::default());
        if forest.is_empty() {
            return Err(Error::InvalidMovetext);
        }
        Ok(Self {
            id: id.into(),
            name: descriptor.name,
            description: descriptor.description,
            movetext: descriptor.movetext,
            side: descriptor.side,
            difficulty: descriptor.difficulty,
            kind: descriptor.kind,
            builtin: false,
            created_at: None,
            forest,
        })
    }

    pub fn descriptor(&self) -> LineDescriptor {
        LineDescriptor {
            name: self.name.clone(),
            movetext: self.movetext.clone(),
            side: self.side,
            difficulty: self.difficulty,
            kind: self.kind,
            description: self.description.clone(),
        }
    }
}

/// Check a descriptor the way the add form does before saving it.
pub fn validate_descriptor(descriptor: &LineDescriptor) -> Result<()> {
    if descriptor.name.trim().is_empty() {
        return Err(Error::InvalidConfig("line name is empty".to_string()));
    }
    if parse_pgn_to_tree(&descriptor.movetext).is_empty() {
        return Err(Error::InvalidMovetext);
    }
    Ok(())
}

/// Lines shipped with the trainer.
pub fn builtin_lines() -> Result<Vec<OpeningLine>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(LINES_TSV);
    let mut lines = Vec::new();
    for result in rdr.deserialize() {
        let record: BuiltinRecord = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to deserialize built-in line: {}", e);
                continue;
            }
        };
        let id = record.id.clone();
        let descriptor = LineDescriptor {
            name: record.name,
            movetext: record.movetext,
            side: record.side,
            difficulty: record.difficulty,
            kind: record.kind,
            description: record.description,
        };
        match OpeningLine::from_descriptor(id, descriptor) {
            Ok(mut line) => {
                line.builtin = true;
                lines.push(line);
            }
            Err(e) => warn!("Skipping built-in line {}: {}", record.id, e),
        }
    }
    info!("Loaded {} built-in lines", lines.len());
    Ok(lines)
}

#[derive(Debug, Clone, Serialize)]
pub struct LineGroup {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub lines: Vec<Arc<OpeningLine>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineCategory {
    pub id: String,
    pub name: String,
    pub groups: Vec<LineGroup>,
}

const CATEGORY_ORDER: [&str; 5] = ["kings-pawn", "queens-pawn", "english", "reti", "other"];

fn category_of(movetext: &str) -> (&'static str, &'static str) {
    let text = movetext.trim_start();
    if text.starts_with("1. e4") {
        ("kings-pawn", "King's Pawn (e4)")
    } else if text.starts_with("1. d4") {
        ("queens-pawn", "Queen's Pawn (d4)")
    } else if text.starts_with("1. c4") {
        ("english", "English Opening (c4)")
    } else if text.starts_with("1. Nf3") {
        ("reti", "Reti / Flank (Nf3)")
    } else {
        ("other", "Other Openings")
    }
}

fn slug(name: &str) -> String {
    let mut out = String::new();
    let mut gap = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            gap = false;
        } else if !gap {
            out.push('-');
            gap = true;
        }
    }
    out
}

/// All known lines, in insertion order: built-ins first, then custom lines.
#[derive(Debug, Default, Clone)]
pub struct RepertoireIndex {
    lines: Vec<Arc<OpeningLine>>,
}

impl RepertoireIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index holding only the built-in table.
    pub fn with_builtin() -> Result<Self> {
        let mut index = Self::new();
        for line in builtin_lines()? {
            index.insert(line);
        }
        Ok(index)
    }

    /// Built-in table followed by the custom lines found in `store`.
    pub fn load(store: &dyn LineStore) -> Result<Self> {
        let mut index = Self::with_builtin()?;
        let raw = match store.get(CUSTOM_LINES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(index),
            Err(e) => {
                warn!("Custom line storage unreadable, using built-in lines only: {}", e);
                return Ok(index);
            }
        };
        let stored: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to load custom lines: {}", e);
                return Ok(index);
            }
        };
        for value in stored {
            let entry: StoredLine = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable custom line: {}", e);
                    continue;
                }
            };
            match OpeningLine::from_descriptor(entry.id.clone(), entry.descriptor) {
                Ok(mut line) => {
                    line.created_at = entry.created_at;
                    index.insert(line);
                }
                Err(e) => warn!("Skipping custom line {}: {}", entry.id, e),
            }
        }
        Ok(index)
    }

    /// Add a line; a line whose id is already present is ignored.
    pub fn insert(&mut self, line: OpeningLine) -> Option<Arc<OpeningLine>> {
        if self.get(&line.id).is_some() {
            warn!("Duplicate line id {}", line.id);
            return None;
        }
        let line = Arc::new(line);
        self.lines.push(line.clone());
        Some(line)
    }

    pub fn lines(&self) -> &[Arc<OpeningLine>] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<OpeningLine>> {
        self.lines.iter().find(|l| l.id == id)
    }

    pub fn for_side(&self, side: Side) -> Vec<Arc<OpeningLine>> {
        self.lines.iter().filter(|l| l.side == side).cloned().collect()
    }

    /// Build, validate and append a new line from a descriptor.
    pub fn append(&mut self, descriptor: LineDescriptor) -> Result<Arc<OpeningLine>> {
        validate_descriptor(&descriptor)?;
        let mut line = OpeningLine::from_descriptor(uuid::Uuid::new_v4().to_string(), descriptor)?;
        line.created_at = Some(Utc::now());
        let id = line.id.clone();
        self.insert(line).ok_or(Error::NoOpeningFound(id))
    }

    /// Append a trainee-authored line and mirror the custom lines to `store`.
    pub fn add_custom(
        &mut self,
        descriptor: LineDescriptor,
        store: &dyn LineStore,
    ) -> Result<Arc<OpeningLine>> {
        let line = self.append(descriptor)?;
        self.save_custom(store)?;
        info!("Added custom line {} ({})", line.name, line.id);
        Ok(line)
    }

    pub fn remove_custom(&mut self, id: &str, store: &dyn LineStore) -> Result<()> {
        let idx = self
            .lines
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| Error::NoOpeningFound(id.to_string()))?;
        if self.lines[idx].builtin {
            return Err(Error::BuiltinLine(id.to_string()));
        }
        self.lines.remove(idx);
        self.save_custom(store)
    }

    fn save_custom(&self, store: &dyn LineStore) -> Result<()> {
        let custom: Vec<StoredLine> = self
            .lines
            .iter()
            .filter(|l| !l.builtin)
            .map(|l| StoredLine {
                id: l.id.clone(),
                descriptor: l.descriptor(),
                created_at: l.created_at,
            })
            .collect();
        store.set(CUSTOM_LINES_KEY, &serde_json::to_string(&custom)?)
    }

    /// Lines grouped by first move, then by the name before the colon.
    pub fn categorized(&self) -> Vec<LineCategory> {
        let mut categories: Vec<LineCategory> = Vec::new();
        for line in &self.lines {
            let (category_id, category_name) = category_of(&line.movetext);
            let existing = categories.iter().position(|c| c.id == category_id);
            let cat_idx = match existing {
                Some(idx) => idx,
                None => {
                    categories.push(LineCategory {
                        id: category_id.to_string(),
                        name: category_name.to_string(),
                        groups: Vec::new(),
                    });
                    categories.len() - 1
                }
            };
            let category = &mut categories[cat_idx];

            let group_name = line.name.split(':').next().unwrap_or_default().trim();
            let group_id = slug(group_name);
            let existing = category.groups.iter().position(|g| g.id == group_id);
            match existing {
                Some(idx) => category.groups[idx].lines.push(line.clone()),
                None => category.groups.push(LineGroup {
                    id: group_id,
                    name: group_name.to_string(),
                    lines: vec![line.clone()],
                }),
            }
        }
        categories.sort_by_key(|c| {
            CATEGORY_ORDER
                .iter()
                .position(|id| *id == c.id)
                .unwrap_or(CATEGORY_ORDER.len())
        });
        categories
    }

    /// Fuzzy name search, best matches first.
    pub fn search(&self, query: &str) -> Vec<Arc<OpeningLine>> {
        let lower_query = query.to_lowercase();
        let mut best_matches: Vec<(Arc<OpeningLine>, f64)> = self
            .lines
            .iter()
            .map(|line| {
                let lower_name = line.name.to_lowercase();
                let score = sorensen_dice(&lower_query, &lower_name)
                    .max(jaro_winkler(&lower_query, &lower_name));
                (line.clone(), score)
            })
            .filter(|(_, score)| *score > 0.8)
            .collect();
        best_matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        best_matches.into_iter().take(15).map(|(line, _)| line).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn descriptor(name: &str, movetext: &str, side: Side) -> LineDescriptor {
        LineDescriptor {
            name: name.to_string(),
            movetext: movetext.to_string(),
            side,
            difficulty: Difficulty::Easy,
            kind: LineKind::Opening,
            description: String::new(),
        }
    }

    #[test]
    fn corrupt_store_keeps_builtin_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_lines.json");
        std::fs::write(&path, "{ truncated").unwrap();
        let store = crate::store::JsonFileStore::new(&path);

        let index = RepertoireIndex::load(&store).unwrap();
        let builtin = RepertoireIndex::with_builtin().unwrap();
        assert_eq!(index.len(), builtin.len());
        assert!(index.lines().iter().all(|l| l.builtin));
    }

    #[test]
    fn builtin_table_loads() {
        let index = RepertoireIndex::with_builtin().unwrap();
        assert!(index.len() > 40);
        assert!(index.lines().iter().all(|l| l.builtin && !l.forest.is_empty()));
        let fried = index.get("fried-liver").unwrap();
        assert_eq!(fried.name, "Fried Liver Attack");
        assert_eq!(fried.side, Side::White);
        assert_eq!(fried.kind, LineKind::Trap);
        assert_eq!(fried.forest[0].san, "e4");
    }

    #[test]
    fn filter_by_side() {
        let index = RepertoireIndex::with_builtin().unwrap();
        let black = index.for_side(Side::Black);
        assert!(!black.is_empty());
        assert!(black.iter().all(|l| l.side == Side::Black));
        assert_eq!(
            black.len() + index.for_side(Side::White).len(),
            index.len()
        );
    }

    #[test]
    fn empty_forest_descriptor_is_rejected() {
        let mut index = RepertoireIndex::new();
        let store = MemoryStore::new();
        for bad in ["", "   ", "1. e4 (1. d4", "1. e5"] {
            let err = index.add_custom(descriptor("Bad", bad, Side::White), &store);
            assert!(err.is_err(), "accepted {:?}", bad);
        }
        assert!(index.is_empty());
        assert_eq!(store.get(CUSTOM_LINES_KEY).unwrap(), None);
    }

    #[test]
    fn custom_lines_are_persisted_without_builtins() {
        let store = MemoryStore::new();
        let mut index = RepertoireIndex::load(&store).unwrap();
        let builtin_count = index.len();

        let line = index
            .add_custom(descriptor("My Sicilian", "1. e4 c5 2. Nf3 d6", Side::Black), &store)
            .unwrap();
        assert!(!line.builtin);
        assert!(line.created_at.is_some());
        assert_eq!(index.len(), builtin_count + 1);
        assert_eq!(index.lines().last().unwrap().id, line.id);

        let raw = store.get(CUSTOM_LINES_KEY).unwrap().unwrap();
        let stored: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["name"], "My Sicilian");

        let reloaded = RepertoireIndex::load(&store).unwrap();
        assert_eq!(reloaded.len(), builtin_count + 1);
        let again = reloaded.get(&line.id).unwrap();
        assert_eq!(again.forest, line.forest);
    }

    #[test]
    fn remove_custom_but_not_builtin() {
        let store = MemoryStore::new();
        let mut index = RepertoireIndex::load(&store).unwrap();
        let line = index
            .add_custom(descriptor("Mine", "1. d4 d5", Side::White), &store)
            .unwrap();
        assert!(matches!(
            index.remove_custom("fried-liver", &store),
            Err(Error::BuiltinLine(_))
        ));
        index.remove_custom(&line.id, &store).unwrap();
        assert!(index.get(&line.id).is_none());
        assert_eq!(store.get(CUSTOM_LINES_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn corrupt_store_entries_are_skipped() {
        let store = MemoryStore::new();
        store
            .set(
                CUSTOM_LINES_KEY,
                r#"[{"id":"x"},{"id":"ok","name":"Ok","movetext":"1. c4","side":"white","difficulty":"hard","kind":"gambit"}]"#,
            )
            .unwrap();
        let index = RepertoireIndex::load(&store).unwrap();
        assert!(index.get("x").is_none());
        let ok = index.get("ok").unwrap();
        assert_eq!(ok.difficulty, Difficulty::Hard);
        assert!(!ok.builtin);
    }

    #[test]
    fn categories_follow_first_move_order() {
        let mut index = RepertoireIndex::new();
        for (name, text) in [
            ("Grob: Main", "1. g4 d5"),
            ("English Opening", "1. c4 e5"),
            ("Sicilian Defense: Najdorf", "1. e4 c5"),
            ("London System", "1. d4 d5 2. Bf4"),
            ("Sicilian Defense: Dragon", "1. e4 c5 2. Nf3 d6"),
        ] {
            index.append(descriptor(name, text, Side::White)).unwrap();
        }
        let categories = index.categorized();
        let ids: Vec<_> = categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["kings-pawn", "queens-pawn", "english", "other"]);
        let sicilian = &categories[0].groups[0];
        assert_eq!(sicilian.id, "sicilian-defense");
        assert_eq!(sicilian.name, "Sicilian Defense");
        assert_eq!(sicilian.lines.len(), 2);
        assert_eq!(categories[3].groups[0].name, "Grob");
    }

    #[test]
    fn search_by_name() {
        let index = RepertoireIndex::with_builtin().unwrap();
        let found = index.search("fried liver attack");
        assert_eq!(found.first().map(|l| l.id.as_str()), Some("fried-liver"));
        assert!(index.search("zzzzzzzz").is_empty());
    }

    #[test]
    fn slugs() {
        assert_eq!(slug("Queen's Gambit"), "queen-s-gambit");
        assert_eq!(slug("Ruy Lopez"), "ruy-lopez");
    }
}
