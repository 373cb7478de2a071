//! Puzzle runtime: one state machine per puzzle kind behind a common
//! interface.
//!
//! A session is built from a merged puzzle config and lives only while the
//! player is in the scene that declared it. Sessions never navigate: a
//! solved submission carries the scene to continue to and the caller
//! decides what to do with it.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::schema::puzzle::PuzzleSpec;
use crate::schema::scene::SceneId;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_JIGSAW_SIZE: u32 = 3;
/// Largest grid a jigsaw may declare, in tiles.
pub const MAX_JIGSAW_TILES: usize = 1024;

const SORTING_INCOMPLETE: &str = "Aún faltan tarjetas por colocar.";
const SORTING_SOLVED: &str = "¡Orden correcto!";
const SORTING_FAILED: &str = "El orden no parece correcto. Revisa la pista y vuelve a intentarlo.";
const PATTERN_INCOMPLETE: &str = "Patrón incompleto.";
const PATTERN_SOLVED: &str = "Patrón correcto.";
const PATTERN_EXHAUSTED: &str = "Has agotado los intentos.";
const JIGSAW_SOLVED: &str = "Puzzle completado.";
const INERT_PLACEHOLDER: &str = "Puzzle no interactivo aún.";

/// Colours used when a pattern puzzle does not bring its own.
const DEFAULT_PATTERN_COLORS: &[(&str, &str)] = &[
    ("rojo", "#ffde59"),
    ("verde", "#ff6b6b"),
    ("azul", "#6bff6b"),
    ("amarillo", "#6bb5ff"),
];

#[derive(Debug, Error)]
pub enum PuzzleError {
    #[error("invalid {kind} puzzle data: {source}")]
    InvalidData {
        kind: &'static str,
        source: serde_json::Error,
    },
    #[error("jigsaw grid must be at least 1x1, got {rows}x{cols}")]
    EmptyGrid { rows: u32, cols: u32 },
    #[error("jigsaw grid {rows}x{cols} exceeds {max} tiles")]
    GridTooLarge { rows: u32, cols: u32, max: usize },
    #[error("jigsaw puzzle has no image")]
    MissingImage,
    #[error("{kind} puzzle does not accept '{input}' input")]
    UnsupportedInput {
        kind: &'static str,
        input: &'static str,
    },
    #[error("input rejected: {0}")]
    Rejected(String),
}

/// The closed set of puzzle kinds. Unknown `type` tags become `Inert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleKind {
    Sorting,
    Pattern,
    Jigsaw,
    Inert,
}

impl PuzzleKind {
    pub fn from_tag(tag: Option<&str>) -> PuzzleKind {
        match tag {
            Some("sorting") => Self::Sorting,
            Some("pattern") => Self::Pattern,
            Some("jigsaw") => Self::Jigsaw,
            _ => Self::Inert,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sorting => "sorting",
            Self::Pattern => "pattern",
            Self::Jigsaw => "jigsaw",
            Self::Inert => "inert",
        }
    }
}

/// Result of evaluating a puzzle's working state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PuzzleOutcome {
    /// Not decided yet (incomplete input, or nothing to evaluate).
    Pending,
    /// Wrong answer. `attempts_left` is only tracked by bounded puzzles;
    /// `Some(0)` means no retries remain until a reset.
    Failed { attempts_left: Option<u32> },
    Solved { next: Option<SceneId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    #[serde(flatten)]
    pub outcome: PuzzleOutcome,
    pub message: String,
}

impl Submission {
    fn pending(message: impl Into<String>) -> Self {
        Self {
            outcome: PuzzleOutcome::Pending,
            message: message.into(),
        }
    }

    fn failed(attempts_left: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            outcome: PuzzleOutcome::Failed { attempts_left },
            message: message.into(),
        }
    }

    fn solved(next: Option<SceneId>, message: impl Into<String>) -> Self {
        Self {
            outcome: PuzzleOutcome::Solved { next },
            message: message.into(),
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self.outcome, PuzzleOutcome::Solved { .. })
    }

    pub fn attempts_remaining(&self) -> Option<u32> {
        match self.outcome {
            PuzzleOutcome::Failed { attempts_left } => attempts_left,
            _ => None,
        }
    }
}

/// A single player interaction with a puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum PuzzleInput {
    /// Sorting: append a card to the chosen order.
    Select(String),
    /// Sorting: take the card at this position out of the chosen order.
    Deselect(usize),
    /// Pattern: enter one symbol.
    Press(String),
    /// Jigsaw: pick a tile; the second pick swaps.
    Pick(usize),
}

impl PuzzleInput {
    fn name(&self) -> &'static str {
        match self {
            Self::Select(_) => "select",
            Self::Deselect(_) => "deselect",
            Self::Press(_) => "press",
            Self::Pick(_) => "pick",
        }
    }
}

/// What every puzzle kind can do.
pub trait PuzzleMechanics {
    /// Evaluate the current working state.
    fn submit(&mut self) -> Submission;
    /// Return to the initial unsolved state.
    fn reset(&mut self);
    /// Drop the working input but keep attempt counters.
    fn clear_input(&mut self);
    fn is_solved(&self) -> bool;
}

fn already_solved() -> PuzzleError {
    PuzzleError::Rejected("puzzle already solved".to_string())
}

fn parse_data<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    spec: &PuzzleSpec,
) -> Result<T, PuzzleError> {
    serde_json::from_value(Value::Object(spec.data.clone()))
        .map_err(|source| PuzzleError::InvalidData { kind, source })
}

/// Codes may be written as numbers or strings.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SortingData {
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    correct_order: Vec<String>,
    #[serde(default)]
    code: Option<Value>,
}

/// Build an order from a fixed pool of cards, each usable once.
#[derive(Debug, Clone)]
pub struct SortingPuzzle {
    items: Vec<String>,
    correct_order: Vec<String>,
    code: Option<String>,
    fail_text: Option<String>,
    success_next: Option<SceneId>,
    selected: Vec<String>,
    solved: bool,
}

impl SortingPuzzle {
    fn from_spec(spec: &PuzzleSpec) -> Result<Self, PuzzleError> {
        let data: SortingData = parse_data("sorting", spec)?;
        Ok(Self {
            items: data.items,
            correct_order: data.correct_order,
            code: data.code.as_ref().filter(|v| !v.is_null()).map(scalar_text),
            fail_text: spec.fail_text.clone(),
            success_next: spec.success_next.clone(),
            selected: Vec::new(),
            solved: false,
        })
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Cards still in the pool.
    pub fn available(&self) -> impl Iterator<Item = &String> {
        self.items.iter().filter(|item| !self.selected.contains(item))
    }

    pub fn select(&mut self, item: &str) -> Result<(), PuzzleError> {
        if self.solved {
            return Err(already_solved());
        }
        if !self.items.iter().any(|i| i == item) {
            return Err(PuzzleError::Rejected(format!("'{item}' is not one of the cards")));
        }
        if self.selected.iter().any(|s| s == item) {
            return Err(PuzzleError::Rejected(format!("'{item}' is already placed")));
        }
        self.selected.push(item.to_string());
        Ok(())
    }

    pub fn deselect(&mut self, position: usize) -> Result<String, PuzzleError> {
        if self.solved {
            return Err(already_solved());
        }
        if position >= self.selected.len() {
            return Err(PuzzleError::Rejected(format!("no card at position {position}")));
        }
        Ok(self.selected.remove(position))
    }
}

impl PuzzleMechanics for SortingPuzzle {
    fn submit(&mut self) -> Submission {
        if self.solved {
            return Submission::solved(self.success_next.clone(), SORTING_SOLVED);
        }
        if self.selected.len() != self.correct_order.len() {
            return Submission::pending(SORTING_INCOMPLETE);
        }
        if self.selected == self.correct_order {
            self.solved = true;
            let message = match &self.code {
                Some(code) => format!("{SORTING_SOLVED} Código: {code}"),
                None => SORTING_SOLVED.to_string(),
            };
            Submission::solved(self.success_next.clone(), message)
        } else {
            Submission::failed(None, self.fail_text.as_deref().unwrap_or(SORTING_FAILED))
        }
    }

    fn reset(&mut self) {
        self.selected.clear();
        self.solved = false;
    }

    fn clear_input(&mut self) {
        if !self.solved {
            self.selected.clear();
        }
    }

    fn is_solved(&self) -> bool {
        self.solved
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatternData {
    #[serde(default)]
    sequence: Vec<String>,
    #[serde(default)]
    colors: Option<FxHashMap<String, String>>,
    #[serde(default)]
    max_attempts: Option<u32>,
}

/// Repeat a symbol sequence with a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct PatternPuzzle {
    sequence: Vec<String>,
    options: Vec<String>,
    colors: FxHashMap<String, String>,
    max_attempts: u32,
    fail_text: Option<String>,
    success_next: Option<SceneId>,
    attempt: u32,
    input: Vec<String>,
    solved: bool,
    exhausted: bool,
}

impl PatternPuzzle {
    fn from_spec(spec: &PuzzleSpec) -> Result<Self, PuzzleError> {
        let data: PatternData = parse_data("pattern", spec)?;

        let mut options: Vec<String> = Vec::new();
        for symbol in &data.sequence {
            if !options.contains(symbol) {
                options.push(symbol.clone());
            }
        }

        let colors = data.colors.unwrap_or_else(|| {
            DEFAULT_PATTERN_COLORS
                .iter()
                .map(|(symbol, color)| (symbol.to_string(), color.to_string()))
                .collect()
        });

        Ok(Self {
            sequence: data.sequence,
            options,
            colors,
            max_attempts: data
                .max_attempts
                .filter(|max| *max > 0)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            fail_text: spec.fail_text.clone(),
            success_next: spec.success_next.clone(),
            attempt: 0,
            input: Vec::new(),
            solved: false,
            exhausted: false,
        })
    }

    pub fn sequence(&self) -> &[String] {
        &self.sequence
    }

    /// Distinct symbols, in order of first appearance in the sequence.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn color_of(&self, symbol: &str) -> Option<&str> {
        self.colors.get(symbol).map(String::as_str)
    }

    pub fn input(&self) -> &[String] {
        &self.input
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// All attempts used without solving; only `reset` reopens the puzzle.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn press(&mut self, symbol: &str) -> Result<(), PuzzleError> {
        if self.solved {
            return Err(already_solved());
        }
        if self.exhausted {
            return Err(PuzzleError::Rejected("no attempts left".to_string()));
        }
        if !self.options.iter().any(|o| o == symbol) {
            return Err(PuzzleError::Rejected(format!("'{symbol}' is not part of the pattern")));
        }
        self.input.push(symbol.to_string());
        Ok(())
    }

    fn exhausted_submission(&self) -> Submission {
        Submission::failed(Some(0), self.fail_text.as_deref().unwrap_or(PATTERN_EXHAUSTED))
    }
}

impl PuzzleMechanics for PatternPuzzle {
    fn submit(&mut self) -> Submission {
        if self.solved {
            return Submission::solved(self.success_next.clone(), PATTERN_SOLVED);
        }
        if self.exhausted {
            return self.exhausted_submission();
        }
        if self.input.len() != self.sequence.len() {
            return Submission::pending(PATTERN_INCOMPLETE);
        }

        self.attempt += 1;
        if self.input == self.sequence {
            self.solved = true;
            return Submission::solved(self.success_next.clone(), PATTERN_SOLVED);
        }

        self.input.clear();
        if self.attempt >= self.max_attempts {
            self.exhausted = true;
            debug!(attempts = self.attempt, "pattern puzzle exhausted");
            self.exhausted_submission()
        } else {
            Submission::failed(
                Some(self.max_attempts - self.attempt),
                format!(
                    "Patrón incorrecto. Intento {}/{}.",
                    self.attempt, self.max_attempts
                ),
            )
        }
    }

    /// Restores the full attempt budget, even after exhaustion.
    fn reset(&mut self) {
        self.attempt = 0;
        self.input.clear();
        self.solved = false;
        self.exhausted = false;
    }

    fn clear_input(&mut self) {
        self.input.clear();
    }

    fn is_solved(&self) -> bool {
        self.solved
    }
}

// ---------------------------------------------------------------------------
// Jigsaw
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JigsawData {
    #[serde(default)]
    rows: Option<u32>,
    #[serde(default)]
    cols: Option<u32>,
    #[serde(default)]
    image: Option<String>,
}

/// A shuffled `rows x cols` grid, solved by swapping tiles two at a time.
#[derive(Debug, Clone)]
pub struct JigsawPuzzle {
    rows: u32,
    cols: u32,
    image: String,
    success_next: Option<SceneId>,
    tile_count: usize,
    /// `tiles[slot]` is the original index of the tile now in `slot`.
    tiles: Vec<usize>,
    pending: Option<usize>,
    solved: bool,
    rng: StdRng,
}

impl JigsawPuzzle {
    fn from_spec(spec: &PuzzleSpec, rng: StdRng) -> Result<Self, PuzzleError> {
        let data: JigsawData = parse_data("jigsaw", spec)?;
        let rows = data.rows.unwrap_or(DEFAULT_JIGSAW_SIZE);
        let cols = data.cols.unwrap_or(DEFAULT_JIGSAW_SIZE);
        if rows == 0 || cols == 0 {
            return Err(PuzzleError::EmptyGrid { rows, cols });
        }
        let tile_count = rows
            .checked_mul(cols)
            .and_then(|total| usize::try_from(total).ok())
            .filter(|&total| total <= MAX_JIGSAW_TILES)
            .ok_or(PuzzleError::GridTooLarge {
                rows,
                cols,
                max: MAX_JIGSAW_TILES,
            })?;
        let image = data
            .image
            .filter(|image| !image.is_empty())
            .ok_or(PuzzleError::MissingImage)?;

        let mut puzzle = Self {
            rows,
            cols,
            image,
            success_next: spec.success_next.clone(),
            tile_count,
            tiles: Vec::new(),
            pending: None,
            solved: false,
            rng,
        };
        puzzle.shuffle();
        Ok(puzzle)
    }

    /// Uniform shuffle, repeated until the grid starts out of order.
    fn shuffle(&mut self) {
        self.tiles = (0..self.tile_count).collect();
        if self.tile_count < 2 {
            return;
        }
        while self.is_in_order() {
            self.tiles.shuffle(&mut self.rng);
        }
    }

    fn is_in_order(&self) -> bool {
        self.tiles.iter().enumerate().all(|(slot, &tile)| slot == tile)
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn tiles(&self) -> &[usize] {
        &self.tiles
    }

    /// The first tile of a swap in progress.
    pub fn pending_pick(&self) -> Option<usize> {
        self.pending
    }

    /// `(row, col)` of the picture fragment currently shown in `slot`.
    pub fn source_cell(&self, slot: usize) -> Option<(u32, u32)> {
        let tile = *self.tiles.get(slot)? as u32;
        Some((tile / self.cols, tile % self.cols))
    }

    /// True when every tile sits at its original index.
    pub fn check_solved(&self) -> bool {
        self.is_in_order()
    }

    /// Pick a tile. The first pick is remembered; the second swaps the two
    /// tiles, clears the pick and returns the evaluation.
    pub fn pick(&mut self, slot: usize) -> Result<Option<Submission>, PuzzleError> {
        if self.solved {
            return Err(already_solved());
        }
        if slot >= self.tiles.len() {
            return Err(PuzzleError::Rejected(format!("no tile at slot {slot}")));
        }
        match self.pending.take() {
            None => {
                self.pending = Some(slot);
                Ok(None)
            }
            Some(first) => {
                self.tiles.swap(first, slot);
                Ok(Some(self.submit()))
            }
        }
    }
}

impl PuzzleMechanics for JigsawPuzzle {
    fn submit(&mut self) -> Submission {
        if self.solved || self.check_solved() {
            self.solved = true;
            self.pending = None;
            Submission::solved(self.success_next.clone(), JIGSAW_SOLVED)
        } else {
            Submission::pending("")
        }
    }

    /// Reshuffles; a jigsaw never restarts from the same layout.
    fn reset(&mut self) {
        self.pending = None;
        self.solved = false;
        self.shuffle();
    }

    fn clear_input(&mut self) {
        self.pending = None;
    }

    fn is_solved(&self) -> bool {
        self.solved
    }
}

// ---------------------------------------------------------------------------
// Inert
// ---------------------------------------------------------------------------

/// Informational puzzle with no gameplay: continuing is always allowed
/// when the config names a `successNext`.
#[derive(Debug, Clone)]
pub struct InertPuzzle {
    success_next: Option<SceneId>,
}

impl PuzzleMechanics for InertPuzzle {
    fn submit(&mut self) -> Submission {
        match &self.success_next {
            Some(next) => Submission::solved(Some(next.clone()), ""),
            None => Submission::pending(INERT_PLACEHOLDER),
        }
    }

    fn reset(&mut self) {}

    fn clear_input(&mut self) {}

    fn is_solved(&self) -> bool {
        self.success_next.is_some()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum PuzzleState {
    Sorting(SortingPuzzle),
    Pattern(PatternPuzzle),
    Jigsaw(JigsawPuzzle),
    Inert(InertPuzzle),
}

impl PuzzleState {
    fn mechanics(&self) -> &dyn PuzzleMechanics {
        match self {
            Self::Sorting(p) => p,
            Self::Pattern(p) => p,
            Self::Jigsaw(p) => p,
            Self::Inert(p) => p,
        }
    }

    fn mechanics_mut(&mut self) -> &mut dyn PuzzleMechanics {
        match self {
            Self::Sorting(p) => p,
            Self::Pattern(p) => p,
            Self::Jigsaw(p) => p,
            Self::Inert(p) => p,
        }
    }

    fn kind(&self) -> PuzzleKind {
        match self {
            Self::Sorting(_) => PuzzleKind::Sorting,
            Self::Pattern(_) => PuzzleKind::Pattern,
            Self::Jigsaw(_) => PuzzleKind::Jigsaw,
            Self::Inert(_) => PuzzleKind::Inert,
        }
    }
}

/// A live puzzle built from a merged config.
#[derive(Debug, Clone)]
pub struct PuzzleSession {
    config: PuzzleSpec,
    state: PuzzleState,
    submissions: u32,
}

impl PuzzleSession {
    /// Build the runtime state for `config`. The RNG seeds the jigsaw's own
    /// shuffler so resets stay reproducible under a fixed engine seed.
    pub fn instantiate<R: Rng>(
        config: PuzzleSpec,
        rng: &mut R,
    ) -> Result<PuzzleSession, PuzzleError> {
        let state = match PuzzleKind::from_tag(config.kind.as_deref()) {
            PuzzleKind::Sorting => PuzzleState::Sorting(SortingPuzzle::from_spec(&config)?),
            PuzzleKind::Pattern => PuzzleState::Pattern(PatternPuzzle::from_spec(&config)?),
            PuzzleKind::Jigsaw => PuzzleState::Jigsaw(JigsawPuzzle::from_spec(
                &config,
                StdRng::seed_from_u64(rng.gen()),
            )?),
            PuzzleKind::Inert => PuzzleState::Inert(InertPuzzle {
                success_next: config.success_next.clone(),
            }),
        };

        Ok(PuzzleSession {
            config,
            state,
            submissions: 0,
        })
    }

    pub fn kind(&self) -> PuzzleKind {
        self.state.kind()
    }

    pub fn config(&self) -> &PuzzleSpec {
        &self.config
    }

    pub fn title(&self) -> &str {
        self.config.title.as_deref().unwrap_or("Reto activo")
    }

    pub fn description(&self) -> &str {
        self.config
            .description
            .as_deref()
            .unwrap_or("Resuelve el reto para continuar.")
    }

    pub fn hint(&self) -> &str {
        self.config.hint_text().unwrap_or("")
    }

    pub fn state(&self) -> &PuzzleState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PuzzleState {
        &mut self.state
    }

    pub fn submit(&mut self) -> Submission {
        self.submissions += 1;
        self.state.mechanics_mut().submit()
    }

    pub fn reset(&mut self) {
        self.state.mechanics_mut().reset();
    }

    pub fn is_solved(&self) -> bool {
        self.state.mechanics().is_solved()
    }

    /// Pattern puzzles that ran out of attempts.
    pub fn is_exhausted(&self) -> bool {
        matches!(&self.state, PuzzleState::Pattern(p) if p.is_exhausted())
    }

    /// Attempts used: the pattern attempt counter, otherwise submissions.
    pub fn attempts(&self) -> u32 {
        match &self.state {
            PuzzleState::Pattern(p) => p.attempt(),
            _ => self.submissions,
        }
    }

    /// Where "continue" leads, once the puzzle allows it.
    pub fn continue_target(&self) -> Option<&SceneId> {
        if self.is_solved() {
            self.config.success_next.as_ref()
        } else {
            None
        }
    }

    /// Apply one interaction. Returns a submission when the interaction
    /// itself completes an evaluation (a jigsaw swap).
    pub fn apply(&mut self, input: PuzzleInput) -> Result<Option<Submission>, PuzzleError> {
        let kind = self.kind().name();
        let unsupported = |input: &PuzzleInput| PuzzleError::UnsupportedInput {
            kind,
            input: input.name(),
        };

        match (&mut self.state, input) {
            (PuzzleState::Sorting(p), PuzzleInput::Select(item)) => p.select(&item).map(|_| None),
            (PuzzleState::Sorting(p), PuzzleInput::Deselect(position)) => {
                p.deselect(position).map(|_| None)
            }
            (PuzzleState::Pattern(p), PuzzleInput::Press(symbol)) => p.press(&symbol).map(|_| None),
            (PuzzleState::Jigsaw(p), PuzzleInput::Pick(slot)) => {
                let result = p.pick(slot)?;
                if result.is_some() {
                    self.submissions += 1;
                }
                Ok(result)
            }
            (_, input) => Err(unsupported(&input)),
        }
    }

    /// Replace the working input with `inputs` and evaluate it.
    pub fn submit_selection(
        &mut self,
        inputs: impl IntoIterator<Item = PuzzleInput>,
    ) -> Result<Submission, PuzzleError> {
        self.state.mechanics_mut().clear_input();
        for input in inputs {
            if let Some(submission) = self.apply(input)? {
                if submission.is_solved() {
                    return Ok(submission);
                }
            }
        }
        Ok(self.submit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn session(spec: Value) -> PuzzleSession {
        let spec: PuzzleSpec = serde_json::from_value(spec).unwrap();
        PuzzleSession::instantiate(spec, &mut rng()).unwrap()
    }

    fn sorting() -> PuzzleSession {
        session(json!({
            "type": "sorting",
            "successNext": "after",
            "data": { "items": ["c", "a", "b"], "correctOrder": ["a", "b", "c"] }
        }))
    }

    fn pattern() -> PuzzleSession {
        session(json!({
            "type": "pattern",
            "successNext": "after",
            "data": { "sequence": ["rojo", "azul", "rojo"], "maxAttempts": 3 }
        }))
    }

    fn jigsaw(rows: u32, cols: u32) -> PuzzleSession {
        session(json!({
            "type": "jigsaw",
            "successNext": "after",
            "data": { "rows": rows, "cols": cols, "image": "img/p.png" }
        }))
    }

    fn select_all(items: &[&str]) -> Vec<PuzzleInput> {
        items.iter().map(|i| PuzzleInput::Select(i.to_string())).collect()
    }

    fn press_all(symbols: &[&str]) -> Vec<PuzzleInput> {
        symbols.iter().map(|s| PuzzleInput::Press(s.to_string())).collect()
    }

    #[test]
    fn sorting_wrong_order_fails() {
        let mut p = sorting();
        let result = p.submit_selection(select_all(&["b", "c", "a"])).unwrap();
        assert_eq!(result.outcome, PuzzleOutcome::Failed { attempts_left: None });
        assert!(!p.is_solved());
    }

    #[test]
    fn sorting_right_order_solves() {
        let mut p = sorting();
        let result = p.submit_selection(select_all(&["a", "b", "c"])).unwrap();
        assert_eq!(
            result.outcome,
            PuzzleOutcome::Solved {
                next: Some(SceneId::from("after"))
            }
        );
        assert_eq!(p.continue_target(), Some(&SceneId::from("after")));
    }

    #[test]
    fn sorting_partial_selection_is_pending() {
        let mut p = sorting();
        p.apply(PuzzleInput::Select("a".to_string())).unwrap();
        let result = p.submit();
        assert_eq!(result.outcome, PuzzleOutcome::Pending);
        assert_eq!(result.message, SORTING_INCOMPLETE);
    }

    #[test]
    fn sorting_items_are_usable_once() {
        let mut p = sorting();
        p.apply(PuzzleInput::Select("a".to_string())).unwrap();
        assert!(p.apply(PuzzleInput::Select("a".to_string())).is_err());
        assert!(p.apply(PuzzleInput::Select("z".to_string())).is_err());
        let PuzzleState::Sorting(s) = p.state() else {
            panic!("expected sorting state");
        };
        assert_eq!(s.available().cloned().collect::<Vec<_>>(), vec!["c", "b"]);
    }

    #[test]
    fn sorting_deselect_and_reset() {
        let mut p = sorting();
        p.apply(PuzzleInput::Select("b".to_string())).unwrap();
        p.apply(PuzzleInput::Select("a".to_string())).unwrap();
        p.apply(PuzzleInput::Deselect(0)).unwrap();
        let PuzzleState::Sorting(s) = p.state() else {
            panic!("expected sorting state");
        };
        assert_eq!(s.selected(), ["a".to_string()]);
        p.reset();
        let PuzzleState::Sorting(s) = p.state() else {
            panic!("expected sorting state");
        };
        assert!(s.selected().is_empty());
    }

    #[test]
    fn sorting_code_and_fail_text() {
        let mut p = session(json!({
            "type": "sorting",
            "failText": "Nope",
            "data": { "items": ["x", "y"], "correctOrder": ["x", "y"], "code": 1927 }
        }));
        let wrong = p.submit_selection(select_all(&["y", "x"])).unwrap();
        assert_eq!(wrong.message, "Nope");
        let right = p.submit_selection(select_all(&["x", "y"])).unwrap();
        assert_eq!(right.message, "¡Orden correcto! Código: 1927");
        assert_eq!(right.outcome, PuzzleOutcome::Solved { next: None });
        assert_eq!(p.continue_target(), None);
    }

    #[test]
    fn pattern_exhausts_after_max_attempts() {
        let mut p = pattern();
        let first = p.submit_selection(press_all(&["azul", "azul", "azul"])).unwrap();
        assert_eq!(first.attempts_remaining(), Some(2));
        assert_eq!(first.message, "Patrón incorrecto. Intento 1/3.");
        p.submit_selection(press_all(&["azul", "rojo", "azul"])).unwrap();
        let third = p.submit_selection(press_all(&["rojo", "rojo", "rojo"])).unwrap();
        assert_eq!(third.attempts_remaining(), Some(0));
        assert!(p.is_exhausted());
        assert_eq!(p.continue_target(), None);

        // The right answer no longer counts once exhausted.
        assert!(p.submit_selection(press_all(&["rojo"])).is_err());
        assert_eq!(p.submit().outcome, PuzzleOutcome::Failed { attempts_left: Some(0) });

        p.reset();
        assert_eq!(p.attempts(), 0);
        assert!(!p.is_exhausted());
        let solved = p.submit_selection(press_all(&["rojo", "azul", "rojo"])).unwrap();
        assert!(solved.is_solved());
        assert_eq!(p.continue_target(), Some(&SceneId::from("after")));
    }

    #[test]
    fn pattern_failed_attempt_clears_input() {
        let mut p = pattern();
        for symbol in ["azul", "azul", "azul"] {
            p.apply(PuzzleInput::Press(symbol.to_string())).unwrap();
        }
        p.submit();
        let PuzzleState::Pattern(state) = p.state() else {
            panic!("expected pattern state");
        };
        assert!(state.input().is_empty());
        assert_eq!(state.attempt(), 1);
    }

    #[test]
    fn pattern_incomplete_input_does_not_consume_attempt() {
        let mut p = pattern();
        p.apply(PuzzleInput::Press("rojo".to_string())).unwrap();
        let result = p.submit();
        assert_eq!(result.outcome, PuzzleOutcome::Pending);
        assert_eq!(p.attempts(), 0);
    }

    #[test]
    fn pattern_options_and_colors() {
        let p = pattern();
        let PuzzleState::Pattern(state) = p.state() else {
            panic!("expected pattern state");
        };
        assert_eq!(state.options(), ["rojo".to_string(), "azul".to_string()]);
        assert_eq!(state.color_of("azul"), Some("#6bff6b"));
        assert_eq!(state.max_attempts(), DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn pattern_zero_max_attempts_means_default() {
        let p = session(json!({
            "type": "pattern",
            "data": { "sequence": ["a"], "maxAttempts": 0 }
        }));
        let PuzzleState::Pattern(state) = p.state() else {
            panic!("expected pattern state");
        };
        assert_eq!(state.max_attempts(), 3);
    }

    fn solve_by_swaps(p: &mut PuzzleSession) -> Option<Submission> {
        let mut last = None;
        let total = match p.state() {
            PuzzleState::Jigsaw(j) => j.tiles().len(),
            _ => panic!("expected jigsaw state"),
        };
        for slot in 0..total {
            let from = match p.state() {
                PuzzleState::Jigsaw(j) => j.tiles().iter().position(|&t| t == slot).unwrap(),
                _ => unreachable!(),
            };
            if from != slot {
                assert!(p.apply(PuzzleInput::Pick(slot)).unwrap().is_none());
                last = p.apply(PuzzleInput::Pick(from)).unwrap();
            }
        }
        last
    }

    #[test]
    fn jigsaw_starts_shuffled_and_solves_by_swaps() {
        let mut p = jigsaw(2, 2);
        let PuzzleState::Jigsaw(state) = p.state() else {
            panic!("expected jigsaw state");
        };
        assert!(!state.check_solved());
        let mut sorted = state.tiles().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);

        let last = solve_by_swaps(&mut p).unwrap();
        assert!(last.is_solved());
        assert!(p.is_solved());
        assert_eq!(p.continue_target(), Some(&SceneId::from("after")));
    }

    #[test]
    fn jigsaw_any_deviation_is_not_solved() {
        let mut p = jigsaw(2, 2);
        solve_by_swaps(&mut p);
        let PuzzleState::Jigsaw(state) = p.state_mut() else {
            panic!("expected jigsaw state");
        };
        state.tiles.swap(1, 2);
        assert!(!state.check_solved());
    }

    #[test]
    fn jigsaw_first_pick_is_pending_and_same_tile_clears() {
        let mut p = jigsaw(3, 3);
        assert!(p.apply(PuzzleInput::Pick(4)).unwrap().is_none());
        let before = match p.state() {
            PuzzleState::Jigsaw(j) => j.tiles().to_vec(),
            _ => unreachable!(),
        };
        p.apply(PuzzleInput::Pick(4)).unwrap();
        let PuzzleState::Jigsaw(state) = p.state() else {
            panic!("expected jigsaw state");
        };
        assert_eq!(state.tiles(), before.as_slice());
        assert_eq!(state.pending_pick(), None);
        assert!(p.clone().apply(PuzzleInput::Pick(9)).is_err());
    }

    #[test]
    fn jigsaw_reset_reshuffles() {
        let mut p = jigsaw(2, 2);
        solve_by_swaps(&mut p);
        p.reset();
        assert!(!p.is_solved());
        let PuzzleState::Jigsaw(state) = p.state() else {
            panic!("expected jigsaw state");
        };
        assert!(!state.check_solved());
    }

    #[test]
    fn jigsaw_requires_image_and_cells() {
        let spec: PuzzleSpec =
            serde_json::from_value(json!({ "type": "jigsaw", "data": { "rows": 2 } })).unwrap();
        assert!(matches!(
            PuzzleSession::instantiate(spec, &mut rng()),
            Err(PuzzleError::MissingImage)
        ));
        let spec: PuzzleSpec = serde_json::from_value(
            json!({ "type": "jigsaw", "data": { "rows": 0, "image": "x.png" } }),
        )
        .unwrap();
        assert!(matches!(
            PuzzleSession::instantiate(spec, &mut rng()),
            Err(PuzzleError::EmptyGrid { .. })
        ));
    }

    #[test]
    fn jigsaw_rejects_oversized_grids() {
        for (rows, cols) in [(65536, 65536), (33, 32)] {
            let spec: PuzzleSpec = serde_json::from_value(json!({
                "type": "jigsaw",
                "data": { "rows": rows, "cols": cols, "image": "x.png" }
            }))
            .unwrap();
            assert!(matches!(
                PuzzleSession::instantiate(spec, &mut rng()),
                Err(PuzzleError::GridTooLarge { max: MAX_JIGSAW_TILES, .. })
            ));
        }
        assert!(matches!(jigsaw(32, 32).state(), PuzzleState::Jigsaw(_)));
    }

    #[test]
    fn jigsaw_source_cells() {
        let p = jigsaw(2, 3);
        let PuzzleState::Jigsaw(state) = p.state() else {
            panic!("expected jigsaw state");
        };
        let tile = state.tiles()[0] as u32;
        assert_eq!(state.source_cell(0), Some((tile / 3, tile % 3)));
        assert_eq!(state.source_cell(6), None);
    }

    #[test]
    fn inert_puzzle_continues_immediately() {
        let mut p = session(json!({ "type": "riddle", "successNext": "after" }));
        assert_eq!(p.kind(), PuzzleKind::Inert);
        assert!(p.is_solved());
        assert_eq!(p.continue_target(), Some(&SceneId::from("after")));
        assert!(p.submit().is_solved());

        let mut stuck = session(json!({}));
        assert_eq!(stuck.submit().message, INERT_PLACEHOLDER);
        assert_eq!(stuck.continue_target(), None);
    }

    #[test]
    fn mismatched_input_is_rejected() {
        let mut p = sorting();
        assert!(matches!(
            p.apply(PuzzleInput::Pick(0)),
            Err(PuzzleError::UnsupportedInput { kind: "sorting", input: "pick" })
        ));
    }

    #[test]
    fn malformed_data_is_reported() {
        let spec: PuzzleSpec = serde_json::from_value(
            json!({ "type": "sorting", "data": { "items": "abc" } }),
        )
        .unwrap();
        assert!(matches!(
            PuzzleSession::instantiate(spec, &mut rng()),
            Err(PuzzleError::InvalidData { kind: "sorting", .. })
        ));
    }

    #[test]
    fn puzzle_input_from_json() {
        let input: PuzzleInput =
            serde_json::from_value(json!({ "action": "press", "value": "rojo" })).unwrap();
        assert_eq!(input, PuzzleInput::Press("rojo".to_string()));
    }
}
