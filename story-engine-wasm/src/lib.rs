//! WASM bindings for story-engine, used by the browser front end.
//!
//! Every method takes and returns JSON text so the page never deals with
//! Rust types directly.

use std::sync::mpsc::Receiver;
use wasm_bindgen::prelude::*;

use story_engine::core::config::EngineConfig;
use story_engine::core::loader::StoryData;
use story_engine::core::navigator::StoryEngine;
use story_engine::core::notifier::ChannelSink;
use story_engine::core::progress::{MemoryStore, ProgressStore, StoreError};
use story_engine::core::puzzle::{PuzzleInput, PuzzleSession, PuzzleState};
use story_engine::schema::event::AnalyticsEvent;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PuzzleInfo {
    kind: &'static str,
    title: String,
    description: String,
    hint: String,
    attempts: u32,
    solved: bool,
    exhausted: bool,
    board: Board,
}

#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Board {
    Sorting {
        available: Vec<String>,
        selected: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Pattern {
        options: Vec<SymbolInfo>,
        input: Vec<String>,
        attempt: u32,
        max_attempts: u32,
    },
    #[serde(rename_all = "camelCase")]
    Jigsaw {
        rows: u32,
        cols: u32,
        image: String,
        tiles: Vec<usize>,
        pending_pick: Option<usize>,
    },
    Inert {
        continuable: bool,
    },
}

#[derive(serde::Serialize)]
struct SymbolInfo {
    symbol: String,
    color: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentInfo {
    id: String,
    name: Option<String>,
    active: bool,
}

// ---------------------------------------------------------------------------
// Browser localStorage as the progress store
// ---------------------------------------------------------------------------
struct LocalStorageStore {
    storage: web_sys::Storage,
}

impl LocalStorageStore {
    /// `None` outside a window or when the browser denies storage access.
    fn open() -> Option<LocalStorageStore> {
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(LocalStorageStore { storage })
    }
}

fn storage_error(err: JsValue) -> StoreError {
    StoreError::Unavailable(format!("localStorage: {err:?}"))
}

impl ProgressStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage.get_item(key).map_err(storage_error)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage.set_item(key, value).map_err(storage_error)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.storage.remove_item(key).map_err(storage_error)
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------
fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

fn puzzle_info(engine: &StoryEngine, puzzle: &PuzzleSession) -> PuzzleInfo {
    let board = match puzzle.state() {
        PuzzleState::Sorting(sorting) => Board::Sorting {
            available: sorting.available().cloned().collect(),
            selected: sorting.selected().to_vec(),
        },
        PuzzleState::Pattern(pattern) => Board::Pattern {
            options: pattern
                .options()
                .iter()
                .map(|symbol| SymbolInfo {
                    symbol: symbol.clone(),
                    color: pattern.color_of(symbol).map(str::to_string),
                })
                .collect(),
            input: pattern.input().to_vec(),
            attempt: pattern.attempt(),
            max_attempts: pattern.max_attempts(),
        },
        PuzzleState::Jigsaw(jigsaw) => Board::Jigsaw {
            rows: jigsaw.rows(),
            cols: jigsaw.cols(),
            image: jigsaw.image().to_string(),
            tiles: jigsaw.tiles().to_vec(),
            pending_pick: jigsaw.pending_pick(),
        },
        PuzzleState::Inert(_) => Board::Inert {
            continuable: puzzle.continue_target().is_some(),
        },
    };

    PuzzleInfo {
        kind: puzzle.kind().name(),
        title: engine.render_text(puzzle.title()),
        description: engine.render_text(puzzle.description()),
        hint: engine.render_text(puzzle.hint()),
        attempts: puzzle.attempts(),
        solved: puzzle.is_solved(),
        exhausted: puzzle.is_exhausted(),
        board,
    }
}

// ---------------------------------------------------------------------------
// StoryPlayer: the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StoryPlayer {
    engine: StoryEngine,
    events: Receiver<AnalyticsEvent>,
    persistent: bool,
}

#[wasm_bindgen]
impl StoryPlayer {
    /// Build a player from the three story documents.
    ///
    /// `agent` and `scene` usually come from the page's query string.
    /// `config_ron` may be empty to use the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(
        story_json: &str,
        agents_json: &str,
        puzzles_json: &str,
        agent: Option<String>,
        scene: Option<String>,
        config_ron: &str,
    ) -> Result<StoryPlayer, JsError> {
        let config = if config_ron.trim().is_empty() {
            EngineConfig::default()
        } else {
            EngineConfig::parse_ron(config_ron)
                .map_err(|e| JsError::new(&format!("Config parse error: {e}")))?
        };

        let data = StoryData::from_json(
            story_json,
            agents_json,
            puzzles_json,
            &config.start_scene_fallback,
        )
        .map_err(|e| JsError::new(&format!("{}: {e}", e.user_message())))?;

        let (sink, events) = ChannelSink::new();
        let builder = StoryEngine::builder()
            .with_config(config)
            .with_data(data)
            .agent(agent.as_deref())
            .resume_scene(scene.as_deref())
            .with_sink(sink);
        // Without localStorage, progress lasts for this page only.
        let (builder, persistent) = match LocalStorageStore::open() {
            Some(store) => (builder.with_store(store), true),
            None => (builder.with_store(MemoryStore::new()), false),
        };
        let engine = builder
            .build()
            .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;

        Ok(StoryPlayer {
            engine,
            events,
            persistent,
        })
    }

    /// Enter the entry scene. Returns the scene view as JSON.
    pub fn start(&mut self) -> Result<String, JsError> {
        let view = self
            .engine
            .start_mission()
            .map_err(|e| JsError::new(&e.diagnostic()))?;
        to_json(&view)
    }

    /// Take choice `index` (0-based) on the current scene.
    pub fn choose(&mut self, index: usize) -> Result<String, JsError> {
        let view = self
            .engine
            .choose_current(index)
            .map_err(|e| JsError::new(&e.diagnostic()))?;
        to_json(&view)
    }

    pub fn back(&mut self) -> Result<String, JsError> {
        let view = self.engine.back().map_err(|e| JsError::new(&e.diagnostic()))?;
        to_json(&view)
    }

    pub fn reset(&mut self) -> Result<String, JsError> {
        let view = self.engine.reset().map_err(|e| JsError::new(&e.diagnostic()))?;
        to_json(&view)
    }

    pub fn can_go_back(&self) -> bool {
        self.engine.can_go_back()
    }

    /// Visit token of the current scene. Timers started for a scene should
    /// check `is_current_visit` before firing.
    pub fn current_visit(&self) -> u64 {
        self.engine.current_visit().0
    }

    pub fn is_current_visit(&self, token: u64) -> bool {
        self.engine
            .is_current_visit(story_engine::core::navigator::VisitToken(token))
    }

    /// Open the current scene's puzzle. Returns the board as JSON.
    pub fn open_puzzle(&mut self) -> Result<String, JsError> {
        self.engine
            .open_puzzle()
            .map_err(|e| JsError::new(&format!("Puzzle error: {e}")))?;
        self.puzzle_state()
    }

    /// Board of the open puzzle as JSON, or `null`.
    pub fn puzzle_state(&self) -> Result<String, JsError> {
        match self.engine.puzzle() {
            Some(puzzle) => to_json(&puzzle_info(&self.engine, puzzle)),
            None => Ok("null".to_string()),
        }
    }

    /// Apply one input, e.g. `{"action": "press", "value": "rojo"}`.
    ///
    /// Returns the submission JSON when the input settled the puzzle,
    /// otherwise `null`.
    pub fn puzzle_input(&mut self, input_json: &str) -> Result<String, JsError> {
        let input: PuzzleInput = serde_json::from_str(input_json)
            .map_err(|e| JsError::new(&format!("Invalid input JSON: {e}")))?;
        let submission = self
            .engine
            .apply_puzzle_input(input)
            .map_err(|e| JsError::new(&format!("Puzzle error: {e}")))?;
        to_json(&submission)
    }

    /// Evaluate the open puzzle. Returns the submission as JSON.
    pub fn submit_puzzle(&mut self) -> Result<String, JsError> {
        let submission = self
            .engine
            .check_puzzle()
            .map_err(|e| JsError::new(&format!("Puzzle error: {e}")))?;
        to_json(&submission)
    }

    pub fn reset_puzzle(&mut self) -> Result<String, JsError> {
        self.engine
            .reset_puzzle()
            .map_err(|e| JsError::new(&format!("Puzzle error: {e}")))?;
        self.puzzle_state()
    }

    pub fn close_puzzle(&mut self) {
        self.engine.close_puzzle();
    }

    /// Follow a solved puzzle to its next scene.
    pub fn continue_puzzle(&mut self) -> Result<String, JsError> {
        let view = self
            .engine
            .continue_from_puzzle()
            .map_err(|e| JsError::new(&e.diagnostic()))?;
        to_json(&view)
    }

    /// `{found, total, percentage}` for the active agent.
    pub fn progress(&mut self) -> Result<String, JsError> {
        to_json(&self.engine.endings_progress())
    }

    pub fn reset_progress(&mut self) {
        self.engine.reset_progress();
    }

    /// False when progress is kept only for this page, either because
    /// localStorage was unavailable or because it failed during play.
    pub fn progress_persistent(&self) -> bool {
        self.persistent && !self.engine.progress_degraded()
    }

    /// JSON array of agents, with the active one flagged.
    pub fn agents(&self) -> Result<String, JsError> {
        let agents: Vec<AgentInfo> = self
            .engine
            .data()
            .agents
            .iter()
            .map(|agent| AgentInfo {
                id: agent.id.to_string(),
                name: agent.display_name().map(str::to_string),
                active: &agent.id == self.engine.agent_id(),
            })
            .collect();
        to_json(&agents)
    }

    pub fn can_switch_agent(&mut self) -> bool {
        self.engine.can_switch_agent()
    }

    /// Switch persona and restart from the beginning of the story.
    pub fn switch_agent(&mut self, id: &str) -> Result<String, JsError> {
        let view = self
            .engine
            .switch_agent(id)
            .map_err(|e| JsError::new(&format!("Agent switch error: {e}")))?;
        to_json(&view)
    }

    /// Analytics events emitted since the last call, as a JSON array.
    pub fn drain_events(&mut self) -> Result<String, JsError> {
        let events: Vec<AnalyticsEvent> = self.events.try_iter().collect();
        to_json(&events)
    }
}
