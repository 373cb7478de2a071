//! The story engine: scene graph navigation over an explicit session state.
//!
//! Every operation resolves against [`StoryData`], renders through the
//! template engine, and reports side effects to the progress tracker and the
//! notifier. Neither of those can fail an operation; only navigation errors
//! ([`NavError`]) reach the caller, and a failed operation leaves the state
//! as it was.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::{ConfigError, EngineConfig};
use crate::core::loader::{LoadError, StoryData};
use crate::core::notifier::{Clock, EventSink, Notifier, NullSink, SystemClock};
use crate::core::progress::{MemoryStore, Progress, ProgressStore, ProgressTracker};
use crate::core::puzzle::{PuzzleError, PuzzleInput, PuzzleKind, PuzzleSession, Submission};
use crate::core::template::{self, TemplateContext};
use crate::schema::agent::{Agent, AgentId, AgentRoster};
use crate::schema::event::EventPayload;
use crate::schema::puzzle::PuzzleId;
use crate::schema::scene::{ImageRef, Scene, SceneId};

/// Trigger text for a puzzle without a title.
pub const DEFAULT_TRIGGER_TITLE: &str = "Reto activo: resuélvelo para continuar";
/// Date and place label for scenes that have none.
pub const MISSING_LABEL: &str = "—";

#[derive(Debug, Error)]
pub enum NavError {
    #[error("unknown scene: {0}")]
    UnknownScene(SceneId),
    #[error("scene {scene} has no choice {index}")]
    UnknownChoice { scene: SceneId, index: usize },
    #[error("mission not started")]
    NotStarted,
    #[error("no history to go back to")]
    NoHistory,
    #[error("back navigation is disabled")]
    BackDisabled,
    #[error("current scene has no puzzle")]
    NoPuzzle,
    #[error("puzzle is not solved")]
    PuzzleNotSolved,
    #[error("puzzle has no scene to continue to")]
    NoContinuation,
    #[error("puzzle error: {0}")]
    Puzzle(#[from] PuzzleError),
}

impl NavError {
    /// Text the presentation layer shows in place of a scene.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::UnknownScene(id) => format!("No se encuentra la escena: {id}"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("agent switching is locked until every ending is found ({found}/{total})")]
    Locked { found: usize, total: usize },
    #[error("navigation error: {0}")]
    Nav(#[from] NavError),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no story data: call with_data or data_dir")]
    MissingData,
}

/// Identifies one entry into a scene. Presentation timers started for a
/// visit should be dropped once it is no longer current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VisitToken(pub u64);

/// A rendered choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceView {
    pub index: usize,
    pub label: String,
    pub target: SceneId,
    /// False when `target` names no scene in the story.
    pub resolved: bool,
}

/// What the presentation layer shows to offer a scene's puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleTrigger {
    pub title: String,
    pub kind: PuzzleKind,
    pub puzzle_id: Option<PuzzleId>,
}

/// A scene ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneView {
    pub scene_id: SceneId,
    pub lines: Vec<String>,
    pub choices: Vec<ChoiceView>,
    pub ending: bool,
    pub puzzle: Option<PuzzleTrigger>,
    pub image: Option<String>,
    pub date_label: String,
    pub place_label: String,
}

/// Session state owned by the engine. Nothing here is persisted.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub agent_id: AgentId,
    /// Secondary personas for `friendN` placeholders, in slot order.
    pub friends: Vec<AgentId>,
    pub current: Option<SceneId>,
    pub history: Vec<SceneId>,
    pub visit: VisitToken,
    /// Live puzzle of the current scene, if the player opened it.
    pub puzzle: Option<PuzzleSession>,
}

/// `YYYY-MM-DD HH:MM` becomes `DD/MM · HH:MM`; other text passes through.
pub fn format_datetime(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return MISSING_LABEL.to_string(),
    };
    let mut parts = raw.split(' ');
    let (Some(date), Some(time)) = (parts.next(), parts.next()) else {
        return raw.to_string();
    };
    let mut ymd = date.split('-');
    match (ymd.next(), ymd.next(), ymd.next()) {
        (Some(y), Some(m), Some(d))
            if !time.is_empty() && !y.is_empty() && !m.is_empty() && !d.is_empty() =>
        {
            format!("{d}/{m} · {time}")
        }
        _ => raw.to_string(),
    }
}

/// Up to `max` agents other than `current`, in random order.
fn pick_friends(
    roster: &AgentRoster,
    current: &AgentId,
    max: usize,
    rng: &mut StdRng,
) -> Vec<AgentId> {
    let mut candidates: Vec<AgentId> = roster
        .iter()
        .filter(|agent| &agent.id != current)
        .map(|agent| agent.id.clone())
        .collect();
    candidates.shuffle(rng);
    candidates.truncate(max);
    candidates
}

/// A running story session. Built via `StoryEngine::builder()`.
pub struct StoryEngine {
    data: StoryData,
    config: EngineConfig,
    state: EngineState,
    /// Where `start_mission` begins: the resume scene or the story start.
    initial_scene: SceneId,
    progress: ProgressTracker,
    notifier: Notifier,
    rng: StdRng,
}

/// Builder for constructing a `StoryEngine`.
pub struct StoryEngineBuilder {
    data_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    agent: Option<String>,
    resume_scene: Option<String>,
    seed: Option<u64>,
    /// Directly provided story data (for testing without files).
    data: Option<StoryData>,
    config: Option<EngineConfig>,
    store: Option<Box<dyn ProgressStore>>,
    sink: Option<Box<dyn EventSink>>,
    clock: Option<Box<dyn Clock>>,
}

impl StoryEngine {
    pub fn builder() -> StoryEngineBuilder {
        StoryEngineBuilder {
            data_dir: None,
            config_path: None,
            agent: None,
            resume_scene: None,
            seed: None,
            data: None,
            config: None,
            store: None,
            sink: None,
            clock: None,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn data(&self) -> &StoryData {
        &self.data
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.state.agent_id
    }

    pub fn agent(&self) -> Option<&Agent> {
        self.data.agents.get(self.state.agent_id.as_str())
    }

    pub fn friends(&self) -> Vec<&Agent> {
        self.state
            .friends
            .iter()
            .filter_map(|id| self.data.agents.get(id.as_str()))
            .collect()
    }

    pub fn current_scene(&self) -> Option<&SceneId> {
        self.state.current.as_ref()
    }

    pub fn history(&self) -> &[SceneId] {
        &self.state.history
    }

    pub fn current_visit(&self) -> VisitToken {
        self.state.visit
    }

    /// False once the player has entered another scene (or the same scene
    /// again) since `token` was issued.
    pub fn is_current_visit(&self, token: VisitToken) -> bool {
        self.state.visit == token
    }

    pub fn can_go_back(&self) -> bool {
        self.config.show_back_button && !self.state.history.is_empty()
    }

    // -- rendering ----------------------------------------------------------

    fn template_context<'a>(&'a self, friends: &'a [&'a Agent]) -> TemplateContext<'a> {
        TemplateContext::new(self.agent(), friends).with_fallback(&self.config.fallback_text)
    }

    /// Render narrative text for the current agent and friends.
    pub fn render_text(&self, text: &str) -> String {
        let friends = self.friends();
        let ctx = self.template_context(&friends);
        template::render(text, &ctx)
    }

    /// The view of `id` as it would be rendered now, without entering it.
    pub fn view(&self, id: &str) -> Result<SceneView, NavError> {
        let scene = self.scene(id)?;
        Ok(self.build_view(scene))
    }

    /// The view of the scene the player is on.
    pub fn current_view(&self) -> Result<SceneView, NavError> {
        let current = self.state.current.as_ref().ok_or(NavError::NotStarted)?;
        self.view(current.as_str())
    }

    fn scene(&self, id: &str) -> Result<&Scene, NavError> {
        self.data
            .story
            .get(id)
            .ok_or_else(|| NavError::UnknownScene(SceneId::from(id)))
    }

    fn build_view(&self, scene: &Scene) -> SceneView {
        let friends = self.friends();
        let ctx = self.template_context(&friends);

        let lines = scene
            .visible_lines()
            .iter()
            .map(|line| template::render(line, &ctx))
            .collect();

        let choices = scene
            .choices
            .iter()
            .enumerate()
            .map(|(index, choice)| ChoiceView {
                index,
                label: template::render(&choice.text, &ctx),
                target: choice.next.clone(),
                resolved: self.data.story.contains(choice.next.as_str()),
            })
            .collect();

        let puzzle = self.data.merged_puzzle(scene).map(|spec| PuzzleTrigger {
            title: template::render(spec.title.as_deref().unwrap_or(DEFAULT_TRIGGER_TITLE), &ctx),
            kind: PuzzleKind::from_tag(spec.kind.as_deref()),
            puzzle_id: spec.id,
        });

        let image = match &scene.image {
            ImageRef::Conventional => Some(format!("{}/{}.png", self.config.scene_image_dir, scene.id)),
            ImageRef::Hidden => None,
            ImageRef::Path(path) => Some(path.clone()),
        };

        SceneView {
            scene_id: scene.id.clone(),
            lines,
            choices,
            ending: scene.ending,
            puzzle,
            image,
            date_label: format_datetime(scene.datetime.as_deref()),
            place_label: scene
                .place
                .clone()
                .filter(|place| !place.is_empty())
                .unwrap_or_else(|| MISSING_LABEL.to_string()),
        }
    }

    // -- navigation ---------------------------------------------------------

    /// Enter `id`: bump the visit, drop any live puzzle, and report the
    /// view (and the ending, if it is one).
    fn enter(&mut self, id: &str) -> Result<SceneView, NavError> {
        let scene = self.scene(id)?;
        let view = self.build_view(scene);
        let scene_id = scene.id.clone();
        let is_ending = scene.ending;
        let has_choices = scene.has_choices();
        let has_puzzle = scene.puzzle.is_some();

        self.state.visit = VisitToken(self.state.visit.0 + 1);
        self.state.current = Some(scene_id.clone());
        self.state.puzzle = None;
        debug!(scene = %scene_id, visit = self.state.visit.0, "scene entered");

        self.notifier.scene_view(&scene_id, is_ending, has_choices, has_puzzle);

        if is_ending {
            self.progress.record_ending(&self.state.agent_id, &scene_id);
            let total_session_time_ms = self.notifier.session_elapsed_ms();
            self.notifier.emit(EventPayload::EndingReached {
                scene_id,
                total_session_time_ms,
            });
        }

        Ok(view)
    }

    /// Begin the mission at the resume scene (or the story start).
    pub fn start_mission(&mut self) -> Result<SceneView, NavError> {
        self.scene(self.initial_scene.as_str())?;
        self.state.history.clear();
        self.notifier.emit(EventPayload::MissionStart);
        let initial = self.initial_scene.clone();
        self.enter(initial.as_str())
    }

    /// Jump to `id` without touching history.
    pub fn goto(&mut self, id: &str) -> Result<SceneView, NavError> {
        self.enter(id)
    }

    /// Take choice `index` of `scene_id`: push `scene_id` onto history and
    /// enter the choice's target. Nothing changes when the target is unknown.
    pub fn choose(&mut self, scene_id: &str, index: usize) -> Result<SceneView, NavError> {
        let scene = self.scene(scene_id)?;
        let choice = scene.choices.get(index).ok_or_else(|| NavError::UnknownChoice {
            scene: scene.id.clone(),
            index,
        })?;
        let from = scene.id.clone();
        let target = choice.next.clone();
        let choice_text = choice.text.clone();
        self.scene(target.as_str())?;

        self.notifier.emit(EventPayload::ChoiceMade {
            from_scene: from.clone(),
            choice_text,
            to_scene: target.clone(),
        });
        self.state.history.push(from);
        self.enter(target.as_str())
    }

    /// `choose` on the scene the player is on.
    pub fn choose_current(&mut self, index: usize) -> Result<SceneView, NavError> {
        let current = self.state.current.clone().ok_or(NavError::NotStarted)?;
        self.choose(current.as_str(), index)
    }

    /// Return to the previous scene.
    pub fn back(&mut self) -> Result<SceneView, NavError> {
        if !self.config.show_back_button {
            return Err(NavError::BackDisabled);
        }
        let previous = self.state.history.last().cloned().ok_or(NavError::NoHistory)?;
        self.scene(previous.as_str())?;
        self.state.history.pop();

        self.notifier.emit(EventPayload::BackButton {
            from_scene: self.state.current.clone(),
            to_scene: previous.clone(),
        });
        self.enter(previous.as_str())
    }

    /// Clear history and return to the story start.
    pub fn reset(&mut self) -> Result<SceneView, NavError> {
        let start = self.data.story.start.clone();
        self.scene(start.as_str())?;
        let total_session_time_ms = self.notifier.session_elapsed_ms();
        self.notifier.emit(EventPayload::MissionReset { total_session_time_ms });
        self.state.history.clear();
        self.enter(start.as_str())
    }

    // -- puzzles ------------------------------------------------------------

    /// Start the current scene's puzzle with a fresh state.
    pub fn open_puzzle(&mut self) -> Result<&PuzzleSession, NavError> {
        let current = self.state.current.as_ref().ok_or(NavError::NotStarted)?;
        let scene = self.scene(current.as_str())?;
        let config = self.data.merged_puzzle(scene).ok_or(NavError::NoPuzzle)?;

        let session = PuzzleSession::instantiate(config, &mut self.rng)?;
        self.notifier.emit(EventPayload::PuzzleStart {
            puzzle_id: session.config().id.clone(),
            puzzle_type: session
                .config()
                .kind
                .clone()
                .unwrap_or_else(|| session.kind().name().to_string()),
        });
        debug!(kind = session.kind().name(), "puzzle opened");
        Ok(self.state.puzzle.insert(session))
    }

    pub fn puzzle(&self) -> Option<&PuzzleSession> {
        self.state.puzzle.as_ref()
    }

    pub fn close_puzzle(&mut self) {
        self.state.puzzle = None;
    }

    /// Run `f` on the live puzzle and report a solve or an exhaustion.
    fn with_puzzle<T>(
        &mut self,
        f: impl FnOnce(&mut PuzzleSession) -> Result<T, PuzzleError>,
    ) -> Result<T, NavError> {
        let puzzle = self.state.puzzle.as_mut().ok_or(NavError::NoPuzzle)?;
        let was_solved = puzzle.is_solved();
        let was_exhausted = puzzle.is_exhausted();

        let result = f(puzzle);

        let finished = if !was_solved && puzzle.is_solved() {
            Some(true)
        } else if !was_exhausted && puzzle.is_exhausted() {
            Some(false)
        } else {
            None
        };
        if let Some(success) = finished {
            let puzzle_id = puzzle.config().id.clone();
            let attempts = puzzle.attempts();
            info!(?puzzle_id, success, attempts, "puzzle finished");
            self.notifier.emit(EventPayload::PuzzleComplete {
                puzzle_id,
                success,
                attempts,
            });
        }

        Ok(result?)
    }

    /// Apply one interaction to the live puzzle.
    pub fn apply_puzzle_input(&mut self, input: PuzzleInput) -> Result<Option<Submission>, NavError> {
        self.with_puzzle(|puzzle| puzzle.apply(input))
    }

    /// Evaluate the live puzzle's working input.
    pub fn check_puzzle(&mut self) -> Result<Submission, NavError> {
        self.with_puzzle(|puzzle| Ok(puzzle.submit()))
    }

    /// Replace the live puzzle's working input with `selection` and evaluate it.
    pub fn submit_puzzle(
        &mut self,
        selection: impl IntoIterator<Item = PuzzleInput>,
    ) -> Result<Submission, NavError> {
        self.with_puzzle(|puzzle| puzzle.submit_selection(selection))
    }

    pub fn reset_puzzle(&mut self) -> Result<(), NavError> {
        self.with_puzzle(|puzzle| {
            puzzle.reset();
            Ok(())
        })
    }

    /// Follow the solved puzzle's success path, pushing the current scene
    /// onto history like a choice would.
    pub fn continue_from_puzzle(&mut self) -> Result<SceneView, NavError> {
        let puzzle = self.state.puzzle.as_ref().ok_or(NavError::NoPuzzle)?;
        if !puzzle.is_solved() {
            return Err(NavError::PuzzleNotSolved);
        }
        let target = puzzle.continue_target().cloned().ok_or(NavError::NoContinuation)?;
        let from = self.state.current.clone().ok_or(NavError::NotStarted)?;
        self.scene(target.as_str())?;

        self.state.history.push(from);
        self.enter(target.as_str())
    }

    // -- progress and agents ------------------------------------------------

    pub fn endings_progress(&mut self) -> Progress {
        let total = self.data.story.ending_count();
        self.progress.progress(&self.state.agent_id, total)
    }

    pub fn found_endings(&mut self) -> Vec<SceneId> {
        self.progress.found_endings(&self.state.agent_id)
    }

    /// Forget every ending found by the current agent. The caller is
    /// expected to have confirmed this with the player.
    pub fn reset_progress(&mut self) {
        self.progress.reset(&self.state.agent_id);
    }

    pub fn progress_degraded(&self) -> bool {
        self.progress.is_degraded()
    }

    pub fn can_switch_agent(&mut self) -> bool {
        !self.config.require_all_endings_to_switch_agent || self.endings_progress().is_complete()
    }

    /// Play on as another agent from the story start, with new friends and
    /// an empty history.
    pub fn switch_agent(&mut self, id: &str) -> Result<SceneView, SwitchError> {
        if !self.data.agents.contains(id) {
            return Err(SwitchError::UnknownAgent(id.to_string()));
        }
        if self.config.require_all_endings_to_switch_agent {
            let progress = self.endings_progress();
            if !progress.is_complete() {
                return Err(SwitchError::Locked {
                    found: progress.found,
                    total: progress.total,
                });
            }
        }
        let start = self.data.story.start.clone();
        self.scene(start.as_str())?;

        let to_agent = AgentId::from(id);
        self.notifier.emit(EventPayload::AgentSwitch {
            from_agent: self.state.agent_id.clone(),
            to_agent: to_agent.clone(),
        });
        info!(from = %self.state.agent_id, to = %to_agent, "agent switched");

        self.state.friends = pick_friends(
            &self.data.agents,
            &to_agent,
            self.config.max_friends,
            &mut self.rng,
        );
        self.notifier.set_agent(to_agent.clone());
        self.state.agent_id = to_agent;
        self.state.history.clear();
        self.initial_scene = start.clone();
        Ok(self.enter(start.as_str())?)
    }
}

impl StoryEngineBuilder {
    /// Directory holding `story.json`, `agents.json` and `puzzles.json`.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// RON config file. Ignored when a config is given directly.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Requested agent id, e.g. from a URL parameter.
    pub fn agent(mut self, id: Option<&str>) -> Self {
        self.agent = id.map(str::to_string);
        self
    }

    /// Scene to start the mission at, used only if the story has it.
    pub fn resume_scene(mut self, id: Option<&str>) -> Self {
        self.resume_scene = id.map(str::to_string);
        self
    }

    /// Overrides the config seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Provide story data directly (for testing without files).
    pub fn with_data(mut self, data: StoryData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: impl ProgressStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn build(self) -> Result<StoryEngine, BuildError> {
        // 1. Config
        let config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(path)?,
            (None, None) => EngineConfig::default(),
        };

        // 2. Story data
        let data = match (self.data, &self.data_dir) {
            (Some(data), _) => data,
            (None, Some(dir)) => StoryData::load_from_dir(dir, &config.start_scene_fallback)?,
            (None, None) => return Err(BuildError::MissingData),
        };

        let mut rng = match self.seed.or(config.seed) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // 3. Agent and friends
        let agent_id = data
            .agents
            .select(self.agent.as_deref(), &config.default_agent)
            .map(|agent| agent.id.clone())
            .unwrap_or_else(|| AgentId::new(config.default_agent.clone()));
        let friends = pick_friends(&data.agents, &agent_id, config.max_friends, &mut rng);

        // 4. Entry scene
        let initial_scene = self
            .resume_scene
            .as_deref()
            .filter(|id| data.story.contains(id))
            .map(SceneId::from)
            .unwrap_or_else(|| data.story.start.clone());

        // 5. Collaborators
        let store = self.store.unwrap_or_else(|| Box::new(MemoryStore::new()));
        let sink = self.sink.unwrap_or_else(|| Box::new(NullSink));
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));
        let mut notifier = Notifier::new(agent_id.clone(), clock, sink);

        let agent_name = data
            .agents
            .get(agent_id.as_str())
            .and_then(Agent::display_name)
            .unwrap_or(config.fallback_text.as_str())
            .to_string();
        notifier.emit(EventPayload::SessionStart { agent_name });
        info!(agent = %agent_id, start = %initial_scene, "story session started");

        Ok(StoryEngine {
            progress: ProgressTracker::new(config.storage_prefix.clone(), store),
            state: EngineState {
                agent_id,
                friends,
                ..EngineState::default()
            },
            data,
            config,
            initial_scene,
            notifier,
            rng,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> StoryData {
        StoryData::from_values(
            json!({
                "meta": { "start": "intro" },
                "scenes": {
                    "intro": {
                        "textLines": ["[Escena 1]", "Hola, {{agent.name}}."],
                        "choices": [
                            { "text": "Ir a la sala", "next": "sala" },
                            { "text": "Perderse", "next": "nowhere" }
                        ],
                        "datetime": "2027-03-14 09:30",
                        "place": "Archivo"
                    },
                    "sala": {
                        "text": "La sala.",
                        "image": null,
                        "puzzle": "orden",
                        "choices": [{ "text": "Salir", "next": "fin" }]
                    },
                    "fin": { "textLines": ["Fin."], "ending": true, "image": "img/fin.jpg" }
                }
            }),
            json!({ "ada": { "name": "Ada" }, "zoe": { "name": "Zoe" } }),
            json!({
                "orden": {
                    "type": "sorting",
                    "successNext": "fin",
                    "data": { "items": ["b", "a"], "correctOrder": ["a", "b"] }
                }
            }),
            "intro",
        )
        .unwrap()
    }

    fn engine() -> StoryEngine {
        StoryEngine::builder()
            .with_data(data())
            .agent(Some("ada"))
            .seed(7)
            .build()
            .unwrap()
    }

    #[test]
    fn datetime_labels() {
        assert_eq!(format_datetime(Some("2027-03-14 09:30")), "14/03 · 09:30");
        assert_eq!(format_datetime(Some("ayer")), "ayer");
        assert_eq!(format_datetime(Some("2027 09:30")), "2027 09:30");
        assert_eq!(format_datetime(None), MISSING_LABEL);
        assert_eq!(format_datetime(Some("")), MISSING_LABEL);
    }

    #[test]
    fn start_renders_scene_view() {
        let mut e = engine();
        let view = e.start_mission().unwrap();
        assert_eq!(view.scene_id.as_str(), "intro");
        assert_eq!(view.lines, vec!["Hola, Ada."]);
        assert_eq!(view.choices.len(), 2);
        assert!(view.choices[0].resolved);
        assert!(!view.choices[1].resolved);
        assert_eq!(view.image.as_deref(), Some("img/scenarios/intro.png"));
        assert_eq!(view.date_label, "14/03 · 09:30");
        assert_eq!(view.place_label, "Archivo");
        assert!(view.puzzle.is_none());
        assert!(!e.can_go_back());
    }

    #[test]
    fn puzzle_trigger_and_image_metadata() {
        let e = engine();
        let sala = e.view("sala").unwrap();
        let trigger = sala.puzzle.unwrap();
        assert_eq!(trigger.title, DEFAULT_TRIGGER_TITLE);
        assert_eq!(trigger.kind, PuzzleKind::Sorting);
        assert_eq!(sala.image, None);
        assert_eq!(sala.place_label, MISSING_LABEL);
        assert_eq!(e.view("fin").unwrap().image.as_deref(), Some("img/fin.jpg"));
    }

    #[test]
    fn broken_choice_leaves_state_untouched() {
        let mut e = engine();
        e.start_mission().unwrap();
        let visit = e.current_visit();
        let err = e.choose("intro", 1).unwrap_err();
        assert_eq!(err.diagnostic(), "No se encuentra la escena: nowhere");
        assert!(e.history().is_empty());
        assert_eq!(e.current_scene().map(SceneId::as_str), Some("intro"));
        assert!(e.is_current_visit(visit));
        assert!(matches!(e.choose("intro", 9), Err(NavError::UnknownChoice { index: 9, .. })));
    }

    #[test]
    fn back_round_trips_and_empties() {
        let mut e = engine();
        let intro = e.start_mission().unwrap();
        e.choose_current(0).unwrap();
        assert!(e.can_go_back());
        assert_eq!(e.back().unwrap(), intro);
        assert!(matches!(e.back(), Err(NavError::NoHistory)));
    }

    #[test]
    fn back_disabled_by_config() {
        let config = EngineConfig {
            show_back_button: false,
            ..EngineConfig::default()
        };
        let mut e = StoryEngine::builder().with_data(data()).with_config(config).build().unwrap();
        e.start_mission().unwrap();
        e.choose_current(0).unwrap();
        assert!(!e.can_go_back());
        assert!(matches!(e.back(), Err(NavError::BackDisabled)));
    }

    #[test]
    fn puzzle_gates_continue() {
        let mut e = engine();
        e.start_mission().unwrap();
        e.choose_current(0).unwrap();
        assert!(matches!(e.continue_from_puzzle(), Err(NavError::NoPuzzle)));

        e.open_puzzle().unwrap();
        assert!(matches!(e.continue_from_puzzle(), Err(NavError::PuzzleNotSolved)));
        let result = e
            .submit_puzzle(["a", "b"].map(|s| PuzzleInput::Select(s.to_string())))
            .unwrap();
        assert!(result.is_solved());

        let view = e.continue_from_puzzle().unwrap();
        assert_eq!(view.scene_id.as_str(), "fin");
        assert_eq!(e.history().last().map(SceneId::as_str), Some("sala"));
        assert!(e.puzzle().is_none());
        assert_eq!(e.endings_progress().found, 1);
    }

    #[test]
    fn visit_token_changes_on_every_entry() {
        let mut e = engine();
        e.start_mission().unwrap();
        let first = e.current_visit();
        e.goto("intro").unwrap();
        assert!(!e.is_current_visit(first));
    }

    #[test]
    fn resume_scene_only_when_known() {
        let mut e = StoryEngine::builder()
            .with_data(data())
            .resume_scene(Some("sala"))
            .build()
            .unwrap();
        assert_eq!(e.start_mission().unwrap().scene_id.as_str(), "sala");

        let mut e = StoryEngine::builder()
            .with_data(data())
            .resume_scene(Some("nope"))
            .build()
            .unwrap();
        assert_eq!(e.start_mission().unwrap().scene_id.as_str(), "intro");
    }

    #[test]
    fn unknown_agent_falls_back_to_first() {
        let e = StoryEngine::builder()
            .with_data(data())
            .agent(Some("nadie"))
            .build()
            .unwrap();
        assert_eq!(e.agent_id().as_str(), "ada");
        assert_eq!(e.friends().len(), 1);
        assert_eq!(e.friends()[0].id.as_str(), "zoe");
    }

    #[test]
    fn switching_is_gated_on_all_endings() {
        let mut e = engine();
        e.start_mission().unwrap();
        assert!(!e.can_switch_agent());
        assert!(matches!(
            e.switch_agent("zoe"),
            Err(SwitchError::Locked { found: 0, total: 1 })
        ));

        e.goto("fin").unwrap();
        let view = e.switch_agent("zoe").unwrap();
        assert_eq!(view.scene_id.as_str(), "intro");
        assert_eq!(view.lines, vec!["Hola, Zoe."]);
        assert_eq!(e.agent_id().as_str(), "zoe");
        assert!(matches!(e.switch_agent("nadie"), Err(SwitchError::UnknownAgent(_))));
    }

    #[test]
    fn missing_data_is_a_build_error() {
        assert!(matches!(StoryEngine::builder().build(), Err(BuildError::MissingData)));
    }
}
