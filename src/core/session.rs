//! Loading gate around the engine.
//!
//! Story data arrives asynchronously in an embedding UI. Commands issued
//! before it is ready are queued and replayed in order once the engine is
//! built; if the build fails they are dropped and the failure is reported
//! once, with a player-facing message.

use tracing::{error, info, warn};

use crate::core::loader::LOAD_FAILURE_MESSAGE;
use crate::core::navigator::{BuildError, NavError, SceneView, StoryEngine};
use crate::schema::scene::SceneId;

/// A navigation request from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartMission,
    Goto(SceneId),
    /// Choice index on the current scene.
    Choose(usize),
    Back,
    Reset,
}

impl Command {
    fn run(&self, engine: &mut StoryEngine) -> Result<SceneView, NavError> {
        match self {
            Self::StartMission => engine.start_mission(),
            Self::Goto(id) => engine.goto(id.as_str()),
            Self::Choose(index) => engine.choose_current(*index),
            Self::Back => engine.back(),
            Self::Reset => engine.reset(),
        }
    }
}

/// What happened to a dispatched command.
#[derive(Debug)]
pub enum Dispatch {
    /// Held until loading finishes.
    Queued,
    Done(Result<SceneView, NavError>),
    /// Loading failed; the string is the player-facing message.
    Unavailable(&'static str),
}

/// Reported once when loading fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub message: &'static str,
    pub detail: String,
    /// Commands that were waiting and are now dropped.
    pub dropped: usize,
}

enum Phase {
    Loading(Vec<Command>),
    Ready(Box<StoryEngine>),
    Failed(BuildError),
}

pub struct Session {
    phase: Phase,
}

impl Default for Session {
    fn default() -> Self {
        Self::loading()
    }
}

impl Session {
    pub fn loading() -> Self {
        Self {
            phase: Phase::Loading(Vec::new()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading(_))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready(_))
    }

    pub fn engine(&self) -> Option<&StoryEngine> {
        match &self.phase {
            Phase::Ready(engine) => Some(&**engine),
            _ => None,
        }
    }

    pub fn engine_mut(&mut self) -> Option<&mut StoryEngine> {
        match &mut self.phase {
            Phase::Ready(engine) => Some(&mut **engine),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&BuildError> {
        match &self.phase {
            Phase::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Commands waiting for the engine.
    pub fn queued(&self) -> &[Command] {
        match &self.phase {
            Phase::Loading(queue) => queue,
            _ => &[],
        }
    }

    pub fn dispatch(&mut self, command: Command) -> Dispatch {
        match &mut self.phase {
            Phase::Loading(queue) => {
                queue.push(command);
                Dispatch::Queued
            }
            Phase::Ready(engine) => Dispatch::Done(command.run(engine)),
            Phase::Failed(_) => Dispatch::Unavailable(LOAD_FAILURE_MESSAGE),
        }
    }

    /// Install the engine (or the failure) and replay queued commands.
    /// Calling this outside the loading phase does nothing.
    pub fn finish_loading(
        &mut self,
        built: Result<StoryEngine, BuildError>,
    ) -> Result<Vec<Result<SceneView, NavError>>, LoadFailure> {
        let queue = match &mut self.phase {
            Phase::Loading(queue) => std::mem::take(queue),
            _ => {
                warn!("finish_loading called after loading completed");
                return Ok(Vec::new());
            }
        };

        match built {
            Ok(mut engine) => {
                info!(replayed = queue.len(), "story ready");
                let results = queue.iter().map(|command| command.run(&mut engine)).collect();
                self.phase = Phase::Ready(Box::new(engine));
                Ok(results)
            }
            Err(err) => {
                error!(error = %err, dropped = queue.len(), "story failed to load");
                let failure = LoadFailure {
                    message: LOAD_FAILURE_MESSAGE,
                    detail: err.to_string(),
                    dropped: queue.len(),
                };
                self.phase = Phase::Failed(err);
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loader::{LoadError, StoryData};
    use serde_json::json;

    fn engine() -> StoryEngine {
        let data = StoryData::from_values(
            json!({ "scenes": {
                "intro": { "choices": [{ "text": "a", "next": "b" }] },
                "b": { "ending": true }
            }}),
            json!({}),
            json!({}),
            "intro",
        )
        .unwrap();
        StoryEngine::builder().with_data(data).build().unwrap()
    }

    #[test]
    fn commands_wait_for_loading_and_replay_in_order() {
        let mut session = Session::loading();
        assert!(matches!(session.dispatch(Command::StartMission), Dispatch::Queued));
        assert!(matches!(session.dispatch(Command::Choose(0)), Dispatch::Queued));
        assert_eq!(session.queued().len(), 2);

        let results = session.finish_loading(Ok(engine())).unwrap();
        let ids: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap().scene_id.to_string())
            .collect();
        assert_eq!(ids, vec!["intro", "b"]);
        assert!(session.is_ready());

        match session.dispatch(Command::Back) {
            Dispatch::Done(Ok(view)) => assert_eq!(view.scene_id.as_str(), "intro"),
            other => panic!("unexpected dispatch result: {other:?}"),
        }
    }

    #[test]
    fn failed_load_drops_queue_and_reports_once() {
        let mut session = Session::loading();
        session.dispatch(Command::StartMission);
        let failure = session
            .finish_loading(Err(BuildError::Load(LoadError::NoScenes)))
            .unwrap_err();
        assert_eq!(failure.message, LOAD_FAILURE_MESSAGE);
        assert_eq!(failure.dropped, 1);
        assert!(session.error().is_some());

        assert!(matches!(
            session.dispatch(Command::Reset),
            Dispatch::Unavailable(LOAD_FAILURE_MESSAGE)
        ));
        assert!(session.finish_loading(Ok(engine())).unwrap().is_empty());
        assert!(!session.is_ready());
    }
}
