//! Loading the three story documents as one unit.

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::schema::agent::AgentRoster;
use crate::schema::puzzle::{PuzzleCatalog, PuzzleSpec};
use crate::schema::scene::{Scene, Story};

/// Shown to the player when loading fails.
pub const LOAD_FAILURE_MESSAGE: &str = "No se pudo cargar la historia. Revisa los ficheros JSON.";

pub const STORY_FILE: &str = "story.json";
pub const AGENTS_FILE: &str = "agents.json";
pub const PUZZLES_FILE: &str = "puzzles.json";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed {document} document: {source}")]
    Malformed {
        document: &'static str,
        source: serde_json::Error,
    },
    #[error("story document has no scenes")]
    NoScenes,
}

impl LoadError {
    /// Player-facing text for the failed state.
    pub fn user_message(&self) -> &'static str {
        LOAD_FAILURE_MESSAGE
    }
}

/// Story, agents and puzzle templates, loaded together.
#[derive(Debug, Clone, Default)]
pub struct StoryData {
    pub story: Story,
    pub agents: AgentRoster,
    pub puzzles: PuzzleCatalog,
}

fn malformed(document: &'static str) -> impl FnOnce(serde_json::Error) -> LoadError {
    move |source| LoadError::Malformed { document, source }
}

impl StoryData {
    /// Build from already-parsed documents.
    pub fn from_values(
        story: Value,
        agents: Value,
        puzzles: Value,
        fallback_start: &str,
    ) -> Result<StoryData, LoadError> {
        let story = Story::from_document(story, fallback_start).map_err(malformed("story"))?;
        if story.is_empty() {
            return Err(LoadError::NoScenes);
        }
        let agents = AgentRoster::from_document(agents).map_err(malformed("agents"))?;
        let puzzles = PuzzleCatalog::from_document(puzzles).map_err(malformed("puzzles"))?;

        info!(
            scenes = story.len(),
            endings = story.ending_count(),
            agents = agents.len(),
            puzzles = puzzles.len(),
            "story data loaded"
        );
        Ok(StoryData {
            story,
            agents,
            puzzles,
        })
    }

    /// Parse the three documents from JSON text.
    pub fn from_json(
        story: &str,
        agents: &str,
        puzzles: &str,
        fallback_start: &str,
    ) -> Result<StoryData, LoadError> {
        let story = serde_json::from_str(story).map_err(malformed("story"))?;
        let agents = serde_json::from_str(agents).map_err(malformed("agents"))?;
        let puzzles = serde_json::from_str(puzzles).map_err(malformed("puzzles"))?;
        Self::from_values(story, agents, puzzles, fallback_start)
    }

    /// Read `story.json`, `agents.json` and `puzzles.json` from `dir`.
    pub fn load_from_dir(dir: &Path, fallback_start: &str) -> Result<StoryData, LoadError> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| LoadError::Io { path, source })
        };
        let story = read(STORY_FILE)?;
        let agents = read(AGENTS_FILE)?;
        let puzzles = read(PUZZLES_FILE)?;
        Self::from_json(&story, &agents, &puzzles, fallback_start)
    }

    /// The scene's puzzle with its template applied, if it has one.
    pub fn merged_puzzle(&self, scene: &Scene) -> Option<PuzzleSpec> {
        scene.puzzle.as_ref().map(|spec| self.puzzles.merged(spec))
    }
}
