use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::AgentId;
use super::puzzle::PuzzleId;
use super::scene::SceneId;

/// What happened. Serialized with a snake_case `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    SessionStart {
        agent_name: String,
    },
    MissionStart,
    SceneView {
        scene_id: SceneId,
        is_ending: bool,
        has_choices: bool,
        has_puzzle: bool,
    },
    /// Time spent in the scene that was just left.
    SceneTime {
        scene_id: SceneId,
        duration_ms: i64,
    },
    ChoiceMade {
        from_scene: SceneId,
        choice_text: String,
        to_scene: SceneId,
    },
    PuzzleStart {
        puzzle_id: Option<PuzzleId>,
        puzzle_type: String,
    },
    PuzzleComplete {
        puzzle_id: Option<PuzzleId>,
        success: bool,
        attempts: u32,
    },
    EndingReached {
        scene_id: SceneId,
        total_session_time_ms: i64,
    },
    BackButton {
        from_scene: Option<SceneId>,
        to_scene: SceneId,
    },
    MissionReset {
        total_session_time_ms: i64,
    },
    AgentSwitch {
        from_agent: AgentId,
        to_agent: AgentId,
    },
}

impl EventPayload {
    /// The wire name of this event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::MissionStart => "mission_start",
            Self::SceneView { .. } => "scene_view",
            Self::SceneTime { .. } => "scene_time",
            Self::ChoiceMade { .. } => "choice_made",
            Self::PuzzleStart { .. } => "puzzle_start",
            Self::PuzzleComplete { .. } => "puzzle_complete",
            Self::EndingReached { .. } => "ending_reached",
            Self::BackButton { .. } => "back_button",
            Self::MissionReset { .. } => "mission_reset",
            Self::AgentSwitch { .. } => "agent_switch",
        }
    }
}

/// A lifecycle event as handed to the delivery sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub session_id: Uuid,
    /// Milliseconds since the Unix epoch; strictly increasing within a session.
    pub timestamp_ms: i64,
    pub session_duration_ms: i64,
    pub agent_id: AgentId,
    #[serde(flatten)]
    pub payload: EventPayload,
}
