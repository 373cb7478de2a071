//! Story Engine: branching stories with personalised text, embedded puzzles
//! and per-agent ending tracking.
//!
//! Story, agent and puzzle documents are loaded once into [`StoryData`]. A
//! [`StoryEngine`] walks the scene graph for one player session, rendering
//! each scene into a [`SceneView`] and reporting lifecycle events and
//! discovered endings to injected collaborators.
//!
//! [`StoryData`]: core::loader::StoryData
//! [`StoryEngine`]: core::navigator::StoryEngine
//! [`SceneView`]: core::navigator::SceneView

pub mod core;
pub mod schema;
