//! Data model for story, agent and puzzle documents plus the analytics
//! event payloads the engine emits.

pub mod agent;
pub mod event;
pub mod puzzle;
pub mod scene;
