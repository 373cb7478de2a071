//! Static checks over loaded story data.
//!
//! Nothing here runs during play. The report lists what would show up as
//! a diagnostic or a stuck player at runtime, so authors can catch it first.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::fmt;

use crate::core::loader::StoryData;
use crate::schema::agent::AgentId;
use crate::schema::puzzle::PuzzleId;
use crate::schema::scene::SceneId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    MissingStart(SceneId),
    BrokenChoice {
        scene: SceneId,
        index: usize,
        target: SceneId,
    },
    UnknownPuzzleTemplate {
        scene: SceneId,
        puzzle: PuzzleId,
    },
    BrokenPuzzleTarget {
        scene: SceneId,
        target: SceneId,
    },
    Unreachable(SceneId),
    /// Not an ending, and offers neither choices nor a puzzle.
    DeadEnd(SceneId),
    NoEndings,
    IncompleteAgent {
        agent: AgentId,
        missing: Vec<&'static str>,
    },
}

impl IntegrityIssue {
    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingStart(_)
            | Self::BrokenChoice { .. }
            | Self::UnknownPuzzleTemplate { .. }
            | Self::BrokenPuzzleTarget { .. } => Severity::Error,
            Self::Unreachable(_) | Self::DeadEnd(_) | Self::NoEndings | Self::IncompleteAgent { .. } => {
                Severity::Warning
            }
        }
    }
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStart(id) => write!(f, "start scene '{id}' does not exist"),
            Self::BrokenChoice { scene, index, target } => {
                write!(f, "scene '{scene}' choice {index} points to missing scene '{target}'")
            }
            Self::UnknownPuzzleTemplate { scene, puzzle } => {
                write!(f, "scene '{scene}' references unknown puzzle '{puzzle}'")
            }
            Self::BrokenPuzzleTarget { scene, target } => {
                write!(f, "puzzle in scene '{scene}' continues to missing scene '{target}'")
            }
            Self::Unreachable(id) => write!(f, "scene '{id}' is unreachable from the start"),
            Self::DeadEnd(id) => write!(f, "scene '{id}' is a dead end"),
            Self::NoEndings => write!(f, "story has no endings"),
            Self::IncompleteAgent { agent, missing } => {
                write!(f, "agent '{agent}' is missing: {}", missing.join(", "))
            }
        }
    }
}

/// Result of checking one set of story data.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
    pub scene_count: usize,
    pub reachable_count: usize,
    pub endings: Vec<SceneId>,
}

impl IntegrityReport {
    pub fn check(data: &StoryData) -> IntegrityReport {
        let story = &data.story;
        let mut issues = Vec::new();

        let mut scene_ids: Vec<&SceneId> = story.scenes().map(|scene| &scene.id).collect();
        scene_ids.sort();

        if !story.contains(story.start.as_str()) {
            issues.push(IntegrityIssue::MissingStart(story.start.clone()));
        }

        // Edges: choices, then the puzzle's success path.
        for id in &scene_ids {
            let Some(scene) = story.get(id.as_str()) else {
                continue;
            };
            for (index, choice) in scene.choices.iter().enumerate() {
                if !story.contains(choice.next.as_str()) {
                    issues.push(IntegrityIssue::BrokenChoice {
                        scene: scene.id.clone(),
                        index,
                        target: choice.next.clone(),
                    });
                }
            }

            if let Some(spec) = &scene.puzzle {
                if let Some(puzzle) = &spec.id {
                    if spec.kind.is_none() && data.puzzles.get(puzzle.as_str()).is_none() {
                        issues.push(IntegrityIssue::UnknownPuzzleTemplate {
                            scene: scene.id.clone(),
                            puzzle: puzzle.clone(),
                        });
                    }
                }
                let merged = data.puzzles.merged(spec);
                if let Some(target) = merged.success_next {
                    if !story.contains(target.as_str()) {
                        issues.push(IntegrityIssue::BrokenPuzzleTarget {
                            scene: scene.id.clone(),
                            target,
                        });
                    }
                }
            }

            if !scene.ending && !scene.has_choices() && scene.puzzle.is_none() {
                issues.push(IntegrityIssue::DeadEnd(scene.id.clone()));
            }
        }

        let reachable = reachable_from(data);
        for id in &scene_ids {
            if !reachable.contains(*id) {
                issues.push(IntegrityIssue::Unreachable((*id).clone()));
            }
        }

        let endings = story.ending_ids();
        if endings.is_empty() {
            issues.push(IntegrityIssue::NoEndings);
        }

        for agent in data.agents.iter() {
            let missing = agent.missing_fields();
            if !missing.is_empty() {
                issues.push(IntegrityIssue::IncompleteAgent {
                    agent: agent.id.clone(),
                    missing,
                });
            }
        }

        IntegrityReport {
            issues,
            scene_count: story.len(),
            reachable_count: reachable.len(),
            endings,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.issues.iter().filter(|issue| issue.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.issues.iter().filter(|issue| issue.severity() == Severity::Warning)
    }

    /// No errors. Warnings are allowed.
    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }
}

/// Scenes reachable from the start through choices and puzzle successes.
fn reachable_from(data: &StoryData) -> FxHashSet<SceneId> {
    let story = &data.story;
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::new();

    if story.contains(story.start.as_str()) {
        seen.insert(story.start.clone());
        queue.push_back(story.start.clone());
    }

    while let Some(id) = queue.pop_front() {
        let Some(scene) = story.get(id.as_str()) else {
            continue;
        };
        let puzzle_next = data.merged_puzzle(scene).and_then(|spec| spec.success_next);
        let targets = scene
            .choices
            .iter()
            .map(|choice| choice.next.clone())
            .chain(puzzle_next);
        for target in targets {
            if story.contains(target.as_str()) && seen.insert(target.clone()) {
                queue.push_back(target);
            }
        }
    }

    seen
}
