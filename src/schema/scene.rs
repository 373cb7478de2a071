use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;

use super::puzzle::PuzzleSpec;

/// Newtype wrapper for scene IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for SceneId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A labelled edge to another scene. `next` may name a scene that does not
/// exist; that is a data problem reported by the integrity check, not a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    pub next: SceneId,
}

/// How a scene's illustration is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageRef {
    /// No `image` key: use the conventional per-scene path.
    #[default]
    Conventional,
    /// `"image": null`: the scene has no illustration.
    Hidden,
    /// Explicit path.
    Path(String),
}

/// A node in the story graph.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "SceneDocument")]
pub struct Scene {
    /// Filled from the document key when the scene object omits it.
    pub id: SceneId,
    pub text_lines: Vec<String>,
    pub choices: Vec<Choice>,
    pub ending: bool,
    pub puzzle: Option<PuzzleSpec>,
    pub image: ImageRef,
    pub datetime: Option<String>,
    pub place: Option<String>,
}

/// A scene as written in the story document. `textLines` wins over `text`
/// when both are present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneDocument {
    #[serde(default)]
    id: SceneId,
    #[serde(default, deserialize_with = "optional_lines")]
    text_lines: Option<Vec<String>>,
    #[serde(default, deserialize_with = "optional_lines")]
    text: Option<Vec<String>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    choices: Vec<Choice>,
    /// Only a literal `true` marks an ending.
    #[serde(default, deserialize_with = "literal_true")]
    ending: bool,
    #[serde(default, deserialize_with = "puzzle_ref")]
    puzzle: Option<PuzzleSpec>,
    #[serde(default, deserialize_with = "image_ref")]
    image: ImageRef,
    #[serde(default)]
    datetime: Option<String>,
    #[serde(default)]
    place: Option<String>,
}

impl From<SceneDocument> for Scene {
    fn from(doc: SceneDocument) -> Self {
        Scene {
            id: doc.id,
            text_lines: doc.text_lines.or(doc.text).unwrap_or_default(),
            choices: doc.choices,
            ending: doc.ending,
            puzzle: doc.puzzle,
            image: doc.image,
            datetime: doc.datetime,
            place: doc.place,
        }
    }
}

impl Scene {
    /// Text lines that should be shown, without a leading `[...]` stage header.
    pub fn visible_lines(&self) -> &[String] {
        match self.text_lines.first() {
            Some(first) if is_stage_header(first) => &self.text_lines[1..],
            _ => &self.text_lines,
        }
    }

    pub fn has_choices(&self) -> bool {
        !self.choices.is_empty()
    }
}

fn is_stage_header(line: &str) -> bool {
    line.trim().starts_with('[') && line.contains(']')
}

/// A list of lines or a single line. `null` counts as absent.
fn optional_lines<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lines {
        One(String),
        Many(Vec<Option<String>>),
    }

    Ok(Option::<Lines>::deserialize(deserializer)?.map(|lines| match lines {
        Lines::One(line) => vec![line],
        Lines::Many(lines) => lines.into_iter().map(Option::unwrap_or_default).collect(),
    }))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn literal_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

fn image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<String>::deserialize(deserializer)? {
        None => ImageRef::Hidden,
        Some(path) => ImageRef::Path(path),
    })
}

/// A scene's puzzle may be an inline object or a bare template id.
fn puzzle_ref<'de, D>(deserializer: D) -> Result<Option<PuzzleSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ref {
        Id(String),
        Inline(PuzzleSpec),
    }

    Ok(match Option::<Ref>::deserialize(deserializer)? {
        None => None,
        Some(Ref::Id(id)) => Some(PuzzleSpec::reference(id)),
        Some(Ref::Inline(spec)) => Some(spec),
    })
}

/// The full scene graph with its configured entry point.
#[derive(Debug, Clone, Default)]
pub struct Story {
    pub start: SceneId,
    scenes: FxHashMap<SceneId, Scene>,
}

#[derive(Debug, Default, Deserialize)]
struct StoryMeta {
    start: Option<SceneId>,
}

#[derive(Debug, Deserialize)]
struct StoryDocument {
    #[serde(default)]
    meta: Option<StoryMeta>,
    #[serde(default)]
    scenes: FxHashMap<String, Scene>,
}

impl Story {
    pub fn new(start: SceneId, scenes: impl IntoIterator<Item = Scene>) -> Self {
        let scenes = scenes
            .into_iter()
            .map(|scene| (scene.id.clone(), scene))
            .collect();
        Self { start, scenes }
    }

    /// Build from a parsed `{meta: {start}, scenes: {...}}` document.
    /// `fallback_start` is used when the document names no start scene.
    pub fn from_document(value: Value, fallback_start: &str) -> Result<Story, serde_json::Error> {
        let doc: StoryDocument = serde_json::from_value(value)?;
        let start = doc
            .meta
            .and_then(|meta| meta.start)
            .unwrap_or_else(|| SceneId::from(fallback_start));
        let scenes = doc.scenes.into_iter().map(|(key, mut scene)| {
            scene.id = SceneId(key);
            scene
        });
        Ok(Story::new(start, scenes))
    }

    pub fn get(&self, id: &str) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scenes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    /// Ids of every ending scene, sorted.
    pub fn ending_ids(&self) -> Vec<SceneId> {
        let mut endings: Vec<SceneId> = self
            .scenes
            .values()
            .filter(|scene| scene.ending)
            .map(|scene| scene.id.clone())
            .collect();
        endings.sort();
        endings
    }

    pub fn ending_count(&self) -> usize {
        self.scenes.values().filter(|scene| scene.ending).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scene_accepts_text_forms() {
        let lines: Scene = serde_json::from_value(json!({ "textLines": ["a", "b"] })).unwrap();
        assert_eq!(lines.text_lines, vec!["a", "b"]);

        let array: Scene = serde_json::from_value(json!({ "text": ["c"] })).unwrap();
        assert_eq!(array.text_lines, vec!["c"]);

        let single: Scene = serde_json::from_value(json!({ "text": "solo" })).unwrap();
        assert_eq!(single.text_lines, vec!["solo"]);

        let none: Scene = serde_json::from_value(json!({})).unwrap();
        assert!(none.text_lines.is_empty());
    }

    #[test]
    fn text_lines_win_over_text() {
        let both: Scene =
            serde_json::from_value(json!({ "textLines": ["A"], "text": "B" })).unwrap();
        assert_eq!(both.text_lines, vec!["A"]);

        let null_lines: Scene =
            serde_json::from_value(json!({ "textLines": null, "text": ["C"] })).unwrap();
        assert_eq!(null_lines.text_lines, vec!["C"]);
    }

    #[test]
    fn null_choices_mean_no_choices() {
        let scene: Scene =
            serde_json::from_value(json!({ "textLines": ["A"], "choices": null })).unwrap();
        assert!(!scene.has_choices());
    }

    #[test]
    fn stage_header_is_hidden() {
        let scene: Scene = serde_json::from_value(json!({
            "textLines": ["[ESCENA 3 - PASILLO]", "Hola."]
        }))
        .unwrap();
        assert_eq!(scene.visible_lines(), ["Hola.".to_string()]);
    }

    #[test]
    fn only_literal_true_is_an_ending() {
        let yes: Scene = serde_json::from_value(json!({ "ending": true })).unwrap();
        let string: Scene = serde_json::from_value(json!({ "ending": "good" })).unwrap();
        let absent: Scene = serde_json::from_value(json!({})).unwrap();
        assert!(yes.ending);
        assert!(!string.ending);
        assert!(!absent.ending);
    }

    #[test]
    fn image_null_differs_from_absent() {
        let hidden: Scene = serde_json::from_value(json!({ "image": null })).unwrap();
        let absent: Scene = serde_json::from_value(json!({})).unwrap();
        let explicit: Scene = serde_json::from_value(json!({ "image": "img/x.png" })).unwrap();
        assert_eq!(hidden.image, ImageRef::Hidden);
        assert_eq!(absent.image, ImageRef::Conventional);
        assert_eq!(explicit.image, ImageRef::Path("img/x.png".to_string()));
    }

    #[test]
    fn puzzle_may_be_bare_id() {
        let scene: Scene = serde_json::from_value(json!({ "puzzle": "p1" })).unwrap();
        let spec = scene.puzzle.unwrap();
        assert_eq!(spec.id.unwrap().as_str(), "p1");
    }

    #[test]
    fn story_document_fills_ids_and_start() {
        let story = Story::from_document(
            json!({
                "meta": { "start": "door" },
                "scenes": {
                    "door": { "choices": [{ "text": "go", "next": "end" }] },
                    "end": { "ending": true }
                }
            }),
            "intro",
        )
        .unwrap();
        assert_eq!(story.start.as_str(), "door");
        assert_eq!(story.get("end").unwrap().id.as_str(), "end");
        assert_eq!(story.ending_ids(), vec![SceneId::from("end")]);
    }

    #[test]
    fn story_without_meta_uses_fallback_start() {
        let story = Story::from_document(json!({ "scenes": {} }), "intro").unwrap();
        assert_eq!(story.start.as_str(), "intro");
        assert!(story.is_empty());
    }
}
