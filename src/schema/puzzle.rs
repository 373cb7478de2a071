use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

use super::scene::SceneId;

/// Newtype wrapper for puzzle template IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PuzzleId(pub String);

impl PuzzleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PuzzleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PuzzleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A puzzle definition as written in a document: either a shared template
/// or a scene's inline override of one. Every field is optional so an
/// override can name only what it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleSpec {
    #[serde(default)]
    pub id: Option<PuzzleId>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub success_next: Option<SceneId>,
    #[serde(default)]
    pub fail_text: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl PuzzleSpec {
    /// A spec that only points at a template.
    pub fn reference(id: impl Into<String>) -> Self {
        Self {
            id: Some(PuzzleId(id.into())),
            ..Self::default()
        }
    }

    /// Overlay `over` on top of `self` without touching either.
    ///
    /// Top-level fields set in `over` win. `data` merges key by key, so
    /// template data survives unless `over` names the same key.
    pub fn overlay(&self, over: &PuzzleSpec) -> PuzzleSpec {
        let mut data = self.data.clone();
        for (key, value) in &over.data {
            data.insert(key.clone(), value.clone());
        }

        PuzzleSpec {
            id: over.id.clone().or_else(|| self.id.clone()),
            kind: over.kind.clone().or_else(|| self.kind.clone()),
            data,
            success_next: over.success_next.clone().or_else(|| self.success_next.clone()),
            fail_text: over.fail_text.clone().or_else(|| self.fail_text.clone()),
            hint: over.hint.clone().or_else(|| self.hint.clone()),
            description: over.description.clone().or_else(|| self.description.clone()),
            title: over.title.clone().or_else(|| self.title.clone()),
        }
    }

    /// Hint text: the explicit hint, then `data.hint`, then the description.
    pub fn hint_text(&self) -> Option<&str> {
        self.hint
            .as_deref()
            .or_else(|| self.data.get("hint").and_then(Value::as_str))
            .or(self.description.as_deref())
    }
}

/// Shared puzzle templates keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PuzzleCatalog {
    templates: FxHashMap<PuzzleId, PuzzleSpec>,
}

impl PuzzleCatalog {
    pub fn new(templates: impl IntoIterator<Item = PuzzleSpec>) -> Self {
        let templates = templates
            .into_iter()
            .filter_map(|spec| spec.id.clone().map(|id| (id, spec)))
            .collect();
        Self { templates }
    }

    /// Build from `{id: PuzzleSpec}` or `{puzzles: {id: PuzzleSpec}}`.
    pub fn from_document(value: Value) -> Result<PuzzleCatalog, serde_json::Error> {
        let map = match value {
            Value::Object(mut map) => match map.get("puzzles") {
                Some(Value::Object(_)) => match map.remove("puzzles") {
                    Some(Value::Object(inner)) => inner,
                    _ => Map::new(),
                },
                _ => map,
            },
            Value::Null => Map::new(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected an object of puzzles, found {other}"
                )))
            }
        };

        let mut templates = Vec::with_capacity(map.len());
        for (key, raw) in map {
            let mut spec: PuzzleSpec = serde_json::from_value(raw)?;
            spec.id = Some(PuzzleId(key));
            templates.push(spec);
        }
        Ok(PuzzleCatalog::new(templates))
    }

    pub fn get(&self, id: &str) -> Option<&PuzzleSpec> {
        self.templates.get(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The config a scene's puzzle actually runs with: its template (when
    /// the id names one) overlaid with the scene's own fields.
    pub fn merged(&self, scene_spec: &PuzzleSpec) -> PuzzleSpec {
        match scene_spec.id.as_ref().and_then(|id| self.get(id.as_str())) {
            Some(template) => template.overlay(scene_spec),
            None => scene_spec.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> PuzzleSpec {
        serde_json::from_value(json!({
            "id": "archivo",
            "type": "sorting",
            "title": "Ordena el archivo",
            "successNext": "sala",
            "data": { "items": ["a", "b", "c"], "correctOrder": ["a", "b", "c"], "code": "27" }
        }))
        .unwrap()
    }

    #[test]
    fn overlay_prefers_scene_fields() {
        let over: PuzzleSpec = serde_json::from_value(json!({
            "id": "archivo",
            "title": "Otro título",
            "data": { "code": "99" }
        }))
        .unwrap();
        let merged = template().overlay(&over);
        assert_eq!(merged.title.as_deref(), Some("Otro título"));
        assert_eq!(merged.kind.as_deref(), Some("sorting"));
        assert_eq!(merged.success_next, Some(SceneId::from("sala")));
        assert_eq!(merged.data["code"], json!("99"));
        assert_eq!(merged.data["items"], json!(["a", "b", "c"]));
    }

    #[test]
    fn overlay_leaves_template_untouched() {
        let template = template();
        let before = template.clone();
        let over: PuzzleSpec = serde_json::from_value(json!({ "data": { "items": ["x"] } })).unwrap();
        let _ = template.overlay(&over);
        assert_eq!(template, before);
    }

    #[test]
    fn catalog_merges_referenced_template() {
        let catalog = PuzzleCatalog::new([template()]);
        let merged = catalog.merged(&PuzzleSpec::reference("archivo"));
        assert_eq!(merged.kind.as_deref(), Some("sorting"));

        let unknown = PuzzleSpec::reference("nada");
        assert_eq!(catalog.merged(&unknown), unknown);
    }

    #[test]
    fn catalog_accepts_wrapped_and_bare_documents() {
        let wrapped = PuzzleCatalog::from_document(json!({
            "puzzles": { "p1": { "type": "pattern" } }
        }))
        .unwrap();
        let bare = PuzzleCatalog::from_document(json!({ "p1": { "type": "pattern" } })).unwrap();
        assert_eq!(wrapped.get("p1").unwrap().id.as_ref().unwrap().as_str(), "p1");
        assert_eq!(bare.len(), 1);
    }

    #[test]
    fn hint_falls_back_to_data_then_description() {
        let mut spec = PuzzleSpec {
            description: Some("desc".to_string()),
            ..PuzzleSpec::default()
        };
        assert_eq!(spec.hint_text(), Some("desc"));
        spec.data.insert("hint".to_string(), json!("pista"));
        assert_eq!(spec.hint_text(), Some("pista"));
        spec.hint = Some("directa".to_string());
        assert_eq!(spec.hint_text(), Some("directa"));
    }
}
