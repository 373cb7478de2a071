use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;

/// Newtype wrapper for agent (persona) IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A player persona. Loaded once and read-only for the session.
///
/// Every display field is optional in the document; the template engine
/// supplies fallbacks for the missing ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    #[serde(default)]
    pub id: AgentId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub special_item: Option<String>,
    #[serde(default)]
    pub fear: Option<String>,
    /// Stored as text; documents use either a number or a string.
    #[serde(default, deserialize_with = "scalar_text")]
    pub lucky_number: Option<String>,
    #[serde(default)]
    pub qualities: Vec<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub fullbody: Option<String>,
}

impl Agent {
    /// Display name, treating an empty string as missing.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Names of the display fields this record lacks.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.display_name().is_none() {
            missing.push("name");
        }
        if self.tag.is_none() {
            missing.push("tag");
        }
        if self.avatar.is_none() {
            missing.push("avatar");
        }
        if self.qualities.is_empty() {
            missing.push("qualities");
        }
        if self.special_item.is_none() {
            missing.push("specialItem");
        }
        if self.fullbody.is_none() {
            missing.push("fullbody");
        }
        missing
    }
}

fn scalar_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// All agents in document order.
#[derive(Debug, Clone, Default)]
pub struct AgentRoster {
    order: Vec<AgentId>,
    agents: FxHashMap<AgentId, Agent>,
}

impl AgentRoster {
    pub fn new(agents: impl IntoIterator<Item = Agent>) -> Self {
        let mut roster = Self::default();
        for agent in agents {
            if !roster.agents.contains_key(&agent.id) {
                roster.order.push(agent.id.clone());
            }
            roster.agents.insert(agent.id.clone(), agent);
        }
        roster
    }

    /// Build from `{id: Agent}` or `{agents: {id: Agent}}`.
    pub fn from_document(value: Value) -> Result<AgentRoster, serde_json::Error> {
        let map = match value {
            Value::Object(mut map) => match map.get("agents") {
                Some(Value::Object(_)) => match map.remove("agents") {
                    Some(Value::Object(inner)) => inner,
                    _ => serde_json::Map::new(),
                },
                _ => map,
            },
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected an object of agents, found {other}"
                )))
            }
        };

        let mut agents = Vec::with_capacity(map.len());
        for (key, raw) in map {
            let mut agent: Agent = serde_json::from_value(raw)?;
            agent.id = AgentId(key);
            agents.push(agent);
        }
        Ok(AgentRoster::new(agents))
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Agents in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    /// Resolve the session's agent: the requested id when known, then
    /// `default_id`, then the first agent in document order.
    pub fn select(&self, requested: Option<&str>, default_id: &str) -> Option<&Agent> {
        requested
            .and_then(|id| self.get(id))
            .or_else(|| self.get(default_id))
            .or_else(|| self.iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roster() -> AgentRoster {
        AgentRoster::from_document(json!({
            "zoe": { "name": "Zoe", "luckyNumber": 4 },
            "generic": { "name": "Agente X", "qualities": ["calma"] },
            "ada": { "name": "Ada", "luckyNumber": "13" }
        }))
        .unwrap()
    }

    #[test]
    fn document_order_is_preserved() {
        let roster = roster();
        let ids: Vec<&str> = roster.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["zoe", "generic", "ada"]);
    }

    #[test]
    fn wrapped_document_is_accepted() {
        let roster = AgentRoster::from_document(json!({
            "agents": { "ada": { "name": "Ada" } }
        }))
        .unwrap();
        assert_eq!(roster.len(), 1);
        assert!(roster.contains("ada"));
    }

    #[test]
    fn lucky_number_accepts_numbers_and_strings() {
        let roster = roster();
        assert_eq!(roster.get("zoe").unwrap().lucky_number.as_deref(), Some("4"));
        assert_eq!(roster.get("ada").unwrap().lucky_number.as_deref(), Some("13"));
    }

    #[test]
    fn select_prefers_requested_then_generic_then_first() {
        let roster = roster();
        assert_eq!(roster.select(Some("ada"), "generic").unwrap().id.as_str(), "ada");
        assert_eq!(roster.select(Some("nobody"), "generic").unwrap().id.as_str(), "generic");
        assert_eq!(roster.select(None, "missing").unwrap().id.as_str(), "zoe");
        assert!(AgentRoster::default().select(None, "generic").is_none());
    }

    #[test]
    fn missing_fields_are_reported() {
        let roster = roster();
        let ada = roster.get("ada").unwrap();
        assert!(ada.missing_fields().contains(&"qualities"));
        assert!(!ada.missing_fields().contains(&"name"));
    }
}
