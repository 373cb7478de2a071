//! Persona placeholders in narrative text.
//!
//! Placeholders have the form `{{scope.field}}` where scope is `agent` or
//! `friendN` (1-based) and field is one of `name`, `tag`, `specialItem`,
//! `fear`, `luckyNumber` or `qualities[i]`. The legacy `{{agentName}}` is
//! also understood. Rendering never fails: anything that cannot be resolved
//! becomes a fallback string, never the raw placeholder.

use crate::schema::agent::Agent;

pub const AGENT_NAME_FALLBACK: &str = "Agente";
pub const FRIEND_NAME_FALLBACK: &str = "Amiga";
pub const SPECIAL_ITEM_FALLBACK: &str = "objeto especial";
pub const FEAR_FALLBACK: &str = "lo desconocido";
pub const LUCKY_NUMBER_FALLBACK: &str = "7";

/// Whose data a placeholder reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Agent,
    /// 1-based friend slot.
    Friend(usize),
}

/// Which persona field a placeholder reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Name,
    Tag,
    SpecialItem,
    Fear,
    LuckyNumber,
    Quality(usize),
    Other(String),
}

/// A segment of parsed narrative text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder { scope: Scope, field: Field },
    /// `{{agentName}}`.
    LegacyAgentName,
    /// Well-formed braces around something we do not recognise.
    Unknown(String),
}

/// Parsed narrative text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

/// The personas placeholders resolve against.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub agent: Option<&'a Agent>,
    pub friends: &'a [&'a Agent],
    pub fallback: &'a str,
}

impl<'a> TemplateContext<'a> {
    pub fn new(agent: Option<&'a Agent>, friends: &'a [&'a Agent]) -> Self {
        Self {
            agent,
            friends,
            fallback: AGENT_NAME_FALLBACK,
        }
    }

    pub fn with_fallback(mut self, fallback: &'a str) -> Self {
        self.fallback = fallback;
        self
    }

    fn persona(&self, scope: Scope) -> Option<&'a Agent> {
        match scope {
            Scope::Agent => self.agent,
            Scope::Friend(slot) => slot
                .checked_sub(1)
                .and_then(|index| self.friends.get(index))
                .copied(),
        }
    }
}

/// Render `text` against `ctx`. Text without `{{` is returned unchanged.
pub fn render(text: &str, ctx: &TemplateContext<'_>) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    let template = Template::parse(text);
    if !template.has_placeholders() {
        return text.to_string();
    }
    template.render(ctx)
}

impl Template {
    /// Split text into literals and placeholders. An opening `{{` with no
    /// matching `}}` is kept as literal text.
    pub fn parse(input: &str) -> Template {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let mut rest = input;

        while let Some(open) = rest.find("{{") {
            let after_open = &rest[open + 2..];
            let Some(close) = after_open.find("}}") else {
                break;
            };

            literal_buf.push_str(&rest[..open]);
            let content = &after_open[..close];

            // A nested opener means the outer `{{` is just text.
            if let Some(nested) = content.rfind("{{") {
                literal_buf.push_str(&rest[open..open + 2 + nested]);
                rest = &after_open[nested..];
                continue;
            }

            if !literal_buf.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal_buf)));
            }
            segments.push(Self::parse_segment(content.trim()));
            rest = &after_open[close + 2..];
        }

        literal_buf.push_str(rest);
        if !literal_buf.is_empty() {
            segments.push(Segment::Literal(literal_buf));
        }

        Template { segments }
    }

    fn parse_segment(content: &str) -> Segment {
        if content == "agentName" {
            return Segment::LegacyAgentName;
        }

        let Some((scope, field)) = content.split_once('.') else {
            return Segment::Unknown(content.to_string());
        };

        let scope = if scope == "agent" {
            Scope::Agent
        } else if let Some(slot) = scope
            .strip_prefix("friend")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1)
        {
            Scope::Friend(slot)
        } else {
            return Segment::Unknown(content.to_string());
        };

        Segment::Placeholder {
            scope,
            field: Self::parse_field(field),
        }
    }

    fn parse_field(field: &str) -> Field {
        match field {
            "name" => Field::Name,
            "tag" => Field::Tag,
            "specialItem" => Field::SpecialItem,
            "fear" => Field::Fear,
            "luckyNumber" => Field::LuckyNumber,
            _ => field
                .strip_prefix("qualities[")
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|index| index.trim().parse::<usize>().ok())
                .map(Field::Quality)
                .unwrap_or_else(|| Field::Other(field.to_string())),
        }
    }

    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| !matches!(segment, Segment::Literal(_)))
    }

    pub fn render(&self, ctx: &TemplateContext<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { scope, field } => {
                    out.push_str(&resolve(ctx, *scope, field));
                }
                Segment::LegacyAgentName => out.push_str(
                    ctx.agent
                        .and_then(Agent::display_name)
                        .unwrap_or(AGENT_NAME_FALLBACK),
                ),
                Segment::Unknown(_) => out.push_str(ctx.fallback),
            }
        }
        out
    }
}

fn resolve(ctx: &TemplateContext<'_>, scope: Scope, field: &Field) -> String {
    let persona = ctx.persona(scope);
    let non_empty = |value: Option<&str>| value.filter(|v| !v.is_empty()).map(str::to_string);

    let resolved = match field {
        Field::Name => persona.and_then(Agent::display_name).map(str::to_string),
        Field::Tag => persona.and_then(|p| p.tag.clone()),
        Field::SpecialItem => non_empty(persona.and_then(|p| p.special_item.as_deref())),
        Field::Fear => non_empty(persona.and_then(|p| p.fear.as_deref())),
        Field::LuckyNumber => non_empty(persona.and_then(|p| p.lucky_number.as_deref())),
        Field::Quality(index) => persona.and_then(|p| p.qualities.get(*index)).cloned(),
        Field::Other(_) => None,
    };

    resolved.unwrap_or_else(|| {
        let fallback = match (field, scope) {
            (Field::Name, Scope::Agent) => AGENT_NAME_FALLBACK,
            (Field::Name, Scope::Friend(_)) => FRIEND_NAME_FALLBACK,
            (Field::Tag, _) => "",
            (Field::SpecialItem, _) => SPECIAL_ITEM_FALLBACK,
            (Field::Fear, _) => FEAR_FALLBACK,
            (Field::LuckyNumber, _) => LUCKY_NUMBER_FALLBACK,
            (Field::Quality(_), _) | (Field::Other(_), _) => ctx.fallback,
        };
        fallback.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Agent {
        Agent {
            name: Some("Ada".to_string()),
            tag: Some("la analista".to_string()),
            qualities: vec!["courage".to_string(), "patience".to_string()],
            lucky_number: Some("13".to_string()),
            ..Agent::default()
        }
    }

    fn grace() -> Agent {
        Agent {
            name: Some("Grace".to_string()),
            qualities: vec!["wit".to_string()],
            ..Agent::default()
        }
    }

    #[test]
    fn renders_agent_fields() {
        let agent = ada();
        let ctx = TemplateContext::new(Some(&agent), &[]);
        assert_eq!(
            render("{{agent.name}} found {{agent.qualities[0]}}", &ctx),
            "Ada found courage"
        );
        assert_eq!(render("#{{agent.luckyNumber}}", &ctx), "#13");
    }

    #[test]
    fn missing_quality_uses_fallback() {
        let agent = Agent {
            name: Some("Ada".to_string()),
            ..Agent::default()
        };
        let ctx = TemplateContext::new(Some(&agent), &[]);
        let out = render("{{agent.name}} found {{agent.qualities[0]}}", &ctx);
        assert_eq!(out, "Ada found Agente");
        assert!(!out.contains("{{"));
    }

    #[test]
    fn field_specific_fallbacks() {
        let agent = Agent::default();
        let ctx = TemplateContext::new(Some(&agent), &[]);
        assert_eq!(render("{{agent.name}}", &ctx), "Agente");
        assert_eq!(render("[{{agent.tag}}]", &ctx), "[]");
        assert_eq!(render("{{agent.specialItem}}", &ctx), "objeto especial");
        assert_eq!(render("{{agent.fear}}", &ctx), "lo desconocido");
        assert_eq!(render("{{agent.luckyNumber}}", &ctx), "7");
        assert_eq!(render("{{friend2.name}}", &ctx), "Amiga");
    }

    #[test]
    fn friends_are_one_based() {
        let agent = ada();
        let friend = grace();
        let friends = [&friend];
        let ctx = TemplateContext::new(Some(&agent), &friends);
        assert_eq!(
            render("{{friend1.name}} has {{friend1.qualities[0]}}", &ctx),
            "Grace has wit"
        );
    }

    #[test]
    fn legacy_agent_name() {
        let agent = ada();
        let ctx = TemplateContext::new(Some(&agent), &[]);
        assert_eq!(render("Hola, {{agentName}}.", &ctx), "Hola, Ada.");
        let empty = TemplateContext::new(None, &[]);
        assert_eq!(render("Hola, {{agentName}}.", &empty), "Hola, Agente.");
    }

    #[test]
    fn unknown_placeholders_use_configured_fallback() {
        let ctx = TemplateContext::new(None, &[]).with_fallback("???");
        assert_eq!(render("{{villain.name}} / {{agent.shoeSize}}", &ctx), "??? / ???");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let ctx = TemplateContext::new(None, &[]);
        let text = "Una puerta {cerrada} y nada más }}";
        assert_eq!(render(text, &ctx), text);
        assert_eq!(render(&render(text, &ctx), &ctx), text);
    }

    #[test]
    fn unclosed_placeholder_stays_literal() {
        let t = Template::parse("Hola {{agent.name");
        assert_eq!(t.segments, vec![Segment::Literal("Hola {{agent.name".to_string())]);
        assert!(!t.has_placeholders());
        let ctx = TemplateContext::new(None, &[]);
        assert_eq!(render("Hola {{agent.name", &ctx), "Hola {{agent.name");
    }

    #[test]
    fn nested_opener_keeps_outer_braces() {
        let agent = ada();
        let ctx = TemplateContext::new(Some(&agent), &[]);
        assert_eq!(render("{{ {{agent.name}}", &ctx), "{{ Ada");
    }

    #[test]
    fn parse_mixed_segments() {
        let t = Template::parse("{{agent.name}} y {{friend3.qualities[2]}}.");
        assert_eq!(t.segments.len(), 4);
        assert_eq!(
            t.segments[0],
            Segment::Placeholder {
                scope: Scope::Agent,
                field: Field::Name
            }
        );
        assert_eq!(
            t.segments[2],
            Segment::Placeholder {
                scope: Scope::Friend(3),
                field: Field::Quality(2)
            }
        );
    }
}
