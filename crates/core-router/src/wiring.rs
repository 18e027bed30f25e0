//! Declarative wiring: `(source, event) -> (target, action)` routing
//! entries evaluated against every inbound event.
//!
//! Rules are stored in table order and matched in table order, so rule
//! firing for a single inbound event is deterministic. Targets are either
//! a concrete column id or `"*"` (every worker except the source).

use core_config::Template;
use core_proto::MessageType;
use serde::Deserialize;

pub const WILDCARD_TARGET: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringRule {
    pub source: String,
    pub event: MessageType,
    pub target: String,
    pub action: MessageType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WiringTable {
    rules: Vec<WiringRule>,
}

/// JSON shape accepted by WIRING_UPDATE payloads: the same entries a
/// template carries, as a bare array.
#[derive(Debug, Deserialize)]
struct WireRuleJson {
    on: WireOn,
    #[serde(rename = "do")]
    act: WireDo,
}

#[derive(Debug, Deserialize)]
struct WireOn {
    column: String,
    event: String,
}

#[derive(Debug, Deserialize)]
struct WireDo {
    column: String,
    #[serde(default)]
    action: Option<String>,
}

impl WiringTable {
    pub fn new(rules: Vec<WiringRule>) -> Self {
        Self { rules }
    }

    /// Build from a validated template. Event/action names were checked
    /// by template validation; entries that still fail to resolve are
    /// skipped rather than panicking.
    pub fn from_template(template: &Template) -> Self {
        let rules = template
            .wiring
            .iter()
            .filter_map(|entry| {
                let event = MessageType::from_name(&entry.on.event)?;
                let action = MessageType::from_name(&entry.act.action)?;
                Some(WiringRule {
                    source: entry.on.column.clone(),
                    event,
                    target: entry.act.column.clone(),
                    action,
                })
            })
            .collect();
        Self { rules }
    }

    /// Parse a WIRING_UPDATE payload (JSON array of template-shaped
    /// entries). Unknown event or action names reject the whole update so
    /// a partially applied table never exists.
    pub fn from_update_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        use serde::de::Error;
        let entries: Vec<WireRuleJson> = serde_json::from_slice(payload)?;
        let mut rules = Vec::with_capacity(entries.len());
        for entry in entries {
            let event = MessageType::from_name(&entry.on.event).ok_or_else(|| {
                serde_json::Error::custom(format!("unknown event '{}'", entry.on.event))
            })?;
            let action = match entry.act.action.as_deref() {
                None => MessageType::SetData,
                Some(name) => MessageType::from_name(name).ok_or_else(|| {
                    serde_json::Error::custom(format!("unknown action '{name}'"))
                })?,
            };
            rules.push(WiringRule {
                source: entry.on.column,
                event,
                target: entry.act.column,
                action,
            });
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules matching an inbound event, in table order.
    pub fn matching<'a>(
        &'a self,
        source: &'a str,
        event: MessageType,
    ) -> impl Iterator<Item = &'a WiringRule> {
        self.rules
            .iter()
            .filter(move |r| r.source == source && r.event == event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(source: &str, event: MessageType, target: &str, action: MessageType) -> WiringRule {
        WiringRule {
            source: source.into(),
            event,
            target: target.into(),
            action,
        }
    }

    #[test]
    fn matching_preserves_table_order() {
        let table = WiringTable::new(vec![
            rule("A", MessageType::Selected, "B", MessageType::SetData),
            rule("A", MessageType::Clicked, "C", MessageType::SetData),
            rule("A", MessageType::Selected, "C", MessageType::Focus),
        ]);
        let hits: Vec<&WiringRule> = table.matching("A", MessageType::Selected).collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].target, "B");
        assert_eq!(hits[1].target, "C");
        assert_eq!(hits[1].action, MessageType::Focus);
        assert_eq!(table.matching("B", MessageType::Selected).count(), 0);
    }

    #[test]
    fn from_update_json_round_trip() {
        let payload = br#"[
            {"on": {"column": "A", "event": "SELECTED"},
             "do": {"column": "B", "action": "APPEND_DATA"}},
            {"on": {"column": "B", "event": "KEY_PRESSED"},
             "do": {"column": "*"}}
        ]"#;
        let table = WiringTable::from_update_json(payload).unwrap();
        assert_eq!(table.len(), 2);
        let hits: Vec<_> = table.matching("A", MessageType::Selected).collect();
        assert_eq!(hits[0].action, MessageType::AppendData);
        // Missing action defaults to SET_DATA.
        let hits: Vec<_> = table.matching("B", MessageType::KeyPressed).collect();
        assert_eq!(hits[0].action, MessageType::SetData);
        assert_eq!(hits[0].target, WILDCARD_TARGET);
    }

    #[test]
    fn from_update_json_rejects_unknown_names() {
        let bad_event = br#"[{"on":{"column":"A","event":"NOPE"},"do":{"column":"B"}}]"#;
        assert!(WiringTable::from_update_json(bad_event).is_err());
        let bad_action =
            br#"[{"on":{"column":"A","event":"SELECTED"},"do":{"column":"B","action":"NOPE"}}]"#;
        assert!(WiringTable::from_update_json(bad_action).is_err());
    }
}
