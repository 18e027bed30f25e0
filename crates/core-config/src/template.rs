//! Dashboard template: columns and declarative wiring rules.
//!
//! JSON schema:
//!
//! ```json
//! {
//!   "name": "vol-dashboard",
//!   "columns": [{"id": "surface", "type": "surface3d", "options": {}}],
//!   "wiring": [{"on": {"column": "surface", "event": "SELECTED"},
//!               "do": {"column": "metrics", "action": "SET_DATA"}}]
//! }
//! ```
//!
//! Validation is structural only; column `type` semantics belong to the
//! worker catalog and are checked by the supervisor at spawn time.

use core_proto::MessageType;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot read template {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("template has no columns")]
    NoColumns,
    #[error("duplicate column id '{0}'")]
    DuplicateColumn(String),
    #[error("wiring rule {index}: unknown source column '{column}'")]
    UnknownSource { index: usize, column: String },
    #[error("wiring rule {index}: unknown target column '{column}'")]
    UnknownTarget { index: usize, column: String },
    #[error("wiring rule {index}: '{event}' is not a routable event")]
    UnknownEvent { index: usize, event: String },
    #[error("wiring rule {index}: unknown action '{action}'")]
    UnknownAction { index: usize, action: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WiringTrigger {
    pub column: String,
    pub event: String,
}

fn default_action() -> String {
    MessageType::SetData.name().to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WiringAction {
    pub column: String,
    #[serde(default = "default_action")]
    pub action: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WiringEntry {
    pub on: WiringTrigger,
    #[serde(rename = "do")]
    pub act: WiringAction,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Template {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub wiring: Vec<WiringEntry>,
}

impl Template {
    pub fn parse(json: &str) -> Result<Template, TemplateError> {
        let template: Template = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    /// Structural validation: unique column ids, wiring references
    /// resolve, event and action names are canonical.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.columns.is_empty() {
            return Err(TemplateError::NoColumns);
        }
        let mut ids: HashSet<&str> = HashSet::with_capacity(self.columns.len());
        for col in &self.columns {
            if !ids.insert(&col.id) {
                return Err(TemplateError::DuplicateColumn(col.id.clone()));
            }
        }
        for (index, rule) in self.wiring.iter().enumerate() {
            if !ids.contains(rule.on.column.as_str()) {
                return Err(TemplateError::UnknownSource {
                    index,
                    column: rule.on.column.clone(),
                });
            }
            if rule.act.column != "*" && !ids.contains(rule.act.column.as_str()) {
                return Err(TemplateError::UnknownTarget {
                    index,
                    column: rule.act.column.clone(),
                });
            }
            match MessageType::from_name(&rule.on.event) {
                Some(t) if t.is_event() => {}
                _ => {
                    return Err(TemplateError::UnknownEvent {
                        index,
                        event: rule.on.event.clone(),
                    });
                }
            }
            if MessageType::from_name(&rule.act.action).is_none() {
                return Err(TemplateError::UnknownAction {
                    index,
                    action: rule.act.action.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn column(&self, id: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.id == id)
    }
}

/// Read, parse, and validate a template file.
pub fn load_template(path: &Path) -> Result<Template, TemplateError> {
    let content = fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Template::parse(&content)
}
