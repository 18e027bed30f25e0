//! Configuration: application settings (`marigraph.toml`) and dashboard
//! templates (JSON).
//!
//! Settings are tolerant — unknown fields are ignored so the file can
//! evolve without breaking older binaries, and a missing file means
//! defaults. Templates are strict the other way around: structural
//! problems (duplicate column ids, dangling wiring references, unknown
//! event or action names) are fatal at startup per the error-handling
//! policy, because a silently dropped wiring rule is much harder to
//! debug than a refused start.

pub mod settings;
pub mod template;

pub use settings::{RenderSettings, RouterSettings, Settings, discover, load_settings};
pub use template::{
    ColumnSpec, Template, TemplateError, WiringAction, WiringEntry, WiringTrigger, load_template,
};
