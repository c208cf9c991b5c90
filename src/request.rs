//! Request Model
//!
//! Request files carry an ordered list of commands, each tagged with an action name from
//! a closed registry. Commands stay as raw JSON until execution so that a single bad
//! command (unknown tag, wrong field type) fails in isolation instead of rejecting the
//! whole file.

use crate::error::CommandError;
use crate::types::{now_millis, CorrelationId, ProjectId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One registered action and the fields it accepts.
#[derive(Debug, Clone, Copy)]
pub struct ActionSpec {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

/// The closed action registry. Any field not listed for an action is ignored.
pub const ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "create-context",
        fields: &["name"],
    },
    ActionSpec {
        name: "open-context",
        fields: &["name"],
    },
    ActionSpec {
        name: "add-widget",
        fields: &["name", "kind", "parent"],
    },
    ActionSpec {
        name: "remove-widget",
        fields: &["name"],
    },
    ActionSpec {
        name: "rename-widget",
        fields: &["name", "newName"],
    },
    ActionSpec {
        name: "set-property",
        fields: &["target", "property", "value"],
    },
    ActionSpec {
        name: "compile",
        fields: &[],
    },
];

/// Look up an action by tag.
pub fn resolve_action(tag: &str) -> Option<&'static ActionSpec> {
    ACTIONS.iter().find(|spec| spec.name == tag)
}

/// Names of all registered actions, in registry order.
pub fn known_actions() -> Vec<String> {
    ACTIONS.iter().map(|spec| spec.name.to_string()).collect()
}

fn default_widget_kind() -> String {
    "node".to_string()
}

/// Typed command, one variant per registered action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Command {
    CreateContext {
        name: String,
    },
    OpenContext {
        name: String,
    },
    AddWidget {
        name: String,
        #[serde(default = "default_widget_kind")]
        kind: String,
        #[serde(default)]
        parent: Option<String>,
    },
    RemoveWidget {
        name: String,
    },
    RenameWidget {
        name: String,
        #[serde(rename = "newName")]
        new_name: String,
    },
    SetProperty {
        target: String,
        property: String,
        value: Value,
    },
    Compile,
}

impl Command {
    /// Action tag for this command.
    pub fn action(&self) -> &'static str {
        match self {
            Command::CreateContext { .. } => "create-context",
            Command::OpenContext { .. } => "open-context",
            Command::AddWidget { .. } => "add-widget",
            Command::RemoveWidget { .. } => "remove-widget",
            Command::RenameWidget { .. } => "rename-widget",
            Command::SetProperty { .. } => "set-property",
            Command::Compile => "compile",
        }
    }
}

/// A command as it appeared in the request file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCommand(pub Map<String, Value>);

/// Result of decoding one raw command.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCommand {
    pub command: Command,
    /// Fields present on the raw command that the action does not accept.
    pub ignored_fields: Vec<String>,
}

impl RawCommand {
    /// Build a raw command from an action tag and its fields.
    pub fn new(action: &str, fields: Map<String, Value>) -> Self {
        let mut map = fields;
        map.insert("action".to_string(), Value::String(action.to_string()));
        RawCommand(map)
    }

    /// The raw action tag, if present and a string.
    pub fn action(&self) -> Option<&str> {
        self.0.get("action").and_then(Value::as_str)
    }

    /// Resolve the tag against the registry and decode only the fields it accepts.
    pub fn decode(&self) -> Result<DecodedCommand, CommandError> {
        let tag = self.action().ok_or(CommandError::MissingAction)?;
        let spec = resolve_action(tag).ok_or_else(|| CommandError::UnknownAction {
            action: tag.to_string(),
            known: known_actions(),
        })?;

        let mut relevant = Map::new();
        let mut ignored_fields = Vec::new();
        relevant.insert("action".to_string(), Value::String(spec.name.to_string()));
        for (key, value) in &self.0 {
            if key == "action" {
                continue;
            }
            if spec.fields.contains(&key.as_str()) {
                relevant.insert(key.clone(), value.clone());
            } else {
                ignored_fields.push(key.clone());
            }
        }

        let command: Command = serde_json::from_value(Value::Object(relevant)).map_err(|e| {
            CommandError::InvalidFields {
                action: spec.name.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(DecodedCommand {
            command,
            ignored_fields,
        })
    }
}

/// A request file as written to the queue directory.
///
/// Two shapes are accepted: a batch (`commands: [...]`) or a single command whose
/// action fields sit at the top level next to the envelope fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Target context to create or open before any command runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub commands: Vec<RawCommand>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFile {
    #[serde(default)]
    correlation_id: Option<CorrelationId>,
    #[serde(default)]
    timestamp_ms: Option<u64>,
    #[serde(default)]
    project_id: Option<ProjectId>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    commands: Option<Vec<RawCommand>>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl Request {
    /// New request with a fresh correlation id and the current timestamp.
    pub fn new(commands: Vec<RawCommand>) -> Self {
        Self {
            correlation_id: Some(CorrelationId::generate()),
            timestamp_ms: Some(now_millis()),
            project_id: None,
            context: None,
            commands,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Parse request bytes in either the batch or single-command shape.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let file: RequestFile = serde_json::from_slice(bytes)?;
        let commands = match file.commands {
            Some(commands) => commands,
            None if file.rest.contains_key("action") => vec![RawCommand(file.rest)],
            None => Vec::new(),
        };
        Ok(Self {
            correlation_id: file.correlation_id,
            timestamp_ms: file.timestamp_ms,
            project_id: file.project_id,
            context: file.context,
            commands,
        })
    }
}
