use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

use crate::error::AgentError;
use crate::types::{NodeRef, StructuralSnapshot, null_as_default};

/// An action exactly as the oracle named it. Validated only at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Map<String, Value>,
}

impl RawAction {
    pub fn new(name: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            parameters: parameters.as_object().cloned().unwrap_or_default(),
        }
    }
}

/// Every capability the agent can dispatch, with typed parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "name",
    content = "parameters",
    rename_all = "snake_case",
    deny_unknown_fields
)]
pub enum Action {
    OpenUrl {
        url: String,
    },
    Click {
        selector: NodeRef,
    },
    TypeInto {
        selector: NodeRef,
        text: String,
    },
    Press {
        key: String,
        selector: Option<NodeRef>,
    },
    Wait {
        #[serde(deserialize_with = "non_negative_millis")]
        ms: u64,
    },
    NewPage,
    GetPageUrl,
    AnalyzeStructure {
        selector: NodeRef,
    },
    FindElement {
        description: String,
    },
}

/// Models often write `1500.0` for a duration.
fn non_negative_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let ms = f64::deserialize(deserializer)?;
    if !ms.is_finite() || ms < 0.0 {
        return Err(D::Error::custom(format!(
            "expected a non-negative number of milliseconds, got {ms}"
        )));
    }
    Ok(ms as u64)
}

struct Capability {
    name: &'static str,
    parameters: &'static [(&'static str, &'static str)],
    description: &'static str,
}

const CAPABILITIES: &[Capability] = &[
    Capability {
        name: "open_url",
        parameters: &[("url", "string")],
        description: "Navigate the current page to a URL.",
    },
    Capability {
        name: "click",
        parameters: &[("selector", "string")],
        description: "Click the element matching a CSS selector.",
    },
    Capability {
        name: "type_into",
        parameters: &[("selector", "string"), ("text", "string")],
        description: "Clear the matching input and type text into it.",
    },
    Capability {
        name: "press",
        parameters: &[("key", "string"), ("selector", "string, optional")],
        description: "Press a key, optionally after focusing an element.",
    },
    Capability {
        name: "wait",
        parameters: &[("ms", "integer")],
        description: "Wait for the page to settle, in milliseconds.",
    },
    Capability {
        name: "new_page",
        parameters: &[],
        description: "Open a new tab and make it current.",
    },
    Capability {
        name: "get_page_url",
        parameters: &[],
        description: "Read the URL of the current page.",
    },
    Capability {
        name: "analyze_structure",
        parameters: &[("selector", "string")],
        description: "Describe one element: attributes, text and its children by tag.",
    },
    Capability {
        name: "find_element",
        parameters: &[("description", "string")],
        description: "Search the page for an element matching a natural-language description and return its selector.",
    },
];

impl Action {
    /// Resolves an oracle-named action against the closed capability set.
    pub fn from_raw(raw: &RawAction) -> Result<Self, AgentError> {
        if !CAPABILITIES.iter().any(|cap| cap.name == raw.name) {
            return Err(AgentError::UnknownAction(raw.name.clone()));
        }

        // An adjacently tagged unit variant only accepts a missing payload.
        let tagged = if raw.parameters.is_empty() {
            json!({ "name": raw.name })
        } else {
            json!({ "name": raw.name, "parameters": raw.parameters })
        };
        serde_json::from_value(tagged)
            .map_err(|e| AgentError::invalid_parameters(&raw.name, e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::OpenUrl { .. } => "open_url",
            Action::Click { .. } => "click",
            Action::TypeInto { .. } => "type_into",
            Action::Press { .. } => "press",
            Action::Wait { .. } => "wait",
            Action::NewPage => "new_page",
            Action::GetPageUrl => "get_page_url",
            Action::AnalyzeStructure { .. } => "analyze_structure",
            Action::FindElement { .. } => "find_element",
        }
    }

    /// JSON description of every capability, for the oracle's prompt.
    pub fn catalog() -> String {
        let entries: Vec<Value> = CAPABILITIES
            .iter()
            .map(|cap| {
                let params: Vec<Value> = cap
                    .parameters
                    .iter()
                    .map(|(name, ty)| json!({"name": name, "type": ty}))
                    .collect();
                json!({
                    "name": cap.name,
                    "parameters": params,
                    "description": cap.description,
                })
            })
            .collect();
        format!("{:#}", Value::Array(entries))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::OpenUrl { url } => write!(f, "open_url({url})"),
            Action::Click { selector } => write!(f, "click({selector})"),
            Action::TypeInto { selector, text } => write!(f, "type_into({selector}, {text:?})"),
            Action::Press { key, selector: Some(sel) } => write!(f, "press({key} on {sel})"),
            Action::Press { key, selector: None } => write!(f, "press({key})"),
            Action::Wait { ms } => write!(f, "wait({ms}ms)"),
            Action::NewPage => f.write_str("new_page()"),
            Action::GetPageUrl => f.write_str("get_page_url()"),
            Action::AnalyzeStructure { selector } => write!(f, "analyze_structure({selector})"),
            Action::FindElement { description } => write!(f, "find_element({description:?})"),
        }
    }
}

/// What a successful action produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    Done,
    Url(String),
    Snapshot(StructuralSnapshot),
    Element(NodeRef),
}

/// Outcome of one action in a batch, reported independently of its siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub action: String,
    pub result: Result<ActionOutput, AgentError>,
}

impl ActionReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// One line for the oracle's next look at the context.
    pub fn summary(&self) -> String {
        match &self.result {
            Ok(ActionOutput::Done) => format!("{} -> ok", self.action),
            Ok(ActionOutput::Url(url)) => format!("{} -> {url}", self.action),
            Ok(ActionOutput::Element(node)) => format!("{} -> selector {node}", self.action),
            Ok(ActionOutput::Snapshot(snap)) => format!("{} ->\n{}", self.action, snap.render()),
            Err(e) => format!("{} -> failed: {e}", self.action),
        }
    }
}
