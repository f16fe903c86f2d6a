use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::action::ActionReport;
use crate::error::AgentError;

pub const SNAPSHOT_TEXT_MAX_CHARS: usize = 100;
pub const EXEMPLAR_TEXT_MAX_CHARS: usize = 50;

/// A re-resolvable locator (CSS selector) for a node in the live page.
///
/// Never a handle: every use resolves it again against the current document,
/// so it is only meaningful relative to the root it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(String);

impl NodeRef {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn root() -> Self {
        Self("body".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// First child of a given tag, described one level deep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChildSnapshot {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub child_count: usize,
}

/// Shallow view of one node: itself, per-tag child counts and one exemplar
/// child per tag. Produced fresh for every look at the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralSnapshot {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub child_counts: BTreeMap<String, usize>,
    #[serde(default)]
    pub exemplar_children: BTreeMap<String, ChildSnapshot>,
}

/// Reads an optional field where the oracle may also send `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.trim().chars().take(max).collect()
}

impl StructuralSnapshot {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Adds `count` children of `child.tag`, with `child` as the exemplar.
    pub fn with_children(mut self, child: ChildSnapshot, count: usize) -> Self {
        self.child_counts.insert(child.tag.clone(), count);
        self.exemplar_children.insert(child.tag.clone(), child);
        self
    }

    /// Enforces the text length limits, whatever the producer sent.
    pub fn normalized(mut self) -> Self {
        self.text = truncate_chars(&self.text, SNAPSHOT_TEXT_MAX_CHARS);
        for child in self.exemplar_children.values_mut() {
            child.text = truncate_chars(&child.text, EXEMPLAR_TEXT_MAX_CHARS);
        }
        self
    }

    /// Indented text rendering used inside oracle prompts.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{} (visible: {}, text: '{}')",
            self.tag, self.visible, self.text
        );
        if !self.attributes.is_empty() {
            out.push_str(&format!("\n  attributes: {}", render_attrs(&self.attributes)));
        }
        for (tag, count) in &self.child_counts {
            let Some(child) = self.exemplar_children.get(tag) else {
                out.push_str(&format!("\n  └── {tag} x{count}"));
                continue;
            };
            out.push_str(&format!(
                "\n  └── {tag} x{count} (visible: {}, text: '{}', children: {})",
                child.visible, child.text, child.child_count
            ));
            if !child.attributes.is_empty() {
                out.push_str(&format!("\n      attributes: {}", render_attrs(&child.attributes)));
            }
        }
        out
    }
}

fn render_attrs(attrs: &BTreeMap<String, String>) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered sequence of step descriptions for one task. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    steps: Vec<String>,
}

impl Plan {
    pub fn new(steps: Vec<String>) -> Result<Self, AgentError> {
        if steps.is_empty() {
            return Err(AgentError::OracleMalformed("plan has no steps".to_string()));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Mutable key/value state carried across the steps of one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepContext(Map<String, Value>);

impl StepContext {
    pub fn for_task(task: &str) -> Self {
        let mut ctx = Self::default();
        ctx.set("task", task);
        ctx.set("step", Value::Null);
        ctx.set("step_history", Value::Array(Vec::new()));
        ctx
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Applies the fields the oracle reported as changed. Keys are overwritten,
    /// so applying the same delta twice is the same as applying it once.
    pub fn merge(&mut self, delta: &Map<String, Value>) {
        for (key, value) in delta {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn push_history(&mut self, entry: &str) {
        match self.0.get_mut("step_history") {
            Some(Value::Array(items)) => items.push(Value::from(entry)),
            _ => self.set("step_history", vec![Value::from(entry)]),
        }
    }

    pub fn to_prompt_json(&self) -> String {
        format!("{:#}", Value::Object(self.0.clone()))
    }
}

/// Result of a single attempt inside a step.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success,
    ActionsExecuted(Vec<ActionReport>),
    HumanHandoffRequested { reason: String },
    Failed(AgentError),
}

/// How a step ended and how many oracle requests it took.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub outcome: ExecutionOutcome,
    pub attempts: u32,
}
