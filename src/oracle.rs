//! The decision oracle: a stateless text-in/text-out judgment service.
//!
//! Prompts are built here and every reply goes through a strict parser that
//! either yields a typed judgment or [`AgentError::OracleMalformed`].

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::action::RawAction;
use crate::error::AgentError;
use crate::types::{NodeRef, Plan, StructuralSnapshot, null_as_default};

/// The literal token the oracle uses for "yes".
pub const AFFIRMATIVE_TOKEN: &str = "True";

pub const HEALTH_CHECK_PROMPT: &str =
    "Return only the word 'True' if you are working properly.";

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn respond(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Oracle verdict for one search frame.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SearchJudgment {
    #[serde(rename = "found_selector", default)]
    pub found: Option<NodeRef>,
    #[serde(rename = "next_selectors", default, deserialize_with = "null_as_default")]
    pub next: Vec<NodeRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
}

/// What the oracle wants done about the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Success,
    WaitForHuman,
    Batch(Vec<RawAction>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepJudgment {
    pub thought: String,
    pub directive: Directive,
    pub context_delta: Map<String, Value>,
}

/// `actions` is either a sentinel word or a list of actions.
#[derive(Deserialize)]
#[serde(untagged)]
enum StepActions {
    Sentinel(String),
    Batch(Vec<RawAction>),
}

#[derive(Deserialize)]
struct StepReply {
    #[serde(default, deserialize_with = "null_as_default")]
    thought: String,
    actions: StepActions,
    #[serde(default, deserialize_with = "null_as_default")]
    context: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskIntake {
    Task(String),
    NotATask(String),
}

fn malformed(what: impl Into<String>) -> AgentError {
    AgentError::OracleMalformed(what.into())
}

fn strip_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Deserializes the outermost `open ... close` span of `text`.
fn extract_json<T: DeserializeOwned>(text: &str, open: char, close: char) -> Result<T, AgentError> {
    let cleaned = strip_fences(text);
    let span = match (cleaned.find(open), cleaned.rfind(close)) {
        (Some(start), Some(end)) if start <= end => &cleaned[start..=end],
        _ => return Err(malformed(format!("no JSON found in: {}", preview(cleaned)))),
    };
    serde_json::from_str(span).map_err(|e| malformed(format!("{e}: {}", preview(span))))
}

fn preview(text: &str) -> String {
    let short: String = text.chars().take(120).collect();
    if short.len() < text.len() {
        format!("{short}...")
    } else {
        short
    }
}

fn trimmed(node: &NodeRef) -> NodeRef {
    NodeRef::new(node.as_str().trim())
}

pub fn parse_search_judgment(reply: &str) -> Result<SearchJudgment, AgentError> {
    let mut judgment: SearchJudgment = extract_json(reply, '{', '}')?;

    judgment.found = judgment
        .found
        .map(|node| trimmed(&node))
        .filter(|node| !node.as_str().is_empty() && node.as_str() != "null");

    judgment.next = judgment.next.iter().map(trimmed).collect();
    if judgment.next.iter().any(|node| node.as_str().is_empty()) {
        return Err(malformed("blank entry in next_selectors"));
    }
    Ok(judgment)
}

pub fn parse_step_judgment(reply: &str) -> Result<StepJudgment, AgentError> {
    let reply: StepReply = extract_json(reply, '{', '}')?;

    let directive = match reply.actions {
        StepActions::Sentinel(word) => match word.trim() {
            "success" => Directive::Success,
            "wait_for_the_human" => Directive::WaitForHuman,
            other => return Err(malformed(format!("unexpected actions value: {other}"))),
        },
        StepActions::Batch(mut actions) => {
            for action in &mut actions {
                action.name = action.name.trim().to_string();
                if action.name.is_empty() {
                    return Err(malformed("action without a name"));
                }
            }
            Directive::Batch(actions)
        }
    };

    Ok(StepJudgment {
        thought: reply.thought,
        directive,
        context_delta: reply.context,
    })
}

pub fn parse_plan(reply: &str) -> Result<Plan, AgentError> {
    let steps: Vec<String> = extract_json(reply, '[', ']')?;
    let steps: Vec<String> = steps.iter().map(|s| s.trim().to_string()).collect();
    if steps.iter().any(String::is_empty) {
        return Err(malformed("blank plan step"));
    }
    Plan::new(steps)
}

/// Reads a `TASK| text` or `NO| reason` line.
pub fn parse_task_intake(reply: &str) -> Result<TaskIntake, AgentError> {
    let line = reply.trim();
    let (status, text) = line
        .split_once('|')
        .ok_or_else(|| malformed(format!("no status separator in: {}", preview(line))))?;
    let text = text.trim().to_string();
    match status.trim() {
        "TASK" if !text.is_empty() => Ok(TaskIntake::Task(text)),
        "TASK" => Err(malformed("task without a description")),
        "NO" => Ok(TaskIntake::NotATask(text)),
        other => Err(malformed(format!("unknown intake status '{other}'"))),
    }
}

pub fn is_affirmative(reply: &str) -> bool {
    reply.trim() == AFFIRMATIVE_TOKEN
}

pub fn search_prompt(
    snapshot: &StructuralSnapshot,
    goal: &str,
    node: &NodeRef,
    path: &[NodeRef],
    recent: &[NodeRef],
    max_branches: usize,
) -> String {
    let path = path.iter().map(NodeRef::as_str).collect::<Vec<_>>().join(" -> ");
    let recent = recent.iter().map(NodeRef::as_str).collect::<Vec<_>>().join(", ");
    format!(
        r#"You are helping locate an element on a web page.

GOAL: find the element matching: "{goal}"

Current node: {node}
Current path: {path}

STRUCTURE:
{structure}

Already explored: [{recent}]

INSTRUCTIONS:
1. If an element in the structure above clearly matches the goal, return its full CSS selector as found_selector.
2. Otherwise choose up to {max_branches} of the most promising children to explore next, most promising first, as full CSS selectors.
3. Prefer containers that may hold inputs, forms or search fields. Prefer visible elements.
4. Search inputs are not always <input>: styled div, p or textarea are possible.

Return ONLY this JSON, no commentary:
{{"reasoning": "short explanation", "found_selector": "css selector or null", "next_selectors": ["selector1", "selector2"]}}"#,
        structure = snapshot.render(),
    )
}

pub fn step_prompt(step: &str, context_json: &str, capabilities: &str) -> String {
    format!(
        r#"You are an autonomous agent controlling a web browser to complete a user's task.

Current step: {step}

Given the context, check whether this step is already complete. If it is not, produce the sequence of actions that moves it forward.
If you do not know the selector for an element, find it first with find_element.
If an action causes loading (navigation, search), add a wait action after it.
Never take actions that could cause harm.

Return ONLY JSON, no backticks or commentary:
{{
  "thought": "what you see and why you chose these actions",
  "actions": [{{"name": "open_url", "parameters": {{"url": "https://example.com"}}}}],
  "context": {{"current_url": "https://example.com"}}
}}

RULES:
- "actions" is a list of available actions, or the string "success" when the step is done.
- For login, payment or anything only the human knows, set "actions" to the string "wait_for_the_human" and explain the request in "thought".
- "context" holds only the fields that changed.

Context:
{context_json}

Available actions:
{capabilities}"#
    )
}

pub fn plan_prompt(task: &str) -> String {
    format!(
        r#"You are an autonomous agent controlling a web browser. You start on about:blank.
When something needs data or confirmation only the human has, such as an address or payment details, control is handed to the human.

The user wants: {task}

Break this task into short, informative high-level steps, for example:
["Open mail.example.com", "Read the inbox", "Mark spam messages as spam"]

Return ONLY the JSON list, no backticks or commentary."#
    )
}

pub fn intake_prompt(message: &str) -> String {
    format!(
        r#"Decide whether the user's message is a task for a browser assistant.

A task is a concrete digital action (find, compare, order, fill in) with a clear goal that can be done in a browser, possibly with the human's help.
Prefer going straight to the relevant site; use a search engine only when the site is unknown.

Answer on ONE line in exactly this format:
TASK| restated task
or
NO| reason

Message: "{message}""#
    )
}

pub fn confirmation_prompt(message: &str) -> String {
    format!(
        "If in this message the user confirms they did what was asked, or says you may continue, \
         reply with exactly {AFFIRMATIVE_TOKEN}; otherwise reply with exactly False.\nUser message: {message}"
    )
}
