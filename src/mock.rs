//! In-memory collaborators for tests: no browser, no network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::browser::{Browser, SnapshotProvider};
use crate::error::AgentError;
use crate::human::HumanChannel;
use crate::oracle::Oracle;
use crate::types::{NodeRef, StructuralSnapshot};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Script = Box<dyn Fn(&str) -> Result<String, AgentError> + Send + Sync>;

/// Oracle driven by a closure over the prompt. Records every prompt it sees.
pub struct ScriptedOracle {
    script: Script,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(script: impl Fn(&str) -> Result<String, AgentError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers with `replies` in order, then keeps repeating the last one.
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: Mutex<VecDeque<String>> =
            Mutex::new(replies.into_iter().map(Into::into).collect());
        Self::new(move |_| {
            let mut queue = lock(&queue);
            let reply = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            Ok(reply.unwrap_or_default())
        })
    }

    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn respond(&self, prompt: &str) -> Result<String, AgentError> {
        lock(&self.prompts).push(prompt.to_string());
        (self.script)(prompt)
    }
}

/// Oracle that never answers, for exercising cancellation.
#[derive(Debug, Default)]
pub struct StalledOracle;

#[async_trait]
impl Oracle for StalledOracle {
    async fn respond(&self, _prompt: &str) -> Result<String, AgentError> {
        std::future::pending().await
    }
}

/// Browser over a fixed table of nodes. Records every capability call.
pub struct FakeBrowser {
    nodes: Mutex<HashMap<NodeRef, StructuralSnapshot>>,
    failing: Mutex<HashSet<NodeRef>>,
    calls: Mutex<Vec<String>>,
    snapshots: Mutex<Vec<String>>,
    url: Mutex<String>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            snapshots: Mutex::new(Vec::new()),
            url: Mutex::new("about:blank".to_string()),
        }
    }

    pub fn add_node(&self, selector: &str, snapshot: StructuralSnapshot) {
        lock(&self.nodes).insert(NodeRef::new(selector), snapshot);
    }

    /// Makes click/type/press on `selector` fail.
    pub fn fail_on(&self, selector: &str) {
        lock(&self.failing).insert(NodeRef::new(selector));
    }

    /// Capability calls in order, e.g. `"click #buy"`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Selectors whose snapshot was requested, in order.
    pub fn snapshot_log(&self) -> Vec<String> {
        lock(&self.snapshots).clone()
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }

    fn check(&self, selector: &NodeRef) -> Result<(), AgentError> {
        if lock(&self.failing).contains(selector) {
            return Err(AgentError::Execution(format!("element {selector} is not interactable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotProvider for FakeBrowser {
    async fn snapshot(&self, node: &NodeRef) -> Result<StructuralSnapshot, AgentError> {
        lock(&self.snapshots).push(node.to_string());
        lock(&self.nodes)
            .get(node)
            .cloned()
            .ok_or_else(|| AgentError::Execution(format!("no element matches {node}")))
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_url(&self, url: &str) -> Result<(), AgentError> {
        self.record(format!("open_url {url}"));
        *lock(&self.url) = url.to_string();
        Ok(())
    }

    async fn click(&self, selector: &NodeRef) -> Result<(), AgentError> {
        self.record(format!("click {selector}"));
        self.check(selector)
    }

    async fn type_into(&self, selector: &NodeRef, text: &str) -> Result<(), AgentError> {
        self.record(format!("type_into {selector} {text}"));
        self.check(selector)
    }

    async fn press(&self, key: &str, selector: Option<&NodeRef>) -> Result<(), AgentError> {
        self.record(format!("press {key}"));
        match selector {
            Some(sel) => self.check(sel),
            None => Ok(()),
        }
    }

    async fn wait(&self, ms: u64) -> Result<(), AgentError> {
        self.record(format!("wait {ms}"));
        Ok(())
    }

    async fn new_page(&self) -> Result<(), AgentError> {
        self.record("new_page".to_string());
        *lock(&self.url) = "about:blank".to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AgentError> {
        Ok(lock(&self.url).clone())
    }
}

/// Human who answers from a fixed script, then goes away.
pub struct ScriptedHuman {
    replies: Mutex<VecDeque<String>>,
    told: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            told: Mutex::new(Vec::new()),
        }
    }

    pub fn told(&self) -> Vec<String> {
        lock(&self.told).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl HumanChannel for ScriptedHuman {
    async fn tell(&self, message: &str) {
        lock(&self.told).push(message.to_string());
    }

    async fn ask(&self, _prompt: &str) -> Result<String, AgentError> {
        lock(&self.replies)
            .pop_front()
            .ok_or(AgentError::HumanChannelClosed)
    }
}
