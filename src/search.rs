//! Oracle-guided, bounded, backtracking element search.
//!
//! The descent path is an explicit stack of frames owned by one
//! [`ElementSearch::find_element`] call. Each frame is expanded once: its
//! snapshot is fetched and the oracle either names a match or ranks children
//! to try next. Children are pushed one at a time; when a frame runs out of
//! candidates it is popped and its parent continues with its next candidate.
//! Every selector enters the visited set the moment it is tried and is never
//! expanded again, which bounds the search even when the oracle keeps
//! suggesting the same nodes.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::browser::SnapshotProvider;
use crate::config::SearchConfig;
use crate::error::AgentError;
use crate::events::{AgentEvent, Progress};
use crate::oracle::{Oracle, parse_search_judgment, search_prompt};
use crate::types::NodeRef;

struct Frame {
    node: NodeRef,
    depth: usize,
    /// `None` until the frame has been expanded.
    candidates: Option<Vec<NodeRef>>,
    cursor: usize,
}

impl Frame {
    fn new(node: NodeRef, depth: usize) -> Self {
        Self {
            node,
            depth,
            candidates: None,
            cursor: 0,
        }
    }
}

enum Expansion {
    Found(NodeRef),
    Candidates(Vec<NodeRef>),
}

pub struct ElementSearch<'a, P: SnapshotProvider + ?Sized> {
    provider: &'a P,
    oracle: &'a dyn Oracle,
    config: SearchConfig,
    progress: Progress,
}

impl<'a, P: SnapshotProvider + ?Sized> ElementSearch<'a, P> {
    pub fn new(provider: &'a P, oracle: &'a dyn Oracle, config: SearchConfig) -> Self {
        Self {
            provider,
            oracle,
            config,
            progress: Progress::silent(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Finds the node matching `goal` below `root`, or `NotFound` once every
    /// branch within the depth and branch limits has been tried.
    pub async fn find_element(&self, goal: &str, root: &NodeRef) -> Result<NodeRef, AgentError> {
        info!(goal, root = %root, "searching for element");
        let max_depth = self.config.max_depth.max(1);

        let mut stack = vec![Frame::new(root.clone(), 0)];
        let mut visited: HashSet<NodeRef> = HashSet::from([root.clone()]);
        let mut visit_order: Vec<NodeRef> = vec![root.clone()];

        while let Some(top) = stack.last() {
            if top.candidates.is_none() {
                let path: Vec<NodeRef> = stack.iter().map(|f| f.node.clone()).collect();
                let recent_from = visit_order.len().saturating_sub(self.config.recent_visited);
                let expansion = self
                    .expand(goal, &top.node, top.depth, &path, &visit_order[recent_from..])
                    .await;

                match expansion {
                    Ok(Expansion::Found(node)) => {
                        info!(node = %node, "element found");
                        self.progress.emit(AgentEvent::ElementFound {
                            node: node.to_string(),
                        });
                        return Ok(node);
                    }
                    Ok(Expansion::Candidates(next)) => {
                        let Some(frame) = stack.last_mut() else { break };
                        frame.candidates = Some(if frame.depth + 1 < max_depth {
                            self.filter_candidates(next, &visited)
                        } else {
                            Vec::new()
                        });
                    }
                    Err(e) => {
                        if let Some(failed) = stack.pop() {
                            warn!(node = %failed.node, error = %e, "branch failed, backtracking");
                            self.progress.emit(AgentEvent::BranchFailed {
                                node: failed.node.to_string(),
                                message: e.to_string(),
                            });
                        }
                        continue;
                    }
                }
            }

            let Some(frame) = stack.last_mut() else { break };
            let depth = frame.depth;
            let next = match &frame.candidates {
                Some(candidates) => {
                    let mut picked = None;
                    while frame.cursor < candidates.len() {
                        let candidate = &candidates[frame.cursor];
                        frame.cursor += 1;
                        // A deeper frame may have reached it since the list was filtered.
                        if !visited.contains(candidate) {
                            picked = Some(candidate.clone());
                            break;
                        }
                    }
                    picked
                }
                None => None,
            };

            match next {
                Some(node) => {
                    visited.insert(node.clone());
                    visit_order.push(node.clone());
                    stack.push(Frame::new(node, depth + 1));
                }
                None => {
                    stack.pop();
                }
            }
        }

        info!(goal, explored = visit_order.len(), "search space exhausted");
        Err(AgentError::NotFound(goal.to_string()))
    }

    async fn expand(
        &self,
        goal: &str,
        node: &NodeRef,
        depth: usize,
        path: &[NodeRef],
        recent: &[NodeRef],
    ) -> Result<Expansion, AgentError> {
        info!(node = %node, depth, "exploring");
        self.progress.emit(AgentEvent::BranchExplored {
            node: node.to_string(),
            depth,
        });

        let snapshot = self.provider.snapshot(node).await?.normalized();
        let prompt = search_prompt(&snapshot, goal, node, path, recent, self.config.max_branches);
        let reply = self.oracle.respond(&prompt).await?;
        tracing::debug!(reply = %reply, "search oracle reply");
        let judgment = parse_search_judgment(&reply)?;

        Ok(match judgment.found {
            Some(found) => Expansion::Found(found),
            None => Expansion::Candidates(judgment.next),
        })
    }

    /// Drops already-visited and repeated selectors, keeping the oracle's
    /// order, then caps the list at `max_branches`.
    fn filter_candidates(&self, next: Vec<NodeRef>, visited: &HashSet<NodeRef>) -> Vec<NodeRef> {
        let mut seen = HashSet::new();
        next.into_iter()
            .filter(|n| !visited.contains(n) && seen.insert(n.clone()))
            .take(self.config.max_branches)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeBrowser, ScriptedOracle};
    use crate::types::StructuralSnapshot;
    use serde_json::json;

    fn next(selectors: &[&str]) -> String {
        json!({"found_selector": null, "next_selectors": selectors}).to_string()
    }

    fn found(selector: &str) -> String {
        json!({"found_selector": selector, "next_selectors": []}).to_string()
    }

    fn page(nodes: &[&str]) -> FakeBrowser {
        let browser = FakeBrowser::new();
        for node in nodes {
            browser.add_node(node, StructuralSnapshot::new("div").with_attr("id", node));
        }
        browser
    }

    #[tokio::test]
    async fn backtracks_out_of_a_dead_branch() {
        let browser = page(&["body", "#sectionA", "#sectionB", "#inputX"]);
        let oracle = ScriptedOracle::new(|prompt| {
            Ok(if prompt.contains("Current node: #inputX") {
                found("#inputX")
            } else if prompt.contains("Current node: #sectionB") {
                next(&["#inputX"])
            } else if prompt.contains("Current node: #sectionA") {
                next(&[])
            } else {
                next(&["#sectionA", "#sectionB"])
            })
        });

        let search = ElementSearch::new(&browser, &oracle, SearchConfig::default());
        let result = search.find_element("input X", &NodeRef::root()).await;

        assert_eq!(result, Ok(NodeRef::new("#inputX")));
        assert_eq!(browser.snapshot_log(), ["body", "#sectionA", "#sectionB", "#inputX"]);
    }

    #[tokio::test]
    async fn repeating_oracle_terminates_without_revisits() {
        let browser = page(&["body", "#a", "#b", "#c"]);
        let oracle = ScriptedOracle::new(|_| Ok(next(&["#a", "#b", "#c", "body"])));

        let search = ElementSearch::new(&browser, &oracle, SearchConfig::default());
        let result = search.find_element("anything", &NodeRef::root()).await;

        assert!(matches!(result, Err(AgentError::NotFound(_))));
        let log = browser.snapshot_log();
        let unique: HashSet<_> = log.iter().collect();
        assert_eq!(unique.len(), log.len(), "revisited a node: {log:?}");
        assert_eq!(oracle.calls(), log.len());
    }

    #[tokio::test]
    async fn detached_node_only_fails_its_branch() {
        // "#gone" has no snapshot.
        let browser = page(&["body", "#ok"]);
        let oracle = ScriptedOracle::new(|prompt| {
            Ok(if prompt.contains("Current node: #ok") {
                found("#ok input")
            } else {
                next(&["#gone", "#ok"])
            })
        });

        let search = ElementSearch::new(&browser, &oracle, SearchConfig::default());
        assert_eq!(
            search.find_element("input", &NodeRef::root()).await,
            Ok(NodeRef::new("#ok input"))
        );
    }

    #[tokio::test]
    async fn malformed_reply_only_fails_its_branch() {
        let browser = page(&["body", "#noisy", "#good"]);
        let oracle = ScriptedOracle::new(|prompt| {
            Ok(if prompt.contains("Current node: #noisy") {
                "I am not sure.".to_string()
            } else if prompt.contains("Current node: #good") {
                found("#good button")
            } else {
                next(&["#noisy", "#good"])
            })
        });

        let search = ElementSearch::new(&browser, &oracle, SearchConfig::default());
        assert_eq!(
            search.find_element("button", &NodeRef::root()).await,
            Ok(NodeRef::new("#good button"))
        );
    }

    #[tokio::test]
    async fn root_failure_is_not_found() {
        let browser = FakeBrowser::new();
        let oracle = ScriptedOracle::new(|_| Ok(next(&[])));
        let search = ElementSearch::new(&browser, &oracle, SearchConfig::default());
        assert!(matches!(
            search.find_element("x", &NodeRef::root()).await,
            Err(AgentError::NotFound(_))
        ));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn branch_cap_respects_oracle_order() {
        let browser = page(&["body", "#1", "#2", "#3", "#4"]);
        let oracle = ScriptedOracle::new(|prompt| {
            Ok(if prompt.contains("Current node: body") {
                next(&["#1", "#2", "#3", "#4"])
            } else {
                next(&[])
            })
        });
        let config = SearchConfig {
            max_branches: 2,
            ..SearchConfig::default()
        };

        let search = ElementSearch::new(&browser, &oracle, config);
        let _ = search.find_element("x", &NodeRef::root()).await;
        assert_eq!(browser.snapshot_log(), ["body", "#1", "#2"]);
        assert!(oracle.prompts()[0].contains("choose up to 2 of"));
    }

    #[tokio::test]
    async fn depth_limit_bounds_the_descent() {
        let browser = page(&["body", "#l1", "#l2", "#l3"]);
        let oracle = ScriptedOracle::new(|prompt| {
            Ok(if prompt.contains("Current node: #l2") {
                next(&["#l3"])
            } else if prompt.contains("Current node: #l1") {
                next(&["#l2"])
            } else {
                next(&["#l1"])
            })
        });

        let search = ElementSearch::new(&browser, &oracle, SearchConfig::default());
        let result = search.find_element("deep", &NodeRef::root()).await;
        assert!(matches!(result, Err(AgentError::NotFound(_))));
        assert_eq!(browser.snapshot_log(), ["body", "#l1", "#l2"]);
    }
}
