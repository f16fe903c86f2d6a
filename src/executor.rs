//! Action executor: resolves oracle-named actions and dispatches them to the
//! browser, one isolated failure domain per action.

use std::sync::Arc;

use tracing::{info, warn};

use crate::action::{Action, ActionOutput, ActionReport, RawAction};
use crate::browser::Browser;
use crate::config::SearchConfig;
use crate::error::AgentError;
use crate::events::{AgentEvent, Progress};
use crate::oracle::Oracle;
use crate::search::ElementSearch;
use crate::types::NodeRef;

pub struct ActionExecutor {
    browser: Arc<dyn Browser>,
    oracle: Arc<dyn Oracle>,
    search: SearchConfig,
    progress: Progress,
}

impl ActionExecutor {
    pub fn new(browser: Arc<dyn Browser>, oracle: Arc<dyn Oracle>, search: SearchConfig) -> Self {
        Self {
            browser,
            oracle,
            search,
            progress: Progress::silent(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn browser(&self) -> &Arc<dyn Browser> {
        &self.browser
    }

    /// Runs one action. Never fails: the error, if any, is in the report.
    pub async fn execute(&self, raw: &RawAction) -> ActionReport {
        let (description, result) = match Action::from_raw(raw) {
            Ok(action) => {
                let description = action.to_string();
                info!(action = %description, "dispatching");
                self.progress.emit(AgentEvent::ActionDispatched {
                    description: description.clone(),
                });
                let result = self.dispatch(&action).await;
                (description, result)
            }
            Err(e) => (raw.name.clone(), Err(e)),
        };

        if let Err(e) = &result {
            warn!(action = %description, error = %e, "action failed");
            self.progress.emit(AgentEvent::ActionFailed {
                description: description.clone(),
                message: e.to_string(),
            });
        }

        ActionReport {
            action: description,
            result,
        }
    }

    /// Runs every action in order; a failing action does not stop the rest.
    pub async fn execute_batch(&self, actions: &[RawAction]) -> Vec<ActionReport> {
        let mut reports = Vec::with_capacity(actions.len());
        for raw in actions {
            reports.push(self.execute(raw).await);
        }
        reports
    }

    async fn dispatch(&self, action: &Action) -> Result<ActionOutput, AgentError> {
        let browser = self.browser.as_ref();
        match action {
            Action::OpenUrl { url } => browser.open_url(url).await.map(|_| ActionOutput::Done),
            Action::Click { selector } => browser.click(selector).await.map(|_| ActionOutput::Done),
            Action::TypeInto { selector, text } => browser
                .type_into(selector, text)
                .await
                .map(|_| ActionOutput::Done),
            Action::Press { key, selector } => browser
                .press(key, selector.as_ref())
                .await
                .map(|_| ActionOutput::Done),
            Action::Wait { ms } => browser.wait(*ms).await.map(|_| ActionOutput::Done),
            Action::NewPage => browser.new_page().await.map(|_| ActionOutput::Done),
            Action::GetPageUrl => browser.current_url().await.map(ActionOutput::Url),
            Action::AnalyzeStructure { selector } => browser
                .snapshot(selector)
                .await
                .map(|snap| ActionOutput::Snapshot(snap.normalized())),
            Action::FindElement { description } => {
                ElementSearch::new(browser, self.oracle.as_ref(), self.search)
                    .with_progress(self.progress.clone())
                    .find_element(description, &NodeRef::root())
                    .await
                    .map(ActionOutput::Element)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeBrowser, ScriptedOracle};
    use crate::types::StructuralSnapshot;
    use serde_json::json;

    fn executor(browser: Arc<FakeBrowser>, oracle: ScriptedOracle) -> ActionExecutor {
        ActionExecutor::new(browser, Arc::new(oracle), SearchConfig::default())
    }

    #[tokio::test]
    async fn failing_action_does_not_abort_the_batch() {
        let browser = Arc::new(FakeBrowser::new());
        let exec = executor(browser.clone(), ScriptedOracle::replies(["{}"]));

        let batch = vec![
            RawAction::new("click", json!({"selector": "#first"})),
            RawAction::new("type_into", json!({"selector": "#q"})),
            RawAction::new("press", json!({"key": "Enter"})),
        ];
        let reports = exec.execute_batch(&batch).await;

        assert_eq!(reports.len(), 3);
        assert!(reports[0].is_ok());
        assert!(matches!(reports[1].result, Err(AgentError::InvalidParameters { .. })));
        assert!(reports[2].is_ok());
        assert_eq!(browser.calls(), ["click #first", "press Enter"]);
    }

    #[tokio::test]
    async fn unknown_and_failing_actions_are_reported() {
        let browser = Arc::new(FakeBrowser::new());
        browser.fail_on("#broken");
        let exec = executor(browser.clone(), ScriptedOracle::replies(["{}"]));

        let batch = vec![
            RawAction::new("teleport", json!({})),
            RawAction::new("click", json!({"selector": "#broken"})),
            RawAction::new("open_url", json!({"url": "https://a.example"})),
        ];
        let reports = exec.execute_batch(&batch).await;

        assert_eq!(reports[0].result, Err(AgentError::UnknownAction("teleport".into())));
        assert!(matches!(reports[1].result, Err(AgentError::Execution(_))));
        assert!(reports[2].is_ok());
        assert_eq!(browser.current_url().await, Ok("https://a.example".to_string()));
    }

    #[tokio::test]
    async fn find_element_runs_the_search() {
        let browser = Arc::new(FakeBrowser::new());
        browser.add_node("body", StructuralSnapshot::new("body"));
        let oracle = ScriptedOracle::replies([
            json!({"found_selector": "input#q", "next_selectors": []}).to_string(),
        ]);
        let exec = executor(browser.clone(), oracle);

        let report = exec
            .execute(&RawAction::new("find_element", json!({"description": "search box"})))
            .await;

        assert_eq!(report.result, Ok(ActionOutput::Element(NodeRef::new("input#q"))));
        assert_eq!(report.summary(), "find_element(\"search box\") -> selector input#q");
    }

    #[tokio::test]
    async fn page_url_is_returned() {
        let browser = Arc::new(FakeBrowser::new());
        let exec = executor(browser, ScriptedOracle::replies(["{}"]));
        let report = exec.execute(&RawAction::new("get_page_url", json!({}))).await;
        assert_eq!(report.result, Ok(ActionOutput::Url("about:blank".into())));
    }
}
