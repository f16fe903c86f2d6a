//! Drives one plan step to completion.
//!
//! Each attempt asks the oracle what to do about the step and acts on the
//! answer: `success` ends the step, `wait_for_the_human` hands it to a human,
//! and an action batch is dispatched before asking again. Every request,
//! whether it follows a batch or a failure, spends one attempt.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::action::Action;
use crate::error::AgentError;
use crate::events::{AgentEvent, Progress};
use crate::executor::ActionExecutor;
use crate::oracle::{Directive, Oracle, StepJudgment, parse_step_judgment, step_prompt};
use crate::types::{ExecutionOutcome, NodeRef, StepContext, StepReport};

pub struct StepRunner {
    oracle: Arc<dyn Oracle>,
    executor: ActionExecutor,
    max_attempts: u32,
    progress: Progress,
}

impl StepRunner {
    pub fn new(oracle: Arc<dyn Oracle>, executor: ActionExecutor, max_attempts: u32) -> Self {
        Self {
            oracle,
            executor,
            max_attempts,
            progress: Progress::silent(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Runs `step` until the oracle reports success or asks for a human.
    /// Running out of attempts is fatal for the step.
    pub async fn execute_step(
        &self,
        step: &str,
        context: &mut StepContext,
    ) -> Result<StepReport, AgentError> {
        let mut last_cause = "no attempt made".to_string();

        for attempt in 1..=self.max_attempts {
            info!(step, attempt, max = self.max_attempts, "requesting actions");
            self.progress.emit(AgentEvent::Attempt {
                step: step.to_string(),
                attempt,
                max: self.max_attempts,
            });

            match self.attempt(step, context).await {
                outcome @ (ExecutionOutcome::Success
                | ExecutionOutcome::HumanHandoffRequested { .. }) => {
                    return Ok(StepReport {
                        outcome,
                        attempts: attempt,
                    });
                }
                ExecutionOutcome::ActionsExecuted(reports) => {
                    let failed = reports.iter().filter(|r| !r.is_ok()).count();
                    info!(step, executed = reports.len(), failed, "batch done, re-evaluating step");
                    last_cause = "step still incomplete after the last action batch".to_string();
                }
                ExecutionOutcome::Failed(e) => {
                    warn!(step, attempt, error = %e, "attempt failed");
                    last_cause = e.to_string();
                }
            }
        }

        Err(AgentError::ExhaustedFailure {
            step: step.to_string(),
            attempts: self.max_attempts,
            last_cause,
        })
    }

    /// One pass through Requesting and, for a batch, Dispatching.
    pub async fn attempt(&self, step: &str, context: &mut StepContext) -> ExecutionOutcome {
        let judgment = match self.request(step, context).await {
            Ok(judgment) => judgment,
            Err(e) => return ExecutionOutcome::Failed(e),
        };

        if !judgment.thought.is_empty() {
            self.progress.emit(AgentEvent::Thought {
                text: judgment.thought.clone(),
            });
        }

        match judgment.directive {
            Directive::Success => {
                context.merge(&judgment.context_delta);
                ExecutionOutcome::Success
            }
            Directive::WaitForHuman => ExecutionOutcome::HumanHandoffRequested {
                reason: judgment.thought,
            },
            Directive::Batch(actions) => {
                // Applied before dispatch and kept whatever the actions do.
                context.merge(&judgment.context_delta);
                let reports = self.executor.execute_batch(&actions).await;
                let summaries: Vec<Value> =
                    reports.iter().map(|r| Value::from(r.summary())).collect();
                context.set("last_action_results", summaries);
                ExecutionOutcome::ActionsExecuted(reports)
            }
        }
    }

    async fn request(&self, step: &str, context: &mut StepContext) -> Result<StepJudgment, AgentError> {
        let url = self.executor.browser().current_url().await?;
        context.set("current_url", url);
        context.set("root", NodeRef::root().to_string());

        self.progress.emit(AgentEvent::Thinking);
        let prompt = step_prompt(step, &context.to_prompt_json(), &Action::catalog());
        let reply = self.oracle.respond(&prompt).await?;
        tracing::debug!(reply = %reply, "step oracle reply");
        parse_step_judgment(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::mock::{FakeBrowser, ScriptedOracle};
    use serde_json::json;

    fn runner(browser: Arc<FakeBrowser>, oracle: Arc<ScriptedOracle>, max_attempts: u32) -> StepRunner {
        let executor = ActionExecutor::new(browser, oracle.clone(), SearchConfig::default());
        StepRunner::new(oracle, executor, max_attempts)
    }

    #[tokio::test]
    async fn success_on_first_request() {
        let browser = Arc::new(FakeBrowser::new());
        let oracle = Arc::new(ScriptedOracle::replies([
            r#"{"thought": "already there", "actions": "success", "context": {"logged_in": true}}"#,
        ]));
        let mut ctx = StepContext::for_task("t");

        let report = runner(browser.clone(), oracle.clone(), 4)
            .execute_step("open the site", &mut ctx)
            .await
            .unwrap();

        assert_eq!(report.outcome, ExecutionOutcome::Success);
        assert_eq!(report.attempts, 1);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(ctx.get("logged_in"), Some(&json!(true)));
        assert!(browser.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_replies_exhaust_the_budget() {
        let browser = Arc::new(FakeBrowser::new());
        let oracle = Arc::new(ScriptedOracle::replies(["Let me think about it..."]));
        let mut ctx = StepContext::for_task("t");

        let result = runner(browser.clone(), oracle.clone(), 4)
            .execute_step("search", &mut ctx)
            .await;

        assert!(matches!(
            result,
            Err(AgentError::ExhaustedFailure { attempts: 4, .. })
        ));
        assert_eq!(oracle.calls(), 4);
        assert!(browser.calls().is_empty());
    }

    #[tokio::test]
    async fn human_handoff_skips_dispatch() {
        let browser = Arc::new(FakeBrowser::new());
        let oracle = Arc::new(ScriptedOracle::replies([
            r#"{"thought": "please log in", "actions": "wait_for_the_human"}"#,
        ]));
        let mut ctx = StepContext::for_task("t");

        let report = runner(browser.clone(), oracle, 4)
            .execute_step("log in", &mut ctx)
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            ExecutionOutcome::HumanHandoffRequested {
                reason: "please log in".into()
            }
        );
        assert!(browser.calls().is_empty());
    }

    #[tokio::test]
    async fn batch_then_success() {
        let browser = Arc::new(FakeBrowser::new());
        let batch = json!({
            "thought": "go to the shop",
            "actions": [
                {"name": "open_url", "parameters": {"url": "https://shop.example"}},
                {"name": "click", "parameters": {}}
            ],
            "context": {"site": "shop"}
        })
        .to_string();
        let oracle = Arc::new(ScriptedOracle::replies([
            batch,
            r#"{"thought": "on the shop", "actions": "success"}"#.to_string(),
        ]));
        let mut ctx = StepContext::for_task("t");

        let report = runner(browser.clone(), oracle.clone(), 4)
            .execute_step("open the shop", &mut ctx)
            .await
            .unwrap();

        assert_eq!(report.outcome, ExecutionOutcome::Success);
        assert_eq!(report.attempts, 2);
        assert_eq!(browser.calls(), ["open_url https://shop.example"]);
        assert_eq!(ctx.get("site"), Some(&json!("shop")));
        assert_eq!(ctx.get("current_url"), Some(&json!("https://shop.example")));
        let results = ctx.get("last_action_results").and_then(Value::as_array).unwrap();
        assert_eq!(results.len(), 2);
        assert!(oracle.prompts()[1].contains("open_url(https://shop.example) -> ok"));
    }

    #[tokio::test]
    async fn batches_spend_the_same_budget() {
        let browser = Arc::new(FakeBrowser::new());
        let oracle = Arc::new(ScriptedOracle::replies([json!({
            "actions": [{"name": "wait", "parameters": {"ms": 10}}]
        })
        .to_string()]));
        let mut ctx = StepContext::for_task("t");

        let result = runner(browser.clone(), oracle, 3)
            .execute_step("wait forever", &mut ctx)
            .await;

        assert!(matches!(
            result,
            Err(AgentError::ExhaustedFailure { attempts: 3, .. })
        ));
        assert_eq!(browser.calls().len(), 3);
    }
}
