//! Plan orchestrator: turns a task into a plan and walks it step by step.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::browser::Browser;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::events::{AgentEvent, Progress};
use crate::executor::ActionExecutor;
use crate::human::{HumanChannel, await_confirmation};
use crate::oracle::{
    HEALTH_CHECK_PROMPT, Oracle, TaskIntake, intake_prompt, is_affirmative, parse_plan,
    parse_task_intake, plan_prompt,
};
use crate::step::StepRunner;
use crate::types::{ExecutionOutcome, Plan, StepContext};

pub struct Agent {
    oracle: Arc<dyn Oracle>,
    human: Arc<dyn HumanChannel>,
    runner: StepRunner,
    progress: Progress,
}

impl Agent {
    pub fn new(
        browser: Arc<dyn Browser>,
        oracle: Arc<dyn Oracle>,
        human: Arc<dyn HumanChannel>,
        config: AgentConfig,
        progress: Progress,
    ) -> Self {
        let executor = ActionExecutor::new(browser, oracle.clone(), config.search)
            .with_progress(progress.clone());
        let runner = StepRunner::new(oracle.clone(), executor, config.max_attempts)
            .with_progress(progress.clone());
        Self {
            oracle,
            human,
            runner,
            progress,
        }
    }

    /// Asks the oracle for its affirmative token. `false` on any failure.
    pub async fn check_oracle(&self) -> bool {
        match self.oracle.respond(HEALTH_CHECK_PROMPT).await {
            Ok(reply) => is_affirmative(&reply),
            Err(e) => {
                error!(error = %e, "oracle health check failed");
                false
            }
        }
    }

    /// Decides whether a free-text message is something the agent should do.
    pub async fn intake(&self, message: &str) -> Result<TaskIntake, AgentError> {
        self.progress.emit(AgentEvent::Thinking);
        let reply = self.oracle.respond(&intake_prompt(message)).await?;
        parse_task_intake(&reply)
    }

    pub async fn make_plan(&self, task: &str) -> Result<Plan, AgentError> {
        self.progress.emit(AgentEvent::Thinking);
        let reply = self.oracle.respond(&plan_prompt(task)).await?;
        let plan = parse_plan(&reply)?;
        info!(steps = plan.len(), "plan ready");
        self.progress.emit(AgentEvent::PlanReady {
            steps: plan.steps().to_vec(),
        });
        Ok(plan)
    }

    /// Plans `task` and runs every step in order. Stops at the first step
    /// that runs out of attempts. Returns the final context.
    pub async fn run_task(&self, task: &str) -> Result<StepContext, AgentError> {
        let result = self.run_plan(task).await;
        match &result {
            Ok(_) => self.progress.emit(AgentEvent::TaskComplete),
            Err(e) => self.progress.emit(AgentEvent::TaskError {
                message: e.to_string(),
            }),
        }
        result
    }

    /// Like [`Agent::run_task`], abandoned as soon as `cancel` fires. All
    /// per-step and per-search state is dropped with the future.
    pub async fn run_task_cancellable(
        &self,
        task: &str,
        cancel: &CancellationToken,
    ) -> Result<StepContext, AgentError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(task, "task cancelled");
                self.progress.emit(AgentEvent::TaskError {
                    message: AgentError::Cancelled.to_string(),
                });
                Err(AgentError::Cancelled)
            }
            result = self.run_task(task) => result,
        }
    }

    async fn run_plan(&self, task: &str) -> Result<StepContext, AgentError> {
        let plan = self.make_plan(task).await?;
        let mut context = StepContext::for_task(task);

        for (index, step) in plan.steps().iter().enumerate() {
            let number = index + 1;
            info!(number, step = %step, "starting step");
            self.progress.emit(AgentEvent::StepStarted {
                number,
                description: step.clone(),
            });
            context.set("step", step.as_str());

            let report = self.runner.execute_step(step, &mut context).await?;
            if let ExecutionOutcome::HumanHandoffRequested { reason } = report.outcome {
                self.progress.emit(AgentEvent::HumanNeeded {
                    favour: reason.clone(),
                });
                await_confirmation(self.oracle.as_ref(), self.human.as_ref(), &reason).await?;
            }

            context.push_history(step);
            self.progress.emit(AgentEvent::StepComplete { number });
        }

        Ok(context)
    }
}
