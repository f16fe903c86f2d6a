mod brain;
mod dom;
mod face;
mod hands;

use anyhow::{Context, Result};
use browser_pilot::{
    Agent, AgentConfig, AgentError, AgentEvent, HumanChannel, Progress, SearchConfig, TaskIntake,
};
use clap::Parser;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "agent", about = "Autonomous browser agent driven by a language model")]
struct Args {
    /// Model API to use as the oracle.
    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value = "openai")]
    provider: brain::Provider,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Defaults to the provider's standard model.
    #[arg(long, env = "LLM_MODEL")]
    model: Option<String>,

    /// Defaults to the provider's public endpoint.
    #[arg(long, env = "LLM_BASE_URL")]
    base_url: Option<String>,

    /// Frames on the element-search stack, root included.
    #[arg(long, default_value_t = 3)]
    max_depth: usize,

    /// Candidates tried per search frame.
    #[arg(long, default_value_t = 5)]
    max_branches: usize,

    /// Oracle requests allowed per plan step.
    #[arg(long, default_value_t = 4)]
    max_attempts: u32,

    /// DevTools port of an already running Chrome to attach to.
    #[arg(long, default_value_t = 9222)]
    chrome_port: u16,

    #[arg(long)]
    headless: bool,
}

impl Args {
    fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            search: SearchConfig {
                max_depth: self.max_depth,
                max_branches: self.max_branches,
                ..SearchConfig::default()
            },
            max_attempts: self.max_attempts,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.agent_config();

    let (event_tx, event_rx) = broadcast::channel::<AgentEvent>(64);
    tokio::spawn(face::render_events(event_rx));

    // The browser can take a while to come up, keep it off the runtime.
    let (port, headless) = (args.chrome_port, args.headless);
    let session = tokio::task::spawn_blocking(move || hands::BrowserSession::launch(port, headless))
        .await
        .context("Browser launch panicked")?
        .context("Browser launch failed")?;

    let provider = args.provider;
    let model = args
        .model
        .unwrap_or_else(|| provider.default_model().to_string());
    let base_url = args
        .base_url
        .unwrap_or_else(|| provider.default_base_url().to_string());
    let brain = brain::Brain::new(provider, args.api_key, model.clone(), base_url);
    let console = Arc::new(face::Console::new());
    let agent = Agent::new(
        Arc::new(session),
        Arc::new(brain),
        console.clone(),
        config,
        Progress::new(event_tx),
    );

    let model_status = if agent.check_oracle().await {
        format!("{model} ready")
    } else {
        format!("{model} not responding")
    };
    face::print_banner("ready", &model_status);

    loop {
        let message = match console.ask("What should I do?").await {
            Ok(message) => message,
            Err(AgentError::HumanChannelClosed) => break,
            Err(e) => return Err(e.into()),
        };
        if message.trim().is_empty() {
            continue;
        }

        let task = match agent.intake(&message).await {
            Ok(TaskIntake::Task(task)) => task,
            Ok(TaskIntake::NotATask(reason)) => {
                console
                    .tell(&format!("Please send a clear task to perform. ({reason})"))
                    .await;
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "task intake failed");
                console.tell("Please send a clear task to perform.").await;
                continue;
            }
        };

        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        match agent.run_task_cancellable(&task, &cancel).await {
            Ok(_) => tracing::info!(task = %task, "task finished"),
            Err(e) => tracing::error!(task = %task, error = %e, "task failed"),
        }
        watcher.abort();
    }

    tracing::info!("input closed, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_and_search_limits_from_flags() {
        let args = Args::try_parse_from([
            "agent",
            "--provider",
            "gemini",
            "--api-key",
            "k",
            "--max-branches",
            "2",
        ])
        .unwrap();
        assert_eq!(args.provider, brain::Provider::Gemini);
        assert_eq!(args.agent_config().search.max_branches, 2);
        assert_eq!(args.agent_config().search.max_depth, 3);
        assert_eq!(args.agent_config().max_attempts, 4);
    }
}
