use async_trait::async_trait;
use browser_pilot::{AgentError, AgentEvent, HumanChannel};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{Mutex, broadcast};

/// Terminal front end: prints progress and reads the human's replies.
pub struct Console {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HumanChannel for Console {
    async fn tell(&self, message: &str) {
        println!("Agent: {message}");
    }

    async fn ask(&self, prompt: &str) -> Result<String, AgentError> {
        print!("{prompt}\n▸ ");
        let _ = std::io::stdout().flush();
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(AgentError::HumanChannelClosed),
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                Err(AgentError::HumanChannelClosed)
            }
        }
    }
}

pub fn print_banner(browser_status: &str, model_status: &str) {
    println!(
        r#"
    ╔══════════════════════════════════════╗
    ║      AUTONOMOUS BROWSER AGENT        ║
    ╚══════════════════════════════════════╝
    [STATUS] Browser: {browser_status}
    [STATUS] Model:   {model_status}
"#
    );
}

/// Prints agent events until the channel closes.
pub async fn render_events(mut rx: broadcast::Receiver<AgentEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress display lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            AgentEvent::Thinking => println!("Agent: thinking..."),
            AgentEvent::PlanReady { steps } => {
                println!("Agent: plan -");
                for (i, step) in steps.iter().enumerate() {
                    println!("  {}. {}", i + 1, step);
                }
            }
            AgentEvent::StepStarted {
                number,
                description,
            } => println!("Agent: step {number} - {description}"),
            AgentEvent::Attempt { attempt, max, .. } => {
                println!("Agent: attempt {attempt}/{max}")
            }
            AgentEvent::Thought { text } => println!("Agent: thoughts - {text}"),
            AgentEvent::ActionDispatched { description } => {
                println!("Agent: executing {description}")
            }
            AgentEvent::ActionFailed {
                description,
                message,
            } => println!("Agent: {description} failed: {message}"),
            AgentEvent::BranchExplored { node, depth } => {
                println!("Agent: {}exploring {node}", "  ".repeat(depth))
            }
            AgentEvent::BranchFailed { node, message } => {
                println!("Agent: gave up on {node}: {message}")
            }
            AgentEvent::ElementFound { node } => println!("Agent: found {node}"),
            AgentEvent::HumanNeeded { .. } => println!("Agent: I need your help."),
            AgentEvent::StepComplete { number } => println!("Agent: step {number} done"),
            AgentEvent::TaskComplete => println!("Agent: task complete"),
            AgentEvent::TaskError { message } => println!("Agent: task failed: {message}"),
        }
    }
}
