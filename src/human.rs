//! Human handoff: the agent stops and waits until a person confirms it may go on.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::oracle::{Oracle, confirmation_prompt, is_affirmative};

#[async_trait]
pub trait HumanChannel: Send + Sync {
    async fn tell(&self, message: &str);

    /// Shows `prompt` and waits for a line of input.
    /// `HumanChannelClosed` when no more input will ever come.
    async fn ask(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Shows `favour` and loops on human replies until the oracle classifies one
/// as a confirmation. No timeout here; callers cancel from outside.
pub async fn await_confirmation(
    oracle: &dyn Oracle,
    human: &dyn HumanChannel,
    favour: &str,
) -> Result<(), AgentError> {
    human.tell(favour).await;
    loop {
        let reply = human.ask("Reply when done, or tell me to continue").await?;
        if reply.trim().is_empty() {
            continue;
        }
        match oracle.respond(&confirmation_prompt(&reply)).await {
            Ok(verdict) if is_affirmative(&verdict) => {
                info!("human confirmed, resuming");
                return Ok(());
            }
            Ok(_) => human.tell("Waiting for your confirmation.").await,
            Err(e) => warn!(error = %e, "could not classify human reply"),
        }
    }
}
