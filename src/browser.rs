//! Capabilities the agent needs from the browser.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::types::{NodeRef, StructuralSnapshot};

/// Read-only access to shallow node descriptions.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Describes `node` as it is right now. Fails if the selector no longer
    /// resolves.
    async fn snapshot(&self, node: &NodeRef) -> Result<StructuralSnapshot, AgentError>;
}

#[async_trait]
pub trait Browser: SnapshotProvider {
    async fn open_url(&self, url: &str) -> Result<(), AgentError>;

    async fn click(&self, selector: &NodeRef) -> Result<(), AgentError>;

    async fn type_into(&self, selector: &NodeRef, text: &str) -> Result<(), AgentError>;

    async fn press(&self, key: &str, selector: Option<&NodeRef>) -> Result<(), AgentError>;

    async fn wait(&self, ms: u64) -> Result<(), AgentError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }

    async fn new_page(&self) -> Result<(), AgentError>;

    async fn current_url(&self) -> Result<String, AgentError>;
}
