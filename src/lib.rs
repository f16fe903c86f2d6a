//! Oracle-driven browser agent core.
//!
//! A task is planned into steps by the oracle; each step is driven by
//! [`step::StepRunner`], which dispatches oracle-proposed [`action::Action`]s
//! through [`executor::ActionExecutor`]. Locating an element by description
//! runs the backtracking [`search::ElementSearch`] over shallow page
//! snapshots.

pub mod action;
pub mod browser;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod human;
pub mod mock;
pub mod oracle;
pub mod orchestrator;
pub mod search;
pub mod step;
pub mod types;

pub use action::{Action, ActionOutput, ActionReport, RawAction};
pub use browser::{Browser, SnapshotProvider};
pub use config::{AgentConfig, SearchConfig};
pub use error::AgentError;
pub use events::{AgentEvent, Progress};
pub use executor::ActionExecutor;
pub use human::{HumanChannel, await_confirmation};
pub use oracle::{Oracle, TaskIntake};
pub use orchestrator::Agent;
pub use search::ElementSearch;
pub use step::StepRunner;
pub use types::{ExecutionOutcome, NodeRef, Plan, StepContext, StepReport, StructuralSnapshot};
