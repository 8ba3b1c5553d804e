//! Shared vocabulary of the agent runtime.
//!
//! This crate is intentionally small and dependency-light: it defines the
//! identity primitives (task kinds, owners, ids, activation tokens), the
//! per-task phase machine, submission specs, run state, the lifecycle event
//! stream, and the failure taxonomy. The scheduler, executors, and storage
//! layers all speak these types; none of them is defined twice.

mod error;
mod events;
mod phase;
mod spec;
mod state;
mod task;

pub use error::FailureReason;
pub use error::ParsePrimitiveError;
pub use error::TerminationReason;
pub use events::DropReason;
pub use events::RuntimeEvent;
pub use phase::TaskPhase;
pub use spec::Decision;
pub use spec::QueuePolicy;
pub use spec::RequestSource;
pub use spec::TaskSpec;
pub use spec::VisibilityPolicy;
pub use state::RunState;
pub use task::ActiveToken;
pub use task::TaskId;
pub use task::TaskKind;
pub use task::TaskOwner;
