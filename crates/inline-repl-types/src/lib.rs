//! Shared types for inline-repl.
//!
//! This crate is the data model: typed task ids, source origins, kernel
//! output, kernel status, and the task record the execution queue owns. It
//! has **no internal inline-repl dependencies** — a pure leaf crate that the
//! kernel and CLI crates build on.
//!
//! # Key Types
//!
//! |-------------------------|-----------------------------------------------|
//! | Type                    | Purpose                                       |
//! |-------------------------|-----------------------------------------------|
//! | [`TaskId`]              | Which execution request                       |
//! | [`Origin`]              | Document + source range a task came from      |
//! | [`ExecutionTask`]       | One submitted code-execution request          |
//! | [`RawOutput`]           | What a kernel session streams back            |
//! | [`ExecutionOutput`]     | Classified output (ok or error)               |
//! | [`KernelStatus`]        | Backend session status                        |
//! | [`QueueStatusSnapshot`] | Derived queue status for presentation         |
//! |-------------------------|-----------------------------------------------|

pub mod ids;
pub mod kernel;
pub mod origin;
pub mod output;
pub mod task;

// Re-export primary types at crate root for convenience.
pub use ids::TaskId;
pub use kernel::KernelStatus;
pub use origin::{DocumentKey, Origin, Position, SourceRange};
pub use output::{ExecutionOutput, OutputKind, RawOutput, RawOutputItem};
pub use task::{ExecutionTask, QueueStatusSnapshot, TaskStatus};
