//! # inline-repl-kernel
//!
//! Core of inline-repl: runs code snippets taken from a document against a
//! live interactive kernel and streams results back to whatever renders them.
//!
//! The pieces:
//! - A [`KernelManager`] tracks the selected [`KernelSession`] and its status
//! - A [`StreamingExecutor`] turns one execution into classified output batches
//! - An [`OutputClassifier`] per language variant tells errors from output
//! - The [`ExecutionQueue`] runs one task at a time, in submission order, with
//!   tombstone-based cancellation
//! - Presenters ([`ResultPresenter`], [`StatusPresenter`]) receive everything
//!   the queue has to say
//!
//! Collaborators are wired through an explicit [`ReplContext`].

pub mod cell;
pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod presenter;
pub mod profile;
pub mod queue;
pub mod session;
pub mod status;

#[cfg(any(test, feature = "test-mock"))]
pub mod testing;

pub use cell::{CodeSpan, Target, TextDocument, execution_range, resolve_span, split_cells};
pub use classify::{GenericClassifier, OutputClassifier, RubyClassifier, RustClassifier};
pub use config::{ConfigError, ConfigManager, ReplConfig};
pub use context::ReplContext;
pub use error::{ClassifyError, ExecutionError, QueueError, SessionError};
pub use executor::{OutputBatch, OutputStream, StreamingExecutor};
pub use presenter::{ResultPresenter, StatusPresenter};
pub use profile::{LanguageProfile, Variant};
pub use queue::{ExecutionQueue, TaskEvent};
pub use session::{KernelManager, KernelSession, RawOutputStream};
pub use status::{IdleStatus, LogStatusPresenter, PresentationStatus, aggregate};
