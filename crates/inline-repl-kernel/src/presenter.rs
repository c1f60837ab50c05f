//! Presentation seams.
//!
//! The queue never renders anything itself; it tells a [`ResultPresenter`]
//! what happened to each task and a [`StatusPresenter`] what the queue looks
//! like. All render calls must be safe to repeat for the same origin.

use async_trait::async_trait;
use inline_repl_types::{DocumentKey, ExecutionOutput, Origin, QueueStatusSnapshot};

use crate::error::ExecutionError;

/// Renders per-task results.
#[async_trait]
pub trait ResultPresenter: Send + Sync {
    /// The task at `origin` started running.
    async fn render_executing(&self, origin: &Origin);

    /// Outputs accumulated so far. `is_executing` is false on the final call.
    async fn render_result(&self, outputs: &[ExecutionOutput], origin: &Origin, is_executing: bool);

    async fn render_error(&self, origin: &Origin, error: &ExecutionError);

    /// The task finished without producing any output.
    async fn render_complete(&self, origin: &Origin);

    /// The task is waiting behind another one.
    async fn render_queued(&self, origin: &Origin);

    async fn render_cancelled(&self, origin: &Origin);

    /// Drop every rendered result for a document.
    async fn clear_results(&self, document: &DocumentKey);
}

/// Receives the derived queue status after every structural change.
pub trait StatusPresenter: Send + Sync {
    fn update_status(&self, snapshot: &QueueStatusSnapshot);
}
