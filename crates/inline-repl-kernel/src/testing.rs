//! Test doubles: a scripted kernel session and a recording presenter.
//!
//! Compiled for unit tests and behind the `test-mock` feature.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use inline_repl_types::{
    DocumentKey, ExecutionOutput, KernelStatus, Origin, QueueStatusSnapshot, RawOutput,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{ExecutionError, SessionError};
use crate::presenter::{ResultPresenter, StatusPresenter};
use crate::session::{KernelSession, RawOutputStream};

type ScriptItem = Result<RawOutput, SessionError>;

// ============================================================================
// ScriptedSession
// ============================================================================

/// Kernel session whose output is scripted per call.
///
/// Each `execute_code` call consumes the next script. Calls without a
/// script produce an empty stream.
pub struct ScriptedSession {
    language: String,
    scripts: Mutex<VecDeque<mpsc::UnboundedReceiver<ScriptItem>>>,
    executed: Mutex<Vec<String>>,
    tokens: Mutex<Vec<CancellationToken>>,
    status: watch::Sender<KernelStatus>,
}

impl ScriptedSession {
    pub fn new(language: impl Into<String>) -> Self {
        let (status, _) = watch::channel(KernelStatus::Idle);
        Self {
            language: language.into(),
            scripts: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            status,
        }
    }

    /// Script the next call with a fixed list of messages.
    pub fn script_items(&self, items: Vec<ScriptItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in items {
            let _ = tx.send(item);
        }
        self.scripts.lock().push_back(rx);
    }

    /// Script the next call as a live stream driven through the returned
    /// sender. The stream ends when the sender is dropped.
    pub fn script_live(&self) -> mpsc::UnboundedSender<ScriptItem> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().push_back(rx);
        tx
    }

    /// Code passed to every call so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Cancellation token of the most recent call.
    pub fn last_token(&self) -> Option<CancellationToken> {
        self.tokens.lock().last().cloned()
    }

    pub fn set_status(&self, status: KernelStatus) {
        self.status.send_replace(status);
    }
}

impl KernelSession for ScriptedSession {
    fn language(&self) -> &str {
        &self.language
    }

    fn execute_code(&self, code: &str, cancel: CancellationToken) -> RawOutputStream {
        self.executed.lock().push(code.to_string());
        self.tokens.lock().push(cancel);

        match self.scripts.lock().pop_front() {
            Some(rx) => futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => futures::stream::empty().boxed(),
        }
    }

    fn status(&self) -> watch::Receiver<KernelStatus> {
        self.status.subscribe()
    }
}

// ============================================================================
// RecordingPresenter
// ============================================================================

/// One recorded presenter call.
#[derive(Clone, Debug, PartialEq)]
pub enum PresenterCall {
    Executing(Origin),
    Result {
        origin: Origin,
        outputs: Vec<ExecutionOutput>,
        is_executing: bool,
    },
    Error {
        origin: Origin,
        message: String,
    },
    Complete(Origin),
    Queued(Origin),
    Cancelled(Origin),
    Clear(DocumentKey),
}

impl PresenterCall {
    /// Origin the call refers to (`None` for document-wide clears).
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Self::Executing(o) | Self::Complete(o) | Self::Queued(o) | Self::Cancelled(o) => {
                Some(o)
            }
            Self::Result { origin, .. } | Self::Error { origin, .. } => Some(origin),
            Self::Clear(_) => None,
        }
    }
}

/// Presenter that records every call, plus every status snapshot.
///
/// Renders can be made to suspend for a while before they land; a delayed
/// call is recorded when it returns.
#[derive(Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<PresenterCall>>,
    snapshots: Mutex<Vec<QueueStatusSnapshot>>,
    notify: Notify,
    queued_delay: Option<Duration>,
    result_delay: Option<Duration>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend every `render_queued` call for `delay`.
    pub fn with_queued_delay(mut self, delay: Duration) -> Self {
        self.queued_delay = Some(delay);
        self
    }

    /// Suspend every `render_result` call for `delay`.
    pub fn with_result_delay(mut self, delay: Duration) -> Self {
        self.result_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().clone()
    }

    /// Calls referring to `origin`.
    pub fn calls_for(&self, origin: &Origin) -> Vec<PresenterCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.origin() == Some(origin))
            .cloned()
            .collect()
    }

    pub fn snapshots(&self) -> Vec<QueueStatusSnapshot> {
        self.snapshots.lock().clone()
    }

    /// Wait until `pred` holds for the recorded calls.
    pub async fn wait_until(&self, pred: impl Fn(&[PresenterCall]) -> bool) {
        loop {
            let notified = self.notify.notified();
            if pred(&self.calls.lock()) {
                return;
            }
            notified.await;
        }
    }

    async fn suspend(delay: Option<Duration>) {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, call: PresenterCall) {
        self.calls.lock().push(call);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl ResultPresenter for RecordingPresenter {
    async fn render_executing(&self, origin: &Origin) {
        self.record(PresenterCall::Executing(origin.clone()));
    }

    async fn render_result(&self, outputs: &[ExecutionOutput], origin: &Origin, is_executing: bool) {
        Self::suspend(self.result_delay).await;
        self.record(PresenterCall::Result {
            origin: origin.clone(),
            outputs: outputs.to_vec(),
            is_executing,
        });
    }

    async fn render_error(&self, origin: &Origin, error: &ExecutionError) {
        self.record(PresenterCall::Error {
            origin: origin.clone(),
            message: error.to_string(),
        });
    }

    async fn render_complete(&self, origin: &Origin) {
        self.record(PresenterCall::Complete(origin.clone()));
    }

    async fn render_queued(&self, origin: &Origin) {
        Self::suspend(self.queued_delay).await;
        self.record(PresenterCall::Queued(origin.clone()));
    }

    async fn render_cancelled(&self, origin: &Origin) {
        self.record(PresenterCall::Cancelled(origin.clone()));
    }

    async fn clear_results(&self, document: &DocumentKey) {
        self.record(PresenterCall::Clear(document.clone()));
    }
}

impl StatusPresenter for RecordingPresenter {
    fn update_status(&self, snapshot: &QueueStatusSnapshot) {
        self.snapshots.lock().push(*snapshot);
    }
}
