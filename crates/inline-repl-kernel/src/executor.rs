//! Streaming executor: kernel output → classified output batches.
//!
//! Wraps one `execute_code` call on the selected session. Each raw message
//! becomes one batch of [`ExecutionOutput`]s, classified item by item. The
//! resulting stream is lazy and non-restartable; dropping it cancels the
//! per-call token and nothing else needs tearing down.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};
use inline_repl_types::{ExecutionOutput, RawOutput};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::classify::OutputClassifier;
use crate::error::ExecutionError;
use crate::session::KernelManager;

/// A non-empty, ordered batch of classified outputs.
pub type OutputBatch = Vec<ExecutionOutput>;

/// Classified output of one execution.
///
/// Holds the call's cancellation token; dropping the stream cancels it.
pub struct OutputStream {
    inner: BoxStream<'static, Result<OutputBatch, ExecutionError>>,
    _cancel: DropGuard,
}

impl Stream for OutputStream {
    type Item = Result<OutputBatch, ExecutionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Runs code on the selected kernel session and classifies what comes back.
#[derive(Clone)]
pub struct StreamingExecutor {
    kernels: Arc<KernelManager>,
    classifier: Arc<dyn OutputClassifier>,
}

impl StreamingExecutor {
    pub fn new(kernels: Arc<KernelManager>, classifier: Arc<dyn OutputClassifier>) -> Self {
        Self {
            kernels,
            classifier,
        }
    }

    /// Start executing `code`.
    ///
    /// Fails with [`ExecutionError::KernelUnavailable`] when no session is
    /// selected. Stream items carry session failures, with disposal
    /// normalized to `KernelUnavailable` and everything else unclassified.
    pub fn execute(&self, code: &str) -> Result<OutputStream, ExecutionError> {
        let session = self
            .kernels
            .current()
            .ok_or_else(|| ExecutionError::KernelUnavailable("no kernel selected".into()))?;

        let token = CancellationToken::new();
        let raw = session.execute_code(code, token.clone());
        let classifier = Arc::clone(&self.classifier);
        debug!(language = session.language(), bytes = code.len(), "execution started");

        let inner = raw
            .filter_map(move |message| {
                let batch = match message {
                    Ok(message) => classify_message(classifier.as_ref(), message),
                    Err(err) => Some(Err(ExecutionError::from(err))),
                };
                futures::future::ready(batch)
            })
            .boxed();

        Ok(OutputStream {
            inner,
            _cancel: token.drop_guard(),
        })
    }
}

/// Classify every item of a message. Empty messages produce no batch.
fn classify_message(
    classifier: &dyn OutputClassifier,
    message: RawOutput,
) -> Option<Result<OutputBatch, ExecutionError>> {
    if message.items.is_empty() {
        return None;
    }
    let batch = message
        .items
        .iter()
        .map(|item| classifier.classify(item))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ExecutionError::from);
    Some(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{GenericClassifier, RustClassifier};
    use crate::error::SessionError;
    use crate::session::KernelSession;
    use crate::testing::ScriptedSession;
    use inline_repl_types::{OutputKind, RawOutputItem};

    fn executor_with(session: Arc<ScriptedSession>) -> StreamingExecutor {
        let kernels = Arc::new(KernelManager::new(session.language().to_string()));
        kernels.select(session).unwrap();
        StreamingExecutor::new(kernels, Arc::new(GenericClassifier))
    }

    #[tokio::test]
    async fn test_no_kernel_is_unavailable() {
        let kernels = Arc::new(KernelManager::new("ruby"));
        let executor = StreamingExecutor::new(kernels, Arc::new(GenericClassifier));
        let err = executor.execute("1 + 1").err().unwrap();
        assert!(matches!(err, ExecutionError::KernelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_batches_follow_messages() {
        let session = Arc::new(ScriptedSession::new("ruby"));
        session.script_items(vec![
            Ok(RawOutput::text("1")),
            Ok(RawOutput::new(vec![])),
            Ok(RawOutput::new(vec![
                RawOutputItem::text("2"),
                RawOutputItem::text(r#"{"name":"Error","message":"m","stack":"s"}"#),
            ])),
        ]);
        let executor = executor_with(session.clone());

        let batches: Vec<_> = executor.execute("code").unwrap().collect().await;
        assert_eq!(batches.len(), 2);

        let first = batches[0].as_ref().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].content, "1");

        let second = batches[1].as_ref().unwrap();
        assert_eq!(second[0].kind, OutputKind::Output);
        assert_eq!(second[1].kind, OutputKind::Error);
        assert_eq!(second[1].content, "s");

        assert_eq!(session.executed(), vec!["code".to_string()]);
    }

    #[tokio::test]
    async fn test_disposed_session_is_unavailable() {
        let session = Arc::new(ScriptedSession::new("ruby"));
        session.script_items(vec![Err(SessionError::Disposed)]);
        let executor = executor_with(session);

        let mut stream = executor.execute("code").unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ExecutionError::KernelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_other_failures_pass_through() {
        let session = Arc::new(ScriptedSession::new("ruby"));
        session.script_items(vec![Err(SessionError::Backend("wire".into()))]);
        let executor = executor_with(session);

        let mut stream = executor.execute("code").unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ExecutionError::Unclassified(SessionError::Backend(_))));
    }

    #[tokio::test]
    async fn test_classification_fault_surfaces_per_chunk() {
        struct Liar;
        impl OutputClassifier for Liar {
            fn name(&self) -> &str {
                "liar"
            }
            fn is_error(&self, _raw: &str) -> bool {
                true
            }
            fn parse_error(&self, raw: &str) -> Result<ExecutionOutput, crate::ClassifyError> {
                RustClassifier.parse_error(raw)
            }
        }

        let session = Arc::new(ScriptedSession::new("ruby"));
        session.script_items(vec![Ok(RawOutput::text("plain"))]);
        let kernels = Arc::new(KernelManager::new("ruby"));
        kernels.select(session).unwrap();
        let executor = StreamingExecutor::new(kernels, Arc::new(Liar));

        let mut stream = executor.execute("code").unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ExecutionError::ExecutionFault(_)));
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_token() {
        let session = Arc::new(ScriptedSession::new("ruby"));
        let _live = session.script_live();
        let executor = executor_with(session.clone());

        let stream = executor.execute("loop").unwrap();
        let token = session.last_token().unwrap();
        assert!(!token.is_cancelled());

        drop(stream);
        assert!(token.is_cancelled());
    }
}
