//! Terminal rendering of task results.

use std::collections::HashMap;
use std::io::Write;

use async_trait::async_trait;
use inline_repl_kernel::{ExecutionError, ResultPresenter};
use inline_repl_types::{DocumentKey, ExecutionOutput, Origin};
use parking_lot::Mutex;

/// Prints each task's output as it streams in.
///
/// The presenter receives the accumulated outputs on every call; only the
/// ones not yet printed for that origin are written.
pub struct TerminalPresenter {
    out: Mutex<Box<dyn Write + Send>>,
    printed: Mutex<HashMap<Origin, usize>>,
    failures: Mutex<usize>,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            printed: Mutex::new(HashMap::new()),
            failures: Mutex::new(0),
        }
    }

    /// Tasks that ended in an error so far.
    pub fn failures(&self) -> usize {
        *self.failures.lock()
    }

    fn line(&self, origin: &Origin, text: &str) {
        let mut out = self.out.lock();
        // Terminal write failures are not worth aborting over.
        let _ = writeln!(out, "[{origin}] {text}");
        let _ = out.flush();
    }

    fn print_outputs(&self, origin: &Origin, outputs: &[ExecutionOutput]) {
        for output in outputs {
            if output.is_error() {
                for line in output.content.lines() {
                    self.line(origin, &format!("! {line}"));
                }
            } else if output.mime_type == inline_repl_types::output::TEXT_PLAIN {
                self.line(origin, &output.content);
            } else {
                self.line(origin, &format!("<{} bytes of {}>", output.raw.len(), output.mime_type));
            }
        }
    }
}

impl Default for TerminalPresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultPresenter for TerminalPresenter {
    async fn render_executing(&self, origin: &Origin) {
        self.line(origin, "running");
    }

    async fn render_result(&self, outputs: &[ExecutionOutput], origin: &Origin, is_executing: bool) {
        let fresh = {
            let mut printed = self.printed.lock();
            let seen = printed.entry(origin.clone()).or_default();
            let start = (*seen).min(outputs.len());
            *seen = outputs.len();
            if !is_executing {
                printed.remove(origin);
            }
            start
        };
        self.print_outputs(origin, &outputs[fresh..]);

        if !is_executing && outputs.iter().any(ExecutionOutput::is_error) {
            *self.failures.lock() += 1;
        }
    }

    async fn render_error(&self, origin: &Origin, error: &ExecutionError) {
        self.printed.lock().remove(origin);
        *self.failures.lock() += 1;
        self.line(origin, &format!("error: {error}"));
    }

    async fn render_complete(&self, origin: &Origin) {
        self.line(origin, "done");
    }

    async fn render_queued(&self, origin: &Origin) {
        self.line(origin, "queued");
    }

    async fn render_cancelled(&self, origin: &Origin) {
        self.printed.lock().remove(origin);
        self.line(origin, "cancelled");
    }

    async fn clear_results(&self, document: &DocumentKey) {
        self.printed.lock().retain(|origin, _| &origin.document != document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inline_repl_types::{RawOutputItem, SourceRange};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    fn presenter() -> (TerminalPresenter, SharedBuf) {
        let buf = SharedBuf::default();
        (TerminalPresenter::with_writer(Box::new(buf.clone())), buf)
    }

    fn text(s: &str) -> ExecutionOutput {
        ExecutionOutput::output(s, &RawOutputItem::text(s))
    }

    #[tokio::test]
    async fn test_prints_only_new_outputs() {
        let (presenter, buf) = presenter();
        let origin = Origin::new("a.rb", SourceRange::from_coords(0, 0, 0, 3));

        presenter.render_result(&[text("1")], &origin, true).await;
        presenter.render_result(&[text("1"), text("2")], &origin, true).await;
        presenter.render_result(&[text("1"), text("2")], &origin, false).await;

        assert_eq!(buf.text(), "[a.rb:L1] 1\n[a.rb:L1] 2\n");
        assert_eq!(presenter.failures(), 0);
    }

    #[tokio::test]
    async fn test_errors_count_as_failures() {
        let (presenter, buf) = presenter();
        let origin = Origin::new("a.rb", SourceRange::from_coords(2, 0, 2, 3));

        let err = ExecutionOutput::error("line one\nline two", "{}");
        presenter.render_result(&[err], &origin, false).await;
        presenter
            .render_error(&origin, &ExecutionError::KernelUnavailable("gone".into()))
            .await;

        let out = buf.text();
        assert!(out.contains("! line one\n"));
        assert!(out.contains("! line two\n"));
        assert!(out.contains("error: no kernel available: gone"));
        assert_eq!(presenter.failures(), 2);
    }

    #[tokio::test]
    async fn test_clear_results_forgets_document() {
        let (presenter, buf) = presenter();
        let origin = Origin::new("a.rb", SourceRange::from_coords(0, 0, 0, 3));

        presenter.render_result(&[text("1")], &origin, true).await;
        presenter.clear_results(&DocumentKey::new("a.rb")).await;
        presenter.render_result(&[text("1")], &origin, false).await;

        assert_eq!(buf.text().matches("] 1").count(), 2);
    }
}
