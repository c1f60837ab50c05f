//! Subprocess-backed kernel session.
//!
//! Every execution pipes the code into a fresh interpreter process on stdin.
//! Each stdout line becomes one `text/plain` message. A non-zero exit is
//! reported as a JSON error payload using the variant's error name, with
//! stderr as the stack. There is no state carried between executions.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use inline_repl_kernel::{KernelSession, LanguageProfile, RawOutputStream, SessionError, Variant};
use inline_repl_types::{KernelStatus, RawOutput};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Message = Result<RawOutput, SessionError>;

/// Messages buffered between the child reader and the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// Default interpreter command for a variant.
pub fn default_interpreter(variant: Variant) -> Vec<String> {
    let command: &[&str] = match variant {
        Variant::Generic => &["python3"],
        Variant::Ruby => &["ruby"],
        Variant::Rust => &["evcxr"],
    };
    command.iter().map(|s| s.to_string()).collect()
}

/// Error name a failed run is reported under.
fn error_name(variant: Variant) -> &'static str {
    match variant {
        Variant::Ruby => "RuntimeError",
        Variant::Generic | Variant::Rust => "Error",
    }
}

/// Runs each execution in a new interpreter process.
pub struct ProcessSession {
    language: String,
    error_name: &'static str,
    program: String,
    args: Vec<String>,
    status: Arc<watch::Sender<KernelStatus>>,
}

impl ProcessSession {
    /// `command` is the program followed by its arguments.
    pub fn new(profile: &LanguageProfile, command: Vec<String>) -> anyhow::Result<Self> {
        let mut command = command.into_iter();
        let program = command.next().context("interpreter command is empty")?;
        let (status, _) = watch::channel(KernelStatus::Idle);
        Ok(Self {
            language: profile.language.clone(),
            error_name: error_name(profile.variant),
            program,
            args: command.collect(),
            status: Arc::new(status),
        })
    }
}

impl KernelSession for ProcessSession {
    fn language(&self) -> &str {
        &self.language
    }

    fn execute_code(&self, code: &str, cancel: CancellationToken) -> RawOutputStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = ChildRun {
            program: self.program.clone(),
            code: code.to_string(),
            error_name: self.error_name,
            tx,
            cancel,
        };
        let status = Arc::clone(&self.status);
        tokio::spawn(async move {
            status.send_replace(KernelStatus::Busy);
            let tx = run.tx.clone();
            if let Err(err) = run.run(cmd).await {
                warn!(error = %err, "interpreter run failed");
                let _ = tx.send(Err(SessionError::Other(err))).await;
            }
            status.send_replace(KernelStatus::Idle);
        });

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }

    fn status(&self) -> watch::Receiver<KernelStatus> {
        self.status.subscribe()
    }
}

struct ChildRun {
    program: String,
    code: String,
    error_name: &'static str,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl ChildRun {
    async fn run(self, mut cmd: Command) -> anyhow::Result<()> {
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;
        debug!(program = %self.program, pid = ?child.id(), "interpreter started");

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(self.code.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        let stdout = child.stdout.take().context("stdout not captured")?;
        let mut stderr = child.stderr.take().context("stderr not captured")?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(program = %self.program, "execution cancelled, killing interpreter");
                    child.kill().await?;
                    return Ok(());
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if self.tx.send(Ok(RawOutput::text(line))).await.is_err() {
                            child.kill().await?;
                            return Ok(());
                        }
                    }
                    None => break,
                },
            }
        }

        let exit = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !exit.success() {
            let payload = serde_json::json!({
                "name": self.error_name,
                "message": format!("{} exited with {}", self.program, exit),
                "stack": stderr.trim_end(),
            });
            let _ = self.tx.send(Ok(RawOutput::text(payload.to_string()))).await;
        }
        debug!(program = %self.program, %exit, "interpreter finished");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(variant: Variant) -> ProcessSession {
        let profile = LanguageProfile::for_variant(variant);
        ProcessSession::new(&profile, vec!["sh".into()]).unwrap()
    }

    async fn collect(stream: RawOutputStream) -> Vec<Message> {
        tokio::time::timeout(Duration::from_secs(10), stream.collect())
            .await
            .expect("interpreter did not finish")
    }

    fn texts(messages: &[Message]) -> Vec<String> {
        messages
            .iter()
            .map(|m| m.as_ref().unwrap().items[0].decode())
            .collect()
    }

    #[tokio::test]
    async fn test_stdout_lines_become_messages() {
        let session = sh(Variant::Generic);
        let messages = collect(session.execute_code("echo one\necho two", CancellationToken::new())).await;
        assert_eq!(texts(&messages), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error_payload() {
        let session = sh(Variant::Ruby);
        let messages = collect(session.execute_code("echo boom >&2\nexit 3", CancellationToken::new())).await;
        let texts = texts(&messages);
        assert_eq!(texts.len(), 1);

        let payload: serde_json::Value = serde_json::from_str(&texts[0]).unwrap();
        assert_eq!(payload["name"], "RuntimeError");
        assert_eq!(payload["stack"], "boom");
        assert!(payload["message"].as_str().unwrap().contains("exit"));
    }

    #[tokio::test]
    async fn test_cancel_kills_interpreter() {
        let session = sh(Variant::Generic);
        let token = CancellationToken::new();
        let stream = session.execute_code("echo started\nsleep 30\necho never", token.clone());

        let mut stream = stream;
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.items[0].decode(), "started");

        token.cancel();
        let rest = collect(stream).await;
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let profile = LanguageProfile::for_variant(Variant::Generic);
        let session = ProcessSession::new(&profile, vec!["/nonexistent/interpreter".into()]).unwrap();
        let messages = collect(session.execute_code("1", CancellationToken::new())).await;
        assert!(matches!(messages.as_slice(), [Err(SessionError::Other(_))]));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let profile = LanguageProfile::default();
        assert!(ProcessSession::new(&profile, Vec::new()).is_err());
    }

    #[test]
    fn test_default_interpreters() {
        assert_eq!(default_interpreter(Variant::Ruby), vec!["ruby"]);
        assert_eq!(error_name(Variant::Rust), "Error");
    }
}
