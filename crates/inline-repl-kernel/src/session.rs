//! Kernel sessions and the manager that tracks the selected one.
//!
//! A [`KernelSession`] is the live interactive backend: it executes code and
//! streams output back as [`RawOutput`] messages. Starting, restarting, and
//! connecting sessions happens elsewhere; the [`KernelManager`] only knows
//! which session is currently selected and what status it last reported.
//!
//! Status flows through a `watch` channel: one writer (the forwarder task
//! for the selected session, or explicit `set_status` calls), many readers.

use std::sync::Arc;

use futures::stream::BoxStream;
use inline_repl_types::{KernelStatus, RawOutput};
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use crate::error::SessionError;

/// Raw output stream of one `execute_code` call.
pub type RawOutputStream = BoxStream<'static, Result<RawOutput, SessionError>>;

/// A live interactive execution backend.
pub trait KernelSession: Send + Sync {
    /// Language identity, e.g. `"ruby"`.
    fn language(&self) -> &str;

    /// Execute code, streaming output messages in the order produced.
    ///
    /// The token is cancelled when the consumer stops reading. Honouring it
    /// is optional. A disposed session fails with [`SessionError::Disposed`],
    /// either immediately or as the first stream item.
    fn execute_code(&self, code: &str, cancel: CancellationToken) -> RawOutputStream;

    /// Status updates for this session.
    fn status(&self) -> watch::Receiver<KernelStatus>;
}

/// Currently selected session plus its status forwarder.
struct Selected {
    session: Arc<dyn KernelSession>,
    /// Stops the forwarder task when the selection is replaced or dropped.
    _forwarder: DropGuard,
}

/// Tracks the selected session for one language.
pub struct KernelManager {
    language: String,
    current: RwLock<Option<Selected>>,
    status: Arc<watch::Sender<KernelStatus>>,
}

impl std::fmt::Debug for KernelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelManager")
            .field("language", &self.language)
            .field("selected", &self.current.read().is_some())
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl KernelManager {
    /// Create a manager accepting sessions for `language`.
    pub fn new(language: impl Into<String>) -> Self {
        let (status, _) = watch::channel(KernelStatus::Unknown);
        Self {
            language: language.into(),
            current: RwLock::new(None),
            status: Arc::new(status),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Select a session, replacing any previous one.
    ///
    /// Must be called from within a Tokio runtime: the session's status
    /// changes are forwarded by a background task.
    pub fn select(&self, session: Arc<dyn KernelSession>) -> Result<(), SessionError> {
        if session.language() != self.language {
            return Err(SessionError::LanguageMismatch {
                expected: self.language.clone(),
                found: session.language().to_string(),
            });
        }

        let token = CancellationToken::new();
        let stop = token.clone();
        let mut rx = session.status();
        let tx = Arc::clone(&self.status);

        update_status(&tx, *rx.borrow_and_update());

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let status = *rx.borrow_and_update();
                        update_status(&tx, status);
                    }
                }
            }
            debug!("kernel status forwarder stopped");
        });

        info!(language = %self.language, "kernel session selected");
        *self.current.write() = Some(Selected {
            session,
            _forwarder: token.drop_guard(),
        });
        Ok(())
    }

    /// Drop the selected session. Status becomes `unknown`.
    pub fn detach(&self) {
        if self.current.write().take().is_some() {
            info!(language = %self.language, "kernel session detached");
        }
        update_status(&self.status, KernelStatus::Unknown);
    }

    /// The selected session, if any.
    pub fn current(&self) -> Option<Arc<dyn KernelSession>> {
        self.current.read().as_ref().map(|s| Arc::clone(&s.session))
    }

    /// Last reported status.
    pub fn status(&self) -> KernelStatus {
        *self.status.borrow()
    }

    /// Override the status. Subscribers are notified only on change.
    pub fn set_status(&self, status: KernelStatus) {
        update_status(&self.status, status);
    }

    pub fn subscribe(&self) -> watch::Receiver<KernelStatus> {
        self.status.subscribe()
    }
}

fn update_status(tx: &watch::Sender<KernelStatus>, status: KernelStatus) {
    tx.send_if_modified(|current| {
        if *current == status {
            return false;
        }
        debug!(from = %current, to = %status, "kernel status changed");
        *current = status;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSession;
    use std::time::Duration;

    #[tokio::test]
    async fn test_select_and_current() {
        let manager = KernelManager::new("ruby");
        assert!(manager.current().is_none());
        assert_eq!(manager.status(), KernelStatus::Unknown);

        let session = Arc::new(ScriptedSession::new("ruby"));
        manager.select(session).unwrap();
        assert!(manager.current().is_some());
        assert_eq!(manager.status(), KernelStatus::Idle);
    }

    #[tokio::test]
    async fn test_rejects_other_language() {
        let manager = KernelManager::new("ruby");
        let err = manager
            .select(Arc::new(ScriptedSession::new("rust")))
            .unwrap_err();
        assert!(matches!(err, SessionError::LanguageMismatch { .. }));
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_forwards_session_status() {
        let manager = KernelManager::new("ruby");
        let session = Arc::new(ScriptedSession::new("ruby"));
        manager.select(session.clone()).unwrap();

        let mut rx = manager.subscribe();
        session.set_status(KernelStatus::Busy);
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == KernelStatus::Busy))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.status(), KernelStatus::Busy);
    }

    #[tokio::test]
    async fn test_detach_reports_unknown() {
        let manager = KernelManager::new("ruby");
        manager.select(Arc::new(ScriptedSession::new("ruby"))).unwrap();
        manager.detach();
        assert!(manager.current().is_none());
        assert_eq!(manager.status(), KernelStatus::Unknown);
    }

    #[tokio::test]
    async fn test_set_status_notifies_only_on_change() {
        let manager = KernelManager::new("ruby");
        let mut rx = manager.subscribe();
        rx.borrow_and_update();

        manager.set_status(KernelStatus::Unknown);
        assert!(!rx.has_changed().unwrap());

        manager.set_status(KernelStatus::Starting);
        assert!(rx.has_changed().unwrap());
    }
}
