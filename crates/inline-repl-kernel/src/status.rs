//! Status aggregation: queue state + kernel status → what to show.
//!
//! Priority, highest first:
//!
//! 1. Kernel is dead, terminating, or unknown → show that, whatever the queue does
//! 2. Executing with more tasks behind it → "running, N queued"
//! 3. Executing → "running"
//! 4. Tasks waiting → "queued"
//! 5. Idle → describe the kernel status, or hide

use inline_repl_types::{KernelStatus, QueueStatusSnapshot};
use tracing::info;

use crate::presenter::StatusPresenter;

/// Kernel status shown while the queue is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStatus {
    Ready,
    Starting,
    Restarting,
    AutoRestarting,
    Busy,
}

/// What the status surface should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationStatus {
    /// Dead, terminating, or unknown kernel.
    Kernel(KernelStatus),
    Running,
    RunningWithQueue { queued: usize },
    Queued,
    Idle(IdleStatus),
    Hidden,
}

/// Map a queue snapshot to a presentation status.
pub fn aggregate(snapshot: &QueueStatusSnapshot) -> PresentationStatus {
    let QueueStatusSnapshot {
        is_executing,
        active_task_count,
        kernel_status,
    } = *snapshot;

    if kernel_status.is_dominant() {
        return PresentationStatus::Kernel(kernel_status);
    }
    if is_executing && active_task_count > 1 {
        return PresentationStatus::RunningWithQueue {
            queued: active_task_count - 1,
        };
    }
    if is_executing {
        return PresentationStatus::Running;
    }
    if active_task_count > 0 {
        return PresentationStatus::Queued;
    }

    match kernel_status {
        KernelStatus::Idle => PresentationStatus::Idle(IdleStatus::Ready),
        KernelStatus::Starting => PresentationStatus::Idle(IdleStatus::Starting),
        KernelStatus::Restarting => PresentationStatus::Idle(IdleStatus::Restarting),
        KernelStatus::Autorestarting => PresentationStatus::Idle(IdleStatus::AutoRestarting),
        KernelStatus::Busy => PresentationStatus::Idle(IdleStatus::Busy),
        _ => PresentationStatus::Hidden,
    }
}

impl PresentationStatus {
    /// Short status line, or `None` when hidden.
    pub fn text(&self, name: &str) -> Option<String> {
        let text = match self {
            Self::Kernel(KernelStatus::Dead) => format!("{name} Kernel Dead"),
            Self::Kernel(KernelStatus::Terminating) => format!("{name} Kernel Terminating"),
            Self::Kernel(_) => format!("{name} Kernel Status Unknown"),
            Self::Running => format!("Running {name}"),
            Self::RunningWithQueue { queued } => format!("Running {name} ({queued} queued)"),
            Self::Queued => format!("{name} Code Queued"),
            Self::Idle(IdleStatus::Ready) => format!("{name} Kernel Ready"),
            Self::Idle(IdleStatus::Starting) => format!("Starting {name} Kernel"),
            Self::Idle(IdleStatus::Restarting) => format!("Restarting {name} Kernel"),
            Self::Idle(IdleStatus::AutoRestarting) => format!("Auto-restarting {name} Kernel"),
            Self::Idle(IdleStatus::Busy) => format!("{name} Kernel Busy"),
            Self::Hidden => return None,
        };
        Some(text)
    }

    /// Longer description for hover text.
    pub fn tooltip(&self, name: &str) -> Option<String> {
        let tooltip = match self {
            Self::Kernel(KernelStatus::Dead) => format!("{name} kernel has died. Try restarting."),
            Self::Kernel(KernelStatus::Terminating) => format!("{name} kernel is shutting down"),
            Self::Kernel(_) => format!("{name} kernel status is unknown"),
            Self::Running => format!("{name} code is executing"),
            Self::RunningWithQueue { queued } => {
                let plural = if *queued > 1 { "s" } else { "" };
                format!("Executing {name} code with {queued} task{plural} in queue")
            }
            Self::Queued => "Code execution is queued".to_string(),
            Self::Idle(IdleStatus::Ready) => format!("{name} is idle and ready"),
            Self::Idle(IdleStatus::Starting) => format!("{name} kernel is starting"),
            Self::Idle(IdleStatus::Restarting) => format!("{name} kernel is restarting"),
            Self::Idle(IdleStatus::AutoRestarting) => format!("{name} kernel is auto-restarting"),
            Self::Idle(IdleStatus::Busy) => format!("{name} kernel is busy"),
            Self::Hidden => return None,
        };
        Some(tooltip)
    }
}

/// Status presenter that logs every aggregated status.
#[derive(Debug, Clone)]
pub struct LogStatusPresenter {
    display_name: String,
}

impl LogStatusPresenter {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }
}

impl StatusPresenter for LogStatusPresenter {
    fn update_status(&self, snapshot: &QueueStatusSnapshot) {
        let status = aggregate(snapshot);
        match status.text(&self.display_name) {
            Some(text) => info!(
                executing = snapshot.is_executing,
                active = snapshot.active_task_count,
                kernel = %snapshot.kernel_status,
                "{text}"
            ),
            None => info!(kernel = %snapshot.kernel_status, "status hidden"),
        }
    }
}
