//! inline-repl: run the cells of a source file through the execution queue.
//!
//! Usage:
//!   # Run every cell of a Ruby file
//!   inline-repl --variant ruby notes.rb
//!
//!   # Run only the cells containing lines 4 and 12
//!   inline-repl --variant ruby notes.rb --line 4 --line 12
//!
//!   # Custom interpreter command
//!   inline-repl --variant generic --interpreter "python3 -u" notes.py
//!
//! Logs and status go to stderr (`RUST_LOG` controls the filter); results go
//! to stdout.

mod process;
mod terminal;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use inline_repl_kernel::{
    ExecutionQueue, LanguageProfile, LogStatusPresenter, ReplConfig, ReplContext, ResultPresenter,
    TaskEvent, Target, TextDocument, Variant, resolve_span, split_cells,
};
use inline_repl_types::{ExecutionTask, Origin, Position};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::process::{ProcessSession, default_interpreter};
use crate::terminal::TerminalPresenter;

/// Run cells of a source file against an interpreter, one at a time.
#[derive(Parser, Debug)]
#[command(name = "inline-repl")]
#[command(about = "Run cells of a source file against an interpreter, one at a time")]
struct Args {
    /// Language variant: generic, ruby, or rust
    #[arg(long, default_value = "generic")]
    variant: Variant,

    /// Interpreter command line (defaults to the variant's interpreter)
    #[arg(long)]
    interpreter: Option<String>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drop pending work for the file whenever a new cell is submitted
    #[arg(long)]
    clear_on_submit: bool,

    /// Source file to run
    file: PathBuf,

    /// Run only the cell containing this 1-based line (repeatable)
    #[arg(long = "line", short = 'l')]
    lines: Vec<u32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => ReplConfig::load(path)?,
        None => ReplConfig::default(),
    };
    if args.clear_on_submit {
        config.clear_on_submit = true;
    }

    let profile = LanguageProfile::for_variant(args.variant);
    let ctx = ReplContext::new(profile.clone(), config);

    let command = match &args.interpreter {
        Some(line) => line.split_whitespace().map(str::to_string).collect(),
        None => default_interpreter(profile.variant),
    };
    let session = ProcessSession::new(&profile, command)?;
    ctx.kernels.select(Arc::new(session))?;

    let presenter = Arc::new(TerminalPresenter::new());
    let status = Arc::new(LogStatusPresenter::new(profile.display_name.clone()));
    let queue = ExecutionQueue::new(&ctx, presenter.clone(), status);
    let _kernel_watch = queue.watch_kernel_status();
    let mut events = queue.subscribe_events();

    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let doc = TextDocument::new(args.file.display().to_string().as_str(), &text);
    let separator = profile.cell_separator.as_str();

    let spans = if args.lines.is_empty() {
        split_cells(&doc, separator)
    } else {
        args.lines
            .iter()
            .filter_map(|&line| {
                let cursor = Position::new(line.saturating_sub(1), 0);
                resolve_span(&doc, Target::Cursor(cursor), separator)
            })
            .collect()
    };
    if spans.is_empty() {
        warn!(file = %args.file.display(), "nothing to run");
        return Ok(ExitCode::SUCCESS);
    }

    info!(file = %args.file.display(), cells = spans.len(), variant = %profile.variant, "submitting");
    let mut submitted = Vec::with_capacity(spans.len());
    for span in spans {
        let task = ExecutionTask::new(span.code, span.origin);
        submitted.push(task.origin.clone());
        queue.enqueue(task).await?;
    }

    let mut faulted = false;
    let idle = queue.wait_idle();
    tokio::pin!(idle);
    loop {
        tokio::select! {
            _ = &mut idle => break,
            _ = tokio::signal::ctrl_c() => {
                cancel_pending(&queue, presenter.as_ref(), &submitted).await;
                return Ok(ExitCode::from(130));
            }
            event = events.recv() => match event {
                Ok(TaskEvent::Faulted { id, error }) => {
                    error!(task = %id, %error, "task faulted");
                    faulted = true;
                }
                Ok(TaskEvent::StatusChanged { .. }) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "task events lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    // Faults are emitted before the idle status, so none can be missed here.
    while let Ok(event) = events.try_recv() {
        if let TaskEvent::Faulted { id, error } = event {
            error!(task = %id, %error, "task faulted");
            faulted = true;
        }
    }

    if faulted || presenter.failures() > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Render "cancelled" for every task still waiting or running, then clear.
async fn cancel_pending(queue: &ExecutionQueue, presenter: &dyn ResultPresenter, submitted: &[Origin]) {
    for origin in submitted {
        let pending = queue
            .find_by_origin(&origin.range)
            .iter()
            .any(|task| task.origin.document == origin.document);
        if pending {
            presenter.render_cancelled(origin).await;
        }
    }
    queue.clear();
    info!("queue cleared on interrupt");
}
