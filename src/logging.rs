use crate::moderation::{HandlerOutcome, ModerationError, Task};
use crate::{CONSOLE_TARGET, ERROR_TARGET, Error, WORKER_TARGET};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Task log file name
pub const TASK_LOG_FILE: &str = "moderation";

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let task_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, TASK_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // JSON task log
    let task_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(task_file);

    // INFO by default; the redis client is chatty on reconnects
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let filter = EnvFilter::new("info");
        match "redis=warn".parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(task_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Log a popped task before dispatch
pub fn log_task_start(task: &Task) {
    info!(
        target: WORKER_TARGET,
        task_type = %task.task_type,
        chat_id = task.chat_id,
        user_id = ?task.user_id,
        username = ?task.username,
        moderator_id = task.moderator_id,
        event = "start",
        "Task execution started"
    );
}

/// Log a task that completed
pub fn log_task_end(task: &Task, outcome: &HandlerOutcome, duration: Duration) {
    let duration_ms = u64::try_from(duration.as_millis()).unwrap_or_default();
    info!(
        target: WORKER_TARGET,
        task_type = %task.task_type,
        chat_id = task.chat_id,
        user_id = ?task.user_id,
        outcome = ?outcome,
        duration_ms,
        event = "end",
        "Task execution completed"
    );
}

/// Log a task whose handler failed
pub fn log_task_error(task: &Task, err: &ModerationError) {
    error!(
        target: ERROR_TARGET,
        task_type = %task.task_type,
        chat_id = task.chat_id,
        user_id = ?task.user_id,
        error_kind = %err.kind(),
        error = %err,
        "Task failed"
    );
}

/// Log a payload that could not be turned into a task
pub fn log_dropped_payload(payload: &str, err: &ModerationError) {
    warn!(
        target: ERROR_TARGET,
        payload_len = payload.len(),
        error_kind = %err.kind(),
        error = %err,
        "Dropped malformed task payload"
    );
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
