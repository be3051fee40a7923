pub mod config;
pub mod data;
pub mod filter;
pub mod logging;
pub mod moderation;
pub mod settings;

// Log targets used across the crate
pub const WORKER_TARGET: &str = "warden_daemon::worker";
pub const PROPAGATION_TARGET: &str = "warden_daemon::propagation";
pub const AUDIT_TARGET: &str = "warden_daemon::audit";
pub const ERROR_TARGET: &str = "warden_daemon::error";
pub const CONSOLE_TARGET: &str = "warden_daemon";

pub use config::WardenConfig;
pub use moderation::{
    ChatProvider, HandlerOutcome, MemoryQueue, MemoryStore, ModerationError, ModerationResult,
    ModerationStore, Task, TaskQueue, TaskType, Warden, Worker,
};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
