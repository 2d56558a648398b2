pub mod commands;
pub mod data;
pub mod duration;
pub mod handlers;
pub mod logging;
pub mod notify;
pub mod scheduler;

// Customize these constants for your bot
pub const BOT_NAME: &str = "warden_daemon";
pub const COMMAND_TARGET: &str = "warden_daemon::command";
pub const ERROR_TARGET: &str = "warden_daemon::error";
pub const EVENT_TARGET: &str = "warden_daemon::handlers";
pub const CONSOLE_TARGET: &str = "warden_daemon";

pub use data::{Data, DataInner, GuildConfig};
pub use scheduler::{ReversalKey, ReversalKind, SchedulerConfig, SchedulerService};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
