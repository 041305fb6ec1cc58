use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::telemetry::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "matchalot",
    about = "Watch Match-a-lot notifications and drive study-material matches from the terminal",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "API origin (overrides MATCHALOT_API_URL)"
    )]
    pub api_url: Option<Url>,

    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Match WebSocket endpoint (overrides MATCHALOT_WS_URL)"
    )]
    pub ws_url: Option<Url>,

    #[arg(
        long,
        global = true,
        value_name = "NAME=VALUE",
        help = "Session cookie to send with every request (overrides MATCHALOT_SESSION_COOKIE)"
    )]
    pub session_cookie: Option<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "MATCHALOT_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "MATCHALOT_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the signed-in user
    Whoami,
    /// End the current session
    Logout,
    /// Stream notifications and match events until Ctrl-C
    Watch(WatchArgs),
    /// Inspect and update notifications
    #[command(subcommand)]
    Notifications(NotificationsCommand),
    /// Send match lifecycle actions
    #[command(subcommand)]
    Match(MatchCommand),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[arg(
        long = "shown-ids",
        value_name = "PATH",
        help = "File recording notifications already shown as toasts"
    )]
    pub shown_ids: Option<PathBuf>,

    #[arg(long = "no-match", help = "Do not open the match socket")]
    pub no_match: bool,
}

#[derive(Subcommand, Debug)]
pub enum NotificationsCommand {
    /// List notifications, newest first
    List {
        #[arg(long, help = "Only unread notifications")]
        unread: bool,
    },
    /// Print the unread count
    Count,
    /// Mark one notification as read
    Read { id: i64 },
    /// Mark every notification as read
    ReadAll,
    /// Delete a notification
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum MatchCommand {
    /// Ask another user to swap materials
    Request {
        /// Material you want
        material_id: i64,
        /// Owner of that material
        receiver_id: i64,
        /// Your material offered in exchange
        requester_material_id: i64,
        #[command(flatten)]
        delivery: Delivery,
    },
    /// Accept a pending match
    Accept {
        match_id: i64,
        #[command(flatten)]
        delivery: Delivery,
    },
    /// Reject a pending match
    Reject {
        match_id: i64,
        #[command(flatten)]
        delivery: Delivery,
    },
    /// Mark an accepted match as completed
    Complete {
        match_id: i64,
        #[command(flatten)]
        delivery: Delivery,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct Delivery {
    #[arg(long, help = "Use the REST endpoint instead of the match socket")]
    pub rest: bool,

    #[arg(
        long = "wait-ms",
        default_value_t = 5_000,
        help = "How long to wait for the match socket to connect"
    )]
    pub wait_ms: u64,
}
