//! watchzone - organize a drop folder and the files around it
//!
//! The library backs the `watchzone` binary: a set of file commands (create,
//! move, rename, copy, zip, delete, view, email) and a watcher that offers the
//! same actions for whatever lands in the watch zone, optionally sending an
//! email after a move.

pub mod category;
pub mod cli;
pub mod config;
pub mod file_ops;
pub mod logging;
pub mod notifier;
pub mod output;
pub mod prompt;
pub mod resolver;
pub mod watcher;

pub use category::Category;
pub use config::{AppConfig, CompiledFilters, ConfigError};
pub use file_ops::{FileManager, FileOpError};
pub use notifier::{NotificationRequest, Notifier, NotifyError, SmtpNotifier};
pub use resolver::{MenuChoice, PromptResolver, RuleResolver};
pub use watcher::{
    Decision, Detection, DestinationResolver, EntryAction, Outcome, RelocationAttempt,
    WatchError, WatchedPath, ZoneWatcher,
};

pub use cli::{Cli, Command, run_cli};
