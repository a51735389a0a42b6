//! Command-line interface for watchzone.
//!
//! Each subcommand maps to one [`FileManager`] call. Any command can be
//! followed by an email notification (`--email`), and `watch` runs the
//! watcher on the configured watch zone.

use crate::config::{AppConfig, ConfigError, expand_tilde};
use crate::file_ops::{FileManager, FileOpError};
use crate::notifier::{
    NotificationRequest, Notifier, NotifyError, PASSWORD_ENV, SENDER_ENV, SmtpCredentials,
    SmtpNotifier, is_valid_email,
};
use crate::output::OutputFormatter;
use crate::prompt::{self, PromptError};
use crate::resolver::{PromptResolver, RuleResolver};
use crate::watcher::{DestinationResolver, WatchError, ZoneWatcher};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "watchzone",
    version,
    about = "Move, rename, copy, zip, delete, view or email files, or watch a drop folder"
)]
pub struct Cli {
    /// Configuration file (defaults to .watchzonerc.toml, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Folder that names are resolved against (defaults to the home folder)
    #[arg(long, global = true, value_name = "PATH")]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Post-action notification flags shared by every file command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailArgs {
    /// Send an email after the command; optionally give the recipient inline
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "",
        value_name = "RECIPIENT"
    )]
    pub email: Option<String>,

    /// Sender address (defaults to EMAIL_SENDER)
    #[arg(long)]
    pub sender: Option<String>,

    /// Recipient address
    #[arg(long)]
    pub recipient: Option<String>,
}

impl EmailArgs {
    pub fn requested(&self) -> bool {
        self.email.is_some()
    }

    /// Recipient from `--email=<addr>` or `--recipient`, if given.
    fn explicit_recipient(&self) -> Option<String> {
        self.email
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .or(self.recipient.as_deref())
            .map(|value| value.trim().to_string())
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a new file
    CreateFile {
        name: String,
        /// File content
        #[arg(long)]
        text: Option<String>,
        /// Characters to remove from the content
        #[arg(long)]
        remove: Option<String>,
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Create a new folder
    CreateFolder {
        name: String,
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Move a file or folder (into DESTINATION if it is a folder)
    Move {
        source: String,
        destination: String,
        /// Replace an existing target
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Rename a file or folder
    Rename {
        old: String,
        new: String,
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Copy a file or folder tree
    Copy {
        source: String,
        destination: String,
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Zip a folder
    Zip {
        source: String,
        /// Archive path (defaults to <source>.zip next to the folder)
        #[arg(long)]
        output: Option<String>,
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Delete a file or folder
    Delete {
        name: String,
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Print a file's contents or a folder's listing
    View {
        name: String,
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Email a file, or a folder as a zip attachment
    Email {
        name: String,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
    },
    /// Watch the drop folder and relocate whatever appears in it
    Watch {
        /// Route by the configured [[rules]] instead of prompting
        #[arg(long)]
        rules: bool,
        /// Attempts per entry before giving up
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_retries: Option<u32>,
    },
}

impl Command {
    fn email_args(&self) -> Option<&EmailArgs> {
        match self {
            Command::CreateFile { email, .. }
            | Command::CreateFolder { email, .. }
            | Command::Move { email, .. }
            | Command::Rename { email, .. }
            | Command::Copy { email, .. }
            | Command::Zip { email, .. }
            | Command::Delete { email, .. }
            | Command::View { email, .. } => Some(email),
            Command::Email { .. } | Command::Watch { .. } => None,
        }
    }

    fn force(&self) -> bool {
        match self {
            Command::Move { force, .. }
            | Command::Rename { force, .. }
            | Command::Copy { force, .. }
            | Command::Zip { force, .. } => *force,
            _ => false,
        }
    }
}

/// Errors surfaced by a single command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    File(#[from] FileOpError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// What a file command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    /// One-line summary for the user.
    pub message: String,
    /// The path the command produced or acted on.
    pub subject: PathBuf,
    /// Text to print verbatim (for `view`).
    pub output: Option<String>,
}

impl ActionReport {
    fn new(message: String, subject: PathBuf) -> Self {
        Self {
            message,
            subject,
            output: None,
        }
    }
}

/// Runs one file command against `files`.
///
/// `email` and `watch` are not file commands and are rejected here.
pub fn execute(command: &Command, files: &FileManager) -> Result<ActionReport, CliError> {
    let report = match command {
        Command::CreateFile {
            name, text, remove, ..
        } => {
            let path = files.create_file(name, text.as_deref(), remove.as_deref())?;
            ActionReport::new(format!("Created file: {}", path.display()), path)
        }
        Command::CreateFolder { name, .. } => {
            let path = files.create_folder(name)?;
            ActionReport::new(format!("Created folder: {}", path.display()), path)
        }
        Command::Move {
            source,
            destination,
            ..
        } => {
            let path = files.move_entry(source, destination)?;
            ActionReport::new(format!("Moved to: {}", path.display()), path)
        }
        Command::Rename { old, new, .. } => {
            let path = files.rename(old, new)?;
            ActionReport::new(format!("Renamed to: {}", path.display()), path)
        }
        Command::Copy {
            source,
            destination,
            ..
        } => {
            let path = files.copy(source, destination)?;
            ActionReport::new(format!("Copied to: {}", path.display()), path)
        }
        Command::Zip { source, output, .. } => {
            let path = files.archive(source, output.as_deref())?;
            ActionReport::new(format!("Zipped to: {}", path.display()), path)
        }
        Command::Delete { name, .. } => {
            let path = files.resolve(name);
            files.delete(name)?;
            ActionReport::new(format!("Deleted: {}", path.display()), path)
        }
        Command::View { name, .. } => {
            let path = files.resolve(name);
            let content = files.view(name)?;
            ActionReport {
                message: format!("Viewed: {}", path.display()),
                subject: path,
                output: Some(content),
            }
        }
        Command::Email { .. } | Command::Watch { .. } => {
            return Err(CliError::Usage(
                "email and watch are not file commands".to_string(),
            ));
        }
    };
    info!(summary = %report.message, "Command finished");
    Ok(report)
}

/// Runs the parsed command line.
///
/// # Errors
///
/// Returns the first error of the command itself or of the notification that
/// follows it. A failed notification does not undo the file operation.
pub fn run_cli(cli: Cli, config: AppConfig) -> Result<(), CliError> {
    let base_dir = cli
        .base_dir
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(|| config.watch.home());

    match &cli.command {
        Command::Watch { rules, max_retries } => {
            let home = cli.base_dir.as_deref().map(expand_tilde);
            return run_watch(&config, home, *rules, *max_retries);
        }
        Command::Email {
            name,
            sender,
            recipient,
        } => {
            let files = FileManager::new(base_dir);
            return send_file(&config, &files, name, sender.as_deref(), recipient.as_deref());
        }
        _ => {}
    }

    let files = FileManager::new(base_dir).with_force(cli.command.force());
    let report = execute(&cli.command, &files)?;

    match &report.output {
        Some(output) => OutputFormatter::plain(output),
        None => OutputFormatter::success(&report.message),
    }

    if let Some(email) = cli.command.email_args()
        && email.requested()
    {
        let recipient = resolve_recipient(email.explicit_recipient(), &config)?;
        let notifier = build_notifier(&config, email.sender.as_deref())?;
        let request = NotificationRequest::operation(&recipient, &report.message, &report.subject);
        notifier.notify(&request)?;
        OutputFormatter::success(&format!("Notification sent to {}", recipient));
    }

    Ok(())
}

/// Emails a file as an attachment; folders are zipped first.
fn send_file(
    config: &AppConfig,
    files: &FileManager,
    name: &str,
    sender: Option<&str>,
    recipient: Option<&str>,
) -> Result<(), CliError> {
    let attachment = files.attachment_for(name)?;
    let recipient = resolve_recipient(recipient.map(str::to_string), config)?;
    let notifier = build_notifier(config, sender)?;

    let path = files.resolve(name);
    let request = NotificationRequest::attachment(&recipient, &path, attachment.path());

    notifier.notify(&request)?;
    let file_name = attachment
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    OutputFormatter::success(&format!("Sent {} to {}", file_name, recipient));
    Ok(())
}

/// Picks the recipient: explicit flag, then config, then a prompt.
fn resolve_recipient(explicit: Option<String>, config: &AppConfig) -> Result<String, CliError> {
    let recipient = match explicit.or_else(|| config.email.recipient.clone()) {
        Some(recipient) => recipient,
        None if prompt::is_interactive() => prompt::ask_email("Recipient email")?,
        None => {
            return Err(NotifyError::Configuration(
                "no recipient given (use --recipient)".to_string(),
            )
            .into());
        }
    };

    if !is_valid_email(&recipient) {
        return Err(NotifyError::InvalidAddress {
            address: recipient,
            reason: "not an email address".to_string(),
        }
        .into());
    }
    Ok(recipient)
}

/// Builds the SMTP notifier, filling gaps in the environment from prompts.
fn build_notifier(config: &AppConfig, sender: Option<&str>) -> Result<SmtpNotifier, CliError> {
    let credentials = match (sender, SmtpCredentials::from_env()) {
        (None, Ok(credentials)) => credentials,
        (sender, _) => {
            let sender = match sender
                .map(str::to_string)
                .or_else(|| read_env(SENDER_ENV))
            {
                Some(sender) => sender,
                None if prompt::is_interactive() => prompt::ask_email("Sender email")?,
                None => {
                    let reason = format!("{} is not set", SENDER_ENV);
                    return Err(NotifyError::Configuration(reason).into());
                }
            };
            let password = match read_env(PASSWORD_ENV) {
                Some(password) => password,
                None if prompt::is_interactive() => {
                    prompt::ask_password("Sender email password")?
                }
                None => {
                    return Err(
                        NotifyError::Configuration(format!("{} is not set", PASSWORD_ENV)).into(),
                    );
                }
            };
            SmtpCredentials::new(sender, password)
        }
    };
    Ok(SmtpNotifier::new(&config.email, credentials))
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn run_watch(
    config: &AppConfig,
    home: Option<PathBuf>,
    rules: bool,
    max_retries: Option<u32>,
) -> Result<(), CliError> {
    let mut settings = config.watch.clone();
    if let Some(home) = home {
        settings.home = Some(home);
    }
    if let Some(max_retries) = max_retries {
        settings.max_retries = max_retries;
    }

    let interactive = settings.interactive && !rules;
    if interactive && !prompt::is_interactive() {
        return Err(CliError::Usage(
            "interactive watching needs a terminal; use --rules".to_string(),
        ));
    }

    let filters = config.filters.clone().compile()?;
    let route_rules = config.compile_rules()?;
    if !interactive && route_rules.is_empty() {
        warn!("No [[rules]] configured; every new entry will be left in place");
    }

    // Email is optional while watching; without credentials it is simply off
    let notifier = match SmtpCredentials::from_env() {
        Ok(credentials) => Some(SmtpNotifier::new(&config.email, credentials)),
        Err(e) => {
            info!(reason = %e, "Notifications disabled");
            None
        }
    };

    let (shutdown_tx, shutdown) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| WatchError::InitFailed {
        reason: format!("cannot install Ctrl-C handler: {}", e),
    })?;

    let mut watcher = ZoneWatcher::new(&settings, filters);
    if let Some(notifier) = &notifier {
        watcher = watcher.with_notifier(notifier);
    }

    let default_recipient = config
        .email
        .recipient
        .clone()
        .filter(|_| config.email.notify_on_relocation);
    let mut resolver: Box<dyn DestinationResolver> = if interactive {
        let mut resolver =
            PromptResolver::new(watcher.max_retries()).with_shutdown(shutdown.clone());
        if notifier.is_some() {
            resolver = resolver.with_notifications(config.email.recipient.clone());
        }
        Box::new(resolver)
    } else {
        Box::new(RuleResolver::new(route_rules, default_recipient))
    };

    OutputFormatter::info(&format!(
        "Watching {} (Ctrl-C to stop)",
        watcher.root().display()
    ));
    watcher.run(resolver.as_mut(), &shutdown)?;
    OutputFormatter::info("Stopped watching.");
    Ok(())
}
