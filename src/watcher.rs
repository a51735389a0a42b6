//! The watch-zone event loop.
//!
//! Handling one new path is split in two steps so the state machine can run
//! without a terminal:
//!
//! 1. [`ZoneWatcher::on_path_appeared`] re-checks the path and filters it,
//!    returning a [`Detection`]. Only [`Detection::Pending`] needs a decision.
//! 2. [`ZoneWatcher::handle`] asks a [`DestinationResolver`] what to do with
//!    the path (move, rename, copy, zip, delete, view or email it) and does
//!    it. A failed action counts as one attempt and the resolver is asked
//!    again, at most `max_retries` times.
//!
//! ```text
//! Detected -> Filtered
//! Detected -> AwaitingDecision -> Skipped
//!                              -> Acting -> Succeeded
//!                                        -> Failed -> AwaitingDecision
//!                                        -> Abandoned (after max_retries)
//! ```
//!
//! Renaming and zipping leave their result inside the watch zone, where it
//! is reported again as a new entry.

use crate::category::Category;
use crate::config::{CompiledFilters, WatchSettings};
use crate::file_ops::{self, FileManager, FileOpError};
use crate::notifier::{NotificationRequest, Notifier, NotifyError};
use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Folder names that are never offered for relocation (exact, case-sensitive).
pub const RESERVED_NAMES: [&str; 5] = [
    "Library",
    "Applications",
    "Desktop",
    "Documents",
    "Downloads",
];

/// True for dotfiles and well-known system folders.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with('.') || RESERVED_NAMES.contains(&name)
}

/// Errors from setting up or running the watch loop.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {}: {reason}", path.display())]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Watch root {} exists but is not a folder", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("Cannot create watch root {}: {source}", path.display())]
    RootCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Event channel closed unexpectedly")]
    ChannelClosed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Why a single attempt failed.
#[derive(Error, Debug)]
pub enum RelocationError {
    #[error(transparent)]
    File(#[from] FileOpError),

    #[error("Destination {} is inside the watch zone", .0.display())]
    InsideWatchZone(PathBuf),

    #[error("Destination '{0}' leaves the home folder")]
    OutsideHome(String),

    #[error("'{0}' is not a plain file name")]
    InvalidName(String),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl RelocationError {
    /// Whether asking again could lead somewhere.
    ///
    /// Only a vanished source is hopeless; a taken or bad destination can be
    /// fixed by choosing another one.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RelocationError::File(FileOpError::NotFound { .. }))
    }

    /// A raw I/O failure rather than a fact about source or destination.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelocationError::File(e) if e.is_transient())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "folder",
        }
    }
}

/// A new entry discovered under the watch root.
#[derive(Debug, Clone)]
pub struct WatchedPath {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub discovered_at: DateTime<Local>,
    /// Dotfile or well-known system folder; never relocated.
    pub reserved: bool,
    /// MIME type sniffed from the content, for files `infer` recognises.
    pub mime_type: Option<String>,
    /// Folder suggested by the content category.
    pub category: Option<Category>,
}

impl WatchedPath {
    /// Inspects a path, returning `None` if it no longer exists.
    pub fn inspect(path: &Path) -> Option<Self> {
        let metadata = fs::symlink_metadata(path).ok()?;
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let mime_type = match kind {
            EntryKind::File => infer::get_from_path(path)
                .ok()
                .flatten()
                .map(|t| t.mime_type().to_string()),
            EntryKind::Directory => None,
        };
        let category = match kind {
            EntryKind::File => Category::detect(path, mime_type.as_deref()),
            EntryKind::Directory => None,
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Some(Self {
            path: path.to_path_buf(),
            kind,
            discovered_at: Local::now(),
            reserved: is_reserved(&name),
            mime_type,
            category,
        })
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Dotfile or reserved system folder.
    Reserved,
    /// Matched a user-configured exclude rule.
    Excluded,
}

/// Result of looking at a freshly reported path.
#[derive(Debug)]
pub enum Detection {
    /// The path was already gone.
    Vanished(PathBuf),
    /// The path is not user content.
    Filtered { path: PathBuf, reason: IgnoreReason },
    /// The path awaits a destination.
    Pending(WatchedPath),
}

/// What to do with a pending path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Leave the path where it is.
    Skip,
    /// Move it into `destination` (relative to home), optionally notifying
    /// `notify` afterwards.
    Relocate {
        destination: String,
        notify: Option<String>,
    },
    /// Give it a new name in the same folder.
    Rename { new_name: String },
    /// Copy it into `destination` (relative to home); the original stays.
    Copy { destination: String },
    /// Zip a folder into `<name>.zip` next to it.
    Zip,
    /// Delete it with everything inside.
    Delete,
    /// Show a file's content or a folder's listing.
    View,
    /// Email it to `recipient`, zipping folders first.
    Email { recipient: String },
    /// Stop watching altogether.
    Quit,
}

/// The kind of work a [`Decision`] asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    Move,
    Rename,
    Copy,
    Zip,
    Delete,
    View,
    Email,
}

impl EntryAction {
    pub fn label(&self) -> &'static str {
        match self {
            EntryAction::Move => "move",
            EntryAction::Rename => "rename",
            EntryAction::Copy => "copy",
            EntryAction::Zip => "zip",
            EntryAction::Delete => "delete",
            EntryAction::View => "view",
            EntryAction::Email => "email",
        }
    }
}

impl Decision {
    /// The action to perform, or `None` for `Skip` and `Quit`.
    pub fn action(&self) -> Option<EntryAction> {
        match self {
            Decision::Relocate { .. } => Some(EntryAction::Move),
            Decision::Rename { .. } => Some(EntryAction::Rename),
            Decision::Copy { .. } => Some(EntryAction::Copy),
            Decision::Zip => Some(EntryAction::Zip),
            Decision::Delete => Some(EntryAction::Delete),
            Decision::View => Some(EntryAction::View),
            Decision::Email { .. } => Some(EntryAction::Email),
            Decision::Skip | Decision::Quit => None,
        }
    }

    /// True when the typed part of the decision is empty, which means skip.
    fn is_blank(&self) -> bool {
        match self {
            Decision::Relocate { destination, .. } | Decision::Copy { destination } => {
                destination.trim().is_empty()
            }
            Decision::Rename { new_name } => new_name.trim().is_empty(),
            Decision::Email { recipient } => recipient.trim().is_empty(),
            _ => false,
        }
    }

    /// Interprets a typed answer. Blank, `skip` and `cancel` mean skip.
    pub fn from_input(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty()
            || input.eq_ignore_ascii_case("skip")
            || input.eq_ignore_ascii_case("cancel")
        {
            return Decision::Skip;
        }
        Decision::Relocate {
            destination: input.to_string(),
            notify: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed { reason: String, retryable: bool },
}

/// One try at acting on a watched path.
#[derive(Debug, Clone)]
pub struct RelocationAttempt {
    /// 1-based, increasing per watched path.
    pub number: u32,
    pub action: EntryAction,
    /// Where the entry went, or was meant to go. The entry itself for
    /// actions that leave it in place.
    pub destination: PathBuf,
    pub outcome: AttemptOutcome,
}

impl RelocationAttempt {
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Failed { reason, .. } => Some(reason),
            AttemptOutcome::Succeeded => None,
        }
    }
}

/// Supplies decisions for pending paths.
///
/// `last_failure` is the previous attempt when the resolver is asked again
/// after a failed action.
pub trait DestinationResolver {
    fn resolve(
        &mut self,
        watched: &WatchedPath,
        last_failure: Option<&RelocationAttempt>,
    ) -> Decision;

    /// Receives the text produced by a [`Decision::View`].
    fn show(&mut self, _watched: &WatchedPath, _content: &str) {}
}

/// Terminal state of one watched path.
#[derive(Debug)]
pub enum Outcome {
    Filtered(IgnoreReason),
    Vanished { attempts: Vec<RelocationAttempt> },
    Skipped { attempts: Vec<RelocationAttempt> },
    Succeeded {
        action: EntryAction,
        destination: PathBuf,
        attempts: Vec<RelocationAttempt>,
    },
    Abandoned { attempts: Vec<RelocationAttempt> },
    /// The resolver asked to stop watching.
    Stopped,
}

impl Outcome {
    pub fn attempts(&self) -> &[RelocationAttempt] {
        match self {
            Outcome::Vanished { attempts }
            | Outcome::Skipped { attempts }
            | Outcome::Succeeded { attempts, .. }
            | Outcome::Abandoned { attempts } => attempts,
            Outcome::Filtered(_) | Outcome::Stopped => &[],
        }
    }
}

/// Owns the OS watch handle for the watch root; releases it on drop.
pub struct WatchSession {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl WatchSession {
    /// Starts a recursive watch on `root`, forwarding events into `tx`.
    pub fn start(root: &Path, tx: Sender<notify::Result<Event>>) -> Result<Self, WatchError> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;
        debug!(root = %root.display(), "Watch handle acquired");
        Ok(Self {
            watcher,
            root: root.to_path_buf(),
        })
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        match self.watcher.unwatch(&self.root) {
            Ok(()) => debug!(root = %self.root.display(), "Watch handle released"),
            Err(e) => debug!(root = %self.root.display(), error = %e, "Unwatch failed"),
        }
    }
}

/// Result of one successful action.
struct Performed {
    path: PathBuf,
    /// Text for the resolver to show, from `View`.
    shown: Option<String>,
}

/// The sibling path for a rename, refusing anything but a plain name.
fn renamed_path(path: &Path, new_name: &str) -> Result<PathBuf, RelocationError> {
    let mut components = Path::new(new_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Ok(path.with_file_name(name)),
        _ => Err(RelocationError::InvalidName(new_name.to_string())),
    }
}

/// Paths that newly appeared according to `event`.
///
/// Only creations and the arriving side of renames count; modifications and
/// removals never produce work.
pub fn appeared_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1).cloned().into_iter().collect()
        }
        // Backends that cannot tell the two sides apart report both; keep
        // whichever side is still there.
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            event.paths.iter().filter(|p| p.exists()).cloned().collect()
        }
        _ => Vec::new(),
    }
}

/// Watches one root and acts on what appears in it.
pub struct ZoneWatcher<'a> {
    root: PathBuf,
    home: FileManager,
    max_retries: u32,
    filters: CompiledFilters,
    notifier: Option<&'a dyn Notifier>,
}

impl<'a> ZoneWatcher<'a> {
    pub fn new(settings: &WatchSettings, filters: CompiledFilters) -> Self {
        Self {
            root: settings.root(),
            home: FileManager::new(settings.home()),
            max_retries: settings.max_retries.max(1),
            filters,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Creates the watch root if it does not exist yet.
    pub fn ensure_root(&self) -> Result<(), WatchError> {
        if self.root.is_dir() {
            return Ok(());
        }
        if self.root.exists() {
            return Err(WatchError::RootNotDirectory(self.root.clone()));
        }
        fs::create_dir_all(&self.root).map_err(|source| WatchError::RootCreation {
            path: self.root.clone(),
            source,
        })?;
        info!(root = %self.root.display(), "Created watch folder");
        Ok(())
    }

    /// Looks at a path the OS reported as new.
    pub fn on_path_appeared(&self, path: &Path) -> Detection {
        let Some(watched) = WatchedPath::inspect(path) else {
            debug!(path = %path.display(), "Path vanished before handling");
            return Detection::Vanished(path.to_path_buf());
        };

        // Any reserved component hides everything below it too
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let reserved = watched.reserved
            || relative
                .components()
                .any(|c| is_reserved(&c.as_os_str().to_string_lossy()));
        if reserved {
            info!(path = %path.display(), "Skipped system path");
            return Detection::Filtered {
                path: watched.path,
                reason: IgnoreReason::Reserved,
            };
        }

        if !self.filters.should_include(relative) {
            info!(path = %path.display(), "Skipped excluded path");
            return Detection::Filtered {
                path: watched.path,
                reason: IgnoreReason::Excluded,
            };
        }

        info!(
            path = %path.display(),
            kind = watched.kind.label(),
            mime = watched.mime_type.as_deref().unwrap_or("-"),
            "New entry detected"
        );
        Detection::Pending(watched)
    }

    /// Drives one pending path to a terminal state.
    pub fn handle(
        &self,
        watched: &WatchedPath,
        resolver: &mut dyn DestinationResolver,
    ) -> Outcome {
        let mut attempts: Vec<RelocationAttempt> = Vec::new();

        for number in 1..=self.max_retries {
            let decision = resolver.resolve(watched, attempts.last());
            let action = match decision.action() {
                None if decision == Decision::Quit => return Outcome::Stopped,
                Some(action) if !decision.is_blank() => action,
                _ => {
                    info!(path = %watched.path.display(), "User skipped the path");
                    return Outcome::Skipped { attempts };
                }
            };

            if !watched.exists() {
                info!(path = %watched.path.display(), "Path no longer exists");
                return Outcome::Vanished { attempts };
            }

            let requested = self.intended_target(watched, &decision);
            info!(
                attempt = number,
                max = self.max_retries,
                action = action.label(),
                target = %requested.display(),
                "Acting on path"
            );

            match self.perform(watched, &decision) {
                Ok(done) => {
                    info!(
                        action = action.label(),
                        from = %watched.path.display(),
                        to = %done.path.display(),
                        "Action succeeded"
                    );
                    attempts.push(RelocationAttempt {
                        number,
                        action,
                        destination: done.path.clone(),
                        outcome: AttemptOutcome::Succeeded,
                    });
                    if let Some(content) = &done.shown {
                        resolver.show(watched, content);
                    }
                    if let Decision::Relocate {
                        notify: Some(recipient),
                        ..
                    } = &decision
                    {
                        self.send_notification(recipient, &watched.path, &done.path);
                    }
                    return Outcome::Succeeded {
                        action,
                        destination: done.path,
                        attempts,
                    };
                }
                Err(e) => {
                    warn!(
                        attempt = number,
                        max = self.max_retries,
                        action = action.label(),
                        transient = e.is_transient(),
                        error = %e,
                        "Action failed"
                    );
                    let retryable = e.is_retryable();
                    attempts.push(RelocationAttempt {
                        number,
                        action,
                        destination: requested,
                        outcome: AttemptOutcome::Failed {
                            reason: e.to_string(),
                            retryable,
                        },
                    });
                    if !retryable || !watched.exists() {
                        return Outcome::Vanished { attempts };
                    }
                }
            }
        }

        error!(
            path = %watched.path.display(),
            attempts = attempts.len(),
            "Giving up on path"
        );
        Outcome::Abandoned { attempts }
    }

    /// Detection plus handling for one reported path.
    pub fn process(&self, path: &Path, resolver: &mut dyn DestinationResolver) -> Outcome {
        match self.on_path_appeared(path) {
            Detection::Vanished(_) => Outcome::Vanished {
                attempts: Vec::new(),
            },
            Detection::Filtered { reason, .. } => Outcome::Filtered(reason),
            Detection::Pending(watched) => self.handle(&watched, resolver),
        }
    }

    /// Watches the root until `shutdown` fires or the resolver quits.
    ///
    /// Entries that already exist when watching starts are left alone.
    pub fn run(
        &self,
        resolver: &mut dyn DestinationResolver,
        shutdown: &Receiver<()>,
    ) -> Result<(), WatchError> {
        self.ensure_root()?;
        let (tx, events) = unbounded();
        let _session = WatchSession::start(&self.root, tx)?;
        info!(root = %self.root.display(), "Watching");

        loop {
            select! {
                recv(shutdown) -> _ => {
                    info!("Watcher stopped by user");
                    return Ok(());
                }
                recv(events) -> message => {
                    let event = match message {
                        Ok(Ok(event)) => event,
                        Ok(Err(e)) => {
                            warn!(error = %e, "File system event error");
                            continue;
                        }
                        Err(_) => return Err(WatchError::ChannelClosed),
                    };
                    debug!(kind = ?event.kind, paths = ?event.paths, "Event");

                    for path in appeared_paths(&event) {
                        let outcome = self.process(&path, resolver);
                        debug!(path = %path.display(), ?outcome, "Handled");
                        if matches!(outcome, Outcome::Stopped) {
                            info!("Watcher stopped from prompt");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn perform(
        &self,
        watched: &WatchedPath,
        decision: &Decision,
    ) -> Result<Performed, RelocationError> {
        let path = &watched.path;
        let target = match decision {
            Decision::Relocate { destination, .. } => {
                let folder = self.destination_folder(destination.trim())?;
                self.home.move_entry(path, folder)?
            }
            Decision::Copy { destination } => {
                let folder = self.destination_folder(destination.trim())?;
                self.home.copy(path, folder)?
            }
            Decision::Rename { new_name } => {
                let renamed = renamed_path(path, new_name.trim())?;
                self.home.rename(path, renamed)?
            }
            Decision::Zip => self.home.archive(path, None)?,
            Decision::Delete => {
                self.home.delete(path)?;
                path.clone()
            }
            Decision::View => {
                let content = self.home.view(path)?;
                return Ok(Performed {
                    path: path.clone(),
                    shown: Some(content),
                });
            }
            Decision::Email { recipient } => {
                self.email(path, recipient.trim())?;
                path.clone()
            }
            // Nothing to do; `handle` returns before reaching these
            Decision::Skip | Decision::Quit => path.clone(),
        };
        Ok(Performed {
            path: target,
            shown: None,
        })
    }

    /// Checks a typed destination and creates its folder under home.
    ///
    /// The destination must stay inside home (no `..`, no absolute path) and
    /// must not point back into the watch zone.
    fn destination_folder(&self, destination: &str) -> Result<PathBuf, RelocationError> {
        if file_ops::escapes_base(Path::new(destination)) {
            return Err(RelocationError::OutsideHome(destination.to_string()));
        }
        let folder = self.home.resolve(destination);
        if folder.starts_with(&self.root) {
            return Err(RelocationError::InsideWatchZone(folder));
        }
        Ok(self.home.ensure_folder(destination)?)
    }

    fn intended_target(&self, watched: &WatchedPath, decision: &Decision) -> PathBuf {
        match decision {
            Decision::Relocate { destination, .. } | Decision::Copy { destination } => {
                self.home.resolve(destination.trim())
            }
            Decision::Rename { new_name } => watched.path.with_file_name(new_name.trim()),
            _ => watched.path.clone(),
        }
    }

    fn email(&self, path: &Path, recipient: &str) -> Result<(), RelocationError> {
        let Some(notifier) = self.notifier else {
            return Err(NotifyError::Configuration("no sender credentials".to_string()).into());
        };
        let attachment = self.home.attachment_for(path)?;
        let request = NotificationRequest::attachment(recipient, path, attachment.path());
        notifier.notify(&request)?;
        Ok(())
    }

    fn send_notification(&self, recipient: &str, source: &Path, target: &Path) {
        let Some(notifier) = self.notifier else {
            warn!(recipient, "Notification requested but email is not configured");
            return;
        };
        let request = NotificationRequest::relocation(recipient, source, target);
        if let Err(e) = notifier.notify(&request) {
            error!(recipient, error = %e, "Failed to send notification");
        }
    }
}
