//! Decision resolvers for the watcher.
//!
//! [`PromptResolver`] asks the user at the terminal. [`RuleResolver`] routes by
//! file-name globs from the configuration and never blocks.

use crate::config::CompiledRule;
use crate::output::OutputFormatter;
use crate::prompt::{self, PromptError};
use crate::watcher::{Decision, DestinationResolver, RelocationAttempt, WatchedPath};
use crossbeam_channel::Receiver;
use tracing::{debug, warn};

/// One entry of the per-path action menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Move,
    Rename,
    Zip,
    Delete,
    View,
    Copy,
    Email,
    Skip,
}

impl MenuChoice {
    /// Menu entries in display order.
    pub const ALL: [MenuChoice; 8] = [
        MenuChoice::Move,
        MenuChoice::Rename,
        MenuChoice::Zip,
        MenuChoice::Delete,
        MenuChoice::View,
        MenuChoice::Copy,
        MenuChoice::Email,
        MenuChoice::Skip,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuChoice::Move => "Move",
            MenuChoice::Rename => "Rename",
            MenuChoice::Zip => "Zip",
            MenuChoice::Delete => "Delete",
            MenuChoice::View => "View",
            MenuChoice::Copy => "Copy",
            MenuChoice::Email => "Email",
            MenuChoice::Skip => "Skip",
        }
    }

    /// Turns the choice plus its follow-up answer into a decision.
    ///
    /// `answer` is the destination, new name or recipient; choices without a
    /// follow-up question ignore it. A blank answer means skip.
    pub fn decision(self, answer: &str) -> Decision {
        let answer = answer.trim();
        let needs_answer = matches!(
            self,
            MenuChoice::Move | MenuChoice::Rename | MenuChoice::Copy | MenuChoice::Email
        );
        if needs_answer && answer.is_empty() {
            return Decision::Skip;
        }
        match self {
            MenuChoice::Move => Decision::from_input(answer),
            MenuChoice::Rename => Decision::Rename {
                new_name: answer.to_string(),
            },
            MenuChoice::Copy => Decision::Copy {
                destination: answer.to_string(),
            },
            MenuChoice::Email => Decision::Email {
                recipient: answer.to_string(),
            },
            MenuChoice::Zip => Decision::Zip,
            MenuChoice::Delete => Decision::Delete,
            MenuChoice::View => Decision::View,
            MenuChoice::Skip => Decision::Skip,
        }
    }
}

/// Asks the user what to do with each new entry.
pub struct PromptResolver {
    max_retries: u32,
    /// Offered as the default recipient for notifications and emails.
    default_recipient: Option<String>,
    ask_notify: bool,
    shutdown: Option<Receiver<()>>,
}

impl PromptResolver {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            default_recipient: None,
            ask_notify: false,
            shutdown: None,
        }
    }

    /// Quits instead of acting on an answer typed after Ctrl-C.
    pub fn with_shutdown(mut self, shutdown: Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn interrupted(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|rx| rx.try_recv().is_ok())
    }

    /// Also asks whether to send an email after each successful move.
    pub fn with_notifications(mut self, default_recipient: Option<String>) -> Self {
        self.ask_notify = true;
        self.default_recipient = default_recipient;
        self
    }

    fn question(watched: &WatchedPath) -> String {
        let name = watched.name();
        let example = match watched.category {
            Some(category) => format!("{}/{}", category.dir_name(), name),
            None => format!("github/{}", name),
        };
        format!(
            "Where would you like to move '{}' inside your home directory? Example: {}",
            name, example
        )
    }

    fn ask(&self, watched: &WatchedPath) -> Result<Decision, PromptError> {
        let labels: Vec<&str> = MenuChoice::ALL.iter().map(MenuChoice::label).collect();
        let index = prompt::choose(
            &format!("What would you like to do with '{}'?", watched.name()),
            &labels,
        )?;
        let choice = MenuChoice::ALL
            .get(index)
            .copied()
            .unwrap_or(MenuChoice::Skip);

        let decision = match choice {
            MenuChoice::Move => return self.ask_move(watched),
            MenuChoice::Rename => choice.decision(&prompt::ask_text("Rename to")?),
            MenuChoice::Copy => choice.decision(&prompt::ask_text(
                "Copy to (folder inside your home directory)",
            )?),
            MenuChoice::Email => choice.decision(&self.ask_recipient()?),
            MenuChoice::Delete => {
                let question = format!("Delete '{}' and everything in it?", watched.name());
                if prompt::confirm(&question, false)? {
                    Decision::Delete
                } else {
                    Decision::Skip
                }
            }
            MenuChoice::Zip | MenuChoice::View | MenuChoice::Skip => choice.decision(""),
        };
        Ok(decision)
    }

    fn ask_move(&self, watched: &WatchedPath) -> Result<Decision, PromptError> {
        let answer = prompt::ask_text(&Self::question(watched))?;
        let decision = MenuChoice::Move.decision(&answer);

        let Decision::Relocate { destination, .. } = decision else {
            return Ok(decision);
        };
        if !self.ask_notify || !prompt::confirm("Send an email notification?", false)? {
            return Ok(Decision::Relocate {
                destination,
                notify: None,
            });
        }
        Ok(Decision::Relocate {
            destination,
            notify: Some(self.ask_recipient()?),
        })
    }

    fn ask_recipient(&self) -> Result<String, PromptError> {
        match &self.default_recipient {
            Some(recipient) if prompt::confirm(&format!("Send to {}?", recipient), true)? => {
                Ok(recipient.clone())
            }
            _ => prompt::ask_email("Recipient email"),
        }
    }
}

impl DestinationResolver for PromptResolver {
    fn resolve(
        &mut self,
        watched: &WatchedPath,
        last_failure: Option<&RelocationAttempt>,
    ) -> Decision {
        if self.interrupted() {
            return Decision::Quit;
        }
        if let Some(attempt) = last_failure {
            OutputFormatter::error(&format!(
                "Attempt {}/{} to {} failed: {}",
                attempt.number,
                self.max_retries,
                attempt.action.label(),
                attempt.failure_reason().unwrap_or("unknown error")
            ));
            match prompt::confirm("Try another action?", true) {
                Ok(true) => {}
                Ok(false) => return Decision::Skip,
                Err(e) => return prompt_failed(e),
            }
        } else {
            OutputFormatter::header(&format!(
                "New {} detected: {}",
                watched.kind.label(),
                watched.name()
            ));
        }

        match self.ask(watched) {
            Ok(_) if self.interrupted() => Decision::Quit,
            Ok(decision) => decision,
            Err(e) => prompt_failed(e),
        }
    }

    fn show(&mut self, watched: &WatchedPath, content: &str) {
        OutputFormatter::header(&format!("Contents of {}", watched.name()));
        OutputFormatter::plain(content);
    }
}

/// Ctrl-C or a closed terminal while asking; nobody is left to answer.
fn prompt_failed(e: PromptError) -> Decision {
    warn!(error = %e, "Prompt aborted, stopping watcher");
    Decision::Quit
}

/// Routes entries by the first rule whose glob matches the entry name.
#[derive(Debug)]
pub struct RuleResolver {
    rules: Vec<CompiledRule>,
    default_recipient: Option<String>,
}

impl RuleResolver {
    /// `default_recipient` is notified for rules without their own `notify`.
    pub fn new(rules: Vec<CompiledRule>, default_recipient: Option<String>) -> Self {
        Self {
            rules,
            default_recipient,
        }
    }
}

impl DestinationResolver for RuleResolver {
    fn resolve(
        &mut self,
        watched: &WatchedPath,
        last_failure: Option<&RelocationAttempt>,
    ) -> Decision {
        // Rules are fixed; asking again would only repeat the failed move
        if let Some(attempt) = last_failure {
            debug!(
                path = %watched.path.display(),
                reason = attempt.failure_reason().unwrap_or("-"),
                "Rule destination failed, leaving entry in place"
            );
            return Decision::Skip;
        }

        let name = watched.name();
        match self.rules.iter().find(|rule| rule.pattern.matches(&name)) {
            Some(rule) => Decision::Relocate {
                destination: rule.destination.clone(),
                notify: rule
                    .notify
                    .clone()
                    .or_else(|| self.default_recipient.clone()),
            },
            None => {
                debug!(name = %name, "No rule matched");
                Decision::Skip
            }
        }
    }
}
