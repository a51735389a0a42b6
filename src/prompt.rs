//! Terminal prompts.

use crate::notifier::is_valid_email;
use dialoguer::{Confirm, Input, Password, Select};
use std::io::IsTerminal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Cannot prompt: stdin is not a terminal")]
    NotInteractive,

    #[error("Prompt failed: {0}")]
    Interaction(#[from] dialoguer::Error),
}

/// True when prompts can be shown.
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal()
}

/// Asks a free-form question. An empty answer is allowed.
pub fn ask_text(prompt: &str) -> Result<String, PromptError> {
    ensure_interactive()?;
    let answer: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    Ok(answer.trim().to_string())
}

/// Asks for an email address, re-asking until it is well formed.
pub fn ask_email(prompt: &str) -> Result<String, PromptError> {
    ensure_interactive()?;
    let answer: String = Input::new()
        .with_prompt(prompt)
        .validate_with(|input: &String| -> Result<(), &str> {
            if is_valid_email(input) {
                Ok(())
            } else {
                Err("That does not look like an email address")
            }
        })
        .interact_text()?;
    Ok(answer.trim().to_string())
}

pub fn ask_password(prompt: &str) -> Result<String, PromptError> {
    ensure_interactive()?;
    Ok(Password::new().with_prompt(prompt).interact()?)
}

pub fn confirm(prompt: &str, default: bool) -> Result<bool, PromptError> {
    ensure_interactive()?;
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

/// Lets the user pick one of `items`; returns its index.
pub fn choose(prompt: &str, items: &[&str]) -> Result<usize, PromptError> {
    ensure_interactive()?;
    Ok(Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(0)
        .interact()?)
}

fn ensure_interactive() -> Result<(), PromptError> {
    if is_interactive() {
        Ok(())
    } else {
        Err(PromptError::NotInteractive)
    }
}
