//! Email notifications.
//!
//! A [`NotificationRequest`] describes one message; a [`Notifier`] sends it.
//! Sending is best effort from the caller's point of view: the file operation
//! that triggered a notification has already happened and is never undone.

use crate::config::EmailSettings;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::info;

/// Environment variable holding the sender address.
pub const SENDER_ENV: &str = "EMAIL_SENDER";
/// Environment variable holding the sender's SMTP password.
pub const PASSWORD_ENV: &str = "EMAIL_PASSWORD";

const OCTET_STREAM: &str = "application/octet-stream";

static EMAIL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").ok()
});

/// Errors raised while preparing or delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Sender or credential missing from the environment.
    #[error("Email is not configured: {0}")]
    Configuration(String),

    /// An address could not be parsed.
    #[error("Invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The attachment could not be read.
    #[error("Cannot attach {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The message could not be assembled.
    #[error("Failed to build message: {0}")]
    Message(String),

    /// Transport or authentication failure.
    #[error("Failed to deliver email: {0}")]
    Delivery(String),
}

/// One outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

impl NotificationRequest {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }

    /// Describes a watched entry that was moved to its destination.
    pub fn relocation(recipient: impl Into<String>, source: &Path, destination: &Path) -> Self {
        let name = display_name(source);
        let subject = format!("Moved '{}' to '{}'", name, destination.display());
        let body = format!(
            "The file or folder '{}' was moved to:\n\n{}\n\n{}",
            name,
            destination.display(),
            footer()
        );
        Self::new(recipient, subject, body)
    }

    /// Describes the outcome of a command-line operation.
    pub fn operation(recipient: impl Into<String>, summary: &str, path: &Path) -> Self {
        let name = display_name(path);
        let subject = format!("Notification: {}", name);
        let body = format!(
            "{}\n\nThe file or folder '{}' is located at:\n\n{}\n\n{}",
            summary,
            name,
            path.display(),
            footer()
        );
        Self::new(recipient, subject, body)
    }

    /// Sends `entry` as `attachment`, which is the entry itself or its zip.
    pub fn attachment(recipient: impl Into<String>, entry: &Path, attachment: &Path) -> Self {
        let file_name = display_name(attachment);
        let summary = format!("Sending '{}' as an attachment.", file_name);
        let mut request = Self::operation(recipient, &summary, entry).with_attachment(attachment);
        request.subject = format!("File/Folder: {}", file_name);
        request
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn footer() -> String {
    let time = chrono::Local::now().format("%B %d, %Y at %I:%M %p");
    format!("Time: {}\nHost: {}", time, host_name())
}

/// The machine's name as the OS reports it.
fn host_name() -> String {
    hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown host".to_string())
}

/// Something that can deliver a [`NotificationRequest`].
pub trait Notifier {
    fn notify(&self, request: &NotificationRequest) -> Result<(), NotifyError>;
}

/// Returns true if `address` looks like an email address.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(address.trim()))
}

/// Sender address and SMTP password.
#[derive(Clone)]
pub struct SmtpCredentials {
    sender: String,
    password: String,
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("sender", &self.sender)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SmtpCredentials {
    pub fn new(sender: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            password: password.into(),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Reads `EMAIL_SENDER` and `EMAIL_PASSWORD` from the process environment.
    pub fn from_env() -> Result<Self, NotifyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads credentials through `lookup`; empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, NotifyError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| NotifyError::Configuration(format!("{} is not set", key)))
        };
        Ok(Self::new(read(SENDER_ENV)?, read(PASSWORD_ENV)?))
    }
}

/// Sends notifications over SMTP with implicit TLS.
#[derive(Debug, Clone)]
pub struct SmtpNotifier {
    host: String,
    port: u16,
    credentials: SmtpCredentials,
}

impl SmtpNotifier {
    pub fn new(settings: &EmailSettings, credentials: SmtpCredentials) -> Self {
        Self {
            host: settings.smtp_host.clone(),
            port: settings.smtp_port,
            credentials,
        }
    }

    /// Assembles the MIME message for a request without sending it.
    pub fn build_message(&self, request: &NotificationRequest) -> Result<Message, NotifyError> {
        let from = parse_mailbox(&self.credentials.sender)?;
        let to = parse_mailbox(&request.recipient)?;
        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(request.subject.clone());

        let text = SinglePart::plain(request.body.clone());
        let message = match &request.attachment {
            None => builder.singlepart(text),
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|source| NotifyError::Attachment {
                    path: path.clone(),
                    source,
                })?;
                let mime = infer::get(&bytes)
                    .map(|kind| kind.mime_type())
                    .unwrap_or(OCTET_STREAM);
                let content_type = ContentType::parse(mime)
                    .or_else(|_| ContentType::parse(OCTET_STREAM))
                    .map_err(|e| NotifyError::Message(e.to_string()))?;
                let file_name = display_name(path);
                let attachment = Attachment::new(file_name).body(bytes, content_type);
                builder.multipart(MultiPart::mixed().singlepart(text).singlepart(attachment))
            }
        };
        message.map_err(|e| NotifyError::Message(e.to_string()))
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        let message = self.build_message(request)?;

        let transport = SmtpTransport::relay(&self.host)
            .map_err(|e| NotifyError::Delivery(e.to_string()))?
            .port(self.port)
            .credentials(Credentials::new(
                self.credentials.sender.clone(),
                self.credentials.password.clone(),
            ))
            .build();

        transport
            .send(&message)
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        info!(recipient = %request.recipient, subject = %request.subject, "Email sent");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn notifier() -> SmtpNotifier {
        SmtpNotifier::new(
            &EmailSettings::default(),
            SmtpCredentials::new("me@example.com", "secret"),
        )
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("me@example.com"));
        assert!(is_valid_email(" first.last+tag@mail.example.org "));
        assert!(!is_valid_email("me@"));
        assert!(!is_valid_email("not an email"));
        assert!(!is_valid_email("me@example"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_missing_credentials_are_configuration_errors() {
        let env: HashMap<&str, &str> = HashMap::from([(SENDER_ENV, "me@example.com")]);
        let result = SmtpCredentials::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        match result {
            Err(NotifyError::Configuration(msg)) => assert!(msg.contains(PASSWORD_ENV)),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_credentials_count_as_missing() {
        let result = SmtpCredentials::from_lookup(|_| Some("   ".to_string()));
        assert!(matches!(result, Err(NotifyError::Configuration(_))));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = SmtpCredentials::new("me@example.com", "hunter2");
        let shown = format!("{:?}", credentials);
        assert!(shown.contains("me@example.com"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_build_plain_message() {
        let request = NotificationRequest::new("you@example.com", "Moved notes", "hello there");
        let message = notifier().build_message(&request).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Moved notes"));
        assert!(raw.contains("To: you@example.com"));
        assert!(raw.contains("hello there"));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "quarterly numbers").unwrap();

        let request =
            NotificationRequest::new("you@example.com", "File: report.txt", "see attached")
                .with_attachment(&path);
        let message = notifier().build_message(&request).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("report.txt"));
    }

    #[test]
    fn test_invalid_recipient() {
        let request = NotificationRequest::new("not an address", "s", "b");
        assert!(matches!(
            notifier().build_message(&request),
            Err(NotifyError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_missing_attachment() {
        let request = NotificationRequest::new("you@example.com", "s", "b")
            .with_attachment("/non/existent/file.bin");
        assert!(matches!(
            notifier().build_message(&request),
            Err(NotifyError::Attachment { .. })
        ));
    }

    #[test]
    fn test_relocation_request_text() {
        let request = NotificationRequest::relocation(
            "you@example.com",
            Path::new("/home/me/WatchZone/notes.txt"),
            Path::new("/home/me/archive/notes.txt"),
        );

        assert_eq!(
            request.subject,
            "Moved 'notes.txt' to '/home/me/archive/notes.txt'"
        );
        assert!(request.body.contains("/home/me/archive/notes.txt"));
        assert!(request.body.contains("Time: "));
        assert!(request.attachment.is_none());
    }

    #[test]
    fn test_attachment_request_names_the_archive() {
        let request = NotificationRequest::attachment(
            "you@example.com",
            Path::new("/home/me/WatchZone/photos"),
            Path::new("/tmp/watchzone-20240101-000000-photos.zip"),
        );

        assert_eq!(
            request.subject,
            "File/Folder: watchzone-20240101-000000-photos.zip"
        );
        assert!(request.body.contains("/home/me/WatchZone/photos"));
        assert_eq!(
            request.attachment.as_deref(),
            Some(Path::new("/tmp/watchzone-20240101-000000-photos.zip"))
        );
    }

    #[test]
    fn test_footer_names_this_machine() {
        let expected = hostname::get().unwrap().to_string_lossy().trim().to_string();

        let body = footer();

        assert!(!expected.is_empty());
        assert!(body.contains(&format!("Host: {}", expected)));
        assert!(!body.contains("unknown host"));
    }
}
