//! Registrant notifications.
//!
//! Mails are always sent after the change they report on has been committed. Whatever happens
//! here never feeds back into that change.

use std::sync::Arc;

use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncTransport,
};
use thiserror::Error;

use crate::{
    config::MailConfig,
    format_helpers::{format_amount, format_date, format_time},
    registration::PaymentStatus,
    sql_interface::{Meetup, Registration},
};

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("SMTP error sending mail: {0}")]
    LettreError(#[from] lettre::transport::smtp::Error),
    #[error("Error while building email: {0}")]
    BuildError(#[from] lettre::error::Error),
    #[error("Invalid recipient address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),
    #[error("{0}")]
    Other(String),
}

/// Sent right after someone registered.
#[derive(Clone, Debug)]
pub struct ConfirmationNotice {
    pub to: String,
    pub full_name: String,
    pub title: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub payment_required: bool,
    pub payment_amount: Option<String>,
}

impl ConfirmationNotice {
    #[must_use]
    pub fn new(registration: &Registration, meetup: &Meetup) -> Self {
        Self {
            to: registration.email.clone(),
            full_name: registration.full_name.clone(),
            title: meetup.title.clone(),
            date: format_date(meetup.date),
            time: format_time(meetup.time),
            location: meetup.location.clone(),
            payment_required: meetup.payment_required,
            payment_amount: meetup.payment_amount.map(format_amount),
        }
    }

    #[must_use]
    pub fn subject(&self) -> String {
        format!("[Book Club] Registration received: {}", self.title)
    }

    #[must_use]
    pub fn body(&self) -> String {
        let payment = if self.payment_required {
            format!(
                "This meetup requires a payment{}. We received your payment proof and will\n\
                 let you know as soon as it has been checked.",
                self.payment_amount
                    .as_ref()
                    .map(|amount| format!(" of {amount}"))
                    .unwrap_or_default()
            )
        } else {
            "Your seat is confirmed, nothing else to do.".to_string()
        };

        format!(
            "Hi {},

thanks for registering for \"{}\".

When:  {} at {}
Where: {}

{}

See you there!
Your Book Club",
            self.full_name, self.title, self.date, self.time, self.location, payment
        )
    }
}

/// Sent when an admin verified or rejected a registration.
#[derive(Clone, Debug)]
pub struct StatusNotice {
    pub to: String,
    pub full_name: String,
    pub title: String,
    pub date: String,
    pub location: String,
    pub status: PaymentStatus,
}

impl StatusNotice {
    #[must_use]
    pub fn new(registration: &Registration, meetup: &Meetup) -> Self {
        Self {
            to: registration.email.clone(),
            full_name: registration.full_name.clone(),
            title: meetup.title.clone(),
            date: format_date(meetup.date),
            location: meetup.location.clone(),
            status: registration.payment_status,
        }
    }

    #[must_use]
    pub fn subject(&self) -> String {
        if self.status == PaymentStatus::Verified {
            format!("[Book Club] You're in: {}", self.title)
        } else {
            format!("[Book Club] Update on your registration: {}", self.title)
        }
    }

    #[must_use]
    pub fn body(&self) -> String {
        let message = if self.status == PaymentStatus::Verified {
            "your registration has been verified. Your seat is confirmed."
        } else {
            "unfortunately we could not verify your registration. If you think this is a\n\
             mistake, just reply to this mail."
        };

        format!(
            "Hi {},

{}

Meetup: {}
When:   {}
Where:  {}

Your Book Club",
            self.full_name, message, self.title, self.date, self.location
        )
    }
}

/// Anything able to deliver registrant notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, notice: &ConfirmationNotice)
        -> Result<(), NotificationError>;

    async fn send_status_update(&self, notice: &StatusNotice) -> Result<(), NotificationError>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Sends notifications through an SMTP relay.
pub struct SmtpNotifier {
    config: MailConfig,
}

impl SmtpNotifier {
    #[must_use]
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    async fn send(&self, to: &str, subject: String, body: String) -> Result<(), NotificationError> {
        let email = lettre::Message::builder()
            .from(Mailbox::new(
                Some(self.config.sender_name.clone()),
                self.config.email.clone(),
            ))
            .to(Mailbox::new(None, to.parse()?))
            .subject(subject)
            .body(body)?;

        let creds = Credentials::new(
            self.config.email.to_string(),
            self.config.email_creds.clone(),
        );
        let conn =
            lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(&self.config.smtp_server)?
                .credentials(creds)
                .build();

        conn.send(email).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_confirmation(
        &self,
        notice: &ConfirmationNotice,
    ) -> Result<(), NotificationError> {
        self.send(&notice.to, notice.subject(), notice.body()).await
    }

    async fn send_status_update(&self, notice: &StatusNotice) -> Result<(), NotificationError> {
        self.send(&notice.to, notice.subject(), notice.body()).await
    }
}

/// Writes notifications to the log instead of sending them. Used when no mail server is
/// configured.
#[derive(Clone, Debug, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send_confirmation(
        &self,
        notice: &ConfirmationNotice,
    ) -> Result<(), NotificationError> {
        log::info!(
            "Mail to {} (not sent, no mail server configured)\nSubject: {}\n\n{}",
            notice.to,
            notice.subject(),
            notice.body()
        );
        Ok(())
    }

    async fn send_status_update(&self, notice: &StatusNotice) -> Result<(), NotificationError> {
        log::info!(
            "Mail to {} (not sent, no mail server configured)\nSubject: {}\n\n{}",
            notice.to,
            notice.subject(),
            notice.body()
        );
        Ok(())
    }
}

/// Builds the notifier matching the mail settings.
#[must_use]
pub fn from_config(mail: Option<&MailConfig>) -> SharedNotifier {
    match mail {
        Some(mail) => Arc::new(SmtpNotifier::new(mail.clone())),
        None => {
            log::warn!("No mail settings configured, notifications will only be logged");
            Arc::new(ConsoleNotifier)
        }
    }
}

/// Sends the registration confirmation in the background. Failures are logged and dropped,
/// the registration stands either way.
pub fn spawn_confirmation(notifier: SharedNotifier, notice: ConfirmationNotice) {
    rocket::tokio::spawn(async move {
        if let Err(err) = notifier.send_confirmation(&notice).await {
            log::error!(
                "Could not send registration confirmation to {}: {}",
                notice.to,
                err
            );
        }
    });
}

/// Describes a failed notification for admins, naming the SMTP error class if there is one.
#[must_use]
pub fn describe_failure(err: &NotificationError) -> String {
    match err {
        NotificationError::LettreError(err) if err.is_permanent() => {
            format!("permanent SMTP error: {err}")
        }
        NotificationError::LettreError(err) if err.is_transient() => {
            format!("temporary SMTP error: {err}")
        }
        err => err.to_string(),
    }
}
