//! Registration intake: turns a public submission into a registration row.
//!
//! Checks run in a fixed order (fields, meetup state, capacity, duplicates, payment proof) and
//! nothing is written before all of them passed. The capacity check happens right before the
//! insert, which narrows but doesn't close the window in which two concurrent submissions can
//! both take the last seat.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    registration::{MeetupStatus, OccupancyView, PaymentStatus},
    sql_interface::{
        self, Meetup, NewRegistration, Registration,
    },
    storage::{decode_image, screenshot_key, ProofStore, StorageError},
};

/// A registration as submitted through the public page.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub why_join: Option<String>,

    /// Base64 encoded image, optionally as `data:` URL.
    #[serde(default)]
    pub payment_screenshot: Option<String>,
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("Meetup not found")]
    NotFound,
    #[error("Registration for this meetup is closed")]
    Closed,
    #[error("This meetup is fully booked")]
    FullyBooked,
    #[error("This email address is already registered for this meetup")]
    Duplicate,
    #[error("Could not store payment screenshot: {0}")]
    Storage(#[from] StorageError),
    #[error("Database or query error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl IntakeError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// The seats left to show after this error, if it says anything about them.
    #[must_use]
    pub fn slots_left(&self) -> Option<i64> {
        matches!(self, Self::FullyBooked).then_some(0)
    }
}

/// What a successful submission produced.
#[derive(Debug)]
pub struct Receipt {
    pub registration: Registration,
    pub meetup: Meetup,

    /// Seats left after this registration, [`None`] meaning unlimited.
    pub slots_left: Option<i64>,
}

/// Trimmed submission with blank optional fields removed.
struct Cleaned {
    full_name: String,
    email: String,
    phone: Option<String>,
    why_join: Option<String>,
    payment_screenshot: Option<String>,
}

fn non_blank(field: Option<&String>) -> Option<String> {
    field
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

impl Cleaned {
    fn from_submission(submission: &Submission) -> Result<Self, IntakeError> {
        let full_name = submission.full_name.trim();
        if full_name.is_empty() {
            return Err(IntakeError::validation("full_name", "Please enter your name."));
        }

        let email = submission.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(IntakeError::validation("email", "Please enter your email address."));
        }
        if !email.contains('@') {
            return Err(IntakeError::validation(
                "email",
                "Please enter a valid email address.",
            ));
        }

        Ok(Self {
            full_name: full_name.to_string(),
            email,
            phone: non_blank(submission.phone.as_ref()),
            why_join: non_blank(submission.why_join.as_ref()),
            payment_screenshot: non_blank(submission.payment_screenshot.as_ref()),
        })
    }
}

/// Validates and stores a registration for `meetup_id`.
///
/// Returns the first failing check as [`IntakeError`]; in that case nothing was written, neither
/// to the database nor to `store`.
pub fn submit(
    conn: &mut rusqlite::Connection,
    store: &dyn ProofStore,
    meetup_id: i64,
    submission: &Submission,
    screenshot_limit: usize,
    now: DateTime<Utc>,
) -> Result<Receipt, IntakeError> {
    let cleaned = Cleaned::from_submission(submission)?;

    let meetup = sql_interface::get_meetup(conn, meetup_id)?.ok_or(IntakeError::NotFound)?;
    if meetup.status != MeetupStatus::Upcoming {
        return Err(IntakeError::Closed);
    }

    let capacity = sql_interface::capacity_of(conn, &meetup, OccupancyView::Intake)?;
    if capacity.is_full() {
        return Err(IntakeError::FullyBooked);
    }

    if sql_interface::find_active_registration(conn, meetup_id, &cleaned.email)?.is_some() {
        return Err(IntakeError::Duplicate);
    }

    let image = match &cleaned.payment_screenshot {
        None if meetup.payment_required => {
            return Err(IntakeError::validation(
                "payment_screenshot",
                "This meetup requires a payment, please upload a screenshot of your payment.",
            ))
        }
        None => None,
        Some(payload) => Some(decode_image(payload, screenshot_limit).map_err(|err| {
            IntakeError::validation("payment_screenshot", format!("Payment screenshot: {err}."))
        })?),
    };

    let stored = image
        .map(|image| {
            let key = screenshot_key(meetup_id, &cleaned.email, now, image.kind);
            store.store(&key, &image.bytes).map(|url| (key, url))
        })
        .transpose()?;
    let (stored_key, payment_screenshot_url) = stored.unzip();

    let new_registration = NewRegistration {
        meetup_id,
        full_name: cleaned.full_name,
        email: cleaned.email,
        phone: cleaned.phone,
        why_join: cleaned.why_join,
        payment_status: PaymentStatus::initial(meetup.payment_required),
        payment_screenshot_url,
    };
    let id = sql_interface::insert_new_registration(conn, &new_registration, now).map_err(
        |err| {
            // no row points at the screenshot, so it goes again
            if let Some(key) = &stored_key {
                if let Err(discard_err) = store.discard(key) {
                    log::error!("Could not discard orphaned screenshot: {}", discard_err);
                }
            }
            IntakeError::Persistence(err)
        },
    )?;

    let registration = Registration {
        id,
        meetup_id,
        full_name: new_registration.full_name,
        email: new_registration.email,
        phone: new_registration.phone,
        why_join: new_registration.why_join,
        payment_status: new_registration.payment_status,
        payment_screenshot_url: new_registration.payment_screenshot_url,
        admin_notes: None,
        status_updated_at: None,
        created_at: now,
    };

    Ok(Receipt {
        registration,
        meetup,
        slots_left: capacity.slots_left().map(|left| left - 1),
    })
}
