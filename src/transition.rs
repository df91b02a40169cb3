//! Admin status changes on registrations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{
    notify::{describe_failure, Notifier, StatusNotice},
    registration::{Action, OccupancyView, PaymentStatus},
    sql_interface::{self, Meetup, Registration, StatusUpdate, UpdateStatusError},
};

/// An admin asking to move a registration to `target`.
#[derive(Clone, Debug)]
pub struct TransitionRequest {
    pub registration_id: i64,
    pub target: PaymentStatus,

    /// [`None`] keeps the current notes, a blank string clears them.
    pub admin_notes: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Registration not found")]
    NotFound,
    #[error("A {from} registration can't become {to}")]
    Illegal {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("Database or query error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl From<UpdateStatusError> for TransitionError {
    fn from(source: UpdateStatusError) -> Self {
        match source {
            UpdateStatusError::NotFound => Self::NotFound,
            UpdateStatusError::RusqliteError(err) => Self::Persistence(err),
        }
    }
}

/// The committed result of a transition.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub action: Action,
    pub previous: PaymentStatus,

    /// The registration as stored after the update.
    pub registration: Registration,
    pub meetup: Meetup,

    /// Set when a registration was reopened although the meetup had no seat left.
    pub over_capacity: bool,
}

impl TransitionOutcome {
    /// The mail owed to the registrant, if any.
    #[must_use]
    pub fn status_notice(&self) -> Option<StatusNotice> {
        self.action
            .notifies_registrant()
            .then(|| StatusNotice::new(&self.registration, &self.meetup))
    }
}

/// Applies an admin transition and commits it.
///
/// Only moves listed in [`PaymentStatus::available_actions`] are accepted. Reopening is allowed
/// even when the meetup is full, since admins may overbook on purpose; the outcome flags it.
pub fn apply(
    conn: &mut rusqlite::Connection,
    request: &TransitionRequest,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    let registration = sql_interface::get_registration(conn, request.registration_id)?
        .ok_or(TransitionError::NotFound)?;
    let previous = registration.payment_status;
    let action =
        Action::leading_from(previous, request.target).ok_or(TransitionError::Illegal {
            from: previous,
            to: request.target,
        })?;

    let meetup = sql_interface::get_meetup(conn, registration.meetup_id)?
        .ok_or(TransitionError::NotFound)?;

    // a reopened cancellation still holds its seat in the intake view, it mustn't count twice
    let over_capacity = action == Action::Reopen && {
        let capacity = sql_interface::capacity_of(conn, &meetup, OccupancyView::Intake)?;
        if OccupancyView::Intake.holds_seat(previous) {
            capacity.releasing_one().is_full()
        } else {
            capacity.is_full()
        }
    };
    if over_capacity {
        log::warn!(
            "Reopening registration {} although meetup {} is at or over capacity",
            registration.id,
            meetup.id
        );
    }

    sql_interface::update_registration_status(
        conn,
        &StatusUpdate {
            registration_id: registration.id,
            payment_status: action.target(),
            admin_notes: request.admin_notes.clone(),
            updated_at: now,
        },
    )?;

    let registration = sql_interface::get_registration(conn, registration.id)?
        .ok_or(TransitionError::NotFound)?;

    Ok(TransitionOutcome {
        action,
        previous,
        registration,
        meetup,
        over_capacity,
    })
}

/// How the registrant notification after a transition went.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "email", content = "error", rename_all = "snake_case")]
pub enum NotificationReport {
    NotRequired,
    Sent,
    Failed(String),
}

impl NotificationReport {
    /// A warning for the admin, if the mail didn't go out.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Failed(reason) => Some(format!("Status updated, but the email failed: {reason}")),
            Self::NotRequired | Self::Sent => None,
        }
    }
}

/// Sends the status mail owed for `outcome`, if any. The stored status stays as it is no matter
/// how this goes.
pub async fn notify_registrant(
    notifier: &dyn Notifier,
    outcome: &TransitionOutcome,
) -> NotificationReport {
    let Some(notice) = outcome.status_notice() else {
        return NotificationReport::NotRequired;
    };

    match notifier.send_status_update(&notice).await {
        Ok(()) => NotificationReport::Sent,
        Err(err) => {
            log::error!(
                "Could not send status mail for registration {} to {}: {}",
                outcome.registration.id,
                notice.to,
                err
            );
            NotificationReport::Failed(describe_failure(&err))
        }
    }
}
