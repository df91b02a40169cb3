//! Registration statuses, the admin transition table and seat accounting.

use std::{fmt, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Unknown status '{0}'")]
pub struct UnknownStatus(pub String);

/// Where a registration stands regarding payment and admin review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Submitted,
    Verified,
    Rejected,
    Waitlisted,
    Cancelled,
}

/// Something an admin can do to a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Verify,
    Waitlist,
    Reject,
    Cancel,
    Reopen,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        Self::Pending,
        Self::Submitted,
        Self::Verified,
        Self::Rejected,
        Self::Waitlisted,
        Self::Cancelled,
    ];

    /// The initial status of a fresh registration.
    #[must_use]
    pub fn initial(payment_required: bool) -> Self {
        if payment_required {
            Self::Pending
        } else {
            Self::Verified
        }
    }

    /// All actions an admin may take on a registration in this status. Everything else is
    /// refused.
    #[must_use]
    pub fn available_actions(self) -> &'static [Action] {
        match self {
            Self::Pending | Self::Submitted => &[Action::Verify, Action::Waitlist, Action::Reject],
            Self::Waitlisted => &[Action::Verify, Action::Reject],
            Self::Verified => &[Action::Cancel],
            Self::Rejected | Self::Cancelled => &[Action::Reopen],
        }
    }

    /// Applies `action`, returning [`None`] if it isn't legal from here.
    #[must_use]
    pub fn apply(self, action: Action) -> Option<Self> {
        self.available_actions()
            .contains(&action)
            .then(|| action.target())
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Waitlisted => "waitlisted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Action {
    /// The status a registration ends up in after this action.
    #[must_use]
    pub fn target(self) -> PaymentStatus {
        match self {
            Self::Verify => PaymentStatus::Verified,
            Self::Waitlist => PaymentStatus::Waitlisted,
            Self::Reject => PaymentStatus::Rejected,
            Self::Cancel => PaymentStatus::Cancelled,
            Self::Reopen => PaymentStatus::Pending,
        }
    }

    /// Finds the legal action leading from `current` to `target`, if there is one.
    #[must_use]
    pub fn leading_from(current: PaymentStatus, target: PaymentStatus) -> Option<Self> {
        current
            .available_actions()
            .iter()
            .copied()
            .find(|action| action.target() == target)
    }

    /// Whether the registrant hears about this action by mail.
    #[must_use]
    pub fn notifies_registrant(self) -> bool {
        matches!(self, Self::Verify | Self::Reject)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Waitlist => "waitlist",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
            Self::Reopen => "reopen",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Lifecycle of a meetup itself. Only upcoming meetups take registrations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum MeetupStatus {
    Upcoming,
    Completed,
    Cancelled,
}

impl MeetupStatus {
    pub const ALL: [MeetupStatus; 3] = [Self::Upcoming, Self::Completed, Self::Cancelled];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MeetupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetupStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

macro_rules! text_column {
    ($status:ty) => {
        impl ToSql for $status {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $status {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|err| FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

text_column!(PaymentStatus);
text_column!(MeetupStatus);

/// Which registrations hold a seat. The two views answer different questions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OccupancyView {
    /// "Can one more person register?" Everything but rejected registrations holds a seat.
    Intake,
    /// "How many seats are currently held?" Cancelled registrations are released too.
    Dashboard,
}

impl OccupancyView {
    #[must_use]
    pub fn holds_seat(self, status: PaymentStatus) -> bool {
        match self {
            Self::Intake => status != PaymentStatus::Rejected,
            Self::Dashboard => {
                !matches!(status, PaymentStatus::Rejected | PaymentStatus::Cancelled)
            }
        }
    }

    /// Statuses counted by this view, in table order.
    #[must_use]
    pub fn occupying_statuses(self) -> Vec<PaymentStatus> {
        PaymentStatus::ALL
            .into_iter()
            .filter(|status| self.holds_seat(*status))
            .collect()
    }
}

/// A freshly computed capacity snapshot. Never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Capacity {
    Unlimited,
    Limited { max_slots: u32, occupied: u32 },
}

impl Capacity {
    /// Seats left, [`None`] meaning unlimited. Negative if admins overbooked on purpose.
    #[must_use]
    pub fn slots_left(&self) -> Option<i64> {
        match *self {
            Self::Unlimited => None,
            Self::Limited {
                max_slots,
                occupied,
            } => Some(i64::from(max_slots) - i64::from(occupied)),
        }
    }

    /// The same snapshot with one occupied seat given back.
    #[must_use]
    pub fn releasing_one(self) -> Self {
        match self {
            Self::Unlimited => Self::Unlimited,
            Self::Limited {
                max_slots,
                occupied,
            } => Self::Limited {
                max_slots,
                occupied: occupied.saturating_sub(1),
            },
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        match *self {
            Self::Unlimited => false,
            Self::Limited {
                max_slots,
                occupied,
            } => occupied >= max_slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, Capacity, OccupancyView, PaymentStatus::*};

    #[test]
    fn transition_table() {
        let legal = [
            (Pending, Action::Verify, Verified),
            (Pending, Action::Waitlist, Waitlisted),
            (Pending, Action::Reject, Rejected),
            (Submitted, Action::Verify, Verified),
            (Submitted, Action::Waitlist, Waitlisted),
            (Submitted, Action::Reject, Rejected),
            (Waitlisted, Action::Verify, Verified),
            (Waitlisted, Action::Reject, Rejected),
            (Verified, Action::Cancel, Cancelled),
            (Rejected, Action::Reopen, Pending),
            (Cancelled, Action::Reopen, Pending),
        ];
        let actions = [
            Action::Verify,
            Action::Waitlist,
            Action::Reject,
            Action::Cancel,
            Action::Reopen,
        ];

        for from in super::PaymentStatus::ALL {
            for action in actions {
                let expected = legal
                    .iter()
                    .find(|(f, a, _)| *f == from && *a == action)
                    .map(|(_, _, to)| *to);
                assert_eq!(from.apply(action), expected, "{from} --{action}-->");
            }
        }

        assert_eq!(Pending.apply(Action::Cancel), None);
        assert_eq!(Verified.apply(Action::Cancel), Some(Cancelled));
    }

    #[test]
    fn target_resolution() {
        assert_eq!(Action::leading_from(Waitlisted, Verified), Some(Action::Verify));
        assert_eq!(Action::leading_from(Cancelled, Pending), Some(Action::Reopen));
        assert_eq!(Action::leading_from(Verified, Pending), None);
        assert_eq!(Action::leading_from(Verified, Verified), None);
    }

    #[test]
    fn occupancy_views() {
        assert_eq!(
            OccupancyView::Intake.occupying_statuses(),
            vec![Pending, Submitted, Verified, Waitlisted, Cancelled]
        );
        assert_eq!(
            OccupancyView::Dashboard.occupying_statuses(),
            vec![Pending, Submitted, Verified, Waitlisted]
        );
    }

    #[test]
    fn capacity_math() {
        let cap = Capacity::Limited {
            max_slots: 2,
            occupied: 3,
        };
        assert_eq!(cap.slots_left(), Some(-1));
        assert!(cap.is_full());
        assert_eq!(Capacity::Unlimited.slots_left(), None);
        assert!(!Capacity::Unlimited.is_full());

        let taken = Capacity::Limited {
            max_slots: 1,
            occupied: 1,
        };
        assert!(taken.is_full());
        assert!(!taken.releasing_one().is_full());
        assert_eq!(
            Capacity::Limited {
                max_slots: 1,
                occupied: 0
            }
            .releasing_one()
            .slots_left(),
            Some(1)
        );
        assert_eq!(Capacity::Unlimited.releasing_one(), Capacity::Unlimited);
    }
}
