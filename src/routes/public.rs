use std::sync::Arc;

use chrono::Utc;
use rocket::{
    http::Status,
    request::FlashMessage,
    response::{Flash, Redirect},
    serde::json::{self, Json},
    Route, State,
};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

use crate::{
    config::Config,
    format_helpers::{format_amount, format_date, format_time},
    intake::{self, IntakeError, Submission},
    notify::{self, ConfirmationNotice, SharedNotifier},
    registration::{Capacity, MeetupStatus, OccupancyView, PaymentStatus},
    routes::error::{api_error, api_server_error, ApiError, ApiFailure},
    server_error,
    sql_interface::{self, Meetup, MeetupFilter},
    storage::FsProofStore,
    BookclubDBConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![index, meetup_page, submit_registration]
}

/// A meetup with everything the templates need to render it.
#[derive(Debug, Serialize)]
pub struct MeetupView {
    pub meetup: Meetup,
    pub pretty_date: String,
    pub pretty_time: String,
    pub amount: Option<String>,
    pub slots_left: Option<i64>,
    pub unlimited: bool,

    /// The seat count couldn't be read. Registration isn't offered then.
    pub capacity_unknown: bool,
    pub fully_booked: bool,
    pub open: bool,
}

impl MeetupView {
    /// `capacity` is [`None`] if reading it failed.
    #[must_use]
    pub fn new(meetup: Meetup, capacity: Option<Capacity>) -> Self {
        let fully_booked = capacity.map_or(false, |capacity| capacity.is_full());
        let open = meetup.status == MeetupStatus::Upcoming && capacity.is_some() && !fully_booked;

        Self {
            pretty_date: format_date(meetup.date),
            pretty_time: format_time(meetup.time),
            amount: meetup.payment_amount.map(format_amount),
            slots_left: capacity.and_then(|capacity| capacity.slots_left()),
            unlimited: capacity == Some(Capacity::Unlimited),
            capacity_unknown: capacity.is_none(),
            fully_booked,
            open,
            meetup,
        }
    }
}

/// Reads the capacity of a meetup, logging instead of failing so the page still renders.
pub(crate) fn capacity_or_unknown(
    conn: &mut rusqlite::Connection,
    meetup: &Meetup,
    view: OccupancyView,
) -> Option<Capacity> {
    sql_interface::capacity_of(conn, meetup, view)
        .map_err(|err| log::error!("Could not read capacity of meetup {}: {}", meetup.id, err))
        .ok()
}

#[get("/")]
pub async fn index(
    conn: BookclubDBConn,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    let meetups = conn
        .run(|c| -> rusqlite::Result<Vec<MeetupView>> {
            let meetups = sql_interface::list_meetups(c, MeetupFilter::OnlyUpcoming)?;
            Ok(meetups
                .into_iter()
                .map(|meetup| {
                    let capacity = capacity_or_unknown(c, &meetup, OccupancyView::Intake);
                    MeetupView::new(meetup, capacity)
                })
                .collect())
        })
        .await
        .map_err(|err| {
            server_error(
                format!("Error while listing upcoming meetups: {err}"),
                "an error occurred while loading the meetups",
            )
        })?;

    Ok(Template::render(
        "index",
        context! {
            flash: flash.map(|flash| flash.message().to_string()),
            meetups,
        },
    ))
}

#[get("/meetup/<id>")]
pub async fn meetup_page(conn: BookclubDBConn, id: i64) -> Result<Template, Flash<Redirect>> {
    let view = conn
        .run(move |c| -> rusqlite::Result<Option<MeetupView>> {
            let Some(meetup) = sql_interface::get_meetup(c, id)? else {
                return Ok(None);
            };
            let capacity = capacity_or_unknown(c, &meetup, OccupancyView::Intake);
            Ok(Some(MeetupView::new(meetup, capacity)))
        })
        .await
        .map_err(|err| {
            server_error(
                format!("Error while loading meetup {id}: {err}"),
                "an error occurred while loading the meetup",
            )
        })?
        .ok_or_else(|| {
            Flash::error(
                Redirect::to(uri!(index)),
                "This meetup doesn't exist (anymore).",
            )
        })?;

    Ok(Template::render("meetup", context! { view }))
}

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub success: bool,
    pub registration_id: i64,
    pub payment_status: PaymentStatus,
    pub slots_left: Option<i64>,
}

fn intake_failure(err: IntakeError) -> ApiFailure {
    let (status, field) = match &err {
        IntakeError::Validation { field, .. } => (Status::UnprocessableEntity, Some(*field)),
        IntakeError::NotFound => (Status::NotFound, None),
        IntakeError::Closed | IntakeError::FullyBooked | IntakeError::Duplicate => {
            (Status::Conflict, None)
        }
        IntakeError::Storage(_) => {
            return api_server_error(
                format!("Error while storing payment screenshot: {err}"),
                "Your payment screenshot could not be saved, please try again.",
            )
        }
        IntakeError::Persistence(_) => {
            return api_server_error(
                format!("Error while saving registration: {err}"),
                "Something went wrong while saving your registration, please try again.",
            )
        }
    };

    (
        status,
        Json(ApiError {
            success: false,
            error: err.to_string(),
            field,
            slots_left: err.slots_left(),
        }),
    )
}

#[post("/api/meetups/<id>/registrations", format = "json", data = "<submission>")]
pub async fn submit_registration(
    conn: BookclubDBConn,
    config: &State<Config>,
    store: &State<FsProofStore>,
    notifier: &State<SharedNotifier>,
    id: i64,
    submission: Result<Json<Submission>, json::Error<'_>>,
) -> Result<(Status, Json<IntakeResponse>), ApiFailure> {
    let submission = submission
        .map_err(|err| {
            log::debug!("Unreadable registration for meetup {}: {}", id, err);
            api_error(
                Status::UnprocessableEntity,
                "The registration could not be read, please reload the page and try again.",
            )
        })?
        .into_inner();

    let store = store.inner().clone();
    let limit = config.max_screenshot_bytes;
    let receipt = conn
        .run(move |c| intake::submit(c, &store, id, &submission, limit, Utc::now()))
        .await
        .map_err(intake_failure)?;

    log::info!(
        "New registration {} for meetup {} ({})",
        receipt.registration.id,
        receipt.meetup.id,
        receipt.registration.payment_status
    );

    // the registration is committed, the mail is on its own from here
    notify::spawn_confirmation(
        Arc::clone(notifier.inner()),
        ConfirmationNotice::new(&receipt.registration, &receipt.meetup),
    );

    Ok((
        Status::Created,
        Json(IntakeResponse {
            success: true,
            registration_id: receipt.registration.id,
            payment_status: receipt.registration.payment_status,
            slots_left: receipt.slots_left,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;

    use super::intake_failure;
    use crate::{intake::IntakeError, storage::StorageError};

    #[test]
    fn intake_errors_as_json() {
        let (status, body) = intake_failure(IntakeError::Validation {
            field: "email",
            message: "Please enter a valid email address.".to_string(),
        });
        assert_eq!(status, Status::UnprocessableEntity);
        assert!(!body.success);
        assert_eq!(body.field, Some("email"));
        assert_eq!(body.error, "Please enter a valid email address.");

        let (status, body) = intake_failure(IntakeError::NotFound);
        assert_eq!(status, Status::NotFound);
        assert_eq!(body.field, None);

        for err in [IntakeError::Closed, IntakeError::Duplicate] {
            let (status, body) = intake_failure(err);
            assert_eq!(status, Status::Conflict);
            assert_eq!(body.slots_left, None);
        }

        let (status, body) = intake_failure(IntakeError::FullyBooked);
        assert_eq!(status, Status::Conflict);
        assert_eq!(body.slots_left, Some(0));
    }

    #[test]
    fn internal_failures_stay_generic() {
        let (status, body) = intake_failure(IntakeError::Storage(StorageError::InvalidKey(
            "payment-screenshots/../secret".to_string(),
        )));
        assert_eq!(status, Status::InternalServerError);
        assert!(!body.success);
        assert!(!body.error.contains("secret"));
        assert_eq!(body.field, None);

        let (status, body) =
            intake_failure(IntakeError::Persistence(rusqlite::Error::QueryReturnedNoRows));
        assert_eq!(status, Status::InternalServerError);
        assert!(!body.error.contains("Query returned no rows"));
        assert_eq!(body.slots_left, None);
    }
}
