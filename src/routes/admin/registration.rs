use chrono::Utc;
use rocket::{
    form::{Form, Strict},
    http::Status,
    response::{Flash, Redirect},
    serde::json::{self, Json},
    Route, State,
};
use serde::{Deserialize, Serialize};

use crate::{
    notify::SharedNotifier,
    registration::PaymentStatus,
    routes::{
        authflow::Admin,
        error::{api_error, api_server_error, ApiFailure},
    },
    server_error,
    transition::{self, NotificationReport, TransitionError, TransitionOutcome, TransitionRequest},
    BookclubDBConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![update_status, update_status_json]
}

/// Runs a transition and sends the mail it calls for. The second value is the mail's fate.
async fn transition_and_notify(
    conn: BookclubDBConn,
    notifier: &SharedNotifier,
    request: TransitionRequest,
) -> Result<(TransitionOutcome, NotificationReport), TransitionError> {
    let outcome = conn
        .run(move |c| transition::apply(c, &request, Utc::now()))
        .await?;
    let report = transition::notify_registrant(notifier.as_ref(), &outcome).await;
    Ok((outcome, report))
}

#[derive(Debug, FromForm)]
pub struct StatusForm {
    pub(crate) id: i64,
    pub(crate) meetup_id: i64,
    pub(crate) status: PaymentStatus,
    pub(crate) notes: Option<String>,
}

#[post("/admin/registration/status", data = "<form>")]
pub async fn update_status(
    conn: BookclubDBConn,
    notifier: &State<SharedNotifier>,
    form: Form<Strict<StatusForm>>,
    admin: Admin,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let StatusForm {
        id,
        meetup_id,
        status,
        notes,
    } = form.into_inner().into_inner();
    let back = || Redirect::to(uri!(super::meetup::introspect_meetup(meetup_id)));

    let request = TransitionRequest {
        registration_id: id,
        target: status,
        admin_notes: notes,
    };
    let (outcome, report) = transition_and_notify(conn, notifier.inner(), request)
        .await
        .map_err(|err| match err {
            TransitionError::NotFound => {
                Flash::error(back(), "This registration doesn't exist (anymore).")
            }
            TransitionError::Illegal { .. } => Flash::error(back(), err.to_string()),
            TransitionError::Persistence(_) => server_error(
                format!("Error while updating registration {id}: {err}"),
                "an error occurred while updating the registration",
            ),
        })?;

    log::info!(
        "Admin {} moved registration {} from {} to {}",
        admin.admin_id(),
        id,
        outcome.previous,
        outcome.registration.payment_status
    );

    let mut warnings = Vec::new();
    if outcome.over_capacity {
        warnings.push("The meetup is full, this registration overbooks it.".to_string());
    }
    warnings.extend(report.warning());

    if warnings.is_empty() {
        Ok(Flash::success(
            back(),
            format!(
                "{} is now {}.",
                outcome.registration.full_name, outcome.registration.payment_status
            ),
        ))
    } else {
        Ok(Flash::warning(back(), warnings.join(" ")))
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: PaymentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusChangeResponse {
    pub success: bool,
    pub status: PaymentStatus,
    pub over_capacity: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_warning: Option<String>,
}

fn transition_failure(id: i64, err: TransitionError) -> ApiFailure {
    match err {
        TransitionError::NotFound => api_error(Status::NotFound, err.to_string()),
        TransitionError::Illegal { .. } => api_error(Status::Conflict, err.to_string()),
        TransitionError::Persistence(_) => api_server_error(
            format!("Error while updating registration {id}: {err}"),
            "Something went wrong while updating the registration.",
        ),
    }
}

#[post("/api/admin/registrations/<id>/status", format = "json", data = "<change>")]
pub async fn update_status_json(
    conn: BookclubDBConn,
    notifier: &State<SharedNotifier>,
    id: i64,
    change: Result<Json<StatusChange>, json::Error<'_>>,
    admin: Admin,
) -> Result<Json<StatusChangeResponse>, ApiFailure> {
    let StatusChange { status, notes } = change
        .map_err(|err| {
            log::debug!("Unreadable status change for registration {}: {}", id, err);
            api_error(
                Status::UnprocessableEntity,
                format!(
                    "Expected {{\"status\": ..., \"notes\": ...}} with status one of: {}",
                    PaymentStatus::ALL.map(PaymentStatus::as_str).join(", ")
                ),
            )
        })?
        .into_inner();

    let request = TransitionRequest {
        registration_id: id,
        target: status,
        admin_notes: notes,
    };
    let (outcome, report) = transition_and_notify(conn, notifier.inner(), request)
        .await
        .map_err(|err| transition_failure(id, err))?;

    log::info!(
        "Admin {} moved registration {} from {} to {}",
        admin.admin_id(),
        id,
        outcome.previous,
        outcome.registration.payment_status
    );

    Ok(Json(StatusChangeResponse {
        success: true,
        status: outcome.registration.payment_status,
        over_capacity: outcome.over_capacity,
        email_warning: report.warning(),
    }))
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;

    use super::transition_failure;
    use crate::{registration::PaymentStatus, transition::TransitionError};

    #[test]
    fn transition_errors_as_json() {
        let (status, body) = transition_failure(3, TransitionError::NotFound);
        assert_eq!(status, Status::NotFound);
        assert!(!body.success);

        let (status, body) = transition_failure(
            3,
            TransitionError::Illegal {
                from: PaymentStatus::Cancelled,
                to: PaymentStatus::Verified,
            },
        );
        assert_eq!(status, Status::Conflict);
        assert_eq!(body.error, "A cancelled registration can't become verified");

        let (status, body) = transition_failure(
            3,
            TransitionError::Persistence(rusqlite::Error::QueryReturnedNoRows),
        );
        assert_eq!(status, Status::InternalServerError);
        assert_eq!(
            body.error,
            "Something went wrong while updating the registration."
        );
    }
}
