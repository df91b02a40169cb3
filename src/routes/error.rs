use std::fmt;

use rocket::{
    http::Status,
    request::FlashMessage,
    response::{Flash, Redirect},
    serde::json::Json,
    Catcher, Request, Route,
};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![server_error_panel]
}

#[must_use]
pub fn catchers() -> Vec<Catcher> {
    catchers![unauthorized]
}

/// Catchers for everything below `/api`, answering in JSON instead of redirecting.
#[must_use]
pub fn api_catchers() -> Vec<Catcher> {
    catchers![api_unauthorized, api_default]
}

#[get("/servererror")]
pub fn server_error_panel(flash: Option<FlashMessage<'_>>) -> Template {
    Template::render(
        "server-error",
        context! {
            error: flash.map_or_else(
                || "an unknown error occurred".to_string(),
                |flash| flash.message().to_string(),
            ),
        },
    )
}

/// Admin pages forward here when there's no valid session.
#[catch(401)]
pub fn unauthorized() -> Flash<Redirect> {
    Flash::error(
        Redirect::to(uri!(super::authflow::index)),
        "Please sign in to continue.",
    )
}

#[catch(401)]
pub fn api_unauthorized() -> ApiFailure {
    api_error(Status::Unauthorized, "Please sign in as admin to continue.")
}

#[catch(default)]
pub fn api_default(status: Status, req: &Request<'_>) -> ApiFailure {
    log::debug!("No JSON answer for {} {}: {}", req.method(), req.uri(), status);
    let message = match status.code {
        404 => "Not found. JSON requests need a `Content-Type: application/json` header.",
        413 => "The request is too large.",
        _ => "The request could not be handled.",
    };
    api_error(status, message)
}

/// The body of every failed JSON request.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,

    /// The offending input field for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,

    /// Updated seat count, when the error changed what the page should show.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots_left: Option<i64>,
}

pub type ApiFailure = (Status, Json<ApiError>);

/// Builds a JSON error with a message meant for the user.
#[must_use]
pub fn api_error(status: Status, message: impl Into<String>) -> ApiFailure {
    (
        status,
        Json(ApiError {
            success: false,
            error: message.into(),
            field: None,
            slots_left: None,
        }),
    )
}

/// The JSON counterpart of [`crate::server_error`]: logs the details, answers generically.
#[must_use]
pub fn api_server_error(admin_err: impl fmt::Display, user_err: impl Into<String>) -> ApiFailure {
    log::error!("{}", admin_err);
    api_error(Status::InternalServerError, user_err)
}
