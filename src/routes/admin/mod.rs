use rocket::{
    request::FlashMessage,
    response::{Flash, Redirect},
    Route,
};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

use crate::{
    flatten_routes,
    registration::{MeetupStatus, OccupancyView},
    routes::{
        authflow::Admin,
        public::{capacity_or_unknown, MeetupView},
    },
    server_error,
    sql_interface::{self, MeetupFilter},
    BookclubDBConn,
};

pub mod meetup;
pub mod registration;

#[must_use]
pub fn routes() -> Vec<Route> {
    flatten_routes([routes![panel], meetup::routes(), registration::routes()])
}

/// A flash message along with its kind, so admin pages can tell warnings from errors.
#[derive(Debug, Serialize)]
pub struct TemplateFlash {
    pub kind: String,
    pub message: String,
}

impl From<FlashMessage<'_>> for TemplateFlash {
    fn from(flash: FlashMessage<'_>) -> Self {
        Self {
            kind: flash.kind().to_string(),
            message: flash.message().to_string(),
        }
    }
}

#[get("/admin")]
pub async fn panel(
    conn: BookclubDBConn,
    flash: Option<FlashMessage<'_>>,
    _admin: Admin,
) -> Result<Template, Flash<Redirect>> {
    let meetups = conn
        .run(|c| -> rusqlite::Result<Vec<MeetupView>> {
            let meetups = sql_interface::list_meetups(c, MeetupFilter::ListAll)?;
            Ok(meetups
                .into_iter()
                .map(|meetup| {
                    let capacity = capacity_or_unknown(c, &meetup, OccupancyView::Dashboard);
                    MeetupView::new(meetup, capacity)
                })
                .collect())
        })
        .await
        .map_err(|err| {
            server_error(
                format!("Error while listing meetups: {err}"),
                "an error occurred while listing meetups",
            )
        })?;

    Ok(Template::render(
        "admin-panel",
        context! {
            flash: flash.map(TemplateFlash::from),
            meetups,
            meetup_statuses: MeetupStatus::ALL,
        },
    ))
}
