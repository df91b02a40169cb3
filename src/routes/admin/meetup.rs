use chrono::Utc;
use rocket::{
    form::{Form, Lenient, Strict},
    request::FlashMessage,
    response::{Flash, Redirect},
    Route,
};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

use crate::{
    format_helpers::{
        format_amount, format_date, parse_amount, time_to_chrono_date, time_to_chrono_time,
    },
    registration::{MeetupStatus, OccupancyView, PaymentStatus},
    routes::{admin::TemplateFlash, authflow::Admin, public::capacity_or_unknown},
    server_error,
    sql_interface::{self, MeetupDetails, Registration, UpdateMeetupError},
    BookclubDBConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![
        create_new_meetup,
        update_meetup,
        delete_meetup,
        introspect_meetup
    ]
}

#[derive(Debug, FromForm)]
pub struct MeetupForm {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) date: time::Date,
    pub(crate) time: time::Time,
    pub(crate) location: String,
    pub(crate) max_slots: Lenient<Option<u32>>,
    pub(crate) payment_required: Lenient<bool>,
    pub(crate) payment_amount: String,
    pub(crate) status: MeetupStatus,
}

impl MeetupForm {
    /// Validates the form, returning a message for the admin on failure.
    pub fn into_details(self) -> Result<MeetupDetails, &'static str> {
        let title = self.title.trim().to_string();
        let location = self.location.trim().to_string();
        if title.is_empty() || location.is_empty() {
            return Err("Title and location may not be empty.");
        }

        let date = time_to_chrono_date(self.date).ok_or("That date doesn't exist.")?;
        let time = time_to_chrono_time(self.time).ok_or("That time doesn't exist.")?;

        let payment_required = self.payment_required.into_inner();
        let payment_amount = if payment_required {
            Some(parse_amount(&self.payment_amount).ok_or(
                "Paid meetups need an amount like 12.50, without currency symbols.",
            )?)
        } else {
            None
        };

        let description = self.description.trim();
        Ok(MeetupDetails {
            title,
            description: (!description.is_empty()).then(|| description.to_string()),
            date,
            time,
            location,
            max_slots: self.max_slots.into_inner(),
            payment_required,
            payment_amount,
            status: self.status,
        })
    }
}

#[post("/admin/meetup/new", data = "<form>")]
pub async fn create_new_meetup(
    conn: BookclubDBConn,
    form: Option<Form<Strict<MeetupForm>>>,
    admin: Admin,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let Some(form) = form else {
        return Err(Flash::error(
            Redirect::to(uri!(super::panel)),
            "Please fill all fields.",
        ));
    };
    let details = form
        .into_inner()
        .into_inner()
        .into_details()
        .map_err(|message| Flash::error(Redirect::to(uri!(super::panel)), message))?;

    let id = conn
        .run(move |c| sql_interface::insert_new_meetup(c, &details, Utc::now()))
        .await
        .map_err(|err| {
            server_error(
                format!("Error inserting new meetup: {err}"),
                "an error occurred while creating the meetup",
            )
        })?;

    log::info!("Admin {} created meetup {}", admin.admin_id(), id);
    Ok(Flash::success(
        Redirect::to(uri!(introspect_meetup(id))),
        "Meetup created.",
    ))
}

#[derive(Debug, FromForm)]
pub struct UpdateMeetup {
    pub(crate) id: i64,
    pub(crate) meetup: MeetupForm,
}

#[post("/admin/meetup/update", data = "<update>")]
pub async fn update_meetup(
    conn: BookclubDBConn,
    update: Option<Form<Strict<UpdateMeetup>>>,
    admin: Admin,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let Some(update) = update else {
        return Err(Flash::error(
            Redirect::to(uri!(super::panel)),
            "Please fill all fields.",
        ));
    };
    let UpdateMeetup { id, meetup } = update.into_inner().into_inner();
    let details = meetup
        .into_details()
        .map_err(|message| Flash::error(Redirect::to(uri!(introspect_meetup(id))), message))?;

    conn.run(move |c| sql_interface::update_meetup(c, id, &details))
        .await
        .map_err(|err| match err {
            UpdateMeetupError::NotFound => Flash::error(
                Redirect::to(uri!(super::panel)),
                "This meetup doesn't exist (anymore).",
            ),
            UpdateMeetupError::RusqliteError(err) => server_error(
                format!("Error while updating meetup {id}: {err}"),
                "an error occurred while updating the meetup",
            ),
        })?;

    log::info!("Admin {} updated meetup {}", admin.admin_id(), id);
    Ok(Flash::success(
        Redirect::to(uri!(introspect_meetup(id))),
        "Meetup updated.",
    ))
}

#[derive(Debug, FromForm)]
pub struct DeleteMeetup {
    pub(crate) id: i64,
}

#[post("/admin/meetup/delete", data = "<form>")]
pub async fn delete_meetup(
    conn: BookclubDBConn,
    form: Form<Strict<DeleteMeetup>>,
    admin: Admin,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let meetup_id = form.id;
    conn.run(move |c| sql_interface::delete_meetup(c, meetup_id))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while deleting meetup: {err}\nMeetup ID: {meetup_id}"),
                "an error occurred while deleting the meetup",
            )
        })?;

    log::info!("Admin {} deleted meetup {}", admin.admin_id(), meetup_id);
    Ok(Flash::success(
        Redirect::to(uri!(super::panel)),
        "Meetup and its registrations deleted.",
    ))
}

#[derive(Debug, Serialize)]
struct TemplateTransition {
    action: String,
    target: PaymentStatus,
}

#[derive(Debug, Serialize)]
struct TemplateRegistration {
    registration: Registration,
    created: String,
    transitions: Vec<TemplateTransition>,
}

impl From<Registration> for TemplateRegistration {
    fn from(registration: Registration) -> Self {
        let transitions = registration
            .payment_status
            .available_actions()
            .iter()
            .map(|action| TemplateTransition {
                action: action.to_string(),
                target: action.target(),
            })
            .collect();

        Self {
            created: registration.created_at.format("%d.%m.%Y %H:%M").to_string(),
            transitions,
            registration,
        }
    }
}

#[get("/admin/meetup/<id>")]
pub async fn introspect_meetup(
    conn: BookclubDBConn,
    id: i64,
    flash: Option<FlashMessage<'_>>,
    _admin: Admin,
) -> Result<Template, Flash<Redirect>> {
    let loaded = conn
        .run(move |c| -> rusqlite::Result<_> {
            let Some(meetup) = sql_interface::get_meetup(c, id)? else {
                return Ok(None);
            };
            let capacity = capacity_or_unknown(c, &meetup, OccupancyView::Dashboard);
            let registrations = sql_interface::list_registrations(c, id)?;
            Ok(Some((meetup, capacity, registrations)))
        })
        .await
        .map_err(|err| {
            server_error(
                format!("Error listing registrations for meetup {id}: {err}"),
                "an error occurred while listing registrations",
            )
        })?;
    let Some((meetup, capacity, registrations)) = loaded else {
        return Err(Flash::error(
            Redirect::to(uri!(super::panel)),
            "This meetup doesn't exist (anymore).",
        ));
    };

    Ok(Template::render(
        "admin-meetup",
        context! {
            flash: flash.map(TemplateFlash::from),
            pretty_date: format_date(meetup.date),
            amount_input: meetup.payment_amount.map(format_amount),
            time_input: meetup.time.format("%H:%M").to_string(),
            slots_left: capacity.and_then(|capacity| capacity.slots_left()),
            capacity_unknown: capacity.is_none(),
            meetup,
            meetup_statuses: MeetupStatus::ALL,
            registrations: registrations
                .into_iter()
                .map(TemplateRegistration::from)
                .collect::<Vec<_>>(),
        },
    ))
}
