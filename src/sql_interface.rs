use {
    crate::registration::{Capacity, MeetupStatus, OccupancyView, PaymentStatus},
    chrono::{DateTime, NaiveDate, NaiveTime, Utc},
    rusqlite::{named_params, OptionalExtension},
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

#[cfg(test)]
mod tests;

macro_rules! match_constraint_violation {
    ($statement:expr, $custom_error:expr) => {
        match $statement {
            Err(rusqlite::Error::SqliteFailure(
                libsqlite3_sys::Error {
                    code: libsqlite3_sys::ErrorCode::ConstraintViolation,
                    ..
                },
                _,
            )) => Err($custom_error),
            Err(err) => Err(err.into()),
            Ok(value) => Ok(value),
        }
    };
}

/// A book club meetup people can register for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meetup {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,

    /// Maximum number of seats, [`None`] meaning there's no limit.
    pub max_slots: Option<u32>,
    pub payment_required: bool,

    /// The fee in cents. Only meaningful if `payment_required` is set.
    pub payment_amount: Option<i64>,
    pub status: MeetupStatus,
    pub created_at: DateTime<Utc>,
}

// Note: Only usable in context here, since the columns are hardcoded
const MEETUP_COLUMNS: &str = "meetup.meetup_id, meetup.title, meetup.description,
    meetup.meetup_date, meetup.meetup_time, meetup.location, meetup.max_slots,
    meetup.payment_required, meetup.payment_amount, meetup.status, meetup.created_at";

#[doc(hidden)]
fn row_to_meetup(row: &rusqlite::Row) -> rusqlite::Result<Meetup> {
    Ok(Meetup {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: row.get(3)?,
        time: row.get(4)?,
        location: row.get(5)?,
        max_slots: row.get(6)?,
        payment_required: row.get(7)?,
        payment_amount: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Someone who signed up for a meetup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub meetup_id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub why_join: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_screenshot_url: Option<String>,

    /// Internal annotation, never shown to the registrant.
    pub admin_notes: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// See note of MEETUP_COLUMNS
const REGISTRATION_COLUMNS: &str = "registration.registration_id, registration.meetup_id,
    registration.full_name, registration.email, registration.phone, registration.why_join,
    registration.payment_status, registration.payment_screenshot_url, registration.admin_notes,
    registration.status_updated_at, registration.created_at";

#[doc(hidden)]
fn row_to_registration(row: &rusqlite::Row) -> rusqlite::Result<Registration> {
    Ok(Registration {
        id: row.get(0)?,
        meetup_id: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        why_join: row.get(5)?,
        payment_status: row.get(6)?,
        payment_screenshot_url: row.get(7)?,
        admin_notes: row.get(8)?,
        status_updated_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub enum DatabaseStatus {
    AlreadyExistent,
    Created,
}

pub fn init_db_if_necessary(
    conn: &mut rusqlite::Connection,
) -> Result<DatabaseStatus, rusqlite::Error> {
    // dummy query to see if the db has a table in it
    // yeah, we could query sqlite_master, but this way we can also directly ask for the
    // columns
    if conn
        .execute(
            "SELECT registration_id, meetup_id, payment_status
            FROM registration
            WHERE false",
            [],
        )
        .is_err()
    {
        conn.execute_batch(include_str!("sql_interface/init_db.sql"))?;
        Ok(DatabaseStatus::Created)
    } else {
        Ok(DatabaseStatus::AlreadyExistent)
    }
}

/// Parameters needed to create or overwrite a meetup.
#[derive(Clone, Debug)]
pub struct MeetupDetails {
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub max_slots: Option<u32>,
    pub payment_required: bool,
    pub payment_amount: Option<i64>,
    pub status: MeetupStatus,
}

/// Inserts a new meetup and returns its ID.
pub fn insert_new_meetup(
    conn: &mut rusqlite::Connection,
    details: &MeetupDetails,
    now: DateTime<Utc>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO meetup (title, description, meetup_date, meetup_time, location, max_slots,
            payment_required, payment_amount, status, created_at)
        VALUES (:title, :description, :date, :time, :location, :max_slots,
            :payment_required, :payment_amount, :status, :now)",
        named_params! {
            ":title": details.title,
            ":description": details.description,
            ":date": details.date,
            ":time": details.time,
            ":location": details.location,
            ":max_slots": details.max_slots,
            ":payment_required": details.payment_required,
            ":payment_amount": details.payment_amount,
            ":status": details.status,
            ":now": now,
        },
    )?;
    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Error)]
pub enum UpdateMeetupError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("No meetup with that ID")]
    NotFound,
}

/// Overwrites all editable fields of a meetup by ID.
pub fn update_meetup(
    conn: &mut rusqlite::Connection,
    id: i64,
    details: &MeetupDetails,
) -> Result<(), UpdateMeetupError> {
    let changed = conn.execute(
        "UPDATE meetup
        SET title = :title, description = :description, meetup_date = :date,
            meetup_time = :time, location = :location, max_slots = :max_slots,
            payment_required = :payment_required, payment_amount = :payment_amount,
            status = :status
        WHERE meetup_id == :id",
        named_params! {
            ":id": id,
            ":title": details.title,
            ":description": details.description,
            ":date": details.date,
            ":time": details.time,
            ":location": details.location,
            ":max_slots": details.max_slots,
            ":payment_required": details.payment_required,
            ":payment_amount": details.payment_amount,
            ":status": details.status,
        },
    )?;

    if changed == 0 {
        Err(UpdateMeetupError::NotFound)
    } else {
        Ok(())
    }
}

/// Deletes a meetup by ID and all its registrations. **This action is irreversible.**
pub fn delete_meetup(conn: &mut rusqlite::Connection, id: i64) -> Result<(), rusqlite::Error> {
    // foreign keys aren't necessarily enforced on pooled connections, so cascade by hand
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM registration
        WHERE meetup_id == :id",
        named_params! { ":id": id },
    )?;
    tx.execute(
        "DELETE FROM meetup
        WHERE meetup_id == :id",
        named_params! { ":id": id },
    )?;
    tx.commit()
}

pub fn get_meetup(
    conn: &mut rusqlite::Connection,
    id: i64,
) -> Result<Option<Meetup>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {MEETUP_COLUMNS} FROM meetup WHERE meetup_id == :id"),
        named_params! { ":id": id },
        row_to_meetup,
    )
    .optional()
}

#[derive(Clone, Copy, Debug)]
pub enum MeetupFilter {
    /// Only meetups still open for registration, soonest first.
    OnlyUpcoming,
    /// Everything, newest date first.
    ListAll,
}

pub fn list_meetups(
    conn: &mut rusqlite::Connection,
    filter: MeetupFilter,
) -> Result<Vec<Meetup>, rusqlite::Error> {
    let mut statement = conn.prepare(&format!(
        "SELECT {MEETUP_COLUMNS}
        FROM meetup
        {}",
        match filter {
            MeetupFilter::OnlyUpcoming =>
                "WHERE status == 'upcoming' ORDER BY meetup_date ASC, meetup_time ASC",
            MeetupFilter::ListAll => "ORDER BY meetup_date DESC, meetup_time DESC",
        }
    ))?;
    let meetups = statement.query_map([], row_to_meetup)?.collect();
    meetups
}

/// Counts the registrations of a meetup which hold a seat according to `view`.
pub fn count_occupying(
    conn: &mut rusqlite::Connection,
    meetup_id: i64,
    view: OccupancyView,
) -> Result<u32, rusqlite::Error> {
    // the statuses come from a closed enum, so inlining them is fine
    let statuses = view
        .occupying_statuses()
        .into_iter()
        .map(|status| format!("'{status}'"))
        .collect::<Vec<_>>()
        .join(", ");

    conn.query_row(
        &format!(
            "SELECT COUNT(*)
            FROM registration
            WHERE meetup_id == :meetup_id
                AND payment_status IN ({statuses})"
        ),
        named_params! { ":meetup_id": meetup_id },
        |row| row.get(0),
    )
}

#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("Unknown meetup")]
    UnknownMeetup,
}

/// Computes how many seats a meetup has left right now.
pub fn capacity(
    conn: &mut rusqlite::Connection,
    meetup_id: i64,
    view: OccupancyView,
) -> Result<Capacity, CapacityError> {
    let meetup = get_meetup(conn, meetup_id)?.ok_or(CapacityError::UnknownMeetup)?;
    capacity_of(conn, &meetup, view).map_err(Into::into)
}

/// Same as [`capacity`], but for a meetup that was already loaded.
pub fn capacity_of(
    conn: &mut rusqlite::Connection,
    meetup: &Meetup,
    view: OccupancyView,
) -> Result<Capacity, rusqlite::Error> {
    match meetup.max_slots {
        None => Ok(Capacity::Unlimited),
        Some(max_slots) => Ok(Capacity::Limited {
            max_slots,
            occupied: count_occupying(conn, meetup.id, view)?,
        }),
    }
}

/// Looks for a registration of `email` for the meetup that wasn't rejected.
pub fn find_active_registration(
    conn: &mut rusqlite::Connection,
    meetup_id: i64,
    email: &str,
) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row(
        "SELECT registration_id
        FROM registration
        WHERE meetup_id == :meetup_id
            AND email == :email
            AND payment_status != :rejected
        LIMIT 1",
        named_params! {
            ":meetup_id": meetup_id,
            ":email": email,
            ":rejected": PaymentStatus::Rejected,
        },
        |row| row.get(0),
    )
    .optional()
}

/// Parameters for a fresh registration row.
#[derive(Clone, Debug)]
pub struct NewRegistration {
    pub meetup_id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub why_join: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_screenshot_url: Option<String>,
}

/// Inserts a registration and returns its ID. Neither the meetup, capacity nor duplicates are
/// checked here.
pub fn insert_new_registration(
    conn: &mut rusqlite::Connection,
    registration: &NewRegistration,
    now: DateTime<Utc>,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO registration (meetup_id, full_name, email, phone, why_join,
            payment_status, payment_screenshot_url, created_at)
        VALUES (:meetup_id, :full_name, :email, :phone, :why_join,
            :payment_status, :payment_screenshot_url, :now)",
        named_params! {
            ":meetup_id": registration.meetup_id,
            ":full_name": registration.full_name,
            ":email": registration.email,
            ":phone": registration.phone,
            ":why_join": registration.why_join,
            ":payment_status": registration.payment_status,
            ":payment_screenshot_url": registration.payment_screenshot_url,
            ":now": now,
        },
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_registration(
    conn: &mut rusqlite::Connection,
    id: i64,
) -> Result<Option<Registration>, rusqlite::Error> {
    conn.query_row(
        &format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registration WHERE registration_id == :id"
        ),
        named_params! { ":id": id },
        row_to_registration,
    )
    .optional()
}

/// Lists all registrations of a meetup, oldest first.
pub fn list_registrations(
    conn: &mut rusqlite::Connection,
    meetup_id: i64,
) -> Result<Vec<Registration>, rusqlite::Error> {
    let mut statement = conn.prepare(&format!(
        "SELECT {REGISTRATION_COLUMNS}
        FROM registration
        WHERE meetup_id == :meetup_id
        ORDER BY created_at, registration_id"
    ))?;
    let registrations = statement
        .query_map(named_params! { ":meetup_id": meetup_id }, row_to_registration)?
        .collect();
    registrations
}

/// What an admin changes about a registration in one go.
#[derive(Clone, Debug)]
pub struct StatusUpdate {
    pub registration_id: i64,
    pub payment_status: PaymentStatus,

    /// [`None`] leaves the notes untouched, an empty string clears them.
    pub admin_notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum UpdateStatusError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("No registration with that ID")]
    NotFound,
}

/// Writes a new status and stamps `status_updated_at`. No legality checks happen here.
pub fn update_registration_status(
    conn: &mut rusqlite::Connection,
    update: &StatusUpdate,
) -> Result<(), UpdateStatusError> {
    let changed = match &update.admin_notes {
        None => conn.execute(
            "UPDATE registration
            SET payment_status = :status, status_updated_at = :updated_at
            WHERE registration_id == :id",
            named_params! {
                ":id": update.registration_id,
                ":status": update.payment_status,
                ":updated_at": update.updated_at,
            },
        ),
        Some(notes) => conn.execute(
            "UPDATE registration
            SET payment_status = :status, status_updated_at = :updated_at,
                admin_notes = NULLIF(:notes, '')
            WHERE registration_id == :id",
            named_params! {
                ":id": update.registration_id,
                ":status": update.payment_status,
                ":updated_at": update.updated_at,
                ":notes": notes.trim(),
            },
        ),
    }?;

    if changed == 0 {
        Err(UpdateStatusError::NotFound)
    } else {
        Ok(())
    }
}

/// Someone allowed into the admin dashboard.
#[derive(Debug, PartialEq, Eq)]
pub struct Admin {
    pub id: i64,
    pub email: String,

    /// Argon2 PHC string of the password.
    pub password_hash: String,
}

pub enum SearchAdminBy {
    /// Searches by email. Emails are unique, so there's at most one result.
    Email(String),
    Id(i64),
}

#[derive(Error, Debug)]
pub enum SearchAdminError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("Criteria not found")]
    NotFound,
}

/// Searches for an admin by the given criteria. Returns [`SearchAdminError`]`::NotFound` if
/// nobody matches.
pub fn search_admin(
    conn: &mut rusqlite::Connection,
    by: &SearchAdminBy,
) -> Result<Admin, SearchAdminError> {
    let found = match by {
        SearchAdminBy::Email(email) => conn.query_row(
            "SELECT admin_id, email, password_hash
            FROM admin
            WHERE email == :email",
            named_params! { ":email": email },
            row_to_admin,
        ),
        SearchAdminBy::Id(id) => conn.query_row(
            "SELECT admin_id, email, password_hash
            FROM admin
            WHERE admin_id == :id",
            named_params! { ":id": id },
            row_to_admin,
        ),
    }
    .optional()?;

    found.ok_or(SearchAdminError::NotFound)
}

#[doc(hidden)]
fn row_to_admin(row: &rusqlite::Row) -> rusqlite::Result<Admin> {
    Ok(Admin {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
    })
}

#[derive(Debug, Error)]
pub enum AdminCreationError {
    #[error("Email is already used")]
    EmailAlreadyInUse,
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
}

/// Inserts a new admin with an already hashed password.
pub fn insert_new_admin(
    conn: &mut rusqlite::Connection,
    email: &str,
    password_hash: &str,
) -> Result<i64, AdminCreationError> {
    match_constraint_violation!(
        conn.execute(
            "INSERT INTO admin (email, password_hash)
            VALUES (:email, :password_hash)",
            named_params! {
                ":email": email,
                ":password_hash": password_hash,
            },
        ),
        AdminCreationError::EmailAlreadyInUse
    )?;
    Ok(conn.last_insert_rowid())
}
