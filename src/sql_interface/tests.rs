use {
    super::{
        AdminCreationError, DatabaseStatus, MeetupDetails, MeetupFilter, NewRegistration,
        SearchAdminBy, SearchAdminError, StatusUpdate, UpdateMeetupError, UpdateStatusError,
    },
    crate::registration::{Capacity, MeetupStatus, OccupancyView, PaymentStatus},
    chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc},
    rusqlite::Connection,
};

fn init_db() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    assert!(matches!(
        super::init_db_if_necessary(&mut conn).unwrap(),
        DatabaseStatus::Created
    ));
    conn
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn details(title: &str, date: NaiveDate, max_slots: Option<u32>) -> MeetupDetails {
    MeetupDetails {
        title: title.to_string(),
        description: Some("We talk about the book.".to_string()),
        date,
        time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
        location: "Library, room 2".to_string(),
        max_slots,
        payment_required: false,
        payment_amount: None,
        status: MeetupStatus::Upcoming,
    }
}

fn register(
    conn: &mut Connection,
    meetup_id: i64,
    email: &str,
    payment_status: PaymentStatus,
) -> i64 {
    super::insert_new_registration(
        conn,
        &NewRegistration {
            meetup_id,
            full_name: "Alice Beta".to_string(),
            email: email.to_string(),
            phone: None,
            why_join: None,
            payment_status,
            payment_screenshot_url: None,
        },
        now(),
    )
    .unwrap()
}

#[test]
fn schema_is_created_once() {
    let mut conn = init_db();
    assert!(matches!(
        super::init_db_if_necessary(&mut conn).unwrap(),
        DatabaseStatus::AlreadyExistent
    ));
}

#[test]
fn meetups() {
    let mut conn = init_db();

    let spring = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();
    let summer = NaiveDate::from_ymd_opt(2024, 7, 6).unwrap();
    let spring_id = super::insert_new_meetup(&mut conn, &details("Spring", spring, Some(10)), now())
        .unwrap();
    let mut done = details("Summer", summer, None);
    done.status = MeetupStatus::Completed;
    let summer_id = super::insert_new_meetup(&mut conn, &done, now()).unwrap();

    let upcoming = super::list_meetups(&mut conn, MeetupFilter::OnlyUpcoming).unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].id, spring_id);
    assert_eq!(upcoming[0].max_slots, Some(10));
    assert_eq!(upcoming[0].time, NaiveTime::from_hms_opt(18, 30, 0).unwrap());
    assert_eq!(upcoming[0].created_at, now());

    // newest date first
    let all = super::list_meetups(&mut conn, MeetupFilter::ListAll).unwrap();
    assert_eq!(
        all.iter().map(|meetup| meetup.id).collect::<Vec<_>>(),
        vec![summer_id, spring_id]
    );

    let mut paid = details("Spring, but paid", spring, Some(12));
    paid.payment_required = true;
    paid.payment_amount = Some(1250);
    paid.description = None;
    super::update_meetup(&mut conn, spring_id, &paid).unwrap();
    let updated = super::get_meetup(&mut conn, spring_id).unwrap().unwrap();
    assert_eq!(updated.title, "Spring, but paid");
    assert_eq!(updated.description, None);
    assert_eq!(updated.max_slots, Some(12));
    assert!(updated.payment_required);
    assert_eq!(updated.payment_amount, Some(1250));

    assert!(matches!(
        super::update_meetup(&mut conn, 4242, &paid),
        Err(UpdateMeetupError::NotFound)
    ));
    assert_eq!(super::get_meetup(&mut conn, 4242).unwrap(), None);
}

#[test]
fn deleting_a_meetup_removes_its_registrations() {
    let mut conn = init_db();
    let date = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();
    let doomed = super::insert_new_meetup(&mut conn, &details("Doomed", date, None), now())
        .unwrap();
    let kept = super::insert_new_meetup(&mut conn, &details("Kept", date, None), now()).unwrap();

    let gone = register(&mut conn, doomed, "a@x.com", PaymentStatus::Verified);
    let stays = register(&mut conn, kept, "a@x.com", PaymentStatus::Verified);

    super::delete_meetup(&mut conn, doomed).unwrap();
    assert_eq!(super::get_meetup(&mut conn, doomed).unwrap(), None);
    assert_eq!(super::get_registration(&mut conn, gone).unwrap(), None);
    assert!(super::get_registration(&mut conn, stays).unwrap().is_some());
}

#[test]
fn occupancy_counts() {
    let mut conn = init_db();
    let date = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
    let limited = super::insert_new_meetup(&mut conn, &details("Limited", date, Some(3)), now())
        .unwrap();
    let open = super::insert_new_meetup(&mut conn, &details("Open", date, None), now()).unwrap();

    for (email, status) in [
        ("a@x.com", PaymentStatus::Pending),
        ("b@x.com", PaymentStatus::Verified),
        ("c@x.com", PaymentStatus::Rejected),
        ("d@x.com", PaymentStatus::Cancelled),
    ] {
        register(&mut conn, limited, email, status);
    }

    assert_eq!(
        super::count_occupying(&mut conn, limited, OccupancyView::Intake).unwrap(),
        3
    );
    assert_eq!(
        super::count_occupying(&mut conn, limited, OccupancyView::Dashboard).unwrap(),
        2
    );

    let intake = super::capacity(&mut conn, limited, OccupancyView::Intake).unwrap();
    assert_eq!(
        intake,
        Capacity::Limited {
            max_slots: 3,
            occupied: 3
        }
    );
    assert!(intake.is_full());
    let dashboard = super::capacity(&mut conn, limited, OccupancyView::Dashboard).unwrap();
    assert_eq!(dashboard.slots_left(), Some(1));

    assert_eq!(
        super::capacity(&mut conn, open, OccupancyView::Intake).unwrap(),
        Capacity::Unlimited
    );
    assert!(matches!(
        super::capacity(&mut conn, 4242, OccupancyView::Intake),
        Err(super::CapacityError::UnknownMeetup)
    ));
}

#[test]
fn active_registrations() {
    let mut conn = init_db();
    let date = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
    let meetup = super::insert_new_meetup(&mut conn, &details("Meetup", date, None), now())
        .unwrap();
    let other = super::insert_new_meetup(&mut conn, &details("Other", date, None), now())
        .unwrap();

    register(&mut conn, meetup, "rejected@x.com", PaymentStatus::Rejected);
    let waiting = register(&mut conn, meetup, "waiting@x.com", PaymentStatus::Waitlisted);

    assert_eq!(
        super::find_active_registration(&mut conn, meetup, "rejected@x.com").unwrap(),
        None
    );
    assert_eq!(
        super::find_active_registration(&mut conn, meetup, "waiting@x.com").unwrap(),
        Some(waiting)
    );
    assert_eq!(
        super::find_active_registration(&mut conn, other, "waiting@x.com").unwrap(),
        None
    );

    let listed = super::list_registrations(&mut conn, meetup).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].email, "rejected@x.com");
    assert_eq!(listed[1].payment_status, PaymentStatus::Waitlisted);
}

#[test]
fn status_updates_and_notes() {
    let mut conn = init_db();
    let date = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
    let meetup = super::insert_new_meetup(&mut conn, &details("Meetup", date, None), now())
        .unwrap();
    let id = register(&mut conn, meetup, "a@x.com", PaymentStatus::Pending);
    let later = Utc.with_ymd_and_hms(2024, 3, 2, 9, 15, 0).unwrap();

    let update = |status, notes: Option<&str>| StatusUpdate {
        registration_id: id,
        payment_status: status,
        admin_notes: notes.map(ToString::to_string),
        updated_at: later,
    };

    super::update_registration_status(
        &mut conn,
        &update(PaymentStatus::Waitlisted, Some(" paid late ")),
    )
    .unwrap();
    let registration = super::get_registration(&mut conn, id).unwrap().unwrap();
    assert_eq!(registration.payment_status, PaymentStatus::Waitlisted);
    assert_eq!(registration.admin_notes.as_deref(), Some("paid late"));
    assert_eq!(registration.status_updated_at, Some(later));

    // no notes given, the old ones stay
    super::update_registration_status(&mut conn, &update(PaymentStatus::Verified, None)).unwrap();
    let registration = super::get_registration(&mut conn, id).unwrap().unwrap();
    assert_eq!(registration.payment_status, PaymentStatus::Verified);
    assert_eq!(registration.admin_notes.as_deref(), Some("paid late"));

    super::update_registration_status(&mut conn, &update(PaymentStatus::Cancelled, Some("  ")))
        .unwrap();
    let registration = super::get_registration(&mut conn, id).unwrap().unwrap();
    assert_eq!(registration.admin_notes, None);

    let mut missing = update(PaymentStatus::Verified, None);
    missing.registration_id = 4242;
    assert!(matches!(
        super::update_registration_status(&mut conn, &missing),
        Err(UpdateStatusError::NotFound)
    ));
}

#[test]
fn admins() {
    let mut conn = init_db();

    let id = super::insert_new_admin(&mut conn, "admin@x.com", "$argon2id$fake").unwrap();
    assert!(matches!(
        super::insert_new_admin(&mut conn, "admin@x.com", "$argon2id$other"),
        Err(AdminCreationError::EmailAlreadyInUse)
    ));

    let by_email =
        super::search_admin(&mut conn, &SearchAdminBy::Email("admin@x.com".to_string())).unwrap();
    let by_id = super::search_admin(&mut conn, &SearchAdminBy::Id(id)).unwrap();
    assert_eq!(by_email, by_id);
    assert_eq!(by_id.password_hash, "$argon2id$fake");

    assert!(matches!(
        super::search_admin(&mut conn, &SearchAdminBy::Id(id + 1)),
        Err(SearchAdminError::NotFound)
    ));
}
