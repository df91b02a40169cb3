#![allow(clippy::no_effect_underscore_binding)] // rocket heavily uses those in macros

use std::fs;

use rocket::{
    fairing::AdHoc,
    fs::{relative, FileServer},
    launch,
};
use rocket_dyn_templates::{handlebars::handlebars_helper, Template};

use bookclub::{
    api_catchers, catchers,
    config::{self, Config},
    notify, routes,
    sql_interface::{self, DatabaseStatus},
    storage::{FsProofStore, UPLOADS_MOUNT},
    BookclubDBConn,
};

#[launch]
async fn rocket() -> _ {
    rocket::custom(config::figment())
        .attach(Template::custom(|engines| {
            engines
                .handlebars
                .register_escape_fn(ammonia::clean_text);

            handlebars_helper!(equals: |left_hand: String, right_hand: String| left_hand == right_hand);

            engines.handlebars.register_helper("equals", Box::new(equals));
        }))
        .attach(AdHoc::config::<Config>())
        .attach(BookclubDBConn::fairing())
        .attach(AdHoc::try_on_ignite("Database schema", |rocket| async {
            let Some(conn) = BookclubDBConn::get_one(&rocket).await else {
                log::error!("Database fairing not attached, can't check the schema");
                return Err(rocket);
            };
            match conn.run(sql_interface::init_db_if_necessary).await {
                Ok(DatabaseStatus::Created) => log::info!("Created fresh database schema"),
                Ok(DatabaseStatus::AlreadyExistent) => (),
                Err(err) => {
                    log::error!("Could not initialize database: {}", err);
                    return Err(rocket);
                }
            }
            Ok(rocket)
        }))
        .attach(AdHoc::try_on_ignite("Notifier and uploads", |rocket| async {
            let Some(config) = rocket.state::<Config>() else {
                log::error!("Configuration missing, can't set up notifications and uploads");
                return Err(rocket);
            };
            let notifier = notify::from_config(config.mail.as_ref());
            let upload_dir = config.upload_dir.clone();

            if let Err(err) = fs::create_dir_all(&upload_dir) {
                log::error!(
                    "Could not create upload directory {}: {}",
                    upload_dir.display(),
                    err
                );
                return Err(rocket);
            }

            Ok(rocket
                .manage(notifier)
                .manage(FsProofStore::new(upload_dir.clone()))
                .mount(UPLOADS_MOUNT, FileServer::from(upload_dir)))
        }))
        .mount("/", routes())
        .mount("/static", FileServer::from(relative!("/static")))
        .register("/", catchers())
        .register("/api", api_catchers())
}
