//! Creates an admin account in the configured database.
//!
//! Usage: `add-admin <email>`, then type the password on stdin.

use std::{env, error::Error, io, process};

use bookclub::{
    config,
    routes::authflow::hash_password,
    sql_interface::{self, AdminCreationError, DatabaseStatus},
};

fn database_url() -> Result<String, figment::Error> {
    config::figment().extract_inner("databases.bookclub.url")
}

fn run(email: &str) -> Result<(), Box<dyn Error>> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(format!("'{email}' doesn't look like an email address").into());
    }

    eprintln!("Password for {email}:");
    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err("refusing to create an admin with an empty password".into());
    }

    let url = database_url()?;
    let mut conn = rusqlite::Connection::open(&url)?;
    if let DatabaseStatus::Created = sql_interface::init_db_if_necessary(&mut conn)? {
        eprintln!("Created fresh database schema in {url}");
    }

    let hash = hash_password(password).map_err(|err| format!("could not hash password: {err}"))?;
    match sql_interface::insert_new_admin(&mut conn, &email, &hash) {
        Ok(id) => {
            eprintln!("Created admin {id} ({email})");
            Ok(())
        }
        Err(AdminCreationError::EmailAlreadyInUse) => {
            Err(format!("an admin with email {email} exists already").into())
        }
        Err(err) => Err(err.into()),
    }
}

fn main() {
    let Some(email) = env::args().nth(1) else {
        eprintln!("usage: add-admin <email>");
        process::exit(2);
    };

    if let Err(err) = run(&email) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}
