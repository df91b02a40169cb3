use rocket::{Catcher, Route};

pub mod admin;
pub mod authflow;
pub mod error;
pub mod public;

#[must_use]
pub fn routes() -> Vec<Route> {
    crate::flatten_routes([
        admin::routes(),
        authflow::routes(),
        error::routes(),
        public::routes(),
    ])
}

#[must_use]
pub fn catchers() -> Vec<Catcher> {
    error::catchers()
}

#[must_use]
pub fn api_catchers() -> Vec<Catcher> {
    error::api_catchers()
}
