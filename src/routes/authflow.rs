use {
    crate::{
        config::Config,
        format_helpers::relative_to_absolute,
        server_error,
        sql_interface::{self, SearchAdminBy, SearchAdminError},
        BookclubDBConn,
    },
    argon2::{
        password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
        Algorithm, Argon2, Params, Version,
    },
    chrono::Utc,
    cookie::SameSite,
    jwt::{SignWithKey, VerifyWithKey},
    rocket::{
        form::{Form, Strict},
        http::{Cookie, CookieJar, Status},
        request::{FlashMessage, FromRequest, Outcome, Request},
        response::{Flash, Redirect},
        Route, State,
    },
    rocket_dyn_templates::{context, Template},
    serde::{Deserialize, Serialize},
    std::time::Duration,
    thiserror::Error,
};

const AUTH_COOKIE: &str = "auth-token";
const SESSION_DAYS: u16 = 7;

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![index, login, logout]
}

#[derive(FromForm)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[get("/admin/login")]
pub fn index(flash: Option<FlashMessage<'_>>) -> Template {
    Template::render(
        "admin-login",
        context! {
            flash: flash.map(|flash| flash.message().to_string()),
        },
    )
}

// Constructs an [`argon2::Argon2`] instance with reasonable settings.
fn construct_argon2_instance() -> Result<Argon2<'static>, argon2::Error> {
    Ok(Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(15_u32 * 1024_u32, 2, 1, None)?,
    ))
}

/// Hashes a password into a PHC string suitable for storing in the admin table.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(rand::thread_rng());
    let argon2 = construct_argon2_instance()?;
    Ok(argon2
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Checks a password against a stored PHC string. A malformed hash never verifies.
#[must_use]
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(hash) = PasswordHash::new(password_hash) else {
        log::error!("Invalid password hash in database!");
        return false;
    };
    construct_argon2_instance()
        .map(|argon2| argon2.verify_password(password.as_bytes(), &hash).is_ok())
        .unwrap_or(false)
}

fn login_failure_flash() -> Flash<Redirect> {
    Flash::error(Redirect::to(uri!(index)), "Unknown email or wrong password.")
}

#[post("/admin/login", data = "<login_details>")]
pub async fn login(
    conn: BookclubDBConn,
    jar: &CookieJar<'_>,
    config: &State<Config>,
    login_details: Form<Strict<LoginForm>>,
) -> Result<Redirect, Flash<Redirect>> {
    let LoginForm { email, password } = login_details.into_inner().into_inner();

    // strip and normalize a bit
    let email = email.trim().to_lowercase();

    let search_result = conn
        .run(move |c| sql_interface::search_admin(c, &SearchAdminBy::Email(email)))
        .await;
    let admin = match search_result {
        Err(SearchAdminError::NotFound) => return Err(login_failure_flash()),
        Err(err) => {
            return Err(server_error(
                format!("Non-user error while searching for admin email: {err}"),
                "an error occurred while checking your login",
            ))
        }
        Ok(admin) => admin,
    };

    if !verify_password(&password, &admin.password_hash) {
        return Err(login_failure_flash());
    }

    let claims = Claims {
        exp: relative_to_absolute(Duration::from_secs(60 * 60 * 24 * u64::from(SESSION_DAYS))),
        sub: admin.id,
        admin: true,
    };
    let jwt = claims.sign_with_key(&config.jwt_key).map_err(|err| {
        server_error(
            format!("Could not sign session for admin {}: {err}", admin.id),
            "an error occurred while signing you in",
        )
    })?;
    jar.add(
        Cookie::build((AUTH_COOKIE, jwt))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(time::Duration::days(i64::from(SESSION_DAYS))),
    );

    log::info!("Admin {} signed in", admin.id);
    Ok(Redirect::to(uri!(super::admin::panel)))
}

#[post("/logout")]
pub fn logout(_session: Session, jar: &CookieJar<'_>) -> Redirect {
    jar.remove(Cookie::from(AUTH_COOKIE));
    Redirect::to(uri!(super::public::index))
}

/// Whether a timepoint expired already, measured using the system time.
fn timepoint_expired(timepoint: i64) -> bool {
    let now = Utc::now().timestamp();
    now > timepoint
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: i64,
    sub: i64,
    admin: bool,
}

impl Claims {
    fn expired(&self) -> bool {
        timepoint_expired(self.exp)
    }

    fn try_from_request(req: &Request<'_>) -> Result<Self, AuthError> {
        let config = req
            .rocket()
            .state::<Config>()
            .ok_or(AuthError::ConfigMissing)?;
        let cookies = req.cookies();
        let claims: Claims = cookies
            .get(AUTH_COOKIE)
            .ok_or(AuthError::CookieNotFound)?
            .value()
            .verify_with_key(&config.jwt_key)?;

        if claims.expired() {
            cookies.remove(Cookie::from(AUTH_COOKIE));
            return Err(AuthError::JwtExpired);
        }

        Ok(claims)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT cookie doesn't exist")]
    CookieNotFound,
    #[error("JWT verification error")]
    JwtVerificationError(#[from] jwt::error::Error),
    #[error("JWT cookie expired")]
    JwtExpired,
    #[error("No permission for the wanted role")]
    NoPermission,
    #[error("Admin doesn't exist")]
    NonExistentAdmin,
    #[error("Configuration is not managed")]
    ConfigMissing,
    #[error("Database fairing is not attached")]
    DatabaseMissing,
    #[error("Server side database failure: {0}")]
    ServerDBFailure(#[from] rusqlite::Error),
}

impl From<SearchAdminError> for AuthError {
    fn from(source: SearchAdminError) -> Self {
        match source {
            SearchAdminError::NotFound => AuthError::NonExistentAdmin,
            SearchAdminError::RusqliteError(err) => AuthError::ServerDBFailure(err),
        }
    }
}

/// Who is making the request. Resolved once per request from the session cookie and handed to
/// handlers explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
    pub is_admin: bool,
}

#[async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = req.local_cache(|| match Claims::try_from_request(req) {
            Ok(claims) => Some(Session {
                user_id: claims.sub,
                is_admin: claims.admin,
            }),
            Err(err) => {
                log::debug!("No session: {}", err);
                None
            }
        });

        match session {
            Some(session) => Outcome::Success(*session),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

/// An authenticated admin, which is defined in the database.
///
/// Admins manage meetups and decide on registrations.
pub struct Admin {
    admin_id: i64,
}

impl Admin {
    #[inline]
    #[must_use]
    pub fn admin_id(&self) -> i64 {
        self.admin_id
    }

    async fn from_request_result(req: &Request<'_>) -> Result<Self, AuthError> {
        let session = req
            .guard::<Session>()
            .await
            .succeeded()
            .ok_or(AuthError::CookieNotFound)?;
        if !session.is_admin {
            return Err(AuthError::NoPermission);
        }

        // might seem unneeded, but an admin could have been removed in the meantime
        // then the JWT persists, but isn't valid anymore
        let conn = BookclubDBConn::get_one(req.rocket())
            .await
            .ok_or(AuthError::DatabaseMissing)?;
        let admin_id = session.user_id;
        conn.run(move |c| sql_interface::search_admin(c, &SearchAdminBy::Id(admin_id)))
            .await?;

        Ok(Admin { admin_id })
    }
}

#[async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = &'static str;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match Self::from_request_result(req).await {
            Ok(admin) => Outcome::Success(admin),
            Err(
                err @ (AuthError::ServerDBFailure(_)
                | AuthError::ConfigMissing
                | AuthError::DatabaseMissing),
            ) => {
                log::error!("{}", err);
                Outcome::Error((
                    Status::InternalServerError,
                    "Server side error while validating the session, please notify the administrator of this instance!",
                ))
            }
            Err(err) => {
                log::debug!("Not an admin: {}", err);
                Outcome::Forward(Status::Unauthorized)
            }
        }
    }
}
