use askama::Template;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use crate::accounts::{self, AccountError, NewUser};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::{self, Flash};
use crate::db::models::FlashMessage;
use crate::error::{AppError, AppResult};
use crate::extractors::{get_cookie_value, MaybeUser};
use crate::routes::home::Html;
use crate::routes::Layout;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub email: String,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub layout: Layout,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

// -- Request types --

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

/// Start a session, queue the greeting and send the user home.
fn login_response(
    state: &AppState,
    user_id: i64,
    greeting: &str,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let new_session = session::create_session(&conn, user_id, state.config.auth.session_hours)?;
    session::push_flash(&conn, &new_session.id, Flash::Success, greeting)?;

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/home/".to_string()),
            (
                header::SET_COOKIE,
                session_cookie(
                    &state.config.auth.cookie_name,
                    &new_session.token,
                    state.config.auth.session_hours,
                ),
            ),
        ],
    )
        .into_response())
}

/// Check sign-up input, returning the first problem found.
pub fn validate_signup(form: &SignupForm) -> Option<&'static str> {
    if form.first_name.chars().count() < 2 {
        Some("First Name too short.")
    } else if form.last_name.is_empty() {
        Some("Last Name required.")
    } else if form.email.chars().count() < 5 {
        Some("Email too short.")
    } else if form.password1 != form.password2 {
        Some("Passwords don't match.")
    } else if form.password1.chars().count() < 7 {
        Some("Password too short.")
    } else {
        None
    }
}

// -- Login --

/// GET / and GET /login
pub async fn login_page(RawQuery(query): RawQuery) -> Response {
    let mut flashes = Vec::new();
    if query.as_deref().is_some_and(|q| q.split('&').any(|p| p == "logged_out")) {
        flashes.push(Flash::Success.message("You have been logged out successfully."));
    }
    Html(LoginTemplate {
        layout: Layout::anonymous("Login", flashes),
        email: String::new(),
    })
    .into_response()
}

fn login_failed(email: String, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Html(LoginTemplate {
            layout: Layout::anonymous("Login", vec![Flash::Error.message(message)]),
            email,
        }),
    )
        .into_response()
}

/// POST / and POST /login
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_string();
    let user = {
        let conn = state.db.get()?;
        accounts::find_by_email(&conn, &email)?
    };

    let Some(user) = user else {
        tracing::info!(email = %email, "Login for unknown email");
        return Ok(login_failed(email, "Email not registered."));
    };

    if !verify_password(form.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = user.id, "Login with wrong password");
        return Ok(login_failed(email, "Incorrect password."));
    }

    tracing::info!(user_id = user.id, "User logged in");
    login_response(&state, user.id, "Logged in successfully.")
}

// -- Sign-up --

/// GET /sign-up
pub async fn signup_page(maybe_user: MaybeUser) -> Response {
    if maybe_user.0.is_some() {
        return Redirect::to("/home/").into_response();
    }
    Html(SignupTemplate {
        layout: Layout::anonymous("Sign Up", Vec::new()),
        first_name: String::new(),
        last_name: String::new(),
        email: String::new(),
    })
    .into_response()
}

fn signup_failed(form: SignupForm, message: FlashMessage, status: StatusCode) -> Response {
    (
        status,
        Html(SignupTemplate {
            layout: Layout::anonymous("Sign Up", vec![message]),
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
        }),
    )
        .into_response()
}

/// POST /sign-up
pub async fn signup(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Form(mut form): Form<SignupForm>,
) -> AppResult<Response> {
    if maybe_user.0.is_some() {
        return Ok(Redirect::to("/home/").into_response());
    }

    form.first_name = form.first_name.trim().to_string();
    form.last_name = form.last_name.trim().to_string();
    form.email = form.email.trim().to_string();

    let taken = {
        let conn = state.db.get()?;
        accounts::find_by_email(&conn, &form.email)?.is_some()
    };
    if taken {
        let message = Flash::Error.message(AppError::DuplicateEmail.to_string());
        return Ok(signup_failed(form, message, StatusCode::CONFLICT));
    }
    if let Some(problem) = validate_signup(&form) {
        return Ok(signup_failed(
            form,
            Flash::Error.message(problem),
            StatusCode::BAD_REQUEST,
        ));
    }

    let password_hash =
        hash_password(form.password1.clone(), state.config.auth.bcrypt_cost).await?;

    let created = {
        let conn = state.db.get()?;
        accounts::create(
            &conn,
            &NewUser {
                first_name: &form.first_name,
                last_name: &form.last_name,
                email: &form.email,
                password_hash: &password_hash,
            },
        )
    };

    match created {
        Ok(user_id) => {
            tracing::info!(user_id, "Account created");
            login_response(&state, user_id, "Account created and logged in!")
        }
        Err(AccountError::DuplicateEmail) => {
            let message = Flash::Error.message(AppError::DuplicateEmail.to_string());
            Ok(signup_failed(form, message, StatusCode::CONFLICT))
        }
        Err(e) => Err(e.into()),
    }
}

// -- Logout --

/// GET /logout/
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = get_cookie_value(&headers, cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/login?logged_out".to_string()),
            (header::SET_COOKIE, clear_session_cookie(cookie_name)),
        ],
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(first: &str, last: &str, email: &str, p1: &str, p2: &str) -> SignupForm {
        SignupForm {
            first_name: first.into(),
            last_name: last.into(),
            email: email.into(),
            password1: p1.into(),
            password2: p2.into(),
        }
    }

    #[test]
    fn signup_validation_messages() {
        assert_eq!(
            validate_signup(&form("A", "Lee", "ann@x.com", "secret1", "secret1")),
            Some("First Name too short.")
        );
        assert_eq!(
            validate_signup(&form("Ann", "", "ann@x.com", "secret1", "secret1")),
            Some("Last Name required.")
        );
        assert_eq!(
            validate_signup(&form("Ann", "Lee", "a@x", "secret1", "secret1")),
            Some("Email too short.")
        );
        assert_eq!(
            validate_signup(&form("Ann", "Lee", "ann@x.com", "secret1", "secret2")),
            Some("Passwords don't match.")
        );
        assert_eq!(
            validate_signup(&form("Ann", "Lee", "ann@x.com", "short", "short")),
            Some("Password too short.")
        );
        assert_eq!(
            validate_signup(&form("Ann", "Lee", "ann@x.com", "secret1", "secret1")),
            None
        );
    }

    #[test]
    fn session_cookie_format() {
        let cookie = session_cookie("socialite_session", "tok", 2);
        assert!(cookie.starts_with("socialite_session=tok;"));
        assert!(cookie.contains("Max-Age=7200"));
        assert!(clear_session_cookie("socialite_session").contains("Max-Age=0"));
    }
}
