pub mod assets;
pub mod friends;
pub mod home;
pub mod posts;
pub mod profile;
pub mod search;
pub mod uploads;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::auth::session::{self, Flash};
use crate::db::models::{FlashMessage, User};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::feed::FeedEntry;
use crate::state::AppState;
use crate::timefmt::parse_and_format_time;

pub const DEFAULT_PROFILE_PICTURE: &str = "/assets/img/default_profile.svg";

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes;

    Router::new()
        .route("/", get(auth::handlers::login_page).post(auth::handlers::login))
        .route(
            "/login",
            get(auth::handlers::login_page).post(auth::handlers::login),
        )
        .route(
            "/sign-up",
            get(auth::handlers::signup_page).post(auth::handlers::signup),
        )
        .route("/logout/", get(auth::handlers::logout))
        .route("/assets/{*path}", get(assets::serve))
        .route("/uploads/{*path}", get(uploads::serve))
        .merge(home::router())
        .merge(profile::router())
        .merge(posts::router())
        .merge(search::router())
        .merge(friends::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Chrome shared by every page: title, navigation and flash messages.
pub struct Layout {
    pub title: String,
    pub logged_in: bool,
    pub viewer_id: i64,
    pub viewer_name: String,
    pub flashes: Vec<FlashMessage>,
}

impl Layout {
    /// Layout for an authenticated page. Drains the session's flashes.
    pub fn for_user(conn: &Connection, user: &CurrentUser, title: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            title: title.into(),
            logged_in: true,
            viewer_id: user.id(),
            viewer_name: user.user.full_name(),
            flashes: session::take_flashes(conn, &user.session_id)?,
        })
    }

    pub fn anonymous(title: impl Into<String>, flashes: Vec<FlashMessage>) -> Self {
        Self {
            title: title.into(),
            logged_in: false,
            viewer_id: 0,
            viewer_name: String::new(),
            flashes,
        }
    }
}

/// Queue a flash message for the next page and redirect there.
pub fn flash_redirect(
    conn: &Connection,
    user: &CurrentUser,
    kind: Flash,
    message: &str,
    to: &str,
) -> AppResult<Response> {
    session::push_flash(conn, &user.session_id, kind, message)?;
    Ok(Redirect::to(to).into_response())
}

/// Path of the `Referer` header when it points back into this site,
/// otherwise `fallback`.
pub fn back_or(headers: &HeaderMap, fallback: &str) -> String {
    let Some(referer) = headers.get(header::REFERER).and_then(|v| v.to_str().ok()) else {
        return fallback.to_string();
    };

    if referer.starts_with('/') && !referer.starts_with("//") {
        return referer.to_string();
    }

    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let Ok(parsed) = url::Url::parse(referer) else {
        return fallback.to_string();
    };
    let same_site = match (parsed.host_str(), host) {
        (Some(h), Some(expected)) => with_port(h, parsed.port()) == expected,
        _ => false,
    };
    if !same_site {
        return fallback.to_string();
    }
    match parsed.query() {
        Some(q) => format!("{}?{}", parsed.path(), q),
        None => parsed.path().to_string(),
    }
}

fn with_port(host: &str, port: Option<u16>) -> String {
    match port {
        Some(p) => format!("{}:{}", host, p),
        None => host.to_string(),
    }
}

pub fn profile_picture_url(user: &User) -> String {
    match &user.profile_picture {
        Some(name) => format!("/uploads/{}/{}", crate::uploads::PROFILE_PICTURES, name),
        None => DEFAULT_PROFILE_PICTURE.to_string(),
    }
}

/// Everything a template needs to draw one post.
pub struct PostCard {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub category: String,
    pub tags: String,
    pub is_draft: bool,
    pub created_at: String,
    pub author_id: i64,
    pub author_name: String,
    pub author_picture: String,
    pub like_count: i64,
    pub dislike_count: i64,
    pub comment_count: i64,
    pub viewer_liked: bool,
    pub viewer_disliked: bool,
    pub can_delete: bool,
}

impl PostCard {
    pub fn from_entry(entry: FeedEntry, viewer_id: i64) -> Self {
        let FeedEntry {
            post,
            author,
            metrics,
        } = entry;
        Self {
            id: post.id,
            title: post.title.unwrap_or_default(),
            content: post.content,
            image_url: post
                .image
                .map(|name| format!("/uploads/{}/{}", crate::uploads::POST_IMAGES, name))
                .unwrap_or_default(),
            category: post.category.unwrap_or_default(),
            tags: post.tags.unwrap_or_default(),
            is_draft: post.is_draft,
            created_at: parse_and_format_time(&post.created_at),
            author_id: author.id,
            author_name: author.full_name(),
            author_picture: profile_picture_url(&author),
            like_count: metrics.like_count,
            dislike_count: metrics.dislike_count,
            comment_count: metrics.comment_count,
            viewer_liked: metrics.viewer_liked,
            viewer_disliked: metrics.viewer_disliked,
            can_delete: post.user_id == viewer_id,
        }
    }
}

/// A user as listed on search, find-people and friends pages.
pub struct PersonView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub picture_url: String,
    pub is_friend: bool,
    pub has_pending_request: bool,
    pub has_sent_request: bool,
}

impl PersonView {
    pub fn new(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.full_name(),
            email: user.email.clone(),
            picture_url: profile_picture_url(user),
            is_friend: false,
            has_pending_request: false,
            has_sent_request: false,
        }
    }
}
