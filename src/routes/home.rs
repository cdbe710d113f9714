use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;

use crate::auth::session::Flash;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::feed;
use crate::routes::search::search_path;
use crate::routes::{Layout, PostCard};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub layout: Layout,
    pub posts: Vec<PostCard>,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

#[derive(Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    pub search: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/home/", get(index).post(submit_search))
}

pub async fn index(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let posts = feed::build_feed(&conn, user.id())?
        .into_iter()
        .map(|entry| PostCard::from_entry(entry, user.id()))
        .collect();
    let layout = Layout::for_user(&conn, &user, "Home")?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Html(HomeTemplate { layout, posts }),
    )
        .into_response())
}

/// The search box on the home page.
pub async fn submit_search(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<SearchForm>,
) -> AppResult<Response> {
    let term = form.search.trim();
    if term.is_empty() {
        let conn = state.db.get()?;
        return crate::routes::flash_redirect(
            &conn,
            &user,
            Flash::Error,
            "Please enter a search term.",
            "/home/",
        );
    }
    Ok(Redirect::to(&search_path(term)).into_response())
}
