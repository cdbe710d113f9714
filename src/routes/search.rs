use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};

use crate::accounts;
use crate::auth::session::Flash;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::feed;
use crate::routes::home::{Html, SearchForm};
use crate::routes::{flash_redirect, profile_picture_url, Layout, PersonView};
use crate::social;
use crate::state::AppState;
use crate::timefmt::parse_and_format_time;

#[derive(Template)]
#[template(path = "pages/search.html")]
pub struct SearchTemplate {
    pub layout: Layout,
    pub query: String,
    pub users: Vec<PersonView>,
    pub posts: Vec<SearchHit>,
}

/// A post matched by a search, with its author when one still exists.
pub struct SearchHit {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: String,
    pub created_at: String,
    pub author_id: i64,
    pub author_name: String,
    pub author_picture: String,
}

#[derive(Template)]
#[template(path = "pages/find_people.html")]
pub struct FindPeopleTemplate {
    pub layout: Layout,
    pub people: Vec<PersonView>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search_page).post(submit))
        .route("/search/{term}", get(search_term))
        .route("/find_people", get(find_people))
}

/// `/search/<term>` with the term percent-encoded as a single segment.
pub fn search_path(term: &str) -> String {
    match url::Url::parse("http://localhost/search/") {
        Ok(mut base) => {
            if let Ok(mut segments) = base.path_segments_mut() {
                segments.pop_if_empty().push(term);
            }
            base.path().to_string()
        }
        Err(_) => "/search".to_string(),
    }
}

/// Attach the viewer's friendship flags to each user.
pub fn people_with_status(
    conn: &rusqlite::Connection,
    viewer_id: i64,
    users: &[crate::db::models::User],
) -> AppResult<Vec<PersonView>> {
    let received = social::pending_received(conn, viewer_id)?;
    let sent = social::pending_sent(conn, viewer_id)?;

    let mut people = Vec::with_capacity(users.len());
    for user in users {
        let mut person = PersonView::new(user);
        person.is_friend = social::are_friends(conn, viewer_id, user.id)?;
        person.has_pending_request = received.iter().any(|r| r.request.sender_id == user.id);
        person.has_sent_request = sent.iter().any(|r| r.request.receiver_id == user.id);
        people.push(person);
    }
    Ok(people)
}

fn render_results(state: &AppState, user: &CurrentUser, query: &str) -> AppResult<Response> {
    let conn = state.db.get()?;
    let results = feed::search_all(&conn, query)?;

    let users = people_with_status(&conn, user.id(), &results.users)?;
    let posts = results
        .posts
        .into_iter()
        .map(|(post, author)| SearchHit {
            id: post.id,
            title: post.title.unwrap_or_default(),
            content: post.content,
            category: post.category.unwrap_or_default(),
            tags: post.tags.unwrap_or_default(),
            created_at: parse_and_format_time(&post.created_at),
            author_id: post.user_id,
            author_name: author
                .as_ref()
                .map(|a| a.full_name())
                .unwrap_or_else(|| "Unknown".to_string()),
            author_picture: author
                .as_ref()
                .map(profile_picture_url)
                .unwrap_or_else(|| crate::routes::DEFAULT_PROFILE_PICTURE.to_string()),
        })
        .collect();

    let layout = Layout::for_user(&conn, user, "Search")?;
    Ok(Html(SearchTemplate {
        layout,
        query: query.trim().to_string(),
        users,
        posts,
    })
    .into_response())
}

/// GET /search: an empty results page.
pub async fn search_page(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    render_results(&state, &user, "")
}

/// GET /search/<term>
pub async fn search_term(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(term): Path<String>,
) -> AppResult<Response> {
    render_results(&state, &user, &term)
}

/// POST /search
pub async fn submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<SearchForm>,
) -> AppResult<Response> {
    let term = form.search.trim();
    if term.is_empty() {
        let conn = state.db.get()?;
        return flash_redirect(&conn, &user, Flash::Error, "Please enter a search term.", "/home/");
    }
    Ok(Redirect::to(&search_path(term)).into_response())
}

/// GET /find_people: every other user with friendship flags.
pub async fn find_people(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let others: Vec<_> = accounts::list_all(&conn)?
        .into_iter()
        .filter(|u| u.id != user.id())
        .collect();
    let people = people_with_status(&conn, user.id(), &others)?;
    let layout = Layout::for_user(&conn, &user, "Find People")?;

    Ok(Html(FindPeopleTemplate { layout, people }).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_path_encodes_term_as_one_segment() {
        assert_eq!(search_path("alice"), "/search/alice");
        assert_eq!(search_path("ann lee"), "/search/ann%20lee");
        assert_eq!(search_path("a/b"), "/search/a%2Fb");
    }
}
