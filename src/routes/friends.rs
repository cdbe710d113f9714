use askama::Template;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::accounts;
use crate::auth::session::Flash;
use crate::db::models::FriendRequestView;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::routes::home::Html;
use crate::routes::{back_or, flash_redirect, Layout, PersonView};
use crate::social::{self, SendOutcome, SocialError};
use crate::state::AppState;
use crate::timefmt::parse_and_format_time;

#[derive(Template)]
#[template(path = "pages/friend_requests.html")]
pub struct FriendRequestsTemplate {
    pub layout: Layout,
    pub received: Vec<RequestView>,
    pub sent: Vec<RequestView>,
}

#[derive(Template)]
#[template(path = "pages/friends.html")]
pub struct FriendsTemplate {
    pub layout: Layout,
    pub friends: Vec<PersonView>,
}

/// One pending request as listed to either party.
pub struct RequestView {
    pub id: i64,
    pub counterpart_id: i64,
    pub counterpart_name: String,
    pub counterpart_email: String,
    pub date_sent: String,
}

impl RequestView {
    fn new(view: FriendRequestView, counterpart_id: i64) -> Self {
        Self {
            id: view.request.id,
            counterpart_id,
            counterpart_name: format!("{} {}", view.counterpart_first_name, view.counterpart_last_name),
            counterpart_email: view.counterpart_email,
            date_sent: parse_and_format_time(&view.request.date_sent),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send_friend_request/{id}", post(send))
        .route("/accept_friend_request/{id}", post(accept))
        .route("/reject_friend_request/{id}", post(reject))
        .route("/friend_requests", get(requests_page))
        .route("/friends", get(friends_page))
}

/// POST /send_friend_request/<user id>
pub async fn send(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(target_id): Path<i64>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    let back = back_or(&headers, "/home/");

    if target_id == user.id() {
        return flash_redirect(&conn, &user, Flash::Error, "You cannot send a friend request to yourself.", &back);
    }
    if accounts::find_by_id(&conn, target_id)?.is_none() {
        return flash_redirect(&conn, &user, Flash::Error, "User not found.", &back);
    }
    if social::are_friends(&conn, user.id(), target_id)? {
        return flash_redirect(&conn, &user, Flash::Info, "You are already friends with this user.", &back);
    }

    match social::send_request(&mut conn, user.id(), target_id)? {
        SendOutcome::Sent(request_id) => {
            tracing::info!(request_id, sender_id = user.id(), receiver_id = target_id, "Friend request sent");
            flash_redirect(&conn, &user, Flash::Success, "Friend request sent successfully!", &back)
        }
        SendOutcome::AlreadyRequested => {
            flash_redirect(&conn, &user, Flash::Info, "Friend request already sent.", &back)
        }
    }
}

#[derive(Clone, Copy)]
enum Answer {
    Accept,
    Reject,
}

async fn respond(
    state: AppState,
    user: CurrentUser,
    request_id: i64,
    action: Answer,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    let Some(request) = social::get_request(&conn, request_id)? else {
        return flash_redirect(&conn, &user, Flash::Error, "Friend request not found.", "/friend_requests");
    };
    if request.receiver_id != user.id() {
        tracing::warn!(request_id, user_id = user.id(), "Refused to answer a request addressed to someone else");
        return flash_redirect(
            &conn,
            &user,
            Flash::Error,
            "You can only respond to friend requests sent to you.",
            "/friend_requests",
        );
    }

    let (result, kind, message) = match action {
        Answer::Accept => (
            social::accept_request(&mut conn, request_id),
            Flash::Success,
            "Friend request accepted!",
        ),
        Answer::Reject => (
            social::reject_request(&mut conn, request_id),
            Flash::Info,
            "Friend request rejected.",
        ),
    };

    match result {
        Ok(_) => flash_redirect(&conn, &user, kind, message, "/friend_requests"),
        Err(SocialError::AlreadyResponded(status)) => flash_redirect(
            &conn,
            &user,
            Flash::Info,
            &format!("Friend request was already {}.", status),
            "/friend_requests",
        ),
        Err(e) => Err(e.into()),
    }
}

/// POST /accept_friend_request/<request id>
pub async fn accept(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    respond(state, user, id, Answer::Accept).await
}

/// POST /reject_friend_request/<request id>
pub async fn reject(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    respond(state, user, id, Answer::Reject).await
}

/// GET /friend_requests
pub async fn requests_page(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let received = social::pending_received(&conn, user.id())?
        .into_iter()
        .map(|view| {
            let sender = view.request.sender_id;
            RequestView::new(view, sender)
        })
        .collect();
    let sent = social::pending_sent(&conn, user.id())?
        .into_iter()
        .map(|view| {
            let receiver = view.request.receiver_id;
            RequestView::new(view, receiver)
        })
        .collect();
    let layout = Layout::for_user(&conn, &user, "Friend Requests")?;

    Ok(Html(FriendRequestsTemplate {
        layout,
        received,
        sent,
    })
    .into_response())
}

/// GET /friends
pub async fn friends_page(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let friends = social::friends_of(&conn, user.id())?
        .iter()
        .map(|friend| PersonView {
            is_friend: true,
            ..PersonView::new(friend)
        })
        .collect();
    let layout = Layout::for_user(&conn, &user, "My Friends")?;

    Ok(Html(FriendsTemplate { layout, friends }).into_response())
}
