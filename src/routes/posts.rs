use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use rusqlite::Connection;
use serde::Deserialize;

use crate::accounts;
use crate::auth::session::Flash;
use crate::content::{self, comments, NewPost, ReactionKind};
use crate::db::models::Post;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::feed::{self, FeedEntry};
use crate::routes::home::Html;
use crate::routes::{back_or, flash_redirect, profile_picture_url, Layout, PostCard};
use crate::state::AppState;
use crate::timefmt::parse_and_format_time;
use crate::uploads::{self, UploadError, POST_IMAGES};

#[derive(Template)]
#[template(path = "pages/create_post.html")]
pub struct CreatePostTemplate {
    pub layout: Layout,
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: String,
    pub is_draft: bool,
}

#[derive(Template)]
#[template(path = "pages/post_detail.html")]
pub struct PostDetailTemplate {
    pub layout: Layout,
    pub post: PostCard,
    pub comments: Vec<CommentView>,
}

pub struct CommentView {
    pub id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub author_picture: String,
    pub body: String,
    pub created_at: String,
    pub like_count: i64,
    pub replies: Vec<ReplyView>,
}

pub struct ReplyView {
    pub author_id: i64,
    pub author_name: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct ReplyForm {
    #[serde(default)]
    pub reply: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create_post", get(create_page).post(create))
        .route("/delete/post/{id}", get(delete))
        .route("/post/{id}", get(detail))
        .route("/post/{id}/like", post(like))
        .route("/post/{id}/dislike", post(dislike))
        .route("/post/{id}/comment/", post(comment))
        .route("/comment/{id}/reply/", post(reply))
        .route("/comment/{id}/like", post(like_comment))
}

/// GET /create_post
pub async fn create_page(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let layout = Layout::for_user(&conn, &user, "Create Post")?;
    Ok(Html(CreatePostTemplate {
        layout,
        title: String::new(),
        content: String::new(),
        category: String::new(),
        tags: String::new(),
        is_draft: false,
    })
    .into_response())
}

/// POST /create_post (multipart: title, content, category, tags, draft, image)
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = uploads::read_multipart(multipart).await?;
    let is_draft = form.text("draft").is_some();

    let rerender = |message: String| -> AppResult<Response> {
        let conn = state.db.get()?;
        let mut layout = Layout::for_user(&conn, &user, "Create Post")?;
        layout.flashes.push(Flash::Error.message(message));
        let echo = |name: &str| form.text(name).unwrap_or_default().to_string();
        Ok((
            StatusCode::BAD_REQUEST,
            Html(CreatePostTemplate {
                layout,
                title: echo("title"),
                content: echo("content"),
                category: echo("category"),
                tags: echo("tags"),
                is_draft,
            }),
        )
            .into_response())
    };

    let Some(body) = form.non_empty("content") else {
        return rerender("Post content cannot be empty".to_string());
    };

    let image = match form.files.get("image") {
        Some(file) => match uploads::save_image(&state.config.uploads_path(), POST_IMAGES, file).await {
            Ok(stored) => Some(stored),
            Err(UploadError::UnsupportedType) => {
                return rerender(UploadError::UnsupportedType.to_string());
            }
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    let inserted = insert_post(
        &state,
        &NewPost {
            title: form.non_empty("title"),
            content: body,
            user_id: user.id(),
            image: image.as_deref(),
            category: form.non_empty("category"),
            tags: form.non_empty("tags"),
            is_draft,
        },
    );
    if let Err(e) = inserted {
        if let Some(image) = &image {
            remove_post_image(&state, image).await;
        }
        return Err(e);
    }

    let conn = state.db.get()?;
    flash_redirect(&conn, &user, Flash::Success, "Post created successfully!", "/home/")
}

/// GET /delete/post/<id>
pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let Some(post) = content::get_post(&conn, id)? else {
        return flash_redirect(&conn, &user, Flash::Error, "Post not found.", "/home/");
    };
    if post.user_id != user.id() {
        tracing::warn!(post_id = id, user_id = user.id(), "Refused to delete another user's post");
        return flash_redirect(&conn, &user, Flash::Error, "You can only delete your own posts.", "/home/");
    }

    content::delete_post(&conn, id)?;
    drop(conn);
    if let Some(image) = &post.image {
        remove_post_image(&state, image).await;
    }

    let conn = state.db.get()?;
    flash_redirect(&conn, &user, Flash::Success, "Post deleted successfully.", "/profile/")
}

fn insert_post(state: &AppState, post: &NewPost<'_>) -> AppResult<i64> {
    let conn = state.db.get()?;
    Ok(content::create_post(&conn, post)?)
}

async fn remove_post_image(state: &AppState, image: &str) {
    let path = state.config.uploads_path().join(POST_IMAGES).join(image);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), "Could not remove post image: {}", e);
    }
}

/// A post the viewer may see: published, or one of their own drafts.
fn visible_post(conn: &Connection, post_id: i64, viewer_id: i64) -> AppResult<Option<Post>> {
    Ok(content::get_post(conn, post_id)?.filter(|p| !p.is_draft || p.user_id == viewer_id))
}

/// GET /post/<id>: the post with its comments and their replies.
pub async fn detail(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let Some(post) = visible_post(&conn, id, user.id())? else {
        return flash_redirect(&conn, &user, Flash::Error, "Post not found.", "/home/");
    };
    let Some(author) = accounts::find_by_id(&conn, post.user_id)? else {
        return flash_redirect(&conn, &user, Flash::Error, "Post not found.", "/home/");
    };

    let metrics = feed::post_metrics(&conn, post.id, user.id())?;

    let mut comment_views = Vec::new();
    for comment in comments::list_comments(&conn, post.id)? {
        let commenter = accounts::find_by_id(&conn, comment.user_id)?;
        let mut replies = Vec::new();
        for reply in comments::list_replies(&conn, comment.id)? {
            let replier = accounts::find_by_id(&conn, reply.user_id)?;
            replies.push(ReplyView {
                author_id: reply.user_id,
                author_name: display_name(replier.as_ref()),
                body: reply.body,
                created_at: parse_and_format_time(&reply.created_at),
            });
        }
        comment_views.push(CommentView {
            id: comment.id,
            author_id: comment.user_id,
            author_name: display_name(commenter.as_ref()),
            author_picture: commenter
                .as_ref()
                .map(profile_picture_url)
                .unwrap_or_else(|| crate::routes::DEFAULT_PROFILE_PICTURE.to_string()),
            like_count: comments::comment_like_count(&conn, comment.id)?,
            body: comment.body,
            created_at: parse_and_format_time(&comment.created_at),
            replies,
        });
    }

    let card = PostCard::from_entry(
        FeedEntry {
            post,
            author,
            metrics,
        },
        user.id(),
    );
    let layout = Layout::for_user(&conn, &user, "Post")?;
    Ok(Html(PostDetailTemplate {
        layout,
        post: card,
        comments: comment_views,
    })
    .into_response())
}

fn display_name(user: Option<&crate::db::models::User>) -> String {
    user.map(|u| u.full_name())
        .unwrap_or_else(|| "Unknown".to_string())
}

async fn react(
    state: AppState,
    user: CurrentUser,
    post_id: i64,
    kind: ReactionKind,
    headers: HeaderMap,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    if visible_post(&conn, post_id, user.id())?.is_none() {
        return flash_redirect(&conn, &user, Flash::Error, "Post not found.", "/home/");
    }
    let after = content::reactions::toggle(&mut conn, user.id(), post_id, kind)?;
    tracing::debug!(post_id, user_id = user.id(), state = ?after, "Reaction toggled");
    Ok(Redirect::to(&back_or(&headers, "/home/")).into_response())
}

/// POST /post/<id>/like
pub async fn like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> AppResult<Response> {
    react(state, user, id, ReactionKind::Like, headers).await
}

/// POST /post/<id>/dislike
pub async fn dislike(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> AppResult<Response> {
    react(state, user, id, ReactionKind::Dislike, headers).await
}

/// POST /post/<id>/comment/
pub async fn comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let back = back_or(&headers, &format!("/post/{}", id));
    let body = form.comment.trim();
    if body.is_empty() {
        return flash_redirect(&conn, &user, Flash::Error, "Comment cannot be empty.", &back);
    }
    if visible_post(&conn, id, user.id())?.is_none() {
        return flash_redirect(&conn, &user, Flash::Error, "Post not found.", "/home/");
    }
    content::add_comment(&conn, user.id(), id, body)?;
    flash_redirect(&conn, &user, Flash::Success, "Comment added.", &back)
}

/// POST /comment/<id>/reply/
pub async fn reply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<ReplyForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let back = back_or(&headers, "/home/");
    let body = form.reply.trim();
    if body.is_empty() {
        return flash_redirect(&conn, &user, Flash::Error, "Reply cannot be empty.", &back);
    }
    match content::reply_to_comment(&conn, user.id(), id, body)? {
        Some(_) => flash_redirect(&conn, &user, Flash::Success, "Reply added.", &back),
        None => flash_redirect(&conn, &user, Flash::Error, "Comment not found.", &back),
    }
}

/// POST /comment/<id>/like
pub async fn like_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let back = back_or(&headers, "/home/");
    match content::like_comment(&conn, user.id(), id)? {
        Some(_) => Ok(Redirect::to(&back).into_response()),
        None => flash_redirect(&conn, &user, Flash::Error, "Comment not found.", &back),
    }
}
