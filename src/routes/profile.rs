use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;

use crate::accounts::{self, AccountError, UserUpdate};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::Flash;
use crate::content;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::feed;
use crate::routes::home::Html;
use crate::routes::search::people_with_status;
use crate::routes::{flash_redirect, profile_picture_url, Layout, PersonView, PostCard};
use crate::state::AppState;
use crate::timefmt::format_join_date;
use crate::uploads::{self, UploadError, PROFILE_PICTURES};

/// Number of posts shown on a profile page.
const PROFILE_POST_LIMIT: usize = 5;

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub layout: Layout,
    pub person: PersonView,
    pub is_own: bool,
    pub bio: String,
    pub links: String,
    pub date_joined: String,
    pub posts: Vec<PostCard>,
}

#[derive(Template)]
#[template(path = "pages/edit_profile.html")]
pub struct EditProfileTemplate {
    pub layout: Layout,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: String,
    pub links: String,
}

#[derive(Template)]
#[template(path = "pages/edit_profile_picture.html")]
pub struct EditPictureTemplate {
    pub layout: Layout,
    pub user_id: i64,
    pub picture_url: String,
    pub has_custom_picture: bool,
}

#[derive(Deserialize, Default)]
pub struct EditProfileForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub links: Option<String>,
    pub old_password: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile/", get(own_profile))
        .route("/profile/{id}", get(show))
        .route("/edit/profile/", get(own_edit))
        .route("/edit/profile/{id}", get(edit_page).post(edit))
        .route(
            "/edit/profile/{id}/profile_picture",
            get(picture_page).post(upload_picture),
        )
        .route(
            "/edit/profile/{id}/remove_profile_picture/",
            get(remove_picture),
        )
}

pub async fn own_profile(user: CurrentUser) -> Redirect {
    Redirect::to(&format!("/profile/{}", user.id()))
}

pub async fn own_edit(user: CurrentUser) -> Redirect {
    Redirect::to(&format!("/edit/profile/{}", user.id()))
}

/// GET /profile/<id>
pub async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let Some(profile) = accounts::find_by_id(&conn, id)? else {
        return flash_redirect(&conn, &user, Flash::Error, "User not found.", "/home/");
    };

    let is_own = profile.id == user.id();
    let posts: Vec<_> = content::list_posts(&conn, id)?
        .into_iter()
        .filter(|post| is_own || !post.is_draft)
        .take(PROFILE_POST_LIMIT)
        .collect();
    let posts = feed::assemble(&conn, posts, user.id())?
        .into_iter()
        .map(|entry| PostCard::from_entry(entry, user.id()))
        .collect();

    let person = if is_own {
        PersonView::new(&profile)
    } else {
        people_with_status(&conn, user.id(), std::slice::from_ref(&profile))?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)?
    };

    let layout = Layout::for_user(&conn, &user, format!("{}'s Profile", profile.full_name()))?;
    Ok(Html(ProfileTemplate {
        layout,
        person,
        is_own,
        bio: profile.bio.clone().unwrap_or_default(),
        links: profile.links.clone().unwrap_or_default(),
        date_joined: format_join_date(&profile.date_joined),
        posts,
    })
    .into_response())
}

fn edit_template(layout: Layout, user: &User) -> EditProfileTemplate {
    EditProfileTemplate {
        layout,
        user_id: user.id,
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        email: user.email.clone(),
        bio: user.bio.clone().unwrap_or_default(),
        links: user.links.clone().unwrap_or_default(),
    }
}

/// GET /edit/profile/<id>
pub async fn edit_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    if id != user.id() {
        return flash_redirect(&conn, &user, Flash::Error, "You can only edit your own profile.", "/home/");
    }
    let layout = Layout::for_user(&conn, &user, "Edit Profile")?;
    Ok(Html(edit_template(layout, &user.user)).into_response())
}

fn changed(value: Option<String>, current: &str) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != current)
}

/// Fields that differ from the stored profile. Blank names and email keep
/// their current value; blank bio and links clear them.
pub fn profile_changes(current: &User, form: &EditProfileForm) -> UserUpdate {
    let text_change = |value: &Option<String>, current: &Option<String>| {
        let value = value.as_ref()?.trim().to_string();
        (value != current.clone().unwrap_or_default()).then_some(value)
    };
    UserUpdate {
        first_name: changed(form.first_name.clone(), &current.first_name),
        last_name: changed(form.last_name.clone(), &current.last_name),
        email: changed(form.email.clone(), &current.email),
        bio: text_change(&form.bio, &current.bio),
        links: text_change(&form.links, &current.links),
        ..UserUpdate::default()
    }
}

/// POST /edit/profile/<id>
pub async fn edit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<EditProfileForm>,
) -> AppResult<Response> {
    if id != user.id() {
        let conn = state.db.get()?;
        return flash_redirect(&conn, &user, Flash::Error, "You can only edit your own profile.", "/home/");
    }

    let mut changes = profile_changes(&user.user, &form);

    let non_blank = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
    if let (Some(old), Some(new1), Some(new2)) = (
        non_blank(&form.old_password),
        non_blank(&form.password1),
        non_blank(&form.password2),
    ) {
        let problem = if !verify_password(old, user.user.password_hash.clone()).await? {
            Some("Current password is incorrect.")
        } else if new1 != new2 {
            Some("New passwords don't match.")
        } else if new1.chars().count() < 7 {
            Some("New password must be at least 7 characters.")
        } else {
            None
        };
        if let Some(problem) = problem {
            return rerender_edit(&state, &user, Flash::Error, problem);
        }
        changes.password_hash = Some(hash_password(new1, state.config.auth.bcrypt_cost).await?);
    }

    if changes.is_empty() {
        return rerender_edit(&state, &user, Flash::Info, "No changes were made.");
    }

    let conn = state.db.get()?;
    match accounts::update(&conn, user.id(), &changes) {
        Ok(_) => {
            tracing::info!(user_id = user.id(), "Profile updated");
            flash_redirect(
                &conn,
                &user,
                Flash::Success,
                "Profile updated successfully!",
                &format!("/profile/{}", user.id()),
            )
        }
        Err(AccountError::DuplicateEmail) => {
            drop(conn);
            rerender_edit(&state, &user, Flash::Error, &AppError::DuplicateEmail.to_string())
        }
        Err(e) => Err(e.into()),
    }
}

fn rerender_edit(
    state: &AppState,
    user: &CurrentUser,
    kind: Flash,
    message: &str,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut layout = Layout::for_user(&conn, user, "Edit Profile")?;
    layout.flashes.push(kind.message(message));
    let status = match kind {
        Flash::Error => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    Ok((status, Html(edit_template(layout, &user.user))).into_response())
}

fn picture_template(layout: Layout, user: &User) -> EditPictureTemplate {
    EditPictureTemplate {
        layout,
        user_id: user.id,
        picture_url: profile_picture_url(user),
        has_custom_picture: user.profile_picture.is_some(),
    }
}

/// GET /edit/profile/<id>/profile_picture
pub async fn picture_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    if id != user.id() {
        return flash_redirect(&conn, &user, Flash::Error, "You can only edit your own profile picture.", "/home/");
    }
    let layout = Layout::for_user(&conn, &user, "Profile Picture")?;
    Ok(Html(picture_template(layout, &user.user)).into_response())
}

/// Best-effort removal of a replaced picture file.
async fn discard_picture(state: &AppState, name: Option<&str>) {
    let Some(name) = name else { return };
    let path = state.config.uploads_path().join(PROFILE_PICTURES).join(name);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), "Could not remove old profile picture: {}", e);
    }
}

/// POST /edit/profile/<id>/profile_picture
pub async fn upload_picture(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    if id != user.id() {
        let conn = state.db.get()?;
        return flash_redirect(&conn, &user, Flash::Error, "You can only edit your own profile picture.", "/home/");
    }

    let form = uploads::read_multipart(multipart).await?;
    let problem = match form.files.get("profile_picture") {
        None => Some("No file selected.".to_string()),
        Some(file) => match uploads::save_image(&state.config.uploads_path(), PROFILE_PICTURES, file).await {
            Ok(stored) => {
                let conn = state.db.get()?;
                accounts::update(
                    &conn,
                    user.id(),
                    &UserUpdate {
                        profile_picture: Some(Some(stored)),
                        ..UserUpdate::default()
                    },
                )?;
                drop(conn);
                discard_picture(&state, user.user.profile_picture.as_deref()).await;

                let conn = state.db.get()?;
                return flash_redirect(
                    &conn,
                    &user,
                    Flash::Success,
                    "Profile picture updated successfully!",
                    &format!("/profile/{}", user.id()),
                );
            }
            Err(UploadError::UnsupportedType) => Some(UploadError::UnsupportedType.to_string()),
            Err(e) => return Err(e.into()),
        },
    };

    let conn = state.db.get()?;
    let mut layout = Layout::for_user(&conn, &user, "Profile Picture")?;
    if let Some(problem) = problem {
        layout.flashes.push(Flash::Error.message(problem));
    }
    Ok((StatusCode::BAD_REQUEST, Html(picture_template(layout, &user.user))).into_response())
}

/// GET /edit/profile/<id>/remove_profile_picture/
pub async fn remove_picture(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    if id != user.id() {
        let conn = state.db.get()?;
        return flash_redirect(&conn, &user, Flash::Error, "You can only edit your own profile picture.", "/home/");
    }

    {
        let conn = state.db.get()?;
        accounts::update(
            &conn,
            user.id(),
            &UserUpdate {
                profile_picture: Some(None),
                ..UserUpdate::default()
            },
        )?;
    }
    discard_picture(&state, user.user.profile_picture.as_deref()).await;

    let conn = state.db.get()?;
    flash_redirect(
        &conn,
        &user,
        Flash::Success,
        "Profile picture removed successfully!",
        &format!("/edit/profile/{}/profile_picture", user.id()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_user() -> User {
        User {
            id: 1,
            email: "ann@x.com".into(),
            password_hash: "h".into(),
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            profile_picture: None,
            bio: Some("hello".into()),
            links: None,
            date_joined: "2025-01-01 00:00:00".into(),
        }
    }

    #[test]
    fn unchanged_form_makes_no_changes() {
        let form = EditProfileForm {
            first_name: Some("Ann".into()),
            last_name: Some("Lee".into()),
            email: Some("ann@x.com".into()),
            bio: Some("hello".into()),
            links: Some(String::new()),
            ..EditProfileForm::default()
        };
        assert!(profile_changes(&stored_user(), &form).is_empty());
    }

    #[test]
    fn blank_names_are_ignored_but_bio_can_be_cleared() {
        let form = EditProfileForm {
            first_name: Some("  ".into()),
            email: Some("new@x.com".into()),
            bio: Some(String::new()),
            ..EditProfileForm::default()
        };
        let changes = profile_changes(&stored_user(), &form);
        assert_eq!(changes.first_name, None);
        assert_eq!(changes.email.as_deref(), Some("new@x.com"));
        assert_eq!(changes.bio.as_deref(), Some(""));
        assert_eq!(changes.links, None);
    }
}
