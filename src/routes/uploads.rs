use std::path::{Component, PathBuf};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Resolve a request path under the uploads root, refusing anything that
/// could step outside it.
pub fn resolve_upload(root: &std::path::Path, requested: &str) -> Option<PathBuf> {
    let relative = std::path::Path::new(requested);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    (safe && !requested.is_empty()).then(|| root.join(relative))
}

/// GET /uploads/<path>: user-uploaded post images and profile pictures.
pub async fn serve(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let Some(full) = resolve_upload(&state.config.uploads_path(), &path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&full).first_or_octet_stream();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(path = %full.display(), "Failed to read upload: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        let root = std::path::Path::new("/data/uploads");
        assert_eq!(
            resolve_upload(root, "posts/cat_1.png"),
            Some(PathBuf::from("/data/uploads/posts/cat_1.png"))
        );
        assert_eq!(resolve_upload(root, "../secret.db"), None);
        assert_eq!(resolve_upload(root, "posts/../../x"), None);
        assert_eq!(resolve_upload(root, "/etc/passwd"), None);
        assert_eq!(resolve_upload(root, ""), None);
    }
}
