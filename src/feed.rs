//! Feed assembly and search.
//!
//! The feed is built from the published posts, one author lookup and a
//! handful of aggregate queries per post. There is no batching; that is
//! the scaling limit of this module.

use rusqlite::{params, Connection};

use crate::accounts;
use crate::content;
use crate::db::models::{Post, User};

/// Reaction counts and the viewer's own reaction for one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostMetrics {
    pub like_count: i64,
    pub dislike_count: i64,
    pub comment_count: i64,
    pub viewer_liked: bool,
    pub viewer_disliked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub post: Post,
    pub author: User,
    pub metrics: PostMetrics,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResults {
    pub users: Vec<User>,
    pub posts: Vec<(Post, Option<User>)>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.posts.is_empty()
    }
}

pub fn post_metrics(
    conn: &Connection,
    post_id: i64,
    viewer_id: i64,
) -> Result<PostMetrics, rusqlite::Error> {
    Ok(PostMetrics {
        like_count: content::like_count(conn, post_id)?,
        dislike_count: content::dislike_count(conn, post_id)?,
        comment_count: content::comment_count(conn, post_id)?,
        viewer_liked: content::viewer_liked(conn, viewer_id, post_id)?,
        viewer_disliked: content::viewer_disliked(conn, viewer_id, post_id)?,
    })
}

/// Attach author and metrics to each post. Posts whose author cannot be
/// resolved are logged and left out.
pub fn assemble(
    conn: &Connection,
    posts: Vec<Post>,
    viewer_id: i64,
) -> Result<Vec<FeedEntry>, rusqlite::Error> {
    let mut entries = Vec::with_capacity(posts.len());
    for post in posts {
        let Some(author) = accounts::find_by_id(conn, post.user_id)? else {
            tracing::warn!(post_id = post.id, user_id = post.user_id, "Skipping post without author");
            continue;
        };
        let metrics = post_metrics(conn, post.id, viewer_id)?;
        entries.push(FeedEntry {
            post,
            author,
            metrics,
        });
    }
    Ok(entries)
}

/// Every published post, newest first, as seen by `viewer_id`.
pub fn build_feed(conn: &Connection, viewer_id: i64) -> Result<Vec<FeedEntry>, rusqlite::Error> {
    let posts = content::list_published(conn)?;
    let entries = assemble(conn, posts, viewer_id)?;
    tracing::debug!(viewer_id, entries = entries.len(), "Feed built");
    Ok(entries)
}

/// Escape `LIKE` wildcards so user input only matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Case-insensitive substring match on first name, last name, email and
/// "first last".
pub fn search_users(conn: &Connection, query: &str) -> Result<Vec<User>, rusqlite::Error> {
    let pattern = like_pattern(&query.to_lowercase());
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users
         WHERE fold(first_name) LIKE ?1 ESCAPE '\\'
            OR fold(last_name) LIKE ?1 ESCAPE '\\'
            OR fold(email) LIKE ?1 ESCAPE '\\'
            OR fold(first_name || ' ' || last_name) LIKE ?1 ESCAPE '\\'
         ORDER BY first_name, last_name",
        User::COLUMNS
    ))?;
    let users = stmt
        .query_map(params![pattern], User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Case-insensitive substring match on post title and content. Drafts
/// never match.
pub fn search_posts(conn: &Connection, query: &str) -> Result<Vec<Post>, rusqlite::Error> {
    let pattern = like_pattern(&query.to_lowercase());
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts
         WHERE is_draft = 0
           AND (fold(title) LIKE ?1 ESCAPE '\\' OR fold(content) LIKE ?1 ESCAPE '\\')
         ORDER BY created_at DESC, id DESC",
        Post::COLUMNS
    ))?;
    let posts = stmt
        .query_map(params![pattern], Post::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Search users and posts independently. Users are only searched for
/// queries longer than one character.
pub fn search_all(conn: &Connection, query: &str) -> Result<SearchResults, rusqlite::Error> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(SearchResults::default());
    }

    let mut posts = Vec::new();
    for post in search_posts(conn, query)? {
        let author = accounts::find_by_id(conn, post.user_id)?;
        posts.push((post, author));
    }

    let users = if query.chars().count() > 1 {
        search_users(conn, query)?
    } else {
        Vec::new()
    };

    tracing::debug!(query, users = users.len(), posts = posts.len(), "Search complete");
    Ok(SearchResults { users, posts })
}
