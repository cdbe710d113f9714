//! Content store: posts, comments and replies, and the like/dislike
//! reaction protocol.

pub mod comments;
pub mod reactions;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::Post;

pub use comments::{add_comment, add_reply, like_comment, reply_to_comment};
pub use reactions::{toggle_dislike, toggle_like, ReactionKind, ReactionState};

#[derive(Debug, Default, Clone)]
pub struct NewPost<'a> {
    pub title: Option<&'a str>,
    pub content: &'a str,
    pub user_id: i64,
    pub image: Option<&'a str>,
    pub category: Option<&'a str>,
    pub tags: Option<&'a str>,
    pub is_draft: bool,
}

/// Insert a post stamped with the store's clock and return its id.
pub fn create_post(conn: &Connection, post: &NewPost<'_>) -> Result<i64, rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT INTO posts (title, content, image, category, tags, is_draft, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            post.title,
            post.content,
            post.image,
            post.category,
            post.tags,
            post.is_draft,
            post.user_id
        ],
    );

    match inserted {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            tracing::info!(post_id = id, user_id = post.user_id, draft = post.is_draft, "Post created");
            Ok(id)
        }
        Err(e) => {
            tracing::error!(user_id = post.user_id, "Failed to insert post: {}", e);
            Err(e)
        }
    }
}

pub fn get_post(conn: &Connection, id: i64) -> Result<Option<Post>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM posts WHERE id = ?1", Post::COLUMNS),
        params![id],
        Post::from_row,
    )
    .optional()
}

/// All posts by one author, drafts included, newest first.
pub fn list_posts(conn: &Connection, author_id: i64) -> Result<Vec<Post>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        Post::COLUMNS
    ))?;
    let posts = stmt
        .query_map(params![author_id], Post::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Every non-draft post, newest first. This is the feed source.
pub fn list_published(conn: &Connection) -> Result<Vec<Post>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts WHERE is_draft = 0 ORDER BY created_at DESC, id DESC",
        Post::COLUMNS
    ))?;
    let posts = stmt
        .query_map([], Post::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Hard delete. Ownership is checked by the caller.
pub fn delete_post(conn: &Connection, id: i64) -> Result<bool, rusqlite::Error> {
    let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    if rows > 0 {
        tracing::info!(post_id = id, "Post deleted");
    }
    Ok(rows > 0)
}

pub fn like_count(conn: &Connection, post_id: i64) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
        params![post_id],
        |r| r.get(0),
    )
}

pub fn dislike_count(conn: &Connection, post_id: i64) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM dislikes WHERE post_id = ?1",
        params![post_id],
        |r| r.get(0),
    )
}

pub fn comment_count(conn: &Connection, post_id: i64) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post_id],
        |r| r.get(0),
    )
}

pub fn viewer_liked(conn: &Connection, user_id: i64, post_id: i64) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM likes WHERE user_id = ?1 AND post_id = ?2",
        params![user_id, post_id],
        |r| r.get(0),
    )
}

pub fn viewer_disliked(
    conn: &Connection,
    user_id: i64,
    post_id: i64,
) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM dislikes WHERE user_id = ?1 AND post_id = ?2",
        params![user_id, post_id],
        |r| r.get(0),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use rusqlite::{params, Connection};

    pub fn insert_user(conn: &Connection, first: &str, email: &str) -> i64 {
        conn.execute(
            "INSERT INTO users (email, password_hash, first_name, last_name) VALUES (?1, 'h', ?2, 'Test')",
            params![email, first],
        )
        .unwrap();
        conn.last_insert_rowid()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::insert_user;
    use super::*;
    use crate::db::test_pool;

    fn post<'a>(user_id: i64, content: &'a str, is_draft: bool) -> NewPost<'a> {
        NewPost {
            title: Some("Title"),
            content,
            user_id,
            is_draft,
            ..Default::default()
        }
    }

    #[test]
    fn create_and_fetch_post() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let ann = insert_user(&conn, "Ann", "ann@x.com");

        let id = create_post(
            &conn,
            &NewPost {
                title: Some("Hello"),
                content: "World",
                user_id: ann,
                image: Some("pic_1700000000.png"),
                category: Some("misc"),
                tags: Some("a,b"),
                is_draft: false,
            },
        )
        .unwrap();

        let stored = get_post(&conn, id).unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Hello"));
        assert_eq!(stored.content, "World");
        assert_eq!(stored.image.as_deref(), Some("pic_1700000000.png"));
        assert_eq!(stored.category.as_deref(), Some("misc"));
        assert_eq!(stored.tags.as_deref(), Some("a,b"));
        assert!(!stored.is_draft);
        assert_eq!(stored.user_id, ann);
    }

    #[test]
    fn create_post_for_missing_user_fails() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        assert!(create_post(&conn, &post(999, "orphan", false)).is_err());
        assert!(list_published(&conn).unwrap().is_empty());
    }

    #[test]
    fn published_listing_excludes_drafts_and_is_newest_first() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let ann = insert_user(&conn, "Ann", "ann@x.com");

        let first = create_post(&conn, &post(ann, "first", false)).unwrap();
        create_post(&conn, &post(ann, "draft", true)).unwrap();
        let third = create_post(&conn, &post(ann, "third", false)).unwrap();

        let ids: Vec<i64> = list_published(&conn).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![third, first]);

        let all = list_posts(&conn, ann).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, third);
    }

    #[test]
    fn delete_post_removes_row_and_cascades() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let ann = insert_user(&conn, "Ann", "ann@x.com");
        let id = create_post(&conn, &post(ann, "bye", false)).unwrap();
        add_comment(&conn, ann, id, "note").unwrap();

        assert!(delete_post(&conn, id).unwrap());
        assert!(get_post(&conn, id).unwrap().is_none());
        assert_eq!(comment_count(&conn, id).unwrap(), 0);
        assert!(!delete_post(&conn, id).unwrap());
    }
}
