use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{Comment, Reply};

pub fn add_comment(
    conn: &Connection,
    user_id: i64,
    post_id: i64,
    body: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO comments (user_id, post_id, body) VALUES (?1, ?2, ?3)",
        params![user_id, post_id, body],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_comment(conn: &Connection, id: i64) -> Result<Option<Comment>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM comments WHERE id = ?1", Comment::COLUMNS),
        params![id],
        Comment::from_row,
    )
    .optional()
}

/// Comments on a post, oldest first.
pub fn list_comments(conn: &Connection, post_id: i64) -> Result<Vec<Comment>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM comments WHERE post_id = ?1 ORDER BY created_at ASC, id ASC",
        Comment::COLUMNS
    ))?;
    let comments = stmt
        .query_map(params![post_id], Comment::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

/// Raw reply insert. `post_id` may be absent.
pub fn add_reply(
    conn: &Connection,
    user_id: i64,
    comment_id: i64,
    post_id: Option<i64>,
    body: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO replies (user_id, comment_id, post_id, body) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, comment_id, post_id, body],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Reply to a comment, attaching the reply to the comment's post.
/// Returns `None` when the comment does not exist.
pub fn reply_to_comment(
    conn: &Connection,
    user_id: i64,
    comment_id: i64,
    body: &str,
) -> Result<Option<i64>, rusqlite::Error> {
    let Some(comment) = get_comment(conn, comment_id)? else {
        return Ok(None);
    };
    add_reply(conn, user_id, comment_id, Some(comment.post_id), body).map(Some)
}

pub fn list_replies(conn: &Connection, comment_id: i64) -> Result<Vec<Reply>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM replies WHERE comment_id = ?1 ORDER BY created_at ASC, id ASC",
        Reply::COLUMNS
    ))?;
    let replies = stmt
        .query_map(params![comment_id], Reply::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(replies)
}

/// Like a comment. Liking twice is a no-op; there is no unlike.
/// Returns `None` when the comment does not exist, otherwise whether a new
/// like was recorded.
pub fn like_comment(
    conn: &Connection,
    user_id: i64,
    comment_id: i64,
) -> Result<Option<bool>, rusqlite::Error> {
    let Some(comment) = get_comment(conn, comment_id)? else {
        return Ok(None);
    };
    let rows = conn.execute(
        "INSERT OR IGNORE INTO comment_likes (user_id, post_id, comment_id) VALUES (?1, ?2, ?3)",
        params![user_id, comment.post_id, comment_id],
    )?;
    Ok(Some(rows > 0))
}

pub fn comment_like_count(conn: &Connection, comment_id: i64) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
        params![comment_id],
        |r| r.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::test_support::insert_user;
    use crate::content::{comment_count, create_post, NewPost};
    use crate::db::test_pool;

    fn setup(conn: &Connection) -> (i64, i64) {
        let ann = insert_user(conn, "Ann", "ann@x.com");
        let post = create_post(
            conn,
            &NewPost {
                content: "World",
                user_id: ann,
                ..Default::default()
            },
        )
        .unwrap();
        (ann, post)
    }

    #[test]
    fn comments_are_counted_and_listed_in_order() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let (ann, post) = setup(&conn);

        let first = add_comment(&conn, ann, post, "one").unwrap();
        let second = add_comment(&conn, ann, post, "two").unwrap();

        assert_eq!(comment_count(&conn, post).unwrap(), 2);
        let ids: Vec<i64> = list_comments(&conn, post).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn reply_resolves_post_from_comment() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let (ann, post) = setup(&conn);
        let comment = add_comment(&conn, ann, post, "question").unwrap();

        let reply_id = reply_to_comment(&conn, ann, comment, "answer").unwrap().unwrap();
        let replies = list_replies(&conn, comment).unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, reply_id);
        assert_eq!(replies[0].post_id, Some(post));
        assert_eq!(replies[0].body, "answer");
    }

    #[test]
    fn raw_reply_may_omit_post() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let (ann, post) = setup(&conn);
        let comment = add_comment(&conn, ann, post, "question").unwrap();

        add_reply(&conn, ann, comment, None, "loose").unwrap();
        assert_eq!(list_replies(&conn, comment).unwrap()[0].post_id, None);
    }

    #[test]
    fn reply_to_missing_comment_is_none() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let (ann, _) = setup(&conn);
        assert!(reply_to_comment(&conn, ann, 404, "hello?").unwrap().is_none());
    }

    #[test]
    fn comment_likes_are_idempotent() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let (ann, post) = setup(&conn);
        let comment = add_comment(&conn, ann, post, "nice").unwrap();

        assert_eq!(like_comment(&conn, ann, comment).unwrap(), Some(true));
        assert_eq!(like_comment(&conn, ann, comment).unwrap(), Some(false));
        assert_eq!(comment_like_count(&conn, comment).unwrap(), 1);
        assert_eq!(like_comment(&conn, ann, 404).unwrap(), None);
    }
}
