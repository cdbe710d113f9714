//! End-to-end component scenarios against a file-backed database.
//!
//! Covers:
//! - Account uniqueness
//! - Friend request lifecycle and friendship edges
//! - Like/dislike mutual exclusion
//! - Draft filtering in the feed and in search
//! - User and post search

use rusqlite::Connection;
use tempfile::TempDir;

use socialite::accounts::{self, AccountError, NewUser};
use socialite::content::{self, NewPost, ReactionState};
use socialite::db::{self, models::RequestStatus};
use socialite::feed;
use socialite::social::{self, SendOutcome, SocialError};
use socialite::state::DbPool;

// Helper to create a migrated database in a temporary directory
fn create_test_db() -> (TempDir, DbPool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = db::create_pool(&temp_dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    (temp_dir, pool)
}

fn create_user(conn: &Connection, first: &str, last: &str, email: &str) -> i64 {
    accounts::create(
        conn,
        &NewUser {
            first_name: first,
            last_name: last,
            email,
            password_hash: "hash",
        },
    )
    .unwrap()
}

// ============================================================================
// ACCOUNTS
// ============================================================================

#[test]
fn test_email_is_unique() {
    let (_dir, pool) = create_test_db();
    let conn = pool.get().unwrap();

    create_user(&conn, "Ann", "Lee", "ann@x.com");
    let second = accounts::create(
        &conn,
        &NewUser {
            first_name: "Other",
            last_name: "Ann",
            email: "ann@x.com",
            password_hash: "hash",
        },
    );
    assert!(matches!(second, Err(AccountError::DuplicateEmail)));

    let found = accounts::find_by_email(&conn, "ann@x.com").unwrap().unwrap();
    assert_eq!(found.email, "ann@x.com");
    assert_eq!(found.first_name, "Ann");
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users WHERE email = 'ann@x.com'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

// ============================================================================
// SOCIAL GRAPH
// ============================================================================

#[test]
fn test_friend_request_accept_flow() {
    let (_dir, pool) = create_test_db();
    let mut conn = pool.get().unwrap();
    let ann = create_user(&conn, "Ann", "Lee", "ann@x.com");
    let bob = create_user(&conn, "Bob", "Ray", "bob@x.com");

    let SendOutcome::Sent(request_id) = social::send_request(&mut conn, ann, bob).unwrap() else {
        panic!("first request should be sent");
    };

    let pending = social::pending_received(&conn, bob).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request.sender_id, ann);
    assert_eq!(pending[0].counterpart_first_name, "Ann");

    let accepted = social::accept_request(&mut conn, request_id).unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);

    let ann_friends = social::friends_of(&conn, ann).unwrap();
    let bob_friends = social::friends_of(&conn, bob).unwrap();
    assert_eq!(ann_friends.iter().map(|u| u.id).collect::<Vec<_>>(), vec![bob]);
    assert_eq!(bob_friends.iter().map(|u| u.id).collect::<Vec<_>>(), vec![ann]);
    assert!(social::pending_received(&conn, bob).unwrap().is_empty());
}

#[test]
fn test_duplicate_request_creates_no_second_row() {
    let (_dir, pool) = create_test_db();
    let mut conn = pool.get().unwrap();
    let ann = create_user(&conn, "Ann", "Lee", "ann@x.com");
    let bob = create_user(&conn, "Bob", "Ray", "bob@x.com");

    assert!(matches!(social::send_request(&mut conn, ann, bob).unwrap(), SendOutcome::Sent(_)));
    assert_eq!(
        social::send_request(&mut conn, ann, bob).unwrap(),
        SendOutcome::AlreadyRequested
    );

    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2",
            rusqlite::params![ann, bob],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn test_reaccept_does_not_duplicate_friendships() {
    let (_dir, pool) = create_test_db();
    let mut conn = pool.get().unwrap();
    let ann = create_user(&conn, "Ann", "Lee", "ann@x.com");
    let bob = create_user(&conn, "Bob", "Ray", "bob@x.com");

    let SendOutcome::Sent(request_id) = social::send_request(&mut conn, ann, bob).unwrap() else {
        panic!("request should be sent");
    };
    social::accept_request(&mut conn, request_id).unwrap();

    let again = social::accept_request(&mut conn, request_id);
    assert!(matches!(
        again,
        Err(SocialError::AlreadyResponded(RequestStatus::Accepted))
    ));
    let reject_after = social::reject_request(&mut conn, request_id);
    assert!(matches!(reject_after, Err(SocialError::AlreadyResponded(_))));

    let edges: i64 = conn
        .query_row("SELECT COUNT(*) FROM friendships", [], |r| r.get(0))
        .unwrap();
    assert_eq!(edges, 2);
}

// ============================================================================
// REACTIONS
// ============================================================================

#[test]
fn test_like_then_dislike_is_mutually_exclusive() {
    let (_dir, pool) = create_test_db();
    let mut conn = pool.get().unwrap();
    let ann = create_user(&conn, "Ann", "Lee", "ann@x.com");
    let bob = create_user(&conn, "Bob", "Ray", "bob@x.com");
    let post = content::create_post(
        &conn,
        &NewPost {
            title: Some("Hello"),
            content: "World",
            user_id: ann,
            ..NewPost::default()
        },
    )
    .unwrap();

    assert_eq!(content::toggle_like(&mut conn, bob, post).unwrap(), ReactionState::Liked);
    assert_eq!(content::like_count(&conn, post).unwrap(), 1);
    assert_eq!(content::dislike_count(&conn, post).unwrap(), 0);

    assert_eq!(content::toggle_dislike(&mut conn, bob, post).unwrap(), ReactionState::Disliked);
    assert_eq!(content::like_count(&conn, post).unwrap(), 0);
    assert_eq!(content::dislike_count(&conn, post).unwrap(), 1);

    // Any further sequence keeps at most one reaction
    for step in 0..6 {
        if step % 3 == 0 {
            content::toggle_like(&mut conn, bob, post).unwrap();
        } else {
            content::toggle_dislike(&mut conn, bob, post).unwrap();
        }
        let liked = content::viewer_liked(&conn, bob, post).unwrap();
        let disliked = content::viewer_disliked(&conn, bob, post).unwrap();
        assert!(!(liked && disliked), "step {} left both reactions", step);
    }
}

// ============================================================================
// FEED & SEARCH
// ============================================================================

#[test]
fn test_feed_never_contains_drafts() {
    let (_dir, pool) = create_test_db();
    let conn = pool.get().unwrap();
    let ann = create_user(&conn, "Ann", "Lee", "ann@x.com");

    let published = content::create_post(
        &conn,
        &NewPost {
            content: "out in the open",
            user_id: ann,
            ..NewPost::default()
        },
    )
    .unwrap();
    content::create_post(
        &conn,
        &NewPost {
            content: "secret draft",
            user_id: ann,
            is_draft: true,
            ..NewPost::default()
        },
    )
    .unwrap();

    let feed = feed::build_feed(&conn, ann).unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].post.id, published);
    assert!(content::list_published(&conn).unwrap().iter().all(|p| !p.is_draft));
    assert!(feed::search_all(&conn, "secret").unwrap().posts.is_empty());
}

#[test]
fn test_search_finds_users_and_handles_no_match() {
    let (_dir, pool) = create_test_db();
    let conn = pool.get().unwrap();
    let ann = create_user(&conn, "Ann", "Lee", "ann@x.com");
    create_user(&conn, "Bob", "Ray", "bob@x.com");

    let results = feed::search_all(&conn, "ann").unwrap();
    assert_eq!(results.users.len(), 1);
    assert_eq!(results.users[0].id, ann);

    let none = feed::search_all(&conn, "xyz-no-match").unwrap();
    assert!(none.users.is_empty());
    assert!(none.posts.is_empty());
}
