//! Social graph: the friend-request lifecycle and the friendship edges it
//! produces.
//!
//! A request moves `pending -> accepted` or `pending -> rejected` and never
//! leaves a terminal state. Friendships are stored as two directed rows
//! (A -> B and B -> A) so "friends of X" is a one-sided lookup.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::db::models::{FriendRequest, FriendRequestView, Friendship, RequestStatus, User};

#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("Friend request not found")]
    NotFound,

    #[error("Friend request already {0}")]
    AlreadyResponded(RequestStatus),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(i64),
    /// A row already exists for this (sender, receiver) pair.
    AlreadyRequested,
}

pub fn get_request(conn: &Connection, id: i64) -> Result<Option<FriendRequest>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM friend_requests WHERE id = ?1", FriendRequest::COLUMNS),
        params![id],
        FriendRequest::from_row,
    )
    .optional()
}

/// Send a friend request. Only the (sender, receiver) direction is checked,
/// so A may still request B while B's request to A is outstanding.
pub fn send_request(
    conn: &mut Connection,
    sender_id: i64,
    receiver_id: i64,
) -> Result<SendOutcome, rusqlite::Error> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2",
            params![sender_id, receiver_id],
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(SendOutcome::AlreadyRequested);
    }

    let rows = tx.execute(
        "INSERT OR IGNORE INTO friend_requests (sender_id, receiver_id, status)
         VALUES (?1, ?2, ?3)",
        params![sender_id, receiver_id, RequestStatus::Pending],
    )?;
    if rows == 0 {
        return Ok(SendOutcome::AlreadyRequested);
    }
    let id = tx.last_insert_rowid();
    tx.commit()?;

    tracing::info!(request_id = id, sender_id, receiver_id, "Friend request sent");
    Ok(SendOutcome::Sent(id))
}

/// Accept a pending request and materialise both friendship edges.
pub fn accept_request(conn: &mut Connection, request_id: i64) -> Result<FriendRequest, SocialError> {
    respond(conn, request_id, RequestStatus::Accepted)
}

/// Reject a pending request. No friendship is created.
pub fn reject_request(conn: &mut Connection, request_id: i64) -> Result<FriendRequest, SocialError> {
    respond(conn, request_id, RequestStatus::Rejected)
}

fn respond(
    conn: &mut Connection,
    request_id: i64,
    outcome: RequestStatus,
) -> Result<FriendRequest, SocialError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let request = get_request(&tx, request_id)?.ok_or(SocialError::NotFound)?;
    if request.status != RequestStatus::Pending {
        return Err(SocialError::AlreadyResponded(request.status));
    }

    tx.execute(
        "UPDATE friend_requests SET status = ?1, date_responded = datetime('now') WHERE id = ?2",
        params![outcome, request_id],
    )?;

    if outcome == RequestStatus::Accepted {
        for (a, b) in [
            (request.sender_id, request.receiver_id),
            (request.receiver_id, request.sender_id),
        ] {
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user1_id, user2_id) VALUES (?1, ?2)",
                params![a, b],
            )?;
        }
    }

    let updated = get_request(&tx, request_id)?.ok_or(SocialError::NotFound)?;
    tx.commit()?;

    tracing::info!(
        request_id,
        sender_id = updated.sender_id,
        receiver_id = updated.receiver_id,
        status = %updated.status,
        "Friend request answered"
    );
    Ok(updated)
}

fn requests_view(
    conn: &Connection,
    sql: &str,
    user_id: i64,
) -> Result<Vec<FriendRequestView>, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(FriendRequestView {
                request: FriendRequest::from_row(row)?,
                counterpart_first_name: row.get(6)?,
                counterpart_last_name: row.get(7)?,
                counterpart_email: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Pending requests addressed to `user_id`, joined with each sender.
pub fn pending_received(conn: &Connection, user_id: i64) -> Result<Vec<FriendRequestView>, rusqlite::Error> {
    requests_view(
        conn,
        "SELECT fr.id, fr.sender_id, fr.receiver_id, fr.status, fr.date_sent, fr.date_responded,
                u.first_name, u.last_name, u.email
         FROM friend_requests fr
         JOIN users u ON u.id = fr.sender_id
         WHERE fr.receiver_id = ?1 AND fr.status = 'pending'
         ORDER BY fr.date_sent DESC, fr.id DESC",
        user_id,
    )
}

/// Pending requests sent by `user_id`, joined with each receiver.
pub fn pending_sent(conn: &Connection, user_id: i64) -> Result<Vec<FriendRequestView>, rusqlite::Error> {
    requests_view(
        conn,
        "SELECT fr.id, fr.sender_id, fr.receiver_id, fr.status, fr.date_sent, fr.date_responded,
                u.first_name, u.last_name, u.email
         FROM friend_requests fr
         JOIN users u ON u.id = fr.receiver_id
         WHERE fr.sender_id = ?1 AND fr.status = 'pending'
         ORDER BY fr.date_sent DESC, fr.id DESC",
        user_id,
    )
}

/// Users on the far end of `user_id`'s outgoing edges, ordered by name.
pub fn friends_of(conn: &Connection, user_id: i64) -> Result<Vec<User>, rusqlite::Error> {
    let columns: Vec<String> = User::COLUMNS
        .split(", ")
        .map(|c| format!("u.{}", c.trim()))
        .collect();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users u
         JOIN friendships f ON u.id = f.user2_id
         WHERE f.user1_id = ?1
         ORDER BY u.first_name, u.last_name",
        columns.join(", ")
    ))?;
    let friends = stmt
        .query_map(params![user_id], User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(friends)
}

/// The directed edge `from -> to`, if present.
pub fn friendship(conn: &Connection, from: i64, to: i64) -> Result<Option<Friendship>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, user1_id, user2_id, date_created FROM friendships
         WHERE user1_id = ?1 AND user2_id = ?2",
        params![from, to],
        |row| {
            Ok(Friendship {
                id: row.get(0)?,
                user1_id: row.get(1)?,
                user2_id: row.get(2)?,
                date_created: row.get(3)?,
            })
        },
    )
    .optional()
}

/// Existence check on the directed edge `a -> b`.
pub fn are_friends(conn: &Connection, a: i64, b: i64) -> Result<bool, rusqlite::Error> {
    Ok(friendship(conn, a, b)?.is_some())
}
