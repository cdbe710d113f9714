//! Like/dislike toggling. A viewer holds at most one reaction per post;
//! each toggle runs in a single immediate transaction so the delete of the
//! opposite reaction and the insert of the new one land together.

use rusqlite::{params, Connection, TransactionBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    fn table(self) -> &'static str {
        match self {
            ReactionKind::Like => "likes",
            ReactionKind::Dislike => "dislikes",
        }
    }

    fn opposite(self) -> Self {
        match self {
            ReactionKind::Like => ReactionKind::Dislike,
            ReactionKind::Dislike => ReactionKind::Like,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionState {
    None,
    Liked,
    Disliked,
}

impl ReactionState {
    fn holding(kind: ReactionKind) -> Self {
        match kind {
            ReactionKind::Like => ReactionState::Liked,
            ReactionKind::Dislike => ReactionState::Disliked,
        }
    }

    /// Pure transition: where a `kind` action leads from this state.
    pub fn after(self, kind: ReactionKind) -> Self {
        if self == Self::holding(kind) {
            ReactionState::None
        } else {
            Self::holding(kind)
        }
    }
}

fn holds(conn: &Connection, kind: ReactionKind, user_id: i64, post_id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!(
            "SELECT COUNT(*) > 0 FROM {} WHERE user_id = ?1 AND post_id = ?2",
            kind.table()
        ),
        params![user_id, post_id],
        |r| r.get(0),
    )
}

fn remove(conn: &Connection, kind: ReactionKind, user_id: i64, post_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE user_id = ?1 AND post_id = ?2", kind.table()),
        params![user_id, post_id],
    )?;
    Ok(())
}

fn insert(conn: &Connection, kind: ReactionKind, user_id: i64, post_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {} (user_id, post_id) VALUES (?1, ?2)",
            kind.table()
        ),
        params![user_id, post_id],
    )?;
    Ok(())
}

/// Current reaction of `user_id` on `post_id`.
pub fn reaction_state(conn: &Connection, user_id: i64, post_id: i64) -> rusqlite::Result<ReactionState> {
    if holds(conn, ReactionKind::Like, user_id, post_id)? {
        Ok(ReactionState::Liked)
    } else if holds(conn, ReactionKind::Dislike, user_id, post_id)? {
        Ok(ReactionState::Disliked)
    } else {
        Ok(ReactionState::None)
    }
}

/// Apply a like or dislike action and return the resulting state.
pub fn toggle(
    conn: &mut Connection,
    user_id: i64,
    post_id: i64,
    kind: ReactionKind,
) -> rusqlite::Result<ReactionState> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = reaction_state(&tx, user_id, post_id)?;
    let next = current.after(kind);

    if next == ReactionState::None {
        remove(&tx, kind, user_id, post_id)?;
    } else {
        remove(&tx, kind.opposite(), user_id, post_id)?;
        insert(&tx, kind, user_id, post_id)?;
    }

    tx.commit()?;
    tracing::debug!(user_id, post_id, ?current, ?next, "Reaction toggled");
    Ok(next)
}

pub fn toggle_like(conn: &mut Connection, user_id: i64, post_id: i64) -> rusqlite::Result<ReactionState> {
    toggle(conn, user_id, post_id, ReactionKind::Like)
}

pub fn toggle_dislike(
    conn: &mut Connection,
    user_id: i64,
    post_id: i64,
) -> rusqlite::Result<ReactionState> {
    toggle(conn, user_id, post_id, ReactionKind::Dislike)
}
