use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub links: Option<String>,
    pub date_joined: String,
}

impl User {
    pub(crate) const COLUMNS: &'static str = "id, email, password_hash, first_name, last_name, \
         profile_picture, bio, links, date_joined";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            profile_picture: row.get(5)?,
            bio: row.get(6)?,
            links: row.get(7)?,
            date_joined: row.get(8)?,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: Option<String>,
    pub content: String,
    pub image: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub is_draft: bool,
    pub created_at: String,
    pub user_id: i64,
}

impl Post {
    pub(crate) const COLUMNS: &'static str =
        "id, title, content, image, category, tags, is_draft, created_at, user_id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            image: row.get(3)?,
            category: row.get(4)?,
            tags: row.get(5)?,
            is_draft: row.get(6)?,
            created_at: row.get(7)?,
            user_id: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub body: String,
    pub created_at: String,
}

impl Comment {
    pub(crate) const COLUMNS: &'static str = "id, user_id, post_id, body, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            post_id: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: i64,
    pub user_id: i64,
    pub comment_id: i64,
    pub post_id: Option<i64>,
    pub body: String,
    pub created_at: String,
}

impl Reply {
    pub(crate) const COLUMNS: &'static str = "id, user_id, comment_id, post_id, body, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            comment_id: row.get(2)?,
            post_id: row.get(3)?,
            body: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql for RequestStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(FromSqlError::Other(
                format!("unknown friend request status: {}", other).into(),
            )),
        }
    }
}

impl ToSql for RequestStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub status: RequestStatus,
    pub date_sent: String,
    pub date_responded: Option<String>,
}

impl FriendRequest {
    pub(crate) const COLUMNS: &'static str =
        "id, sender_id, receiver_id, status, date_sent, date_responded";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            status: row.get(3)?,
            date_sent: row.get(4)?,
            date_responded: row.get(5)?,
        })
    }
}

/// A friend request joined with the profile of the other party
/// (the sender for received requests, the receiver for sent ones).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequestView {
    pub request: FriendRequest,
    pub counterpart_first_name: String,
    pub counterpart_last_name: String,
    pub counterpart_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friendship {
    pub id: i64,
    pub user1_id: i64,
    pub user2_id: i64,
    pub date_created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub category: String,
    pub message: String,
}
