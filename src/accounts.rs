//! Account directory: user records, lookups and partial profile updates.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::db::models::User;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

pub struct NewUser<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

/// A partial set of profile fields. Only `Some` fields are written.
#[derive(Debug, Default, Clone)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub bio: Option<String>,
    pub links: Option<String>,
    /// `Some(None)` resets the picture to the default.
    pub profile_picture: Option<Option<String>>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    fn fields(&self) -> Vec<(&'static str, &dyn ToSql)> {
        let mut fields: Vec<(&'static str, &dyn ToSql)> = Vec::new();
        if let Some(v) = &self.first_name {
            fields.push(("first_name", v as &dyn ToSql));
        }
        if let Some(v) = &self.last_name {
            fields.push(("last_name", v as &dyn ToSql));
        }
        if let Some(v) = &self.email {
            fields.push(("email", v as &dyn ToSql));
        }
        if let Some(v) = &self.password_hash {
            fields.push(("password_hash", v as &dyn ToSql));
        }
        if let Some(v) = &self.bio {
            fields.push(("bio", v as &dyn ToSql));
        }
        if let Some(v) = &self.links {
            fields.push(("links", v as &dyn ToSql));
        }
        if let Some(v) = &self.profile_picture {
            fields.push(("profile_picture", v as &dyn ToSql));
        }
        fields
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Insert a new user and return its id.
pub fn create(conn: &Connection, user: &NewUser<'_>) -> Result<i64, AccountError> {
    if find_by_email(conn, user.email)?.is_some() {
        return Err(AccountError::DuplicateEmail);
    }

    let inserted = conn.execute(
        "INSERT INTO users (first_name, last_name, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
        params![user.first_name, user.last_name, user.email, user.password_hash],
    );
    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        // Lost a race with a concurrent sign-up.
        Err(e) if is_unique_violation(&e) => Err(AccountError::DuplicateEmail),
        Err(e) => Err(e.into()),
    }
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE email = ?1", User::COLUMNS),
        params![email],
        User::from_row,
    )
    .optional()
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS),
        params![id],
        User::from_row,
    )
    .optional()
}

/// Apply a partial update. Returns the number of rows touched (0 when the
/// update is empty or the user does not exist).
pub fn update(conn: &Connection, id: i64, changes: &UserUpdate) -> Result<usize, AccountError> {
    let fields = changes.fields();
    if fields.is_empty() {
        return Ok(0);
    }

    let assignments: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
        .collect();
    let mut values: Vec<&dyn ToSql> = fields.iter().map(|(_, value)| *value).collect();
    values.push(&id);

    let sql = format!(
        "UPDATE users SET {} WHERE id = ?{}",
        assignments.join(", "),
        values.len()
    );
    match conn.execute(&sql, values.as_slice()) {
        Ok(rows) => Ok(rows),
        Err(e) if is_unique_violation(&e) => Err(AccountError::DuplicateEmail),
        Err(e) => Err(e.into()),
    }
}

/// Every user, ordered by name.
pub fn list_all(conn: &Connection) -> Result<Vec<User>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY first_name, last_name",
        User::COLUMNS
    ))?;
    let users = stmt
        .query_map([], User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn ann() -> NewUser<'static> {
        NewUser {
            first_name: "Ann",
            last_name: "Lee",
            email: "ann@x.com",
            password_hash: "hash",
        }
    }

    #[test]
    fn create_then_lookup_by_email() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let id = create(&conn, &ann()).unwrap();

        let user = find_by_email(&conn, "ann@x.com").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.full_name(), "Ann Lee");
        assert!(user.profile_picture.is_none());
        assert!(!user.date_joined.is_empty());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        create(&conn, &ann()).unwrap();

        let err = create(&conn, &ann()).unwrap_err();
        assert!(matches!(err, AccountError::DuplicateEmail));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users WHERE email = 'ann@x.com'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn find_missing_user_returns_none() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        assert!(find_by_id(&conn, 42).unwrap().is_none());
        assert!(find_by_email(&conn, "nobody@x.com").unwrap().is_none());
    }

    #[test]
    fn update_only_touches_provided_fields() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let id = create(&conn, &ann()).unwrap();

        let changes = UserUpdate {
            bio: Some("hello".into()),
            profile_picture: Some(Some("me.png".into())),
            ..Default::default()
        };
        assert_eq!(update(&conn, id, &changes).unwrap(), 1);

        let user = find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(user.bio.as_deref(), Some("hello"));
        assert_eq!(user.profile_picture.as_deref(), Some("me.png"));
        assert_eq!(user.first_name, "Ann");
        assert_eq!(user.email, "ann@x.com");

        let reset = UserUpdate {
            profile_picture: Some(None),
            ..Default::default()
        };
        update(&conn, id, &reset).unwrap();
        assert!(find_by_id(&conn, id).unwrap().unwrap().profile_picture.is_none());
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let id = create(&conn, &ann()).unwrap();
        assert!(UserUpdate::default().is_empty());
        assert_eq!(update(&conn, id, &UserUpdate::default()).unwrap(), 0);
    }

    #[test]
    fn update_to_taken_email_is_duplicate() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        create(&conn, &ann()).unwrap();
        let bob = create(
            &conn,
            &NewUser {
                first_name: "Bob",
                last_name: "Ray",
                email: "bob@x.com",
                password_hash: "hash",
            },
        )
        .unwrap();

        let changes = UserUpdate {
            email: Some("ann@x.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            update(&conn, bob, &changes),
            Err(AccountError::DuplicateEmail)
        ));
    }

    #[test]
    fn list_all_orders_by_name() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        for (first, email) in [("Zed", "z@x.com"), ("Amy", "a@x.com")] {
            create(
                &conn,
                &NewUser {
                    first_name: first,
                    last_name: "Q",
                    email,
                    password_hash: "h",
                },
            )
            .unwrap();
        }
        let names: Vec<String> = list_all(&conn)
            .unwrap()
            .into_iter()
            .map(|u| u.first_name)
            .collect();
        assert_eq!(names, vec!["Amy", "Zed"]);
    }
}
