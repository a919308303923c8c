use crate::models::User;
use bcrypt::{hash, verify, BcryptError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Error as RusqliteError, Row};

pub const ROLES: [&str; 3] = ["admin", "editor", "author"];

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role: row.get(2)?,
        is_active: row.get(3)?,
        can_edit_posts: row.get(4)?,
        last_login_time: row.get(5)?,
    })
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    password: &str,
    role: &str,
    can_edit_posts: bool,
) -> Result<(), RusqliteError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "INSERT INTO users (username, password_hash, role, can_edit_posts) VALUES (?1, ?2, ?3, ?4)",
        params![username, hashed_password, role, can_edit_posts],
    )?;
    Ok(())
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<User>, RusqliteError> {
    let mut stmt = conn.prepare("SELECT id, username, role, is_active, can_edit_posts, last_login_time FROM users ORDER BY id")?;
    let user_iter = stmt.query_map([], user_from_row)?;
    user_iter.collect()
}

pub fn read_user_by_username(conn: &Connection, username: &str) -> Option<User> {
    conn.query_row(
        "SELECT id, username, role, is_active, can_edit_posts, last_login_time FROM users WHERE username = ?1",
        [username],
        user_from_row,
    ).ok()
}

pub fn change_password(conn: &Connection, username: &str, new_password: &str) -> Result<usize, RusqliteError> {
    let hashed_password = hash(new_password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE username = ?2",
        params![hashed_password, username],
    )
}

/// Returns `(username, role)` for an active user whose password matches.
pub fn verify_credentials(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Option<(String, String)> {
    let res: rusqlite::Result<(String, String, bool)> = conn.query_row(
        "SELECT password_hash, role, is_active FROM users WHERE username = ?1",
        [username],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    );

    if let Ok((hash, role, is_active)) = res {
        if is_active && verify(password, &hash).unwrap_or(false) {
            return Some((username.to_string(), role));
        }
    }
    None
}

pub fn update_last_login_time(conn: &Connection, username: &str) -> Result<(), RusqliteError> {
    let now = Utc::now().to_rfc3339();
    conn.execute("UPDATE users SET last_login_time = ?1 WHERE username = ?2", params![now, username])?;
    Ok(())
}

/// `Ok(None)` only when the key is absent; read failures are returned as errors.
pub fn read_setting(conn: &Connection, key: &str) -> Result<Option<String>, RusqliteError> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()
}

pub fn update_setting(conn: &Connection, key: &str, value: &str) -> Result<(), RusqliteError> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

pub fn delete_setting(conn: &Connection, key: &str) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM settings WHERE key = ?1", [key])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::db_setup;

    fn open() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_users_db(&mut conn).unwrap();
        conn
    }

    #[test]
    fn credentials_and_roles() {
        let conn = open();
        create_user(&conn, "ada", "s3cret", "editor", true).unwrap();

        assert_eq!(verify_credentials(&conn, "ada", "s3cret"), Some(("ada".to_string(), "editor".to_string())));
        assert_eq!(verify_credentials(&conn, "ada", "wrong"), None);
        assert_eq!(verify_credentials(&conn, "nobody", "s3cret"), None);

        let ada = read_user_by_username(&conn, "ada").unwrap();
        assert!(ada.can_edit_posts);
        assert!(ada.last_login_time.is_none());

        update_last_login_time(&conn, "ada").unwrap();
        assert!(read_user_by_username(&conn, "ada").unwrap().last_login_time.is_some());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let conn = open();
        assert!(create_user(&conn, "eve", "pw", "superuser", false).is_err());
    }

    #[test]
    fn inactive_users_cannot_log_in() {
        let conn = open();
        create_user(&conn, "bob", "pw", "author", false).unwrap();
        conn.execute("UPDATE users SET is_active = 0 WHERE username = 'bob'", []).unwrap();
        assert_eq!(verify_credentials(&conn, "bob", "pw"), None);
    }

    #[test]
    fn settings_upsert_and_delete() {
        let conn = open();
        update_setting(&conn, "k", "one").unwrap();
        update_setting(&conn, "k", "two").unwrap();
        assert_eq!(read_setting(&conn, "k").unwrap().as_deref(), Some("two"));
        assert_eq!(delete_setting(&conn, "k").unwrap(), 1);
        assert_eq!(read_setting(&conn, "k").unwrap(), None);
    }

    #[test]
    fn settings_read_failure_is_an_error() {
        let conn = open();
        conn.execute("DROP TABLE settings", []).unwrap();
        assert!(read_setting(&conn, "k").is_err());
    }
}
