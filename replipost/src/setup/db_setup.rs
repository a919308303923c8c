use crate::helper::admin_helpers;
use crate::models::db_operations::posts_db_operations::{self, StoreError};
use redb::Database;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("Content store error: {0}")]
    Store(#[from] StoreError),
}

pub fn setup_users_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    log::info!("Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'editor', 'author')),
            is_active INTEGER NOT NULL DEFAULT 1,
            can_edit_posts INTEGER NOT NULL DEFAULT 0,
            last_login_time TEXT
        )",
        [],
    )?;

    log::info!("Creating 'settings' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    admin_helpers::seed_default_settings(&tx)?;

    tx.commit()?;
    Ok(())
}

pub fn setup_posts_db(db: &Database) -> Result<(), SetupError> {
    log::info!("Creating content tables in Redb...");
    posts_db_operations::ensure_tables(db)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::users_db_operations;

    #[test]
    fn users_setup_is_rerunnable_and_keeps_settings() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_users_db(&mut conn).unwrap();
        users_db_operations::update_setting(&conn, admin_helpers::TITLE_SUFFIX_KEY, "[dup]").unwrap();

        setup_users_db(&mut conn).unwrap();
        assert_eq!(
            users_db_operations::read_setting(&conn, admin_helpers::TITLE_SUFFIX_KEY).unwrap().as_deref(),
            Some("[dup]")
        );
        assert_eq!(
            users_db_operations::read_setting(&conn, admin_helpers::DEFAULT_STATUS_KEY).unwrap().as_deref(),
            Some("draft")
        );
    }

    #[test]
    fn posts_setup_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(dir.path().join("posts.db")).unwrap();
        setup_posts_db(&db).unwrap();
        setup_posts_db(&db).unwrap();
    }
}
