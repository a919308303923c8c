use crate::helper::sanitization_helpers::{sanitize_key, sanitize_text_field};
use crate::models::content_types::ContentTypeRegistry;
use crate::models::db_operations::users_db_operations;
use crate::models::{DuplicationSettings, PostStatus, User};
use crate::DbPool;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use thiserror::Error;

pub const POST_TYPES_KEY: &str = "duplicate_post_types";
pub const TITLE_SUFFIX_KEY: &str = "duplicate_title_suffix";
pub const DEFAULT_STATUS_KEY: &str = "duplicate_default_status";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection<SqliteConnectionManager>, SettingsError> {
    pool.get().map_err(SettingsError::Pool)
}

/// Looks the session user up again so role and capability changes apply immediately.
pub fn current_user(pool: &DbPool, username: &str) -> Result<Option<User>, SettingsError> {
    let conn = get_conn(pool)?;
    Ok(users_db_operations::read_user_by_username(&conn, username))
}

/// Raw values of the settings form, before any validation.
#[derive(Debug, Default, Clone)]
pub struct DuplicationSettingsInput {
    pub post_types: Vec<String>,
    pub title_suffix: Option<String>,
    pub default_status: Option<String>,
}

fn retain_public_types<I>(candidates: I, registry: &ContentTypeRegistry) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut kept: Vec<String> = Vec::new();
    for name in candidates {
        if registry.is_public(&name) && !kept.contains(&name) {
            kept.push(name);
        }
    }
    if kept.is_empty() {
        DuplicationSettings::default_post_types()
    } else {
        kept
    }
}

fn is_valid_suffix(suffix: &str) -> bool {
    !suffix.trim().is_empty() && suffix.chars().count() <= DuplicationSettings::MAX_SUFFIX_CHARS
}

/// Reads the stored settings. Each value falls back on its own when missing or invalid;
/// a failed read is an error so a broken database never widens the eligible types.
pub fn load_duplication_settings(
    conn: &Connection,
    registry: &ContentTypeRegistry,
) -> Result<DuplicationSettings, SettingsError> {
    let stored_types = users_db_operations::read_setting(conn, POST_TYPES_KEY)?
        .and_then(|raw| match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(types) => Some(types),
            Err(e) => {
                log::warn!("Ignoring malformed '{}' setting: {}", POST_TYPES_KEY, e);
                None
            }
        })
        .unwrap_or_default();

    let title_suffix = users_db_operations::read_setting(conn, TITLE_SUFFIX_KEY)?
        .filter(|suffix| is_valid_suffix(suffix))
        .unwrap_or_else(|| DuplicationSettings::DEFAULT_TITLE_SUFFIX.to_string());

    let default_status = users_db_operations::read_setting(conn, DEFAULT_STATUS_KEY)?
        .and_then(|raw| raw.parse::<PostStatus>().ok())
        .unwrap_or(DuplicationSettings::DEFAULT_STATUS);

    Ok(DuplicationSettings {
        post_types: retain_public_types(stored_types, registry),
        title_suffix,
        default_status,
    })
}

/// Applies the save-time rules to a submitted form.
pub fn sanitize_duplication_settings(
    input: &DuplicationSettingsInput,
    registry: &ContentTypeRegistry,
) -> DuplicationSettings {
    let post_types = retain_public_types(input.post_types.iter().map(|name| sanitize_key(name)), registry);

    let title_suffix = input
        .title_suffix
        .as_deref()
        .map(sanitize_text_field)
        .filter(|suffix| !suffix.is_empty())
        .map(|suffix| suffix.chars().take(DuplicationSettings::MAX_SUFFIX_CHARS).collect::<String>().trim_end().to_string())
        .unwrap_or_else(|| DuplicationSettings::DEFAULT_TITLE_SUFFIX.to_string());

    let default_status = input
        .default_status
        .as_deref()
        .and_then(|raw| sanitize_key(raw).parse::<PostStatus>().ok())
        .unwrap_or(DuplicationSettings::DEFAULT_STATUS);

    DuplicationSettings { post_types, title_suffix, default_status }
}

pub fn save_duplication_settings(conn: &mut Connection, settings: &DuplicationSettings) -> Result<(), SettingsError> {
    let post_types = serde_json::to_string(&settings.post_types)?;
    let tx = conn.transaction()?;
    users_db_operations::update_setting(&tx, POST_TYPES_KEY, &post_types)?;
    users_db_operations::update_setting(&tx, TITLE_SUFFIX_KEY, &settings.title_suffix)?;
    users_db_operations::update_setting(&tx, DEFAULT_STATUS_KEY, settings.default_status.as_str())?;
    tx.commit()?;
    log::info!(
        "Duplication settings saved: types={:?} suffix='{}' status={}",
        settings.post_types, settings.title_suffix, settings.default_status
    );
    Ok(())
}

/// Writes the defaults for keys that are not set yet.
pub fn seed_default_settings(conn: &Connection) -> rusqlite::Result<()> {
    let defaults = DuplicationSettings::default();
    let post_types = serde_json::to_string(&defaults.post_types)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    for (key, value) in [
        (POST_TYPES_KEY, post_types.as_str()),
        (TITLE_SUFFIX_KEY, defaults.title_suffix.as_str()),
        (DEFAULT_STATUS_KEY, defaults.default_status.as_str()),
    ] {
        conn.execute("INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)", [key, value])?;
    }
    Ok(())
}

/// Removes the stored settings; readers see the defaults afterwards.
pub fn reset_duplication_settings(conn: &Connection) -> rusqlite::Result<usize> {
    let mut removed = 0;
    for key in [POST_TYPES_KEY, TITLE_SUFFIX_KEY, DEFAULT_STATUS_KEY] {
        removed += users_db_operations::delete_setting(conn, key)?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentTypeConfig, TaxonomyConfig};
    use crate::setup::db_setup;

    fn open() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        db_setup::setup_users_db(&mut conn).unwrap();
        conn
    }

    fn registry_with_book() -> ContentTypeRegistry {
        let mut types = ContentTypeRegistry::default().types().to_vec();
        types.push(ContentTypeConfig {
            name: "book".to_string(),
            label: "Books".to_string(),
            public: true,
            taxonomies: vec![],
        });
        ContentTypeRegistry::new(types, Vec::<TaxonomyConfig>::new())
    }

    #[test]
    fn seeded_settings_are_the_defaults() {
        let conn = open();
        assert_eq!(load_duplication_settings(&conn, &ContentTypeRegistry::default()).unwrap(), DuplicationSettings::default());
    }

    #[test]
    fn empty_suffix_saves_default() {
        let mut conn = open();
        let registry = ContentTypeRegistry::default();
        let input = DuplicationSettingsInput {
            post_types: vec!["post".to_string()],
            title_suffix: Some("   ".to_string()),
            default_status: Some("pending".to_string()),
        };
        save_duplication_settings(&mut conn, &sanitize_duplication_settings(&input, &registry)).unwrap();

        let loaded = load_duplication_settings(&conn, &registry).unwrap();
        assert_eq!(loaded.title_suffix, "(Copy)");
        assert_eq!(loaded.default_status, PostStatus::Pending);
        assert_eq!(loaded.post_types, vec!["post"]);
    }

    #[test]
    fn unknown_status_saves_draft() {
        let mut conn = open();
        let registry = ContentTypeRegistry::default();
        let input = DuplicationSettingsInput {
            post_types: vec!["page".to_string()],
            title_suffix: Some("<b>dup</b>".to_string()),
            default_status: Some("archived".to_string()),
        };
        save_duplication_settings(&mut conn, &sanitize_duplication_settings(&input, &registry)).unwrap();

        assert_eq!(users_db_operations::read_setting(&conn, DEFAULT_STATUS_KEY).unwrap().as_deref(), Some("draft"));
        assert_eq!(users_db_operations::read_setting(&conn, TITLE_SUFFIX_KEY).unwrap().as_deref(), Some("dup"));
    }

    #[test]
    fn types_are_sanitized_and_filtered() {
        let registry = registry_with_book();
        let input = DuplicationSettingsInput {
            post_types: vec!["Book".into(), "revision".into(), "nope".into(), "page".into(), "book".into()],
            ..Default::default()
        };
        let settings = sanitize_duplication_settings(&input, &registry);
        assert_eq!(settings.post_types, vec!["book", "page"]);
        assert_eq!(settings.title_suffix, "(Copy)");
        assert_eq!(settings.default_status, PostStatus::Draft);

        let only_private = DuplicationSettingsInput { post_types: vec!["revision".into()], ..Default::default() };
        assert_eq!(sanitize_duplication_settings(&only_private, &registry).post_types, vec!["post", "page"]);
    }

    #[test]
    fn long_suffix_is_truncated() {
        let input = DuplicationSettingsInput { title_suffix: Some("é".repeat(60)), ..Default::default() };
        let settings = sanitize_duplication_settings(&input, &ContentTypeRegistry::default());
        assert_eq!(settings.title_suffix.chars().count(), 50);
    }

    #[test]
    fn invalid_stored_values_fall_back_independently() {
        let conn = open();
        users_db_operations::update_setting(&conn, POST_TYPES_KEY, "not json").unwrap();
        users_db_operations::update_setting(&conn, TITLE_SUFFIX_KEY, &"x".repeat(51)).unwrap();
        users_db_operations::update_setting(&conn, DEFAULT_STATUS_KEY, "private").unwrap();

        let loaded = load_duplication_settings(&conn, &ContentTypeRegistry::default()).unwrap();
        assert_eq!(loaded.post_types, vec!["post", "page"]);
        assert_eq!(loaded.title_suffix, "(Copy)");
        assert_eq!(loaded.default_status, PostStatus::Private);
    }

    #[test]
    fn reset_removes_every_key() {
        let conn = open();
        assert_eq!(reset_duplication_settings(&conn).unwrap(), 3);
        assert_eq!(users_db_operations::read_setting(&conn, POST_TYPES_KEY).unwrap(), None);
        assert_eq!(load_duplication_settings(&conn, &ContentTypeRegistry::default()).unwrap(), DuplicationSettings::default());
    }

    #[test]
    fn truncated_suffix_has_no_trailing_space() {
        let suffix = format!("{} tail", "a".repeat(49));
        let input = DuplicationSettingsInput { title_suffix: Some(suffix), ..Default::default() };
        let settings = sanitize_duplication_settings(&input, &ContentTypeRegistry::default());
        assert_eq!(settings.title_suffix, "a".repeat(49));
    }

    #[test]
    fn unreadable_settings_do_not_fall_back() {
        let mut conn = open();
        let registry = ContentTypeRegistry::default();
        let input = DuplicationSettingsInput { post_types: vec!["post".to_string()], ..Default::default() };
        save_duplication_settings(&mut conn, &sanitize_duplication_settings(&input, &registry)).unwrap();

        conn.execute("DROP TABLE settings", []).unwrap();
        assert!(matches!(load_duplication_settings(&conn, &registry), Err(SettingsError::Database(_))));
    }
}
