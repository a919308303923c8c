use crate::duplicator::{DuplicateError, Duplicator};
use crate::helper::nonce_helpers::{NonceStore, DUPLICATE_ACTION};
use crate::models::db_operations::posts_db_operations::ContentStore;
use crate::models::{DuplicationSettings, User};

/// Whether the list view should offer the duplicate action for `post_type`.
pub fn can_duplicate_type(user: &User, settings: &DuplicationSettings, post_type: &str) -> bool {
    user.has_edit_capability() && settings.is_eligible(post_type)
}

/// The row-level link: capability, then the one-time nonce, then the post parameter.
pub fn duplicate_from_link<S: ContentStore + ?Sized>(
    duplicator: &Duplicator,
    store: &S,
    nonces: &NonceStore,
    settings: &DuplicationSettings,
    user: &User,
    post: Option<&str>,
    nonce: Option<&str>,
) -> Result<String, DuplicateError> {
    if !user.has_edit_capability() {
        return Err(DuplicateError::PermissionDenied);
    }
    let post_id = post.map(str::trim).filter(|id| !id.is_empty());
    let nonce = nonce.ok_or(DuplicateError::SecurityCheckFailed)?;
    if !nonces.verify_and_consume(nonce, &user.username, DUPLICATE_ACTION, post_id) {
        log::warn!(
            "Rejected duplicate link for {} by '{}': bad or reused nonce",
            post_id.unwrap_or("<none>"),
            user.username
        );
        return Err(DuplicateError::SecurityCheckFailed);
    }
    let post_id = post_id.ok_or(DuplicateError::MissingPost)?;
    duplicator.duplicate(store, post_id, settings)
}

/// The bulk action over the selected rows.
pub fn duplicate_selection<S: ContentStore + ?Sized>(
    duplicator: &Duplicator,
    store: &S,
    settings: &DuplicationSettings,
    user: &User,
    post_ids: &[String],
) -> Result<usize, DuplicateError> {
    if !user.has_edit_capability() {
        return Err(DuplicateError::PermissionDenied);
    }
    Ok(duplicator.duplicate_many(store, post_ids, settings))
}

/// The success notice after a bulk run; nothing is shown when no copy was made.
pub fn bulk_notice(count: usize) -> Option<String> {
    match count {
        0 => None,
        1 => Some("1 item duplicated successfully.".to_string()),
        n => Some(format!("{} items duplicated successfully.", n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{open_store, sample_post, seed_rich_post};
    use std::time::Duration;

    fn user(role: &str, can_edit_posts: bool) -> User {
        User {
            id: 1,
            username: "ada".to_string(),
            role: role.to_string(),
            is_active: true,
            can_edit_posts,
            last_login_time: None,
        }
    }

    #[test]
    fn link_checks_run_in_order() {
        let (_dir, store) = open_store();
        let id = seed_rich_post(&store);
        let nonces = NonceStore::new(Duration::from_secs(60));
        let settings = DuplicationSettings::default();
        let duplicator = Duplicator::new();
        let editor = user("editor", true);

        let nonce = nonces.issue("ada", DUPLICATE_ACTION, &id);
        let denied = duplicate_from_link(&duplicator, &store, &nonces, &settings, &user("author", false), Some(&id), Some(&nonce));
        assert!(matches!(denied, Err(DuplicateError::PermissionDenied)));

        // Without a valid nonce a request never learns whether the post parameter was missing.
        let unchecked = duplicate_from_link(&duplicator, &store, &nonces, &settings, &editor, None, None);
        assert!(matches!(unchecked, Err(DuplicateError::SecurityCheckFailed)));
        let forged = duplicate_from_link(&duplicator, &store, &nonces, &settings, &editor, Some(" "), Some("forged"));
        assert!(matches!(forged, Err(DuplicateError::SecurityCheckFailed)));

        let spare = nonces.issue("ada", DUPLICATE_ACTION, &id);
        let missing = duplicate_from_link(&duplicator, &store, &nonces, &settings, &editor, Some(" "), Some(&spare));
        assert!(matches!(missing, Err(DuplicateError::MissingPost)));

        let no_nonce = duplicate_from_link(&duplicator, &store, &nonces, &settings, &editor, Some(&id), None);
        assert!(matches!(no_nonce, Err(DuplicateError::SecurityCheckFailed)));

        let new_id = duplicate_from_link(&duplicator, &store, &nonces, &settings, &editor, Some(&id), Some(&nonce)).unwrap();
        assert!(store.get_post(&new_id).unwrap().is_some());

        let replay = duplicate_from_link(&duplicator, &store, &nonces, &settings, &editor, Some(&id), Some(&nonce));
        assert!(matches!(replay, Err(DuplicateError::SecurityCheckFailed)));
        assert_eq!(store.count_posts(None).unwrap(), 2);
    }

    #[test]
    fn selection_requires_capability() {
        let (_dir, store) = open_store();
        let ids = vec![
            seed_rich_post(&store),
            store.insert_post(&sample_post("revision", "Old")).unwrap(),
        ];
        let settings = DuplicationSettings::default();

        let denied = duplicate_selection(&Duplicator::new(), &store, &settings, &user("author", false), &ids);
        assert!(matches!(denied, Err(DuplicateError::PermissionDenied)));
        assert_eq!(duplicate_selection(&Duplicator::new(), &store, &settings, &user("admin", false), &ids).unwrap(), 1);
    }

    #[test]
    fn bulk_notice_wording() {
        assert_eq!(bulk_notice(0), None);
        assert_eq!(bulk_notice(1).as_deref(), Some("1 item duplicated successfully."));
        assert_eq!(bulk_notice(3).as_deref(), Some("3 items duplicated successfully."));
    }

    #[test]
    fn row_action_visibility() {
        let settings = DuplicationSettings { post_types: vec!["page".to_string()], ..Default::default() };
        assert!(can_duplicate_type(&user("editor", true), &settings, "page"));
        assert!(!can_duplicate_type(&user("editor", true), &settings, "post"));
        assert!(!can_duplicate_type(&user("author", false), &settings, "page"));
    }
}
