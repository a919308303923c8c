//! Copies a post, its attributes and its taxonomy terms into a new record.

use crate::models::db_operations::posts_db_operations::{ContentStore, StoreError};
use crate::models::{DuplicationSettings, NewPost, Post};
use thiserror::Error;

/// Attribute keys owned by the editor's concurrent-edit tracking. Never copied.
pub const RESERVED_META_KEYS: [&str; 2] = ["_edit_lock", "_edit_last"];

pub fn is_reserved_meta_key(key: &str) -> bool {
    RESERVED_META_KEYS.contains(&key)
}

#[derive(Error, Debug)]
pub enum DuplicateError {
    #[error("Post creation failed, could not find original post.")]
    NotFound,
    #[error("This post type is not enabled for duplication.")]
    TypeNotEligible,
    #[error("You do not have permission to duplicate this content.")]
    PermissionDenied,
    #[error("Security check failed. Please try again.")]
    SecurityCheckFailed,
    #[error("No post to duplicate has been provided.")]
    MissingPost,
    #[error("Could not load the original post: {0}")]
    LookupFailed(#[source] StoreError),
    #[error("Could not create the duplicate: {0}")]
    CreationFailed(#[source] StoreError),
}

/// Notified after every successful duplication.
pub trait DuplicationObserver: Send + Sync {
    fn after_duplicate(&self, new_id: &str, original: &Post);
}

/// Writes one log line per duplicate.
pub struct LogObserver;

impl DuplicationObserver for LogObserver {
    fn after_duplicate(&self, new_id: &str, original: &Post) {
        log::info!(
            "Duplicated {} '{}' ({}) as {}",
            original.record.post_type, original.record.title, original.id, new_id
        );
    }
}

#[derive(Default)]
pub struct Duplicator {
    observers: Vec<Box<dyn DuplicationObserver>>,
}

impl Duplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: impl DuplicationObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Duplicates the post `source_id` and returns the id of the copy.
    pub fn duplicate<S: ContentStore + ?Sized>(
        &self,
        store: &S,
        source_id: &str,
        settings: &DuplicationSettings,
    ) -> Result<String, DuplicateError> {
        let source = store
            .get_post(source_id)
            .map_err(DuplicateError::LookupFailed)?
            .ok_or(DuplicateError::NotFound)?;

        if !settings.is_eligible(&source.record.post_type) {
            return Err(DuplicateError::TypeNotEligible);
        }

        self.copy_post(store, &source, settings)
    }

    /// Duplicates every eligible post among `source_ids` and returns how many copies were made.
    /// Missing, ineligible and failing posts are skipped.
    pub fn duplicate_many<S, I>(&self, store: &S, source_ids: I, settings: &DuplicationSettings) -> usize
    where
        S: ContentStore + ?Sized,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut duplicated = 0;
        for source_id in source_ids {
            let source_id = source_id.as_ref();
            match self.duplicate(store, source_id, settings) {
                Ok(_) => duplicated += 1,
                Err(DuplicateError::NotFound) | Err(DuplicateError::TypeNotEligible) => {
                    log::debug!("Skipping {} in bulk duplicate: not found or not eligible", source_id);
                }
                Err(e) => log::warn!("Bulk duplicate of {} failed: {}", source_id, e),
            }
        }
        duplicated
    }

    fn copy_post<S: ContentStore + ?Sized>(
        &self,
        store: &S,
        source: &Post,
        settings: &DuplicationSettings,
    ) -> Result<String, DuplicateError> {
        let draft = build_draft(source, settings);
        let new_id = store.insert_post(&draft).map_err(DuplicateError::CreationFailed)?;

        // The record exists from here on; copy failures are reported, never rolled back.
        for taxonomy in store.taxonomies_for(&source.record.post_type) {
            let copied = store
                .get_post_terms(&source.id, &taxonomy)
                .and_then(|slugs| store.set_post_terms(&new_id, &taxonomy, &slugs));
            if let Err(e) = copied {
                log::error!("Copying '{}' terms from {} to {} failed: {}", taxonomy, source.id, new_id, e);
            }
        }

        match store.get_post_meta(&source.id) {
            Ok(entries) => {
                for entry in entries.iter().filter(|entry| !is_reserved_meta_key(&entry.key)) {
                    if let Err(e) = store.add_post_meta(&new_id, &entry.key, &entry.value) {
                        log::error!("Copying attribute '{}' from {} to {} failed: {}", entry.key, source.id, new_id, e);
                    }
                }
            }
            Err(e) => log::error!("Reading attributes of {} failed, {} has none: {}", source.id, new_id, e),
        }

        for observer in &self.observers {
            observer.after_duplicate(&new_id, source);
        }

        Ok(new_id)
    }
}

/// The record to create for a copy of `source`.
pub fn build_draft(source: &Post, settings: &DuplicationSettings) -> NewPost {
    let record = &source.record;
    NewPost {
        post_type: record.post_type.clone(),
        author_id: record.author_id,
        title: format!("{} {}", record.title, settings.title_suffix),
        content: source.content.clone(),
        excerpt: record.excerpt.clone(),
        slug: record.slug.clone(),
        parent_id: record.parent_id.clone(),
        password: record.password.clone(),
        status: settings.default_status,
        comment_status: record.comment_status,
        ping_status: record.ping_status,
        to_ping: record.to_ping.clone(),
        menu_order: record.menu_order,
    }
}
