use crate::models::db_operations::posts_db_operations::{ContentStore, StoreError};
use crate::models::{NewPost, PostMeta};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Invalid import file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Entry {index} ('{title}') could not be imported: {source}")]
    Entry {
        index: usize,
        title: String,
        #[source]
        source: StoreError,
    },
}

/// One entry of an import file: the record fields plus its attributes and terms.
#[derive(Debug, Deserialize)]
pub struct ImportedPost {
    #[serde(flatten)]
    pub post: NewPost,
    #[serde(default)]
    pub meta: Vec<PostMeta>,
    /// Taxonomy name to term slugs.
    #[serde(default)]
    pub terms: BTreeMap<String, Vec<String>>,
}

/// Inserts every entry of a JSON array and returns the new ids in file order.
/// Stops at the first entry the store rejects; earlier entries stay imported.
pub fn import_posts<S: ContentStore + ?Sized>(store: &S, json: &str) -> Result<Vec<String>, ImportError> {
    let entries: Vec<ImportedPost> = serde_json::from_str(json)?;
    let mut ids = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let wrap = |source: StoreError| ImportError::Entry { index, title: entry.post.title.clone(), source };

        let id = store.insert_post(&entry.post).map_err(wrap)?;
        let applicable = store.taxonomies_for(&entry.post.post_type);
        for (taxonomy, slugs) in &entry.terms {
            if !applicable.contains(taxonomy) {
                log::warn!("Ignoring '{}' terms on '{}': taxonomy does not apply", taxonomy, entry.post.title);
                continue;
            }
            store.set_post_terms(&id, taxonomy, slugs).map_err(wrap)?;
        }
        for item in &entry.meta {
            store.add_post_meta(&id, &item.key, &item.value).map_err(wrap)?;
        }
        log::debug!("Imported '{}' as {}", entry.post.title, id);
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostStatus;
    use crate::test_fixtures::open_store;

    #[test]
    fn imports_fields_meta_and_terms() {
        let (_dir, store) = open_store();
        let json = r#"[
            {
                "post_type": "post",
                "title": "Imported",
                "content": "Body",
                "status": "publish",
                "menu_order": 4,
                "meta": [{"key": "color", "value": "red"}, {"key": "color", "value": "red"}],
                "terms": {"post_tag": ["Rust"], "genre": ["ignored"]}
            },
            {"post_type": "page", "title": "About", "status": "draft"}
        ]"#;

        let ids = import_posts(&store, json).unwrap();
        assert_eq!(ids.len(), 2);

        let post = store.get_post(&ids[0]).unwrap().unwrap();
        assert_eq!(post.record.status, PostStatus::Publish);
        assert_eq!(post.record.menu_order, 4);
        assert_eq!(store.get_post_meta(&ids[0]).unwrap().len(), 2);
        assert_eq!(store.get_post_terms(&ids[0], "post_tag").unwrap(), vec!["rust"]);
        assert_eq!(store.get_post_terms(&ids[0], "category").unwrap(), vec!["uncategorized"]);
    }

    #[test]
    fn rejected_entry_reports_its_position() {
        let (_dir, store) = open_store();
        let json = r#"[
            {"post_type": "post", "title": "Fine", "status": "draft"},
            {"post_type": "book", "title": "Unknown type", "status": "draft"}
        ]"#;

        match import_posts(&store, json) {
            Err(ImportError::Entry { index, title, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(title, "Unknown type");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.count_posts(None).unwrap(), 1);
        assert!(matches!(import_posts(&store, "{}"), Err(ImportError::Json(_))));
    }
}
