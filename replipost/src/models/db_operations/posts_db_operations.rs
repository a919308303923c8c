use redb::{
    CommitError, Database, DatabaseError, MultimapTableDefinition, ReadableMultimapTable, ReadableTable,
    StorageError, TableDefinition, TableError, TransactionError,
};
use crate::models::content_types::ContentTypeRegistry;
use crate::models::{NewPost, Post, PostMeta, PostRecord, PostSummary, PostUpdate};
use uuid::Uuid;
use chrono::Utc;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redb database error: {0}")]
    RedbDatabase(#[from] DatabaseError),
    #[error("Redb storage error: {0}")]
    RedbStorage(#[from] StorageError),
    #[error("Redb transaction error: {0}")]
    RedbTransaction(#[from] TransactionError),
    #[error("Redb table error: {0}")]
    RedbTable(#[from] TableError),
    #[error("Redb commit error: {0}")]
    RedbCommit(#[from] CommitError),
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Item not found in database: {0}")]
    NotFound(String),
    #[error("Invalid post: {0}")]
    Invalid(String),
}

/// Record bodies.
pub const POSTS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("posts");
/// JSON-encoded `PostRecord`s.
pub const RECORDS: TableDefinition<&[u8; 16], &str> = TableDefinition::new("records");
pub const CHRONOLOGICAL_INDEX: TableDefinition<(i64, &[u8; 16]), ()> = TableDefinition::new("chronological_index");
/// `(post id, sequence) -> JSON PostMeta`. The sequence keeps insertion order and allows repeated keys.
pub const POST_META: TableDefinition<(&[u8; 16], u64), &str> = TableDefinition::new("post_meta");
/// `(post id, taxonomy) -> term slug`.
pub const POST_TERMS: MultimapTableDefinition<(&[u8; 16], &str), &str> = MultimapTableDefinition::new("post_terms");
/// `(taxonomy, slug) -> display name`.
pub const TERMS: TableDefinition<(&str, &str), &str> = TableDefinition::new("terms");

/// The persistence operations the duplicator relies on.
pub trait ContentStore {
    /// Unknown or malformed ids resolve to `Ok(None)`.
    fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError>;

    fn insert_post(&self, new_post: &NewPost) -> Result<String, StoreError>;

    fn taxonomies_for(&self, post_type: &str) -> Vec<String>;

    fn get_post_terms(&self, id: &str, taxonomy: &str) -> Result<Vec<String>, StoreError>;

    /// Replaces every association of `id` in `taxonomy` with `slugs`.
    fn set_post_terms(&self, id: &str, taxonomy: &str, slugs: &[String]) -> Result<(), StoreError>;

    /// All attribute entries of `id`, in insertion order.
    fn get_post_meta(&self, id: &str) -> Result<Vec<PostMeta>, StoreError>;

    /// Appends an entry; existing entries under the same key are kept.
    fn add_post_meta(&self, id: &str, key: &str, value: &str) -> Result<(), StoreError>;
}

fn parse_id(id: &str) -> Option<[u8; 16]> {
    Uuid::parse_str(id).ok().map(|uuid| uuid.into_bytes())
}

fn require_id(id: &str) -> Result<[u8; 16], StoreError> {
    parse_id(id).ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn normalize_slug(slug: &str) -> String {
    slug.trim().to_lowercase()
}

/// Creates every content table if it does not exist yet.
pub fn ensure_tables(db: &Database) -> Result<(), StoreError> {
    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(POSTS)?;
        write_txn.open_table(RECORDS)?;
        write_txn.open_table(CHRONOLOGICAL_INDEX)?;
        write_txn.open_table(POST_META)?;
        write_txn.open_multimap_table(POST_TERMS)?;
        write_txn.open_table(TERMS)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub struct RedbContentStore {
    db: Database,
    registry: ContentTypeRegistry,
}

impl RedbContentStore {
    pub fn new(db: Database, registry: ContentTypeRegistry) -> Result<Self, StoreError> {
        ensure_tables(&db)?;
        Ok(RedbContentStore { db, registry })
    }

    /// Opens the database at `path`, creating the file if needed.
    pub fn create(path: &Path, registry: ContentTypeRegistry) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Self::new(db, registry)
    }

    pub fn registry(&self) -> &ContentTypeRegistry {
        &self.registry
    }

    /// Newest first, optionally restricted to one content type.
    pub fn list_posts(&self, post_type: Option<&str>, limit: u32, offset: u32) -> Result<Vec<PostSummary>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let chrono_index = read_txn.open_table(CHRONOLOGICAL_INDEX)?;
        let posts_table = read_txn.open_table(POSTS)?;
        let records_table = read_txn.open_table(RECORDS)?;

        let mut summaries = Vec::new();
        let mut skipped = 0;
        for item in chrono_index.iter()? {
            if summaries.len() >= limit as usize {
                break;
            }
            let (key, _) = item?;
            let id_bytes = *key.value().1;
            let post = match read_post_in(&posts_table, &records_table, &id_bytes)? {
                Some(post) => post,
                None => continue,
            };
            if post_type.map_or(false, |t| t != post.record.post_type) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            summaries.push(PostSummary::from(&post));
        }
        Ok(summaries)
    }

    pub fn count_posts(&self, post_type: Option<&str>) -> Result<usize, StoreError> {
        let read_txn = self.db.begin_read()?;
        let records_table = read_txn.open_table(RECORDS)?;
        let mut count = 0;
        for item in records_table.iter()? {
            let (_, record_json) = item?;
            let record: PostRecord = serde_json::from_str(record_json.value())?;
            if post_type.map_or(true, |t| t == record.post_type) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn update_post(&self, id: &str, update: &PostUpdate) -> Result<(), StoreError> {
        let id_bytes = require_id(id)?;
        if update.title.trim().is_empty() && update.content.trim().is_empty() {
            return Err(StoreError::Invalid("title and content are both empty".to_string()));
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut posts_table = write_txn.open_table(POSTS)?;
            let mut records_table = write_txn.open_table(RECORDS)?;

            let mut record: PostRecord = {
                let guard = records_table.get(&id_bytes)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                serde_json::from_str(guard.value())?
            };
            record.title = update.title.clone();
            record.excerpt = update.excerpt.clone();
            record.status = update.status;
            record.last_updated_at = Some(Utc::now());

            let record_json = serde_json::to_string(&record)?;
            posts_table.insert(&id_bytes, update.content.as_str())?;
            records_table.insert(&id_bytes, record_json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Replaces every entry under `key` with a single `value`.
    pub fn update_post_meta(&self, id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let id_bytes = require_id(id)?;
        let write_txn = self.db.begin_write()?;
        {
            let records_table = write_txn.open_table(RECORDS)?;
            if records_table.get(&id_bytes)?.is_none() {
                return Err(StoreError::NotFound(id.to_string()));
            }

            let mut meta_table = write_txn.open_table(POST_META)?;
            let mut stale = Vec::new();
            let mut last_seq = 0;
            for item in meta_table.range((&id_bytes, 0u64)..=(&id_bytes, u64::MAX))? {
                let (entry_key, entry_json) = item?;
                let seq = entry_key.value().1;
                last_seq = seq;
                let entry: PostMeta = serde_json::from_str(entry_json.value())?;
                if entry.key == key {
                    stale.push(seq);
                }
            }
            for seq in stale {
                meta_table.remove((&id_bytes, seq))?;
            }
            let entry_json = serde_json::to_string(&PostMeta::new(key, value))?;
            meta_table.insert((&id_bytes, last_seq + 1), entry_json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Every known term of `taxonomy` as `(slug, name)` pairs.
    pub fn list_terms(&self, taxonomy: &str) -> Result<Vec<(String, String)>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let terms_table = read_txn.open_table(TERMS)?;
        let mut terms = Vec::new();
        for item in terms_table.iter()? {
            let (key, name) = item?;
            let (term_taxonomy, slug) = key.value();
            if term_taxonomy == taxonomy {
                terms.push((slug.to_string(), name.value().to_string()));
            }
        }
        Ok(terms)
    }
}

fn read_post_in(
    posts_table: &impl ReadableTable<&'static [u8; 16], &'static str>,
    records_table: &impl ReadableTable<&'static [u8; 16], &'static str>,
    id_bytes: &[u8; 16],
) -> Result<Option<Post>, StoreError> {
    let record_guard = match records_table.get(id_bytes)? {
        Some(guard) => guard,
        None => return Ok(None),
    };
    let record: PostRecord = serde_json::from_str(record_guard.value())?;
    let content = posts_table
        .get(id_bytes)?
        .map(|guard| guard.value().to_string())
        .unwrap_or_default();
    Ok(Some(Post {
        id: Uuid::from_bytes(*id_bytes).to_string(),
        content,
        record,
    }))
}

impl ContentStore for RedbContentStore {
    fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        let id_bytes = match parse_id(id) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let read_txn = self.db.begin_read()?;
        let posts_table = read_txn.open_table(POSTS)?;
        let records_table = read_txn.open_table(RECORDS)?;
        read_post_in(&posts_table, &records_table, &id_bytes)
    }

    fn insert_post(&self, new_post: &NewPost) -> Result<String, StoreError> {
        if self.registry.get(&new_post.post_type).is_none() {
            return Err(StoreError::Invalid(format!("unknown post type '{}'", new_post.post_type)));
        }
        if new_post.title.trim().is_empty() && new_post.content.trim().is_empty() && new_post.excerpt.trim().is_empty() {
            return Err(StoreError::Invalid("title, content and excerpt are all empty".to_string()));
        }

        let post_uuid = Uuid::new_v4();
        let id_bytes = post_uuid.into_bytes();
        let created_at = Utc::now();

        let record = PostRecord {
            post_type: new_post.post_type.clone(),
            author_id: new_post.author_id,
            title: new_post.title.clone(),
            excerpt: new_post.excerpt.clone(),
            slug: new_post.slug.clone(),
            parent_id: new_post.parent_id.clone(),
            password: new_post.password.clone(),
            status: new_post.status,
            comment_status: new_post.comment_status,
            ping_status: new_post.ping_status,
            to_ping: new_post.to_ping.clone(),
            menu_order: new_post.menu_order,
            created_at,
            last_updated_at: None,
        };
        let record_json = serde_json::to_string(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut posts_table = write_txn.open_table(POSTS)?;
            let mut records_table = write_txn.open_table(RECORDS)?;
            let mut chrono_index = write_txn.open_table(CHRONOLOGICAL_INDEX)?;
            let mut post_terms = write_txn.open_multimap_table(POST_TERMS)?;
            let mut terms_table = write_txn.open_table(TERMS)?;

            posts_table.insert(&id_bytes, new_post.content.as_str())?;
            records_table.insert(&id_bytes, record_json.as_str())?;
            chrono_index.insert((-created_at.timestamp(), &id_bytes), ())?;

            for taxonomy in self.registry.taxonomies_for(&new_post.post_type) {
                if let Some(default_term) = taxonomy.default_term.as_deref() {
                    let slug = normalize_slug(default_term);
                    if terms_table.get((taxonomy.name.as_str(), slug.as_str()))?.is_none() {
                        terms_table.insert((taxonomy.name.as_str(), slug.as_str()), default_term)?;
                    }
                    post_terms.insert((&id_bytes, taxonomy.name.as_str()), slug.as_str())?;
                }
            }
        }
        write_txn.commit()?;

        Ok(post_uuid.to_string())
    }

    fn taxonomies_for(&self, post_type: &str) -> Vec<String> {
        self.registry
            .taxonomies_for(post_type)
            .into_iter()
            .map(|taxonomy| taxonomy.name.clone())
            .collect()
    }

    fn get_post_terms(&self, id: &str, taxonomy: &str) -> Result<Vec<String>, StoreError> {
        let id_bytes = require_id(id)?;
        let read_txn = self.db.begin_read()?;
        let post_terms = read_txn.open_multimap_table(POST_TERMS)?;
        let mut slugs = Vec::new();
        for slug in post_terms.get((&id_bytes, taxonomy))? {
            slugs.push(slug?.value().to_string());
        }
        Ok(slugs)
    }

    fn set_post_terms(&self, id: &str, taxonomy: &str, slugs: &[String]) -> Result<(), StoreError> {
        let id_bytes = require_id(id)?;
        let write_txn = self.db.begin_write()?;
        {
            let records_table = write_txn.open_table(RECORDS)?;
            if records_table.get(&id_bytes)?.is_none() {
                return Err(StoreError::NotFound(id.to_string()));
            }

            let mut post_terms = write_txn.open_multimap_table(POST_TERMS)?;
            let mut terms_table = write_txn.open_table(TERMS)?;

            post_terms.remove_all((&id_bytes, taxonomy))?;
            for slug in slugs.iter().map(|s| normalize_slug(s)).filter(|s| !s.is_empty()) {
                if terms_table.get((taxonomy, slug.as_str()))?.is_none() {
                    terms_table.insert((taxonomy, slug.as_str()), slug.as_str())?;
                }
                post_terms.insert((&id_bytes, taxonomy), slug.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_post_meta(&self, id: &str) -> Result<Vec<PostMeta>, StoreError> {
        let id_bytes = require_id(id)?;
        let read_txn = self.db.begin_read()?;
        let meta_table = read_txn.open_table(POST_META)?;
        let mut entries = Vec::new();
        for item in meta_table.range((&id_bytes, 0u64)..=(&id_bytes, u64::MAX))? {
            let (_, entry_json) = item?;
            entries.push(serde_json::from_str(entry_json.value())?);
        }
        Ok(entries)
    }

    fn add_post_meta(&self, id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let id_bytes = require_id(id)?;
        if key.is_empty() {
            return Err(StoreError::Invalid("attribute key must not be empty".to_string()));
        }
        let entry_json = serde_json::to_string(&PostMeta::new(key, value))?;

        let write_txn = self.db.begin_write()?;
        {
            let records_table = write_txn.open_table(RECORDS)?;
            if records_table.get(&id_bytes)?.is_none() {
                return Err(StoreError::NotFound(id.to_string()));
            }

            let mut meta_table = write_txn.open_table(POST_META)?;
            let next_seq = match meta_table.range((&id_bytes, 0u64)..=(&id_bytes, u64::MAX))?.next_back() {
                Some(last) => last?.0.value().1 + 1,
                None => 0,
            };
            meta_table.insert((&id_bytes, next_seq), entry_json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
