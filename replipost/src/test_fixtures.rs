use crate::config::{Config, WebConfig};
use crate::models::content_types::ContentTypeRegistry;
use crate::models::db_operations::posts_db_operations::{ContentStore, RedbContentStore, StoreError};
use crate::models::db_operations::users_db_operations;
use crate::models::{CommentStatus, NewPost, Post, PostMeta, PostStatus};
use crate::setup::db_setup;
use crate::DbPool;
use actix_session::Session;
use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::{test, web, HttpResponse};
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

pub fn open_store() -> (TempDir, RedbContentStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = RedbContentStore::create(&dir.path().join("posts.db"), ContentTypeRegistry::default()).unwrap();
    (dir, store)
}

pub fn test_config(database_path: &Path) -> Config {
    Config {
        web: WebConfig { host: "127.0.0.1".to_string(), port: 8080 },
        content_types: Vec::new(),
        taxonomies: Vec::new(),
        database_path: database_path.display().to_string(),
        log_level: "debug".to_string(),
        session_secret_key: "ab".repeat(64),
        admin_url_prefix: "test-admin".to_string(),
        use_secure_cookies: false,
        nonce_ttl_seconds: 60,
    }
}

/// A file-backed users database with an `editor` allowed to edit and an `author` who is not.
pub fn users_pool(dir: &Path) -> DbPool {
    let manager = SqliteConnectionManager::file(dir.join("users.db"));
    let pool = r2d2::Pool::builder().max_size(2).build(manager).unwrap();
    let mut conn = pool.get().unwrap();
    db_setup::setup_users_db(&mut conn).unwrap();
    users_db_operations::create_user(&conn, "editor", "pw", "editor", true).unwrap();
    users_db_operations::create_user(&conn, "author", "pw", "author", false).unwrap();
    pool
}

pub fn sample_post(post_type: &str, title: &str) -> NewPost {
    NewPost {
        post_type: post_type.to_string(),
        author_id: 1,
        title: title.to_string(),
        content: "Body".to_string(),
        excerpt: String::new(),
        slug: String::new(),
        parent_id: None,
        password: None,
        status: PostStatus::Publish,
        comment_status: CommentStatus::Open,
        ping_status: CommentStatus::Open,
        to_ping: String::new(),
        menu_order: 0,
    }
}

/// A published post with every field set, edit-lock attributes, a repeated key and terms.
pub fn seed_rich_post(store: &RedbContentStore) -> String {
    let id = store
        .insert_post(&NewPost {
            post_type: "post".to_string(),
            author_id: 4,
            title: "Hello world".to_string(),
            content: "<p>Welcome.</p>".to_string(),
            excerpt: "Welcome".to_string(),
            slug: "hello-world".to_string(),
            parent_id: Some("9b2f4a4e-0a4e-4f3c-9a7e-1d2c3b4a5f60".to_string()),
            password: Some("letmein".to_string()),
            status: PostStatus::Publish,
            comment_status: CommentStatus::Closed,
            ping_status: CommentStatus::Closed,
            to_ping: "http://example.com/ping".to_string(),
            menu_order: 2,
        })
        .unwrap();

    for (key, value) in [
        ("_edit_lock", "1700000000:1"),
        ("gallery", "12"),
        ("_thumbnail_id", "12"),
        ("gallery", "12"),
        ("_edit_last", "1"),
    ] {
        store.add_post_meta(&id, key, value).unwrap();
    }
    store.set_post_terms(&id, "category", &["news".to_string()]).unwrap();
    store.set_post_terms(&id, "post_tag", &["rust".to_string(), "cms".to_string()]).unwrap();
    id
}

/// Delegates to a real store but fails the selected writes.
pub struct FlakyStore<'a> {
    pub inner: &'a RedbContentStore,
    pub fail_insert: bool,
    pub fail_meta: bool,
    pub fail_terms: bool,
}

impl<'a> FlakyStore<'a> {
    pub fn new(inner: &'a RedbContentStore) -> Self {
        FlakyStore { inner, fail_insert: false, fail_meta: false, fail_terms: false }
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Invalid(format!("injected {} failure", what))
}

impl ContentStore for FlakyStore<'_> {
    fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        self.inner.get_post(id)
    }

    fn insert_post(&self, new_post: &NewPost) -> Result<String, StoreError> {
        if self.fail_insert {
            return Err(injected("insert"));
        }
        self.inner.insert_post(new_post)
    }

    fn taxonomies_for(&self, post_type: &str) -> Vec<String> {
        self.inner.taxonomies_for(post_type)
    }

    fn get_post_terms(&self, id: &str, taxonomy: &str) -> Result<Vec<String>, StoreError> {
        self.inner.get_post_terms(id, taxonomy)
    }

    fn set_post_terms(&self, id: &str, taxonomy: &str, slugs: &[String]) -> Result<(), StoreError> {
        if self.fail_terms {
            return Err(injected("terms"));
        }
        self.inner.set_post_terms(id, taxonomy, slugs)
    }

    fn get_post_meta(&self, id: &str) -> Result<Vec<PostMeta>, StoreError> {
        self.inner.get_post_meta(id)
    }

    fn add_post_meta(&self, id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_meta {
            return Err(injected("attribute"));
        }
        self.inner.add_post_meta(id, key, value)
    }
}

pub fn templates() -> tera::Tera {
    tera::Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*.html")).unwrap()
}

/// Puts `username` into the session the way a successful login does.
pub async fn fake_login(session: Session, path: web::Path<String>) -> HttpResponse {
    session.insert("username", path.into_inner()).unwrap();
    session.insert("role", "editor").unwrap();
    HttpResponse::Ok().finish()
}

/// Cookies a browser would hold across requests, keyed by name.
#[derive(Default)]
pub struct CookieJar(HashMap<String, Cookie<'static>>);

impl CookieJar {
    pub fn store<B>(&mut self, resp: &ServiceResponse<B>) {
        for cookie in resp.response().cookies() {
            self.0.insert(cookie.name().to_string(), cookie.into_owned());
        }
    }

    pub fn attach(&self, mut req: test::TestRequest) -> test::TestRequest {
        for cookie in self.0.values() {
            req = req.cookie(cookie.clone());
        }
        req
    }
}

/// The CSRF token embedded in a rendered admin form.
pub fn form_csrf_token(html: &str) -> String {
    let re = Regex::new(r#"name="csrf_token" value="([^"]*)""#).unwrap();
    let captures = re.captures(html).expect("page has no csrf_token field");
    captures[1]
        .replace("&#x2F;", "/")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
