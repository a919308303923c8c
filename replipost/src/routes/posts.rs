use crate::config::Config;
use crate::duplicator::{DuplicateError, Duplicator};
use crate::helper::admin_helpers;
use crate::helper::duplicate_helpers::{bulk_notice, can_duplicate_type, duplicate_from_link, duplicate_selection};
use crate::helper::form_helpers::collect_prefixed;
use crate::helper::nonce_helpers::DUPLICATE_ACTION;
use crate::middleware::AuthenticatedUser;
use crate::models::db_operations::posts_db_operations::{ContentStore, RedbContentStore, StoreError};
use crate::models::{DuplicationSettings, PostStatus, PostUpdate};
use crate::routes::{load_user, redirect, render, render_error, set_notification, status_choices, take_notification};
use crate::{AppState, DbPool};
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{http::StatusCode, web, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tera::{Context, Tera};

const POSTS_PER_PAGE: u32 = 20;
const DEFAULT_POST_TYPE: &str = "post";

#[derive(Deserialize)]
struct ListQuery {
    post_type: Option<String>,
    page: Option<u32>,
}

#[derive(Deserialize)]
struct DuplicateQuery {
    post: Option<String>,
    nonce: Option<String>,
}

#[derive(Deserialize)]
struct BulkForm {
    csrf_token: CsrfToken,
    action: String,
    post_type: Option<String>,
    /// One `post_<id>` field per selected row.
    #[serde(flatten)]
    fields: HashMap<String, String>,
}

impl CsrfGuarded for BulkForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct EditForm {
    csrf_token: CsrfToken,
    title: String,
    content: String,
    #[serde(default)]
    excerpt: String,
    status: String,
}

impl CsrfGuarded for EditForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Serialize)]
struct PostRow {
    id: String,
    title: String,
    status: &'static str,
    created_at: String,
    duplicate_url: Option<String>,
}

#[derive(Serialize)]
struct TermGroup {
    label: String,
    names: Vec<String>,
}

pub fn config_posts(cfg: &mut web::ServiceConfig) {
    cfg.route("/posts", web::get().to(list_posts))
        .route("/posts/bulk", web::post().to(bulk_action))
        .route("/posts/{id}/edit", web::get().to(show_edit_form))
        .route("/posts/{id}/edit", web::post().to(update_post_action))
        .route("/duplicate", web::get().to(duplicate_action));
}

pub fn duplicate_error_status(error: &DuplicateError) -> StatusCode {
    match error {
        DuplicateError::NotFound => StatusCode::NOT_FOUND,
        DuplicateError::TypeNotEligible | DuplicateError::MissingPost => StatusCode::BAD_REQUEST,
        DuplicateError::PermissionDenied | DuplicateError::SecurityCheckFailed => StatusCode::FORBIDDEN,
        DuplicateError::LookupFailed(_) | DuplicateError::CreationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn load_settings(pool: &DbPool, store: &RedbContentStore) -> Result<DuplicationSettings, admin_helpers::SettingsError> {
    let conn = admin_helpers::get_conn(pool)?;
    admin_helpers::load_duplication_settings(&conn, store.registry())
}

/// The list view of `post_type`, or of the default type when it is not a known public type.
fn list_url(config: &Config, store: &RedbContentStore, post_type: Option<&str>) -> String {
    let post_type = post_type
        .filter(|name| store.registry().is_public(name))
        .unwrap_or(DEFAULT_POST_TYPE);
    format!("{}?post_type={}", config.admin_path("posts"), post_type)
}

fn page_offset(page: u32) -> u32 {
    page.saturating_sub(1).saturating_mul(POSTS_PER_PAGE)
}

#[allow(clippy::too_many_arguments)]
async fn list_posts(
    auth: AuthenticatedUser,
    session: Session,
    query: web::Query<ListQuery>,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    store: web::Data<RedbContentStore>,
    app_state: web::Data<AppState>,
    token: CsrfToken,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_base = config.admin_path("");
    let user = match load_user(&pool, &auth, &tera, &admin_base) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let post_type = query.post_type.as_deref().unwrap_or(DEFAULT_POST_TYPE);
    let content_type = match store.registry().get(post_type) {
        Some(content_type) if content_type.public => content_type,
        _ => return render_error(&tera, &admin_base, StatusCode::BAD_REQUEST, "Unknown content type."),
    };
    // Without readable settings no type counts as eligible.
    let duplicable = match load_settings(&pool, &store) {
        Ok(settings) => can_duplicate_type(&user, &settings, post_type),
        Err(e) => {
            log::error!("Could not load duplication settings, hiding duplicate actions: {}", e);
            false
        }
    };

    let page = query.page.unwrap_or(1).max(1);
    let (summaries, total) = match store
        .list_posts(Some(post_type), POSTS_PER_PAGE, page_offset(page))
        .and_then(|summaries| Ok((summaries, store.count_posts(Some(post_type))?)))
    {
        Ok(listing) => listing,
        Err(e) => {
            log::error!("Failed to list {} records: {}", post_type, e);
            return render_error(&tera, &admin_base, StatusCode::INTERNAL_SERVER_ERROR, "Could not load content.");
        }
    };

    let rows: Vec<PostRow> = summaries
        .into_iter()
        .map(|summary| {
            let duplicate_url = duplicable.then(|| {
                let nonce = app_state.nonces.issue(&user.username, DUPLICATE_ACTION, &summary.id);
                format!("{}?post={}&nonce={}", config.admin_path("duplicate"), summary.id, nonce)
            });
            PostRow {
                id: summary.id,
                title: summary.title,
                status: summary.status.label(),
                created_at: summary.created_at.format("%Y-%m-%d %H:%M").to_string(),
                duplicate_url,
            }
        })
        .collect();

    let total_pages = (total as u32 + POSTS_PER_PAGE - 1) / POSTS_PER_PAGE;

    let mut ctx = Context::new();
    ctx.insert("admin_base", &admin_base);
    ctx.insert("user", &user);
    ctx.insert("csrf_token", token.get());
    ctx.insert("content_types", &store.registry().public_types());
    ctx.insert("content_type", content_type);
    ctx.insert("rows", &rows);
    ctx.insert("bulk_duplicate", &duplicable);
    ctx.insert("page", &page);
    ctx.insert("total_pages", &total_pages.max(1));
    take_notification(&session, &mut ctx);

    render(&tera, "admin/posts.html", &ctx)
}

#[allow(clippy::too_many_arguments)]
async fn duplicate_action(
    auth: AuthenticatedUser,
    query: web::Query<DuplicateQuery>,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    store: web::Data<RedbContentStore>,
    duplicator: web::Data<Duplicator>,
    app_state: web::Data<AppState>,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_base = config.admin_path("");
    let user = match load_user(&pool, &auth, &tera, &admin_base) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let settings = match load_settings(&pool, &store) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Could not load duplication settings: {}", e);
            return render_error(&tera, &admin_base, StatusCode::INTERNAL_SERVER_ERROR, "Could not load settings.");
        }
    };

    let result = duplicate_from_link(
        &duplicator,
        store.get_ref(),
        &app_state.nonces,
        &settings,
        &user,
        query.post.as_deref(),
        query.nonce.as_deref(),
    );
    match result {
        Ok(new_id) => redirect(&config.admin_path(&format!("posts/{}/edit", new_id))),
        Err(e) => {
            let status = duplicate_error_status(&e);
            if status.is_server_error() {
                log::error!("Duplicate requested by '{}' failed: {}", user.username, e);
            }
            render_error(&tera, &admin_base, status, &e.to_string())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn bulk_action(
    auth: AuthenticatedUser,
    session: Session,
    form: Csrf<web::Form<BulkForm>>,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    store: web::Data<RedbContentStore>,
    duplicator: web::Data<Duplicator>,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_base = config.admin_path("");
    let user = match load_user(&pool, &auth, &tera, &admin_base) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let form = form.into_inner().into_inner();
    let back = list_url(&config, &store, form.post_type.as_deref());

    if form.action != "duplicate" {
        set_notification(&session, "Unknown bulk action.", "error");
        return redirect(&back);
    }

    let settings = match load_settings(&pool, &store) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Could not load duplication settings: {}", e);
            return render_error(&tera, &admin_base, StatusCode::INTERNAL_SERVER_ERROR, "Could not load settings.");
        }
    };

    let selected = collect_prefixed(&form.fields, "post_");
    match duplicate_selection(&duplicator, store.get_ref(), &settings, &user, &selected) {
        Ok(count) => {
            log::info!("'{}' bulk duplicated {} of {} selected item(s)", user.username, count, selected.len());
            if let Some(notice) = bulk_notice(count) {
                set_notification(&session, &notice, "success");
            }
            redirect(&back)
        }
        Err(e) => render_error(&tera, &admin_base, duplicate_error_status(&e), &e.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
async fn show_edit_form(
    auth: AuthenticatedUser,
    session: Session,
    path: web::Path<String>,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    store: web::Data<RedbContentStore>,
    token: CsrfToken,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_base = config.admin_path("");
    let user = match load_user(&pool, &auth, &tera, &admin_base) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if !user.has_edit_capability() {
        return render_error(&tera, &admin_base, StatusCode::FORBIDDEN, "You do not have permission to edit content.");
    }

    let post_id = path.into_inner();
    let post = match store.get_post(&post_id) {
        Ok(Some(post)) => post,
        Ok(None) => return render_error(&tera, &admin_base, StatusCode::NOT_FOUND, "Post not found."),
        Err(e) => {
            log::error!("Failed to read post {}: {}", post_id, e);
            return render_error(&tera, &admin_base, StatusCode::INTERNAL_SERVER_ERROR, "Could not load the post.");
        }
    };

    let lock = format!("{}:{}", Utc::now().timestamp(), user.id);
    if let Err(e) = store
        .update_post_meta(&post.id, "_edit_lock", &lock)
        .and_then(|_| store.update_post_meta(&post.id, "_edit_last", &user.id.to_string()))
    {
        log::warn!("Could not stamp edit lock on {}: {}", post.id, e);
    }

    let meta = store.get_post_meta(&post.id).unwrap_or_else(|e| {
        log::error!("Failed to read attributes of {}: {}", post.id, e);
        Vec::new()
    });
    let terms: Vec<TermGroup> = store
        .registry()
        .taxonomies_for(&post.record.post_type)
        .into_iter()
        .map(|taxonomy| {
            let names: HashMap<String, String> = store.list_terms(&taxonomy.name).unwrap_or_default().into_iter().collect();
            let slugs = store.get_post_terms(&post.id, &taxonomy.name).unwrap_or_else(|e| {
                log::error!("Failed to read '{}' terms of {}: {}", taxonomy.name, post.id, e);
                Vec::new()
            });
            TermGroup {
                label: taxonomy.label.clone(),
                names: slugs.into_iter().map(|slug| names.get(&slug).cloned().unwrap_or(slug)).collect(),
            }
        })
        .collect();

    let mut ctx = Context::new();
    ctx.insert("admin_base", &admin_base);
    ctx.insert("user", &user);
    ctx.insert("csrf_token", token.get());
    ctx.insert("post", &post);
    ctx.insert("meta", &meta);
    ctx.insert("terms", &terms);
    ctx.insert("status_choices", &status_choices(post.record.status));
    take_notification(&session, &mut ctx);

    render(&tera, "admin/edit_post.html", &ctx)
}

#[allow(clippy::too_many_arguments)]
async fn update_post_action(
    auth: AuthenticatedUser,
    session: Session,
    path: web::Path<String>,
    form: Csrf<web::Form<EditForm>>,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    store: web::Data<RedbContentStore>,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_base = config.admin_path("");
    let user = match load_user(&pool, &auth, &tera, &admin_base) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if !user.has_edit_capability() {
        return render_error(&tera, &admin_base, StatusCode::FORBIDDEN, "You do not have permission to edit content.");
    }

    let post_id = path.into_inner();
    let edit_url = config.admin_path(&format!("posts/{}/edit", post_id));
    let form = form.into_inner().into_inner();
    let status = match form.status.parse::<PostStatus>() {
        Ok(status) => status,
        Err(_) => return render_error(&tera, &admin_base, StatusCode::BAD_REQUEST, "Unknown status."),
    };

    let update = PostUpdate { title: form.title, content: form.content, excerpt: form.excerpt, status };
    match store.update_post(&post_id, &update) {
        Ok(()) => set_notification(&session, "Post updated.", "success"),
        Err(StoreError::NotFound(_)) => {
            return render_error(&tera, &admin_base, StatusCode::NOT_FOUND, "Post not found.");
        }
        Err(StoreError::Invalid(reason)) => set_notification(&session, &format!("Post not saved: {}.", reason), "error"),
        Err(e) => {
            log::error!("Failed to update post {}: {}", post_id, e);
            set_notification(&session, "Failed to save the post.", "error");
        }
    }
    redirect(&edit_url)
}
